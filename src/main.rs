#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    credit_meter::server::run().await
}
