use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,

    // Access tokens (HS256, shared secret with the identity provider)
    #[validate(length(min = 1))]
    pub jwt_secret: String,
    pub jwt_audience: String,

    /// Bearer token for the provisioning routes. Empty disables them.
    pub admin_token: String,

    // Billing; no secret key means reconciliation is disabled
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    /// Six-field cron expression (with seconds). Empty disables the job.
    pub reconcile_schedule: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("CREDITS"))
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("jwt_audience", "authenticated")?
            .set_default("admin_token", "")?
            .set_default("stripe_api_base", "https://api.stripe.com/v1")?
            .set_default("reconcile_schedule", "0 0 * * * *")?
            .build()?;

        config.try_deserialize()
    }
}
