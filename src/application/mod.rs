pub mod billing_sync;
pub mod metering;

pub use billing_sync::*;
pub use metering::*;
