pub mod billing;
pub mod config;
pub mod identity;
pub mod repository;

pub use billing::*;
pub use config::*;
pub use identity::*;
pub use repository::*;
