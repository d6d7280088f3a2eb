pub mod credits;
pub mod subscription;

pub use credits::*;
pub use subscription::*;
