pub mod config;
pub mod lifecycle;
pub mod server;

pub use crate::config::Config;
pub use crate::lifecycle::{ExitOutcome, LifecycleCoordinator, Phase};
