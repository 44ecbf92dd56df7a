pub mod config;
pub mod error;
pub mod event;
pub mod hash;
pub mod prompt;
pub mod traits;
pub mod types;
pub mod version;

pub use config::AppConfig;
pub use error::{DagwrightError, Result};
pub use event::EventBus;
pub use types::*;
pub use version::{NodeVersion, UpgradePolicy};
