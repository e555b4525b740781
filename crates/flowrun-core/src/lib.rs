pub mod config;
pub mod error;
pub mod hub;
pub mod message;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{FlowError, Result};
pub use hub::{BroadcastReport, Hub, Observer, ObserverId, Payload};
pub use message::LifecycleMessage;
pub use types::*;
