pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::WorkflowConfig;
pub use error::{GraphDefinitionError, Result, TrellisError};
pub use types::*;
