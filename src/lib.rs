pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod service;

pub use config::{AppConfig, FallbackDiagnosis};
pub use error::{DiagnosisError, Result};
pub use models::*;
pub use service::{AppState, create_app};
