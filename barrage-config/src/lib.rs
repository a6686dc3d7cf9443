//! Domain-driven configuration management for Barrage
//!
//! Configuration is split by functional domain (engine limits, HTTP client,
//! logging, output), with validation, defaults, and environment variable
//! overrides using the `BARRAGE_` prefix.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    engine::{EngineConfig, LimitPolicy},
    http::{ConnectionPoolConfig, HttpConfig},
    logging::{LogFormat, LogLevel, LoggingConfig},
    output::OutputConfig,
    BarrageConfig,
};

// Re-export utilities
pub use domains::utils::{serde_duration, serde_duration_millis};
