// Core library for Orgspace
// Request/response descriptors, middleware, errors, and the runtime plumbing
// (logging, health, shutdown) shared by the tenancy layer

pub mod error;
pub mod extensions;
pub mod health;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod shutdown;

// Re-export commonly used types
pub use error::*;
pub use extensions::Extensions;
pub use health::{HealthCheckResult, HealthIndicator, HealthReport, HealthService, HealthStatus};
pub use http::*;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use middleware::*;
pub use shutdown::{ShutdownHook, ShutdownManager, ShutdownReport};
