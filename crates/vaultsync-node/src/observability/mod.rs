//! # Observability
//!
//! - Structured logging with `tracing`, pretty or JSON
//! - Prometheus metrics for HTTP traffic and vault operations
//! - Request id propagation through `x-request-id`

mod logging;
mod metrics;
pub mod middleware;

pub use logging::init_logging;
pub use metrics::{MetricsState, METRICS};
pub use middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
