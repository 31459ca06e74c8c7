pub mod emitter;
pub mod metrics;
pub mod types;

pub use emitter::ForwardEventEmitter;
pub use metrics::{UpstreamCounters, UpstreamMetrics};
pub use types::{ExchangeEvent, ExchangeOutcome, ForwardEvent, HealthTransition};
