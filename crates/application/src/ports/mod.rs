mod pipeline_stage;
mod upstream_health_port;

pub use pipeline_stage::{PipelineStage, StageOutcome};
pub use upstream_health_port::{UpstreamHealthPort, UpstreamHealthSnapshot, UpstreamStatus};
