pub mod job;
pub mod orchestrator;
pub mod pool;
pub mod registry;

pub use job::{Job, JobOutcome, JobStatus, QueryParameters};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use pool::WorkerPool;
pub use registry::JobRegistry;
