pub mod job_runner;
pub mod lifecycle;
pub mod scheduler;
pub mod worker_pool;

pub use job_runner::{InProcessRunner, JobRunner, SubprocessRunner};
pub use lifecycle::{Daemon, LifecycleError};
pub use scheduler::{Scheduler, TickOutcome};
pub use worker_pool::WorkerPool;
