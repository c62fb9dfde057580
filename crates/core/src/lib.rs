pub mod config;
pub mod error;
pub mod repo;
pub mod span;
pub mod work;

pub use config::{DaemonConfig, LogFormat};
pub use error::{Error, Result};
pub use repo::{RepoDescriptor, RepoId, RepoState, RunStatus};
pub use span::{EmbeddingRecord, EnrichmentRecord, EvidenceEntry, FileRecord, GraphEdge, SpanRecord, span_hash};
pub use work::{
  ControlEvents, EmbeddingWorkItem, EnrichmentWorkItem, Job, JobResult, LedgerMetrics, LedgerRecord, make_job_id,
};
