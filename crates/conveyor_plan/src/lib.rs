//! Conveyor Planner
//!
//! Client-side compiler for a batch-of-jobs execution plan: callers
//! declaratively build a DAG of jobs connected by resources, the batch
//! validates the graph and assigns a deterministic execution order, and
//! the ordered plan is handed to an execution backend this crate does
//! not implement.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod batch;
pub mod error;
pub mod job;
pub mod resource;
pub mod template;

// Re-exports
pub use backend::{Backend, ExecutionPlan, LocalBackend, RecordingBackend, RunHandle, RunOpts};
pub use batch::{Batch, BatchConfig, BatchFactory};
pub use error::{PlanError, PlanResult};
pub use job::{CallSpec, ExecSettings, Fragment, Job, JobKind};
pub use resource::{Resource, ResourceRegistry};
pub use template::{expand, TemplateVars};
