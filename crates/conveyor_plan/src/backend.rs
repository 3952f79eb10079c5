//! Execution backend seam.
//!
//! The compiler needs three things from a backend: file-scheme
//! validation for input paths, a storage facade for staging, and an
//! `execute` entry point that receives the linearized plan. Scheduling,
//! retries, provisioning, and result collection are the backend's
//! problem, not the compiler's; the local backend here validates and
//! stages but deliberately does not run anything.

use crate::error::PlanResult;
use crate::job::{Job, JobKind};
use crate::resource::ResourceRegistry;
use conveyor_core::{alnum_token, url_scheme, CoreError, TOKEN_LEN};
use conveyor_fs::SyncFs;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Options for one `run` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOpts {
    /// Validate and order the graph but execute nothing
    pub dry_run: bool,
    /// Emit verbose progress output
    pub verbose: bool,
    /// Delete scratch directories when execution finishes
    pub delete_scratch_on_exit: bool,
}

impl RunOpts {
    /// Create default options (no dry run, quiet, delete scratch)
    #[must_use]
    pub fn new() -> Self {
        Self {
            dry_run: false,
            verbose: false,
            delete_scratch_on_exit: true,
        }
    }

    /// Set dry-run mode
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set verbose mode
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the scratch cleanup policy
    #[must_use]
    pub fn with_delete_scratch_on_exit(mut self, delete: bool) -> Self {
        self.delete_scratch_on_exit = delete;
        self
    }
}

impl Default for RunOpts {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque handle returned by a backend for a submitted plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    /// Uid of the submitted batch
    pub batch_uid: String,
    /// Scratch directory the backend staged into
    pub scratch_dir: String,
    /// Number of jobs in the submitted plan
    pub job_count: usize,
}

/// The linearized plan handed to a backend.
pub struct ExecutionPlan<'a> {
    /// Uid of the batch being submitted
    pub batch_uid: &'a str,
    /// Jobs in execution order; every job's position is assigned
    pub jobs: Vec<&'a Job>,
    /// The batch's resource registry
    pub registry: &'a ResourceRegistry,
    /// Cancel the whole batch after this many job failures
    pub cancel_after_n_failures: Option<u32>,
}

/// An execution backend the compiler delegates finished plans to.
pub trait Backend {
    /// Check that the active storage can serve `path`'s scheme.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-scheme error otherwise.
    fn validate_file_scheme(&self, path: &str) -> PlanResult<()>;

    /// The storage facade used for staging
    fn fs(&self) -> &SyncFs;

    /// Whether this backend runs on the caller's machine. Local
    /// backends get scheme-less output destinations resolved to
    /// absolute paths.
    fn is_local(&self) -> bool {
        false
    }

    /// Receive the ordered plan. Must execute nothing in dry-run mode
    /// and return no handle; validation has already happened either
    /// way.
    ///
    /// # Errors
    ///
    /// Returns an error if staging or submission fails.
    fn execute(&self, plan: &ExecutionPlan<'_>, opts: &RunOpts) -> PlanResult<Option<RunHandle>>;
}

/// Backend that stages to the local filesystem.
pub struct LocalBackend {
    fs: SyncFs,
    scratch_root: String,
}

impl LocalBackend {
    /// Create a local backend with a fresh scratch root under the
    /// system temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage facade cannot start.
    pub fn new() -> PlanResult<Self> {
        let scratch_root = std::env::temp_dir()
            .join(format!("conveyor-{}", alnum_token(TOKEN_LEN)))
            .to_string_lossy()
            .into_owned();
        Self::with_scratch_root(scratch_root)
    }

    /// Create a local backend staging into `scratch_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage facade cannot start.
    pub fn with_scratch_root(scratch_root: impl Into<String>) -> PlanResult<Self> {
        Ok(Self {
            fs: SyncFs::local()?,
            scratch_root: scratch_root.into(),
        })
    }

    /// The scratch root this backend stages under
    #[must_use]
    pub fn scratch_root(&self) -> &str {
        &self.scratch_root
    }

    fn batch_scratch(&self, batch_uid: &str) -> String {
        format!("{}/{}", self.scratch_root.trim_end_matches('/'), batch_uid)
    }
}

impl Backend for LocalBackend {
    fn validate_file_scheme(&self, path: &str) -> PlanResult<()> {
        let scheme = url_scheme(path).unwrap_or("");
        if self.fs.supports_scheme(scheme) {
            Ok(())
        } else {
            Err(CoreError::UnsupportedScheme {
                scheme: scheme.to_string(),
                path: path.to_string(),
            }
            .into())
        }
    }

    fn fs(&self) -> &SyncFs {
        &self.fs
    }

    fn is_local(&self) -> bool {
        true
    }

    fn execute(&self, plan: &ExecutionPlan<'_>, opts: &RunOpts) -> PlanResult<Option<RunHandle>> {
        let scratch = self.batch_scratch(plan.batch_uid);

        if opts.dry_run {
            tracing::debug!(
                batch = plan.batch_uid,
                jobs = plan.jobs.len(),
                "dry run: plan validated, nothing executed"
            );
            return Ok(None);
        }

        // Stage serialized callables so job workers can fetch them.
        for job in &plan.jobs {
            if job.kind != JobKind::Callable {
                continue;
            }
            for (i, call) in job.calls.iter().enumerate() {
                let path = format!("{scratch}/functions/{}_{i}.bin", job.token);
                self.fs.write_bytes(&path, &call.payload)?;
            }
        }

        if opts.verbose {
            tracing::info!(
                batch = plan.batch_uid,
                jobs = plan.jobs.len(),
                scratch = scratch.as_str(),
                delete_scratch_on_exit = opts.delete_scratch_on_exit,
                "plan submitted"
            );
        }

        Ok(Some(RunHandle {
            batch_uid: plan.batch_uid.to_string(),
            scratch_dir: scratch,
            job_count: plan.jobs.len(),
        }))
    }
}

/// Backend wrapper for tests and tooling that records submissions.
pub struct RecordingBackend {
    inner: LocalBackend,
    submissions: std::sync::Mutex<Vec<usize>>,
}

impl RecordingBackend {
    /// Wrap a local backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner backend cannot start.
    pub fn new() -> PlanResult<Self> {
        Ok(Self {
            inner: LocalBackend::new()?,
            submissions: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Job counts of every non-dry-run submission received
    #[must_use]
    pub fn submissions(&self) -> Vec<usize> {
        self.submissions.lock().expect("submission lock").clone()
    }
}

impl Backend for RecordingBackend {
    fn validate_file_scheme(&self, path: &str) -> PlanResult<()> {
        self.inner.validate_file_scheme(path)
    }

    fn fs(&self) -> &SyncFs {
        self.inner.fs()
    }

    fn is_local(&self) -> bool {
        true
    }

    fn execute(&self, plan: &ExecutionPlan<'_>, opts: &RunOpts) -> PlanResult<Option<RunHandle>> {
        if !opts.dry_run {
            self.submissions
                .lock()
                .expect("submission lock")
                .push(plan.jobs.len());
        }
        self.inner.execute(plan, opts)
    }
}

// Arc-wrapped backends are themselves backends; batches can share one.
impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn validate_file_scheme(&self, path: &str) -> PlanResult<()> {
        (**self).validate_file_scheme(path)
    }

    fn fs(&self) -> &SyncFs {
        (**self).fs()
    }

    fn is_local(&self) -> bool {
        (**self).is_local()
    }

    fn execute(&self, plan: &ExecutionPlan<'_>, opts: &RunOpts) -> PlanResult<Option<RunHandle>> {
        (**self).execute(plan, opts)
    }
}
