//! Job descriptors.
//!
//! A job is a declared unit of work: a unique token for scratch-path
//! naming, explicit predecessors, the resources its body mentions, and
//! execution settings forwarded opaquely to the backend. Dependency
//! inference from resource usage lives in the batch compiler, not here.

use conveyor_core::{JobId, ResourceUid};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// How a job's outputs are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// A shell command assembled from body fragments
    Command,
    /// A serialized callable invoked by the backend
    Callable,
}

/// One piece of a command body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    /// Literal text
    Text(String),
    /// A reference to a batch resource
    Resource(ResourceUid),
}

impl Fragment {
    /// Literal text fragment
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Resource reference fragment
    #[must_use]
    pub fn resource(uid: &ResourceUid) -> Self {
        Self::Resource(uid.clone())
    }
}

/// One invocation of a serialized callable (`Callable` jobs)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSpec {
    /// Opaque serialized callable; its structure belongs to the
    /// external serialization collaborator
    pub payload: Vec<u8>,
    /// Arguments passed by resource
    pub args: Vec<ResourceUid>,
    /// The minted result resource
    pub result: ResourceUid,
}

/// Execution parameters forwarded opaquely to the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecSettings {
    /// Container image
    pub image: Option<String>,
    /// CPU request, e.g. "1" or "500m"
    pub cpu: Option<String>,
    /// Memory request, e.g. "4Gi"
    pub memory: Option<String>,
    /// Storage request, e.g. "10Gi"
    pub storage: Option<String>,
    /// Kill the job after this many seconds
    pub timeout_secs: Option<u64>,
    /// Whether the job may run on spot instances
    pub spot: Option<bool>,
    /// Regions the job may run in
    pub regions: Option<Vec<String>>,
}

impl ExecSettings {
    /// Create empty settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container image
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the CPU request
    #[must_use]
    pub fn with_cpu(mut self, cpu: impl Into<String>) -> Self {
        self.cpu = Some(cpu.into());
        self
    }

    /// Set the memory request
    #[must_use]
    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = Some(memory.into());
        self
    }

    /// Set the storage request
    #[must_use]
    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the spot policy
    #[must_use]
    pub fn with_spot(mut self, spot: bool) -> Self {
        self.spot = Some(spot);
        self
    }

    /// Set the allowed regions
    #[must_use]
    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = Some(regions);
        self
    }

    /// Fill every unset field from `defaults`.
    pub fn apply_defaults(&mut self, defaults: &ExecSettings) {
        if self.image.is_none() {
            self.image = defaults.image.clone();
        }
        if self.cpu.is_none() {
            self.cpu = defaults.cpu.clone();
        }
        if self.memory.is_none() {
            self.memory = defaults.memory.clone();
        }
        if self.storage.is_none() {
            self.storage = defaults.storage.clone();
        }
        if self.timeout_secs.is_none() {
            self.timeout_secs = defaults.timeout_secs;
        }
        if self.spot.is_none() {
            self.spot = defaults.spot;
        }
        if self.regions.is_none() {
            self.regions = defaults.regions.clone();
        }
    }
}

/// A declared unit of work in a batch.
#[derive(Debug, Clone)]
pub struct Job {
    /// Handle into the batch's job list
    pub id: JobId,
    /// Unique token used in scratch-path naming
    pub token: String,
    /// Command- or callable-based
    pub kind: JobKind,
    /// Optional display name, matched by `select_jobs`
    pub name: Option<String>,
    /// Additional attributes ('name' is reserved)
    pub attributes: IndexMap<String, String>,
    /// Explicit predecessor jobs
    pub dependencies: IndexSet<JobId>,
    /// Resources referenced while the body was being constructed
    pub mentioned: IndexSet<ResourceUid>,
    /// Symbolic name -> declared resource, for binding-error messages
    pub symbols: IndexMap<String, ResourceUid>,
    /// Command body fragments (`Command` kind)
    pub command: Vec<Fragment>,
    /// Callable invocations (`Callable` kind)
    pub calls: Vec<CallSpec>,
    /// Execution parameters
    pub settings: ExecSettings,
    /// 1-based position assigned by linearization
    pub position: Option<usize>,
}

impl Job {
    /// Create a new job descriptor
    #[must_use]
    pub fn new(
        id: JobId,
        token: String,
        kind: JobKind,
        name: Option<String>,
        attributes: IndexMap<String, String>,
    ) -> Self {
        Self {
            id,
            token,
            kind,
            name,
            attributes,
            dependencies: IndexSet::new(),
            mentioned: IndexSet::new(),
            symbols: IndexMap::new(),
            command: Vec::new(),
            calls: Vec::new(),
            settings: ExecSettings::new(),
            position: None,
        }
    }

    /// Scratch directory for this job under `base`
    #[must_use]
    pub fn scratch_dir(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.token)
    }

    /// The symbolic name a resource was declared under, if any
    #[must_use]
    pub fn symbol_for(&self, uid: &ResourceUid) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, v)| *v == uid)
            .map(|(k, _)| k.as_str())
    }

    /// Whether this job's body mentioned `uid`
    #[must_use]
    pub fn mentions(&self, uid: &ResourceUid) -> bool {
        self.mentioned.contains(uid)
    }
}
