//! The batch: one build-and-submit unit containing a job graph and its
//! resources.
//!
//! A batch is mutated only by its own factory methods during a single
//! build phase; `run` linearizes the graph and a real (non-dry-run)
//! submission closes the batch for good. Dependency
//! edges accumulate two ways: explicitly via `depends_on`, and
//! implicitly whenever a job body references a resource produced by a
//! different job - provenance lookup happens here, in the compiler, so
//! job variants carry no inference obligation of their own.

use crate::backend::{Backend, ExecutionPlan, RunHandle, RunOpts};
use crate::error::{PlanError, PlanResult};
use crate::job::{CallSpec, ExecSettings, Fragment, Job, JobKind};
use crate::resource::{Resource, ResourceRegistry};
use conveyor_core::{alnum_token, basename, strip_query, url_scheme, BatchCounter, JobId,
    ResourceUid, TOKEN_LEN};
use indexmap::{IndexMap, IndexSet};
use regex::Regex;

/// Root of the per-job scratch namespace inside the execution sandbox
const IO_ROOT: &str = "/io";

/// Draw tokens from `draw` until one is absent from `used`.
///
/// Re-draws indefinitely; the caller's token space must be large
/// relative to the used set.
fn draw_unique_token(used: &IndexSet<String>, mut draw: impl FnMut() -> String) -> String {
    loop {
        let token = draw();
        if !used.contains(&token) {
            return token;
        }
    }
}

/// Batch-level settings and per-job defaults.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Batch name
    pub name: Option<String>,
    /// Additional attributes ('name' is reserved)
    pub attributes: IndexMap<String, String>,
    /// Defaults applied to every job's unset execution settings
    pub defaults: ExecSettings,
    /// Cancel the batch after this many job failures
    pub cancel_after_n_failures: Option<u32>,
}

impl BatchConfig {
    /// Create an empty config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the per-job defaults
    #[must_use]
    pub fn with_defaults(mut self, defaults: ExecSettings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the failure-cancellation threshold
    #[must_use]
    pub fn with_cancel_after_n_failures(mut self, n: u32) -> Self {
        self.cancel_after_n_failures = Some(n);
        self
    }
}

/// Factory owning the uid counter for the batches it constructs.
#[derive(Debug, Default)]
pub struct BatchFactory {
    counter: BatchCounter,
}

impl BatchFactory {
    /// Create a new factory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a batch with the next counter-minted uid.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config carries a reserved
    /// attribute.
    pub fn create(&mut self, config: BatchConfig, backend: Box<dyn Backend>) -> PlanResult<Batch> {
        Batch::with_uid(self.counter.next_uid(), config, backend)
    }
}

/// One build-and-submit unit: an insertion-ordered job list, the
/// resource registry, and the set of graph inputs.
pub struct Batch {
    uid: String,
    name: Option<String>,
    attributes: IndexMap<String, String>,
    defaults: ExecSettings,
    cancel_after_n_failures: Option<u32>,
    backend: Box<dyn Backend>,
    jobs: Vec<Job>,
    registry: ResourceRegistry,
    inputs: IndexSet<ResourceUid>,
    job_tokens: IndexSet<String>,
    schedule: Vec<JobId>,
    frozen: bool,
}

impl Batch {
    /// Construct a batch with an explicit uid.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the config carries a reserved
    /// attribute.
    pub fn with_uid(
        uid: impl Into<String>,
        config: BatchConfig,
        backend: Box<dyn Backend>,
    ) -> PlanResult<Self> {
        if config.attributes.contains_key("name") {
            return Err(PlanError::Config {
                reason: "'name' is not a valid attribute; use the name argument instead"
                    .to_string(),
            });
        }
        Ok(Self {
            uid: uid.into(),
            name: config.name,
            attributes: config.attributes,
            defaults: config.defaults,
            cancel_after_n_failures: config.cancel_after_n_failures,
            backend,
            jobs: Vec::new(),
            registry: ResourceRegistry::new(),
            inputs: IndexSet::new(),
            job_tokens: IndexSet::new(),
            schedule: Vec::new(),
            frozen: false,
        })
    }

    /// The batch uid
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The batch name
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// All jobs in insertion order
    #[must_use]
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// The resource registry
    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Resources that are graph inputs
    #[must_use]
    pub fn inputs(&self) -> &IndexSet<ResourceUid> {
        &self.inputs
    }

    /// Execution order assigned by the last `run`; empty before it
    #[must_use]
    pub fn schedule(&self) -> &[JobId] {
        &self.schedule
    }

    /// Whether the batch has been submitted for real; dry runs do not
    /// freeze it
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Look up a job.
    ///
    /// # Errors
    ///
    /// Returns an unknown-job error for a foreign handle.
    pub fn job(&self, id: JobId) -> PlanResult<&Job> {
        self.jobs.get(id.index()).ok_or_else(|| PlanError::UnknownJob {
            id: id.to_string(),
        })
    }

    fn job_mut(&mut self, id: JobId) -> PlanResult<&mut Job> {
        self.jobs
            .get_mut(id.index())
            .ok_or_else(|| PlanError::UnknownJob { id: id.to_string() })
    }

    /// Mutable execution settings of a job; defaults are already
    /// applied, caller values override them.
    ///
    /// # Errors
    ///
    /// Returns an unknown-job error for a foreign handle.
    pub fn settings_mut(&mut self, id: JobId) -> PlanResult<&mut ExecSettings> {
        Ok(&mut self.job_mut(id)?.settings)
    }

    /// Mint a job token absent from this batch's used-token set.
    ///
    /// Scratch paths are derived from tokens, so a duplicate would
    /// alias two jobs' scratch space.
    fn unique_job_token(&self) -> String {
        draw_unique_token(&self.job_tokens, || alnum_token(TOKEN_LEN))
    }

    fn new_job_of_kind(
        &mut self,
        kind: JobKind,
        name: Option<&str>,
        attributes: IndexMap<String, String>,
    ) -> PlanResult<JobId> {
        if attributes.contains_key("name") {
            return Err(PlanError::Config {
                reason: "'name' is not a valid attribute; use the name argument instead"
                    .to_string(),
            });
        }
        let token = self.unique_job_token();
        self.job_tokens.insert(token.clone());

        let id = JobId::from_index(self.jobs.len() as u32);
        let mut job = Job::new(id, token, kind, name.map(str::to_string), attributes);
        job.settings.apply_defaults(&self.defaults);
        self.jobs.push(job);
        Ok(id)
    }

    /// Create a command job with batch defaults applied.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on a reserved attribute.
    pub fn new_job(
        &mut self,
        name: Option<&str>,
        attributes: IndexMap<String, String>,
    ) -> PlanResult<JobId> {
        self.new_job_of_kind(JobKind::Command, name, attributes)
    }

    /// Create a callable job with batch defaults applied.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on a reserved attribute.
    pub fn new_callable_job(
        &mut self,
        name: Option<&str>,
        attributes: IndexMap<String, String>,
    ) -> PlanResult<JobId> {
        self.new_job_of_kind(JobKind::Callable, name, attributes)
    }

    /// Register an input file for the graph.
    ///
    /// The staging name is `{root}/{basename}` with any query/credential
    /// component stripped so secrets never reach an on-disk name.
    ///
    /// # Errors
    ///
    /// Fails if the active backend does not serve the path's scheme.
    pub fn read_input(&mut self, path: &str) -> PlanResult<ResourceUid> {
        let root = alnum_token(TOKEN_LEN);
        self.input_with_root(path, &root)
    }

    fn input_with_root(&mut self, path: &str, root: &str) -> PlanResult<ResourceUid> {
        self.backend.validate_file_scheme(path)?;
        let leaf = basename(strip_query(path));
        let staging_name = format!("{root}/{leaf}");
        let uid = self.registry.new_input_file(staging_name, path.to_string());
        self.inputs.insert(uid.clone());
        Ok(uid)
    }

    /// Register a group of named input files sharing one fresh root.
    ///
    /// # Errors
    ///
    /// Fails if any path's scheme is unsupported; nothing is registered
    /// in that case.
    pub fn read_input_group(
        &mut self,
        pairs: IndexMap<String, String>,
    ) -> PlanResult<ResourceUid> {
        for path in pairs.values() {
            self.backend.validate_file_scheme(path)?;
        }
        let root = alnum_token(TOKEN_LEN);
        let mut members = IndexMap::new();
        for (identifier, path) in &pairs {
            let uid = self.input_with_root(path, &root)?;
            members.insert(identifier.clone(), uid);
        }
        Ok(self.registry.new_group_of(None, root, members))
    }

    /// Record one resource reference from `job`'s body: mention it if
    /// this job produces it, otherwise depend on its producer.
    fn reference_resource(&mut self, job: JobId, uid: &ResourceUid) -> PlanResult<()> {
        let producer = self
            .registry
            .get(uid)
            .ok_or_else(|| PlanError::UnknownResource {
                uid: uid.to_string(),
            })?
            .producer();

        match producer {
            Some(p) if p == job => {
                self.job_mut(job)?.mentioned.insert(uid.clone());
            }
            Some(p) => {
                self.job_mut(job)?.dependencies.insert(p);
            }
            None => {} // graph input, nothing to wire
        }
        Ok(())
    }

    /// Append fragments to a command job's body.
    ///
    /// Resource references are wired as they are seen: same-producer
    /// resources become mentions, foreign-producer resources become
    /// dependency edges.
    ///
    /// # Errors
    ///
    /// Fails on a callable job or an unknown resource reference.
    pub fn command(&mut self, job: JobId, fragments: Vec<Fragment>) -> PlanResult<()> {
        if self.job(job)?.kind != JobKind::Command {
            return Err(PlanError::Config {
                reason: format!("{job} is a callable job; use 'call' to build its body"),
            });
        }
        for fragment in &fragments {
            if let Fragment::Resource(uid) = fragment {
                let uid = uid.clone();
                self.reference_resource(job, &uid)?;
            }
        }
        self.job_mut(job)?.command.extend(fragments);
        Ok(())
    }

    /// Record one callable invocation and mint its result resource.
    ///
    /// The payload is an opaque serialized callable; argument resources
    /// are wired exactly like command references.
    ///
    /// # Errors
    ///
    /// Fails on a command job or an unknown argument resource.
    pub fn call(
        &mut self,
        job: JobId,
        payload: Vec<u8>,
        args: Vec<ResourceUid>,
    ) -> PlanResult<ResourceUid> {
        if self.job(job)?.kind != JobKind::Callable {
            return Err(PlanError::Config {
                reason: format!("{job} is a command job; use 'command' to build its body"),
            });
        }
        for arg in &args {
            self.reference_resource(job, arg)?;
        }

        let result = self.registry.new_call_result(job, None);
        let j = self.job_mut(job)?;
        j.mentioned.insert(result.clone());
        let symbol = format!("result_{}", j.calls.len());
        j.symbols.insert(symbol, result.clone());
        j.calls.push(CallSpec {
            payload,
            args,
            result: result.clone(),
        });
        Ok(result)
    }

    /// Declare (or fetch) the job-produced file bound to `symbol`.
    ///
    /// Declaration alone does not mention the resource; only use in the
    /// job's body does.
    ///
    /// # Errors
    ///
    /// Returns an unknown-job error for a foreign handle.
    pub fn declare_output(&mut self, job: JobId, symbol: &str) -> PlanResult<ResourceUid> {
        if let Some(existing) = self.job(job)?.symbols.get(symbol) {
            return Ok(existing.clone());
        }
        let uid = self.registry.new_job_file(job, None);
        self.job_mut(job)?
            .symbols
            .insert(symbol.to_string(), uid.clone());
        Ok(uid)
    }

    /// Declare a job-produced resource group bound to `symbol`.
    ///
    /// Member values are literal templates over `{root}` and
    /// `{scratch}`, expanded eagerly against the job's scratch path.
    ///
    /// # Errors
    ///
    /// Fails with a descriptive error on a non-literal template.
    pub fn declare_group(
        &mut self,
        job: JobId,
        symbol: &str,
        mappings: IndexMap<String, String>,
        root: Option<String>,
    ) -> PlanResult<ResourceUid> {
        let scratch = self.job(job)?.scratch_dir(IO_ROOT);
        let root = root.unwrap_or_else(|| alnum_token(TOKEN_LEN));
        let uid = self
            .registry
            .new_group_from_templates(job, root, &scratch, &mappings)?;

        // Bind the group and its members so binding errors can name them.
        let member_symbols: Vec<(String, ResourceUid)> = {
            let Some(Resource::Group(group)) = self.registry.get(&uid) else {
                return Err(PlanError::Internal {
                    message: format!("freshly minted group {uid} missing from registry"),
                });
            };
            group
                .members
                .iter()
                .map(|(name, member)| (format!("{symbol}.{name}"), member.clone()))
                .collect()
        };
        let j = self.job_mut(job)?;
        j.symbols.insert(symbol.to_string(), uid.clone());
        for (name, member) in member_symbols {
            j.symbols.insert(name, member);
        }
        Ok(uid)
    }

    /// Set the extension suffix on a declared job file.
    ///
    /// # Errors
    ///
    /// Fails if `uid` does not name a job file in this batch.
    pub fn add_extension(&mut self, uid: &ResourceUid, extension: &str) -> PlanResult<()> {
        self.registry.add_extension(uid, extension)
    }

    /// Add an explicit dependency edge.
    ///
    /// # Errors
    ///
    /// Returns an unknown-job error for a foreign handle.
    pub fn depends_on(&mut self, job: JobId, dependency: JobId) -> PlanResult<()> {
        self.job(dependency)?;
        self.job_mut(job)?.dependencies.insert(dependency);
        Ok(())
    }

    /// Record a destination for `resource`, to be fulfilled by the
    /// backend after the graph executes.
    ///
    /// A job-produced resource is eligible only once its producing job
    /// has mentioned it; inputs are always eligible. On a local backend
    /// a scheme-less destination resolves to an absolute path.
    ///
    /// # Errors
    ///
    /// Fails with a binding error naming the offending symbol, or an
    /// unknown-resource error for a foreign identifier.
    pub fn write_output(&mut self, resource: &ResourceUid, dest: &str) -> PlanResult<()> {
        let found = self
            .registry
            .get(resource)
            .ok_or_else(|| PlanError::UnknownResource {
                uid: resource.to_string(),
            })?;

        match found {
            Resource::JobFile(f) => {
                let producer = self.job(f.producer)?;
                if !producer.mentions(resource) {
                    let symbol = producer
                        .symbol_for(resource)
                        .unwrap_or(resource.as_str())
                        .to_string();
                    return Err(PlanError::UndefinedCommandResource { symbol });
                }
            }
            Resource::CallResult(r) => {
                let producer = self.job(r.producer)?;
                if !producer.mentions(resource) {
                    let symbol = producer
                        .symbol_for(resource)
                        .unwrap_or(resource.as_str())
                        .to_string();
                    return Err(PlanError::UnboundCallResult { symbol });
                }
            }
            Resource::InputFile(_) | Resource::Group(_) => {}
        }

        let dest = self.resolve_dest(dest)?;
        self.registry
            .get_mut(resource)
            .ok_or_else(|| PlanError::Internal {
                message: format!("resource {resource} vanished from registry"),
            })?
            .add_output_path(dest);
        Ok(())
    }

    /// Resolve scheme-less destinations to absolute paths on local
    /// backends; everything else passes through untouched.
    fn resolve_dest(&self, dest: &str) -> PlanResult<String> {
        if !self.backend.is_local() || url_scheme(dest).is_some() {
            return Ok(dest.to_string());
        }
        let expanded = match dest.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{rest}", home.trim_end_matches('/')),
                Err(_) => dest.to_string(),
            },
            None => dest.to_string(),
        };
        if expanded.starts_with('/') {
            return Ok(expanded);
        }
        let cwd = std::env::current_dir().map_err(|e| PlanError::Internal {
            message: format!("cannot resolve working directory: {e}"),
        })?;
        Ok(cwd.join(expanded).to_string_lossy().into_owned())
    }

    /// Select jobs whose name matches `pattern` at its start, in batch
    /// insertion order. No match is not an error.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on an invalid pattern.
    pub fn select_jobs(&self, pattern: &str) -> PlanResult<Vec<JobId>> {
        let re = Regex::new(pattern).map_err(|e| PlanError::Config {
            reason: format!("invalid job pattern '{pattern}': {e}"),
        })?;
        Ok(self
            .jobs
            .iter()
            .filter(|job| {
                job.name
                    .as_deref()
                    .and_then(|name| re.find(name))
                    .is_some_and(|m| m.start() == 0)
            })
            .map(|job| job.id)
            .collect())
    }

    /// Depth-first postorder over the job list in insertion order.
    ///
    /// Jobs are marked visited before their dependencies are descended,
    /// so the traversal terminates on cyclic graphs; a cycle then shows
    /// up afterwards as a position inversion on one of its edges.
    fn linearize(&self) -> Vec<JobId> {
        let mut seen = vec![false; self.jobs.len()];
        let mut order = Vec::with_capacity(self.jobs.len());
        let mut stack: Vec<(JobId, usize)> = Vec::new();

        for index in 0..self.jobs.len() {
            let start = JobId::from_index(index as u32);
            if seen[start.index()] {
                continue;
            }
            seen[start.index()] = true;
            stack.push((start, 0));
            while let Some((job, next_dep)) = stack.pop() {
                let deps = &self.jobs[job.index()].dependencies;
                if let Some(&dep) = deps.get_index(next_dep) {
                    stack.push((job, next_dep + 1));
                    if !seen[dep.index()] {
                        seen[dep.index()] = true;
                        stack.push((dep, 0));
                    }
                } else {
                    order.push(job);
                }
            }
        }
        order
    }

    fn position(&self, id: JobId) -> PlanResult<usize> {
        self.jobs[id.index()]
            .position
            .ok_or_else(|| PlanError::Internal {
                message: format!("{id} has no position after linearization"),
            })
    }

    fn display_name(&self, id: JobId) -> String {
        let job = &self.jobs[id.index()];
        job.name.clone().unwrap_or_else(|| job.token.clone())
    }

    /// Linearize the graph and hand the ordered plan to the backend.
    ///
    /// Assigns every job a 1-based position such that, on an acyclic
    /// graph, each job's position strictly exceeds those of all its
    /// dependencies. A dry run performs the same validation but the
    /// backend executes nothing, no handle is returned, and the batch
    /// stays open for a later real submission. Only a completed
    /// non-dry-run submission freezes the batch.
    ///
    /// # Errors
    ///
    /// Fails with a cycle-detected error before any backend delegation
    /// if the graph has a dependency cycle, or a frozen error on a
    /// submission after a completed real one.
    pub fn run(&mut self, opts: &RunOpts) -> PlanResult<Option<RunHandle>> {
        if self.frozen {
            return Err(PlanError::Frozen {
                uid: self.uid.clone(),
            });
        }

        let order = self.linearize();
        if order.len() != self.jobs.len() {
            return Err(PlanError::Internal {
                message: format!(
                    "linearization produced {} jobs from {}",
                    order.len(),
                    self.jobs.len()
                ),
            });
        }

        for (index, id) in order.iter().enumerate() {
            self.jobs[id.index()].position = Some(index + 1);
        }
        for id in &order {
            let own = self.position(*id)?;
            for dep in self.jobs[id.index()].dependencies.clone() {
                if self.position(dep)? >= own {
                    return Err(PlanError::CycleDetected {
                        job: self.display_name(*id),
                        dependency: self.display_name(dep),
                    });
                }
            }
        }

        self.schedule = order;
        tracing::debug!(
            batch = self.uid.as_str(),
            jobs = self.jobs.len(),
            dry_run = opts.dry_run,
            "graph linearized"
        );

        let handle = {
            let plan = ExecutionPlan {
                batch_uid: &self.uid,
                jobs: self
                    .schedule
                    .iter()
                    .map(|id| &self.jobs[id.index()])
                    .collect(),
                registry: &self.registry,
                cancel_after_n_failures: self.cancel_after_n_failures,
            };
            self.backend.execute(&plan, opts)?
        };
        if !opts.dry_run {
            self.frozen = true;
        }
        Ok(handle)
    }
}

impl std::fmt::Display for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalBackend, RecordingBackend};
    use std::sync::Arc;

    fn local_batch() -> Batch {
        let backend = Box::new(LocalBackend::new().unwrap());
        BatchFactory::new()
            .create(BatchConfig::new(), backend)
            .unwrap()
    }

    fn attrs(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_reserved_name_attribute_rejected() {
        let mut batch = local_batch();
        let err = batch
            .new_job(Some("j"), attrs(&[("name", "sneaky")]))
            .unwrap_err();
        assert!(matches!(err, PlanError::Config { .. }));
    }

    #[test]
    fn test_reserved_name_attribute_rejected_on_batch() {
        let backend = Box::new(LocalBackend::new().unwrap());
        let config = BatchConfig::new().with_attribute("name", "sneaky");
        let err = Batch::with_uid("b", config, backend).err().unwrap();
        assert!(matches!(err, PlanError::Config { .. }));
    }

    #[test]
    fn test_job_tokens_unique() {
        let mut batch = local_batch();
        let mut tokens = std::collections::HashSet::new();
        for _ in 0..50 {
            let id = batch.new_job(None, IndexMap::new()).unwrap();
            assert!(tokens.insert(batch.job(id).unwrap().token.clone()));
        }
    }

    #[test]
    fn test_token_draw_skips_collisions() {
        let mut used = IndexSet::new();
        used.insert("taken".to_string());
        // Draws pop from the back: "taken" collides, "fresh" lands.
        let mut draws = vec!["fresh".to_string(), "taken".to_string()];
        let token = draw_unique_token(&used, || draws.pop().unwrap());
        assert_eq!(token, "fresh");
        assert!(draws.is_empty());
    }

    #[test]
    fn test_token_draw_exhausts_short_space_without_repeats() {
        // Length-1 tokens give a 62-element space; collecting all 62
        // forces the re-draw branch many times over.
        let mut used = IndexSet::new();
        for _ in 0..62 {
            let token = draw_unique_token(&used, || alnum_token(1));
            assert!(used.insert(token));
        }
        assert_eq!(used.len(), 62);
    }

    #[test]
    fn test_defaults_applied_only_when_unset() {
        let backend = Box::new(LocalBackend::new().unwrap());
        let config = BatchConfig::new()
            .with_defaults(ExecSettings::new().with_cpu("1").with_memory("2Gi"));
        let mut batch = BatchFactory::new().create(config, backend).unwrap();

        let id = batch.new_job(None, IndexMap::new()).unwrap();
        assert_eq!(batch.job(id).unwrap().settings.cpu.as_deref(), Some("1"));

        batch.settings_mut(id).unwrap().cpu = Some("8".to_string());
        assert_eq!(batch.job(id).unwrap().settings.cpu.as_deref(), Some("8"));
        assert_eq!(
            batch.job(id).unwrap().settings.memory.as_deref(),
            Some("2Gi")
        );
    }

    #[test]
    fn test_read_input_strips_query_and_derives_leaf() {
        let mut batch = local_batch();
        let uid = batch.read_input("/data/samples/example.vcf?sig=SECRET").unwrap();
        let Some(Resource::InputFile(f)) = batch.registry().get(&uid) else {
            panic!("expected input file");
        };
        assert!(f.staging_name.ends_with("/example.vcf"));
        assert!(!f.staging_name.contains("SECRET"));
        assert!(batch.inputs().contains(&uid));
    }

    #[test]
    fn test_read_input_rejects_unsupported_scheme() {
        let mut batch = local_batch();
        let err = batch.read_input("gs://bucket/file.txt").unwrap_err();
        assert!(err.to_string().contains("gs"));
    }

    #[test]
    fn test_read_input_group_shares_root() {
        let mut batch = local_batch();
        let mut pairs = IndexMap::new();
        pairs.insert("bed".to_string(), "/data/example.bed".to_string());
        pairs.insert("bim".to_string(), "/data/example.bim".to_string());
        let uid = batch.read_input_group(pairs).unwrap();

        let Some(Resource::Group(group)) = batch.registry().get(&uid) else {
            panic!("expected group");
        };
        assert_eq!(group.members.len(), 2);
        assert!(group.producer.is_none());
        for member in group.members.values() {
            let Some(Resource::InputFile(f)) = batch.registry().get(member) else {
                panic!("expected input member");
            };
            assert!(f.staging_name.starts_with(&format!("{}/", group.root)));
        }
    }

    #[test]
    fn test_command_mentions_own_output() {
        let mut batch = local_batch();
        let j = batch.new_job(None, IndexMap::new()).unwrap();
        let out = batch.declare_output(j, "ofile").unwrap();
        assert!(!batch.job(j).unwrap().mentions(&out));

        batch
            .command(j, vec![Fragment::text("echo hi > "), Fragment::resource(&out)])
            .unwrap();
        assert!(batch.job(j).unwrap().mentions(&out));
    }

    #[test]
    fn test_command_on_foreign_resource_adds_dependency() {
        let mut batch = local_batch();
        let j1 = batch.new_job(Some("producer"), IndexMap::new()).unwrap();
        let out = batch.declare_output(j1, "ofile").unwrap();
        batch
            .command(j1, vec![Fragment::text("date > "), Fragment::resource(&out)])
            .unwrap();

        let j2 = batch.new_job(Some("consumer"), IndexMap::new()).unwrap();
        batch
            .command(j2, vec![Fragment::text("cat "), Fragment::resource(&out)])
            .unwrap();

        assert!(batch.job(j2).unwrap().dependencies.contains(&j1));
        // Consumption does not mention: mentions belong to the producer.
        assert!(!batch.job(j2).unwrap().mentions(&out));
    }

    #[test]
    fn test_write_output_unmentioned_fails_with_symbol() {
        let mut batch = local_batch();
        let j = batch.new_job(None, IndexMap::new()).unwrap();
        let out = batch.declare_output(j, "ofile").unwrap();

        let err = batch.write_output(&out, "/tmp/out.txt").unwrap_err();
        match err {
            PlanError::UndefinedCommandResource { symbol } => assert_eq!(symbol, "ofile"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_write_output_mentioned_succeeds() {
        let mut batch = local_batch();
        let j = batch.new_job(None, IndexMap::new()).unwrap();
        let out = batch.declare_output(j, "ofile").unwrap();
        batch
            .command(j, vec![Fragment::text("touch "), Fragment::resource(&out)])
            .unwrap();

        batch.write_output(&out, "/tmp/out.txt").unwrap();
        assert_eq!(
            batch.registry().get(&out).unwrap().output_paths(),
            ["/tmp/out.txt"]
        );
    }

    #[test]
    fn test_write_output_input_always_eligible() {
        let mut batch = local_batch();
        let input = batch.read_input("/data/in.txt").unwrap();
        batch.write_output(&input, "/tmp/copy.txt").unwrap();
        assert_eq!(
            batch.registry().get(&input).unwrap().output_paths(),
            ["/tmp/copy.txt"]
        );
    }

    #[test]
    fn test_write_output_unknown_resource() {
        let mut batch = local_batch();
        let foreign = ResourceUid::from_token("zzzzz");
        let err = batch.write_output(&foreign, "/tmp/x").unwrap_err();
        assert!(matches!(err, PlanError::UnknownResource { .. }));
    }

    #[test]
    fn test_write_output_relative_dest_resolved_on_local() {
        let mut batch = local_batch();
        let input = batch.read_input("/data/in.txt").unwrap();
        batch.write_output(&input, "out/copy.txt").unwrap();

        let paths = batch.registry().get(&input).unwrap().output_paths();
        assert!(paths[0].starts_with('/'));
        assert!(paths[0].ends_with("/out/copy.txt"));
    }

    #[test]
    fn test_call_result_binding() {
        let mut batch = local_batch();
        let j = batch.new_callable_job(None, IndexMap::new()).unwrap();
        let result = batch.call(j, b"blob".to_vec(), Vec::new()).unwrap();
        assert!(batch.job(j).unwrap().mentions(&result));
        batch.write_output(&result, "/tmp/result.bin").unwrap();
    }

    #[test]
    fn test_call_on_command_job_rejected() {
        let mut batch = local_batch();
        let j = batch.new_job(None, IndexMap::new()).unwrap();
        let err = batch.call(j, Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, PlanError::Config { .. }));
    }

    #[test]
    fn test_declare_output_idempotent_per_symbol() {
        let mut batch = local_batch();
        let j = batch.new_job(None, IndexMap::new()).unwrap();
        let a = batch.declare_output(j, "ofile").unwrap();
        let b = batch.declare_output(j, "ofile").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_declare_group_binds_member_symbols() {
        let mut batch = local_batch();
        let j = batch.new_job(None, IndexMap::new()).unwrap();
        let mut mappings = IndexMap::new();
        mappings.insert("bam".to_string(), "{root}.bam".to_string());
        let group = batch
            .declare_group(j, "aligned", mappings, Some("r00t1".to_string()))
            .unwrap();

        let Some(Resource::Group(g)) = batch.registry().get(&group) else {
            panic!("expected group");
        };
        let member = g.members.get("bam").unwrap().clone();
        let err = batch.write_output(&member, "/tmp/x.bam").unwrap_err();
        match err {
            PlanError::UndefinedCommandResource { symbol } => {
                assert_eq!(symbol, "aligned.bam");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_select_jobs_prefix_match_in_order() {
        let mut batch = local_batch();
        let a = batch.new_job(Some("qc-reads"), IndexMap::new()).unwrap();
        let _ = batch.new_job(Some("align"), IndexMap::new()).unwrap();
        let c = batch.new_job(Some("qc-variants"), IndexMap::new()).unwrap();
        let _ = batch.new_job(None, IndexMap::new()).unwrap();

        assert_eq!(batch.select_jobs("qc").unwrap(), vec![a, c]);
        assert!(batch.select_jobs("zzz").unwrap().is_empty());
        // Matches must start at the beginning of the name.
        assert!(batch.select_jobs("reads").unwrap().is_empty());
    }

    #[test]
    fn test_select_jobs_invalid_pattern() {
        let batch = local_batch();
        let err = batch.select_jobs("(unclosed").unwrap_err();
        assert!(matches!(err, PlanError::Config { .. }));
    }

    #[test]
    fn test_dry_run_orders_and_skips_backend() {
        let recorder = Arc::new(RecordingBackend::new().unwrap());
        let mut batch = BatchFactory::new()
            .create(BatchConfig::new(), Box::new(Arc::clone(&recorder)))
            .unwrap();

        let j1 = batch.new_job(Some("j1"), IndexMap::new()).unwrap();
        let r = batch.declare_output(j1, "ofile").unwrap();
        batch
            .command(j1, vec![Fragment::text("date > "), Fragment::resource(&r)])
            .unwrap();
        let j2 = batch.new_job(Some("j2"), IndexMap::new()).unwrap();
        batch.depends_on(j2, j1).unwrap();
        batch
            .command(j2, vec![Fragment::text("cat "), Fragment::resource(&r)])
            .unwrap();

        let handle = batch.run(&RunOpts::new().with_dry_run(true)).unwrap();
        assert!(handle.is_none());
        assert_eq!(batch.job(j1).unwrap().position, Some(1));
        assert_eq!(batch.job(j2).unwrap().position, Some(2));
        assert!(recorder.submissions().is_empty());
        assert!(!batch.is_frozen());
    }

    #[test]
    fn test_dry_run_then_submit() {
        let recorder = Arc::new(RecordingBackend::new().unwrap());
        let mut batch = BatchFactory::new()
            .create(BatchConfig::new(), Box::new(Arc::clone(&recorder)))
            .unwrap();
        let j = batch.new_job(None, IndexMap::new()).unwrap();
        batch.command(j, vec![Fragment::text("true")]).unwrap();

        assert!(batch.run(&RunOpts::new().with_dry_run(true)).unwrap().is_none());
        assert!(!batch.is_frozen());

        let handle = batch.run(&RunOpts::new()).unwrap().unwrap();
        assert_eq!(handle.job_count, 1);
        assert_eq!(recorder.submissions(), vec![1]);
        assert!(batch.is_frozen());
    }

    #[test]
    fn test_run_returns_handle_and_freezes() {
        let mut batch = local_batch();
        let j = batch.new_job(None, IndexMap::new()).unwrap();
        batch.command(j, vec![Fragment::text("true")]).unwrap();

        let handle = batch.run(&RunOpts::new()).unwrap().unwrap();
        assert_eq!(handle.job_count, 1);
        assert!(batch.is_frozen());

        let err = batch.run(&RunOpts::new()).unwrap_err();
        assert!(matches!(err, PlanError::Frozen { .. }));
    }

    #[test]
    fn test_two_cycle_detected_without_hanging() {
        let mut batch = local_batch();
        let j1 = batch.new_job(Some("j1"), IndexMap::new()).unwrap();
        let j2 = batch.new_job(Some("j2"), IndexMap::new()).unwrap();
        batch.depends_on(j1, j2).unwrap();
        batch.depends_on(j2, j1).unwrap();

        let err = batch.run(&RunOpts::new().with_dry_run(true)).unwrap_err();
        match err {
            PlanError::CycleDetected { job, dependency } => {
                assert!(["j1", "j2"].contains(&job.as_str()));
                assert!(["j1", "j2"].contains(&dependency.as_str()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_cycle_detected() {
        let mut batch = local_batch();
        let j = batch.new_job(Some("selfish"), IndexMap::new()).unwrap();
        batch.depends_on(j, j).unwrap();
        let err = batch.run(&RunOpts::new().with_dry_run(true)).unwrap_err();
        assert!(matches!(err, PlanError::CycleDetected { .. }));
    }

    #[test]
    fn test_cycle_aborts_before_backend_delegation() {
        let recorder = Arc::new(RecordingBackend::new().unwrap());
        let mut batch = BatchFactory::new()
            .create(BatchConfig::new(), Box::new(Arc::clone(&recorder)))
            .unwrap();
        let j1 = batch.new_job(None, IndexMap::new()).unwrap();
        let j2 = batch.new_job(None, IndexMap::new()).unwrap();
        batch.depends_on(j1, j2).unwrap();
        batch.depends_on(j2, j1).unwrap();

        assert!(batch.run(&RunOpts::new()).is_err());
        assert!(recorder.submissions().is_empty());
    }

    #[test]
    fn test_linearization_is_a_permutation() {
        let mut batch = local_batch();
        // Diamond plus a detached tail, declared out of order.
        let a = batch.new_job(Some("a"), IndexMap::new()).unwrap();
        let b = batch.new_job(Some("b"), IndexMap::new()).unwrap();
        let c = batch.new_job(Some("c"), IndexMap::new()).unwrap();
        let d = batch.new_job(Some("d"), IndexMap::new()).unwrap();
        let e = batch.new_job(Some("e"), IndexMap::new()).unwrap();
        batch.depends_on(b, a).unwrap();
        batch.depends_on(c, a).unwrap();
        batch.depends_on(d, b).unwrap();
        batch.depends_on(d, c).unwrap();
        let _ = e;

        batch.run(&RunOpts::new().with_dry_run(true)).unwrap();
        assert_eq!(batch.schedule().len(), 5);

        let mut positions: Vec<usize> = batch
            .jobs()
            .iter()
            .map(|j| j.position.unwrap())
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);

        for job in batch.jobs() {
            for dep in &job.dependencies {
                assert!(batch.job(*dep).unwrap().position.unwrap() < job.position.unwrap());
            }
        }
    }

    #[test]
    fn test_batch_factory_counts_uids() {
        let mut factory = BatchFactory::new();
        let b0 = factory
            .create(BatchConfig::new(), Box::new(LocalBackend::new().unwrap()))
            .unwrap();
        let b1 = factory
            .create(BatchConfig::new(), Box::new(LocalBackend::new().unwrap()))
            .unwrap();
        assert_eq!(b0.uid(), "__BATCH__0");
        assert_eq!(b1.uid(), "__BATCH__1");
    }

    mod linearize_props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Edges only point from later jobs to earlier ones, so the
            // graph is acyclic by construction.
            #[test]
            fn acyclic_graphs_linearize(edges in prop::collection::vec((1u32..30, 0u32..30), 0..120)) {
                let mut batch = local_batch();
                let ids: Vec<JobId> = (0..30)
                    .map(|_| batch.new_job(None, IndexMap::new()).unwrap())
                    .collect();
                for (from, to) in edges {
                    let (from, to) = (from as usize, (to % from) as usize);
                    batch.depends_on(ids[from], ids[to]).unwrap();
                }

                batch.run(&RunOpts::new().with_dry_run(true)).unwrap();
                prop_assert_eq!(batch.schedule().len(), 30);
                for job in batch.jobs() {
                    let own = job.position.unwrap();
                    for dep in &job.dependencies {
                        prop_assert!(batch.job(*dep).unwrap().position.unwrap() < own);
                    }
                }
            }
        }
    }
}
