//! Resources and the batch resource registry.
//!
//! A resource is an opaque identifier plus provenance: where the bytes
//! come from (an external input path or a producing job) and where they
//! must be written after the graph executes. The registry is the single
//! owner of the uid->resource mapping for one batch.

use crate::error::{PlanError, PlanResult};
use crate::template::{expand, TemplateVars};
use conveyor_core::{alnum_token, JobId, ResourceUid, TOKEN_LEN};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An externally supplied input file; has no producing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// On-disk staging name, `{root}/{basename}` with credentials stripped
    pub staging_name: String,
    /// Source path(s) the input is fetched from
    pub input_paths: Vec<String>,
    /// Destinations recorded by `write_output`
    pub output_paths: Vec<String>,
}

/// A file produced by exactly one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFile {
    /// Scratch-relative file name
    pub name: String,
    /// The producing job
    pub producer: JobId,
    /// Optional extension suffix assigned after creation
    pub extension: Option<String>,
    /// Destinations recorded by `write_output`
    pub output_paths: Vec<String>,
}

/// A named mapping from identifier to member resource under one root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Common root-name prefix; members are conventionally `{root}.{id}`
    pub root: String,
    /// Producing job, if the group is job-produced
    pub producer: Option<JobId>,
    /// Identifier -> member resource
    pub members: IndexMap<String, ResourceUid>,
    /// Destinations recorded by `write_output`
    pub output_paths: Vec<String>,
}

/// A deserializable value produced by exactly one callable job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    /// Scratch-relative name of the serialized value
    pub name: String,
    /// The producing job
    pub producer: JobId,
    /// Destinations recorded by `write_output`
    pub output_paths: Vec<String>,
}

/// A data artifact flowing between jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resource {
    /// Externally supplied input file
    InputFile(InputFile),
    /// Job-produced file
    JobFile(JobFile),
    /// Grouped file set
    Group(Group),
    /// Job-produced callable result
    CallResult(CallResult),
}

impl Resource {
    /// The job that produces this resource, if any
    #[must_use]
    pub fn producer(&self) -> Option<JobId> {
        match self {
            Self::InputFile(_) => None,
            Self::JobFile(f) => Some(f.producer),
            Self::Group(g) => g.producer,
            Self::CallResult(r) => Some(r.producer),
        }
    }

    /// Destinations recorded by `write_output`
    #[must_use]
    pub fn output_paths(&self) -> &[String] {
        match self {
            Self::InputFile(f) => &f.output_paths,
            Self::JobFile(f) => &f.output_paths,
            Self::Group(g) => &g.output_paths,
            Self::CallResult(r) => &r.output_paths,
        }
    }

    /// Record a destination for the backend to fulfill after execution
    pub fn add_output_path(&mut self, dest: String) {
        match self {
            Self::InputFile(f) => f.output_paths.push(dest),
            Self::JobFile(f) => f.output_paths.push(dest),
            Self::Group(g) => g.output_paths.push(dest),
            Self::CallResult(r) => r.output_paths.push(dest),
        }
    }

    /// Human-readable kind name for error messages
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InputFile(_) => "input file",
            Self::JobFile(_) => "job file",
            Self::Group(_) => "resource group",
            Self::CallResult(_) => "call result",
        }
    }
}

/// Owner of the uid->resource mapping for one batch.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    map: IndexMap<ResourceUid, Resource>,
}

impl ResourceRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh uid, re-drawing until it is absent from the map.
    ///
    /// The token space is large relative to expected graph sizes, so
    /// the loop terminates quickly; the explicit check replaces the
    /// silent-overwrite behavior a collision would otherwise cause.
    fn mint_uid(&self) -> ResourceUid {
        self.mint_uid_with(|| alnum_token(TOKEN_LEN))
    }

    fn mint_uid_with(&self, mut draw: impl FnMut() -> String) -> ResourceUid {
        loop {
            let uid = ResourceUid::from_token(draw());
            if !self.map.contains_key(&uid) {
                return uid;
            }
        }
    }

    /// Register an externally supplied input file
    pub fn new_input_file(&mut self, staging_name: String, input_path: String) -> ResourceUid {
        let uid = self.mint_uid();
        self.map.insert(
            uid.clone(),
            Resource::InputFile(InputFile {
                staging_name,
                input_paths: vec![input_path],
                output_paths: Vec::new(),
            }),
        );
        uid
    }

    /// Register a job-produced file. A missing `name` gets a fresh token.
    pub fn new_job_file(&mut self, producer: JobId, name: Option<String>) -> ResourceUid {
        let uid = self.mint_uid();
        let name = name.unwrap_or_else(|| alnum_token(TOKEN_LEN));
        self.map.insert(
            uid.clone(),
            Resource::JobFile(JobFile {
                name,
                producer,
                extension: None,
                output_paths: Vec::new(),
            }),
        );
        uid
    }

    /// Register a job-produced callable result
    pub fn new_call_result(&mut self, producer: JobId, name: Option<String>) -> ResourceUid {
        let uid = self.mint_uid();
        let name = name.unwrap_or_else(|| alnum_token(TOKEN_LEN));
        self.map.insert(
            uid.clone(),
            Resource::CallResult(CallResult {
                name,
                producer,
                output_paths: Vec::new(),
            }),
        );
        uid
    }

    /// Register a group over already-registered members
    pub fn new_group_of(
        &mut self,
        producer: Option<JobId>,
        root: String,
        members: IndexMap<String, ResourceUid>,
    ) -> ResourceUid {
        let uid = self.mint_uid();
        self.map.insert(
            uid.clone(),
            Resource::Group(Group {
                root,
                producer,
                members,
                output_paths: Vec::new(),
            }),
        );
        uid
    }

    /// Register a job-produced group whose member names are templates
    /// over `{root}` and `{scratch}`.
    ///
    /// All templates are expanded before anything is registered, so a
    /// rejected template leaves the registry untouched.
    ///
    /// # Errors
    ///
    /// Fails with a descriptive error if any member value is not a
    /// usable literal template.
    pub fn new_group_from_templates(
        &mut self,
        producer: JobId,
        root: String,
        scratch: &str,
        mappings: &IndexMap<String, String>,
    ) -> PlanResult<ResourceUid> {
        let vars = TemplateVars {
            root: &root,
            scratch,
        };
        let mut expanded = Vec::with_capacity(mappings.len());
        for (member, template) in mappings {
            expanded.push((member.clone(), expand(member, template, &vars)?));
        }

        let mut members = IndexMap::new();
        for (member, name) in expanded {
            let file = self.new_job_file(producer, Some(name));
            members.insert(member, file);
        }
        Ok(self.new_group_of(Some(producer), root, members))
    }

    /// Look up a resource
    #[must_use]
    pub fn get(&self, uid: &ResourceUid) -> Option<&Resource> {
        self.map.get(uid)
    }

    /// Look up a resource mutably
    pub fn get_mut(&mut self, uid: &ResourceUid) -> Option<&mut Resource> {
        self.map.get_mut(uid)
    }

    /// Whether `uid` is registered
    #[must_use]
    pub fn contains(&self, uid: &ResourceUid) -> bool {
        self.map.contains_key(uid)
    }

    /// Number of registered resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over all resources in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceUid, &Resource)> {
        self.map.iter()
    }

    /// Set the extension suffix on a job-produced file.
    ///
    /// # Errors
    ///
    /// Fails if `uid` is unknown or names anything but a job file.
    pub fn add_extension(&mut self, uid: &ResourceUid, extension: &str) -> PlanResult<()> {
        let resource = self.map.get_mut(uid).ok_or_else(|| PlanError::UnknownResource {
            uid: uid.to_string(),
        })?;
        match resource {
            Resource::JobFile(f) => {
                f.extension = Some(extension.to_string());
                Ok(())
            }
            other => Err(PlanError::Config {
                reason: format!(
                    "extensions can only be added to job files, not to a {}",
                    other.kind_name()
                ),
            }),
        }
    }
}
