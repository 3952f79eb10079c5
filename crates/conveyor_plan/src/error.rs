//! Planner error types.
//!
//! Four classes: configuration errors surface at the offending call;
//! graph-integrity errors abort `run` before any backend delegation;
//! binding errors name the offending symbolic identifier; storage
//! errors pass through from the facade unchanged.

/// Planner result type
pub type PlanResult<T> = Result<T, PlanError>;

/// Planner error type
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Configuration error surfaced at the call that caused it
    #[error("Configuration error: {reason}")]
    Config {
        /// Why the call was rejected
        reason: String,
    },

    /// A resource-group member value that is not a usable literal template
    #[error("Invalid template for member '{member}': {reason}")]
    Template {
        /// The group member whose value was rejected
        member: String,
        /// Why expansion failed
        reason: String,
    },

    /// A job-produced file written out before its job ever mentioned it
    #[error(
        "undefined resource '{symbol}'\n\
         Hint: resources must be defined within the job methods 'command' or 'declare_group'"
    )]
    UndefinedCommandResource {
        /// Symbolic identifier of the offending resource
        symbol: String,
    },

    /// A callable result written out before its job bound it via `call`
    #[error(
        "undefined resource '{symbol}'\n\
         Hint: resources must be bound as a result using the callable job 'call' method"
    )]
    UnboundCallResult {
        /// Symbolic identifier of the offending resource
        symbol: String,
    },

    /// An identifier that names no resource in this batch
    #[error("no such resource in this batch: {uid}")]
    UnknownResource {
        /// The unrecognized identifier
        uid: String,
    },

    /// A handle that names no job in this batch
    #[error("no such job in this batch: {id}")]
    UnknownJob {
        /// The unrecognized handle
        id: String,
    },

    /// Linearization found a dependency cycle
    #[error("cycle detected in dependency graph: '{job}' and its dependency '{dependency}'")]
    CycleDetected {
        /// A job on the cycle
        job: String,
        /// The dependency whose position inverted
        dependency: String,
    },

    /// The batch was already linearized and submitted once
    #[error("batch {uid} has already been submitted")]
    Frozen {
        /// Uid of the frozen batch
        uid: String,
    },

    /// Internal invariant violation, not a user error
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong
        message: String,
    },

    /// Core error (scheme validation, identifiers)
    #[error(transparent)]
    Core(#[from] conveyor_core::CoreError),

    /// Storage error, propagated unchanged from the facade
    #[error(transparent)]
    Storage(#[from] conveyor_fs::FsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_error_names_symbol() {
        let err = PlanError::UndefinedCommandResource {
            symbol: "ofile".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("'ofile'"));
        assert!(text.contains("command"));
    }

    #[test]
    fn test_call_binding_error_hint() {
        let err = PlanError::UnboundCallResult {
            symbol: "result".to_string(),
        };
        assert!(err.to_string().contains("'call' method"));
    }

    #[test]
    fn test_cycle_error_names_edge() {
        let err = PlanError::CycleDetected {
            job: "align".to_string(),
            dependency: "sort".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("align"));
        assert!(text.contains("sort"));
    }
}
