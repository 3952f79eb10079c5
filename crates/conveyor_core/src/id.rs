//! Unique identifiers for Conveyor entities.
//!
//! Resource uids are short random alphanumeric strings minted by the
//! batch registry; job ids are stable indexes into a batch's
//! insertion-ordered job arena.

use serde::{Deserialize, Serialize};

/// Resource identifier - identifies one artifact within a batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceUid(String);

impl ResourceUid {
    /// Create from an already-minted token
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the raw token
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "res_{}", self.0)
    }
}

/// Job identifier - a stable handle into a batch's job list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u32);

impl JobId {
    /// Create from a raw index
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Get as a usize index
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_uid_display() {
        let uid = ResourceUid::from_token("abc12");
        assert_eq!(uid.to_string(), "res_abc12");
        assert_eq!(uid.as_str(), "abc12");
    }

    #[test]
    fn test_job_id_roundtrip() {
        let id = JobId::from_index(7);
        assert_eq!(id.index(), 7);
        assert_eq!(id.to_string(), "job_7");
    }

    #[test]
    fn test_job_id_ordering() {
        assert!(JobId::from_index(1) < JobId::from_index(2));
    }
}
