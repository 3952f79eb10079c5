//! Conveyor Core Types
//!
//! This crate contains pure types and helpers with no I/O: identifiers
//! for jobs and resources, random token minting, URL-scheme inspection,
//! and the shared error taxonomy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod token;
pub mod url;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{JobId, ResourceUid};
pub use token::{alnum_token, BatchCounter, TOKEN_LEN};
pub use url::{basename, strip_query, url_scheme};
