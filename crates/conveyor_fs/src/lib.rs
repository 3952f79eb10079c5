//! Conveyor Storage
//!
//! A cooperative asynchronous storage client (`Store`) with a local
//! filesystem implementation, plus the synchronous facade (`SyncFs`)
//! that the graph compiler and user code consume. The facade owns a
//! dedicated event loop and blocks the calling thread on each
//! operation, so no caller ever participates in the async runtime.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod copy;
pub mod error;
pub mod local;
pub mod store;
pub mod sync;

// Re-exports
pub use copy::{Copier, COPY_CONCURRENCY};
pub use error::{FsError, FsResult};
pub use local::LocalStore;
pub use store::{BoxReader, BoxWriter, FileStat, FileType, Store};
pub use sync::{SyncFs, SyncReader, SyncWriter, TextReader, LIST_CONCURRENCY};
