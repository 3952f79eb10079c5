//! Bulk copy engine with bounded transfer concurrency.

use crate::error::{FsError, FsResult};
use crate::store::Store;
use conveyor_core::basename;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Default number of in-flight object transfers
pub const COPY_CONCURRENCY: usize = 75;

/// Join a directory path and a leaf name
fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Copies files or whole trees between store paths.
///
/// Transfers run concurrently but never more than the configured limit
/// at once; each object may cost a network round trip, so unbounded
/// fan-out risks exhausting backend connections.
pub struct Copier {
    store: Arc<dyn Store>,
    max_transfers: usize,
}

impl Copier {
    /// Create a copier with the default transfer limit
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_limit(store, COPY_CONCURRENCY)
    }

    /// Create a copier with a custom transfer limit
    #[must_use]
    pub fn with_limit(store: Arc<dyn Store>, max_transfers: usize) -> Self {
        Self {
            store,
            max_transfers: max_transfers.max(1),
        }
    }

    /// Copy `src` (file or tree) to `dest`.
    ///
    /// A destination that is itself an existing directory is resolved
    /// by appending the source's base name. Returns the number of
    /// objects transferred.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not exist or any transfer
    /// fails.
    pub async fn copy(&self, src: &str, dest: &str) -> FsResult<usize> {
        let dest = if self.store.is_dir(dest).await? {
            join(dest, basename(src))
        } else {
            dest.to_string()
        };

        let transfers = self.plan(src, &dest).await?;
        let count = transfers.len();
        tracing::debug!(src, dest, count, "bulk copy");

        stream::iter(transfers.into_iter().map(|(from, to)| {
            let store = Arc::clone(&self.store);
            async move { copy_one(&*store, &from, &to).await }
        }))
        .buffer_unordered(self.max_transfers)
        .try_collect::<Vec<()>>()
        .await?;

        Ok(count)
    }

    /// Enumerate (source, destination) object pairs for the transfer.
    async fn plan(&self, src: &str, dest: &str) -> FsResult<Vec<(String, String)>> {
        if self.store.is_file(src).await? {
            return Ok(vec![(src.to_string(), dest.to_string())]);
        }
        if !self.store.is_dir(src).await? {
            return Err(FsError::NotFound {
                path: src.to_string(),
            });
        }

        let mut pairs = Vec::new();
        let mut stack = vec![(src.to_string(), dest.to_string())];
        while let Some((from_dir, to_dir)) = stack.pop() {
            for entry in self.store.list(&from_dir).await? {
                let target = join(&to_dir, basename(&entry));
                if self.store.is_dir(&entry).await? {
                    stack.push((entry, target));
                } else {
                    pairs.push((entry, target));
                }
            }
        }
        Ok(pairs)
    }
}

/// Transfer one object from `from` to `to`.
async fn copy_one(store: &dyn Store, from: &str, to: &str) -> FsResult<()> {
    use tokio::io::AsyncWriteExt;

    let mut reader = store.open(from).await?;
    let mut writer = store.create(to).await?;
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|e| FsError::from_io(from, e))?;
    writer
        .shutdown()
        .await
        .map_err(|e| FsError::from_io(to, e))?;
    Ok(())
}
