//! Blocking facade over the asynchronous storage client.
//!
//! `SyncFs` owns a dedicated event loop and an `Arc<dyn Store>`; every
//! method runs one cooperative operation to completion and blocks the
//! calling thread until it settles. Stream adapters (`SyncReader`,
//! `SyncWriter`) each own exactly one underlying async handle and
//! forward blocking calls to the shared loop, so the graph compiler can
//! be tested with no async runtime of its own.

use crate::copy::Copier;
use crate::error::{FsError, FsResult};
use crate::store::{BoxReader, BoxWriter, FileStat, Store};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;

/// Default bound on simultaneous per-entry metadata fetches in `list`
pub const LIST_CONCURRENCY: usize = 50;

/// Normalize a path for directory probing (must end with a separator)
fn dir_probe(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Stat one path: file size first, directory fallback on not-found.
async fn stat_path(store: &dyn Store, path: &str) -> FsResult<FileStat> {
    let probe = dir_probe(path);
    let (size, is_dir) = tokio::join!(store.size(path), store.is_dir(&probe));
    match size {
        Ok(bytes) => {
            if is_dir? {
                Ok(FileStat::directory(path))
            } else {
                Ok(FileStat::file(path, bytes))
            }
        }
        Err(FsError::NotFound { .. }) => {
            if is_dir? {
                Ok(FileStat::directory(path))
            } else {
                Err(FsError::NotFound {
                    path: path.to_string(),
                })
            }
        }
        Err(e) => Err(e),
    }
}

/// Synchronous, stream-oriented file API over an async store.
pub struct SyncFs {
    runtime: Arc<Runtime>,
    store: Arc<dyn Store>,
}

impl SyncFs {
    /// Create a facade over `store` with its own event loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the event loop cannot be built.
    pub fn new(store: Arc<dyn Store>) -> FsResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FsError::Runtime {
                reason: e.to_string(),
            })?;
        Ok(Self {
            runtime: Arc::new(runtime),
            store,
        })
    }

    /// Create a facade over the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the event loop cannot be built.
    pub fn local() -> FsResult<Self> {
        Self::new(Arc::new(crate::local::LocalStore::new()))
    }

    /// The underlying asynchronous store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Whether the underlying store serves `scheme`
    #[must_use]
    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.store.schemes().contains(&scheme)
    }

    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// Propagates the store's not-found/permission error unchanged.
    pub fn open(&self, path: &str) -> FsResult<SyncReader> {
        let inner = self.runtime.block_on(self.store.open(path))?;
        Ok(SyncReader {
            runtime: Arc::clone(&self.runtime),
            inner: Some(inner),
            path: path.to_string(),
        })
    }

    /// Open `path` for reading in text mode (UTF-8).
    ///
    /// # Errors
    ///
    /// Propagates the store's not-found/permission error unchanged.
    pub fn open_text(&self, path: &str) -> FsResult<TextReader> {
        Ok(TextReader {
            inner: self.open(path)?,
            carry: Vec::new(),
            decoded: 0,
        })
    }

    /// Open `path` for writing, blocking until the stream is ready.
    ///
    /// # Errors
    ///
    /// Propagates the store's error; for the local store a missing
    /// parent directory is created and the open retried exactly once.
    pub fn create(&self, path: &str) -> FsResult<SyncWriter> {
        let inner = self.runtime.block_on(self.store.create(path))?;
        Ok(SyncWriter {
            runtime: Arc::clone(&self.runtime),
            inner: Some(inner),
            path: path.to_string(),
        })
    }

    /// Read the whole object at `path`.
    ///
    /// # Errors
    ///
    /// Propagates open/read failures.
    pub fn read_bytes(&self, path: &str) -> FsResult<Vec<u8>> {
        self.runtime.block_on(async {
            let mut reader = self.store.open(path).await?;
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .await
                .map_err(|e| FsError::from_io(path, e))?;
            Ok(buf)
        })
    }

    /// Write `data` as the whole object at `path`.
    ///
    /// # Errors
    ///
    /// Propagates create/write failures.
    pub fn write_bytes(&self, path: &str, data: &[u8]) -> FsResult<()> {
        self.runtime.block_on(async {
            let mut writer = self.store.create(path).await?;
            writer
                .write_all(data)
                .await
                .map_err(|e| FsError::from_io(path, e))?;
            writer
                .shutdown()
                .await
                .map_err(|e| FsError::from_io(path, e))
        })
    }

    /// Whether `path` exists as a file or as a directory.
    ///
    /// The two probes run concurrently; the result is true if either
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Propagates probe failures other than not-found.
    pub fn exists(&self, path: &str) -> FsResult<bool> {
        let probe = dir_probe(path);
        self.runtime.block_on(async {
            let (file, dir) = tokio::join!(self.store.is_file(path), self.store.is_dir(&probe));
            Ok(file? || dir?)
        })
    }

    /// Whether `path` is a regular file.
    ///
    /// # Errors
    ///
    /// Propagates probe failures.
    pub fn is_file(&self, path: &str) -> FsResult<bool> {
        self.runtime.block_on(self.store.is_file(path))
    }

    /// Whether `path` is a directory.
    ///
    /// # Errors
    ///
    /// Propagates probe failures.
    pub fn is_dir(&self, path: &str) -> FsResult<bool> {
        let probe = dir_probe(path);
        self.runtime.block_on(self.store.is_dir(&probe))
    }

    /// Size and type of `path`.
    ///
    /// A path that is missing as a file but present as a directory
    /// reports as a zero-size directory rather than not-found.
    ///
    /// # Errors
    ///
    /// Returns not-found if the path is neither file nor directory.
    pub fn stat(&self, path: &str) -> FsResult<FileStat> {
        self.runtime.block_on(stat_path(&*self.store, path))
    }

    /// List the entries under `path` with their stats.
    ///
    /// Per-entry metadata fetches are capped at [`LIST_CONCURRENCY`]
    /// simultaneous requests; each may be a network round trip on
    /// remote stores.
    ///
    /// # Errors
    ///
    /// Propagates list/stat failures.
    pub fn list(&self, path: &str) -> FsResult<Vec<FileStat>> {
        self.runtime.block_on(async {
            let entries = self.store.list(path).await?;
            stream::iter(entries.into_iter().map(|entry| {
                let store = Arc::clone(&self.store);
                async move { stat_path(&*store, &entry).await }
            }))
            .buffered(LIST_CONCURRENCY)
            .try_collect()
            .await
        })
    }

    /// Copy `src` (file or tree) to `dest` through the bulk-copy engine.
    ///
    /// # Errors
    ///
    /// Propagates transfer failures.
    pub fn copy(&self, src: &str, dest: &str) -> FsResult<usize> {
        let copier = Copier::new(Arc::clone(&self.store));
        self.runtime.block_on(copier.copy(src, dest))
    }

    /// Create the directory at `path`.
    ///
    /// # Errors
    ///
    /// Propagates the store's error.
    pub fn mkdir(&self, path: &str) -> FsResult<()> {
        self.runtime.block_on(self.store.mkdir(path))
    }

    /// Remove the file at `path`.
    ///
    /// # Errors
    ///
    /// Propagates the store's error.
    pub fn remove(&self, path: &str) -> FsResult<()> {
        self.runtime.block_on(self.store.remove(path))
    }

    /// Remove the tree rooted at `path`.
    ///
    /// # Errors
    ///
    /// Propagates the store's error.
    pub fn remove_tree(&self, path: &str) -> FsResult<()> {
        self.runtime.block_on(self.store.remove_tree(path))
    }
}

/// Blocking readable stream over one async handle.
pub struct SyncReader {
    runtime: Arc<Runtime>,
    inner: Option<BoxReader>,
    path: String,
}

impl SyncReader {
    /// The path this stream reads
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fill `buf` completely, blocking until the bytes are available.
    ///
    /// # Errors
    ///
    /// Fails with a short-read error if the stream ends before `buf`
    /// is full; an exact-fit read succeeds.
    pub fn read_exact_or_err(&mut self, buf: &mut [u8]) -> FsResult<()> {
        let inner = self.inner.as_mut().ok_or_else(|| FsError::Closed {
            path: self.path.clone(),
        })?;
        let wanted = buf.len();
        self.runtime.block_on(async {
            let mut got = 0;
            while got < wanted {
                let n = inner
                    .read(&mut buf[got..])
                    .await
                    .map_err(|e| FsError::from_io(&self.path, e))?;
                if n == 0 {
                    return Err(FsError::ShortRead { wanted, got });
                }
                got += n;
            }
            Ok(())
        })
    }

    /// Release the underlying async handle.
    pub fn close(&mut self) {
        self.inner = None;
    }
}

impl std::io::Read for SyncReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let inner = self.inner.as_mut().ok_or_else(|| {
            std::io::Error::from(FsError::Closed {
                path: self.path.clone(),
            })
        })?;
        self.runtime.block_on(inner.read(buf))
    }
}

impl std::io::Seek for SyncReader {
    fn seek(&mut self, _pos: std::io::SeekFrom) -> std::io::Result<u64> {
        Err(FsError::SeekUnsupported.into())
    }
}

/// Blocking writable stream over one async handle.
///
/// The underlying handle is released on every exit path: an explicit
/// [`SyncWriter::close`], or `Drop` if the caller never closed it.
pub struct SyncWriter {
    runtime: Arc<Runtime>,
    inner: Option<BoxWriter>,
    path: String,
}

impl SyncWriter {
    /// The path this stream writes
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Flush, shut down, and release the underlying handle.
    ///
    /// # Errors
    ///
    /// Propagates the final flush/shutdown failure.
    pub fn close(&mut self) -> FsResult<()> {
        match self.inner.take() {
            Some(mut inner) => self.runtime.block_on(async {
                inner
                    .shutdown()
                    .await
                    .map_err(|e| FsError::from_io(&self.path, e))
            }),
            None => Ok(()),
        }
    }
}

impl std::io::Write for SyncWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let inner = self.inner.as_mut().ok_or_else(|| {
            std::io::Error::from(FsError::Closed {
                path: self.path.clone(),
            })
        })?;
        self.runtime.block_on(inner.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let inner = self.inner.as_mut().ok_or_else(|| {
            std::io::Error::from(FsError::Closed {
                path: self.path.clone(),
            })
        })?;
        self.runtime.block_on(inner.flush())
    }
}

impl Drop for SyncWriter {
    fn drop(&mut self) {
        // Last-resort release; errors here have no caller to reach.
        let _ = self.close();
    }
}

/// UTF-8 decoding layer over a blocking byte stream.
///
/// Blocking and no-seek semantics are unchanged from [`SyncReader`];
/// multi-byte sequences split across reads are carried to the next
/// call.
pub struct TextReader {
    inner: SyncReader,
    carry: Vec<u8>,
    decoded: usize,
}

impl TextReader {
    /// The path this stream reads
    #[must_use]
    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// Read and decode up to `n` more bytes. Returns an empty string at
    /// end of stream.
    ///
    /// # Errors
    ///
    /// Fails on invalid UTF-8 or on a stream that ends mid-character.
    pub fn read_string(&mut self, n: usize) -> FsResult<String> {
        use std::io::Read;

        let mut chunk = vec![0u8; n];
        let mut got = 0;
        while got < n {
            let read = self
                .inner
                .read(&mut chunk[got..])
                .map_err(|e| FsError::from_io(self.inner.path(), e))?;
            if read == 0 {
                break;
            }
            got += read;
        }
        chunk.truncate(got);

        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(&chunk);
        let at_eof = got == 0;
        self.decode(bytes, at_eof)
    }

    /// Read and decode the remainder of the stream.
    ///
    /// # Errors
    ///
    /// Fails on invalid UTF-8.
    pub fn read_to_string(&mut self) -> FsResult<String> {
        use std::io::Read;

        let mut bytes = std::mem::take(&mut self.carry);
        self.inner
            .read_to_end(&mut bytes)
            .map_err(|e| FsError::from_io(self.inner.path(), e))?;
        self.decode(bytes, true)
    }

    fn decode(&mut self, bytes: Vec<u8>, at_eof: bool) -> FsResult<String> {
        match String::from_utf8(bytes) {
            Ok(s) => {
                self.decoded += s.len();
                Ok(s)
            }
            Err(err) => {
                let error = err.utf8_error();
                let valid = error.valid_up_to();
                if error.error_len().is_none() && !at_eof {
                    // Incomplete trailing sequence: decode the valid
                    // prefix and carry the tail into the next read.
                    let mut bytes = err.into_bytes();
                    self.carry = bytes.split_off(valid);
                    let s = String::from_utf8(bytes).map_err(|_| FsError::InvalidUtf8 {
                        path: self.inner.path().to_string(),
                        offset: self.decoded + valid,
                    })?;
                    self.decoded += s.len();
                    Ok(s)
                } else {
                    Err(FsError::InvalidUtf8 {
                        path: self.inner.path().to_string(),
                        offset: self.decoded + valid,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};

    fn local_fs() -> SyncFs {
        SyncFs::local().unwrap()
    }

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_str().unwrap().to_string()
    }

    fn roundtrip(n: usize) {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "blob.bin");
        let fs = local_fs();

        let payload: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
        let mut writer = fs.create(&path).unwrap();
        writer.write_all(&payload).unwrap();
        writer.close().unwrap();

        let mut reader = fs.open(&path).unwrap();
        let mut back = Vec::new();
        reader.read_to_end(&mut back).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_roundtrip_empty() {
        roundtrip(0);
    }

    #[test]
    fn test_roundtrip_one_byte() {
        roundtrip(1);
    }

    #[test]
    fn test_roundtrip_page() {
        roundtrip(4096);
    }

    #[test]
    fn test_roundtrip_ten_megabytes() {
        roundtrip(10_000_000);
    }

    #[test]
    fn test_read_exact_exact_fit_vs_short() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "six.bin");
        let fs = local_fs();
        fs.write_bytes(&path, b"sixby!").unwrap();

        let mut reader = fs.open(&path).unwrap();
        let mut buf = [0u8; 6];
        reader.read_exact_or_err(&mut buf).unwrap();
        assert_eq!(&buf, b"sixby!");

        let mut reader = fs.open(&path).unwrap();
        let mut buf = [0u8; 7];
        let err = reader.read_exact_or_err(&mut buf).unwrap_err();
        assert!(matches!(err, FsError::ShortRead { wanted: 7, got: 6 }));
    }

    #[test]
    fn test_seek_fails_explicitly() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "s.bin");
        let fs = local_fs();
        fs.write_bytes(&path, b"abc").unwrap();

        let mut reader = fs.open(&path).unwrap();
        let err = reader.seek(SeekFrom::Start(1)).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
    }

    #[test]
    fn test_exists_file_or_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let file = temp_path(&dir, "f.txt");
        fs.write_bytes(&file, b"x").unwrap();
        let sub = temp_path(&dir, "sub");
        fs.mkdir(&sub).unwrap();

        assert!(fs.exists(&file).unwrap());
        assert!(fs.exists(&sub).unwrap());
        assert!(!fs.exists(&temp_path(&dir, "absent")).unwrap());
    }

    #[test]
    fn test_stat_directory_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let sub = temp_path(&dir, "sub");
        fs.mkdir(&sub).unwrap();

        let stat = fs.stat(&sub).unwrap();
        assert!(stat.is_dir());
        assert_eq!(stat.size, 0);

        let err = fs.stat(&temp_path(&dir, "absent")).unwrap_err();
        assert!(matches!(err, FsError::NotFound { .. }));
    }

    #[test]
    fn test_stat_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let file = temp_path(&dir, "f.bin");
        fs.write_bytes(&file, &[0u8; 123]).unwrap();

        let stat = fs.stat(&file).unwrap();
        assert!(!stat.is_dir());
        assert_eq!(stat.size, 123);
    }

    #[test]
    fn test_list_with_stats() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        fs.write_bytes(&temp_path(&dir, "a.txt"), b"aa").unwrap();
        fs.mkdir(&temp_path(&dir, "d")).unwrap();

        let mut entries = fs.list(dir.path().to_str().unwrap()).unwrap();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_dir());
        assert_eq!(entries[0].size, 2);
        assert!(entries[1].is_dir());
    }

    #[test]
    fn test_text_mode_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let path = temp_path(&dir, "text.txt");
        fs.write_bytes(&path, "héllo wörld".as_bytes()).unwrap();

        let mut text = fs.open_text(&path).unwrap();
        assert_eq!(text.read_to_string().unwrap(), "héllo wörld");
    }

    #[test]
    fn test_text_mode_carries_split_multibyte() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let path = temp_path(&dir, "text.txt");
        // 'é' is two bytes; a 1-byte read splits it.
        fs.write_bytes(&path, "é".as_bytes()).unwrap();

        let mut text = fs.open_text(&path).unwrap();
        assert_eq!(text.read_string(1).unwrap(), "");
        assert_eq!(text.read_string(1).unwrap(), "é");
        assert_eq!(text.read_string(1).unwrap(), "");
    }

    #[test]
    fn test_text_mode_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let path = temp_path(&dir, "bad.bin");
        fs.write_bytes(&path, &[0x66, 0xff, 0x67]).unwrap();

        let mut text = fs.open_text(&path).unwrap();
        let err = text.read_to_string().unwrap_err();
        assert!(matches!(err, FsError::InvalidUtf8 { offset: 1, .. }));
    }

    #[test]
    fn test_writer_drop_releases_handle() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let path = temp_path(&dir, "dropped.bin");
        {
            let mut writer = fs.create(&path).unwrap();
            writer.write_all(b"partial").unwrap();
            // No close: Drop must still release and flush the handle.
        }
        assert_eq!(fs.read_bytes(&path).unwrap(), b"partial");
    }

    #[test]
    fn test_read_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let path = temp_path(&dir, "c.bin");
        fs.write_bytes(&path, b"x").unwrap();

        let mut reader = fs.open(&path).unwrap();
        reader.close();
        let mut buf = [0u8; 1];
        assert!(reader.read(&mut buf).is_err());
    }

    #[test]
    fn test_supports_scheme() {
        let fs = local_fs();
        assert!(fs.supports_scheme(""));
        assert!(fs.supports_scheme("file"));
        assert!(!fs.supports_scheme("gs"));
    }

    #[test]
    fn test_create_missing_parent_retries_once() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let path = temp_path(&dir, "deep/nested/out.txt");
        fs.write_bytes(&path, b"ok").unwrap();
        assert_eq!(fs.read_bytes(&path).unwrap(), b"ok");
    }

    #[test]
    fn test_remove_and_remove_tree() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let file = temp_path(&dir, "f.txt");
        fs.write_bytes(&file, b"x").unwrap();
        fs.remove(&file).unwrap();
        assert!(!fs.exists(&file).unwrap());

        let tree = temp_path(&dir, "tree/inner/leaf.txt");
        fs.write_bytes(&tree, b"x").unwrap();
        fs.remove_tree(&temp_path(&dir, "tree")).unwrap();
        assert!(!fs.exists(&temp_path(&dir, "tree")).unwrap());
    }

    #[test]
    fn test_copy_through_facade() {
        let dir = tempfile::tempdir().unwrap();
        let fs = local_fs();
        let src = temp_path(&dir, "src.txt");
        fs.write_bytes(&src, b"data").unwrap();
        let dest = temp_path(&dir, "dest.txt");

        assert_eq!(fs.copy(&src, &dest).unwrap(), 1);
        assert_eq!(fs.read_bytes(&dest).unwrap(), b"data");
    }
}
