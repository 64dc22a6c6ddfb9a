//! Splits a local file into fixed-size parts without loading it into memory.

use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Sequential reader over a file, handing out one part per call.
///
/// The file handle is released when the source is closed or dropped.
#[derive(Debug)]
pub struct PartSource<R = File> {
    reader: R,
    path: PathBuf,
    len: u64,
    offset: u64,
}

impl PartSource<File> {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }

        Ok(Self::from_reader(file, path, metadata.len()))
    }
}

impl<R: AsyncRead + Unpin> PartSource<R> {
    /// Wraps an already open reader of `len` bytes; `path` is only used for reporting.
    pub fn from_reader(reader: R, path: impl Into<PathBuf>, len: u64) -> Self {
        Self {
            reader,
            path: path.into(),
            len,
            offset: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes handed out so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of parts the source splits into at `chunk_size`.
    pub fn part_count(&self, chunk_size: NonZeroUsize) -> u64 {
        self.len.div_ceil(chunk_size.get() as u64)
    }

    /// Reads the next part of at most `chunk_size` bytes.
    ///
    /// Short reads from the OS are retried until the part is full, so only the
    /// final part can be smaller than `chunk_size`. Returns `None` once the
    /// file is exhausted.
    pub async fn next_part(&mut self, chunk_size: NonZeroUsize) -> io::Result<Option<Bytes>> {
        let chunk_size = chunk_size.get();
        let mut buf = vec![0u8; chunk_size];
        let mut filled = 0;
        while filled < chunk_size {
            match self.reader.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        self.offset += filled as u64;
        Ok(Some(Bytes::from(buf)))
    }

    pub fn close(self) {
        debug!(path = %self.path.display(), bytes_read = self.offset, "closing source file");
    }
}
