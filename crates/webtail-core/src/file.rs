//! `tail`-style file source.

use std::fs::Metadata;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::{Result, SourceError};
use crate::source::Source;

/// Where a [`FileSource`] starts reading when it first opens the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartAt {
    /// Deliver the whole existing content on the first drain.
    #[default]
    Beginning,
    /// Skip existing content and deliver only bytes appended afterwards.
    End,
}

struct Cursor {
    file: Option<File>,
    offset: u64,
}

/// Follows a file on disk, returning only bytes appended since the last drain.
///
/// The file is opened lazily on the first drain, so a missing file surfaces
/// as a drain error and is retried on every later drain. If the file shrinks
/// below the current offset it is assumed to have been truncated and reading
/// restarts from the beginning. If the path is renamed away and recreated, the
/// rest of the old file is delivered and the new file is followed from its
/// start. If the path is removed and not recreated, the source reports
/// [`SourceError::Exhausted`] once the old file is fully read.
pub struct FileSource {
    path: PathBuf,
    start_at: StartAt,
    cursor: Mutex<Cursor>,
}

impl FileSource {
    /// Tail `path` from the beginning.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_start(path, StartAt::Beginning)
    }

    /// Tail `path` starting at the given position.
    pub fn with_start(path: impl Into<PathBuf>, start_at: StartAt) -> Self {
        Self {
            path: path.into(),
            start_at,
            cursor: Mutex::new(Cursor {
                file: None,
                offset: 0,
            }),
        }
    }

    /// The followed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current byte offset of the cursor.
    pub async fn offset(&self) -> u64 {
        self.cursor.lock().await.offset
    }
}

/// What the followed path currently refers to, relative to the open handle.
enum PathState {
    /// Same file as the open handle.
    Same,
    /// A different file now lives at the path (rename-and-recreate rotation).
    Replaced(File),
    /// Nothing lives at the path any more.
    Gone,
}

#[async_trait]
impl Source for FileSource {
    async fn drain(&self) -> Result<Bytes> {
        let mut cursor = self.cursor.lock().await;

        if cursor.file.is_none() {
            let mut file = File::open(&self.path).await?;
            let offset = match self.start_at {
                StartAt::Beginning => 0,
                StartAt::End => file.seek(SeekFrom::End(0)).await?,
            };
            debug!(path = %self.path.display(), offset, "opened file source");
            cursor.offset = offset;
            cursor.file = Some(file);
        }

        let offset = cursor.offset;
        let Some(file) = cursor.file.as_mut() else {
            return Ok(Bytes::new());
        };

        let open = file.metadata().await?;
        if open.len() < offset {
            debug!(path = %self.path.display(), len = open.len(), offset, "file truncated, restarting");
            let _ = file.seek(SeekFrom::Start(0)).await?;
            cursor.offset = 0;
            return read_from_cursor(&mut cursor).await;
        }

        match self.path_state(&open).await? {
            PathState::Same if open.len() == offset => Ok(Bytes::new()),
            PathState::Same => read_from_cursor(&mut cursor).await,
            PathState::Replaced(next) => {
                // Finish the old file before following the new one.
                let tail = read_from_cursor(&mut cursor).await?;
                debug!(path = %self.path.display(), "file replaced, following new file");
                cursor.file = Some(next);
                cursor.offset = 0;
                let head = read_from_cursor(&mut cursor).await?;
                let mut out = BytesMut::with_capacity(tail.len() + head.len());
                out.extend_from_slice(&tail);
                out.extend_from_slice(&head);
                Ok(out.freeze())
            }
            PathState::Gone => {
                let tail = read_from_cursor(&mut cursor).await?;
                if tail.is_empty() {
                    debug!(path = %self.path.display(), "file removed, source exhausted");
                    return Err(SourceError::Exhausted);
                }
                Ok(tail)
            }
        }
    }

    fn label(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

impl FileSource {
    async fn path_state(&self, open: &Metadata) -> Result<PathState> {
        let current = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PathState::Gone),
            Err(e) => return Err(e.into()),
        };
        if same_file(open, &current) {
            return Ok(PathState::Same);
        }
        match File::open(&self.path).await {
            Ok(next) => Ok(PathState::Replaced(next)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(PathState::Gone),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_from_cursor(cursor: &mut Cursor) -> Result<Bytes> {
    let mut buf = Vec::new();
    if let Some(file) = cursor.file.as_mut() {
        let n = file.read_to_end(&mut buf).await?;
        cursor.offset += n as u64;
    }
    Ok(Bytes::from(buf))
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

// Without inode identity only truncation is detected.
#[cfg(not(unix))]
fn same_file(_a: &Metadata, _b: &Metadata) -> bool {
    true
}
