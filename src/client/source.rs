use std::io;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Body of a single part, streamed rather than held in memory.
pub type PartStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

pub struct PartBody {
    pub part_number: i32,
    pub length: u64,
    pub stream: PartStream,
}

/// Something whose bytes can be read back in arbitrary ranges, possibly concurrently.
#[async_trait]
pub trait ByteSource: Send + Sync {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Streams exactly `length` bytes starting at `offset`.
    async fn open_range(&self, offset: u64, length: u64) -> io::Result<PartStream>;
}

/// A file on local disk. Every range gets its own handle, released when the stream is dropped.
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            path,
            len: metadata.len(),
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|s| s.to_str())
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn open_range(&self, offset: u64, length: u64) -> io::Result<PartStream> {
        if offset.saturating_add(length) > self.len {
            return Err(range_error(offset, length, self.len));
        }
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(Box::pin(ReaderStream::new(file.take(length))))
    }
}

#[async_trait]
impl ByteSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn open_range(&self, offset: u64, length: u64) -> io::Result<PartStream> {
        let end = offset.saturating_add(length);
        if end > ByteSource::len(self) {
            return Err(range_error(offset, length, ByteSource::len(self)));
        }
        let slice = self.slice(offset as usize..end as usize);
        Ok(Box::pin(stream::iter(std::iter::once(Ok(slice)))))
    }
}

fn range_error(offset: u64, length: u64, len: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("range {offset}+{length} exceeds source length {len}"),
    )
}
