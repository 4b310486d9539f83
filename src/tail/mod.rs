//! Incremental log-file tailing.
//!
//! Each monitored file gets one [`FileTailer`] owned by one task. The task is
//! the only reader of its cursor, and change notifications reach it through a
//! `Notify` permit, so notifications arriving mid-read collapse into a single
//! follow-up read instead of racing on the same offset.

#[cfg(test)]
mod tail_test;

use std::fs::Metadata;
use std::io::ErrorKind;
use std::io::SeekFrom;
#[cfg(unix)]
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncSeekExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::metrics::TAIL_RESETS;
use crate::EventSink;
use crate::Result;
use crate::ServiceId;
use crate::StreamEvent;

/// A monitored log file and the service it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileDescriptor {
    pub path: PathBuf,
    pub service: ServiceId,
}

/// Device and inode of the file a cursor points into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &Metadata) -> Option<Self> {
        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    fn of(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Read position in one file. Lives exactly as long as its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailCursor {
    path: PathBuf,
    byte_offset: u64,
    /// File the offset refers to; a different file at the same path was rotated in
    identity: Option<FileIdentity>,
}

impl TailCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            byte_offset: 0,
            identity: None,
        }
    }

    pub fn offset(&self) -> u64 {
        self.byte_offset
    }
}

/// Bytes read by one call to [`FileTailer::read_new`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailChunk {
    pub content: String,
    /// Bytes consumed from the file, which is what the cursor advanced by
    pub bytes_read: u64,
    /// The file had more bytes than one read may return
    pub has_more: bool,
}

pub struct FileTailer {
    descriptor: LogFileDescriptor,
    cursor: TailCursor,
    max_chunk_bytes: usize,
}

impl FileTailer {
    pub fn new(
        descriptor: LogFileDescriptor,
        max_chunk_bytes: usize,
    ) -> Self {
        let cursor = TailCursor::new(descriptor.path.clone());
        Self {
            descriptor,
            cursor,
            max_chunk_bytes: max_chunk_bytes.max(4),
        }
    }

    pub fn cursor(&self) -> &TailCursor {
        &self.cursor
    }

    /// Reads from the cursor to the current end of file.
    ///
    /// Returns `None` when nothing new is available, including when the
    /// file does not exist yet. The cursor restarts at 0 when the file is
    /// shorter than the cursor (truncated) or is no longer the file the
    /// cursor was reading (rotated by rename and recreate).
    pub async fn read_new(&mut self) -> Result<Option<TailChunk>> {
        let mut file = match File::open(&self.cursor.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} not found yet, waiting for it", self.cursor.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        let len = metadata.len();
        let identity = FileIdentity::of(&metadata);
        let replaced = self.cursor.identity.is_some() && identity != self.cursor.identity;
        if replaced && self.cursor.byte_offset > 0 {
            info!(
                "{} was replaced, restarting from the beginning",
                self.cursor.path.display()
            );
            self.reset();
        } else if self.cursor.byte_offset > len {
            info!(
                "{} shrank from {} to {} bytes, restarting from the beginning",
                self.cursor.path.display(),
                self.cursor.byte_offset,
                len
            );
            self.reset();
        }
        self.cursor.identity = identity;

        let available = len - self.cursor.byte_offset;
        if available == 0 {
            return Ok(None);
        }

        let limit = available.min(self.max_chunk_bytes as u64);
        file.seek(SeekFrom::Start(self.cursor.byte_offset)).await?;
        let mut buf = Vec::with_capacity(limit as usize);
        (&mut file).take(limit).read_to_end(&mut buf).await?;

        let consumed = complete_utf8_len(&buf);
        if consumed == 0 {
            // only part of a multi-byte character is on disk so far
            return Ok(None);
        }

        let content = String::from_utf8_lossy(&buf[..consumed]).into_owned();
        self.cursor.byte_offset += consumed as u64;
        trace!(
            "read {} bytes from {}, offset now {}",
            consumed,
            self.cursor.path.display(),
            self.cursor.byte_offset
        );

        Ok(Some(TailChunk {
            content,
            bytes_read: consumed as u64,
            has_more: self.cursor.byte_offset < len,
        }))
    }

    fn reset(&mut self) {
        TAIL_RESETS.with_label_values(&[self.descriptor.service.as_str()]).inc();
        self.cursor.byte_offset = 0;
    }
}

/// Length of `buf` without a trailing, incomplete UTF-8 sequence
pub(crate) fn complete_utf8_len(buf: &[u8]) -> usize {
    let start = buf.len().saturating_sub(3);
    for i in (start..buf.len()).rev() {
        let b = buf[i];
        if b & 0xC0 == 0x80 {
            // continuation byte, keep looking for the lead byte
            continue;
        }
        let width = match b {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if i + width > buf.len() { i } else { buf.len() };
    }
    buf.len()
}

/// Drives one tailer for the lifetime of its session.
///
/// Reads everything already in the file, then waits for change notifications.
/// Stops on cancellation or once the session no longer accepts events.
pub async fn run_tailer(
    mut tailer: FileTailer,
    changed: Arc<Notify>,
    sink: EventSink,
    cancel: CancellationToken,
) {
    let service = tailer.descriptor.service;
    loop {
        loop {
            if sink.is_closed() {
                return;
            }
            match tailer.read_new().await {
                Ok(Some(chunk)) => {
                    let has_more = chunk.has_more;
                    if sink.send(StreamEvent::log_update(service, chunk.content)).await.is_err() {
                        debug!("session closed, {} tailer stops", service);
                        return;
                    }
                    if !has_more {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("failed to read {}: {}", tailer.cursor.path.display(), e);
                    break;
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("{} tailer cancelled", service);
                return;
            }
            _ = changed.notified() => {}
        }
    }
}
