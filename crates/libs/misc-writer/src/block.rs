//! Raw writes to block devices.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::trace;

/// Error writing to a block device.
///
/// The device handle is always closed when this error is returned.
#[derive(Debug, Error)]
pub enum BlockWriteError {
    #[error("failed to open {}", device.display())]
    Open {
        device: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to seek {} to offset {offset}", device.display())]
    Seek {
        device: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}", device.display())]
    Write {
        device: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to sync {}", device.display())]
    Sync {
        device: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes bytes at absolute offsets of a device.
pub trait BlockWriter {
    /// Write `data` at the absolute `offset` of `device` and flush it to the device.
    fn write_at(&self, device: &Path, offset: u64, data: &[u8]) -> Result<(), BlockWriteError>;
}

impl<W: BlockWriter + ?Sized> BlockWriter for &W {
    fn write_at(&self, device: &Path, offset: u64, data: &[u8]) -> Result<(), BlockWriteError> {
        (**self).write_at(device, offset, data)
    }
}

/// Writes directly to the device file.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBlockWriter;

impl RawBlockWriter {
    /// Create a raw block writer.
    pub fn new() -> Self {
        Self
    }
}

impl BlockWriter for RawBlockWriter {
    fn write_at(&self, device: &Path, offset: u64, data: &[u8]) -> Result<(), BlockWriteError> {
        trace!("opening {device:?} for writing");
        // The device is opened write-only and never created or truncated. Dropping the
        // file closes it, whichever step fails.
        let mut file = OpenOptions::new()
            .write(true)
            .open(device)
            .map_err(|source| BlockWriteError::Open {
                device: device.to_owned(),
                source,
            })?;
        seek_exact(&mut file, offset).map_err(|source| BlockWriteError::Seek {
            device: device.to_owned(),
            offset,
            source,
        })?;
        trace!("writing {} bytes at offset {offset}", data.len());
        file.write_all(data)
            .and_then(|_| file.flush())
            .map_err(|source| BlockWriteError::Write {
                device: device.to_owned(),
                source,
            })?;
        trace!("syncing {device:?}");
        file.sync_all().map_err(|source| BlockWriteError::Sync {
            device: device.to_owned(),
            source,
        })?;
        Ok(())
    }
}

/// Seek to `offset` and check that the file is actually positioned there.
fn seek_exact(file: &mut File, offset: u64) -> io::Result<()> {
    let position = file.seek(SeekFrom::Start(offset))?;
    if position != offset {
        return Err(io::Error::other(format!("seek ended at offset {position}")));
    }
    Ok(())
}

/// Read `size` bytes at the absolute `offset` of `device`.
pub fn read_at(device: &Path, offset: u64, size: u64) -> io::Result<Vec<u8>> {
    let mut file = File::open(device)?;
    seek_exact(&mut file, offset)?;
    let size = usize::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "size exceeds `usize`"))?;
    let mut buffer = vec![0; size];
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}
