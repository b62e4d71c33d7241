//! Write boot flags into the vendor space of the misc partition.
//!
//! The misc partition is a small raw partition read by the bootloader before any
//! filesystem is available. Flags are hence written at fixed byte offsets, without
//! any filesystem providing atomicity or bounds checks. [`MiscWriter`] makes sure
//! that writes stay within the vendor space and are flushed to the device.
//!
//! ```no_run
//! use misc_writer::{MiscWriter, MiscWriterAction};
//!
//! let writer: MiscWriter = MiscWriter::default();
//! writer.perform(MiscWriterAction::SetSotaFlag, None)?;
//! # Ok::<(), misc_writer::MiscError>(())
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

pub mod action;
pub mod block;
pub mod device;
pub mod layout;

pub use action::{FlagWrite, MiscWriterAction};
pub use block::{BlockWriteError, BlockWriter, RawBlockWriter};
pub use device::{DeviceNotFound, DeviceResolver, FixedDevice, FstabResolver};
pub use layout::{Flag, FlagSpec, MiscLayout, VendorSpace};

/// Error writing to the misc partition.
#[derive(Debug, Error)]
pub enum MiscError {
    #[error("the misc writer action must be set")]
    ActionNotConfigured,
    #[error("out of bound write (offset {offset} size {size})")]
    OutOfBounds { offset: u64, size: u64 },
    #[error(transparent)]
    DeviceNotFound(#[from] DeviceNotFound),
    #[error("failed to write {} at offset {offset}", device.display())]
    Write {
        device: PathBuf,
        offset: u64,
        #[source]
        source: BlockWriteError,
    },
    #[error("failed to read {} at offset {offset}", device.display())]
    Read {
        device: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("invalid misc layout: {0}")]
    InvalidLayout(String),
    #[error("unknown name {0:?}")]
    UnknownName(String),
}

impl MiscError {
    /// Underlying block device error, if the write to the device failed.
    pub fn block_error(&self) -> Option<&BlockWriteError> {
        match self {
            MiscError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// State of a flag as found on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagState {
    /// The flag's tag is present.
    Set,
    /// The flag's region is all zeros.
    Clear,
    /// The flag's region holds something else.
    Unknown(Vec<u8>),
}

impl FlagState {
    fn from_bytes(spec: &FlagSpec, bytes: Vec<u8>) -> Self {
        if bytes == spec.tag.as_bytes() {
            FlagState::Set
        } else if bytes.iter().all(|byte| *byte == 0) {
            FlagState::Clear
        } else {
            FlagState::Unknown(bytes)
        }
    }
}

/// Writer for the vendor space of the misc partition.
///
/// Every call resolves the device anew and retains no state. Callers must make sure
/// that at most one writer is active for a partition at any time.
#[derive(Debug, Clone)]
pub struct MiscWriter<R = FstabResolver, W = RawBlockWriter> {
    resolver: R,
    writer: W,
    layout: MiscLayout,
    vendor_space: VendorSpace,
}

impl Default for MiscWriter {
    fn default() -> Self {
        Self::new(FstabResolver::new())
    }
}

impl<R: DeviceResolver> MiscWriter<R, RawBlockWriter> {
    /// Create a writer for the device provided by the resolver with the default
    /// layout.
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            writer: RawBlockWriter::new(),
            layout: MiscLayout::default(),
            vendor_space: VendorSpace::DEFAULT,
        }
    }
}

impl<R: DeviceResolver, W: BlockWriter> MiscWriter<R, W> {
    /// Use the given layout.
    pub fn with_layout(mut self, layout: MiscLayout) -> Result<Self, MiscError> {
        layout.validate()?;
        self.vendor_space = layout.vendor_space()?;
        self.layout = layout;
        Ok(self)
    }

    /// Use the given block writer.
    pub fn with_block_writer<V: BlockWriter>(self, writer: V) -> MiscWriter<R, V> {
        MiscWriter {
            resolver: self.resolver,
            writer,
            layout: self.layout,
            vendor_space: self.vendor_space,
        }
    }

    /// Block writer used by the writer.
    pub fn block_writer(&self) -> &W {
        &self.writer
    }

    /// Layout used by the writer.
    pub fn layout(&self) -> &MiscLayout {
        &self.layout
    }

    /// Perform the given action.
    ///
    /// If given, `override_offset` replaces the default vendor space offset of the
    /// affected flag.
    pub fn perform(
        &self,
        action: MiscWriterAction,
        override_offset: Option<u64>,
    ) -> Result<(), MiscError> {
        let write = action.resolve(&self.layout, override_offset)?;
        self.write_vendor_space(write.offset, &write.content)
            .inspect_err(|error| debug!("failed to perform {action}: {error}"))?;
        info!(offset = write.offset, size = write.size(), "performed {action}");
        Ok(())
    }

    /// Write `data` at the given offset relative to the vendor space.
    pub fn write_vendor_space(&self, offset: u64, data: &[u8]) -> Result<(), MiscError> {
        let size = data.len() as u64;
        if !self.vendor_space.in_bounds(offset, size) {
            return Err(MiscError::OutOfBounds { offset, size });
        }
        let device = self.resolver.resolve()?;
        let offset = self.vendor_space.absolute_offset(offset);
        debug!("writing {size} bytes to {device:?} at offset {offset}");
        self.writer
            .write_at(&device, offset, data)
            .map_err(|source| MiscError::Write {
                device,
                offset,
                source,
            })
    }

    /// Read the state of the given flag from the device.
    pub fn flag_state(&self, flag: Flag) -> Result<FlagState, MiscError> {
        let spec = self.layout.flag(flag);
        if !self.vendor_space.in_bounds(spec.offset, spec.size()) {
            return Err(MiscError::OutOfBounds {
                offset: spec.offset,
                size: spec.size(),
            });
        }
        let device = self.resolver.resolve()?;
        let offset = self.vendor_space.absolute_offset(spec.offset);
        let bytes = block::read_at(&device, offset, spec.size())
            .map_err(|source| MiscError::Read {
                device,
                offset,
                source,
            })?;
        Ok(FlagState::from_bytes(spec, bytes))
    }
}
