//! Resolution of the block device backing the misc partition.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Default mount table.
pub const DEFAULT_FSTAB_PATH: &str = "/etc/fstab";

/// Mount point of the misc partition.
pub const MISC_MOUNT_POINT: &str = "/misc";

/// Error resolving the block device of the misc partition.
#[derive(Debug, Error)]
pub enum DeviceNotFound {
    #[error("failed to read mount table {path:?}")]
    MountTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to find {mount_point} partition in {path:?}")]
    NoEntry { mount_point: String, path: PathBuf },
}

/// Resolves the block device the flags are written to.
pub trait DeviceResolver {
    /// Resolve the path of the block device.
    fn resolve(&self) -> Result<PathBuf, DeviceNotFound>;
}

impl<R: DeviceResolver + ?Sized> DeviceResolver for &R {
    fn resolve(&self) -> Result<PathBuf, DeviceNotFound> {
        (**self).resolve()
    }
}

impl<R: DeviceResolver + ?Sized> DeviceResolver for Box<R> {
    fn resolve(&self) -> Result<PathBuf, DeviceNotFound> {
        (**self).resolve()
    }
}

/// Resolves the device by looking up a mount point in a mount table.
///
/// The mount table is read again for every resolution.
#[derive(Debug, Clone)]
pub struct FstabResolver {
    fstab: PathBuf,
    mount_point: String,
}

impl FstabResolver {
    /// Resolver for the misc partition in the default mount table.
    pub fn new() -> Self {
        Self {
            fstab: DEFAULT_FSTAB_PATH.into(),
            mount_point: MISC_MOUNT_POINT.to_owned(),
        }
    }

    /// Use the given mount table instead of the default one.
    pub fn with_fstab(mut self, fstab: impl Into<PathBuf>) -> Self {
        self.fstab = fstab.into();
        self
    }

    /// Look up the given mount point instead of the misc partition.
    pub fn with_mount_point(mut self, mount_point: impl Into<String>) -> Self {
        self.mount_point = mount_point.into();
        self
    }
}

impl DeviceResolver for FstabResolver {
    fn resolve(&self) -> Result<PathBuf, DeviceNotFound> {
        find_device_for_mount_point(&self.fstab, &self.mount_point)
    }
}

/// Resolves to a fixed device path, bypassing any mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDevice(PathBuf);

impl FixedDevice {
    /// Create a resolver always returning the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

impl DeviceResolver for FixedDevice {
    fn resolve(&self) -> Result<PathBuf, DeviceNotFound> {
        Ok(self.0.clone())
    }
}

/// Find the device mounted at `mount_point` according to the mount table at `fstab`.
pub fn find_device_for_mount_point(
    fstab: &Path,
    mount_point: &str,
) -> Result<PathBuf, DeviceNotFound> {
    let table = std::fs::read_to_string(fstab).map_err(|source| DeviceNotFound::MountTable {
        path: fstab.to_owned(),
        source,
    })?;
    let Some(entry) = parse_fstab(&table)
        .into_iter()
        .find(|entry| entry.mount_point == mount_point)
    else {
        return Err(DeviceNotFound::NoEntry {
            mount_point: mount_point.to_owned(),
            path: fstab.to_owned(),
        });
    };
    let device = entry.device_path();
    debug!("found device {device:?} for {mount_point} in {fstab:?}");
    Ok(device)
}

/// Entry of a mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// Device specification, e.g., `/dev/sda1` or `PARTLABEL=misc`.
    pub device: String,
    /// Mount point.
    pub mount_point: String,
}

impl FstabEntry {
    /// Path of the device.
    ///
    /// Tagged specifications are translated to the respective udev symlinks.
    pub fn device_path(&self) -> PathBuf {
        const TAGS: [(&str, &str); 4] = [
            ("LABEL=", "/dev/disk/by-label"),
            ("UUID=", "/dev/disk/by-uuid"),
            ("PARTLABEL=", "/dev/disk/by-partlabel"),
            ("PARTUUID=", "/dev/disk/by-partuuid"),
        ];
        for (tag, dir) in TAGS {
            if let Some(value) = self.device.strip_prefix(tag) {
                return Path::new(dir).join(value);
            }
        }
        PathBuf::from(&self.device)
    }
}

/// Parse the entries of a mount table.
///
/// Comments, blank lines, and lines with less than two fields are skipped.
pub fn parse_fstab(table: &str) -> Vec<FstabEntry> {
    table
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_ascii_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            Some(FstabEntry {
                device: unescape(device),
                mount_point: unescape(mount_point),
            })
        })
        .collect()
}

/// Decode octal escapes like `\040` used for whitespace in mount tables.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'\\' && idx + 4 <= bytes.len() {
            let digits = &bytes[idx + 1..idx + 4];
            if digits.iter().all(|digit| (b'0'..=b'7').contains(digit)) {
                let value = digits
                    .iter()
                    .fold(0u32, |value, digit| value * 8 + u32::from(digit - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    decoded.push(byte);
                    idx += 4;
                    continue;
                }
            }
        }
        decoded.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
