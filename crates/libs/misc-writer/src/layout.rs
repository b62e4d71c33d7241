//! Layout of the misc partition and the flags stored in its vendor space.
//!
//! The misc partition starts with the bootloader message. The region between
//! [`VENDOR_SPACE_OFFSET_IN_MISC`] and [`WIPE_PACKAGE_OFFSET_IN_MISC`] is reserved for
//! vendor-defined flags. Every flag lives at a fixed offset relative to the start of
//! the vendor space and is either set (its tag) or cleared (zeros of the same length).

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::MiscError;

/// Offset of the bootloader message in the misc partition.
pub const BOOTLOADER_MESSAGE_OFFSET_IN_MISC: u64 = 0;

/// Offset of the vendor space in the misc partition.
pub const VENDOR_SPACE_OFFSET_IN_MISC: u64 = 2 * 1024;

/// Offset of the wipe package in the misc partition.
///
/// The vendor space ends right before the wipe package.
pub const WIPE_PACKAGE_OFFSET_IN_MISC: u64 = 16 * 1024;

/// Offset of the theme flag relative to the vendor space.
pub const THEME_FLAG_OFFSET_IN_VENDOR_SPACE: u64 = 0;

/// Tag written for a set theme flag.
pub const THEME_FLAG_TAG: &str = "theme-dark";

/// Offset of the SOTA flag relative to the vendor space.
pub const SOTA_FLAG_OFFSET_IN_VENDOR_SPACE: u64 = 32;

/// Tag written for a set SOTA flag.
pub const SOTA_FLAG_TAG: &str = "enable-sota";

/// Check whether `size` bytes at `offset` fit into a region of `total` bytes.
///
/// The subtraction is only carried out after checking `size <= total`, hence, this
/// never underflows, also not for `size` values close to [`u64::MAX`].
pub const fn in_bounds(total: u64, offset: u64, size: u64) -> bool {
    size <= total && offset <= total - size
}

/// Vendor space of the misc partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VendorSpace {
    /// Absolute offset of the first byte of the vendor space.
    start: u64,
    /// Absolute offset right after the last byte of the vendor space.
    end: u64,
}

impl VendorSpace {
    /// Vendor space of the conventional misc partition layout.
    pub const DEFAULT: Self = Self {
        start: VENDOR_SPACE_OFFSET_IN_MISC,
        end: WIPE_PACKAGE_OFFSET_IN_MISC,
    };

    /// Create a vendor space spanning `start..end` of the misc partition.
    pub fn new(start: u64, end: u64) -> Result<Self, MiscError> {
        if start >= end {
            return Err(MiscError::InvalidLayout(format!(
                "vendor space offset ({start}) must be smaller than wipe package offset ({end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Absolute offset of the vendor space in the misc partition.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Absolute offset right after the vendor space.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Size of the vendor space in bytes.
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Check whether `size` bytes at the vendor-relative `offset` fit into the vendor
    /// space.
    pub fn in_bounds(&self, offset: u64, size: u64) -> bool {
        in_bounds(self.size(), offset, size)
    }

    /// Translate a vendor-relative offset into an absolute offset.
    ///
    /// Only meaningful for offsets that passed [`VendorSpace::in_bounds`].
    pub fn absolute_offset(&self, offset: u64) -> u64 {
        self.start + offset
    }
}

impl Default for VendorSpace {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Flag stored in the vendor space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Dark theme enabled.
    Theme,
    /// Seamless update in progress.
    Sota,
}

impl Flag {
    /// All known flags.
    pub const ALL: [Flag; 2] = [Flag::Theme, Flag::Sota];

    /// Name of the flag.
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::Theme => "theme",
            Flag::Sota => "sota",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flag {
    type Err = MiscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "theme" => Ok(Flag::Theme),
            "sota" => Ok(Flag::Sota),
            _ => Err(MiscError::UnknownName(s.to_owned())),
        }
    }
}

/// Position and tag of a flag in the vendor space.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FlagSpec {
    /// Offset relative to the vendor space.
    pub offset: u64,
    /// Tag written when the flag is set.
    pub tag: String,
}

impl FlagSpec {
    /// Create a flag specification.
    pub fn new(offset: u64, tag: impl Into<String>) -> Self {
        Self {
            offset,
            tag: tag.into(),
        }
    }

    /// Bytes representing the set flag.
    pub fn set_bytes(&self) -> Vec<u8> {
        self.tag.as_bytes().to_vec()
    }

    /// Bytes representing the cleared flag.
    ///
    /// Always as long as the tag such that every byte of the set flag is overwritten.
    pub fn clear_bytes(&self) -> Vec<u8> {
        vec![0; self.tag.len()]
    }

    /// Size of the flag in bytes.
    pub fn size(&self) -> u64 {
        self.tag.len() as u64
    }
}

/// Layout of the misc partition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct MiscLayout {
    /// Absolute offset of the vendor space.
    pub vendor_space_offset: u64,
    /// Absolute offset of the wipe package.
    pub wipe_package_offset: u64,
    /// Theme flag.
    pub theme_flag: FlagSpec,
    /// SOTA flag.
    pub sota_flag: FlagSpec,
}

impl MiscLayout {
    /// Check the layout for consistency.
    ///
    /// Overlapping flags are not detected.
    pub fn validate(&self) -> Result<(), MiscError> {
        self.vendor_space()?;
        for flag in Flag::ALL {
            if self.flag(flag).tag.is_empty() {
                return Err(MiscError::InvalidLayout(format!(
                    "tag of {flag} flag must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Vendor space described by the layout.
    pub fn vendor_space(&self) -> Result<VendorSpace, MiscError> {
        VendorSpace::new(self.vendor_space_offset, self.wipe_package_offset)
    }

    /// Specification of the given flag.
    pub fn flag(&self, flag: Flag) -> &FlagSpec {
        match flag {
            Flag::Theme => &self.theme_flag,
            Flag::Sota => &self.sota_flag,
        }
    }
}

impl Default for MiscLayout {
    fn default() -> Self {
        Self {
            vendor_space_offset: VENDOR_SPACE_OFFSET_IN_MISC,
            wipe_package_offset: WIPE_PACKAGE_OFFSET_IN_MISC,
            theme_flag: FlagSpec::new(THEME_FLAG_OFFSET_IN_VENDOR_SPACE, THEME_FLAG_TAG),
            sota_flag: FlagSpec::new(SOTA_FLAG_OFFSET_IN_VENDOR_SPACE, SOTA_FLAG_TAG),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_in_bounds() {
        let space = VendorSpace::new(1000, 1100).unwrap();
        assert_eq!(space.size(), 100);
        assert!(space.in_bounds(90, 10));
        assert!(space.in_bounds(0, 100));
        assert!(space.in_bounds(100, 0));
        assert!(!space.in_bounds(91, 10));
        assert!(!space.in_bounds(0, 101));
        assert!(!space.in_bounds(101, 0));
        for offset in [0, 1, 50, 100, u64::MAX] {
            assert!(!space.in_bounds(offset, 101));
            assert!(!space.in_bounds(offset, u64::MAX));
        }
    }

    #[test]
    fn test_in_bounds_exhaustive() {
        let total = 100;
        for offset in 0..=120 {
            for size in 0..=120 {
                assert_eq!(
                    in_bounds(total, offset, size),
                    offset + size <= total,
                    "offset {offset}, size {size}"
                );
            }
        }
    }

    #[test]
    fn test_invalid_vendor_space() {
        assert!(matches!(
            VendorSpace::new(100, 100),
            Err(MiscError::InvalidLayout(_))
        ));
        assert!(matches!(
            VendorSpace::new(200, 100),
            Err(MiscError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_default_flags_do_not_overlap() {
        let layout = MiscLayout::default();
        layout.validate().unwrap();
        let space = layout.vendor_space().unwrap();
        assert_eq!(space, VendorSpace::DEFAULT);
        assert!(space.start() > BOOTLOADER_MESSAGE_OFFSET_IN_MISC);
        let theme = layout.flag(Flag::Theme);
        let sota = layout.flag(Flag::Sota);
        assert!(space.in_bounds(theme.offset, theme.size()));
        assert!(space.in_bounds(sota.offset, sota.size()));
        assert!(
            theme.offset + theme.size() <= sota.offset || sota.offset + sota.size() <= theme.offset
        );
    }

    #[test]
    fn test_clear_bytes_match_tag_length() {
        let spec = FlagSpec::new(5, "theme_dark");
        assert_eq!(spec.set_bytes(), b"theme_dark");
        assert_eq!(spec.clear_bytes(), vec![0; 10]);
    }

    #[test]
    fn test_layout_from_toml() {
        let layout = toml::from_str::<MiscLayout>(indoc! {r#"
            vendor-space-offset = 4096
            wipe-package-offset = 8192

            [sota-flag]
            offset = 64
            tag = "sota"
        "#})
        .unwrap();
        assert_eq!(layout.vendor_space().unwrap().size(), 4096);
        assert_eq!(layout.theme_flag, MiscLayout::default().theme_flag);
        assert_eq!(layout.sota_flag, FlagSpec::new(64, "sota"));
    }

    #[test]
    fn test_layout_validation() {
        let mut layout = toml::from_str::<MiscLayout>(indoc! {r#"
            vendor-space-offset = 8192
            wipe-package-offset = 4096
        "#})
        .unwrap();
        assert!(layout.validate().is_err());
        layout.wipe_package_offset = 16384;
        layout.validate().unwrap();
        layout.theme_flag.tag.clear();
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_flag_names() {
        for flag in Flag::ALL {
            assert_eq!(flag.as_str().parse::<Flag>().unwrap(), flag);
        }
        assert!("dark".parse::<Flag>().is_err());
    }
}
