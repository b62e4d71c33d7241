//! Mapping of symbolic actions to concrete vendor space writes.

use std::fmt;
use std::str::FromStr;

use tracing::error;

use crate::layout::{Flag, MiscLayout};
use crate::MiscError;

/// Action to perform on the vendor space of the misc partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MiscWriterAction {
    /// No action has been selected.
    #[default]
    Unset,
    /// Set the dark theme flag.
    SetThemeFlag,
    /// Clear the dark theme flag.
    ClearThemeFlag,
    /// Set the SOTA flag.
    SetSotaFlag,
    /// Clear the SOTA flag.
    ClearSotaFlag,
}

impl MiscWriterAction {
    /// All actions, including [`MiscWriterAction::Unset`].
    pub const ALL: [MiscWriterAction; 5] = [
        MiscWriterAction::Unset,
        MiscWriterAction::SetThemeFlag,
        MiscWriterAction::ClearThemeFlag,
        MiscWriterAction::SetSotaFlag,
        MiscWriterAction::ClearSotaFlag,
    ];

    /// Action setting the given flag.
    pub fn set(flag: Flag) -> Self {
        match flag {
            Flag::Theme => MiscWriterAction::SetThemeFlag,
            Flag::Sota => MiscWriterAction::SetSotaFlag,
        }
    }

    /// Action clearing the given flag.
    pub fn clear(flag: Flag) -> Self {
        match flag {
            Flag::Theme => MiscWriterAction::ClearThemeFlag,
            Flag::Sota => MiscWriterAction::ClearSotaFlag,
        }
    }

    /// Flag affected by the action.
    pub fn flag(self) -> Option<Flag> {
        match self {
            MiscWriterAction::Unset => None,
            MiscWriterAction::SetThemeFlag | MiscWriterAction::ClearThemeFlag => Some(Flag::Theme),
            MiscWriterAction::SetSotaFlag | MiscWriterAction::ClearSotaFlag => Some(Flag::Sota),
        }
    }

    /// Indicates whether the action sets a flag.
    pub fn is_set(self) -> bool {
        matches!(
            self,
            MiscWriterAction::SetThemeFlag | MiscWriterAction::SetSotaFlag
        )
    }

    /// String representation of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            MiscWriterAction::Unset => "unset",
            MiscWriterAction::SetThemeFlag => "set-theme-flag",
            MiscWriterAction::ClearThemeFlag => "clear-theme-flag",
            MiscWriterAction::SetSotaFlag => "set-sota-flag",
            MiscWriterAction::ClearSotaFlag => "clear-sota-flag",
        }
    }

    /// Resolve the action into the write it requires.
    ///
    /// If given, `override_offset` replaces the default offset of the flag.
    pub fn resolve(
        self,
        layout: &MiscLayout,
        override_offset: Option<u64>,
    ) -> Result<FlagWrite, MiscError> {
        let (spec, set) = match self {
            MiscWriterAction::SetThemeFlag => (&layout.theme_flag, true),
            MiscWriterAction::ClearThemeFlag => (&layout.theme_flag, false),
            MiscWriterAction::SetSotaFlag => (&layout.sota_flag, true),
            MiscWriterAction::ClearSotaFlag => (&layout.sota_flag, false),
            MiscWriterAction::Unset => {
                error!("the misc writer action must be set");
                return Err(MiscError::ActionNotConfigured);
            }
        };
        Ok(FlagWrite {
            offset: override_offset.unwrap_or(spec.offset),
            content: if set {
                spec.set_bytes()
            } else {
                spec.clear_bytes()
            },
        })
    }
}

impl fmt::Display for MiscWriterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MiscWriterAction {
    type Err = MiscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| MiscError::UnknownName(s.to_owned()))
    }
}

/// Write into the vendor space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagWrite {
    /// Offset relative to the vendor space.
    pub offset: u64,
    /// Bytes to write.
    pub content: Vec<u8>,
}

impl FlagWrite {
    /// Size of the write in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::FlagSpec;

    fn layout() -> MiscLayout {
        MiscLayout {
            theme_flag: FlagSpec::new(5, "theme_dark"),
            ..MiscLayout::default()
        }
    }

    #[test]
    fn test_theme_flag() {
        let layout = layout();
        let set = MiscWriterAction::SetThemeFlag
            .resolve(&layout, None)
            .unwrap();
        assert_eq!(set.offset, 5);
        assert_eq!(set.content, b"theme_dark");
        let clear = MiscWriterAction::ClearThemeFlag
            .resolve(&layout, None)
            .unwrap();
        assert_eq!(clear.offset, 5);
        assert_eq!(clear.content, vec![0; 10]);
    }

    #[test]
    fn test_sota_flag() {
        let layout = MiscLayout::default();
        let set = MiscWriterAction::SetSotaFlag.resolve(&layout, None).unwrap();
        assert_eq!(set.offset, 32);
        assert_eq!(set.content, b"enable-sota");
        let clear = MiscWriterAction::ClearSotaFlag
            .resolve(&layout, None)
            .unwrap();
        assert_eq!(clear.offset, 32);
        assert_eq!(clear.size(), set.size());
        assert!(clear.content.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn test_override_offset() {
        let layout = layout();
        for action in [
            MiscWriterAction::SetThemeFlag,
            MiscWriterAction::ClearThemeFlag,
            MiscWriterAction::SetSotaFlag,
            MiscWriterAction::ClearSotaFlag,
        ] {
            let write = action.resolve(&layout, Some(1234)).unwrap();
            assert_eq!(write.offset, 1234);
        }
    }

    #[test]
    fn test_unset_action() {
        assert!(matches!(
            MiscWriterAction::Unset.resolve(&layout(), None),
            Err(MiscError::ActionNotConfigured)
        ));
        assert!(matches!(
            MiscWriterAction::Unset.resolve(&layout(), Some(0)),
            Err(MiscError::ActionNotConfigured)
        ));
        assert_eq!(MiscWriterAction::default(), MiscWriterAction::Unset);
    }

    #[test]
    fn test_action_names() {
        for action in MiscWriterAction::ALL {
            assert_eq!(action.as_str().parse::<MiscWriterAction>().unwrap(), action);
        }
        assert!("set-dark-theme".parse::<MiscWriterAction>().is_err());
    }

    #[test]
    fn test_set_and_clear_constructors() {
        for flag in Flag::ALL {
            assert!(MiscWriterAction::set(flag).is_set());
            assert!(!MiscWriterAction::clear(flag).is_set());
            assert_eq!(MiscWriterAction::set(flag).flag(), Some(flag));
            assert_eq!(MiscWriterAction::clear(flag).flag(), Some(flag));
        }
        assert_eq!(MiscWriterAction::Unset.flag(), None);
    }
}
