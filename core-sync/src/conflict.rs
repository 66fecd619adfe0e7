//! Conflict policy and conflict-copy path construction.
//!
//! A conflict is a divergence between the local content checksum and the
//! checksum the provider reports for the object already at the target
//! path. Policies decide what an upload does when it meets one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// What an upload does when the remote object's checksum differs from the
/// local content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConflictPolicy {
    /// Write the local content to a timestamped sibling path and leave
    /// the original remote object untouched.
    #[default]
    CreateCopy,
    /// Overwrite the remote object with the local content.
    PreferLocal,
    /// Keep the remote object; the local upload is skipped.
    PreferRemote,
    /// Interactive resolution. The engine itself cannot prompt, so this
    /// degrades to `PreferLocal`; any prompting happens in the UI layer
    /// before the intent is enqueued.
    AskUser,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCopy => "create_copy",
            Self::PreferLocal => "prefer_local",
            Self::PreferRemote => "prefer_remote",
            Self::AskUser => "ask_user",
        }
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_copy" => Ok(Self::CreateCopy),
            "prefer_local" => Ok(Self::PreferLocal),
            "prefer_remote" => Ok(Self::PreferRemote),
            "ask_user" => Ok(Self::AskUser),
            _ => Err(SyncError::InvalidStatus(format!(
                "Unknown conflict policy: {}",
                s
            ))),
        }
    }
}

/// Build the sibling path a conflict copy is written to.
///
/// `/App/journal/r1.json` becomes
/// `/App/journal/r1 (conflict 2026-08-06 14-30-05).json`; extensionless
/// names get the suffix appended.
pub fn conflict_copy_path(path: &str, at: DateTime<Utc>) -> String {
    let stamp = at.format("%Y-%m-%d %H-%M-%S");
    match path.rfind('/') {
        Some(slash) => {
            let (dir, name) = path.split_at(slash + 1);
            match name.rfind('.') {
                Some(dot) if dot > 0 => {
                    let (stem, ext) = name.split_at(dot);
                    format!("{}{} (conflict {}){}", dir, stem, stamp, ext)
                }
                _ => format!("{}{} (conflict {})", dir, name, stamp),
            }
        }
        None => match path.rfind('.') {
            Some(dot) if dot > 0 => {
                let (stem, ext) = path.split_at(dot);
                format!("{} (conflict {}){}", stem, stamp, ext)
            }
            _ => format!("{} (conflict {})", path, stamp),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 14, 30, 5).unwrap()
    }

    #[test]
    fn test_policy_round_trip() {
        for policy in [
            ConflictPolicy::CreateCopy,
            ConflictPolicy::PreferLocal,
            ConflictPolicy::PreferRemote,
            ConflictPolicy::AskUser,
        ] {
            assert_eq!(policy.as_str().parse::<ConflictPolicy>().unwrap(), policy);
        }
        assert!("winner_takes_all".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn test_default_policy_is_create_copy() {
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::CreateCopy);
    }

    #[test]
    fn test_copy_path_with_extension() {
        assert_eq!(
            conflict_copy_path("/App/journal/r1.json", instant()),
            "/App/journal/r1 (conflict 2026-08-06 14-30-05).json"
        );
    }

    #[test]
    fn test_copy_path_without_extension() {
        assert_eq!(
            conflict_copy_path("/App/notes/readme", instant()),
            "/App/notes/readme (conflict 2026-08-06 14-30-05)"
        );
    }

    #[test]
    fn test_copy_path_dotfile_keeps_name() {
        // A leading dot is a hidden-file name, not an extension
        assert_eq!(
            conflict_copy_path("/App/.daybook", instant()),
            "/App/.daybook (conflict 2026-08-06 14-30-05)"
        );
    }

    #[test]
    fn test_copy_path_bare_name() {
        assert_eq!(
            conflict_copy_path("r1.json", instant()),
            "r1 (conflict 2026-08-06 14-30-05).json"
        );
    }
}
