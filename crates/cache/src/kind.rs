//! Cache namespaces and key-to-file-name mapping.

use crate::error::{ErrorKind, Result};
use std::fmt::{self, Display};

// Keys longer than this get hashed so the file name stays well under the
// 255-byte limit of common filesystems once the extension is added.
const MAX_VERBATIM_KEY_LEN: usize = 128;

/// A namespace partition of the cache, stored as one directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Projects,
    Commits,
    Pipelines,
    Metadata,
    /// Caller-defined namespace. The name must be usable as a directory name
    /// (`[A-Za-z0-9._-]`, not starting with `.`).
    Custom(String),
}
impl Kind {
    /// Kinds whose directories are created when a store is opened.
    pub const BUILTIN: [Kind; 4] = [Kind::Projects, Kind::Commits, Kind::Pipelines, Kind::Metadata];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Projects => "projects",
            Self::Commits => "commits",
            Self::Pipelines => "pipelines",
            Self::Metadata => "metadata",
            Self::Custom(name) => name,
        }
    }

    /// Directory name for this kind, rejecting custom names that would escape
    /// or nest inside the cache root.
    pub(crate) fn dir_name(&self) -> Result<&str> {
        let name = self.as_str();
        if !is_plain_name(name) {
            exn::bail!(ErrorKind::InvalidKind(name.to_string()));
        }
        Ok(name)
    }
}
impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl From<&str> for Kind {
    fn from(value: &str) -> Self {
        match value {
            "projects" => Self::Projects,
            "commits" => Self::Commits,
            "pipelines" => Self::Pipelines,
            "metadata" => Self::Metadata,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Deterministic file stem for a key.
///
/// Plain keys such as `project_42` are used as-is so the cache directory
/// stays browsable. Anything else (slashes, spaces, unicode, overly long) is
/// replaced by its BLAKE3 digest in hex.
pub(crate) fn file_stem(key: &str) -> Result<String> {
    if key.is_empty() {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    if is_plain_name(key) && key.len() <= MAX_VERBATIM_KEY_LEN {
        Ok(key.to_string())
    } else {
        Ok(blake3::hash(key.as_bytes()).to_hex().to_string())
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("project_42", true)]
    #[case("project-42.v2", true)]
    #[case("project_list", true)]
    #[case(".hidden", false)]
    #[case("..", false)]
    #[case("group/project", false)]
    #[case("with space", false)]
    #[case("dev@example.com", false)]
    #[case("ünïcode", false)]
    #[case("", false)]
    fn test_is_plain_name(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_plain_name(name), expected);
    }

    #[test]
    fn test_file_stem_verbatim() {
        assert_eq!(file_stem("project_42").unwrap(), "project_42");
    }

    #[rstest]
    #[case("group/project")]
    #[case("../../etc/passwd")]
    #[case("dev@example.com")]
    fn test_file_stem_hashed(#[case] key: &str) {
        let stem = file_stem(key).unwrap();
        assert_eq!(stem.len(), 64);
        assert!(stem.bytes().all(|b| b.is_ascii_hexdigit()));
        // Deterministic
        assert_eq!(stem, file_stem(key).unwrap());
    }

    #[test]
    fn test_file_stem_long_key_is_hashed() {
        let key = "a".repeat(MAX_VERBATIM_KEY_LEN + 1);
        assert_eq!(file_stem(&key).unwrap().len(), 64);
        let key = "a".repeat(MAX_VERBATIM_KEY_LEN);
        assert_eq!(file_stem(&key).unwrap(), key);
    }

    #[test]
    fn test_file_stem_empty() {
        let err = file_stem("").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[rstest]
    #[case(Kind::Commits, "commits")]
    #[case(Kind::Custom("events".to_string()), "events")]
    fn test_kind_round_trip(#[case] kind: Kind, #[case] name: &str) {
        assert_eq!(kind.as_str(), name);
        assert_eq!(Kind::from(name), kind);
    }

    #[rstest]
    #[case("../escape")]
    #[case("nested/kind")]
    #[case("")]
    fn test_custom_kind_rejected(#[case] name: &str) {
        let err = Kind::Custom(name.to_string()).dir_name().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKind(_)));
    }
}
