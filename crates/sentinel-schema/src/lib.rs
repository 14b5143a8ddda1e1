//! Schema version parsing and compatibility checks.
//!
//! Persisted documents (state, policy, retry queue entries) are tagged
//! with a version string like `sentinel.state.v3`. This crate parses
//! that tag and decides whether a given binary understands it, so a
//! "file from a newer build" can be told apart from "file is corrupt."

use std::fmt;

/// Minimum schema version this crate considers well-formed.
pub const MINIMUM_VERSION: u32 = 1;

/// A parsed `<namespace>.<kind>.v<N>` schema tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion {
    version: u32,
}

impl SchemaVersion {
    /// Construct directly from a version number.
    pub fn new(version: u32) -> Self {
        Self { version }
    }

    /// Parse a tag of the form `sentinel.state.v3`.
    ///
    /// The namespace and kind segments are not validated against a
    /// fixed list; callers that care which kind they got should check
    /// the full string themselves via [`SchemaVersion::parse_checked`].
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let parts: Vec<&str> = s.split('.').collect();
        let [_, _, version_part] = parts.as_slice() else {
            return Err(SchemaError::Malformed(s.to_string()));
        };
        let version_part = version_part
            .strip_prefix('v')
            .ok_or_else(|| SchemaError::Malformed(s.to_string()))?;
        let version = version_part
            .parse::<u32>()
            .map_err(|_| SchemaError::Malformed(s.to_string()))?;
        Ok(Self { version })
    }

    /// Parse a tag and additionally require the namespace/kind segments
    /// match exactly, e.g. `parse_checked("sentinel.state.v3", "sentinel", "state")`.
    pub fn parse_checked(s: &str, namespace: &str, kind: &str) -> Result<Self, SchemaError> {
        let parts: Vec<&str> = s.split('.').collect();
        let [ns, k, _] = parts.as_slice() else {
            return Err(SchemaError::Malformed(s.to_string()));
        };
        if *ns != namespace || *k != kind {
            return Err(SchemaError::WrongKind {
                expected: format!("{namespace}.{kind}"),
                found: format!("{ns}.{k}"),
            });
        }
        Self::parse(s)
    }

    /// The raw version number.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Render back to a `<namespace>.<kind>.v<N>` tag.
    pub fn tag(&self, namespace: &str, kind: &str) -> String {
        format!("{namespace}.{kind}.v{}", self.version)
    }

    /// Whether a document tagged with this version can be loaded by a
    /// binary that supports versions in `[min_supported, current]`.
    pub fn is_supported(&self, min_supported: u32, current: u32) -> bool {
        self.version >= min_supported && self.version <= current
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version)
    }
}

/// Errors from parsing or validating a schema tag.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("malformed schema tag: {0}")]
    Malformed(String),
    #[error("schema tag has wrong namespace/kind: expected {expected}, found {found}")]
    WrongKind { expected: String, found: String },
    #[error("unsupported schema version {found}: this build supports {min}..={max}")]
    Unsupported { found: u32, min: u32, max: u32 },
}

/// Parse and validate in one step, returning `Unsupported` if the
/// version is outside the binary's supported range.
pub fn validate(s: &str, min_supported: u32, current: u32) -> Result<SchemaVersion, SchemaError> {
    let v = SchemaVersion::parse(s)?;
    if v.is_supported(min_supported, current) {
        Ok(v)
    } else {
        Err(SchemaError::Unsupported {
            found: v.version(),
            min: min_supported,
            max: current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_tag() {
        let v = SchemaVersion::parse("sentinel.state.v3").unwrap();
        assert_eq!(v.version(), 3);
    }

    #[test]
    fn rejects_missing_v_prefix() {
        assert!(SchemaVersion::parse("sentinel.state.3").is_err());
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(SchemaVersion::parse("sentinel.v3").is_err());
    }

    #[test]
    fn parse_checked_rejects_wrong_kind() {
        let err = SchemaVersion::parse_checked("sentinel.policy.v1", "sentinel", "state")
            .unwrap_err();
        assert!(matches!(err, SchemaError::WrongKind { .. }));
    }

    #[test]
    fn tag_round_trips() {
        let v = SchemaVersion::new(2);
        let tag = v.tag("sentinel", "state");
        assert_eq!(tag, "sentinel.state.v2");
        assert_eq!(SchemaVersion::parse(&tag).unwrap(), v);
    }

    #[test]
    fn is_supported_bounds() {
        let v = SchemaVersion::new(2);
        assert!(v.is_supported(1, 3));
        assert!(!v.is_supported(3, 5));
        assert!(!v.is_supported(0, 1));
    }

    #[test]
    fn validate_reports_unsupported() {
        let err = validate("sentinel.state.v9", 1, 3).unwrap_err();
        assert!(matches!(err, SchemaError::Unsupported { found: 9, .. }));
    }

    #[test]
    fn ordering_is_by_version() {
        assert!(SchemaVersion::new(1) < SchemaVersion::new(2));
    }
}
