//! Release-secret resolution and constant-time verification for the
//! release protocol.
//!
//! The release secret is never accepted as a CLI argument — only an
//! environment variable or a secrets file, in that order — so it never
//! appears in shell history or a process listing.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variable holding the release/renewal secret directly.
pub const RELEASE_SECRET_ENV: &str = "SENTINEL_RELEASE_SECRET";

/// Environment variable pointing at a file containing the secret,
/// checked if `RELEASE_SECRET_ENV` is unset.
pub const RELEASE_SECRET_FILE_ENV: &str = "SENTINEL_RELEASE_SECRET_FILE";

/// Default secrets file name under a project's data directory, used if
/// neither environment variable is set.
pub const SECRET_FILE: &str = "release.secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    None,
    EnvDirect,
    EnvFile,
    DataDirFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::None => write!(f, "none"),
            SecretSource::EnvDirect => write!(f, "{RELEASE_SECRET_ENV}"),
            SecretSource::EnvFile => write!(f, "{RELEASE_SECRET_FILE_ENV}"),
            SecretSource::DataDirFile => write!(f, SECRET_FILE),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedSecret {
    pub secret: Option<String>,
    pub source: SecretSource,
}

/// Resolve the release secret for a project: environment variable
/// first, then a secrets file next to the project's state.
///
/// 1. `SENTINEL_RELEASE_SECRET` environment variable.
/// 2. A file named by `SENTINEL_RELEASE_SECRET_FILE`.
/// 3. `<data_dir>/release.secret`, if it exists.
pub fn resolve_secret(data_dir: &Path) -> Result<ResolvedSecret> {
    if let Ok(secret) = env::var(RELEASE_SECRET_ENV)
        && !secret.is_empty()
    {
        return Ok(ResolvedSecret { secret: Some(secret), source: SecretSource::EnvDirect });
    }

    if let Ok(path) = env::var(RELEASE_SECRET_FILE_ENV) {
        let secret = read_secret_file(Path::new(&path))?;
        return Ok(ResolvedSecret { secret: Some(secret), source: SecretSource::EnvFile });
    }

    let default_path = data_dir.join(SECRET_FILE);
    if default_path.exists() {
        let secret = read_secret_file(&default_path)?;
        return Ok(ResolvedSecret { secret: Some(secret), source: SecretSource::DataDirFile });
    }

    Ok(ResolvedSecret { secret: None, source: SecretSource::None })
}

fn read_secret_file(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read release secret file {}", path.display()))?;
    Ok(content.trim().to_string())
}

/// Compare two secrets without leaking timing information about where
/// the first mismatching byte is. Length is not secret (it's a UX
/// concern, not a security boundary), but byte content is compared in
/// full regardless of an early difference.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (a, b) in provided.bytes().zip(expected.bytes()) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn matching_secrets_compare_equal() {
        assert!(secrets_match("hunter2", "hunter2"));
    }

    #[test]
    fn mismatched_length_is_not_equal() {
        assert!(!secrets_match("short", "longer-secret"));
    }

    #[test]
    fn single_byte_difference_is_not_equal() {
        assert!(!secrets_match("hunter2", "hunter3"));
    }

    #[test]
    fn resolves_from_env_var_first() {
        let dir = tempdir().unwrap();
        temp_env::with_var(RELEASE_SECRET_ENV, Some("from-env"), || {
            let resolved = resolve_secret(dir.path()).unwrap();
            assert_eq!(resolved.secret.as_deref(), Some("from-env"));
            assert_eq!(resolved.source, SecretSource::EnvDirect);
        });
    }

    #[test]
    fn falls_back_to_data_dir_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SECRET_FILE), "from-file\n").unwrap();
        temp_env::with_vars(
            [(RELEASE_SECRET_ENV, None::<&str>), (RELEASE_SECRET_FILE_ENV, None::<&str>)],
            || {
                let resolved = resolve_secret(dir.path()).unwrap();
                assert_eq!(resolved.secret.as_deref(), Some("from-file"));
                assert_eq!(resolved.source, SecretSource::DataDirFile);
            },
        );
    }

    #[test]
    fn no_secret_configured_returns_none() {
        let dir = tempdir().unwrap();
        temp_env::with_vars(
            [(RELEASE_SECRET_ENV, None::<&str>), (RELEASE_SECRET_FILE_ENV, None::<&str>)],
            || {
                let resolved = resolve_secret(dir.path()).unwrap();
                assert!(resolved.secret.is_none());
                assert_eq!(resolved.source, SecretSource::None);
            },
        );
    }
}
