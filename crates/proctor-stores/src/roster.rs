//! TOML roster authentication.
//!
//! ```toml
//! [[operators]]
//! username = "root"
//! password = "change-me"
//! role = "super_operator"
//!
//! [[candidates]]
//! username = "alice"
//! password = "secret"
//! banned = false
//!
//! [candidates.profile]
//! full_name = "Alice Example"
//! ```
//!
//! Operators are checked before candidates, so a name present in both
//! resolves to the operator role.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use proctor_core::error::StoreError;
use proctor_core::model::{CandidateProfile, Role};
use proctor_core::traits::AuthCollaborator;

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    operators: Vec<OperatorEntry>,
    #[serde(default)]
    candidates: Vec<CandidateEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct OperatorEntry {
    username: String,
    password: String,
    role: Role,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateEntry {
    username: String,
    password: String,
    #[serde(default)]
    banned: bool,
    #[serde(default)]
    profile: CandidateProfile,
}

/// Credential check against a roster file.
#[derive(Debug)]
pub struct RosterAuth {
    operators: Vec<OperatorEntry>,
    candidates: Vec<CandidateEntry>,
}

impl RosterAuth {
    /// Load a roster from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read roster: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid roster: {}", path.display()))
    }

    /// Parse a roster from a TOML string. Candidate profiles are validated here.
    pub fn from_toml(content: &str) -> Result<Self> {
        let roster: RosterFile = toml::from_str(content).context("failed to parse roster TOML")?;

        for operator in &roster.operators {
            if operator.role == Role::Candidate {
                anyhow::bail!(
                    "operator {} cannot have the candidate role",
                    operator.username
                );
            }
        }
        for candidate in &roster.candidates {
            candidate
                .profile
                .validate()
                .with_context(|| format!("invalid profile for candidate {}", candidate.username))?;
        }

        Ok(Self {
            operators: roster.operators,
            candidates: roster.candidates,
        })
    }

    /// Profile of a candidate, if the roster has one.
    pub fn profile(&self, username: &str) -> Option<&CandidateProfile> {
        self.candidates
            .iter()
            .find(|c| c.username == username)
            .map(|c| &c.profile)
    }

    /// Number of candidates on the roster.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }
}

#[async_trait]
impl AuthCollaborator for RosterAuth {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Role>, StoreError> {
        if let Some(operator) = self
            .operators
            .iter()
            .find(|o| o.username == username && o.password == password)
        {
            return Ok(Some(operator.role));
        }

        match self
            .candidates
            .iter()
            .find(|c| c.username == username && c.password == password)
        {
            Some(candidate) if candidate.banned => {
                tracing::warn!(username, "banned candidate attempted to log in");
                Err(StoreError::Rejected {
                    status: 403,
                    message: format!("candidate {username} is banned"),
                })
            }
            Some(_) => Ok(Some(Role::Candidate)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"
[[operators]]
username = "root"
password = "pw"
role = "super_admin"

[[operators]]
username = "proctor"
password = "pw"
role = "operator"

[[candidates]]
username = "alice"
password = "secret"

[candidates.profile]
full_name = "Alice Example"
email = "alice@example.com"

[[candidates]]
username = "mallory"
password = "secret"
banned = true

[[candidates]]
username = "root"
password = "pw"
"#;

    #[tokio::test]
    async fn resolves_roles() {
        let auth = RosterAuth::from_toml(ROSTER).unwrap();
        assert_eq!(auth.verify("root", "pw").await.unwrap(), Some(Role::SuperOperator));
        assert_eq!(auth.verify("proctor", "pw").await.unwrap(), Some(Role::Operator));
        assert_eq!(auth.verify("alice", "secret").await.unwrap(), Some(Role::Candidate));
        assert_eq!(auth.verify("alice", "wrong").await.unwrap(), None);
        assert_eq!(auth.verify("nobody", "pw").await.unwrap(), None);
        assert_eq!(auth.candidate_count(), 3);
    }

    #[tokio::test]
    async fn banned_candidate_rejected() {
        let auth = RosterAuth::from_toml(ROSTER).unwrap();
        let err = auth.verify("mallory", "secret").await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 403, .. }));
    }

    #[test]
    fn profile_lookup() {
        let auth = RosterAuth::from_toml(ROSTER).unwrap();
        let profile = auth.profile("alice").unwrap();
        assert_eq!(profile.display_name("alice"), "Alice Example");
        assert_eq!(auth.profile("mallory").unwrap().display_name("mallory"), "mallory");
        assert!(auth.profile("ghost").is_none());
    }

    #[test]
    fn invalid_profile_rejected_at_load() {
        let roster = r#"
[[candidates]]
username = "bob"
password = "pw"

[candidates.profile]
email = "not-an-email"
"#;
        let err = RosterAuth::from_toml(roster).unwrap_err();
        assert!(format!("{err:#}").contains("invalid profile for candidate bob"));
    }

    #[test]
    fn operator_with_candidate_role_rejected() {
        let roster = r#"
[[operators]]
username = "x"
password = "pw"
role = "candidate"
"#;
        assert!(RosterAuth::from_toml(roster).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.toml");
        std::fs::write(&path, ROSTER).unwrap();
        assert!(RosterAuth::load(&path).is_ok());
        assert!(RosterAuth::load(&dir.path().join("missing.toml")).is_err());
    }
}
