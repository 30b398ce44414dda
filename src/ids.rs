//! Display identifier generation
//!
//! Display ids look like `AGT-7Q2M0X`: a fixed prefix per record kind, a dash,
//! and six symbols drawn uniformly from `[A-Z0-9]`. They are quoted between
//! people (an agent hands their id to a tenant), so the shape is a durable
//! contract.

use std::collections::HashSet;
use std::fmt;

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::UserRole;

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 6;

/// Default cap on rejection-sampling attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Record kind, which fixes the display id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    Agent,
    Tenant,
    Property,
    Request,
    Application,
}

impl IdKind {
    pub const ALL: [IdKind; 5] = [
        Self::Agent,
        Self::Tenant,
        Self::Property,
        Self::Request,
        Self::Application,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Agent => "AGT",
            Self::Tenant => "TNT",
            Self::Property => "PROP",
            Self::Request => "REQ",
            Self::Application => "APP",
        }
    }

    /// Agents get `AGT`; every other role, admins included, gets `TNT`.
    pub fn for_role(role: UserRole) -> Self {
        match role {
            UserRole::Agent => Self::Agent,
            UserRole::Admin | UserRole::Tenant => Self::Tenant,
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl std::str::FromStr for IdKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "agent" | "agt" => Ok(Self::Agent),
            "tenant" | "tnt" => Ok(Self::Tenant),
            "property" | "prop" => Ok(Self::Property),
            "request" | "req" | "maintenance" => Ok(Self::Request),
            "application" | "app" => Ok(Self::Application),
            other => Err(format!("unknown id kind: {other}")),
        }
    }
}

/// Generate a display id for `kind` that is not in `existing`.
///
/// Uses the OS CSPRNG. Fails with [`StoreError::IdSpaceExhausted`] after
/// `max_attempts` collisions in a row.
pub fn generate_display_id(
    kind: IdKind,
    existing: &HashSet<String>,
    max_attempts: u32,
) -> Result<String, StoreError> {
    generate_display_id_with(&mut OsRng, kind, existing, max_attempts)
}

/// Same as [`generate_display_id`] with a caller-supplied random source.
pub fn generate_display_id_with<R: Rng + ?Sized>(
    rng: &mut R,
    kind: IdKind,
    existing: &HashSet<String>,
    max_attempts: u32,
) -> Result<String, StoreError> {
    for _ in 0..max_attempts {
        let candidate = candidate(rng, kind);
        if !existing.contains(&candidate) {
            return Ok(candidate);
        }
    }

    Err(StoreError::IdSpaceExhausted {
        prefix: kind.prefix(),
        attempts: max_attempts,
    })
}

fn candidate<R: Rng + ?Sized>(rng: &mut R, kind: IdKind) -> String {
    let prefix = kind.prefix();
    let mut out = String::with_capacity(prefix.len() + 1 + SUFFIX_LEN);
    out.push_str(prefix);
    out.push('-');
    for _ in 0..SUFFIX_LEN {
        out.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
    }
    out
}

/// Check the `{PREFIX}-{6 x [A-Z0-9]}` shape for any known prefix.
pub fn is_well_formed(display_id: &str) -> bool {
    let Some((prefix, suffix)) = display_id.split_once('-') else {
        return false;
    };

    IdKind::ALL.iter().any(|kind| kind.prefix() == prefix)
        && suffix.len() == SUFFIX_LEN
        && suffix
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn generated_ids_match_format() {
        for kind in IdKind::ALL {
            let id = generate_display_id(kind, &HashSet::new(), DEFAULT_MAX_ATTEMPTS).unwrap();
            assert!(id.starts_with(&format!("{}-", kind.prefix())), "{id}");
            assert!(is_well_formed(&id), "{id}");
        }
    }

    #[test]
    fn empty_store_agent_id() {
        let id = generate_display_id(IdKind::Agent, &HashSet::new(), DEFAULT_MAX_ATTEMPTS).unwrap();
        assert_eq!(id.len(), "AGT-".len() + 6);
        assert!(id[4..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn never_returns_an_existing_id() {
        let mut existing = HashSet::new();
        for _ in 0..200 {
            let id = generate_display_id(IdKind::Property, &existing, DEFAULT_MAX_ATTEMPTS).unwrap();
            assert!(existing.insert(id));
        }
    }

    #[test]
    fn exhaustion_is_reported_not_looped() {
        // A constant source always yields the same candidate.
        let mut rng = StepRng::new(0, 0);
        let first = generate_display_id_with(&mut rng, IdKind::Tenant, &HashSet::new(), 5).unwrap();
        assert_eq!(first, "TNT-AAAAAA");

        let existing: HashSet<String> = [first].into_iter().collect();
        let err = generate_display_id_with(&mut rng, IdKind::Tenant, &existing, 5).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IdSpaceExhausted {
                prefix: "TNT",
                attempts: 5
            }
        ));
    }

    #[test]
    fn role_prefixes() {
        assert_eq!(IdKind::for_role(UserRole::Agent).prefix(), "AGT");
        assert_eq!(IdKind::for_role(UserRole::Tenant).prefix(), "TNT");
        assert_eq!(IdKind::for_role(UserRole::Admin).prefix(), "TNT");
    }

    #[test]
    fn well_formed_check() {
        assert!(is_well_formed("PROP-0A1B2C"));
        assert!(!is_well_formed("PROP-0a1b2c"));
        assert!(!is_well_formed("XYZ-ABCDEF"));
        assert!(!is_well_formed("AGT-ABCDE"));
        assert!(!is_well_formed("u1"));
    }
}
