//! # Identity Derivation
//!
//! An identity is the SHA-224 digest of a public key's SPKI DER encoding,
//! rendered as 56 lowercase hex characters. It is the DNS label a key holder
//! claims (`<identity>.<domain>`) and the key every binding store indexes by.
//!
//! Derivation is pure and deterministic: the same key bytes always produce
//! the same identity, and nothing short of a digest collision lets two keys
//! share one. There is no registration step; deriving the identity *is* the
//! claim, and holding the key is the proof.

use sha2::{Digest, Sha224};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::{IDENTITY_HEX_LENGTH, REVOKED_LABEL_PREFIX};
use crate::crypto::keys::{KeyError, SigilPublicKey};

/// Error for strings that do not have the identity shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity must be exactly {IDENTITY_HEX_LENGTH} lowercase hex characters")]
    InvalidFormat,
}

/// A derived identity: always exactly 56 lowercase hex characters.
///
/// The inner string is validated on every construction path, so code holding
/// an `Identity` can embed it in file paths and DNS names without further
/// checks.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Derive the identity for a public key from its canonical DER encoding.
    pub fn derive(public_key: &SigilPublicKey) -> Result<Self, KeyError> {
        let der = public_key.to_der()?;
        Ok(Self(hex::encode(Sha224::digest(&der))))
    }

    /// Parse a string that must already have the identity shape, e.g. the
    /// leftmost label of an incoming DNS query.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        let shaped = s.len() == IDENTITY_HEX_LENGTH
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if shaped {
            Ok(Self(s.to_owned()))
        } else {
            Err(IdentityError::InvalidFormat)
        }
    }

    /// The identity as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The fully qualified name this identity resolves under.
    pub fn fqdn(&self, domain: &str) -> String {
        format!("{}.{}", self.0, domain.trim_end_matches('.'))
    }

    /// The sentinel label marking this identity revoked in a zone-backed
    /// store (`r-<identity>`).
    pub fn revocation_label(&self) -> String {
        format!("{REVOKED_LABEL_PREFIX}{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}
