//! # Challenge-Response Authentication
//!
//! The protocol that lets a key holder prove, on every update, that they
//! (a) hold the private key behind a name and (b) are speaking from the
//! address they want bound to it.
//!
//! Flow: the client fetches a [`Challenge`](challenge::ChallengeIssuer) (a
//! sealed payload binding its observed address, an issuance timestamp, and a
//! random nonce), signs the challenge's ciphertext bytes with its private
//! key, and submits signature + public key. The
//! [`ResponseValidator`](validate::ResponseValidator) opens the box, checks
//! the signature, the address, and the age, and derives the identity.
//!
//! The issuer keeps no state. Freshness lives in the payload timestamp and
//! is enforced at validation time, which means a challenge is technically
//! replayable inside its 30-second window, from the same address, by the
//! same key holder. That party can only ever rebind their own name to their
//! own address, so the window buys nothing for an attacker.

pub mod challenge;
pub mod validate;

pub use challenge::{ChallengeIssuer, ChallengePayload, IssuedChallenge};
pub use validate::ResponseValidator;

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Validation failures, one kind per pipeline step.
///
/// The `Display` text is for logs; the wire-facing message clients see is
/// [`client_message`](AuthError::client_message).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Undecodable base64, an unopenable challenge box, or a payload that
    /// does not split into its three fields.
    #[error("malformed request payload")]
    MalformedRequest,

    /// The submitted public key is not parsable.
    #[error("unparsable public key")]
    MalformedKey,

    /// The response signature does not verify over the challenge bytes.
    #[error("signature does not verify against the supplied public key")]
    InvalidSignature,

    /// The challenge was issued to a different remote address.
    #[error("challenge is bound to a different address")]
    AddressMismatch,

    /// The challenge is older than the acceptance window.
    #[error("challenge exceeded its validity window")]
    ChallengeExpired,
}

impl AuthError {
    /// The short machine-readable message reported to API clients.
    /// These exact strings are part of the wire contract.
    pub fn client_message(&self) -> &'static str {
        match self {
            AuthError::MalformedRequest | AuthError::MalformedKey => "Invalid request",
            AuthError::InvalidSignature => "Invalid signature",
            AuthError::AddressMismatch => "Invalid response",
            AuthError::ChallengeExpired => "Expired response",
        }
    }
}

/// Current unix time in whole seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
