//! # Challenge Issuance
//!
//! A challenge is a sealed, self-verifying token. The plaintext payload is
//! `address @ issued_at @ nonce`, sealed to the server's own public key and
//! base64-encoded for transport. The client never sees the payload; it only
//! signs the opaque bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::PublicKey;

use crate::config::{CHALLENGE_DELIMITER, CHALLENGE_NONCE_BYTES};
use crate::crypto::sealed::{seal, SealError};

use super::unix_now;

/// The decoded plaintext of a challenge.
///
/// Only ever seen server-side: built here at issuance and recovered by the
/// validator after opening the box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengePayload {
    /// The remote address the challenge was issued to, verbatim.
    pub address: String,
    /// Unix seconds at issuance.
    pub issued_at: u64,
    /// Hex-encoded CSPRNG nonce. Makes every challenge unique even for the
    /// same address in the same second.
    pub nonce: String,
}

impl ChallengePayload {
    /// Render as the delimited wire plaintext.
    pub fn encode(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.address,
            self.issued_at,
            self.nonce,
            d = CHALLENGE_DELIMITER
        )
    }

    /// Split a recovered plaintext back into its three fields.
    ///
    /// The address field cannot contain the delimiter (it never appears in
    /// IPv4 or IPv6 text forms), so a plain 3-way split is unambiguous.
    pub fn decode(plaintext: &str) -> Option<Self> {
        let mut parts = plaintext.splitn(3, CHALLENGE_DELIMITER);
        let address = parts.next()?.to_owned();
        let issued_at = parts.next()?.parse().ok()?;
        let nonce = parts.next()?.to_owned();
        if address.is_empty() || nonce.is_empty() {
            return None;
        }
        Some(Self {
            address,
            issued_at,
            nonce,
        })
    }
}

/// A freshly issued challenge: the transport form plus the payload echo for
/// logging and tests.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    /// Base64 of the sealed challenge, exactly as sent to the client.
    pub challenge: String,
    /// The plaintext that went into the box.
    pub payload: ChallengePayload,
}

/// Stateless challenge issuer.
///
/// Holds only the server's public seal key. Nothing is recorded per
/// challenge; the payload timestamp is the entire freshness mechanism.
#[derive(Clone)]
pub struct ChallengeIssuer {
    recipient: PublicKey,
}

impl ChallengeIssuer {
    /// Build an issuer sealing to the given server public key.
    pub fn new(server_public: PublicKey) -> Self {
        Self {
            recipient: server_public,
        }
    }

    /// Issue a challenge bound to `remote_address`, timestamped now.
    pub fn issue(&self, remote_address: &str) -> Result<IssuedChallenge, SealError> {
        self.issue_at(remote_address, unix_now())
    }

    /// Issue with an explicit timestamp. Exists so expiry behavior can be
    /// tested without a real clock.
    pub fn issue_at(
        &self,
        remote_address: &str,
        issued_at: u64,
    ) -> Result<IssuedChallenge, SealError> {
        let mut entropy = [0u8; CHALLENGE_NONCE_BYTES];
        OsRng.fill_bytes(&mut entropy);

        let payload = ChallengePayload {
            address: remote_address.to_owned(),
            issued_at,
            nonce: hex::encode(entropy),
        };

        let sealed = seal(&self.recipient, payload.encode().as_bytes())?;
        Ok(IssuedChallenge {
            challenge: BASE64.encode(sealed),
            payload,
        })
    }
}
