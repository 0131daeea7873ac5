//! # Sealed Boxes
//!
//! Public-key encryption to the server's own key: anyone can seal, only the
//! server can open. Challenges travel through clients as sealed boxes, which
//! is what lets the issuer stay stateless — the server does not remember
//! outstanding challenges, it just opens whatever comes back and checks the
//! payload.
//!
//! ## Construction
//!
//! 1. Generate an ephemeral X25519 keypair.
//! 2. Diffie-Hellman against the recipient's static public key.
//! 3. Derive an AES-256 key from the shared secret with BLAKE3's
//!    `derive_key` mode, binding both public keys into the derivation.
//! 4. Encrypt with AES-256-GCM under a random 96-bit nonce.
//!
//! Raw DH output is never used as a cipher key directly; it is a curve point
//! with algebraic structure, not uniform bytes. The KDF fixes that.
//!
//! ## Wire format
//!
//! `ephemeral_pub(32) || nonce(12) || ciphertext+tag`, as one opaque blob.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};

/// Domain-separation context for the sealing KDF. Changing this string
/// invalidates every outstanding challenge, which is harmless (clients just
/// fetch a new one) but pointless, so don't.
const KDF_CONTEXT: &str = "sigil-protocol v1 challenge sealing";

/// Ephemeral key (32) + nonce (12) + GCM tag (16): the minimum size of any
/// well-formed sealed box.
pub const SEALED_OVERHEAD: usize = 32 + 12 + 16;

const NONCE_LENGTH: usize = 12;

/// Errors from sealing and opening.
///
/// Opening failures are deliberately not broken down further; "wrong key"
/// and "corrupted box" are indistinguishable by design of AEAD, and the
/// caller treats both as a malformed request anyway.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("sealing failed")]
    SealFailed,

    #[error("unsealing failed: wrong key or corrupted box")]
    OpenFailed,

    #[error("sealed box shorter than minimum {SEALED_OVERHEAD} bytes")]
    Truncated,

    #[error("invalid seal key encoding")]
    InvalidKey,
}

/// The server's long-term X25519 keypair used to open sealed challenges.
///
/// Generated once at first startup and persisted hex-encoded in the data
/// directory. Compromise of this key does not let anyone claim a name (that
/// needs a client signing key); it lets them read challenge payloads and
/// mint challenges for arbitrary addresses, so guard it regardless.
pub struct SealKeypair {
    secret: StaticSecret,
}

impl SealKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Reconstruct from raw secret bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// Reconstruct from the hex encoding written by [`to_hex`](Self::to_hex).
    pub fn from_hex(s: &str) -> Result<Self, SealError> {
        let bytes = hex::decode(s.trim()).map_err(|_| SealError::InvalidKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| SealError::InvalidKey)?;
        Ok(Self::from_bytes(arr))
    }

    /// Hex encoding of the secret key, for the data-directory key file.
    pub fn to_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// The public half, handed to the challenge issuer.
    pub fn public(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    /// Open a sealed box previously produced by [`seal`] to this keypair's
    /// public key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, SealError> {
        if sealed.len() < SEALED_OVERHEAD {
            return Err(SealError::Truncated);
        }

        let ephemeral_bytes: [u8; 32] = sealed[..32].try_into().map_err(|_| SealError::OpenFailed)?;
        let ephemeral = PublicKey::from(ephemeral_bytes);
        let shared = self.secret.diffie_hellman(&ephemeral);
        let key = derive_key(&shared, &ephemeral, &self.public());

        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| SealError::OpenFailed)?;
        let nonce = Nonce::from_slice(&sealed[32..32 + NONCE_LENGTH]);
        cipher
            .decrypt(nonce, &sealed[32 + NONCE_LENGTH..])
            .map_err(|_| SealError::OpenFailed)
    }
}

impl std::fmt::Debug for SealKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SealKeypair(pub={})", hex::encode(self.public().as_bytes()))
    }
}

/// Seal `plaintext` to `recipient`. The ephemeral secret is consumed by the
/// Diffie-Hellman step and never touches the heap afterwards; x25519's
/// `EphemeralSecret` enforces single use at the type level.
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(recipient);
    let key = derive_key(&shared, &ephemeral, recipient);

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| SealError::SealFailed)?;
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| SealError::SealFailed)?;

    let mut out = Vec::with_capacity(32 + NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(ephemeral.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// KDF over the shared secret plus both public keys, so transcripts with
/// different key material can never collide on a cipher key.
fn derive_key(shared: &SharedSecret, ephemeral: &PublicKey, recipient: &PublicKey) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT);
    hasher.update(shared.as_bytes());
    hasher.update(ephemeral.as_bytes());
    hasher.update(recipient.as_bytes());
    *hasher.finalize().as_bytes()
}
