//! # Client Identity Keys
//!
//! Ed25519 keypair wrappers plus the PEM/DER transport encodings the
//! registration API speaks.
//!
//! Clients submit their public key as PKCS#8 SPKI PEM alongside every
//! signed response. The DER form of that same key is what the identity
//! digest is computed over, so the encoding here is part of the naming
//! contract: two encodings of the same key must always produce identical
//! DER bytes (SPKI is canonical for Ed25519, so they do).

use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

/// Errors for key decoding and encoding.
///
/// Intentionally vague about *why* a key failed to parse. The API maps all
/// of these to a generic client error anyway.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key material")]
    InvalidSecretKey,

    #[error("public key is not valid SPKI PEM")]
    InvalidPublicKey,

    #[error("key encoding failed")]
    EncodingFailed,
}

/// An Ed25519 keypair held by a client that wants to claim a name.
///
/// The signing key never leaves this struct except through the explicit
/// PKCS#8 export used by the CLI to persist it.
pub struct SigilKeypair {
    signing_key: SigningKey,
}

/// The public half of a client identity. Safe to send, log, and hash.
#[derive(Clone, PartialEq, Eq)]
pub struct SigilPublicKey {
    key: VerifyingKey,
}

/// An Ed25519 signature over a challenge's ciphertext bytes.
///
/// Stored as `Vec<u8>`; anything that is not exactly 64 bytes simply fails
/// verification rather than panicking.
#[derive(Clone, PartialEq, Eq)]
pub struct SigilSignature {
    bytes: Vec<u8>,
}

impl SigilKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    /// Test helper territory; a weak seed means a weak key.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Returns the public key for this keypair.
    pub fn public_key(&self) -> SigilPublicKey {
        SigilPublicKey {
            key: self.signing_key.verifying_key(),
        }
    }

    /// Sign a message. Ed25519 is deterministic: same key and message,
    /// same signature.
    pub fn sign(&self, message: &[u8]) -> SigilSignature {
        SigilSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    /// Export the secret key as PKCS#8 PEM for on-disk storage.
    pub fn to_pkcs8_pem(&self) -> Result<String, KeyError> {
        self.signing_key
            .to_pkcs8_pem(Default::default())
            .map(|pem| pem.to_string())
            .map_err(|_| KeyError::EncodingFailed)
    }

    /// Load a keypair from PKCS#8 PEM previously written by
    /// [`to_pkcs8_pem`](Self::to_pkcs8_pem).
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, KeyError> {
        SigningKey::from_pkcs8_pem(pem)
            .map(|signing_key| Self { signing_key })
            .map_err(|_| KeyError::InvalidSecretKey)
    }
}

impl fmt::Debug for SigilKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secret material stays out of debug output, always.
        write!(
            f,
            "SigilKeypair(pub={})",
            hex::encode(self.signing_key.verifying_key().as_bytes())
        )
    }
}

impl SigilPublicKey {
    /// Parse a public key from its SPKI PEM transport encoding.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        VerifyingKey::from_public_key_pem(pem)
            .map(|key| Self { key })
            .map_err(|_| KeyError::InvalidPublicKey)
    }

    /// Encode as SPKI PEM, the form clients put in request bodies.
    pub fn to_pem(&self) -> Result<String, KeyError> {
        self.key
            .to_public_key_pem(Default::default())
            .map_err(|_| KeyError::EncodingFailed)
    }

    /// Canonical SPKI DER bytes. The identity digest is computed over
    /// exactly these bytes.
    pub fn to_der(&self) -> Result<Vec<u8>, KeyError> {
        self.key
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|_| KeyError::EncodingFailed)
    }

    /// Verify a signature. Returns a plain boolean; callers only ever need
    /// a yes/no answer here.
    pub fn verify(&self, message: &[u8], signature: &SigilSignature) -> bool {
        let sig_bytes: [u8; 64] = match signature.bytes.as_slice().try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let sig = DalekSignature::from_bytes(&sig_bytes);
        self.key.verify(message, &sig).is_ok()
    }

    /// Raw 32-byte key material.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }
}

impl fmt::Debug for SigilPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigilPublicKey({})", &hex::encode(self.key.as_bytes())[..16])
    }
}

impl SigilSignature {
    /// Wrap raw signature bytes received off the wire.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// The raw signature bytes (64 for a well-formed signature).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SigilSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigilSignature({} bytes)", self.bytes.len())
    }
}
