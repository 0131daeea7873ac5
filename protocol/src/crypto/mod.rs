//! # Cryptographic Primitives for Sigil
//!
//! Two constructions carry the whole protocol:
//!
//! - **Ed25519** (`keys`) — client identity keys. A name is claimed by
//!   proving possession of the matching signing key, nothing else.
//! - **Sealed boxes** (`sealed`) — X25519 + AES-256-GCM. Challenges are
//!   sealed to the server's own public key, so only the server can read
//!   back the payload it issued.
//!
//! Everything here is a thin, type-safe wrapper around audited
//! implementations. There is no hand-rolled cryptography in this crate.

pub mod keys;
pub mod sealed;

pub use keys::{KeyError, SigilKeypair, SigilPublicKey, SigilSignature};
pub use sealed::{seal, SealError, SealKeypair};
