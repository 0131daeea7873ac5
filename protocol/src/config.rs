//! # Protocol Constants
//!
//! Every magic number in Sigil lives here. The values below define the wire
//! and naming contract of the protocol; changing them breaks every client
//! that has already derived a name, so treat them as frozen.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Digest used to derive an identity from a public key's SPKI DER encoding.
pub const IDENTITY_DIGEST: &str = "SHA-224";

/// Width of an identity in lowercase hex characters. SHA-224 yields 28 bytes,
/// so 56 characters. This is also the exact length a DNS label must have to
/// be considered an identity by the resolver.
pub const IDENTITY_HEX_LENGTH: usize = 56;

/// Label prefix marking a revocation sentinel record in a zone-backed store
/// (`r-<identity>.<domain>`).
pub const REVOKED_LABEL_PREFIX: &str = "r-";

// ---------------------------------------------------------------------------
// Challenge
// ---------------------------------------------------------------------------

/// Field delimiter inside a challenge payload. Chosen because it cannot
/// appear in an IP address (v4 or v6) nor in a decimal timestamp.
pub const CHALLENGE_DELIMITER: char = '@';

/// Bytes of CSPRNG entropy behind the challenge nonce. Hex-encoded in the
/// payload, so the nonce field is twice this many characters.
pub const CHALLENGE_NONCE_BYTES: usize = 32;

/// Maximum accepted age of a challenge at validation time, in seconds.
/// The check is inclusive: a challenge exactly this old still validates.
pub const CHALLENGE_MAX_AGE_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Bindings & resolution
// ---------------------------------------------------------------------------

/// Default freshness window for a file-backed binding. A binding older than
/// this resolves as if it did not exist.
pub const DEFAULT_BINDING_TTL: Duration = Duration::from_secs(3600);

/// TTL stamped on synthesized DNS answers. Deliberately short and independent
/// of the binding's own remaining freshness: clients re-ask, the store decides.
pub const DNS_ANSWER_TTL: u32 = 5;

/// TTL for records upserted into a zone-backed store.
pub const ZONE_RECORD_TTL: u32 = 300;

// ---------------------------------------------------------------------------
// Network defaults
// ---------------------------------------------------------------------------

/// Default port for the HTTP registration API.
pub const DEFAULT_API_PORT: u16 = 8053;

/// Default port for the DNS resolver (UDP and TCP).
pub const DEFAULT_DNS_PORT: u16 = 5353;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 8055;

/// Default timeout for calls against an external zone-management endpoint.
pub const DEFAULT_ZONE_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol version string, surfaced by the node's `version` command.
pub const PROTOCOL_VERSION: &str = "0.1.0";
