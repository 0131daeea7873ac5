// Copyright (c) 2026 Sigil Project. MIT License.
// See LICENSE for details.

//! # Sigil Protocol — Core Library
//!
//! Self-certifying dynamic DNS: a keypair holder claims the name
//! `sha224(pubkey).domain` with no pre-registration and no shared secret.
//! Each update proves possession of the private key and that the request
//! originates from the address being bound; a resolver answers for the name
//! only while the binding is fresh; revocation retires a name forever.
//!
//! ## Architecture
//!
//! - **crypto** — Ed25519 client keys and the sealed-box construction that
//!   protects challenges. Wrappers over audited implementations only.
//! - **identity** — the digest-of-public-key naming rule.
//! - **auth** — the challenge-response protocol: stateless issuer and the
//!   eight-step response validator.
//! - **store** — the `BindingStore` seam with file-backed and zone-backed
//!   implementations.
//! - **resolver** — the DNS request handler that serves fresh file-backed
//!   bindings and nothing else.
//! - **config** — protocol constants.
//!
//! The HTTP surface, CLI, and socket plumbing live in the `sigil-node`
//! binary crate; this library is transport-agnostic.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod resolver;
pub mod store;
