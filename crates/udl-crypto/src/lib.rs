//! Cryptographic primitives for the unit DAG ledger.
//!
//! Provides the canonical binary codec, domain-separated BLAKE3 hashing,
//! binary Merkle roots over transaction hashes, and Ed25519 signing behind an
//! opaque [`SignatureVerifier`] seam.
//!
//! All crypto operations wrap established libraries. No custom cryptography.

pub mod codec;
pub mod hasher;
pub mod merkle;
pub mod signer;

pub use codec::{CodecError, CodecResult};
pub use hasher::{ContentHasher, Digest};
pub use merkle::MerkleTree;
pub use signer::{Ed25519Verifier, Signature, SignatureError, SignatureVerifier, SigningKey, VerifyingKey};
