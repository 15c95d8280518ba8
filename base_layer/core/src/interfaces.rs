// Copyright 2024. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Injected collaborator interfaces.
//!
//! The engine is synchronous and never performs I/O itself. Everything it needs from the outside
//! world — time, chain state, entropy, cryptography, content retrieval and transaction broadcast —
//! arrives through the traits in this module. Hosts bundle the always-available capabilities into
//! a [`Collaborators`] value at store construction; the I/O-bearing collaborators
//! ([`ContentFetcher`], [`TxBroadcaster`]) are passed to the relevant free functions explicitly
//! and must never be invoked while a per-contract guard is held.

use std::sync::Arc;

use bitcoin::{Transaction, Txid};
use mmp_common_types::types::{
    BlockHeight,
    EpochSeconds,
    FixedHash,
    PublicKey,
    SchnorrSignature,
    SecretKey,
    XOnlyPublicKey,
};
use thiserror::Error;

/// Wall-clock time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> EpochSeconds;
}

/// A block header witness as provided by the collaborating node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub time: EpochSeconds,
    pub hash: FixedHash,
}

/// Read-only view of the collaborating node's best chain.
pub trait ChainView: Send + Sync {
    fn current_height(&self) -> BlockHeight;

    fn header_at(&self, height: BlockHeight) -> Option<BlockHeader>;

    /// Verify an OpenTimestamps proof against the chain for a claimed attestation time.
    fn verify_ots_proof(&self, proof: &[u8], claimed_time: EpochSeconds) -> bool;

    /// The network's target block interval. Used wherever a block count must be related to a
    /// duration; the engine never hard-codes a seconds-per-block constant.
    fn expected_block_interval_secs(&self) -> u64 {
        600
    }
}

/// Cryptographically strong randomness.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Key material is not a valid secp256k1 key")]
    InvalidKey,
    #[error("Public key aggregation failed")]
    AggregationFailed,
}

/// Abstraction over the secp256k1 primitives the engine needs.
///
/// Implementations must be deterministic for everything except signing nonces. The default
/// implementation is [`crate::crypto::Secp256k1Adapter`]; tests may substitute doubles.
pub trait CryptoAdapter: Send + Sync {
    fn sign_schnorr(&self, msg: &FixedHash, secret: &SecretKey) -> SchnorrSignature;

    fn verify_schnorr(&self, sig: &SchnorrSignature, msg: &FixedHash, key: &XOnlyPublicKey) -> bool;

    /// Aggregate a set of party keys into a single key a cosigning set can satisfy.
    fn aggregate_keys(&self, keys: &[PublicKey]) -> Result<PublicKey, CryptoError>;

    /// Compute the Taproot tweak committing `aggregated` to an optional script-tree root.
    fn taproot_tweak(&self, aggregated: &PublicKey, merkle_root: Option<FixedHash>) -> FixedHash;

    fn sha256(&self, data: &[u8]) -> FixedHash;

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> FixedHash;

    /// Verify an ordered-pair Merkle inclusion proof. The root comparison must be constant-time.
    fn verify_merkle_proof(&self, leaf: &FixedHash, proof: &[FixedHash], root: &FixedHash) -> bool;

    /// Derive a keypair from 32 bytes of caller-supplied entropy.
    fn keypair_from_entropy(&self, entropy: &[u8; 32]) -> Result<(SecretKey, PublicKey), CryptoError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Content not found at `{0}`")]
    NotFound(String),
    #[error("Content exceeded the {limit} byte retrieval limit")]
    TooLarge { limit: usize },
    #[error("Retrieval failed: {0}")]
    Io(String),
}

/// Retrieves evidence content for hash verification. Callable only outside per-contract guards.
pub trait ContentFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Broadcast failures are surfaced to the caller unchanged; the engine never retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Transaction rejected by the network: {0}")]
    Rejected(String),
    #[error("Transaction conflicted with another spend")]
    Conflicted,
    #[error("Timed out waiting for the transaction to be accepted")]
    Timeout,
    #[error("Fee too low for relay")]
    FeeTooLow,
}

/// Submits signed transactions. Callable only outside per-contract guards.
pub trait TxBroadcaster: Send + Sync {
    fn submit(&self, tx: &Transaction) -> Result<Txid, BroadcastError>;
}

/// The always-available capability bundle injected at store construction.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub chain: Arc<dyn ChainView>,
    pub entropy: Arc<dyn EntropySource>,
    pub crypto: Arc<dyn CryptoAdapter>,
}

impl Collaborators {
    pub fn new(
        clock: Arc<dyn Clock>,
        chain: Arc<dyn ChainView>,
        entropy: Arc<dyn EntropySource>,
        crypto: Arc<dyn CryptoAdapter>,
    ) -> Self {
        Self {
            clock,
            chain,
            entropy,
            crypto,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Collaborators")
    }
}

/// Default entropy source backed by the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(buf);
    }
}
