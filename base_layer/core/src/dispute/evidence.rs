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

//! Dispute evidence: structural intake rules, sealed submissions, tiered timestamp verification
//! and content-hash verification through the injected fetcher.

use mmp_common_types::types::{EpochSeconds, FixedHash, PublicKey, SchnorrSignature};
use serde::{Deserialize, Serialize};

use crate::{
    consts::{MAX_EVIDENCE_AGE_SECS, MAX_EVIDENCE_CONTENT_BYTES, MAX_EVIDENCE_URL_LENGTH},
    crypto::constant_time_eq,
    dispute::error::DisputeError,
    interfaces::{ChainView, ContentFetcher, CryptoAdapter},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceType {
    Initial,
    Rebuttal,
    Counter,
    Expert,
}

impl EvidenceType {
    pub fn as_u8(self) -> u8 {
        match self {
            EvidenceType::Initial => 0,
            EvidenceType::Rebuttal => 1,
            EvidenceType::Counter => 2,
            EvidenceType::Expert => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EvidenceType::Initial),
            1 => Some(EvidenceType::Rebuttal),
            2 => Some(EvidenceType::Counter),
            3 => Some(EvidenceType::Expert),
            _ => None,
        }
    }
}

/// A third-party attestation over the evidence digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryAttestation {
    pub notary: PublicKey,
    pub signature: SchnorrSignature,
}

/// The tier at which a claimed evidence timestamp was accepted, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampTier {
    OpenTimestamps,
    BlockHeader,
    Notary,
    Reasonable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub urls: Vec<String>,
    pub content_hashes: Vec<FixedHash>,
    pub notary_sigs: Vec<NotaryAttestation>,
    pub submitter: PublicKey,
    pub timestamp: EpochSeconds,
    pub evidence_type: EvidenceType,
    /// Present while the evidence is sealed; cleared by a successful unseal.
    pub seal_hash: Option<FixedHash>,
    /// OpenTimestamps proof blob, if the submitter stamped the evidence.
    pub timestamp_proof: Option<Vec<u8>>,
    pub block_height: Option<u64>,
    pub block_header_hash: Option<FixedHash>,
    pub timestamp_verified: bool,
    pub content_verified: bool,
}

impl Evidence {
    pub fn new(
        urls: Vec<String>,
        content_hashes: Vec<FixedHash>,
        submitter: PublicKey,
        timestamp: EpochSeconds,
        evidence_type: EvidenceType,
    ) -> Self {
        Self {
            urls,
            content_hashes,
            notary_sigs: Vec::new(),
            submitter,
            timestamp,
            evidence_type,
            seal_hash: None,
            timestamp_proof: None,
            block_height: None,
            block_header_hash: None,
            timestamp_verified: false,
            content_verified: false,
        }
    }

    /// Structural intake validation. Content and timestamp verification are separate passes that
    /// run outside any contract guard.
    pub fn validate(&self, requires_notary: bool) -> Result<(), DisputeError> {
        if self.urls.is_empty() {
            return Err(DisputeError::EvidenceInvalid("no evidence items".to_string()));
        }
        if self.urls.len() != self.content_hashes.len() {
            return Err(DisputeError::EvidenceInvalid(
                "urls and content hashes must pair up".to_string(),
            ));
        }
        for url in &self.urls {
            if url.is_empty() || url.len() > MAX_EVIDENCE_URL_LENGTH {
                return Err(DisputeError::EvidenceInvalid(format!(
                    "url length must be in 1..={MAX_EVIDENCE_URL_LENGTH}"
                )));
            }
        }
        if self.content_hashes.iter().any(|h| h == &[0u8; 32]) {
            return Err(DisputeError::EvidenceInvalid("zero content hash".to_string()));
        }
        if self.timestamp <= 0 {
            return Err(DisputeError::EvidenceInvalid("timestamp must be positive".to_string()));
        }
        if requires_notary && self.notary_sigs.is_empty() {
            return Err(DisputeError::NotaryRequired);
        }
        Ok(())
    }

    /// Digest the attested fields. Notary signatures sign this value, so it excludes them.
    pub fn digest(&self, crypto: &dyn CryptoAdapter) -> FixedHash {
        let mut material = Vec::new();
        for (url, hash) in self.urls.iter().zip(self.content_hashes.iter()) {
            material.extend_from_slice(url.as_bytes());
            material.extend_from_slice(hash);
        }
        material.extend_from_slice(&self.submitter.serialize());
        material.extend_from_slice(&self.timestamp.to_le_bytes());
        material.push(self.evidence_type.as_u8());
        crypto.sha256(&material)
    }

    /// Whether at least one attached notary signature verifies over the evidence digest.
    pub fn has_valid_notary_sig(&self, crypto: &dyn CryptoAdapter) -> bool {
        let digest = self.digest(crypto);
        self.notary_sigs
            .iter()
            .any(|att| crypto.verify_schnorr(&att.signature, &digest, &att.notary.x_only_public_key().0))
    }

    /// Credibility heuristic surfaced to arbitrators: base 50, up to +30 for notaries, up to +20
    /// for corroborating items.
    pub fn credibility_score(&self) -> u32 {
        let notary_bonus = (self.notary_sigs.len() as u32 * 10).min(30);
        let item_bonus = (self.urls.len() as u32 * 5).min(20);
        (50 + notary_bonus + item_bonus).min(100)
    }

    pub fn is_sealed(&self) -> bool {
        self.seal_hash.is_some()
    }

    pub fn seal(&mut self, seal: FixedHash) {
        if seal != [0u8; 32] {
            self.seal_hash = Some(seal);
        }
    }

    /// Unseal by presenting the seal value. Comparison is constant-time.
    pub fn unseal(&mut self, provided: &FixedHash) -> bool {
        match self.seal_hash {
            Some(seal) if constant_time_eq(&seal, provided) => {
                self.seal_hash = None;
                true
            },
            _ => false,
        }
    }
}

/// Attempt timestamp verification tiers in decreasing order of strength. Returns the tier that
/// accepted the claim or `TimestampUnverified` when every tier fails.
pub fn verify_timestamp(
    evidence: &Evidence,
    chain: &dyn ChainView,
    crypto: &dyn CryptoAdapter,
    now: EpochSeconds,
) -> Result<TimestampTier, DisputeError> {
    if let Some(proof) = &evidence.timestamp_proof {
        if chain.verify_ots_proof(proof, evidence.timestamp) {
            return Ok(TimestampTier::OpenTimestamps);
        }
    }

    if let (Some(height), Some(expected_hash)) = (evidence.block_height, evidence.block_header_hash) {
        if let Some(header) = chain.header_at(height) {
            // The claimed time may precede the header by at most the two-hour consensus skew
            if constant_time_eq(&header.hash, &expected_hash) && evidence.timestamp <= header.time + 7_200 {
                return Ok(TimestampTier::BlockHeader);
            }
        }
    }

    if !evidence.notary_sigs.is_empty() && evidence.has_valid_notary_sig(crypto) {
        return Ok(TimestampTier::Notary);
    }

    if evidence.timestamp <= now && now - evidence.timestamp <= MAX_EVIDENCE_AGE_SECS {
        return Ok(TimestampTier::Reasonable);
    }

    Err(DisputeError::TimestampUnverified)
}

/// Fetch every evidence item and verify its SHA-256 against the declared hash. Must be called
/// outside any per-contract guard; the fetcher may block on network I/O.
pub fn verify_content(
    evidence: &Evidence,
    fetcher: &dyn ContentFetcher,
    crypto: &dyn CryptoAdapter,
) -> Result<(), DisputeError> {
    for (index, (url, expected)) in evidence.urls.iter().zip(evidence.content_hashes.iter()).enumerate() {
        let content = fetcher.fetch(url)?;
        if content.len() > MAX_EVIDENCE_CONTENT_BYTES {
            return Err(DisputeError::TooLarge {
                limit: MAX_EVIDENCE_CONTENT_BYTES,
            });
        }
        let actual = crypto.sha256(&content);
        if !constant_time_eq(&actual, expected) {
            return Err(DisputeError::HashMismatch { index });
        }
    }
    Ok(())
}
