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

//! Party key management for a single contract: aggregation, Taproot tweak and rotation.

use mmp_common_types::{
    types::{EpochSeconds, FixedHash, PublicKey},
    JobId,
};
use serde::{Deserialize, Serialize};

use crate::{
    consts::{KEY_ROTATION_INTERVAL_SECS, MAX_KEY_AGE_SECS},
    contract::error::ContractError,
    interfaces::{CryptoAdapter, EntropySource},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRotationEvent {
    pub timestamp: EpochSeconds,
    pub is_emergency: bool,
    pub reason: String,
}

/// The key material of a contract's escrow.
///
/// The worker key appears on assignment and the middleman key only once a dispute has been
/// escalated. The aggregated key and tweak are recomputed whenever the key set changes; secrets
/// produced during rotation are handed to no one and dropped immediately (custody is the host
/// wallet's problem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyContext {
    pub employer_key: PublicKey,
    pub worker_key: Option<PublicKey>,
    pub middleman_key: Option<PublicKey>,
    pub aggregated_key: Option<PublicKey>,
    pub tweak: Option<FixedHash>,
    pub rotation_count: u32,
    pub last_rotation_time: EpochSeconds,
    pub rotation_history: Vec<KeyRotationEvent>,
}

impl KeyContext {
    /// `created_timestamp` seeds `last_rotation_time` so age enforcement measures from contract
    /// creation until the first rotation happens.
    pub fn new(employer_key: PublicKey, created_timestamp: EpochSeconds) -> Self {
        Self {
            employer_key,
            worker_key: None,
            middleman_key: None,
            aggregated_key: None,
            tweak: None,
            rotation_count: 0,
            last_rotation_time: created_timestamp,
            rotation_history: Vec::new(),
        }
    }

    pub fn set_worker(&mut self, worker: PublicKey, crypto: &dyn CryptoAdapter) -> Result<(), ContractError> {
        self.worker_key = Some(worker);
        self.recompute_aggregation(crypto)
    }

    pub fn set_middleman(&mut self, middleman: PublicKey, crypto: &dyn CryptoAdapter) -> Result<(), ContractError> {
        self.middleman_key = Some(middleman);
        self.recompute_aggregation(crypto)
    }

    /// Recompute the aggregated key and Taproot tweak over the present party set. Requires the
    /// worker to be assigned.
    pub fn recompute_aggregation(&mut self, crypto: &dyn CryptoAdapter) -> Result<(), ContractError> {
        let worker = self
            .worker_key
            .ok_or_else(|| ContractError::InvalidKeys("worker key required for aggregation".to_string()))?;
        let mut keys = vec![self.employer_key, worker];
        if let Some(mm) = self.middleman_key {
            keys.push(mm);
        }
        let aggregated = crypto
            .aggregate_keys(&keys)
            .map_err(|_| ContractError::AggregationFailed)?;
        self.tweak = Some(crypto.taproot_tweak(&aggregated, None));
        self.aggregated_key = Some(aggregated);
        Ok(())
    }

    pub fn rotation_due(&self, now: EpochSeconds) -> bool {
        now - self.last_rotation_time >= KEY_ROTATION_INTERVAL_SECS
    }

    /// Refuse critical actions on stale keys: either the keys are past their maximum age, or the
    /// job has outlived two rotation intervals without a single rotation.
    pub fn validate_for_action(
        &self,
        now: EpochSeconds,
        created_timestamp: EpochSeconds,
    ) -> Result<(), ContractError> {
        if now - self.last_rotation_time > MAX_KEY_AGE_SECS {
            return Err(ContractError::InvalidKeys(format!(
                "keys older than the {MAX_KEY_AGE_SECS}s maximum age; rotate first"
            )));
        }
        if now - created_timestamp > 2 * KEY_ROTATION_INTERVAL_SECS && self.rotation_count == 0 {
            return Err(ContractError::InvalidKeys(
                "long-running job requires at least one key rotation".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the employer and worker keys with freshly generated ones and recompute the
    /// aggregate. Interval and state gating are the contract's responsibility; this only does the
    /// key work so it can be re-run idempotently by the caller's copy-commit discipline.
    pub fn rotate(
        &mut self,
        job_id: &JobId,
        now: EpochSeconds,
        emergency: bool,
        entropy: &dyn EntropySource,
        crypto: &dyn CryptoAdapter,
    ) -> Result<(), ContractError> {
        if self.worker_key.is_none() {
            return Err(ContractError::InvalidKeys(
                "cannot rotate before a worker is assigned".to_string(),
            ));
        }
        let (_, new_employer) = generate_key(job_id, now, emergency, entropy, crypto)?;
        let (_, new_worker) = generate_key(job_id, now, emergency, entropy, crypto)?;
        self.employer_key = new_employer;
        self.worker_key = Some(new_worker);
        self.recompute_aggregation(crypto)?;
        self.rotation_count += 1;
        self.last_rotation_time = now;
        self.rotation_history.push(KeyRotationEvent {
            timestamp: now,
            is_emergency: emergency,
            reason: if emergency {
                "Emergency rotation due to dispute".to_string()
            } else {
                "Scheduled key rotation".to_string()
            },
        });
        Ok(())
    }
}

/// Emergency rotations widen the entropy sources by folding `H(now ‖ job_id)` into the random
/// bytes before key derivation.
fn generate_key(
    job_id: &JobId,
    now: EpochSeconds,
    emergency: bool,
    entropy: &dyn EntropySource,
    crypto: &dyn CryptoAdapter,
) -> Result<(mmp_common_types::types::SecretKey, PublicKey), ContractError> {
    let mut seed = [0u8; 32];
    entropy.fill(&mut seed);
    if emergency {
        let mut material = Vec::with_capacity(40);
        material.extend_from_slice(&now.to_le_bytes());
        material.extend_from_slice(job_id.as_bytes());
        let mixed = crypto.sha256(&material);
        for (byte, mix) in seed.iter_mut().zip(mixed.iter()) {
            *byte ^= mix;
        }
    }
    crypto
        .keypair_from_entropy(&seed)
        .map_err(|_| ContractError::KeyGenerationFailed)
}

#[cfg(test)]
mod test {
    use mmp_common_types::JobId;

    use super::KeyContext;
    use crate::{
        consts::{KEY_ROTATION_INTERVAL_SECS, MAX_KEY_AGE_SECS},
        crypto::Secp256k1Adapter,
        interfaces::{CryptoAdapter, OsEntropy},
    };

    const T0: i64 = 1_700_000_000;

    fn context_with_worker(crypto: &Secp256k1Adapter) -> KeyContext {
        let (_, employer) = crypto.keypair_from_entropy(&[1u8; 32]).unwrap();
        let (_, worker) = crypto.keypair_from_entropy(&[2u8; 32]).unwrap();
        let mut keys = KeyContext::new(employer, T0);
        keys.set_worker(worker, crypto).unwrap();
        keys
    }

    #[test]
    fn aggregation_requires_worker() {
        let crypto = Secp256k1Adapter::new();
        let (_, employer) = crypto.keypair_from_entropy(&[1u8; 32]).unwrap();
        let mut keys = KeyContext::new(employer, T0);
        assert!(keys.recompute_aggregation(&crypto).is_err());
        assert!(keys.aggregated_key.is_none());
    }

    #[test]
    fn aggregate_changes_when_middleman_joins() {
        let crypto = Secp256k1Adapter::new();
        let mut keys = context_with_worker(&crypto);
        let two_party = keys.aggregated_key.unwrap();
        let (_, mm) = crypto.keypair_from_entropy(&[3u8; 32]).unwrap();
        keys.set_middleman(mm, &crypto).unwrap();
        assert_ne!(keys.aggregated_key.unwrap(), two_party);
        assert!(keys.tweak.is_some());
    }

    #[test]
    fn rotation_replaces_both_party_keys() {
        let crypto = Secp256k1Adapter::new();
        let mut keys = context_with_worker(&crypto);
        let old_employer = keys.employer_key;
        let old_worker = keys.worker_key;
        let job_id = JobId::from_bytes([9u8; 32]);
        keys.rotate(&job_id, T0 + KEY_ROTATION_INTERVAL_SECS, false, &OsEntropy, &crypto)
            .unwrap();
        assert_ne!(keys.employer_key, old_employer);
        assert_ne!(keys.worker_key, old_worker);
        assert_eq!(keys.rotation_count, 1);
        assert_eq!(keys.last_rotation_time, T0 + KEY_ROTATION_INTERVAL_SECS);
        assert_eq!(keys.rotation_history.len(), 1);
        assert!(!keys.rotation_history[0].is_emergency);
    }

    #[test]
    fn age_enforcement() {
        let crypto = Secp256k1Adapter::new();
        let keys = context_with_worker(&crypto);
        // Fresh keys pass
        keys.validate_for_action(T0 + 1, T0).unwrap();
        // Past the maximum key age
        assert!(keys.validate_for_action(T0 + MAX_KEY_AGE_SECS + 1, T0).is_err());
        // Job older than two rotation intervals without any rotation
        assert!(keys
            .validate_for_action(T0 + 2 * KEY_ROTATION_INTERVAL_SECS + 1, T0)
            .is_err());
    }
}
