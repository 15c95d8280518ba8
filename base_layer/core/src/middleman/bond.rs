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

//! Bond economics: slash proposals with DAO quorum, cooling-off and appeals, and insurance
//! claims against covered bonds.

use std::{
    collections::HashMap,
    sync::RwLock,
};

use bitcoin::hashes::{sha256, Hash, HashEngine};
use log::{info, warn};
use mmp_common_types::{
    types::{BlockHeight, EpochSeconds, FixedHash, PublicKey},
    JobId,
    Satoshi,
};
use serde::{Deserialize, Serialize};

use crate::{
    consts::{
        COOLING_OFF_BLOCKS,
        COOLING_OFF_SLASH_RATIO,
        INSURANCE_APPROVAL_RATIO,
        INSURANCE_CLAIM_EXPIRY_SECS,
        MAX_CHALLENGE_PERIOD_BLOCKS,
        MAX_DAO_APPROVERS,
        MAX_FEE_TO_BOND_RATIO,
        MAX_INSURANCE_APPROVERS,
        MAX_INSURANCE_PAYOUT_RATIO,
        MIN_CHALLENGE_PERIOD_BLOCKS,
        MIN_DAO_APPROVERS,
        MIN_INSURANCE_APPROVERS,
    },
    middleman::{
        error::BondError,
        record::SlashCondition,
        registry::MiddlemanRegistry,
    },
};

const LOG_TARGET: &str = "mmp::middleman::bond";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashStatus {
    Pending,
    /// A valid appeal arrived inside the window; the proposal is dead.
    Appealed,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashAppeal {
    pub appellant: PublicKey,
    pub filed_height: BlockHeight,
    pub evidence_hash: FixedHash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlashProposal {
    pub id: FixedHash,
    pub middleman: PublicKey,
    pub amount: Satoshi,
    pub conditions: SlashCondition,
    pub approvers: Vec<PublicKey>,
    pub proposed_height: BlockHeight,
    pub appeal_window_blocks: u64,
    pub evidence_hash: FixedHash,
    pub reasoning: String,
    /// Bond size when the proposal was filed; the cooling-off ratio is measured against this.
    pub bond_at_proposal: Satoshi,
    pub status: SlashStatus,
    pub appeal: Option<SlashAppeal>,
}

impl SlashProposal {
    /// Whether the slash is large enough to require the cooling-off delay.
    pub fn requires_cooling_off(&self) -> bool {
        self.amount.as_u64() as f64 >= self.bond_at_proposal.as_u64() as f64 * COOLING_OFF_SLASH_RATIO
    }

    pub fn appeal_deadline(&self) -> BlockHeight {
        self.proposed_height + self.appeal_window_blocks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceClaim {
    pub id: FixedHash,
    pub job_id: JobId,
    pub claimant: PublicKey,
    pub middleman: PublicKey,
    pub insurer: PublicKey,
    pub claim_amount: Satoshi,
    pub approved_amount: Satoshi,
    pub reason: String,
    pub evidence_hash: FixedHash,
    pub approvers: Vec<PublicKey>,
    pub claim_timestamp: EpochSeconds,
    pub status: ClaimStatus,
}

impl InsuranceClaim {
    pub fn is_expired(&self, now: EpochSeconds) -> bool {
        now - self.claim_timestamp > INSURANCE_CLAIM_EXPIRY_SECS
    }
}

fn proposal_id(middleman: &PublicKey, amount: Satoshi, height: BlockHeight, reasoning: &str) -> FixedHash {
    let mut engine = sha256::Hash::engine();
    engine.input(&middleman.serialize());
    engine.input(&amount.as_u64().to_le_bytes());
    engine.input(&height.to_le_bytes());
    engine.input(reasoning.as_bytes());
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// Tracks slash proposals and insurance claims. Bond balances themselves live on the registry
/// records; finalization is the only write path into them.
pub struct BondManager {
    proposals: RwLock<HashMap<FixedHash, SlashProposal>>,
    claims: RwLock<HashMap<FixedHash, InsuranceClaim>>,
}

impl BondManager {
    pub fn new() -> Self {
        Self {
            proposals: RwLock::new(HashMap::new()),
            claims: RwLock::new(HashMap::new()),
        }
    }

    /// File a slash proposal. Economic gate: the slash may not exceed the bond, and what remains
    /// must still cover the middleman's fee commitments at the protocol ratio.
    #[allow(clippy::too_many_arguments)]
    pub fn propose_slash(
        &self,
        registry: &MiddlemanRegistry,
        middleman: &PublicKey,
        amount: Satoshi,
        conditions: SlashCondition,
        evidence_hash: FixedHash,
        reasoning: String,
        height: BlockHeight,
        appeal_window_blocks: u64,
    ) -> Result<FixedHash, BondError> {
        if amount.is_zero() {
            return Err(BondError::SlashInvalid("zero slash amount".to_string()));
        }
        if reasoning.is_empty() {
            return Err(BondError::SlashInvalid("reasoning required".to_string()));
        }
        if evidence_hash == [0u8; 32] {
            return Err(BondError::SlashInvalid("evidence hash required".to_string()));
        }
        if !(MIN_CHALLENGE_PERIOD_BLOCKS..=MAX_CHALLENGE_PERIOD_BLOCKS).contains(&appeal_window_blocks) {
            return Err(BondError::SlashInvalid(format!(
                "appeal window must be within [{MIN_CHALLENGE_PERIOD_BLOCKS}, {MAX_CHALLENGE_PERIOD_BLOCKS}] blocks"
            )));
        }
        let record = registry.get(middleman)?;
        if amount > record.bond {
            return Err(BondError::SlashInvalid("slash exceeds posted bond".to_string()));
        }
        let remaining = record.bond - amount;
        if !remaining.is_zero() && record.fee.as_u64() as f64 > remaining.as_u64() as f64 * MAX_FEE_TO_BOND_RATIO {
            return Err(BondError::EconomicRatiosInvalid(
                "post-slash bond would no longer cover the posted fee".to_string(),
            ));
        }

        let proposal = SlashProposal {
            id: proposal_id(middleman, amount, height, &reasoning),
            middleman: *middleman,
            amount,
            conditions,
            approvers: Vec::new(),
            proposed_height: height,
            appeal_window_blocks,
            evidence_hash,
            reasoning,
            bond_at_proposal: record.bond,
            status: SlashStatus::Pending,
            appeal: None,
        };
        let id = proposal.id;
        let mut proposals = self.proposals.write().expect("bond lock poisoned");
        if proposals.contains_key(&id) {
            return Err(BondError::SlashInvalid("duplicate proposal".to_string()));
        }
        info!(
            target: LOG_TARGET,
            "Slash proposal {} filed against middleman bond: {} of {}",
            hex::encode(&id[..4]),
            amount,
            record.bond
        );
        proposals.insert(id, proposal);
        Ok(id)
    }

    pub fn get_proposal(&self, id: &FixedHash) -> Result<SlashProposal, BondError> {
        self.proposals
            .read()
            .expect("bond lock poisoned")
            .get(id)
            .cloned()
            .ok_or(BondError::ProposalNotFound)
    }

    /// Add a DAO approver signature. Double approvals are rejected.
    pub fn approve_slash(&self, id: &FixedHash, approver: PublicKey) -> Result<usize, BondError> {
        let mut proposals = self.proposals.write().expect("bond lock poisoned");
        let proposal = proposals.get_mut(id).ok_or(BondError::ProposalNotFound)?;
        if proposal.status != SlashStatus::Pending {
            return Err(BondError::AlreadyFinalized);
        }
        if proposal.approvers.contains(&approver) {
            return Err(BondError::DoubleApproval);
        }
        if proposal.approvers.len() >= MAX_DAO_APPROVERS {
            return Err(BondError::SlashInvalid("approver set is full".to_string()));
        }
        proposal.approvers.push(approver);
        Ok(proposal.approvers.len())
    }

    /// A valid appeal inside the window cancels the proposal outright.
    pub fn appeal_slash(
        &self,
        id: &FixedHash,
        appellant: PublicKey,
        evidence_hash: FixedHash,
        height: BlockHeight,
    ) -> Result<(), BondError> {
        let mut proposals = self.proposals.write().expect("bond lock poisoned");
        let proposal = proposals.get_mut(id).ok_or(BondError::ProposalNotFound)?;
        if proposal.status != SlashStatus::Pending {
            return Err(BondError::AlreadyFinalized);
        }
        if evidence_hash == [0u8; 32] {
            return Err(BondError::AppealInvalid);
        }
        if height > proposal.appeal_deadline() {
            return Err(BondError::AppealExpired);
        }
        proposal.appeal = Some(SlashAppeal {
            appellant,
            filed_height: height,
            evidence_hash,
        });
        proposal.status = SlashStatus::Appealed;
        info!(
            target: LOG_TARGET,
            "Slash proposal {} cancelled by appeal at height {}",
            hex::encode(&id[..4]),
            height
        );
        Ok(())
    }

    /// Finalize a slash: quorum reached, cooling-off elapsed for large slashes, no appeal on
    /// file. Applies the bond decrement through the registry and returns the remaining bond.
    pub fn finalize_slash(
        &self,
        registry: &MiddlemanRegistry,
        id: &FixedHash,
        height: BlockHeight,
    ) -> Result<Satoshi, BondError> {
        // Validate under the proposal lock, apply to the registry, then commit the status
        let proposal = {
            let proposals = self.proposals.read().expect("bond lock poisoned");
            proposals.get(id).cloned().ok_or(BondError::ProposalNotFound)?
        };
        match proposal.status {
            SlashStatus::Pending => {},
            SlashStatus::Appealed | SlashStatus::Finalized => return Err(BondError::AlreadyFinalized),
        }
        if proposal.approvers.len() < MIN_DAO_APPROVERS {
            return Err(BondError::InsufficientApprovers {
                have: proposal.approvers.len(),
                need: MIN_DAO_APPROVERS,
            });
        }
        if proposal.requires_cooling_off() {
            let until_height = proposal.proposed_height + COOLING_OFF_BLOCKS;
            if height < until_height {
                return Err(BondError::CoolingOff { until_height });
            }
        }

        let remaining = registry.apply_slash(
            &proposal.middleman,
            proposal.amount,
            proposal.conditions,
            height,
            proposal.reasoning.clone(),
        )?;

        let mut proposals = self.proposals.write().expect("bond lock poisoned");
        if let Some(stored) = proposals.get_mut(id) {
            stored.status = SlashStatus::Finalized;
        }
        warn!(
            target: LOG_TARGET,
            "Slash {} finalized at height {height}; remaining bond {remaining}",
            hex::encode(&id[..4])
        );
        Ok(remaining)
    }

    /// Open an insurance claim against a covered bond.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_claim(
        &self,
        registry: &MiddlemanRegistry,
        job_id: JobId,
        claimant: PublicKey,
        middleman: &PublicKey,
        claim_amount: Satoshi,
        reason: String,
        evidence_hash: FixedHash,
        now: EpochSeconds,
    ) -> Result<FixedHash, BondError> {
        if claim_amount.is_zero() || reason.is_empty() {
            return Err(BondError::ClaimInvalid("amount and reason are required".to_string()));
        }
        let record = registry.get(middleman)?;
        let insurance = record.bond_insurance.as_ref().ok_or(BondError::NotInsured)?;
        if !insurance.is_active(now) {
            return Err(BondError::ClaimInvalid("policy lapsed or premium unpaid".to_string()));
        }

        let mut engine = sha256::Hash::engine();
        engine.input(job_id.as_bytes());
        engine.input(&middleman.serialize());
        engine.input(&now.to_le_bytes());
        let id = sha256::Hash::from_engine(engine).to_byte_array();

        let claim = InsuranceClaim {
            id,
            job_id,
            claimant,
            middleman: *middleman,
            insurer: insurance.insurer,
            claim_amount,
            approved_amount: Satoshi::ZERO,
            reason,
            evidence_hash,
            approvers: Vec::new(),
            claim_timestamp: now,
            status: ClaimStatus::Pending,
        };
        self.claims.write().expect("bond lock poisoned").insert(id, claim);
        Ok(id)
    }

    pub fn get_claim(&self, id: &FixedHash) -> Result<InsuranceClaim, BondError> {
        self.claims
            .read()
            .expect("bond lock poisoned")
            .get(id)
            .cloned()
            .ok_or(BondError::ClaimNotFound)
    }

    pub fn approve_claim(&self, id: &FixedHash, approver: PublicKey) -> Result<usize, BondError> {
        let mut claims = self.claims.write().expect("bond lock poisoned");
        let claim = claims.get_mut(id).ok_or(BondError::ClaimNotFound)?;
        if claim.status != ClaimStatus::Pending {
            return Err(BondError::AlreadyFinalized);
        }
        if claim.approvers.contains(&approver) {
            return Err(BondError::DoubleApproval);
        }
        if claim.approvers.len() >= MAX_INSURANCE_APPROVERS {
            return Err(BondError::ClaimInvalid("adjuster panel is full".to_string()));
        }
        claim.approvers.push(approver);
        Ok(claim.approvers.len())
    }

    /// Resolve a pending claim. Approval needs both the minimum adjuster count and the panel
    /// approval ratio; the payout is capped by the payout ratio, the coverage and the bond.
    pub fn resolve_claim(
        &self,
        registry: &MiddlemanRegistry,
        id: &FixedHash,
        now: EpochSeconds,
    ) -> Result<Satoshi, BondError> {
        let mut claims = self.claims.write().expect("bond lock poisoned");
        let claim = claims.get_mut(id).ok_or(BondError::ClaimNotFound)?;
        if claim.status != ClaimStatus::Pending {
            return Err(BondError::AlreadyFinalized);
        }
        if claim.is_expired(now) {
            claim.status = ClaimStatus::Expired;
            return Err(BondError::ClaimInvalid("claim expired unresolved".to_string()));
        }
        let have = claim.approvers.len();
        let ratio = have as f64 / MAX_INSURANCE_APPROVERS as f64;
        if have < MIN_INSURANCE_APPROVERS || ratio < INSURANCE_APPROVAL_RATIO {
            claim.status = ClaimStatus::Rejected;
            return Err(BondError::InsufficientApprovers {
                have,
                need: MIN_INSURANCE_APPROVERS.max((INSURANCE_APPROVAL_RATIO * MAX_INSURANCE_APPROVERS as f64).ceil()
                    as usize),
            });
        }

        let record = registry.get(&claim.middleman)?;
        let insurance = record.bond_insurance.as_ref().ok_or(BondError::NotInsured)?;
        let capped = Satoshi::new((claim.claim_amount.as_u64() as f64 * MAX_INSURANCE_PAYOUT_RATIO) as u64);
        let payout = insurance.effective_coverage(capped).min(record.bond);
        claim.approved_amount = payout;
        claim.status = ClaimStatus::Approved;
        Ok(payout)
    }
}

impl Default for BondManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use mmp_common_types::{JobId, Satoshi};

    use super::{BondManager, ClaimStatus, SlashStatus};
    use crate::{
        consts::{COOLING_OFF_BLOCKS, MIN_CHALLENGE_PERIOD_BLOCKS},
        crypto::Secp256k1Adapter,
        interfaces::CryptoAdapter,
        middleman::{
            error::BondError,
            record::{BondInsurance, Middleman, SlashCondition},
            registry::MiddlemanRegistry,
        },
    };

    const HEIGHT: u64 = 800_000;
    const NOW: i64 = 1_700_000_000;

    fn key(fill: u8) -> bitcoin::secp256k1::PublicKey {
        Secp256k1Adapter::new().keypair_from_entropy(&[fill; 32]).unwrap().1
    }

    fn setup(bond: u64) -> (MiddlemanRegistry, bitcoin::secp256k1::PublicKey) {
        let registry = MiddlemanRegistry::new();
        let mm = Middleman::new("bondee", key(40), Satoshi::new(10_000), Satoshi::new(bond));
        let pk = mm.pubkey;
        registry.register(mm).unwrap();
        (registry, pk)
    }

    fn propose(manager: &BondManager, registry: &MiddlemanRegistry, pk: &bitcoin::secp256k1::PublicKey, amount: u64) -> [u8; 32] {
        manager
            .propose_slash(
                registry,
                pk,
                Satoshi::new(amount),
                SlashCondition::MALICIOUS_BEHAVIOR,
                [7u8; 32],
                "ignored evidence and ruled arbitrarily".to_string(),
                HEIGHT,
                MIN_CHALLENGE_PERIOD_BLOCKS,
            )
            .unwrap()
    }

    #[test]
    fn quorum_is_enforced() {
        let (registry, pk) = setup(1_000_000);
        let manager = BondManager::new();
        let id = propose(&manager, &registry, &pk, 100_000);

        manager.approve_slash(&id, key(1)).unwrap();
        manager.approve_slash(&id, key(2)).unwrap();
        assert_eq!(
            manager.finalize_slash(&registry, &id, HEIGHT + 1),
            Err(BondError::InsufficientApprovers { have: 2, need: 3 })
        );
        assert_eq!(manager.approve_slash(&id, key(2)), Err(BondError::DoubleApproval));

        manager.approve_slash(&id, key(3)).unwrap();
        // 10% slash: no cooling-off
        let remaining = manager.finalize_slash(&registry, &id, HEIGHT + 1).unwrap();
        assert_eq!(remaining, Satoshi::new(900_000));
        assert_eq!(manager.get_proposal(&id).unwrap().status, SlashStatus::Finalized);
    }

    #[test]
    fn large_slash_waits_out_cooling_off() {
        let (registry, pk) = setup(1_000_000);
        let manager = BondManager::new();
        // 30% of the bond: cooling-off applies
        let id = propose(&manager, &registry, &pk, 300_000);
        for i in 1..=3 {
            manager.approve_slash(&id, key(i)).unwrap();
        }
        assert_eq!(
            manager.finalize_slash(&registry, &id, HEIGHT + COOLING_OFF_BLOCKS - 1),
            Err(BondError::CoolingOff {
                until_height: HEIGHT + COOLING_OFF_BLOCKS
            })
        );
        let remaining = manager
            .finalize_slash(&registry, &id, HEIGHT + COOLING_OFF_BLOCKS)
            .unwrap();
        assert_eq!(remaining, Satoshi::new(700_000));
    }

    #[test]
    fn appeal_inside_window_cancels_slash() {
        let (registry, pk) = setup(1_000_000);
        let manager = BondManager::new();
        let id = propose(&manager, &registry, &pk, 300_000);
        for i in 1..=3 {
            manager.approve_slash(&id, key(i)).unwrap();
        }
        manager.appeal_slash(&id, pk, [9u8; 32], HEIGHT + 10).unwrap();
        assert_eq!(
            manager.finalize_slash(&registry, &id, HEIGHT + COOLING_OFF_BLOCKS),
            Err(BondError::AlreadyFinalized)
        );
        // Bond untouched
        assert_eq!(registry.get(&pk).unwrap().bond, Satoshi::new(1_000_000));
        assert_eq!(manager.get_proposal(&id).unwrap().status, SlashStatus::Appealed);
    }

    #[test]
    fn appeal_after_window_is_rejected() {
        let (registry, pk) = setup(1_000_000);
        let manager = BondManager::new();
        let id = propose(&manager, &registry, &pk, 300_000);
        assert_eq!(
            manager.appeal_slash(&id, pk, [9u8; 32], HEIGHT + MIN_CHALLENGE_PERIOD_BLOCKS + 1),
            Err(BondError::AppealExpired)
        );
    }

    #[test]
    fn slash_cannot_exceed_bond() {
        let (registry, pk) = setup(100_000);
        let manager = BondManager::new();
        let result = manager.propose_slash(
            &registry,
            &pk,
            Satoshi::new(100_001),
            SlashCondition::REPEATED_FAILURES,
            [7u8; 32],
            "overreach".to_string(),
            HEIGHT,
            MIN_CHALLENGE_PERIOD_BLOCKS,
        );
        assert!(matches!(result, Err(BondError::SlashInvalid(_))));
    }

    #[test]
    fn insurance_claim_flow() {
        let (registry, pk) = setup(1_000_000);
        registry
            .with_middleman(&pk, |mm| {
                mm.bond_insurance = Some(BondInsurance {
                    coverage: Satoshi::new(500_000),
                    premium_rate: 0.02,
                    insurer: key(50),
                    policy_hash: [3u8; 32],
                    policy_expiry: NOW + 86_400,
                    premium_paid: Satoshi::new(10_000),
                });
                Ok(())
            })
            .unwrap();

        let manager = BondManager::new();
        let id = manager
            .submit_claim(
                &registry,
                JobId::from_bytes([1u8; 32]),
                key(60),
                &pk,
                Satoshi::new(400_000),
                "middleman absconded".to_string(),
                [4u8; 32],
                NOW,
            )
            .unwrap();

        manager.approve_claim(&id, key(1)).unwrap();
        manager.approve_claim(&id, key(2)).unwrap();
        // Two approvers meet the minimum but fail the 60% panel ratio
        assert!(matches!(
            manager.resolve_claim(&registry, &id, NOW),
            Err(BondError::InsufficientApprovers { .. })
        ));

        let id = manager
            .submit_claim(
                &registry,
                JobId::from_bytes([1u8; 32]),
                key(60),
                &pk,
                Satoshi::new(400_000),
                "middleman absconded".to_string(),
                [4u8; 32],
                NOW + 1,
            )
            .unwrap();
        for i in 1..=3 {
            manager.approve_claim(&id, key(i)).unwrap();
        }
        let payout = manager.resolve_claim(&registry, &id, NOW + 2).unwrap();
        // 90% of 400_000, within coverage and bond
        assert_eq!(payout, Satoshi::new(360_000));
        assert_eq!(manager.get_claim(&id).unwrap().status, ClaimStatus::Approved);
    }

    #[test]
    fn claims_require_active_insurance() {
        let (registry, pk) = setup(1_000_000);
        let manager = BondManager::new();
        let result = manager.submit_claim(
            &registry,
            JobId::from_bytes([1u8; 32]),
            key(60),
            &pk,
            Satoshi::new(100_000),
            "no coverage".to_string(),
            [4u8; 32],
            NOW,
        );
        assert_eq!(result, Err(BondError::NotInsured));
    }
}
