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

//! The job contract aggregate: metadata, keys, script paths, applications, dispute record and
//! the audit trail, mutated only through the operations defined here.

use std::fmt::{Display, Error as FmtError, Formatter};

use bitcoin::{hashes::Hash, OutPoint, Txid};
use log::debug;
use mmp_common_types::{
    types::{BlockHeight, EpochSeconds, FixedHash, PublicKey},
    JobId,
    Satoshi,
};
use serde::{Deserialize, Serialize};

use crate::{
    consts::{
        COMPLETION_TIMEOUT_SECS,
        DEFAULT_DISPUTE_WINDOW_SECS,
        DEFAULT_RESOLUTION_TIMEOUT_BLOCKS,
        EXPIRATION_WARNING_BLOCKS,
        KEY_ROTATION_INTERVAL_SECS,
        MAX_APPLICATIONS_PER_JOB,
        MAX_APPLICATION_MESSAGE_LENGTH,
        MAX_CANCEL_REASON_LENGTH,
        MAX_CHALLENGE_PERIOD_BLOCKS,
        MAX_DISPUTE_REASON_LENGTH,
        MIN_CHALLENGE_PERIOD_BLOCKS,
    },
    contract::{
        application::{ApplicationStatus, WorkerApplication},
        error::ContractError,
        keys::KeyContext,
        metadata::JobMetadata,
        state::{ContractEvent, JobState, ResolutionPath},
    },
    dispute::evidence::Evidence,
    escrow::script::ScriptPaths,
    interfaces::{CryptoAdapter, EntropySource},
};

const LOG_TARGET: &str = "mmp::contract";

/// Per-contract dispute handling parameters, fixed at creation and serialized with the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeConfig {
    pub auto_select_middleman: bool,
    /// Blocks the parties get to agree on a middleman before the fallback arbitrator steps in.
    pub resolution_timeout_blocks: u64,
    /// Appeal window after resolution, in blocks.
    pub challenge_period_blocks: u64,
    pub requires_notary: bool,
    /// Wall-clock length of the dispute activity window.
    pub dispute_window_secs: EpochSeconds,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            auto_select_middleman: true,
            resolution_timeout_blocks: DEFAULT_RESOLUTION_TIMEOUT_BLOCKS,
            challenge_period_blocks: MIN_CHALLENGE_PERIOD_BLOCKS,
            requires_notary: false,
            dispute_window_secs: DEFAULT_DISPUTE_WINDOW_SECS,
        }
    }
}

impl DisputeConfig {
    pub fn validate(&self) -> Result<(), ContractError> {
        if !(MIN_CHALLENGE_PERIOD_BLOCKS..=MAX_CHALLENGE_PERIOD_BLOCKS).contains(&self.challenge_period_blocks) {
            return Err(ContractError::InvalidMetadata(
                crate::contract::error::MetadataError::TimeoutOutOfRange(self.challenge_period_blocks),
            ));
        }
        if self.dispute_window_secs <= 0 {
            return Err(ContractError::InvalidMetadata(
                crate::contract::error::MetadataError::TimeoutOutOfRange(0),
            ));
        }
        Ok(())
    }
}

/// How the dispute middleman was appointed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMethod {
    MutualAgreement,
    ReputationBased,
    FallbackArbitrator,
}

impl SelectionMethod {
    pub fn as_u8(self) -> u8 {
        match self {
            SelectionMethod::MutualAgreement => 0,
            SelectionMethod::ReputationBased => 1,
            SelectionMethod::FallbackArbitrator => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SelectionMethod::MutualAgreement),
            1 => Some(SelectionMethod::ReputationBased),
            2 => Some(SelectionMethod::FallbackArbitrator),
            _ => None,
        }
    }
}

/// The appointed middleman, denormalised onto the contract so payouts survive registry churn.
/// Deliberately an identifier-carrying summary, not a back-pointer into the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlemanSummary {
    pub id: FixedHash,
    pub name: String,
    pub pubkey: PublicKey,
    pub fee: Satoshi,
    pub selection_timestamp: EpochSeconds,
}

/// An appeal filed against a dispute resolution inside the challenge period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeAppeal {
    pub appellant: PublicKey,
    pub filed_height: BlockHeight,
    pub evidence_hash: FixedHash,
    pub reason: String,
}

/// Everything recorded about a contract's dispute. Present iff a dispute was ever raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub initiator: PublicKey,
    pub reason: String,
    pub timestamp: EpochSeconds,
    pub raised_height: BlockHeight,
    pub proposed_by_employer: Vec<PublicKey>,
    pub proposed_by_worker: Vec<PublicKey>,
    pub agreed_middleman: Option<PublicKey>,
    pub selection_method: Option<SelectionMethod>,
    pub evidence: Vec<Evidence>,
    pub resolved_height: Option<BlockHeight>,
    pub appeal: Option<DisputeAppeal>,
    /// Set by emergency resolutions; hosts surface these for extra scrutiny.
    pub flagged_for_review: bool,
}

impl DisputeRecord {
    fn new(initiator: PublicKey, reason: String, timestamp: EpochSeconds, raised_height: BlockHeight) -> Self {
        Self {
            initiator,
            reason,
            timestamp,
            raised_height,
            proposed_by_employer: Vec::new(),
            proposed_by_worker: Vec::new(),
            agreed_middleman: None,
            selection_method: None,
            evidence: Vec::new(),
            resolved_height: None,
            appeal: None,
            flagged_for_review: false,
        }
    }
}

/// A full job contract between an employer and a worker.
///
/// Field order matters: the canonical serialization in [`crate::contract::codec`] walks these
/// fields in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobContract {
    pub job_id: JobId,
    pub keys: KeyContext,
    pub script_paths: ScriptPaths,
    pub metadata: JobMetadata,
    pub state: JobState,
    pub funding_txid: Option<Txid>,
    pub funding_vout: u32,
    pub resolution_txid: Option<Txid>,
    pub resolution_path: Option<ResolutionPath>,
    pub last_key_rotation: EpochSeconds,
    pub worker_applications: Vec<WorkerApplication>,
    pub assigned_worker: Option<PublicKey>,
    pub dispute_config: DisputeConfig,
    pub middleman_info: Option<MiddlemanSummary>,
    pub dispute: Option<DisputeRecord>,
    pub completion_timestamp: EpochSeconds,
    pub event_history: Vec<ContractEvent>,
}

impl JobContract {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        employer: PublicKey,
        title: String,
        description: String,
        amount: Satoshi,
        timeout_blocks: u64,
        created_height: BlockHeight,
        created_timestamp: EpochSeconds,
        dispute_config: DisputeConfig,
    ) -> Result<Self, ContractError> {
        let metadata = JobMetadata {
            title,
            description,
            amount,
            created_height,
            created_timestamp,
            timeout_blocks,
            requirements: String::new(),
            deliverables: String::new(),
        };
        metadata.validate()?;
        dispute_config.validate()?;
        let job_id = JobId::derive(&employer, &metadata.title, created_timestamp);
        let mut contract = Self {
            job_id,
            keys: KeyContext::new(employer, created_timestamp),
            script_paths: ScriptPaths::default(),
            metadata,
            state: JobState::Created,
            funding_txid: None,
            funding_vout: 0,
            resolution_txid: None,
            resolution_path: None,
            last_key_rotation: created_timestamp,
            worker_applications: Vec::new(),
            assigned_worker: None,
            dispute_config,
            middleman_info: None,
            dispute: None,
            completion_timestamp: 0,
            event_history: Vec::new(),
        };
        contract.push_event(created_timestamp, JobState::Created, None, "Contract created".to_string());
        Ok(contract)
    }

    pub fn employer(&self) -> &PublicKey {
        &self.keys.employer_key
    }

    pub fn is_party(&self, key: &PublicKey) -> bool {
        key == &self.keys.employer_key || self.keys.worker_key.as_ref() == Some(key)
    }

    pub fn dispute_raised(&self) -> bool {
        self.dispute.is_some()
    }

    pub fn funding_outpoint(&self) -> Result<OutPoint, ContractError> {
        let txid = self.funding_txid.ok_or(ContractError::InvalidFunding)?;
        Ok(OutPoint::new(txid, self.funding_vout))
    }

    fn push_event(&mut self, timestamp: EpochSeconds, new_state: JobState, txid: Option<Txid>, memo: String) {
        let prev_state = self.state;
        self.event_history.push(ContractEvent {
            timestamp,
            prev_state,
            new_state,
            txid,
            memo,
        });
    }

    /// Append an informational event without changing state.
    pub fn add_event(&mut self, now: EpochSeconds, txid: Option<Txid>, memo: String) {
        let state = self.state;
        self.push_event(now, state, txid, memo);
    }

    /// Drive the state machine along one legal edge, recording the audit event.
    pub fn transition(
        &mut self,
        new_state: JobState,
        now: EpochSeconds,
        txid: Option<Txid>,
        memo: Option<String>,
    ) -> Result<(), ContractError> {
        if self.state.is_terminal() {
            return Err(ContractError::TransitionLocked(self.state));
        }
        if !self.state.can_transition_to(new_state) {
            return Err(ContractError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }
        let old_state = self.state;
        let memo = memo.unwrap_or_else(|| format!("State transition from {old_state} to {new_state}"));
        if new_state == JobState::Completed {
            self.completion_timestamp = now;
        }
        self.push_event(now, new_state, txid, memo.clone());
        self.state = new_state;
        debug!(
            target: LOG_TARGET,
            "[{}] {} -> {}: {}",
            self.job_id.short_str(),
            old_state,
            new_state,
            memo
        );
        Ok(())
    }

    /// Expiration is height-driven. A chain reorganisation can leave the tip below the creation
    /// height; that must not expire the contract.
    pub fn is_expired(&self, current_height: BlockHeight) -> bool {
        if current_height < self.metadata.created_height {
            return false;
        }
        current_height - self.metadata.created_height >= self.metadata.timeout_blocks
    }

    pub fn is_near_expiration(&self, current_height: BlockHeight) -> bool {
        if current_height < self.metadata.created_height {
            return false;
        }
        let elapsed = current_height - self.metadata.created_height;
        if elapsed >= self.metadata.timeout_blocks {
            return false;
        }
        self.metadata.timeout_blocks - elapsed < EXPIRATION_WARNING_BLOCKS
    }

    /// Move any non-terminal contract to `Expired` once the timeout has elapsed on chain.
    pub fn expire(&mut self, current_height: BlockHeight, now: EpochSeconds) -> Result<(), ContractError> {
        if self.state.is_terminal() {
            return Err(ContractError::TransitionLocked(self.state));
        }
        if !self.is_expired(current_height) {
            return Err(ContractError::InvalidState {
                operation: "expire",
                state: self.state,
            });
        }
        self.push_event(
            now,
            JobState::Expired,
            None,
            format!("Timed out after {} blocks", self.metadata.timeout_blocks),
        );
        self.state = JobState::Expired;
        Ok(())
    }

    /// Record the funding outpoint and open the job for applications. The outpoint is set once
    /// and immutable afterwards.
    pub fn post(&mut self, funding_txid: Txid, funding_vout: u32, now: EpochSeconds) -> Result<(), ContractError> {
        if self.state != JobState::Created {
            return Err(ContractError::InvalidState {
                operation: "post",
                state: self.state,
            });
        }
        // A null txid is the serialization convention for "absent" and can never fund anything
        if funding_txid == Txid::all_zeros() {
            return Err(ContractError::InvalidFunding);
        }
        self.funding_txid = Some(funding_txid);
        self.funding_vout = funding_vout;
        self.transition(JobState::Open, now, Some(funding_txid), Some("Job posted and funded".to_string()))
    }

    pub fn apply(&mut self, worker: PublicKey, proposal: String, now: EpochSeconds) -> Result<(), ContractError> {
        if self.state != JobState::Open {
            return Err(ContractError::InvalidState {
                operation: "apply",
                state: self.state,
            });
        }
        if self.worker_applications.len() >= MAX_APPLICATIONS_PER_JOB {
            return Err(ContractError::ApplicationLimitReached);
        }
        if proposal.len() > MAX_APPLICATION_MESSAGE_LENGTH {
            return Err(ContractError::ProposalTooLong(MAX_APPLICATION_MESSAGE_LENGTH));
        }
        if self.worker_applications.iter().any(|a| a.worker == worker) {
            return Err(ContractError::DuplicateApplication);
        }
        self.worker_applications.push(WorkerApplication::new(worker, proposal, now));
        Ok(())
    }

    /// Select one of the applicants. The winning application is marked accepted and the rest
    /// rejected; the key context gains the worker and the script-path set comes into existence.
    pub fn assign_worker(
        &mut self,
        worker: PublicKey,
        now: EpochSeconds,
        crypto: &dyn CryptoAdapter,
    ) -> Result<(), ContractError> {
        if self.state != JobState::Open {
            return Err(ContractError::InvalidState {
                operation: "assign_worker",
                state: self.state,
            });
        }
        self.keys.validate_for_action(now, self.metadata.created_timestamp)?;
        if !self.worker_applications.iter().any(|a| a.worker == worker) {
            return Err(ContractError::ApplicationNotFound);
        }
        for application in &mut self.worker_applications {
            application.status = if application.worker == worker {
                ApplicationStatus::Accepted
            } else {
                ApplicationStatus::Rejected
            };
        }
        self.assigned_worker = Some(worker);
        self.keys.set_worker(worker, crypto)?;
        self.script_paths = ScriptPaths::build(&self.keys, self.metadata.timeout_blocks)?;
        self.transition(JobState::Assigned, now, None, Some("Worker assigned".to_string()))
    }

    pub fn start_work(&mut self, now: EpochSeconds) -> Result<(), ContractError> {
        self.keys.validate_for_action(now, self.metadata.created_timestamp)?;
        self.transition(JobState::InProgress, now, None, Some("Work started".to_string()))
    }

    pub fn complete_work(&mut self, txid: Option<Txid>, now: EpochSeconds) -> Result<(), ContractError> {
        self.keys.validate_for_action(now, self.metadata.created_timestamp)?;
        self.transition(JobState::Completed, now, txid, Some("Work submitted".to_string()))
    }

    /// Rotate the employer and worker keys. Scheduled rotations respect the rotation interval;
    /// emergency rotations (raised disputes) skip it and widen the entropy sources.
    pub fn rotate_keys(
        &mut self,
        now: EpochSeconds,
        emergency: bool,
        entropy: &dyn EntropySource,
        crypto: &dyn CryptoAdapter,
    ) -> Result<(), ContractError> {
        let state_permits = matches!(self.state, JobState::Assigned | JobState::InProgress) ||
            (emergency && self.state == JobState::Disputed);
        if !state_permits {
            return Err(ContractError::InvalidState {
                operation: "rotate_keys",
                state: self.state,
            });
        }
        if !emergency && now - self.keys.last_rotation_time < KEY_ROTATION_INTERVAL_SECS {
            return Err(ContractError::KeyRotationNotDue {
                due_at: self.keys.last_rotation_time + KEY_ROTATION_INTERVAL_SECS,
            });
        }
        self.keys.rotate(&self.job_id, now, emergency, entropy, crypto)?;
        self.script_paths
            .update_with_new_keys(&self.keys, self.metadata.timeout_blocks)?;
        // The assignment tracks the live worker key across rotations
        self.assigned_worker = self.keys.worker_key;
        self.last_key_rotation = now;
        let memo = if emergency {
            "Emergency key rotation performed"
        } else {
            "Scheduled key rotation performed"
        };
        self.add_event(now, None, memo.to_string());
        Ok(())
    }

    /// Raise a dispute. Transitions to `Disputed` and performs an emergency key rotation so the
    /// contested escrow no longer answers to possibly-compromised keys.
    pub fn raise_dispute(
        &mut self,
        initiator: PublicKey,
        reason: String,
        now: EpochSeconds,
        height: BlockHeight,
        entropy: &dyn EntropySource,
        crypto: &dyn CryptoAdapter,
    ) -> Result<(), ContractError> {
        if !matches!(self.state, JobState::InProgress | JobState::Completed) {
            return Err(ContractError::InvalidState {
                operation: "raise_dispute",
                state: self.state,
            });
        }
        if !self.is_party(&initiator) {
            return Err(ContractError::NotAParty);
        }
        if reason.is_empty() {
            return Err(ContractError::ReasonRequired);
        }
        if reason.len() > MAX_DISPUTE_REASON_LENGTH {
            return Err(ContractError::ReasonTooLong(MAX_DISPUTE_REASON_LENGTH));
        }
        self.dispute = Some(DisputeRecord::new(initiator, reason.clone(), now, height));
        self.transition(JobState::Disputed, now, None, Some(format!("Dispute raised: {reason}")))?;
        self.rotate_keys(now, true, entropy, crypto)
    }

    pub fn cancel(&mut self, reason: String, now: EpochSeconds) -> Result<(), ContractError> {
        if reason.len() > MAX_CANCEL_REASON_LENGTH {
            return Err(ContractError::ReasonTooLong(MAX_CANCEL_REASON_LENGTH));
        }
        self.transition(JobState::Cancelled, now, None, Some(reason))
    }

    /// Whether the employer can still contest the submitted work.
    pub fn is_in_dispute_period(&self, now: EpochSeconds) -> bool {
        self.state == JobState::Completed &&
            self.completion_timestamp > 0 &&
            now - self.completion_timestamp < COMPLETION_TIMEOUT_SECS
    }

    /// The worker may claim unilaterally once the post-completion window has fully elapsed.
    pub fn can_worker_claim_timeout(&self, now: EpochSeconds) -> bool {
        self.state == JobState::Completed &&
            self.completion_timestamp > 0 &&
            now - self.completion_timestamp >= COMPLETION_TIMEOUT_SECS
    }

    pub fn claim_timeout(&mut self, now: EpochSeconds, txid: Option<Txid>) -> Result<(), ContractError> {
        if !self.can_worker_claim_timeout(now) {
            return Err(ContractError::InvalidState {
                operation: "claim_timeout",
                state: self.state,
            });
        }
        self.resolution_path = Some(ResolutionPath::WorkerTimeout);
        self.resolution_txid = txid;
        self.transition(
            JobState::Resolved,
            now,
            txid,
            Some("Worker claimed escrow via timeout path".to_string()),
        )
    }

    /// Dispute liveness is measured purely in wall-clock seconds against the configured window.
    pub fn is_dispute_active(&self, now: EpochSeconds) -> bool {
        match &self.dispute {
            Some(record) => {
                self.state == JobState::Disputed && now - record.timestamp < self.dispute_config.dispute_window_secs
            },
            None => false,
        }
    }

    /// Granular structural validation, surfacing the first violated invariant.
    pub fn validate(&self) -> Result<(), ContractError> {
        self.metadata.validate()?;
        self.dispute_config.validate()?;
        if self.state.requires_worker() {
            let assigned = self.assigned_worker.ok_or_else(|| {
                ContractError::InvalidKeys("assigned worker required in this state".to_string())
            })?;
            if self.keys.worker_key != Some(assigned) {
                return Err(ContractError::InvalidKeys(
                    "worker key does not match the assignment".to_string(),
                ));
            }
            if !self.script_paths.is_complete() {
                return Err(ContractError::InvalidScript);
            }
        }
        if matches!(
            self.state,
            JobState::Open | JobState::Assigned | JobState::InProgress | JobState::Completed | JobState::Disputed
        ) && self.funding_txid.is_none()
        {
            return Err(ContractError::InvalidFunding);
        }
        if self.state == JobState::Resolved && self.resolution_txid.is_none() {
            return Err(ContractError::InvalidFunding);
        }
        if let Some(record) = &self.dispute {
            if !matches!(self.state, JobState::Disputed | JobState::Resolved | JobState::Expired) {
                return Err(ContractError::InvalidState {
                    operation: "validate",
                    state: self.state,
                });
            }
            if record.agreed_middleman.is_some() && self.keys.middleman_key != record.agreed_middleman {
                return Err(ContractError::InvalidKeys(
                    "middleman key does not match the agreed arbiter".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Display for JobContract {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        writeln!(f, "Job contract {}", self.job_id)?;
        writeln!(f, "  Title:  {}", self.metadata.title)?;
        writeln!(f, "  Amount: {}", self.metadata.amount)?;
        writeln!(f, "  State:  {}", self.state)?;
        if let Some(worker) = &self.assigned_worker {
            writeln!(f, "  Worker: {}", worker)?;
        }
        if let Some(record) = &self.dispute {
            writeln!(f, "  Dispute: {}", record.reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use mmp_common_types::Satoshi;

    use super::{DisputeConfig, JobContract};
    use crate::{
        consts::{COMPLETION_TIMEOUT_SECS, KEY_ROTATION_INTERVAL_SECS},
        contract::{error::ContractError, state::JobState},
        crypto::Secp256k1Adapter,
        interfaces::{CryptoAdapter, OsEntropy},
    };

    const T0: i64 = 1_700_000_000;
    const H0: u64 = 800_000;

    fn keypair(fill: u8) -> bitcoin::secp256k1::PublicKey {
        Secp256k1Adapter::new().keypair_from_entropy(&[fill; 32]).unwrap().1
    }

    fn contract() -> JobContract {
        JobContract::new(
            keypair(1),
            "Design".to_string(),
            "A design job".to_string(),
            Satoshi::new(100_000_000),
            144,
            H0,
            T0,
            DisputeConfig::default(),
        )
        .unwrap()
    }

    fn funded_assigned() -> (JobContract, bitcoin::secp256k1::PublicKey) {
        use bitcoin::hashes::Hash;
        let crypto = Secp256k1Adapter::new();
        let worker = keypair(2);
        let mut c = contract();
        c.post(bitcoin::Txid::from_byte_array([0xF1u8; 32]), 1, T0 + 10).unwrap();
        c.apply(worker, "I can do this".to_string(), T0 + 20).unwrap();
        c.assign_worker(worker, T0 + 30, &crypto).unwrap();
        (c, worker)
    }

    #[test]
    fn creation_records_the_first_event() {
        let c = contract();
        assert_eq!(c.state, JobState::Created);
        assert_eq!(c.event_history.len(), 1);
        assert_eq!(c.event_history[0].memo, "Contract created");
        assert!(!c.job_id.is_zero());
        c.validate().unwrap();
    }

    #[test]
    fn full_cooperative_lifecycle() {
        let (mut c, worker) = funded_assigned();
        assert_eq!(c.state, JobState::Assigned);
        assert_eq!(c.assigned_worker, Some(worker));
        assert!(c.script_paths.is_complete());
        c.validate().unwrap();

        c.start_work(T0 + 40).unwrap();
        c.complete_work(None, T0 + 50).unwrap();
        assert_eq!(c.completion_timestamp, T0 + 50);
        assert!(c.is_in_dispute_period(T0 + 51));

        // Claim at exactly the 24h boundary is accepted
        let claim_time = T0 + 50 + COMPLETION_TIMEOUT_SECS;
        assert!(!c.can_worker_claim_timeout(claim_time - 1));
        assert!(c.can_worker_claim_timeout(claim_time));
        c.claim_timeout(claim_time, None).unwrap();
        assert_eq!(c.state, JobState::Resolved);

        // Terminal: everything else is locked
        assert_eq!(
            c.cancel("too late".to_string(), claim_time + 1),
            Err(ContractError::TransitionLocked(JobState::Resolved))
        );
    }

    #[test]
    fn events_are_recorded_in_order() {
        let (mut c, _) = funded_assigned();
        c.start_work(T0 + 40).unwrap();
        c.complete_work(None, T0 + 50).unwrap();
        let timestamps: Vec<i64> = c.event_history.iter().map(|e| e.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_unstable();
        assert_eq!(timestamps, sorted);
        assert_eq!(c.event_history.len(), 5);
        // Every transition chains from the previous state
        for pair in c.event_history.windows(2) {
            assert_eq!(pair[1].prev_state, pair[0].new_state);
        }
    }

    #[test]
    fn reorg_does_not_expire() {
        let mut c = contract();
        assert!(!c.is_expired(H0 - 10));
        assert!(!c.is_expired(H0 + 143));
        assert!(c.is_expired(H0 + 144));
        assert_eq!(
            c.expire(H0 - 10, T0 + 60),
            Err(ContractError::InvalidState {
                operation: "expire",
                state: JobState::Created
            })
        );
        c.expire(H0 + 144, T0 + 60).unwrap();
        assert_eq!(c.state, JobState::Expired);
    }

    #[test]
    fn near_expiration_warning_window() {
        let c = contract();
        assert!(!c.is_near_expiration(H0));
        assert!(c.is_near_expiration(H0 + 121));
        assert!(!c.is_near_expiration(H0 + 144));
    }

    #[test]
    fn application_hygiene() {
        let mut c = contract();
        use bitcoin::hashes::Hash;
        c.post(bitcoin::Txid::from_byte_array([0xF1u8; 32]), 1, T0 + 10).unwrap();
        let worker = keypair(2);
        c.apply(worker, "first".to_string(), T0 + 20).unwrap();
        assert_eq!(
            c.apply(worker, "again".to_string(), T0 + 21),
            Err(ContractError::DuplicateApplication)
        );
        let long = "p".repeat(1_025);
        assert_eq!(
            c.apply(keypair(3), long, T0 + 22),
            Err(ContractError::ProposalTooLong(1_024))
        );
    }

    #[test]
    fn rotation_interval_is_idempotent() {
        let crypto = Secp256k1Adapter::new();
        let (mut c, _) = funded_assigned();
        let due = T0 + KEY_ROTATION_INTERVAL_SECS;
        assert!(matches!(
            c.rotate_keys(due - 1, false, &OsEntropy, &crypto),
            Err(ContractError::KeyRotationNotDue { .. })
        ));
        c.rotate_keys(due, false, &OsEntropy, &crypto).unwrap();
        assert_eq!(c.keys.rotation_count, 1);
        let snapshot = c.clone();
        // Re-invoking before the next interval changes nothing
        assert!(matches!(
            c.rotate_keys(due + 100, false, &OsEntropy, &crypto),
            Err(ContractError::KeyRotationNotDue { .. })
        ));
        assert_eq!(c, snapshot);
    }

    #[test]
    fn dispute_triggers_emergency_rotation() {
        let crypto = Secp256k1Adapter::new();
        let (mut c, _) = funded_assigned();
        c.start_work(T0 + 40).unwrap();
        let employer = c.keys.employer_key;
        c.raise_dispute(
            employer,
            "deliverable does not match the brief".to_string(),
            T0 + 100,
            H0 + 5,
            &OsEntropy,
            &crypto,
        )
        .unwrap();
        assert_eq!(c.state, JobState::Disputed);
        assert!(c.dispute_raised());
        assert_eq!(c.keys.rotation_count, 1);
        assert!(c.keys.rotation_history[0].is_emergency);
        assert!(c.is_dispute_active(T0 + 101));
        assert!(!c.is_dispute_active(T0 + 100 + 86_400));
    }

    #[test]
    fn strangers_cannot_raise_disputes() {
        let crypto = Secp256k1Adapter::new();
        let (mut c, _) = funded_assigned();
        c.start_work(T0 + 40).unwrap();
        assert_eq!(
            c.raise_dispute(
                keypair(9),
                "not my job".to_string(),
                T0 + 100,
                H0 + 5,
                &OsEntropy,
                &crypto
            ),
            Err(ContractError::NotAParty)
        );
    }

    #[test]
    fn assignment_requires_an_application() {
        let crypto = Secp256k1Adapter::new();
        let mut c = contract();
        use bitcoin::hashes::Hash;
        c.post(bitcoin::Txid::from_byte_array([0xF1u8; 32]), 1, T0 + 10).unwrap();
        assert_eq!(
            c.assign_worker(keypair(2), T0 + 30, &crypto),
            Err(ContractError::ApplicationNotFound)
        );
    }
}
