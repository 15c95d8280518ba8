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

//! The contract store: the host-owned registry of job contracts and the entry point for every
//! operation that mutates one.
//!
//! Concurrency model: a coarse read-write lock protects only the `job_id → contract` map and is
//! never held across contract work. Each contract sits behind its own mutex acting as both the
//! exclusive writer guard and a reentrancy guard — a second mutation attempt while one is in
//! flight observes [`StoreError::Reentrancy`] instead of deadlocking. Mutations run on a local
//! copy and commit on success, so a failing operation leaves the stored contract untouched.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use bitcoin::Transaction;
use log::info;
use mmp_common_types::{
    types::{BlockHeight, EpochSeconds, PublicKey},
    JobId,
    Satoshi,
};
use thiserror::Error;

use crate::{
    contract::{
        error::ContractError,
        job_contract::{DisputeConfig, JobContract},
        state::{JobState, ResolutionPath},
    },
    dispute::{engine, error::DisputeError, evidence::Evidence, MiddlemanDecision},
    escrow::tx_template::TxTemplateFactory,
    interfaces::Collaborators,
    middleman::{
        registry::{MiddlemanRegistry, SelectionCriteria},
        rotation::FallbackRotation,
    },
};

const LOG_TARGET: &str = "mmp::store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Contract {0} is not known to the store")]
    ContractNotFound(JobId),
    #[error("Contract {0} is locked by a concurrent operation")]
    Reentrancy(JobId),
    #[error("Only contracts in a terminal state may be removed")]
    NotTerminal,
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Dispute(#[from] DisputeError),
}

struct ContractCell {
    inner: Mutex<JobContract>,
}

/// Host-owned contract registry. All state-changing operations acquire the per-contract guard
/// for their full duration; reads return snapshots.
pub struct ContractStore {
    contracts: RwLock<HashMap<JobId, Arc<ContractCell>>>,
    collaborators: Collaborators,
    templates: TxTemplateFactory,
}

impl ContractStore {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            contracts: RwLock::new(HashMap::new()),
            collaborators,
            templates: TxTemplateFactory::new(),
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Build a new contract. The caller stores it explicitly once the posting transaction is
    /// prepared.
    #[allow(clippy::too_many_arguments)]
    pub fn new_contract(
        &self,
        employer: PublicKey,
        title: String,
        description: String,
        amount: Satoshi,
        timeout_blocks: u64,
        created_height: BlockHeight,
        created_timestamp: EpochSeconds,
    ) -> Result<JobContract, StoreError> {
        let contract = JobContract::new(
            employer,
            title,
            description,
            amount,
            timeout_blocks,
            created_height,
            created_timestamp,
            DisputeConfig::default(),
        )?;
        Ok(contract)
    }

    /// Idempotent insertion: storing a contract under an id that already exists is a no-op.
    pub fn store_contract(&self, contract: JobContract) -> Result<(), StoreError> {
        contract.validate()?;
        let mut contracts = self.contracts.write().expect("store lock poisoned");
        if contracts.contains_key(&contract.job_id) {
            return Ok(());
        }
        info!(target: LOG_TARGET, "Storing contract {}", contract.job_id.short_str());
        contracts.insert(contract.job_id, Arc::new(ContractCell {
            inner: Mutex::new(contract),
        }));
        Ok(())
    }

    fn cell(&self, job_id: &JobId) -> Result<Arc<ContractCell>, StoreError> {
        let contracts = self.contracts.read().expect("store lock poisoned");
        contracts.get(job_id).cloned().ok_or(StoreError::ContractNotFound(*job_id))
    }

    /// Read-only snapshot.
    pub fn get_contract(&self, job_id: &JobId) -> Result<JobContract, StoreError> {
        let cell = self.cell(job_id)?;
        let guard = cell.inner.try_lock().map_err(|_| StoreError::Reentrancy(*job_id))?;
        Ok(guard.clone())
    }

    pub fn list_contracts_by_state(&self, state: JobState) -> Vec<JobContract> {
        let cells: Vec<Arc<ContractCell>> = {
            let contracts = self.contracts.read().expect("store lock poisoned");
            contracts.values().cloned().collect()
        };
        cells
            .iter()
            .filter_map(|cell| {
                let guard = cell.inner.try_lock().ok()?;
                (guard.state == state).then(|| guard.clone())
            })
            .collect()
    }

    /// Remove a finished contract. Refused while the contract is still live.
    pub fn remove(&self, job_id: &JobId) -> Result<(), StoreError> {
        let terminal = {
            let cell = self.cell(job_id)?;
            let guard = cell.inner.try_lock().map_err(|_| StoreError::Reentrancy(*job_id))?;
            guard.state.is_terminal()
        };
        if !terminal {
            return Err(StoreError::NotTerminal);
        }
        let mut contracts = self.contracts.write().expect("store lock poisoned");
        contracts.remove(job_id);
        Ok(())
    }

    /// Run a mutating closure under the per-contract guard with copy-commit semantics.
    pub fn with_contract<F, R>(&self, job_id: &JobId, f: F) -> Result<R, StoreError>
    where F: FnOnce(&mut JobContract) -> Result<R, StoreError> {
        let cell = self.cell(job_id)?;
        let mut guard = cell.inner.try_lock().map_err(|_| StoreError::Reentrancy(*job_id))?;
        let mut working = guard.clone();
        let result = f(&mut working)?;
        *guard = working;
        Ok(result)
    }

    // Operation catalog

    /// Record the funding outpoint and open the job for applications.
    pub fn post_job(&self, job_id: &JobId, funding_txid: bitcoin::Txid, funding_vout: u32) -> Result<(), StoreError> {
        let now = self.collaborators.clock.now();
        self.with_contract(job_id, |contract| {
            contract.post(funding_txid, funding_vout, now)?;
            Ok(())
        })
    }

    pub fn apply_to_job(
        &self,
        job_id: &JobId,
        worker: PublicKey,
        proposal: String,
        timestamp: EpochSeconds,
    ) -> Result<(), StoreError> {
        self.with_contract(job_id, |contract| {
            contract.apply(worker, proposal, timestamp)?;
            Ok(())
        })
    }

    /// Assign a worker and return the unsigned escrow upgrade to the two-of-two lock.
    pub fn assign_worker(&self, job_id: &JobId, worker: PublicKey) -> Result<Transaction, StoreError> {
        let now = self.collaborators.clock.now();
        let crypto = Arc::clone(&self.collaborators.crypto);
        let templates = &self.templates;
        self.with_contract(job_id, move |contract| {
            contract.assign_worker(worker, now, crypto.as_ref())?;
            let upgrade = templates.worker_selection_upgrade(
                &contract.keys.employer_key,
                &worker,
                contract.funding_outpoint()?,
                contract.metadata.amount,
            );
            Ok(upgrade)
        })
    }

    pub fn start_work(&self, job_id: &JobId) -> Result<(), StoreError> {
        let now = self.collaborators.clock.now();
        self.with_contract(job_id, |contract| {
            contract.start_work(now)?;
            Ok(())
        })
    }

    pub fn complete_work(&self, job_id: &JobId, txid: Option<bitcoin::Txid>) -> Result<(), StoreError> {
        let now = self.collaborators.clock.now();
        self.with_contract(job_id, |contract| {
            contract.complete_work(txid, now)?;
            Ok(())
        })
    }

    pub fn rotate_keys(&self, job_id: &JobId, emergency: bool) -> Result<(), StoreError> {
        let now = self.collaborators.clock.now();
        let entropy = Arc::clone(&self.collaborators.entropy);
        let crypto = Arc::clone(&self.collaborators.crypto);
        self.with_contract(job_id, move |contract| {
            contract.rotate_keys(now, emergency, entropy.as_ref(), crypto.as_ref())?;
            Ok(())
        })
    }

    /// Raise a dispute; the emergency key rotation happens inside the same guarded operation.
    pub fn raise_dispute(&self, job_id: &JobId, initiator: PublicKey, reason: String) -> Result<(), StoreError> {
        let now = self.collaborators.clock.now();
        let height = self.collaborators.chain.current_height();
        let entropy = Arc::clone(&self.collaborators.entropy);
        let crypto = Arc::clone(&self.collaborators.crypto);
        self.with_contract(job_id, move |contract| {
            contract.raise_dispute(initiator, reason, now, height, entropy.as_ref(), crypto.as_ref())?;
            Ok(())
        })
    }

    /// Propose a middleman candidate on behalf of a party. Returns the agreed middleman if this
    /// proposal completed a mutual agreement.
    pub fn propose_middleman(
        &self,
        job_id: &JobId,
        party: PublicKey,
        candidate: PublicKey,
        registry: &MiddlemanRegistry,
    ) -> Result<Option<PublicKey>, StoreError> {
        self.with_contract(job_id, |contract| {
            Ok(engine::propose_middleman(contract, &party, candidate, registry)?)
        })
    }

    /// Resolve middleman selection by automatic scoring, falling back to the current fallback
    /// arbitrator after the selection timeout.
    pub fn select_middleman(
        &self,
        job_id: &JobId,
        registry: &MiddlemanRegistry,
        criteria: &SelectionCriteria,
        required_specialties: &[String],
        fallback: &FallbackRotation,
    ) -> Result<PublicKey, StoreError> {
        let height = self.collaborators.chain.current_height();
        self.with_contract(job_id, |contract| {
            match engine::auto_select(contract, registry, criteria, required_specialties) {
                Ok(chosen) => Ok(chosen),
                Err(DisputeError::NoEligibleCandidates) | Err(DisputeError::NotAuthorized) => {
                    Ok(engine::fallback_arbitrator(contract, fallback, height)?)
                },
                Err(err) => Err(err.into()),
            }
        })
    }

    /// Escalate the escrow to the two-of-three lock under the appointed middleman. Returns the
    /// unsigned escalation template.
    pub fn appoint_middleman(&self, job_id: &JobId, registry: &MiddlemanRegistry) -> Result<Transaction, StoreError> {
        let now = self.collaborators.clock.now();
        let crypto = Arc::clone(&self.collaborators.crypto);
        let templates = &self.templates;
        self.with_contract(job_id, move |contract| {
            let agreed = contract
                .dispute
                .as_ref()
                .and_then(|d| d.agreed_middleman)
                .ok_or(DisputeError::MiddlemanNotAgreed)?;
            let middleman = registry.get(&agreed).map_err(DisputeError::from)?;
            engine::appoint_middleman(contract, &middleman, now, crypto.as_ref())?;
            let worker = contract
                .keys
                .worker_key
                .ok_or_else(|| ContractError::InvalidKeys("worker required".to_string()))?;
            let upgrade = templates.dispute_escalation_upgrade(
                &contract.keys.employer_key,
                &worker,
                &middleman.pubkey,
                contract.funding_outpoint()?,
                contract.metadata.amount,
            );
            Ok(upgrade)
        })
    }

    /// Structural evidence intake. Content and timestamp verification run outside the guard via
    /// [`crate::dispute::evidence::verify_content`] and
    /// [`crate::dispute::evidence::verify_timestamp`].
    pub fn submit_evidence(&self, job_id: &JobId, evidence: Evidence) -> Result<(), StoreError> {
        let now = self.collaborators.clock.now();
        self.with_contract(job_id, |contract| {
            engine::submit_evidence(contract, evidence, now)?;
            Ok(())
        })
    }

    /// Resolve the contract along the chosen path and return the unsigned resolution
    /// transaction. The middleman's registry counters are updated on success.
    pub fn resolve(
        &self,
        job_id: &JobId,
        path: ResolutionPath,
        decision: Option<MiddlemanDecision>,
        registry: &MiddlemanRegistry,
    ) -> Result<Transaction, StoreError> {
        let now = self.collaborators.clock.now();
        let height = self.collaborators.chain.current_height();
        let templates = &self.templates;
        let tx = self.with_contract(job_id, move |contract| {
            let params = engine::resolve(contract, path, decision.as_ref(), now, height)?;
            let tx = templates.resolution(&params)?;
            contract.resolution_txid = Some(tx.compute_txid());
            Ok(tx)
        })?;
        if path.requires_middleman() {
            if let Some(info) = self.get_contract(job_id)?.middleman_info {
                let _ = registry.record_resolution(&info.pubkey, true, now);
            }
        }
        Ok(tx)
    }

    /// Worker-initiated claim after the post-completion timeout. Returns the unsigned claim
    /// transaction along the `worker_timeout` script path.
    pub fn claim_timeout(&self, job_id: &JobId) -> Result<Transaction, StoreError> {
        let now = self.collaborators.clock.now();
        let templates = &self.templates;
        self.with_contract(job_id, move |contract| {
            if !contract.can_worker_claim_timeout(now) {
                return Err(ContractError::InvalidState {
                    operation: "claim_timeout",
                    state: contract.state,
                }
                .into());
            }
            let worker = contract
                .keys
                .worker_key
                .ok_or_else(|| ContractError::InvalidKeys("worker required".to_string()))?;
            let params = crate::escrow::tx_template::ResolutionParams {
                path: ResolutionPath::WorkerTimeout,
                escrow_outpoint: contract.funding_outpoint()?,
                escrow_amount: contract.metadata.amount,
                employer: contract.keys.employer_key,
                worker,
                middleman: None,
                split: None,
            };
            let tx = templates.resolution(&params).map_err(StoreError::Dispute)?;
            contract.claim_timeout(now, Some(tx.compute_txid()))?;
            Ok(tx)
        })
    }

    pub fn cancel(&self, job_id: &JobId, reason: String) -> Result<(), StoreError> {
        let now = self.collaborators.clock.now();
        self.with_contract(job_id, |contract| {
            contract.cancel(reason, now)?;
            Ok(())
        })
    }

    /// Expire the contract if its on-chain timeout has elapsed.
    pub fn expire(&self, job_id: &JobId) -> Result<(), StoreError> {
        let now = self.collaborators.clock.now();
        let height = self.collaborators.chain.current_height();
        self.with_contract(job_id, |contract| {
            contract.expire(height, now)?;
            Ok(())
        })
    }

    /// File an appeal against a resolution within the challenge period.
    pub fn appeal_resolution(
        &self,
        job_id: &JobId,
        appellant: PublicKey,
        evidence_hash: mmp_common_types::types::FixedHash,
        reason: String,
    ) -> Result<(), StoreError> {
        let height = self.collaborators.chain.current_height();
        self.with_contract(job_id, |contract| {
            engine::file_appeal(contract, appellant, evidence_hash, reason, height)?;
            Ok(())
        })
    }

    pub fn len(&self) -> usize {
        self.contracts.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use bitcoin::hashes::Hash;
    use mmp_common_types::Satoshi;

    use super::{ContractStore, StoreError};
    use crate::{
        contract::state::JobState,
        crypto::Secp256k1Adapter,
        interfaces::CryptoAdapter,
        test_helpers::test_collaborators,
    };

    const T0: i64 = 1_700_000_000;
    const H0: u64 = 800_000;

    fn key(fill: u8) -> bitcoin::secp256k1::PublicKey {
        Secp256k1Adapter::new().keypair_from_entropy(&[fill; 32]).unwrap().1
    }

    fn store() -> ContractStore {
        let (collaborators, _, _) = test_collaborators(T0, H0);
        ContractStore::new(collaborators)
    }

    fn stored_open_contract(store: &ContractStore) -> mmp_common_types::JobId {
        let contract = store
            .new_contract(
                key(1),
                "Job".to_string(),
                "desc".to_string(),
                Satoshi::new(1_000_000),
                144,
                H0,
                T0,
            )
            .unwrap();
        let job_id = contract.job_id;
        store.store_contract(contract).unwrap();
        store.post_job(&job_id, bitcoin::Txid::from_byte_array([0xF1u8; 32]), 1).unwrap();
        job_id
    }

    #[test]
    fn store_is_idempotent() {
        let store = store();
        let contract = store
            .new_contract(
                key(1),
                "Job".to_string(),
                "desc".to_string(),
                Satoshi::new(1_000_000),
                144,
                H0,
                T0,
            )
            .unwrap();
        let job_id = contract.job_id;
        store.store_contract(contract.clone()).unwrap();
        store.store_contract(contract).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_contract(&job_id).unwrap().state, JobState::Created);
    }

    #[test]
    fn unknown_contract_is_an_error() {
        let store = store();
        let missing = mmp_common_types::JobId::from_bytes([9u8; 32]);
        assert!(matches!(
            store.get_contract(&missing),
            Err(StoreError::ContractNotFound(_))
        ));
    }

    #[test]
    fn list_by_state_filters() {
        let store = store();
        let open = stored_open_contract(&store);
        let fresh = store
            .new_contract(
                key(5),
                "Another".to_string(),
                "desc".to_string(),
                Satoshi::new(1_000_000),
                144,
                H0,
                T0 + 1,
            )
            .unwrap();
        store.store_contract(fresh).unwrap();

        let open_jobs = store.list_contracts_by_state(JobState::Open);
        assert_eq!(open_jobs.len(), 1);
        assert_eq!(open_jobs[0].job_id, open);
        assert_eq!(store.list_contracts_by_state(JobState::Created).len(), 1);
        assert!(store.list_contracts_by_state(JobState::Resolved).is_empty());
    }

    #[test]
    fn failed_mutation_rolls_back() {
        let store = store();
        let job_id = stored_open_contract(&store);
        // start_work from Open is an illegal transition; the contract must be untouched
        let before = store.get_contract(&job_id).unwrap();
        assert!(store.start_work(&job_id).is_err());
        let after = store.get_contract(&job_id).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn removal_requires_terminal_state() {
        let store = store();
        let job_id = stored_open_contract(&store);
        assert!(matches!(store.remove(&job_id), Err(StoreError::NotTerminal)));
        store.cancel(&job_id, "abandoned".to_string()).unwrap();
        store.remove(&job_id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn assignment_produces_upgrade_template() {
        let store = store();
        let job_id = stored_open_contract(&store);
        let worker = key(2);
        store.apply_to_job(&job_id, worker, "bid".to_string(), T0 + 5).unwrap();
        let upgrade = store.assign_worker(&job_id, worker).unwrap();
        assert_eq!(upgrade.output.len(), 1);
        assert!(upgrade.output[0].script_pubkey.is_p2wsh());
        assert_eq!(upgrade.output[0].value.to_sat(), 1_000_000);
        assert_eq!(store.get_contract(&job_id).unwrap().state, JobState::Assigned);
    }

    #[test]
    fn contended_contract_reports_reentrancy() {
        use std::sync::mpsc;

        let store = Arc::new(store());
        let job_id = stored_open_contract(&store);
        let worker = key(2);
        store.apply_to_job(&job_id, worker, "bid".to_string(), T0 + 5).unwrap();

        // Hold the guard on one thread, then race a mutation against it
        let (hold_tx, hold_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let store_clone = Arc::clone(&store);
        let handle = std::thread::spawn(move || {
            store_clone
                .with_contract(&job_id, |contract| {
                    hold_tx.send(()).expect("receiver alive");
                    // Keep the guard until the main thread has observed the contention
                    done_rx.recv().expect("sender alive");
                    contract.apply(key(3), "late bid".to_string(), T0 + 6)?;
                    Ok(())
                })
                .expect("guarded mutation succeeds");
        });

        hold_rx.recv().expect("guard held");
        let contended = store.start_work(&job_id);
        assert!(matches!(contended, Err(StoreError::Reentrancy(_))));
        done_tx.send(()).expect("worker alive");
        handle.join().expect("no panic");

        // Exactly one application was appended by the guarded op
        assert_eq!(store.get_contract(&job_id).unwrap().worker_applications.len(), 2);
    }
}
