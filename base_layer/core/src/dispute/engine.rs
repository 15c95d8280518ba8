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

//! The dispute lifecycle driver.
//!
//! Middleman selection reconciles in three stages: a candidate proposed by both parties wins
//! outright; failing that, automatic selection picks the best-scoring approved candidate; and
//! once the resolution timeout lapses the fallback arbitrator is appointed. Resolution paths are
//! authorised here and laid out as unsigned templates by the factory.

use log::{info, warn};
use mmp_common_types::{
    types::{BlockHeight, EpochSeconds, FixedHash, PublicKey},
    Satoshi,
};

use crate::{
    consts::{MAX_EVIDENCE_AGE_SECS, MAX_PROPOSED_MIDDLEMEN_PER_PARTY},
    contract::{
        error::ContractError,
        job_contract::{DisputeAppeal, JobContract, MiddlemanSummary, SelectionMethod},
        state::{JobState, ResolutionPath},
    },
    dispute::{error::DisputeError, evidence::Evidence},
    escrow::tx_template::ResolutionParams,
    interfaces::CryptoAdapter,
    middleman::{
        record::Middleman,
        registry::{MiddlemanRegistry, SelectionCriteria},
        rotation::FallbackRotation,
    },
};

const LOG_TARGET: &str = "mmp::dispute";

/// A middleman's verdict for an arbitrated resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlemanDecision {
    pub middleman: PublicKey,
    /// Employer and worker portions for split resolutions.
    pub split: Option<(Satoshi, Satoshi)>,
    pub reasoning: String,
}

fn active_record(contract: &mut JobContract) -> Result<&mut crate::contract::job_contract::DisputeRecord, DisputeError> {
    if contract.state != JobState::Disputed {
        return Err(DisputeError::NoActiveDispute);
    }
    contract.dispute.as_mut().ok_or(DisputeError::NoActiveDispute)
}

/// Add a candidate to the proposing party's list. Returns the agreed middleman if this proposal
/// completes a mutual agreement.
pub fn propose_middleman(
    contract: &mut JobContract,
    party: &PublicKey,
    candidate: PublicKey,
    registry: &MiddlemanRegistry,
) -> Result<Option<PublicKey>, DisputeError> {
    let employer = contract.keys.employer_key;
    let worker = contract.keys.worker_key;

    let record = registry.get(&candidate).map_err(|_| DisputeError::MiddlemanNotFound)?;
    if !record.is_active {
        return Err(DisputeError::MiddlemanInactive);
    }

    let dispute = active_record(contract)?;
    if dispute.agreed_middleman.is_some() {
        return Ok(dispute.agreed_middleman);
    }

    let (own, other) = if *party == employer {
        (&mut dispute.proposed_by_employer, &dispute.proposed_by_worker)
    } else if Some(*party) == worker {
        (&mut dispute.proposed_by_worker, &dispute.proposed_by_employer)
    } else {
        return Err(DisputeError::NotAParty);
    };

    if own.len() >= MAX_PROPOSED_MIDDLEMEN_PER_PARTY {
        return Err(DisputeError::ProposalLimitReached(MAX_PROPOSED_MIDDLEMEN_PER_PARTY));
    }
    if !own.contains(&candidate) {
        own.push(candidate);
    }

    if other.contains(&candidate) {
        dispute.agreed_middleman = Some(candidate);
        dispute.selection_method = Some(SelectionMethod::MutualAgreement);
        info!(target: LOG_TARGET, "Parties mutually agreed on a middleman");
        return Ok(Some(candidate));
    }
    Ok(None)
}

/// Pick the best-scoring eligible candidate from the approved pool.
pub fn auto_select(
    contract: &mut JobContract,
    registry: &MiddlemanRegistry,
    criteria: &SelectionCriteria,
    required_specialties: &[String],
) -> Result<PublicKey, DisputeError> {
    if !contract.dispute_config.auto_select_middleman {
        return Err(DisputeError::NotAuthorized);
    }
    let job_amount = contract.metadata.amount;
    let dispute = active_record(contract)?;
    if let Some(agreed) = dispute.agreed_middleman {
        return Ok(agreed);
    }
    let ranked = registry.rank_candidates(criteria, job_amount, required_specialties);
    let (best, score) = ranked.first().copied().ok_or(DisputeError::NoEligibleCandidates)?;
    dispute.agreed_middleman = Some(best);
    dispute.selection_method = Some(SelectionMethod::ReputationBased);
    info!(target: LOG_TARGET, "Auto-selected middleman with score {score:.3}");
    Ok(best)
}

/// After the resolution timeout, appoint the current fallback arbitrator.
pub fn fallback_arbitrator(
    contract: &mut JobContract,
    rotation: &FallbackRotation,
    current_height: BlockHeight,
) -> Result<PublicKey, DisputeError> {
    let timeout = contract.dispute_config.resolution_timeout_blocks;
    let dispute = active_record(contract)?;
    if let Some(agreed) = dispute.agreed_middleman {
        return Ok(agreed);
    }
    let due_height = dispute.raised_height + timeout;
    if current_height < due_height {
        return Err(DisputeError::SelectionTimeoutNotReached { due_height });
    }
    let arbitrator = rotation.current_arbitrator().ok_or(DisputeError::NoEligibleCandidates)?;
    dispute.agreed_middleman = Some(arbitrator);
    dispute.selection_method = Some(SelectionMethod::FallbackArbitrator);
    warn!(
        target: LOG_TARGET,
        "Middleman selection timed out; fallback arbitrator appointed"
    );
    Ok(arbitrator)
}

/// Apply the chosen middleman to the contract: record the summary, extend the key set and
/// rebuild the script paths for the two-of-three escalation.
pub fn appoint_middleman(
    contract: &mut JobContract,
    middleman: &Middleman,
    now: EpochSeconds,
    crypto: &dyn CryptoAdapter,
) -> Result<(), DisputeError> {
    let dispute = active_record(contract)?;
    if dispute.agreed_middleman != Some(middleman.pubkey) {
        return Err(DisputeError::MiddlemanNotAgreed);
    }
    contract.middleman_info = Some(MiddlemanSummary {
        id: middleman.id,
        name: middleman.name.clone(),
        pubkey: middleman.pubkey,
        fee: middleman.fee,
        selection_timestamp: now,
    });
    contract.keys.set_middleman(middleman.pubkey, crypto)?;
    contract
        .script_paths
        .update_with_new_keys(&contract.keys, contract.metadata.timeout_blocks)?;
    contract.add_event(now, None, format!("Middleman '{}' appointed", middleman.name));
    Ok(())
}

/// Structural evidence intake under the contract guard. Content and timestamp verification run
/// separately, outside the guard, via [`crate::dispute::evidence`].
pub fn submit_evidence(contract: &mut JobContract, evidence: Evidence, now: EpochSeconds) -> Result<(), DisputeError> {
    let requires_notary = contract.dispute_config.requires_notary;
    let submitter = evidence.submitter;
    if !contract.is_party(&submitter) {
        return Err(DisputeError::NotAParty);
    }
    evidence.validate(requires_notary)?;
    if evidence.timestamp > now {
        return Err(DisputeError::EvidenceInvalid("timestamp is in the future".to_string()));
    }
    if now - evidence.timestamp > MAX_EVIDENCE_AGE_SECS {
        return Err(DisputeError::EvidenceExpired);
    }
    let dispute = active_record(contract)?;
    dispute.evidence.push(evidence);
    contract.add_event(now, None, "Evidence submitted".to_string());
    Ok(())
}

/// Authorise a resolution path and lay out its payout parameters. On success the contract is
/// `Resolved`; the returned params feed the template factory.
pub fn resolve(
    contract: &mut JobContract,
    path: ResolutionPath,
    decision: Option<&MiddlemanDecision>,
    now: EpochSeconds,
    current_height: BlockHeight,
) -> Result<ResolutionParams, DisputeError> {
    let worker = contract
        .keys
        .worker_key
        .ok_or_else(|| ContractError::InvalidKeys("no worker on this contract".to_string()))?;
    let escrow_outpoint = contract.funding_outpoint()?;
    let escrow_amount = contract.metadata.amount;
    let employer = contract.keys.employer_key;

    let mut params = ResolutionParams {
        path,
        escrow_outpoint,
        escrow_amount,
        employer,
        worker,
        middleman: None,
        split: None,
    };

    match path {
        ResolutionPath::Cooperative => {
            if !matches!(contract.state, JobState::Completed | JobState::Disputed) {
                return Err(ContractError::InvalidState {
                    operation: "resolve",
                    state: contract.state,
                }
                .into());
            }
        },
        ResolutionPath::WorkerTimeout => {
            // The timeout path is worker-initiated through `claim_timeout`
            return Err(ContractError::InvalidState {
                operation: "resolve",
                state: contract.state,
            }
            .into());
        },
        ResolutionPath::EmployerWin | ResolutionPath::WorkerWin | ResolutionPath::MiddlemanSplit |
        ResolutionPath::Emergency => {
            let info = contract.middleman_info.clone().ok_or(DisputeError::MiddlemanNotAgreed)?;
            let dispute = active_record(contract)?;
            if dispute.agreed_middleman != Some(info.pubkey) {
                return Err(DisputeError::MiddlemanNotAgreed);
            }
            let decision = decision.ok_or(DisputeError::NotAuthorized)?;
            if decision.middleman != info.pubkey {
                return Err(DisputeError::NotAuthorized);
            }
            params.middleman = Some((info.pubkey, info.fee));
            if matches!(path, ResolutionPath::MiddlemanSplit | ResolutionPath::Emergency) {
                params.split = Some(decision.split.ok_or(DisputeError::SplitRequired)?);
            }
            if path == ResolutionPath::Emergency {
                dispute.flagged_for_review = true;
                warn!(
                    target: LOG_TARGET,
                    "Emergency resolution selected; contract flagged for review"
                );
            }
            dispute.resolved_height = Some(current_height);
        },
    }

    if let Some(dispute) = contract.dispute.as_mut() {
        dispute.resolved_height.get_or_insert(current_height);
    }
    contract.resolution_path = Some(path);
    contract.transition(
        JobState::Resolved,
        now,
        None,
        Some(format!("Resolved via {path} path")),
    )?;
    Ok(params)
}

/// File an appeal against a resolution inside the challenge period.
pub fn file_appeal(
    contract: &mut JobContract,
    appellant: PublicKey,
    evidence_hash: FixedHash,
    reason: String,
    current_height: BlockHeight,
) -> Result<(), DisputeError> {
    if !contract.is_party(&appellant) {
        return Err(DisputeError::NotAParty);
    }
    if evidence_hash == [0u8; 32] || reason.is_empty() {
        return Err(DisputeError::AppealInvalid);
    }
    if contract.state != JobState::Resolved {
        return Err(DisputeError::NoActiveDispute);
    }
    let challenge_period = contract.dispute_config.challenge_period_blocks;
    let dispute = contract.dispute.as_mut().ok_or(DisputeError::NoActiveDispute)?;
    if dispute.appeal.is_some() {
        return Err(DisputeError::AppealInvalid);
    }
    let resolved_height = dispute.resolved_height.ok_or(DisputeError::NoActiveDispute)?;
    if current_height > resolved_height + challenge_period {
        return Err(DisputeError::AppealExpired);
    }
    dispute.appeal = Some(DisputeAppeal {
        appellant,
        filed_height: current_height,
        evidence_hash,
        reason,
    });
    dispute.flagged_for_review = true;
    info!(target: LOG_TARGET, "Appeal filed at height {current_height}");
    Ok(())
}

#[cfg(test)]
mod test {
    use bitcoin::hashes::Hash;
    use mmp_common_types::Satoshi;

    use super::*;
    use crate::{
        contract::job_contract::{DisputeConfig, JobContract},
        crypto::Secp256k1Adapter,
        dispute::evidence::EvidenceType,
        interfaces::{CryptoAdapter, OsEntropy},
        middleman::registry::SelectionCriteria,
    };

    const T0: i64 = 1_700_000_000;
    const H0: u64 = 800_000;

    struct Fixture {
        contract: JobContract,
        registry: MiddlemanRegistry,
        crypto: Secp256k1Adapter,
        middleman: Middleman,
    }

    fn key(fill: u8) -> PublicKey {
        Secp256k1Adapter::new().keypair_from_entropy(&[fill; 32]).unwrap().1
    }

    fn disputed_fixture() -> Fixture {
        let crypto = Secp256k1Adapter::new();
        let employer = key(1);
        let worker = key(2);

        let registry = MiddlemanRegistry::new();
        let mut middleman = Middleman::new("Judge", key(3), Satoshi::new(50_000), Satoshi::new(20_000_000));
        middleman.reputation_score = 90;
        middleman.is_dao_approved = true;
        registry.register(middleman.clone()).unwrap();

        let mut contract = JobContract::new(
            employer,
            "Job".to_string(),
            "desc".to_string(),
            Satoshi::new(100_000_000),
            1_440,
            H0,
            T0,
            DisputeConfig::default(),
        )
        .unwrap();
        contract.post(bitcoin::Txid::from_byte_array([0xF1u8; 32]), 1, T0 + 1).unwrap();
        contract.apply(worker, "bid".to_string(), T0 + 2).unwrap();
        contract.assign_worker(worker, T0 + 3, &crypto).unwrap();
        contract.start_work(T0 + 4).unwrap();
        contract
            .raise_dispute(employer, "bad work".to_string(), T0 + 5, H0 + 10, &OsEntropy, &crypto)
            .unwrap();

        Fixture {
            contract,
            registry,
            crypto,
            middleman,
        }
    }

    #[test]
    fn mutual_agreement_wins() {
        let mut fx = disputed_fixture();
        let employer = fx.contract.keys.employer_key;
        let worker = fx.contract.keys.worker_key.unwrap();
        let candidate = fx.middleman.pubkey;

        let first = propose_middleman(&mut fx.contract, &employer, candidate, &fx.registry).unwrap();
        assert_eq!(first, None);
        let second = propose_middleman(&mut fx.contract, &worker, candidate, &fx.registry).unwrap();
        assert_eq!(second, Some(candidate));
        let record = fx.contract.dispute.as_ref().unwrap();
        assert_eq!(record.selection_method, Some(SelectionMethod::MutualAgreement));
    }

    #[test]
    fn unknown_candidates_are_rejected() {
        let mut fx = disputed_fixture();
        let employer = fx.contract.keys.employer_key;
        assert_eq!(
            propose_middleman(&mut fx.contract, &employer, key(99), &fx.registry),
            Err(DisputeError::MiddlemanNotFound)
        );
        assert_eq!(
            propose_middleman(&mut fx.contract, &key(42), fx.middleman.pubkey, &fx.registry),
            Err(DisputeError::NotAParty)
        );
    }

    #[test]
    fn auto_select_picks_from_approved_pool() {
        let mut fx = disputed_fixture();
        let chosen = auto_select(&mut fx.contract, &fx.registry, &SelectionCriteria::default(), &[]).unwrap();
        assert_eq!(chosen, fx.middleman.pubkey);
        assert_eq!(
            fx.contract.dispute.as_ref().unwrap().selection_method,
            Some(SelectionMethod::ReputationBased)
        );
    }

    #[test]
    fn fallback_respects_the_timeout() {
        let mut fx = disputed_fixture();
        let rotation = FallbackRotation::new(vec![key(7), key(8), key(9)], 4_032, H0);
        let timeout = fx.contract.dispute_config.resolution_timeout_blocks;
        assert_eq!(
            fallback_arbitrator(&mut fx.contract, &rotation, H0 + 10 + timeout - 1),
            Err(DisputeError::SelectionTimeoutNotReached {
                due_height: H0 + 10 + timeout
            })
        );
        let appointed = fallback_arbitrator(&mut fx.contract, &rotation, H0 + 10 + timeout).unwrap();
        assert_eq!(appointed, key(7));
        assert_eq!(
            fx.contract.dispute.as_ref().unwrap().selection_method,
            Some(SelectionMethod::FallbackArbitrator)
        );
    }

    #[test]
    fn appointment_escalates_the_key_set() {
        let mut fx = disputed_fixture();
        let employer = fx.contract.keys.employer_key;
        let worker = fx.contract.keys.worker_key.unwrap();
        propose_middleman(&mut fx.contract, &employer, fx.middleman.pubkey, &fx.registry).unwrap();
        propose_middleman(&mut fx.contract, &worker, fx.middleman.pubkey, &fx.registry).unwrap();

        let paths_before = fx.contract.script_paths.clone();
        appoint_middleman(&mut fx.contract, &fx.middleman, T0 + 10, &fx.crypto).unwrap();
        assert_eq!(fx.contract.keys.middleman_key, Some(fx.middleman.pubkey));
        assert!(fx.contract.middleman_info.is_some());
        assert_ne!(fx.contract.script_paths, paths_before);
        fx.contract.validate().unwrap();
    }

    #[test]
    fn appointment_requires_agreement() {
        let mut fx = disputed_fixture();
        assert_eq!(
            appoint_middleman(&mut fx.contract, &fx.middleman, T0 + 10, &fx.crypto),
            Err(DisputeError::MiddlemanNotAgreed)
        );
    }

    #[test]
    fn evidence_intake_is_party_gated() {
        let mut fx = disputed_fixture();
        let worker = fx.contract.keys.worker_key.unwrap();
        let good = Evidence::new(
            vec!["ipfs://work".to_string()],
            vec![[5u8; 32]],
            worker,
            T0,
            EvidenceType::Initial,
        );
        submit_evidence(&mut fx.contract, good, T0 + 20).unwrap();
        assert_eq!(fx.contract.dispute.as_ref().unwrap().evidence.len(), 1);

        let stranger = Evidence::new(
            vec!["ipfs://noise".to_string()],
            vec![[5u8; 32]],
            key(77),
            T0,
            EvidenceType::Counter,
        );
        assert_eq!(
            submit_evidence(&mut fx.contract, stranger, T0 + 21),
            Err(DisputeError::NotAParty)
        );
    }

    fn agree_and_appoint(fx: &mut Fixture) {
        let employer = fx.contract.keys.employer_key;
        let worker = fx.contract.keys.worker_key.unwrap();
        propose_middleman(&mut fx.contract, &employer, fx.middleman.pubkey, &fx.registry).unwrap();
        propose_middleman(&mut fx.contract, &worker, fx.middleman.pubkey, &fx.registry).unwrap();
        appoint_middleman(&mut fx.contract, &fx.middleman, T0 + 10, &fx.crypto).unwrap();
    }

    #[test]
    fn employer_win_resolution() {
        let mut fx = disputed_fixture();
        agree_and_appoint(&mut fx);
        let decision = MiddlemanDecision {
            middleman: fx.middleman.pubkey,
            split: None,
            reasoning: "work not delivered".to_string(),
        };
        let params = resolve(
            &mut fx.contract,
            ResolutionPath::EmployerWin,
            Some(&decision),
            T0 + 30,
            H0 + 50,
        )
        .unwrap();
        assert_eq!(fx.contract.state, JobState::Resolved);
        assert_eq!(fx.contract.resolution_path, Some(ResolutionPath::EmployerWin));
        assert_eq!(params.middleman, Some((fx.middleman.pubkey, Satoshi::new(50_000))));
        assert_eq!(
            fx.contract.dispute.as_ref().unwrap().resolved_height,
            Some(H0 + 50)
        );
    }

    #[test]
    fn arbitrated_paths_need_the_agreed_middleman() {
        let mut fx = disputed_fixture();
        agree_and_appoint(&mut fx);
        let imposter = MiddlemanDecision {
            middleman: key(66),
            split: None,
            reasoning: "pay me instead".to_string(),
        };
        assert_eq!(
            resolve(
                &mut fx.contract,
                ResolutionPath::WorkerWin,
                Some(&imposter),
                T0 + 30,
                H0 + 50
            ),
            Err(DisputeError::NotAuthorized)
        );
        assert_eq!(
            resolve(&mut fx.contract, ResolutionPath::WorkerWin, None, T0 + 30, H0 + 50),
            Err(DisputeError::NotAuthorized)
        );
    }

    #[test]
    fn emergency_resolution_is_flagged() {
        let mut fx = disputed_fixture();
        agree_and_appoint(&mut fx);
        let decision = MiddlemanDecision {
            middleman: fx.middleman.pubkey,
            split: Some((Satoshi::new(40_000_000), Satoshi::new(59_000_000))),
            reasoning: "parties unreachable".to_string(),
        };
        resolve(
            &mut fx.contract,
            ResolutionPath::Emergency,
            Some(&decision),
            T0 + 30,
            H0 + 50,
        )
        .unwrap();
        assert!(fx.contract.dispute.as_ref().unwrap().flagged_for_review);
    }

    #[test]
    fn appeal_window_is_enforced() {
        let mut fx = disputed_fixture();
        agree_and_appoint(&mut fx);
        let employer = fx.contract.keys.employer_key;
        let worker = fx.contract.keys.worker_key.unwrap();
        let decision = MiddlemanDecision {
            middleman: fx.middleman.pubkey,
            split: None,
            reasoning: "employer evidence stronger".to_string(),
        };
        resolve(
            &mut fx.contract,
            ResolutionPath::EmployerWin,
            Some(&decision),
            T0 + 30,
            H0 + 50,
        )
        .unwrap();

        let window = fx.contract.dispute_config.challenge_period_blocks;
        assert_eq!(
            file_appeal(
                &mut fx.contract,
                worker,
                [6u8; 32],
                "new evidence".to_string(),
                H0 + 50 + window + 1
            ),
            Err(DisputeError::AppealExpired)
        );
        file_appeal(
            &mut fx.contract,
            worker,
            [6u8; 32],
            "new evidence".to_string(),
            H0 + 50 + window,
        )
        .unwrap();
        // One appeal per resolution
        assert_eq!(
            file_appeal(&mut fx.contract, employer, [6u8; 32], "me too".to_string(), H0 + 51),
            Err(DisputeError::AppealInvalid)
        );
    }
}
