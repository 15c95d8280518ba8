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

//! Arbitrated dispute scenarios: middleman selection, evidence verification, resolution payouts,
//! slashing with appeals and fallback arbitrator rotation.

use std::sync::Arc;

use bitcoin::hashes::Hash;
use mmp_core::{
    consts::{COOLING_OFF_BLOCKS, DEFAULT_ROTATION_BLOCKS, HEARTBEAT_CRITICAL_SECS, MIN_CHALLENGE_PERIOD_BLOCKS},
    contract::state::{JobState, ResolutionPath},
    crypto::Secp256k1Adapter,
    dispute::{evidence, Evidence, EvidenceType, MiddlemanDecision},
    interfaces::{Clock, CryptoAdapter},
    middleman::{
        BondManager,
        FallbackRotation,
        HeartbeatStatus,
        Middleman,
        MiddlemanRegistry,
        SlashCondition,
    },
    test_helpers::{test_collaborators, FixedClock, InMemoryFetcher, StaticChainView},
    ContractStore,
};
use mmp_common_types::{JobId, Satoshi};

const T0: i64 = 1_700_000_000;
const H0: u64 = 800_000;

fn key(fill: u8) -> bitcoin::secp256k1::PublicKey {
    Secp256k1Adapter::new().keypair_from_entropy(&[fill; 32]).unwrap().1
}

struct Harness {
    store: ContractStore,
    clock: Arc<FixedClock>,
    chain: Arc<StaticChainView>,
    registry: MiddlemanRegistry,
}

fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let (collaborators, clock, chain) = test_collaborators(T0, H0);
    Harness {
        store: ContractStore::new(collaborators),
        clock,
        chain,
        registry: MiddlemanRegistry::new(),
    }
}

fn registered_middleman(harness: &Harness, fill: u8) -> Middleman {
    let mut middleman = Middleman::new(
        format!("arbiter-{fill}"),
        key(fill),
        Satoshi::new(500_000),
        Satoshi::new(20_000_000),
    );
    middleman.reputation_score = 90;
    middleman.is_dao_approved = true;
    harness.registry.register(middleman.clone()).unwrap();
    middleman
}

/// Drive a contract through assignment and completion, returning its id.
fn completed_job(harness: &Harness) -> JobId {
    let contract = harness
        .store
        .new_contract(
            key(1),
            "Design".to_string(),
            "Landing page design".to_string(),
            Satoshi::new(100_000_000),
            1_440,
            H0,
            T0,
        )
        .unwrap();
    let job_id = contract.job_id;
    harness.store.store_contract(contract).unwrap();
    harness.store.post_job(&job_id, bitcoin::Txid::from_byte_array([0xF1u8; 32]), 1).unwrap();
    harness
        .store
        .apply_to_job(&job_id, key(2), "bid".to_string(), T0 + 10)
        .unwrap();
    harness.store.assign_worker(&job_id, key(2)).unwrap();
    harness.store.start_work(&job_id).unwrap();
    harness.clock.advance(3_600);
    harness.store.complete_work(&job_id, None).unwrap();
    job_id
}

#[test]
fn arbitrated_employer_win() {
    let harness = harness();
    let middleman = registered_middleman(&harness, 3);
    let job_id = completed_job(&harness);

    // The employer contests the work inside the 24h window
    let employer = harness.store.get_contract(&job_id).unwrap().keys.employer_key;
    harness.clock.advance(3_600);
    harness
        .store
        .raise_dispute(&job_id, employer, "Deliverable does not match the brief".to_string())
        .unwrap();

    let disputed = harness.store.get_contract(&job_id).unwrap();
    assert_eq!(disputed.state, JobState::Disputed);
    assert_eq!(disputed.keys.rotation_count, 1);
    assert!(disputed.keys.rotation_history[0].is_emergency);

    // Both parties propose the same candidate: mutual agreement
    let employer = disputed.keys.employer_key;
    let worker = disputed.keys.worker_key.unwrap();
    assert_eq!(
        harness
            .store
            .propose_middleman(&job_id, employer, middleman.pubkey, &harness.registry)
            .unwrap(),
        None
    );
    assert_eq!(
        harness
            .store
            .propose_middleman(&job_id, worker, middleman.pubkey, &harness.registry)
            .unwrap(),
        Some(middleman.pubkey)
    );

    // Escalate the escrow to two-of-three
    let escalation = harness.store.appoint_middleman(&job_id, &harness.registry).unwrap();
    assert!(escalation.output[0].script_pubkey.is_p2wsh());
    assert_eq!(escalation.output[0].value.to_sat(), 100_000_000);

    // Evidence from both parties, content verified through the injected fetcher first
    let crypto = Secp256k1Adapter::new();
    let fetcher = InMemoryFetcher::default();
    fetcher.insert("ipfs://brief", b"the brief".to_vec());
    fetcher.insert("ipfs://delivery", b"the delivery".to_vec());

    let mut employer_evidence = Evidence::new(
        vec!["ipfs://brief".to_string()],
        vec![crypto.sha256(b"the brief")],
        employer,
        harness.clock.now(),
        EvidenceType::Initial,
    );
    evidence::verify_content(&employer_evidence, &fetcher, &crypto).unwrap();
    employer_evidence.content_verified = true;
    harness.store.submit_evidence(&job_id, employer_evidence).unwrap();

    let mut worker_evidence = Evidence::new(
        vec!["ipfs://delivery".to_string()],
        vec![crypto.sha256(b"the delivery")],
        worker,
        harness.clock.now(),
        EvidenceType::Rebuttal,
    );
    evidence::verify_content(&worker_evidence, &fetcher, &crypto).unwrap();
    worker_evidence.content_verified = true;
    harness.store.submit_evidence(&job_id, worker_evidence).unwrap();

    // The middleman rules for the employer
    let decision = MiddlemanDecision {
        middleman: middleman.pubkey,
        split: None,
        reasoning: "brief clearly unmet".to_string(),
    };
    let resolution = harness
        .store
        .resolve(&job_id, ResolutionPath::EmployerWin, Some(decision), &harness.registry)
        .unwrap();

    // Refund to the employer minus the middleman fee
    assert_eq!(resolution.output.len(), 2);
    assert_eq!(resolution.output[0].value.to_sat(), 99_500_000);
    assert_eq!(resolution.output[1].value.to_sat(), 500_000);

    let resolved = harness.store.get_contract(&job_id).unwrap();
    assert_eq!(resolved.state, JobState::Resolved);
    assert_eq!(resolved.resolution_path, Some(ResolutionPath::EmployerWin));
    assert_eq!(resolved.dispute.as_ref().unwrap().evidence.len(), 2);
    resolved.validate().unwrap();

    // The middleman's track record reflects the completed arbitration
    let record = harness.registry.get(&middleman.pubkey).unwrap();
    assert_eq!(record.total_disputes, 1);
    assert_eq!(record.successful_resolutions, 1);
}

#[test]
fn slash_with_timely_appeal_leaves_bond_intact() {
    let harness = harness();
    let mut middleman = Middleman::new("slashable", key(7), Satoshi::new(10_000), Satoshi::new(1_000_000));
    middleman.reputation_score = 70;
    harness.registry.register(middleman.clone()).unwrap();

    let bonds = BondManager::new();
    // 30% of the bond: cooling-off applies before finalization
    let proposal = bonds
        .propose_slash(
            &harness.registry,
            &middleman.pubkey,
            Satoshi::new(300_000),
            SlashCondition::GROSS_NEGLIGENCE,
            [7u8; 32],
            "ruled without reviewing evidence".to_string(),
            H0,
            MIN_CHALLENGE_PERIOD_BLOCKS,
        )
        .unwrap();

    for approver in 1..=3u8 {
        bonds.approve_slash(&proposal, key(approver)).unwrap();
    }

    // The middleman appeals before the cooling-off elapses
    bonds
        .appeal_slash(&proposal, middleman.pubkey, [8u8; 32], H0 + 100)
        .unwrap();

    // Finalization is now impossible and the bond is unchanged
    assert!(bonds.finalize_slash(&harness.registry, &proposal, H0 + COOLING_OFF_BLOCKS).is_err());
    assert_eq!(harness.registry.get(&middleman.pubkey).unwrap().bond, Satoshi::new(1_000_000));
    assert_eq!(harness.registry.get(&middleman.pubkey).unwrap().bond_slashes, 0);
}

#[test]
fn unresponsive_arbitrator_is_rotated_out() {
    let mut rotation = FallbackRotation::new(vec![key(11), key(12), key(13)], DEFAULT_ROTATION_BLOCKS, H0);
    for arb in [key(11), key(12), key(13)] {
        rotation.record_heartbeat(&arb, T0, [1u8; 32]).unwrap();
    }
    rotation.add_emergency_standby(key(14), true).unwrap();

    // Arbitrator 11 goes silent for 36 hours while the others keep reporting
    let silent_for = T0 + HEARTBEAT_CRITICAL_SECS;
    rotation.record_heartbeat(&key(12), silent_for - 60, [1u8; 32]).unwrap();
    rotation.record_heartbeat(&key(13), silent_for - 60, [1u8; 32]).unwrap();
    assert_eq!(rotation.heartbeat_status(&key(11), silent_for), HeartbeatStatus::Critical);

    // Three consecutive critical sweeps demand an emergency rotation
    let mut due = Vec::new();
    for _ in 0..3 {
        due = rotation.check_heartbeats(silent_for).1;
    }
    assert_eq!(due, vec![key(11)]);

    rotation
        .perform_emergency_rotation(&key(11), H0 + 500, silent_for, "missed heartbeats")
        .unwrap();
    assert!(!rotation.active_pool().contains(&key(11)));
    assert!(rotation.active_pool().contains(&key(14)));
    // The next scheduled rotation is brought forward to a quarter of the period
    assert_eq!(rotation.next_rotation_height(), H0 + 500 + DEFAULT_ROTATION_BLOCKS / 4);
    assert!(rotation.emergency_rotation_active());
}

#[test]
fn fallback_arbitrator_resolves_stalled_selection() {
    let harness = harness();
    registered_middleman(&harness, 3);
    let job_id = completed_job(&harness);
    let employer = harness.store.get_contract(&job_id).unwrap().keys.employer_key;
    harness
        .store
        .raise_dispute(&job_id, employer, "no agreement in sight".to_string())
        .unwrap();

    let mut rotation = FallbackRotation::new(vec![key(21), key(22), key(23)], DEFAULT_ROTATION_BLOCKS, H0);
    for arb in [key(21), key(22), key(23)] {
        rotation.record_heartbeat(&arb, harness.clock.now(), [1u8; 32]).unwrap();
    }

    // With auto-selection disabled by an empty approved pool, selection falls back after the
    // resolution timeout
    let empty_registry = MiddlemanRegistry::new();
    let criteria = mmp_core::middleman::SelectionCriteria::default();
    let timeout = harness.store.get_contract(&job_id).unwrap().dispute_config.resolution_timeout_blocks;

    harness.chain.set_height(H0 + timeout - 1);
    assert!(harness
        .store
        .select_middleman(&job_id, &empty_registry, &criteria, &[], &rotation)
        .is_err());

    harness.chain.set_height(H0 + 10 + timeout);
    let appointed = harness
        .store
        .select_middleman(&job_id, &empty_registry, &criteria, &[], &rotation)
        .unwrap();
    assert_eq!(appointed, key(21));
}
