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

//! Deterministic construction of the escrow locking scripts.
//!
//! The escrow passes through three shapes as parties join:
//!
//! 1. pre-assignment: `<employer> OP_CHECKSIG`
//! 2. post-assignment: `OP_2 <employer> <worker> OP_2 OP_CHECKMULTISIG`
//! 3. dispute escalated: `OP_2 <employer> <worker> <middleman> OP_3 OP_CHECKMULTISIG`
//!
//! All variants are committed on chain P2WSH-wrapped.

use bitcoin::{
    opcodes::all::{OP_CHECKMULTISIG, OP_CHECKSIG, OP_CSV, OP_DROP, OP_PUSHNUM_2, OP_PUSHNUM_3},
    script::Builder,
    ScriptBuf,
};
use mmp_common_types::types::PublicKey;
use serde::{Deserialize, Serialize};

use crate::contract::{error::ContractError, keys::KeyContext};

/// Blocks the worker must wait after completion before the timeout path unlocks (~24h).
const WORKER_TIMEOUT_CSV_BLOCKS: i64 = 144;

pub fn initial_escrow_script(employer: &PublicKey) -> ScriptBuf {
    Builder::new()
        .push_slice(employer.serialize())
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

pub fn two_party_escrow_script(employer: &PublicKey, worker: &PublicKey) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_PUSHNUM_2)
        .push_slice(employer.serialize())
        .push_slice(worker.serialize())
        .push_opcode(OP_PUSHNUM_2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

pub fn three_party_escrow_script(employer: &PublicKey, worker: &PublicKey, middleman: &PublicKey) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_PUSHNUM_2)
        .push_slice(employer.serialize())
        .push_slice(worker.serialize())
        .push_slice(middleman.serialize())
        .push_opcode(OP_PUSHNUM_3)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// Select the escrow variant by which parties are present.
pub fn job_escrow_script(
    employer: &PublicKey,
    worker: Option<&PublicKey>,
    middleman: Option<&PublicKey>,
) -> ScriptBuf {
    match (worker, middleman) {
        (None, _) => initial_escrow_script(employer),
        (Some(w), None) => two_party_escrow_script(employer, w),
        (Some(w), Some(m)) => three_party_escrow_script(employer, w, m),
    }
}

/// The on-chain commitment form for every escrow variant.
pub fn p2wsh_wrap(script: &ScriptBuf) -> ScriptBuf {
    script.to_p2wsh()
}

/// The four spending paths of an active escrow. Rebuilt atomically on key rotation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScriptPaths {
    pub employer_approval: ScriptBuf,
    pub worker_timeout: ScriptBuf,
    pub middleman_resolution: ScriptBuf,
    pub refund: ScriptBuf,
}

impl ScriptPaths {
    pub fn is_complete(&self) -> bool {
        !self.employer_approval.is_empty() &&
            !self.worker_timeout.is_empty() &&
            !self.middleman_resolution.is_empty() &&
            !self.refund.is_empty()
    }

    /// Build the full path set for the given key context. Requires an assigned worker. When no
    /// middleman has been appointed yet the resolution path is built over the employer key as a
    /// placeholder cosigner and rebuilt on escalation.
    pub fn build(keys: &KeyContext, timeout_blocks: u64) -> Result<Self, ContractError> {
        let worker = keys
            .worker_key
            .as_ref()
            .ok_or_else(|| ContractError::InvalidKeys("worker key required for script paths".to_string()))?;
        let middleman = keys.middleman_key.as_ref().unwrap_or(&keys.employer_key);
        Ok(Self {
            employer_approval: two_party_escrow_script(&keys.employer_key, worker),
            worker_timeout: Builder::new()
                .push_int(WORKER_TIMEOUT_CSV_BLOCKS)
                .push_opcode(OP_CSV)
                .push_opcode(OP_DROP)
                .push_slice(worker.serialize())
                .push_opcode(OP_CHECKSIG)
                .into_script(),
            middleman_resolution: three_party_escrow_script(&keys.employer_key, worker, middleman),
            refund: Builder::new()
                .push_int(timeout_blocks as i64)
                .push_opcode(OP_CSV)
                .push_opcode(OP_DROP)
                .push_slice(keys.employer_key.serialize())
                .push_opcode(OP_CHECKSIG)
                .into_script(),
        })
    }

    /// All-or-nothing rebuild after a key change: on any failure `self` is left untouched.
    pub fn update_with_new_keys(&mut self, keys: &KeyContext, timeout_blocks: u64) -> Result<(), ContractError> {
        let rebuilt = Self::build(keys, timeout_blocks).map_err(|_| ContractError::ScriptUpdateFailed)?;
        *self = rebuilt;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{crypto::Secp256k1Adapter, interfaces::CryptoAdapter};

    fn keys() -> (PublicKey, PublicKey, PublicKey) {
        let crypto = Secp256k1Adapter::new();
        let (_, a) = crypto.keypair_from_entropy(&[1u8; 32]).unwrap();
        let (_, b) = crypto.keypair_from_entropy(&[2u8; 32]).unwrap();
        let (_, c) = crypto.keypair_from_entropy(&[3u8; 32]).unwrap();
        (a, b, c)
    }

    #[test]
    fn initial_script_is_single_key() {
        let (employer, _, _) = keys();
        let script = initial_escrow_script(&employer);
        // 1-byte push marker + 33-byte key + OP_CHECKSIG
        assert_eq!(script.len(), 35);
        assert_eq!(script.as_bytes()[34], OP_CHECKSIG.to_u8());
    }

    #[test]
    fn variant_selection_follows_party_presence() {
        let (employer, worker, middleman) = keys();
        assert_eq!(
            job_escrow_script(&employer, None, None),
            initial_escrow_script(&employer)
        );
        assert_eq!(
            job_escrow_script(&employer, Some(&worker), None),
            two_party_escrow_script(&employer, &worker)
        );
        assert_eq!(
            job_escrow_script(&employer, Some(&worker), Some(&middleman)),
            three_party_escrow_script(&employer, &worker, &middleman)
        );
        // A middleman without a worker cannot occur; selection degrades to the initial form
        assert_eq!(
            job_escrow_script(&employer, None, Some(&middleman)),
            initial_escrow_script(&employer)
        );
    }

    #[test]
    fn multisig_scripts_end_with_checkmultisig() {
        let (employer, worker, middleman) = keys();
        let two = two_party_escrow_script(&employer, &worker);
        let three = three_party_escrow_script(&employer, &worker, &middleman);
        assert_eq!(*two.as_bytes().last().unwrap(), OP_CHECKMULTISIG.to_u8());
        assert_eq!(*three.as_bytes().last().unwrap(), OP_CHECKMULTISIG.to_u8());
        assert!(three.len() > two.len());
    }

    #[test]
    fn p2wsh_commitment_is_34_bytes() {
        let (employer, worker, _) = keys();
        let wrapped = p2wsh_wrap(&two_party_escrow_script(&employer, &worker));
        assert!(wrapped.is_p2wsh());
        assert_eq!(wrapped.len(), 34);
    }

    #[test]
    fn path_set_requires_worker() {
        let (employer, _, _) = keys();
        let ctx = crate::contract::keys::KeyContext::new(employer, 0);
        assert!(ScriptPaths::build(&ctx, 144).is_err());
    }

    #[test]
    fn paths_change_on_rotation() {
        let crypto = Secp256k1Adapter::new();
        let (employer, worker, _) = keys();
        let mut ctx = crate::contract::keys::KeyContext::new(employer, 0);
        ctx.set_worker(worker, &crypto).unwrap();
        let mut paths = ScriptPaths::build(&ctx, 144).unwrap();
        assert!(paths.is_complete());
        let before = paths.clone();
        ctx.rotate(
            &mmp_common_types::JobId::from_bytes([5u8; 32]),
            KEY_ROTATION_TEST_TIME,
            false,
            &crate::interfaces::OsEntropy,
            &crypto,
        )
        .unwrap();
        paths.update_with_new_keys(&ctx, 144).unwrap();
        assert_ne!(paths, before);
        assert!(paths.is_complete());
    }

    const KEY_ROTATION_TEST_TIME: i64 = 1_700_000_000;
}
