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

//! Unsigned transaction templates for escrow upgrades and resolutions.
//!
//! Every template spends exactly one escrow outpoint. Fee estimation and signing are the host's
//! responsibility; amounts here are gross of mining fees except where a resolution split leaves
//! an explicit remainder.

use bitcoin::{
    absolute::LockTime,
    transaction::Version,
    OutPoint,
    ScriptBuf,
    Sequence,
    Transaction,
    TxIn,
    TxOut,
    Witness,
};
use mmp_common_types::{types::PublicKey, Satoshi};

use crate::{
    contract::state::ResolutionPath,
    dispute::error::DisputeError,
    escrow::script::{p2wsh_wrap, three_party_escrow_script, two_party_escrow_script},
};

/// Everything needed to lay out a resolution transaction's outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionParams {
    pub path: ResolutionPath,
    pub escrow_outpoint: OutPoint,
    pub escrow_amount: Satoshi,
    pub employer: PublicKey,
    pub worker: PublicKey,
    /// The appointed middleman and its fee; required for arbitrated paths.
    pub middleman: Option<(PublicKey, Satoshi)>,
    /// Employer/worker portions for `MiddlemanSplit` and `Emergency`.
    pub split: Option<(Satoshi, Satoshi)>,
}

pub struct TxTemplateFactory {
    secp: bitcoin::secp256k1::Secp256k1<bitcoin::secp256k1::All>,
}

impl TxTemplateFactory {
    pub fn new() -> Self {
        Self {
            secp: bitcoin::secp256k1::Secp256k1::new(),
        }
    }

    fn spend_input(outpoint: OutPoint) -> TxIn {
        TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::default(),
        }
    }

    fn payout_script(&self, key: &PublicKey) -> ScriptBuf {
        ScriptBuf::new_p2tr(&self.secp, key.x_only_public_key().0, None)
    }

    fn template(input: TxIn, output: Vec<TxOut>) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![input],
            output,
        }
    }

    /// Spend the single-key escrow into a two-of-two lock carrying the same value.
    pub fn worker_selection_upgrade(
        &self,
        employer: &PublicKey,
        worker: &PublicKey,
        escrow_outpoint: OutPoint,
        escrow_amount: Satoshi,
    ) -> Transaction {
        let lock = p2wsh_wrap(&two_party_escrow_script(employer, worker));
        Self::template(Self::spend_input(escrow_outpoint), vec![TxOut {
            value: escrow_amount.to_amount(),
            script_pubkey: lock,
        }])
    }

    /// Spend the two-of-two escrow into the arbitrated two-of-three lock.
    pub fn dispute_escalation_upgrade(
        &self,
        employer: &PublicKey,
        worker: &PublicKey,
        middleman: &PublicKey,
        escrow_outpoint: OutPoint,
        escrow_amount: Satoshi,
    ) -> Transaction {
        let lock = p2wsh_wrap(&three_party_escrow_script(employer, worker, middleman));
        Self::template(Self::spend_input(escrow_outpoint), vec![TxOut {
            value: escrow_amount.to_amount(),
            script_pubkey: lock,
        }])
    }

    /// Lay out the final payout per the chosen resolution path.
    pub fn resolution(&self, params: &ResolutionParams) -> Result<Transaction, DisputeError> {
        let escrow = params.escrow_amount;
        let mut outputs: Vec<TxOut> = Vec::new();
        let mut push = |amount: Satoshi, key: &PublicKey| {
            if !amount.is_zero() {
                outputs.push(TxOut {
                    value: amount.to_amount(),
                    script_pubkey: self.payout_script(key),
                });
            }
        };

        match params.path {
            ResolutionPath::Cooperative | ResolutionPath::WorkerTimeout => {
                push(escrow, &params.worker);
            },
            ResolutionPath::EmployerWin | ResolutionPath::WorkerWin => {
                let (mm_key, fee) = params.middleman.ok_or(DisputeError::MiddlemanNotAgreed)?;
                let remainder = escrow.checked_sub(fee).ok_or(DisputeError::InvalidSplit {
                    escrow,
                    allocated: fee,
                })?;
                if params.path == ResolutionPath::EmployerWin {
                    push(remainder, &params.employer);
                } else {
                    push(remainder, &params.worker);
                }
                push(fee, &mm_key);
            },
            ResolutionPath::MiddlemanSplit | ResolutionPath::Emergency => {
                let (mm_key, fee) = params.middleman.ok_or(DisputeError::MiddlemanNotAgreed)?;
                let (to_employer, to_worker) = params.split.ok_or(DisputeError::SplitRequired)?;
                let allocated = to_employer
                    .checked_add(to_worker)
                    .and_then(|s| s.checked_add(fee))
                    .ok_or(DisputeError::InvalidSplit { escrow, allocated: escrow })?;
                if allocated > escrow {
                    return Err(DisputeError::InvalidSplit { escrow, allocated });
                }
                push(to_employer, &params.employer);
                push(to_worker, &params.worker);
                push(fee, &mm_key);
            },
        }

        if outputs.is_empty() {
            return Err(DisputeError::SplitRequired);
        }
        Ok(Self::template(Self::spend_input(params.escrow_outpoint), outputs))
    }
}

impl Default for TxTemplateFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use bitcoin::{hashes::Hash, OutPoint, Txid};
    use mmp_common_types::Satoshi;

    use super::{ResolutionParams, TxTemplateFactory};
    use crate::{
        contract::state::ResolutionPath,
        crypto::Secp256k1Adapter,
        dispute::error::DisputeError,
        interfaces::CryptoAdapter,
    };

    fn parties() -> (bitcoin::secp256k1::PublicKey, bitcoin::secp256k1::PublicKey, bitcoin::secp256k1::PublicKey) {
        let crypto = Secp256k1Adapter::new();
        let (_, e) = crypto.keypair_from_entropy(&[1u8; 32]).unwrap();
        let (_, w) = crypto.keypair_from_entropy(&[2u8; 32]).unwrap();
        let (_, m) = crypto.keypair_from_entropy(&[3u8; 32]).unwrap();
        (e, w, m)
    }

    fn outpoint() -> OutPoint {
        OutPoint::new(Txid::all_zeros(), 1)
    }

    #[test]
    fn upgrade_preserves_value_and_relocks() {
        let (e, w, _) = parties();
        let factory = TxTemplateFactory::new();
        let tx = factory.worker_selection_upgrade(&e, &w, outpoint(), Satoshi::new(100_000_000));
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value.to_sat(), 100_000_000);
        assert!(tx.output[0].script_pubkey.is_p2wsh());
        assert!(tx.input[0].witness.is_empty());
    }

    #[test]
    fn escalation_locks_to_three_party_script() {
        let (e, w, m) = parties();
        let factory = TxTemplateFactory::new();
        let two = factory.worker_selection_upgrade(&e, &w, outpoint(), Satoshi::new(5_000_000));
        let three = factory.dispute_escalation_upgrade(&e, &w, &m, outpoint(), Satoshi::new(5_000_000));
        assert_ne!(two.output[0].script_pubkey, three.output[0].script_pubkey);
    }

    #[test]
    fn employer_win_deducts_middleman_fee() {
        let (e, w, m) = parties();
        let factory = TxTemplateFactory::new();
        let tx = factory
            .resolution(&ResolutionParams {
                path: ResolutionPath::EmployerWin,
                escrow_outpoint: outpoint(),
                escrow_amount: Satoshi::new(1_000_000),
                employer: e,
                worker: w,
                middleman: Some((m, Satoshi::new(50_000))),
                split: None,
            })
            .unwrap();
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value.to_sat(), 950_000);
        assert_eq!(tx.output[1].value.to_sat(), 50_000);
    }

    #[test]
    fn split_must_fit_escrow() {
        let (e, w, m) = parties();
        let factory = TxTemplateFactory::new();
        let result = factory.resolution(&ResolutionParams {
            path: ResolutionPath::MiddlemanSplit,
            escrow_outpoint: outpoint(),
            escrow_amount: Satoshi::new(1_000_000),
            employer: e,
            worker: w,
            middleman: Some((m, Satoshi::new(100_000))),
            split: Some((Satoshi::new(600_000), Satoshi::new(400_000))),
        });
        assert!(matches!(result, Err(DisputeError::InvalidSplit { .. })));
    }

    #[test]
    fn worker_timeout_pays_full_escrow_to_worker() {
        let (e, w, _) = parties();
        let factory = TxTemplateFactory::new();
        let tx = factory
            .resolution(&ResolutionParams {
                path: ResolutionPath::WorkerTimeout,
                escrow_outpoint: outpoint(),
                escrow_amount: Satoshi::new(750_000),
                employer: e,
                worker: w,
                middleman: None,
                split: None,
            })
            .unwrap();
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value.to_sat(), 750_000);
        assert!(tx.output[0].script_pubkey.is_p2tr());
    }
}
