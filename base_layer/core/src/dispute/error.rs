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

use mmp_common_types::{types::BlockHeight, Satoshi};
use thiserror::Error;

use crate::{contract::error::ContractError, interfaces::FetchError, middleman::error::RegistryError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DisputeError {
    #[error("No dispute has been raised on this contract")]
    NoActiveDispute,
    #[error("Evidence rejected: {0}")]
    EvidenceInvalid(String),
    #[error("Content hash mismatch for evidence item {index}")]
    HashMismatch { index: usize },
    #[error("Evidence content exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("Evidence timestamp is too old to be admissible")]
    EvidenceExpired,
    #[error("Evidence timestamp could not be verified at any tier")]
    TimestampUnverified,
    #[error("At least one notary signature is required for this dispute")]
    NotaryRequired,
    #[error("Caller is not a party to this dispute")]
    NotAParty,
    #[error("Middleman is not registered")]
    MiddlemanNotFound,
    #[error("Middleman is not accepting work or has been deactivated")]
    MiddlemanInactive,
    #[error("The parties have not agreed on a middleman")]
    MiddlemanNotAgreed,
    #[error("Caller is not authorised to select this resolution path")]
    NotAuthorized,
    #[error("Each party may propose at most {0} middleman candidates")]
    ProposalLimitReached(usize),
    #[error("No eligible middleman candidates for this job")]
    NoEligibleCandidates,
    #[error("Fallback appointment is not available before height {due_height}")]
    SelectionTimeoutNotReached { due_height: BlockHeight },
    #[error("Split allocates {allocated} against an escrow of {escrow}")]
    InvalidSplit { escrow: Satoshi, allocated: Satoshi },
    #[error("This resolution path requires an explicit split")]
    SplitRequired,
    #[error("Appeal is malformed or duplicates an existing appeal")]
    AppealInvalid,
    #[error("The appeal window has closed")]
    AppealExpired,
    #[error("Evidence retrieval failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
}
