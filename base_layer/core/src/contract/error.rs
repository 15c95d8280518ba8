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

use mmp_common_types::{types::EpochSeconds, Satoshi};
use thiserror::Error;

use crate::contract::state::JobState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("Title must not be empty")]
    EmptyTitle,
    #[error("Title exceeds {0} bytes")]
    TitleTooLong(usize),
    #[error("Description must not be empty")]
    EmptyDescription,
    #[error("Description exceeds {0} bytes")]
    DescriptionTooLong(usize),
    #[error("Amount {0} is outside the permitted escrow range")]
    AmountOutOfRange(Satoshi),
    #[error("Timeout of {0} blocks is outside the permitted range")]
    TimeoutOutOfRange(u64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Operation `{operation}` is not permitted in state {state}")]
    InvalidState { operation: &'static str, state: JobState },
    #[error("No transition exists from {from} to {to}")]
    InvalidTransition { from: JobState, to: JobState },
    #[error("Contract is in terminal state {0}; no further transitions are possible")]
    TransitionLocked(JobState),
    #[error("Invalid or missing party key: {0}")]
    InvalidKeys(String),
    #[error("Script-path set is incomplete for the current state")]
    InvalidScript,
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(#[from] MetadataError),
    #[error("Funding outpoint is required but absent")]
    InvalidFunding,
    #[error("Key rotation is not due before {due_at}")]
    KeyRotationNotDue { due_at: EpochSeconds },
    #[error("Key generation failed")]
    KeyGenerationFailed,
    #[error("Aggregated key recomputation failed")]
    AggregationFailed,
    #[error("Script-path rebuild failed after key rotation")]
    ScriptUpdateFailed,
    #[error("Contract already holds the maximum number of applications")]
    ApplicationLimitReached,
    #[error("Worker has already applied to this job")]
    DuplicateApplication,
    #[error("No application from the given worker")]
    ApplicationNotFound,
    #[error("Proposal message exceeds {0} bytes")]
    ProposalTooLong(usize),
    #[error("A reason is required")]
    ReasonRequired,
    #[error("Reason exceeds {0} bytes")]
    ReasonTooLong(usize),
    #[error("Caller is not a party to this contract")]
    NotAParty,
}
