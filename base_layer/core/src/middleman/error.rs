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

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Middleman is already registered")]
    AlreadyRegistered,
    #[error("Middleman is not registered")]
    MiddlemanNotFound,
    #[error("Middleman is inactive")]
    Inactive,
    #[error("Bond of {bond} is outside the permitted range")]
    InsufficientBond { bond: Satoshi },
    #[error("Fee exceeds half of the posted bond")]
    FeeExceedsBond,
    #[error("Economic ratio violated: {0}")]
    EconomicRatiosInvalid(String),
    #[error("Name must be 1..={0} bytes")]
    InvalidName(usize),
    #[error("Description exceeds {0} bytes")]
    DescriptionTooLong(usize),
    #[error("At most {0} specialties are allowed")]
    TooManySpecialties(usize),
    #[error("Reputation score {0} exceeds the maximum")]
    InvalidReputation(u32),
    #[error("Selection weights sum to {0}, outside the accepted band")]
    InvalidWeights(f64),
    #[error("Operation requires DAO approval")]
    NotDaoApproved,
    #[error("Middleman record is locked by another operation")]
    RecordBusy,
    #[error("Invalid insurance terms: {0}")]
    InvalidInsurance(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BondError {
    #[error("Slash proposal not found")]
    ProposalNotFound,
    #[error("Insurance claim not found")]
    ClaimNotFound,
    #[error("Slash proposal rejected: {0}")]
    SlashInvalid(String),
    #[error("{have} approvers present, {need} required")]
    InsufficientApprovers { have: usize, need: usize },
    #[error("Cooling-off until height {until_height}")]
    CoolingOff { until_height: BlockHeight },
    #[error("Appeal is malformed or duplicates an existing appeal")]
    AppealInvalid,
    #[error("The appeal window has closed")]
    AppealExpired,
    #[error("Proposal has already been finalized or cancelled")]
    AlreadyFinalized,
    #[error("Approver has already signed this proposal")]
    DoubleApproval,
    #[error("Economic ratio violated: {0}")]
    EconomicRatiosInvalid(String),
    #[error("Insurance claim rejected: {0}")]
    ClaimInvalid(String),
    #[error("Middleman carries no active insurance")]
    NotInsured,
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
