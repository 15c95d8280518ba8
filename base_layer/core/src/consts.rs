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

//! Protocol constants. Values are consensus-relevant for participating hosts: changing any of
//! them forks the escrow protocol.

use mmp_common_types::Satoshi;

// Job contracts
pub const MIN_JOB_AMOUNT: Satoshi = Satoshi::new(1_000);
pub const MAX_JOB_AMOUNT: Satoshi = Satoshi::new(2_100_000_000_000_000);
pub const MIN_TIMEOUT_BLOCKS: u64 = 6;
pub const MAX_TIMEOUT_BLOCKS: u64 = 52_560;
pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 1_000;
pub const MAX_APPLICATIONS_PER_JOB: usize = 100;
pub const MAX_APPLICATION_MESSAGE_LENGTH: usize = 1_024;
pub const MAX_CANCEL_REASON_LENGTH: usize = 512;
/// Blocks remaining below which a contract reports itself as nearing expiration.
pub const EXPIRATION_WARNING_BLOCKS: u64 = 24;

// Key rotation
pub const KEY_ROTATION_INTERVAL_SECS: i64 = 30 * 24 * 3_600;
pub const MAX_KEY_AGE_SECS: i64 = 90 * 24 * 3_600;

// Dispute handling. Wall-clock windows are seconds; chain-anchored windows are blocks.
pub const COMPLETION_TIMEOUT_SECS: i64 = 86_400;
pub const DEFAULT_DISPUTE_WINDOW_SECS: i64 = 86_400;
pub const DEFAULT_RESOLUTION_TIMEOUT_BLOCKS: u64 = 1_008;
pub const MIN_CHALLENGE_PERIOD_BLOCKS: u64 = 144;
pub const MAX_CHALLENGE_PERIOD_BLOCKS: u64 = 4_032;
pub const MAX_DISPUTE_REASON_LENGTH: usize = 1_024;
pub const MAX_PROPOSED_MIDDLEMEN_PER_PARTY: usize = 10;

// Evidence
pub const MAX_EVIDENCE_URL_LENGTH: usize = 2_048;
pub const MAX_EVIDENCE_CONTENT_BYTES: usize = 1_024 * 1_024;
/// Claimed evidence timestamps older than this fail the reasonability tier.
pub const MAX_EVIDENCE_AGE_SECS: i64 = 365 * 24 * 3_600;

// Middleman economics
pub const MIN_MIDDLEMAN_BOND: Satoshi = Satoshi::new(50_000);
pub const MAX_MIDDLEMAN_BOND: Satoshi = Satoshi::new(100_000_000);
pub const MAX_FEE_TO_BOND_RATIO: f64 = 0.5;
pub const MIN_BOND_TO_JOB_RATIO: f64 = 0.05;
pub const MAX_REPUTATION_SCORE: u32 = 100;
pub const MIN_REPUTATION_FOR_AUTO: u32 = 50;
pub const MAX_MIDDLEMAN_NAME_LENGTH: usize = 128;
pub const MAX_MIDDLEMAN_DESCRIPTION_LENGTH: usize = 512;
pub const MAX_SPECIALTY_LENGTH: usize = 64;
pub const MAX_SPECIALTIES_PER_MIDDLEMAN: usize = 10;
pub const DEFAULT_RESPONSE_TIME_BLOCKS: u64 = 144;

// Reputation decay
pub const REPUTATION_DECAY_RATE_PER_DAY: f64 = 0.0038;
pub const MIN_REPUTATION_RETENTION: f64 = 0.5;

// Candidate scoring
pub const MIN_WEIGHT_SUM: f64 = 0.99;
pub const MAX_WEIGHT_SUM: f64 = 1.01;
pub const SPECIALTY_CACHE_SIZE: usize = 1_000;

// Bond slashing and insurance
pub const MIN_DAO_APPROVERS: usize = 3;
pub const MAX_DAO_APPROVERS: usize = 15;
pub const COOLING_OFF_BLOCKS: u64 = 144;
/// Slashes at or above this fraction of the bond enter the cooling-off period.
pub const COOLING_OFF_SLASH_RATIO: f64 = 0.25;
pub const MIN_INSURANCE_APPROVERS: usize = 2;
pub const MAX_INSURANCE_APPROVERS: usize = 5;
pub const INSURANCE_APPROVAL_RATIO: f64 = 0.60;
pub const MAX_INSURANCE_PAYOUT_RATIO: f64 = 0.9;
pub const MAX_INSURANCE_PREMIUM_RATE: f64 = 0.1;
pub const INSURANCE_CLAIM_EXPIRY_SECS: i64 = 90 * 24 * 3_600;

// Fallback arbitrator rotation
pub const HEARTBEAT_INTERVAL_SECS: i64 = 43_200;
pub const HEARTBEAT_WARNING_SECS: i64 = 64_800;
pub const HEARTBEAT_CRITICAL_SECS: i64 = 129_600;
pub const CONSECUTIVE_CRITICAL_FOR_ROTATION: u32 = 3;
pub const DEFAULT_ROTATION_BLOCKS: u64 = 4_032;
pub const MIN_ARBITRATORS: usize = 3;
pub const MAX_ARBITRATORS: usize = 10;

// Wire markers
pub const WIRE_MARKER: [u8; 4] = *b"MMPJ";
pub const WIRE_VERSION: u8 = 0x01;
pub const WIRE_TYPE_POSTING: u8 = 0x01;
pub const WIRE_TYPE_APPLICATION: u8 = 0x02;
/// Bitcoin relay policy cap for a standard OP_RETURN payload.
pub const OP_RETURN_PAYLOAD_LIMIT: usize = 80;
