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

use std::fmt::{Display, Error, Formatter};

use bitcoin::Txid;
use mmp_common_types::types::EpochSeconds;
use serde::{Deserialize, Serialize};

/// Lifecycle states of a job contract. Terminal states admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Contract built, nothing on chain yet
    Created,
    /// Funds locked, open for worker applications
    Open,
    /// Employer selected a worker, escrow upgrading to two-of-two
    Assigned,
    /// Worker accepted and work is underway
    InProgress,
    /// Work submitted, the dispute window is running
    Completed,
    /// Dispute raised, middleman intervention in progress
    Disputed,
    Resolved,
    Cancelled,
    Expired,
}

impl JobState {
    pub fn as_u8(self) -> u8 {
        match self {
            JobState::Created => 0,
            JobState::Open => 1,
            JobState::Assigned => 2,
            JobState::InProgress => 3,
            JobState::Completed => 4,
            JobState::Disputed => 5,
            JobState::Resolved => 6,
            JobState::Cancelled => 7,
            JobState::Expired => 8,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(JobState::Created),
            1 => Some(JobState::Open),
            2 => Some(JobState::Assigned),
            3 => Some(JobState::InProgress),
            4 => Some(JobState::Completed),
            5 => Some(JobState::Disputed),
            6 => Some(JobState::Resolved),
            7 => Some(JobState::Cancelled),
            8 => Some(JobState::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Resolved | JobState::Cancelled | JobState::Expired)
    }

    /// States in which a worker must be assigned for the contract to be well formed.
    pub fn requires_worker(self) -> bool {
        matches!(
            self,
            JobState::Assigned | JobState::InProgress | JobState::Completed | JobState::Disputed | JobState::Resolved
        )
    }

    /// The legal transition relation. `Expired` is additionally reachable from any non-terminal
    /// state through the height-checked expiry operation on the contract itself.
    pub fn can_transition_to(self, target: JobState) -> bool {
        use JobState::*;
        match self {
            Created => matches!(target, Open | Cancelled),
            Open => matches!(target, Assigned | Cancelled | Expired),
            Assigned => matches!(target, InProgress | Cancelled | Expired),
            InProgress => matches!(target, Completed | Disputed | Cancelled | Expired),
            Completed => matches!(target, Resolved | Disputed | Expired),
            Disputed => matches!(target, Resolved | Expired),
            Resolved | Cancelled | Expired => false,
        }
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let s = match self {
            JobState::Created => "Created",
            JobState::Open => "Open",
            JobState::Assigned => "Assigned",
            JobState::InProgress => "InProgress",
            JobState::Completed => "Completed",
            JobState::Disputed => "Disputed",
            JobState::Resolved => "Resolved",
            JobState::Cancelled => "Cancelled",
            JobState::Expired => "Expired",
        };
        f.write_str(s)
    }
}

/// How a contract's escrow was (or will be) released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionPath {
    /// Employer and worker cosign; no middleman involvement
    Cooperative,
    /// Worker claims alone after the post-completion timeout
    WorkerTimeout,
    /// Refund to the employer, minus the middleman fee
    EmployerWin,
    /// Payout to the worker, minus the middleman fee
    WorkerWin,
    /// Middleman-declared split between the parties
    MiddlemanSplit,
    /// Unilateral middleman resolution; flagged for review
    Emergency,
}

impl ResolutionPath {
    pub fn as_u8(self) -> u8 {
        match self {
            ResolutionPath::Cooperative => 0,
            ResolutionPath::WorkerTimeout => 1,
            ResolutionPath::EmployerWin => 2,
            ResolutionPath::WorkerWin => 3,
            ResolutionPath::MiddlemanSplit => 4,
            ResolutionPath::Emergency => 5,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResolutionPath::Cooperative),
            1 => Some(ResolutionPath::WorkerTimeout),
            2 => Some(ResolutionPath::EmployerWin),
            3 => Some(ResolutionPath::WorkerWin),
            4 => Some(ResolutionPath::MiddlemanSplit),
            5 => Some(ResolutionPath::Emergency),
            _ => None,
        }
    }

    /// Paths that may only be selected by the appointed middleman.
    pub fn requires_middleman(self) -> bool {
        matches!(
            self,
            ResolutionPath::EmployerWin |
                ResolutionPath::WorkerWin |
                ResolutionPath::MiddlemanSplit |
                ResolutionPath::Emergency
        )
    }
}

impl Display for ResolutionPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let s = match self {
            ResolutionPath::Cooperative => "Cooperative",
            ResolutionPath::WorkerTimeout => "WorkerTimeout",
            ResolutionPath::EmployerWin => "EmployerWin",
            ResolutionPath::WorkerWin => "WorkerWin",
            ResolutionPath::MiddlemanSplit => "MiddlemanSplit",
            ResolutionPath::Emergency => "Emergency",
        };
        f.write_str(s)
    }
}

/// One entry of a contract's append-only audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub timestamp: EpochSeconds,
    pub prev_state: JobState,
    pub new_state: JobState,
    pub txid: Option<Txid>,
    pub memo: String,
}

impl Display for ContractEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.timestamp, self.prev_state, self.new_state, self.memo
        )
    }
}

#[cfg(test)]
mod test {
    use super::JobState::{self, *};

    const ALL: [JobState; 9] = [
        Created, Open, Assigned, InProgress, Completed, Disputed, Resolved, Cancelled, Expired,
    ];

    #[test]
    fn terminal_states_are_sinks() {
        for terminal in [Resolved, Cancelled, Expired] {
            for target in ALL {
                assert!(!terminal.can_transition_to(target), "{terminal} -> {target} must not exist");
            }
        }
    }

    #[test]
    fn transition_relation_matches_protocol() {
        assert!(Created.can_transition_to(Open));
        assert!(Created.can_transition_to(Cancelled));
        assert!(!Created.can_transition_to(Assigned));

        assert!(Open.can_transition_to(Assigned));
        assert!(!Open.can_transition_to(InProgress));

        assert!(Assigned.can_transition_to(InProgress));
        assert!(!Assigned.can_transition_to(Completed));

        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Disputed));

        assert!(Completed.can_transition_to(Resolved));
        assert!(Completed.can_transition_to(Disputed));
        assert!(!Completed.can_transition_to(Cancelled));

        assert!(Disputed.can_transition_to(Resolved));
        assert!(!Disputed.can_transition_to(Cancelled));
    }

    #[test]
    fn byte_round_trip() {
        for state in ALL {
            assert_eq!(JobState::from_u8(state.as_u8()), Some(state));
        }
        assert_eq!(JobState::from_u8(9), None);
    }
}
