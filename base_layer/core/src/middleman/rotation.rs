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

//! Heartbeat-driven rotation of the fallback arbitrator pool.
//!
//! Fallback arbitrators take over middleman selection when the parties cannot agree and
//! automatic selection is disabled or exhausted. Liveness is proven by signed heartbeats; an
//! arbitrator that stays critical for three consecutive checks is rotated out and replaced from
//! the emergency pool.

use std::{
    collections::HashMap,
    fmt::{Display, Error, Formatter},
};

use log::{error, info, warn};
use mmp_common_types::types::{BlockHeight, EpochSeconds, FixedHash, PublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::consts::{
    CONSECUTIVE_CRITICAL_FOR_ROTATION,
    DEFAULT_ROTATION_BLOCKS,
    HEARTBEAT_CRITICAL_SECS,
    HEARTBEAT_INTERVAL_SECS,
    HEARTBEAT_WARNING_SECS,
    MAX_ARBITRATORS,
    MIN_ARBITRATORS,
};

const LOG_TARGET: &str = "mmp::middleman::rotation";

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum RotationError {
    #[error("Arbitrator is not in the active pool")]
    UnknownArbitrator,
    #[error("Arbitrator is already pooled")]
    AlreadyPooled,
    #[error("Pool mutations require DAO approval")]
    NotDaoApproved,
    #[error("Scheduled rotation is not due before height {next_height}")]
    RotationNotDue { next_height: BlockHeight },
    #[error("Active pool fell below the minimum of {minimum} arbitrators")]
    PoolBelowMinimum { minimum: usize },
}

/// Liveness ladder. `Alert` covers everything between the alert threshold and the critical
/// cutoff; past the cutoff the arbitrator is considered gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HeartbeatStatus {
    Ok,
    Warning,
    Alert,
    Critical,
}

impl Display for HeartbeatStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            HeartbeatStatus::Ok => f.write_str("Ok"),
            HeartbeatStatus::Warning => f.write_str("Warning"),
            HeartbeatStatus::Alert => f.write_str("Alert"),
            HeartbeatStatus::Critical => f.write_str("Critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HeartbeatRecord {
    last_seen: EpochSeconds,
    health_proof: FixedHash,
    consecutive_critical: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackRotation {
    active: Vec<PublicKey>,
    emergency_pool: Vec<PublicKey>,
    rotation_blocks: u64,
    next_rotation_height: BlockHeight,
    current_index: usize,
    emergency_rotation_active: bool,
    heartbeats: HashMap<PublicKey, HeartbeatRecord>,
}

impl FallbackRotation {
    pub fn new(arbitrators: Vec<PublicKey>, rotation_blocks: u64, current_height: BlockHeight) -> Self {
        let rotation_blocks = if rotation_blocks == 0 {
            DEFAULT_ROTATION_BLOCKS
        } else {
            rotation_blocks
        };
        Self {
            active: arbitrators,
            emergency_pool: Vec::new(),
            rotation_blocks,
            next_rotation_height: current_height + rotation_blocks,
            current_index: 0,
            emergency_rotation_active: false,
            heartbeats: HashMap::new(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.active.len() >= MIN_ARBITRATORS &&
            self.active.len() <= MAX_ARBITRATORS &&
            self.current_index < self.active.len()
    }

    pub fn current_arbitrator(&self) -> Option<PublicKey> {
        self.active.get(self.current_index).copied()
    }

    pub fn active_pool(&self) -> &[PublicKey] {
        &self.active
    }

    pub fn emergency_pool(&self) -> &[PublicKey] {
        &self.emergency_pool
    }

    pub fn next_rotation_height(&self) -> BlockHeight {
        self.next_rotation_height
    }

    pub fn emergency_rotation_active(&self) -> bool {
        self.emergency_rotation_active
    }

    /// Record a signed liveness message. Resets the consecutive-critical counter.
    pub fn record_heartbeat(
        &mut self,
        arbitrator: &PublicKey,
        timestamp: EpochSeconds,
        health_proof: FixedHash,
    ) -> Result<(), RotationError> {
        if !self.active.contains(arbitrator) {
            return Err(RotationError::UnknownArbitrator);
        }
        self.heartbeats.insert(*arbitrator, HeartbeatRecord {
            last_seen: timestamp,
            health_proof,
            consecutive_critical: 0,
        });
        Ok(())
    }

    pub fn heartbeat_status(&self, arbitrator: &PublicKey, now: EpochSeconds) -> HeartbeatStatus {
        let Some(record) = self.heartbeats.get(arbitrator) else {
            return HeartbeatStatus::Critical;
        };
        let silence = now - record.last_seen;
        if silence < HEARTBEAT_INTERVAL_SECS {
            HeartbeatStatus::Ok
        } else if silence < HEARTBEAT_WARNING_SECS {
            HeartbeatStatus::Warning
        } else if silence < HEARTBEAT_CRITICAL_SECS {
            HeartbeatStatus::Alert
        } else {
            HeartbeatStatus::Critical
        }
    }

    pub fn is_arbitrator_live(&self, arbitrator: &PublicKey, now: EpochSeconds) -> bool {
        self.active.contains(arbitrator) && self.heartbeat_status(arbitrator, now) != HeartbeatStatus::Critical
    }

    /// Sweep the pool, bumping consecutive-critical counters. Returns every arbitrator that is
    /// not `Ok`, plus the subset whose counter reached the rotation threshold.
    pub fn check_heartbeats(&mut self, now: EpochSeconds) -> (Vec<(PublicKey, HeartbeatStatus)>, Vec<PublicKey>) {
        let mut flagged = Vec::new();
        let mut rotation_due = Vec::new();
        for arbitrator in self.active.clone() {
            let status = self.heartbeat_status(&arbitrator, now);
            if status == HeartbeatStatus::Ok {
                continue;
            }
            flagged.push((arbitrator, status));
            if status == HeartbeatStatus::Critical {
                let record = self.heartbeats.entry(arbitrator).or_insert(HeartbeatRecord {
                    last_seen: 0,
                    health_proof: [0u8; 32],
                    consecutive_critical: 0,
                });
                record.consecutive_critical += 1;
                if record.consecutive_critical >= CONSECUTIVE_CRITICAL_FOR_ROTATION {
                    rotation_due.push(arbitrator);
                }
            }
        }
        if !flagged.is_empty() {
            warn!(target: LOG_TARGET, "{} arbitrators missed heartbeats", flagged.len());
        }
        (flagged, rotation_due)
    }

    pub fn is_rotation_due(&self, current_height: BlockHeight) -> bool {
        current_height >= self.next_rotation_height
    }

    /// Advance to the next arbitrator on schedule.
    pub fn perform_rotation(&mut self, current_height: BlockHeight) -> Result<PublicKey, RotationError> {
        if !self.is_rotation_due(current_height) {
            return Err(RotationError::RotationNotDue {
                next_height: self.next_rotation_height,
            });
        }
        if self.active.is_empty() {
            return Err(RotationError::PoolBelowMinimum { minimum: MIN_ARBITRATORS });
        }
        self.current_index = (self.current_index + 1) % self.active.len();
        self.next_rotation_height = current_height + self.rotation_blocks;
        let current = self.active[self.current_index];
        info!(
            target: LOG_TARGET,
            "Scheduled rotation at height {current_height}; next at {}", self.next_rotation_height
        );
        Ok(current)
    }

    /// Drop a failed arbitrator, promote a replacement from the emergency pool and bring the
    /// next scheduled rotation forward to a quarter of the normal period.
    pub fn perform_emergency_rotation(
        &mut self,
        failed: &PublicKey,
        current_height: BlockHeight,
        now: EpochSeconds,
        reason: &str,
    ) -> Result<(), RotationError> {
        let position = self
            .active
            .iter()
            .position(|a| a == failed)
            .ok_or(RotationError::UnknownArbitrator)?;
        self.active.remove(position);
        self.heartbeats.remove(failed);
        if self.current_index >= self.active.len() {
            self.current_index = 0;
        }

        if self.active.len() < MIN_ARBITRATORS {
            if let Some(promoted) = self.emergency_pool.pop() {
                self.heartbeats.insert(promoted, HeartbeatRecord {
                    last_seen: now,
                    health_proof: [0u8; 32],
                    consecutive_critical: 0,
                });
                self.active.push(promoted);
                info!(
                    target: LOG_TARGET,
                    "Emergency rotation: promoted a standby arbitrator ({})", reason
                );
            }
        }

        self.next_rotation_height = current_height + self.rotation_blocks / 4;
        self.emergency_rotation_active = true;

        if self.active.len() < MIN_ARBITRATORS {
            error!(
                target: LOG_TARGET,
                "Active arbitrator pool is below the minimum of {MIN_ARBITRATORS}; manual intervention required"
            );
            return Err(RotationError::PoolBelowMinimum { minimum: MIN_ARBITRATORS });
        }
        Ok(())
    }

    /// Add an arbitrator. Overflow past the active cap lands in the emergency pool.
    pub fn add_arbitrator(&mut self, arbitrator: PublicKey, dao_approved: bool) -> Result<(), RotationError> {
        if !dao_approved {
            return Err(RotationError::NotDaoApproved);
        }
        if self.active.contains(&arbitrator) || self.emergency_pool.contains(&arbitrator) {
            return Err(RotationError::AlreadyPooled);
        }
        if self.active.len() >= MAX_ARBITRATORS {
            self.emergency_pool.push(arbitrator);
        } else {
            self.active.push(arbitrator);
        }
        Ok(())
    }

    /// Stock the emergency pool directly with a standby that should not serve until promoted.
    pub fn add_emergency_standby(&mut self, arbitrator: PublicKey, dao_approved: bool) -> Result<(), RotationError> {
        if !dao_approved {
            return Err(RotationError::NotDaoApproved);
        }
        if self.active.contains(&arbitrator) || self.emergency_pool.contains(&arbitrator) {
            return Err(RotationError::AlreadyPooled);
        }
        self.emergency_pool.push(arbitrator);
        Ok(())
    }

    pub fn remove_arbitrator(&mut self, arbitrator: &PublicKey, dao_approved: bool) -> Result<(), RotationError> {
        if !dao_approved {
            return Err(RotationError::NotDaoApproved);
        }
        if let Some(position) = self.active.iter().position(|a| a == arbitrator) {
            self.active.remove(position);
            self.heartbeats.remove(arbitrator);
            if self.current_index >= self.active.len() && !self.active.is_empty() {
                self.current_index = 0;
            }
            return Ok(());
        }
        if let Some(position) = self.emergency_pool.iter().position(|a| a == arbitrator) {
            self.emergency_pool.remove(position);
            return Ok(());
        }
        Err(RotationError::UnknownArbitrator)
    }
}

#[cfg(test)]
mod test {
    use super::{FallbackRotation, HeartbeatStatus, RotationError};
    use crate::{
        consts::{DEFAULT_ROTATION_BLOCKS, HEARTBEAT_CRITICAL_SECS},
        crypto::Secp256k1Adapter,
        interfaces::CryptoAdapter,
    };

    const HEIGHT: u64 = 800_000;
    const NOW: i64 = 1_700_000_000;

    fn key(fill: u8) -> bitcoin::secp256k1::PublicKey {
        Secp256k1Adapter::new().keypair_from_entropy(&[fill; 32]).unwrap().1
    }

    fn pool() -> FallbackRotation {
        let mut rotation = FallbackRotation::new(vec![key(1), key(2), key(3)], DEFAULT_ROTATION_BLOCKS, HEIGHT);
        for (i, arb) in rotation.active_pool().to_vec().iter().enumerate() {
            rotation.record_heartbeat(arb, NOW - i as i64, [1u8; 32]).unwrap();
        }
        rotation.add_emergency_standby(key(9), true).unwrap();
        rotation
    }

    #[test]
    fn heartbeat_ladder() {
        let rotation = pool();
        let a = key(1);
        assert_eq!(rotation.heartbeat_status(&a, NOW + 1), HeartbeatStatus::Ok);
        assert_eq!(rotation.heartbeat_status(&a, NOW + 12 * 3_600), HeartbeatStatus::Warning);
        assert_eq!(rotation.heartbeat_status(&a, NOW + 18 * 3_600), HeartbeatStatus::Alert);
        assert_eq!(rotation.heartbeat_status(&a, NOW + 30 * 3_600), HeartbeatStatus::Alert);
        assert_eq!(rotation.heartbeat_status(&a, NOW + 36 * 3_600), HeartbeatStatus::Critical);
    }

    #[test]
    fn three_critical_sweeps_demand_rotation() {
        let mut rotation = pool();
        let silent_time = NOW + HEARTBEAT_CRITICAL_SECS + 1;
        for sweep in 1..=3u32 {
            let (flagged, due) = rotation.check_heartbeats(silent_time);
            assert_eq!(flagged.len(), 3);
            if sweep < 3 {
                assert!(due.is_empty(), "sweep {sweep} should not demand rotation yet");
            } else {
                assert_eq!(due.len(), 3);
            }
        }
    }

    #[test]
    fn emergency_rotation_promotes_standby_and_accelerates_schedule() {
        let mut rotation = pool();
        let failed = key(1);
        rotation
            .perform_emergency_rotation(&failed, HEIGHT + 100, NOW, "missed heartbeats")
            .unwrap();
        assert!(rotation.emergency_rotation_active());
        assert!(!rotation.active_pool().contains(&failed));
        // Standby key(9) was promoted to keep the pool at the minimum
        assert!(rotation.active_pool().contains(&key(9)));
        assert_eq!(rotation.next_rotation_height(), HEIGHT + 100 + DEFAULT_ROTATION_BLOCKS / 4);
    }

    #[test]
    fn emergency_rotation_with_empty_standby_raises_alarm() {
        let mut rotation = FallbackRotation::new(vec![key(1), key(2), key(3)], DEFAULT_ROTATION_BLOCKS, HEIGHT);
        let result = rotation.perform_emergency_rotation(&key(1), HEIGHT + 100, NOW, "gone");
        assert_eq!(result, Err(RotationError::PoolBelowMinimum { minimum: 3 }));
        assert!(rotation.emergency_rotation_active());
    }

    #[test]
    fn scheduled_rotation_cycles_the_pool() {
        let mut rotation = pool();
        assert_eq!(rotation.current_arbitrator(), Some(key(1)));
        assert_eq!(
            rotation.perform_rotation(HEIGHT + 1),
            Err(RotationError::RotationNotDue {
                next_height: HEIGHT + DEFAULT_ROTATION_BLOCKS
            })
        );
        let next = rotation.perform_rotation(HEIGHT + DEFAULT_ROTATION_BLOCKS).unwrap();
        assert_eq!(next, key(2));
        assert_eq!(rotation.next_rotation_height(), HEIGHT + 2 * DEFAULT_ROTATION_BLOCKS);
    }

    #[test]
    fn pool_mutations_require_dao_approval() {
        let mut rotation = pool();
        assert_eq!(rotation.add_arbitrator(key(7), false), Err(RotationError::NotDaoApproved));
        assert_eq!(rotation.remove_arbitrator(&key(1), false), Err(RotationError::NotDaoApproved));
        assert_eq!(rotation.add_arbitrator(key(9), true), Err(RotationError::AlreadyPooled));
        rotation.remove_arbitrator(&key(9), true).unwrap();
    }
}
