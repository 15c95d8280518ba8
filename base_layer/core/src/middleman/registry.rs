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

//! The middleman registry: concurrent record store with per-record guards and the weighted
//! candidate scorer used for automatic selection.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use log::{debug, warn};
use mmp_common_types::{
    types::{BlockHeight, EpochSeconds, PublicKey},
    Satoshi,
};
use serde::{Deserialize, Serialize};

use crate::{
    consts::{MAX_WEIGHT_SUM, MIN_MIDDLEMAN_BOND, MIN_WEIGHT_SUM, SPECIALTY_CACHE_SIZE},
    middleman::{
        error::RegistryError,
        record::{Middleman, SlashCondition, SlashRecord},
    },
};

const LOG_TARGET: &str = "mmp::middleman::registry";

/// Weights for candidate ranking. The sum must land in the accepted band around 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub reputation_weight: f64,
    pub response_time_weight: f64,
    pub fee_weight: f64,
    pub specialty_match_weight: f64,
    pub performance_weight: f64,
    /// Response times at or above this score zero.
    pub max_response_time_blocks: u64,
    /// Fee normalisation ceiling; zero yields the neutral fee score.
    pub max_acceptable_fee: Satoshi,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            reputation_weight: 0.4,
            response_time_weight: 0.3,
            fee_weight: 0.2,
            specialty_match_weight: 0.1,
            performance_weight: 0.0,
            max_response_time_blocks: 1_008,
            max_acceptable_fee: Satoshi::new(1_000_000),
        }
    }
}

impl SelectionCriteria {
    pub fn validate(&self) -> Result<(), RegistryError> {
        let sum = self.reputation_weight +
            self.response_time_weight +
            self.fee_weight +
            self.specialty_match_weight +
            self.performance_weight;
        if !(MIN_WEIGHT_SUM..=MAX_WEIGHT_SUM).contains(&sum) {
            return Err(RegistryError::InvalidWeights(sum));
        }
        Ok(())
    }
}

/// Strict-LRU cache of specialty match fractions, keyed by (provided, requested) name sets.
struct SpecialtyMatchCache {
    entries: HashMap<(Vec<String>, Vec<String>), (f64, u64)>,
    tick: u64,
    capacity: usize,
}

impl SpecialtyMatchCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
            capacity,
        }
    }

    fn get_or_compute(&mut self, provided: &[String], requested: &[String]) -> f64 {
        self.tick += 1;
        let key = (provided.to_vec(), requested.to_vec());
        if let Some((score, stamp)) = self.entries.get_mut(&key) {
            *stamp = self.tick;
            return *score;
        }
        let score = specialty_match_fraction(provided, requested);
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, stamp))| *stamp)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (score, self.tick));
        score
    }
}

/// Fraction of requested specialties the middleman covers. An empty request matches perfectly.
fn specialty_match_fraction(provided: &[String], requested: &[String]) -> f64 {
    if requested.is_empty() {
        return 1.0;
    }
    if provided.is_empty() {
        return 0.0;
    }
    let matches = requested.iter().filter(|r| provided.contains(r)).count();
    matches as f64 / requested.len() as f64
}

pub struct MiddlemanRegistry {
    records: RwLock<HashMap<PublicKey, Arc<Mutex<Middleman>>>>,
    specialty_cache: Mutex<SpecialtyMatchCache>,
}

impl MiddlemanRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            specialty_cache: Mutex::new(SpecialtyMatchCache::new(SPECIALTY_CACHE_SIZE)),
        }
    }

    pub fn register(&self, middleman: Middleman) -> Result<(), RegistryError> {
        middleman.validate()?;
        let mut records = self.records.write().expect("registry lock poisoned");
        if records.contains_key(&middleman.pubkey) {
            return Err(RegistryError::AlreadyRegistered);
        }
        debug!(
            target: LOG_TARGET,
            "Registered middleman '{}' with bond {}", middleman.name, middleman.bond
        );
        records.insert(middleman.pubkey, Arc::new(Mutex::new(middleman)));
        Ok(())
    }

    fn cell(&self, pubkey: &PublicKey) -> Result<Arc<Mutex<Middleman>>, RegistryError> {
        let records = self.records.read().expect("registry lock poisoned");
        records.get(pubkey).cloned().ok_or(RegistryError::MiddlemanNotFound)
    }

    /// Read-only snapshot of a record.
    pub fn get(&self, pubkey: &PublicKey) -> Result<Middleman, RegistryError> {
        let cell = self.cell(pubkey)?;
        let guard = cell.try_lock().map_err(|_| RegistryError::RecordBusy)?;
        Ok(guard.clone())
    }

    pub fn contains(&self, pubkey: &PublicKey) -> bool {
        self.records.read().expect("registry lock poisoned").contains_key(pubkey)
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run a mutation under the per-middleman guard. Counter updates on dispute completion and
    /// slashes all come through here; nested attempts surface as `RecordBusy` rather than
    /// deadlocking.
    pub fn with_middleman<F, R>(&self, pubkey: &PublicKey, f: F) -> Result<R, RegistryError>
    where F: FnOnce(&mut Middleman) -> Result<R, RegistryError> {
        let cell = self.cell(pubkey)?;
        let mut guard = cell.try_lock().map_err(|_| RegistryError::RecordBusy)?;
        let mut working = guard.clone();
        let result = f(&mut working)?;
        *guard = working;
        Ok(result)
    }

    pub fn touch(&self, pubkey: &PublicKey, now: EpochSeconds) -> Result<(), RegistryError> {
        self.with_middleman(pubkey, |mm| {
            mm.last_active = now;
            Ok(())
        })
    }

    pub fn record_resolution(&self, pubkey: &PublicKey, success: bool, now: EpochSeconds) -> Result<(), RegistryError> {
        self.with_middleman(pubkey, |mm| {
            mm.record_resolution(success, now);
            Ok(())
        })
    }

    /// Apply a finalized slash: decrement the bond, extend the slash history, bump the counter
    /// and deactivate the middleman if the remaining bond falls under the minimum. Returns the
    /// remaining bond.
    pub fn apply_slash(
        &self,
        pubkey: &PublicKey,
        amount: Satoshi,
        condition: SlashCondition,
        height: BlockHeight,
        description: String,
    ) -> Result<Satoshi, RegistryError> {
        self.with_middleman(pubkey, |mm| {
            let remaining = mm
                .bond
                .checked_sub(amount)
                .ok_or_else(|| RegistryError::EconomicRatiosInvalid("slash exceeds bond".to_string()))?;
            mm.bond = remaining;
            mm.bond_slashes += 1;
            mm.slash_history.push(SlashRecord {
                block_height: height,
                amount,
                condition,
                description,
            });
            if remaining < MIN_MIDDLEMAN_BOND && mm.is_active {
                warn!(
                    target: LOG_TARGET,
                    "Middleman '{}' deactivated: bond {} fell under the minimum", mm.name, remaining
                );
                mm.is_active = false;
            }
            Ok(remaining)
        })
    }

    /// Retirement and reactivation are governance actions.
    pub fn set_active(&self, pubkey: &PublicKey, active: bool, dao_approved: bool) -> Result<(), RegistryError> {
        if !dao_approved {
            return Err(RegistryError::NotDaoApproved);
        }
        self.with_middleman(pubkey, |mm| {
            mm.is_active = active;
            Ok(())
        })
    }

    /// Weighted candidate score in `[0, 1]` per the selection criteria.
    pub fn score(&self, middleman: &Middleman, criteria: &SelectionCriteria, required_specialties: &[String]) -> f64 {
        if criteria.validate().is_err() || middleman.validate().is_err() {
            return 0.0;
        }
        let rep_score = f64::from(middleman.effective_reputation());

        let max_response = criteria.max_response_time_blocks;
        let resp_score = if max_response == 0 || middleman.response_time_blocks >= max_response {
            0.0
        } else {
            (max_response - middleman.response_time_blocks) as f64 / max_response as f64 * 100.0
        };

        let fee_score = if criteria.max_acceptable_fee.is_zero() {
            50.0
        } else {
            let max_fee = criteria.max_acceptable_fee.as_u64() as f64;
            ((max_fee - middleman.fee.as_u64() as f64) / max_fee).clamp(0.0, 1.0) * 100.0
        };

        let provided: Vec<String> = middleman.specialties.iter().map(|s| s.category.clone()).collect();
        let spec_score = self
            .specialty_cache
            .lock()
            .expect("specialty cache lock poisoned")
            .get_or_compute(&provided, required_specialties) *
            100.0;

        let perf_score = if criteria.performance_weight > 0.0 {
            middleman.performance.overall_score()
        } else {
            0.0
        };

        let total = rep_score * criteria.reputation_weight +
            resp_score * criteria.response_time_weight +
            fee_score * criteria.fee_weight +
            spec_score * criteria.specialty_match_weight +
            perf_score * criteria.performance_weight;
        total / 100.0
    }

    /// Rank DAO-approved, eligible candidates for a job, best first.
    pub fn rank_candidates(
        &self,
        criteria: &SelectionCriteria,
        job_amount: Satoshi,
        required_specialties: &[String],
    ) -> Vec<(PublicKey, f64)> {
        let cells: Vec<Arc<Mutex<Middleman>>> = {
            let records = self.records.read().expect("registry lock poisoned");
            records.values().cloned().collect()
        };
        let mut ranked: Vec<(PublicKey, f64)> = cells
            .iter()
            .filter_map(|cell| {
                let mm = cell.try_lock().ok()?;
                if !mm.is_dao_approved || !mm.is_eligible(job_amount) {
                    return None;
                }
                Some((mm.pubkey, self.score(&mm, criteria, required_specialties)))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

impl Default for MiddlemanRegistry {
    fn default() -> Self {
        Self::new()
    }
}
