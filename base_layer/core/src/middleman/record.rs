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

//! The middleman record and its economic invariants.

use bitcoin::hashes::{sha256, Hash, HashEngine};
use mmp_common_types::{
    types::{BlockHeight, EpochSeconds, FixedHash, PublicKey},
    Satoshi,
};
use serde::{Deserialize, Serialize};

use crate::{
    consts::{
        MAX_FEE_TO_BOND_RATIO,
        MAX_INSURANCE_PREMIUM_RATE,
        MAX_MIDDLEMAN_BOND,
        MAX_MIDDLEMAN_DESCRIPTION_LENGTH,
        MAX_MIDDLEMAN_NAME_LENGTH,
        MAX_REPUTATION_SCORE,
        MAX_SPECIALTIES_PER_MIDDLEMAN,
        MAX_SPECIALTY_LENGTH,
        MIN_BOND_TO_JOB_RATIO,
        MIN_MIDDLEMAN_BOND,
        MIN_REPUTATION_FOR_AUTO,
        MIN_REPUTATION_RETENTION,
        REPUTATION_DECAY_RATE_PER_DAY,
    },
    middleman::error::RegistryError,
};

bitflags::bitflags! {
    /// Grounds for slashing a bond. Conditions combine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SlashCondition: u8 {
        const MALICIOUS_BEHAVIOR = 0b0000_0001;
        const GROSS_NEGLIGENCE   = 0b0000_0010;
        const REPEATED_FAILURES  = 0b0000_0100;
        const BOND_UNDER_MIN     = 0b0000_1000;
    }
}

/// One finalized slash, kept on the record for transparency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    pub block_height: BlockHeight,
    pub amount: Satoshi,
    pub condition: SlashCondition,
    pub description: String,
}

/// Optional third-party coverage of a bond for high-value jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondInsurance {
    pub coverage: Satoshi,
    pub premium_rate: f64,
    pub insurer: PublicKey,
    pub policy_hash: FixedHash,
    pub policy_expiry: EpochSeconds,
    pub premium_paid: Satoshi,
}

impl BondInsurance {
    /// Coverage above the bond is over-insurance and rejected everywhere.
    pub fn validate(&self, bond: Satoshi) -> Result<(), RegistryError> {
        if self.coverage.is_zero() {
            return Err(RegistryError::InvalidInsurance("zero coverage".to_string()));
        }
        if self.coverage > bond {
            return Err(RegistryError::InvalidInsurance(
                "coverage may not exceed the bond".to_string(),
            ));
        }
        if self.premium_rate <= 0.0 || self.premium_rate > MAX_INSURANCE_PREMIUM_RATE {
            return Err(RegistryError::InvalidInsurance(format!(
                "premium rate must be in (0, {MAX_INSURANCE_PREMIUM_RATE}]"
            )));
        }
        if self.policy_hash == [0u8; 32] || self.policy_expiry <= 0 {
            return Err(RegistryError::InvalidInsurance("incomplete policy".to_string()));
        }
        Ok(())
    }

    pub fn required_premium(&self) -> Satoshi {
        Satoshi::new((self.coverage.as_u64() as f64 * self.premium_rate) as u64)
    }

    pub fn is_active(&self, now: EpochSeconds) -> bool {
        self.premium_paid >= self.required_premium() && now < self.policy_expiry
    }

    pub fn effective_coverage(&self, claim: Satoshi) -> Satoshi {
        claim.min(self.coverage)
    }
}

/// Aggregated arbitration quality metrics, updated by the host as feedback arrives.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MiddlemanPerformance {
    pub avg_resolution_time_hours: f64,
    /// 0.0..=5.0
    pub employer_satisfaction: f64,
    /// 0.0..=5.0
    pub worker_satisfaction: f64,
    pub repeat_clients: u32,
    pub total_feedback_count: u32,
    pub complex_disputes_handled: u32,
    pub appeal_success_rate: f64,
    pub last_update: EpochSeconds,
}

impl MiddlemanPerformance {
    /// Composite 0..=100 score: 40% satisfaction, 30% efficiency, 30% reliability. Unrated
    /// middlemen score a neutral 50.
    pub fn overall_score(&self) -> f64 {
        if self.total_feedback_count == 0 {
            return 50.0;
        }
        let satisfaction = (self.employer_satisfaction + self.worker_satisfaction) / 2.0 * 20.0;
        satisfaction * 0.4 + self.efficiency_score() * 0.3 + self.reliability_score() * 0.3
    }

    fn efficiency_score(&self) -> f64 {
        const IDEAL_HOURS: f64 = 24.0;
        const MAX_ACCEPTABLE_HOURS: f64 = 168.0;
        if self.avg_resolution_time_hours <= 0.0 {
            return 50.0;
        }
        if self.avg_resolution_time_hours <= IDEAL_HOURS {
            return 100.0;
        }
        if self.avg_resolution_time_hours >= MAX_ACCEPTABLE_HOURS {
            return 20.0;
        }
        100.0 - (self.avg_resolution_time_hours - IDEAL_HOURS) / (MAX_ACCEPTABLE_HOURS - IDEAL_HOURS) * 80.0
    }

    fn reliability_score(&self) -> f64 {
        let appeal_penalty = self.appeal_success_rate * 50.0;
        let repeat_bonus = (f64::from(self.repeat_clients) * 2.0).min(20.0);
        (80.0 - appeal_penalty + repeat_bonus).clamp(30.0, 100.0)
    }
}

/// Per-category arbitration experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specialty {
    pub category: String,
    pub subcategory: String,
    pub jobs_completed: u32,
    /// 0.0..=5.0
    pub avg_rating: f64,
    pub total_ratings: u32,
    pub last_job_timestamp: EpochSeconds,
    pub is_certified: bool,
    pub certification_authority: String,
}

impl Specialty {
    pub fn new<S: Into<String>>(category: S) -> Self {
        Self {
            category: category.into(),
            subcategory: String::new(),
            jobs_completed: 0,
            avg_rating: 0.0,
            total_ratings: 0,
            last_job_timestamp: 0,
            is_certified: false,
            certification_authority: String::new(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.category.is_empty() &&
            self.category.len() <= MAX_SPECIALTY_LENGTH &&
            self.subcategory.len() <= MAX_SPECIALTY_LENGTH &&
            (0.0..=5.0).contains(&self.avg_rating)
    }

    pub fn add_rating(&mut self, rating: f64) {
        if (0.0..=5.0).contains(&rating) {
            self.avg_rating =
                (self.avg_rating * f64::from(self.total_ratings) + rating) / f64::from(self.total_ratings + 1);
            self.total_ratings += 1;
        }
    }

    pub fn record_job(&mut self, rating: f64, completed_at: EpochSeconds) {
        self.jobs_completed += 1;
        self.last_job_timestamp = completed_at;
        self.add_rating(rating);
    }

    /// 0..=100: up to 50 for volume, up to 50 for rating, +10 for certification, capped.
    pub fn experience_score(&self) -> u32 {
        let job_score = (self.jobs_completed * 2).min(50);
        let rating_score = (self.avg_rating * 10.0) as u32;
        let cert_bonus = if self.is_certified { 10 } else { 0 };
        (job_score + rating_score + cert_bonus).min(100)
    }

    pub fn full_name(&self) -> String {
        if self.subcategory.is_empty() {
            self.category.clone()
        } else {
            format!("{}::{}", self.category, self.subcategory)
        }
    }
}

/// A registered dispute arbitrator and its bond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Middleman {
    pub id: FixedHash,
    pub pubkey: PublicKey,
    pub name: String,
    pub contact: String,
    pub description: String,
    pub fee: Satoshi,
    /// 0..=100, adjusted by governance and dispute outcomes
    pub reputation_score: u32,
    pub bond: Satoshi,
    /// Obfuscated operator identity, e.g. `SHA256("Arbitrator LLC")`
    pub identity_hash: Option<FixedHash>,
    /// Merkle commitment to the operator's credential set
    pub credential_merkle_root: Option<FixedHash>,
    pub total_disputes: u32,
    pub successful_resolutions: u32,
    pub bond_slashes: u32,
    pub specialties: Vec<Specialty>,
    pub last_active: EpochSeconds,
    pub is_active: bool,
    pub accepts_new_jobs: bool,
    /// Zero means no upper bound
    pub max_job_amount: Satoshi,
    pub response_time_blocks: u64,
    pub is_dao_approved: bool,
    pub is_kyc_verified: bool,
    pub slash_history: Vec<SlashRecord>,
    pub bond_insurance: Option<BondInsurance>,
    pub performance: MiddlemanPerformance,
}

impl Middleman {
    pub fn new<S: Into<String>>(name: S, pubkey: PublicKey, fee: Satoshi, bond: Satoshi) -> Self {
        let name = name.into();
        let mut engine = sha256::Hash::engine();
        engine.input(name.as_bytes());
        engine.input(&pubkey.serialize());
        Self {
            id: sha256::Hash::from_engine(engine).to_byte_array(),
            pubkey,
            name,
            contact: String::new(),
            description: String::new(),
            fee,
            reputation_score: 50,
            bond,
            identity_hash: None,
            credential_merkle_root: None,
            total_disputes: 0,
            successful_resolutions: 0,
            bond_slashes: 0,
            specialties: Vec::new(),
            last_active: 0,
            is_active: true,
            accepts_new_jobs: true,
            max_job_amount: Satoshi::ZERO,
            response_time_blocks: crate::consts::DEFAULT_RESPONSE_TIME_BLOCKS,
            is_dao_approved: false,
            is_kyc_verified: false,
            slash_history: Vec::new(),
            bond_insurance: None,
            performance: MiddlemanPerformance::default(),
        }
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.is_empty() || self.name.len() > MAX_MIDDLEMAN_NAME_LENGTH {
            return Err(RegistryError::InvalidName(MAX_MIDDLEMAN_NAME_LENGTH));
        }
        if self.description.len() > MAX_MIDDLEMAN_DESCRIPTION_LENGTH {
            return Err(RegistryError::DescriptionTooLong(MAX_MIDDLEMAN_DESCRIPTION_LENGTH));
        }
        if self.specialties.len() > MAX_SPECIALTIES_PER_MIDDLEMAN || self.specialties.iter().any(|s| !s.is_well_formed())
        {
            return Err(RegistryError::TooManySpecialties(MAX_SPECIALTIES_PER_MIDDLEMAN));
        }
        if self.reputation_score > MAX_REPUTATION_SCORE {
            return Err(RegistryError::InvalidReputation(self.reputation_score));
        }
        if self.bond < MIN_MIDDLEMAN_BOND || self.bond > MAX_MIDDLEMAN_BOND {
            return Err(RegistryError::InsufficientBond { bond: self.bond });
        }
        if self.fee.is_zero() || self.fee.as_u64() as f64 > self.bond.as_u64() as f64 * MAX_FEE_TO_BOND_RATIO {
            return Err(RegistryError::FeeExceedsBond);
        }
        if !self.max_job_amount.is_zero() {
            let required = Satoshi::new((self.max_job_amount.as_u64() as f64 * MIN_BOND_TO_JOB_RATIO) as u64);
            if self.bond < required {
                return Err(RegistryError::EconomicRatiosInvalid(format!(
                    "bond {} below {} required for a {} job ceiling",
                    self.bond, required, self.max_job_amount
                )));
            }
        }
        if let Some(insurance) = &self.bond_insurance {
            insurance.validate(self.bond)?;
        }
        Ok(())
    }

    /// Reputation after the slash penalty `⌊slashes·100 / total_disputes⌋`, clamped to the
    /// unpenalised score.
    pub fn effective_reputation(&self) -> u32 {
        if self.total_disputes == 0 {
            return self.reputation_score;
        }
        let penalty = (self.bond_slashes * 100) / self.total_disputes;
        self.reputation_score - penalty.min(self.reputation_score)
    }

    /// Exponential inactivity decay with a retention floor.
    pub fn time_decay_factor(&self, secs_since_active: EpochSeconds) -> f64 {
        if secs_since_active <= 0 {
            return 1.0;
        }
        let days = secs_since_active as f64 / 86_400.0;
        (-REPUTATION_DECAY_RATE_PER_DAY * days).exp().max(MIN_REPUTATION_RETENTION)
    }

    pub fn time_weighted_reputation(&self, now: EpochSeconds) -> f64 {
        f64::from(self.effective_reputation()) * self.time_decay_factor(now - self.last_active)
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_disputes == 0 {
            return 0.0;
        }
        f64::from(self.successful_resolutions) / f64::from(self.total_disputes)
    }

    /// Risk-based bond floor for arbitrating a job of the given value.
    pub fn min_bond_for_job(job_amount: Satoshi) -> Satoshi {
        job_amount.div_floor(10).max(MIN_MIDDLEMAN_BOND)
    }

    /// Eligibility for automatic selection on a job of value `job_amount`.
    pub fn is_eligible(&self, job_amount: Satoshi) -> bool {
        self.is_active &&
            self.accepts_new_jobs &&
            (self.max_job_amount.is_zero() || job_amount <= self.max_job_amount) &&
            self.effective_reputation() >= MIN_REPUTATION_FOR_AUTO &&
            self.bond >= Self::min_bond_for_job(job_amount)
    }

    pub fn record_resolution(&mut self, success: bool, now: EpochSeconds) {
        self.total_disputes += 1;
        if success {
            self.successful_resolutions += 1;
        }
        self.last_active = now;
    }

    /// Verify a claimed credential against the committed Merkle root. When an HMAC key is
    /// supplied the leaf is keyed, hiding credential contents from offline guessing.
    pub fn verify_credential(
        &self,
        credential: &str,
        proof: &[FixedHash],
        hmac_key: Option<&[u8]>,
        crypto: &dyn crate::interfaces::CryptoAdapter,
    ) -> bool {
        let Some(root) = self.credential_merkle_root else {
            return false;
        };
        let leaf = match hmac_key {
            Some(key) => crypto.hmac_sha256(key, credential.as_bytes()),
            None => crypto.sha256(credential.as_bytes()),
        };
        crypto.verify_merkle_proof(&leaf, proof, &root)
    }
}

#[cfg(test)]
mod test {
    use mmp_common_types::Satoshi;

    use super::{BondInsurance, Middleman, MiddlemanPerformance, Specialty};
    use crate::{
        consts::{MIN_MIDDLEMAN_BOND, MIN_REPUTATION_RETENTION},
        crypto::Secp256k1Adapter,
        interfaces::CryptoAdapter,
        middleman::error::RegistryError,
    };

    fn sample() -> Middleman {
        let crypto = Secp256k1Adapter::new();
        let (_, pk) = crypto.keypair_from_entropy(&[21u8; 32]).unwrap();
        Middleman::new("Arbiter One", pk, Satoshi::new(10_000), Satoshi::new(1_000_000))
    }

    #[test]
    fn validation_accepts_sane_record() {
        sample().validate().unwrap();
    }

    #[test]
    fn fee_must_not_exceed_half_the_bond() {
        let mut mm = sample();
        mm.fee = Satoshi::new(500_000);
        mm.validate().unwrap();
        mm.fee = Satoshi::new(500_001);
        assert_eq!(mm.validate(), Err(RegistryError::FeeExceedsBond));
        mm.fee = Satoshi::ZERO;
        assert_eq!(mm.validate(), Err(RegistryError::FeeExceedsBond));
    }

    #[test]
    fn bond_must_cover_job_ceiling() {
        let mut mm = sample();
        mm.max_job_amount = Satoshi::new(20_000_000);
        mm.validate().unwrap();
        mm.max_job_amount = Satoshi::new(20_000_001);
        assert!(matches!(mm.validate(), Err(RegistryError::EconomicRatiosInvalid(_))));
    }

    #[test]
    fn bond_bounds() {
        let mut mm = sample();
        mm.bond = MIN_MIDDLEMAN_BOND;
        mm.fee = Satoshi::new(25_000);
        mm.validate().unwrap();
        mm.bond = Satoshi::new(49_999);
        assert!(matches!(mm.validate(), Err(RegistryError::InsufficientBond { .. })));
    }

    #[test]
    fn effective_reputation_penalises_slashes() {
        let mut mm = sample();
        mm.reputation_score = 80;
        assert_eq!(mm.effective_reputation(), 80);
        mm.total_disputes = 10;
        mm.bond_slashes = 2;
        // penalty = 2*100/10 = 20
        assert_eq!(mm.effective_reputation(), 60);
        mm.bond_slashes = 10;
        assert_eq!(mm.effective_reputation(), 0);
    }

    #[test]
    fn decay_has_retention_floor() {
        let mm = sample();
        assert_eq!(mm.time_decay_factor(0), 1.0);
        let one_month = mm.time_decay_factor(30 * 86_400);
        assert!(one_month < 1.0 && one_month > MIN_REPUTATION_RETENTION);
        let two_years = mm.time_decay_factor(730 * 86_400);
        assert_eq!(two_years, MIN_REPUTATION_RETENTION);
    }

    #[test]
    fn eligibility_requires_bond_for_job_size() {
        let mut mm = sample();
        mm.reputation_score = 80;
        // bond 1_000_000 covers jobs up to 10_000_000
        assert!(mm.is_eligible(Satoshi::new(10_000_000)));
        assert!(!mm.is_eligible(Satoshi::new(10_000_001)));
        mm.accepts_new_jobs = false;
        assert!(!mm.is_eligible(Satoshi::new(1_000)));
    }

    #[test]
    fn over_insurance_is_rejected() {
        let crypto = Secp256k1Adapter::new();
        let (_, insurer) = crypto.keypair_from_entropy(&[22u8; 32]).unwrap();
        let mut mm = sample();
        mm.bond_insurance = Some(BondInsurance {
            coverage: Satoshi::new(1_000_001),
            premium_rate: 0.02,
            insurer,
            policy_hash: [1u8; 32],
            policy_expiry: 2_000_000_000,
            premium_paid: Satoshi::new(20_000),
        });
        assert!(matches!(mm.validate(), Err(RegistryError::InvalidInsurance(_))));
    }

    #[test]
    fn performance_composite() {
        let perf = MiddlemanPerformance::default();
        assert_eq!(perf.overall_score(), 50.0);

        let perf = MiddlemanPerformance {
            avg_resolution_time_hours: 24.0,
            employer_satisfaction: 5.0,
            worker_satisfaction: 5.0,
            repeat_clients: 10,
            total_feedback_count: 12,
            appeal_success_rate: 0.0,
            ..Default::default()
        };
        // satisfaction 100 * 0.4 + efficiency 100 * 0.3 + reliability 100 * 0.3
        assert!((perf.overall_score() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn credential_verification_against_merkle_root() {
        let crypto = Secp256k1Adapter::new();
        let mut mm = sample();
        // Without a commitment no credential verifies
        assert!(!mm.verify_credential("bar-license-2023", &[], None, &crypto));

        // Commit to a single-credential tree (root == leaf)
        let leaf = crypto.sha256(b"bar-license-2023");
        mm.credential_merkle_root = Some(leaf);
        assert!(mm.verify_credential("bar-license-2023", &[], None, &crypto));
        assert!(!mm.verify_credential("forged", &[], None, &crypto));

        // Keyed commitment requires the same key at verification
        let keyed = crypto.hmac_sha256(b"registry-key", b"bar-license-2023");
        mm.credential_merkle_root = Some(keyed);
        assert!(mm.verify_credential("bar-license-2023", &[], Some(b"registry-key"), &crypto));
        assert!(!mm.verify_credential("bar-license-2023", &[], Some(b"wrong-key"), &crypto));
    }

    #[test]
    fn specialty_experience() {
        let mut s = Specialty::new("SOFTWARE");
        assert!(s.is_well_formed());
        s.record_job(5.0, 1_700_000_000);
        s.record_job(4.0, 1_700_000_100);
        assert_eq!(s.jobs_completed, 2);
        assert!((s.avg_rating - 4.5).abs() < f64::EPSILON);
        // volume 4 + rating 45
        assert_eq!(s.experience_score(), 49);
        s.is_certified = true;
        assert_eq!(s.experience_score(), 59);
    }
}
