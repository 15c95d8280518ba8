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

use std::fmt;

use bitcoin::hashes::{sha256, Hash, HashEngine};
use serde::{Deserialize, Serialize};

use crate::types::{EpochSeconds, FixedHash, PublicKey, FIXED_HASH_SIZE};

/// Unique identifier of a job contract.
///
/// Derived as `SHA256(employer_pubkey ‖ title ‖ created_timestamp)` so the employer cannot mint
/// two distinct contracts with identical posting parameters in the same second.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct JobId(FixedHash);

impl JobId {
    /// Random identifier, used for ad-hoc lookups and tests. Protocol contracts always use
    /// [`JobId::derive`].
    pub fn new_random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; FIXED_HASH_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        JobId(bytes)
    }

    pub fn derive(employer: &PublicKey, title: &str, created_timestamp: EpochSeconds) -> Self {
        let mut engine = sha256::Hash::engine();
        engine.input(&employer.serialize());
        engine.input(title.as_bytes());
        engine.input(&created_timestamp.to_le_bytes());
        JobId(sha256::Hash::from_engine(engine).to_byte_array())
    }

    pub fn from_bytes(bytes: FixedHash) -> Self {
        JobId(bytes)
    }

    pub fn as_bytes(&self) -> &FixedHash {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; FIXED_HASH_SIZE]
    }

    /// Abbreviated form used in log lines.
    pub fn short_str(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<FixedHash> for JobId {
    fn from(bytes: FixedHash) -> Self {
        JobId(bytes)
    }
}

impl From<JobId> for FixedHash {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.short_str())
    }
}

#[cfg(test)]
mod test {
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    use super::JobId;

    fn test_key(fill: u8) -> bitcoin::secp256k1::PublicKey {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[fill; 32]).unwrap();
        sk.public_key(&secp)
    }

    #[test]
    fn derivation_is_deterministic() {
        let employer = test_key(7);
        let a = JobId::derive(&employer, "Design a logo", 1_700_000_000);
        let b = JobId::derive(&employer, "Design a logo", 1_700_000_000);
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn derivation_is_input_sensitive() {
        let employer = test_key(7);
        let base = JobId::derive(&employer, "Design a logo", 1_700_000_000);
        assert_ne!(base, JobId::derive(&employer, "Design a logo", 1_700_000_001));
        assert_ne!(base, JobId::derive(&employer, "Design a log", 1_700_000_000));
        assert_ne!(base, JobId::derive(&test_key(8), "Design a logo", 1_700_000_000));
    }

    #[test]
    fn display_round_trips_hex() {
        let id = JobId::from_bytes([0xab; 32]);
        assert_eq!(id.to_string(), "ab".repeat(32));
        assert_eq!(id.short_str(), "abababab");
    }
}
