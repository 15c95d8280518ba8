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

//! Default [`CryptoAdapter`] backed by the `bitcoin` crate's secp256k1 bindings.

use bitcoin::{
    hashes::{hmac::HmacEngine, sha256, Hash, HashEngine, Hmac},
    key::Keypair,
    secp256k1::{All, Message, Secp256k1},
    taproot::{TapNodeHash, TapTweakHash},
};
use mmp_common_types::types::{FixedHash, PublicKey, SchnorrSignature, SecretKey, XOnlyPublicKey};

use crate::interfaces::{CryptoAdapter, CryptoError};

/// Byte equality that does not short-circuit, so comparison time is independent of where the
/// first difference occurs.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct Secp256k1Adapter {
    secp: Secp256k1<All>,
}

impl Secp256k1Adapter {
    pub fn new() -> Self {
        Self { secp: Secp256k1::new() }
    }

    pub fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }
}

impl Default for Secp256k1Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoAdapter for Secp256k1Adapter {
    fn sign_schnorr(&self, msg: &FixedHash, secret: &SecretKey) -> SchnorrSignature {
        let keypair = Keypair::from_secret_key(&self.secp, secret);
        self.secp
            .sign_schnorr_no_aux_rand(&Message::from_digest(*msg), &keypair)
    }

    fn verify_schnorr(&self, sig: &SchnorrSignature, msg: &FixedHash, key: &XOnlyPublicKey) -> bool {
        self.secp
            .verify_schnorr(sig, &Message::from_digest(*msg), key)
            .is_ok()
    }

    fn aggregate_keys(&self, keys: &[PublicKey]) -> Result<PublicKey, CryptoError> {
        if keys.is_empty() {
            return Err(CryptoError::AggregationFailed);
        }
        let refs = keys.iter().collect::<Vec<_>>();
        PublicKey::combine_keys(&refs).map_err(|_| CryptoError::AggregationFailed)
    }

    fn taproot_tweak(&self, aggregated: &PublicKey, merkle_root: Option<FixedHash>) -> FixedHash {
        let (internal, _parity) = aggregated.x_only_public_key();
        let root = merkle_root.map(TapNodeHash::from_byte_array);
        TapTweakHash::from_key_and_tweak(internal, root).to_byte_array()
    }

    fn sha256(&self, data: &[u8]) -> FixedHash {
        sha256::Hash::hash(data).to_byte_array()
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> FixedHash {
        let mut engine = HmacEngine::<sha256::Hash>::new(key);
        engine.input(data);
        Hmac::<sha256::Hash>::from_engine(engine).to_byte_array()
    }

    fn verify_merkle_proof(&self, leaf: &FixedHash, proof: &[FixedHash], root: &FixedHash) -> bool {
        // Sorted-pair interior hashing: the branch direction is implied by byte order, so the
        // proof carries only the sibling hashes.
        let mut node = *leaf;
        for sibling in proof {
            let mut engine = sha256::Hash::engine();
            if node <= *sibling {
                engine.input(&node);
                engine.input(sibling);
            } else {
                engine.input(sibling);
                engine.input(&node);
            }
            node = sha256::Hash::from_engine(engine).to_byte_array();
        }
        constant_time_eq(&node, root)
    }

    fn keypair_from_entropy(&self, entropy: &[u8; 32]) -> Result<(SecretKey, PublicKey), CryptoError> {
        let secret = SecretKey::from_slice(entropy).map_err(|_| CryptoError::InvalidKey)?;
        let public = secret.public_key(&self.secp);
        Ok((secret, public))
    }
}
