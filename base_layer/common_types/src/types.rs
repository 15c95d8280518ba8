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

pub const FIXED_HASH_SIZE: usize = 32;

/// Digest output used for identifiers, content hashes and commitment values.
pub type FixedHash = [u8; FIXED_HASH_SIZE];

/// Define the explicit public key implementation for the protocol. Escrow participants are
/// identified by compressed secp256k1 points.
pub type PublicKey = bitcoin::secp256k1::PublicKey;

/// Define the explicit secret key implementation for the protocol.
pub type SecretKey = bitcoin::secp256k1::SecretKey;

/// X-only form of a public key, as committed to by Taproot outputs.
pub type XOnlyPublicKey = bitcoin::secp256k1::XOnlyPublicKey;

/// Define the explicit signature implementation for the protocol. Cooperative and arbitrated
/// spends are authorised with BIP-340 Schnorr signatures.
pub type SchnorrSignature = bitcoin::secp256k1::schnorr::Signature;

/// Block heights as reported by the collaborating node.
pub type BlockHeight = u64;

/// Unix timestamps in seconds. Signed, matching the host platform's epoch arithmetic.
pub type EpochSeconds = i64;

pub const COMPRESSED_PUBKEY_SIZE: usize = 33;
