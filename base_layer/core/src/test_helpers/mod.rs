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

//! Deterministic collaborator doubles for tests: a settable clock, a static chain view, seeded
//! entropy, an in-memory content fetcher and a recording broadcaster.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
        Mutex,
    },
};

use bitcoin::{Transaction, Txid};
use mmp_common_types::types::{BlockHeight, EpochSeconds, FixedHash};

use crate::{
    crypto::Secp256k1Adapter,
    interfaces::{
        BlockHeader,
        BroadcastError,
        ChainView,
        Clock,
        Collaborators,
        ContentFetcher,
        EntropySource,
        FetchError,
    },
};

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn at(now: EpochSeconds) -> Self {
        Self { now: AtomicI64::new(now) }
    }

    pub fn set(&self, now: EpochSeconds) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: EpochSeconds) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> EpochSeconds {
        self.now.load(Ordering::SeqCst)
    }
}

/// A chain view backed by a settable height and an explicit header map. OTS proofs verify iff
/// non-empty, which lets tests choose the verification tier they exercise.
#[derive(Debug, Default)]
pub struct StaticChainView {
    height: AtomicU64,
    headers: Mutex<HashMap<BlockHeight, BlockHeader>>,
}

impl StaticChainView {
    pub fn new(height: BlockHeight) -> Self {
        Self {
            height: AtomicU64::new(height),
            headers: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_height(&self, height: BlockHeight) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn advance_blocks(&self, blocks: u64) {
        self.height.fetch_add(blocks, Ordering::SeqCst);
    }

    pub fn set_header(&self, height: BlockHeight, time: EpochSeconds, hash: FixedHash) {
        self.headers
            .lock()
            .expect("header lock poisoned")
            .insert(height, BlockHeader { time, hash });
    }
}

impl ChainView for StaticChainView {
    fn current_height(&self) -> BlockHeight {
        self.height.load(Ordering::SeqCst)
    }

    fn header_at(&self, height: BlockHeight) -> Option<BlockHeader> {
        self.headers.lock().expect("header lock poisoned").get(&height).copied()
    }

    fn verify_ots_proof(&self, proof: &[u8], _claimed_time: EpochSeconds) -> bool {
        !proof.is_empty()
    }
}

/// Deterministic entropy: a counter hashed into each request. Distinct fills, reproducible runs.
#[derive(Debug, Default)]
pub struct SeededEntropy {
    counter: AtomicU64,
    seed: u64,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            counter: AtomicU64::new(0),
            seed,
        }
    }
}

impl EntropySource for SeededEntropy {
    fn fill(&self, buf: &mut [u8]) {
        use bitcoin::hashes::{sha256, Hash, HashEngine};
        let nonce = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut offset = 0;
        let mut round = 0u64;
        while offset < buf.len() {
            let mut engine = sha256::Hash::engine();
            engine.input(&self.seed.to_le_bytes());
            engine.input(&nonce.to_le_bytes());
            engine.input(&round.to_le_bytes());
            let digest = sha256::Hash::from_engine(engine).to_byte_array();
            let take = digest.len().min(buf.len() - offset);
            buf[offset..offset + take].copy_from_slice(&digest[..take]);
            offset += take;
            round += 1;
        }
    }
}

/// Serves evidence content from memory.
#[derive(Debug, Default)]
pub struct InMemoryFetcher {
    content: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryFetcher {
    pub fn insert<S: Into<String>>(&self, url: S, bytes: Vec<u8>) {
        self.content.lock().expect("fetcher lock poisoned").insert(url.into(), bytes);
    }
}

impl ContentFetcher for InMemoryFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.content
            .lock()
            .expect("fetcher lock poisoned")
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

/// Remembers every submitted transaction and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    submitted: Mutex<Vec<Transaction>>,
    failure: Mutex<Option<BroadcastError>>,
}

impl RecordingBroadcaster {
    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().expect("broadcaster lock poisoned").clone()
    }

    pub fn fail_with(&self, error: BroadcastError) {
        *self.failure.lock().expect("broadcaster lock poisoned") = Some(error);
    }
}

impl crate::interfaces::TxBroadcaster for RecordingBroadcaster {
    fn submit(&self, tx: &Transaction) -> Result<Txid, BroadcastError> {
        if let Some(error) = self.failure.lock().expect("broadcaster lock poisoned").clone() {
            return Err(error);
        }
        let txid = tx.compute_txid();
        self.submitted.lock().expect("broadcaster lock poisoned").push(tx.clone());
        Ok(txid)
    }
}

/// A collaborator bundle over the doubles, returning handles to the clock and chain so tests can
/// steer time and height.
pub fn test_collaborators(
    start_time: EpochSeconds,
    start_height: BlockHeight,
) -> (Collaborators, Arc<FixedClock>, Arc<StaticChainView>) {
    let clock = Arc::new(FixedClock::at(start_time));
    let chain = Arc::new(StaticChainView::new(start_height));
    let collaborators = Collaborators::new(
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&chain) as Arc<dyn ChainView>,
        Arc::new(SeededEntropy::new(start_time as u64 ^ start_height)),
        Arc::new(Secp256k1Adapter::new()),
    );
    (collaborators, clock, chain)
}
