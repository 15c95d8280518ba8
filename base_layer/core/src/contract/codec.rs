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

//! Canonical contract serialization.
//!
//! A length-prefixed, field-ordered byte stream: integers are little-endian, lengths are
//! varints, enums are single bytes, absent transaction ids are zero-filled. The `JobContract`
//! stream walks the historical field order (job id, keys, script paths, metadata, state, funding,
//! resolution, rotation, applications, assignment, dispute configuration and record, events) so
//! existing stored contracts keep parsing; dispute evidence and appeals extend the stream in
//! place before the event history.

use std::io::{self, Read, Write};

use bitcoin::{hashes::Hash, ScriptBuf, Txid};
use integer_encoding::{VarIntReader, VarIntWriter};
use mmp_common_types::{
    types::{FixedHash, PublicKey, SchnorrSignature},
    JobId,
    Satoshi,
};
use thiserror::Error;

use crate::{
    contract::{
        application::{ApplicationStatus, WorkerApplication},
        job_contract::{
            DisputeAppeal,
            DisputeConfig,
            DisputeRecord,
            JobContract,
            MiddlemanSummary,
            SelectionMethod,
        },
        keys::{KeyContext, KeyRotationEvent},
        metadata::JobMetadata,
        state::{ContractEvent, JobState, ResolutionPath},
    },
    dispute::evidence::{Evidence, EvidenceType, NotaryAttestation},
    escrow::script::ScriptPaths,
};

/// Upper bound on any single length prefix, protecting decoders from hostile streams.
const MAX_DECODED_LENGTH: u64 = 1_048_576;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid value {value} for {field}")]
    InvalidEnum { field: &'static str, value: u8 },
    #[error("Invalid public key or signature bytes")]
    InvalidKey,
    #[error("Length prefix {len} exceeds the {max} byte decoding bound")]
    LengthExceeded { len: u64, max: u64 },
    #[error("Required field `{0}` missing from the stream")]
    MissingField(&'static str),
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,
}

pub trait CanonicalEncode {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf).expect("vec write is infallible");
        buf
    }
}

pub trait CanonicalDecode: Sized {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError>;

    fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = io::Cursor::new(bytes);
        Self::decode(&mut cursor)
    }
}

fn read_length<R: Read>(reader: &mut R) -> Result<u64, CodecError> {
    let len: u64 = reader.read_varint()?;
    if len > MAX_DECODED_LENGTH {
        return Err(CodecError::LengthExceeded {
            len,
            max: MAX_DECODED_LENGTH,
        });
    }
    Ok(len)
}

fn read_exact<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

// Primitives

impl CanonicalEncode for u8 {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[*self])
    }
}

impl CanonicalDecode for u8 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(read_exact::<_, 1>(reader)?[0])
    }
}

impl CanonicalEncode for u32 {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }
}

impl CanonicalDecode for u32 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(u32::from_le_bytes(read_exact::<_, 4>(reader)?))
    }
}

impl CanonicalEncode for u64 {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }
}

impl CanonicalDecode for u64 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(u64::from_le_bytes(read_exact::<_, 8>(reader)?))
    }
}

impl CanonicalEncode for i64 {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }
}

impl CanonicalDecode for i64 {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(i64::from_le_bytes(read_exact::<_, 8>(reader)?))
    }
}

impl CanonicalEncode for bool {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&[u8::from(*self)])
    }
}

impl CanonicalDecode for bool {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(CodecError::InvalidEnum { field: "bool", value }),
        }
    }
}

impl CanonicalEncode for String {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_varint(self.len() as u64)?;
        writer.write_all(self.as_bytes())
    }
}

impl CanonicalDecode for String {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let len = read_length(reader)?;
        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

impl<T: CanonicalEncode> CanonicalEncode for Vec<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_varint(self.len() as u64)?;
        for item in self {
            item.encode(writer)?;
        }
        Ok(())
    }
}

impl<T: CanonicalDecode> CanonicalDecode for Vec<T> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let len = read_length(reader)?;
        let mut items = Vec::with_capacity(len.min(1_024) as usize);
        for _ in 0..len {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl CanonicalEncode for FixedHash {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self)
    }
}

impl CanonicalDecode for FixedHash {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        read_exact::<_, 32>(reader)
    }
}

impl CanonicalEncode for JobId {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.as_bytes())
    }
}

impl CanonicalDecode for JobId {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(JobId::from_bytes(read_exact::<_, 32>(reader)?))
    }
}

impl CanonicalEncode for Satoshi {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.as_u64().encode(writer)
    }
}

impl CanonicalDecode for Satoshi {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Satoshi::new(u64::decode(reader)?))
    }
}

impl CanonicalEncode for PublicKey {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.serialize())
    }
}

impl CanonicalDecode for PublicKey {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let bytes = read_exact::<_, 33>(reader)?;
        PublicKey::from_slice(&bytes).map_err(|_| CodecError::InvalidKey)
    }
}

impl CanonicalEncode for SchnorrSignature {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.serialize())
    }
}

impl CanonicalDecode for SchnorrSignature {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let bytes = read_exact::<_, 64>(reader)?;
        SchnorrSignature::from_slice(&bytes).map_err(|_| CodecError::InvalidKey)
    }
}

/// Absent transaction ids are written zero-filled, the historical null-txid convention.
impl CanonicalEncode for Option<Txid> {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Some(txid) => writer.write_all(&txid.to_byte_array()),
            None => writer.write_all(&[0u8; 32]),
        }
    }
}

impl CanonicalDecode for Option<Txid> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let bytes = read_exact::<_, 32>(reader)?;
        if bytes == [0u8; 32] {
            Ok(None)
        } else {
            Ok(Some(Txid::from_byte_array(bytes)))
        }
    }
}

impl CanonicalEncode for ScriptBuf {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_varint(self.len() as u64)?;
        writer.write_all(self.as_bytes())
    }
}

impl CanonicalDecode for ScriptBuf {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let len = read_length(reader)?;
        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes)?;
        Ok(ScriptBuf::from_bytes(bytes))
    }
}

impl<T: CanonicalEncode> CanonicalEncode for Option<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Some(value) => {
                1u8.encode(writer)?;
                value.encode(writer)
            },
            None => 0u8.encode(writer),
        }
    }
}

impl<T: CanonicalDecode> CanonicalDecode for Option<T> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(reader)?)),
            value => Err(CodecError::InvalidEnum { field: "option", value }),
        }
    }
}

// Enums as single bytes

impl CanonicalEncode for JobState {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.as_u8().encode(writer)
    }
}

impl CanonicalDecode for JobState {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let value = u8::decode(reader)?;
        JobState::from_u8(value).ok_or(CodecError::InvalidEnum {
            field: "job state",
            value,
        })
    }
}

impl CanonicalEncode for Option<ResolutionPath> {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            None => 0u8.encode(writer),
            Some(path) => (path.as_u8() + 1).encode(writer),
        }
    }
}

impl CanonicalDecode for Option<ResolutionPath> {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        match u8::decode(reader)? {
            0 => Ok(None),
            value => ResolutionPath::from_u8(value - 1)
                .map(Some)
                .ok_or(CodecError::InvalidEnum {
                    field: "resolution path",
                    value,
                }),
        }
    }
}

// Composite types

impl CanonicalEncode for KeyRotationEvent {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.timestamp.encode(writer)?;
        self.is_emergency.encode(writer)?;
        self.reason.encode(writer)
    }
}

impl CanonicalDecode for KeyRotationEvent {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            timestamp: i64::decode(reader)?,
            is_emergency: bool::decode(reader)?,
            reason: String::decode(reader)?,
        })
    }
}

impl CanonicalEncode for KeyContext {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.employer_key.encode(writer)?;
        self.worker_key.encode(writer)?;
        self.middleman_key.encode(writer)?;
        self.aggregated_key.encode(writer)?;
        self.tweak.encode(writer)?;
        self.rotation_count.encode(writer)?;
        self.last_rotation_time.encode(writer)?;
        self.rotation_history.encode(writer)
    }
}

impl CanonicalDecode for KeyContext {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            employer_key: PublicKey::decode(reader)?,
            worker_key: Option::<PublicKey>::decode(reader)?,
            middleman_key: Option::<PublicKey>::decode(reader)?,
            aggregated_key: Option::<PublicKey>::decode(reader)?,
            tweak: Option::<FixedHash>::decode(reader)?,
            rotation_count: u32::decode(reader)?,
            last_rotation_time: i64::decode(reader)?,
            rotation_history: Vec::<KeyRotationEvent>::decode(reader)?,
        })
    }
}

impl CanonicalEncode for ScriptPaths {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.employer_approval.encode(writer)?;
        self.worker_timeout.encode(writer)?;
        self.middleman_resolution.encode(writer)?;
        self.refund.encode(writer)
    }
}

impl CanonicalDecode for ScriptPaths {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            employer_approval: ScriptBuf::decode(reader)?,
            worker_timeout: ScriptBuf::decode(reader)?,
            middleman_resolution: ScriptBuf::decode(reader)?,
            refund: ScriptBuf::decode(reader)?,
        })
    }
}

impl CanonicalEncode for JobMetadata {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.title.encode(writer)?;
        self.description.encode(writer)?;
        self.amount.encode(writer)?;
        self.created_height.encode(writer)?;
        self.created_timestamp.encode(writer)?;
        self.timeout_blocks.encode(writer)?;
        self.requirements.encode(writer)?;
        self.deliverables.encode(writer)
    }
}

impl CanonicalDecode for JobMetadata {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            title: String::decode(reader)?,
            description: String::decode(reader)?,
            amount: Satoshi::decode(reader)?,
            created_height: u64::decode(reader)?,
            created_timestamp: i64::decode(reader)?,
            timeout_blocks: u64::decode(reader)?,
            requirements: String::decode(reader)?,
            deliverables: String::decode(reader)?,
        })
    }
}

impl CanonicalEncode for WorkerApplication {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.worker.encode(writer)?;
        self.proposal.encode(writer)?;
        self.timestamp.encode(writer)?;
        self.status.as_u8().encode(writer)
    }
}

impl CanonicalDecode for WorkerApplication {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            worker: PublicKey::decode(reader)?,
            proposal: String::decode(reader)?,
            timestamp: i64::decode(reader)?,
            status: {
                let value = u8::decode(reader)?;
                ApplicationStatus::from_u8(value).ok_or(CodecError::InvalidEnum {
                    field: "application status",
                    value,
                })?
            },
        })
    }
}

impl CanonicalEncode for ContractEvent {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.timestamp.encode(writer)?;
        self.prev_state.encode(writer)?;
        self.new_state.encode(writer)?;
        self.txid.encode(writer)?;
        self.memo.encode(writer)
    }
}

impl CanonicalDecode for ContractEvent {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            timestamp: i64::decode(reader)?,
            prev_state: JobState::decode(reader)?,
            new_state: JobState::decode(reader)?,
            txid: Option::<Txid>::decode(reader)?,
            memo: String::decode(reader)?,
        })
    }
}

impl CanonicalEncode for DisputeConfig {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.auto_select_middleman.encode(writer)?;
        self.resolution_timeout_blocks.encode(writer)?;
        self.challenge_period_blocks.encode(writer)?;
        self.requires_notary.encode(writer)?;
        self.dispute_window_secs.encode(writer)
    }
}

impl CanonicalDecode for DisputeConfig {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            auto_select_middleman: bool::decode(reader)?,
            resolution_timeout_blocks: u64::decode(reader)?,
            challenge_period_blocks: u64::decode(reader)?,
            requires_notary: bool::decode(reader)?,
            dispute_window_secs: i64::decode(reader)?,
        })
    }
}

impl CanonicalEncode for MiddlemanSummary {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.id.encode(writer)?;
        self.name.encode(writer)?;
        self.pubkey.encode(writer)?;
        self.fee.encode(writer)?;
        self.selection_timestamp.encode(writer)
    }
}

impl CanonicalDecode for MiddlemanSummary {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            id: FixedHash::decode(reader)?,
            name: String::decode(reader)?,
            pubkey: PublicKey::decode(reader)?,
            fee: Satoshi::decode(reader)?,
            selection_timestamp: i64::decode(reader)?,
        })
    }
}

impl CanonicalEncode for NotaryAttestation {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.notary.encode(writer)?;
        self.signature.encode(writer)
    }
}

impl CanonicalDecode for NotaryAttestation {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            notary: PublicKey::decode(reader)?,
            signature: SchnorrSignature::decode(reader)?,
        })
    }
}

impl CanonicalEncode for Evidence {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.urls.encode(writer)?;
        self.content_hashes.encode(writer)?;
        self.notary_sigs.encode(writer)?;
        self.submitter.encode(writer)?;
        self.timestamp.encode(writer)?;
        self.evidence_type.as_u8().encode(writer)?;
        self.seal_hash.encode(writer)?;
        self.timestamp_proof.encode(writer)?;
        self.block_height.encode(writer)?;
        self.block_header_hash.encode(writer)?;
        self.timestamp_verified.encode(writer)?;
        self.content_verified.encode(writer)
    }
}

impl CanonicalDecode for Evidence {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            urls: Vec::<String>::decode(reader)?,
            content_hashes: Vec::<FixedHash>::decode(reader)?,
            notary_sigs: Vec::<NotaryAttestation>::decode(reader)?,
            submitter: PublicKey::decode(reader)?,
            timestamp: i64::decode(reader)?,
            evidence_type: {
                let value = u8::decode(reader)?;
                EvidenceType::from_u8(value).ok_or(CodecError::InvalidEnum {
                    field: "evidence type",
                    value,
                })?
            },
            seal_hash: Option::<FixedHash>::decode(reader)?,
            timestamp_proof: Option::<Vec<u8>>::decode(reader)?,
            block_height: Option::<u64>::decode(reader)?,
            block_header_hash: Option::<FixedHash>::decode(reader)?,
            timestamp_verified: bool::decode(reader)?,
            content_verified: bool::decode(reader)?,
        })
    }
}

impl CanonicalEncode for DisputeAppeal {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.appellant.encode(writer)?;
        self.filed_height.encode(writer)?;
        self.evidence_hash.encode(writer)?;
        self.reason.encode(writer)
    }
}

impl CanonicalDecode for DisputeAppeal {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        Ok(Self {
            appellant: PublicKey::decode(reader)?,
            filed_height: u64::decode(reader)?,
            evidence_hash: FixedHash::decode(reader)?,
            reason: String::decode(reader)?,
        })
    }
}

impl CanonicalEncode for JobContract {
    fn encode<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.job_id.encode(writer)?;
        self.keys.encode(writer)?;
        self.script_paths.encode(writer)?;
        self.metadata.encode(writer)?;
        self.state.encode(writer)?;
        self.funding_txid.encode(writer)?;
        self.funding_vout.encode(writer)?;
        self.resolution_txid.encode(writer)?;
        self.resolution_path.encode(writer)?;
        self.last_key_rotation.encode(writer)?;
        self.worker_applications.encode(writer)?;
        self.assigned_worker.encode(writer)?;
        self.dispute_config.encode(writer)?;
        self.middleman_info.encode(writer)?;

        // Flattened dispute record, followed by its extension fields
        let dispute = self.dispute.as_ref();
        dispute.is_some().encode(writer)?;
        dispute.map(|d| d.timestamp).unwrap_or(0).encode(writer)?;
        self.completion_timestamp.encode(writer)?;
        dispute.map(|d| d.initiator).encode(writer)?;
        dispute.map(|d| d.reason.clone()).unwrap_or_default().encode(writer)?;
        dispute
            .map(|d| d.proposed_by_employer.clone())
            .unwrap_or_default()
            .encode(writer)?;
        dispute
            .map(|d| d.proposed_by_worker.clone())
            .unwrap_or_default()
            .encode(writer)?;
        dispute.map(|d| d.agreed_middleman.is_some()).unwrap_or(false).encode(writer)?;
        dispute.and_then(|d| d.agreed_middleman).encode(writer)?;
        dispute
            .and_then(|d| d.selection_method)
            .map(|m| m.as_u8() + 1)
            .unwrap_or(0)
            .encode(writer)?;
        dispute.map(|d| d.raised_height).unwrap_or(0).encode(writer)?;
        dispute.map(|d| d.evidence.clone()).unwrap_or_default().encode(writer)?;
        dispute.and_then(|d| d.resolved_height).encode(writer)?;
        dispute.and_then(|d| d.appeal.clone()).encode(writer)?;
        dispute.map(|d| d.flagged_for_review).unwrap_or(false).encode(writer)?;

        self.event_history.encode(writer)
    }
}

impl CanonicalDecode for JobContract {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let job_id = JobId::decode(reader)?;
        let keys = KeyContext::decode(reader)?;
        let script_paths = ScriptPaths::decode(reader)?;
        let metadata = JobMetadata::decode(reader)?;
        let state = JobState::decode(reader)?;
        let funding_txid = Option::<Txid>::decode(reader)?;
        let funding_vout = u32::decode(reader)?;
        let resolution_txid = Option::<Txid>::decode(reader)?;
        let resolution_path = Option::<ResolutionPath>::decode(reader)?;
        let last_key_rotation = i64::decode(reader)?;
        let worker_applications = Vec::<WorkerApplication>::decode(reader)?;
        let assigned_worker = Option::<PublicKey>::decode(reader)?;
        let dispute_config = DisputeConfig::decode(reader)?;
        let middleman_info = Option::<MiddlemanSummary>::decode(reader)?;

        let dispute_raised = bool::decode(reader)?;
        let dispute_timestamp = i64::decode(reader)?;
        let completion_timestamp = i64::decode(reader)?;
        let dispute_initiator = Option::<PublicKey>::decode(reader)?;
        let dispute_reason = String::decode(reader)?;
        let proposed_by_employer = Vec::<PublicKey>::decode(reader)?;
        let proposed_by_worker = Vec::<PublicKey>::decode(reader)?;
        let _middleman_agreed = bool::decode(reader)?;
        let agreed_middleman = Option::<PublicKey>::decode(reader)?;
        let selection_method = match u8::decode(reader)? {
            0 => None,
            value => Some(SelectionMethod::from_u8(value - 1).ok_or(CodecError::InvalidEnum {
                field: "selection method",
                value,
            })?),
        };
        let raised_height = u64::decode(reader)?;
        let evidence = Vec::<Evidence>::decode(reader)?;
        let resolved_height = Option::<u64>::decode(reader)?;
        let appeal = Option::<DisputeAppeal>::decode(reader)?;
        let flagged_for_review = bool::decode(reader)?;

        let dispute = if dispute_raised {
            Some(DisputeRecord {
                initiator: dispute_initiator.ok_or(CodecError::MissingField("dispute initiator"))?,
                reason: dispute_reason,
                timestamp: dispute_timestamp,
                raised_height,
                proposed_by_employer,
                proposed_by_worker,
                agreed_middleman,
                selection_method,
                evidence,
                resolved_height,
                appeal,
                flagged_for_review,
            })
        } else {
            None
        };

        let event_history = Vec::<ContractEvent>::decode(reader)?;

        Ok(Self {
            job_id,
            keys,
            script_paths,
            metadata,
            state,
            funding_txid,
            funding_vout,
            resolution_txid,
            resolution_path,
            last_key_rotation,
            worker_applications,
            assigned_worker,
            dispute_config,
            middleman_info,
            dispute,
            completion_timestamp,
            event_history,
        })
    }
}
