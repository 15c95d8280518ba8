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

//! `MMPJ` OP_RETURN anchors for job postings and applications.
//!
//! Layout: `"MMPJ" ‖ version(u8) ‖ type(u8) ‖ payload`. The whole payload is capped at the
//! 80-byte OP_RETURN relay limit and oversized payloads are rejected at construction, so titles
//! and descriptions embedded on chain are abbreviations of the off-chain metadata.

use std::io::{Cursor, Read};

use bitcoin::{
    opcodes::all::OP_RETURN,
    script::{Builder, Instruction, PushBytesBuf},
    ScriptBuf,
};
use integer_encoding::{VarIntReader, VarIntWriter};
use mmp_common_types::{types::PublicKey, JobId, Satoshi};
use thiserror::Error;

use crate::consts::{
    OP_RETURN_PAYLOAD_LIMIT,
    WIRE_MARKER,
    WIRE_TYPE_APPLICATION,
    WIRE_TYPE_POSTING,
    WIRE_VERSION,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Payload of {0} bytes exceeds the {OP_RETURN_PAYLOAD_LIMIT} byte OP_RETURN limit")]
    PayloadTooLarge(usize),
    #[error("Not an MMP marker script")]
    UnknownMarker,
    #[error("Unsupported wire version {0}")]
    UnsupportedVersion(u8),
    #[error("Unknown payload type {0}")]
    UnknownPayloadType(u8),
    #[error("Payload truncated or malformed")]
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPosting {
    pub job_id: JobId,
    pub title: String,
    pub description: String,
    pub amount: Satoshi,
    pub timeout_blocks: u64,
    pub requirements: String,
    pub deliverables: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobApplication {
    pub job_id: JobId,
    pub proposal: String,
    pub worker: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePayload {
    Posting(JobPosting),
    Application(JobApplication),
}

fn write_str(buf: &mut Vec<u8>, value: &str) {
    buf.write_varint(value.len() as u64).expect("vec write is infallible");
    buf.extend_from_slice(value.as_bytes());
}

fn read_str(cursor: &mut Cursor<&[u8]>) -> Result<String, WireError> {
    let len: u64 = cursor.read_varint().map_err(|_| WireError::Malformed)?;
    if len > OP_RETURN_PAYLOAD_LIMIT as u64 {
        return Err(WireError::Malformed);
    }
    let mut bytes = vec![0u8; len as usize];
    cursor.read_exact(&mut bytes).map_err(|_| WireError::Malformed)?;
    String::from_utf8(bytes).map_err(|_| WireError::Malformed)
}

fn finish(payload: Vec<u8>) -> Result<Vec<u8>, WireError> {
    if payload.len() > OP_RETURN_PAYLOAD_LIMIT {
        return Err(WireError::PayloadTooLarge(payload.len()));
    }
    Ok(payload)
}

pub fn encode_posting(posting: &JobPosting) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(OP_RETURN_PAYLOAD_LIMIT);
    buf.extend_from_slice(&WIRE_MARKER);
    buf.push(WIRE_VERSION);
    buf.push(WIRE_TYPE_POSTING);
    buf.extend_from_slice(posting.job_id.as_bytes());
    write_str(&mut buf, &posting.title);
    write_str(&mut buf, &posting.description);
    buf.extend_from_slice(&posting.amount.as_u64().to_le_bytes());
    buf.write_varint(posting.timeout_blocks).expect("vec write is infallible");
    write_str(&mut buf, &posting.requirements);
    write_str(&mut buf, &posting.deliverables);
    finish(buf)
}

pub fn encode_application(application: &JobApplication) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(OP_RETURN_PAYLOAD_LIMIT);
    buf.extend_from_slice(&WIRE_MARKER);
    buf.push(WIRE_VERSION);
    buf.push(WIRE_TYPE_APPLICATION);
    buf.extend_from_slice(application.job_id.as_bytes());
    write_str(&mut buf, &application.proposal);
    buf.extend_from_slice(&application.worker.serialize());
    finish(buf)
}

/// Wrap an encoded payload in an OP_RETURN output script.
pub fn op_return_script(payload: &[u8]) -> Result<ScriptBuf, WireError> {
    if payload.len() > OP_RETURN_PAYLOAD_LIMIT {
        return Err(WireError::PayloadTooLarge(payload.len()));
    }
    let data = PushBytesBuf::try_from(payload.to_vec()).map_err(|_| WireError::PayloadTooLarge(payload.len()))?;
    Ok(Builder::new().push_opcode(OP_RETURN).push_slice(data).into_script())
}

/// Whether a script is an MMP marker output.
pub fn is_mmp_script(script: &ScriptBuf) -> bool {
    extract_payload(script).map(|p| p.starts_with(&WIRE_MARKER)).unwrap_or(false)
}

fn extract_payload(script: &ScriptBuf) -> Option<Vec<u8>> {
    let mut instructions = script.instructions();
    match instructions.next()? {
        Ok(Instruction::Op(op)) if op == OP_RETURN => {},
        _ => return None,
    }
    match instructions.next()? {
        Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes().to_vec()),
        _ => None,
    }
}

pub fn parse_script(script: &ScriptBuf) -> Result<WirePayload, WireError> {
    let payload = extract_payload(script).ok_or(WireError::UnknownMarker)?;
    parse_payload(&payload)
}

pub fn parse_payload(payload: &[u8]) -> Result<WirePayload, WireError> {
    if payload.len() < 6 || payload[..4] != WIRE_MARKER {
        return Err(WireError::UnknownMarker);
    }
    if payload[4] != WIRE_VERSION {
        return Err(WireError::UnsupportedVersion(payload[4]));
    }
    let payload_type = payload[5];
    let mut cursor = Cursor::new(&payload[6..]);
    let mut id_bytes = [0u8; 32];
    cursor.read_exact(&mut id_bytes).map_err(|_| WireError::Malformed)?;
    let job_id = JobId::from_bytes(id_bytes);

    match payload_type {
        t if t == WIRE_TYPE_POSTING => {
            let title = read_str(&mut cursor)?;
            let description = read_str(&mut cursor)?;
            let mut amount_bytes = [0u8; 8];
            cursor.read_exact(&mut amount_bytes).map_err(|_| WireError::Malformed)?;
            let timeout_blocks: u64 = cursor.read_varint().map_err(|_| WireError::Malformed)?;
            let requirements = read_str(&mut cursor)?;
            let deliverables = read_str(&mut cursor)?;
            Ok(WirePayload::Posting(JobPosting {
                job_id,
                title,
                description,
                amount: Satoshi::new(u64::from_le_bytes(amount_bytes)),
                timeout_blocks,
                requirements,
                deliverables,
            }))
        },
        t if t == WIRE_TYPE_APPLICATION => {
            let proposal = read_str(&mut cursor)?;
            let mut key_bytes = [0u8; 33];
            cursor.read_exact(&mut key_bytes).map_err(|_| WireError::Malformed)?;
            let worker = PublicKey::from_slice(&key_bytes).map_err(|_| WireError::Malformed)?;
            Ok(WirePayload::Application(JobApplication {
                job_id,
                proposal,
                worker,
            }))
        },
        other => Err(WireError::UnknownPayloadType(other)),
    }
}
