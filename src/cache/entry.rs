use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::proto::{DecodeError, OpCode, ResourceRecord, ResponseCode};

/// Current layout of a serialized [`CacheEntry`].
///
/// `version:u8 | opcode:u8 | rcode:u8 | ancount:u16 | ancount * RR`
const VERSION: u8 = 1;

const HEADER_LEN: usize = 5;

/// The part of an upstream response that is kept in the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    pub opcode: OpCode,
    pub response_code: ResponseCode,
    pub answers: Vec<ResourceRecord>,
}

#[derive(Clone, Debug, Error)]
pub enum EntryError {
    #[error("unsupported cache entry version {0}")]
    Version(u8),
    #[error("cache entry header is truncated")]
    Header,
    #[error("invalid opcode {0} in cache entry")]
    OpCode(u8),
    #[error("invalid response code {0} in cache entry")]
    ResponseCode(u8),
    #[error("invalid records in cache entry: {0}")]
    Records(#[from] DecodeError),
    #[error("{0} trailing bytes after cache entry")]
    TrailingBytes(usize),
}

impl CacheEntry {
    pub fn encode(&self) -> Bytes {
        let len = HEADER_LEN
            + self
                .answers
                .iter()
                .map(ResourceRecord::encoded_len)
                .sum::<usize>();

        let mut buf = BytesMut::with_capacity(len);
        buf.put_u8(VERSION);
        buf.put_u8(self.opcode.to_u16() as u8);
        buf.put_u8(self.response_code.to_u16() as u8);
        buf.put_u16(self.answers.len() as u16);

        for answer in &self.answers {
            answer.encode(&mut buf);
        }

        buf.freeze()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, EntryError> {
        let &[version, opcode, rcode, an_hi, an_lo, ..] = buf else {
            return Err(EntryError::Header);
        };

        if version != VERSION {
            return Err(EntryError::Version(version));
        }

        let opcode = OpCode::from_u16(opcode.into()).ok_or(EntryError::OpCode(opcode))?;
        let response_code =
            ResponseCode::from_u16(rcode.into()).ok_or(EntryError::ResponseCode(rcode))?;
        let ancount = u16::from_be_bytes([an_hi, an_lo]);

        let body = &buf[HEADER_LEN..];
        let (answers, consumed) = ResourceRecord::decode_records(body, ancount)?;
        if consumed != body.len() {
            return Err(EntryError::TrailingBytes(body.len() - consumed));
        }

        Ok(Self {
            opcode,
            response_code,
            answers,
        })
    }
}
