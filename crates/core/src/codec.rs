use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::RecordId;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer ended after {had} bytes, needed {needed}")]
    ShortBuffer { needed: usize, had: usize },

    #[error("invalid encoding: {0}")]
    Invalid(String),
}

/// Byte-oriented codec for index keys and values.
///
/// Encodings are length-self-describing: `decode` reports how many bytes it
/// consumed, so encoded values can be concatenated without outer framing.
/// All multi-byte integers are little-endian, matching the store header.
pub trait Codec: Sized {
    /// Number of bytes `encode` will append for this value.
    fn encoded_len(&self) -> usize;

    fn encode(&self, buf: &mut Vec<u8>);

    fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError>;
}

fn take<const N: usize>(buf: &[u8]) -> Result<[u8; N], CodecError> {
    if buf.len() < N {
        return Err(CodecError::ShortBuffer {
            needed: N,
            had: buf.len(),
        });
    }

    let mut out = [0u8; N];
    out.copy_from_slice(&buf[..N]);
    Ok(out)
}

impl Codec for i64 {
    fn encoded_len(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let raw = take::<8>(buf)?;
        Ok((i64::from_le_bytes(raw), 8))
    }
}

impl Codec for u32 {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let raw = take::<4>(buf)?;
        Ok((u32::from_le_bytes(raw), 4))
    }
}

impl Codec for String {
    fn encoded_len(&self) -> usize {
        4 + self.len()
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
        buf.extend_from_slice(self.as_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let len = u32::from_le_bytes(take::<4>(buf)?) as usize;

        if buf.len() < 4 + len {
            return Err(CodecError::ShortBuffer {
                needed: 4 + len,
                had: buf.len(),
            });
        }

        let text = std::str::from_utf8(&buf[4..4 + len])
            .map_err(|x| CodecError::Invalid(x.to_string()))?;

        Ok((text.to_owned(), 4 + len))
    }
}

impl Codec for RecordId {
    fn encoded_len(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.raw().to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let (raw, used) = i64::decode(buf)?;

        if raw < 0 {
            return Ok((RecordId::EMPTY, used));
        }

        Ok((RecordId::new(raw), used))
    }
}

/// Timestamps are persisted as epoch milliseconds.
impl Codec for DateTime<Utc> {
    fn encoded_len(&self) -> usize {
        8
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.timestamp_millis().to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let (millis, used) = i64::decode(buf)?;

        let value = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| CodecError::Invalid(format!("timestamp {millis} out of range")))?;

        Ok((value, used))
    }
}
