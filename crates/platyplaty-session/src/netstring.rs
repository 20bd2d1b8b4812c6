//! Netstring framing: `<decimal-length>:<payload>,`
//!
//! Used for every frame on the command socket and for diagnostic events on
//! the renderer's stderr.

use thiserror::Error;

/// Largest payload a peer may declare when decoding.
pub const MAX_PAYLOAD_SIZE: usize = 65536;

/// Digits needed for `MAX_PAYLOAD_SIZE` plus one; a longer prefix without a
/// colon can never become a valid frame.
const MAX_PREFIX_LEN: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetstringError {
    /// The buffer does not hold a full frame yet. Nothing was consumed.
    #[error("incomplete netstring")]
    Incomplete,

    #[error("malformed netstring: {0}")]
    Malformed(String),

    #[error("netstring payload of {declared} bytes exceeds maximum of {max}")]
    PayloadTooLarge { declared: usize, max: usize },
}

/// Frame `payload`. Never fails.
pub fn encode(payload: &str) -> Vec<u8> {
    let len = payload.len().to_string();
    let mut out = Vec::with_capacity(len.len() + payload.len() + 2);
    out.extend_from_slice(len.as_bytes());
    out.push(b':');
    out.extend_from_slice(payload.as_bytes());
    out.push(b',');
    out
}

/// Decode the first frame of `buffer`.
///
/// Returns the payload and the bytes following the frame, so several
/// pipelined frames can be pulled out of one read.
pub fn decode(buffer: &[u8]) -> Result<(String, &[u8]), NetstringError> {
    let colon = match buffer.iter().position(|&b| b == b':') {
        Some(pos) => pos,
        None if buffer.len() > MAX_PREFIX_LEN => {
            return Err(NetstringError::Malformed(
                "length prefix too long".to_string(),
            ))
        }
        None => {
            if let Some(&b) = buffer.iter().find(|b| !b.is_ascii_digit()) {
                return Err(NetstringError::Malformed(format!(
                    "invalid byte {b:#04x} in length prefix"
                )));
            }
            return Err(NetstringError::Incomplete);
        }
    };

    let prefix = &buffer[..colon];
    if prefix.is_empty() || !prefix.iter().all(u8::is_ascii_digit) {
        return Err(NetstringError::Malformed(format!(
            "invalid length prefix {:?}",
            String::from_utf8_lossy(prefix)
        )));
    }
    if prefix.len() > MAX_PREFIX_LEN {
        return Err(NetstringError::Malformed(
            "length prefix too long".to_string(),
        ));
    }

    // At most six ASCII digits, so this cannot overflow.
    let declared = prefix
        .iter()
        .fold(0usize, |acc, &d| acc * 10 + usize::from(d - b'0'));
    if declared > MAX_PAYLOAD_SIZE {
        return Err(NetstringError::PayloadTooLarge {
            declared,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let start = colon + 1;
    let end = start + declared;
    if buffer.len() <= end {
        return Err(NetstringError::Incomplete);
    }
    if buffer[end] != b',' {
        return Err(NetstringError::Malformed(format!(
            "expected ',' after {declared} byte payload, found {:#04x}",
            buffer[end]
        )));
    }

    let payload = std::str::from_utf8(&buffer[start..end])
        .map_err(|e| NetstringError::Malformed(format!("payload is not UTF-8: {e}")))?;

    Ok((payload.to_string(), &buffer[end + 1..]))
}
