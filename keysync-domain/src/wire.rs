use thiserror::Error;

/// Widest unsigned integer a peripheral may report.
pub const MAX_UINT_LEN: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed {field}: expected {expected}, got {actual} bytes")]
    MalformedLength {
        field: &'static str,
        expected: &'static str,
        actual: usize,
    },
}

/// Decodes an unsigned little-endian integer of 1 to 8 bytes.
pub fn decode_le_uint(bytes: &[u8]) -> Result<u64, WireError> {
    if bytes.is_empty() || bytes.len() > MAX_UINT_LEN {
        return Err(WireError::MalformedLength {
            field: "integer",
            expected: "1 to 8 bytes",
            actual: bytes.len(),
        });
    }
    let mut buf = [0u8; MAX_UINT_LEN];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}
