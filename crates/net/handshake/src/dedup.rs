use tether_primitives::DedupNonce;

use crate::{HandshakeError, message};

/// `[DEDUP][8-byte big-endian nonce]`.
pub const DEDUP_RECORD_LEN: usize = 9;

pub fn encode_dedup(nonce: DedupNonce) -> [u8; DEDUP_RECORD_LEN] {
    let mut record = [0u8; DEDUP_RECORD_LEN];
    let (marker, body) = record.split_at_mut(1);
    marker.copy_from_slice(&[message::DEDUP]);
    body.copy_from_slice(&nonce.to_be_bytes());
    record
}

pub fn decode_dedup(record: &[u8; DEDUP_RECORD_LEN]) -> Result<DedupNonce, HandshakeError> {
    let (marker, body) = record.split_at(1);
    if marker != [message::DEDUP] {
        return Err(HandshakeError::unexpected("DEDUP", marker.first().copied().unwrap_or(0)));
    }
    let mut nonce = [0u8; 8];
    nonce.copy_from_slice(body);
    Ok(DedupNonce::from_be_bytes(nonce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_dedup_record() {
        let record = encode_dedup(DedupNonce(0x1122_3344_5566_7788));
        assert_eq!(record, [77, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
        assert_eq!(decode_dedup(&record).unwrap(), DedupNonce(0x1122_3344_5566_7788));
    }

    #[test]
    fn test_dedup_wrong_marker() {
        let mut record = encode_dedup(DedupNonce(1));
        record[0] = 3;
        assert_matches!(decode_dedup(&record), Err(HandshakeError::Protocol(_)));
    }
}
