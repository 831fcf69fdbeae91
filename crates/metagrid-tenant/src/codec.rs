//! Identity codec: tenant id <-> keyspace prefix.
//!
//! Ids are non-negative, so the fixed-width big-endian form sorts exactly like
//! the ids themselves and never reaches the `0xff` system keyspace.

use metagrid_core::printable;

use crate::error::{TenantError, TenantResult};

/// Width in bytes of every tenant prefix.
pub const PREFIX_SIZE: usize = std::mem::size_of::<i64>();

pub fn id_to_prefix(id: i64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub fn prefix_to_id(prefix: &[u8]) -> TenantResult<i64> {
    let bytes: [u8; PREFIX_SIZE] = prefix.try_into().map_err(|_| TenantError::InvalidPrefix {
        prefix: printable(prefix),
        reason: format!("expected {PREFIX_SIZE} bytes, found {}", prefix.len()),
    })?;
    let id = i64::from_be_bytes(bytes);
    if id < 0 {
        return Err(TenantError::InvalidPrefix {
            prefix: printable(prefix),
            reason: "negative tenant id".to_string(),
        });
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_inverts_encode() {
        for id in [0, 1, 255, 256, 1 << 40, i64::MAX] {
            assert_eq!(prefix_to_id(&id_to_prefix(id)).unwrap(), id);
        }
    }

    #[test]
    fn prefix_order_matches_id_order() {
        let ids = [0i64, 1, 2, 255, 256, 65_535, 65_536, 1 << 33, i64::MAX];
        for pair in ids.windows(2) {
            assert!(id_to_prefix(pair[0]) < id_to_prefix(pair[1]));
        }
    }

    #[test]
    fn prefix_has_fixed_width() {
        assert_eq!(id_to_prefix(7), vec![0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(matches!(
            prefix_to_id(&[0, 1]),
            Err(TenantError::InvalidPrefix { .. })
        ));
        assert!(prefix_to_id(&[0; 9]).is_err());
        assert!(prefix_to_id(&[0xff; 8]).is_err());
    }
}
