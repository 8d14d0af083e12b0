//! Canonical keys for contender pairings.
//!
//! A pairing is unordered for storage purposes: "1 vs 25" and "25 vs 1" must
//! resolve to the same vote record. The displayed order is kept separately
//! when the last active pairing is persisted.

/// Separator between the two ids in keys and persisted pairings.
pub const PAIR_SEPARATOR: char = ':';

/// The pair sorted ascending.
#[must_use]
pub fn canonical_pair(first_id: i32, second_id: i32) -> (i32, i32) {
    if first_id <= second_id {
        (first_id, second_id)
    } else {
        (second_id, first_id)
    }
}

/// Derive the storage key for an unordered pairing.
///
/// `battle_key(a, b) == battle_key(b, a)` for every pair.
#[must_use]
pub fn battle_key(first_id: i32, second_id: i32) -> String {
    let (low, high) = canonical_pair(first_id, second_id);
    format!("{low}{PAIR_SEPARATOR}{high}")
}

/// Encode an ordered pairing, keeping the display order.
#[must_use]
pub fn encode_pairing(entity_a_id: i32, entity_b_id: i32) -> String {
    format!("{entity_a_id}{PAIR_SEPARATOR}{entity_b_id}")
}

/// Decode a pairing written by [`encode_pairing`] (or [`battle_key`]).
///
/// Returns `None` for anything that is not two integers around the separator.
#[must_use]
pub fn decode_pairing(value: &str) -> Option<(i32, i32)> {
    let (a, b) = value.trim().split_once(PAIR_SEPARATOR)?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_symmetric() {
        let samples = [
            (1, 25),
            (25, 1),
            (0, 0),
            (-3, 7),
            (i32::MIN, i32::MAX),
            (151, 150),
        ];
        for (a, b) in samples {
            assert_eq!(battle_key(a, b), battle_key(b, a), "pair ({a}, {b})");
        }
    }

    #[test]
    fn test_key_is_sorted() {
        assert_eq!(battle_key(25, 1), "1:25");
        assert_eq!(battle_key(-4, -9), "-9:-4");
    }

    #[test]
    fn test_distinct_pairs_get_distinct_keys() {
        assert_ne!(battle_key(1, 25), battle_key(1, 26));
        assert_ne!(battle_key(12, 5), battle_key(1, 25));
    }

    #[test]
    fn test_pairing_keeps_order() {
        let encoded = encode_pairing(25, 1);
        assert_eq!(encoded, "25:1");
        assert_eq!(decode_pairing(&encoded), Some((25, 1)));
        assert_eq!(decode_pairing("-2:-7"), Some((-2, -7)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_pairing(""), None);
        assert_eq!(decode_pairing("12"), None);
        assert_eq!(decode_pairing("a:b"), None);
        assert_eq!(decode_pairing("1:2:3"), None);
    }
}
