//! Positional ordering allocator
//!
//! Board entities are ordered by a gapped integer key. Moving an entity
//! computes one new key from its neighbours at the destination; siblings
//! are never renumbered.

/// Spacing used when appending or prepending
pub const ORDER_STEP: i64 = 1000;

/// Compute the sort key for an entity dropped at `dest_index`.
///
/// `siblings` are the keys of the destination group in ascending order,
/// without the moved entity. `dest_index` is clamped to `0..=len`.
///
/// - between two neighbours: the floor midpoint when the gap allows it,
///   otherwise `prev + 1` (which may tie with `next`; ties list by id)
/// - after the last sibling: `prev + ORDER_STEP`
/// - before the first sibling: `next - ORDER_STEP`
/// - empty group: `0`
pub fn compute_next_status_order(siblings: &[i64], dest_index: i64) -> i64 {
    let index = dest_index.clamp(0, siblings.len() as i64) as usize;
    let prev = index.checked_sub(1).map(|i| siblings[i]);
    let next = siblings.get(index).copied();

    match (prev, next) {
        (Some(prev), Some(next)) => {
            let gap = next.saturating_sub(prev);
            if gap > 1 {
                prev + gap / 2
            } else {
                prev.saturating_add(1)
            }
        }
        (Some(prev), None) => prev.saturating_add(ORDER_STEP),
        (None, Some(next)) => next.saturating_sub(ORDER_STEP),
        (None, None) => 0,
    }
}

/// Key for appending after the given siblings
pub fn append_order(siblings: &[i64]) -> i64 {
    compute_next_status_order(siblings, siblings.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_group_is_zero() {
        assert_eq!(compute_next_status_order(&[], 0), 0);
        assert_eq!(compute_next_status_order(&[], 7), 0);
        assert_eq!(compute_next_status_order(&[], -3), 0);
    }

    #[test]
    fn test_midpoint_between_neighbours() {
        assert_eq!(compute_next_status_order(&[1000, 5000], 1), 3000);
        assert_eq!(compute_next_status_order(&[0, 3], 1), 1);
        assert_eq!(compute_next_status_order(&[-1000, 0], 1), -500);
    }

    #[test]
    fn test_adjacent_neighbours_take_prev_plus_one() {
        assert_eq!(compute_next_status_order(&[1000, 1001], 1), 1001);
        assert_eq!(compute_next_status_order(&[5, 5], 1), 6);
    }

    #[test]
    fn test_index_past_end_appends() {
        assert_eq!(compute_next_status_order(&[1000, 5000], 2), 6000);
        assert_eq!(compute_next_status_order(&[1000, 5000], 99), 6000);
        assert_eq!(append_order(&[0]), 1000);
        assert_eq!(append_order(&[]), 0);
    }

    #[test]
    fn test_index_before_start_prepends() {
        assert_eq!(compute_next_status_order(&[1000, 5000], 0), 0);
        assert_eq!(compute_next_status_order(&[1000, 5000], -4), 0);
        assert_eq!(compute_next_status_order(&[0], -1), -1000);
    }

    #[test]
    fn test_extreme_keys_do_not_overflow() {
        assert_eq!(compute_next_status_order(&[i64::MAX], 1), i64::MAX);
        assert_eq!(compute_next_status_order(&[i64::MIN], 0), i64::MIN);
        assert_eq!(
            compute_next_status_order(&[i64::MIN, i64::MAX], 1),
            i64::MIN + (i64::MAX / 2)
        );
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn sorted_keys() -> impl Strategy<Value = Vec<i64>> {
            prop::collection::vec(-1_000_000i64..1_000_000, 0..20).prop_map(|mut v| {
                v.sort();
                v.dedup();
                v
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn key_respects_neighbours(keys in sorted_keys(), index in -5i64..30) {
                let key = compute_next_status_order(&keys, index);
                let i = index.clamp(0, keys.len() as i64) as usize;
                if i > 0 {
                    prop_assert!(key > keys[i - 1]);
                }
                if i < keys.len() && (i == 0 || keys[i] - keys[i - 1] > 1) {
                    prop_assert!(key < keys[i]);
                }
            }

            #[test]
            fn past_end_is_last_plus_step(keys in sorted_keys(), extra in 0i64..10) {
                prop_assume!(!keys.is_empty());
                let key = compute_next_status_order(&keys, keys.len() as i64 + extra);
                prop_assert_eq!(key, keys[keys.len() - 1] + ORDER_STEP);
            }

            #[test]
            fn below_zero_is_first_minus_step(keys in sorted_keys(), below in 1i64..10) {
                prop_assume!(!keys.is_empty());
                prop_assert_eq!(compute_next_status_order(&keys, -below), keys[0] - ORDER_STEP);
            }

            #[test]
            fn inserting_keeps_order_sorted(keys in sorted_keys(), index in 0i64..25) {
                let key = compute_next_status_order(&keys, index);
                let i = index.clamp(0, keys.len() as i64) as usize;
                let mut after = keys.clone();
                after.insert(i, key);
                prop_assert!(after.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }
}
