//! Binary-search helpers for sequences kept ordered by a numeric key.
//!
//! Free lists are plain vectors; these keep them ordered without full sorts.
//! Lookup is O(log n), insertion O(n).

/// Returns the first index whose element does not satisfy
/// `before(key(element), value)`.
///
/// With `before = |a, b| a <= b` this is the position after every element
/// whose key is at most `value`; with `a < b` it is the first element whose
/// key is at least `value`.
pub fn insert_position<T, K, F, C>(items: &[T], value: K, key: F, before: C) -> usize
where
    K: Copy,
    F: Fn(&T) -> K,
    C: Fn(K, K) -> bool,
{
    items.partition_point(|item| before(key(item), value))
}

/// Inserts `item` after every element whose key is `<=` its own.
pub fn insert_ordered<T, K, F>(items: &mut Vec<T>, item: T, key: F)
where
    K: Copy + Ord,
    F: Fn(&T) -> K,
{
    let position = insert_position(items, key(&item), &key, |a, b| a <= b);
    items.insert(position, item);
}

/// First index whose key is `>= value`; `items.len()` when there is none.
pub fn first_at_least<T, F>(items: &[T], value: u64, key: F) -> usize
where
    F: Fn(&T) -> u64,
{
    insert_position(items, value, key, |a, b| a < b)
}

/// `out[i]` is the sum of `values[..i]`.
#[must_use]
pub fn sum_of_lower(values: &[u64]) -> Vec<u64> {
    let mut sum = 0u64;
    values
        .iter()
        .map(|&v| {
            let below = sum;
            sum = sum.saturating_add(v);
            below
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_with_inclusive_comparator() {
        let v = [1u64, 3, 3, 5, 8];
        assert_eq!(insert_position(&v, 3, |x| *x, |a, b| a <= b), 3);
        assert_eq!(insert_position(&v, 0, |x| *x, |a, b| a <= b), 0);
        assert_eq!(insert_position(&v, 9, |x| *x, |a, b| a <= b), 5);
    }

    #[test]
    fn first_at_least_finds_lower_bound() {
        let v = [32u64, 64, 128, 256];
        assert_eq!(first_at_least(&v, 1, |x| *x), 0);
        assert_eq!(first_at_least(&v, 64, |x| *x), 1);
        assert_eq!(first_at_least(&v, 65, |x| *x), 2);
        assert_eq!(first_at_least(&v, 257, |x| *x), 4);
        assert_eq!(first_at_least::<u64, _>(&[], 1, |x| *x), 0);
    }

    #[test]
    fn insert_keeps_order_and_appends_after_ties() {
        let mut v: Vec<(u64, char)> = vec![(1, 'a'), (4, 'b')];
        insert_ordered(&mut v, (4, 'c'), |e| e.0);
        insert_ordered(&mut v, (2, 'd'), |e| e.0);
        insert_ordered(&mut v, (0, 'e'), |e| e.0);
        assert_eq!(v, vec![(0, 'e'), (1, 'a'), (2, 'd'), (4, 'b'), (4, 'c')]);
    }

    #[test]
    fn prefix_sums() {
        assert_eq!(sum_of_lower(&[32, 64, 128]), vec![0, 32, 96]);
        assert!(sum_of_lower(&[]).is_empty());
    }
}
