//! Lower-bound binary search over an abstract comparator.
//!
//! Used by both [`crate::bucket::Bucket`] (comparator indexes into the
//! arena's entries) and [`crate::series::Series`] (comparator indexes into
//! the sorted bucket list by id). On an exact match the search returns
//! *some* index where the comparator read zero — not necessarily the first
//! or last — matching the source behaviour spec.md §4.2 describes. Callers
//! that need leftmost/rightmost-on-tie semantics must walk linearly from the
//! returned position themselves (see `bucket::range_offsets`).

use std::cmp::Ordering;

/// Find the smallest index `k` in `[0, len]` such that inserting at `k`
/// preserves the order `cmp` describes, where `cmp(i)` compares `item[i]`
/// against the search key (`Less` if `item[i] < key`, `Greater` if
/// `item[i] > key`, `Equal` on a match).
///
/// If `cmp(i) == Equal` for some `i`, the search may return that `i`
/// directly instead of continuing toward the leftmost equal index.
pub fn lower_bound(len: usize, mut cmp: impl FnMut(usize) -> Ordering) -> usize {
    let mut lo = 0usize;
    let mut hi = len;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match cmp(mid) {
            Ordering::Equal => return mid,
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
        }
    }
    lo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(xs: &[i64], key: i64) -> usize {
        lower_bound(xs.len(), |i| xs[i].cmp(&key))
    }

    #[test]
    fn empty_slice_returns_zero() {
        assert_eq!(search(&[], 5), 0);
    }

    #[test]
    fn finds_insertion_point_with_no_match() {
        assert_eq!(search(&[1, 3, 5, 7], 4), 2);
        assert_eq!(search(&[1, 3, 5, 7], 0), 0);
        assert_eq!(search(&[1, 3, 5, 7], 8), 4);
    }

    #[test]
    fn exact_match_returns_some_equal_index() {
        let xs = [1, 3, 3, 3, 7];
        let idx = search(&xs, 3);
        assert_eq!(xs[idx], 3);
    }
}
