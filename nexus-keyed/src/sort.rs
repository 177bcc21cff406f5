//! Sorting over index permutations.
//!
//! Both orderings of a [`KeyedList`](crate::KeyedList) are reordered the same
//! way: sort a vector of slot indices with a comparator that looks the slots
//! up, then apply the resulting permutation to every parallel vector.
//!
//! The sort is a quicksort with a midpoint pivot. Midpoint pivots handle
//! already-sorted and reverse-sorted input well but can be driven quadratic
//! by crafted input, so recursion depth is capped at `2 * log2(n)` and
//! partitions past the cap fall back to `sort_unstable_by`, keeping the worst
//! case at O(n log n).

use core::cmp::Ordering;

/// Sorts `perm` so that `cmp(perm[i], perm[i + 1])` is never `Greater`.
pub(crate) fn sort_permutation<F>(perm: &mut [usize], mut cmp: F)
where
    F: FnMut(usize, usize) -> Ordering,
{
    if perm.len() < 2 {
        return;
    }
    let depth = 2 * (usize::BITS - perm.len().leading_zeros()) as usize;
    quicksort(perm, &mut cmp, depth);
}

fn quicksort<F>(mut v: &mut [usize], cmp: &mut F, mut depth: usize)
where
    F: FnMut(usize, usize) -> Ordering,
{
    while v.len() > 1 {
        if depth == 0 {
            v.sort_unstable_by(|&a, &b| cmp(a, b));
            return;
        }
        depth -= 1;

        let split = partition(v, cmp) + 1;
        let (left, right) = core::mem::take(&mut v).split_at_mut(split);

        // Recurse into the smaller half, loop on the larger.
        if left.len() < right.len() {
            quicksort(left, cmp, depth);
            v = right;
        } else {
            quicksort(right, cmp, depth);
            v = left;
        }
    }
}

/// Hoare partition around the midpoint element.
///
/// Returns `j` such that every element of `v[..=j]` is not greater than every
/// element of `v[j + 1..]`. For a consistent comparator `j < v.len() - 1`.
fn partition<F>(v: &mut [usize], cmp: &mut F) -> usize
where
    F: FnMut(usize, usize) -> Ordering,
{
    let last = v.len() - 1;
    let pivot = v[last / 2];
    let mut i = 0;
    let mut j = last;

    loop {
        while i < last && cmp(v[i], pivot) == Ordering::Less {
            i += 1;
        }
        while j > 0 && cmp(v[j], pivot) == Ordering::Greater {
            j -= 1;
        }
        if i >= j {
            return j.min(last.saturating_sub(1));
        }
        v.swap(i, j);
        i += 1;
        j -= 1;
    }
}

/// Reorders `items` so that `new[i] == old[perm[i]]`.
///
/// Follows each cycle of the permutation with swaps. `perm` is consumed: on
/// return it is the identity.
pub(crate) fn apply_permutation<T>(items: &mut [T], perm: &mut [usize]) {
    debug_assert_eq!(items.len(), perm.len());
    for start in 0..perm.len() {
        let mut cur = start;
        loop {
            let next = perm[cur];
            perm[cur] = cur;
            if next == start || next == cur {
                break;
            }
            items.swap(cur, next);
            cur = next;
        }
    }
}

/// Inverse of a permutation: `inv[perm[i]] == i`.
pub(crate) fn invert(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}
