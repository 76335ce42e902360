//! Shared, zero-padded backing storage for polynomials
//!
//! A [`VirtualArray`] stores only the "island" `[start, end)` of a conceptually
//! longer array of length `virtual_size`; every other index reads as zero.
//! Several views may alias one backing buffer (see [`VirtualArray::share`] and
//! [`VirtualArray::shifted_view`]), each carrying its own bounds.
//!
//! Aliasing views do not coordinate writes beyond the lock that keeps the
//! buffer memory-safe: callers must not mutate through one alias while another
//! alias is being read for the same logical value.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ark_ff::Zero;

/// Island of real values inside a zero-padded virtual index range.
#[derive(Debug)]
pub struct VirtualArray<F> {
    start: usize,
    end: usize,
    virtual_size: usize,
    backing: Arc<RwLock<Vec<F>>>,
}

impl<F: Copy + Zero> VirtualArray<F> {
    /// Zero-filled island `[start, start + size)` of a length-`virtual_size` array.
    pub fn zeroed(size: usize, virtual_size: usize, start: usize) -> Self {
        Self::from_island(vec![F::zero(); size], virtual_size, start)
    }

    /// Take ownership of `values` as the island starting at `start`.
    pub fn from_island(values: Vec<F>, virtual_size: usize, start: usize) -> Self {
        let end = start + values.len();
        assert!(
            end <= virtual_size,
            "island [{start}, {end}) exceeds virtual size {virtual_size}"
        );
        Self { start, end, virtual_size, backing: Arc::new(RwLock::new(values)) }
    }

    /// Empty array (no island, zero virtual size).
    pub fn empty() -> Self {
        Self::from_island(Vec::new(), 0, 0)
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn virtual_size(&self) -> usize {
        self.virtual_size
    }

    /// Value at `index`, zero outside the island.
    #[inline]
    pub fn get(&self, index: usize) -> F {
        self.get_with_allowance(index, 0)
    }

    /// Like [`get`](Self::get), but tolerates reading up to `allowance` slots
    /// past `virtual_size` (those read as zero).
    pub fn get_with_allowance(&self, index: usize, allowance: usize) -> F {
        assert!(
            index < self.virtual_size + allowance,
            "index {index} out of virtual range {}",
            self.virtual_size
        );
        if index >= self.start && index < self.end {
            self.read()[index - self.start]
        } else {
            F::zero()
        }
    }

    /// Overwrite the value at `index`, which must lie inside the island.
    pub fn set(&self, index: usize, value: F) {
        assert!(
            index >= self.start && index < self.end,
            "write at {index} outside island [{}, {})",
            self.start,
            self.end
        );
        self.write()[index - self.start] = value;
    }

    /// Copy of the island values.
    pub fn island_to_vec(&self) -> Vec<F> {
        self.read().clone()
    }

    /// Copy of all `virtual_size` values, zero padding included.
    pub fn to_dense_vec(&self) -> Vec<F> {
        let mut out = vec![F::zero(); self.virtual_size];
        let guard = self.read();
        out[self.start..self.end].copy_from_slice(&guard[..self.size()]);
        out
    }

    /// Read access to the island (index 0 is `start`).
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<F>> {
        self.backing.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write access to the island (index 0 is `start`).
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<F>> {
        self.backing.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether `self` and `other` view the same backing buffer.
    pub fn aliases(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.backing, &other.backing)
    }

    /// New view over the same buffer with identical bounds.
    pub fn share(&self) -> Self {
        Self {
            start: self.start,
            end: self.end,
            virtual_size: self.virtual_size,
            backing: Arc::clone(&self.backing),
        }
    }

    /// New view over the same buffer with `start` and `end` each moved down by one.
    ///
    /// Index `i` of the view reads index `i + 1` of `self`.
    pub fn shifted_view(&self) -> Self {
        assert!(self.start >= 1, "cannot shift an island starting at index 0");
        Self {
            start: self.start - 1,
            end: self.end - 1,
            virtual_size: self.virtual_size,
            backing: Arc::clone(&self.backing),
        }
    }

    /// Deep copy with `left_expansion` zeros before the island and
    /// `right_expansion` zeros after it.
    ///
    /// This is the only routine that copies a backing buffer; every polynomial
    /// copy or resize goes through it.
    pub fn expanded_clone(&self, right_expansion: usize, left_expansion: usize) -> Self {
        assert!(
            left_expansion <= self.start,
            "left expansion {left_expansion} would move start {} below zero",
            self.start
        );
        assert!(
            self.end + right_expansion <= self.virtual_size,
            "right expansion {right_expansion} would move end {} past virtual size {}",
            self.end,
            self.virtual_size
        );
        let guard = self.read();
        let mut values = Vec::with_capacity(self.size() + left_expansion + right_expansion);
        values.resize(left_expansion, F::zero());
        values.extend_from_slice(&guard[..self.size()]);
        values.resize(values.len() + right_expansion, F::zero());
        drop(guard);
        Self {
            start: self.start - left_expansion,
            end: self.end + right_expansion,
            virtual_size: self.virtual_size,
            backing: Arc::new(RwLock::new(values)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;

    fn sample() -> VirtualArray<Fr> {
        VirtualArray::from_island(vec![Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)], 8, 2)
    }

    #[test]
    fn reads_outside_island_are_zero() {
        let a = sample();
        assert_eq!(a.get(0), Fr::zero());
        assert_eq!(a.get(2), Fr::from(1u64));
        assert_eq!(a.get(4), Fr::from(3u64));
        assert_eq!(a.get(7), Fr::zero());
        assert_eq!(a.get_with_allowance(8, 1), Fr::zero());
    }

    #[test]
    #[should_panic]
    fn read_past_virtual_size_panics() {
        sample().get(8);
    }

    #[test]
    fn expanded_clone_pads_with_zeros() {
        let a = sample();
        let b = a.expanded_clone(2, 1);
        assert_eq!((b.start(), b.end(), b.virtual_size()), (1, 7, 8));
        assert_eq!(b.island_to_vec()[0], Fr::zero());
        assert_eq!(b.island_to_vec()[5], Fr::zero());
        for i in 0..8 {
            assert_eq!(a.get(i), b.get(i));
        }
        assert!(!a.aliases(&b));
    }

    #[test]
    #[should_panic]
    fn expanded_clone_rejects_negative_start() {
        sample().expanded_clone(0, 3);
    }

    #[test]
    fn shifted_view_aliases_memory() {
        let a = sample();
        let s = a.shifted_view();
        a.set(3, Fr::from(42u64));
        assert_eq!(s.get(2), Fr::from(42u64));
        assert!(a.aliases(&s));
    }
}
