//! Per-entity component presence bits.

use smallvec::{smallvec, SmallVec};
use std::fmt;

type Word = u64;

const WORD_BITS: usize = Word::BITS as usize;

/// A growable bit set. Bit `i` is set when the entity carries the component
/// type with identifier `i`.
///
/// Masks of up to one word live inline; larger ones move to the heap.
/// A mask never shrinks, and growth zero-fills the new bits.
#[derive(Clone)]
pub struct Mask {
    words: SmallVec<[Word; 1]>,
}

impl Mask {
    /// Creates an all-zero mask with capacity for one word of bits.
    pub fn new() -> Mask {
        Mask {
            words: smallvec![0],
        }
    }

    /// Returns the number of bits the mask can hold without growing.
    pub fn len(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Returns `true` if the mask stores its bits on the heap.
    pub fn spilled(&self) -> bool {
        self.words.spilled()
    }

    /// Returns the bit at `i`. Bits beyond the capacity read as unset.
    #[inline]
    pub fn get(&self, i: usize) -> bool {
        match self.words.get(i / WORD_BITS) {
            Some(word) => word & (1 << (i % WORD_BITS)) != 0,
            None => false,
        }
    }

    /// Sets the bit at `i`, growing to the next multiple of the word width if needed.
    #[inline]
    pub fn set(&mut self, i: usize) {
        self.resize(i + 1);
        self.words[i / WORD_BITS] |= 1 << (i % WORD_BITS);
    }

    /// Clears the bit at `i`. Clearing a bit beyond the capacity does nothing.
    #[inline]
    pub fn unset(&mut self, i: usize) {
        if let Some(word) = self.words.get_mut(i / WORD_BITS) {
            *word &= !(1 << (i % WORD_BITS));
        }
    }

    /// Grows the mask to hold at least `n_bits` bits. Never shrinks.
    pub fn resize(&mut self, n_bits: usize) {
        let n_words = (n_bits + WORD_BITS - 1) / WORD_BITS;
        if n_words > self.words.len() {
            self.words.resize(n_words, 0);
        }
    }

    /// Clears all bits, keeping the capacity.
    pub fn zero(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Returns `true` if every bit set in `other` is also set in `self`.
    pub fn query_mask(&self, other: &Mask) -> bool {
        other
            .words
            .iter()
            .enumerate()
            .all(|(i, &bits)| bits & !self.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Returns `true` if no bit set in `other` is set in `self`.
    pub fn query_mask_inverse(&self, other: &Mask) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(&a, &b)| a & b == 0)
    }

    /// Returns `true` if no bit is set.
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns an iterator over the indices of set bits in increasing order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(i * WORD_BITS + bit)
            })
        })
    }
}

impl Default for Mask {
    fn default() -> Self {
        Mask::new()
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter_ones()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn starts_zeroed_with_one_word() {
        let mask = Mask::new();

        assert_eq!(mask.len(), WORD_BITS);
        assert!(!mask.spilled());
        assert!((0..WORD_BITS).all(|i| !mask.get(i)));
        assert!(mask.is_zero());
    }

    #[test]
    fn setting_existing_bits_keeps_size() {
        let mut mask = Mask::new();
        for i in 0..WORD_BITS {
            mask.set(i);
            assert!(mask.get(i));
        }
        assert_eq!(mask.len(), WORD_BITS);

        let mut mask = Mask::new();
        mask.resize(WORD_BITS * 2);
        for i in 0..WORD_BITS * 2 {
            mask.set(i);
        }
        assert_eq!(mask.len(), WORD_BITS * 2);
    }

    #[test]
    fn growth_rounds_to_words_and_keeps_bits() {
        let mut mask = Mask::new();
        mask.set(0);
        mask.set(WORD_BITS);

        assert_eq!(mask.len(), WORD_BITS * 2);
        assert!(mask.spilled());
        assert!(mask.get(0));
        assert!(mask.get(WORD_BITS));
        assert!(!mask.get(WORD_BITS + 1));

        mask.resize(1);
        assert_eq!(mask.len(), WORD_BITS * 2);
    }

    #[test]
    fn out_of_range_access_does_not_grow() {
        let mut mask = Mask::new();
        mask.set(3);

        assert!(!mask.get(WORD_BITS * 5));
        mask.unset(WORD_BITS * 5);
        assert_eq!(mask.len(), WORD_BITS);
        assert!(mask.get(3));

        mask.unset(3);
        assert!(mask.is_zero());
    }

    #[test]
    fn zero_clears_everything() {
        let mut mask = Mask::new();
        mask.set(1);
        mask.set(WORD_BITS * 3 + 2);
        mask.zero();

        assert!(mask.is_zero());
        assert_eq!(mask.len(), WORD_BITS * 4);
    }

    #[test]
    fn iter_ones_lists_set_bits() {
        let mut mask = Mask::new();
        for i in [0, 5, 63, 64, 130] {
            mask.set(i);
        }
        assert_eq!(mask.iter_ones().collect::<Vec<_>>(), vec![0, 5, 63, 64, 130]);
    }

    #[test]
    fn mask_queries_match_set_semantics() {
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let a_bits: Vec<usize> = (0..rng.gen_range(0..8)).map(|_| rng.gen_range(0..200)).collect();
            let b_bits: Vec<usize> = (0..rng.gen_range(0..8)).map(|_| rng.gen_range(0..200)).collect();

            let mut a = Mask::new();
            let mut b = Mask::new();
            a_bits.iter().for_each(|&i| a.set(i));
            b_bits.iter().for_each(|&i| b.set(i));

            let contains_all = b_bits.iter().all(|i| a_bits.contains(i));
            let contains_none = b_bits.iter().all(|i| !a_bits.contains(i));

            assert_eq!(a.query_mask(&b), contains_all);
            assert_eq!(a.query_mask_inverse(&b), contains_none);
        }
    }
}
