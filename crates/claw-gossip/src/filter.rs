//! Counting bloom filter used to summarize the keys a store holds.
//!
//! Each slot is a saturating counter `bits_per_entry` wide. Counters make
//! removal possible, which is how a node diffs a peer's filter against its
//! own contents: every local key is removed from the peer's filter and what
//! remains approximates the keys the peer has that we lack.

use crate::error::{GossipError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;

/// A counting bloom filter over string keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FilterParts")]
pub struct Filter {
    /// Number of slots.
    m: u32,
    /// Number of hash functions.
    k: u32,
    /// Width of each counter in bits.
    bits_per_entry: u32,
    /// Saturation value of a counter.
    max_count: u8,
    slots: Vec<u8>,
}

/// Unvalidated filter as received from a peer.
#[derive(Deserialize)]
struct FilterParts {
    m: u32,
    k: u32,
    bits_per_entry: u32,
    max_count: u8,
    slots: Vec<u8>,
}

impl TryFrom<FilterParts> for Filter {
    type Error = GossipError;

    fn try_from(parts: FilterParts) -> Result<Self> {
        validate_bits(parts.bits_per_entry)?;
        if parts.m == 0 || parts.k == 0 {
            return Err(GossipError::InvalidFilterParameters {
                reason: format!("slots ({}) and hashes ({}) must be > 0", parts.m, parts.k),
            });
        }
        if parts.slots.len() != parts.m as usize {
            return Err(GossipError::InvalidFilterParameters {
                reason: format!(
                    "slot count {} does not match declared size {}",
                    parts.slots.len(),
                    parts.m
                ),
            });
        }
        if parts.max_count != max_count_for(parts.bits_per_entry) {
            return Err(GossipError::InvalidFilterParameters {
                reason: format!(
                    "max count {} does not match {} bits per entry",
                    parts.max_count, parts.bits_per_entry
                ),
            });
        }
        Ok(Self {
            m: parts.m,
            k: parts.k,
            bits_per_entry: parts.bits_per_entry,
            max_count: parts.max_count,
            slots: parts.slots,
        })
    }
}

fn validate_bits(bits_per_entry: u32) -> Result<()> {
    if bits_per_entry == 0 || bits_per_entry > 8 {
        return Err(GossipError::InvalidFilterParameters {
            reason: format!("number of bits ({bits_per_entry}) must be >= 1 and <= 8"),
        });
    }
    Ok(())
}

const fn max_count_for(bits_per_entry: u32) -> u8 {
    ((1u32 << bits_per_entry) - 1) as u8
}

/// Computes the optimal slot and hash counts for `n` insertions at a
/// false-positive rate of `max_fp`.
fn optimal_values(n: u32, max_fp: f64) -> (u32, u32) {
    let n = f64::from(n);
    let m = (-n * max_fp.ln() / (LN_2 * LN_2)).ceil();
    let k = (LN_2 * m / n).ceil().max(1.0);
    (m.min(f64::from(u32::MAX)) as u32, k as u32)
}

impl Filter {
    /// Creates a filter sized for `expected` insertions.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError::InvalidFilterParameters`] unless
    /// `expected > 0`, `1 <= bits_per_entry <= 8` and `0 < max_fp < 1`.
    pub fn new(expected: u32, bits_per_entry: u32, max_fp: f64) -> Result<Self> {
        if expected == 0 {
            return Err(GossipError::InvalidFilterParameters {
                reason: "number of insertions (N) must be > 0".to_string(),
            });
        }
        validate_bits(bits_per_entry)?;
        if !(max_fp > 0.0 && max_fp < 1.0) {
            return Err(GossipError::InvalidFilterParameters {
                reason: format!("max false positive rate must be in (0, 1): {max_fp}"),
            });
        }

        let (m, k) = optimal_values(expected, max_fp);
        Ok(Self {
            m,
            k,
            bits_per_entry,
            max_count: max_count_for(bits_per_entry),
            slots: vec![0; m as usize],
        })
    }

    /// Returns the number of slots.
    #[must_use]
    pub const fn slots(&self) -> u32 {
        self.m
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub const fn hashes(&self) -> u32 {
        self.k
    }

    /// Returns the counter width in bits.
    #[must_use]
    pub const fn bits_per_entry(&self) -> u32 {
        self.bits_per_entry
    }

    /// Adds a key.
    pub fn add_key(&mut self, key: &str) {
        for pos in self.positions(key) {
            let slot = &mut self.slots[pos];
            if *slot < self.max_count {
                *slot += 1;
            }
        }
    }

    /// Removes a key. Saturated counters are left alone since their true
    /// count is unknown.
    pub fn remove_key(&mut self, key: &str) {
        for pos in self.positions(key) {
            let slot = &mut self.slots[pos];
            if *slot > 0 && *slot < self.max_count {
                *slot -= 1;
            }
        }
    }

    /// Returns true if the key is probably present.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.positions(key).into_iter().all(|pos| self.slots[pos] > 0)
    }

    /// Estimates the number of distinct keys currently represented, from the
    /// fraction of non-zero slots.
    #[must_use]
    pub fn approximate_insertions(&self) -> u32 {
        let set = self.slots.iter().filter(|slot| **slot > 0).count();
        let m = f64::from(self.m);
        let set = (set as f64).min(m - 0.5);
        let estimate = -(m / f64::from(self.k)) * (1.0 - set / m).ln();
        estimate.round().max(0.0) as u32
    }

    fn positions(&self, key: &str) -> Vec<usize> {
        slot_positions(self.m, self.k, key)
    }
}

/// Slot indices for a key, derived from one blake3 digest by double hashing.
fn slot_positions(m: u32, k: u32, key: &str) -> Vec<usize> {
    let digest = blake3::hash(key.as_bytes());
    let bytes = digest.as_bytes();
    let mut h1 = [0u8; 8];
    let mut h2 = [0u8; 8];
    h1.copy_from_slice(&bytes[..8]);
    h2.copy_from_slice(&bytes[8..16]);
    let h1 = u64::from_le_bytes(h1);
    let h2 = u64::from_le_bytes(h2) | 1;
    let m = u64::from(m);

    (0..k)
        .map(|i| (h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % m) as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("node.{i}.status")).collect()
    }

    #[test_case(0, 4, 0.025 ; "zero insertions")]
    #[test_case(10, 0, 0.025 ; "zero bits")]
    #[test_case(10, 9, 0.025 ; "too many bits")]
    #[test_case(10, 4, 0.0 ; "zero false positive rate")]
    #[test_case(10, 4, 1.0 ; "certain false positive")]
    #[test_case(10, 4, f64::NAN ; "nan false positive rate")]
    fn invalid_parameters_are_rejected(n: u32, bits: u32, max_fp: f64) {
        let err = Filter::new(n, bits, max_fp).unwrap_err();
        assert!(matches!(err, GossipError::InvalidFilterParameters { .. }));
    }

    #[test]
    fn sizing_follows_optimal_formula() {
        let filter = Filter::new(100, 4, 0.025).unwrap();
        assert_eq!(filter.slots(), 768);
        assert_eq!(filter.hashes(), 6);
        assert_eq!(filter.bits_per_entry(), 4);
    }

    #[test]
    fn empty_filter_estimates_zero() {
        let filter = Filter::new(50, 4, 0.025).unwrap();
        assert_eq!(filter.approximate_insertions(), 0);
        assert!(!filter.has_key("anything"));
    }

    #[test]
    fn added_keys_are_present() {
        let mut filter = Filter::new(100, 4, 0.025).unwrap();
        for key in keys(100) {
            filter.add_key(&key);
        }
        for key in keys(100) {
            assert!(filter.has_key(&key), "missing {key}");
        }
    }

    #[test]
    fn estimate_tracks_insertions() {
        let mut filter = Filter::new(200, 4, 0.025).unwrap();
        for key in keys(200) {
            filter.add_key(&key);
        }
        let estimate = filter.approximate_insertions();
        assert!((170..=230).contains(&estimate), "estimate {estimate}");
    }

    #[test]
    fn removing_everything_empties_the_filter() {
        let mut filter = Filter::new(100, 4, 0.025).unwrap();
        for key in keys(100) {
            filter.add_key(&key);
        }
        for key in keys(100) {
            filter.remove_key(&key);
        }
        assert_eq!(filter.approximate_insertions(), 0);
    }

    #[test]
    fn removing_absent_keys_from_empty_filter_is_harmless() {
        let mut filter = Filter::new(10, 4, 0.025).unwrap();
        filter.remove_key("never-added");
        assert_eq!(filter.approximate_insertions(), 0);
    }

    #[test]
    fn one_bit_counters_saturate_and_stick() {
        let mut filter = Filter::new(10, 1, 0.025).unwrap();
        filter.add_key("a");
        filter.remove_key("a");
        assert!(filter.has_key("a"));
    }

    #[test]
    fn fully_saturated_estimate_is_finite() {
        let mut filter = Filter::new(1, 4, 0.5).unwrap();
        for key in keys(50) {
            filter.add_key(&key);
        }
        let estimate = filter.approximate_insertions();
        assert!(estimate > 0);
        assert!(estimate < u32::MAX);
    }

    #[test]
    fn serde_round_trip_preserves_contents() {
        let mut filter = Filter::new(20, 4, 0.025).unwrap();
        filter.add_key("node.a");
        let json = serde_json::to_string(&filter).unwrap();
        let decoded: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, filter);
        assert!(decoded.has_key("node.a"));
    }

    #[test]
    fn deserialize_rejects_inconsistent_size() {
        let json = r#"{"m":8,"k":2,"bits_per_entry":4,"max_count":15,"slots":[0,0]}"#;
        assert!(serde_json::from_str::<Filter>(json).is_err());
        let json = r#"{"m":0,"k":2,"bits_per_entry":4,"max_count":15,"slots":[]}"#;
        assert!(serde_json::from_str::<Filter>(json).is_err());
    }
}
