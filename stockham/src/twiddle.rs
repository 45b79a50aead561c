//! Twiddle and root tables for the Stockham schedule.
//!
//! The engine runs decimation-in-time Stockham passes. For a size `n` and
//! pass `t`, the stride is `s = n >> (t + 1)`; butterfly `j` (out of `n/2`)
//! reads `x[2j - j % s]` and `x[2j - j % s + s]` and belongs to the
//! sub-transform frequency `j / s`, so its twiddle is `ω^(j - j % s)`.
//! Tables are laid out one flat `n/2` vector per pass so every work item
//! does a single indexed load.

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::error::{NttError, Result};
use crate::field::{Goldilocks, TWO_ADICITY};

pub const MAX_LOG_SIZE: u32 = TWO_ADICITY;

/// Largest transform the field supports.
pub(crate) fn size_limit() -> usize {
    1usize.checked_shl(MAX_LOG_SIZE).unwrap_or(usize::MAX)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TwiddleTables {
    pub log_size: u32,
    pub root: Goldilocks,
    pub root_inv: Goldilocks,
    pub size_inv: Goldilocks,
    /// `forward[t]` holds the `n/2` twiddles of pass `t`.
    pub forward: Vec<Vec<Goldilocks>>,
    pub inverse: Vec<Vec<Goldilocks>>,
}

impl TwiddleTables {
    /// Builds the tables for `n = 2^log_size`, with `log_size` bounded by `max_log_size`.
    pub fn build(log_size: u32, max_log_size: u32) -> Result<Self> {
        let limit = max_log_size.min(MAX_LOG_SIZE);
        if log_size > limit {
            return Err(NttError::UnsupportedSize {
                size: 1usize.checked_shl(log_size).unwrap_or(usize::MAX),
                max: 1usize.checked_shl(limit).unwrap_or(usize::MAX),
            });
        }
        let root = Goldilocks::primitive_root_of_unity(log_size).ok_or_else(|| {
            NttError::UnsupportedSize {
                size: 1usize.checked_shl(log_size).unwrap_or(usize::MAX),
                max: size_limit(),
            }
        })?;
        let root_inv = root.inverse().unwrap_or(Goldilocks::ONE);
        let size_inv = Goldilocks::from_u64(1u64 << log_size)
            .inverse()
            .unwrap_or(Goldilocks::ONE);

        Ok(Self {
            log_size,
            root,
            root_inv,
            size_inv,
            forward: stage_tables(log_size, root),
            inverse: stage_tables(log_size, root_inv),
        })
    }

    /// Builds tables for an arbitrary size, rejecting anything that is not a power of two.
    pub fn for_size(n: usize, max_n: usize) -> Result<Self> {
        if n == 0 || !n.is_power_of_two() || n > max_n {
            return Err(NttError::UnsupportedSize { size: n, max: max_n });
        }
        let max_log = if max_n.is_power_of_two() {
            max_n.trailing_zeros()
        } else {
            usize::BITS - 1 - max_n.leading_zeros()
        };
        Self::build(n.trailing_zeros(), max_log)
    }

    pub fn size(&self) -> usize {
        1 << self.log_size
    }

    pub fn stages(&self) -> usize {
        self.log_size as usize
    }

    /// Bytes the forward and inverse tables occupy once uploaded.
    pub fn table_bytes(&self) -> usize {
        let per_stage = self.size() / 2 * std::mem::size_of::<Goldilocks>();
        2 * per_stage * self.stages()
    }

    /// SHA-256 over the root, the inverse root and every table entry.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.log_size.to_le_bytes());
        hasher.update(self.root.to_canonical_u64().to_le_bytes());
        hasher.update(self.root_inv.to_canonical_u64().to_le_bytes());
        for table in self.forward.iter().chain(self.inverse.iter()) {
            for w in table {
                hasher.update(w.to_canonical_u64().to_le_bytes());
            }
        }
        hasher.finalize().into()
    }
}

fn stage_tables(log_size: u32, root: Goldilocks) -> Vec<Vec<Goldilocks>> {
    let n = 1usize << log_size;
    let half = n / 2;
    let powers = coset_powers(root, half);

    (0..log_size)
        .map(|t| {
            let mask = (n >> (t + 1)) - 1;
            (0..half)
                .into_par_iter()
                .map(|j| powers[j - (j & mask)])
                .collect()
        })
        .collect()
}

/// `[offset^0, offset^1, ..., offset^(len-1)]`.
pub fn coset_powers(offset: Goldilocks, len: usize) -> Vec<Goldilocks> {
    scaled_coset_powers(offset, Goldilocks::ONE, len)
}

/// `[scale * offset^0, ..., scale * offset^(len-1)]`.
pub fn scaled_coset_powers(offset: Goldilocks, scale: Goldilocks, len: usize) -> Vec<Goldilocks> {
    let mut powers = Vec::with_capacity(len);
    let mut current = scale;
    for _ in 0..len {
        powers.push(current);
        current *= offset;
    }
    powers
}

/// Hex rendering used in log lines.
pub fn fingerprint_hex(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
