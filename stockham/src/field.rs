//! Arithmetic over the Goldilocks prime `p = 2^64 - 2^32 + 1`.
//!
//! Every `Goldilocks` value is canonical (`< p`). The only way to build one
//! from an arbitrary `u64` is through a reducing constructor, so the hot-path
//! operations below never check their inputs.

use std::fmt;
use std::iter::{Product, Sum};
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

pub const MODULUS: u64 = 0xFFFF_FFFF_0000_0001;

/// `2^64 mod p`.
const EPSILON: u64 = 0xFFFF_FFFF;

pub const TWO_ADICITY: u32 = 32;

pub const MULTIPLICATIVE_GENERATOR: u64 = 7;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Goldilocks(u64);

impl Goldilocks {
    pub const ZERO: Self = Goldilocks(0);
    pub const ONE: Self = Goldilocks(1);
    pub const TWO: Self = Goldilocks(2);
    pub const NEG_ONE: Self = Goldilocks(MODULUS - 1);

    #[inline]
    pub const fn from_u64(value: u64) -> Self {
        // A u64 is below 2p, one subtraction is enough.
        if value >= MODULUS {
            Goldilocks(value - MODULUS)
        } else {
            Goldilocks(value)
        }
    }

    /// Caller guarantees `value < p`.
    #[inline]
    pub const fn from_canonical_u64(value: u64) -> Self {
        debug_assert!(value < MODULUS);
        Goldilocks(value)
    }

    #[inline]
    pub const fn from_u128(value: u128) -> Self {
        Goldilocks(reduce128(value))
    }

    #[inline]
    pub const fn to_canonical_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn add(self, rhs: Self) -> Self {
        let (sum, over) = self.0.overflowing_add(rhs.0);
        // On overflow the lost 2^64 is worth EPSILON; for canonical inputs the
        // corrected sum stays below p.
        let sum = sum.wrapping_add(EPSILON * over as u64);
        Goldilocks::from_u64(sum)
    }

    #[inline]
    pub const fn sub(self, rhs: Self) -> Self {
        let (diff, borrow) = self.0.overflowing_sub(rhs.0);
        Goldilocks(diff.wrapping_add(MODULUS * borrow as u64))
    }

    #[inline]
    pub const fn mul(self, rhs: Self) -> Self {
        Goldilocks(reduce128(self.0 as u128 * rhs.0 as u128))
    }

    #[inline]
    pub const fn neg(self) -> Self {
        if self.0 == 0 {
            self
        } else {
            Goldilocks(MODULUS - self.0)
        }
    }

    #[inline]
    pub const fn square(self) -> Self {
        self.mul(self)
    }

    pub const fn pow(self, mut exp: u64) -> Self {
        let mut base = self;
        let mut acc = Goldilocks::ONE;
        while exp > 0 {
            if exp & 1 == 1 {
                acc = acc.mul(base);
            }
            base = base.square();
            exp >>= 1;
        }
        acc
    }

    /// Fermat inversion; `None` for zero.
    pub fn inverse(self) -> Option<Self> {
        if self.is_zero() {
            None
        } else {
            Some(self.pow(MODULUS - 2))
        }
    }

    /// Generator of the subgroup of order `2^log_n`.
    ///
    /// Roots for different sizes are derived from the same multiplicative
    /// generator, so `primitive_root_of_unity(k + 1)^2 == primitive_root_of_unity(k)`.
    /// Returns `None` when `log_n` exceeds the two-adicity of the field.
    pub fn primitive_root_of_unity(log_n: u32) -> Option<Self> {
        if log_n > TWO_ADICITY {
            return None;
        }
        let exp = (MODULUS - 1) >> log_n;
        Some(Goldilocks(MULTIPLICATIVE_GENERATOR).pow(exp))
    }
}

/// Reduces a 128-bit value modulo p using `2^64 = 2^32 - 1` and `2^96 = -1`.
#[inline]
pub const fn reduce128(x: u128) -> u64 {
    let lo = x as u64;
    let hi = (x >> 64) as u64;
    let hi_hi = hi >> 32;
    let hi_lo = hi & EPSILON;

    let (mut t0, borrow) = lo.overflowing_sub(hi_hi);
    if borrow {
        // t0 wrapped by 2^64; t0 >= 2^64 - 2^32 here so this cannot underflow.
        t0 = t0.wrapping_sub(EPSILON);
    }
    let t1 = hi_lo * EPSILON;
    let (sum, carry) = t0.overflowing_add(t1);
    let t2 = sum.wrapping_add(EPSILON * carry as u64);
    if t2 >= MODULUS {
        t2 - MODULUS
    } else {
        t2
    }
}

impl From<u64> for Goldilocks {
    fn from(value: u64) -> Self {
        Goldilocks::from_u64(value)
    }
}

impl From<u32> for Goldilocks {
    fn from(value: u32) -> Self {
        Goldilocks(value as u64)
    }
}

impl From<Goldilocks> for u64 {
    fn from(value: Goldilocks) -> Self {
        value.0
    }
}

impl fmt::Debug for Goldilocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Goldilocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add for Goldilocks {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Goldilocks::add(self, rhs)
    }
}

impl Sub for Goldilocks {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Goldilocks::sub(self, rhs)
    }
}

impl Mul for Goldilocks {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Goldilocks::mul(self, rhs)
    }
}

impl Neg for Goldilocks {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Goldilocks::neg(self)
    }
}

impl AddAssign for Goldilocks {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Goldilocks {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Goldilocks {
    #[inline]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Sum for Goldilocks {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Goldilocks::ZERO, |acc, x| acc + x)
    }
}

impl Product for Goldilocks {
    fn product<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Goldilocks::ONE, |acc, x| acc * x)
    }
}
