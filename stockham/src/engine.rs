//! Forward and inverse transforms on a context.
//!
//! Every call follows the same shape: validate, borrow a scratch slot, upload
//! into the slot's front buffer, run the Stockham passes (each pass reads the
//! front buffer and writes the back one, then the two swap), finalize, and
//! download. The caller's output is only touched by the final download.
//!
//! Coset low-degree extension never materializes the zero-padded input. On a
//! vector whose upper `N - n` entries are zero, the first `log2(N / n)`
//! decimation-in-time passes only replicate the live prefix, so one spread
//! launch that writes `x[i % n] * g^(i % n)` stands in for them and the
//! remaining `log2(n)` passes run on the size-`N` tables.

use std::time::Instant;

use crate::backend::Backend;
use crate::context::{NttContext, Slot};
use crate::error::{NttError, Result};
use crate::field::Goldilocks;
use crate::memory::PinnedVec;
use crate::twiddle::{coset_powers, scaled_coset_powers};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Inverse,
}

impl<B: Backend> NttContext<B> {
    /// Evaluations of `coeffs` at `ω_n^0 .. ω_n^(n-1)`, in natural order.
    pub fn evaluate_poly(&self, coeffs: &[Goldilocks], n: usize) -> Result<PinnedVec> {
        self.check_size(n)?;
        NttError::check_len(n, coeffs.len())?;
        let mut out = self.host_pool().allocate(n)?;
        self.evaluate_poly_into(coeffs, n, &mut out)?;
        Ok(out)
    }

    pub fn evaluate_poly_into(
        &self,
        coeffs: &[Goldilocks],
        n: usize,
        out: &mut [Goldilocks],
    ) -> Result<()> {
        let log_n = self.check_size(n)?;
        NttError::check_len(n, coeffs.len())?;
        NttError::check_len(n, out.len())?;

        let started = Instant::now();
        self.transform(coeffs, out, log_n, Direction::Forward, None)?;
        debug!(
            "evaluate_poly n={} backend={} took {:?}",
            n,
            self.backend.name(),
            started.elapsed()
        );
        Ok(())
    }

    /// Low-degree extension: evaluations of `coeffs` (degree < n) at
    /// `offset * ω_N^j` for `N = n * blowup_factor`.
    pub fn evaluate_poly_with_offset(
        &self,
        coeffs: &[Goldilocks],
        n: usize,
        domain_offset: Goldilocks,
        blowup_factor: usize,
        result_len: usize,
    ) -> Result<PinnedVec> {
        let total = self.check_extension(coeffs, n, domain_offset, blowup_factor, result_len)?;
        let mut out = self.host_pool().allocate(total)?;
        self.evaluate_poly_with_offset_into(coeffs, n, domain_offset, blowup_factor, &mut out)?;
        Ok(out)
    }

    /// As [`evaluate_poly_with_offset`](Self::evaluate_poly_with_offset), with
    /// `out.len()` as the requested result length.
    pub fn evaluate_poly_with_offset_into(
        &self,
        coeffs: &[Goldilocks],
        n: usize,
        domain_offset: Goldilocks,
        blowup_factor: usize,
        out: &mut [Goldilocks],
    ) -> Result<()> {
        let total = self.check_extension(coeffs, n, domain_offset, blowup_factor, out.len())?;
        let log_n = n.trailing_zeros();
        let log_total = total.trailing_zeros();
        let started = Instant::now();

        self.backend.bind_thread()?;
        let mut guard = self.acquire();
        let slot: &mut Slot<B> = &mut guard;
        let tables = &self.tables[log_total as usize];

        self.backend.upload(&slot.queue, coeffs, &mut slot.back)?;
        let powers = if domain_offset == Goldilocks::ONE {
            None
        } else {
            let host_powers = coset_powers(domain_offset, n);
            self.backend.upload(&slot.queue, &host_powers, &mut slot.aux)?;
            Some(&slot.aux)
        };
        self.backend
            .spread(&slot.queue, &slot.back, &mut slot.front, powers, n, total)?;
        trace!("spread n={} into {} (skipping {} passes)", n, total, log_total - log_n);

        self.run_passes(slot, &tables.forward, log_total, log_total - log_n)?;
        self.backend.download(&slot.queue, &slot.front, out)?;

        debug!(
            "evaluate_poly_with_offset n={} blowup={} backend={} took {:?}",
            n,
            blowup_factor,
            self.backend.name(),
            started.elapsed()
        );
        Ok(())
    }

    /// Coefficients of the polynomial whose evaluations at `ω_n^i` are `values`.
    pub fn interpolate_poly(&self, values: &[Goldilocks], n: usize) -> Result<PinnedVec> {
        self.check_size(n)?;
        NttError::check_len(n, values.len())?;
        let mut out = self.host_pool().allocate(n)?;
        self.interpolate_poly_into(values, n, &mut out)?;
        Ok(out)
    }

    pub fn interpolate_poly_into(
        &self,
        values: &[Goldilocks],
        n: usize,
        out: &mut [Goldilocks],
    ) -> Result<()> {
        let log_n = self.check_size(n)?;
        NttError::check_len(n, values.len())?;
        NttError::check_len(n, out.len())?;

        let started = Instant::now();
        self.transform(values, out, log_n, Direction::Inverse, None)?;
        debug!(
            "interpolate_poly n={} backend={} took {:?}",
            n,
            self.backend.name(),
            started.elapsed()
        );
        Ok(())
    }

    /// Coefficients of the polynomial whose evaluations at `offset * ω_n^i` are `values`.
    pub fn interpolate_poly_with_offset(
        &self,
        values: &[Goldilocks],
        n: usize,
        domain_offset: Goldilocks,
    ) -> Result<PinnedVec> {
        self.check_size(n)?;
        NttError::check_len(n, values.len())?;
        if domain_offset.is_zero() {
            return Err(NttError::InvalidOffset);
        }
        let mut out = self.host_pool().allocate(n)?;
        self.interpolate_poly_with_offset_into(values, n, domain_offset, &mut out)?;
        Ok(out)
    }

    pub fn interpolate_poly_with_offset_into(
        &self,
        values: &[Goldilocks],
        n: usize,
        domain_offset: Goldilocks,
        out: &mut [Goldilocks],
    ) -> Result<()> {
        let log_n = self.check_size(n)?;
        NttError::check_len(n, values.len())?;
        NttError::check_len(n, out.len())?;
        let offset_inv = domain_offset.inverse().ok_or(NttError::InvalidOffset)?;

        let started = Instant::now();
        self.transform(values, out, log_n, Direction::Inverse, Some(offset_inv))?;
        debug!(
            "interpolate_poly_with_offset n={} backend={} took {:?}",
            n,
            self.backend.name(),
            started.elapsed()
        );
        Ok(())
    }

    /// Validates an extension request and returns `N = n * blowup_factor`.
    fn check_extension(
        &self,
        coeffs: &[Goldilocks],
        n: usize,
        domain_offset: Goldilocks,
        blowup_factor: usize,
        result_len: usize,
    ) -> Result<usize> {
        self.check_size(n)?;
        if blowup_factor == 0 || !blowup_factor.is_power_of_two() {
            return Err(NttError::invalid_size(blowup_factor, self.max_n()));
        }
        let total = n
            .checked_mul(blowup_factor)
            .filter(|&total| total <= self.max_n())
            .ok_or(NttError::invalid_size(
                n.saturating_mul(blowup_factor),
                self.max_n(),
            ))?;
        NttError::check_len(total, result_len)?;
        NttError::check_len(n, coeffs.len())?;
        if domain_offset.is_zero() {
            return Err(NttError::InvalidOffset);
        }
        Ok(total)
    }

    /// Full-size transform of `input` into `out`. With `Direction::Inverse`
    /// the result is scaled by `n^-1`, and by `n^-1 * offset_inv^i` when a
    /// coset offset is given.
    fn transform(
        &self,
        input: &[Goldilocks],
        out: &mut [Goldilocks],
        log_n: u32,
        direction: Direction,
        offset_inv: Option<Goldilocks>,
    ) -> Result<()> {
        let n = input.len();
        let tables = &self.tables[log_n as usize];

        self.backend.bind_thread()?;
        let mut guard = self.acquire();
        let slot: &mut Slot<B> = &mut guard;

        self.backend.upload(&slot.queue, input, &mut slot.front)?;
        match direction {
            Direction::Forward => self.run_passes(slot, &tables.forward, log_n, 0)?,
            Direction::Inverse => {
                self.run_passes(slot, &tables.inverse, log_n, 0)?;
                match offset_inv {
                    Some(offset_inv) => {
                        let factors = scaled_coset_powers(offset_inv, tables.size_inv, n);
                        self.backend.upload(&slot.queue, &factors, &mut slot.aux)?;
                        self.backend
                            .mul_powers(&slot.queue, &mut slot.front, &slot.aux, n)?;
                    }
                    None => self
                        .backend
                        .scale(&slot.queue, &mut slot.front, n, tables.size_inv)?,
                }
            }
        }
        self.backend.download(&slot.queue, &slot.front, out)
    }

    /// Runs passes `first..log_n` of the size-`2^log_n` schedule. Input and
    /// result both live in `slot.front`.
    fn run_passes(
        &self,
        slot: &mut Slot<B>,
        twiddles: &B::Buffer,
        log_n: u32,
        first: u32,
    ) -> Result<()> {
        let n = 1usize << log_n;
        let half = n / 2;
        for t in first..log_n {
            let stride = n >> (t + 1);
            self.backend.stockham_pass(
                &slot.queue,
                &slot.front,
                &mut slot.back,
                twiddles,
                t as usize * half,
                n,
                stride,
            )?;
            std::mem::swap(&mut slot.front, &mut slot.back);
            trace!("pass {}/{} n={} stride={}", t + 1, log_n, n, stride);
        }
        Ok(())
    }
}
