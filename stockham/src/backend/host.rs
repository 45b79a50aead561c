//! Data-parallel host emulation of the accelerator.
//!
//! Device memory is heap memory, a queue is a no-op token, and every launch
//! is a single rayon parallel loop on a dedicated pool. A launch returns only
//! after all of its work items have run, which is the inter-pass barrier.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::Backend;
use crate::config::{BackendKind, EngineConfig};
use crate::error::{NttError, Result};
use crate::field::Goldilocks;

/// Work items handed to one rayon task at minimum.
const MIN_ITEMS_PER_TASK: usize = 1 << 10;

pub struct HostBackend {
    pool: ThreadPool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostBuffer {
    data: Vec<Goldilocks>,
}

impl HostBuffer {
    pub fn as_slice(&self) -> &[Goldilocks] {
        &self.data
    }
}

#[derive(Debug, Default)]
pub struct HostQueue;

impl HostBackend {
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("ntt-host-{}", i));
        if let Some(threads) = threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| NttError::AcceleratorUnavailable(e.to_string()))?;
        Ok(HostBackend { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

fn prefix<'a>(buf: &'a HostBuffer, len: usize, op: &'static str) -> Result<&'a [Goldilocks]> {
    buf.data.get(..len).ok_or(NttError::DeviceFailure { op, code: -1 })
}

fn prefix_mut<'a>(
    buf: &'a mut HostBuffer,
    len: usize,
    op: &'static str,
) -> Result<&'a mut [Goldilocks]> {
    buf.data.get_mut(..len).ok_or(NttError::DeviceFailure { op, code: -1 })
}

impl Backend for HostBackend {
    type Buffer = HostBuffer;
    type Queue = HostQueue;

    const KIND: BackendKind = BackendKind::Host;

    fn open(config: &EngineConfig) -> Result<Self> {
        HostBackend::new(config.host_threads)
    }

    fn name(&self) -> &'static str {
        "host"
    }

    fn create_queue(&self) -> Result<HostQueue> {
        Ok(HostQueue)
    }

    fn alloc(&self, len: usize) -> Result<HostBuffer> {
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| NttError::OutOfDeviceMemory {
            requested: len.saturating_mul(std::mem::size_of::<Goldilocks>()),
        })?;
        data.resize(len, Goldilocks::ZERO);
        Ok(HostBuffer { data })
    }

    fn upload(&self, _queue: &HostQueue, src: &[Goldilocks], dst: &mut HostBuffer) -> Result<()> {
        prefix_mut(dst, src.len(), "upload")?.copy_from_slice(src);
        Ok(())
    }

    fn download(&self, _queue: &HostQueue, src: &HostBuffer, dst: &mut [Goldilocks]) -> Result<()> {
        dst.copy_from_slice(prefix(src, dst.len(), "download")?);
        Ok(())
    }

    fn stockham_pass(
        &self,
        _queue: &HostQueue,
        src: &HostBuffer,
        dst: &mut HostBuffer,
        twiddles: &HostBuffer,
        twiddle_offset: usize,
        n: usize,
        stride: usize,
    ) -> Result<()> {
        let half = n / 2;
        let x = prefix(src, n, "stockham_pass")?;
        let tw = twiddles
            .data
            .get(twiddle_offset..twiddle_offset + half)
            .ok_or(NttError::DeviceFailure { op: "stockham_pass", code: -1 })?;
        let (lo, hi) = prefix_mut(dst, n, "stockham_pass")?.split_at_mut(half);
        let mask = stride - 1;

        self.pool.install(|| {
            lo.par_iter_mut()
                .zip(hi.par_iter_mut())
                .enumerate()
                .with_min_len(MIN_ITEMS_PER_TASK)
                .for_each(|(j, (even, odd))| {
                    let base = 2 * j - (j & mask);
                    let a = x[base];
                    let b = x[base + stride] * tw[j];
                    *even = a + b;
                    *odd = a - b;
                });
        });
        Ok(())
    }

    fn spread(
        &self,
        _queue: &HostQueue,
        src: &HostBuffer,
        dst: &mut HostBuffer,
        powers: Option<&HostBuffer>,
        live: usize,
        total: usize,
    ) -> Result<()> {
        let x = prefix(src, live, "spread")?;
        let powers = powers.map(|p| prefix(p, live, "spread")).transpose()?;
        let out = prefix_mut(dst, total, "spread")?;

        self.pool.install(|| {
            out.par_chunks_mut(live)
                .with_min_len((MIN_ITEMS_PER_TASK / live).max(1))
                .for_each(|copy| match powers {
                    Some(powers) => {
                        for ((y, &v), &g) in copy.iter_mut().zip(x).zip(powers) {
                            *y = v * g;
                        }
                    }
                    None => copy.copy_from_slice(x),
                });
        });
        Ok(())
    }

    fn scale(&self, _queue: &HostQueue, buf: &mut HostBuffer, len: usize, factor: Goldilocks)
        -> Result<()> {
        let data = prefix_mut(buf, len, "scale")?;
        self.pool.install(|| {
            data.par_iter_mut()
                .with_min_len(MIN_ITEMS_PER_TASK)
                .for_each(|v| *v *= factor);
        });
        Ok(())
    }

    fn mul_powers(
        &self,
        _queue: &HostQueue,
        buf: &mut HostBuffer,
        powers: &HostBuffer,
        len: usize,
    ) -> Result<()> {
        let powers = prefix(powers, len, "mul_powers")?;
        let data = prefix_mut(buf, len, "mul_powers")?;
        self.pool.install(|| {
            data.par_iter_mut()
                .zip(powers.par_iter())
                .with_min_len(MIN_ITEMS_PER_TASK)
                .for_each(|(v, &g)| *v *= g);
        });
        Ok(())
    }

    fn synchronize(&self, _queue: &HostQueue) -> Result<()> {
        Ok(())
    }
}
