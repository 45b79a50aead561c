use parking_lot::{Condvar, Mutex};
use std::ops::{Deref, DerefMut};

use crate::backend::{Backend, DefaultBackend};
use crate::config::{BackendKind, EngineConfig};
use crate::error::{NttError, Result};
use crate::field::Goldilocks;
use crate::memory::{HostMemoryPool, PinnedVec};
use crate::twiddle::{fingerprint_hex, size_limit, TwiddleTables, MAX_LOG_SIZE};

/// Device-resident tables for one transform size.
pub(crate) struct SizeTables<B: Backend> {
    pub(crate) root: Goldilocks,
    pub(crate) size_inv: Goldilocks,
    /// Stage tables laid end to end, `n/2` entries per stage.
    pub(crate) forward: B::Buffer,
    pub(crate) inverse: B::Buffer,
}

pub(crate) struct Slot<B: Backend> {
    pub(crate) front: B::Buffer,
    pub(crate) back: B::Buffer,
    pub(crate) aux: B::Buffer,
    pub(crate) queue: B::Queue,
}

struct ScratchPool<B: Backend> {
    free: Mutex<Vec<Slot<B>>>,
    returned: Condvar,
    capacity: usize,
}

impl<B: Backend> ScratchPool<B> {
    fn acquire(&self) -> SlotGuard<'_, B> {
        let mut free = self.free.lock();
        loop {
            if let Some(slot) = free.pop() {
                return SlotGuard {
                    pool: self,
                    slot: Some(slot),
                };
            }
            self.returned.wait(&mut free);
        }
    }
}

/// Exclusive use of one scratch slot; returns it to the pool on drop.
pub(crate) struct SlotGuard<'a, B: Backend> {
    pool: &'a ScratchPool<B>,
    slot: Option<Slot<B>>,
}

impl<B: Backend> Deref for SlotGuard<'_, B> {
    type Target = Slot<B>;

    fn deref(&self) -> &Slot<B> {
        match &self.slot {
            Some(slot) => slot,
            None => unreachable!("slot taken before drop"),
        }
    }
}

impl<B: Backend> DerefMut for SlotGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut Slot<B> {
        match &mut self.slot {
            Some(slot) => slot,
            None => unreachable!("slot taken before drop"),
        }
    }
}

impl<B: Backend> Drop for SlotGuard<'_, B> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.free.lock().push(slot);
            self.pool.returned.notify_one();
        }
    }
}

/// Session state for transforms up to `max_n`: per-size root and twiddle
/// tables resident on the backend, plus a fixed pool of scratch slots.
///
/// Shared by reference across threads. Each call borrows one slot for its
/// whole duration, so at most `concurrency_limit()` calls run at once and
/// the rest block until a slot is returned.
pub struct NttContext<B: Backend = DefaultBackend> {
    pub(crate) backend: B,
    max_log_size: u32,
    pub(crate) tables: Vec<SizeTables<B>>,
    scratch: ScratchPool<B>,
    host_pool: HostMemoryPool,
    fingerprint: [u8; 32],
}

impl NttContext<DefaultBackend> {
    pub fn build(config: &EngineConfig) -> Result<Self> {
        Self::open(config)
    }
}

impl<B: Backend> NttContext<B> {
    /// Opens backend `B` from `config` and builds a context on it.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        if config.backend != BackendKind::Auto && config.backend != B::KIND {
            return Err(NttError::AcceleratorUnavailable(format!(
                "backend {:?} requested, this context runs on {:?}",
                config.backend,
                B::KIND
            )));
        }
        let backend = B::open(config)?;
        Self::with_backend(backend, config)
    }

    pub fn with_backend(backend: B, config: &EngineConfig) -> Result<Self> {
        let max_log_size = config.max_log_size;
        if max_log_size > MAX_LOG_SIZE {
            return Err(NttError::invalid_size(
                1usize.checked_shl(max_log_size).unwrap_or(usize::MAX),
                size_limit(),
            ));
        }
        let max_n = 1usize << max_log_size;
        backend.bind_thread()?;

        // One size is resident on the host at a time; it is dropped once uploaded.
        let staging = backend.create_queue()?;
        let mut tables = Vec::with_capacity(max_log_size as usize + 1);
        let mut table_bytes = 0;
        let mut fingerprint = [0; 32];
        for log_size in 0..=max_log_size {
            let host = TwiddleTables::build(log_size, max_log_size)?;
            table_bytes += host.table_bytes();
            if log_size == max_log_size {
                fingerprint = host.fingerprint();
            }
            tables.push(upload_tables(&backend, &staging, host)?);
            backend.synchronize(&staging)?;
        }

        let slots = config.scratch_slots.max(1);
        let mut free = Vec::with_capacity(slots);
        for _ in 0..slots {
            free.push(Slot {
                front: backend.alloc(max_n)?,
                back: backend.alloc(max_n)?,
                aux: backend.alloc(max_n)?,
                queue: backend.create_queue()?,
            });
        }

        info!(
            "ntt context ready: backend={} max_n={} slots={} table_bytes={} fingerprint={}",
            backend.name(),
            max_n,
            slots,
            table_bytes,
            fingerprint_hex(&fingerprint)
        );

        Ok(NttContext {
            backend,
            max_log_size,
            tables,
            scratch: ScratchPool {
                free: Mutex::new(free),
                returned: Condvar::new(),
                capacity: slots,
            },
            host_pool: HostMemoryPool::new(&config.host_memory),
            fingerprint,
        })
    }

    pub fn max_n(&self) -> usize {
        1 << self.max_log_size
    }

    pub fn max_log_size(&self) -> u32 {
        self.max_log_size
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of transforms that can be in flight at once.
    pub fn concurrency_limit(&self) -> usize {
        self.scratch.capacity
    }

    /// Fingerprint of the largest size's tables, as logged at build.
    pub fn table_fingerprint(&self) -> [u8; 32] {
        self.fingerprint
    }

    /// `ω_n`, the root whose powers the forward transform of size `n` evaluates at.
    pub fn root_of_unity(&self, n: usize) -> Result<Goldilocks> {
        let log_n = self.check_size(n)?;
        Ok(self.tables[log_n as usize].root)
    }

    pub fn host_pool(&self) -> &HostMemoryPool {
        &self.host_pool
    }

    /// Pinned buffer charged against this context's host pool.
    pub fn allocate_vector(&self, n: usize) -> Result<PinnedVec> {
        self.host_pool.allocate(n)
    }

    pub(crate) fn check_size(&self, n: usize) -> Result<u32> {
        if n == 0 || !n.is_power_of_two() || n > self.max_n() {
            return Err(NttError::invalid_size(n, self.max_n()));
        }
        Ok(n.trailing_zeros())
    }

    pub(crate) fn acquire(&self) -> SlotGuard<'_, B> {
        self.scratch.acquire()
    }
}

fn upload_tables<B: Backend>(
    backend: &B,
    queue: &B::Queue,
    host: TwiddleTables,
) -> Result<SizeTables<B>> {
    let TwiddleTables { root, size_inv, forward, inverse, .. } = host;
    Ok(SizeTables {
        root,
        size_inv,
        forward: upload_stages(backend, queue, forward)?,
        inverse: upload_stages(backend, queue, inverse)?,
    })
}

/// Lays the stage tables end to end on the backend, consuming them.
fn upload_stages<B: Backend>(
    backend: &B,
    queue: &B::Queue,
    stages: Vec<Vec<Goldilocks>>,
) -> Result<B::Buffer> {
    let flat: Vec<Goldilocks> = stages.into_iter().flatten().collect();
    let mut buf = backend.alloc(flat.len())?;
    backend.upload(queue, &flat, &mut buf)?;
    Ok(buf)
}

/// Builds a context with capacity `max_n` and default settings.
pub fn build_context(max_n: usize) -> Result<NttContext> {
    if max_n == 0 || !max_n.is_power_of_two() || max_n > size_limit() {
        return Err(NttError::invalid_size(max_n, size_limit()));
    }
    let config = EngineConfig {
        max_log_size: max_n.trailing_zeros(),
        ..EngineConfig::default()
    };
    NttContext::build(&config)
}
