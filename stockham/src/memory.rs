//! Page-locked host buffers.
//!
//! ```text
//! ┌──────────────────┐  upload   ┌──────────────────┐
//! │ PinnedVec (host) │ ────────→ │ device buffers   │
//! │ page-aligned,    │ ←──────── │ (scratch slot)   │
//! │ page-locked      │  download │                  │
//! └──────────────────┘           └──────────────────┘
//! ```
//!
//! A `PinnedVec` owns its allocation and returns it to the system on drop,
//! so a released buffer can no longer be named. Pools only do accounting:
//! each buffer carries a handle to the pool it was charged against.

use std::alloc::Layout;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::HostMemoryConfig;
use crate::error::{NttError, Result};
use crate::field::Goldilocks;

const ELEMENT_BYTES: usize = std::mem::size_of::<Goldilocks>();

fn page_size() -> usize {
    #[cfg(unix)]
    {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }
    4096
}

struct PoolInner {
    limit: Option<usize>,
    in_use: AtomicUsize,
    lock_pages: bool,
    require_lock: bool,
    warned_unlocked: AtomicBool,
}

impl PoolInner {
    fn reserve(&self, bytes: usize) -> Result<()> {
        let mut current = self.in_use.load(Ordering::Relaxed);
        loop {
            let next = current.checked_add(bytes).ok_or(NttError::OutOfHostMemory {
                requested: bytes,
                available: 0,
            })?;
            if let Some(limit) = self.limit {
                if next > limit {
                    return Err(NttError::OutOfHostMemory {
                        requested: bytes,
                        available: limit.saturating_sub(current),
                    });
                }
            }
            match self.in_use.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn unreserve(&self, bytes: usize) {
        self.in_use.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Accounting handle for pinned allocations. Clones share the same budget.
#[derive(Clone)]
pub struct HostMemoryPool {
    inner: Arc<PoolInner>,
}

impl HostMemoryPool {
    pub fn new(config: &HostMemoryConfig) -> Self {
        HostMemoryPool {
            inner: Arc::new(PoolInner {
                limit: config.limit_bytes(),
                in_use: AtomicUsize::new(0),
                lock_pages: config.lock_pages,
                require_lock: config.require_lock,
                warned_unlocked: AtomicBool::new(false),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(&HostMemoryConfig::default())
    }

    pub fn in_use_bytes(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    pub fn limit_bytes(&self) -> Option<usize> {
        self.inner.limit
    }

    /// Allocates `n` zeroed field elements of page-locked memory.
    pub fn allocate(&self, n: usize) -> Result<PinnedVec> {
        if n == 0 {
            return Err(NttError::invalid_size(0, usize::MAX));
        }
        let page = page_size();
        let bytes = n
            .checked_mul(ELEMENT_BYTES)
            .and_then(|b| b.checked_add(page - 1))
            .map(|b| b / page * page)
            .ok_or(NttError::OutOfHostMemory {
                requested: usize::MAX,
                available: 0,
            })?;

        self.inner.reserve(bytes)?;
        match self.allocate_reserved(n, bytes, page) {
            Ok(vec) => Ok(vec),
            Err(err) => {
                self.inner.unreserve(bytes);
                Err(err)
            }
        }
    }

    pub fn allocate_from(&self, values: &[Goldilocks]) -> Result<PinnedVec> {
        let mut vec = self.allocate(values.len())?;
        vec.copy_from_slice(values);
        Ok(vec)
    }

    fn allocate_reserved(&self, n: usize, bytes: usize, page: usize) -> Result<PinnedVec> {
        #[cfg(feature = "gpu")]
        {
            if let Some(ptr) = crate::backend::cuda::alloc_pinned(bytes) {
                unsafe { std::ptr::write_bytes(ptr.as_ptr() as *mut u8, 0, bytes) };
                return Ok(PinnedVec {
                    ptr,
                    len: n,
                    bytes,
                    origin: Origin::Cuda,
                    pool: self.inner.clone(),
                });
            }
        }

        let layout = Layout::from_size_align(bytes, page).map_err(|_| NttError::OutOfHostMemory {
            requested: bytes,
            available: 0,
        })?;
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut Goldilocks).ok_or(NttError::OutOfHostMemory {
            requested: bytes,
            available: 0,
        })?;

        let locked = self.inner.lock_pages && lock_pages(raw, bytes);
        if self.inner.lock_pages && !locked {
            if self.inner.require_lock {
                unsafe { std::alloc::dealloc(raw, layout) };
                return Err(NttError::OutOfHostMemory {
                    requested: bytes,
                    available: 0,
                });
            }
            if !self.inner.warned_unlocked.swap(true, Ordering::Relaxed) {
                warn!(
                    "page locking refused for {} bytes, falling back to pageable host buffers",
                    bytes
                );
            }
        }

        Ok(PinnedVec {
            ptr,
            len: n,
            bytes,
            origin: Origin::Host { layout, locked },
            pool: self.inner.clone(),
        })
    }
}

impl fmt::Debug for HostMemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMemoryPool")
            .field("in_use", &self.in_use_bytes())
            .field("limit", &self.inner.limit)
            .field("lock_pages", &self.inner.lock_pages)
            .finish()
    }
}

#[cfg(unix)]
fn lock_pages(ptr: *mut u8, bytes: usize) -> bool {
    unsafe { libc::mlock(ptr as *const libc::c_void, bytes) == 0 }
}

#[cfg(not(unix))]
fn lock_pages(_ptr: *mut u8, _bytes: usize) -> bool {
    false
}

#[cfg(unix)]
fn unlock_pages(ptr: *mut u8, bytes: usize) {
    unsafe { libc::munlock(ptr as *const libc::c_void, bytes) };
}

#[cfg(not(unix))]
fn unlock_pages(_ptr: *mut u8, _bytes: usize) {}

enum Origin {
    Host { layout: Layout, locked: bool },
    #[cfg(feature = "gpu")]
    Cuda,
}

/// Owned, length-carrying pinned host vector of field elements.
pub struct PinnedVec {
    ptr: NonNull<Goldilocks>,
    len: usize,
    bytes: usize,
    origin: Origin,
    pool: Arc<PoolInner>,
}

// The allocation is uniquely owned, like a `Vec`.
unsafe impl Send for PinnedVec {}
unsafe impl Sync for PinnedVec {}

impl PinnedVec {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the OS or the driver actually pinned the pages.
    pub fn is_locked(&self) -> bool {
        match self.origin {
            Origin::Host { locked, .. } => locked,
            #[cfg(feature = "gpu")]
            Origin::Cuda => true,
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.bytes
    }

    pub fn as_slice(&self) -> &[Goldilocks] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [Goldilocks] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_ptr(&self) -> *const Goldilocks {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut Goldilocks {
        self.ptr.as_ptr()
    }

    /// Copies raw words in, reducing each into the field.
    pub fn copy_from_u64s(&mut self, words: &[u64]) -> Result<()> {
        NttError::check_len(self.len, words.len())?;
        for (dst, &w) in self.as_mut_slice().iter_mut().zip(words) {
            *dst = Goldilocks::from_u64(w);
        }
        Ok(())
    }

    pub fn to_u64s(&self) -> Vec<u64> {
        self.iter().map(|x| x.to_canonical_u64()).collect()
    }
}

impl Deref for PinnedVec {
    type Target = [Goldilocks];

    fn deref(&self) -> &[Goldilocks] {
        self.as_slice()
    }
}

impl DerefMut for PinnedVec {
    fn deref_mut(&mut self) -> &mut [Goldilocks] {
        self.as_mut_slice()
    }
}

impl AsRef<[Goldilocks]> for PinnedVec {
    fn as_ref(&self) -> &[Goldilocks] {
        self.as_slice()
    }
}

impl fmt::Debug for PinnedVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedVec")
            .field("len", &self.len)
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Drop for PinnedVec {
    fn drop(&mut self) {
        let raw = self.ptr.as_ptr() as *mut u8;
        match self.origin {
            Origin::Host { layout, locked } => {
                if locked {
                    unlock_pages(raw, self.bytes);
                }
                unsafe { std::alloc::dealloc(raw, layout) };
            }
            #[cfg(feature = "gpu")]
            Origin::Cuda => crate::backend::cuda::free_pinned(self.ptr),
        }
        self.pool.unreserve(self.bytes);
    }
}

/// Allocates a standalone pinned vector of `n` zeroed elements.
pub fn allocate_vector(n: usize) -> Result<PinnedVec> {
    HostMemoryPool::unlimited().allocate(n)
}

/// Releases a pinned vector. Equivalent to dropping it.
pub fn free_vector(buffer: PinnedVec) {
    drop(buffer);
}
