//! Kernel launch surface shared by the accelerator implementations.
//!
//! Every launch is ordered on a queue. A host-side `download` into caller
//! memory only returns once the queue has drained, so a pass never observes
//! a half-written predecessor and a download never observes a pass in flight.

use crate::config::{BackendKind, EngineConfig};
use crate::error::Result;
use crate::field::Goldilocks;

pub mod host;

#[cfg(feature = "gpu")]
pub mod cuda;

pub use host::HostBackend;

#[cfg(feature = "gpu")]
pub use cuda::CudaBackend;

#[cfg(not(feature = "gpu"))]
pub type DefaultBackend = HostBackend;

#[cfg(feature = "gpu")]
pub type DefaultBackend = CudaBackend;

pub trait Backend: Send + Sync + Sized + 'static {
    /// Device-resident array of field elements.
    type Buffer: Send + Sync;
    /// In-order launch queue; one per scratch slot.
    type Queue: Send;

    const KIND: BackendKind;

    fn open(config: &EngineConfig) -> Result<Self>;

    fn name(&self) -> &'static str;

    /// Makes the calling thread's launches target this backend's device.
    fn bind_thread(&self) -> Result<()> {
        Ok(())
    }

    fn create_queue(&self) -> Result<Self::Queue>;

    /// Allocates `len` elements. Contents are unspecified.
    fn alloc(&self, len: usize) -> Result<Self::Buffer>;

    /// Copies `src` into the first `src.len()` elements of `dst`.
    fn upload(&self, queue: &Self::Queue, src: &[Goldilocks], dst: &mut Self::Buffer)
        -> Result<()>;

    /// Fills `dst` from the first `dst.len()` elements of `src` and waits for it.
    fn download(&self, queue: &Self::Queue, src: &Self::Buffer, dst: &mut [Goldilocks])
        -> Result<()>;

    /// One decimation-in-time Stockham pass over `n` elements with half-span
    /// `stride`: for `j < n/2`, `q = j % stride`, `base = 2j - q`,
    /// `a = src[base]`, `b = src[base + stride] * tw[j]`,
    /// `dst[j] = a + b`, `dst[j + n/2] = a - b`. `tw` starts at
    /// `twiddle_offset` inside `twiddles`.
    fn stockham_pass(
        &self,
        queue: &Self::Queue,
        src: &Self::Buffer,
        dst: &mut Self::Buffer,
        twiddles: &Self::Buffer,
        twiddle_offset: usize,
        n: usize,
        stride: usize,
    ) -> Result<()>;

    /// `dst[i] = src[i % live] * powers[i % live]` for `i < total`.
    fn spread(
        &self,
        queue: &Self::Queue,
        src: &Self::Buffer,
        dst: &mut Self::Buffer,
        powers: Option<&Self::Buffer>,
        live: usize,
        total: usize,
    ) -> Result<()>;

    /// `buf[i] *= factor` for `i < len`.
    fn scale(&self, queue: &Self::Queue, buf: &mut Self::Buffer, len: usize, factor: Goldilocks)
        -> Result<()>;

    /// `buf[i] *= powers[i]` for `i < len`.
    fn mul_powers(
        &self,
        queue: &Self::Queue,
        buf: &mut Self::Buffer,
        powers: &Self::Buffer,
        len: usize,
    ) -> Result<()>;

    fn synchronize(&self, queue: &Self::Queue) -> Result<()>;
}
