//! CUDA backend over the kernel library in `ntt-gpu/`.
//!
//! Device allocations and streams are wrapped in owning types so they are
//! released exactly once. All kernels launch asynchronously on the slot's
//! stream; `download` synchronizes that stream before returning.

use std::ffi::{c_int, c_void};
use std::ptr::NonNull;

use super::Backend;
use crate::config::{BackendKind, EngineConfig};
use crate::error::{NttError, Result};
use crate::field::Goldilocks;

mod ffi {
    use super::*;

    pub type Stream = *mut c_void;

    #[link(name = "ntt_gpu_stark", kind = "static")]
    unsafe extern "C" {
        pub fn ntt_device_count(count: *mut c_int) -> c_int;
        pub fn ntt_set_device(device: c_int) -> c_int;

        pub fn ntt_stream_create(stream: *mut Stream) -> c_int;
        pub fn ntt_stream_destroy(stream: Stream) -> c_int;
        pub fn ntt_stream_sync(stream: Stream) -> c_int;

        pub fn ntt_device_alloc(ptr: *mut *mut c_void, bytes: usize) -> c_int;
        pub fn ntt_device_free(ptr: *mut c_void) -> c_int;
        pub fn ntt_host_alloc(ptr: *mut *mut c_void, bytes: usize) -> c_int;
        pub fn ntt_host_free(ptr: *mut c_void) -> c_int;

        pub fn ntt_memcpy_htod(
            dst: *mut c_void,
            src: *const c_void,
            bytes: usize,
            stream: Stream,
        ) -> c_int;
        pub fn ntt_memcpy_dtoh(
            dst: *mut c_void,
            src: *const c_void,
            bytes: usize,
            stream: Stream,
        ) -> c_int;

        pub fn ntt_stockham_pass(
            src: *const u64,
            dst: *mut u64,
            twiddles: *const u64,
            n: usize,
            stride: usize,
            stream: Stream,
        ) -> c_int;
        pub fn ntt_spread(
            src: *const u64,
            dst: *mut u64,
            powers: *const u64,
            live: usize,
            total: usize,
            stream: Stream,
        ) -> c_int;
        pub fn ntt_scale(data: *mut u64, len: usize, factor: u64, stream: Stream) -> c_int;
        pub fn ntt_mul_powers(data: *mut u64, powers: *const u64, len: usize, stream: Stream)
            -> c_int;
    }
}

const ELEMENT_BYTES: usize = std::mem::size_of::<Goldilocks>();

fn check(op: &'static str, code: c_int) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(NttError::DeviceFailure { op, code })
    }
}

pub struct DeviceBuffer {
    ptr: *mut u64,
    len: usize,
}

// Device pointers are plain addresses; access is serialized by stream order.
unsafe impl Send for DeviceBuffer {}
unsafe impl Sync for DeviceBuffer {}

impl DeviceBuffer {
    fn range(&self, offset: usize, len: usize, op: &'static str) -> Result<*const u64> {
        if offset + len > self.len {
            return Err(NttError::DeviceFailure { op, code: -1 });
        }
        Ok(unsafe { self.ptr.add(offset) as *const u64 })
    }

    fn range_mut(&mut self, len: usize, op: &'static str) -> Result<*mut u64> {
        if len > self.len {
            return Err(NttError::DeviceFailure { op, code: -1 });
        }
        Ok(self.ptr)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { ffi::ntt_device_free(self.ptr as *mut c_void) };
        }
    }
}

pub struct Stream {
    raw: ffi::Stream,
}

unsafe impl Send for Stream {}

impl Drop for Stream {
    fn drop(&mut self) {
        unsafe { ffi::ntt_stream_destroy(self.raw) };
    }
}

pub struct CudaBackend {
    device: c_int,
}

impl CudaBackend {
    pub fn new(device_id: usize) -> Result<Self> {
        let mut count: c_int = 0;
        let code = unsafe { ffi::ntt_device_count(&mut count) };
        if code != 0 || count <= 0 {
            return Err(NttError::AcceleratorUnavailable(format!(
                "no CUDA device found (status {})",
                code
            )));
        }
        if device_id >= count as usize {
            return Err(NttError::AcceleratorUnavailable(format!(
                "CUDA device {} requested but only {} present",
                device_id, count
            )));
        }
        let backend = CudaBackend {
            device: device_id as c_int,
        };
        backend.bind_thread().map_err(|e| NttError::AcceleratorUnavailable(e.to_string()))?;
        Ok(backend)
    }
}

impl Backend for CudaBackend {
    type Buffer = DeviceBuffer;
    type Queue = Stream;

    const KIND: BackendKind = BackendKind::Cuda;

    fn open(config: &EngineConfig) -> Result<Self> {
        CudaBackend::new(config.device_id)
    }

    fn name(&self) -> &'static str {
        "cuda"
    }

    fn bind_thread(&self) -> Result<()> {
        check("set_device", unsafe { ffi::ntt_set_device(self.device) })
    }

    fn create_queue(&self) -> Result<Stream> {
        let mut raw: ffi::Stream = std::ptr::null_mut();
        check("stream_create", unsafe { ffi::ntt_stream_create(&mut raw) })?;
        Ok(Stream { raw })
    }

    fn alloc(&self, len: usize) -> Result<DeviceBuffer> {
        let bytes = len.max(1) * ELEMENT_BYTES;
        let mut ptr: *mut c_void = std::ptr::null_mut();
        let code = unsafe { ffi::ntt_device_alloc(&mut ptr, bytes) };
        if code != 0 || ptr.is_null() {
            return Err(NttError::OutOfDeviceMemory { requested: bytes });
        }
        Ok(DeviceBuffer {
            ptr: ptr as *mut u64,
            len,
        })
    }

    fn upload(&self, queue: &Stream, src: &[Goldilocks], dst: &mut DeviceBuffer) -> Result<()> {
        let dst = dst.range_mut(src.len(), "upload")?;
        check("upload", unsafe {
            ffi::ntt_memcpy_htod(
                dst as *mut c_void,
                src.as_ptr() as *const c_void,
                src.len() * ELEMENT_BYTES,
                queue.raw,
            )
        })?;
        // Callers may reuse `src` as soon as we return.
        self.synchronize(queue)
    }

    fn download(&self, queue: &Stream, src: &DeviceBuffer, dst: &mut [Goldilocks]) -> Result<()> {
        let src = src.range(0, dst.len(), "download")?;
        check("download", unsafe {
            ffi::ntt_memcpy_dtoh(
                dst.as_mut_ptr() as *mut c_void,
                src as *const c_void,
                dst.len() * ELEMENT_BYTES,
                queue.raw,
            )
        })?;
        self.synchronize(queue)
    }

    fn stockham_pass(
        &self,
        queue: &Stream,
        src: &DeviceBuffer,
        dst: &mut DeviceBuffer,
        twiddles: &DeviceBuffer,
        twiddle_offset: usize,
        n: usize,
        stride: usize,
    ) -> Result<()> {
        let x = src.range(0, n, "stockham_pass")?;
        let tw = twiddles.range(twiddle_offset, n / 2, "stockham_pass")?;
        let y = dst.range_mut(n, "stockham_pass")?;
        check("stockham_pass", unsafe {
            ffi::ntt_stockham_pass(x, y, tw, n, stride, queue.raw)
        })
    }

    fn spread(
        &self,
        queue: &Stream,
        src: &DeviceBuffer,
        dst: &mut DeviceBuffer,
        powers: Option<&DeviceBuffer>,
        live: usize,
        total: usize,
    ) -> Result<()> {
        let x = src.range(0, live, "spread")?;
        let g = match powers {
            Some(p) => p.range(0, live, "spread")?,
            None => std::ptr::null(),
        };
        let y = dst.range_mut(total, "spread")?;
        check("spread", unsafe { ffi::ntt_spread(x, y, g, live, total, queue.raw) })
    }

    fn scale(&self, queue: &Stream, buf: &mut DeviceBuffer, len: usize, factor: Goldilocks)
        -> Result<()> {
        let data = buf.range_mut(len, "scale")?;
        check("scale", unsafe {
            ffi::ntt_scale(data, len, factor.to_canonical_u64(), queue.raw)
        })
    }

    fn mul_powers(
        &self,
        queue: &Stream,
        buf: &mut DeviceBuffer,
        powers: &DeviceBuffer,
        len: usize,
    ) -> Result<()> {
        let g = powers.range(0, len, "mul_powers")?;
        let data = buf.range_mut(len, "mul_powers")?;
        check("mul_powers", unsafe { ffi::ntt_mul_powers(data, g, len, queue.raw) })
    }

    fn synchronize(&self, queue: &Stream) -> Result<()> {
        check("synchronize", unsafe { ffi::ntt_stream_sync(queue.raw) })
    }
}

/// Page-locked host allocation through the driver. `None` when no device
/// answers, in which case callers fall back to `mlock`.
pub(crate) fn alloc_pinned(bytes: usize) -> Option<NonNull<Goldilocks>> {
    let mut ptr: *mut c_void = std::ptr::null_mut();
    let code = unsafe { ffi::ntt_host_alloc(&mut ptr, bytes) };
    if code != 0 {
        return None;
    }
    NonNull::new(ptr as *mut Goldilocks)
}

pub(crate) fn free_pinned(ptr: NonNull<Goldilocks>) {
    unsafe { ffi::ntt_host_free(ptr.as_ptr() as *mut c_void) };
}
