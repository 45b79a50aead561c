//! C ABI.
//!
//! Vectors crossing the boundary must come from `ntt_vec_init`. Live vectors
//! are tracked by address, so a pointer that was never handed out or was
//! already freed is rejected with `NttStatus::UseAfterRelease` instead of
//! being dereferenced. A vector freed while a transform is using it stays
//! alive until that transform returns.
//!
//! Element values written by C are reduced into the field before use.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{build_context, NttContext};
use crate::error::{NttError, Result};
use crate::field::Goldilocks;
use crate::memory::{allocate_vector, PinnedVec};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NttStatus {
    Ok = 0,
    InvalidSize = 1,
    UnsupportedSize = 2,
    SizeMismatch = 3,
    InvalidOffset = 4,
    AcceleratorUnavailable = 5,
    OutOfDeviceMemory = 6,
    OutOfHostMemory = 7,
    UseAfterRelease = 8,
    DeviceFailure = 9,
    NullPointer = 10,
}

impl From<&NttError> for NttStatus {
    fn from(err: &NttError) -> Self {
        match err {
            NttError::InvalidSize { .. } => NttStatus::InvalidSize,
            NttError::UnsupportedSize { .. } => NttStatus::UnsupportedSize,
            NttError::SizeMismatch { .. } => NttStatus::SizeMismatch,
            NttError::InvalidOffset => NttStatus::InvalidOffset,
            NttError::AcceleratorUnavailable(_) => NttStatus::AcceleratorUnavailable,
            NttError::OutOfDeviceMemory { .. } => NttStatus::OutOfDeviceMemory,
            NttError::OutOfHostMemory { .. } => NttStatus::OutOfHostMemory,
            NttError::UseAfterRelease => NttStatus::UseAfterRelease,
            NttError::DeviceFailure { .. } => NttStatus::DeviceFailure,
        }
    }
}

fn status(result: Result<()>) -> NttStatus {
    match result {
        Ok(()) => NttStatus::Ok,
        Err(err) => {
            debug!("ffi call failed: {}", err);
            NttStatus::from(&err)
        }
    }
}

type Shared = Arc<Mutex<PinnedVec>>;

static VECTORS: Lazy<Mutex<HashMap<usize, Shared>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn lookup(ptr: *const u64) -> Result<Shared> {
    VECTORS
        .lock()
        .get(&(ptr as usize))
        .cloned()
        .ok_or(NttError::UseAfterRelease)
}

fn canonicalize(values: &mut [Goldilocks]) {
    for v in values {
        *v = Goldilocks::from_u64(v.to_canonical_u64());
    }
}

/// Runs `op` on the registered vectors at `input` and `output`, handing it
/// the canonicalized input and the output, both clamped to the requested
/// lengths so that short buffers surface as length mismatches.
fn with_vectors(
    input: *mut u64,
    input_len: usize,
    output: *mut u64,
    output_len: usize,
    op: impl FnOnce(&[Goldilocks], &mut [Goldilocks]) -> Result<()>,
) -> Result<()> {
    let src = lookup(input)?;
    let dst = lookup(output)?;

    if Arc::ptr_eq(&src, &dst) {
        let mut vec = src.lock();
        let take = input_len.min(vec.len());
        canonicalize(&mut vec[..take]);
        let copy = vec[..take].to_vec();
        let give = output_len.min(vec.len());
        return op(&copy, &mut vec[..give]);
    }

    // Lock in address order so crossed calls cannot deadlock.
    let (mut src_vec, mut dst_vec) = if (input as usize) < (output as usize) {
        let s = src.lock();
        let d = dst.lock();
        (s, d)
    } else {
        let d = dst.lock();
        let s = src.lock();
        (s, d)
    };
    let take = input_len.min(src_vec.len());
    canonicalize(&mut src_vec[..take]);
    let give = output_len.min(dst_vec.len());
    op(&src_vec[..take], &mut dst_vec[..give])
}

unsafe fn with_context(
    ctx: *const NttContext,
    op: impl FnOnce(&NttContext) -> Result<()>,
) -> NttStatus {
    match ctx.as_ref() {
        Some(ctx) => status(op(ctx)),
        None => NttStatus::NullPointer,
    }
}

/// Builds a context for sizes up to `max_n` and stores it in `*out`.
///
/// # Safety
/// `out` must be valid for a pointer write.
#[no_mangle]
pub unsafe extern "C" fn ntt_context_create(max_n: usize, out: *mut *mut NttContext) -> NttStatus {
    if out.is_null() {
        return NttStatus::NullPointer;
    }
    match build_context(max_n) {
        Ok(ctx) => {
            *out = Box::into_raw(Box::new(ctx));
            NttStatus::Ok
        }
        Err(err) => NttStatus::from(&err),
    }
}

/// # Safety
/// `ctx` must come from `ntt_context_create` and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn ntt_context_destroy(ctx: *mut NttContext) -> NttStatus {
    if ctx.is_null() {
        return NttStatus::NullPointer;
    }
    drop(Box::from_raw(ctx));
    NttStatus::Ok
}

/// Allocates `n` zeroed pinned elements. Returns null on failure.
#[no_mangle]
pub extern "C" fn ntt_vec_init(n: usize) -> *mut u64 {
    match allocate_vector(n) {
        Ok(mut vec) => {
            let ptr = vec.as_mut_ptr() as *mut u64;
            VECTORS.lock().insert(ptr as usize, Arc::new(Mutex::new(vec)));
            ptr
        }
        Err(err) => {
            debug!("ntt_vec_init({}) failed: {}", n, err);
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn ntt_vec_free(ptr: *mut u64) -> NttStatus {
    if ptr.is_null() {
        return NttStatus::NullPointer;
    }
    match VECTORS.lock().remove(&(ptr as usize)) {
        Some(_) => NttStatus::Ok,
        None => NttStatus::UseAfterRelease,
    }
}

/// `vec` is reduced modulo `p` in place before the transform.
///
/// # Safety
/// `ctx` must be a live context from `ntt_context_create`.
#[no_mangle]
pub unsafe extern "C" fn ntt_evaluate_poly(
    vec: *mut u64,
    result: *mut u64,
    n: usize,
    ctx: *const NttContext,
) -> NttStatus {
    with_context(ctx, |ctx| {
        with_vectors(vec, n, result, n, |input, out| ctx.evaluate_poly_into(input, n, out))
    })
}

/// `vec` is reduced modulo `p` in place before the transform.
///
/// # Safety
/// `ctx` must be a live context from `ntt_context_create`.
#[no_mangle]
pub unsafe extern "C" fn ntt_evaluate_poly_with_offset(
    vec: *mut u64,
    n: usize,
    domain_offset: u64,
    blowup_factor: usize,
    result: *mut u64,
    result_len: usize,
    ctx: *const NttContext,
) -> NttStatus {
    let offset = Goldilocks::from_u64(domain_offset);
    with_context(ctx, |ctx| {
        with_vectors(vec, n, result, result_len, |input, out| {
            ctx.evaluate_poly_with_offset_into(input, n, offset, blowup_factor, out)
        })
    })
}

/// `vec` is reduced modulo `p` in place before the transform.
///
/// # Safety
/// `ctx` must be a live context from `ntt_context_create`.
#[no_mangle]
pub unsafe extern "C" fn ntt_interpolate_poly(
    vec: *mut u64,
    result: *mut u64,
    n: usize,
    ctx: *const NttContext,
) -> NttStatus {
    with_context(ctx, |ctx| {
        with_vectors(vec, n, result, n, |input, out| ctx.interpolate_poly_into(input, n, out))
    })
}

/// `vec` is reduced modulo `p` in place before the transform.
///
/// # Safety
/// `ctx` must be a live context from `ntt_context_create`.
#[no_mangle]
pub unsafe extern "C" fn ntt_interpolate_poly_with_offset(
    vec: *mut u64,
    result: *mut u64,
    n: usize,
    domain_offset: u64,
    ctx: *const NttContext,
) -> NttStatus {
    let offset = Goldilocks::from_u64(domain_offset);
    with_context(ctx, |ctx| {
        with_vectors(vec, n, result, n, |input, out| {
            ctx.interpolate_poly_with_offset_into(input, n, offset, out)
        })
    })
}
