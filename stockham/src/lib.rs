//! Stockham number-theoretic transforms over the Goldilocks field.
//!
//! A [`NttContext`] owns the per-size root and twiddle tables for every power
//! of two up to its capacity, already resident on the accelerator, plus a
//! small pool of scratch slots. Transforms borrow a slot, run `log2(n)`
//! self-sorting passes, and return results in natural order.
//!
//! ```no_run
//! use stockham_ntt::{build_context, Goldilocks};
//!
//! let ctx = build_context(1 << 10).unwrap();
//! let coeffs: Vec<Goldilocks> = (1..=4u64).map(Goldilocks::from).collect();
//! let values = ctx.evaluate_poly(&coeffs, 4).unwrap();
//! let back = ctx.interpolate_poly(&values, 4).unwrap();
//! assert_eq!(&back[..], &coeffs[..]);
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod field;
pub mod memory;
pub mod twiddle;

pub use backend::{Backend, DefaultBackend, HostBackend};
pub use config::{BackendKind, ConfigError, EngineConfig, HostMemoryConfig};
pub use context::{build_context, NttContext};
pub use error::{NttError, Result};
pub use field::{Goldilocks, MODULUS};
pub use memory::{allocate_vector, free_vector, HostMemoryPool, PinnedVec};
pub use twiddle::TwiddleTables;

#[cfg(feature = "gpu")]
pub use backend::CudaBackend;

#[cfg(test)]
mod tests;
