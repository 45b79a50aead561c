use thiserror::Error;

pub type Result<T> = std::result::Result<T, NttError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NttError {
    #[error("invalid transform size {size}: must be a power of two no larger than {max}")]
    InvalidSize { size: usize, max: usize },

    /// Raised by the twiddle builder; the engine reports `InvalidSize` instead.
    #[error("unsupported twiddle table size {size} (limit {max})")]
    UnsupportedSize { size: usize, max: usize },

    #[error("buffer length mismatch: expected {expected} elements, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("domain offset must be non-zero")]
    InvalidOffset,

    #[error("accelerator unavailable: {0}")]
    AcceleratorUnavailable(String),

    #[error("out of device memory allocating {requested} bytes")]
    OutOfDeviceMemory { requested: usize },

    #[error("out of pinned host memory: requested {requested} bytes, {available} available")]
    OutOfHostMemory { requested: usize, available: usize },

    #[error("buffer used after release")]
    UseAfterRelease,

    #[error("device operation `{op}` failed with code {code}")]
    DeviceFailure { op: &'static str, code: i32 },
}

impl NttError {
    pub(crate) fn invalid_size(size: usize, max: usize) -> Self {
        NttError::InvalidSize { size, max }
    }

    pub(crate) fn check_len(expected: usize, actual: usize) -> Result<()> {
        if expected != actual {
            return Err(NttError::SizeMismatch { expected, actual });
        }
        Ok(())
    }
}
