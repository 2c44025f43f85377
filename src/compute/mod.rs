//! Per-pixel compute kernels and their execution backends.

mod backend;
#[cfg(feature = "gpu")]
mod gpu;
mod kernel;

pub use backend::{ComputeBackend, ComputeBackendKind, CpuBackend, ParallelCpuBackend, create_backend};
#[cfg(feature = "gpu")]
pub use gpu::WgpuBackend;
pub use kernel::{KERNEL_EPSILON, Kernel};
