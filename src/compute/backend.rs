use std::sync::Arc;

use rayon::prelude::*;

use crate::compute::kernel::{Kernel, check_inputs, eval_at};
use crate::foundation::error::{FramecutError, FramecutResult};

/// Executes [`Kernel`]s over operand arrays.
///
/// Implementations must agree with [`CpuBackend`] within
/// [`KERNEL_EPSILON`](crate::compute::KERNEL_EPSILON).
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluate `kernel` element-wise. The output has the length of `inputs[0]`.
    fn compute(&self, kernel: &Kernel, inputs: &[&[f32]]) -> FramecutResult<Vec<f32>>;

    /// Drop any device resources (compiled programs, buffers). The backend stays usable and
    /// recreates what it needs on the next call.
    fn release(&self) {}
}

/// Scalar reference backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn compute(&self, kernel: &Kernel, inputs: &[&[f32]]) -> FramecutResult<Vec<f32>> {
        let n = check_inputs(kernel, inputs)?;
        Ok((0..n).map(|i| eval_at(kernel, inputs, i)).collect())
    }
}

/// Data-parallel CPU backend on the global rayon pool.
#[derive(Clone, Copy, Debug)]
pub struct ParallelCpuBackend {
    min_chunk: usize,
}

impl Default for ParallelCpuBackend {
    fn default() -> Self {
        Self { min_chunk: 4096 }
    }
}

impl ComputeBackend for ParallelCpuBackend {
    fn name(&self) -> &'static str {
        "cpu-parallel"
    }

    fn compute(&self, kernel: &Kernel, inputs: &[&[f32]]) -> FramecutResult<Vec<f32>> {
        let n = check_inputs(kernel, inputs)?;
        Ok((0..n)
            .into_par_iter()
            .with_min_len(self.min_chunk)
            .map(|i| eval_at(kernel, inputs, i))
            .collect())
    }
}

/// Backend selection strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComputeBackendKind {
    /// GPU when available, else parallel CPU.
    #[default]
    Auto,
    Cpu,
    CpuParallel,
    Gpu,
}

impl std::str::FromStr for ComputeBackendKind {
    type Err = FramecutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cpu-parallel" => Ok(Self::CpuParallel),
            "gpu" => Ok(Self::Gpu),
            other => Err(FramecutError::validation(format!(
                "unknown compute backend '{other}' (expected auto, cpu, cpu-parallel or gpu)"
            ))),
        }
    }
}

/// Instantiate the backend for `kind`. Asking for an unavailable GPU is a validation error.
pub fn create_backend(kind: ComputeBackendKind) -> FramecutResult<Arc<dyn ComputeBackend>> {
    match kind {
        ComputeBackendKind::Cpu => Ok(Arc::new(CpuBackend)),
        ComputeBackendKind::CpuParallel => Ok(Arc::new(ParallelCpuBackend::default())),
        ComputeBackendKind::Gpu => gpu_backend(),
        ComputeBackendKind::Auto => match gpu_backend() {
            Ok(b) => Ok(b),
            Err(e) => {
                tracing::debug!("gpu backend unavailable, using cpu-parallel: {e}");
                Ok(Arc::new(ParallelCpuBackend::default()))
            }
        },
    }
}

#[cfg(feature = "gpu")]
fn gpu_backend() -> FramecutResult<Arc<dyn ComputeBackend>> {
    let backend = crate::compute::gpu::WgpuBackend::new()?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "gpu"))]
fn gpu_backend() -> FramecutResult<Arc<dyn ComputeBackend>> {
    Err(FramecutError::validation(
        "gpu backend unavailable: built without the `gpu` feature",
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/compute/backend.rs"]
mod tests;
