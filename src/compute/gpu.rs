//! wgpu compute backend.
//!
//! Every kernel is compiled to a WGSL compute shader with its parameters baked into the source.
//! Pipelines are cached by source text, so a parameter change compiles a new program and
//! repeated calls with the same parameters reuse it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use crate::compute::backend::ComputeBackend;
use crate::compute::kernel::{Kernel, WGSL_HELPERS, check_inputs};
use crate::foundation::error::{FramecutError, FramecutResult};

const WORKGROUP_SIZE: u32 = 64;
const MAX_GROUPS_PER_DIM: u32 = 65_535;
const OPERANDS: usize = 6;

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: Mutex<HashMap<String, Arc<wgpu::ComputePipeline>>>,
}

impl WgpuBackend {
    /// Acquire a device on the first high-performance adapter.
    pub fn new() -> FramecutResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                FramecutError::validation("gpu backend unavailable: no adapter found")
            }
            other => FramecutError::validation(format!(
                "gpu backend unavailable: request_adapter failed: {other:?}"
            )),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("framecut_compute"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| {
            FramecutError::validation(format!("gpu backend unavailable: request_device failed: {e:?}"))
        })?;

        tracing::info!(adapter = ?adapter.get_info().name, "gpu compute backend ready");
        Ok(Self {
            device,
            queue,
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    fn pipeline(&self, kernel: &Kernel) -> Arc<wgpu::ComputePipeline> {
        let source = shader_source(kernel);
        let mut cache = self.pipelines.lock();
        if let Some(p) = cache.get(&source) {
            return Arc::clone(p);
        }
        tracing::debug!(kernel = kernel.name(), "compiling compute shader");
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kernel.name()),
                source: wgpu::ShaderSource::Wgsl(source.clone().into()),
            });
        let pipeline = Arc::new(self.device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(kernel.name()),
                layout: None,
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            },
        ));
        cache.insert(source, Arc::clone(&pipeline));
        pipeline
    }

    fn upload(&self, label: &str, data: &[f32], n: usize) -> wgpu::Buffer {
        let mut bytes = Vec::with_capacity(n * 4);
        for i in 0..n {
            bytes.extend_from_slice(&data.get(i).copied().unwrap_or(0.0).to_le_bytes());
        }
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: &bytes,
                usage: wgpu::BufferUsages::STORAGE,
            })
    }
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn compute(&self, kernel: &Kernel, inputs: &[&[f32]]) -> FramecutResult<Vec<f32>> {
        let n = check_inputs(kernel, inputs)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        let pipeline = self.pipeline(kernel);
        let size = (n as u64) * 4;

        let operands: Vec<wgpu::Buffer> = (0..OPERANDS)
            .map(|k| self.upload("framecut_operand", inputs.get(k).copied().unwrap_or(&[]), n))
            .collect();
        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("framecut_output"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("framecut_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = pipeline.get_bind_group_layout(0);
        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = operands
            .iter()
            .enumerate()
            .map(|(i, b)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: b.as_entire_binding(),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: OPERANDS as u32,
            resource: output.as_entire_binding(),
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("framecut_kernel_bg"),
            layout: &layout,
            entries: &entries,
        });

        let groups = (n as u32).div_ceil(WORKGROUP_SIZE);
        let gx = groups.min(MAX_GROUPS_PER_DIM);
        let gy = groups.div_ceil(gx);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("framecut_kernel_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("framecut_kernel_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(gx, gy, 1);
        }
        encoder.copy_buffer_to_buffer(&output, 0, &readback, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| FramecutError::evaluation(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| FramecutError::evaluation("readback channel closed"))?
            .map_err(|e| FramecutError::evaluation(format!("readback map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let out = mapped
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        drop(mapped);
        readback.unmap();
        Ok(out)
    }

    fn release(&self) {
        let mut cache = self.pipelines.lock();
        if !cache.is_empty() {
            tracing::debug!(pipelines = cache.len(), "releasing compute pipelines");
        }
        cache.clear();
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        self.pipelines.get_mut().clear();
    }
}

fn shader_source(kernel: &Kernel) -> String {
    format!(
        r#"@group(0) @binding(0) var<storage, read> in_a: array<f32>;
@group(0) @binding(1) var<storage, read> in_b: array<f32>;
@group(0) @binding(2) var<storage, read> in_c: array<f32>;
@group(0) @binding(3) var<storage, read> in_d: array<f32>;
@group(0) @binding(4) var<storage, read> in_e: array<f32>;
@group(0) @binding(5) var<storage, read> in_f: array<f32>;
@group(0) @binding(6) var<storage, read_write> out_v: array<f32>;
{WGSL_HELPERS}
@compute @workgroup_size({WORKGROUP_SIZE})
fn main(
  @builtin(workgroup_id) wg: vec3<u32>,
  @builtin(num_workgroups) nwg: vec3<u32>,
  @builtin(local_invocation_index) li: u32,
) {{
  let i = (wg.y * nwg.x + wg.x) * {WORKGROUP_SIZE}u + li;
  if (i >= arrayLength(&out_v)) {{
    return;
  }}
  let a = in_a[i];
  let b = in_b[i];
  let c = in_c[i];
  let d = in_d[i];
  let e = in_e[i];
  let f = in_f[i];
  out_v[i] = {expr};
}}
"#,
        expr = kernel.wgsl_expr()
    )
}

#[cfg(test)]
#[path = "../../tests/unit/compute/gpu.rs"]
mod tests;
