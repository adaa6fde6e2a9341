//! wgpu implementation of the compute capability.
//!
//! Device arithmetic is f32 (host coefficients are converted on upload, which
//! is the usual precision trade for GPU throughput here); reduction partials
//! are accumulated on the host in f64. Every operation submits its own
//! command encoder and readbacks block on the queue, matching the synchronous
//! contract of the solve call.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::solver::ell::{EllTopology, EllValues};
use crate::solver::engine::ComputeEngine;
use crate::solver::error::SolveError;
use crate::solver::gpu::context::GpuContext;

const WORKGROUP_SIZE: u32 = 64;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Params {
    n: u32,
    max_entries_per_row: u32,
    alpha: f32,
    beta: f32,
}

pub struct GpuVector {
    buffer: wgpu::Buffer,
    len: usize,
}

pub struct GpuEllMatrix {
    column_indices: wgpu::Buffer,
    values: wgpu::Buffer,
    num_rows: usize,
    max_entries_per_row: usize,
}

struct Pipelines {
    spmv_ell: wgpu::ComputePipeline,
    axpby: wgpu::ComputePipeline,
    mul_elem: wgpu::ComputePipeline,
    fill: wgpu::ComputePipeline,
    reduce_sum: wgpu::ComputePipeline,
    reduce_abs_sum: wgpu::ComputePipeline,
    reduce_dot: wgpu::ComputePipeline,
}

pub struct WgpuEngine {
    context: GpuContext,
    pipelines: Pipelines,
}

impl WgpuEngine {
    pub fn new(context: GpuContext) -> Self {
        let module = context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("linalg"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                    "shaders/linalg.wgsl"
                ))),
            });

        let pipeline = |entry_point: &str| {
            context
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry_point),
                    layout: None,
                    module: &module,
                    entry_point,
                    compilation_options: Default::default(),
                    cache: None,
                })
        };

        let pipelines = Pipelines {
            spmv_ell: pipeline("spmv_ell"),
            axpby: pipeline("axpby"),
            mul_elem: pipeline("mul_elem"),
            fill: pipeline("fill"),
            reduce_sum: pipeline("reduce_sum"),
            reduce_abs_sum: pipeline("reduce_abs_sum"),
            reduce_dot: pipeline("reduce_dot"),
        };

        Self { context, pipelines }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    fn storage_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            })
    }

    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        params: Params,
        buffers: &[(u32, &wgpu::Buffer)],
        num_groups: u32,
    ) {
        let params_buffer =
            self.context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params_buffer.as_entire_binding(),
        }];
        for &(binding, buffer) in buffers {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            });
        }
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &pipeline.get_bind_group_layout(0),
                entries: &entries,
            });

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("linalg op"),
                });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            cpass.set_pipeline(pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(num_groups, 1, 1);
        }
        self.context.queue.submit(Some(encoder.finish()));
    }

    /// Copies `size` bytes of `src` through a staging buffer and maps it.
    fn read_back(&self, src: &wgpu::Buffer, size: u64) -> Result<Vec<f32>, SolveError> {
        let staging = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("read back"),
                });
        encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
        self.context.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        let _ = self.context.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| SolveError::device("map callback dropped"))?
            .map_err(|e| SolveError::device(format!("buffer map failed: {e}")))?;

        let data = slice.get_mapped_range();
        let out: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(out)
    }

    fn reduce(
        &self,
        pipeline: &wgpu::ComputePipeline,
        x: &GpuVector,
        second: Option<&GpuVector>,
    ) -> Result<f64, SolveError> {
        if x.len == 0 {
            return Ok(0.0);
        }
        let num_groups = (x.len as u32).div_ceil(WORKGROUP_SIZE);
        let partials = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("partials"),
            size: num_groups as u64 * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let mut buffers = vec![(3u32, &x.buffer), (5u32, &partials)];
        if let Some(z) = second {
            buffers.push((2, &z.buffer));
        }
        let params = Params {
            n: x.len as u32,
            max_entries_per_row: 0,
            alpha: 0.0,
            beta: 0.0,
        };
        self.dispatch(pipeline, params, &buffers, num_groups);

        let partial_values = self.read_back(&partials, num_groups as u64 * 4)?;
        Ok(partial_values.iter().map(|&p| p as f64).sum())
    }

    fn elementwise(
        &self,
        pipeline: &wgpu::ComputePipeline,
        params: Params,
        buffers: &[(u32, &wgpu::Buffer)],
        n: usize,
    ) {
        if n == 0 {
            return;
        }
        self.dispatch(pipeline, params, buffers, (n as u32).div_ceil(WORKGROUP_SIZE));
    }
}

fn to_f32(host: &[f64]) -> Vec<f32> {
    host.iter().map(|&v| v as f32).collect()
}

impl ComputeEngine for WgpuEngine {
    type Vector = GpuVector;
    type Matrix = GpuEllMatrix;

    fn upload_matrix(
        &self,
        topo: &EllTopology,
        values: &EllValues,
    ) -> Result<Self::Matrix, SolveError> {
        Ok(GpuEllMatrix {
            column_indices: self
                .storage_buffer("ell columns", bytemuck::cast_slice(&topo.column_indices)),
            values: self.storage_buffer("ell values", bytemuck::cast_slice(&to_f32(&values.0))),
            num_rows: topo.num_rows,
            max_entries_per_row: topo.max_entries_per_row,
        })
    }

    fn refresh_matrix(
        &self,
        matrix: &mut Self::Matrix,
        values: &EllValues,
    ) -> Result<(), SolveError> {
        self.context
            .queue
            .write_buffer(&matrix.values, 0, bytemuck::cast_slice(&to_f32(&values.0)));
        Ok(())
    }

    fn upload_vector(&self, host: &[f64]) -> Result<Self::Vector, SolveError> {
        Ok(GpuVector {
            buffer: self.storage_buffer("vector", bytemuck::cast_slice(&to_f32(host))),
            len: host.len(),
        })
    }

    fn alloc_vector(&self, len: usize) -> Result<Self::Vector, SolveError> {
        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vector"),
            size: (len.max(1) * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Ok(GpuVector { buffer, len })
    }

    fn download_vector(&self, v: &Self::Vector, out: &mut [f64]) -> Result<(), SolveError> {
        if v.len == 0 {
            return Ok(());
        }
        let data = self.read_back(&v.buffer, v.len as u64 * 4)?;
        for (o, &f) in out.iter_mut().zip(&data) {
            *o = f as f64;
        }
        Ok(())
    }

    fn copy(&self, src: &Self::Vector, dst: &mut Self::Vector) -> Result<(), SolveError> {
        if src.len == 0 {
            return Ok(());
        }
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("copy vector"),
                });
        encoder.copy_buffer_to_buffer(&src.buffer, 0, &dst.buffer, 0, src.len as u64 * 4);
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn fill(&self, v: &mut Self::Vector, value: f64) -> Result<(), SolveError> {
        let params = Params {
            n: v.len as u32,
            max_entries_per_row: 0,
            alpha: value as f32,
            beta: 0.0,
        };
        self.elementwise(&self.pipelines.fill, params, &[(4, &v.buffer)], v.len);
        Ok(())
    }

    fn spmv(
        &self,
        a: &Self::Matrix,
        x: &Self::Vector,
        y: &mut Self::Vector,
    ) -> Result<(), SolveError> {
        let params = Params {
            n: a.num_rows as u32,
            max_entries_per_row: a.max_entries_per_row as u32,
            alpha: 0.0,
            beta: 0.0,
        };
        self.elementwise(
            &self.pipelines.spmv_ell,
            params,
            &[
                (1, &a.column_indices),
                (2, &a.values),
                (3, &x.buffer),
                (4, &y.buffer),
            ],
            a.num_rows,
        );
        Ok(())
    }

    fn dot(&self, x: &Self::Vector, y: &Self::Vector) -> Result<f64, SolveError> {
        self.reduce(&self.pipelines.reduce_dot, x, Some(y))
    }

    fn sum(&self, x: &Self::Vector) -> Result<f64, SolveError> {
        self.reduce(&self.pipelines.reduce_sum, x, None)
    }

    fn abs_sum(&self, x: &Self::Vector) -> Result<f64, SolveError> {
        self.reduce(&self.pipelines.reduce_abs_sum, x, None)
    }

    fn axpy(&self, alpha: f64, x: &Self::Vector, y: &mut Self::Vector) -> Result<(), SolveError> {
        self.axpby(alpha, x, 1.0, y)
    }

    fn axpby(
        &self,
        alpha: f64,
        x: &Self::Vector,
        beta: f64,
        y: &mut Self::Vector,
    ) -> Result<(), SolveError> {
        let params = Params {
            n: x.len as u32,
            max_entries_per_row: 0,
            alpha: alpha as f32,
            beta: beta as f32,
        };
        self.elementwise(
            &self.pipelines.axpby,
            params,
            &[(3, &x.buffer), (4, &y.buffer)],
            x.len,
        );
        Ok(())
    }

    fn mul_elem(&self, x: &Self::Vector, y: &mut Self::Vector) -> Result<(), SolveError> {
        let params = Params {
            n: x.len as u32,
            max_entries_per_row: 0,
            alpha: 0.0,
            beta: 0.0,
        };
        self.elementwise(
            &self.pipelines.mul_elem,
            params,
            &[(3, &x.buffer), (4, &y.buffer)],
            x.len,
        );
        Ok(())
    }
}
