//! Compute pipelines for layered hydraulic erosion.
//!
//! All state lives in storage buffers shaped exactly like the host arrays, so
//! upload and readback are plain byte copies. Each pass is its own compute
//! pass; the pass boundaries are the barriers between kernels.

use std::borrow::Cow;

use bytemuck::{Pod, Zeroable};

use super::context::{ErosionGpuContext, ErosionGpuError};
use crate::erosion::config::MAX_ROCK_TYPES;
use crate::erosion::params::{PassParams, OVERFLOW_EPSILON};
use crate::erosion::solver::{ErosionSolver, SolverError};
use crate::terrain::{GridLayout, HydraulicCell, SimulationGrid};

const FLAG_KEEP_WATER: u32 = 1;

/// Uniform block; mirrors `Params` in `layered.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuParams {
    side_length: u32,
    layer_count: u32,
    rock_count: u32,
    flags: u32,
    dampening: f32,
    time_delta: f32,
    height_multiplier: f32,
    sediment_capacity: f32,
    suspension_rate: f32,
    deposition_rate: f32,
    evaporation_rate: f32,
    maximal_erosion_depth: f32,
    slip_rate: f32,
    layer_cap: f32,
    overflow_epsilon: f32,
    _pad: f32,
    // hardness, talus, collapse threshold, unused
    rocks: [[f32; 4]; MAX_ROCK_TYPES],
}

impl GpuParams {
    fn new(layout: GridLayout, params: &PassParams) -> Self {
        let mut rocks = [[0.0f32; 4]; MAX_ROCK_TYPES];
        for (i, rock) in params.rocks.iter().take(MAX_ROCK_TYPES).enumerate() {
            rocks[i] = [rock.hardness, params.talus(i), rock.collapse_threshold, 0.0];
        }
        Self {
            side_length: layout.side_length(),
            layer_count: layout.layer_count() as u32,
            rock_count: layout.rock_type_count() as u32,
            flags: if params.keep_water_in_boundaries { FLAG_KEEP_WATER } else { 0 },
            dampening: params.dampening,
            time_delta: params.time_delta,
            height_multiplier: params.height_multiplier,
            sediment_capacity: params.sediment_capacity,
            suspension_rate: params.suspension_rate,
            deposition_rate: params.deposition_rate,
            evaporation_rate: params.evaporation_rate,
            maximal_erosion_depth: params.maximal_erosion_depth,
            slip_rate: params.slip_rate(),
            layer_cap: params.layer_cap,
            overflow_epsilon: OVERFLOW_EPSILON,
            _pad: 0.0,
            rocks,
        }
    }
}

/// Per-cell slippage outflow; mirrors `Slip` in `layered.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuSlip {
    amounts: [f32; 4],
    rock: u32,
    _pad: [u32; 3],
}

struct Kernels {
    apply_rain: wgpu::ComputePipeline,
    flow_compute: wgpu::ComputePipeline,
    flow_apply: wgpu::ComputePipeline,
    velocity: wgpu::ComputePipeline,
    suspend_deposit: wgpu::ComputePipeline,
    evaporate: wgpu::ComputePipeline,
    advect_gather: wgpu::ComputePipeline,
    advect_store: wgpu::ComputePipeline,
    slip_compute: wgpu::ComputePipeline,
    slip_apply: wgpu::ComputePipeline,
    redistribute: wgpu::ComputePipeline,
}

/// wgpu backend. Buffers are sized for one [`GridLayout`] at construction.
pub struct GpuSolver {
    ctx: ErosionGpuContext,
    layout: GridLayout,
    kernels: Kernels,
    bind_group: wgpu::BindGroup,
    params_buf: wgpu::Buffer,
    terrain_buf: wgpu::Buffer,
    cells_buf: wgpu::Buffer,
    rain_buf: wgpu::Buffer,
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl GpuSolver {
    pub fn new(ctx: ErosionGpuContext, layout: GridLayout) -> Result<Self, ErosionGpuError> {
        let sizes = [
            ("terrain", (layout.terrain_len() * std::mem::size_of::<f32>()) as u64),
            ("cells", (layout.cell_len() * std::mem::size_of::<HydraulicCell>()) as u64),
            ("slip", (layout.cell_len() * std::mem::size_of::<GpuSlip>()) as u64),
        ];
        for (label, size) in sizes {
            ctx.ensure_fits(label, size)?;
        }
        log::debug!(
            "allocating erosion buffers on {} (binding limit {} bytes)",
            ctx.adapter_name(),
            ctx.storage_limit()
        );

        let module = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("strata-layered-erosion-wgsl"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/layered.wgsl"))),
        });

        let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strata-erosion-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<GpuParams>() as u64),
                    },
                    count: None,
                },
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, true),
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });

        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("strata-erosion-pipeline-layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = |entry: &'static str| {
            ctx.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
        };
        let kernels = Kernels {
            apply_rain: pipeline("apply_rain"),
            flow_compute: pipeline("flow_compute"),
            flow_apply: pipeline("flow_apply"),
            velocity: pipeline("compute_velocity"),
            suspend_deposit: pipeline("suspend_deposit"),
            evaporate: pipeline("evaporate"),
            advect_gather: pipeline("advect_gather"),
            advect_store: pipeline("advect_store"),
            slip_compute: pipeline("slip_compute"),
            slip_apply: pipeline("slip_apply"),
            redistribute: pipeline("redistribute"),
        };

        let storage = |label: &str, size: u64| {
            ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let params_buf = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata-erosion-params"),
            size: std::mem::size_of::<GpuParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let terrain_buf = storage("strata-terrain", sizes[0].1);
        let cells_buf = storage("strata-cells", sizes[1].1);
        let slip_buf = storage("strata-slip", sizes[2].1);
        let rain_buf = storage("strata-rain", (layout.plane_size() * std::mem::size_of::<f32>()) as u64);
        let scratch_buf = storage("strata-scratch", (layout.cell_len() * std::mem::size_of::<f32>()) as u64);

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("strata-erosion-bind-group"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: terrain_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: cells_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: rain_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: scratch_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: slip_buf.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            ctx,
            layout,
            kernels,
            bind_group,
            params_buf,
            terrain_buf,
            cells_buf,
            rain_buf,
        })
    }

    fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, pipeline: &wgpu::ComputePipeline, per_layer: bool) {
        let side = self.layout.side_length();
        let groups = side.div_ceil(8);
        let depth = if per_layer { self.layout.layer_count() as u32 } else { 1 };
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("strata-erosion-pass"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, &self.bind_group, &[]);
        cpass.dispatch_workgroups(groups, groups, depth);
    }

    fn encode_iteration(&self, encoder: &mut wgpu::CommandEncoder, params: &PassParams) {
        let k = &self.kernels;
        self.dispatch(encoder, &k.apply_rain, false);
        self.dispatch(encoder, &k.flow_compute, true);
        self.dispatch(encoder, &k.flow_apply, true);
        self.dispatch(encoder, &k.velocity, true);
        self.dispatch(encoder, &k.suspend_deposit, true);
        self.dispatch(encoder, &k.evaporate, true);
        self.dispatch(encoder, &k.advect_gather, true);
        self.dispatch(encoder, &k.advect_store, true);
        if params.horizontal_erosion && params.slip_rate() > 0.0 {
            self.dispatch(encoder, &k.slip_compute, true);
            self.dispatch(encoder, &k.slip_apply, true);
        }
        if self.layout.layer_count() > 1 {
            self.dispatch(encoder, &k.redistribute, false);
        }
    }

    /// Copies a storage buffer back to the host, blocking until it is mapped.
    fn read_buffer<T: Pod>(&self, src: &wgpu::Buffer, label: &'static str) -> Result<Vec<T>, ErosionGpuError> {
        let size = src.size();
        let readback = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("strata-readback-encoder"),
        });
        encoder.copy_buffer_to_buffer(src, 0, &readback, 0, size);
        self.ctx.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        // Block until the mapping is ready.
        self.ctx.device.poll(wgpu::Maintain::Wait);
        let mapped = rx.recv().map_err(|e| e.to_string()).and_then(|r| r.map_err(|e| e.to_string()));
        if let Err(reason) = mapped {
            log::error!("GPU readback of {label} failed: {reason}");
            return Err(ErosionGpuError::BufferMap { label, reason });
        }

        let data = slice.get_mapped_range();
        let out = bytemuck::cast_slice::<u8, T>(&data).to_vec();
        drop(data);
        readback.unmap();
        Ok(out)
    }
}

impl ErosionSolver for GpuSolver {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn simulate(
        &mut self,
        grid: &mut SimulationGrid,
        params: &PassParams,
        iterations: u32,
        rain: &mut dyn FnMut(&mut [f32]),
    ) -> Result<(), SolverError> {
        if grid.layout() != self.layout {
            return Err(SolverError::LayoutMismatch {
                expected: self.layout,
                actual: grid.layout(),
            });
        }
        if iterations == 0 {
            return Ok(());
        }

        let queue = &self.ctx.queue;
        queue.write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&GpuParams::new(self.layout, params)));
        queue.write_buffer(&self.terrain_buf, 0, bytemuck::cast_slice(grid.terrain.as_slice()));
        queue.write_buffer(&self.cells_buf, 0, bytemuck::cast_slice(grid.hydraulics.as_slice()));

        let mut field = vec![0.0f32; self.layout.plane_size()];
        for _ in 0..iterations {
            field.fill(0.0);
            rain(&mut field);
            queue.write_buffer(&self.rain_buf, 0, bytemuck::cast_slice(&field));

            let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strata-erosion-step-encoder"),
            });
            self.encode_iteration(&mut encoder, params);
            queue.submit(Some(encoder.finish()));
        }

        let terrain: Vec<f32> = self.read_buffer(&self.terrain_buf, "terrain")?;
        let cells: Vec<HydraulicCell> = self.read_buffer(&self.cells_buf, "cells")?;

        // Commit only once both readbacks succeeded.
        grid.terrain.as_mut_slice().copy_from_slice(&terrain);
        grid.hydraulics.as_mut_slice().copy_from_slice(&cells);
        Ok(())
    }
}
