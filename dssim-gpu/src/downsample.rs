//! 2x2 box downsample dispatch.
//!
//! Produces the next scale level: `floor(w/2) x floor(h/2)` premultiplied
//! linear RGBA, plain average of each 2x2 block, odd last row/column
//! dropped.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::DssimError;
use crate::gpu::{workgroup_count, GpuContext};
use crate::image::{LinearImage, LinearRgba};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DownsampleParams {
    in_width: u32,
    in_height: u32,
    out_width: u32,
    out_height: u32,
}

/// Runs the 2x2 box downsample on one image and reads back the result.
///
/// # Errors
/// [`DssimError::DimensionsTooSmall`] when either output dimension would
/// be zero; [`DssimError::InvalidShape`] when the input pixel count
/// disagrees with its dimensions; GPU errors as surfaced by the context.
pub fn run_downsample(
    ctx: &GpuContext,
    module: &wgpu::ShaderModule,
    input: &LinearImage,
) -> Result<LinearImage, DssimError> {
    let in_width = input.width();
    let in_height = input.height();
    let in_count = in_width as usize * in_height as usize;
    if input.pixels().len() != in_count {
        return Err(DssimError::InvalidShape {
            expected: in_count,
            actual: input.pixels().len(),
        });
    }

    let out_width = in_width / 2;
    let out_height = in_height / 2;
    if out_width == 0 || out_height == 0 {
        return Err(DssimError::DimensionsTooSmall {
            width: in_width,
            height: in_height,
        });
    }
    let out_count = out_width as usize * out_height as usize;

    let device = ctx.device();
    let queue = ctx.queue();

    let params = DownsampleParams {
        in_width,
        in_height,
        out_width,
        out_height,
    };
    let in_bytes = (in_count * std::mem::size_of::<LinearRgba>()) as u64;
    let out_bytes = (out_count * std::mem::size_of::<LinearRgba>()) as u64;

    let input_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("downsample-input"),
        contents: bytemuck::cast_slice(input.pixels()),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let output_buf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("downsample-output"),
        size: out_bytes,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("downsample-read"),
        size: out_bytes,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("downsample-params"),
        contents: bytemuck::bytes_of(&params),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("downsample-bgl"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("downsample-pipeline-layout"),
        bind_group_layouts: &[&bgl],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("downsample-pipeline"),
        layout: Some(&pipeline_layout),
        module,
        entry_point: "main",
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("downsample-bg"),
        layout: &bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: input_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: output_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: params_buf.as_entire_binding(),
            },
        ],
    });

    let groups = workgroup_count(out_count as u32);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("downsample-encoder"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("downsample-pass"),
            ..Default::default()
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }
    encoder.copy_buffer_to_buffer(&output_buf, 0, &readback, 0, out_bytes);
    queue.submit([encoder.finish()]);
    log::debug!("downsample dispatch: {in_width}x{in_height} -> {out_width}x{out_height}");

    let bytes = ctx.read_buffer(&readback, out_bytes)?;
    let pixels: Vec<LinearRgba> = bytemuck::pod_collect_to_vec(&bytes);
    Ok(LinearImage::from_pixels(out_width, out_height, pixels))
}
