//! Stage0 dispatch: preprocess both inputs to luma records, then compute
//! windowed statistics and the quantized DSSIM map in a single command
//! batch.
//!
//! Buffer layout per dispatch: two RGBA input buffers, two luma record
//! buffers written by the preprocess pass and read by the Stage0 pass, one
//! `u32` DSSIM output, five `f32` statistics outputs and the uniform
//! parameter block. Everything is created here and dropped when the
//! readback completes.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::consts::QSCALE;
use crate::error::DssimError;
use crate::gpu::{workgroup_count, GpuContext};
use crate::image::LinearImage;

/// Uniform parameter block shared by the preprocess and Stage0 kernels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Stage0Params {
    pub len: u32,
    pub width: u32,
    pub height: u32,
    pub qscale: u32,
}

/// Per-pixel window statistics, read back only when requested.
#[derive(Debug, Clone)]
pub struct WindowStats {
    pub mu1: Vec<f32>,
    pub mu2: Vec<f32>,
    pub var1: Vec<f32>,
    pub var2: Vec<f32>,
    pub cov12: Vec<f32>,
}

/// Raw Stage0 outputs for one scale level.
#[derive(Debug, Clone)]
pub struct Stage0Output {
    pub dssim_q: Vec<u32>,
    pub stats: Option<WindowStats>,
}

fn storage_buffer(
    device: &wgpu::Device,
    label: &str,
    size: u64,
    copy_src: bool,
) -> wgpu::Buffer {
    let mut usage = wgpu::BufferUsages::STORAGE;
    if copy_src {
        usage |= wgpu::BufferUsages::COPY_SRC;
    }
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

fn readback_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

fn compute_bgl_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
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

fn uniform_bgl_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Runs preprocess + Stage0 on one image pair and reads back the quantized
/// DSSIM map (plus window statistics when `read_stats` is set).
///
/// # Errors
/// [`DssimError::InvalidShape`] if either input's pixel count disagrees
/// with its dimensions (checked before anything is submitted);
/// [`DssimError::InvalidInput`] if the pixel count exceeds a `u32`
/// dispatch length; GPU errors as surfaced by the context.
pub fn run_stage0(
    ctx: &GpuContext,
    preprocess_module: &wgpu::ShaderModule,
    stage0_module: &wgpu::ShaderModule,
    input1: &LinearImage,
    input2: &LinearImage,
    read_stats: bool,
) -> Result<Stage0Output, DssimError> {
    let width = input1.width();
    let height = input1.height();
    let elem_count = width as usize * height as usize;

    if input1.pixels().len() != elem_count {
        return Err(DssimError::InvalidShape {
            expected: elem_count,
            actual: input1.pixels().len(),
        });
    }
    if input2.width() != width || input2.height() != height || input2.pixels().len() != elem_count
    {
        return Err(DssimError::InvalidShape {
            expected: elem_count,
            actual: input2.pixels().len(),
        });
    }
    if u32::try_from(elem_count).is_err() {
        return Err(DssimError::InvalidInput(format!(
            "pixel count {elem_count} exceeds the u32 dispatch length"
        )));
    }

    let device = ctx.device();
    let queue = ctx.queue();

    let params = Stage0Params {
        len: elem_count as u32,
        width,
        height,
        qscale: QSCALE,
    };

    let rgba_bytes = (elem_count * std::mem::size_of::<[f32; 4]>()) as u64;
    let u32_bytes = (elem_count * std::mem::size_of::<u32>()) as u64;
    let f32_bytes = (elem_count * std::mem::size_of::<f32>()) as u64;

    let input1_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("stage0-input1"),
        contents: bytemuck::cast_slice(input1.pixels()),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let input2_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("stage0-input2"),
        contents: bytemuck::cast_slice(input2.pixels()),
        usage: wgpu::BufferUsages::STORAGE,
    });
    let luma1_buf = storage_buffer(device, "stage0-luma1", rgba_bytes, false);
    let luma2_buf = storage_buffer(device, "stage0-luma2", rgba_bytes, false);

    let dssim_buf = storage_buffer(device, "stage0-dssim-q", u32_bytes, true);
    let mu1_buf = storage_buffer(device, "stage0-mu1", f32_bytes, true);
    let mu2_buf = storage_buffer(device, "stage0-mu2", f32_bytes, true);
    let var1_buf = storage_buffer(device, "stage0-var1", f32_bytes, true);
    let var2_buf = storage_buffer(device, "stage0-var2", f32_bytes, true);
    let cov12_buf = storage_buffer(device, "stage0-cov12", f32_bytes, true);

    let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("stage0-params"),
        contents: bytemuck::bytes_of(&params),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    let dssim_read = readback_buffer(device, "stage0-dssim-read", u32_bytes);
    let stats_read = if read_stats {
        Some([
            readback_buffer(device, "stage0-mu1-read", f32_bytes),
            readback_buffer(device, "stage0-mu2-read", f32_bytes),
            readback_buffer(device, "stage0-var1-read", f32_bytes),
            readback_buffer(device, "stage0-var2-read", f32_bytes),
            readback_buffer(device, "stage0-cov12-read", f32_bytes),
        ])
    } else {
        None
    };

    // Preprocess pipeline: RGBA in, luma record out, params.
    let preprocess_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("preprocess-bgl"),
        entries: &[
            compute_bgl_entry(0, true),
            compute_bgl_entry(1, false),
            uniform_bgl_entry(2),
        ],
    });
    let preprocess_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("preprocess-pipeline-layout"),
        bind_group_layouts: &[&preprocess_bgl],
        push_constant_ranges: &[],
    });
    let preprocess_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("preprocess-pipeline"),
        layout: Some(&preprocess_pl),
        module: preprocess_module,
        entry_point: "main",
    });

    let preprocess_bg = |label: &str, input: &wgpu::Buffer, output: &wgpu::Buffer| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &preprocess_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        })
    };
    let preprocess_bg1 = preprocess_bg("preprocess-bg1", &input1_buf, &luma1_buf);
    let preprocess_bg2 = preprocess_bg("preprocess-bg2", &input2_buf, &luma2_buf);

    // Stage0 pipeline: two luma records in, six outputs, params.
    let stage0_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("stage0-bgl"),
        entries: &[
            compute_bgl_entry(0, true),
            compute_bgl_entry(1, true),
            compute_bgl_entry(2, false),
            compute_bgl_entry(3, false),
            compute_bgl_entry(4, false),
            compute_bgl_entry(5, false),
            compute_bgl_entry(6, false),
            compute_bgl_entry(7, false),
            uniform_bgl_entry(8),
        ],
    });
    let stage0_pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("stage0-pipeline-layout"),
        bind_group_layouts: &[&stage0_bgl],
        push_constant_ranges: &[],
    });
    let stage0_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("stage0-pipeline"),
        layout: Some(&stage0_pl),
        module: stage0_module,
        entry_point: "main",
    });

    let stage0_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("stage0-bg"),
        layout: &stage0_bgl,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: luma1_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: luma2_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: dssim_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: mu1_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: mu2_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: var1_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 6,
                resource: var2_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 7,
                resource: cov12_buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 8,
                resource: params_buf.as_entire_binding(),
            },
        ],
    });

    let groups = workgroup_count(params.len);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("stage0-encoder"),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("preprocess-pass"),
            ..Default::default()
        });
        pass.set_pipeline(&preprocess_pipeline);
        pass.set_bind_group(0, &preprocess_bg1, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
        pass.set_bind_group(0, &preprocess_bg2, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("stage0-pass"),
            ..Default::default()
        });
        pass.set_pipeline(&stage0_pipeline);
        pass.set_bind_group(0, &stage0_bg, &[]);
        pass.dispatch_workgroups(groups, 1, 1);
    }
    encoder.copy_buffer_to_buffer(&dssim_buf, 0, &dssim_read, 0, u32_bytes);
    if let Some(reads) = &stats_read {
        let sources = [&mu1_buf, &mu2_buf, &var1_buf, &var2_buf, &cov12_buf];
        for (src, dst) in sources.iter().zip(reads.iter()) {
            encoder.copy_buffer_to_buffer(src, 0, dst, 0, f32_bytes);
        }
    }

    queue.submit([encoder.finish()]);
    log::debug!("stage0 dispatch: {width}x{height}, {groups} workgroups");

    let dssim_bytes = ctx.read_buffer(&dssim_read, u32_bytes)?;
    let dssim_q: Vec<u32> = bytemuck::pod_collect_to_vec(&dssim_bytes);

    let stats = match &stats_read {
        Some([mu1_read, mu2_read, var1_read, var2_read, cov12_read]) => {
            let read_plane = |buf: &wgpu::Buffer| -> Result<Vec<f32>, DssimError> {
                let bytes = ctx.read_buffer(buf, f32_bytes)?;
                Ok(bytemuck::pod_collect_to_vec(&bytes))
            };
            Some(WindowStats {
                mu1: read_plane(mu1_read)?,
                mu2: read_plane(mu2_read)?,
                var1: read_plane(var1_read)?,
                var2: read_plane(var2_read)?,
                cov12: read_plane(cov12_read)?,
            })
        }
        None => None,
    };

    Ok(Stage0Output { dssim_q, stats })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_block_is_16_bytes() {
        assert_eq!(std::mem::size_of::<Stage0Params>(), 16);
    }
}
