//! GPU context and host-side blocking helpers.
//!
//! The pipeline runs on a single host thread with the GPU as a parallel
//! coprocessor. Blocking waits happen in three places: adapter request,
//! device request (both via [`pollster`] on the wgpu futures) and buffer
//! map-for-read. The map wait issues `map_async` with a callback that flips
//! an atomic flag with release ordering, then pumps the device with short
//! sleeps until the flag is observed with acquire ordering, so the
//! callback's writes are visible to the reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::consts::WORKGROUP_SIZE;
use crate::error::DssimError;

/// Owns the wgpu device and queue for the lifetime of an engine. Buffers,
/// bind groups and pipelines are scoped to individual dispatches and never
/// stored here.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_description: String,
    device_lost: Arc<OnceLock<String>>,
}

fn backends_from_env() -> wgpu::Backends {
    use std::env;
    if let Ok(s) = env::var("WGPU_BACKENDS").or_else(|_| env::var("WGPU_BACKEND")) {
        let s_l = s.to_lowercase();
        if s_l.contains("metal") {
            return wgpu::Backends::METAL;
        }
        if s_l.contains("vulkan") {
            return wgpu::Backends::VULKAN;
        }
        if s_l.contains("dx12") {
            return wgpu::Backends::DX12;
        }
        if s_l.contains("gl") {
            return wgpu::Backends::GL;
        }
    }
    wgpu::Backends::all()
}

impl GpuContext {
    /// Requests an adapter and device suitable for the Stage0 kernel.
    ///
    /// # Errors
    /// Returns [`DssimError::GpuInit`] when no adapter is available or the
    /// device request fails.
    pub fn new() -> Result<Self, DssimError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: backends_from_env(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DssimError::GpuInit("no suitable GPU adapter".to_string()))?;

        let info = adapter.get_info();
        let adapter_description = if info.name.is_empty() {
            "unknown".to_string()
        } else {
            format!("{} ({:?})", info.name, info.backend)
        };
        log::debug!("adapter: {adapter_description}");

        let mut limits = adapter.limits().using_resolution(wgpu::Limits::downlevel_defaults());
        // Stage0 binds 8 storage buffers in one stage; downlevel defaults
        // only guarantee 4.
        limits.max_storage_buffers_per_shader_stage =
            limits.max_storage_buffers_per_shader_stage.max(8);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("dssim-gpu-device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
            },
            None,
        ))
        .map_err(|e| DssimError::GpuInit(format!("request_device failed: {e}")))?;

        let device_lost = Arc::new(OnceLock::new());
        let lost = Arc::clone(&device_lost);
        device.set_device_lost_callback(move |reason, message| {
            let _ = lost.set(format!("{reason:?}: {message}"));
        });

        Ok(Self {
            device,
            queue,
            adapter_description,
            device_lost,
        })
    }

    /// The wgpu device.
    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The wgpu queue.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Free-form description of the selected adapter, for reports.
    #[inline]
    #[must_use]
    pub fn adapter_description(&self) -> &str {
        &self.adapter_description
    }

    /// Returns [`DssimError::DeviceLost`] if the device-lost callback has
    /// fired.
    pub fn check_device_lost(&self) -> Result<(), DssimError> {
        match self.device_lost.get() {
            Some(reason) => Err(DssimError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    /// Compiles a WGSL module inside a validation error scope so that
    /// malformed shader text surfaces as [`DssimError::ShaderCompile`]
    /// instead of an uncaptured device error.
    pub fn create_shader_module(
        &self,
        name: &str,
        source: &str,
    ) -> Result<wgpu::ShaderModule, DssimError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DssimError::ShaderCompile {
                name: name.to_string(),
                message: err.to_string(),
            });
        }
        Ok(module)
    }

    /// Blocks until `buffer` (usage `MAP_READ`) is mapped, then copies out
    /// its first `byte_size` bytes and unmaps.
    ///
    /// # Errors
    /// [`DssimError::MapFailed`] when the map request fails,
    /// [`DssimError::DeviceLost`] when the device went away while waiting.
    pub fn read_buffer(
        &self,
        buffer: &wgpu::Buffer,
        byte_size: u64,
    ) -> Result<Vec<u8>, DssimError> {
        let done = Arc::new(AtomicBool::new(false));
        let failure: Arc<OnceLock<String>> = Arc::new(OnceLock::new());

        let slice = buffer.slice(..byte_size);
        {
            let done = Arc::clone(&done);
            let failure = Arc::clone(&failure);
            slice.map_async(wgpu::MapMode::Read, move |result| {
                if let Err(e) = result {
                    let _ = failure.set(e.to_string());
                }
                done.store(true, Ordering::Release);
            });
        }

        while !done.load(Ordering::Acquire) {
            let _ = self.device.poll(wgpu::Maintain::Poll);
            std::thread::sleep(Duration::from_millis(1));
        }
        self.check_device_lost()?;

        if let Some(message) = failure.get() {
            return Err(DssimError::MapFailed(message.clone()));
        }

        let data = slice.get_mapped_range();
        let bytes = data.to_vec();
        drop(data);
        buffer.unmap();
        Ok(bytes)
    }
}

/// 1-D workgroup count for `len` items.
#[inline]
#[must_use]
pub fn workgroup_count(len: u32) -> u32 {
    len.div_ceil(WORKGROUP_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(64), 1);
        assert_eq!(workgroup_count(65), 2);
        assert_eq!(workgroup_count(256), 4);
    }
}
