// src/gpu.rs
// Explicit GPU context passed by reference to all construction and
// per-frame calls; owns the device, queue and adapter

use crate::error::RenderError;

/// GPU device context shared by the whole renderer.
///
/// Created once at startup (with or without a surface to present to) and
/// threaded through every constructor and per-frame call by reference, so
/// resource ownership is always explicit.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Create a headless context (offscreen rendering, tests, snapshots).
    pub fn new() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        pollster::block_on(Self::request(&instance, None))
    }

    /// Request an adapter and device, optionally compatible with a surface.
    pub async fn request(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, RenderError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| RenderError::device("no suitable GPU adapter"))?;

        log::info!(
            "using adapter: {} ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        // Border-clamped shadow samplers need a native-only feature; take
        // it when the adapter offers it and fall back to edge clamping
        // otherwise (see ShadowTechniqueResources).
        let mut features = wgpu::Features::empty();
        if adapter
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
        {
            features |= wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("shadowlab-device"),
                    required_features: features,
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::device(format!("request_device failed: {e}")))?;

        Ok(Self {
            device,
            queue,
            adapter,
        })
    }

    /// Whether shadow samplers may use clamp-to-border addressing.
    pub fn supports_border_clamp(&self) -> bool {
        self.device
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER)
    }

    /// Run resource construction under a validation error scope so a bad
    /// shader or pipeline surfaces as a fatal `RenderError` at startup
    /// instead of an uncaptured-error panic later.
    pub fn with_validation<T>(
        &self,
        what: &str,
        build: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, RenderError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = build(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(value),
            Some(err) => Err(RenderError::pipeline(format!("{what}: {err}"))),
        }
    }
}

/// Create a context for GPU-dependent tests. Returns `None` when the
/// machine has no usable adapter so tests can skip instead of failing.
pub fn create_context_for_test() -> Option<GpuContext> {
    match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

/// Align to WebGPU's required bytes-per-row for texture-to-buffer copies.
#[inline]
pub fn align_copy_bpr(unpadded: u32) -> u32 {
    let a = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    ((unpadded + a - 1) / a) * a
}
