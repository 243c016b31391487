// src/shadows/technique.rs
// Per-technique shadow resources: render targets, samplers, the
// shadow-generation pipeline, and the bind group the forward pass samples
// the shadow buffer through.

use bytemuck::{Pod, Zeroable};

use crate::error::RenderError;
use crate::gpu::GpuContext;
use crate::mesh::Vertex;
use crate::shadows::blur::MomentBlurPass;
use crate::targets::{TargetArena, TargetDesc, TargetHandle};

/// Fixed shadow-map resolution; independent of the window size and never
/// touched by resize events.
pub const SHADOW_MAP_RESOLUTION: u32 = 1024;

pub const SHADOW_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Moment buffer format. The two moments live in .rg; Rgba16Float is the
/// one format that is both linearly filterable and storage-bindable,
/// which the evaluator and the blur pass respectively require.
pub const MOMENT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Shadow technique enumeration.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowTechnique {
    Standard = 0,
    Pcf = 1,
    Variance = 2,
}

impl ShadowTechnique {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShadowTechnique::Standard => "standard",
            ShadowTechnique::Pcf => "pcf",
            ShadowTechnique::Variance => "variance",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "standard" | "hard" => Some(ShadowTechnique::Standard),
            "pcf" => Some(ShadowTechnique::Pcf),
            "variance" | "vsm" => Some(ShadowTechnique::Variance),
            _ => None,
        }
    }

    /// Whether the technique renders and samples a moment buffer instead
    /// of reading the depth attachment directly.
    pub fn uses_moments(&self) -> bool {
        matches!(self, ShadowTechnique::Variance)
    }
}

/// Construction-time shadow configuration.
#[derive(Debug, Clone)]
pub struct ShadowSettings {
    pub technique: ShadowTechnique,
    pub resolution: u32,
    /// Gaussian kernel radius for the variance blur; 0 disables the
    /// filter pair entirely.
    pub blur_radius: u32,
    /// Weight of the Blinn-Phong specular term in the lighting combine.
    /// The reference behavior keeps specular off.
    pub specular_weight: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            technique: ShadowTechnique::Standard,
            resolution: SHADOW_MAP_RESOLUTION,
            blur_radius: 4,
            specular_weight: 0.0,
        }
    }
}

impl ShadowSettings {
    pub fn validate(&self) -> Result<(), RenderError> {
        if !(256..=8192).contains(&self.resolution) {
            return Err(RenderError::resource(format!(
                "shadow resolution {} outside 256..=8192",
                self.resolution
            )));
        }
        if self.blur_radius > 32 {
            return Err(RenderError::resource(format!(
                "blur radius {} exceeds 32",
                self.blur_radius
            )));
        }
        if !(0.0..=1.0).contains(&self.specular_weight) {
            return Err(RenderError::resource(format!(
                "specular weight {} outside 0..=1",
                self.specular_weight
            )));
        }
        Ok(())
    }
}

/// Uniform block consumed by the forward fragment shader.
/// Matches `ShadowParams` in `forward.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowParamsGpu {
    pub technique: u32,
    pub shadow_map_size: f32,
    pub specular_weight: f32,
    pub _pad: u32,
}

/// Everything one shadow technique owns: its target arena, samplers,
/// shadow-generation pipeline, optional blur pair, and the bind group the
/// forward pass uses to sample the (possibly filtered) shadow buffer.
///
/// Only the variant selected in the settings is built; a construction
/// failure aborts startup rather than leaving partial resources behind.
pub struct ShadowTechniqueResources {
    settings: ShadowSettings,
    arena: TargetArena,
    depth_target: TargetHandle,
    moment_target: Option<TargetHandle>,
    moment_pingpong: Option<TargetHandle>,
    blur: Option<MomentBlurPass>,
    shadow_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    params_buffer: wgpu::Buffer,
    // Bound in place of the moment buffer for Standard/PCF so one layout
    // serves every technique.
    _fallback_moments: Option<wgpu::Texture>,
}

impl ShadowTechniqueResources {
    pub fn new(
        ctx: &GpuContext,
        settings: ShadowSettings,
        scene_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self, RenderError> {
        settings.validate()?;

        let resolution = settings.resolution;
        let mut arena = TargetArena::new();

        let depth_target = arena.allocate(
            ctx,
            &TargetDesc {
                label: "shadow_depth_target",
                width: resolution,
                height: resolution,
                format: SHADOW_DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            },
        );

        let (moment_target, moment_pingpong) = if settings.technique.uses_moments() {
            let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING;
            let primary = arena.allocate(
                ctx,
                &TargetDesc {
                    label: "shadow_moment_target",
                    width: resolution,
                    height: resolution,
                    format: MOMENT_FORMAT,
                    usage,
                },
            );
            let pingpong = arena.allocate(
                ctx,
                &TargetDesc {
                    label: "shadow_moment_pingpong",
                    width: resolution,
                    height: resolution,
                    format: MOMENT_FORMAT,
                    usage,
                },
            );
            (Some(primary), Some(pingpong))
        } else {
            (None, None)
        };

        let blur = if settings.technique.uses_moments() && settings.blur_radius > 0 {
            Some(MomentBlurPass::new(ctx, resolution, settings.blur_radius)?)
        } else {
            None
        };

        let depth_sampler = create_depth_sampler(ctx);
        let moment_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_moment_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: None,
            ..Default::default()
        });

        let params = ShadowParamsGpu {
            technique: settings.technique.as_u32(),
            shadow_map_size: resolution as f32,
            specular_weight: settings.specular_weight,
            _pad: 0,
        };
        let params_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow_params"),
            size: std::mem::size_of::<ShadowParamsGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue
            .write_buffer(&params_buffer, 0, bytemuck::cast_slice(&[params]));

        let bind_group_layout = create_shadow_bind_group_layout(ctx);

        // Standard/PCF never sample moments but the layout still wants a
        // float texture there.
        let (fallback_moments, moment_view_for_binding) = match moment_target {
            Some(handle) => (
                None,
                arena.get(handle)?.texture.create_view(&Default::default()),
            ),
            None => {
                let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("shadow_moment_fallback"),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: MOMENT_FORMAT,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                });
                let view = texture.create_view(&Default::default());
                (Some(texture), view)
            }
        };

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&arena.get(depth_target)?.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&depth_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&moment_view_for_binding),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&moment_sampler),
                },
            ],
        });

        let shadow_pipeline = create_shadow_pipeline(ctx, &settings, scene_layout)?;

        Ok(Self {
            settings,
            arena,
            depth_target,
            moment_target,
            moment_pingpong,
            blur,
            shadow_pipeline,
            bind_group_layout,
            bind_group,
            params_buffer,
            _fallback_moments: fallback_moments,
        })
    }

    pub fn technique(&self) -> ShadowTechnique {
        self.settings.technique
    }

    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    pub fn shadow_pipeline(&self) -> &wgpu::RenderPipeline {
        &self.shadow_pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Bind group sampled by the forward pass.
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn blur(&self) -> Option<&MomentBlurPass> {
        self.blur.as_ref()
    }

    pub fn depth_view(&self) -> Result<&wgpu::TextureView, RenderError> {
        Ok(&self.arena.get(self.depth_target)?.view)
    }

    pub fn moment_view(&self) -> Result<Option<&wgpu::TextureView>, RenderError> {
        match self.moment_target {
            Some(handle) => Ok(Some(&self.arena.get(handle)?.view)),
            None => Ok(None),
        }
    }

    pub fn pingpong_view(&self) -> Result<Option<&wgpu::TextureView>, RenderError> {
        match self.moment_pingpong {
            Some(handle) => Ok(Some(&self.arena.get(handle)?.view)),
            None => Ok(None),
        }
    }

    /// Refresh the technique uniform after a settings tweak (e.g. the
    /// specular toggle).
    pub fn upload_params(&self, ctx: &GpuContext) {
        let params = ShadowParamsGpu {
            technique: self.settings.technique.as_u32(),
            shadow_map_size: self.settings.resolution as f32,
            specular_weight: self.settings.specular_weight,
            _pad: 0,
        };
        ctx.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&[params]));
    }

    /// GPU memory consumed by the shadow targets.
    pub fn memory_bytes(&self) -> u64 {
        self.arena.memory_bytes()
    }
}

fn create_depth_sampler(ctx: &GpuContext) -> wgpu::Sampler {
    // Nearest filtering, clamped to an opaque-white border so samples
    // outside the map read as "far" (unoccluded). Border clamping is a
    // native-only feature; fall back to edge clamping without it.
    if ctx.supports_border_clamp() {
        ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_depth_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToBorder,
            address_mode_v: wgpu::AddressMode::ClampToBorder,
            address_mode_w: wgpu::AddressMode::ClampToBorder,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            border_color: Some(wgpu::SamplerBorderColor::OpaqueWhite),
            ..Default::default()
        })
    } else {
        log::warn!("adapter lacks clamp-to-border; shadow sampler clamps to edge");
        ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_depth_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }
}

fn create_shadow_bind_group_layout(ctx: &GpuContext) -> wgpu::BindGroupLayout {
    ctx.device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<ShadowParamsGpu>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        })
}

fn create_shadow_pipeline(
    ctx: &GpuContext,
    settings: &ShadowSettings,
    scene_layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::RenderPipeline, RenderError> {
    let (label, source): (&str, &str) = if settings.technique.uses_moments() {
        ("shadow_moments_shader", include_str!("../shaders/shadow_moments.wgsl"))
    } else {
        ("shadow_depth_shader", include_str!("../shaders/shadow_depth.wgsl"))
    };

    let shader = ctx.with_validation(label, |device| {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    })?;

    let pipeline_layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow_pipeline_layout"),
            bind_group_layouts: &[scene_layout],
            push_constant_ranges: &[],
        });

    let fragment = if settings.technique.uses_moments() {
        Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: MOMENT_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        })
    } else {
        None
    };

    ctx.with_validation("shadow pipeline", |device| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SHADOW_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment,
            multiview: None,
        })
    })
}
