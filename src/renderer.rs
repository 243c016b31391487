// src/renderer.rs
// Shadow pipeline orchestrator: sequences the shadow-generation pass, the
// variance blur pair, and the forward-lit pass for the active technique,
// and owns the forward color/depth target.

use crate::error::RenderError;
use crate::gpu::{align_copy_bpr, GpuContext};
use crate::mesh::Vertex;
use crate::scene::Scene;
use crate::shadows::{ShadowSettings, ShadowTechniqueResources};
use crate::targets::{TargetArena, TargetDesc, TargetHandle};

pub const FORWARD_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Renderer configuration fixed at construction. Only the forward target
/// dimensions ever change afterwards (via `resize`).
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub color_format: wgpu::TextureFormat,
    pub shadow: ShadowSettings,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            shadow: ShadowSettings::default(),
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::resource(format!(
                "forward target {}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        self.shadow.validate()
    }
}

/// Forward renderer for one shadow technique.
///
/// Per frame, in strict order on one command encoder:
/// 1. shadow-generation pass into the technique's shadow buffer,
/// 2. (variance only) horizontal + vertical moment blur,
/// 3. forward pass into the color/depth target, evaluating occlusion per
///    fragment.
/// The pass boundaries carry the write-before-read dependencies; nothing
/// here blocks the recording thread.
pub struct ForwardRenderer {
    config: RendererConfig,
    arena: TargetArena,
    color_target: TargetHandle,
    depth_target: TargetHandle,
    technique: ShadowTechniqueResources,
    forward_pipeline: wgpu::RenderPipeline,
    material_layout: wgpu::BindGroupLayout,
}

impl ForwardRenderer {
    /// `material_layout` is shared with the scene's materials so their
    /// bind groups match the forward pipeline.
    pub fn new(
        ctx: &GpuContext,
        config: RendererConfig,
        scene_layout: &wgpu::BindGroupLayout,
        material_layout: wgpu::BindGroupLayout,
    ) -> Result<Self, RenderError> {
        config.validate()?;

        let technique = ShadowTechniqueResources::new(ctx, config.shadow.clone(), scene_layout)?;

        let mut arena = TargetArena::new();
        let (color_target, depth_target) = allocate_forward_targets(ctx, &mut arena, &config);

        let forward_pipeline = create_forward_pipeline(
            ctx,
            scene_layout,
            technique.bind_group_layout(),
            &material_layout,
            config.color_format,
        )?;

        Ok(Self {
            config,
            arena,
            color_target,
            depth_target,
            technique,
            forward_pipeline,
            material_layout,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn technique(&self) -> &ShadowTechniqueResources {
        &self.technique
    }

    pub fn material_layout(&self) -> &wgpu::BindGroupLayout {
        &self.material_layout
    }

    pub fn color_view(&self) -> Result<&wgpu::TextureView, RenderError> {
        Ok(&self.arena.get(self.color_target)?.view)
    }

    /// Recreate only the forward color/depth entries. Shadow-technique
    /// resources are untouched: the shadow map keeps its fixed resolution
    /// regardless of window size.
    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) {
        if width == 0 || height == 0 {
            // Minimized window; keep the old targets.
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.arena.reset();
        let (color, depth) = allocate_forward_targets(ctx, &mut self.arena, &self.config);
        self.color_target = color;
        self.depth_target = depth;
        log::debug!("forward target resized to {width}x{height}");
    }

    /// Record one frame for the scene into `encoder`.
    pub fn render(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &Scene,
    ) -> Result<(), RenderError> {
        self.record_shadow_pass(encoder, scene)?;

        if let Some(blur) = self.technique.blur() {
            let primary = self
                .technique
                .moment_view()?
                .ok_or_else(|| RenderError::resource("blur without a moment buffer"))?;
            let pingpong = self
                .technique
                .pingpong_view()?
                .ok_or_else(|| RenderError::resource("blur without a ping-pong buffer"))?;
            blur.execute(ctx, encoder, primary, pingpong);
        }

        self.record_forward_pass(encoder, scene)?;
        Ok(())
    }

    fn record_shadow_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &Scene,
    ) -> Result<(), RenderError> {
        let depth_view = self.technique.depth_view()?;
        let moment_view = self.technique.moment_view()?;

        // Unwritten moment texels must read as an unoccluded distribution,
        // so the clear is (1, 1). The aux depth attachment exists only to
        // resolve visibility within the pass and is discarded after it.
        let color_attachments = [moment_view.map(|view| wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color {
                    r: 1.0,
                    g: 1.0,
                    b: 0.0,
                    a: 0.0,
                }),
                store: wgpu::StoreOp::Store,
            },
        })];
        let color_attachments: &[Option<wgpu::RenderPassColorAttachment>] =
            if moment_view.is_some() {
                &color_attachments
            } else {
                &[]
            };

        let depth_store = if moment_view.is_some() {
            wgpu::StoreOp::Discard
        } else {
            wgpu::StoreOp::Store
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow_pass"),
            color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: depth_store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(self.technique.shadow_pipeline());
        pass.set_bind_group(0, scene.bind_group(), &[]);
        draw_instances(&mut pass, scene, false);
        Ok(())
    }

    fn record_forward_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &Scene,
    ) -> Result<(), RenderError> {
        let color_view = &self.arena.get(self.color_target)?.view;
        let depth_view = &self.arena.get(self.depth_target)?.view;

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("forward_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.forward_pipeline);
        pass.set_bind_group(0, scene.bind_group(), &[]);
        pass.set_bind_group(1, self.technique.bind_group(), &[]);
        draw_instances(&mut pass, scene, true);
        Ok(())
    }

    /// Copy the forward color target into a tightly packed RGBA byte
    /// vector. Blocks until the GPU work completes.
    pub fn read_back_rgba(&self, ctx: &GpuContext) -> Result<Vec<u8>, RenderError> {
        let entry = self.arena.get(self.color_target)?;
        let (width, height) = (entry.width, entry.height);
        let bytes_per_pixel = entry.format.block_copy_size(None).unwrap_or(4);
        if bytes_per_pixel != 4 {
            return Err(RenderError::readback(format!(
                "RGBA readback expects a 4-byte color format, got {:?}",
                entry.format
            )));
        }
        let unpadded_bpr = width * 4;
        let padded_bpr = align_copy_bpr(unpadded_bpr);

        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_buffer"),
            size: u64::from(padded_bpr) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RenderError::readback("map_async callback dropped"))?
            .map_err(|e| RenderError::readback(format!("buffer map failed: {e:?}")))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bpr * height) as usize);
        for row in 0..height {
            let start = (row * padded_bpr) as usize;
            pixels.extend_from_slice(&mapped[start..start + unpadded_bpr as usize]);
        }
        drop(mapped);
        buffer.unmap();

        Ok(pixels)
    }
}

fn draw_instances<'pass>(
    pass: &mut wgpu::RenderPass<'pass>,
    scene: &'pass Scene,
    bind_materials: bool,
) {
    for (id, instance) in scene.instances().iter().enumerate() {
        let (mesh, material) = scene.mesh(instance.mesh_id);
        if bind_materials {
            pass.set_bind_group(2, &material.bind_group, &[]);
        }
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        let id = id as u32;
        pass.draw_indexed(0..mesh.index_count, 0, id..id + 1);
    }
}

fn allocate_forward_targets(
    ctx: &GpuContext,
    arena: &mut TargetArena,
    config: &RendererConfig,
) -> (TargetHandle, TargetHandle) {
    let color = arena.allocate(
        ctx,
        &TargetDesc {
            label: "forward_color_target",
            width: config.width,
            height: config.height,
            format: config.color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        },
    );
    let depth = arena.allocate(
        ctx,
        &TargetDesc {
            label: "forward_depth_target",
            width: config.width,
            height: config.height,
            format: FORWARD_DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        },
    );
    (color, depth)
}

fn create_forward_pipeline(
    ctx: &GpuContext,
    scene_layout: &wgpu::BindGroupLayout,
    shadow_layout: &wgpu::BindGroupLayout,
    material_layout: &wgpu::BindGroupLayout,
    color_format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline, RenderError> {
    let shader = ctx.with_validation("forward shader", |device| {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("forward_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/forward.wgsl").into()),
        })
    })?;

    let pipeline_layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("forward_pipeline_layout"),
            bind_group_layouts: &[scene_layout, shadow_layout, material_layout],
            push_constant_ranges: &[],
        });

    ctx.with_validation("forward pipeline", |device| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("forward_pipeline"),
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
                format: FORWARD_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        })
    })
}

/// Fullscreen copy of the forward color target into a surface frame.
pub struct BlitPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl BlitPass {
    pub fn new(ctx: &GpuContext, target_format: wgpu::TextureFormat) -> Result<Self, RenderError> {
        let shader = ctx.with_validation("blit shader", |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("blit_shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blit.wgsl").into()),
            })
        })?;

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("blit_bind_group_layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("blit_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx.with_validation("blit pipeline", |device| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("blit_pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
            })
        })?;

        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blit_sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
            sampler,
        })
    }

    pub fn draw(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
    ) {
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blit_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(RendererConfig::default().validate().is_ok());
        let zero = RendererConfig {
            width: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }
}
