// src/scene.rs
// Scene-side state: opaque instances, the per-instance transform set, the
// directional light, and the GPU buffers/bind group the rendering
// programs consume.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::camera::Camera;
use crate::error::RenderError;
use crate::gpu::GpuContext;
use crate::lighting::{DirectionalLight, DirectionalLightGpu, SceneBounds};
use crate::mesh::Mesh;

/// Upper bound on opaque instances; the instance storage buffer is sized
/// for this once at startup.
pub const MAX_INSTANCES: usize = 1024;

/// Per-instance transform set. Matches `InstanceTransforms` in the
/// shaders; indexed by `instance_index`.
///
/// Invariant: `shadow_wvp = light view-projection * world`, re-derived on
/// every update so it can never go stale against either input.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct InstanceTransformsGpu {
    pub world: [f32; 16],
    pub shadow_wvp: [f32; 16],
    pub camera_wvp: [f32; 16],
}

/// Scene globals uniform. Matches `SceneUniforms` in `forward.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneUniformsGpu {
    pub camera_pos: [f32; 3],
    pub _pad0: f32,
    pub light: DirectionalLightGpu,
}

/// One opaque draw: a mesh reference and its world transform.
#[derive(Debug, Clone, Copy)]
pub struct Instance {
    pub mesh_id: usize,
    pub world: Mat4,
}

/// Per-mesh material resources (a color texture and its sampler).
pub struct Material {
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    /// Build a 1x1 solid-color material, the demo's stand-in for real
    /// asset textures.
    pub fn solid_color(
        ctx: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        rgba: [u8; 4],
        label: &str,
    ) -> Self {
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        Self { bind_group }
    }

    pub fn bind_group_layout(ctx: &GpuContext) -> wgpu::BindGroupLayout {
        ctx.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("material_bind_group_layout"),
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
            })
    }
}

/// The render scene: meshes with materials, opaque instances, the
/// directional light and camera, plus the scene bind group (globals
/// uniform + instance transform storage buffer).
pub struct Scene {
    meshes: Vec<(Mesh, Material)>,
    instances: Vec<Instance>,
    pub bounds: SceneBounds,
    pub light: DirectionalLight,
    pub camera: Camera,

    uniform_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    light_view_proj: Mat4,
}

impl Scene {
    pub fn new(
        ctx: &GpuContext,
        bounds: SceneBounds,
        light: DirectionalLight,
        camera: Camera,
    ) -> Result<Self, RenderError> {
        let uniform_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_uniforms"),
            size: std::mem::size_of::<SceneUniformsGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let instance_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_instance_transforms"),
            size: (MAX_INSTANCES * std::mem::size_of::<InstanceTransformsGpu>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("scene_bind_group_layout"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(
                                    std::mem::size_of::<SceneUniformsGpu>() as u64,
                                ),
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::VERTEX,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: true },
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(
                                    std::mem::size_of::<InstanceTransformsGpu>() as u64,
                                ),
                            },
                            count: None,
                        },
                    ],
                });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scene_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: instance_buffer.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            meshes: Vec::new(),
            instances: Vec::new(),
            bounds,
            light,
            camera,
            uniform_buffer,
            instance_buffer,
            bind_group_layout,
            bind_group,
            light_view_proj: Mat4::IDENTITY,
        })
    }

    pub fn add_mesh(&mut self, mesh: Mesh, material: Material) -> usize {
        self.meshes.push((mesh, material));
        self.meshes.len() - 1
    }

    pub fn add_instance(&mut self, mesh_id: usize, world: Mat4) -> Result<usize, RenderError> {
        if mesh_id >= self.meshes.len() {
            return Err(RenderError::resource(format!(
                "instance references unknown mesh {mesh_id}"
            )));
        }
        if self.instances.len() >= MAX_INSTANCES {
            return Err(RenderError::resource(format!(
                "instance capacity {MAX_INSTANCES} exhausted"
            )));
        }
        self.instances.push(Instance { mesh_id, world });
        Ok(self.instances.len() - 1)
    }

    pub fn mesh(&self, mesh_id: usize) -> &(Mesh, Material) {
        &self.meshes[mesh_id]
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Light view-projection as of the last `update`.
    pub fn light_view_projection(&self) -> Mat4 {
        self.light_view_proj
    }

    /// Recompute the light transform from the current bounds and refresh
    /// the per-instance transform set and scene globals on the GPU. Must
    /// run whenever the light, camera, or any instance changed; the demo
    /// simply runs it every frame.
    pub fn update(&mut self, ctx: &GpuContext) {
        self.light_view_proj = self.light.view_projection(&self.bounds);
        let camera_vp = self.camera.view_projection();

        let transforms: Vec<InstanceTransformsGpu> = self
            .instances
            .iter()
            .map(|instance| InstanceTransformsGpu {
                world: instance.world.to_cols_array(),
                shadow_wvp: (self.light_view_proj * instance.world).to_cols_array(),
                camera_wvp: (camera_vp * instance.world).to_cols_array(),
            })
            .collect();
        if !transforms.is_empty() {
            ctx.queue
                .write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&transforms));
        }

        let uniforms = SceneUniformsGpu {
            camera_pos: self.camera.position.to_array(),
            _pad0: 0.0,
            light: self.light.to_gpu(&self.bounds),
        };
        ctx.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));
    }
}
