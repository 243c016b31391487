// src/shadows/blur.rs
// Separable Gaussian blur over the variance moment buffer.
// Two compute passes: horizontal into the ping-pong image, vertical back
// into the primary image consumed by the forward pass. Blurring moments
// is just a linear combination of (depth, depth^2) samples, so the
// Chebyshev reconstruction stays valid afterwards.

use bytemuck::{Pod, Zeroable};

use crate::error::RenderError;
use crate::gpu::GpuContext;

/// Parameters for one 1-D blur pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BlurParams {
    /// (1,0) for the horizontal pass, (0,1) for the vertical pass
    direction: [f32; 2],
    kernel_radius: u32,
    texture_size: u32,
}

/// Normalized 1-D Gaussian weights for taps -radius..=radius, with
/// sigma = radius / 2. The same formula runs in `moment_blur.wgsl`; this
/// copy exists for the exactness tests on the moment reconstruction.
pub fn gaussian_kernel(radius: u32) -> Vec<f32> {
    let sigma = (radius as f32 / 2.0).max(0.5);
    let mut weights = Vec::with_capacity(2 * radius as usize + 1);
    let mut sum = 0.0;
    for i in -(radius as i32)..=(radius as i32) {
        let x = i as f32 / sigma;
        let w = (-0.5 * x * x).exp();
        weights.push(w);
        sum += w;
    }
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

/// The blur filter pair for one variance shadow map.
pub struct MomentBlurPass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    kernel_radius: u32,
    texture_size: u32,
}

impl MomentBlurPass {
    pub fn new(ctx: &GpuContext, texture_size: u32, kernel_radius: u32) -> Result<Self, RenderError> {
        let shader = ctx.with_validation("moment blur shader", |device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("moment_blur_shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/moment_blur.wgsl").into()),
            })
        })?;

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("moment_blur_bind_group_layout"),
                    entries: &[
                        // Input moments
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        // Output moments
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::StorageTexture {
                                access: wgpu::StorageTextureAccess::WriteOnly,
                                format: wgpu::TextureFormat::Rgba16Float,
                                view_dimension: wgpu::TextureViewDimension::D2,
                            },
                            count: None,
                        },
                        // Pass parameters
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

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("moment_blur_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx.with_validation("moment blur pipeline", |device| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("moment_blur_pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: "cs_blur",
            })
        })?;

        let params_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("moment_blur_params"),
            // one slot per pass direction
            size: 2 * wgpu::util::align_to(
                std::mem::size_of::<BlurParams>() as u64,
                ctx.device.limits().min_uniform_buffer_offset_alignment as u64,
            ),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            pipeline,
            bind_group_layout,
            params_buffer,
            kernel_radius,
            texture_size,
        })
    }

    pub fn kernel_radius(&self) -> u32 {
        self.kernel_radius
    }

    /// Record both blur passes: primary -> ping-pong (horizontal), then
    /// ping-pong -> primary (vertical). The pass boundary between them
    /// orders the ping-pong write before its read.
    pub fn execute(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        primary: &wgpu::TextureView,
        pingpong: &wgpu::TextureView,
    ) {
        let slot = wgpu::util::align_to(
            std::mem::size_of::<BlurParams>() as u64,
            ctx.device.limits().min_uniform_buffer_offset_alignment as u64,
        );

        for (i, (input, output, direction, label)) in [
            (primary, pingpong, [1.0_f32, 0.0], "moment_blur_horizontal"),
            (pingpong, primary, [0.0_f32, 1.0], "moment_blur_vertical"),
        ]
        .into_iter()
        .enumerate()
        {
            let params = BlurParams {
                direction,
                kernel_radius: self.kernel_radius,
                texture_size: self.texture_size,
            };
            let offset = i as u64 * slot;
            ctx.queue
                .write_buffer(&self.params_buffer, offset, bytemuck::cast_slice(&[params]));

            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(input),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(output),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &self.params_buffer,
                            offset,
                            size: wgpu::BufferSize::new(std::mem::size_of::<BlurParams>() as u64),
                        }),
                    },
                ],
            });

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);

            let workgroup_size = 8;
            let groups = (self.texture_size + workgroup_size - 1) / workgroup_size;
            pass.dispatch_workgroups(groups, groups, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_params_layout() {
        assert_eq!(std::mem::size_of::<BlurParams>(), 16);
    }

    #[test]
    fn test_kernel_normalized_and_symmetric() {
        for radius in [1, 2, 4, 8] {
            let weights = gaussian_kernel(radius);
            assert_eq!(weights.len(), 2 * radius as usize + 1);
            let sum: f32 = weights.iter().sum();
            assert!((sum - 1.0).abs() < 1.0e-5);
            for i in 0..radius as usize {
                let mirror = weights.len() - 1 - i;
                assert!((weights[i] - weights[mirror]).abs() < 1.0e-6);
            }
            // Center tap dominates
            let center = weights[radius as usize];
            assert!(weights.iter().all(|&w| w <= center));
        }
    }

    #[test]
    fn test_blur_of_constant_moments_is_exact() {
        // Under a single planar occluder every sample holds the same
        // (d, d^2), so any normalized kernel returns the moments
        // unchanged and the occlusion decision matches the unblurred
        // point sample.
        use crate::lighting::occlusion::{standard_occlusion, variance_occlusion};
        use glam::Vec2;

        let depth = 0.35_f32;
        let weights = gaussian_kernel(4);

        let mut m1 = 0.0;
        let mut m2 = 0.0;
        for &w in &weights {
            m1 += w * depth;
            m2 += w * depth * depth;
        }

        for fragment_depth in [0.2, 0.35, 0.5, 0.9] {
            let blurred = variance_occlusion(Vec2::new(m1, m2), fragment_depth);
            let point = standard_occlusion(fragment_depth, depth, 0.0);
            assert_eq!(blurred, point, "fragment depth {fragment_depth}");
        }
    }
}
