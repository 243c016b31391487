// src/targets.rs
// Arena-style render-target allocation with a generation counter.
// Targets are always created and destroyed as a batch (e.g. on resize);
// a handle from a previous generation is an error, never a dangling view.

use crate::error::RenderError;
use crate::gpu::GpuContext;

/// Description of one render-target entry.
#[derive(Debug, Clone)]
pub struct TargetDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

/// A texture plus its default view, owned by a [`TargetArena`].
#[derive(Debug)]
pub struct TargetEntry {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
}

/// Handle into a [`TargetArena`]. Copyable; validated on every access
/// against the arena's current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetHandle {
    index: u32,
    generation: u32,
}

/// Batch allocator for render targets.
///
/// `reset` drops every entry at once and bumps the generation, mirroring
/// how the targets are actually used: the forward color/depth pair is
/// rebuilt wholesale on resize, shadow targets live for the lifetime of
/// their technique and are never reset.
#[derive(Debug, Default)]
pub struct TargetArena {
    generation: u32,
    entries: Vec<TargetEntry>,
}

impl TargetArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Allocate a target in the current generation.
    pub fn allocate(&mut self, ctx: &GpuContext, desc: &TargetDesc) -> TargetHandle {
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let index = self.entries.len() as u32;
        self.entries.push(TargetEntry {
            texture,
            view,
            format: desc.format,
            width: desc.width,
            height: desc.height,
        });

        TargetHandle {
            index,
            generation: self.generation,
        }
    }

    /// Resolve a handle, rejecting handles from a previous generation.
    pub fn get(&self, handle: TargetHandle) -> Result<&TargetEntry, RenderError> {
        if handle.generation != self.generation {
            return Err(RenderError::resource(format!(
                "stale render-target handle (generation {} != {})",
                handle.generation, self.generation
            )));
        }
        self.entries
            .get(handle.index as usize)
            .ok_or_else(|| RenderError::resource("render-target handle out of range"))
    }

    /// Drop every entry and invalidate all outstanding handles.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    /// Total bytes of texture memory held by the arena.
    pub fn memory_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| {
                let bpp = e
                    .format
                    .block_copy_size(None)
                    .unwrap_or(4) as u64;
                u64::from(e.width) * u64::from(e.height) * bpp
            })
            .sum()
    }
}
