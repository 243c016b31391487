// src/lighting/light.rs
// Directional light with a light-space view-projection derived from the
// scene's world-space bounding box

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// World-space axis-aligned bounding box enclosing every shadow caster
/// and receiver.
#[derive(Debug, Clone, Copy)]
pub struct SceneBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl SceneBounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }
}

/// GPU-aligned directional light data.
///
/// Layout must match `DirectionalLight` in `forward.wgsl`: three padded
/// vec3s followed by the light-space view-projection (112 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DirectionalLightGpu {
    pub direction: [f32; 3],
    pub _pad0: f32,
    pub color: [f32; 3],
    pub _pad1: f32,
    pub ambient: [f32; 3],
    pub _pad2: f32,
    pub view_proj: [f32; 16],
}

/// One directional light. `direction` points from the light toward the
/// scene and is kept normalized.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub ambient: Vec3,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, ambient: Vec3) -> Self {
        let direction = if direction.length_squared() <= 1.0e-6 {
            Vec3::new(0.0, -1.0, 0.0)
        } else {
            direction.normalize()
        };
        Self {
            direction,
            color,
            ambient,
        }
    }

    /// Up vector for the light's view basis. A light pointing almost
    /// straight up or down would make +Y degenerate, so +X substitutes.
    fn up_vector(&self) -> Vec3 {
        if self.direction.y.abs() > 0.99 {
            Vec3::X
        } else {
            Vec3::Y
        }
    }

    /// Light-space view-projection covering `bounds`: a view looking down
    /// the light direction from the origin, and an orthographic projection
    /// fitted to the bounds' extent in that view.
    pub fn view_projection(&self, bounds: &SceneBounds) -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, self.direction, self.up_vector());

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for corner in bounds.corners() {
            let p = view.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }

        // A small margin keeps boundary geometry off the shadow map edge.
        let expand = 0.01;
        min -= Vec3::splat(expand);
        max += Vec3::splat(expand);

        // View space looks down -Z, so the near plane is at -max.z.
        let projection = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, -max.z, -min.z);
        projection * view
    }

    pub fn to_gpu(&self, bounds: &SceneBounds) -> DirectionalLightGpu {
        DirectionalLightGpu {
            direction: self.direction.to_array(),
            _pad0: 0.0,
            color: self.color.to_array(),
            _pad1: 0.0,
            ambient: self.ambient.to_array(),
            _pad2: 0.0,
            view_proj: self.view_projection(bounds).to_cols_array(),
        }
    }
}
