// src/demo.rs
// The comparison scene: a unit sphere at the origin casting onto two
// large slabs, lit by one directional light. Shared by the viewer binary
// and the end-to-end tests.

use glam::{Mat4, Vec3};

use crate::camera::Camera;
use crate::error::RenderError;
use crate::gpu::GpuContext;
use crate::lighting::{DirectionalLight, SceneBounds};
use crate::mesh::{cube_geometry, sphere_geometry, Mesh};
use crate::scene::{Material, Scene};

/// Light direction used by the comparison scene.
pub const DEMO_LIGHT_DIRECTION: Vec3 = Vec3::new(0.4, -1.0, 0.0);

/// Build the demo scene. `material_layout` comes from the renderer so the
/// material bind groups match its forward pipeline.
pub fn build_demo_scene(
    ctx: &GpuContext,
    material_layout: &wgpu::BindGroupLayout,
    aspect: f32,
) -> Result<Scene, RenderError> {
    let bounds = SceneBounds::new(Vec3::new(-5.0, -5.0, -10.0), Vec3::new(5.0, 5.0, 10.0));
    let light = DirectionalLight::new(DEMO_LIGHT_DIRECTION, Vec3::ONE, Vec3::splat(0.15));
    let camera = Camera::new(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, aspect);

    let mut scene = Scene::new(ctx, bounds, light, camera)?;

    let (sphere_vertices, sphere_indices) = sphere_geometry(64, 64);
    let sphere = scene.add_mesh(
        Mesh::upload(ctx, &sphere_vertices, &sphere_indices, "demo_sphere"),
        Material::solid_color(ctx, material_layout, [255, 255, 255, 255], "demo_white"),
    );

    let (cube_vertices, cube_indices) = cube_geometry();
    let cube = scene.add_mesh(
        Mesh::upload(ctx, &cube_vertices, &cube_indices, "demo_cube"),
        Material::solid_color(ctx, material_layout, [255, 255, 255, 255], "demo_white"),
    );

    scene.add_instance(sphere, Mat4::IDENTITY)?;
    // A wall and a floor act as shadow receivers.
    scene.add_instance(
        cube,
        Mat4::from_translation(Vec3::new(-3.0, 0.0, 0.0)) * Mat4::from_scale(Vec3::new(1.0, 10.0, 10.0)),
    )?;
    scene.add_instance(
        cube,
        Mat4::from_translation(Vec3::new(0.0, -3.0, 0.0)) * Mat4::from_scale(Vec3::new(10.0, 1.0, 10.0)),
    )?;

    Ok(scene)
}
