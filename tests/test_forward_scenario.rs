// tests/test_forward_scenario.rs
// End-to-end scenario: the demo sphere casting onto the floor slab,
// rendered offscreen with the camera looking straight down at the shadow.
// Every visible pixel is then floor with a constant diffuse term, so hard
// techniques must produce exactly two shading levels. Skips when no GPU
// adapter is available.

use glam::Vec3;

use shadowlab::demo::{build_demo_scene, DEMO_LIGHT_DIRECTION};
use shadowlab::gpu::create_context_for_test;
use shadowlab::{
    ForwardRenderer, GpuContext, Material, RendererConfig, ShadowSettings, ShadowTechnique,
};

const SIZE: u32 = 256;

/// Render one frame of the demo scene with the camera hovering over the
/// floor patch around the sphere's shadow (centered near x=1, y=-2.5).
/// At 45 degrees fov and 3 units above the floor the frame spans roughly
/// x in [0.26, 2.74] and z in [-1.24, 1.24]: all floor, partly shadowed
/// by the sphere (and by the wall slab near the low-x edge), with the
/// sphere itself outside the frustum.
fn render_frame(ctx: &GpuContext, technique: ShadowTechnique, blur_radius: u32) -> Vec<u8> {
    let material_layout = Material::bind_group_layout(ctx);
    let mut scene = build_demo_scene(ctx, &material_layout, 1.0).unwrap();

    scene.camera.position = Vec3::new(1.5, 0.5, 0.0);
    scene.camera.target = Vec3::new(1.5, -2.5, 0.0);
    scene.camera.up = Vec3::X; // straight-down view needs a sideways up
    scene.camera.fov_y_deg = 45.0;

    let renderer = ForwardRenderer::new(
        ctx,
        RendererConfig {
            width: SIZE,
            height: SIZE,
            shadow: ShadowSettings {
                technique,
                blur_radius,
                ..Default::default()
            },
            ..Default::default()
        },
        scene.bind_group_layout(),
        material_layout,
    )
    .unwrap();

    scene.update(ctx);
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    renderer.render(ctx, &mut encoder, &scene).unwrap();
    ctx.queue.submit(Some(encoder.finish()));

    renderer.read_back_rgba(ctx).unwrap()
}

/// Expected floor shading levels: occlusion is 0 or 1, the floor normal
/// is +Y, and the material is white, so red = occlusion * diffuse + ambient.
fn expected_levels() -> (i32, i32) {
    let light = DEMO_LIGHT_DIRECTION.normalize();
    let diffuse = (-light).dot(Vec3::Y);
    let ambient = 0.15_f32;
    let lit = ((diffuse + ambient).min(1.0) * 255.0).round() as i32;
    let shadowed = (ambient * 255.0).round() as i32;
    (lit, shadowed)
}

#[test]
fn test_standard_shadow_is_hard_edged() {
    let Some(ctx) = create_context_for_test() else {
        return;
    };

    let pixels = render_frame(&ctx, ShadowTechnique::Standard, 0);
    let (lit, shadowed) = expected_levels();

    let mut lit_count = 0usize;
    let mut shadowed_count = 0usize;
    for px in pixels.chunks(4) {
        let r = px[0] as i32;
        let near_lit = (r - lit).abs() <= 2;
        let near_shadowed = (r - shadowed).abs() <= 2;
        assert!(
            near_lit || near_shadowed,
            "partial-coverage gradient value {r} in a hard shadow (expected ~{shadowed} or ~{lit})"
        );
        if near_lit {
            lit_count += 1;
        } else {
            shadowed_count += 1;
        }
    }

    // The silhouette must actually be in frame: both sides present.
    assert!(lit_count > 500, "lit region missing ({lit_count} px)");
    assert!(
        shadowed_count > 500,
        "shadow silhouette missing ({shadowed_count} px)"
    );
}

#[test]
fn test_pcf_levels_are_quantized_in_quarters() {
    let Some(ctx) = create_context_for_test() else {
        return;
    };

    let pixels = render_frame(&ctx, ShadowTechnique::Pcf, 0);
    let light = DEMO_LIGHT_DIRECTION.normalize();
    let diffuse = (-light).dot(Vec3::Y);
    let ambient = 0.15_f32;

    // occlusion in {0, 1/4, 1/2, 3/4, 1}
    let levels: Vec<i32> = (0..=4)
        .map(|q| {
            let occlusion = q as f32 * 0.25;
            ((occlusion * diffuse + ambient).min(1.0) * 255.0).round() as i32
        })
        .collect();

    for px in pixels.chunks(4) {
        let r = px[0] as i32;
        assert!(
            levels.iter().any(|&level| (r - level).abs() <= 2),
            "PCF value {r} is not a quarter level of {levels:?}"
        );
    }
}

#[test]
fn test_variance_zero_blur_matches_standard() {
    let Some(ctx) = create_context_for_test() else {
        return;
    };

    let standard = render_frame(&ctx, ShadowTechnique::Standard, 0);
    let variance = render_frame(&ctx, ShadowTechnique::Variance, 0);

    // Without the filter pair the moment buffer is a point-sampled
    // (d, d^2) field, so the statistical decision collapses to the binary
    // one. Differences are confined to the edge band: the standard path's
    // slope bias and the moment sampler's bilinear footprint each move
    // the boundary by a few texels.
    let mut mismatched = 0usize;
    for (a, b) in standard.chunks(4).zip(variance.chunks(4)) {
        if (a[0] as i32 - b[0] as i32).abs() > 2 {
            mismatched += 1;
        }
    }
    let fraction = mismatched as f64 / f64::from(SIZE * SIZE);
    assert!(
        fraction < 0.05,
        "variance(blur=0) diverges from standard on {:.1}% of pixels",
        fraction * 100.0
    );
}

#[test]
fn test_variance_blur_softens_the_edge() {
    let Some(ctx) = create_context_for_test() else {
        return;
    };

    let blurred = render_frame(&ctx, ShadowTechnique::Variance, 8);
    let (lit, shadowed) = expected_levels();

    // A blurred variance map must produce intermediate coverage between
    // the two hard levels somewhere along the silhouette.
    let intermediate = blurred
        .chunks(4)
        .filter(|px| {
            let r = px[0] as i32;
            r > shadowed + 10 && r < lit - 10
        })
        .count();
    assert!(
        intermediate > 100,
        "no penumbra found ({intermediate} intermediate px)"
    );
}
