// tests/test_shadow_techniques.rs
// Construction tests for the three shadow techniques: resource sets,
// memory footprints, and settings validation. Skips when no GPU adapter
// is available.

use shadowlab::demo::build_demo_scene;
use shadowlab::gpu::create_context_for_test;
use shadowlab::shadows::SHADOW_MAP_RESOLUTION;
use shadowlab::{ForwardRenderer, Material, RendererConfig, ShadowSettings, ShadowTechnique};

fn build_renderer(
    ctx: &shadowlab::GpuContext,
    shadow: ShadowSettings,
) -> Result<ForwardRenderer, shadowlab::RenderError> {
    let material_layout = Material::bind_group_layout(ctx);
    let scene = build_demo_scene(ctx, &material_layout, 1.0)?;
    ForwardRenderer::new(
        ctx,
        RendererConfig {
            width: 64,
            height: 64,
            shadow,
            ..Default::default()
        },
        scene.bind_group_layout(),
        material_layout,
    )
}

#[test]
fn test_construct_all_techniques() {
    let Some(ctx) = create_context_for_test() else {
        return;
    };

    let res = u64::from(SHADOW_MAP_RESOLUTION);
    let depth_bytes = res * res * 4;
    let moment_bytes = 2 * res * res * 8; // primary + ping-pong, rgba16f

    for technique in [
        ShadowTechnique::Standard,
        ShadowTechnique::Pcf,
        ShadowTechnique::Variance,
    ] {
        let renderer = build_renderer(
            &ctx,
            ShadowSettings {
                technique,
                ..Default::default()
            },
        )
        .unwrap_or_else(|e| panic!("constructing {}: {e}", technique.name()));

        let resources = renderer.technique();
        assert_eq!(resources.technique(), technique);

        if technique.uses_moments() {
            assert_eq!(resources.memory_bytes(), depth_bytes + moment_bytes);
            // Default settings carry a non-zero kernel, so the filter
            // pair exists.
            assert!(resources.blur().is_some());
        } else {
            assert_eq!(resources.memory_bytes(), depth_bytes);
            assert!(resources.blur().is_none());
        }
    }
}

#[test]
fn test_variance_with_zero_radius_has_no_filter_pair() {
    let Some(ctx) = create_context_for_test() else {
        return;
    };

    let renderer = build_renderer(
        &ctx,
        ShadowSettings {
            technique: ShadowTechnique::Variance,
            blur_radius: 0,
            ..Default::default()
        },
    )
    .expect("variance without blur must construct");
    assert!(renderer.technique().blur().is_none());
}

#[test]
fn test_invalid_settings_abort_construction() {
    let Some(ctx) = create_context_for_test() else {
        return;
    };

    let result = build_renderer(
        &ctx,
        ShadowSettings {
            resolution: 64, // below the supported range
            ..Default::default()
        },
    );
    assert!(result.is_err());
}

#[test]
fn test_resize_leaves_shadow_resources_untouched() {
    let Some(ctx) = create_context_for_test() else {
        return;
    };

    let material_layout = Material::bind_group_layout(&ctx);
    let mut scene = build_demo_scene(&ctx, &material_layout, 1.0).unwrap();
    let mut renderer = ForwardRenderer::new(
        &ctx,
        RendererConfig {
            width: 128,
            height: 128,
            ..Default::default()
        },
        scene.bind_group_layout(),
        material_layout,
    )
    .unwrap();

    let shadow_memory = renderer.technique().memory_bytes();

    renderer.resize(&ctx, 300, 200);
    assert_eq!(renderer.technique().memory_bytes(), shadow_memory);
    assert_eq!(renderer.config().width, 300);

    // The resized forward target is the one the frame renders into.
    scene.update(&ctx);
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    renderer.render(&ctx, &mut encoder, &scene).unwrap();
    ctx.queue.submit(Some(encoder.finish()));

    let pixels = renderer.read_back_rgba(&ctx).unwrap();
    assert_eq!(pixels.len(), 300 * 200 * 4);
}
