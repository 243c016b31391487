// src/lighting/occlusion.rs
// Per-technique occlusion estimation, CPU reference implementation.
//
// `forward.wgsl` mirrors these functions texel for texel; keeping the math
// here as plain Rust lets the statistical properties be tested without a
// GPU device. Inputs follow the shader's conventions: `light_dir` is the
// light's propagation direction (light toward surface, as stored on the
// directional light), `light_pos` is the fragment's position in light
// clip space with `.xy` in [-1, 1] NDC and `.z` the light-space depth in
// [0, 1].

use glam::{Vec2, Vec3};

/// Slope-bias scale and ceiling. The bias grows with the tangent of the
/// angle between surface normal and light direction and is clamped so it
/// cannot blow up as the angle approaches 90 degrees.
pub const BIAS_SCALE: f32 = 0.005;
pub const MAX_BIAS: f32 = 0.005;

/// Fixed 4-tap Poisson disk used by the PCF kernel.
pub const POISSON_DISK: [[f32; 2]; 4] = [
    [-0.942_016_24, -0.399_062_16],
    [0.945_586_09, -0.768_907_25],
    [-0.094_184_101, -0.929_388_70],
    [0.344_959_38, 0.293_877_60],
];

/// Divisor converting the unit Poisson offsets into texture-space offsets,
/// tuned against the 1024x1024 shadow map.
pub const POISSON_SPREAD: f32 = 700.0;

/// Lower edge of the light-bleed remap: Chebyshev bounds below this are
/// treated as fully occluded.
pub const LIGHT_BLEED_MIN: f32 = 0.4;

/// Floor applied to the reconstructed variance so the Chebyshev ratio
/// never divides by (near) zero. Small enough that a planar
/// occluder/receiver pair still resolves to an effectively exact edge.
pub const MIN_VARIANCE: f32 = 1.0e-5;

/// Convert light-space NDC xy to shadow-map texture coordinates.
///
/// wgpu's NDC y points up while texture v grows downward, so v is
/// flipped; the shader applies the same mapping.
#[inline]
pub fn ndc_to_uv(ndc_xy: Vec2) -> Vec2 {
    Vec2::new(0.5 * ndc_xy.x + 0.5, 0.5 - 0.5 * ndc_xy.y)
}

/// Slope-scaled depth bias from `dot(normal, to_light)`, the cosine of
/// the angle between the surface normal and the direction toward the
/// light.
#[inline]
pub fn slope_scaled_bias(n_dot_l: f32) -> f32 {
    (BIAS_SCALE * n_dot_l.clamp(0.0, 1.0).acos().tan()).clamp(0.0, MAX_BIAS)
}

/// Hard shadow test: one biased binary comparison against a single
/// nearest-filtered depth sample. Returns exactly 0.0 or 1.0.
#[inline]
pub fn standard_occlusion(light_depth: f32, stored_depth: f32, bias: f32) -> f32 {
    if light_depth - bias <= stored_depth {
        1.0
    } else {
        0.0
    }
}

/// Percentage-closer filtering: the mean of four biased binary tests at
/// fixed Poisson offsets around `uv`. Quantized to quarters.
///
/// `sample_depth` abstracts the shadow map so the kernel is testable
/// against synthetic depth fields.
pub fn pcf_occlusion<F>(uv: Vec2, light_depth: f32, bias: f32, sample_depth: F) -> f32
where
    F: Fn(Vec2) -> f32,
{
    let mut occlusion = 0.0;
    for offset in POISSON_DISK {
        let tap = uv + Vec2::from_array(offset) / POISSON_SPREAD;
        occlusion += 0.25 * standard_occlusion(light_depth, sample_depth(tap), bias);
    }
    occlusion
}

/// Inverse lerp clamped to [0, 1].
#[inline]
pub fn linstep(min: f32, max: f32, value: f32) -> f32 {
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Variance shadow map test from the filtered moments (M1, M2).
///
/// Mean and variance of the depth distribution inside the filter
/// footprint are reconstructed as `mean = M1`, `var = M2 - M1^2`. For
/// fragments at or in front of the mean the surface is fully lit;
/// Chebyshev's one-sided bound only holds on the far side. Beyond the
/// mean, `p_max = var / (var + (d - mean)^2)` bounds the probability of
/// being lit, and a linear remap of [LIGHT_BLEED_MIN, 1] suppresses the
/// light bleeding that shows up where several occluders overlap the
/// footprint.
pub fn variance_occlusion(moments: Vec2, light_depth: f32) -> f32 {
    let mean = moments.x;
    let variance = (moments.y - mean * mean).max(MIN_VARIANCE);

    let lit: f32 = if light_depth <= mean { 1.0 } else { 0.0 };

    let d = light_depth - mean;
    let p_max = variance / (variance + d * d);
    let p_max = linstep(LIGHT_BLEED_MIN, 1.0, p_max);

    lit.max(p_max)
}

/// Blinn-Phong diffuse + specular for one light, before the occlusion and
/// ambient terms are applied. `light_dir` is the light's propagation
/// direction, so a surface facing the light has `dot(-light_dir, normal)`
/// near 1. The specular half-vector term is weighted by
/// `specular_weight`, which the reference configuration keeps at 0.
pub fn blinn_phong(
    view: Vec3,
    surface_color: Vec3,
    normal: Vec3,
    shininess: f32,
    light_dir: Vec3,
    light_color: Vec3,
    specular_weight: f32,
) -> Vec3 {
    let mut intensity = (-light_dir).dot(normal).max(0.0);

    let halfway = (light_dir + view).normalize_or_zero();
    let specular = normal.dot(halfway).max(0.0).powf(shininess);
    intensity += specular_weight * specular;

    intensity * surface_color * light_color
}

/// Full lighting combine: occluded diffuse/specular plus ambient.
pub fn shade(
    occlusion: f32,
    view: Vec3,
    surface_color: Vec3,
    normal: Vec3,
    light_dir: Vec3,
    light_color: Vec3,
    ambient: Vec3,
    specular_weight: f32,
) -> Vec3 {
    occlusion * blinn_phong(view, surface_color, normal, 32.0, light_dir, light_color, specular_weight)
        + ambient
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bias_zero_when_facing_light() {
        assert_eq!(slope_scaled_bias(1.0), 0.0);
    }

    #[test]
    fn test_bias_monotonic_and_clamped() {
        let mut previous = slope_scaled_bias(1.0);
        let mut dot = 1.0_f32;
        while dot > 0.0 {
            let bias = slope_scaled_bias(dot);
            assert!(bias >= previous, "bias shrank as the surface tilted");
            assert!(bias <= MAX_BIAS);
            previous = bias;
            dot -= 0.01;
        }
        // Grazing incidence saturates at the ceiling.
        assert_eq!(slope_scaled_bias(0.0), MAX_BIAS);
        // Out-of-range dots are clamped, not NaN.
        assert!(slope_scaled_bias(1.5).is_finite());
        assert!(slope_scaled_bias(-0.5).is_finite());
    }

    #[test]
    fn test_standard_occlusion_is_binary() {
        for (depth, stored) in [(0.5, 0.6), (0.6, 0.5), (0.5, 0.5), (0.0, 1.0), (1.0, 0.0)] {
            let occlusion = standard_occlusion(depth, stored, 0.003);
            assert!(occlusion == 0.0 || occlusion == 1.0);
        }
        // The bias pushes the comparison toward lit.
        assert_eq!(standard_occlusion(0.5020, 0.5, 0.005), 1.0);
        assert_eq!(standard_occlusion(0.5020, 0.5, 0.0), 0.0);
    }

    #[test]
    fn test_pcf_occlusion_is_quantized_in_quarters() {
        // A depth field splitting the taps between lit and occluded in
        // every proportion.
        for occluded_taps in 0..=4 {
            let field = move |uv: Vec2| {
                // Taps are ordered by the Poisson table; occlude the first n.
                let mut tap_index = None;
                for (i, offset) in POISSON_DISK.iter().enumerate() {
                    let tap = Vec2::splat(0.5) + Vec2::from_array(*offset) / POISSON_SPREAD;
                    if (uv - tap).length() < 1.0e-6 {
                        tap_index = Some(i);
                    }
                }
                let i = tap_index.expect("tap outside the Poisson pattern");
                if i < occluded_taps {
                    0.2 // occluder closer to the light than the fragment
                } else {
                    1.0
                }
            };
            let occlusion = pcf_occlusion(Vec2::splat(0.5), 0.6, 0.0, field);
            let expected = 1.0 - occluded_taps as f32 * 0.25;
            assert!((occlusion - expected).abs() < 1.0e-6);
        }
    }

    #[test]
    fn test_variance_occlusion_stays_in_unit_interval() {
        for &(m1, m2, d) in &[
            (0.3, 0.09, 0.5),
            (0.3, 0.12, 0.5),
            (0.5, 0.30, 0.4),
            (0.9, 0.95, 1.0),
            (0.0, 0.0, 0.0),
        ] {
            let occlusion = variance_occlusion(Vec2::new(m1, m2), d);
            assert!((0.0..=1.0).contains(&occlusion), "occlusion {occlusion} out of range");
        }
    }

    #[test]
    fn test_chebyshev_invalid_on_lit_side() {
        // At or in front of the mean the fragment must be fully lit no
        // matter how large the variance is.
        for &variance in &[0.0, 0.01, 0.1, 10.0] {
            let mean = 0.6_f32;
            let moments = Vec2::new(mean, mean * mean + variance);
            assert_eq!(variance_occlusion(moments, mean), 1.0);
            assert_eq!(variance_occlusion(moments, mean - 0.1), 1.0);
            assert_eq!(variance_occlusion(moments, 0.0), 1.0);
        }
    }

    #[test]
    fn test_pmax_vanishes_as_variance_goes_to_zero() {
        // A planar occluder/receiver pair has zero variance; the bound
        // then collapses to the exact, non-probabilistic shadow edge.
        let mean = 0.4_f32;
        let light_depth = 0.6_f32;
        let mut last = f32::MAX;
        for &variance in &[0.1, 0.01, 1.0e-3, 1.0e-4, 0.0] {
            let moments = Vec2::new(mean, mean * mean + variance);
            let occlusion = variance_occlusion(moments, light_depth);
            assert!(occlusion <= last + 1.0e-6);
            last = occlusion;
        }
        // With the variance floored at MIN_VARIANCE the bound is not
        // exactly zero, but the remap clamps it there.
        let moments = Vec2::new(mean, mean * mean);
        assert_eq!(variance_occlusion(moments, light_depth), 0.0);
    }

    #[test]
    fn test_light_bleed_remap_anchors() {
        assert_eq!(linstep(LIGHT_BLEED_MIN, 1.0, 0.4), 0.0);
        assert_eq!(linstep(LIGHT_BLEED_MIN, 1.0, 1.0), 1.0);
        // Linear between the anchors...
        assert!((linstep(LIGHT_BLEED_MIN, 1.0, 0.7) - 0.5).abs() < 1.0e-6);
        assert!((linstep(LIGHT_BLEED_MIN, 1.0, 0.85) - 0.75).abs() < 1.0e-6);
        // ...and clamped outside them.
        assert_eq!(linstep(LIGHT_BLEED_MIN, 1.0, 0.1), 0.0);
        assert_eq!(linstep(LIGHT_BLEED_MIN, 1.0, 1.5), 1.0);
    }

    #[test]
    fn test_variance_degenerates_to_standard_without_filtering() {
        // An unfiltered moment sample is (d, d^2): zero variance, so the
        // statistical model must reproduce the binary decision (modulo
        // the bias term, which the variance path does not use).
        for stored in [0.1, 0.3, 0.5, 0.7, 0.9] {
            let moments = Vec2::new(stored, stored * stored);
            for light_depth in [0.05, 0.2, 0.4, 0.6, 0.8, 0.95] {
                let variance = variance_occlusion(moments, light_depth);
                let standard = standard_occlusion(light_depth, stored, 0.0);
                assert_eq!(
                    variance, standard,
                    "mismatch at stored={stored} depth={light_depth}"
                );
            }
        }
    }

    #[test]
    fn test_blinn_phong_diffuse_term() {
        let normal = Vec3::Y;
        let view = Vec3::Y;
        // Light straight overhead: full diffuse.
        let overhead = blinn_phong(view, Vec3::ONE, normal, 32.0, Vec3::NEG_Y, Vec3::ONE, 0.0);
        assert!((overhead.x - 1.0).abs() < 1.0e-6);
        // Grazing light: no diffuse.
        let grazing = blinn_phong(view, Vec3::ONE, normal, 32.0, Vec3::X, Vec3::ONE, 0.0);
        assert_eq!(grazing, Vec3::ZERO);
        // Below the horizon: clamped to zero, not negative.
        let below = blinn_phong(view, Vec3::ONE, normal, 32.0, Vec3::Y, Vec3::ONE, 0.0);
        assert_eq!(below, Vec3::ZERO);
    }

    #[test]
    fn test_specular_disabled_by_default_weight() {
        // Grazing light so the diffuse term is zero and any output comes
        // from the halfway-vector term alone.
        let normal = Vec3::Y;
        let view = Vec3::new(-1.0, 1.0, 0.0).normalize();
        let light_dir = Vec3::X;
        let off = blinn_phong(view, Vec3::ONE, normal, 32.0, light_dir, Vec3::ONE, 0.0);
        let on = blinn_phong(view, Vec3::ONE, normal, 32.0, light_dir, Vec3::ONE, 1.0);
        // The halfway term is present in the model but contributes only
        // when the weight enables it.
        assert_eq!(off, Vec3::ZERO);
        assert!(on.x > 0.0);
    }

    #[test]
    fn test_shade_adds_ambient_after_occlusion() {
        let ambient = Vec3::splat(0.15);
        let shadowed = shade(
            0.0,
            Vec3::Y,
            Vec3::ONE,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::ONE,
            ambient,
            0.0,
        );
        assert_eq!(shadowed, ambient);
    }

    #[test]
    fn test_ndc_to_uv_flips_v() {
        assert_eq!(ndc_to_uv(Vec2::new(-1.0, 1.0)), Vec2::new(0.0, 0.0));
        assert_eq!(ndc_to_uv(Vec2::new(1.0, -1.0)), Vec2::new(1.0, 1.0));
        assert_eq!(ndc_to_uv(Vec2::ZERO), Vec2::splat(0.5));
    }
}
