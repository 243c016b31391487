//! Forward renderer comparing three directional-light shadow-mapping
//! techniques: hard (standard) shadow maps, percentage-closer filtering,
//! and variance shadow maps.
//!
//! Per frame the orchestrator records, in order: the shadow-generation
//! pass into the active technique's shadow buffer, the two-pass separable
//! moment blur (variance only), and the forward-lit pass that evaluates
//! per-fragment occlusion against the (possibly filtered) buffer. The
//! occlusion math lives twice on purpose: once in WGSL and once as plain
//! Rust in [`lighting::occlusion`], where its statistical properties are
//! unit-tested without a GPU.

pub mod camera;
pub mod demo;
pub mod error;
pub mod gpu;
pub mod lighting;
pub mod mesh;
pub mod renderer;
pub mod scene;
pub mod shadows;
pub mod targets;

pub use error::RenderError;
pub use gpu::GpuContext;
pub use renderer::{BlitPass, ForwardRenderer, RendererConfig};
pub use scene::{Material, Scene};
pub use shadows::{ShadowSettings, ShadowTechnique};
