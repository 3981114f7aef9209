//! Viewer Render - The rendering core of a real-time 3D scene viewer
//!
//! Turns a scene of prefabs, lights and decals into a shaded frame through a
//! [`GraphicsBackend`](backend::GraphicsBackend).
//!
//! # Features
//! - Flat, forward-lit (multipass or singlepass) and deferred pipelines
//! - Shadow maps for spot and directional lights
//! - SSAO, decals, volumetric fog and screen-space reflections
//! - Irradiance probes (SH9) with a binary cache, reflection probes and
//!   planar reflections
//! - Post-processing chain ending in a tonemap or gamma correction
//! - A recording backend for headless runs and tests

pub mod backend;
pub mod error;
pub mod gi;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod shaders;
pub mod stats;
pub mod targets;

use std::path::PathBuf;

pub use backend::{GraphicsBackend, RecordingBackend};
pub use error::{RendererError, RendererResult};
pub use renderer::Renderer;
pub use settings::RenderSettings;
pub use stats::FrameStats;

/// Construction-time configuration of a [`Renderer`]
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Shader atlas holding every program
    pub shader_atlas: PathBuf,
    /// Initial shadow map size; later frames follow the render settings
    pub shadow_resolution: u32,
    /// Side of each face rendered for an irradiance probe
    pub irradiance_capture_size: u32,
    /// Side of each reflection probe cubemap face
    pub reflection_probe_size: u32,
    /// Cap on the bloom mip chain
    pub max_bloom_mips: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shader_atlas: PathBuf::from("data/shaders.atlas"),
            shadow_resolution: 1024,
            irradiance_capture_size: 64,
            reflection_probe_size: 256,
            max_bloom_mips: 5,
        }
    }
}
