//! Shader programs the renderer knows by name
//!
//! Every [`ShaderId`] maps to exactly one atlas name. The library resolves
//! all of them once at startup: a missing required program fails startup,
//! a missing optional one disables the passes that use it.

use std::path::Path;

use crate::backend::{GraphicsBackend, ShaderHandle};
use crate::error::{RendererError, RendererResult};

/// Programs drawn by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderId {
    Flat,
    Texture,
    Lights,
    LightsSingle,
    Depth,
    Skybox,
    GBuffer,
    Decal,
    DeferredGlobal,
    DeferredLight,
    Ssao,
    SsaoBlur,
    Volumetric,
    Ssr,
    Irradiance,
    ReflectionProbe,
    Quad,
    GBuffersDebug,
    ColorCorrection,
    Vignette,
    Grain,
    LensDistortion,
    MotionBlur,
    DepthOfField,
    Blur,
    BloomExtract,
    BloomDownsample,
    BloomComposite,
    TonemapParametric,
    TonemapFilmic,
    Gamma,
}

impl ShaderId {
    pub const ALL: [ShaderId; 31] = [
        ShaderId::Flat,
        ShaderId::Texture,
        ShaderId::Lights,
        ShaderId::LightsSingle,
        ShaderId::Depth,
        ShaderId::Skybox,
        ShaderId::GBuffer,
        ShaderId::Decal,
        ShaderId::DeferredGlobal,
        ShaderId::DeferredLight,
        ShaderId::Ssao,
        ShaderId::SsaoBlur,
        ShaderId::Volumetric,
        ShaderId::Ssr,
        ShaderId::Irradiance,
        ShaderId::ReflectionProbe,
        ShaderId::Quad,
        ShaderId::GBuffersDebug,
        ShaderId::ColorCorrection,
        ShaderId::Vignette,
        ShaderId::Grain,
        ShaderId::LensDistortion,
        ShaderId::MotionBlur,
        ShaderId::DepthOfField,
        ShaderId::Blur,
        ShaderId::BloomExtract,
        ShaderId::BloomDownsample,
        ShaderId::BloomComposite,
        ShaderId::TonemapParametric,
        ShaderId::TonemapFilmic,
        ShaderId::Gamma,
    ];

    /// Program name inside the atlas
    pub fn name(&self) -> &'static str {
        match self {
            ShaderId::Flat => "flat",
            ShaderId::Texture => "texture",
            ShaderId::Lights => "lights",
            ShaderId::LightsSingle => "lights_single",
            ShaderId::Depth => "depth",
            ShaderId::Skybox => "skybox",
            ShaderId::GBuffer => "gbuffer",
            ShaderId::Decal => "decal",
            ShaderId::DeferredGlobal => "deferred_global",
            ShaderId::DeferredLight => "deferred_light",
            ShaderId::Ssao => "ssao",
            ShaderId::SsaoBlur => "ssao_blur",
            ShaderId::Volumetric => "volumetric",
            ShaderId::Ssr => "ssr",
            ShaderId::Irradiance => "irradiance",
            ShaderId::ReflectionProbe => "reflection_probe",
            ShaderId::Quad => "quad",
            ShaderId::GBuffersDebug => "gbuffers_debug",
            ShaderId::ColorCorrection => "color_correction",
            ShaderId::Vignette => "vignette",
            ShaderId::Grain => "grain",
            ShaderId::LensDistortion => "lens_distortion",
            ShaderId::MotionBlur => "motion_blur",
            ShaderId::DepthOfField => "depth_of_field",
            ShaderId::Blur => "blur",
            ShaderId::BloomExtract => "bloom_extract",
            ShaderId::BloomDownsample => "bloom_downsample",
            ShaderId::BloomComposite => "bloom_composite",
            ShaderId::TonemapParametric => "tonemap_parametric",
            ShaderId::TonemapFilmic => "tonemap_filmic",
            ShaderId::Gamma => "gamma",
        }
    }

    /// Programs without which no frame can be produced
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            ShaderId::Flat
                | ShaderId::Texture
                | ShaderId::Lights
                | ShaderId::Depth
                | ShaderId::GBuffer
                | ShaderId::DeferredGlobal
                | ShaderId::DeferredLight
                | ShaderId::Gamma
        )
    }
}

/// Resolved program handles
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    handles: Vec<Option<ShaderHandle>>,
}

impl ShaderLibrary {
    /// Load the atlas and resolve every [`ShaderId`]
    pub fn load(backend: &mut dyn GraphicsBackend, atlas: &Path) -> RendererResult<Self> {
        backend
            .load_shader_atlas(atlas)
            .map_err(|source| RendererError::ShaderAtlas {
                path: atlas.display().to_string(),
                source,
            })?;

        let mut handles = Vec::with_capacity(ShaderId::ALL.len());
        for id in ShaderId::ALL {
            let handle = backend.find_shader(id.name());
            if handle.is_none() {
                if id.is_required() {
                    return Err(RendererError::MissingShader(id.name()));
                }
                log::warn!("Shader '{}' not in atlas; passes using it are disabled", id.name());
            }
            handles.push(handle);
        }
        log::info!(
            "Loaded shader atlas {} ({} of {} programs)",
            atlas.display(),
            handles.iter().filter(|h| h.is_some()).count(),
            handles.len()
        );
        Ok(Self { handles })
    }

    pub fn get(&self, id: ShaderId) -> Option<ShaderHandle> {
        self.handles.get(Self::slot(id)).copied().flatten()
    }

    pub fn has(&self, id: ShaderId) -> bool {
        self.get(id).is_some()
    }

    /// Make `id` current; false when the program is unavailable
    pub fn enable(&self, backend: &mut dyn GraphicsBackend, id: ShaderId) -> bool {
        match self.get(id) {
            Some(handle) => {
                backend.enable_shader(handle);
                true
            }
            None => {
                log::trace!("Skipping draw: shader '{}' unavailable", id.name());
                false
            }
        }
    }

    fn slot(id: ShaderId) -> usize {
        ShaderId::ALL
            .iter()
            .position(|candidate| *candidate == id)
            .unwrap_or(usize::MAX)
    }
}
