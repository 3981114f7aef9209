//! Per-frame render settings
//!
//! Every toggle a UI would expose lives here as a plain public field. The
//! renderer snapshots the whole struct at the start of a frame, so changes
//! take effect from the next frame on. Settings persist as JSON.

use std::fs;
use std::path::Path;

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{RendererError, RendererResult};
use crate::pipeline::postprocess::{BloomMode, TonemapOperator};
use crate::pipeline::{DeferredDisplay, FlatShader, LightsRender, RenderMode, RenderPriority};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSettings {
    pub enabled: bool,
    /// Side of every shadow map in texels
    pub resolution: u32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            resolution: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsaoSettings {
    pub enabled: bool,
    pub samples: usize,
    pub radius: f32,
    pub max_distance: f32,
    /// Sample a normal-oriented hemisphere instead of a full sphere
    pub hemisphere: bool,
    pub blur: bool,
}

impl Default for SsaoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: 64,
            radius: 5.0,
            max_distance: 0.1,
            hemisphere: true,
            blur: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumetricSettings {
    pub enabled: bool,
    pub samples: u32,
    pub air_density: f32,
}

impl Default for VolumetricSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: 64,
            air_density: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsrSettings {
    pub enabled: bool,
    pub intensity: f32,
}

impl Default for SsrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrradianceSettings {
    pub enabled: bool,
    /// Blend the eight surrounding probes instead of taking the nearest
    pub trilinear: bool,
    pub multiplier: f32,
    /// Grid used by the next bake
    pub start: Vec3,
    pub end: Vec3,
    pub dims: UVec3,
}

impl Default for IrradianceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            trilinear: true,
            multiplier: 1.0,
            start: Vec3::splat(-50.0),
            end: Vec3::splat(50.0),
            dims: UVec3::new(8, 4, 8),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionSettings {
    /// Apply the closest reflection probe (or the skybox) in deferred mode
    pub probes_enabled: bool,
    pub planar_enabled: bool,
    pub plane_height: f32,
    pub fresnel: bool,
}

impl Default for ReflectionSettings {
    fn default() -> Self {
        Self {
            probes_enabled: false,
            planar_enabled: false,
            plane_height: 0.0,
            fresnel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorCorrectionSettings {
    pub enabled: bool,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for ColorCorrectionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
        }
    }
}

/// A post effect controlled by one strength value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub enabled: bool,
    pub amount: f32,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthOfFieldSettings {
    pub enabled: bool,
    pub focus_distance: f32,
    pub focus_range: f32,
}

impl Default for DepthOfFieldSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            focus_distance: 10.0,
            focus_range: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurSettings {
    pub enabled: bool,
    pub iterations: u32,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            iterations: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    pub enabled: bool,
    pub mode: BloomMode,
    pub threshold: f32,
    pub intensity: f32,
    /// Blur rounds per level
    pub iterations: u32,
    /// Downsampled levels of the advanced mode
    pub mips: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: BloomMode::Advanced,
            threshold: 1.0,
            intensity: 0.5,
            iterations: 2,
            mips: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TonemapSettings {
    /// When off, the chain ends with plain gamma correction
    pub enabled: bool,
    pub operator: TonemapOperator,
    pub scale: f32,
    pub average_lum: f32,
    pub lum_white: f32,
    pub gamma: f32,
}

impl Default for TonemapSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            operator: TonemapOperator::Filmic,
            scale: 1.0,
            average_lum: 1.0,
            lum_white: 1.0,
            gamma: 2.2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostSettings {
    pub color_correction: ColorCorrectionSettings,
    pub vignette: EffectSettings,
    pub grain: EffectSettings,
    pub lens_distortion: EffectSettings,
    pub motion_blur: EffectSettings,
    pub depth_of_field: DepthOfFieldSettings,
    pub blur: BlurSettings,
    pub bloom: BloomSettings,
    pub tonemap: TonemapSettings,
}

/// Everything that decides which passes run and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub mode: RenderMode,
    pub priority: RenderPriority,
    pub flat_shader: FlatShader,
    pub lights_render: LightsRender,
    pub wireframe: bool,
    pub render_boundaries: bool,
    pub use_specular: bool,
    pub use_normal_maps: bool,
    pub use_emissive: bool,
    pub use_occlusion: bool,
    /// Write blended materials into the G-buffer with a dither pattern
    pub dithering: bool,
    pub deferred_display: DeferredDisplay,
    pub shadows: ShadowSettings,
    pub ssao: SsaoSettings,
    pub volumetric: VolumetricSettings,
    pub ssr: SsrSettings,
    pub irradiance: IrradianceSettings,
    pub reflections: ReflectionSettings,
    pub post: PostSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::Lit,
            priority: RenderPriority::DistanceSorted,
            flat_shader: FlatShader::Texture,
            lights_render: LightsRender::Multipass,
            wireframe: false,
            render_boundaries: false,
            use_specular: true,
            use_normal_maps: true,
            use_emissive: true,
            use_occlusion: true,
            dithering: false,
            deferred_display: DeferredDisplay::Resolve,
            shadows: ShadowSettings::default(),
            ssao: SsaoSettings::default(),
            volumetric: VolumetricSettings::default(),
            ssr: SsrSettings::default(),
            irradiance: IrradianceSettings::default(),
            reflections: ReflectionSettings::default(),
            post: PostSettings::default(),
        }
    }
}

impl RenderSettings {
    pub fn load(path: impl AsRef<Path>) -> RendererResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| settings_io(path, source))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> RendererResult<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| settings_io(path, source))?;
        Ok(())
    }
}

fn settings_io(path: &Path, source: std::io::Error) -> RendererError {
    RendererError::SettingsIo {
        path: path.display().to_string(),
        source,
    }
}
