//! Material definitions for PBR rendering

use glam::{Vec3, Vec4};

use crate::backend::{BlendState, CullMode, GraphicsBackend, PipelineState, TextureHandle, Uniform};
use crate::resources::DefaultTextures;

/// Cutoff bound when a material does not mask; low enough to keep every texel
pub const NO_CUTOFF: f32 = 0.001;

/// How a material's alpha is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    /// Opaque
    #[default]
    NoAlpha,
    /// Cut out below `alpha_cutoff`
    Mask,
    /// Alpha blended
    Blend,
}

/// PBR material properties
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Vec3,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub two_sided: bool,

    /// Texture handles (None means use default)
    pub base_color_texture: Option<TextureHandle>,
    pub normal_texture: Option<TextureHandle>,
    pub metallic_roughness_texture: Option<TextureHandle>,
    pub emissive_texture: Option<TextureHandle>,
    pub occlusion_texture: Option<TextureHandle>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
            alpha_mode: AlphaMode::NoAlpha,
            alpha_cutoff: 0.5,
            two_sided: false,
            base_color_texture: None,
            normal_texture: None,
            metallic_roughness_texture: None,
            emissive_texture: None,
            occlusion_texture: None,
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_alpha_mode(mut self, alpha_mode: AlphaMode) -> Self {
        self.alpha_mode = alpha_mode;
        self
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    pub fn with_base_color_texture(mut self, texture: TextureHandle) -> Self {
        self.base_color_texture = Some(texture);
        self
    }

    pub fn is_opaque(&self) -> bool {
        self.alpha_mode == AlphaMode::NoAlpha
    }

    /// Cutoff the shader should apply
    pub fn effective_cutoff(&self) -> f32 {
        match self.alpha_mode {
            AlphaMode::Mask => self.alpha_cutoff,
            AlphaMode::NoAlpha | AlphaMode::Blend => NO_CUTOFF,
        }
    }

    /// Culling and blending this material asks for on top of `base`
    pub fn pipeline_state(&self, base: PipelineState) -> PipelineState {
        let cull = if self.two_sided { CullMode::None } else { CullMode::Back };
        let blend = match self.alpha_mode {
            AlphaMode::Blend => Some(BlendState::alpha_blending()),
            AlphaMode::NoAlpha | AlphaMode::Mask => None,
        };
        base.with_cull(cull).with_blend(blend)
    }

    /// Bind color, factors and textures, substituting 1x1 defaults
    pub fn bind(&self, backend: &mut dyn GraphicsBackend, defaults: &DefaultTextures) {
        backend.set_uniform("u_color", Uniform::Vec4(self.base_color));
        backend.set_uniform("u_metallic", Uniform::Float(self.metallic));
        backend.set_uniform("u_roughness", Uniform::Float(self.roughness));
        backend.set_uniform("u_emissive_factor", Uniform::Vec3(self.emissive));
        backend.set_uniform("u_alpha_cutoff", Uniform::Float(self.effective_cutoff()));
        backend.set_texture(
            "u_albedo_texture",
            self.base_color_texture.unwrap_or(defaults.white),
            0,
        );
        backend.set_texture(
            "u_emissive_texture",
            self.emissive_texture.unwrap_or(defaults.black),
            1,
        );
        backend.set_texture(
            "u_metallic_roughness_texture",
            self.metallic_roughness_texture.unwrap_or(defaults.white),
            2,
        );
        backend.set_texture(
            "u_normal_texture",
            self.normal_texture.unwrap_or(defaults.normal),
            3,
        );
        backend.set_texture(
            "u_occlusion_texture",
            self.occlusion_texture.unwrap_or(defaults.white),
            4,
        );
        backend.set_uniform("u_has_normal_texture", Uniform::from(self.normal_texture.is_some()));
    }

    // Preset materials

    pub fn plastic(color: Vec3) -> Self {
        Self::new("plastic")
            .with_base_color(color.extend(1.0))
            .with_metallic(0.0)
            .with_roughness(0.4)
    }

    pub fn metal(color: Vec3, roughness: f32) -> Self {
        Self::new("metal")
            .with_base_color(color.extend(1.0))
            .with_metallic(1.0)
            .with_roughness(roughness)
    }

    pub fn glass() -> Self {
        Self::new("glass")
            .with_base_color(Vec4::new(1.0, 1.0, 1.0, 0.3))
            .with_metallic(0.0)
            .with_roughness(0.1)
            .with_alpha_mode(AlphaMode::Blend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_cutoff_only_applies_to_mask() {
        let mut material = Material::new("leaf");
        material.alpha_cutoff = 0.3;
        assert_eq!(material.effective_cutoff(), NO_CUTOFF);
        material.alpha_mode = AlphaMode::Mask;
        assert_eq!(material.effective_cutoff(), 0.3);
    }

    #[test]
    fn test_state_follows_material() {
        let glass = Material::glass().with_two_sided(true);
        let state = glass.pipeline_state(PipelineState::default());
        assert_eq!(state.cull_mode, CullMode::None);
        assert_eq!(state.blend, Some(BlendState::alpha_blending()));

        let opaque = Material::plastic(Vec3::ONE).pipeline_state(PipelineState::default());
        assert_eq!(opaque.cull_mode, CullMode::Back);
        assert_eq!(opaque.blend, None);
    }

    #[test]
    fn test_bind_falls_back_to_defaults() {
        let mut backend = RecordingBackend::new(16, 16);
        let defaults = DefaultTextures::new(&mut backend).unwrap();
        let shader = backend.find_shader("lights").unwrap();
        backend.enable_shader(shader);
        Material::metal(Vec3::ONE, 0.2).bind(&mut backend, &defaults);
        backend.draw_fullscreen_quad();

        let draw = &backend.draws()[0];
        assert_eq!(draw.texture("u_albedo_texture"), Some(defaults.white));
        assert_eq!(draw.texture("u_emissive_texture"), Some(defaults.black));
        assert_eq!(draw.int("u_has_normal_texture"), Some(0));
    }
}
