//! Light types for the scene

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::BoundingBox;
use crate::backend::{Framebuffer, GraphicsBackend, TextureHandle, Uniform};

/// Light kind; the discriminant is the value shaders see in `u_light_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightType {
    NoLight = 0,
    Point = 1,
    Spot = 2,
    Directional = 3,
}

impl LightType {
    pub fn as_uniform(&self) -> i32 {
        *self as i32
    }

    /// Lights with a position and a finite range
    pub fn is_local(&self) -> bool {
        matches!(self, LightType::Point | LightType::Spot)
    }
}

/// Depth-only render target owned by the light that casts it
#[derive(Debug, Clone)]
pub struct ShadowMap {
    pub framebuffer: Framebuffer,
    pub resolution: u32,
    /// Light-space view-projection of the last render
    pub view_projection: Mat4,
}

impl ShadowMap {
    pub fn depth_texture(&self) -> Option<TextureHandle> {
        self.framebuffer.depth
    }
}

/// A light placed in the scene
#[derive(Debug, Clone)]
pub struct LightEntity {
    pub name: String,
    /// World transform; the light shines along its local -Z
    pub model: Mat4,
    pub visible: bool,
    pub light_type: LightType,
    pub color: Vec3,
    pub intensity: f32,
    /// Range of point and spot lights, and the far plane of shadow cameras
    pub max_distance: f32,
    /// Spot cone angles in degrees
    pub inner_angle: f32,
    pub outer_angle: f32,
    /// Side of the orthographic shadow volume of directional lights
    pub area: f32,
    pub cast_shadows: bool,
    pub shadow_bias: f32,
    pub shadow: Option<ShadowMap>,
}

impl Default for LightEntity {
    fn default() -> Self {
        Self {
            name: "light".to_string(),
            model: Mat4::IDENTITY,
            visible: true,
            light_type: LightType::Point,
            color: Vec3::ONE,
            intensity: 1.0,
            max_distance: 100.0,
            inner_angle: 20.0,
            outer_angle: 30.0,
            area: 1000.0,
            cast_shadows: false,
            shadow_bias: 0.001,
            shadow: None,
        }
    }
}

impl LightEntity {
    pub fn point(position: Vec3, color: Vec3, intensity: f32, max_distance: f32) -> Self {
        Self {
            name: "point".to_string(),
            model: Mat4::from_translation(position),
            light_type: LightType::Point,
            color,
            intensity,
            max_distance,
            ..Default::default()
        }
    }

    pub fn spot(
        position: Vec3,
        target: Vec3,
        color: Vec3,
        intensity: f32,
        max_distance: f32,
    ) -> Self {
        Self {
            name: "spot".to_string(),
            model: aim(position, target),
            light_type: LightType::Spot,
            color,
            intensity,
            max_distance,
            ..Default::default()
        }
    }

    /// Directional light placed at `position`, shining towards `target`
    pub fn directional(position: Vec3, target: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            name: "directional".to_string(),
            model: aim(position, target),
            light_type: LightType::Directional,
            color,
            intensity,
            ..Default::default()
        }
    }

    pub fn with_shadows(mut self, bias: f32) -> Self {
        self.cast_shadows = true;
        self.shadow_bias = bias;
        self
    }

    pub fn position(&self) -> Vec3 {
        self.model.transform_point3(Vec3::ZERO)
    }

    /// Direction the light shines in
    pub fn forward(&self) -> Vec3 {
        self.model.transform_vector3(Vec3::NEG_Z).normalize_or_zero()
    }

    /// Flatten into the per-frame snapshot record
    pub fn record(&self, entity: usize) -> LightRecord {
        let shadow = match (&self.shadow, self.cast_shadows) {
            (Some(map), true) => map.depth_texture().map(|texture| ShadowRecord {
                texture,
                bias: self.shadow_bias,
                view_projection: map.view_projection,
            }),
            _ => None,
        };
        LightRecord {
            entity,
            light_type: self.light_type,
            position: self.position(),
            direction: self.forward(),
            color: self.color * self.intensity,
            range: self.max_distance,
            cone_cos: (
                self.inner_angle.to_radians().cos(),
                self.outer_angle.to_radians().cos(),
            ),
            shadow,
        }
    }
}

/// Model matrix of an object at `position` whose -Z faces `target`
fn aim(position: Vec3, target: Vec3) -> Mat4 {
    let forward = (target - position).normalize_or_zero();
    let up = if forward.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    Mat4::look_at_rh(position, target, up).inverse()
}

/// Shadow inputs of a light for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowRecord {
    pub texture: TextureHandle,
    pub bias: f32,
    pub view_projection: Mat4,
}

/// Uniform-ready snapshot of one light, rebuilt every frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRecord {
    /// Index of the light in the scene's entity list
    pub entity: usize,
    pub light_type: LightType,
    pub position: Vec3,
    pub direction: Vec3,
    /// Color already multiplied by intensity
    pub color: Vec3,
    pub range: f32,
    /// Cosines of the inner and outer cone angles
    pub cone_cos: (f32, f32),
    pub shadow: Option<ShadowRecord>,
}

impl LightRecord {
    /// Whether this light can contribute to geometry inside `bounds`
    pub fn affects(&self, bounds: &BoundingBox) -> bool {
        match self.light_type {
            LightType::Directional => true,
            LightType::Point | LightType::Spot => {
                bounds.intersects_sphere(self.position, self.range)
            }
            LightType::NoLight => false,
        }
    }

    /// Ranking used when more lights reach a draw than a pass can carry
    pub fn importance(&self, point: Vec3) -> f32 {
        match self.light_type {
            LightType::Directional => f32::INFINITY,
            LightType::NoLight => 0.0,
            LightType::Point | LightType::Spot => {
                let luminance = self.color.dot(Vec3::new(0.2126, 0.7152, 0.0722));
                luminance / self.position.distance_squared(point).max(1e-4)
            }
        }
    }

    /// Bind this light's uniforms (and shadow map) to the current program
    pub fn apply(&self, backend: &mut dyn GraphicsBackend, shadow_slot: u32) {
        backend.set_uniform("u_light_type", Uniform::Int(self.light_type.as_uniform()));
        backend.set_uniform("u_light_pos", Uniform::Vec3(self.position));
        backend.set_uniform("u_light_front", Uniform::Vec3(self.direction));
        backend.set_uniform("u_light_color", Uniform::Vec3(self.color));
        backend.set_uniform("u_light_max_dist", Uniform::Float(self.range));
        backend.set_uniform("u_light_cone_cos", Uniform::Vec2(self.cone_cos.into()));
        match self.shadow {
            Some(shadow) => {
                backend.set_uniform("u_light_cast_shadows", Uniform::Int(1));
                backend.set_uniform("u_shadow_bias", Uniform::Float(shadow.bias));
                backend.set_uniform("u_shadow_viewproj", Uniform::Mat4(shadow.view_projection));
                backend.set_texture("u_shadowmap", shadow.texture, shadow_slot);
            }
            None => backend.set_uniform("u_light_cast_shadows", Uniform::Int(0)),
        }
    }
}
