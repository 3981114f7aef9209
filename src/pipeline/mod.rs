//! Shading pipelines
//!
//! A frame is a fixed sequence of passes chosen from the render settings:
//! 1. Collect - Cull scene nodes into sorted render calls
//! 2. Shadows - Depth maps for shadow-casting lights
//! 3. Forward or deferred shading into an HDR target
//! 4. Post-processing - Effects, bloom, then tonemap or gamma to the screen
//!
//! Pass functions share the read-only [`FrameContext`] and report into
//! [`FrameStats`].

pub mod collect;
pub mod decal_pass;
pub mod forward_pass;
pub mod gbuffer_pass;
pub mod lighting_pass;
pub mod postprocess;
pub mod shadow_pass;
pub mod ssao;
pub mod ssr;
pub mod volumetric;

pub use collect::{collect_calls, CollectStats, RenderCall, RenderCallLists};
pub use ssao::SsaoPass;

use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::backend::{GraphicsBackend, PipelineState, Primitive, TextureHandle, Uniform};
use crate::resources::{BuiltinMeshes, DefaultTextures, Mesh};
use crate::scene::{Camera, LightRecord, Scene};
use crate::settings::RenderSettings;
use crate::shaders::{ShaderId, ShaderLibrary};
use crate::stats::FrameStats;

/// Most lights one single-pass draw carries
pub const MAX_SINGLEPASS_LIGHTS: usize = 12;

/// Scale of the sphere the skybox is drawn on
const SKYBOX_SCALE: f32 = 10.0;

/// Which pipeline shades the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderMode {
    /// Unlit, one texture
    Flat,
    /// Forward lighting
    #[default]
    Lit,
    Deferred,
}

/// How render calls are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderPriority {
    /// One list in traversal order
    NoPriority,
    /// Opaque calls first, then the rest
    AlphaFirst,
    /// Like `AlphaFirst`, the rest drawn back to front
    #[default]
    DistanceSorted,
}

/// Program used in flat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlatShader {
    Flat,
    #[default]
    Texture,
}

impl FlatShader {
    pub fn shader(&self) -> ShaderId {
        match self {
            FlatShader::Flat => ShaderId::Flat,
            FlatShader::Texture => ShaderId::Texture,
        }
    }
}

/// How forward lighting accumulates lights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LightsRender {
    /// One draw per affecting light
    #[default]
    Multipass,
    /// All affecting lights in one draw
    Singlepass,
}

/// What the deferred pipeline presents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeferredDisplay {
    /// The shaded image
    #[default]
    Resolve,
    /// The G-buffer in four quadrants
    GBuffers,
    /// The ambient occlusion buffer
    Ssao,
}

/// Read-only inputs shared by every pass of a frame
pub struct FrameContext<'a> {
    pub scene: &'a Scene,
    pub camera: &'a Camera,
    pub settings: &'a RenderSettings,
    pub shaders: &'a ShaderLibrary,
    pub defaults: &'a DefaultTextures,
    pub meshes: &'a BuiltinMeshes,
    /// Light snapshot, taken after the shadow pass
    pub lights: &'a [LightRecord],
    pub time: f32,
    pub skybox: Option<TextureHandle>,
    pub planar_reflection: Option<TextureHandle>,
}

impl<'a> FrameContext<'a> {
    /// Same frame seen through another camera
    pub fn with_camera(&self, camera: &'a Camera) -> FrameContext<'a> {
        FrameContext {
            scene: self.scene,
            camera,
            settings: self.settings,
            shaders: self.shaders,
            defaults: self.defaults,
            meshes: self.meshes,
            lights: self.lights,
            time: self.time,
            skybox: self.skybox,
            planar_reflection: self.planar_reflection,
        }
    }

    /// Same frame with other settings
    pub fn with_settings(&self, settings: &'a RenderSettings) -> FrameContext<'a> {
        FrameContext {
            settings,
            ..self.with_camera(self.camera)
        }
    }

    pub fn background(&self) -> Vec4 {
        self.scene.background_color.extend(1.0)
    }
}

/// Camera and clock uniforms every scene program reads
pub fn set_camera_uniforms(backend: &mut dyn GraphicsBackend, camera: &Camera, time: f32) {
    backend.set_uniform("u_viewprojection", Uniform::Mat4(camera.view_projection_matrix()));
    backend.set_uniform(
        "u_inverse_viewprojection",
        Uniform::Mat4(camera.inverse_view_projection_matrix()),
    );
    backend.set_uniform("u_camera_position", Uniform::Vec3(camera.position));
    backend.set_uniform(
        "u_camera_nearfar",
        Uniform::Vec2(glam::Vec2::new(camera.near(), camera.far())),
    );
    backend.set_uniform("u_time", Uniform::Float(time));
}

pub(crate) fn draw_mesh(
    backend: &mut dyn GraphicsBackend,
    mesh: &Mesh,
    primitive: Primitive,
    stats: &mut FrameStats,
) {
    backend.draw_mesh(mesh.handle, primitive);
    stats.draw_calls += 1;
}

pub(crate) fn draw_fullscreen(backend: &mut dyn GraphicsBackend, stats: &mut FrameStats) {
    backend.draw_fullscreen_quad();
    stats.draw_calls += 1;
}

/// Skybox sphere around the eye; a no-op without a cubemap
pub(crate) fn draw_skybox(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    stats: &mut FrameStats,
) {
    let Some(cubemap) = ctx.skybox else {
        return;
    };
    if !ctx.shaders.enable(backend, ShaderId::Skybox) {
        return;
    }
    backend.set_pipeline_state(&PipelineState::fullscreen());
    let model = Mat4::from_translation(ctx.camera.position)
        * Mat4::from_scale(Vec3::splat(SKYBOX_SCALE));
    backend.set_uniform("u_model", Uniform::Mat4(model));
    set_camera_uniforms(backend, ctx.camera, ctx.time);
    backend.set_uniform("u_skybox_intensity", Uniform::Float(ctx.scene.skybox_intensity));
    backend.set_texture("u_texture", cubemap, 0);
    draw_mesh(backend, &ctx.meshes.sphere, Primitive::Triangles, stats);
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::Arc;

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::backend::{MeshHandle, RecordingBackend};
    use crate::resources::Material;
    use crate::scene::{BoundingBox, Node, PrefabEntity};

    /// Everything a pass needs besides the backend, scene and settings
    pub struct Fixture {
        pub shaders: ShaderLibrary,
        pub defaults: DefaultTextures,
        pub meshes: BuiltinMeshes,
        pub camera: Camera,
    }

    impl Fixture {
        pub fn new() -> (RecordingBackend, Self) {
            Self::with_backend(RecordingBackend::new(320, 200))
        }

        pub fn with_backend(mut backend: RecordingBackend) -> (RecordingBackend, Self) {
            let shaders = ShaderLibrary::load(&mut backend, Path::new("shaders.atlas")).unwrap();
            let defaults = DefaultTextures::new(&mut backend).unwrap();
            let meshes = BuiltinMeshes::new(&mut backend).unwrap();
            let mut camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
            camera.set_perspective(60.0, 1.6, 0.1, 100.0);
            backend.clear_log();
            (
                backend,
                Self {
                    shaders,
                    defaults,
                    meshes,
                    camera,
                },
            )
        }

        pub fn context<'a>(
            &'a self,
            scene: &'a Scene,
            settings: &'a RenderSettings,
            lights: &'a [LightRecord],
        ) -> FrameContext<'a> {
            FrameContext {
                scene,
                camera: &self.camera,
                settings,
                shaders: &self.shaders,
                defaults: &self.defaults,
                meshes: &self.meshes,
                lights,
                time: 0.0,
                skybox: None,
                planar_reflection: None,
            }
        }
    }

    pub fn unit_mesh(name: &str) -> Arc<Mesh> {
        Arc::new(Mesh::new(
            name,
            MeshHandle::from_raw(9000),
            36,
            BoundingBox::new(Vec3::ZERO, Vec3::ONE),
        ))
    }

    /// A prefab with one mesh node at `position`
    pub fn prefab_at(name: &str, position: Vec3, material: Material) -> PrefabEntity {
        let node = Node::new(name)
            .with_mesh(unit_mesh(name), Arc::new(material))
            .with_model(Mat4::from_translation(position));
        PrefabEntity::new(name, node)
    }
}
