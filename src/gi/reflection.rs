//! Reflection probes

use glam::{Vec2, Vec3};

use crate::backend::*;
use crate::pipeline::{draw_fullscreen, set_camera_uniforms, FrameContext};
use crate::shaders::ShaderId;
use crate::stats::FrameStats;

/// A point whose surroundings are captured into a mipmapped cubemap
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionProbe {
    pub position: Vec3,
    /// `None` until the first capture
    pub cubemap: Option<Framebuffer>,
}

impl ReflectionProbe {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            cubemap: None,
        }
    }

    pub fn is_captured(&self) -> bool {
        self.cubemap.is_some()
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.cubemap.as_ref().and_then(Framebuffer::color0)
    }

    /// Create the capture target if this probe has none yet
    pub fn ensure_cubemap(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        size: u32,
    ) -> BackendResult<Framebuffer> {
        if let Some(cubemap) = &self.cubemap {
            return Ok(cubemap.clone());
        }
        let cubemap = backend.create_framebuffer(&FramebufferDescriptor {
            label: Some("reflection_probe".into()),
            width: size,
            height: size,
            color_formats: vec![TextureFormat::Rgba16Float],
            depth: DepthAttachment::Owned(TextureFormat::Depth24Plus),
            cubemap: true,
            mipmaps: true,
        })?;
        self.cubemap = Some(cubemap.clone());
        Ok(cubemap)
    }

    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(cubemap) = self.cubemap.take() {
            backend.destroy_framebuffer(&cubemap);
        }
    }
}

/// Captured probe nearest to `point`; the first one wins ties
pub fn closest(probes: &[ReflectionProbe], point: Vec3) -> Option<&ReflectionProbe> {
    let mut best: Option<(&ReflectionProbe, f32)> = None;
    for probe in probes.iter().filter(|probe| probe.is_captured()) {
        let distance = probe.position.distance_squared(point);
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((probe, distance));
        }
    }
    best.map(|(probe, _)| probe)
}

/// Blend environment reflections over the lit image
///
/// Uses the closest captured probe, or the skybox when there is none.
pub fn apply(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    probes: &[ReflectionProbe],
    gbuffer: &Framebuffer,
    stats: &mut FrameStats,
) {
    let environment = closest(probes, ctx.camera.position)
        .and_then(ReflectionProbe::texture)
        .or(ctx.skybox);
    let Some(environment) = environment else {
        return;
    };
    if !ctx.shaders.has(ShaderId::ReflectionProbe) {
        return;
    }
    stats.begin_pass("reflections");
    ctx.shaders.enable(backend, ShaderId::ReflectionProbe);
    backend.set_pipeline_state(
        &PipelineState::fullscreen().with_blend(Some(BlendState::alpha_blending())),
    );
    set_camera_uniforms(backend, ctx.camera, ctx.time);
    backend.set_uniform(
        "u_iRes",
        Uniform::Vec2(Vec2::new(1.0 / gbuffer.width as f32, 1.0 / gbuffer.height as f32)),
    );
    backend.set_uniform("u_use_fresnel", Uniform::from(ctx.settings.reflections.fresnel));
    backend.set_texture("u_environment_texture", environment, 0);
    if let Some(depth) = gbuffer.depth {
        backend.set_texture("u_depth_texture", depth, 1);
    }
    if let [albedo, normal, extra, ..] = gbuffer.color.as_slice() {
        backend.set_texture("u_albedo_texture", *albedo, 2);
        backend.set_texture("u_normal_texture", *normal, 3);
        backend.set_texture("u_extra_texture", *extra, 4);
    }
    draw_fullscreen(backend, stats);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_closest_ignores_uncaptured_and_keeps_first_tie() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut probes = vec![
            ReflectionProbe::new(Vec3::new(1.0, 0.0, 0.0)),
            ReflectionProbe::new(Vec3::new(-2.0, 0.0, 0.0)),
            ReflectionProbe::new(Vec3::new(2.0, 0.0, 0.0)),
        ];
        assert!(closest(&probes, Vec3::ZERO).is_none());

        probes[1].ensure_cubemap(&mut backend, 8).unwrap();
        probes[2].ensure_cubemap(&mut backend, 8).unwrap();
        let found = closest(&probes, Vec3::ZERO).unwrap();
        assert_eq!(found.position, Vec3::new(-2.0, 0.0, 0.0));
    }

    #[test]
    fn test_cubemap_is_created_once() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut probe = ReflectionProbe::new(Vec3::ZERO);
        let first = probe.ensure_cubemap(&mut backend, 32).unwrap();
        let second = probe.ensure_cubemap(&mut backend, 32).unwrap();
        assert_eq!(first, second);
        let desc = backend.framebuffer_descriptor(first.handle).unwrap();
        assert!(desc.cubemap && desc.mipmaps);

        probe.release(&mut backend);
        assert!(!probe.is_captured());
        assert_eq!(backend.live_framebuffer_count(), 0);
    }
}
