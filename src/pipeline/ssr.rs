//! Screen-space reflections
//!
//! Traces reflected rays against the G-buffer depth and fetches color from
//! the previous frame's lit image.

use glam::{Vec2, Vec4};

use super::{draw_fullscreen, set_camera_uniforms, FrameContext};
use crate::backend::*;
use crate::shaders::ShaderId;
use crate::stats::FrameStats;
use crate::targets::{RenderTargets, TargetKind};

/// Returns `None` until a previous frame exists to reflect
pub fn render(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    targets: &mut RenderTargets,
    gbuffer: &Framebuffer,
    previous_frame: Option<TextureHandle>,
    stats: &mut FrameStats,
) -> Option<TextureHandle> {
    if !ctx.shaders.has(ShaderId::Ssr) {
        return None;
    }
    let Some(previous_frame) = previous_frame else {
        log::debug!("Skipping SSR: no previous frame");
        return None;
    };
    stats.begin_pass("ssr");
    let target = match targets.ensure(backend, TargetKind::Ssr) {
        Ok(target) => target,
        Err(err) => {
            log::warn!("Skipping SSR: {}", err);
            return None;
        }
    };
    let depth = gbuffer.depth?;

    backend.bind_framebuffer(&target, None);
    backend.set_viewport(0, 0, target.width, target.height);
    backend.clear(Some(Vec4::ZERO), false);
    ctx.shaders.enable(backend, ShaderId::Ssr);
    backend.set_pipeline_state(&PipelineState::fullscreen());
    set_camera_uniforms(backend, ctx.camera, ctx.time);
    backend.set_uniform("u_projection", Uniform::Mat4(ctx.camera.projection_matrix()));
    backend.set_uniform("u_view", Uniform::Mat4(ctx.camera.view_matrix()));
    backend.set_uniform(
        "u_iRes",
        Uniform::Vec2(Vec2::new(1.0 / target.width as f32, 1.0 / target.height as f32)),
    );
    backend.set_uniform("u_intensity", Uniform::Float(ctx.settings.ssr.intensity));
    backend.set_texture("u_depth_texture", depth, 0);
    if let Some(normal) = gbuffer.color.get(1) {
        backend.set_texture("u_normal_texture", *normal, 1);
    }
    if let Some(extra) = gbuffer.color.get(2) {
        backend.set_texture("u_extra_texture", *extra, 2);
    }
    backend.set_texture("u_color_texture", previous_frame, 3);
    draw_fullscreen(backend, stats);
    target.color0()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::scene::Scene;
    use crate::settings::RenderSettings;

    #[test]
    fn test_needs_previous_frame() {
        let (mut backend, fx) = Fixture::new();
        let scene = Scene::new();
        let settings = RenderSettings::default();
        let mut targets = RenderTargets::new(320, 200, 64);
        let gbuffer = targets.ensure(&mut backend, TargetKind::GBuffer).unwrap();
        let ctx = fx.context(&scene, &settings, &[]);
        let mut stats = FrameStats::new();

        assert!(render(&mut backend, &ctx, &mut targets, &gbuffer, None, &mut stats).is_none());
        assert!(!stats.ran("ssr"));

        let previous = fx.defaults.black;
        let texture = render(
            &mut backend,
            &ctx,
            &mut targets,
            &gbuffer,
            Some(previous),
            &mut stats,
        );
        assert!(texture.is_some());
        let draw = backend.draws_with_shader("ssr").next().unwrap();
        assert_eq!(draw.texture("u_color_texture"), Some(previous));
    }
}
