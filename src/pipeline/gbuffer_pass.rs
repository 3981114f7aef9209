//! G-Buffer generation pass for deferred rendering
//!
//! Renders geometry to multiple render targets (MRT):
//! - Albedo (base color, alpha)
//! - World-space normals (encoded)
//! - Extra: emissive and material factors
//! - Depth buffer

use glam::Vec4;

use super::{
    draw_fullscreen, draw_mesh, set_camera_uniforms, FrameContext, RenderCall, RenderCallLists,
};
use crate::backend::*;
use crate::resources::AlphaMode;
use crate::shaders::ShaderId;
use crate::stats::FrameStats;

/// Whether a call is written into the G-buffer
fn writes_gbuffer(call: &RenderCall, dithering: bool) -> bool {
    call.material.alpha_mode != AlphaMode::Blend || dithering
}

/// Fill the G-buffer from the frame's calls
pub fn render(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    calls: &RenderCallLists,
    gbuffer: &Framebuffer,
    stats: &mut FrameStats,
) {
    stats.begin_pass("gbuffer");
    backend.bind_framebuffer(gbuffer, None);
    backend.set_viewport(0, 0, gbuffer.width, gbuffer.height);
    backend.clear(Some(Vec4::ZERO), true);

    if !ctx.shaders.enable(backend, ShaderId::GBuffer) {
        return;
    }
    let dithering = ctx.settings.dithering;
    let mut written = 0;
    for call in calls.iter().filter(|call| writes_gbuffer(call, dithering)) {
        let state = call
            .material
            .pipeline_state(PipelineState::default())
            .with_blend(None);
        backend.set_pipeline_state(&state);
        backend.set_uniform("u_model", Uniform::Mat4(call.model));
        set_camera_uniforms(backend, ctx.camera, ctx.time);
        call.material.bind(backend, ctx.defaults);
        backend.set_uniform("u_use_normal_map", Uniform::from(ctx.settings.use_normal_maps));
        backend.set_uniform("u_use_emissive", Uniform::from(ctx.settings.use_emissive));
        backend.set_uniform("u_use_occlusion", Uniform::from(ctx.settings.use_occlusion));
        let dither = call.material.alpha_mode == AlphaMode::Blend;
        backend.set_uniform("u_dither", Uniform::from(dither));
        draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
        written += 1;
    }
    log::debug!("G-buffer: {} of {} calls written", written, calls.len());
}

/// Present albedo, normal, extra and depth in the four screen quadrants
pub fn render_debug(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    gbuffer: &Framebuffer,
    stats: &mut FrameStats,
) {
    stats.begin_pass("gbuffers_debug");
    backend.unbind_framebuffer();
    let (width, height) = backend.viewport_size();
    backend.set_viewport(0, 0, width, height);
    backend.clear(Some(Vec4::ZERO), true);
    if !ctx.shaders.enable(backend, ShaderId::GBuffersDebug) {
        return;
    }
    backend.set_pipeline_state(&PipelineState::fullscreen());
    backend.set_uniform(
        "u_camera_nearfar",
        Uniform::Vec2(glam::Vec2::new(ctx.camera.near(), ctx.camera.far())),
    );

    let (half_w, half_h) = ((width / 2).max(1), (height / 2).max(1));
    let mut quadrant_textures = gbuffer.color.iter().copied().take(3).collect::<Vec<_>>();
    quadrant_textures.extend(gbuffer.depth);
    for (quadrant, texture) in quadrant_textures.into_iter().enumerate() {
        // Top-left, top-right, bottom-left, bottom-right
        let x = (quadrant as u32 % 2) * half_w;
        let y = (1 - quadrant as u32 / 2) * half_h;
        backend.set_viewport(x, y, half_w, half_h);
        backend.set_uniform("u_mode", Uniform::Int(quadrant as i32));
        backend.set_texture("u_texture", texture, 0);
        draw_fullscreen(backend, stats);
    }
    backend.set_viewport(0, 0, width, height);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::pipeline::{collect_calls, RenderPriority};
    use crate::resources::Material;
    use crate::scene::Scene;
    use crate::settings::RenderSettings;
    use crate::targets::{RenderTargets, TargetKind};
    use glam::Vec3;

    fn scene() -> Scene {
        let mut scene = Scene::new();
        scene.add_entity(prefab_at("solid", Vec3::ZERO, Material::default()));
        scene.add_entity(prefab_at("glass", Vec3::new(1.0, 0.0, 0.0), Material::glass()));
        scene
    }

    fn gbuffer_draws(dithering: bool) -> Vec<DrawRecord> {
        let (mut backend, fx) = Fixture::new();
        let scene = scene();
        let mut settings = RenderSettings::default();
        settings.dithering = dithering;
        let mut lists = RenderCallLists::new(RenderPriority::DistanceSorted);
        collect_calls(&scene, &fx.camera, false, &mut lists);
        let mut targets = RenderTargets::new(320, 200, 64);
        let gbuffer = targets.ensure(&mut backend, TargetKind::GBuffer).unwrap();

        let ctx = fx.context(&scene, &settings, &[]);
        render(&mut backend, &ctx, &lists, &gbuffer, &mut FrameStats::new());
        backend.draws_with_shader("gbuffer").cloned().collect()
    }

    #[test]
    fn test_blend_materials_need_dithering() {
        let draws = gbuffer_draws(false);
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].int("u_dither"), Some(0));

        let draws = gbuffer_draws(true);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].int("u_dither"), Some(1));
        assert_eq!(draws[1].state.blend, None);
    }

    #[test]
    fn test_debug_view_fills_four_quadrants() {
        let (mut backend, fx) = Fixture::new();
        let scene = Scene::new();
        let settings = RenderSettings::default();
        let mut targets = RenderTargets::new(320, 200, 64);
        let gbuffer = targets.ensure(&mut backend, TargetKind::GBuffer).unwrap();
        let ctx = fx.context(&scene, &settings, &[]);
        render_debug(&mut backend, &ctx, &gbuffer, &mut FrameStats::new());

        let draws: Vec<_> = backend.draws_with_shader("gbuffers_debug").collect();
        assert_eq!(draws.len(), 4);
        assert!(draws.iter().all(|draw| draw.target.is_none()));
        assert_eq!(draws[3].texture("u_texture"), gbuffer.depth);
    }
}
