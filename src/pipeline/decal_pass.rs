//! Decal projection into the G-buffer

use glam::Vec2;

use super::{draw_mesh, set_camera_uniforms, FrameContext};
use crate::backend::*;
use crate::shaders::ShaderId;
use crate::stats::FrameStats;
use crate::targets::{RenderTargets, TargetKind};

/// Paint every visible decal into the live G-buffer
///
/// Decal volumes read depth, normal and extra from copies taken first, since
/// they write into the same attachments. Without decals nothing is copied.
pub fn render(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    targets: &mut RenderTargets,
    gbuffer: &Framebuffer,
    stats: &mut FrameStats,
) {
    let decals: Vec<_> = ctx.scene.visible_decals().collect();
    if decals.is_empty() {
        return;
    }
    stats.begin_pass("decals");

    let clone = match targets.ensure(backend, TargetKind::DecalClone) {
        Ok(clone) => clone,
        Err(err) => {
            log::warn!("Skipping decals: {}", err);
            return;
        }
    };
    let (Some(depth), Some(depth_copy)) = (gbuffer.depth, clone.depth) else {
        log::warn!("Skipping decals: G-buffer has no depth");
        return;
    };
    backend.copy_texture(depth, depth_copy);
    for (src, dst) in gbuffer.color.iter().skip(1).zip(&clone.color) {
        backend.copy_texture(*src, *dst);
    }

    backend.bind_framebuffer(gbuffer, None);
    backend.set_viewport(0, 0, gbuffer.width, gbuffer.height);
    if !ctx.shaders.enable(backend, ShaderId::Decal) {
        return;
    }
    let state = PipelineState {
        depth_test: false,
        depth_write: false,
        cull_mode: CullMode::Front,
        ..PipelineState::default()
    }
    .with_blend(Some(BlendState::alpha_blending()));
    backend.set_pipeline_state(&state);
    set_camera_uniforms(backend, ctx.camera, ctx.time);
    backend.set_uniform(
        "u_iRes",
        Uniform::Vec2(Vec2::new(1.0 / gbuffer.width as f32, 1.0 / gbuffer.height as f32)),
    );
    backend.set_texture("u_depth_texture", depth_copy, 1);
    if let [normal, extra, ..] = clone.color.as_slice() {
        backend.set_texture("u_normal_texture", *normal, 2);
        backend.set_texture("u_extra_texture", *extra, 3);
    }

    for decal in &decals {
        backend.set_uniform("u_model", Uniform::Mat4(decal.model));
        backend.set_uniform("u_inverse_model", Uniform::Mat4(decal.model.inverse()));
        backend.set_texture("u_decal_texture", decal.texture.unwrap_or(ctx.defaults.white), 0);
        draw_mesh(backend, &ctx.meshes.cube, Primitive::Triangles, stats);
    }
    log::debug!("Projected {} decals", decals.len());
}
