//! Separable blur

use glam::Vec2;

use crate::backend::*;
use crate::pipeline::{draw_fullscreen, FrameContext};
use crate::shaders::ShaderId;
use crate::stats::FrameStats;

/// Sample offsets of every blur draw: horizontal then vertical, with the
/// distance doubling each iteration
pub(super) fn offsets(iterations: u32, texel: Vec2) -> impl Iterator<Item = Vec2> {
    (0..iterations).flat_map(move |i| {
        let step = (1u32 << i.min(31)) as f32;
        [Vec2::new(texel.x * step, 0.0), Vec2::new(0.0, texel.y * step)]
    })
}

/// Blur `image` in place, bouncing every other draw through `scratch`
pub(super) fn blur_in_place(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    image: &Framebuffer,
    scratch: &Framebuffer,
    iterations: u32,
    stats: &mut FrameStats,
) {
    if !ctx.shaders.enable(backend, ShaderId::Blur) {
        return;
    }
    backend.set_pipeline_state(&PipelineState::fullscreen());
    backend.set_viewport(0, 0, image.width, image.height);
    let texel = Vec2::new(1.0 / image.width as f32, 1.0 / image.height as f32);

    for (i, offset) in offsets(iterations, texel).enumerate() {
        let (source, target) = if i % 2 == 0 { (image, scratch) } else { (scratch, image) };
        let Some(color) = source.color0() else {
            return;
        };
        backend.bind_framebuffer(target, None);
        backend.set_uniform("u_offset", Uniform::Vec2(offset));
        backend.set_texture("u_texture", color, 0);
        draw_fullscreen(backend, stats);
    }
}
