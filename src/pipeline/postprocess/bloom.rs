//! Bloom post-processing effect

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::blur::blur_in_place;
use super::Chain;
use crate::backend::*;
use crate::pipeline::{draw_fullscreen, FrameContext};
use crate::shaders::ShaderId;
use crate::stats::FrameStats;
use crate::targets::{RenderTargets, TargetKind};

/// Upper bound of the mip chain, whatever the configuration asks for
const BLOOM_MIP_LEVELS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BloomMode {
    /// Extract, blur once at half resolution, add back
    Simple,
    /// Blur a chain of downsampled levels and add them up
    #[default]
    Advanced,
}

/// Number of mip levels a frame uses
pub(super) fn level_count(mode: BloomMode, requested: u32, max_levels: u32) -> u32 {
    match mode {
        BloomMode::Simple => 1,
        BloomMode::Advanced => requested.min(max_levels).clamp(1, BLOOM_MIP_LEVELS),
    }
}

fn bind_level(backend: &mut dyn GraphicsBackend, level: &Framebuffer) {
    backend.bind_framebuffer(level, None);
    backend.set_viewport(0, 0, level.width, level.height);
    backend.set_uniform(
        "u_iRes",
        Uniform::Vec2(Vec2::new(1.0 / level.width as f32, 1.0 / level.height as f32)),
    );
}

fn ensure_levels(
    backend: &mut dyn GraphicsBackend,
    targets: &mut RenderTargets,
    count: u32,
) -> BackendResult<Vec<(Framebuffer, Framebuffer)>> {
    (0..count as u8)
        .map(|level| {
            Ok((
                targets.ensure(backend, TargetKind::BloomMip(level))?,
                targets.ensure(backend, TargetKind::BloomScratch(level))?,
            ))
        })
        .collect()
}

/// Add a glow of the bright parts of the current image
pub(super) fn render(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    targets: &mut RenderTargets,
    chain: &mut Chain,
    max_levels: u32,
    stats: &mut FrameStats,
) {
    let settings = &ctx.settings.post.bloom;
    let mut needed = vec![ShaderId::BloomExtract, ShaderId::Blur, ShaderId::BloomComposite];
    if settings.mode == BloomMode::Advanced {
        needed.extend([ShaderId::BloomDownsample, ShaderId::Quad]);
    }
    if let Some(missing) = needed.iter().find(|id| !ctx.shaders.has(**id)) {
        log::debug!("Skipping bloom: shader '{}' unavailable", missing.name());
        return;
    }

    let count = level_count(settings.mode, settings.mips, max_levels);
    let levels = match ensure_levels(backend, targets, count) {
        Ok(levels) => levels,
        Err(err) => {
            log::warn!("Skipping bloom: {}", err);
            return;
        }
    };
    stats.begin_pass("bloom");

    // Bright pass into the first level
    let (first, _) = &levels[0];
    ctx.shaders.enable(backend, ShaderId::BloomExtract);
    backend.set_pipeline_state(&PipelineState::fullscreen());
    bind_level(backend, first);
    backend.set_uniform("u_threshold", Uniform::Float(settings.threshold));
    backend.set_texture("u_texture", chain.current(), 0);
    draw_fullscreen(backend, stats);

    for pair in levels.windows(2) {
        let (Some(source), (target, _)) = (pair[0].0.color0(), &pair[1]) else {
            continue;
        };
        ctx.shaders.enable(backend, ShaderId::BloomDownsample);
        backend.set_pipeline_state(&PipelineState::fullscreen());
        bind_level(backend, target);
        backend.set_texture("u_texture", source, 0);
        draw_fullscreen(backend, stats);
    }

    for (level, scratch) in &levels {
        blur_in_place(backend, ctx, level, scratch, settings.iterations, stats);
    }

    // Smallest to largest, each level adds into the next larger one
    if levels.len() > 1 {
        ctx.shaders.enable(backend, ShaderId::Quad);
        backend.set_pipeline_state(
            &PipelineState::fullscreen().with_blend(Some(BlendState::additive())),
        );
        for pair in levels.windows(2).rev() {
            let ((target, _), Some(source)) = (&pair[0], pair[1].0.color0()) else {
                continue;
            };
            bind_level(backend, target);
            backend.set_texture("u_texture", source, 0);
            draw_fullscreen(backend, stats);
        }
    }

    let Some(glow) = levels[0].0.color0() else {
        return;
    };
    let Some(target) = chain.begin(backend, ctx, targets, ShaderId::BloomComposite) else {
        return;
    };
    backend.set_uniform("u_bloom_intensity", Uniform::Float(settings.intensity));
    backend.set_texture("u_bloom_texture", glow, 1);
    draw_fullscreen(backend, stats);
    chain.end(&target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::scene::Scene;
    use crate::settings::RenderSettings;

    #[test]
    fn test_level_count() {
        assert_eq!(level_count(BloomMode::Simple, 6, 5), 1);
        assert_eq!(level_count(BloomMode::Advanced, 6, 5), 5);
        assert_eq!(level_count(BloomMode::Advanced, 0, 5), 1);
        assert_eq!(level_count(BloomMode::Advanced, 20, 20), BLOOM_MIP_LEVELS);
    }

    struct BloomRun {
        backend: RecordingBackend,
        targets: RenderTargets,
        stats: FrameStats,
        input: TextureHandle,
        output: TextureHandle,
    }

    fn run_bloom(mode: BloomMode, mips: u32) -> BloomRun {
        let (mut backend, fx) = Fixture::new();
        let scene = Scene::new();
        let mut settings = RenderSettings::default();
        settings.post.bloom.enabled = true;
        settings.post.bloom.mode = mode;
        settings.post.bloom.mips = mips;
        settings.post.bloom.iterations = 1;
        let ctx = fx.context(&scene, &settings, &[]);
        let mut targets = RenderTargets::new(320, 200, 64);
        let mut chain = Chain::new(fx.defaults.white);
        let mut stats = FrameStats::new();
        render(&mut backend, &ctx, &mut targets, &mut chain, 5, &mut stats);
        BloomRun {
            backend,
            targets,
            stats,
            input: fx.defaults.white,
            output: chain.current(),
        }
    }

    #[test]
    fn test_simple_uses_one_level() {
        let run = run_bloom(BloomMode::Simple, 4);
        assert_eq!(run.stats.passes, vec!["bloom"]);
        assert!(run.targets.get(TargetKind::BloomMip(0)).is_some());
        assert!(run.targets.get(TargetKind::BloomMip(1)).is_none());
        // extract, blur h+v, composite
        assert_eq!(run.backend.draws().len(), 4);
        assert_eq!(Some(run.output), run.targets.get(TargetKind::PostA).unwrap().color0());
    }

    #[test]
    fn test_advanced_downsamples_then_adds_up() {
        let BloomRun {
            backend, targets, input, ..
        } = run_bloom(BloomMode::Advanced, 3);
        let mip = |level| targets.get(TargetKind::BloomMip(level)).unwrap().clone();
        assert_eq!(mip(1).width, 80);
        assert_eq!(backend.draws_with_shader("bloom_downsample").count(), 2);
        assert_eq!(backend.draws_with_shader("blur").count(), 6);

        let upsample: Vec<_> = backend.draws_with_shader("quad").collect();
        assert_eq!(upsample.len(), 2);
        assert_eq!(upsample[0].target, Some(mip(1).handle));
        assert_eq!(upsample[0].texture("u_texture"), mip(2).color0());
        assert_eq!(upsample[1].target, Some(mip(0).handle));
        assert_eq!(upsample[1].state.blend, Some(BlendState::additive()));

        let composite = backend.draws_with_shader("bloom_composite").next().unwrap();
        assert_eq!(composite.texture("u_bloom_texture"), mip(0).color0());
        assert_eq!(composite.texture("u_texture"), Some(input));
    }
}
