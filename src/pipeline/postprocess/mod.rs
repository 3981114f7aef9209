//! Post-processing chain
//!
//! Effects bounce between two screen-sized targets. Each one reads the
//! current image, writes the other target and swaps. The chain always ends
//! on screen with either a tonemap or plain gamma correction.

mod bloom;
mod blur;
mod tonemapping;

pub use bloom::BloomMode;
pub use tonemapping::TonemapOperator;

use glam::{Mat4, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{draw_fullscreen, set_camera_uniforms, FrameContext};
use crate::backend::*;
use crate::shaders::ShaderId;
use crate::stats::FrameStats;
use crate::targets::{PingPong, RenderTargets, TargetKind};

/// Images the chain starts from
#[derive(Debug, Clone, Copy)]
pub struct PostInputs {
    /// Lit HDR image
    pub color: TextureHandle,
    /// Scene depth, needed by motion blur and depth of field
    pub depth: Option<TextureHandle>,
    /// Camera of the previous frame, for motion blur
    pub previous_view_projection: Option<Mat4>,
}

/// Current image plus the ping-pong pair it moves through
pub(crate) struct Chain {
    pingpong: PingPong<TargetKind>,
    current: TextureHandle,
}

impl Chain {
    pub(crate) fn new(input: TextureHandle) -> Self {
        Self {
            pingpong: PingPong::new(TargetKind::PostA, TargetKind::PostB),
            current: input,
        }
    }

    pub(crate) fn current(&self) -> TextureHandle {
        self.current
    }

    /// Bind the next target with `shader` reading the current image
    pub(crate) fn begin(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        ctx: &FrameContext,
        targets: &mut RenderTargets,
        shader: ShaderId,
    ) -> Option<Framebuffer> {
        if !ctx.shaders.has(shader) {
            return None;
        }
        let target = match targets.ensure(backend, *self.pingpong.target()) {
            Ok(target) => target,
            Err(err) => {
                log::warn!("Skipping post stage '{}': {}", shader.name(), err);
                return None;
            }
        };
        backend.bind_framebuffer(&target, None);
        backend.set_viewport(0, 0, target.width, target.height);
        ctx.shaders.enable(backend, shader);
        backend.set_pipeline_state(&PipelineState::fullscreen());
        backend.set_uniform(
            "u_iRes",
            Uniform::Vec2(Vec2::new(1.0 / target.width as f32, 1.0 / target.height as f32)),
        );
        backend.set_texture("u_texture", self.current, 0);
        Some(target)
    }

    /// Make the target just drawn the current image
    pub(crate) fn end(&mut self, target: &Framebuffer) {
        if let Some(color) = target.color0() {
            self.current = color;
        }
        self.pingpong.swap();
    }
}

/// One full-screen effect draw
struct Stage {
    pass: &'static str,
    shader: ShaderId,
    uniforms: Vec<(&'static str, Uniform)>,
    textures: Vec<(&'static str, TextureHandle)>,
}

impl Stage {
    fn new(pass: &'static str, shader: ShaderId) -> Self {
        Self {
            pass,
            shader,
            uniforms: Vec::new(),
            textures: Vec::new(),
        }
    }

    fn uniform(mut self, name: &'static str, value: impl Into<Uniform>) -> Self {
        self.uniforms.push((name, value.into()));
        self
    }

    fn texture(mut self, name: &'static str, texture: TextureHandle) -> Self {
        self.textures.push((name, texture));
        self
    }

    fn run(
        self,
        backend: &mut dyn GraphicsBackend,
        ctx: &FrameContext,
        targets: &mut RenderTargets,
        chain: &mut Chain,
        stats: &mut FrameStats,
    ) {
        let Some(target) = chain.begin(backend, ctx, targets, self.shader) else {
            return;
        };
        stats.begin_pass(self.pass);
        set_camera_uniforms(backend, ctx.camera, ctx.time);
        for (name, value) in self.uniforms {
            backend.set_uniform(name, value);
        }
        for (slot, (name, texture)) in self.textures.into_iter().enumerate() {
            backend.set_texture(name, texture, slot as u32 + 1);
        }
        draw_fullscreen(backend, stats);
        chain.end(&target);
    }
}

/// Noise offset for the grain stage, fixed for a given frame time
fn grain_seed(time: f32) -> f32 {
    StdRng::seed_from_u64(u64::from(time.to_bits())).gen::<f32>()
}

/// Run every enabled effect on `inputs.color` and present the result
pub fn render(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    targets: &mut RenderTargets,
    inputs: PostInputs,
    max_bloom_mips: u32,
    stats: &mut FrameStats,
) {
    let post = &ctx.settings.post;
    let mut chain = Chain::new(inputs.color);

    if post.color_correction.enabled {
        let cc = &post.color_correction;
        Stage::new("color_correction", ShaderId::ColorCorrection)
            .uniform("u_brightness", cc.brightness)
            .uniform("u_contrast", cc.contrast)
            .uniform("u_saturation", cc.saturation)
            .run(backend, ctx, targets, &mut chain, stats);
    }
    if post.vignette.enabled {
        Stage::new("vignette", ShaderId::Vignette)
            .uniform("u_amount", post.vignette.amount)
            .run(backend, ctx, targets, &mut chain, stats);
    }
    if post.grain.enabled {
        Stage::new("grain", ShaderId::Grain)
            .uniform("u_amount", post.grain.amount)
            .uniform("u_seed", grain_seed(ctx.time))
            .run(backend, ctx, targets, &mut chain, stats);
    }
    if post.lens_distortion.enabled {
        Stage::new("lens_distortion", ShaderId::LensDistortion)
            .uniform("u_amount", post.lens_distortion.amount)
            .run(backend, ctx, targets, &mut chain, stats);
    }
    if let (true, Some(depth)) = (post.motion_blur.enabled, inputs.depth) {
        let current = ctx.camera.view_projection_matrix();
        Stage::new("motion_blur", ShaderId::MotionBlur)
            .uniform("u_amount", post.motion_blur.amount)
            .uniform(
                "u_prev_viewprojection",
                inputs.previous_view_projection.unwrap_or(current),
            )
            .texture("u_depth_texture", depth)
            .run(backend, ctx, targets, &mut chain, stats);
    }
    if let (true, Some(depth)) = (post.depth_of_field.enabled, inputs.depth) {
        let dof = &post.depth_of_field;
        Stage::new("depth_of_field", ShaderId::DepthOfField)
            .uniform("u_focus_distance", dof.focus_distance)
            .uniform("u_focus_range", dof.focus_range)
            .texture("u_depth_texture", depth)
            .run(backend, ctx, targets, &mut chain, stats);
    }
    if post.blur.enabled {
        let (width, height) = targets.size();
        let texel = Vec2::new(1.0 / width as f32, 1.0 / height as f32);
        for offset in blur::offsets(post.blur.iterations, texel) {
            Stage::new("blur", ShaderId::Blur)
                .uniform("u_offset", offset)
                .run(backend, ctx, targets, &mut chain, stats);
        }
    }
    if post.bloom.enabled {
        bloom::render(backend, ctx, targets, &mut chain, max_bloom_mips, stats);
    }

    let screen = targets.size();
    tonemapping::present(backend, ctx, chain.current(), screen, stats);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::scene::Scene;
    use crate::settings::RenderSettings;

    fn run(settings: &RenderSettings) -> (RecordingBackend, RenderTargets, FrameStats) {
        let (mut backend, fx) = Fixture::new();
        let scene = Scene::new();
        let ctx = fx.context(&scene, settings, &[]);
        let mut targets = RenderTargets::new(320, 200, 64);
        let inputs = PostInputs {
            color: fx.defaults.white,
            depth: Some(fx.defaults.black),
            previous_view_projection: None,
        };
        let mut stats = FrameStats::new();
        render(&mut backend, &ctx, &mut targets, inputs, 5, &mut stats);
        (backend, targets, stats)
    }

    #[test]
    fn test_default_chain_only_tonemaps() {
        let (backend, _, stats) = run(&RenderSettings::default());
        assert_eq!(stats.passes, vec!["tonemap"]);
        let draw = backend.draws().last().unwrap();
        assert_eq!(draw.target, None);
        assert_eq!(draw.shader.as_deref(), Some("tonemap_filmic"));
    }

    #[test]
    fn test_gamma_replaces_disabled_tonemap() {
        let mut settings = RenderSettings::default();
        settings.post.tonemap.enabled = false;
        let (backend, _, stats) = run(&settings);
        assert_eq!(stats.passes, vec!["gamma"]);
        let draw = backend.draws().last().unwrap();
        assert_eq!(draw.uniform("u_igamma"), Some(&Uniform::Float(1.0 / 2.2)));
    }

    #[test]
    fn test_stages_run_in_order_and_alternate_targets() {
        let mut settings = RenderSettings::default();
        settings.post.color_correction.enabled = true;
        settings.post.grain.enabled = true;
        settings.post.depth_of_field.enabled = true;
        settings.post.vignette.enabled = true;
        let (backend, targets, stats) = run(&settings);
        assert_eq!(
            stats.passes,
            vec!["color_correction", "vignette", "grain", "depth_of_field", "tonemap"]
        );

        let a = targets.get(TargetKind::PostA).unwrap();
        let b = targets.get(TargetKind::PostB).unwrap();
        let draws = backend.draws();
        let written: Vec<_> = draws.iter().map(|draw| draw.target).collect();
        assert_eq!(
            written,
            vec![Some(a.handle), Some(b.handle), Some(a.handle), Some(b.handle), None]
        );
        // Every stage samples what the previous one wrote
        assert_eq!(draws[1].texture("u_texture"), a.color0());
        assert_eq!(draws[4].texture("u_texture"), b.color0());
    }

    #[test]
    fn test_depth_stages_need_depth() {
        let (mut backend, fx) = Fixture::new();
        let scene = Scene::new();
        let mut settings = RenderSettings::default();
        settings.post.motion_blur.enabled = true;
        settings.post.depth_of_field.enabled = true;
        let ctx = fx.context(&scene, &settings, &[]);
        let mut targets = RenderTargets::new(320, 200, 64);
        let inputs = PostInputs {
            color: fx.defaults.white,
            depth: None,
            previous_view_projection: None,
        };
        let mut stats = FrameStats::new();
        render(&mut backend, &ctx, &mut targets, inputs, 5, &mut stats);
        assert_eq!(stats.passes, vec!["tonemap"]);
    }

    #[test]
    fn test_motion_blur_reads_previous_camera() {
        let mut settings = RenderSettings::default();
        settings.post.motion_blur.enabled = true;
        let (backend, _, _) = run(&settings);
        let draw = backend.draws_with_shader("motion_blur").next().unwrap();
        // Without history the current camera stands in
        assert_eq!(draw.uniform("u_prev_viewprojection"), draw.uniform("u_viewprojection"));
    }

    #[test]
    fn test_blur_draws_two_per_iteration() {
        let mut settings = RenderSettings::default();
        settings.post.blur.enabled = true;
        settings.post.blur.iterations = 3;
        let (backend, _, stats) = run(&settings);
        assert_eq!(backend.draws_with_shader("blur").count(), 6);
        assert_eq!(stats.passes.iter().filter(|pass| **pass == "blur").count(), 6);
    }

    #[test]
    fn test_grain_seed_follows_frame_time() {
        assert_eq!(grain_seed(1.5), grain_seed(1.5));
        assert_ne!(grain_seed(1.5), grain_seed(1.6));
        assert!((0.0..1.0).contains(&grain_seed(0.0)));
    }
}
