//! Screen-space ambient occlusion
//!
//! Samples a kernel of points around each G-buffer position and writes the
//! occlusion factor the global lighting pass multiplies ambient light by.

use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{draw_fullscreen, set_camera_uniforms, FrameContext};
use crate::backend::*;
use crate::shaders::ShaderId;
use crate::stats::FrameStats;
use crate::targets::{RenderTargets, TargetKind};

const KERNEL_SEED: u64 = 0x55A0;

/// Random sample offsets inside the unit sphere (or the +Z hemisphere)
///
/// Samples cluster towards the center so nearby geometry weighs more.
pub fn generate_kernel(samples: usize, hemisphere: bool, seed: u64) -> Vec<Vec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..samples)
        .map(|i| {
            let mut dir = loop {
                let candidate = Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
                let length_squared = candidate.length_squared();
                if length_squared > 1e-4 && length_squared <= 1.0 {
                    break candidate.normalize();
                }
            };
            if hemisphere {
                dir.z = dir.z.abs();
            }
            let t = i as f32 / samples as f32;
            let scale = 0.1 + 0.9 * t * t;
            dir * rng.gen_range(0.0..1.0f32) * scale
        })
        .collect()
}

/// SSAO with a cached sample kernel
#[derive(Debug, Clone, Default)]
pub struct SsaoPass {
    kernel: Vec<Vec3>,
    hemisphere: bool,
}

impl SsaoPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kernel(&self) -> &[Vec3] {
        &self.kernel
    }

    /// Regenerate the kernel only when its parameters changed
    fn update_kernel(&mut self, samples: usize, hemisphere: bool) {
        if self.kernel.len() != samples || self.hemisphere != hemisphere {
            log::debug!("SSAO kernel regenerated: {} samples, hemisphere {}", samples, hemisphere);
            self.kernel = generate_kernel(samples, hemisphere, KERNEL_SEED);
            self.hemisphere = hemisphere;
        }
    }

    /// Compute occlusion from the G-buffer; returns the texture to sample
    pub fn render(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        ctx: &FrameContext,
        targets: &mut RenderTargets,
        gbuffer: &Framebuffer,
        stats: &mut FrameStats,
    ) -> Option<TextureHandle> {
        let settings = &ctx.settings.ssao;
        if !ctx.shaders.has(ShaderId::Ssao) {
            return None;
        }
        stats.begin_pass("ssao");
        self.update_kernel(settings.samples, settings.hemisphere);

        let target = match targets.ensure(backend, TargetKind::Ssao) {
            Ok(target) => target,
            Err(err) => {
                log::warn!("Skipping SSAO: {}", err);
                return None;
            }
        };
        let depth = gbuffer.depth?;
        let normal = gbuffer.color.get(1).copied()?;

        backend.bind_framebuffer(&target, None);
        backend.set_viewport(0, 0, target.width, target.height);
        backend.clear(Some(glam::Vec4::ONE), false);
        ctx.shaders.enable(backend, ShaderId::Ssao);
        backend.set_pipeline_state(&PipelineState::fullscreen());
        set_camera_uniforms(backend, ctx.camera, ctx.time);
        backend.set_uniform(
            "u_iRes",
            Uniform::Vec2(Vec2::new(1.0 / target.width as f32, 1.0 / target.height as f32)),
        );
        backend.set_uniform("u_radius", Uniform::Float(settings.radius));
        backend.set_uniform("u_max_distance", Uniform::Float(settings.max_distance));
        backend.set_uniform("u_hemisphere", Uniform::from(settings.hemisphere));
        backend.set_uniform("u_num_samples", Uniform::Int(self.kernel.len() as i32));
        backend.set_uniform("u_random_points", Uniform::Vec3Array(self.kernel.clone()));
        backend.set_texture("u_depth_texture", depth, 0);
        backend.set_texture("u_normal_texture", normal, 1);
        draw_fullscreen(backend, stats);

        let mut result = target.color0();
        if settings.blur && ctx.shaders.has(ShaderId::SsaoBlur) {
            match targets.ensure(backend, TargetKind::SsaoBlur) {
                Ok(blurred) => {
                    stats.begin_pass("ssao_blur");
                    backend.bind_framebuffer(&blurred, None);
                    ctx.shaders.enable(backend, ShaderId::SsaoBlur);
                    backend.set_pipeline_state(&PipelineState::fullscreen());
                    backend.set_uniform(
                        "u_iRes",
                        Uniform::Vec2(Vec2::new(
                            1.0 / blurred.width as f32,
                            1.0 / blurred.height as f32,
                        )),
                    );
                    if let Some(raw) = result {
                        backend.set_texture("u_texture", raw, 0);
                    }
                    draw_fullscreen(backend, stats);
                    result = blurred.color0();
                }
                Err(err) => log::warn!("Skipping SSAO blur: {}", err),
            }
        }
        result
    }
}

/// Show a single-channel texture full screen
pub fn render_debug(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    texture: Option<TextureHandle>,
    stats: &mut FrameStats,
) {
    stats.begin_pass("ssao_debug");
    backend.unbind_framebuffer();
    let (width, height) = backend.viewport_size();
    backend.set_viewport(0, 0, width, height);
    backend.clear(Some(glam::Vec4::ZERO), true);
    let Some(texture) = texture else {
        return;
    };
    if !ctx.shaders.enable(backend, ShaderId::Quad) {
        return;
    }
    backend.set_pipeline_state(&PipelineState::fullscreen());
    backend.set_texture("u_texture", texture, 0);
    draw_fullscreen(backend, stats);
}
