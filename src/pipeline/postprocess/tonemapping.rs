//! Final stage: tonemap or gamma correction to the screen

use serde::{Deserialize, Serialize};

use crate::backend::*;
use crate::pipeline::{draw_fullscreen, FrameContext};
use crate::shaders::ShaderId;
use crate::stats::FrameStats;

/// Curve mapping HDR color into display range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TonemapOperator {
    /// Reinhard-style curve driven by scale, average luminance and white point
    Parametric,
    /// Fixed filmic curve
    #[default]
    Filmic,
}

impl TonemapOperator {
    pub fn shader(&self) -> ShaderId {
        match self {
            TonemapOperator::Parametric => ShaderId::TonemapParametric,
            TonemapOperator::Filmic => ShaderId::TonemapFilmic,
        }
    }
}

/// Draw `source` to the screen
///
/// Falls back to gamma when tonemapping is off or its program is missing,
/// so exactly one of the two runs.
pub(super) fn present(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    source: TextureHandle,
    (width, height): (u32, u32),
    stats: &mut FrameStats,
) {
    let settings = &ctx.settings.post.tonemap;
    let inverse_gamma = 1.0 / settings.gamma.max(f32::EPSILON);

    backend.unbind_framebuffer();
    backend.set_viewport(0, 0, width, height);

    let tonemap = settings.enabled && ctx.shaders.enable(backend, settings.operator.shader());
    if tonemap {
        stats.begin_pass("tonemap");
        if settings.operator == TonemapOperator::Parametric {
            backend.set_uniform("u_scale", Uniform::Float(settings.scale));
            backend.set_uniform("u_average_lum", Uniform::Float(settings.average_lum));
            let lum_white = settings.lum_white * settings.lum_white;
            backend.set_uniform("u_lumwhite", Uniform::Float(lum_white));
        }
    } else {
        if settings.enabled {
            log::debug!("Tonemap program missing, presenting with gamma");
        }
        stats.begin_pass("gamma");
        ctx.shaders.enable(backend, ShaderId::Gamma);
    }
    backend.set_pipeline_state(&PipelineState::fullscreen());
    backend.set_uniform("u_igamma", Uniform::Float(inverse_gamma));
    backend.set_texture("u_texture", source, 0);
    draw_fullscreen(backend, stats);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::scene::Scene;
    use crate::settings::RenderSettings;

    #[test]
    fn test_parametric_uniforms() {
        let (mut backend, fx) = Fixture::new();
        let scene = Scene::new();
        let mut settings = RenderSettings::default();
        settings.post.tonemap.operator = TonemapOperator::Parametric;
        settings.post.tonemap.lum_white = 2.0;
        let ctx = fx.context(&scene, &settings, &[]);
        let mut stats = FrameStats::new();
        present(&mut backend, &ctx, fx.defaults.white, (320, 200), &mut stats);

        let draw = backend.draws_with_shader("tonemap_parametric").next().unwrap();
        assert_eq!(draw.uniform("u_lumwhite"), Some(&Uniform::Float(4.0)));
        assert_eq!(draw.target, None);
        assert_eq!(stats.passes, vec!["tonemap"]);
    }

    #[test]
    fn test_missing_tonemap_program_falls_back_to_gamma() {
        let backend = RecordingBackend::new(320, 200).without_shader("tonemap_filmic");
        let (mut backend, fx) = Fixture::with_backend(backend);
        let scene = Scene::new();
        let settings = RenderSettings::default();
        let ctx = fx.context(&scene, &settings, &[]);
        let mut stats = FrameStats::new();
        present(&mut backend, &ctx, fx.defaults.white, (320, 200), &mut stats);
        assert_eq!(stats.passes, vec!["gamma"]);
        assert_eq!(backend.draws_with_shader("gamma").count(), 1);
    }
}
