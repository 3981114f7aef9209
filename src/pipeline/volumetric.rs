//! Volumetric fog
//!
//! Ray-marches the depth buffer at half resolution, one additive draw per
//! directional or spot light. The lighting pass composites the result.

use glam::{Vec2, Vec4};

use super::{draw_fullscreen, set_camera_uniforms, FrameContext};
use crate::backend::*;
use crate::scene::LightType;
use crate::shaders::ShaderId;
use crate::stats::FrameStats;
use crate::targets::{RenderTargets, TargetKind};

const SHADOW_SLOT: u32 = 8;

pub fn render(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    targets: &mut RenderTargets,
    gbuffer: &Framebuffer,
    stats: &mut FrameStats,
) -> Option<TextureHandle> {
    if !ctx.shaders.has(ShaderId::Volumetric) {
        return None;
    }
    stats.begin_pass("volumetric");
    let target = match targets.ensure(backend, TargetKind::Volumetric) {
        Ok(target) => target,
        Err(err) => {
            log::warn!("Skipping volumetric fog: {}", err);
            return None;
        }
    };
    let depth = gbuffer.depth?;

    backend.bind_framebuffer(&target, None);
    backend.set_viewport(0, 0, target.width, target.height);
    backend.clear(Some(Vec4::ZERO), false);
    ctx.shaders.enable(backend, ShaderId::Volumetric);
    backend.set_pipeline_state(
        &PipelineState::fullscreen().with_blend(Some(BlendState::additive())),
    );
    set_camera_uniforms(backend, ctx.camera, ctx.time);
    backend.set_uniform(
        "u_iRes",
        Uniform::Vec2(Vec2::new(1.0 / target.width as f32, 1.0 / target.height as f32)),
    );
    backend.set_uniform("u_air_density", Uniform::Float(ctx.settings.volumetric.air_density));
    backend.set_uniform("u_num_samples", Uniform::Int(ctx.settings.volumetric.samples as i32));
    backend.set_uniform("u_ambient_light", Uniform::Vec3(ctx.scene.ambient_light));
    backend.set_texture("u_depth_texture", depth, 0);

    for light in ctx
        .lights
        .iter()
        .filter(|light| matches!(light.light_type, LightType::Directional | LightType::Spot))
    {
        light.apply(backend, SHADOW_SLOT);
        draw_fullscreen(backend, stats);
    }
    target.color0()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::scene::{LightEntity, LightRecord, Scene};
    use crate::settings::RenderSettings;
    use glam::Vec3;

    #[test]
    fn test_only_directional_and_spot_lights_scatter() {
        let (mut backend, fx) = Fixture::new();
        let mut scene = Scene::new();
        scene.add_entity(LightEntity::point(Vec3::ZERO, Vec3::ONE, 1.0, 5.0));
        scene.add_entity(LightEntity::spot(Vec3::Y, Vec3::ZERO, Vec3::ONE, 1.0, 5.0));
        scene.add_entity(LightEntity::directional(Vec3::Y, Vec3::ZERO, Vec3::ONE, 1.0));
        let lights: Vec<LightRecord> = scene.lights().map(|(i, light)| light.record(i)).collect();
        let settings = RenderSettings::default();
        let mut targets = RenderTargets::new(320, 200, 64);
        let gbuffer = targets.ensure(&mut backend, TargetKind::GBuffer).unwrap();

        let ctx = fx.context(&scene, &settings, &lights);
        let texture = render(&mut backend, &ctx, &mut targets, &gbuffer, &mut FrameStats::new());

        let target = targets.get(TargetKind::Volumetric).unwrap();
        assert_eq!((target.width, target.height), (160, 100));
        assert_eq!(texture, target.color0());
        let draws: Vec<_> = backend.draws_with_shader("volumetric").collect();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].int("u_light_type"), Some(2));
        assert_eq!(draws[1].state.blend, Some(BlendState::additive()));
    }
}
