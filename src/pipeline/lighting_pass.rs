//! Deferred lighting: resolve and composite
//!
//! The resolve shades the G-buffer into the deferred HDR target, which
//! renders against the G-buffer's own depth:
//! 1. Global - Ambient (times occlusion) and emissive, full screen
//! 2. Directional lights - Additive full-screen quads
//! 3. Point and spot lights - Additive sphere volumes sized to their range
//!
//! The composite then layers probes, reflections, fog and transparent
//! geometry on top.

use glam::{Mat4, Vec2, Vec3};

use super::{
    draw_fullscreen, draw_mesh, draw_skybox, forward_pass, set_camera_uniforms, FrameContext,
    RenderCallLists,
};
use crate::backend::*;
use crate::gi::{irradiance, reflection, IrradianceGrid, ReflectionProbe};
use crate::scene::LightType;
use crate::shaders::ShaderId;
use crate::stats::FrameStats;

const SHADOW_SLOT: u32 = 8;

/// Screen-space results feeding the composite
#[derive(Debug, Clone, Copy, Default)]
pub struct AuxiliaryTextures {
    pub ssao: Option<TextureHandle>,
    pub volumetric: Option<TextureHandle>,
    pub ssr: Option<TextureHandle>,
}

/// State of the sphere volumes: only back faces, drawn where they lie
/// behind the stored surface
pub fn light_volume_state() -> PipelineState {
    PipelineState {
        depth_test: true,
        depth_write: false,
        depth_compare: CompareFunction::GreaterEqual,
        cull_mode: CullMode::Front,
        ..PipelineState::default()
    }
    .with_blend(Some(BlendState::additive()))
}

fn bind_gbuffer(backend: &mut dyn GraphicsBackend, gbuffer: &Framebuffer) {
    if let [albedo, normal, extra, ..] = gbuffer.color.as_slice() {
        backend.set_texture("u_albedo_texture", *albedo, 0);
        backend.set_texture("u_normal_texture", *normal, 1);
        backend.set_texture("u_extra_texture", *extra, 2);
    }
    if let Some(depth) = gbuffer.depth {
        backend.set_texture("u_depth_texture", depth, 3);
    }
    backend.set_uniform(
        "u_iRes",
        Uniform::Vec2(Vec2::new(1.0 / gbuffer.width as f32, 1.0 / gbuffer.height as f32)),
    );
}

/// Shade the G-buffer into `hdr`
pub fn resolve(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    gbuffer: &Framebuffer,
    hdr: &Framebuffer,
    ssao: Option<TextureHandle>,
    stats: &mut FrameStats,
) {
    stats.begin_pass("resolve");
    backend.bind_framebuffer(hdr, None);
    backend.set_viewport(0, 0, hdr.width, hdr.height);
    // Depth belongs to the G-buffer and must survive
    backend.clear(Some(ctx.background()), false);
    draw_skybox(backend, ctx, stats);

    if ctx.shaders.enable(backend, ShaderId::DeferredGlobal) {
        backend.set_pipeline_state(&PipelineState::fullscreen());
        set_camera_uniforms(backend, ctx.camera, ctx.time);
        bind_gbuffer(backend, gbuffer);
        backend.set_uniform("u_ambient_light", Uniform::Vec3(ctx.scene.ambient_light));
        backend.set_uniform("u_use_emissive", Uniform::from(ctx.settings.use_emissive));
        backend.set_uniform("u_use_ssao", Uniform::from(ssao.is_some()));
        backend.set_texture("u_ssao_texture", ssao.unwrap_or(ctx.defaults.white), 4);
        draw_fullscreen(backend, stats);
    }

    if !ctx.shaders.enable(backend, ShaderId::DeferredLight) {
        return;
    }
    set_camera_uniforms(backend, ctx.camera, ctx.time);
    bind_gbuffer(backend, gbuffer);
    backend.set_uniform("u_use_specular", Uniform::from(ctx.settings.use_specular));

    backend.set_pipeline_state(
        &PipelineState::fullscreen().with_blend(Some(BlendState::additive())),
    );
    backend.set_uniform("u_light_volume", Uniform::Int(0));
    for light in ctx.lights.iter().filter(|l| l.light_type == LightType::Directional) {
        light.apply(backend, SHADOW_SLOT);
        draw_fullscreen(backend, stats);
    }

    backend.set_pipeline_state(&light_volume_state());
    backend.set_uniform("u_light_volume", Uniform::Int(1));
    for light in ctx.lights.iter().filter(|l| l.light_type.is_local()) {
        let model =
            Mat4::from_translation(light.position) * Mat4::from_scale(Vec3::splat(light.range));
        backend.set_uniform("u_model", Uniform::Mat4(model));
        light.apply(backend, SHADOW_SLOT);
        draw_mesh(backend, &ctx.meshes.sphere, Primitive::Triangles, stats);
    }
}

/// Draw a screen-sized texture over the bound target
fn overlay(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    texture: TextureHandle,
    blend: BlendState,
    stats: &mut FrameStats,
) {
    if !ctx.shaders.enable(backend, ShaderId::Quad) {
        return;
    }
    backend.set_pipeline_state(&PipelineState::fullscreen().with_blend(Some(blend)));
    backend.set_texture("u_texture", texture, 0);
    draw_fullscreen(backend, stats);
}

/// Layer GI, reflections, fog and transparent calls over the resolve
#[allow(clippy::too_many_arguments)]
pub fn composite(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    calls: &RenderCallLists,
    gbuffer: &Framebuffer,
    hdr: &Framebuffer,
    aux: AuxiliaryTextures,
    irradiance_grid: Option<&IrradianceGrid>,
    reflection_probes: &[ReflectionProbe],
    stats: &mut FrameStats,
) {
    backend.bind_framebuffer(hdr, None);
    backend.set_viewport(0, 0, hdr.width, hdr.height);
    let settings = ctx.settings;

    if settings.irradiance.enabled {
        if let Some(grid) = irradiance_grid {
            irradiance::apply(backend, ctx, grid, gbuffer, stats);
        }
    }
    if settings.reflections.probes_enabled {
        reflection::apply(backend, ctx, reflection_probes, gbuffer, stats);
    }
    if let Some(ssr) = aux.ssr {
        stats.begin_pass("ssr_composite");
        overlay(backend, ctx, ssr, BlendState::additive(), stats);
    }
    if let Some(fog) = aux.volumetric {
        stats.begin_pass("volumetric_composite");
        overlay(backend, ctx, fog, BlendState::alpha_blending(), stats);
    }

    if calls.blended().next().is_none() {
        return;
    }
    if settings.dithering {
        forward_pass::render_transparencies(backend, ctx, calls.blended(), stats);
    } else {
        stats.begin_pass("forward_transparencies");
        for call in calls.blended() {
            forward_pass::draw_multipass(backend, ctx, call, stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::pipeline::{collect_calls, RenderPriority};
    use crate::resources::Material;
    use crate::scene::{LightEntity, LightRecord, Scene};
    use crate::settings::RenderSettings;
    use crate::targets::{RenderTargets, TargetKind};

    fn lit_scene() -> (Scene, Vec<LightRecord>) {
        let mut scene = Scene::new();
        scene.add_entity(prefab_at("box", Vec3::ZERO, Material::default()));
        scene.add_entity(prefab_at("glass", Vec3::new(1.0, 0.0, 0.0), Material::glass()));
        scene.add_entity(LightEntity::directional(Vec3::Y, Vec3::ZERO, Vec3::ONE, 1.0));
        scene.add_entity(LightEntity::point(Vec3::new(0.0, 2.0, 0.0), Vec3::ONE, 1.0, 4.0));
        let lights = scene.lights().map(|(i, light)| light.record(i)).collect();
        (scene, lights)
    }

    #[test]
    fn test_resolve_lights_each_kind() {
        let (mut backend, fx) = Fixture::new();
        let (scene, lights) = lit_scene();
        let settings = RenderSettings::default();
        let mut targets = RenderTargets::new(320, 200, 64);
        let hdr = targets.ensure(&mut backend, TargetKind::DeferredHdr).unwrap();
        let gbuffer = targets.get(TargetKind::GBuffer).unwrap().clone();
        backend.clear_log();

        let ctx = fx.context(&scene, &settings, &lights);
        resolve(&mut backend, &ctx, &gbuffer, &hdr, None, &mut FrameStats::new());

        assert_eq!(
            backend.commands().iter().find(|c| matches!(c, Command::Clear { .. })),
            Some(&Command::Clear { color: Some(ctx.background()), depth: false })
        );
        assert_eq!(backend.draws_with_shader("deferred_global").count(), 1);
        let light_draws: Vec<_> = backend.draws_with_shader("deferred_light").collect();
        assert_eq!(light_draws.len(), 2);
        assert_eq!(light_draws[0].kind, DrawKind::FullscreenQuad);
        assert_eq!(light_draws[0].state.blend, Some(BlendState::additive()));

        let volume = light_draws[1];
        assert_eq!(volume.kind, DrawKind::Mesh(fx.meshes.sphere.handle, Primitive::Triangles));
        assert_eq!(volume.state, light_volume_state());
        assert_eq!(
            volume.uniform("u_model"),
            Some(&Uniform::Mat4(
                Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0))
                    * Mat4::from_scale(Vec3::splat(4.0))
            ))
        );
        assert!(light_draws.iter().all(|draw| draw.target == Some(hdr.handle)));
    }

    #[test]
    fn test_transparencies_follow_dithering() {
        for dithering in [false, true] {
            let (mut backend, fx) = Fixture::new();
            let (scene, lights) = lit_scene();
            let mut settings = RenderSettings::default();
            settings.mode = crate::pipeline::RenderMode::Deferred;
            settings.dithering = dithering;
            let mut lists = RenderCallLists::new(RenderPriority::DistanceSorted);
            collect_calls(&scene, &fx.camera, false, &mut lists);
            let mut targets = RenderTargets::new(320, 200, 64);
            let hdr = targets.ensure(&mut backend, TargetKind::DeferredHdr).unwrap();
            let gbuffer = targets.get(TargetKind::GBuffer).unwrap().clone();

            let ctx = fx.context(&scene, &settings, &lights);
            let mut stats = FrameStats::new();
            composite(
                &mut backend,
                &ctx,
                &lists,
                &gbuffer,
                &hdr,
                AuxiliaryTextures::default(),
                None,
                &[],
                &mut stats,
            );
            assert_eq!(stats.ran("transparencies"), dithering);
            assert_eq!(stats.ran("forward_transparencies"), !dithering);
            let first = backend.draws_with_shader("lights").next().unwrap();
            let expected = if dithering {
                CompareFunction::Equal
            } else {
                CompareFunction::Less
            };
            assert_eq!(first.state.depth_compare, expected);
        }
    }

    #[test]
    fn test_composite_order() {
        let (mut backend, fx) = Fixture::new();
        let (scene, lights) = lit_scene();
        let mut settings = RenderSettings::default();
        settings.irradiance.enabled = true;
        settings.reflections.probes_enabled = true;
        let mut targets = RenderTargets::new(320, 200, 64);
        let hdr = targets.ensure(&mut backend, TargetKind::DeferredHdr).unwrap();
        let gbuffer = targets.get(TargetKind::GBuffer).unwrap().clone();
        let mut grid = IrradianceGrid::new(Vec3::ZERO, Vec3::ONE, glam::UVec3::ONE);
        grid.upload(&mut backend).unwrap();
        let mut ctx = fx.context(&scene, &settings, &lights);
        ctx.skybox = Some(fx.defaults.black);

        let aux = AuxiliaryTextures {
            ssao: None,
            volumetric: Some(fx.defaults.white),
            ssr: Some(fx.defaults.white),
        };
        let mut stats = FrameStats::new();
        let lists = RenderCallLists::new(RenderPriority::DistanceSorted);
        composite(&mut backend, &ctx, &lists, &gbuffer, &hdr, aux, Some(&grid), &[], &mut stats);
        assert_eq!(
            stats.passes,
            vec!["irradiance", "reflections", "ssr_composite", "volumetric_composite"]
        );
        let reflections = backend.draws_with_shader("reflection_probe").next().unwrap();
        assert_eq!(reflections.texture("u_environment_texture"), Some(fx.defaults.black));
    }
}
