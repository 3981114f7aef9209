//! Forward shading
//!
//! Replays the sorted render calls into a color target, either unlit (flat
//! mode) or lit with one draw per light (multipass) or all lights packed
//! into one draw (singlepass).

use glam::{Mat4, Vec3};

use super::{
    draw_mesh, draw_skybox, set_camera_uniforms, FlatShader, FrameContext, LightsRender, RenderCall,
    RenderCallLists, RenderMode, MAX_SINGLEPASS_LIGHTS,
};
use crate::backend::*;
use crate::scene::{LightRecord, LightType};
use crate::shaders::ShaderId;
use crate::stats::FrameStats;

/// Texture slot of the single shadow map in multipass draws
const SHADOW_SLOT: u32 = 8;
/// First texture slot of the packed shadow maps in singlepass draws
const SINGLEPASS_SHADOW_SLOT: u32 = 10;
const PLANAR_REFLECTION_SLOT: u32 = 9;

const BOUNDARY_COLOR: glam::Vec4 = glam::Vec4::new(0.0, 1.0, 0.0, 1.0);

/// Warns the first time a frame drops lights over the single-pass cap
#[derive(Debug, Default)]
pub struct DroppedLightsWarning {
    warned: bool,
}

impl DroppedLightsWarning {
    /// Returns true when this call emitted the warning
    pub fn report(&mut self, stats: &FrameStats) -> bool {
        if stats.dropped_lights == 0 || self.warned {
            return false;
        }
        self.warned = true;
        log::warn!(
            "{} lights dropped over the single-pass cap of {}; the least important are skipped",
            stats.dropped_lights,
            MAX_SINGLEPASS_LIGHTS
        );
        true
    }
}

/// Clear `target`, draw the skybox, then every call
pub fn render(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    calls: &RenderCallLists,
    target: &Framebuffer,
    face: Option<CubeFace>,
    stats: &mut FrameStats,
) {
    stats.begin_pass("forward");
    backend.bind_framebuffer(target, face);
    backend.set_viewport(0, 0, target.width, target.height);
    backend.clear(Some(ctx.background()), true);

    let flat_shader =
        ctx.settings.mode == RenderMode::Flat && ctx.settings.flat_shader == FlatShader::Flat;
    if !flat_shader {
        draw_skybox(backend, ctx, stats);
    }

    for call in calls.iter() {
        draw_call(backend, ctx, call, stats);
    }
    log::debug!("Forward pass drew {} calls", calls.len());
}

/// Draw one call with the program the settings select
pub fn draw_call(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    call: &RenderCall,
    stats: &mut FrameStats,
) {
    match (ctx.settings.mode, ctx.settings.lights_render) {
        (RenderMode::Flat, _) => draw_flat(backend, ctx, call, stats),
        (_, LightsRender::Multipass) => draw_multipass(backend, ctx, call, stats),
        (_, LightsRender::Singlepass) => draw_singlepass(backend, ctx, call, stats),
    }
    if ctx.settings.wireframe {
        backend.set_pipeline_state(&PipelineState::default());
    }
    if ctx.settings.render_boundaries {
        draw_boundary(backend, ctx, call, stats);
    }
}

/// Re-shade transparent calls on top of an already lit image
///
/// Their depth is already in the target, so only fragments at exactly that
/// depth pass, and every light adds into the image.
pub fn render_transparencies<'c>(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    calls: impl Iterator<Item = &'c RenderCall>,
    stats: &mut FrameStats,
) {
    stats.begin_pass("transparencies");
    if !ctx.shaders.enable(backend, ShaderId::Lights) {
        return;
    }
    for call in calls {
        let state = PipelineState {
            depth_write: false,
            depth_compare: CompareFunction::Equal,
            ..call.material.pipeline_state(base_state(ctx))
        }
        .with_blend(Some(BlendState::additive()));
        backend.set_pipeline_state(&state);
        bind_call(backend, ctx, call);

        let mut affecting = ctx.lights.iter().filter(|light| light.affects(&call.world_bounds));
        match affecting.next() {
            None => {
                backend.set_uniform("u_light_type", Uniform::Int(LightType::NoLight.as_uniform()));
                draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
            }
            Some(first) => {
                first.apply(backend, SHADOW_SLOT);
                draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
                clear_additive_terms(backend);
                for light in affecting {
                    light.apply(backend, SHADOW_SLOT);
                    draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
                }
            }
        }
    }
}

fn base_state(ctx: &FrameContext) -> PipelineState {
    PipelineState {
        polygon_mode: if ctx.settings.wireframe {
            PolygonMode::Line
        } else {
            PolygonMode::Fill
        },
        ..PipelineState::default()
    }
}

/// Per-draw uniforms shared by every lit and flat program
fn bind_call(backend: &mut dyn GraphicsBackend, ctx: &FrameContext, call: &RenderCall) {
    backend.set_uniform("u_model", Uniform::Mat4(call.model));
    set_camera_uniforms(backend, ctx.camera, ctx.time);
    call.material.bind(backend, ctx.defaults);
    backend.set_uniform("u_ambient_light", Uniform::Vec3(ctx.scene.ambient_light));

    let settings = ctx.settings;
    backend.set_uniform("u_use_specular", Uniform::from(settings.use_specular));
    backend.set_uniform("u_use_normal_map", Uniform::from(settings.use_normal_maps));
    backend.set_uniform("u_use_emissive", Uniform::from(settings.use_emissive));
    backend.set_uniform("u_use_occlusion", Uniform::from(settings.use_occlusion));

    match ctx.planar_reflection {
        Some(texture) => {
            backend.set_uniform("u_use_planar_reflection", Uniform::Int(1));
            backend.set_uniform("u_use_fresnel", Uniform::from(settings.reflections.fresnel));
            backend.set_texture("u_planar_reflection_texture", texture, PLANAR_REFLECTION_SLOT);
        }
        None => backend.set_uniform("u_use_planar_reflection", Uniform::Int(0)),
    }
}

/// Later light draws only add direct light
fn clear_additive_terms(backend: &mut dyn GraphicsBackend) {
    backend.set_uniform("u_ambient_light", Uniform::Vec3(Vec3::ZERO));
    backend.set_uniform("u_emissive_factor", Uniform::Vec3(Vec3::ZERO));
}

fn draw_flat(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    call: &RenderCall,
    stats: &mut FrameStats,
) {
    if !ctx.shaders.enable(backend, ctx.settings.flat_shader.shader()) {
        return;
    }
    backend.set_pipeline_state(&call.material.pipeline_state(base_state(ctx)));
    bind_call(backend, ctx, call);
    draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
}

pub(crate) fn draw_multipass(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    call: &RenderCall,
    stats: &mut FrameStats,
) {
    if !ctx.shaders.enable(backend, ShaderId::Lights) {
        return;
    }
    let first_state = call.material.pipeline_state(base_state(ctx));
    backend.set_pipeline_state(&first_state);
    bind_call(backend, ctx, call);

    let mut affecting = ctx.lights.iter().filter(|light| light.affects(&call.world_bounds));
    let Some(first) = affecting.next() else {
        backend.set_uniform("u_light_type", Uniform::Int(LightType::NoLight.as_uniform()));
        draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
        return;
    };
    first.apply(backend, SHADOW_SLOT);
    draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);

    let mut accumulating = false;
    for light in affecting {
        if !accumulating {
            let state = PipelineState {
                depth_compare: CompareFunction::LessEqual,
                ..first_state
            }
            .with_blend(Some(BlendState::alpha_additive()));
            backend.set_pipeline_state(&state);
            clear_additive_terms(backend);
            accumulating = true;
        }
        light.apply(backend, SHADOW_SLOT);
        draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
    }
}

/// Affecting lights, most important first, capped for one draw
///
/// Returns the kept lights and how many were left out.
pub fn rank_lights<'l>(
    lights: &'l [LightRecord],
    call: &RenderCall,
) -> (Vec<&'l LightRecord>, usize) {
    let center = call.world_bounds.center;
    let mut affecting: Vec<&LightRecord> = lights
        .iter()
        .filter(|light| light.affects(&call.world_bounds))
        .collect();
    affecting.sort_by(|a, b| b.importance(center).total_cmp(&a.importance(center)));
    let dropped = affecting.len().saturating_sub(MAX_SINGLEPASS_LIGHTS);
    affecting.truncate(MAX_SINGLEPASS_LIGHTS);
    (affecting, dropped)
}

fn draw_singlepass(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    call: &RenderCall,
    stats: &mut FrameStats,
) {
    if !ctx.shaders.enable(backend, ShaderId::LightsSingle) {
        return;
    }
    let (lights, dropped) = rank_lights(ctx.lights, call);
    if dropped > 0 {
        stats.dropped_lights += dropped;
        log::debug!("'{}': {} lights over the single-pass cap dropped", call.mesh.name, dropped);
    }

    backend.set_pipeline_state(&call.material.pipeline_state(base_state(ctx)));
    bind_call(backend, ctx, call);

    backend.set_uniform("u_num_lights", Uniform::Int(lights.len() as i32));
    backend.set_uniform(
        "u_light_types",
        Uniform::IntArray(lights.iter().map(|l| l.light_type.as_uniform()).collect()),
    );
    let positions = lights.iter().map(|l| l.position).collect();
    backend.set_uniform("u_light_positions", Uniform::Vec3Array(positions));
    let fronts = lights.iter().map(|l| l.direction).collect();
    backend.set_uniform("u_light_fronts", Uniform::Vec3Array(fronts));
    let colors = lights.iter().map(|l| l.color).collect();
    backend.set_uniform("u_light_colors", Uniform::Vec3Array(colors));
    let ranges = lights.iter().map(|l| l.range).collect();
    backend.set_uniform("u_light_max_dists", Uniform::FloatArray(ranges));
    backend.set_uniform(
        "u_light_cone_inner",
        Uniform::FloatArray(lights.iter().map(|l| l.cone_cos.0).collect()),
    );
    backend.set_uniform(
        "u_light_cone_outer",
        Uniform::FloatArray(lights.iter().map(|l| l.cone_cos.1).collect()),
    );
    backend.set_uniform(
        "u_light_cast_shadows",
        Uniform::IntArray(lights.iter().map(|l| i32::from(l.shadow.is_some())).collect()),
    );
    backend.set_uniform(
        "u_shadow_biases",
        Uniform::FloatArray(lights.iter().map(|l| l.shadow.map_or(0.0, |s| s.bias)).collect()),
    );
    backend.set_uniform(
        "u_shadow_viewprojs",
        Uniform::Mat4Array(
            lights
                .iter()
                .map(|l| l.shadow.map_or(Mat4::IDENTITY, |s| s.view_projection))
                .collect(),
        ),
    );
    for (index, light) in lights.iter().enumerate() {
        if let Some(shadow) = light.shadow {
            backend.set_texture(
                &format!("u_shadowmaps[{index}]"),
                shadow.texture,
                SINGLEPASS_SHADOW_SLOT + index as u32,
            );
        }
    }
    draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
}

/// World box of the call as a line cube
fn draw_boundary(
    backend: &mut dyn GraphicsBackend,
    ctx: &FrameContext,
    call: &RenderCall,
    stats: &mut FrameStats,
) {
    if !ctx.shaders.enable(backend, ShaderId::Flat) {
        return;
    }
    let bounds = &call.world_bounds;
    let model = Mat4::from_translation(bounds.center) * Mat4::from_scale(bounds.halfsize);
    backend.set_pipeline_state(&PipelineState::default().with_cull(CullMode::None));
    backend.set_uniform("u_model", Uniform::Mat4(model));
    set_camera_uniforms(backend, ctx.camera, ctx.time);
    backend.set_uniform("u_color", Uniform::Vec4(BOUNDARY_COLOR));
    backend.set_uniform("u_alpha_cutoff", Uniform::Float(crate::resources::NO_CUTOFF));
    backend.set_texture("u_albedo_texture", ctx.defaults.white, 0);
    draw_mesh(backend, &ctx.meshes.cube, Primitive::Lines, stats);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::pipeline::{collect_calls, RenderPriority};
    use crate::resources::{AlphaMode, Material};
    use crate::scene::{LightEntity, Scene};
    use crate::settings::RenderSettings;

    struct Frame {
        backend: RecordingBackend,
        fx: Fixture,
        scene: Scene,
        lists: RenderCallLists,
        lights: Vec<LightRecord>,
        target: Framebuffer,
    }

    fn frame(scene: Scene) -> Frame {
        let (mut backend, fx) = Fixture::new();
        let mut lists = RenderCallLists::new(RenderPriority::DistanceSorted);
        collect_calls(&scene, &fx.camera, false, &mut lists);
        let lights = scene
            .lights()
            .filter(|(_, light)| light.visible)
            .map(|(index, light)| light.record(index))
            .collect();
        let target = backend
            .create_framebuffer(&FramebufferDescriptor {
                width: 320,
                height: 200,
                depth: DepthAttachment::Owned(TextureFormat::Depth24Plus),
                ..Default::default()
            })
            .unwrap();
        backend.clear_log();
        Frame {
            backend,
            fx,
            scene,
            lists,
            lights,
            target,
        }
    }

    fn run(frame: &mut Frame, settings: &RenderSettings) -> FrameStats {
        let ctx = frame.fx.context(&frame.scene, settings, &frame.lights);
        let mut stats = FrameStats::new();
        render(&mut frame.backend, &ctx, &frame.lists, &frame.target, None, &mut stats);
        stats
    }

    fn one_box() -> Scene {
        let mut scene = Scene::new();
        scene.add_entity(prefab_at("box", Vec3::ZERO, Material::default()));
        scene
    }

    #[test]
    fn test_clears_to_background() {
        let mut scene = one_box();
        scene.background_color = Vec3::new(0.1, 0.2, 0.3);
        let mut frame = frame(scene);
        run(&mut frame, &RenderSettings::default());
        assert!(frame.backend.commands().contains(&Command::Clear {
            color: Some(glam::Vec4::new(0.1, 0.2, 0.3, 1.0)),
            depth: true,
        }));
    }

    #[test]
    fn test_no_lights_draws_ambient_only() {
        let mut frame = frame(one_box());
        run(&mut frame, &RenderSettings::default());
        let draws: Vec<_> = frame.backend.draws_with_shader("lights").collect();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].int("u_light_type"), Some(0));
        assert_eq!(draws[0].uniform("u_alpha_cutoff"), Some(&Uniform::Float(0.001)));
    }

    #[test]
    fn test_multipass_accumulates_later_lights() {
        let mut scene = one_box();
        scene.ambient_light = Vec3::splat(0.2);
        scene.add_entity(LightEntity::directional(Vec3::Y, Vec3::ZERO, Vec3::ONE, 1.0));
        scene.add_entity(LightEntity::point(Vec3::new(2.0, 0.0, 0.0), Vec3::ONE, 1.0, 5.0));
        scene.add_entity(LightEntity::point(Vec3::new(80.0, 0.0, 0.0), Vec3::ONE, 1.0, 5.0));
        let mut frame = frame(scene);
        run(&mut frame, &RenderSettings::default());

        let draws: Vec<_> = frame.backend.draws_with_shader("lights").collect();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].int("u_light_type"), Some(3));
        assert_eq!(draws[0].state.depth_compare, CompareFunction::Less);
        assert_eq!(draws[0].state.blend, None);
        assert_eq!(draws[0].uniform("u_ambient_light"), Some(&Uniform::Vec3(Vec3::splat(0.2))));

        assert_eq!(draws[1].int("u_light_type"), Some(1));
        assert_eq!(draws[1].state.depth_compare, CompareFunction::LessEqual);
        assert_eq!(draws[1].state.blend, Some(BlendState::alpha_additive()));
        assert_eq!(draws[1].uniform("u_ambient_light"), Some(&Uniform::Vec3(Vec3::ZERO)));
        assert_eq!(draws[1].uniform("u_emissive_factor"), Some(&Uniform::Vec3(Vec3::ZERO)));
    }

    #[test]
    fn test_flat_mode_uses_selected_shader() {
        let mut frame = frame(one_box());
        let mut settings = RenderSettings::default();
        settings.mode = RenderMode::Flat;
        settings.flat_shader = FlatShader::Flat;
        run(&mut frame, &settings);
        assert_eq!(frame.backend.draws_with_shader("flat").count(), 1);
        assert_eq!(frame.backend.draws_with_shader("lights").count(), 0);
    }

    #[test]
    fn test_blend_material_alpha_blends() {
        let mut scene = Scene::new();
        scene.add_entity(prefab_at(
            "glass",
            Vec3::ZERO,
            Material::new("glass").with_alpha_mode(AlphaMode::Blend).with_two_sided(true),
        ));
        let mut frame = frame(scene);
        let mut settings = RenderSettings::default();
        settings.mode = RenderMode::Flat;
        run(&mut frame, &settings);
        let draw = frame.backend.draws_with_shader("texture").next().unwrap();
        assert_eq!(draw.state.blend, Some(BlendState::alpha_blending()));
        assert_eq!(draw.state.cull_mode, CullMode::None);
    }

    #[test]
    fn test_singlepass_caps_lights() {
        let mut scene = one_box();
        for i in 0..14 {
            let position = Vec3::new(i as f32 * 0.1, 1.0, 0.0);
            scene.add_entity(LightEntity::point(position, Vec3::ONE, 1.0, 10.0));
        }
        scene.add_entity(LightEntity::directional(Vec3::Y, Vec3::ZERO, Vec3::ONE, 0.1));
        let mut frame = frame(scene);
        let mut settings = RenderSettings::default();
        settings.lights_render = LightsRender::Singlepass;
        let stats = run(&mut frame, &settings);

        let draw = frame.backend.draws_with_shader("lights_single").next().unwrap();
        assert_eq!(draw.int("u_num_lights"), Some(12));
        match draw.uniform("u_light_types") {
            Some(Uniform::IntArray(types)) => assert_eq!(types[0], 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(stats.dropped_lights, 3);
    }

    #[test]
    fn test_dropped_lights_warning_is_per_owner() {
        let mut stats = FrameStats::new();
        let mut first = DroppedLightsWarning::default();
        assert!(!first.report(&stats));

        stats.dropped_lights = 2;
        assert!(first.report(&stats));
        assert!(!first.report(&stats));

        let mut second = DroppedLightsWarning::default();
        assert!(second.report(&stats));
    }

    #[test]
    fn test_wireframe_restores_fill() {
        let mut frame = frame(one_box());
        let mut settings = RenderSettings::default();
        settings.wireframe = true;
        run(&mut frame, &settings);
        let draw = frame.backend.draws_with_shader("lights").next().unwrap();
        assert_eq!(draw.state.polygon_mode, PolygonMode::Line);
        let last_state = frame.backend.commands().iter().rev().find_map(|command| match command {
            Command::SetPipelineState(state) => Some(*state),
            _ => None,
        });
        assert_eq!(last_state.map(|state| state.polygon_mode), Some(PolygonMode::Fill));
    }

    #[test]
    fn test_boundaries_draw_lines() {
        let mut frame = frame(one_box());
        let mut settings = RenderSettings::default();
        settings.render_boundaries = true;
        run(&mut frame, &settings);
        let lines = frame
            .backend
            .draws()
            .iter()
            .filter(|draw| matches!(draw.kind, DrawKind::Mesh(_, Primitive::Lines)))
            .count();
        assert_eq!(lines, 1);
    }

    #[test]
    fn test_transparencies_add_at_equal_depth() {
        let mut scene = Scene::new();
        scene.add_entity(prefab_at("glass", Vec3::ZERO, Material::glass()));
        scene.add_entity(LightEntity::directional(Vec3::Y, Vec3::ZERO, Vec3::ONE, 1.0));
        let mut frame = frame(scene);
        let settings = RenderSettings::default();
        let ctx = frame.fx.context(&frame.scene, &settings, &frame.lights);
        let mut stats = FrameStats::new();
        render_transparencies(&mut frame.backend, &ctx, frame.lists.transparent(), &mut stats);

        let draw = frame.backend.draws_with_shader("lights").next().unwrap();
        assert_eq!(draw.state.depth_compare, CompareFunction::Equal);
        assert_eq!(draw.state.blend, Some(BlendState::additive()));
        assert!(!draw.state.depth_write);
    }
}
