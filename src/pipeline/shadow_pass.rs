//! Shadow map pass
//!
//! Renders the frame's calls into a depth map per shadow-casting spot or
//! directional light. Each light owns its map and keeps it across frames.

use glam::{Mat4, Vec3};

use super::{draw_mesh, RenderCallLists};
use crate::backend::*;
use crate::resources::DefaultTextures;
use crate::scene::{LightEntity, LightType, Scene, ShadowMap};
use crate::shaders::{ShaderId, ShaderLibrary};
use crate::stats::FrameStats;

const SHADOW_NEAR: f32 = 0.1;

/// Light-space view-projection; `None` for lights that cast no map
pub fn light_view_projection(light: &LightEntity) -> Option<Mat4> {
    let projection = match light.light_type {
        LightType::Spot => Mat4::perspective_rh(
            (light.outer_angle * 2.0).to_radians(),
            1.0,
            SHADOW_NEAR,
            light.max_distance,
        ),
        LightType::Directional => {
            let half = light.area * 0.5;
            Mat4::orthographic_rh(-half, half, -half, half, SHADOW_NEAR, light.max_distance)
        }
        LightType::Point | LightType::NoLight => return None,
    };
    let position = light.position();
    let forward = light.forward();
    let up = if forward.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_at_rh(position, position + forward, up);
    Some(projection * view)
}

fn casts_shadow_map(light: &LightEntity) -> bool {
    light.visible
        && light.cast_shadows
        && matches!(light.light_type, LightType::Spot | LightType::Directional)
}

/// Create the light's map, or recreate it when the resolution changed
fn ensure_shadow_map(
    backend: &mut dyn GraphicsBackend,
    light: &mut LightEntity,
    resolution: u32,
) -> BackendResult<Framebuffer> {
    if let Some(map) = &light.shadow {
        if map.resolution == resolution {
            return Ok(map.framebuffer.clone());
        }
        log::debug!("Shadow map of '{}' resized to {}", light.name, resolution);
        backend.destroy_framebuffer(&map.framebuffer);
        light.shadow = None;
    }
    let framebuffer = backend.create_framebuffer(&FramebufferDescriptor {
        label: Some(format!("{}_shadowmap", light.name)),
        width: resolution,
        height: resolution,
        color_formats: Vec::new(),
        depth: DepthAttachment::Owned(TextureFormat::Depth32Float),
        cubemap: false,
        mipmaps: false,
    })?;
    light.shadow = Some(ShadowMap {
        framebuffer: framebuffer.clone(),
        resolution,
        view_projection: Mat4::IDENTITY,
    });
    Ok(framebuffer)
}

/// Render a depth map for every shadow-casting light of the scene
pub fn render_shadow_maps(
    backend: &mut dyn GraphicsBackend,
    scene: &mut Scene,
    calls: &RenderCallLists,
    shaders: &ShaderLibrary,
    defaults: &DefaultTextures,
    resolution: u32,
    stats: &mut FrameStats,
) {
    for light in scene.lights_mut().filter(|light| casts_shadow_map(light)) {
        let Some(view_projection) = light_view_projection(light) else {
            continue;
        };
        let framebuffer = match ensure_shadow_map(backend, light, resolution) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                log::warn!("Skipping shadow map of '{}': {}", light.name, err);
                continue;
            }
        };

        backend.bind_framebuffer(&framebuffer, None);
        backend.set_viewport(0, 0, framebuffer.width, framebuffer.height);
        backend.clear(None, true);

        if shaders.enable(backend, ShaderId::Depth) {
            backend.set_uniform("u_viewprojection", Uniform::Mat4(view_projection));
            for call in calls.iter() {
                let state = call
                    .material
                    .pipeline_state(PipelineState::default())
                    .with_blend(None);
                backend.set_pipeline_state(&state);
                backend.set_uniform("u_model", Uniform::Mat4(call.model));
                backend.set_uniform("u_color", Uniform::Vec4(call.material.base_color));
                let cutoff = call.material.effective_cutoff();
                backend.set_uniform("u_alpha_cutoff", Uniform::Float(cutoff));
                backend.set_texture(
                    "u_albedo_texture",
                    call.material.base_color_texture.unwrap_or(defaults.white),
                    0,
                );
                draw_mesh(backend, &call.mesh, Primitive::Triangles, stats);
            }
        }

        if let Some(map) = light.shadow.as_mut() {
            map.view_projection = view_projection;
        }
        stats.shadow_maps += 1;
        log::trace!("Shadow map of '{}' rendered with {} calls", light.name, calls.len());
    }
    backend.unbind_framebuffer();
}
