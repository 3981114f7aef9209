//! Global illumination through the renderer: bakes, the cache file and
//! reflection probe captures.

mod common;

use approx::assert_relative_eq;
use glam::{UVec3, Vec3, Vec4};
use rstest::rstest;

use common::{box_scene, camera, renderer, temp_path};
use viewer_render::backend::{Command, CubeFace, RecordingBackend};
use viewer_render::gi::irradiance::{HEADER_SIZE, RECORD_SIZE};
use viewer_render::pipeline::RenderMode;
use viewer_render::{Renderer, RendererError};

/// A renderer that baked a 2x1x2 grid under a constant readback color
fn baked_renderer() -> Renderer<RecordingBackend> {
    let mut renderer = renderer();
    renderer
        .backend_mut()
        .set_readback_color(Vec4::new(1.0, 0.5, 0.25, 1.0));
    renderer.settings.irradiance.start = Vec3::new(-4.0, 0.0, -4.0);
    renderer.settings.irradiance.end = Vec3::new(4.0, 2.0, 4.0);
    renderer.settings.irradiance.dims = UVec3::new(2, 1, 2);
    renderer.bake_irradiance(&box_scene()).unwrap();
    renderer
}

#[test]
fn test_bake_two_by_one_by_two() {
    let renderer = baked_renderer();
    let grid = renderer.irradiance().unwrap();
    assert_eq!(grid.len(), 4);
    assert_eq!(grid.probes[1].pos, Vec3::new(4.0, 0.0, -4.0));
    assert_eq!(grid.probes[2].local, UVec3::new(0, 0, 1));

    // A constant environment projects to the DC term alone
    for probe in &grid.probes {
        assert_relative_eq!(probe.sh.coeffs[0].x, 3.5449, epsilon = 1e-3);
        assert_relative_eq!(probe.sh.coeffs[0].z, 3.5449 * 0.25, epsilon = 1e-3);
    }

    let backend = renderer.backend();
    let readbacks = backend
        .commands()
        .iter()
        .filter(|command| matches!(command, Command::ReadPixels(_)))
        .count();
    assert_eq!(readbacks, 4 * 6);
    assert!(backend.commands().iter().any(|command| matches!(
        command,
        Command::CreateTexture { width: 9, height: 4, .. }
    )));
}

#[test]
fn test_bake_captures_without_culling() {
    let mut renderer = renderer();
    renderer.settings.irradiance.dims = UVec3::ONE;
    renderer.settings.irradiance.start = Vec3::new(0.0, 0.0, 5.0);
    renderer.settings.irradiance.end = Vec3::new(0.0, 0.0, 5.0);
    renderer.backend_mut().clear_log();
    renderer.bake_irradiance(&box_scene()).unwrap();
    // The box is in front of only one face, yet every face draws it
    assert_eq!(renderer.backend().draws_with_shader("lights").count(), 6);
}

#[test]
fn test_cache_round_trip() {
    let path = temp_path("roundtrip.irr");
    let baked = baked_renderer();
    baked.save_irradiance_cache(&path).unwrap();
    let size = std::fs::metadata(&path).unwrap().len() as usize;
    assert_eq!(size, HEADER_SIZE + 4 * RECORD_SIZE);
    assert_eq!(size, 40 + 4 * 136);

    let mut loaded = renderer();
    loaded.load_irradiance_cache(&path).unwrap();
    let (a, b) = (baked.irradiance().unwrap(), loaded.irradiance().unwrap());
    assert_eq!(a.dims, b.dims);
    assert_eq!(a.probes, b.probes);
    assert!(b.texture.is_some());
    let _ = std::fs::remove_file(&path);
}

/// Cache header bytes with no probe records behind them
fn header(num_probes: i32, dims: [f32; 3]) -> Vec<u8> {
    let mut bytes = num_probes.to_le_bytes().to_vec();
    for value in dims.into_iter().chain([0.0; 3]).chain([1.0; 3]) {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

#[rstest]
#[case::truncated_header(vec![0u8; 12])]
#[case::wrong_length(vec![0u8; 40 + 135])]
#[case::oversized_dims(header(0, [65536.0, 65536.0, 1.0]))]
fn test_bad_cache_keeps_previous_grid(#[case] bytes: Vec<u8>) {
    let path = temp_path(&format!("bad-{}.irr", bytes.len()));
    std::fs::write(&path, bytes).unwrap();
    let mut renderer = baked_renderer();
    let before = renderer.irradiance().cloned();

    let err = renderer.load_irradiance_cache(&path).unwrap_err();
    assert!(matches!(err, RendererError::CacheFormat(_)));
    assert_eq!(renderer.irradiance().cloned(), before);
    let texture = before.and_then(|grid| grid.texture).unwrap();
    assert!(renderer.backend().is_texture_live(texture));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_missing_cache_is_an_io_error() {
    let mut renderer = renderer();
    let err = renderer
        .load_irradiance_cache(temp_path("does-not-exist.irr"))
        .unwrap_err();
    assert!(matches!(err, RendererError::CacheIo(_)));
    assert!(renderer.irradiance().is_none());
}

#[test]
fn test_rebake_releases_previous_texture() {
    let mut renderer = baked_renderer();
    let first = renderer.irradiance().unwrap().texture.unwrap();
    renderer.bake_irradiance(&box_scene()).unwrap();
    assert!(!renderer.backend().is_texture_live(first));
}

#[test]
fn test_irradiance_applies_in_deferred_frames() {
    let mut renderer = baked_renderer();
    renderer.settings.mode = RenderMode::Deferred;
    renderer.settings.irradiance.enabled = true;
    let mut scene = box_scene();

    let stats = renderer.render_scene(&mut scene, &camera());
    assert!(stats.position("resolve") < stats.position("irradiance"));
    let draw = renderer.backend().draws_with_shader("irradiance").next().unwrap();
    assert_eq!(draw.int("u_num_probes"), Some(4));
}

#[test]
fn test_reflection_probe_capture() {
    let mut renderer = renderer();
    let scene = box_scene();
    let index = renderer.add_reflection_probe(Vec3::new(0.0, 1.0, 0.0));

    let err = renderer.capture_reflection_probe(&scene, index + 1).unwrap_err();
    assert!(matches!(err, RendererError::ProbeIndex { index: 1, count: 1 }));

    renderer.backend_mut().clear_log();
    renderer.capture_reflection_probe(&scene, index).unwrap();
    let probe = &renderer.reflection_probes()[index];
    let cubemap = probe.cubemap.clone().unwrap();
    let faces: Vec<_> = renderer
        .backend()
        .commands()
        .iter()
        .filter_map(|command| match command {
            Command::BindFramebuffer { framebuffer, face } if *framebuffer == cubemap.handle => {
                *face
            }
            _ => None,
        })
        .collect();
    assert_eq!(faces, CubeFace::ALL.to_vec());
    assert_eq!(
        renderer.backend().commands().last(),
        Some(&Command::GenerateMipmaps(cubemap.color0().unwrap()))
    );
}

#[test]
fn test_closest_probe_lights_deferred_frames() {
    let mut renderer = renderer();
    let scene = box_scene();
    renderer.add_reflection_probe(Vec3::new(0.0, 0.0, -20.0));
    renderer.add_reflection_probe(Vec3::new(0.0, 0.0, 8.0));
    renderer.capture_all_reflection_probes(&scene).unwrap();

    renderer.settings.mode = RenderMode::Deferred;
    renderer.settings.reflections.probes_enabled = true;
    let mut scene = scene;
    let stats = renderer.render_scene(&mut scene, &camera());
    assert!(stats.ran("reflections"));

    let near = renderer.reflection_probes()[1].texture();
    let draw = renderer.backend().draws_with_shader("reflection_probe").next().unwrap();
    assert_eq!(draw.texture("u_environment_texture"), near);
}
