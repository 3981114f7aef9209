//! Shared fixtures for the renderer integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Mat4, Vec3};

use viewer_render::backend::{MeshHandle, RecordingBackend};
use viewer_render::resources::{Material, Mesh};
use viewer_render::scene::{BoundingBox, Camera, Node, PrefabEntity, Scene};
use viewer_render::{Renderer, RendererConfig};

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 200;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Renderer over a fresh recording backend
pub fn renderer() -> Renderer<RecordingBackend> {
    renderer_with(RecordingBackend::new(WIDTH, HEIGHT))
}

pub fn renderer_with(backend: RecordingBackend) -> Renderer<RecordingBackend> {
    init_logger();
    Renderer::new(backend, RendererConfig::default())
        .expect("renderer starts on the recording backend")
}

/// Camera at (0, 0, 10) looking at the origin
pub fn camera() -> Camera {
    let mut camera = Camera::new(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO);
    camera.set_perspective(60.0, WIDTH as f32 / HEIGHT as f32, 0.1, 100.0);
    camera
}

/// Mesh spanning [-1, 1] on every axis
pub fn unit_mesh(name: &str) -> Arc<Mesh> {
    Arc::new(Mesh::new(
        name,
        MeshHandle::from_raw(5000),
        36,
        BoundingBox::new(Vec3::ZERO, Vec3::ONE),
    ))
}

pub fn box_at(name: &str, position: Vec3, material: Material) -> PrefabEntity {
    let node = Node::new(name)
        .with_mesh(unit_mesh(name), Arc::new(material))
        .with_model(Mat4::from_translation(position));
    PrefabEntity::new(name, node)
}

/// One opaque box at the origin
pub fn box_scene() -> Scene {
    let mut scene = Scene::new();
    scene.add_entity(box_at("box", Vec3::ZERO, Material::plastic(Vec3::ONE)));
    scene
}

/// Unique file under the system temp dir
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("viewer-render-{}-{}", std::process::id(), name))
}
