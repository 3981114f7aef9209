//! Renders a procedural scene for a number of frames on the recording
//! backend and logs what each frame did.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example headless -- --mode deferred --frames 3
//! ```

use std::sync::Arc;

use clap::Parser;
use glam::{Mat4, Vec3};

use viewer_render::backend::{MeshHandle, RecordingBackend};
use viewer_render::pipeline::RenderMode;
use viewer_render::resources::{Material, Mesh};
use viewer_render::scene::{BoundingBox, Camera, LightEntity, Node, PrefabEntity, Scene};
use viewer_render::{Renderer, RendererConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliMode {
    Flat,
    #[default]
    Lit,
    Deferred,
}

impl From<CliMode> for RenderMode {
    fn from(cli: CliMode) -> Self {
        match cli {
            CliMode::Flat => RenderMode::Flat,
            CliMode::Lit => RenderMode::Lit,
            CliMode::Deferred => RenderMode::Deferred,
        }
    }
}

/// Headless frame runner
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Number of frames to render
    #[arg(long, default_value_t = 4)]
    frames: u32,

    /// Pipeline shading the frames
    #[arg(long, value_enum, default_value_t = CliMode::Lit)]
    mode: CliMode,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Shader atlas to load
    #[arg(long, default_value = "data/shaders.atlas")]
    atlas: std::path::PathBuf,

    /// Boxes per side of the generated grid
    #[arg(long, default_value_t = 6)]
    grid: u32,

    /// Bake an irradiance grid before the first frame
    #[arg(long)]
    bake: bool,
}

fn build_scene(grid: u32) -> Scene {
    let mut scene = Scene::new();
    let mesh = Arc::new(Mesh::new(
        "cube",
        MeshHandle::from_raw(1),
        36,
        BoundingBox::new(Vec3::ZERO, Vec3::splat(0.5)),
    ));
    let half = grid as f32 * 0.5;
    for x in 0..grid {
        for z in 0..grid {
            let name = format!("cube_{x}_{z}");
            let color = Vec3::new(x as f32 / grid as f32, 0.5, z as f32 / grid as f32);
            let material = if (x + z) % 3 == 0 {
                Material::glass()
            } else {
                Material::plastic(color)
            };
            let position = Vec3::new(x as f32 - half, 0.0, z as f32 - half) * 2.0;
            let node = Node::new(&name)
                .with_mesh(mesh.clone(), Arc::new(material))
                .with_model(Mat4::from_translation(position));
            scene.add_entity(PrefabEntity::new(&name, node));
        }
    }
    scene.add_entity(
        LightEntity::directional(Vec3::new(10.0, 20.0, 10.0), Vec3::ZERO, Vec3::ONE, 1.0)
            .with_shadows(0.001),
    );
    scene.add_entity(LightEntity::point(
        Vec3::new(0.0, 3.0, 0.0),
        Vec3::new(1.0, 0.6, 0.3),
        4.0,
        12.0,
    ));
    scene.add_entity(LightEntity::spot(
        Vec3::new(-6.0, 6.0, -6.0),
        Vec3::ZERO,
        Vec3::new(0.3, 0.6, 1.0),
        6.0,
        25.0,
    ));
    scene
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = RendererConfig {
        shader_atlas: args.atlas.clone(),
        ..Default::default()
    };

    let backend = RecordingBackend::new(args.width, args.height);
    let mut renderer = match Renderer::new(backend, config) {
        Ok(renderer) => renderer,
        Err(e) => {
            log::error!("Failed to start the renderer: {}", e);
            std::process::exit(1);
        }
    };
    renderer.settings.mode = args.mode.into();

    let mut scene = build_scene(args.grid);
    let mut camera = Camera::new(Vec3::new(0.0, 8.0, 18.0), Vec3::ZERO);
    camera.set_perspective(60.0, args.width as f32 / args.height as f32, 0.1, 200.0);

    if args.bake {
        if let Err(e) = renderer.bake_irradiance(&scene) {
            log::warn!("Irradiance bake failed: {}", e);
        }
        renderer.settings.irradiance.enabled = renderer.irradiance().is_some();
    }

    for frame in 0..args.frames {
        renderer.set_time(frame as f32 / 60.0);
        renderer.backend_mut().clear_log();
        let stats = renderer.render_scene(&mut scene, &camera);
        log::info!(
            "Frame {}: {} draws, {} calls, {} culled, {} shadow maps, passes {:?}",
            frame,
            stats.draw_calls,
            stats.render_calls,
            stats.culled_nodes,
            stats.shadow_maps,
            stats.passes
        );
    }

    for entity in &mut scene.entities {
        renderer.release_entity(entity);
    }
    renderer.release_all();
    log::info!("{} framebuffers left after release", renderer.backend().live_framebuffer_count());
}
