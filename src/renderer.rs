//! Frame orchestrator

use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use image::Rgba32FImage;

use crate::backend::*;
use crate::error::{RendererError, RendererResult};
use crate::gi::{IrradianceGrid, ReflectionProbe, SphericalHarmonics};
use crate::pipeline::postprocess::{self, PostInputs};
use crate::pipeline::forward_pass::{self, DroppedLightsWarning};
use crate::pipeline::{
    collect_calls, decal_pass, gbuffer_pass, lighting_pass, shadow_pass, ssao, ssr, volumetric,
    DeferredDisplay, FrameContext, LightsRender, RenderCallLists, RenderMode, SsaoPass,
};
use crate::resources::{BuiltinMeshes, DefaultTextures};
use crate::scene::{Camera, Entity, LightRecord, Scene};
use crate::settings::RenderSettings;
use crate::shaders::ShaderLibrary;
use crate::stats::FrameStats;
use crate::targets::{RenderTargets, TargetKind};
use crate::RendererConfig;

const CAPTURE_NEAR: f32 = 0.1;
const CAPTURE_FAR: f32 = 1000.0;

/// Programs, fallback textures and meshes resolved at startup
struct Resources {
    shaders: ShaderLibrary,
    defaults: DefaultTextures,
    meshes: BuiltinMeshes,
}

impl Resources {
    fn context<'a>(
        &'a self,
        scene: &'a Scene,
        camera: &'a Camera,
        settings: &'a RenderSettings,
        lights: &'a [LightRecord],
        time: f32,
    ) -> FrameContext<'a> {
        FrameContext {
            scene,
            camera,
            settings,
            shaders: &self.shaders,
            defaults: &self.defaults,
            meshes: &self.meshes,
            lights,
            time,
            skybox: None,
            planar_reflection: None,
        }
    }
}

/// Skybox cubemap keyed by the file it came from
#[derive(Default)]
struct SkyboxCache {
    path: Option<PathBuf>,
    texture: Option<TextureHandle>,
}

/// Camera looking through one face of a cube centred on `eye`
fn face_camera(eye: Vec3, face: CubeFace) -> Camera {
    let (forward, up) = face.view_basis();
    let mut camera = Camera::new(eye, eye + forward);
    camera.look_at(eye, eye + forward, up);
    camera.set_perspective(90.0, 1.0, CAPTURE_NEAR, CAPTURE_FAR);
    camera
}

/// Renders scenes through a [`GraphicsBackend`]
///
/// Owns every piece of state that outlives a frame: targets, call lists,
/// the light snapshot, GI data and the settings used for the next frame.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    config: RendererConfig,
    /// Applied from the next frame on
    pub settings: RenderSettings,
    resources: Resources,
    targets: RenderTargets,
    calls: RenderCallLists,
    reflection_calls: RenderCallLists,
    lights: Vec<LightRecord>,
    ssao: SsaoPass,
    irradiance: Option<IrradianceGrid>,
    reflection_probes: Vec<ReflectionProbe>,
    skybox: SkyboxCache,
    time: f32,
    previous_view_projection: Option<Mat4>,
    dropped_lights: DroppedLightsWarning,
}

impl<B: GraphicsBackend> Renderer<B> {
    /// Load the shader atlas and the built-in resources
    ///
    /// Fails when the atlas cannot be loaded or lacks a required program.
    pub fn new(mut backend: B, config: RendererConfig) -> RendererResult<Self> {
        let shaders = ShaderLibrary::load(&mut backend, &config.shader_atlas)?;
        let defaults = DefaultTextures::new(&mut backend)?;
        let meshes = BuiltinMeshes::new(&mut backend)?;

        let (width, height) = backend.viewport_size();
        let mut settings = RenderSettings::default();
        settings.shadows.resolution = config.shadow_resolution;
        let targets = RenderTargets::new(width, height, config.irradiance_capture_size);
        log::info!("Renderer ready at {}x{}", width, height);

        Ok(Self {
            backend,
            calls: RenderCallLists::new(settings.priority),
            reflection_calls: RenderCallLists::new(settings.priority),
            config,
            settings,
            resources: Resources {
                shaders,
                defaults,
                meshes,
            },
            targets,
            lights: Vec::new(),
            ssao: SsaoPass::new(),
            irradiance: None,
            reflection_probes: Vec::new(),
            skybox: SkyboxCache::default(),
            time: 0.0,
            previous_view_projection: None,
            dropped_lights: DroppedLightsWarning::default(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    /// Light snapshot of the last frame or capture
    pub fn lights(&self) -> &[LightRecord] {
        &self.lights
    }

    pub fn irradiance(&self) -> Option<&IrradianceGrid> {
        self.irradiance.as_ref()
    }

    pub fn reflection_probes(&self) -> &[ReflectionProbe] {
        &self.reflection_probes
    }

    /// Seconds fed to `u_time`
    pub fn set_time(&mut self, time: f32) {
        self.time = time;
    }

    /// Record a new viewport size; targets follow at the next frame
    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.targets.on_resize(width, height);
    }

    /// Render one frame of `scene` seen from `camera`
    pub fn render_scene(&mut self, scene: &mut Scene, camera: &Camera) -> FrameStats {
        let mut stats = FrameStats::new();
        self.targets.apply_resize(&mut self.backend);
        let settings = self.settings.clone();
        self.refresh_skybox(scene);

        self.calls.reset(settings.priority);
        let collected = collect_calls(scene, camera, false, &mut self.calls);
        stats.render_calls = collected.emitted;
        stats.culled_nodes = collected.culled;
        stats.skipped_calls = collected.skipped;

        if settings.mode != RenderMode::Flat && settings.shadows.enabled {
            stats.begin_pass("shadows");
            shadow_pass::render_shadow_maps(
                &mut self.backend,
                scene,
                &self.calls,
                &self.resources.shaders,
                &self.resources.defaults,
                settings.shadows.resolution,
                &mut stats,
            );
        }
        self.snapshot_lights(scene);

        let planar_reflection = self.render_planar_reflection(scene, camera, &settings, &mut stats);
        let inputs = match settings.mode {
            RenderMode::Deferred => {
                self.render_deferred(scene, camera, &settings, planar_reflection, &mut stats)
            }
            RenderMode::Flat | RenderMode::Lit => {
                self.render_forward(scene, camera, &settings, planar_reflection, &mut stats)
            }
        };

        if let Some(inputs) = inputs {
            let ctx = self
                .resources
                .context(scene, camera, &settings, &self.lights, self.time);
            postprocess::render(
                &mut self.backend,
                &ctx,
                &mut self.targets,
                inputs,
                self.config.max_bloom_mips,
                &mut stats,
            );
        }
        self.previous_view_projection = Some(camera.view_projection_matrix());
        self.dropped_lights.report(&stats);
        log::debug!("Frame: {}", stats);
        stats
    }

    /// Rebuild the light snapshot from the visible lights
    fn snapshot_lights(&mut self, scene: &Scene) {
        self.lights.clear();
        self.lights.extend(
            scene
                .lights()
                .filter(|(_, light)| light.visible)
                .map(|(index, light)| light.record(index)),
        );
    }

    /// Load the scene's skybox when its file changed
    fn refresh_skybox(&mut self, scene: &Scene) {
        let path = scene.skybox_path();
        if path == self.skybox.path {
            return;
        }
        if let Some(old) = self.skybox.texture.take() {
            self.backend.destroy_texture(old);
        }
        self.skybox.texture = path.as_deref().and_then(|path| {
            let texture = self.backend.load_texture(path);
            if texture.is_none() {
                log::warn!("Skybox {} failed to load; rendering without it", path.display());
            }
            texture
        });
        self.skybox.path = path;
    }

    fn render_planar_reflection(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        settings: &RenderSettings,
        stats: &mut FrameStats,
    ) -> Option<TextureHandle> {
        if !settings.reflections.planar_enabled || settings.mode == RenderMode::Flat {
            return None;
        }
        // Deferred frames only sample it from the forward-shaded transparencies
        let reads_reflection = settings.deferred_display == DeferredDisplay::Resolve
            && self.calls.blended().next().is_some();
        if settings.mode == RenderMode::Deferred && !reads_reflection {
            return None;
        }
        let target = match self.targets.ensure(&mut self.backend, TargetKind::PlanarReflection) {
            Ok(target) => target,
            Err(err) => {
                log::warn!("Skipping planar reflection: {}", err);
                return None;
            }
        };
        stats.begin_pass("planar_reflection");
        let mirrored = camera.mirrored(settings.reflections.plane_height);
        self.reflection_calls.reset(settings.priority);
        collect_calls(scene, &mirrored, false, &mut self.reflection_calls);

        let mut ctx = self
            .resources
            .context(scene, &mirrored, settings, &self.lights, self.time);
        ctx.skybox = self.skybox.texture;
        forward_pass::render(&mut self.backend, &ctx, &self.reflection_calls, &target, None, stats);
        target.color0()
    }

    fn render_forward(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        settings: &RenderSettings,
        planar_reflection: Option<TextureHandle>,
        stats: &mut FrameStats,
    ) -> Option<PostInputs> {
        let target = match self.targets.ensure(&mut self.backend, TargetKind::ForwardHdr) {
            Ok(target) => target,
            Err(err) => {
                log::warn!("Skipping forward pass: {}", err);
                return None;
            }
        };
        let mut ctx = self
            .resources
            .context(scene, camera, settings, &self.lights, self.time);
        ctx.skybox = self.skybox.texture;
        ctx.planar_reflection = planar_reflection;
        forward_pass::render(&mut self.backend, &ctx, &self.calls, &target, None, stats);

        Some(PostInputs {
            color: target.color0()?,
            depth: target.depth,
            previous_view_projection: self.previous_view_projection,
        })
    }

    fn render_deferred(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        settings: &RenderSettings,
        planar_reflection: Option<TextureHandle>,
        stats: &mut FrameStats,
    ) -> Option<PostInputs> {
        let backend: &mut dyn GraphicsBackend = &mut self.backend;
        let gbuffer = match self.targets.ensure(backend, TargetKind::GBuffer) {
            Ok(gbuffer) => gbuffer,
            Err(err) => {
                log::warn!("Skipping deferred frame: {}", err);
                return None;
            }
        };
        let mut ctx = self
            .resources
            .context(scene, camera, settings, &self.lights, self.time);
        ctx.skybox = self.skybox.texture;
        ctx.planar_reflection = planar_reflection;

        gbuffer_pass::render(backend, &ctx, &self.calls, &gbuffer, stats);
        decal_pass::render(backend, &ctx, &mut self.targets, &gbuffer, stats);
        if settings.deferred_display == DeferredDisplay::GBuffers {
            gbuffer_pass::render_debug(backend, &ctx, &gbuffer, stats);
            return None;
        }

        let occlusion = if settings.ssao.enabled {
            self.ssao.render(backend, &ctx, &mut self.targets, &gbuffer, stats)
        } else {
            None
        };
        if settings.deferred_display == DeferredDisplay::Ssao {
            ssao::render_debug(backend, &ctx, occlusion, stats);
            return None;
        }
        let fog = if settings.volumetric.enabled {
            volumetric::render(backend, &ctx, &mut self.targets, &gbuffer, stats)
        } else {
            None
        };
        let reflections = if settings.ssr.enabled {
            // Last frame's image; absent on the first frame and after a resize
            let previous = self.targets.get(TargetKind::DeferredHdr).and_then(Framebuffer::color0);
            ssr::render(backend, &ctx, &mut self.targets, &gbuffer, previous, stats)
        } else {
            None
        };

        let hdr = match self.targets.ensure(backend, TargetKind::DeferredHdr) {
            Ok(hdr) => hdr,
            Err(err) => {
                log::warn!("Skipping deferred resolve: {}", err);
                return None;
            }
        };
        lighting_pass::resolve(backend, &ctx, &gbuffer, &hdr, occlusion, stats);
        lighting_pass::composite(
            backend,
            &ctx,
            &self.calls,
            &gbuffer,
            &hdr,
            lighting_pass::AuxiliaryTextures {
                ssao: occlusion,
                volumetric: fog,
                ssr: reflections,
            },
            self.irradiance.as_ref(),
            &self.reflection_probes,
            stats,
        );

        Some(PostInputs {
            color: hdr.color0()?,
            depth: gbuffer.depth,
            previous_view_projection: self.previous_view_projection,
        })
    }

    /// Settings used for probe captures: lit multipass, no debug overlays
    fn capture_settings(&self) -> RenderSettings {
        let mut settings = self.settings.clone();
        settings.mode = RenderMode::Lit;
        settings.lights_render = LightsRender::Multipass;
        settings.wireframe = false;
        settings.render_boundaries = false;
        settings
    }

    /// Render every node, without culling, into one face of `target`
    fn capture_face(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        settings: &RenderSettings,
        target: &Framebuffer,
        face: Option<CubeFace>,
        stats: &mut FrameStats,
    ) {
        self.calls.reset(settings.priority);
        collect_calls(scene, camera, true, &mut self.calls);
        let mut ctx = self
            .resources
            .context(scene, camera, settings, &self.lights, self.time);
        ctx.skybox = self.skybox.texture;
        forward_pass::render(&mut self.backend, &ctx, &self.calls, target, face, stats);
    }

    /// Capture the scene at every probe of the configured grid and project
    /// it to spherical harmonics
    ///
    /// The new grid replaces the current one only when the whole bake
    /// succeeded.
    pub fn bake_irradiance(&mut self, scene: &Scene) -> RendererResult<()> {
        let config = &self.settings.irradiance;
        let mut grid = IrradianceGrid::new(config.start, config.end, config.dims);
        log::info!("Baking {} irradiance probes", grid.len());

        let settings = self.capture_settings();
        self.refresh_skybox(scene);
        self.snapshot_lights(scene);
        let target = self.targets.ensure(&mut self.backend, TargetKind::IrradianceCapture)?;
        let mut stats = FrameStats::new();

        for probe in &mut grid.probes {
            let mut faces: [Rgba32FImage; 6] = Default::default();
            for face in CubeFace::ALL {
                let camera = face_camera(probe.pos, face);
                self.capture_face(scene, &camera, &settings, &target, None, &mut stats);
                faces[face.index()] = self.backend.read_pixels(&target, None)?;
            }
            probe.sh = SphericalHarmonics::project_cubemap(&faces);
            log::debug!("Probe {} at {} baked", probe.index, probe.pos);
        }
        self.backend.unbind_framebuffer();

        grid.upload(&mut self.backend)?;
        if let Some(mut old) = self.irradiance.replace(grid) {
            old.release(&mut self.backend);
        }
        log::info!("Irradiance bake finished ({} draws)", stats.draw_calls);
        Ok(())
    }

    /// Replace the grid with a cache file; the current one survives failures
    pub fn load_irradiance_cache(&mut self, path: impl AsRef<Path>) -> RendererResult<()> {
        let mut grid = IrradianceGrid::load(path)?;
        grid.upload(&mut self.backend)?;
        if let Some(mut old) = self.irradiance.replace(grid) {
            old.release(&mut self.backend);
        }
        Ok(())
    }

    pub fn save_irradiance_cache(&self, path: impl AsRef<Path>) -> RendererResult<()> {
        match &self.irradiance {
            Some(grid) => grid.save(path),
            None => Err(RendererError::CacheFormat("no irradiance grid to save".into())),
        }
    }

    /// Register a probe; it is used once captured. Returns its index.
    pub fn add_reflection_probe(&mut self, position: Vec3) -> usize {
        self.reflection_probes.push(ReflectionProbe::new(position));
        self.reflection_probes.len() - 1
    }

    /// Render the six faces around probe `index` and build its mipmaps
    pub fn capture_reflection_probe(&mut self, scene: &Scene, index: usize) -> RendererResult<()> {
        let count = self.reflection_probes.len();
        let size = self.config.reflection_probe_size;
        let probe = self
            .reflection_probes
            .get_mut(index)
            .ok_or(RendererError::ProbeIndex { index, count })?;
        let cubemap = probe.ensure_cubemap(&mut self.backend, size)?;
        let position = probe.position;

        let settings = self.capture_settings();
        self.refresh_skybox(scene);
        self.snapshot_lights(scene);
        let mut stats = FrameStats::new();
        for face in CubeFace::ALL {
            let camera = face_camera(position, face);
            self.capture_face(scene, &camera, &settings, &cubemap, Some(face), &mut stats);
        }
        self.backend.unbind_framebuffer();
        if let Some(color) = cubemap.color0() {
            self.backend.generate_mipmaps(color);
        }
        log::info!("Captured reflection probe {} at {}", index, position);
        Ok(())
    }

    pub fn capture_all_reflection_probes(&mut self, scene: &Scene) -> RendererResult<()> {
        for index in 0..self.reflection_probes.len() {
            self.capture_reflection_probe(scene, index)?;
        }
        Ok(())
    }

    /// Free GPU resources owned by an entity about to be removed
    pub fn release_entity(&mut self, entity: &mut Entity) {
        if let Entity::Light(light) = entity {
            if let Some(shadow) = light.shadow.take() {
                self.backend.destroy_framebuffer(&shadow.framebuffer);
            }
        }
    }

    /// Free every target, probe and cached texture
    pub fn release_all(&mut self) {
        self.targets.release_all(&mut self.backend);
        for probe in &mut self.reflection_probes {
            probe.release(&mut self.backend);
        }
        if let Some(grid) = self.irradiance.as_mut() {
            grid.release(&mut self.backend);
        }
        if let Some(texture) = self.skybox.texture.take() {
            self.backend.destroy_texture(texture);
        }
        self.skybox.path = None;
    }
}
