//! Recording GPU backend for tests and headless runs.
//!
//! This backend doesn't touch a GPU. It hands out handles, tracks the
//! currently bound program, state and uniforms, and records every command
//! so callers can assert on the exact pass sequence a frame produced.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use glam::Vec4;
use image::{Rgba, Rgba32FImage};

use super::traits::*;
use super::types::*;

/// Everything the recording backend was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadShaderAtlas(PathBuf),
    EnableShader(String),
    DisableShader,
    SetPipelineState(PipelineState),
    SetViewport { width: u32, height: u32 },
    CreateTexture { texture: TextureHandle, label: Option<String>, width: u32, height: u32 },
    WriteTexture { texture: TextureHandle, bytes: usize },
    DestroyTexture(TextureHandle),
    GenerateMipmaps(TextureHandle),
    CopyTexture { src: TextureHandle, dst: TextureHandle },
    CreateFramebuffer {
        framebuffer: FramebufferHandle,
        label: Option<String>,
        width: u32,
        height: u32,
    },
    DestroyFramebuffer(FramebufferHandle),
    BindFramebuffer { framebuffer: FramebufferHandle, face: Option<CubeFace> },
    UnbindFramebuffer,
    Clear { color: Option<Vec4>, depth: bool },
    /// Index into [`RecordingBackend::draws`]
    Draw(usize),
    ReadPixels(FramebufferHandle),
}

/// What got drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Mesh(MeshHandle, Primitive),
    FullscreenQuad,
}

/// Snapshot of the bound program, state and inputs at draw time
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub kind: DrawKind,
    pub shader: Option<String>,
    /// `None` when drawing to the screen
    pub target: Option<FramebufferHandle>,
    pub face: Option<CubeFace>,
    pub state: PipelineState,
    pub uniforms: HashMap<String, Uniform>,
    pub textures: HashMap<String, TextureHandle>,
}

impl DrawRecord {
    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        match self.uniforms.get(name) {
            Some(Uniform::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures.get(name).copied()
    }
}

#[derive(Debug, Clone)]
struct FramebufferInfo {
    desc: FramebufferDescriptor,
    framebuffer: Framebuffer,
}

/// Recording GPU backend.
#[derive(Debug)]
pub struct RecordingBackend {
    width: u32,
    height: u32,
    next_handle: u64,
    fail_atlas: bool,
    missing_shaders: HashSet<String>,
    shader_names: RefCell<Vec<String>>,
    texture_files: HashSet<PathBuf>,
    readback_color: Vec4,
    current_shader: Option<String>,
    current_state: PipelineState,
    current_target: Option<(FramebufferHandle, Option<CubeFace>)>,
    uniforms: HashMap<String, Uniform>,
    textures: HashMap<String, TextureHandle>,
    live_textures: HashSet<TextureHandle>,
    live_framebuffers: HashMap<FramebufferHandle, FramebufferInfo>,
    commands: Vec<Command>,
    draws: Vec<DrawRecord>,
}

impl RecordingBackend {
    /// Create a recording backend with a screen of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_handle: 1,
            fail_atlas: false,
            missing_shaders: HashSet::new(),
            shader_names: RefCell::new(Vec::new()),
            texture_files: HashSet::new(),
            readback_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            current_shader: None,
            current_state: PipelineState::default(),
            current_target: None,
            uniforms: HashMap::new(),
            textures: HashMap::new(),
            live_textures: HashSet::new(),
            live_framebuffers: HashMap::new(),
            commands: Vec::new(),
            draws: Vec::new(),
        }
    }

    /// Make the next atlas load fail
    pub fn with_failing_atlas(mut self) -> Self {
        self.fail_atlas = true;
        self
    }

    /// Pretend the atlas does not contain `name`
    pub fn without_shader(mut self, name: &str) -> Self {
        self.missing_shaders.insert(name.to_string());
        self
    }

    /// Make `load_texture` succeed for `path`
    pub fn with_texture_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.texture_files.insert(path.into());
        self
    }

    /// Color returned for every texel by `read_pixels`
    pub fn set_readback_color(&mut self, color: Vec4) {
        self.readback_color = color;
    }

    /// Simulate the window changing size
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Draws issued with the named program
    pub fn draws_with_shader<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a DrawRecord> + 'a {
        self.draws
            .iter()
            .filter(move |draw| draw.shader.as_deref() == Some(name))
    }

    /// Descriptor a live framebuffer was created from
    pub fn framebuffer_descriptor(
        &self,
        handle: FramebufferHandle,
    ) -> Option<&FramebufferDescriptor> {
        self.live_framebuffers.get(&handle).map(|info| &info.desc)
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.live_framebuffers.len()
    }

    pub fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.live_textures.contains(&texture)
    }

    /// Forget recorded commands and draws; resources stay alive
    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.draws.clear();
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn allocate_texture(&mut self) -> TextureHandle {
        let texture = TextureHandle(self.allocate());
        self.live_textures.insert(texture);
        texture
    }

    fn record_draw(&mut self, kind: DrawKind) {
        let (target, face) = match self.current_target {
            Some((framebuffer, face)) => (Some(framebuffer), face),
            None => (None, None),
        };
        let index = self.draws.len();
        self.draws.push(DrawRecord {
            kind,
            shader: self.current_shader.clone(),
            target,
            face,
            state: self.current_state,
            uniforms: self.uniforms.clone(),
            textures: self.textures.clone(),
        });
        self.commands.push(Command::Draw(index));
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl GraphicsBackend for RecordingBackend {
    fn viewport_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn load_shader_atlas(&mut self, path: &Path) -> BackendResult<()> {
        log::trace!("RecordingBackend: loading shader atlas {}", path.display());
        self.commands.push(Command::LoadShaderAtlas(path.to_path_buf()));
        if self.fail_atlas {
            return Err(BackendError::ShaderAtlasFailed {
                path: path.display().to_string(),
                reason: "atlas could not be compiled".into(),
            });
        }
        Ok(())
    }

    fn find_shader(&self, name: &str) -> Option<ShaderHandle> {
        if self.missing_shaders.contains(name) {
            return None;
        }
        // Handles are stable per name; unknown names get the next free slot
        let mut names = self.shader_names.borrow_mut();
        let index = match names.iter().position(|known| known == name) {
            Some(index) => index,
            None => {
                names.push(name.to_string());
                names.len() - 1
            }
        };
        Some(ShaderHandle(index as u64))
    }

    fn enable_shader(&mut self, shader: ShaderHandle) {
        let index = shader.0 as usize;
        let name = self
            .shader_names
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("shader#{index}"));
        self.current_shader = Some(name.clone());
        self.uniforms.clear();
        self.textures.clear();
        self.commands.push(Command::EnableShader(name));
    }

    fn disable_shader(&mut self) {
        self.current_shader = None;
        self.commands.push(Command::DisableShader);
    }

    fn set_uniform(&mut self, name: &str, value: Uniform) {
        self.uniforms.insert(name.to_string(), value);
    }

    fn set_texture(&mut self, name: &str, texture: TextureHandle, _slot: u32) {
        self.textures.insert(name.to_string(), texture);
    }

    fn set_pipeline_state(&mut self, state: &PipelineState) {
        self.current_state = *state;
        self.commands.push(Command::SetPipelineState(*state));
    }

    fn set_viewport(&mut self, _x: u32, _y: u32, width: u32, height: u32) {
        self.commands.push(Command::SetViewport { width, height });
    }

    fn create_mesh(&mut self, shape: MeshShape) -> BackendResult<MeshHandle> {
        log::trace!("RecordingBackend: creating mesh {:?}", shape);
        Ok(MeshHandle(self.allocate()))
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, primitive: Primitive) {
        self.record_draw(DrawKind::Mesh(mesh, primitive));
    }

    fn draw_fullscreen_quad(&mut self) {
        self.record_draw(DrawKind::FullscreenQuad);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        let texture = self.allocate_texture();
        self.commands.push(Command::CreateTexture {
            texture,
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
        });
        Ok(texture)
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) {
        self.commands.push(Command::WriteTexture {
            texture,
            bytes: data.len(),
        });
    }

    fn load_texture(&mut self, path: &Path) -> Option<TextureHandle> {
        if !self.texture_files.contains(path) {
            log::trace!("RecordingBackend: no texture at {}", path.display());
            return None;
        }
        Some(self.allocate_texture())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.live_textures.remove(&texture);
        self.commands.push(Command::DestroyTexture(texture));
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) {
        self.commands.push(Command::GenerateMipmaps(texture));
    }

    fn copy_texture(&mut self, src: TextureHandle, dst: TextureHandle) {
        self.commands.push(Command::CopyTexture { src, dst });
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> BackendResult<Framebuffer> {
        log::trace!(
            "RecordingBackend: creating framebuffer {:?} ({}x{}, {} color)",
            desc.label,
            desc.width,
            desc.height,
            desc.color_formats.len()
        );
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::FramebufferCreationFailed(format!(
                "{:?} has zero size",
                desc.label
            )));
        }
        let handle = FramebufferHandle(self.allocate());
        let color = (0..desc.color_formats.len())
            .map(|_| self.allocate_texture())
            .collect();
        let (depth, shared_depth) = match desc.depth {
            DepthAttachment::None => (None, false),
            DepthAttachment::Owned(_) => (Some(self.allocate_texture()), false),
            DepthAttachment::Shared(texture) => (Some(texture), true),
        };
        let framebuffer = Framebuffer {
            handle,
            width: desc.width,
            height: desc.height,
            color,
            depth,
            shared_depth,
        };
        self.live_framebuffers.insert(
            handle,
            FramebufferInfo {
                desc: desc.clone(),
                framebuffer: framebuffer.clone(),
            },
        );
        self.commands.push(Command::CreateFramebuffer {
            framebuffer: handle,
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
        });
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, framebuffer: &Framebuffer) {
        if let Some(info) = self.live_framebuffers.remove(&framebuffer.handle) {
            for texture in &info.framebuffer.color {
                self.live_textures.remove(texture);
            }
            if let (Some(depth), false) = (info.framebuffer.depth, info.framebuffer.shared_depth) {
                self.live_textures.remove(&depth);
            }
        }
        self.commands.push(Command::DestroyFramebuffer(framebuffer.handle));
    }

    fn bind_framebuffer(&mut self, framebuffer: &Framebuffer, face: Option<CubeFace>) {
        self.current_target = Some((framebuffer.handle, face));
        self.commands.push(Command::BindFramebuffer {
            framebuffer: framebuffer.handle,
            face,
        });
    }

    fn unbind_framebuffer(&mut self) {
        self.current_target = None;
        self.commands.push(Command::UnbindFramebuffer);
    }

    fn clear(&mut self, color: Option<Vec4>, depth: bool) {
        self.commands.push(Command::Clear { color, depth });
    }

    fn read_pixels(
        &mut self,
        framebuffer: &Framebuffer,
        _face: Option<CubeFace>,
    ) -> BackendResult<Rgba32FImage> {
        if !self.live_framebuffers.contains_key(&framebuffer.handle) {
            return Err(BackendError::InvalidHandle(format!(
                "framebuffer {:?} is not alive",
                framebuffer.handle
            )));
        }
        self.commands.push(Command::ReadPixels(framebuffer.handle));
        let c = self.readback_color;
        Ok(Rgba32FImage::from_pixel(
            framebuffer.width,
            framebuffer.height,
            Rgba([c.x, c.y, c.z, c.w]),
        ))
    }
}
