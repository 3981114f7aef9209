//! Core backend abstraction traits
//!
//! The renderer drives the GPU through this narrow, GL-style interface:
//! named shaders and uniforms, fixed-function state, framebuffers and
//! read-back. Shader compilation, mesh upload and texture object semantics
//! live behind it.

use crate::backend::types::*;
use glam::Vec4;
use image::Rgba32FImage;
use std::path::Path;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to load shader atlas {path}: {reason}")]
    ShaderAtlasFailed { path: String, reason: String },
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Failed to create mesh: {0}")]
    MeshCreationFailed(String),
    #[error("Failed to read back pixels: {0}")]
    ReadbackFailed(String),
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to uploaded mesh geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub(crate) u64);

/// Handle to a framebuffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

impl ShaderHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl TextureHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl MeshHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl FramebufferHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// A created framebuffer and the textures it renders into
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer {
    pub handle: FramebufferHandle,
    pub width: u32,
    pub height: u32,
    pub color: Vec<TextureHandle>,
    pub depth: Option<TextureHandle>,
    /// True when `depth` belongs to another framebuffer
    pub shared_depth: bool,
}

impl Framebuffer {
    /// First color target, if any
    pub fn color0(&self) -> Option<TextureHandle> {
        self.color.first().copied()
    }
}

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Size of the default (screen) framebuffer
    fn viewport_size(&self) -> (u32, u32);

    // Shaders

    /// Load and compile every program listed in a shader atlas
    fn load_shader_atlas(&mut self, path: &Path) -> BackendResult<()>;

    /// Look up a compiled program by name
    fn find_shader(&self, name: &str) -> Option<ShaderHandle>;

    /// Make a program current; later uniform and texture calls target it
    fn enable_shader(&mut self, shader: ShaderHandle);

    fn disable_shader(&mut self);

    fn set_uniform(&mut self, name: &str, value: Uniform);

    fn set_texture(&mut self, name: &str, texture: TextureHandle, slot: u32);

    // Fixed-function state

    fn set_pipeline_state(&mut self, state: &PipelineState);

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    // Geometry

    /// Create one of the built-in meshes
    fn create_mesh(&mut self, shape: MeshShape) -> BackendResult<MeshHandle>;

    fn draw_mesh(&mut self, mesh: MeshHandle, primitive: Primitive);

    /// Draw a quad covering the whole bound target
    fn draw_fullscreen_quad(&mut self);

    // Textures

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]);

    /// Load a texture (2D or cubemap) from disk; `None` when unavailable
    fn load_texture(&mut self, path: &Path) -> Option<TextureHandle>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn generate_mipmaps(&mut self, texture: TextureHandle);

    /// Copy the full contents of `src` into `dst` (same size and format)
    fn copy_texture(&mut self, src: TextureHandle, dst: TextureHandle);

    // Framebuffers

    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> BackendResult<Framebuffer>;

    /// Destroy a framebuffer and the textures it owns (never a shared depth)
    fn destroy_framebuffer(&mut self, framebuffer: &Framebuffer);

    /// Bind a framebuffer for drawing; `face` selects a cubemap face
    fn bind_framebuffer(&mut self, framebuffer: &Framebuffer, face: Option<CubeFace>);

    /// Bind the screen
    fn unbind_framebuffer(&mut self);

    /// Clear the bound target's color (when given) and depth
    fn clear(&mut self, color: Option<Vec4>, depth: bool);

    /// Synchronously read the first color target back to host memory
    fn read_pixels(
        &mut self,
        framebuffer: &Framebuffer,
        face: Option<CubeFace>,
    ) -> BackendResult<Rgba32FImage>;
}
