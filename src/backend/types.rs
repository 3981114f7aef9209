//! Common types shared between the renderer and its GPU backend

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    Rgb32Float,
    R8Unorm,
    Depth24Plus,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth24Plus | TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Depth24Plus
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgb32Float => 12,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Filter mode for sampling a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: FilterMode,
    pub mipmaps: bool,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            filter: FilterMode::Linear,
            mipmaps: false,
        }
    }
}

/// Depth attachment of a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthAttachment {
    None,
    /// The framebuffer allocates and owns its depth texture
    Owned(TextureFormat),
    /// The framebuffer renders against another framebuffer's depth texture
    Shared(crate::backend::TextureHandle),
}

/// Framebuffer descriptor: N color targets plus optional depth
#[derive(Debug, Clone)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub color_formats: Vec<TextureFormat>,
    pub depth: DepthAttachment,
    /// Color targets are cubemaps with six bindable faces
    pub cubemap: bool,
    pub mipmaps: bool,
}

impl Default for FramebufferDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            color_formats: vec![TextureFormat::Rgba16Float],
            depth: DepthAttachment::None,
            cubemap: false,
            mipmaps: false,
        }
    }
}

/// Cubemap face, in GL order (+X, -X, +Y, -Y, +Z, -Z)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// View direction and up vector used when rendering this face
    pub fn view_basis(&self) -> (Vec3, Vec3) {
        match self {
            CubeFace::PositiveX => (Vec3::X, Vec3::NEG_Y),
            CubeFace::NegativeX => (Vec3::NEG_X, Vec3::NEG_Y),
            CubeFace::PositiveY => (Vec3::Y, Vec3::Z),
            CubeFace::NegativeY => (Vec3::NEG_Y, Vec3::NEG_Z),
            CubeFace::PositiveZ => (Vec3::Z, Vec3::NEG_Y),
            CubeFace::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_Y),
        }
    }
}

/// Built-in meshes the backend can generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshShape {
    /// Unit sphere (radius 1)
    Sphere,
    /// Cube spanning [-1, 1] on every axis
    Cube,
    /// Quad spanning [-1, 1] in XY
    Quad,
}

/// Primitive assembly for a mesh draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
    Lines,
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Polygon rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Line,
}

/// Compare function for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Blend state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        }
    }

    /// Pure additive accumulation (`One, One`)
    pub fn additive() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
        }
    }

    /// Alpha-weighted additive accumulation (`SrcAlpha, One`)
    pub fn alpha_additive() -> Self {
        Self {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::One,
        }
    }
}

/// Fixed-function state applied before a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    pub blend: Option<BlendState>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            blend: None,
            depth_test: true,
            depth_write: true,
            depth_compare: CompareFunction::Less,
            cull_mode: CullMode::Back,
            polygon_mode: PolygonMode::Fill,
        }
    }
}

impl PipelineState {
    /// State for full-screen passes: no depth, no culling
    pub fn fullscreen() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            cull_mode: CullMode::None,
            ..Default::default()
        }
    }

    pub fn with_blend(mut self, blend: Option<BlendState>) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_cull(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }
}

/// Value bound to a named shader uniform
#[derive(Debug, Clone, PartialEq)]
pub enum Uniform {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    Vec3Array(Vec<Vec3>),
    Mat4Array(Vec<Mat4>),
}

impl From<i32> for Uniform {
    fn from(value: i32) -> Self {
        Uniform::Int(value)
    }
}

impl From<bool> for Uniform {
    fn from(value: bool) -> Self {
        Uniform::Int(value as i32)
    }
}

impl From<f32> for Uniform {
    fn from(value: f32) -> Self {
        Uniform::Float(value)
    }
}

impl From<Vec2> for Uniform {
    fn from(value: Vec2) -> Self {
        Uniform::Vec2(value)
    }
}

impl From<Vec3> for Uniform {
    fn from(value: Vec3) -> Self {
        Uniform::Vec3(value)
    }
}

impl From<Vec4> for Uniform {
    fn from(value: Vec4) -> Self {
        Uniform::Vec4(value)
    }
}

impl From<Mat4> for Uniform {
    fn from(value: Mat4) -> Self {
        Uniform::Mat4(value)
    }
}
