//! Fallback textures bound when a material slot is empty

use crate::backend::*;

/// Solid color texel data
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    /// Create a default white texture
    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Create a default black texture
    pub fn black() -> Self {
        Self::solid_color([0, 0, 0, 255], "black")
    }

    /// Create a default normal map (pointing up)
    pub fn default_normal() -> Self {
        // Normal pointing up: (0, 0, 1) in tangent space
        Self::solid_color([128, 128, 255, 255], "default_normal")
    }

    /// Create and upload to the GPU
    pub fn upload(&self, backend: &mut dyn GraphicsBackend) -> BackendResult<TextureHandle> {
        let handle = backend.create_texture(&TextureDescriptor {
            label: Some(self.name.clone()),
            width: self.width,
            height: self.height,
            format: self.format,
            filter: FilterMode::Nearest,
            mipmaps: false,
        })?;
        backend.write_texture(handle, &self.data);
        Ok(handle)
    }
}

/// 1x1 textures substituted for absent material textures
#[derive(Debug, Clone, Copy)]
pub struct DefaultTextures {
    pub white: TextureHandle,
    pub black: TextureHandle,
    pub normal: TextureHandle,
}

impl DefaultTextures {
    pub fn new(backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        Ok(Self {
            white: TextureData::white().upload(backend)?,
            black: TextureData::black().upload(backend)?,
            normal: TextureData::default_normal().upload(backend)?,
        })
    }
}
