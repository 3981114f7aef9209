//! Resource management
//!
//! Meshes, materials and the fallback textures bound in their place.

mod material;
mod mesh;
mod texture;

pub use material::*;
pub use mesh::*;
pub use texture::*;
