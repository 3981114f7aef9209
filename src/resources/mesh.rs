//! Mesh references consumed by the renderer

use crate::backend::{BackendResult, GraphicsBackend, MeshHandle, MeshShape};
use crate::scene::BoundingBox;
use glam::Vec3;

/// Geometry already uploaded by the loader
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub handle: MeshHandle,
    pub vertex_count: u32,
    /// Local-space bounds
    pub aabb: BoundingBox,
}

impl Mesh {
    pub fn new(name: &str, handle: MeshHandle, vertex_count: u32, aabb: BoundingBox) -> Self {
        Self {
            name: name.to_string(),
            handle,
            vertex_count,
            aabb,
        }
    }

    /// Create one of the backend's built-in shapes with its known bounds
    pub fn from_shape(backend: &mut dyn GraphicsBackend, shape: MeshShape) -> BackendResult<Self> {
        let handle = backend.create_mesh(shape)?;
        let (name, vertex_count, halfsize) = match shape {
            MeshShape::Sphere => ("sphere", 2880, Vec3::ONE),
            MeshShape::Cube => ("cube", 36, Vec3::ONE),
            MeshShape::Quad => ("quad", 6, Vec3::new(1.0, 1.0, 0.0)),
        };
        Ok(Self::new(
            name,
            handle,
            vertex_count,
            BoundingBox::new(Vec3::ZERO, halfsize),
        ))
    }

    /// A mesh without vertices cannot be drawn
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    /// Calculate triangle count
    pub fn triangle_count(&self) -> u32 {
        self.vertex_count / 3
    }
}

/// Meshes the renderer itself draws: skybox, light volumes, decal boxes
#[derive(Debug, Clone)]
pub struct BuiltinMeshes {
    pub sphere: Mesh,
    pub cube: Mesh,
    pub quad: Mesh,
}

impl BuiltinMeshes {
    pub fn new(backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        Ok(Self {
            sphere: Mesh::from_shape(backend, MeshShape::Sphere)?,
            cube: Mesh::from_shape(backend, MeshShape::Cube)?,
            quad: Mesh::from_shape(backend, MeshShape::Quad)?,
        })
    }
}
