//! Scene management

mod bounding;
mod camera;
mod light;

pub use bounding::*;
pub use camera::*;
pub use light::*;

use std::path::PathBuf;
use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::backend::TextureHandle;
use crate::resources::{Material, Mesh};

/// A node of a prefab's hierarchy
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    /// A hidden node prunes its whole subtree
    pub visible: bool,
    /// Transform relative to the parent node
    pub model: Mat4,
    pub mesh: Option<Arc<Mesh>>,
    pub material: Option<Arc<Material>>,
    pub children: Vec<Node>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: "node".to_string(),
            visible: true,
            model: Mat4::IDENTITY,
            mesh: None,
            material: None,
            children: Vec::new(),
        }
    }
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_mesh(mut self, mesh: Arc<Mesh>, material: Arc<Material>) -> Self {
        self.mesh = Some(mesh);
        self.material = Some(material);
        self
    }

    pub fn with_model(mut self, model: Mat4) -> Self {
        self.model = model;
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Global matrix of this node given its parent's
    pub fn global_matrix(&self, parent: &Mat4) -> Mat4 {
        *parent * self.model
    }
}

/// An instance of a node hierarchy placed in the scene
#[derive(Debug, Clone)]
pub struct PrefabEntity {
    pub name: String,
    pub visible: bool,
    pub model: Mat4,
    pub root: Node,
}

impl PrefabEntity {
    pub fn new(name: &str, root: Node) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            model: Mat4::IDENTITY,
            root,
        }
    }

    pub fn with_model(mut self, model: Mat4) -> Self {
        self.model = model;
        self
    }
}

/// A box-shaped projector that paints into the G-buffer
#[derive(Debug, Clone)]
pub struct DecalEntity {
    pub name: String,
    pub visible: bool,
    /// Maps the unit cube [-1, 1] to the decal volume
    pub model: Mat4,
    pub texture: Option<TextureHandle>,
}

impl DecalEntity {
    pub fn new(name: &str, model: Mat4, texture: Option<TextureHandle>) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            model,
            texture,
        }
    }
}

/// Entity kinds a scene holds
#[derive(Debug, Clone)]
pub enum Entity {
    Prefab(PrefabEntity),
    Light(LightEntity),
    Decal(DecalEntity),
}

impl Entity {
    pub fn visible(&self) -> bool {
        match self {
            Entity::Prefab(prefab) => prefab.visible,
            Entity::Light(light) => light.visible,
            Entity::Decal(decal) => decal.visible,
        }
    }
}

impl From<PrefabEntity> for Entity {
    fn from(prefab: PrefabEntity) -> Self {
        Entity::Prefab(prefab)
    }
}

impl From<LightEntity> for Entity {
    fn from(light: LightEntity) -> Self {
        Entity::Light(light)
    }
}

impl From<DecalEntity> for Entity {
    fn from(decal: DecalEntity) -> Self {
        Entity::Decal(decal)
    }
}

/// The scene containing all renderable content
#[derive(Debug, Clone)]
pub struct Scene {
    pub entities: Vec<Entity>,
    pub ambient_light: Vec3,
    pub background_color: Vec3,
    /// Cubemap file, relative to `base_folder`
    pub skybox_filename: Option<String>,
    pub skybox_intensity: f32,
    pub base_folder: PathBuf,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            ambient_light: Vec3::new(0.03, 0.03, 0.03),
            background_color: Vec3::ZERO,
            skybox_filename: None,
            skybox_intensity: 1.0,
            base_folder: PathBuf::from("."),
        }
    }

    /// Add an entity and return its index
    pub fn add_entity(&mut self, entity: impl Into<Entity>) -> usize {
        self.entities.push(entity.into());
        self.entities.len() - 1
    }

    pub fn prefabs(&self) -> impl Iterator<Item = &PrefabEntity> {
        self.entities.iter().filter_map(|entity| match entity {
            Entity::Prefab(prefab) => Some(prefab),
            _ => None,
        })
    }

    /// Lights with their entity index
    pub fn lights(&self) -> impl Iterator<Item = (usize, &LightEntity)> {
        self.entities
            .iter()
            .enumerate()
            .filter_map(|(index, entity)| match entity {
                Entity::Light(light) => Some((index, light)),
                _ => None,
            })
    }

    pub fn lights_mut(&mut self) -> impl Iterator<Item = &mut LightEntity> {
        self.entities.iter_mut().filter_map(|entity| match entity {
            Entity::Light(light) => Some(light),
            _ => None,
        })
    }

    /// Visible decals, in entity order
    pub fn visible_decals(&self) -> impl Iterator<Item = &DecalEntity> {
        self.entities.iter().filter_map(|entity| match entity {
            Entity::Decal(decal) if decal.visible => Some(decal),
            _ => None,
        })
    }

    /// Resolve the skybox file against the base folder
    pub fn skybox_path(&self) -> Option<PathBuf> {
        self.skybox_filename
            .as_ref()
            .map(|filename| self.base_folder.join(filename))
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_queries() {
        let mut scene = Scene::new();
        scene.add_entity(PrefabEntity::new("empty", Node::new("root")));
        let light = scene.add_entity(LightEntity::point(Vec3::ZERO, Vec3::ONE, 1.0, 10.0));
        let mut hidden = DecalEntity::new("hidden", Mat4::IDENTITY, None);
        hidden.visible = false;
        scene.add_entity(hidden);
        scene.add_entity(DecalEntity::new("shown", Mat4::IDENTITY, None));

        assert_eq!(scene.prefabs().count(), 1);
        assert_eq!(scene.lights().map(|(index, _)| index).collect::<Vec<_>>(), vec![light]);
        let decals: Vec<_> = scene.visible_decals().map(|d| d.name.as_str()).collect();
        assert_eq!(decals, vec!["shown"]);
    }

    #[test]
    fn test_skybox_path_is_relative_to_base_folder() {
        let mut scene = Scene::new();
        assert!(scene.skybox_path().is_none());
        scene.base_folder = PathBuf::from("data/scene");
        scene.skybox_filename = Some("sky.png".into());
        assert_eq!(scene.skybox_path(), Some(PathBuf::from("data/scene/sky.png")));
    }
}
