//! Render call collection and ordering
//!
//! Walks every visible prefab, culls mesh nodes against the camera frustum
//! and routes the survivors into the two lists the priority policy reads.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use super::RenderPriority;
use crate::resources::{AlphaMode, Material, Mesh};
use crate::scene::{BoundingBox, Camera, Frustum, Node, Scene};

/// One mesh node to draw this frame
#[derive(Debug, Clone)]
pub struct RenderCall {
    pub mesh: Arc<Mesh>,
    pub material: Arc<Material>,
    /// Global matrix of the node
    pub model: Mat4,
    pub world_bounds: BoundingBox,
    /// Eye to node translation
    pub distance: f32,
}

impl RenderCall {
    pub fn is_opaque(&self) -> bool {
        self.material.is_opaque()
    }
}

/// Counters reported by one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub emitted: usize,
    pub culled: usize,
    /// Nodes with a zero-vertex mesh
    pub skipped: usize,
}

/// Per-frame call lists
///
/// `opaque` holds `AlphaMode::NoAlpha` calls and `default` everything else,
/// except under [`RenderPriority::NoPriority`] where all calls share
/// `default`. Reading is always `opaque` then `default`.
#[derive(Debug, Clone, Default)]
pub struct RenderCallLists {
    pub opaque: Vec<RenderCall>,
    pub default: Vec<RenderCall>,
    policy: RenderPriority,
}

impl RenderCallLists {
    pub fn new(policy: RenderPriority) -> Self {
        Self {
            opaque: Vec::new(),
            default: Vec::new(),
            policy,
        }
    }

    pub fn policy(&self) -> RenderPriority {
        self.policy
    }

    /// Drop every call and switch to `policy`
    pub fn reset(&mut self, policy: RenderPriority) {
        self.opaque.clear();
        self.default.clear();
        self.policy = policy;
    }

    pub fn push(&mut self, call: RenderCall) {
        match self.policy {
            RenderPriority::NoPriority => self.default.push(call),
            RenderPriority::AlphaFirst | RenderPriority::DistanceSorted => {
                if call.is_opaque() {
                    self.opaque.push(call);
                } else {
                    self.default.push(call);
                }
            }
        }
    }

    /// Apply the policy's ordering once all calls are in
    pub fn finish(&mut self) {
        if self.policy == RenderPriority::DistanceSorted {
            // Stable: equal distances keep traversal order
            self.default
                .sort_by(|a, b| b.distance.total_cmp(&a.distance));
        }
    }

    /// Calls in draw order
    pub fn iter(&self) -> impl Iterator<Item = &RenderCall> {
        self.opaque.iter().chain(self.default.iter())
    }

    /// Non-opaque calls in draw order
    pub fn transparent(&self) -> impl Iterator<Item = &RenderCall> {
        self.iter().filter(|call| !call.is_opaque())
    }

    /// Alpha-blended calls in draw order
    pub fn blended(&self) -> impl Iterator<Item = &RenderCall> {
        self.iter().filter(|call| call.material.alpha_mode == AlphaMode::Blend)
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.default.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rebuild `lists` from the scene as seen by `camera`
///
/// With `full_capture` set nothing is culled; probe captures need every node.
pub fn collect_calls(
    scene: &Scene,
    camera: &Camera,
    full_capture: bool,
    lists: &mut RenderCallLists,
) -> CollectStats {
    let policy = lists.policy();
    lists.reset(policy);

    let mut visitor = Collector {
        frustum: camera.frustum(),
        eye: camera.position,
        full_capture,
        lists,
        stats: CollectStats::default(),
    };
    for prefab in scene.prefabs().filter(|prefab| prefab.visible) {
        visitor.visit(&prefab.root, &prefab.model);
    }
    let stats = visitor.stats;
    lists.finish();

    log::trace!(
        "Collected {} calls ({} culled, {} skipped)",
        stats.emitted,
        stats.culled,
        stats.skipped
    );
    stats
}

struct Collector<'a> {
    frustum: Frustum,
    eye: Vec3,
    full_capture: bool,
    lists: &'a mut RenderCallLists,
    stats: CollectStats,
}

impl Collector<'_> {
    fn visit(&mut self, node: &Node, parent: &Mat4) {
        if !node.visible {
            return;
        }
        let model = node.global_matrix(parent);

        if let (Some(mesh), Some(material)) = (&node.mesh, &node.material) {
            if mesh.is_empty() {
                log::trace!(
                    "Skipping node '{}': mesh '{}' has no vertices",
                    node.name,
                    mesh.name
                );
                self.stats.skipped += 1;
            } else {
                let world_bounds = mesh.aabb.transformed(&model);
                if self.full_capture || self.frustum.test_bounding_box(&world_bounds) {
                    let distance = model.w_axis.truncate().distance(self.eye);
                    self.lists.push(RenderCall {
                        mesh: Arc::clone(mesh),
                        material: Arc::clone(material),
                        model,
                        world_bounds,
                        distance,
                    });
                    self.stats.emitted += 1;
                } else {
                    self.stats.culled += 1;
                }
            }
        }

        for child in &node.children {
            self.visit(child, &model);
        }
    }
}
