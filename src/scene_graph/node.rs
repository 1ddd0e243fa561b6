use glam::{Vec3, Vec4};
use id_arena::Id;

use crate::model::Material;
use crate::scene_graph::scene::MeshId;
use crate::scene_graph::transform::Transform;

pub type NodeId = Id<Node>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    /// Parallel light shining from the node's world position towards `target`.
    Directional {
        color: Vec4,
        intensity: f32,
        target: Vec3,
    },
    Ambient {
        color: Vec4,
        intensity: f32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh { mesh: MeshId, material: Material },
    Light(Light),
}

pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub transform: Transform,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub parent_id: Option<NodeId>,
    pub child_ids: Vec<NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, mesh: MeshId, material: Material) -> Self {
        Self::new(name, NodeKind::Mesh { mesh, material })
    }

    pub fn light(name: impl Into<String>, light: Light) -> Self {
        Self::new(name, NodeKind::Light(light))
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.transform.set_translation(translation);
        self
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self.kind, NodeKind::Mesh { .. })
    }
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: NodeKind::Group,
            transform: Transform::default(),
            cast_shadow: false,
            receive_shadow: false,
            parent_id: None,
            child_ids: Vec::new(),
        }
    }
}
