use glam::{Mat4, Quat, Vec3};
use id_arena::{Arena, Id};

use crate::model::{MeshData, ModelPrefab, PrefabPrimitive, TextureData};
use crate::scene_graph::node::{Node, NodeId, NodeKind};
use crate::scene_graph::transform::Transform;

pub type MeshId = Id<MeshData>;
pub type TextureId = Id<TextureData>;

/// Scene graph. Nodes are allocated detached and become visible once they are
/// reachable from a top-level node added with [`Scene::add`].
pub struct Scene {
    pub nodes: Arena<Node>,
    pub meshes: Arena<MeshData>,
    pub textures: Arena<TextureData>,
    top_level: Vec<NodeId>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(),
            meshes: Arena::new(),
            textures: Arena::new(),
            top_level: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.alloc(node)
    }

    /// Makes a node a top-level entity of the scene, detaching it from any parent.
    pub fn add(&mut self, node_id: NodeId) {
        if self.nodes.get(node_id).is_none() || self.top_level.contains(&node_id) {
            return;
        }

        self.set_node_parent(node_id, None);
        self.top_level.push(node_id);
    }

    /// Allocates a node and adds it to the scene in one step.
    pub fn spawn(&mut self, node: Node) -> NodeId {
        let id = self.add_node(node);
        self.add(id);
        id
    }

    pub fn add_child(&mut self, parent_id: NodeId, child_id: NodeId) {
        self.top_level.retain(|&id| id != child_id);
        self.set_node_parent(child_id, Some(parent_id));
    }

    pub fn top_level(&self) -> &[NodeId] {
        &self.top_level
    }

    pub fn add_mesh(&mut self, mesh: MeshData) -> MeshId {
        self.meshes.alloc(mesh)
    }

    pub fn add_texture(&mut self, texture: TextureData) -> TextureId {
        self.textures.alloc(texture)
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Instantiates a loaded model as one detached subtree and returns its root.
    pub fn instantiate(&mut self, prefab: &ModelPrefab) -> NodeId {
        let mesh_ids: Vec<MeshId> = prefab
            .meshes
            .iter()
            .map(|mesh| self.add_mesh(mesh.clone()))
            .collect();
        let texture_ids: Vec<TextureId> = prefab
            .textures
            .iter()
            .map(|texture| self.add_texture(texture.clone()))
            .collect();

        let ids = PrefabIds {
            meshes: &mesh_ids,
            textures: &texture_ids,
        };
        let root = self.add_node(Node::group(prefab.name.clone()));

        for &index in &prefab.roots {
            self.instantiate_prefab_node(prefab, &ids, index, root);
        }

        root
    }

    fn instantiate_prefab_node(
        &mut self,
        prefab: &ModelPrefab,
        ids: &PrefabIds,
        index: usize,
        parent: NodeId,
    ) {
        let prefab_node = &prefab.nodes[index];

        let mut node = Node::group(prefab_node.name.clone());
        node.transform = Transform::from_trs(
            prefab_node.translation,
            prefab_node.rotation,
            prefab_node.scale,
        );
        let node_id = self.add_node(node);
        self.add_child(parent, node_id);

        // A glTF mesh can carry several primitives; each becomes its own mesh node.
        match prefab_node.primitives.as_slice() {
            [single] => {
                if let Some(node) = self.nodes.get_mut(node_id) {
                    node.kind = ids.mesh_kind(single);
                }
            }
            primitives => {
                for primitive in primitives {
                    let name = prefab.meshes[primitive.mesh].name.clone();
                    let child = self.add_node(Node::new(name, ids.mesh_kind(primitive)));
                    self.add_child(node_id, child);
                }
            }
        }

        for &child in &prefab_node.children {
            self.instantiate_prefab_node(prefab, ids, child, node_id);
        }
    }

    /// Visits `root` and all of its descendants, depth first.
    pub fn traverse<F>(&mut self, root: NodeId, mut visit: F)
    where
        F: FnMut(NodeId, &mut Node),
    {
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            visit(id, node);
            stack.extend(node.child_ids.iter().rev().copied());
        }
    }

    /// Visits every node reachable from the top-level list.
    pub fn visit_visible<F>(&self, mut visit: F)
    where
        F: FnMut(NodeId, &Node),
    {
        let mut stack: Vec<NodeId> = self.top_level.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            visit(id, node);
            stack.extend(node.child_ids.iter().rev().copied());
        }
    }

    /// Updates all node transforms in hierarchical order
    fn update_transforms(&self) {
        let root_nodes = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent_id.is_none())
            .map(|(id, _)| id);

        for root_id in root_nodes {
            self.update_node_transform_recursive(root_id, Mat4::IDENTITY, false);
        }
    }

    fn update_node_transform_recursive(
        &self,
        node_id: NodeId,
        parent_world_matrix: Mat4,
        parent_updated: bool,
    ) {
        if let Some(node) = self.nodes.get(node_id) {
            // get_local_matrix may dirty the world matrix, so it runs before the check
            let local_matrix = *node.transform.get_local_matrix();
            let updated = parent_updated || node.transform.is_world_dirty();
            if updated {
                node.transform
                    .set_world_matrix(parent_world_matrix * local_matrix);
            }

            let world_matrix = *node.transform.get_world_matrix();
            for &child_id in &node.child_ids {
                self.update_node_transform_recursive(child_id, world_matrix, updated);
            }
        }
    }

    /// Invalidates world transforms for a node and all its descendants
    pub fn invalidate_node_hierarchy(&self, node_id: NodeId) {
        if let Some(node) = self.nodes.get(node_id) {
            node.transform.invalidate_world();

            for &child_id in &node.child_ids {
                self.invalidate_node_hierarchy(child_id);
            }
        }
    }

    /// Sets the parent of a node and updates child relationships
    pub fn set_node_parent(&mut self, child_id: NodeId, new_parent_id: Option<NodeId>) {
        if let Some(child) = self.nodes.get(child_id) {
            if let Some(old_parent_id) = child.parent_id {
                if let Some(old_parent) = self.nodes.get_mut(old_parent_id) {
                    old_parent.child_ids.retain(|&id| id != child_id);
                }
            }
        }

        if let Some(child) = self.nodes.get_mut(child_id) {
            child.parent_id = new_parent_id;

            if let Some(new_parent_id) = new_parent_id {
                if let Some(new_parent) = self.nodes.get_mut(new_parent_id) {
                    new_parent.child_ids.push(child_id);
                }
            }
        }

        self.invalidate_node_hierarchy(child_id);
    }

    pub fn set_node_translation(&mut self, node_id: NodeId, translation: Vec3) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.transform.set_translation(translation);
        }
        self.invalidate_node_hierarchy(node_id);
    }

    pub fn translate_node(&mut self, node_id: NodeId, delta: Vec3) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.transform.translate(delta);
        }
        self.invalidate_node_hierarchy(node_id);
    }

    pub fn set_node_euler(&mut self, node_id: NodeId, angles: Vec3) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.transform.set_euler(angles);
        }
        self.invalidate_node_hierarchy(node_id);
    }

    pub fn rotate_node(&mut self, node_id: NodeId, rotation: Quat) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.transform.rotate(rotation);
        }
        self.invalidate_node_hierarchy(node_id);
    }

    pub fn node_translation(&self, node_id: NodeId) -> Option<Vec3> {
        self.nodes
            .get(node_id)
            .map(|node| node.transform.translation())
    }

    /// World-space position from the last transform update.
    #[cfg(test)]
    pub fn world_position(&self, node_id: NodeId) -> Option<Vec3> {
        self.nodes
            .get(node_id)
            .map(|node| node.transform.get_world_matrix().w_axis.truncate())
    }

    pub fn late_update(&mut self) {
        self.update_transforms();
    }
}

/// Scene ids of a prefab's meshes and textures, by prefab index.
struct PrefabIds<'a> {
    meshes: &'a [MeshId],
    textures: &'a [TextureId],
}

impl PrefabIds<'_> {
    fn mesh_kind(&self, primitive: &PrefabPrimitive) -> NodeKind {
        let texture = primitive
            .texture
            .and_then(|index| self.textures.get(index).copied());

        NodeKind::Mesh {
            mesh: self.meshes[primitive.mesh],
            material: primitive.material.with_texture(texture),
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
