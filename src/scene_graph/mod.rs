pub mod node;
pub mod scene;
pub mod transform;

pub use node::{Light, Node, NodeId, NodeKind};
pub use scene::{MeshId, Scene, TextureId};
