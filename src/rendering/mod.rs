pub mod instance;
pub mod lights;
pub mod passes;
pub mod render_common;
pub mod render_mesh;
pub mod renderer;
pub mod texture;

pub use renderer::Renderer;
