pub mod engine;
pub mod shader;
pub mod uniforms;
pub mod vertex;

pub use engine::GraphicsEngine;
pub use shader::create_visualizer_pipeline;
pub use uniforms::Uniforms;
pub use vertex::{Vertex, VertexBuffer};
