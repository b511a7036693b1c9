use wgpu::{BindGroupLayout, Device, RenderPipeline, TextureFormat};

use super::Vertex;

pub const VISUALIZER_SHADER: &str = include_str!("../../shaders/visualizer.wgsl");

/// Builds the single fullscreen pipeline shared by all visual modes. The fragment shader
/// picks the mode from the uniform block.
pub fn create_visualizer_pipeline(
    device: &Device,
    format: TextureFormat,
    bind_group_layout: &BindGroupLayout,
) -> RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("visualizer"),
        source: wgpu::ShaderSource::Wgsl(VISUALIZER_SHADER.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Visualizer Pipeline Layout"),
        bind_group_layouts: &[bind_group_layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Visualizer Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[Vertex::desc()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_declares_entry_points_and_limits() {
        assert!(VISUALIZER_SHADER.contains("fn vs_main"));
        assert!(VISUALIZER_SHADER.contains("fn fs_main"));
        assert!(VISUALIZER_SHADER.contains("array<vec4<f32>, 200>"));
        assert!(VISUALIZER_SHADER.contains("array<vec4<f32>, 64>"));
    }
}
