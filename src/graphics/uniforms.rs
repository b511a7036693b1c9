use crate::visual::{VisualFrame, MAX_BARS, MAX_BLOBS};

/// GPU mirror of one [`VisualFrame`].
///
/// Layout must match `Uniforms` in `shaders/visualizer.wgsl`. Array elements are `vec4`s
/// because uniform arrays need a 16-byte stride; bars use `.x`, blobs use `.xyz` as
/// position and radius.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Uniforms {
    pub time: f32,
    pub aspect: f32,
    pub amplitude: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub mode: u32,
    pub band_count: u32,
    pub blob_count: u32,
    pub _padding: [u32; 3],
    pub bars: [[f32; 4]; MAX_BARS],
    pub blobs: [[f32; 4]; MAX_BLOBS],
}

impl Uniforms {
    pub fn from_frame(frame: &VisualFrame<'_>, aspect: f32) -> Self {
        let mut bars = [[0.0; 4]; MAX_BARS];
        for (slot, &value) in bars.iter_mut().zip(frame.bands) {
            slot[0] = value;
        }

        let mut blobs = [[0.0; 4]; MAX_BLOBS];
        for (slot, blob) in blobs.iter_mut().zip(frame.blobs) {
            *slot = [blob.position.x, blob.position.y, blob.radius, 0.0];
        }

        Self {
            time: frame.time,
            aspect,
            amplitude: frame.average_amplitude,
            bass: frame.energy.bass,
            mid: frame.energy.mid,
            treble: frame.energy.treble,
            mode: frame.mode.index(),
            band_count: frame.bands.len().min(MAX_BARS) as u32,
            blob_count: frame.blobs.len().min(MAX_BLOBS) as u32,
            _padding: [0; 3],
            bars,
            blobs,
        }
    }
}
