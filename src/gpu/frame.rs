//! Draw recording.
//!
//! Programs do not encode directly: `ShaderProgram::draw` snapshots everything a draw needs
//! into a [`Frame`], uniform data included, and `Context::submit` replays the whole frame
//! into one command encoder. Uniform snapshots share one arena addressed by dynamic offsets,
//! so every draw sees the values it was recorded with.

use super::{
    Tracked,
    states::{GpuStates, ScissorRect, Viewport},
};
use crate::data_structures::texture::{CubeTexture, Texture};

/// Where a pass renders to.
#[derive(Clone, Debug)]
pub struct PassTarget {
    pub label: String,
    pub color: Tracked<wgpu::TextureView>,
    pub color_format: wgpu::TextureFormat,
    pub depth: Option<(Tracked<wgpu::TextureView>, wgpu::TextureFormat)>,
    pub size: (u32, u32),
}

impl PassTarget {
    pub fn offscreen(label: &str, color: &Texture, depth: Option<&Texture>) -> Self {
        Self {
            label: label.to_string(),
            color: color.view.clone(),
            color_format: color.format,
            depth: depth.map(|d| (d.view.clone(), d.format)),
            size: color.size(),
        }
    }

    /// One face of a cubemap, `face` being the array layer.
    pub fn cube_face(label: &str, cube: &CubeTexture, face: usize) -> Option<Self> {
        Some(Self {
            label: format!("{label} face {face}"),
            color: cube.faces.get(face)?.clone(),
            color_format: cube.texture.format,
            depth: None,
            size: (cube.size, cube.size),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: wgpu::Color,
    pub depth: f32,
    pub stencil: u32,
}

impl From<&GpuStates> for ClearValues {
    fn from(states: &GpuStates) -> Self {
        Self {
            color: states.clear_color(),
            depth: states.clear_depth(),
            stencil: states.clear_stencil(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum GroupResource {
    /// A slice of the frame's uniform arena, placed by the dynamic offset.
    Uniform { size: u64 },
    Texture(Tracked<wgpu::TextureView>),
    Sampler(Tracked<wgpu::Sampler>),
}

#[derive(Clone, Debug)]
pub struct GroupBinding {
    pub layout: Tracked<wgpu::BindGroupLayout>,
    pub entries: Vec<(u32, GroupResource)>,
    pub dynamic_offsets: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawRange {
    Indexed {
        first_index: u32,
        count: u32,
        base_vertex: i32,
    },
    Arrays {
        first: u32,
        count: u32,
    },
}

impl DrawRange {
    pub fn count(&self) -> u32 {
        match self {
            Self::Indexed { count, .. } | Self::Arrays { count, .. } => *count,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DrawCall {
    pub viewport: Viewport,
    pub scissor: Option<ScissorRect>,
    pub blend_constant: wgpu::Color,
    pub stencil_reference: u32,
    pub pipeline: Tracked<wgpu::RenderPipeline>,
    pub groups: Vec<GroupBinding>,
    pub vertex_buffers: Vec<(Tracked<wgpu::Buffer>, u64)>,
    pub index: Option<(Tracked<wgpu::Buffer>, wgpu::IndexFormat, u64)>,
    pub range: DrawRange,
}

#[derive(Clone, Debug)]
pub struct PassRecord {
    pub target: PassTarget,
    pub clear: Option<ClearValues>,
    pub draws: Vec<DrawCall>,
}

#[derive(Debug)]
pub struct Frame {
    passes: Vec<PassRecord>,
    arena: Vec<u8>,
    alignment: usize,
}

impl Frame {
    /// `alignment` is the device's `min_uniform_buffer_offset_alignment`.
    pub fn new(alignment: u32) -> Self {
        Self {
            passes: Vec::new(),
            arena: Vec::new(),
            alignment: alignment.max(1) as usize,
        }
    }

    /// Starts a pass. Without `clear` the target keeps its contents.
    pub fn begin_pass(&mut self, target: PassTarget, clear: Option<ClearValues>) {
        self.passes.push(PassRecord {
            target,
            clear,
            draws: Vec::new(),
        });
    }

    pub fn current_target(&self) -> Option<&PassTarget> {
        self.passes.last().map(|p| &p.target)
    }

    /// Copies a uniform block into the arena and returns its dynamic offset.
    pub fn push_uniforms(&mut self, data: &[u8]) -> u32 {
        let offset = self.arena.len().next_multiple_of(self.alignment);
        self.arena.resize(offset, 0);
        self.arena.extend_from_slice(data);
        let padded = self.arena.len().next_multiple_of(4);
        self.arena.resize(padded, 0);
        offset as u32
    }

    /// Records into the current pass. Returns the call back when no pass is open.
    pub fn push_draw(&mut self, draw: DrawCall) -> Result<(), DrawCall> {
        match self.passes.last_mut() {
            Some(pass) => {
                pass.draws.push(draw);
                Ok(())
            }
            None => Err(draw),
        }
    }

    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    pub fn uniform_bytes(&self) -> &[u8] {
        &self.arena
    }

    pub fn draw_count(&self) -> usize {
        self.passes.iter().map(|p| p.draws.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_snapshots_are_aligned() {
        let mut frame = Frame::new(256);
        assert_eq!(frame.push_uniforms(&[1u8; 80]), 0);
        assert_eq!(frame.push_uniforms(&[2u8; 16]), 256);
        assert_eq!(frame.push_uniforms(&[3u8; 4]), 512);
        let bytes = frame.uniform_bytes();
        assert_eq!(bytes.len(), 516);
        assert_eq!(bytes[79], 1);
        assert_eq!(bytes[80], 0);
        assert_eq!(bytes[256], 2);
    }

    #[test]
    fn clear_values_come_from_states() {
        let mut states = GpuStates::new();
        states.set_clear_color(wgpu::Color::RED);
        states.set_clear_depth(0.5);
        let clear = ClearValues::from(&states);
        assert_eq!(clear.color, wgpu::Color::RED);
        assert_eq!(clear.depth, 0.5);
    }

    #[test]
    fn draw_range_count() {
        let indexed = DrawRange::Indexed {
            first_index: 3,
            count: 6,
            base_vertex: 0,
        };
        assert_eq!(indexed.count(), 6);
        assert_eq!(DrawRange::Arrays { first: 0, count: 36 }.count(), 36);
        assert!(Frame::new(4).is_empty());
    }
}
