//! Typed errors of the rendering layers. Setup and I/O paths use `anyhow` instead.

use thiserror::Error;

/// Failure to bind a value to a reflected shader input.
///
/// Missing names are logged where they are raised; callers decide whether to escalate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindingError {
    #[error("uniform `{0}` is not active in the program")]
    UniformNotFound(String),
    #[error("attribute `{0}` is not active in the program")]
    AttributeNotFound(String),
    #[error("uniform `{name}` expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },
    #[error("attribute `{name}`: {reason}")]
    UnsupportedVertexFormat { name: String, reason: String },
    #[error("sampler `{name}` expects a {expected:?} texture, got {found:?}")]
    TextureDimension {
        name: String,
        expected: wgpu::TextureViewDimension,
        found: wgpu::TextureViewDimension,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DrawError {
    #[error("program `{0}` failed to compile or link")]
    ProgramBroken(String),
    #[error("no render pass has been started on this frame")]
    NoActivePass,
    #[error("attribute `{0}` has no vertex buffer bound")]
    MissingAttribute(String),
    #[error("sampler `{0}` has no texture bound")]
    UnboundTexture(String),
    #[error("indexed draw without an index buffer")]
    NoIndexBuffer,
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// A vertex/fragment pair that does not fit together.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    #[error("shader has no {0:?} entry point")]
    MissingEntryPoint(naga::ShaderStage),
    #[error("fragment input `{name}` at location {location} is not written by the vertex stage")]
    UnmatchedVarying { name: String, location: u32 },
    #[error("conflicting declarations at group {group} binding {binding}")]
    BindingConflict { group: u32, binding: u32 },
    #[error("uniform `{0}` is declared in more than one block")]
    DuplicateUniform(String),
    #[error("texture `{0}` has no `{0}_sampler` in its group")]
    MissingSampler(String),
}

/// Malformed scene data. Fatal: the renderer refuses to start.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("{kind} index {index} out of range (len {len})")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },
    #[error("node {0} is part of a cycle")]
    Cycle(usize),
    #[error("buffer {index}: expected {expected} bytes, found {found}")]
    ByteLength {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("buffer view {0} exceeds its buffer")]
    ViewOutOfBounds(usize),
    #[error("accessor {0} exceeds its buffer view")]
    AccessorOutOfBounds(usize),
    #[error("mesh {mesh} primitive {primitive} has no {semantic}")]
    MissingAttribute {
        mesh: usize,
        primitive: usize,
        semantic: &'static str,
    },
    #[error("accessor {0} has no buffer view")]
    MissingBufferView(usize),
    #[error("accessor {0} cannot be used as an index buffer")]
    UnsupportedIndexType(usize),
}
