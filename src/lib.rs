//! pbr-ngin
//!
//! A small image-based physically based renderer on wgpu. An HDR equirectangular panorama
//! is baked into an environment cubemap and a diffuse irradiance map at startup; a glTF
//! scene is then drawn every frame with a Cook-Torrance shader in front of a skybox.
//!
//! High-level modules
//! - `math`: matrix and quaternion helpers (projection, composition, inversion, Euler angles)
//! - `camera`: camera placement and projection
//! - `config`: renderer settings
//! - `context`: device, queue, surface and the tracked GPU state every pass goes through
//! - `gpu`: state tracker, texture units, shader programs with reflection, resource cache
//! - `data_structures`: the scene document and GPU textures
//! - `pipelines`: the cubemap bakes and the skybox pass
//! - `resources`: glTF and panorama loading
//! - `render`: scene graph traversal and per-primitive drawing
//! - `flow`: the winit event loop driving a viewer
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod gpu;
pub mod math;
pub mod pipelines;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use config::Config;
pub use context::Context;
pub use wgpu;
pub use winit::event::WindowEvent;
