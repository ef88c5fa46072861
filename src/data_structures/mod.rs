//! Renderer data structures: the scene document and GPU textures.
//!
//! - `scene` holds the node arena and the glTF-shaped document the loader fills in
//! - `texture` contains the GPU texture wrapper, cubemaps and creation utilities

pub mod scene;
pub mod texture;
