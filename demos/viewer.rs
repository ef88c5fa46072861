//! Opens a window showing a glTF scene lit by a baked HDR environment.
//!
//! `cargo run --example viewer -- [scene.gltf] [panorama.hdr]`, paths relative to `./assets`.

use pbr_ngin::{Config, flow};

fn main() -> anyhow::Result<()> {
    flow::run(Config::default().with_args(std::env::args().skip(1)))
}
