use anyhow::*;
use fs_extra::copy_items;
use fs_extra::dir::CopyOptions;
use std::env;
use std::path::PathBuf;

// Scene files, panoramas and textures are read from ./assets at runtime. Mirror them next to
// the build output so `cargo run --example viewer` finds them from the target directory too.
fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=assets/*");
    println!("cargo:rerun-if-changed=src/pipelines");

    let out_dir = env::var("OUT_DIR")?;
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let assets_src = manifest_dir.join("assets");
    if !assets_src.exists() {
        return Ok(());
    }

    let mut copy_options = CopyOptions::new();
    copy_options.overwrite = true;
    copy_items(&[assets_src], out_dir, &copy_options)?;

    Ok(())
}
