use cgmath::Deg;
use half::f16;
use pbr_ngin::{
    camera::Projection,
    context::Context,
    data_structures::{
        scene::Document,
        texture::{CubeTexture, Texture},
    },
    gpu::frame::{ClearValues, Frame, PassTarget},
};

pub(crate) const TARGET_SIZE: u32 = 64;

pub(crate) fn headless() -> Context {
    futures::executor::block_on(Context::headless()).expect("no GPU adapter for integration tests")
}

/// A color target plus depth buffer of `TARGET_SIZE`².
pub(crate) struct Offscreen {
    pub color: Texture,
    pub depth: Texture,
}

impl Offscreen {
    pub fn new(ctx: &Context) -> Self {
        let size = [TARGET_SIZE, TARGET_SIZE];
        Self {
            color: Texture::create_render_target(
                &ctx.device,
                size,
                wgpu::TextureFormat::Rgba8Unorm,
                "test target",
            ),
            depth: Texture::create_depth_texture(&ctx.device, size, "test depth"),
        }
    }

    /// A frame with one pass on this target, cleared to black.
    pub fn frame(&self, ctx: &Context) -> Frame {
        let mut frame = ctx.new_frame();
        frame.begin_pass(
            PassTarget::offscreen("test pass", &self.color, Some(&self.depth)),
            Some(ClearValues {
                color: wgpu::Color::BLACK,
                depth: 1.0,
                stencil: 0,
            }),
        );
        frame
    }

    pub fn read(&self, ctx: &Context) -> image::RgbaImage {
        let bytes = futures::executor::block_on(ctx.read_texture(&self.color.texture, 0))
            .expect("readback failed");
        image::RgbaImage::from_raw(TARGET_SIZE, TARGET_SIZE, bytes).expect("short readback")
    }
}

pub(crate) fn projection() -> Projection {
    Projection::new(TARGET_SIZE, TARGET_SIZE, Deg(60.0), 0.1, 100.0)
}

/// Every texel of one cube face as linear floats.
pub(crate) fn read_face(ctx: &Context, cube: &CubeTexture, layer: u32) -> Vec<[f32; 4]> {
    let bytes = futures::executor::block_on(ctx.read_texture(&cube.texture.texture, layer))
        .expect("readback failed");
    match cube.texture.format {
        wgpu::TextureFormat::Rgba16Float => bytes
            .chunks_exact(8)
            .map(|t| {
                let c = |i: usize| f16::from_le_bytes([t[i], t[i + 1]]).to_f32();
                [c(0), c(2), c(4), c(6)]
            })
            .collect(),
        wgpu::TextureFormat::Rgba8Unorm => bytes
            .chunks_exact(4)
            .map(|t| [0, 1, 2, 3].map(|i| t[i] as f32 / 255.0))
            .collect(),
        other => panic!("unexpected cubemap format {other:?}"),
    }
}

/// A unit triangle in the z = 0 plane facing +Z.
pub(crate) fn triangle() -> Document {
    Document::from_geometry(
        &[[-0.5, -0.5, 0.0], [0.5, -0.5, 0.0], [0.0, 0.5, 0.0]],
        &[[0.0, 0.0, 1.0]; 3],
        &[[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]],
        &[0, 1, 2],
    )
}

#[macro_export]
macro_rules! assert_near {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let (left, right, tolerance) = ($left, $right, $tolerance);
        assert!(
            (left - right).abs() <= tolerance,
            "{} = {left} is not within {tolerance} of {right}",
            stringify!($left)
        );
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let (left, right, tolerance) = ($left, $right, $tolerance);
        assert!((left - right).abs() <= tolerance, $($arg)+);
    }};
}
