//! Environment background.

use cgmath::Matrix4;

use super::cube::UnitCube;
use crate::{
    context::Context, data_structures::texture::CubeTexture, error::DrawError,
    gpu::{frame::Frame, shader::ShaderProgram},
};

pub struct SkyboxPass {
    program: ShaderProgram,
    cube: UnitCube,
}

impl SkyboxPass {
    pub fn new(ctx: &Context) -> Self {
        Self {
            program: ShaderProgram::from_wgsl(ctx, "skybox", include_str!("skybox.wgsl")),
            cube: UnitCube::new(&ctx.device),
        }
    }

    /// Records the skybox into the frame's current pass. Only the rotation of `view` is used
    /// and the cube is drawn at the far plane, so it belongs after the scene.
    pub fn draw(
        &mut self,
        ctx: &mut Context,
        frame: &mut Frame,
        cubemap: &CubeTexture,
        view: Matrix4<f32>,
        projection: Matrix4<f32>,
    ) -> Result<(), DrawError> {
        let saved = ctx.states.raster();
        ctx.states.set_depth_test(true);
        ctx.states.set_depth_func(wgpu::CompareFunction::LessEqual);
        ctx.states.set_depth_mask(false);
        ctx.states.set_cull_face(false);
        let result = self.record(ctx, frame, cubemap, view, projection);
        ctx.states.set_raster(saved);
        result
    }

    fn record(
        &mut self,
        ctx: &mut Context,
        frame: &mut Frame,
        cubemap: &CubeTexture,
        view: Matrix4<f32>,
        projection: Matrix4<f32>,
    ) -> Result<(), DrawError> {
        ctx.units.reset();
        self.program.use_program(ctx);
        self.program.set_uniform(ctx, "projection", projection)?;
        self.program.set_uniform(ctx, "modelToView", view)?;
        self.program
            .set_uniform(ctx, "environmentMap", &cubemap.texture)?;
        self.cube.draw(ctx, &mut self.program, frame)
    }
}
