#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
mod binding {
    use cgmath::{Matrix4, SquareMatrix};
    use pbr_ngin::{
        data_structures::{scene::ComponentType, texture::Texture},
        error::{BindingError, DrawError},
        gpu::{
            Tracked,
            frame::DrawRange,
            shader::{AttributeConfig, ShaderProgram},
            units::TextureUnits,
        },
    };
    use wgpu::util::DeviceExt;

    use crate::common::test_utils::{Offscreen, headless};

    const FLAT: &str = r#"
struct Transforms {
    projection: mat4x4<f32>,
    tint: vec4<f32>,
}

@group(0) @binding(0) var<uniform> transforms: Transforms;
@group(1) @binding(0) var colorMap: texture_2d<f32>;
@group(1) @binding(1) var colorMap_sampler: sampler;
@group(1) @binding(2) var detailMap: texture_2d<f32>;
@group(1) @binding(3) var detailMap_sampler: sampler;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return transforms.projection * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    let uv = vec2<f32>(0.5);
    return transforms.tint
        * textureSample(colorMap, colorMap_sampler, uv)
        * textureSample(detailMap, detailMap_sampler, uv);
}
"#;

    fn triangle_buffer(device: &wgpu::Device) -> Tracked<wgpu::Buffer> {
        let positions: [[f32; 3]; 3] = [[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [0.0, 1.0, 0.0]];
        Tracked::new(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("triangle"),
            contents: bytemuck::cast_slice(&positions),
            usage: wgpu::BufferUsages::VERTEX,
        }))
    }

    fn position(buffer: &Tracked<wgpu::Buffer>) -> AttributeConfig<'_> {
        AttributeConfig {
            buffer,
            components: 3,
            component_type: ComponentType::Float,
            normalized: false,
            stride: 0,
            offset: 0,
        }
    }

    #[test]
    fn reflection_lists_block_members_and_samplers() {
        let ctx = headless();
        let program = ShaderProgram::from_wgsl(&ctx, "flat", FLAT);
        assert!(!program.is_broken());
        let reflection = program.reflection();
        assert!(reflection.uniforms.contains_key("projection"));
        assert!(reflection.uniforms.contains_key("tint"));
        assert!(reflection.uniforms.contains_key("colorMap"));
        assert!(reflection.attributes.contains_key("position"));
    }

    #[test]
    fn missing_names_are_recoverable() {
        let mut ctx = headless();
        let mut program = ShaderProgram::from_wgsl(&ctx, "flat", FLAT);
        let buffer = triangle_buffer(&ctx.device);
        assert_eq!(
            program.set_uniform(&mut ctx, "nope", 1.0f32),
            Err(BindingError::UniformNotFound("nope".to_string()))
        );
        assert_eq!(
            program.set_attribute(&mut ctx, "normal", position(&buffer)),
            Err(BindingError::AttributeNotFound("normal".to_string()))
        );
        // the program is still usable afterwards
        assert_eq!(program.set_uniform(&mut ctx, "tint", [1.0f32; 4]), Ok(()));
    }

    #[test]
    fn wrong_value_type_is_a_mismatch() {
        let mut ctx = headless();
        let mut program = ShaderProgram::from_wgsl(&ctx, "flat", FLAT);
        let err = program
            .set_uniform(&mut ctx, "projection", 2.0f32)
            .unwrap_err();
        assert!(matches!(err, BindingError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn samplers_take_consecutive_units() {
        let mut ctx = headless();
        let mut program = ShaderProgram::from_wgsl(&ctx, "flat", FLAT);
        let white = Texture::white(&ctx.device, &ctx.queue);
        ctx.units.reset();
        program.set_uniform(&mut ctx, "colorMap", &white).unwrap();
        program.set_uniform(&mut ctx, "detailMap", &white).unwrap();
        assert_eq!(ctx.units.used(), 2);
        assert_eq!(ctx.states.active_unit(), 1);
        assert!(ctx.states.texture_unit(0).is_some());
    }

    #[test]
    fn unit_overflow_is_reported_but_allocates() {
        let mut ctx = headless();
        ctx.units = TextureUnits::new(1);
        let mut program = ShaderProgram::from_wgsl(&ctx, "flat", FLAT);
        let white = Texture::white(&ctx.device, &ctx.queue);
        program.set_uniform(&mut ctx, "colorMap", &white).unwrap();
        program.set_uniform(&mut ctx, "detailMap", &white).unwrap();
        assert!(ctx.units.overflowed());
        assert_eq!(ctx.units.alloc_unit(), 2);
    }

    #[test]
    fn complete_program_draws() {
        let mut ctx = headless();
        let target = Offscreen::new(&ctx);
        let mut program = ShaderProgram::from_wgsl(&ctx, "flat", FLAT);
        let buffer = triangle_buffer(&ctx.device);
        let white = Texture::white(&ctx.device, &ctx.queue);

        ctx.units.reset();
        assert!(program.use_program(&mut ctx));
        assert!(!program.use_program(&mut ctx));
        program.set_uniform(&mut ctx, "projection", Matrix4::identity()).unwrap();
        program.set_uniform(&mut ctx, "tint", [1.0f32, 0.0, 0.0, 1.0]).unwrap();
        program.set_uniform(&mut ctx, "colorMap", &white).unwrap();
        program.set_uniform(&mut ctx, "detailMap", &white).unwrap();
        program.set_attribute(&mut ctx, "position", position(&buffer)).unwrap();

        let mut frame = target.frame(&ctx);
        program
            .draw(
                &ctx,
                &mut frame,
                DrawRange::Arrays { first: 0, count: 3 },
                wgpu::PrimitiveTopology::TriangleList,
            )
            .unwrap();
        ctx.submit(frame);
        let image = target.read(&ctx);
        assert_eq!(image.get_pixel(32, 40).0, [255, 0, 0, 255]);
    }

    #[test]
    fn draw_reports_what_is_missing() {
        let mut ctx = headless();
        let target = Offscreen::new(&ctx);
        let mut program = ShaderProgram::from_wgsl(&ctx, "flat", FLAT);
        let range = DrawRange::Arrays { first: 0, count: 3 };
        let topology = wgpu::PrimitiveTopology::TriangleList;

        let mut no_pass = ctx.new_frame();
        assert_eq!(
            program.draw(&ctx, &mut no_pass, range, topology),
            Err(DrawError::NoActivePass)
        );

        let mut frame = target.frame(&ctx);
        assert_eq!(
            program.draw(&ctx, &mut frame, range, topology),
            Err(DrawError::MissingAttribute("position".to_string()))
        );

        let buffer = triangle_buffer(&ctx.device);
        program.set_attribute(&mut ctx, "position", position(&buffer)).unwrap();
        ctx.units.reset();
        assert!(matches!(
            program.draw(&ctx, &mut frame, range, topology),
            Err(DrawError::UnboundTexture(_))
        ));

        ctx.states.bind_index_buffer(None);
        let indexed = DrawRange::Indexed {
            first_index: 0,
            count: 3,
            base_vertex: 0,
        };
        assert_eq!(
            program.draw(&ctx, &mut frame, indexed, topology),
            Err(DrawError::NoIndexBuffer)
        );
    }

    #[test]
    fn broken_program_refuses_to_draw() {
        let ctx = headless();
        let target = Offscreen::new(&ctx);
        let mut program = ShaderProgram::from_wgsl(&ctx, "broken", "fn vs_main( {");
        assert!(program.is_broken());
        let mut frame = target.frame(&ctx);
        assert_eq!(
            program.draw(
                &ctx,
                &mut frame,
                DrawRange::Arrays { first: 0, count: 3 },
                wgpu::PrimitiveTopology::TriangleList
            ),
            Err(DrawError::ProgramBroken("broken".to_string()))
        );
    }

    #[test]
    fn vertex_and_fragment_from_separate_sources() {
        let ctx = headless();
        let program = ShaderProgram::compile(&ctx, "split", FLAT, FLAT);
        assert!(!program.is_broken());
        assert_eq!(program.label(), "split");
    }
}
