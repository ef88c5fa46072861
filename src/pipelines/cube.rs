//! The unit cube and the six face orientations the cubemap passes render with.

use cgmath::{Matrix4, Vector4};
use wgpu::util::DeviceExt;

use crate::{
    context::Context,
    data_structures::{scene::ComponentType, texture::CubeTexture},
    error::{BindingError, DrawError},
    gpu::{
        Tracked,
        frame::{ClearValues, DrawRange, Frame, PassTarget},
        shader::{AttributeConfig, ShaderProgram},
    },
};

pub const CUBE_VERTEX_COUNT: u32 = 36;

const CORNERS: [[f32; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

// counter-clockwise seen from outside
const QUADS: [[usize; 4]; 6] = [
    [1, 2, 6, 5],
    [4, 7, 3, 0],
    [3, 7, 6, 2],
    [0, 1, 5, 4],
    [4, 5, 6, 7],
    [1, 0, 3, 2],
];

/// Two triangles per face, positions only.
pub fn cube_positions() -> Vec<[f32; 3]> {
    QUADS
        .iter()
        .flat_map(|[a, b, c, d]| [*a, *b, *c, *a, *c, *d])
        .map(|corner| CORNERS[corner])
        .collect()
}

/// Cube faces in array-layer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        Self::PosX,
        Self::NegX,
        Self::PosY,
        Self::NegY,
        Self::PosZ,
        Self::NegZ,
    ];

    pub fn layer(self) -> usize {
        self as usize
    }

    /// World to view transform of a camera in the cube's center looking down this face's
    /// axis, oriented so the rendered image lands where cube sampling reads it. Every one of
    /// these flips handedness.
    pub fn view(self) -> Matrix4<f32> {
        let (x, y, z) = ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]);
        let neg = |v: [f32; 3]| v.map(|c| -c);
        match self {
            Self::PosX => rows(neg(z), y, neg(x)),
            Self::NegX => rows(z, y, x),
            Self::PosY => rows(x, neg(z), neg(y)),
            Self::NegY => rows(x, z, y),
            Self::PosZ => rows(x, y, neg(z)),
            Self::NegZ => rows(neg(x), y, z),
        }
    }
}

fn rows(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Matrix4<f32> {
    Matrix4::from_cols(
        Vector4::new(a[0], b[0], c[0], 0.0),
        Vector4::new(a[1], b[1], c[1], 0.0),
        Vector4::new(a[2], b[2], c[2], 0.0),
        Vector4::new(0.0, 0.0, 0.0, 1.0),
    )
}

#[derive(Debug)]
pub struct UnitCube {
    buffer: Tracked<wgpu::Buffer>,
}

impl UnitCube {
    pub fn new(device: &wgpu::Device) -> Self {
        let positions = cube_positions();
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("unit cube"),
            contents: bytemuck::cast_slice(&positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            buffer: Tracked::new(buffer),
        }
    }

    /// Feeds the cube into `position` and records one draw.
    pub fn draw(
        &self,
        ctx: &mut Context,
        program: &mut ShaderProgram,
        frame: &mut Frame,
    ) -> Result<(), DrawError> {
        program.set_attribute(
            ctx,
            "position",
            AttributeConfig {
                buffer: &self.buffer,
                components: 3,
                component_type: ComponentType::Float,
                normalized: false,
                stride: 12,
                offset: 0,
            },
        )?;
        program.draw(
            ctx,
            frame,
            DrawRange::Arrays {
                first: 0,
                count: CUBE_VERTEX_COUNT,
            },
            wgpu::PrimitiveTopology::TriangleList,
        )
    }
}

/// Renders `program` over the cube into each face of `target` and submits the result.
/// `bind` assigns the pass's own uniforms; `projection` and `modelToView` are set here.
pub fn render_cube_faces<F>(
    ctx: &mut Context,
    program: &mut ShaderProgram,
    cube: &UnitCube,
    target: &CubeTexture,
    projection: Matrix4<f32>,
    bind: F,
) -> anyhow::Result<wgpu::SubmissionIndex>
where
    F: FnMut(&mut Context, &mut ShaderProgram) -> Result<(), BindingError>,
{
    let saved = ctx.states.raster();
    ctx.states.set_depth_test(false);
    ctx.states.set_cull_face(false);
    let mut frame = ctx.new_frame();
    let recorded = record_faces(ctx, program, cube, target, projection, bind, &mut frame);
    ctx.states.set_raster(saved);
    recorded?;
    Ok(ctx.submit(frame))
}

fn record_faces<F>(
    ctx: &mut Context,
    program: &mut ShaderProgram,
    cube: &UnitCube,
    target: &CubeTexture,
    projection: Matrix4<f32>,
    mut bind: F,
    frame: &mut Frame,
) -> Result<(), DrawError>
where
    F: FnMut(&mut Context, &mut ShaderProgram) -> Result<(), BindingError>,
{
    if program.is_broken() {
        return Err(DrawError::ProgramBroken(program.label().to_string()));
    }
    let clear = ClearValues {
        color: wgpu::Color::BLACK,
        depth: 1.0,
        stencil: 0,
    };
    for face in CubeFace::ALL {
        let pass = PassTarget::cube_face(program.label(), target, face.layer())
            .ok_or(DrawError::NoActivePass)?;
        frame.begin_pass(pass, Some(clear));
        ctx.units.reset();
        program.use_program(ctx);
        program.set_uniform(ctx, "projection", projection)?;
        program.set_uniform(ctx, "modelToView", face.view())?;
        bind(ctx, program)?;
        cube.draw(ctx, program, frame)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math;
    use cgmath::{Deg, InnerSpace, SquareMatrix, Vector3};

    fn face_projection() -> Matrix4<f32> {
        math::to_wgpu_clip(math::perspective(Deg(90.0).into(), 1.0, 0.1, 10.0))
    }

    /// NDC position of `dir` as seen by `face`, if it falls inside the face.
    fn project(face: CubeFace, dir: Vector3<f32>) -> Option<(f32, f32)> {
        let clip = face_projection() * face.view() * dir.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let (x, y) = (clip.x / clip.w, clip.y / clip.w);
        (x.abs() < 1.0 && y.abs() < 1.0).then_some((x, y))
    }

    /// Face and (s, t) the cube sampling rules pick for `dir`, t growing downwards.
    fn sample_rule(d: Vector3<f32>) -> (CubeFace, f32, f32) {
        let (ax, ay, az) = (d.x.abs(), d.y.abs(), d.z.abs());
        let (face, sc, tc, ma) = if ax >= ay && ax >= az {
            if d.x > 0.0 {
                (CubeFace::PosX, -d.z, -d.y, ax)
            } else {
                (CubeFace::NegX, d.z, -d.y, ax)
            }
        } else if ay >= az {
            if d.y > 0.0 {
                (CubeFace::PosY, d.x, d.z, ay)
            } else {
                (CubeFace::NegY, d.x, -d.z, ay)
            }
        } else if d.z > 0.0 {
            (CubeFace::PosZ, d.x, -d.y, az)
        } else {
            (CubeFace::NegZ, -d.x, -d.y, az)
        };
        (face, (sc / ma + 1.0) / 2.0, (tc / ma + 1.0) / 2.0)
    }

    fn sphere_points(n: usize) -> impl Iterator<Item = Vector3<f32>> {
        let golden = std::f32::consts::PI * (3.0 - 5f32.sqrt());
        (0..n).map(move |i| {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / n as f32;
            let r = (1.0 - y * y).sqrt();
            let theta = golden * i as f32;
            Vector3::new(r * theta.cos(), y, r * theta.sin()).normalize()
        })
        .filter(|d| {
            // skip directions on a cube edge, where rounding decides the face
            let mut a = [d.x.abs(), d.y.abs(), d.z.abs()];
            a.sort_by(f32::total_cmp);
            a[2] - a[1] > 1e-3
        })
    }

    #[test]
    fn faces_cover_sphere_exactly_once() {
        for dir in sphere_points(4000) {
            let hits: Vec<_> = CubeFace::ALL
                .into_iter()
                .filter(|face| project(*face, dir).is_some())
                .collect();
            assert_eq!(hits.len(), 1, "{dir:?} seen by {hits:?}");
            assert_eq!(hits[0], sample_rule(dir).0, "{dir:?}");
        }
    }

    #[test]
    fn faces_render_where_sampling_reads() {
        for dir in sphere_points(500) {
            let (face, s, t) = sample_rule(dir);
            let Some((x, y)) = project(face, dir) else {
                panic!("{dir:?} not visible from {face:?}");
            };
            assert!(((x + 1.0) / 2.0 - s).abs() < 1e-4, "{face:?} {dir:?}");
            assert!(((1.0 - y) / 2.0 - t).abs() < 1e-4, "{face:?} {dir:?}");
        }
    }

    #[test]
    fn face_views_are_mirrored_rotations() {
        for face in CubeFace::ALL {
            let v = face.view();
            assert!((v.determinant() + 1.0).abs() < 1e-6, "{face:?}");
            assert_eq!(face.layer(), CubeFace::ALL.iter().position(|f| *f == face).unwrap());
        }
    }

    #[test]
    fn cube_winds_outwards() {
        let positions = cube_positions();
        assert_eq!(positions.len(), CUBE_VERTEX_COUNT as usize);
        for tri in positions.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(Vector3::from);
            let normal = (b - a).cross(c - a);
            let center = (a + b + c) / 3.0;
            assert!(normal.dot(center) > 0.0, "{tri:?}");
        }
    }
}
