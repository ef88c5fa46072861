//! Transform math.
//!
//! Column-major 4x4 matrices and quaternions on top of `cgmath`. The projection follows the
//! OpenGL clip-space convention (`z` in `[-1, 1]`); [`to_wgpu_clip`] remaps it for wgpu.

use cgmath::{InnerSpace, Matrix4, Quaternion, Rad, Vector3, Vector4};

/// Remaps OpenGL clip space (`z` in `[-1, 1]`) to wgpu clip space (`z` in `[0, 1]`).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Right-handed perspective projection with `f = cot(fov_y / 2)`.
pub fn perspective(fov_y: Rad<f32>, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
    let f = (std::f32::consts::FRAC_PI_2 - 0.5 * fov_y.0).tan();
    let range_inv = 1.0 / (near - far);
    #[rustfmt::skip]
    let m = Matrix4::new(
        f / aspect, 0.0, 0.0, 0.0,
        0.0, f, 0.0, 0.0,
        0.0, 0.0, (near + far) * range_inv, -1.0,
        0.0, 0.0, near * far * range_inv * 2.0, 0.0,
    );
    m
}

pub fn to_wgpu_clip(projection: Matrix4<f32>) -> Matrix4<f32> {
    OPENGL_TO_WGPU_MATRIX * projection
}

/// Builds `T * R * S` directly from the quaternion expansion.
///
/// The quaternion is used as given; callers pass unit quaternions.
pub fn compose(position: Vector3<f32>, rotation: Quaternion<f32>, scale: Vector3<f32>) -> Matrix4<f32> {
    let (x, y, z, w) = (rotation.v.x, rotation.v.y, rotation.v.z, rotation.s);
    let (x2, y2, z2) = (x + x, y + y, z + z);
    let (xx, xy, xz) = (x * x2, x * y2, x * z2);
    let (yy, yz, zz) = (y * y2, y * z2, z * z2);
    let (wx, wy, wz) = (w * x2, w * y2, w * z2);

    Matrix4::from_cols(
        Vector4::new((1.0 - (yy + zz)) * scale.x, (xy + wz) * scale.x, (xz - wy) * scale.x, 0.0),
        Vector4::new((xy - wz) * scale.y, (1.0 - (xx + zz)) * scale.y, (yz + wx) * scale.y, 0.0),
        Vector4::new((xz + wy) * scale.z, (yz - wx) * scale.z, (1.0 - (xx + yy)) * scale.z, 0.0),
        Vector4::new(position.x, position.y, position.z, 1.0),
    )
}

/// Cofactor inverse. A singular matrix (determinant exactly zero) yields the zero matrix.
pub fn invert(m: &Matrix4<f32>) -> Matrix4<f32> {
    let te = to_array(m);
    let (n11, n21, n31, n41) = (te[0], te[1], te[2], te[3]);
    let (n12, n22, n32, n42) = (te[4], te[5], te[6], te[7]);
    let (n13, n23, n33, n43) = (te[8], te[9], te[10], te[11]);
    let (n14, n24, n34, n44) = (te[12], te[13], te[14], te[15]);

    let t11 = n23 * n34 * n42 - n24 * n33 * n42 + n24 * n32 * n43 - n22 * n34 * n43 - n23 * n32 * n44
        + n22 * n33 * n44;
    let t12 = n14 * n33 * n42 - n13 * n34 * n42 - n14 * n32 * n43 + n12 * n34 * n43 + n13 * n32 * n44
        - n12 * n33 * n44;
    let t13 = n13 * n24 * n42 - n14 * n23 * n42 + n14 * n22 * n43 - n12 * n24 * n43 - n13 * n22 * n44
        + n12 * n23 * n44;
    let t14 = n14 * n23 * n32 - n13 * n24 * n32 - n14 * n22 * n33 + n12 * n24 * n33 + n13 * n22 * n34
        - n12 * n23 * n34;

    let det = n11 * t11 + n21 * t12 + n31 * t13 + n41 * t14;
    if det == 0.0 {
        return from_array([0.0; 16]);
    }
    let d = 1.0 / det;

    let mut out = [0.0f32; 16];
    out[0] = t11 * d;
    out[1] = (n24 * n33 * n41 - n23 * n34 * n41 - n24 * n31 * n43 + n21 * n34 * n43 + n23 * n31 * n44
        - n21 * n33 * n44)
        * d;
    out[2] = (n22 * n34 * n41 - n24 * n32 * n41 + n24 * n31 * n42 - n21 * n34 * n42 - n22 * n31 * n44
        + n21 * n32 * n44)
        * d;
    out[3] = (n23 * n32 * n41 - n22 * n33 * n41 - n23 * n31 * n42 + n21 * n33 * n42 + n22 * n31 * n43
        - n21 * n32 * n43)
        * d;
    out[4] = t12 * d;
    out[5] = (n13 * n34 * n41 - n14 * n33 * n41 + n14 * n31 * n43 - n11 * n34 * n43 - n13 * n31 * n44
        + n11 * n33 * n44)
        * d;
    out[6] = (n14 * n32 * n41 - n12 * n34 * n41 - n14 * n31 * n42 + n11 * n34 * n42 + n12 * n31 * n44
        - n11 * n32 * n44)
        * d;
    out[7] = (n12 * n33 * n41 - n13 * n32 * n41 + n13 * n31 * n42 - n11 * n33 * n42 - n12 * n31 * n43
        + n11 * n32 * n43)
        * d;
    out[8] = t13 * d;
    out[9] = (n14 * n23 * n41 - n13 * n24 * n41 - n14 * n21 * n43 + n11 * n24 * n43 + n13 * n21 * n44
        - n11 * n23 * n44)
        * d;
    out[10] = (n12 * n24 * n41 - n14 * n22 * n41 + n14 * n21 * n42 - n11 * n24 * n42 - n12 * n21 * n44
        + n11 * n22 * n44)
        * d;
    out[11] = (n13 * n22 * n41 - n12 * n23 * n41 - n13 * n21 * n42 + n11 * n23 * n42 + n12 * n21 * n43
        - n11 * n22 * n43)
        * d;
    out[12] = t14 * d;
    out[13] = (n13 * n24 * n31 - n14 * n23 * n31 + n14 * n21 * n33 - n11 * n24 * n33 - n13 * n21 * n34
        + n11 * n23 * n34)
        * d;
    out[14] = (n14 * n22 * n31 - n12 * n24 * n31 - n14 * n21 * n32 + n11 * n24 * n32 + n12 * n21 * n34
        - n11 * n22 * n34)
        * d;
    out[15] = (n12 * n23 * n31 - n13 * n22 * n31 + n13 * n21 * n32 - n11 * n23 * n32 - n12 * n21 * n33
        + n11 * n22 * n33)
        * d;

    from_array(out)
}

/// Flattens a matrix in column-major order.
pub fn to_array(m: &Matrix4<f32>) -> [f32; 16] {
    let cols: [[f32; 4]; 4] = (*m).into();
    let mut out = [0.0; 16];
    for (i, col) in cols.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(col);
    }
    out
}

pub fn from_array(a: [f32; 16]) -> Matrix4<f32> {
    Matrix4::from_cols(
        Vector4::new(a[0], a[1], a[2], a[3]),
        Vector4::new(a[4], a[5], a[6], a[7]),
        Vector4::new(a[8], a[9], a[10], a[11]),
        Vector4::new(a[12], a[13], a[14], a[15]),
    )
}

/// `a * b`, written into a fresh value so chained products never alias an operand.
pub fn multiply(a: &Matrix4<f32>, b: &Matrix4<f32>) -> Matrix4<f32> {
    a * b
}

/// Drops the translation column, keeping rotation and scale.
pub fn strip_translation(m: &Matrix4<f32>) -> Matrix4<f32> {
    let mut out = *m;
    out.w = Vector4::new(0.0, 0.0, 0.0, 1.0);
    out
}

pub fn translation(m: &Matrix4<f32>) -> Vector3<f32> {
    m.w.truncate()
}

/// Rotation order used when building a quaternion from Euler angles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EulerOrder {
    #[default]
    Xyz,
    Yxz,
    Zxy,
    Zyx,
    Yzx,
    Xzy,
}

/// Quaternion from Euler angles (radians) applied in `order`.
pub fn quaternion_from_euler(angles: [f32; 3], order: EulerOrder) -> Quaternion<f32> {
    let (s1, c1) = (angles[0] / 2.0).sin_cos();
    let (s2, c2) = (angles[1] / 2.0).sin_cos();
    let (s3, c3) = (angles[2] / 2.0).sin_cos();

    let (x, y, z, w) = match order {
        EulerOrder::Xyz => (
            s1 * c2 * c3 + c1 * s2 * s3,
            c1 * s2 * c3 - s1 * c2 * s3,
            c1 * c2 * s3 + s1 * s2 * c3,
            c1 * c2 * c3 - s1 * s2 * s3,
        ),
        EulerOrder::Yxz => (
            s1 * c2 * c3 + c1 * s2 * s3,
            c1 * s2 * c3 - s1 * c2 * s3,
            c1 * c2 * s3 - s1 * s2 * c3,
            c1 * c2 * c3 + s1 * s2 * s3,
        ),
        EulerOrder::Zxy => (
            s1 * c2 * c3 - c1 * s2 * s3,
            c1 * s2 * c3 + s1 * c2 * s3,
            c1 * c2 * s3 + s1 * s2 * c3,
            c1 * c2 * c3 - s1 * s2 * s3,
        ),
        EulerOrder::Zyx => (
            s1 * c2 * c3 - c1 * s2 * s3,
            c1 * s2 * c3 + s1 * c2 * s3,
            c1 * c2 * s3 - s1 * s2 * c3,
            c1 * c2 * c3 + s1 * s2 * s3,
        ),
        EulerOrder::Yzx => (
            s1 * c2 * c3 + c1 * s2 * s3,
            c1 * s2 * c3 + s1 * c2 * s3,
            c1 * c2 * s3 - s1 * s2 * c3,
            c1 * c2 * c3 - s1 * s2 * s3,
        ),
        EulerOrder::Xzy => (
            s1 * c2 * c3 - c1 * s2 * s3,
            c1 * s2 * c3 - s1 * c2 * s3,
            c1 * c2 * s3 + s1 * s2 * c3,
            c1 * c2 * c3 + s1 * s2 * s3,
        ),
    };
    Quaternion::new(w, x, y, z)
}

/// Normalizes a 3-vector; the zero vector is returned unchanged.
pub fn normalize(v: [f32; 3]) -> [f32; 3] {
    let v = Vector3::from(v);
    if v.magnitude2() == 0.0 {
        return v.into();
    }
    v.normalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Matrix, One, Rotation3, SquareMatrix};

    const EPS: f32 = 1e-4;

    fn assert_close(a: &Matrix4<f32>, b: &Matrix4<f32>, eps: f32) {
        let (a, b) = (to_array(a), to_array(b));
        for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            assert!((x - y).abs() <= eps, "element {i}: {x} != {y}");
        }
    }

    fn sample_matrices() -> Vec<Matrix4<f32>> {
        #[rustfmt::skip]
        let skewed = Matrix4::new(
            2.0, 1.0, 0.0, 0.5,
            0.0, 3.0, 1.0, 0.0,
            1.0, 0.0, 4.0, 0.0,
            0.0, 2.0, 0.0, 1.0,
        );
        vec![
            compose(
                Vector3::new(1.0, -2.0, 3.5),
                quaternion_from_euler([0.3, -1.1, 2.0], EulerOrder::Xyz),
                Vector3::new(1.0, 2.0, 0.5),
            ),
            compose(
                Vector3::new(-4.0, 0.0, 9.0),
                Quaternion::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), Deg(75.0)),
                Vector3::new(3.0, 3.0, 3.0),
            ),
            to_wgpu_clip(perspective(Deg(60.0).into(), 1.5, 1.0, 100.0)),
            skewed,
        ]
    }

    #[test]
    fn inverse_times_matrix_is_identity() {
        for m in sample_matrices() {
            assert_close(&(m * invert(&m)), &Matrix4::identity(), EPS);
            assert_close(&(invert(&m) * m), &Matrix4::identity(), EPS);
        }
    }

    #[test]
    fn double_inverse_round_trips() {
        for m in sample_matrices() {
            let scale = to_array(&m).iter().fold(1.0f32, |acc, v| acc.max(v.abs()));
            assert_close(&invert(&invert(&m)), &m, EPS * scale * 10.0);
        }
    }

    #[test]
    fn singular_matrix_inverts_to_zero() {
        #[rustfmt::skip]
        let singular = Matrix4::new(
            1.0, 2.0, 3.0, 4.0,
            2.0, 4.0, 6.0, 8.0,
            0.0, 1.0, 0.0, 1.0,
            1.0, 0.0, 1.0, 0.0,
        );
        let inv = invert(&singular);
        assert!(to_array(&inv).iter().all(|v| *v == 0.0));
        assert!(to_array(&invert(&Matrix4::from_scale(0.0))).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn inverse_matches_cgmath() {
        for m in sample_matrices() {
            let expected = m.invert().expect("sample matrices are invertible");
            assert_close(&invert(&m), &expected, 1e-3);
        }
    }

    #[test]
    fn compose_with_identity_rotation_is_a_pure_translation() {
        let m = compose(Vector3::new(3.0, -7.0, 0.25), Quaternion::one(), Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(m.w, Vector4::new(3.0, -7.0, 0.25, 1.0));
        assert_eq!(m.x, Vector4::unit_x());
        assert_eq!(m.y, Vector4::unit_y());
        assert_eq!(m.z, Vector4::unit_z());
    }

    #[test]
    fn compose_matches_trs_product() {
        let t = Vector3::new(0.5, 1.5, -2.0);
        let r = Quaternion::from_axis_angle(Vector3::new(1.0, 1.0, 0.0).normalize(), Deg(33.0));
        let s = Vector3::new(2.0, 0.5, 1.25);
        let expected = Matrix4::from_translation(t) * Matrix4::from(r) * Matrix4::from_nonuniform_scale(s.x, s.y, s.z);
        assert_close(&compose(t, r, s), &expected, EPS);
        assert_eq!(compose(t, r, s).row(3), Vector4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn perspective_focal_term_is_cotangent() {
        let p = perspective(Deg(90.0).into(), 2.0, 0.5, 10.0);
        assert!((p.y.y - 1.0).abs() < EPS);
        assert!((p.x.x - 0.5).abs() < EPS);
        assert_eq!(p.z.w, -1.0);
        assert_eq!(p.w.w, 0.0);
    }

    #[test]
    fn perspective_maps_near_and_far_planes() {
        let p = to_wgpu_clip(perspective(Deg(60.0).into(), 1.0, 1.0, 100.0));
        let near = p * Vector4::new(0.0, 0.0, -1.0, 1.0);
        let far = p * Vector4::new(0.0, 0.0, -100.0, 1.0);
        assert!((near.z / near.w).abs() < EPS);
        assert!((far.z / far.w - 1.0).abs() < EPS);
    }

    #[test]
    fn euler_single_axis_matches_axis_angle() {
        let orders = [
            EulerOrder::Xyz,
            EulerOrder::Yxz,
            EulerOrder::Zxy,
            EulerOrder::Zyx,
            EulerOrder::Yzx,
            EulerOrder::Xzy,
        ];
        for order in orders {
            let q = quaternion_from_euler([0.0, 0.7, 0.0], order);
            let expected = Quaternion::from_axis_angle(Vector3::unit_y(), Rad(0.7));
            assert!((q.s - expected.s).abs() < EPS && (q.v - expected.v).magnitude() < EPS);
            assert!((q.magnitude() - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn euler_xyz_applies_x_first() {
        let (a, b, c) = (0.4, -0.9, 1.3);
        let q = quaternion_from_euler([a, b, c], EulerOrder::Xyz);
        let expected = Quaternion::from_angle_x(Rad(a)) * Quaternion::from_angle_y(Rad(b)) * Quaternion::from_angle_z(Rad(c));
        assert!((q.s - expected.s).abs() < EPS && (q.v - expected.v).magnitude() < EPS);
    }

    #[test]
    fn strip_translation_keeps_rotation() {
        let m = compose(
            Vector3::new(10.0, 20.0, 30.0),
            Quaternion::from_angle_y(Deg(45.0)),
            Vector3::new(1.0, 1.0, 1.0),
        );
        let r = strip_translation(&m);
        assert_eq!(translation(&r), Vector3::new(0.0, 0.0, 0.0));
        assert_eq!(r.x, m.x);
        assert_eq!(translation(&m), Vector3::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn normalize_handles_zero() {
        assert_eq!(normalize([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
        let n = normalize([1.0, 5.0, 8.0]);
        assert!((Vector3::from(n).magnitude() - 1.0).abs() < EPS);
    }

    #[test]
    fn multiply_is_column_major_product() {
        let a = Matrix4::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let b = Matrix4::from_scale(2.0);
        let p = multiply(&a, &b) * Vector4::new(1.0, 1.0, 1.0, 1.0);
        assert_eq!(p, Vector4::new(3.0, 2.0, 2.0, 1.0));
        assert_eq!(to_array(&a)[12], 1.0);
        assert_eq!(to_array(&a.transpose())[3], 1.0);
    }
}
