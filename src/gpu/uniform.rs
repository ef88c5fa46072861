//! Uniform type tags and the setters that pack values into WGSL uniform blocks.

use crate::data_structures::texture::Texture;

/// What a sampler uniform expects to be bound to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureKind {
    pub dimension: wgpu::TextureViewDimension,
    pub sample_type: wgpu::TextureSampleType,
    pub comparison: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    UInt,
    UVec2,
    UVec3,
    UVec4,
    Sampler(TextureKind),
}

impl UniformType {
    /// Byte size in the uniform address space.
    pub fn size(&self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::UInt => 4,
            Self::Vec2 | Self::IVec2 | Self::UVec2 => 8,
            Self::Vec3 | Self::IVec3 | Self::UVec3 => 12,
            Self::Vec4 | Self::IVec4 | Self::UVec4 => 16,
            Self::Mat2 => 16,
            Self::Mat3 => 48,
            Self::Mat4 => 64,
            Self::Sampler(_) => 0,
        }
    }

    pub fn is_sampler(&self) -> bool {
        matches!(self, Self::Sampler(_))
    }

    pub fn name(&self) -> String {
        match self {
            Self::Sampler(kind) => format!("sampler {:?}", kind.dimension),
            other => format!("{other:?}").to_lowercase(),
        }
    }
}

/// A value handed to `ShaderProgram::set_uniform`.
#[derive(Clone, Copy, Debug)]
pub enum UniformValue<'a> {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat2([[f32; 2]; 2]),
    Mat3([[f32; 3]; 3]),
    Mat4([[f32; 4]; 4]),
    Floats(&'a [f32]),
    Int(i32),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    Ints(&'a [i32]),
    UInt(u32),
    UVec2([u32; 2]),
    UVec3([u32; 3]),
    UVec4([u32; 4]),
    Bool(bool),
    Texture(&'a Texture),
}

impl UniformValue<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Mat2(_) => "mat2",
            Self::Mat3(_) => "mat3",
            Self::Mat4(_) => "mat4",
            Self::Floats(_) => "float array",
            Self::Int(_) => "int",
            Self::IVec2(_) => "ivec2",
            Self::IVec3(_) => "ivec3",
            Self::IVec4(_) => "ivec4",
            Self::Ints(_) => "int array",
            Self::UInt(_) => "uint",
            Self::UVec2(_) => "uvec2",
            Self::UVec3(_) => "uvec3",
            Self::UVec4(_) => "uvec4",
            Self::Bool(_) => "bool",
            Self::Texture(_) => "texture",
        }
    }

    /// Component count of one element plus the raw data. `0` accepts any element size.
    fn floats(&self) -> Option<(usize, &[f32])> {
        Some(match self {
            Self::Float(v) => (1, std::slice::from_ref(v)),
            Self::Vec2(v) => (2, v.as_slice()),
            Self::Vec3(v) => (3, v.as_slice()),
            Self::Vec4(v) => (4, v.as_slice()),
            Self::Mat2(m) => (4, m.as_flattened()),
            Self::Mat3(m) => (9, m.as_flattened()),
            Self::Mat4(m) => (16, m.as_flattened()),
            Self::Floats(v) => (0, *v),
            _ => return None,
        })
    }

    fn words(&self, signed: bool) -> Option<(usize, Vec<u32>)> {
        fn cast(v: &[i32]) -> Vec<u32> {
            v.iter().map(|x| *x as u32).collect()
        }
        Some(match (self, signed) {
            (Self::Bool(b), _) => (1, vec![*b as u32]),
            (Self::Int(v), true) => (1, vec![*v as u32]),
            (Self::IVec2(v), true) => (2, cast(v)),
            (Self::IVec3(v), true) => (3, cast(v)),
            (Self::IVec4(v), true) => (4, cast(v)),
            (Self::Ints(v), _) => (0, cast(v)),
            (Self::UInt(v), false) => (1, vec![*v]),
            (Self::UVec2(v), false) => (2, v.to_vec()),
            (Self::UVec3(v), false) => (3, v.to_vec()),
            (Self::UVec4(v), false) => (4, v.to_vec()),
            _ => return None,
        })
    }
}

impl From<f32> for UniformValue<'_> {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<[f32; 2]> for UniformValue<'_> {
    fn from(v: [f32; 2]) -> Self {
        Self::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue<'_> {
    fn from(v: [f32; 3]) -> Self {
        Self::Vec3(v)
    }
}

impl From<[f32; 4]> for UniformValue<'_> {
    fn from(v: [f32; 4]) -> Self {
        Self::Vec4(v)
    }
}

impl From<i32> for UniformValue<'_> {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for UniformValue<'_> {
    fn from(v: u32) -> Self {
        Self::UInt(v)
    }
}

impl From<bool> for UniformValue<'_> {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<cgmath::Vector3<f32>> for UniformValue<'_> {
    fn from(v: cgmath::Vector3<f32>) -> Self {
        Self::Vec3(v.into())
    }
}

impl From<cgmath::Point3<f32>> for UniformValue<'_> {
    fn from(v: cgmath::Point3<f32>) -> Self {
        Self::Vec3(v.into())
    }
}

impl From<cgmath::Vector4<f32>> for UniformValue<'_> {
    fn from(v: cgmath::Vector4<f32>) -> Self {
        Self::Vec4(v.into())
    }
}

impl From<cgmath::Matrix3<f32>> for UniformValue<'_> {
    fn from(m: cgmath::Matrix3<f32>) -> Self {
        Self::Mat3(m.into())
    }
}

impl From<cgmath::Matrix4<f32>> for UniformValue<'_> {
    fn from(m: cgmath::Matrix4<f32>) -> Self {
        Self::Mat4(m.into())
    }
}

impl<'a> From<&'a [f32]> for UniformValue<'a> {
    fn from(v: &'a [f32]) -> Self {
        Self::Floats(v)
    }
}

impl<'a> From<&'a Texture> for UniformValue<'a> {
    fn from(t: &'a Texture) -> Self {
        Self::Texture(t)
    }
}

/// Writes a value into the bytes of one uniform. `stride` is the array stride, 0 for
/// non-array uniforms. Returns `None` when the value does not fit the uniform's type.
pub type Setter = fn(&mut [u8], u32, &UniformValue) -> Option<()>;

/// The setter bound to a type tag. Samplers have none: they go through texture units.
pub fn setter_for(ty: UniformType) -> Option<Setter> {
    Some(match ty {
        UniformType::Float => set_floats::<1, 1>,
        UniformType::Vec2 => set_floats::<1, 2>,
        UniformType::Vec3 => set_floats::<1, 3>,
        UniformType::Vec4 => set_floats::<1, 4>,
        UniformType::Mat2 => set_floats::<2, 2>,
        UniformType::Mat3 => set_floats::<3, 3>,
        UniformType::Mat4 => set_floats::<4, 4>,
        UniformType::Int => set_words::<1, true>,
        UniformType::IVec2 => set_words::<2, true>,
        UniformType::IVec3 => set_words::<3, true>,
        UniformType::IVec4 => set_words::<4, true>,
        UniformType::UInt => set_words::<1, false>,
        UniformType::UVec2 => set_words::<2, false>,
        UniformType::UVec3 => set_words::<3, false>,
        UniformType::UVec4 => set_words::<4, false>,
        UniformType::Sampler(_) => return None,
    })
}

fn set_floats<const COLUMNS: usize, const ROWS: usize>(
    dst: &mut [u8],
    stride: u32,
    value: &UniformValue,
) -> Option<()> {
    let (components, data) = value.floats()?;
    let per_element = COLUMNS * ROWS;
    if components != 0 && components != per_element {
        return None;
    }
    // vec2 columns pack at 8 bytes, vec3 and vec4 columns at 16
    let column_stride = if ROWS == 2 { 8 } else { 16 };
    write_elements(
        dst,
        ROWS,
        column_stride,
        per_element,
        stride as usize,
        bytemuck::cast_slice(data),
    )
}

fn set_words<const N: usize, const SIGNED: bool>(
    dst: &mut [u8],
    stride: u32,
    value: &UniformValue,
) -> Option<()> {
    let (components, data) = value.words(SIGNED)?;
    if components != 0 && components != N {
        return None;
    }
    write_elements(dst, N, 16, N, stride as usize, &data)
}

fn write_elements(
    dst: &mut [u8],
    rows: usize,
    column_stride: usize,
    per_element: usize,
    stride: usize,
    words: &[u32],
) -> Option<()> {
    if words.is_empty() || words.len() % per_element != 0 {
        return None;
    }
    let elements = words.len() / per_element;
    if elements > 1 && stride == 0 {
        return None;
    }
    // the whole value must fit before anything is written
    let columns = per_element / rows;
    let end = (elements - 1) * stride + (columns - 1) * column_stride + rows * 4;
    if end > dst.len() {
        return None;
    }
    for (e, element) in words.chunks(per_element).enumerate() {
        for (c, column) in element.chunks(rows).enumerate() {
            let at = e * stride + c * column_stride;
            let bytes: &[u8] = bytemuck::cast_slice(column);
            dst.get_mut(at..at + bytes.len())?.copy_from_slice(bytes);
        }
    }
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytemuck::cast_slice(bytes).to_vec()
    }

    #[test]
    fn vec3_fills_twelve_bytes() {
        let mut block = vec![0u8; 16];
        let set = setter_for(UniformType::Vec3).unwrap();
        set(&mut block, 0, &[1.0f32, 2.0, 3.0].into()).unwrap();
        assert_eq!(floats(&block), vec![1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let mut block = vec![0u8; 48];
        let set = setter_for(UniformType::Mat3).unwrap();
        let m = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        set(&mut block, 0, &UniformValue::Mat3(m)).unwrap();
        assert_eq!(
            floats(&block),
            vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0, 7.0, 8.0, 9.0, 0.0]
        );
    }

    #[test]
    fn mat2_columns_are_tight() {
        let mut block = vec![0u8; 16];
        let set = setter_for(UniformType::Mat2).unwrap();
        set(&mut block, 0, &UniformValue::Mat2([[1.0, 2.0], [3.0, 4.0]])).unwrap();
        assert_eq!(floats(&block), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn mat4_from_cgmath_is_column_major() {
        let mut block = vec![0u8; 64];
        let set = setter_for(UniformType::Mat4).unwrap();
        let m = cgmath::Matrix4::from_translation(cgmath::Vector3::new(1.0f32, 2.0, 3.0));
        set(&mut block, 0, &m.into()).unwrap();
        assert_eq!(&floats(&block)[12..], &[1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn float_arrays_use_the_stride() {
        let mut block = vec![0u8; 48];
        let set = setter_for(UniformType::Float).unwrap();
        let data = [1.0f32, 2.0, 3.0];
        set(&mut block, 16, &UniformValue::Floats(&data)).unwrap();
        let f = floats(&block);
        assert_eq!((f[0], f[4], f[8]), (1.0, 2.0, 3.0));
    }

    #[test]
    fn bool_packs_as_int() {
        let mut block = vec![0u8; 4];
        let set = setter_for(UniformType::Int).unwrap();
        set(&mut block, 0, &true.into()).unwrap();
        assert_eq!(u32::from_le_bytes(block.try_into().unwrap()), 1);
    }

    #[test]
    fn mismatched_values_are_rejected() {
        let mut block = vec![0u8; 64];
        assert!(setter_for(UniformType::Vec3).unwrap()(&mut block, 0, &1.0f32.into()).is_none());
        assert!(setter_for(UniformType::UInt).unwrap()(&mut block, 0, &(-1i32).into()).is_none());
        assert!(setter_for(UniformType::Float).unwrap()(&mut block[..2], 0, &1.0f32.into()).is_none());
        assert!(setter_for(UniformType::Sampler(TextureKind {
            dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            comparison: false,
        }))
        .is_none());
    }
}
