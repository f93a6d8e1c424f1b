//! The closed set of types bridging GLSL and WGSL.
//!
//! Size and alignment follow the uniform storage layout of the target API:
//! scalars align to their size, `vec3` aligns to 16, matrices align to their
//! column vector and array elements inside a uniform block are padded to at
//! least 16 bytes.

use std::sync::Arc;

/// Advances `value` to the next multiple of the power-of-two `align`.
pub const fn round_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

#[derive(Clone, Debug, PartialEq)]
pub enum GlslType {
    Void,
    Bool,
    Int,
    Uint,
    Float,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler(SamplerType),
    Array(Box<GlslType>, u32),
    Struct(Arc<StructType>),
}

/// The dimensionality of a sampler uniform. `U2d` carries a `u32` sample
/// type, every other kind samples as `f32`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SamplerType {
    D1,
    D2,
    D3,
    Cube,
    D2Array,
    U2d,
}

impl SamplerType {
    pub fn wgsl_texture(&self) -> &'static str {
        match self {
            Self::D1 => "texture_1d<f32>",
            Self::D2 => "texture_2d<f32>",
            Self::D3 => "texture_3d<f32>",
            Self::Cube => "texture_cube<f32>",
            Self::D2Array => "texture_2d_array<f32>",
            Self::U2d => "texture_2d<u32>",
        }
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::U2d)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructType {
    /// The name under which the emitter declared this struct in the module.
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: GlslType,
}

impl StructType {
    /// Byte offset of `field`, following field-order layout with each field
    /// padded to its alignment.
    pub fn offset_of(&self, field: &str) -> Option<u32> {
        let mut cursor = 0;
        for f in &self.fields {
            cursor = round_up(cursor, f.ty.align());
            if f.name == field {
                return Some(cursor);
            }
            cursor += f.ty.size();
        }
        None
    }

    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl GlslType {
    pub fn from_glsl_name(name: &str) -> Option<Self> {
        Some(match name {
            "void" => Self::Void,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "uint" => Self::Uint,
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "ivec2" => Self::IVec2,
            "ivec3" => Self::IVec3,
            "ivec4" => Self::IVec4,
            "uvec2" => Self::UVec2,
            "uvec3" => Self::UVec3,
            "uvec4" => Self::UVec4,
            "bvec2" => Self::BVec2,
            "bvec3" => Self::BVec3,
            "bvec4" => Self::BVec4,
            "mat2" => Self::Mat2,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "sampler1D" => Self::Sampler(SamplerType::D1),
            "sampler2D" => Self::Sampler(SamplerType::D2),
            "sampler3D" => Self::Sampler(SamplerType::D3),
            "samplerCube" => Self::Sampler(SamplerType::Cube),
            "sampler2DArray" => Self::Sampler(SamplerType::D2Array),
            "usampler2D" => Self::Sampler(SamplerType::U2d),
            _ => return None,
        })
    }

    /// Alignment in the uniform storage layout.
    pub fn align(&self) -> u32 {
        match self {
            Self::Void => 1,
            Self::Bool | Self::Int | Self::Uint | Self::Float => 4,
            Self::Vec2 | Self::IVec2 | Self::UVec2 | Self::BVec2 => 8,
            Self::Vec3 | Self::Vec4 | Self::IVec3 | Self::IVec4 | Self::UVec3 | Self::UVec4 => 16,
            Self::BVec3 | Self::BVec4 => 16,
            // Matrices align to their column vector.
            Self::Mat2 => 8,
            Self::Mat3 | Self::Mat4 => 16,
            Self::Sampler(_) => 1,
            Self::Array(elem, _) => elem.align().max(16),
            Self::Struct(def) => def
                .fields
                .iter()
                .map(|f| f.ty.align())
                .max()
                .unwrap_or(4),
        }
    }

    /// Size in bytes in the uniform storage layout.
    pub fn size(&self) -> u32 {
        match self {
            Self::Void => 0,
            Self::Bool | Self::Int | Self::Uint | Self::Float => 4,
            Self::Vec2 | Self::IVec2 | Self::UVec2 | Self::BVec2 => 8,
            Self::Vec3 | Self::IVec3 | Self::UVec3 | Self::BVec3 => 12,
            Self::Vec4 | Self::IVec4 | Self::UVec4 | Self::BVec4 => 16,
            Self::Mat2 => 16,
            // Columns of a mat3 are padded vec3s.
            Self::Mat3 => 48,
            Self::Mat4 => 64,
            Self::Sampler(_) => 0,
            Self::Array(elem, len) => elem.uniform_array_stride() * len,
            Self::Struct(def) => {
                let mut cursor = 0;
                for f in &def.fields {
                    cursor = round_up(cursor, f.ty.align());
                    cursor += f.ty.size();
                }
                round_up(cursor, self.align())
            }
        }
    }

    /// The per-element stride when this type is an array element inside a
    /// uniform block: element alignment is at least 16 bytes there.
    pub fn uniform_array_stride(&self) -> u32 {
        round_up(self.size(), self.align().max(16))
    }

    /// `true` if an `array<Self>` in a uniform block needs the padded
    /// element wrapper: the natural WGSL stride of the element is not a
    /// multiple of 16.
    pub fn needs_uniform_pad(&self) -> bool {
        round_up(self.size(), self.align()) % 16 != 0
    }

    /// The WGSL spelling of this type.
    ///
    /// Booleans inside uniform blocks are not host-shareable; callers that
    /// declare uniform struct members use [`Self::wgsl_uniform`] instead.
    pub fn wgsl(&self) -> String {
        match self {
            Self::Void => "void".into(),
            Self::Bool => "bool".into(),
            Self::Int => "i32".into(),
            Self::Uint => "u32".into(),
            Self::Float => "f32".into(),
            Self::Vec2 => "vec2f".into(),
            Self::Vec3 => "vec3f".into(),
            Self::Vec4 => "vec4f".into(),
            Self::IVec2 => "vec2i".into(),
            Self::IVec3 => "vec3i".into(),
            Self::IVec4 => "vec4i".into(),
            Self::UVec2 => "vec2u".into(),
            Self::UVec3 => "vec3u".into(),
            Self::UVec4 => "vec4u".into(),
            Self::BVec2 => "vec2<bool>".into(),
            Self::BVec3 => "vec3<bool>".into(),
            Self::BVec4 => "vec4<bool>".into(),
            Self::Mat2 => "mat2x2f".into(),
            Self::Mat3 => "mat3x3f".into(),
            Self::Mat4 => "mat4x4f".into(),
            Self::Sampler(kind) => kind.wgsl_texture().into(),
            Self::Array(elem, len) => format!("array<{}, {}>", elem.wgsl(), len),
            Self::Struct(def) => def.name.clone(),
        }
    }

    /// The WGSL spelling when declared as a uniform struct member: `bool`
    /// becomes `u32` (0 or 1) on the device.
    pub fn wgsl_uniform(&self) -> String {
        match self {
            Self::Bool => "u32".into(),
            Self::Array(elem, len) if elem.needs_uniform_pad() => {
                format!("array<{}, {}>", pad_wrapper_name(elem), len)
            }
            Self::Array(elem, len) => format!("array<{}, {}>", elem.wgsl_uniform(), len),
            other => other.wgsl(),
        }
    }

    pub const fn is_sampler(&self) -> bool {
        matches!(self, Self::Sampler(_))
    }

    pub const fn is_matrix(&self) -> bool {
        matches!(self, Self::Mat2 | Self::Mat3 | Self::Mat4)
    }

    pub const fn is_vector(&self) -> bool {
        matches!(
            self,
            Self::Vec2
                | Self::Vec3
                | Self::Vec4
                | Self::IVec2
                | Self::IVec3
                | Self::IVec4
                | Self::UVec2
                | Self::UVec3
                | Self::UVec4
                | Self::BVec2
                | Self::BVec3
                | Self::BVec4
        )
    }

    /// Component count: 1 for scalars, N for vectors, columns·rows for
    /// matrices.
    pub const fn components(&self) -> u32 {
        match self {
            Self::Bool | Self::Int | Self::Uint | Self::Float => 1,
            Self::Vec2 | Self::IVec2 | Self::UVec2 | Self::BVec2 => 2,
            Self::Vec3 | Self::IVec3 | Self::UVec3 | Self::BVec3 => 3,
            Self::Vec4 | Self::IVec4 | Self::UVec4 | Self::BVec4 => 4,
            Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
            _ => 0,
        }
    }

    /// The scalar type of a vector, or the column type of a matrix.
    pub fn element(&self) -> Option<GlslType> {
        Some(match self {
            Self::Vec2 | Self::Vec3 | Self::Vec4 => Self::Float,
            Self::IVec2 | Self::IVec3 | Self::IVec4 => Self::Int,
            Self::UVec2 | Self::UVec3 | Self::UVec4 => Self::Uint,
            Self::BVec2 | Self::BVec3 | Self::BVec4 => Self::Bool,
            Self::Mat2 => Self::Vec2,
            Self::Mat3 => Self::Vec3,
            Self::Mat4 => Self::Vec4,
            Self::Array(elem, _) => (**elem).clone(),
            _ => return None,
        })
    }

    /// The vector type with the same scalar kind as `self` and `len`
    /// components. Returns the scalar itself for `len == 1`.
    pub fn vector_of(&self, len: u32) -> Option<GlslType> {
        let scalar = if self.is_vector() {
            self.element()?
        } else {
            self.clone()
        };
        Some(match (scalar, len) {
            (s, 1) => s,
            (Self::Float, 2) => Self::Vec2,
            (Self::Float, 3) => Self::Vec3,
            (Self::Float, 4) => Self::Vec4,
            (Self::Int, 2) => Self::IVec2,
            (Self::Int, 3) => Self::IVec3,
            (Self::Int, 4) => Self::IVec4,
            (Self::Uint, 2) => Self::UVec2,
            (Self::Uint, 3) => Self::UVec3,
            (Self::Uint, 4) => Self::UVec4,
            (Self::Bool, 2) => Self::BVec2,
            (Self::Bool, 3) => Self::BVec3,
            (Self::Bool, 4) => Self::BVec4,
            _ => return None,
        })
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }
}

/// Name of the padded element wrapper struct the emitter declares for
/// uniform arrays whose element stride is not a multiple of 16.
pub fn pad_wrapper_name(elem: &GlslType) -> String {
    format!("_Pad_{}", elem.wgsl().replace(['<', '>'], "_"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{round_up, GlslType, StructField, StructType};

    #[test]
    fn round_up_advances_to_next_multiple() {
        assert_eq!(round_up(0, 16), 0);
        assert_eq!(round_up(1, 16), 16);
        assert_eq!(round_up(16, 16), 16);
        assert_eq!(round_up(17, 8), 24);
    }

    #[test]
    fn vec3_aligns_to_16() {
        assert_eq!(GlslType::Vec3.align(), 16);
        assert_eq!(GlslType::Vec3.size(), 12);
    }

    #[test]
    fn matrices_align_to_column_vector() {
        assert_eq!(GlslType::Mat2.align(), 8);
        assert_eq!(GlslType::Mat2.size(), 16);
        assert_eq!(GlslType::Mat3.align(), 16);
        assert_eq!(GlslType::Mat3.size(), 48);
        assert_eq!(GlslType::Mat4.size(), 64);
    }

    #[test]
    fn uniform_array_elements_pad_to_16() {
        let floats = GlslType::Array(Box::new(GlslType::Float), 4);
        assert_eq!(floats.size(), 64);
        assert_eq!(floats.align(), 16);
        assert!(GlslType::Float.needs_uniform_pad());
        assert!(!GlslType::Vec4.needs_uniform_pad());
        assert!(!GlslType::Mat2.needs_uniform_pad());
    }

    #[test]
    fn struct_fields_pad_to_field_alignment() {
        let def = Arc::new(StructType {
            name: "Light".into(),
            fields: vec![
                StructField {
                    name: "intensity".into(),
                    ty: GlslType::Float,
                },
                StructField {
                    name: "direction".into(),
                    ty: GlslType::Vec3,
                },
            ],
        });

        assert_eq!(def.offset_of("intensity"), Some(0));
        assert_eq!(def.offset_of("direction"), Some(16));
        let ty = GlslType::Struct(def);
        assert_eq!(ty.align(), 16);
        assert_eq!(ty.size(), 32);
    }

    #[test]
    fn bool_uniform_members_become_u32() {
        assert_eq!(GlslType::Bool.wgsl_uniform(), "u32");
        assert_eq!(GlslType::Bool.wgsl(), "bool");
    }
}
