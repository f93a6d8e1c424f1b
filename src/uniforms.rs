//! The uniform buffer cache: serialized values for one program's uniform
//! struct, the backing device buffer, and the last-seen value of every
//! uniform for readback and texture-unit lookup at draw time.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::GlError;
use crate::gpu::{Buffer, BufferDescriptor, BufferUsage, Device, Queue};
use crate::translate::UniformBufferLayout;
use crate::types::GlslType;

/// The payload of one `uniform*` entry point call.
#[derive(Copy, Clone, Debug)]
pub(crate) enum UniformPayload<'a> {
    Floats { components: u32, data: &'a [f32] },
    Ints { components: u32, data: &'a [i32] },
    Matrices { dim: u32, data: &'a [f32], transpose: bool },
}

/// The retained value of a uniform, readable back by tests and used to
/// resolve texture units.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum StoredValue {
    Floats(Vec<f32>),
    Ints(Vec<i32>),
}

#[derive(Debug, Default)]
pub(crate) struct UniformStore {
    image: Vec<u8>,
    binding: u32,
    buffer: Option<Arc<dyn Buffer>>,
    dirty: bool,
    values: HashMap<u32, StoredValue>,
    texture_units: HashMap<u32, i32>,
}

impl UniformStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the store for a freshly linked program.
    pub fn configure(&mut self, layout: Option<UniformBufferLayout>) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
        let (size, binding) = match layout {
            Some(layout) => (layout.size as usize, layout.binding),
            None => (0, 0),
        };
        self.image = vec![0; size];
        self.binding = binding;
        self.dirty = true;
        self.values.clear();
        self.texture_units.clear();
    }

    /// Serializes one uniform write. Shape mismatches latch the legacy
    /// error instead of writing.
    pub fn write(
        &mut self,
        ty: &GlslType,
        offset: u32,
        binding: u32,
        payload: UniformPayload<'_>,
    ) -> Result<(), GlError> {
        if ty.is_sampler() {
            let UniformPayload::Ints { components: 1, data } = payload else {
                return Err(GlError::InvalidOperation);
            };
            let unit = *data.first().ok_or(GlError::InvalidValue)?;
            self.texture_units.insert(binding, unit);
            self.values.insert(offset_key(binding, offset), StoredValue::Ints(vec![unit]));
            return Ok(());
        }

        let (elem, count, stride) = match ty {
            GlslType::Array(elem, len) => {
                let provided = payload_elements(&payload, elem)?;
                (
                    elem.as_ref(),
                    provided.min(*len),
                    elem.uniform_array_stride(),
                )
            }
            other => (other, 1, 0),
        };

        for index in 0..count {
            let elem_offset = offset + index * stride;
            write_element(&mut self.image, elem_offset, elem, &payload, index)?;
        }

        self.values
            .insert(offset_key(binding, offset), retain_value(&payload));
        self.dirty = true;
        Ok(())
    }

    pub fn value(&self, binding: u32, offset: u32) -> Option<&StoredValue> {
        self.values.get(&offset_key(binding, offset))
    }

    /// The texture unit last written to the sampler uniform at the given
    /// texture binding; unit 0 when never written.
    pub fn texture_unit(&self, texture_binding: u32) -> i32 {
        self.texture_units
            .get(&texture_binding)
            .copied()
            .unwrap_or(0)
    }

    /// Uploads the image and returns the backing buffer, re-creating it
    /// when the declared size changed.
    pub fn prepare(&mut self, device: &dyn Device) -> Option<Arc<dyn Buffer>> {
        if self.image.is_empty() {
            return None;
        }

        let needs_alloc = self
            .buffer
            .as_ref()
            .is_none_or(|b| b.size() != self.image.len() as u64);
        if needs_alloc {
            if let Some(old) = self.buffer.take() {
                old.destroy();
            }
            self.buffer = Some(device.create_buffer(&BufferDescriptor {
                size: self.image.len() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            }));
            self.dirty = true;
        }

        let buffer = self.buffer.clone()?;
        if self.dirty {
            device.queue().write_buffer(&buffer, 0, &self.image);
            self.dirty = false;
        }
        Some(buffer)
    }

    pub fn binding(&self) -> u32 {
        self.binding
    }
}

fn offset_key(binding: u32, offset: u32) -> u32 {
    // One struct binding plus individual texture bindings; offsets are
    // zero for the latter, so shifting the binding in keeps keys unique.
    (binding << 24) | offset
}

/// Number of whole elements the payload provides for an array element type.
fn payload_elements(payload: &UniformPayload<'_>, elem: &GlslType) -> Result<u32, GlError> {
    let per_elem = elem.components();
    if per_elem == 0 {
        return Err(GlError::InvalidOperation);
    }
    let provided = match payload {
        UniformPayload::Floats { data, .. } => data.len() as u32,
        UniformPayload::Ints { data, .. } => data.len() as u32,
        UniformPayload::Matrices { data, .. } => data.len() as u32,
    };
    Ok(provided / per_elem)
}

fn retain_value(payload: &UniformPayload<'_>) -> StoredValue {
    match payload {
        UniformPayload::Floats { data, .. } => StoredValue::Floats(data.to_vec()),
        UniformPayload::Ints { data, .. } => StoredValue::Ints(data.to_vec()),
        UniformPayload::Matrices { data, .. } => StoredValue::Floats(data.to_vec()),
    }
}

fn write_element(
    image: &mut [u8],
    offset: u32,
    ty: &GlslType,
    payload: &UniformPayload<'_>,
    index: u32,
) -> Result<(), GlError> {
    let components = ty.components();

    match (ty, payload) {
        // Matrices are column-major on the device; mat3 columns pad to 16.
        (
            GlslType::Mat2 | GlslType::Mat3 | GlslType::Mat4,
            UniformPayload::Matrices {
                dim,
                data,
                transpose,
            },
        ) => {
            let n = match ty {
                GlslType::Mat2 => 2,
                GlslType::Mat3 => 3,
                _ => 4,
            };
            if *dim != n {
                return Err(GlError::InvalidOperation);
            }
            let start = (index * n * n) as usize;
            let slice = data
                .get(start..start + (n * n) as usize)
                .ok_or(GlError::InvalidValue)?;
            let col_stride = match ty {
                GlslType::Mat2 => 8,
                _ => 16,
            };
            for col in 0..n {
                if *transpose {
                    for row in 0..n {
                        let value = slice[(row * n + col) as usize];
                        put(image, offset + col * col_stride + row * 4, &value.to_le_bytes())?;
                    }
                } else {
                    let column = &slice[(col * n) as usize..(col * n + n) as usize];
                    put(image, offset + col * col_stride, bytemuck::cast_slice(column))?;
                }
            }
            Ok(())
        }
        (GlslType::Mat2 | GlslType::Mat3 | GlslType::Mat4, _) => Err(GlError::InvalidOperation),

        // Booleans are u32 on the device; both float and int writes count.
        (
            GlslType::Bool | GlslType::BVec2 | GlslType::BVec3 | GlslType::BVec4,
            payload,
        ) => {
            for c in 0..components {
                let truthy = match payload {
                    UniformPayload::Floats {
                        components: pc,
                        data,
                    } => {
                        check_shape(*pc, components)?;
                        *fetch(data, index * components + c)? != 0.0
                    }
                    UniformPayload::Ints {
                        components: pc,
                        data,
                    } => {
                        check_shape(*pc, components)?;
                        *fetch(data, index * components + c)? != 0
                    }
                    UniformPayload::Matrices { .. } => return Err(GlError::InvalidOperation),
                };
                put(image, offset + c * 4, &u32::from(truthy).to_le_bytes())?;
            }
            Ok(())
        }

        (
            GlslType::Float | GlslType::Vec2 | GlslType::Vec3 | GlslType::Vec4,
            UniformPayload::Floats {
                components: pc,
                data,
            },
        ) => {
            check_shape(*pc, components)?;
            let start = (index * components) as usize;
            let values = data
                .get(start..start + components as usize)
                .ok_or(GlError::InvalidValue)?;
            put(image, offset, bytemuck::cast_slice(values))
        }

        (
            GlslType::Int
            | GlslType::Uint
            | GlslType::IVec2
            | GlslType::IVec3
            | GlslType::IVec4
            | GlslType::UVec2
            | GlslType::UVec3
            | GlslType::UVec4,
            UniformPayload::Ints {
                components: pc,
                data,
            },
        ) => {
            check_shape(*pc, components)?;
            let start = (index * components) as usize;
            let values = data
                .get(start..start + components as usize)
                .ok_or(GlError::InvalidValue)?;
            put(image, offset, bytemuck::cast_slice(values))
        }

        _ => Err(GlError::InvalidOperation),
    }
}

fn check_shape(provided: u32, declared: u32) -> Result<(), GlError> {
    if provided == declared {
        Ok(())
    } else {
        Err(GlError::InvalidOperation)
    }
}

fn fetch<T>(data: &[T], index: u32) -> Result<&T, GlError> {
    data.get(index as usize).ok_or(GlError::InvalidValue)
}

fn put(image: &mut [u8], offset: u32, bytes: &[u8]) -> Result<(), GlError> {
    let offset = offset as usize;
    let end = offset + bytes.len();
    if end > image.len() {
        return Err(GlError::InvalidOperation);
    }
    image[offset..end].copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{UniformPayload, UniformStore};
    use crate::error::GlError;
    use crate::translate::UniformBufferLayout;
    use crate::types::GlslType;

    fn store(size: u32) -> UniformStore {
        let mut store = UniformStore::new();
        store.configure(Some(UniformBufferLayout { binding: 0, size }));
        store
    }

    fn floats(store: &UniformStore, offset: usize, count: usize) -> Vec<f32> {
        store.image[offset..offset + count * 4]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn vec3_writes_are_padded_in_place() {
        let mut s = store(32);
        s.write(
            &GlslType::Vec3,
            16,
            0,
            UniformPayload::Floats {
                components: 3,
                data: &[1.0, 2.0, 3.0],
            },
        )
        .unwrap();
        assert_eq!(floats(&s, 16, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn bool_serializes_as_u32() {
        let mut s = store(16);
        s.write(
            &GlslType::Bool,
            0,
            0,
            UniformPayload::Ints {
                components: 1,
                data: &[3],
            },
        )
        .unwrap();
        assert_eq!(&s.image[0..4], &1u32.to_le_bytes());
    }

    #[test]
    fn mat3_columns_pad_to_16_bytes() {
        let mut s = store(48);
        let m: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        s.write(
            &GlslType::Mat3,
            0,
            0,
            UniformPayload::Matrices {
                dim: 3,
                data: &m,
                transpose: false,
            },
        )
        .unwrap();

        // Column 1 lands at byte 16, not 12.
        assert_eq!(floats(&s, 0, 3), vec![1.0, 2.0, 3.0]);
        assert_eq!(floats(&s, 16, 3), vec![4.0, 5.0, 6.0]);
        assert_eq!(floats(&s, 32, 3), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn matrix_transpose_flips_storage_order() {
        let mut s = store(64);
        let m: Vec<f32> = (1..=16).map(|v| v as f32).collect();
        s.write(
            &GlslType::Mat4,
            0,
            0,
            UniformPayload::Matrices {
                dim: 4,
                data: &m,
                transpose: true,
            },
        )
        .unwrap();
        // Row-major input: the first stored column is the first input row.
        assert_eq!(floats(&s, 0, 4), vec![1.0, 5.0, 9.0, 13.0]);
    }

    #[test]
    fn scalar_array_elements_stride_16() {
        let mut s = store(64);
        let ty = GlslType::Array(Box::new(GlslType::Float), 4);
        s.write(
            &ty,
            0,
            0,
            UniformPayload::Floats {
                components: 1,
                data: &[1.0, 2.0, 3.0, 4.0],
            },
        )
        .unwrap();
        assert_eq!(floats(&s, 0, 1), vec![1.0]);
        assert_eq!(floats(&s, 16, 1), vec![2.0]);
        assert_eq!(floats(&s, 48, 1), vec![4.0]);
    }

    #[test]
    fn shape_mismatch_is_invalid_operation() {
        let mut s = store(16);
        let err = s
            .write(
                &GlslType::Vec3,
                0,
                0,
                UniformPayload::Floats {
                    components: 2,
                    data: &[1.0, 2.0],
                },
            )
            .unwrap_err();
        assert_eq!(err, GlError::InvalidOperation);
    }

    #[test]
    fn sampler_write_records_texture_unit() {
        let mut s = store(0);
        s.write(
            &GlslType::Sampler(crate::types::SamplerType::D2),
            0,
            4,
            UniformPayload::Ints {
                components: 1,
                data: &[2],
            },
        )
        .unwrap();
        assert_eq!(s.texture_unit(4), 2);
        assert_eq!(s.texture_unit(9), 0);
    }

    #[test]
    fn round_trip_retains_bit_pattern() {
        let mut s = store(16);
        let data = [0.1f32, -0.0, f32::MIN_POSITIVE, 1234.5678];
        s.write(
            &GlslType::Vec4,
            0,
            0,
            UniformPayload::Floats {
                components: 4,
                data: &data,
            },
        )
        .unwrap();
        let Some(super::StoredValue::Floats(read)) = s.value(0, 0) else {
            panic!("expected retained floats");
        };
        for (a, b) in data.iter().zip(read) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
