//! Location and binding assignment across the two shader stages.

use hashbrown::{HashMap, HashSet};

use super::{
    AttributeInfo, StageData, TextureInfo, UniformBufferLayout, UniformInfo, VaryingInfo,
};
use crate::error::Error;
use crate::types::{round_up, GlslType};

#[derive(Debug)]
pub(crate) struct LinkedModule {
    pub vertex: StageData,
    pub fragment: StageData,
    pub attributes: Vec<AttributeInfo>,
    pub varyings: Vec<VaryingInfo>,
    pub uniforms: Vec<UniformInfo>,
    pub textures: Vec<TextureInfo>,
    pub uniform_buffer: Option<UniformBufferLayout>,
}

pub(crate) fn link(vertex: StageData, fragment: StageData) -> Result<LinkedModule, Error> {
    let attributes = assign_attribute_locations(&vertex)?;
    let varyings = match_varyings(&vertex, &fragment)?;

    for attribute in &attributes {
        if varyings.iter().any(|v| v.name == attribute.name) {
            return Err(Error::translation(
                format!(
                    "name {} is declared both as an attribute and a varying",
                    attribute.name
                ),
                Vec::new(),
            ));
        }
    }

    let (uniforms, textures, uniform_buffer) = assign_uniform_bindings(&vertex, &fragment)?;

    Ok(LinkedModule {
        vertex,
        fragment,
        attributes,
        varyings,
        uniforms,
        textures,
        uniform_buffer,
    })
}

/// Vertex-input locations are assigned in source order, starting at 0,
/// skipping any locations already taken by an explicit `layout`.
fn assign_attribute_locations(vertex: &StageData) -> Result<Vec<AttributeInfo>, Error> {
    let mut taken = HashSet::new();
    for (name, _, pinned) in &vertex.attributes {
        if let Some(location) = pinned {
            if !taken.insert(*location) {
                return Err(Error::translation(
                    format!("attribute {name} pins already-taken location {location}"),
                    Vec::new(),
                ));
            }
        }
    }

    let mut attributes = Vec::with_capacity(vertex.attributes.len());
    for (name, ty, pinned) in &vertex.attributes {
        let location = match pinned {
            Some(location) => *location,
            None => {
                let mut candidate = 0;
                while taken.contains(&candidate) {
                    candidate += 1;
                }
                taken.insert(candidate);
                candidate
            }
        };
        attributes.push(AttributeInfo {
            name: name.clone(),
            location,
            ty: ty.clone(),
        });
    }
    Ok(attributes)
}

/// Varyings are matched by name across stages. The vertex stage drives
/// location order; fragment-only varyings are appended after.
fn match_varyings(vertex: &StageData, fragment: &StageData) -> Result<Vec<VaryingInfo>, Error> {
    let mut varyings: Vec<VaryingInfo> = Vec::new();

    for (name, ty) in &vertex.varyings {
        let location = varyings.len() as u32;
        varyings.push(VaryingInfo {
            name: name.clone(),
            ty: ty.clone(),
            location,
        });
    }

    for (name, ty) in &fragment.varyings {
        match varyings.iter().find(|v| &v.name == name) {
            Some(existing) => {
                if &existing.ty != ty {
                    return Err(Error::translation(
                        format!(
                            "varying {name} is declared as {:?} in the vertex shader but {:?} in the fragment shader",
                            existing.ty, ty
                        ),
                        Vec::new(),
                    ));
                }
            }
            None => {
                let location = varyings.len() as u32;
                varyings.push(VaryingInfo {
                    name: name.clone(),
                    ty: ty.clone(),
                    location,
                });
            }
        }
    }

    Ok(varyings)
}

type UniformTables = (Vec<UniformInfo>, Vec<TextureInfo>, Option<UniformBufferLayout>);

/// Uniform bindings are assigned in source order, vertex stage first. Each
/// sampler takes two consecutive bindings (texture, companion sampler); the
/// first non-sampler uniform allocates the single struct binding and all
/// later non-samplers become fields of that struct.
fn assign_uniform_bindings(
    vertex: &StageData,
    fragment: &StageData,
) -> Result<UniformTables, Error> {
    let mut merged: Vec<(String, GlslType)> = Vec::new();
    let mut seen: HashMap<String, GlslType> = HashMap::new();

    for (name, ty) in vertex.uniforms.iter().chain(&fragment.uniforms) {
        match seen.get(name) {
            Some(existing) => {
                // Struct types collected per stage carry stage-mangled
                // names; compare by layout instead of identity.
                if existing.size() != ty.size() || existing.align() != ty.align() {
                    return Err(Error::translation(
                        format!(
                            "uniform {name} is declared with mismatched types across stages"
                        ),
                        Vec::new(),
                    ));
                }
            }
            None => {
                seen.insert(name.clone(), ty.clone());
                merged.push((name.clone(), ty.clone()));
            }
        }
    }

    let mut uniforms = Vec::new();
    let mut textures = Vec::new();
    let mut next_binding = 0;
    let mut struct_binding = None;
    let mut cursor = 0;

    for (name, ty) in merged {
        if let GlslType::Sampler(sampler) = ty {
            textures.push(TextureInfo {
                name,
                sampler,
                binding: next_binding,
                sampler_binding: next_binding + 1,
            });
            next_binding += 2;
            continue;
        }

        let binding = *struct_binding.get_or_insert_with(|| {
            let binding = next_binding;
            next_binding += 1;
            binding
        });

        cursor = round_up(cursor, ty.align().max(16));
        uniforms.push(UniformInfo {
            name,
            offset: cursor,
            binding,
            ty: ty.clone(),
        });
        cursor += ty.size();
    }

    let uniform_buffer = struct_binding.map(|binding| UniformBufferLayout {
        binding,
        size: round_up(cursor, 16),
    });

    Ok((uniforms, textures, uniform_buffer))
}
