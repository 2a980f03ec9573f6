//! Vertex input descriptions for the vertex types in `smv-core`.

use ash::vk;
use smv_core::{ColorVertex, TexturedVertex};
use std::mem::{offset_of, size_of};

/// Describes how a vertex type is laid out in a vertex buffer.
pub trait VertexLayout {
    fn binding_description() -> vk::VertexInputBindingDescription;
    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription>;
}

fn per_vertex_binding<T>() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(size_of::<T>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
}

fn attribute(
    location: u32,
    format: vk::Format,
    offset: usize,
) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription::default()
        .binding(0)
        .location(location)
        .format(format)
        .offset(offset as u32)
}

impl VertexLayout for ColorVertex {
    fn binding_description() -> vk::VertexInputBindingDescription {
        per_vertex_binding::<Self>()
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
        ]
    }
}

impl VertexLayout for TexturedVertex {
    fn binding_description() -> vk::VertexInputBindingDescription {
        per_vertex_binding::<Self>()
    }

    fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Self, tex_coord)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary<V: VertexLayout>() -> (u32, Vec<(u32, vk::Format, u32)>) {
        let stride = V::binding_description().stride;
        let attrs = V::attribute_descriptions()
            .iter()
            .map(|a| (a.location, a.format, a.offset))
            .collect();
        (stride, attrs)
    }

    #[test]
    fn color_vertex_layout() {
        let (stride, attrs) = summary::<ColorVertex>();
        assert_eq!(stride, 24);
        assert_eq!(
            attrs,
            vec![
                (0, vk::Format::R32G32B32_SFLOAT, 0),
                (1, vk::Format::R32G32B32_SFLOAT, 12),
            ]
        );
    }

    #[test]
    fn textured_vertex_layout() {
        let (stride, attrs) = summary::<TexturedVertex>();
        assert_eq!(stride, 32);
        assert_eq!(
            attrs,
            vec![
                (0, vk::Format::R32G32B32_SFLOAT, 0),
                (1, vk::Format::R32G32B32_SFLOAT, 12),
                (2, vk::Format::R32G32_SFLOAT, 24),
            ]
        );
    }

    #[test]
    fn bindings_are_per_vertex() {
        let binding = TexturedVertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }
}
