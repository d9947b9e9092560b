// The compiled-in quad: four textured, vertex-coloured corners drawn as two
// triangles.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::mem::{offset_of, size_of};

/// Interleaved vertex: 2D position, RGB colour, texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    const fn new(position: [f32; 2], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position: Vec2::from_array(position),
            color: Vec3::from_array(color),
            uv: Vec2::from_array(uv),
        }
    }

    /// One binding, advanced per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    /// Locations 0..=2 match the vertex shader inputs
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(location)
                .format(format)
                .offset(offset as u32)
                .build()
        };

        [
            attribute(0, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
            attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
        ]
    }
}

pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
    Vertex::new([0.5, -0.5], [1.0, 1.0, 0.0], [0.0, 0.0]),
    Vertex::new([0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
    Vertex::new([-0.5, 0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

pub const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 28);
        assert_eq!(Vertex::binding_description().stride, 28);

        let offsets: Vec<u32> = Vertex::attribute_descriptions()
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 8, 20]);
    }

    #[test]
    fn indices_form_two_triangles_over_all_corners() {
        assert_eq!(QUAD_INDICES.len() % 3, 0);
        for corner in 0..QUAD_VERTICES.len() as u16 {
            assert!(QUAD_INDICES.contains(&corner), "corner {} unused", corner);
        }
        assert!(QUAD_INDICES
            .iter()
            .all(|&i| (i as usize) < QUAD_VERTICES.len()));
    }

    #[test]
    fn vertex_bytes_match_buffer_size() {
        let bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        assert_eq!(bytes.len(), 4 * size_of::<Vertex>());
    }
}
