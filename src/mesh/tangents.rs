use glam::{Vec2, Vec3, Vec4};
use mikktspace::{generate_tangents, Geometry};

pub fn generate_tangents_for_mesh(
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    indices: &[u32],
) -> Result<Vec<Vec4>, String> {
    if positions.len() != normals.len() || positions.len() != uvs.len() {
        return Err("positions, normals, and uvs must have equal length".to_string());
    }
    if indices.len() % 3 != 0 {
        return Err("index buffer length must be a multiple of 3 (triangles)".to_string());
    }
    if indices.iter().any(|&i| i as usize >= positions.len()) {
        return Err("index points outside of position buffer".to_string());
    }

    struct MeshGeometry<'a> {
        positions: &'a [Vec3],
        normals: &'a [Vec3],
        uvs: &'a [Vec2],
        indices: &'a [u32],
        tangents: &'a mut [Vec4],
    }

    impl MeshGeometry<'_> {
        fn vertex(&self, face: usize, vert: usize) -> usize {
            self.indices[face * 3 + vert] as usize
        }
    }

    impl Geometry for MeshGeometry<'_> {
        fn num_faces(&self) -> usize {
            self.indices.len() / 3
        }

        fn num_vertices_of_face(&self, _face: usize) -> usize {
            3
        }

        fn position(&self, face: usize, vert: usize) -> [f32; 3] {
            self.positions[self.vertex(face, vert)].to_array()
        }

        fn normal(&self, face: usize, vert: usize) -> [f32; 3] {
            self.normals[self.vertex(face, vert)].to_array()
        }

        fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2] {
            self.uvs[self.vertex(face, vert)].to_array()
        }

        fn set_tangent_encoded(&mut self, tangent: [f32; 4], face: usize, vert: usize) {
            let idx = self.vertex(face, vert);
            self.tangents[idx] = Vec4::from_array(tangent);
        }
    }

    let mut tangents = vec![Vec4::ZERO; positions.len()];
    let mut geom = MeshGeometry {
        positions,
        normals,
        uvs,
        indices,
        tangents: tangents.as_mut_slice(),
    };

    if !generate_tangents(&mut geom) {
        return Err("mikktspace failed to generate tangents".to_string());
    }

    Ok(tangents)
}
