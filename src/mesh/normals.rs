use glam::Vec3;

/// Face normals written to every vertex of each triangle. Shared vertices
/// keep the normal of the last triangle that touches them.
pub fn generate_flat_normals_for_mesh(positions: &[Vec3], indices: &[u32]) -> Result<Vec<Vec3>, String> {
    if indices.len() % 3 != 0 {
        return Err("index buffer length must be a multiple of 3 (triangles)".to_string());
    }

    let mut normals = vec![Vec3::ZERO; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let i0 = triangle[0] as usize;
        let i1 = triangle[1] as usize;
        let i2 = triangle[2] as usize;

        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            return Err("index points outside of position buffer".to_string());
        }

        let edge1 = positions[i1] - positions[i0];
        let edge2 = positions[i2] - positions[i0];
        let cross = edge1.cross(edge2);

        let normal = if cross.length_squared() < f32::EPSILON {
            Vec3::Y
        } else {
            cross.normalize()
        };

        normals[i0] = normal;
        normals[i1] = normal;
        normals[i2] = normal;
    }

    Ok(normals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_clockwise_triangle_faces_z() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let normals = generate_flat_normals_for_mesh(&positions, &[0, 1, 2]).unwrap();
        assert_eq!(normals, vec![Vec3::Z; 3]);
    }

    #[test]
    fn degenerate_triangles_point_up() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::X * 2.0];
        let normals = generate_flat_normals_for_mesh(&positions, &[0, 1, 2]).unwrap();
        assert_eq!(normals[0], Vec3::Y);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        assert!(generate_flat_normals_for_mesh(&[Vec3::ZERO], &[0, 1, 2]).is_err());
    }
}
