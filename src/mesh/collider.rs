use std::collections::HashSet;

use glam::Vec3;

use super::{Mesh, Topology};
use crate::settings::ColliderKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_points(points: &[Vec3]) -> Option<Aabb> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Aabb { min, max })
    }

    pub fn fold(boxes: &[Aabb]) -> Option<Aabb> {
        let first = *boxes.first()?;
        Some(boxes.iter().fold(first, |acc, b| Aabb {
            min: acc.min.min(b.min),
            max: acc.max.max(b.max),
        }))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Collider {
    Box { center: Vec3, half_extents: Vec3 },
    /// Triangle soup, three points per face.
    Concave { faces: Vec<Vec3> },
    /// Unique vertices; the host computes the hull.
    Convex { points: Vec<Vec3> },
}

pub fn build_collider(kind: ColliderKind, mesh: &Mesh) -> Option<Collider> {
    match kind {
        ColliderKind::None => None,
        ColliderKind::Box => mesh.aabb().map(|aabb| Collider::Box {
            center: aabb.center(),
            half_extents: aabb.half_extents(),
        }),
        ColliderKind::Concave => {
            let mut faces = Vec::new();
            for surface in &mesh.surfaces {
                match surface.topology {
                    Topology::Triangles => {
                        for triangle in surface.indices.chunks_exact(3) {
                            for &i in triangle {
                                faces.push(surface.positions[i as usize]);
                            }
                        }
                    }
                    Topology::TriangleStrip => {
                        for (n, window) in surface.indices.windows(3).enumerate() {
                            let (a, b, c) = if n % 2 == 0 {
                                (window[0], window[1], window[2])
                            } else {
                                (window[1], window[0], window[2])
                            };
                            faces.extend([a, b, c].map(|i| surface.positions[i as usize]));
                        }
                    }
                    Topology::Points | Topology::Lines | Topology::LineStrip => {}
                }
            }
            (!faces.is_empty()).then_some(Collider::Concave { faces })
        }
        ColliderKind::Convex => {
            let mut seen = HashSet::new();
            let points: Vec<Vec3> = mesh
                .surfaces
                .iter()
                .flat_map(|s| s.positions.iter().copied())
                .filter(|p| seen.insert(p.to_array().map(f32::to_bits)))
                .collect();
            (!points.is_empty()).then_some(Collider::Convex { points })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Surface;
    use super::*;

    fn mesh(positions: Vec<Vec3>, indices: Vec<u32>) -> Mesh {
        Mesh {
            index: 0,
            name: "m".to_owned(),
            surfaces: vec![Surface {
                topology: Topology::Triangles,
                positions,
                normals: None,
                tangents: None,
                uv0: None,
                uv1: None,
                colors: None,
                joints: None,
                weights: None,
                indices,
                blend_shapes: Vec::new(),
                material: None,
            }],
            blend_shape_names: Vec::new(),
            default_weights: Vec::new(),
        }
    }

    #[test]
    fn box_collider_wraps_the_mesh() {
        let m = mesh(vec![Vec3::new(-1.0, 0.0, 0.0), Vec3::new(3.0, 2.0, 0.0), Vec3::new(0.0, 0.0, 4.0)], vec![0, 1, 2]);
        assert_eq!(
            build_collider(ColliderKind::Box, &m),
            Some(Collider::Box {
                center: Vec3::new(1.0, 1.0, 2.0),
                half_extents: Vec3::new(2.0, 1.0, 2.0),
            })
        );
    }

    #[test]
    fn concave_collider_expands_indices() {
        let m = mesh(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 2, 1]);
        assert_eq!(
            build_collider(ColliderKind::Concave, &m),
            Some(Collider::Concave { faces: vec![Vec3::ZERO, Vec3::Y, Vec3::X] })
        );
    }

    #[test]
    fn convex_collider_drops_duplicates() {
        let m = mesh(vec![Vec3::ZERO, Vec3::X, Vec3::ZERO], vec![0, 1, 2]);
        assert_eq!(
            build_collider(ColliderKind::Convex, &m),
            Some(Collider::Convex { points: vec![Vec3::ZERO, Vec3::X] })
        );
    }

    #[test]
    fn no_collider_when_disabled() {
        let m = mesh(vec![Vec3::ZERO], vec![]);
        assert_eq!(build_collider(ColliderKind::None, &m), None);
    }
}
