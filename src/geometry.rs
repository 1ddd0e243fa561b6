//! Procedural meshes for the demo scenes. All shapes are centred on the origin
//! and wound counter-clockwise when seen from outside.

use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::model::{MeshData, Vertex};

pub fn box_mesh(width: f32, height: f32, depth: f32) -> MeshData {
    let half = Vec3::new(width, height, depth) * 0.5;

    // (normal, u, v) with u x v == normal
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u, v) in faces {
        let base = vertices.len() as u32;

        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = (normal + u * su + v * sv) * half;
            vertices.push(Vertex::new(position, normal));
        }

        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    MeshData::triangles(format!("Box {width}x{height}x{depth}"), vertices, indices)
}

pub fn sphere_mesh(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let width_segments = width_segments.max(3);
    let height_segments = height_segments.max(2);
    let row = width_segments + 1;

    let mut vertices = Vec::with_capacity((row * (height_segments + 1)) as usize);
    for iy in 0..=height_segments {
        let v = iy as f32 / height_segments as f32;

        for ix in 0..=width_segments {
            let u = ix as f32 / width_segments as f32;
            let normal = Vec3::new(
                -(u * TAU).cos() * (v * PI).sin(),
                (v * PI).cos(),
                (u * TAU).sin() * (v * PI).sin(),
            );
            vertices.push(Vertex::new(normal * radius, normal));
        }
    }

    let mut indices = Vec::new();
    for iy in 0..height_segments {
        for ix in 0..width_segments {
            let a = iy * row + ix + 1;
            let b = iy * row + ix;
            let c = (iy + 1) * row + ix;
            let d = (iy + 1) * row + ix + 1;

            if iy != 0 {
                indices.extend_from_slice(&[a, b, d]);
            }
            if iy != height_segments - 1 {
                indices.extend_from_slice(&[b, c, d]);
            }
        }
    }

    MeshData::triangles(format!("Sphere r={radius}"), vertices, indices)
}

/// Flat-shaded cone with its apex on +Y, like a pyramid roof for low segment counts.
pub fn cone_mesh(radius: f32, height: f32, radial_segments: u32) -> MeshData {
    let radial_segments = radial_segments.max(3);
    let apex = Vec3::new(0.0, height * 0.5, 0.0);
    let base_center = Vec3::new(0.0, -height * 0.5, 0.0);

    let rim = |i: u32| {
        let theta = i as f32 / radial_segments as f32 * TAU;
        Vec3::new(radius * theta.sin(), -height * 0.5, radius * theta.cos())
    };

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for i in 0..radial_segments {
        let (left, right) = (rim(i), rim(i + 1));

        let side_normal = (left - apex).cross(right - apex).normalize_or_zero();
        let base = vertices.len() as u32;
        vertices.extend([apex, left, right].map(|p| Vertex::new(p, side_normal)));
        indices.extend_from_slice(&[base, base + 1, base + 2]);

        let base = vertices.len() as u32;
        vertices.extend([base_center, right, left].map(|p| Vertex::new(p, Vec3::NEG_Y)));
        indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    MeshData::triangles(
        format!("Cone r={radius} h={height} n={radial_segments}"),
        vertices,
        indices,
    )
}

/// Square line grid on the XZ plane.
pub fn grid_mesh(size: f32, divisions: u32) -> MeshData {
    let divisions = divisions.max(1);
    let half = size * 0.5;
    let step = size / divisions as f32;

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for i in 0..=divisions {
        let k = -half + i as f32 * step;

        for (start, end) in [
            (Vec3::new(-half, 0.0, k), Vec3::new(half, 0.0, k)),
            (Vec3::new(k, 0.0, -half), Vec3::new(k, 0.0, half)),
        ] {
            let base = vertices.len() as u32;
            vertices.push(Vertex::new(start, Vec3::Y));
            vertices.push(Vertex::new(end, Vec3::Y));
            indices.extend_from_slice(&[base, base + 1]);
        }
    }

    MeshData::lines(format!("Grid {size}/{divisions}"), vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Topology;

    fn assert_outward_winding(mesh: &MeshData) {
        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]]
                .map(|i| mesh.vertices[i as usize].position);
            let face_normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;

            if face_normal.length_squared() > 1e-10 {
                assert!(
                    face_normal.dot(centroid) > 0.0,
                    "triangle {triangle:?} of {} faces inwards",
                    mesh.name
                );
            }
        }
    }

    #[test]
    fn box_has_expected_extents() {
        let mesh = box_mesh(20.0, 0.01, 20.0);

        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);

        let max = mesh
            .vertices
            .iter()
            .fold(Vec3::splat(f32::MIN), |acc, v| acc.max(v.position));
        assert!(max.abs_diff_eq(Vec3::new(10.0, 0.005, 10.0), 1e-6));
    }

    #[test]
    fn closed_shapes_wind_outwards() {
        assert_outward_winding(&box_mesh(1.0, 2.0, 3.0));
        assert_outward_winding(&sphere_mesh(0.5, 16, 8));
        assert_outward_winding(&cone_mesh(1.0, 0.7, 4));
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let mesh = sphere_mesh(0.5, 24, 12);

        for vertex in &mesh.vertices {
            assert!((vertex.position.length() - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn grid_is_made_of_lines() {
        let mesh = grid_mesh(10.0, 10);

        assert_eq!(mesh.topology, Topology::Lines);
        assert_eq!(mesh.indices.len(), 11 * 2 * 2);
        assert!(mesh.vertices.iter().all(|v| v.position.y == 0.0));
    }
}
