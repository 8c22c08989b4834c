//! Mesh data structures and primitive generation
//!
//! Primitives are unit sized and centred on the origin with +Z up; a visual's
//! scale stretches them to their final dimensions.

use bytemuck::{Pod, Zeroable};
use glam::{DVec3, Vec2, Vec3};

use crate::math::Aabb;

/// Standard vertex with position, normal and UV
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// A triangle mesh with vertex and index data
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Bounds of the vertex positions.
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::EMPTY;
        for v in &self.vertices {
            aabb.grow(v.position.as_dvec3());
        }
        aabb
    }

    /// Corner positions of triangle `i`.
    pub fn triangle(&self, i: usize) -> [DVec3; 3] {
        let idx = &self.indices[i * 3..i * 3 + 3];
        [
            self.vertices[idx[0] as usize].position.as_dvec3(),
            self.vertices[idx[1] as usize].position.as_dvec3(),
            self.vertices[idx[2] as usize].position.as_dvec3(),
        ]
    }

    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3) {
        let base = self.vertices.len() as u32;
        let uvs = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];
        for (position, uv) in corners.into_iter().zip(uvs) {
            self.vertices.push(Vertex::new(position, normal, uv));
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Unit cube centred at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("box");
        let h = 0.5;
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (-Vec3::X, -Vec3::Y, Vec3::Z),
            (Vec3::Y, -Vec3::X, Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::Y, -Vec3::X),
            (-Vec3::Z, Vec3::Y, Vec3::X),
        ];
        // Each face is spanned by (normal, u, v) with u x v == normal.
        for (normal, u, v) in faces {
            let c = normal * h;
            let (u, v) = (u * h, v * h);
            mesh.push_quad([c - u - v, c + u - v, c + u + v, c - u + v], normal);
        }
        mesh
    }

    /// UV sphere of diameter 1
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");
        let segments = segments.max(3);
        let rings = rings.max(2);

        let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let z = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(ring_radius * theta.cos(), ring_radius * theta.sin(), z);
                mesh.vertices.push(Vertex::new(
                    normal * 0.5,
                    normal.normalize_or_zero(),
                    Vec2::new(
                        segment as f32 / segments as f32,
                        ring as f32 / rings as f32,
                    ),
                ));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;
                mesh.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        mesh
    }

    /// Unit plane in XY facing +Z
    pub fn plane(subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");
        let subdivisions = subdivisions.max(1);
        let step = 1.0 / subdivisions as f32;

        for y in 0..=subdivisions {
            for x in 0..=subdivisions {
                let u = x as f32 * step;
                let v = y as f32 * step;
                mesh.vertices.push(Vertex::new(
                    Vec3::new(u - 0.5, v - 0.5, 0.0),
                    Vec3::Z,
                    Vec2::new(u, 1.0 - v),
                ));
            }
        }

        for y in 0..subdivisions {
            for x in 0..subdivisions {
                let current = y * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;
                mesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next + 1,
                    current,
                    next + 1,
                    next,
                ]);
            }
        }

        mesh
    }

    /// Cylinder of diameter 1 and height 1 along Z
    pub fn cylinder(segments: u32) -> Self {
        Self::frustum("cylinder", 0.5, 0.5, segments)
    }

    /// Cone of base diameter 1 and height 1 along Z, apex at +Z
    pub fn cone(segments: u32) -> Self {
        Self::frustum("cone", 0.5, 0.0, segments)
    }

    fn frustum(name: &str, bottom_radius: f32, top_radius: f32, segments: u32) -> Self {
        let mut mesh = Mesh::new(name);
        let segments = segments.max(3);
        let angle_step = 2.0 * std::f32::consts::PI / segments as f32;
        let slope = bottom_radius - top_radius;

        // Side
        for i in 0..=segments {
            let angle = i as f32 * angle_step;
            let (s, c) = angle.sin_cos();
            let normal = Vec3::new(c, s, slope).normalize();
            let u = i as f32 / segments as f32;
            mesh.vertices.push(Vertex::new(
                Vec3::new(c * bottom_radius, s * bottom_radius, -0.5),
                normal,
                Vec2::new(u, 1.0),
            ));
            mesh.vertices.push(Vertex::new(
                Vec3::new(c * top_radius, s * top_radius, 0.5),
                normal,
                Vec2::new(u, 0.0),
            ));
        }
        for i in 0..segments {
            let base = i * 2;
            mesh.indices.extend_from_slice(&[
                base,
                base + 2,
                base + 1,
                base + 1,
                base + 2,
                base + 3,
            ]);
        }

        // Caps
        let mut cap = |z: f32, radius: f32, normal: Vec3| {
            if radius <= 0.0 {
                return;
            }
            let center = mesh.vertices.len() as u32;
            mesh.vertices
                .push(Vertex::new(Vec3::new(0.0, 0.0, z), normal, Vec2::splat(0.5)));
            for i in 0..=segments {
                let (s, c) = (i as f32 * angle_step).sin_cos();
                mesh.vertices.push(Vertex::new(
                    Vec3::new(c * radius, s * radius, z),
                    normal,
                    Vec2::new(0.5 + c * 0.5, 0.5 + s * 0.5),
                ));
                if i > 0 {
                    let idx = mesh.vertices.len() as u32 - 1;
                    if normal.z > 0.0 {
                        mesh.indices.extend_from_slice(&[center, idx - 1, idx]);
                    } else {
                        mesh.indices.extend_from_slice(&[center, idx, idx - 1]);
                    }
                }
            }
        };
        cap(0.5, top_radius, Vec3::Z);
        cap(-0.5, bottom_radius, -Vec3::Z);

        mesh
    }
}
