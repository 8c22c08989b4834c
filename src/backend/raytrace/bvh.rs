//! Bounding volume hierarchy over world-space triangles.

use glam::{DVec3, Vec2};

use crate::backend::extract::{ExtractedItem, FrameSnapshot};
use crate::math::Aabb;

const LEAF_SIZE: usize = 4;

/// World-space triangle with shading attributes.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub positions: [DVec3; 3],
    pub normals: [DVec3; 3],
    pub uvs: [Vec2; 3],
    /// Index into [`FrameSnapshot::items`].
    pub item: usize,
}

impl Triangle {
    fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::EMPTY;
        for p in self.positions {
            aabb.grow(p);
        }
        aabb
    }

    fn centroid(&self) -> DVec3 {
        (self.positions[0] + self.positions[1] + self.positions[2]) / 3.0
    }

    /// Geometric normal following the winding order.
    pub fn face_normal(&self) -> DVec3 {
        let [a, b, c] = self.positions;
        (b - a).cross(c - a).normalize_or_zero()
    }

    /// Möller-Trumbore, two-sided. Returns `(t, u, v)`.
    fn intersect(&self, origin: DVec3, dir: DVec3, t_min: f64, t_max: f64) -> Option<(f64, f64, f64)> {
        let [a, b, c] = self.positions;
        let e1 = b - a;
        let e2 = c - a;
        let p = dir.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-14 {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = origin - a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = dir.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(q) * inv_det;
        (t > t_min && t < t_max).then_some((t, u, v))
    }
}

/// Closest intersection along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub t: f64,
    pub triangle: usize,
    pub u: f64,
    pub v: f64,
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    /// Leaf: first primitive index. Interior: index of the left child (right is `first + 1`).
    first: usize,
    /// Number of primitives; 0 for interior nodes.
    count: usize,
}

/// Static acceleration structure, rebuilt whenever the frame changes.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    triangles: Vec<Triangle>,
    nodes: Vec<Node>,
}

impl Bvh {
    /// Build over every item accepted by `filter`.
    pub fn build(frame: &FrameSnapshot, filter: impl Fn(&ExtractedItem) -> bool) -> Self {
        let mut triangles = Vec::new();
        for (item_index, item) in frame.items.iter().enumerate() {
            if filter(item) {
                push_item_triangles(item, item_index, &mut triangles);
            }
        }
        Self::from_triangles(triangles)
    }

    pub fn from_triangles(triangles: Vec<Triangle>) -> Self {
        let mut bvh = Self {
            triangles,
            nodes: Vec::new(),
        };
        if !bvh.triangles.is_empty() {
            bvh.nodes.push(Node {
                bounds: Aabb::EMPTY,
                first: 0,
                count: bvh.triangles.len(),
            });
            bvh.subdivide(0);
        }
        bvh
    }

    fn subdivide(&mut self, node_index: usize) {
        let (first, count) = (self.nodes[node_index].first, self.nodes[node_index].count);
        let slice = &mut self.triangles[first..first + count];
        let bounds = slice.iter().fold(Aabb::EMPTY, |acc, t| acc.merge(&t.bounds()));
        self.nodes[node_index].bounds = bounds;
        if count <= LEAF_SIZE {
            return;
        }

        let mut centroid_bounds = Aabb::EMPTY;
        for tri in slice.iter() {
            centroid_bounds.grow(tri.centroid());
        }
        let extent = centroid_bounds.size();
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        if extent[axis] <= f64::EPSILON {
            return;
        }
        slice.sort_by(|a, b| a.centroid()[axis].total_cmp(&b.centroid()[axis]));

        let half = count / 2;
        let left = self.nodes.len();
        self.nodes.push(Node {
            bounds: Aabb::EMPTY,
            first,
            count: half,
        });
        self.nodes.push(Node {
            bounds: Aabb::EMPTY,
            first: first + half,
            count: count - half,
        });
        self.nodes[node_index].first = left;
        self.nodes[node_index].count = 0;
        self.subdivide(left);
        self.subdivide(left + 1);
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, index: usize) -> &Triangle {
        &self.triangles[index]
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map(|n| n.bounds).unwrap_or(Aabb::EMPTY)
    }

    /// Closest hit in `(t_min, t_max)`.
    pub fn intersect(&self, origin: DVec3, dir: DVec3, t_min: f64, t_max: f64) -> Option<Hit> {
        self.intersect_filtered(origin, dir, t_min, t_max, |_| true)
    }

    /// Closest hit among triangles accepted by `accept`.
    pub fn intersect_filtered(
        &self,
        origin: DVec3,
        dir: DVec3,
        t_min: f64,
        t_max: f64,
        accept: impl Fn(&Triangle) -> bool,
    ) -> Option<Hit> {
        if self.nodes.is_empty() {
            return None;
        }
        let inv_dir = dir.recip();
        let mut closest: Option<Hit> = None;
        let mut limit = t_max;
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !ray_hits_box(&node.bounds, origin, inv_dir, t_min, limit) {
                continue;
            }
            if node.count == 0 {
                stack.push(node.first);
                stack.push(node.first + 1);
                continue;
            }
            for tri_index in node.first..node.first + node.count {
                let tri = &self.triangles[tri_index];
                if let Some((t, u, v)) = tri.intersect(origin, dir, t_min, limit) {
                    if accept(tri) {
                        limit = t;
                        closest = Some(Hit {
                            t,
                            triangle: tri_index,
                            u,
                            v,
                        });
                    }
                }
            }
        }
        closest
    }

    /// Interpolated, normalised shading normal at a hit.
    pub fn shading_normal(&self, hit: &Hit) -> DVec3 {
        let tri = &self.triangles[hit.triangle];
        let w = 1.0 - hit.u - hit.v;
        let n = tri.normals[0] * w + tri.normals[1] * hit.u + tri.normals[2] * hit.v;
        let n = n.normalize_or_zero();
        if n == DVec3::ZERO {
            tri.face_normal()
        } else {
            n
        }
    }

    pub fn uv(&self, hit: &Hit) -> Vec2 {
        let tri = &self.triangles[hit.triangle];
        let w = 1.0 - hit.u - hit.v;
        tri.uvs[0] * w as f32 + tri.uvs[1] * hit.u as f32 + tri.uvs[2] * hit.v as f32
    }
}

fn push_item_triangles(item: &ExtractedItem, item_index: usize, out: &mut Vec<Triangle>) {
    let pose = &item.world;
    let inv_scale = DVec3::ONE / pose.scale;
    let mesh = &item.mesh;
    let vertex = |i: u32| &mesh.vertices[i as usize];
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [vertex(tri[0]), vertex(tri[1]), vertex(tri[2])];
        let world_normal = |n: glam::Vec3| (pose.rotation * (n.as_dvec3() * inv_scale)).normalize_or_zero();
        out.push(Triangle {
            positions: [
                pose.transform_point(a.position.as_dvec3()),
                pose.transform_point(b.position.as_dvec3()),
                pose.transform_point(c.position.as_dvec3()),
            ],
            normals: [
                world_normal(a.normal),
                world_normal(b.normal),
                world_normal(c.normal),
            ],
            uvs: [a.uv, b.uv, c.uv],
            item: item_index,
        });
    }
}

fn ray_hits_box(aabb: &Aabb, origin: DVec3, inv_dir: DVec3, t_min: f64, t_max: f64) -> bool {
    if aabb.is_empty() {
        return false;
    }
    let t0 = (aabb.min - origin) * inv_dir;
    let t1 = (aabb.max - origin) * inv_dir;
    // NaN from 0 * inf is dropped by min/max.
    let near = t0.min(t1).max_element().max(t_min);
    let far = t0.max(t1).min_element().min(t_max);
    near <= far
}
