//! Conservative triangle voxelization into an albedo/normal/emissive grid.

use glam::{DVec3, UVec3, Vec3, Vec4};

use crate::backend::extract::{ExtractedItem, FrameSnapshot};
use crate::math::Aabb;

/// Averaged surface attributes of one voxel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Voxel {
    /// Diffuse colour; `w` is 1 for filled voxels.
    pub albedo: Vec4,
    pub normal: Vec3,
    pub emissive: Vec3,
}

impl Voxel {
    pub fn is_filled(&self) -> bool {
        self.albedo.w > 0.0
    }
}

/// Dense voxel grid covering an axis-aligned volume.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    bounds: Aabb,
    resolution: UVec3,
    voxels: Vec<Voxel>,
    filled: usize,
}

impl VoxelGrid {
    pub fn new(bounds: Aabb, resolution: UVec3) -> Self {
        let count = resolution.x as usize * resolution.y as usize * resolution.z as usize;
        Self {
            bounds,
            resolution,
            voxels: vec![Voxel::default(); count],
            filled: 0,
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn resolution(&self) -> UVec3 {
        self.resolution
    }

    pub fn voxel_size(&self) -> DVec3 {
        self.bounds.size() / self.resolution.as_dvec3()
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn filled_count(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn index(&self, cell: UVec3) -> usize {
        let r = self.resolution;
        (cell.z as usize * r.y as usize + cell.y as usize) * r.x as usize + cell.x as usize
    }

    pub fn coords(&self, index: usize) -> UVec3 {
        let r = self.resolution;
        let x = index % r.x as usize;
        let y = (index / r.x as usize) % r.y as usize;
        let z = index / (r.x as usize * r.y as usize);
        UVec3::new(x as u32, y as u32, z as u32)
    }

    pub fn voxel(&self, index: usize) -> &Voxel {
        &self.voxels[index]
    }

    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    /// Cell containing `point`, if inside the grid.
    pub fn cell_of(&self, point: DVec3) -> Option<UVec3> {
        cell_of(&self.bounds, self.resolution, point)
    }

    pub fn voxel_center(&self, cell: UVec3) -> DVec3 {
        self.bounds.min + (cell.as_dvec3() + 0.5) * self.voxel_size()
    }

    pub fn is_filled_at(&self, cell: UVec3) -> bool {
        self.voxels[self.index(cell)].is_filled()
    }
}

pub(crate) fn cell_of(bounds: &Aabb, resolution: UVec3, point: DVec3) -> Option<UVec3> {
    if bounds.is_empty() {
        return None;
    }
    let size = bounds.size() / resolution.as_dvec3();
    let local = ((point - bounds.min) / size).floor();
    let max = resolution.as_dvec3();
    if local.cmplt(DVec3::ZERO).any() || local.cmpge(max).any() {
        return None;
    }
    Some(local.as_uvec3())
}

struct SourceTriangle {
    positions: [DVec3; 3],
    bounds: Aabb,
    normal: Vec3,
    albedo: Vec3,
    emissive: Vec3,
}

/// Voxelizes geometry octant by octant.
///
/// Triangles are first binned into octants by bounding box, then each octant
/// tests its voxels against the triangles of its bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voxelizer {
    pub resolution: UVec3,
    pub octants: UVec3,
}

impl Voxelizer {
    pub fn new(resolution: UVec3, octants: UVec3) -> Self {
        Self {
            resolution,
            octants: octants.max(UVec3::ONE).min(resolution.max(UVec3::ONE)),
        }
    }

    pub fn voxelize(
        &self,
        frame: &FrameSnapshot,
        bounds: Aabb,
        filter: impl Fn(&ExtractedItem) -> bool,
    ) -> VoxelGrid {
        let mut grid = VoxelGrid::new(bounds, self.resolution);
        if bounds.is_empty() || grid.is_empty() {
            return grid;
        }
        let triangles = collect_triangles(frame, &bounds, filter);
        let voxel_size = grid.voxel_size();
        let half = voxel_size * 0.5;
        let mut counts = vec![0u32; grid.len()];
        let mut normals = vec![DVec3::ZERO; grid.len()];

        for octant in octant_ranges(self.resolution, self.octants) {
            let octant_bounds = Aabb::new(
                bounds.min + octant.0.as_dvec3() * voxel_size,
                bounds.min + octant.1.as_dvec3() * voxel_size,
            );
            let bin: Vec<&SourceTriangle> = triangles
                .iter()
                .filter(|t| overlaps(&t.bounds, &octant_bounds))
                .collect();
            if bin.is_empty() {
                continue;
            }
            log::trace!(
                "voxelizer: octant {:?}..{:?} holds {} triangles",
                octant.0,
                octant.1,
                bin.len()
            );
            for triangle in bin {
                // A triangle lying on a voxel boundary touches the cells on both sides.
                let lo = (((triangle.bounds.min - bounds.min) / voxel_size).ceil() - DVec3::ONE)
                    .max(octant.0.as_dvec3())
                    .as_uvec3();
                let hi = ((triangle.bounds.max - bounds.min) / voxel_size)
                    .floor()
                    .min(octant.1.as_dvec3() - DVec3::ONE)
                    .as_uvec3();
                for z in lo.z..=hi.z {
                    for y in lo.y..=hi.y {
                        for x in lo.x..=hi.x {
                            let cell = UVec3::new(x, y, z);
                            if !triangle_overlaps_box(
                                triangle.positions,
                                grid.voxel_center(cell),
                                half,
                            ) {
                                continue;
                            }
                            let i = grid.index(cell);
                            let voxel = &mut grid.voxels[i];
                            voxel.albedo += triangle.albedo.extend(1.0);
                            voxel.emissive += triangle.emissive;
                            normals[i] += triangle.normal.as_dvec3();
                            counts[i] += 1;
                        }
                    }
                }
            }
        }

        let mut filled = 0;
        for (i, voxel) in grid.voxels.iter_mut().enumerate() {
            let count = counts[i];
            if count == 0 {
                continue;
            }
            let n = count as f32;
            voxel.albedo = (voxel.albedo.truncate() / n).extend(1.0);
            voxel.emissive /= n;
            voxel.normal = normals[i].normalize_or_zero().as_vec3();
            filled += 1;
        }
        grid.filled = filled;
        grid
    }
}

fn collect_triangles(
    frame: &FrameSnapshot,
    bounds: &Aabb,
    filter: impl Fn(&ExtractedItem) -> bool,
) -> Vec<SourceTriangle> {
    let mut triangles = Vec::new();
    for item in frame.items.iter().filter(|item| filter(item)) {
        if !overlaps(&item.world_bounds(), bounds) {
            continue;
        }
        for t in 0..item.mesh.triangle_count() {
            let positions = item.mesh.triangle(t).map(|p| item.world.transform_point(p));
            let mut tri_bounds = Aabb::EMPTY;
            for p in positions {
                tri_bounds.grow(p);
            }
            if !overlaps(&tri_bounds, bounds) {
                continue;
            }
            let [a, b, c] = positions;
            triangles.push(SourceTriangle {
                positions,
                bounds: tri_bounds,
                normal: (b - a).cross(c - a).normalize_or_zero().as_vec3(),
                albedo: item.material.diffuse,
                emissive: item.material.emissive,
            });
        }
    }
    triangles
}

fn overlaps(a: &Aabb, b: &Aabb) -> bool {
    a.min.cmple(b.max).all() && a.max.cmpge(b.min).all()
}

/// Voxel index ranges `[start, end)` of each octant.
fn octant_ranges(resolution: UVec3, octants: UVec3) -> Vec<(UVec3, UVec3)> {
    let split = |axis: usize| -> Vec<(u32, u32)> {
        let (res, parts) = (resolution[axis], octants[axis].max(1));
        (0..parts)
            .map(|i| (res * i / parts, res * (i + 1) / parts))
            .filter(|(a, b)| b > a)
            .collect()
    };
    let (xs, ys, zs) = (split(0), split(1), split(2));
    let mut ranges = Vec::with_capacity(xs.len() * ys.len() * zs.len());
    for z in &zs {
        for y in &ys {
            for x in &xs {
                ranges.push((UVec3::new(x.0, y.0, z.0), UVec3::new(x.1, y.1, z.1)));
            }
        }
    }
    ranges
}

/// Separating axis test between a triangle and an axis-aligned box.
pub fn triangle_overlaps_box(triangle: [DVec3; 3], center: DVec3, half: DVec3) -> bool {
    let v = triangle.map(|p| p - center);
    let edges = [v[1] - v[0], v[2] - v[1], v[0] - v[2]];

    let separated = |axis: DVec3| {
        let p = v.map(|x| x.dot(axis));
        let r = half.dot(axis.abs());
        p[0].min(p[1]).min(p[2]) > r || p[0].max(p[1]).max(p[2]) < -r
    };

    for edge in edges {
        for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
            let test = axis.cross(edge);
            if test.length_squared() > 1e-24 && separated(test) {
                return false;
            }
        }
    }
    for axis in 0..3 {
        let min = v[0][axis].min(v[1][axis]).min(v[2][axis]);
        let max = v[0][axis].max(v[1][axis]).max(v[2][axis]);
        if min > half[axis] || max < -half[axis] {
            return false;
        }
    }
    let normal = edges[0].cross(edges[1]);
    !(normal.length_squared() > 1e-24 && separated(normal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::extract::ExtractedMaterial;
    use crate::math::Pose;
    use crate::resources::Mesh;
    use crate::scene::object::ObjectId;
    use std::sync::Arc;

    fn floor_frame() -> FrameSnapshot {
        let mut material = ExtractedMaterial::default();
        material.diffuse = Vec3::new(1.0, 0.0, 0.0);
        let mut frame = FrameSnapshot::default();
        frame.items.push(ExtractedItem {
            visual: ObjectId(1),
            mesh: Arc::new(Mesh::plane(1)),
            world: Pose::IDENTITY.with_scale(DVec3::new(4.0, 4.0, 1.0)),
            material: Arc::new(material),
            is_static: true,
        });
        frame
    }

    #[test]
    fn test_sat_rejects_distant_triangle() {
        let tri = [DVec3::ZERO, DVec3::X, DVec3::Y];
        assert!(triangle_overlaps_box(tri, DVec3::new(0.2, 0.2, 0.0), DVec3::splat(0.1)));
        assert!(!triangle_overlaps_box(tri, DVec3::new(0.2, 0.2, 0.5), DVec3::splat(0.1)));
        // Beyond the hypotenuse.
        assert!(!triangle_overlaps_box(tri, DVec3::new(0.8, 0.8, 0.0), DVec3::splat(0.1)));
    }

    #[test]
    fn test_plane_fills_one_layer() {
        let bounds = Aabb::new(DVec3::new(-2.0, -2.0, -2.0), DVec3::new(2.0, 2.0, 2.0));
        let grid = Voxelizer::new(UVec3::splat(8), UVec3::ONE).voxelize(&floor_frame(), bounds, |_| true);
        // The plane at z = 0 touches the two layers sharing that boundary.
        assert_eq!(grid.filled_count(), 8 * 8 * 2);
        let cell = grid.cell_of(DVec3::new(0.25, 0.25, 0.25)).unwrap();
        let voxel = grid.voxel(grid.index(cell));
        assert_eq!(voxel.albedo, Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert!(voxel.normal.abs_diff_eq(Vec3::Z, 1e-6));
        assert!(!grid.is_filled_at(UVec3::new(0, 0, 0)));
    }

    #[test]
    fn test_octants_do_not_change_result() {
        let bounds = Aabb::new(DVec3::splat(-2.0), DVec3::splat(2.0));
        let frame = floor_frame();
        let one = Voxelizer::new(UVec3::splat(8), UVec3::ONE).voxelize(&frame, bounds, |_| true);
        let many = Voxelizer::new(UVec3::splat(8), UVec3::new(2, 2, 4)).voxelize(&frame, bounds, |_| true);
        assert_eq!(one.voxels(), many.voxels());
    }

    #[test]
    fn test_filter_skips_items() {
        let bounds = Aabb::new(DVec3::splat(-2.0), DVec3::splat(2.0));
        let grid = Voxelizer::new(UVec3::splat(4), UVec3::ONE).voxelize(&floor_frame(), bounds, |item| !item.is_static);
        assert_eq!(grid.filled_count(), 0);
    }

    #[test]
    fn test_cell_lookup() {
        let grid = VoxelGrid::new(Aabb::new(DVec3::ZERO, DVec3::splat(4.0)), UVec3::splat(4));
        assert_eq!(grid.cell_of(DVec3::new(3.5, 0.5, 1.5)), Some(UVec3::new(3, 0, 1)));
        assert_eq!(grid.cell_of(DVec3::new(4.0, 0.5, 1.5)), None);
        assert_eq!(grid.coords(grid.index(UVec3::new(1, 2, 3))), UVec3::new(1, 2, 3));
    }
}
