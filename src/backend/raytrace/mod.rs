//! CPU ray-tracing backend
//!
//! Casts primary rays through a BVH of the extracted frame and shades hits
//! with Blinn-Phong lighting, shadow rays, transparency, reflections and the
//! active global illumination volume.

pub mod bvh;

use std::sync::Arc;

use glam::{DVec3, Vec3};

use crate::backend::{
    BackendError, BackendResult, FrameSnapshot, RenderBackend, RenderTarget, ViewSetup,
};
use crate::math::Color;
use crate::EngineConfig;

pub use bvh::{Bvh, Hit, Triangle};

const RAY_EPSILON: f64 = 1e-5;
const MAX_SHADOW_LAYERS: usize = 8;

/// Software ray tracer.
pub struct RayTraceBackend {
    initialized: bool,
    samples: u32,
    max_depth: u32,
    cache: Option<(u64, Arc<Bvh>)>,
}

impl Default for RayTraceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RayTraceBackend {
    pub fn new() -> Self {
        Self {
            initialized: false,
            samples: 1,
            max_depth: 3,
            cache: None,
        }
    }

    /// Acceleration structure for `frame`, rebuilt when the frame generation
    /// changes. Hand-built frames (generation 0) are never cached.
    fn bvh_for(&mut self, frame: &FrameSnapshot) -> Arc<Bvh> {
        match &self.cache {
            Some((generation, bvh)) if frame.generation != 0 && *generation == frame.generation => {
                bvh.clone()
            }
            _ => {
                let bvh = Arc::new(Bvh::build(frame, |_| true));
                log::trace!(
                    "RayTraceBackend: built BVH with {} triangles for frame {}",
                    bvh.triangle_count(),
                    frame.generation
                );
                self.cache = Some((frame.generation, bvh.clone()));
                bvh
            }
        }
    }
}

impl RenderBackend for RayTraceBackend {
    fn name(&self) -> &'static str {
        "raytrace"
    }

    fn init(&mut self, config: &EngineConfig) -> BackendResult<()> {
        self.samples = config.samples.max(1);
        self.max_depth = config.max_ray_depth;
        self.initialized = true;
        log::info!(
            "RayTraceBackend: initialized ({} samples, depth {})",
            self.samples,
            self.max_depth
        );
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn render(
        &mut self,
        frame: &FrameSnapshot,
        view: &ViewSetup,
        target: &mut RenderTarget,
    ) -> BackendResult<()> {
        if !self.initialized {
            return Err(BackendError::NotInitialized);
        }
        target.clear(frame.background);
        let bvh = self.bvh_for(frame);
        let tracer = Tracer {
            frame,
            bvh: &bvh,
            max_depth: self.max_depth,
        };
        let samples = if view.samples > 1 {
            view.samples
        } else {
            self.samples
        };
        let origin = view.pose.position;
        let forward = view.pose.forward();

        for y in 0..view.height {
            for x in 0..view.width {
                let index = target.index(x, y);
                let dir = view.world_ray(x as f64 + 0.5, y as f64 + 0.5);
                let cos = dir.dot(forward).max(f64::EPSILON);
                let (t_min, t_max) = (view.near / cos, view.far / cos);

                if view.outputs.depth || view.outputs.ids {
                    if let Some(hit) = bvh.intersect(origin, dir, t_min, t_max) {
                        target.depth[index] = (hit.t * cos) as f32;
                        let item = bvh.triangle(hit.triangle).item;
                        target.ids[index] = frame.items[item].visual.0;
                    }
                }

                if view.outputs.color {
                    let mut sum = Vec3::ZERO;
                    for s in 0..samples {
                        let (jx, jy) = subpixel_offset(s, samples);
                        let dir = view.world_ray(x as f64 + jx, y as f64 + jy);
                        let cos = dir.dot(forward).max(f64::EPSILON);
                        sum += tracer.trace(origin, dir, view.near / cos, view.far / cos, 0);
                    }
                    let rgb = Color::from_vec3(sum / samples as f32).to_rgb8();
                    target.color[index * 3..index * 3 + 3].copy_from_slice(&rgb);
                }
            }
        }
        Ok(())
    }
}

/// Low-discrepancy subpixel offsets; the single-sample case hits the pixel centre.
fn subpixel_offset(sample: u32, samples: u32) -> (f64, f64) {
    if samples <= 1 {
        return (0.5, 0.5);
    }
    let s = sample as f64;
    ((0.5 + s * 0.754_877_666_2).fract(), (0.5 + s * 0.569_840_290_9).fract())
}

struct Tracer<'a> {
    frame: &'a FrameSnapshot,
    bvh: &'a Bvh,
    max_depth: u32,
}

impl Tracer<'_> {
    fn trace(&self, origin: DVec3, dir: DVec3, t_min: f64, t_max: f64, depth: u32) -> Vec3 {
        let Some(hit) = self.bvh.intersect(origin, dir, t_min, t_max) else {
            return self.frame.background.to_vec3();
        };
        let tri = self.bvh.triangle(hit.triangle);
        let material = &self.frame.items[tri.item].material;
        let point = origin + dir * hit.t;
        let mut normal = self.bvh.shading_normal(&hit);
        if normal.dot(dir) > 0.0 {
            normal = -normal;
        }

        let mut base = material.diffuse;
        if let Some(texture) = &material.texture {
            let texel = texture.sample(self.bvh.uv(&hit));
            base *= Vec3::new(texel.x, texel.y, texel.z);
        }

        let mut color = if material.lighting {
            self.shade(point, normal, dir, base, material)
        } else {
            base + material.emissive
        };

        if depth < self.max_depth {
            let offset = normal * RAY_EPSILON;
            if material.reflectivity > 0.0 {
                let reflected = dir - normal * 2.0 * dir.dot(normal);
                let bounce = self.trace(point + offset, reflected, 0.0, f64::INFINITY, depth + 1);
                color = color.lerp(bounce, material.reflectivity);
            }
            if material.transparency > 0.0 {
                let behind = self.trace(point - offset, dir, 0.0, f64::INFINITY, depth + 1);
                color = color.lerp(behind, material.transparency);
            }
        }
        color
    }

    fn shade(
        &self,
        point: DVec3,
        normal: DVec3,
        dir: DVec3,
        base: Vec3,
        material: &crate::backend::extract::ExtractedMaterial,
    ) -> Vec3 {
        let ambient_tint = if material.texture.is_some() {
            base
        } else {
            material.ambient
        };
        let mut color = self.frame.ambient.to_vec3() * ambient_tint + material.emissive;
        let view_dir = -dir;

        for light in &self.frame.lights {
            let Some(incidence) = light.incidence(point) else {
                continue;
            };
            let n_dot_l = normal.dot(incidence.to_light);
            if n_dot_l <= 0.0 {
                continue;
            }
            let visibility = if light.light.cast_shadows && material.receive_shadows {
                self.visibility(point + normal * RAY_EPSILON, incidence.to_light, incidence.distance)
            } else {
                1.0
            };
            if visibility <= 0.0 {
                continue;
            }
            let strength = (incidence.strength * visibility) as f32;
            let diffuse = light.light.diffuse.to_vec3() * base * (n_dot_l as f32);
            let half = (incidence.to_light + view_dir).normalize_or_zero();
            let spec_power = normal.dot(half).max(0.0).powf(material.shininess.max(1.0) as f64);
            let specular = light.light.specular.to_vec3() * material.specular * spec_power as f32;
            color += (diffuse + specular) * strength;
        }

        for volume in &self.frame.gi {
            if let Some(indirect) = volume.sample(point, normal) {
                color += indirect * base;
                break;
            }
        }
        color
    }

    /// Fraction of light passing from `origin` toward the light, attenuated by transparent occluders.
    fn visibility(&self, mut origin: DVec3, to_light: DVec3, distance: f64) -> f64 {
        let items = &self.frame.items;
        let casts = |t: &Triangle| items[t.item].material.cast_shadows;
        let mut remaining = distance;
        let mut visibility = 1.0;
        for _ in 0..MAX_SHADOW_LAYERS {
            let Some(hit) = self
                .bvh
                .intersect_filtered(origin, to_light, RAY_EPSILON, remaining, casts)
            else {
                return visibility;
            };
            let transparency = items[self.bvh.triangle(hit.triangle).item]
                .material
                .transparency as f64;
            visibility *= transparency;
            if visibility < 0.01 {
                return 0.0;
            }
            origin += to_light * (hit.t + RAY_EPSILON);
            remaining -= hit.t + RAY_EPSILON;
        }
        visibility
    }
}
