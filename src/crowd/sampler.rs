// src/crowd/sampler.rs
//! Area-weighted Monte Carlo sampling of the spawn-area surface.
//!
//! The floor arrives as a mesh hierarchy; `collect_surface` flattens it into
//! a world-space triangle soup, and `sample_surface` draws uniformly
//! distributed points from it. Larger triangles receive proportionally more
//! samples, so density stays even across irregular triangulations.

use bevy::prelude::*;
use bevy::render::mesh::{Indices, Mesh, VertexAttributeValues};
use rand::Rng;

use super::core::{SpawnSurface, SurfacePoint, SurfaceTriangle};

/// Flatten floor sub-meshes into one world-space triangle soup.
/// Degenerate (zero-area) triangles are dropped on the way in.
pub fn collect_surface<'a>(
    sections: impl IntoIterator<Item = (&'a Mesh, Mat4)>,
) -> SpawnSurface {
    let mut surface = SpawnSurface::default();

    for (mesh, to_world) in sections {
        let Some(positions) = mesh_positions(mesh) else {
            warn!("Sampler: floor sub-mesh has no float positions; skipping.");
            continue;
        };

        let world: Vec<Vec3> = positions
            .iter()
            .map(|p| to_world.transform_point3(Vec3::from_array(*p)))
            .collect();

        match mesh_indices(mesh) {
            Some(indices) => {
                for tri in indices.chunks_exact(3) {
                    let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
                    if i0 >= world.len() || i1 >= world.len() || i2 >= world.len() {
                        continue;
                    }
                    surface.push(SurfaceTriangle::from_vertices(world[i0], world[i1], world[i2]));
                }
            }
            // Non-indexed: consecutive vertex triples.
            None => {
                for tri in world.chunks_exact(3) {
                    surface.push(SurfaceTriangle::from_vertices(tri[0], tri[1], tri[2]));
                }
            }
        }
    }

    surface
}

/// Draw `count` area-weighted random points on the surface.
///
/// Returns an empty vector (with a diagnostic) when the surface carries no
/// usable area; the caller treats that as "no geometry available" and falls
/// back to bounding-box placement.
pub fn sample_surface(
    surface: &SpawnSurface,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<SurfacePoint> {
    if surface.is_empty() {
        warn!("Sampler: spawn area has zero total triangle area; nothing to sample.");
        return Vec::new();
    }

    // Cumulative-area prefix table; binary search locates the owning triangle.
    let mut cumulative = Vec::with_capacity(surface.triangles.len());
    let mut running = 0.0f32;
    for tri in &surface.triangles {
        running += tri.area;
        cumulative.push(running);
    }
    let total = running;

    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let r = rng.random_range(0.0..total);
        let idx = cumulative
            .partition_point(|&c| c <= r)
            .min(surface.triangles.len() - 1);
        out.push(random_point_in_triangle(&surface.triangles[idx], rng));
    }
    out
}

/// Uniform point inside a triangle via the reflected-barycentric draw.
fn random_point_in_triangle(tri: &SurfaceTriangle, rng: &mut impl Rng) -> SurfacePoint {
    let mut u: f32 = rng.random();
    let mut v: f32 = rng.random();
    // Reflect draws landing in the outer half of the unit square back inside.
    if u + v > 1.0 {
        u = 1.0 - u;
        v = 1.0 - v;
    }
    let w = 1.0 - u - v;
    SurfacePoint::from_vec3(tri.a * w + tri.b * u + tri.c * v)
}

/// Cast a vertical ray down through `(x, z)` and return the highest surface
/// hit, if any. Triangles seen edge-on from above are ignored.
pub fn raycast_down(surface: &SpawnSurface, x: f32, z: f32) -> Option<f32> {
    let mut best: Option<f32> = None;

    for tri in &surface.triangles {
        let (a, b, c) = (tri.a, tri.b, tri.c);
        let denom = (b.z - c.z) * (a.x - c.x) + (c.x - b.x) * (a.z - c.z);
        if denom.abs() <= f32::EPSILON {
            continue;
        }
        let w_a = ((b.z - c.z) * (x - c.x) + (c.x - b.x) * (z - c.z)) / denom;
        let w_b = ((c.z - a.z) * (x - c.x) + (a.x - c.x) * (z - c.z)) / denom;
        let w_c = 1.0 - w_a - w_b;

        const EDGE_EPS: f32 = 1e-5;
        if w_a < -EDGE_EPS || w_b < -EDGE_EPS || w_c < -EDGE_EPS {
            continue;
        }

        let y = w_a * a.y + w_b * b.y + w_c * c.y;
        if best.is_none_or(|prev| y > prev) {
            best = Some(y);
        }
    }

    best
}

// ---------- Mesh attribute helpers ----------

fn mesh_positions(mesh: &Mesh) -> Option<&Vec<[f32; 3]>> {
    match mesh.attribute(Mesh::ATTRIBUTE_POSITION)? {
        VertexAttributeValues::Float32x3(v) => Some(v),
        _ => None,
    }
}

fn mesh_indices(mesh: &Mesh) -> Option<Vec<u32>> {
    match mesh.indices() {
        Some(Indices::U32(v)) => Some(v.clone()),
        Some(Indices::U16(v)) => Some(v.iter().map(|&x| x as u32).collect()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::render::mesh::PrimitiveTopology;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Two triangles forming the 10x10 unit square at y = 0.
    fn flat_square() -> SpawnSurface {
        let mut surface = SpawnSurface::default();
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::ZERO,
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 10.0),
        ));
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(10.0, 0.0, 0.0),
        ));
        surface
    }

    #[test]
    fn sample_returns_exact_count_inside_bounds() {
        let surface = flat_square();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let points = sample_surface(&surface, 1_000, &mut rng);

        assert_eq!(points.len(), 1_000);
        for p in &points {
            assert!(p.x >= 0.0 && p.x <= 10.0, "x out of bounds: {}", p.x);
            assert!(p.z >= 0.0 && p.z <= 10.0, "z out of bounds: {}", p.z);
            assert!(p.y.abs() < 1e-5);
        }
    }

    #[test]
    fn samples_lie_on_sloped_triangle_plane() {
        let a = Vec3::new(0.0, 1.0, 0.0);
        let b = Vec3::new(4.0, 3.0, 0.0);
        let c = Vec3::new(0.0, 2.0, 5.0);
        let mut surface = SpawnSurface::default();
        surface.push(SurfaceTriangle::from_vertices(a, b, c));

        let normal = (b - a).cross(c - a).normalize();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for p in sample_surface(&surface, 500, &mut rng) {
            let dist = normal.dot(p.to_vec3() - a);
            assert!(dist.abs() < 1e-4, "point off plane by {dist}");
        }
    }

    #[test]
    fn area_weighting_converges_to_area_ratio() {
        // Triangle 1 has twice the area of triangle 2, disjoint in x.
        let mut surface = SpawnSurface::default();
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::ZERO,
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
        ));
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::new(100.0, 0.0, 0.0),
            Vec3::new(102.0, 0.0, 0.0),
            Vec3::new(100.0, 0.0, 2.0),
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let points = sample_surface(&surface, 100_000, &mut rng);
        let in_first = points.iter().filter(|p| p.x < 50.0).count();
        let in_second = points.len() - in_first;

        let ratio = in_first as f64 / in_second as f64;
        assert!((1.8..=2.2).contains(&ratio), "ratio {ratio} outside [1.8, 2.2]");
    }

    #[test]
    fn empty_surface_samples_nothing() {
        let surface = SpawnSurface::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(sample_surface(&surface, 100, &mut rng).is_empty());
    }

    #[test]
    fn collect_surface_applies_world_transform() {
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, Default::default());
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_POSITION,
            vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        );
        mesh.insert_indices(Indices::U32(vec![0, 1, 2]));

        // Scale x2 and lift by 5: area x4, AABB shifted up.
        let to_world = Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0))
            * Mat4::from_scale(Vec3::splat(2.0));
        let surface = collect_surface([(&mesh, to_world)]);

        assert_eq!(surface.triangles.len(), 1);
        assert!((surface.total_area - 2.0).abs() < 1e-5);
        assert!((surface.min.y - 5.0).abs() < 1e-5);
    }

    #[test]
    fn collect_surface_handles_non_indexed_meshes() {
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, Default::default());
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_POSITION,
            vec![[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
        );
        let surface = collect_surface([(&mesh, Mat4::IDENTITY)]);
        assert_eq!(surface.triangles.len(), 1);
    }

    #[test]
    fn raycast_hits_highest_surface() {
        let mut surface = flat_square();
        // A second, smaller floor hovering at y = 3 over one corner.
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(2.0, 3.0, 0.0),
            Vec3::new(0.0, 3.0, 2.0),
        ));

        assert!((raycast_down(&surface, 0.5, 0.5).unwrap() - 3.0).abs() < 1e-5);
        assert!(raycast_down(&surface, 9.0, 9.0).unwrap().abs() < 1e-5);
        assert!(raycast_down(&surface, 50.0, 50.0).is_none());
    }
}
