// src/crowd/core.rs
//! Core types for crowd placement. Keep this file dependency-light; it should
//! compile before the sampler/cache/allocator impls.

use std::collections::HashSet;

use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

// ---------- Constants ----------

/// How many surface points one sampling pass produces (and the cache stores).
pub const DEFAULT_NUM_SAMPLES: usize = 10_000;

/// Bump whenever the persisted point format changes; older keys are pruned
/// on the next load.
pub const SAMPLE_SCHEMA_VERSION: &str = "v3";

// ---------- Surface geometry ----------

/// A world-space point on the spawn-area surface. This is the persisted unit
/// of the sample cache.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfacePoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl SurfacePoint {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    #[inline]
    pub fn from_vec3(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

/// One world-space triangle of the spawn area, with its area precomputed.
/// Ephemeral: rebuilt from mesh geometry on every extraction pass.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceTriangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
    pub area: f32,
}

impl SurfaceTriangle {
    /// Area via the half cross-product magnitude.
    pub fn from_vertices(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let area = 0.5 * (b - a).cross(c - a).length();
        Self { a, b, c, area }
    }

    /// Degenerate triangles contribute nothing to the sample distribution.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !self.area.is_finite() || self.area <= f32::EPSILON
    }
}

/// World-space triangle soup of the spawn area plus the aggregates the
/// sampler and the fallback allocator need.
#[derive(Clone, Debug)]
pub struct SpawnSurface {
    pub triangles: Vec<SurfaceTriangle>,
    pub total_area: f32,
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for SpawnSurface {
    fn default() -> Self {
        Self {
            triangles: Vec::new(),
            total_area: 0.0,
            min: Vec3::INFINITY,
            max: Vec3::NEG_INFINITY,
        }
    }
}

impl SpawnSurface {
    /// Accumulate one (non-degenerate) triangle into the soup and the AABB.
    pub fn push(&mut self, tri: SurfaceTriangle) {
        if tri.is_degenerate() {
            return;
        }
        self.total_area += tri.area;
        for v in [tri.a, tri.b, tri.c] {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.triangles.push(tri);
    }

    /// No usable geometry at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty() || self.total_area <= f32::EPSILON
    }

    /// Mid-height of the AABB; last-resort Y for fallback placement.
    #[inline]
    pub fn mid_height(&self) -> f32 {
        0.5 * (self.min.y + self.max.y)
    }
}

// ---------- Placement ----------

/// Index of a spectator archetype in the registry (stable during a session).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpectatorArchetypeId(pub u32);

/// One spectator-to-be: where it stands, what it looks like, which way it
/// faces. Exists only for the duration of one spawn cycle.
#[derive(Clone, Copy, Debug)]
pub struct CrowdPlacement {
    pub position: Vec3,
    pub archetype: SpectatorArchetypeId,
    /// Yaw (radians) around +Y.
    pub yaw: f32,
}

// ---------- Used-index bookkeeping ----------

/// Cache indices consumed since the last reset. Owned by the lifecycle
/// manager and passed by reference into allocator calls; no hidden globals.
#[derive(Debug, Default)]
pub struct UsedIndices(HashSet<usize>);

impl UsedIndices {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    #[inline]
    pub fn insert(&mut self, index: usize) {
        self.0.insert(index);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

// ---------- RNG ----------

/// All crowd randomness flows through one ChaCha8 stream. `seed` is the
/// reproducibility hook; `None` matches the original unseeded behavior.
pub fn make_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_rng(&mut rand::rng()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn triangle_area_right_angle() {
        let tri = SurfaceTriangle::from_vertices(
            Vec3::ZERO,
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 3.0),
        );
        assert_relative_eq!(tri.area, 3.0);
        assert!(!tri.is_degenerate());
    }

    #[test]
    fn degenerate_triangle_is_skipped() {
        let mut surface = SpawnSurface::default();
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ));
        assert!(surface.is_empty());
        assert_eq!(surface.triangles.len(), 0);
    }

    #[test]
    fn surface_accumulates_area_and_bounds() {
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
        assert_relative_eq!(surface.total_area, 100.0);
        assert_eq!(surface.min, Vec3::ZERO);
        assert_eq!(surface.max, Vec3::new(10.0, 0.0, 10.0));
    }
}
