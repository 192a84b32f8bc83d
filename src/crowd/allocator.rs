// src/crowd/allocator.rs
//! Position allocation for one spawn cycle.
//!
//! The primary path hands out cached surface points without repetition,
//! resetting the used-index bookkeeping once the cache is exhausted so
//! repeated spawns eventually cover the whole point set. The fallback path
//! places inside the floor's bounding box when no cache exists.

use bevy::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;

use super::core::{SpawnSurface, SurfacePoint, UsedIndices};
use super::sampler::raycast_down;

/// Inward margin (meters) applied to the bounding-box fallback so spectators
/// don't stand exactly on the floor's rim.
pub const FALLBACK_MARGIN: f32 = 0.25;

/// Select `count` positions from the cached point set.
///
/// Guarantee: never returns fewer than `min(count, points.len())` positions.
/// When no unused index remains the bookkeeping resets in full before
/// selection; when `count` exceeds the cache size, the remainder re-draws
/// indices over the whole cache (duplicates permitted).
pub fn allocate(
    points: &[SurfacePoint],
    used: &mut UsedIndices,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<SurfacePoint> {
    if points.is_empty() || count == 0 {
        return Vec::new();
    }

    let mut available: Vec<usize> = (0..points.len()).filter(|&i| !used.contains(i)).collect();
    if available.is_empty() {
        // Cache exhausted across previous spawns: full reset, then reuse.
        debug!("Allocator: all {} cached points consumed; resetting bookkeeping", points.len());
        used.clear();
        available = (0..points.len()).collect();
    }

    available.shuffle(rng);

    let unique = count.min(available.len());
    let mut out = Vec::with_capacity(count);
    for &index in &available[..unique] {
        used.insert(index);
        out.push(points[index]);
    }

    // Exact uniqueness can't be honored beyond the cache size.
    for _ in unique..count {
        out.push(points[rng.random_range(0..points.len())]);
    }

    out
}

/// Bounding-box placement for when the cache is unavailable: uniform `(x, z)`
/// inside the margin-inset floor AABB, `y` from a downward raycast against
/// the floor surface (bounding-box mid-height when nothing is hit).
pub fn allocate_fallback(
    surface: &SpawnSurface,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<SurfacePoint> {
    if surface.is_empty() || count == 0 {
        return Vec::new();
    }

    let (x_lo, x_hi) = inset_range(surface.min.x, surface.max.x, FALLBACK_MARGIN);
    let (z_lo, z_hi) = inset_range(surface.min.z, surface.max.z, FALLBACK_MARGIN);

    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let x = draw_in(x_lo, x_hi, rng);
        let z = draw_in(z_lo, z_hi, rng);
        let y = raycast_down(surface, x, z).unwrap_or_else(|| surface.mid_height());
        out.push(SurfacePoint::new(x, y, z));
    }
    out
}

/// Shrink `[lo, hi]` by `margin` on both sides, collapsing to the midpoint
/// when the span is too thin to inset.
#[inline]
fn inset_range(lo: f32, hi: f32, margin: f32) -> (f32, f32) {
    if hi - lo > 2.0 * margin {
        (lo + margin, hi - margin)
    } else {
        let mid = 0.5 * (lo + hi);
        (mid, mid)
    }
}

#[inline]
fn draw_in(lo: f32, hi: f32, rng: &mut impl Rng) -> f32 {
    if hi > lo {
        rng.random_range(lo..hi)
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crowd::core::SurfaceTriangle;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn cache(n: usize) -> Vec<SurfacePoint> {
        // Distinct x per index so positions identify their source index.
        (0..n).map(|i| SurfacePoint::new(i as f32, 0.0, 0.0)).collect()
    }

    fn indices_of(points: &[SurfacePoint]) -> Vec<usize> {
        points.iter().map(|p| p.x as usize).collect()
    }

    #[test]
    fn allocation_is_unique_and_tracks_usage() {
        let points = cache(100);
        let mut used = UsedIndices::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let got = allocate(&points, &mut used, 50, &mut rng);
        assert_eq!(got.len(), 50);
        assert_eq!(used.len(), 50);

        let distinct: HashSet<usize> = indices_of(&got).into_iter().collect();
        assert_eq!(distinct.len(), 50, "no duplicate cache indices");
    }

    #[test]
    fn second_allocation_avoids_consumed_indices() {
        let points = cache(100);
        let mut used = UsedIndices::default();
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let first: HashSet<usize> = indices_of(&allocate(&points, &mut used, 40, &mut rng))
            .into_iter()
            .collect();
        let second: HashSet<usize> = indices_of(&allocate(&points, &mut used, 40, &mut rng))
            .into_iter()
            .collect();

        assert!(first.is_disjoint(&second));
        assert_eq!(used.len(), 80);
    }

    #[test]
    fn exhaustion_resets_and_keeps_producing_full_batches() {
        let points = cache(10);
        let mut used = UsedIndices::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..5 {
            let got = allocate(&points, &mut used, 10, &mut rng);
            assert_eq!(got.len(), 10);
            let distinct: HashSet<usize> = indices_of(&got).into_iter().collect();
            assert_eq!(distinct.len(), 10);
            assert_eq!(used.len(), 10);
        }
    }

    #[test]
    fn overflow_reuses_the_whole_cache() {
        let points = cache(10);
        let mut used = UsedIndices::default();
        let mut rng = ChaCha8Rng::seed_from_u64(6);

        let got = allocate(&points, &mut used, 25, &mut rng);
        assert_eq!(got.len(), 25);

        // The unique prefix covers the cache exactly once.
        let distinct: HashSet<usize> = indices_of(&got[..10]).into_iter().collect();
        assert_eq!(distinct.len(), 10);
        assert_eq!(used.len(), 10);
    }

    #[test]
    fn empty_cache_allocates_nothing() {
        let mut used = UsedIndices::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert!(allocate(&[], &mut used, 10, &mut rng).is_empty());
        assert!(used.is_empty());
    }

    #[test]
    fn fallback_stays_inside_inset_bounds_with_surface_height() {
        let mut surface = SpawnSurface::default();
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(10.0, 2.0, 0.0),
            Vec3::new(0.0, 2.0, 10.0),
        ));
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::new(10.0, 2.0, 10.0),
            Vec3::new(0.0, 2.0, 10.0),
            Vec3::new(10.0, 2.0, 0.0),
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let got = allocate_fallback(&surface, 200, &mut rng);
        assert_eq!(got.len(), 200);
        for p in &got {
            assert!(p.x >= FALLBACK_MARGIN && p.x <= 10.0 - FALLBACK_MARGIN);
            assert!(p.z >= FALLBACK_MARGIN && p.z <= 10.0 - FALLBACK_MARGIN);
            assert!((p.y - 2.0).abs() < 1e-4, "y should come from the raycast");
        }
    }

    #[test]
    fn fallback_uses_mid_height_when_raycast_misses() {
        // A wall: real area, but no footprint under a vertical ray.
        let mut surface = SpawnSurface::default();
        surface.push(SurfaceTriangle::from_vertices(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 4.0, 0.0),
            Vec3::new(0.0, 0.0, 5.0),
        ));

        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let got = allocate_fallback(&surface, 10, &mut rng);
        assert_eq!(got.len(), 10);
        for p in &got {
            assert!((p.y - 2.0).abs() < 1e-5, "mid-height of the AABB");
        }
    }
}
