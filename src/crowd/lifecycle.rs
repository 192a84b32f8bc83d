// src/crowd/lifecycle.rs
//! Respawn lifecycle: full teardown-then-rebuild on every request.
//!
//! The crowd is either Idle (no batches) or Populated; both transitions into
//! Populated and a `respawn(0)` start by removing every previous batch and
//! resetting the used-index bookkeeping. Respawn is user-initiated and
//! low-frequency; batches rebuild from scratch rather than incrementally.
//!
//! Surface sampling runs on the async compute pool; a request arriving while
//! points or geometry are still loading parks in a single pending slot, so a
//! newer request simply overwrites it (last-request-wins).

use std::sync::Arc;

use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task};
use futures_lite::future;

use super::allocator::{allocate, allocate_fallback};
use super::cache::SampleStore;
use super::core::{make_rng, SpawnSurface, SpectatorArchetypeId, SurfacePoint, UsedIndices};
use super::instancing::{assign_archetypes, group_transforms, BatchStats, InstanceBatch};
use super::plugin::{CrowdMaterial, CrowdSettings};
use super::registry::SpectatorPool;
use super::sampler::{collect_surface, sample_surface};

/// Marks floor meshes whose surface the crowd may occupy. Attached by the
/// collaborator that builds (or loads) the floor — an explicit reference, no
/// scene-graph traversal by name.
#[derive(Component)]
pub struct SpawnArea;

/// Request a full crowd rebuild with `count` spectators. `count == 0` clears
/// the crowd and returns to Idle.
#[derive(Event, Clone, Copy, Debug)]
pub struct RespawnCrowd {
    pub count: usize,
}

/// A spawn waiting on points or geometry, stamped with its generation.
#[derive(Clone, Copy, Debug)]
pub struct PendingSpawn {
    pub generation: u64,
    pub count: usize,
}

/// All mutable crowd state, owned here and nowhere else.
#[derive(Resource, Default)]
pub struct CrowdState {
    pub used: UsedIndices,
    pub batches: Vec<Entity>,
    pub generation: u64,
    pub pending: Option<PendingSpawn>,
    /// Spectators currently standing (for the HUD).
    pub population: usize,
}

impl CrowdState {
    /// Reset bookkeeping for a new cycle; the caller despawns the returned
    /// batch entities. Safe to call from Idle (returns nothing).
    pub fn begin_teardown(&mut self) -> Vec<Entity> {
        self.used.clear();
        self.population = 0;
        std::mem::take(&mut self.batches)
    }

    /// Register a request. Supersedes any still-pending spawn.
    pub fn request(&mut self, count: usize) {
        self.generation += 1;
        let generation = self.generation;
        self.pending = (count > 0).then_some(PendingSpawn { generation, count });
    }
}

/// World-space spawn surface, extracted once from the marked floor meshes.
#[derive(Resource, Default)]
pub struct FloorSurface(pub Option<Arc<SpawnSurface>>);

/// The reusable point set (cache-loaded or freshly sampled).
#[derive(Resource, Default)]
pub struct CachedPoints(pub Option<Arc<Vec<SurfacePoint>>>);

/// In-flight background sampling, at most one.
#[derive(Resource, Default)]
pub struct SamplingTask(Option<Task<Vec<SurfacePoint>>>);

// ---------- Systems ----------

/// Update: flatten the `SpawnArea` meshes into a world-space triangle soup
/// once all of them are available.
pub fn extract_floor_surface(
    mut floor: ResMut<FloorSurface>,
    meshes: Res<Assets<Mesh>>,
    q_floor: Query<(&Mesh3d, &GlobalTransform), With<SpawnArea>>,
) {
    if floor.0.is_some() || q_floor.is_empty() {
        return;
    }

    let mut sections = Vec::new();
    for (mesh3d, transform) in &q_floor {
        let Some(mesh) = meshes.get(&mesh3d.0) else {
            // A sub-mesh is still loading; try again next frame.
            return;
        };
        sections.push((mesh, Mat4::from(transform.affine())));
    }

    let surface = collect_surface(sections);
    if surface.is_empty() {
        warn!("Crowd: spawn area has no usable triangles; placement will be empty.");
    } else {
        info!(
            "Crowd: spawn area ready ({} triangles, {:.1} m^2)",
            surface.triangles.len(),
            surface.total_area
        );
    }
    floor.0 = Some(Arc::new(surface));
}

/// Update: make the point set available — cache hit if possible, otherwise
/// kick off a background sampling task.
pub fn ensure_sample_points(
    floor: Res<FloorSurface>,
    settings: Res<CrowdSettings>,
    mut cached: ResMut<CachedPoints>,
    mut sampling: ResMut<SamplingTask>,
) {
    if cached.0.is_some() || sampling.0.is_some() {
        return;
    }
    let Some(surface) = floor.0.clone() else { return };

    if surface.is_empty() {
        // Nothing to sample; remember that so we don't retry every frame.
        cached.0 = Some(Arc::new(Vec::new()));
        return;
    }

    let store = SampleStore::new(&settings.cache_dir, settings.num_samples);
    if let Some(points) = store.load() {
        cached.0 = Some(Arc::new(points));
        return;
    }

    let count = settings.num_samples;
    let seed = settings.seed;
    info!("Crowd: sampling {count} surface points in the background");
    let task = AsyncComputeTaskPool::get().spawn(async move {
        let mut rng = make_rng(seed);
        sample_surface(&surface, count, &mut rng)
    });
    sampling.0 = Some(task);
}

/// Update: poll the sampling task; persist and publish the result.
pub fn collect_sample_points(
    settings: Res<CrowdSettings>,
    mut cached: ResMut<CachedPoints>,
    mut sampling: ResMut<SamplingTask>,
) {
    let Some(task) = sampling.0.as_mut() else { return };
    let Some(points) = future::block_on(future::poll_once(task)) else { return };
    sampling.0 = None;

    if points.len() == settings.num_samples {
        SampleStore::new(&settings.cache_dir, settings.num_samples).save(&points);
    }
    info!("Crowd: {} surface points ready", points.len());
    cached.0 = Some(Arc::new(points));
}

/// Update: tear down the previous crowd and park the newest request.
pub fn handle_respawn_events(
    mut commands: Commands,
    mut evr: EventReader<RespawnCrowd>,
    mut state: ResMut<CrowdState>,
) {
    // Coalesce same-frame bursts down to the newest request.
    let Some(req) = evr.read().last().copied() else { return };

    for entity in state.begin_teardown() {
        commands.entity(entity).despawn();
    }
    state.request(req.count);

    if req.count == 0 {
        info!("Crowd: cleared");
    } else {
        debug!(
            "Crowd: respawn requested, {} spectators (generation {})",
            req.count, state.generation
        );
    }
}

/// Update: build the pending crowd once points and geometry are both ready.
pub fn spawn_pending_crowd(
    mut commands: Commands,
    mut state: ResMut<CrowdState>,
    cached: Res<CachedPoints>,
    floor: Res<FloorSurface>,
    pool: Res<SpectatorPool>,
    material: Res<CrowdMaterial>,
    settings: Res<CrowdSettings>,
) {
    let Some(pending) = state.pending else { return };
    let Some(points) = cached.0.clone() else { return };
    if !pool.ready() {
        return;
    }

    state.pending = None;

    if pool.entries.is_empty() {
        warn!(
            "Crowd: no spectator geometry loaded; spawn aborted (generation {}).",
            pending.generation
        );
        return;
    }

    let mut rng = make_rng(settings.seed);

    let positions = if points.is_empty() {
        let Some(surface) = floor.0.clone() else { return };
        allocate_fallback(&surface, pending.count, &mut rng)
    } else {
        allocate(points.as_slice(), &mut state.used, pending.count, &mut rng)
    };

    if positions.is_empty() {
        warn!("Crowd: no positions available; the stage stays empty.");
        return;
    }

    let placements = assign_archetypes(positions, pool.entries.len(), &mut rng);
    let offsets: Vec<f32> = pool.entries.iter().map(|e| e.bottom_offset).collect();
    let groups = group_transforms(&placements, &offsets);

    state.population = placements.len();
    for (idx, instances) in groups.into_iter().enumerate() {
        if instances.is_empty() {
            continue;
        }
        let entry = &pool.entries[idx];
        let batch = commands
            .spawn((
                InstanceBatch {
                    archetype: SpectatorArchetypeId(idx as u32),
                    base_mesh: entry.mesh.clone(),
                    material: material.0.clone(),
                    instances,
                    dirty: true,
                },
                BatchStats::default(),
                Name::new(format!("Spectators {}", entry.name)),
                Transform::default(),
                GlobalTransform::default(),
                Visibility::Hidden,
            ))
            .id();
        state.batches.push(batch);
    }

    info!(
        "Crowd: generation {} populated with {} spectators in {} batches",
        pending.generation,
        state.population,
        state.batches.len()
    );
}

/// Update: one-shot initial spawn once the pipeline is warm.
pub fn request_initial_crowd(
    mut requested: Local<bool>,
    settings: Res<CrowdSettings>,
    cached: Res<CachedPoints>,
    pool: Res<SpectatorPool>,
    mut writer: EventWriter<RespawnCrowd>,
) {
    if *requested || cached.0.is_none() || !pool.ready() {
        return;
    }
    *requested = true;
    if settings.initial_count > 0 {
        writer.write(RespawnCrowd { count: settings.initial_count });
    }
}
