//! Groups G3D instances into render batches.
//!
//! A mesh referenced by more than one instance gets its own instanced batch
//! holding one transform per instance. Every other live instance is baked
//! into world space and appended to a single merged batch. Batch order and
//! slot order follow instance order, so a given model always composes the
//! same way.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::bounds::BoundingSphere;
use crate::mesh_builder::MeshSlice;
use crate::scene::{Scene, SceneStats};

/// Identifies a batch in a [`Scene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchId {
    /// Instanced batch of the given mesh id.
    Instanced(usize),
    Merged,
}

/// Where a node ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstanceLocation {
    pub batch: BatchId,
    /// Instance slot for instanced batches, sub-range slot for the merged one.
    pub slot: usize,
}

/// Per-instance GPU data for instanced batches.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

/// One shared mesh drawn once per transform.
#[derive(Clone, Debug, PartialEq)]
pub struct InstancedBatch {
    pub mesh: usize,
    pub slice: MeshSlice,
    pub transforms: Vec<Mat4>,
}

impl InstancedBatch {
    pub fn instance_count(&self) -> usize {
        self.transforms.len()
    }

    pub fn instance_data(&self) -> Vec<InstanceRaw> {
        self.transforms
            .iter()
            .map(|m| InstanceRaw { model: m.to_cols_array_2d() })
            .collect()
    }
}

/// Sub-range of the merged batch owned by one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedRange {
    pub node: usize,
    pub vertices: Range<usize>,
    pub indices: Range<usize>,
}

/// World-space geometry of every singly-referenced instance. Indices are u32;
/// a node whose vertices would push them past `u32::MAX` is left out.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedBatch {
    pub positions: Vec<f32>,
    pub indices: Vec<u32>,
    pub colors: Option<Vec<f32>>,
    pub ranges: Vec<MergedRange>,
    /// Always identity; geometry is already in world space.
    pub transform: Mat4,
}

impl MergedBatch {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderBatch {
    Instanced(InstancedBatch),
    Merged(MergedBatch),
}

impl RenderBatch {
    pub fn id(&self) -> BatchId {
        match self {
            RenderBatch::Instanced(b) => BatchId::Instanced(b.mesh),
            RenderBatch::Merged(_) => BatchId::Merged,
        }
    }

    /// Number of nodes drawn by this batch.
    pub fn node_count(&self) -> usize {
        match self {
            RenderBatch::Instanced(b) => b.instance_count(),
            RenderBatch::Merged(b) => b.ranges.len(),
        }
    }
}

/// Bidirectional node/batch lookup for picking and highlighting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexMaps {
    locations: Vec<Option<InstanceLocation>>,
    batches: Vec<BatchId>,
    batch_nodes: Vec<Vec<usize>>,
    /// Mesh id to position in `batches`.
    mesh_batch: Vec<Option<usize>>,
    merged_batch: Option<usize>,
    /// First index of each merged sub-range, parallel to the merged node list.
    merged_index_starts: Vec<usize>,
    merged_index_end: usize,
}

impl IndexMaps {
    pub fn location_of(&self, node: usize) -> Option<InstanceLocation> {
        self.locations.get(node).copied().flatten()
    }

    /// Nodes of a batch in slot order.
    pub fn nodes_of(&self, batch: BatchId) -> &[usize] {
        self.batch_position(batch)
            .map(|p| self.batch_nodes[p].as_slice())
            .unwrap_or(&[])
    }

    pub fn node_at(&self, batch: BatchId, slot: usize) -> Option<usize> {
        self.nodes_of(batch).get(slot).copied()
    }

    /// Node owning triangle `triangle` of the merged batch.
    pub fn node_at_merged_triangle(&self, triangle: usize) -> Option<usize> {
        let nodes = self.nodes_of(BatchId::Merged);
        let index = triangle * 3;
        let slot = self.merged_index_starts.partition_point(|&start| start <= index);
        if slot == 0 || index >= self.merged_index_end {
            return None;
        }
        nodes.get(slot - 1).copied()
    }

    /// Batch ids in render order.
    pub fn batch_order(&self) -> &[BatchId] {
        &self.batches
    }

    pub fn node_count(&self) -> usize {
        self.locations.len()
    }

    fn batch_position(&self, batch: BatchId) -> Option<usize> {
        match batch {
            BatchId::Instanced(mesh) => self.mesh_batch.get(mesh).copied().flatten(),
            BatchId::Merged => self.merged_batch,
        }
    }
}

/// Mesh id of an instance, `None` for the no-mesh sentinel or a dangling id.
fn mesh_of(mesh: i32, mesh_count: usize) -> Option<usize> {
    usize::try_from(mesh).ok().filter(|&m| m < mesh_count)
}

fn transform_of(transforms: &[f32], instance: usize) -> Option<Mat4> {
    transforms
        .get(instance * 16..(instance + 1) * 16)
        .map(Mat4::from_cols_slice)
}

/// Number of instances referencing each mesh id. Sentinel and out-of-range
/// entries are not counted, so the sum equals the number of entries in
/// `0..mesh_count`, not of all non-negative entries.
pub fn reference_counts(mesh_count: usize, instance_meshes: &[i32]) -> Vec<usize> {
    let mut counts = vec![0usize; mesh_count];
    let mut dangling = 0usize;
    for &mesh in instance_meshes {
        match mesh_of(mesh, mesh_count) {
            Some(m) => counts[m] += 1,
            None if mesh >= 0 => dangling += 1,
            None => {}
        }
    }
    if dangling > 0 {
        log::warn!("compositor: {dangling} instances reference a mesh that does not exist");
    }
    counts
}

/// Composes mesh slices and instance data into a [`Scene`].
///
/// `meshes` is indexed by mesh id. `instance_transforms` holds 16 floats per
/// instance, translation in elements 12 to 14.
pub fn composite(
    meshes: &[Option<MeshSlice>],
    instance_meshes: &[i32],
    instance_transforms: &[f32],
) -> Scene {
    let mut stats = SceneStats {
        meshes: meshes.len(),
        empty_meshes: meshes.iter().filter(|m| m.is_none()).count(),
        nodes: instance_meshes.len(),
        ..SceneStats::default()
    };

    let ref_counts = reference_counts(meshes.len(), instance_meshes);

    let mut maps = IndexMaps {
        locations: vec![None; instance_meshes.len()],
        mesh_batch: vec![None; meshes.len()],
        ..IndexMaps::default()
    };
    let mut instanced: Vec<InstancedBatch> = Vec::new();
    let mut singles: Vec<(usize, &MeshSlice, Mat4)> = Vec::new();
    let mut bounds = BoundingSphere::EMPTY;

    for (node, &mesh) in instance_meshes.iter().enumerate() {
        let Some(mesh) = mesh_of(mesh, meshes.len()) else {
            stats.skipped_instances += 1;
            continue;
        };
        let Some(slice) = meshes[mesh].as_ref() else {
            stats.skipped_instances += 1;
            continue;
        };
        let Some(transform) = transform_of(instance_transforms, node) else {
            log::warn!("compositor: instance {node} has no transform");
            stats.skipped_instances += 1;
            continue;
        };

        bounds = bounds.union(&slice.bounding_sphere.transformed(&transform));

        if ref_counts[mesh] > 1 {
            let existing = maps.mesh_batch[mesh];
            let position = match existing {
                Some(position) => position,
                None => {
                    let position = maps.batches.len();
                    maps.mesh_batch[mesh] = Some(position);
                    maps.batches.push(BatchId::Instanced(mesh));
                    maps.batch_nodes.push(Vec::new());
                    instanced.push(InstancedBatch {
                        mesh,
                        slice: slice.clone(),
                        transforms: Vec::new(),
                    });
                    position
                }
            };
            let batch = &mut instanced[position];
            let slot = batch.transforms.len();
            batch.transforms.push(transform);
            maps.batch_nodes[position].push(node);
            maps.locations[node] = Some(InstanceLocation { batch: BatchId::Instanced(mesh), slot });
            stats.instanced_nodes += 1;
        } else {
            singles.push((node, slice, transform));
        }
    }

    let mut batches: Vec<RenderBatch> = instanced.into_iter().map(RenderBatch::Instanced).collect();
    stats.instanced_batches = batches.len();

    if !singles.is_empty() {
        let merged = merge(&singles, &mut maps);
        stats.merged_nodes = merged.ranges.len();
        stats.skipped_instances += singles.len() - merged.ranges.len();
        stats.merged_triangles = merged.triangle_count();
        maps.merged_batch = Some(maps.batches.len());
        maps.batches.push(BatchId::Merged);
        batches.push(RenderBatch::Merged(merged));
    }

    log::debug!(
        "compositor: {} instanced batches, {} merged nodes, {} skipped",
        stats.instanced_batches,
        stats.merged_nodes,
        stats.skipped_instances
    );

    Scene { batches, bounds, index_maps: maps, stats }
}

/// `indices` offset by `base`, or `None` if any result does not fit in a u32.
fn shifted_indices(indices: &[u32], base: usize) -> Option<Vec<u32>> {
    let base = u32::try_from(base).ok()?;
    indices.iter().map(|&i| i.checked_add(base)).collect()
}

fn merge(singles: &[(usize, &MeshSlice, Mat4)], maps: &mut IndexMaps) -> MergedBatch {
    let vertex_total: usize = singles.iter().map(|(_, s, _)| s.positions.len()).sum();
    let index_total: usize = singles.iter().map(|(_, s, _)| s.indices.len()).sum();
    let with_colors = singles.iter().all(|(_, s, _)| s.colors.is_some());

    let mut positions = Vec::with_capacity(vertex_total);
    let mut indices = Vec::with_capacity(index_total);
    let mut colors = Vec::with_capacity(if with_colors { vertex_total } else { 0 });
    let mut ranges = Vec::with_capacity(singles.len());
    let mut nodes = Vec::with_capacity(singles.len());

    for &(node, slice, transform) in singles {
        let first_vertex = positions.len() / 3;
        let first_index = indices.len();
        let Some(shifted) = shifted_indices(&slice.indices, first_vertex) else {
            log::warn!("compositor: merged batch exceeds u32 vertex indices, node {node} left out");
            continue;
        };
        let slot = ranges.len();

        for p in slice.positions.chunks_exact(3) {
            let world = transform.transform_point3(Vec3::from_slice(p));
            positions.extend_from_slice(&world.to_array());
        }
        indices.extend(shifted);
        if with_colors {
            if let Some(c) = &slice.colors {
                colors.extend_from_slice(c);
            }
        }

        ranges.push(MergedRange {
            node,
            vertices: first_vertex..positions.len() / 3,
            indices: first_index..indices.len(),
        });
        maps.merged_index_starts.push(first_index);
        maps.locations[node] = Some(InstanceLocation { batch: BatchId::Merged, slot });
        nodes.push(node);
    }

    maps.merged_index_end = indices.len();
    maps.batch_nodes.push(nodes);

    MergedBatch {
        positions,
        indices,
        colors: with_colors.then_some(colors),
        ranges,
        transform: Mat4::IDENTITY,
    }
}
