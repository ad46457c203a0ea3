//! Per-mesh geometry extraction from a decoded G3D block.
//!
//! Each G3D mesh becomes a compact [`MeshSlice`]: the opaque triangles of its
//! submeshes, with indices rebased to zero and only the referenced vertex
//! span copied. Meshes with nothing opaque become `None` so the result stays
//! aligned with mesh ids.

use vim_format::G3d;

use crate::bounds::{BoundingBox, BoundingSphere};
use crate::scene::SceneOptions;

/// Submeshes whose material alpha is below this are left out entirely.
pub const TRANSPARENCY_THRESHOLD: f32 = 0.9;

/// Vertex color for submeshes without a material.
pub const DEFAULT_COLOR: [f32; 3] = [0.5, 0.5, 0.5];

/// Geometry of one mesh in its own local space.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshSlice {
    /// Flat xyz, covering source vertices `base_vertex..base_vertex + vertex_count()`.
    pub positions: Vec<f32>,
    /// Triangle list, rebased so 0 is `base_vertex`.
    pub indices: Vec<u32>,
    /// Flat rgb per vertex, present when vertex colors are enabled.
    pub colors: Option<Vec<f32>>,
    pub base_vertex: usize,
    pub bounding_box: BoundingBox,
    pub bounding_sphere: BoundingSphere,
}

impl MeshSlice {
    pub fn new(
        positions: Vec<f32>,
        indices: Vec<u32>,
        colors: Option<Vec<f32>>,
        base_vertex: usize,
    ) -> Self {
        let bounding_box = BoundingBox::from_positions(&positions);
        let bounding_sphere = BoundingSphere::from_positions(&positions, &bounding_box);
        Self { positions, indices, colors, base_vertex, bounding_box, bounding_sphere }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Builds one slice per G3D mesh, `None` where the mesh has no opaque
/// triangles. Index and color scratch space is allocated once and reused.
pub fn build_meshes(g3d: &G3d<'_>, options: &SceneOptions) -> Vec<Option<MeshSlice>> {
    let mut scratch_indices = vec![0u32; g3d.index_count()];
    let mut scratch_colors = if options.vertex_colors {
        vec![0.0f32; g3d.positions.len()]
    } else {
        Vec::new()
    };

    let mut meshes = Vec::with_capacity(g3d.mesh_count());
    let mut empty = 0usize;
    for mesh in 0..g3d.mesh_count() {
        let slice = build_mesh(g3d, mesh, options, &mut scratch_indices, &mut scratch_colors);
        if slice.is_none() {
            empty += 1;
        }
        meshes.push(slice);
    }

    log::debug!(
        "mesh builder: {} meshes, {} without opaque geometry",
        meshes.len(),
        empty
    );
    meshes
}

fn build_mesh(
    g3d: &G3d<'_>,
    mesh: usize,
    options: &SceneOptions,
    scratch_indices: &mut [u32],
    scratch_colors: &mut [f32],
) -> Option<MeshSlice> {
    let mut count = 0usize;
    let mut min = u32::MAX;
    let mut max = 0u32;

    for submesh in g3d.mesh_submesh_range(mesh) {
        let color = match g3d.submesh_color(submesh) {
            Some(rgba) if rgba[3] < TRANSPARENCY_THRESHOLD => continue,
            Some(rgba) => [rgba[0], rgba[1], rgba[2]],
            None => DEFAULT_COLOR,
        };
        // Decoded indices are already checked to be in 0..vertex_count.
        for &index in &g3d.indices[g3d.submesh_index_range(submesh)] {
            let vertex = index as u32;
            scratch_indices[count] = vertex;
            count += 1;
            min = min.min(vertex);
            max = max.max(vertex);
            if options.vertex_colors {
                let at = vertex as usize * 3;
                scratch_colors[at..at + 3].copy_from_slice(&color);
            }
        }
    }

    if count == 0 {
        return None;
    }

    let span = min as usize * 3..(max as usize + 1) * 3;
    let indices = scratch_indices[..count].iter().map(|v| v - min).collect();
    let positions = g3d.positions[span.clone()].to_vec();
    let colors = options.vertex_colors.then(|| scratch_colors[span].to_vec());
    Some(MeshSlice::new(positions, indices, colors, min as usize))
}
