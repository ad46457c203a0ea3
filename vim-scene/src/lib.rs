//! Scene reconstruction for decoded VIM models.
//!
//! [`load_scene`] decodes a `.vim` buffer and turns its geometry into render
//! batches: one instanced batch per shared mesh plus a single merged batch
//! for everything else, with maps back to node ids for picking.

pub mod bounds;
pub mod compositor;
pub mod mesh_builder;
pub mod scene;

pub use bounds::{BoundingBox, BoundingSphere};
pub use compositor::{
    composite, reference_counts, BatchId, IndexMaps, InstanceLocation, InstanceRaw,
    InstancedBatch, MergedBatch, MergedRange, RenderBatch,
};
pub use mesh_builder::{build_meshes, MeshSlice};
pub use scene::{build_scene, load_scene, LoadedVim, Scene, SceneOptions, SceneStats};
