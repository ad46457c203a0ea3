use vim_format::{parse_vim, G3d, Result, VimModel};

use crate::bounds::BoundingSphere;
use crate::compositor::{composite, BatchId, IndexMaps, RenderBatch};
use crate::mesh_builder::build_meshes;

/// Reconstruction settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneOptions {
    /// Write material colors into per-vertex color arrays.
    pub vertex_colors: bool,
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self { vertex_colors: true }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub meshes: usize,
    pub empty_meshes: usize,
    pub nodes: usize,
    pub instanced_batches: usize,
    pub instanced_nodes: usize,
    pub merged_nodes: usize,
    pub merged_triangles: usize,
    /// Sentinel, dangling, or empty-mesh instances.
    pub skipped_instances: usize,
}

/// Renderer-ready output: instanced batches in first-use order, then the
/// merged batch if any node landed in it.
#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub batches: Vec<RenderBatch>,
    pub bounds: BoundingSphere,
    pub index_maps: IndexMaps,
    pub stats: SceneStats,
}

impl Scene {
    pub fn batch(&self, id: BatchId) -> Option<&RenderBatch> {
        self.batches.iter().find(|b| b.id() == id)
    }
}

/// Runs mesh extraction and composition over decoded geometry.
pub fn build_scene(geometry: &G3d<'_>, options: &SceneOptions) -> Scene {
    let meshes = build_meshes(geometry, options);
    composite(&meshes, &geometry.instance_meshes, &geometry.instance_transforms)
}

/// A decoded model together with its reconstructed scene.
#[derive(Clone, Debug)]
pub struct LoadedVim<'a> {
    pub model: VimModel<'a>,
    pub scene: Scene,
}

impl<'a> LoadedVim<'a> {
    /// Node drawn at `slot` of `batch`.
    pub fn node_at(&self, batch: BatchId, slot: usize) -> Option<usize> {
        self.scene.index_maps.node_at(batch, slot)
    }

    /// Element name behind a picked instance.
    pub fn element_name_at(&self, batch: BatchId, slot: usize) -> Option<&'a str> {
        self.model.element_name(self.node_at(batch, slot)?)
    }
}

/// Decodes a `.vim` buffer and reconstructs its scene.
pub fn load_scene<'a>(data: &'a [u8], options: &SceneOptions) -> Result<LoadedVim<'a>> {
    let model = parse_vim(data)?;
    let scene = build_scene(&model.geometry, options);
    log::info!(
        "scene: {} batches, {} of {} nodes placed",
        scene.batches.len(),
        scene.stats.instanced_nodes + scene.stats.merged_nodes,
        scene.stats.nodes
    );
    Ok(LoadedVim { model, scene })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vim_format::entity::EntityTableBuilder;
    use vim_format::vim::{ELEMENT_TABLE, NODE_TABLE};
    use vim_format::{G3dBuilder, VimBuilder, VimError};

    fn identity_at(x: f32) -> [f32; 16] {
        glam::Mat4::from_translation(glam::Vec3::new(x, 0.0, 0.0)).to_cols_array()
    }

    /// Two meshes; mesh 0 is used by nodes 0 and 1, mesh 1 by node 2,
    /// node 3 has no mesh.
    fn sample() -> Vec<u8> {
        let mut g = G3dBuilder::new("test");
        g.positions(&[
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0,
        ])
        .indices(&[0, 1, 2, 3, 4, 5])
        .submesh_index_offsets(&[0, 3])
        .submesh_materials(&[0, -1])
        .mesh_submesh_offsets(&[0, 1])
        .material_colors(&[0.2, 0.4, 0.6, 1.0])
        .instance_meshes(&[0, 0, 1, -1])
        .instance_transforms(&[identity_at(0.0), identity_at(5.0), identity_at(10.0), identity_at(0.0)].concat());

        let mut vim = VimBuilder::new("vim=1.0", g);
        vim.strings = vec!["".into(), "column".into(), "beam".into()];
        let mut nodes = EntityTableBuilder::new(NODE_TABLE);
        nodes.index("Vim.Element:Element", &[0, 0, 1, 1]);
        let mut elements = EntityTableBuilder::new(ELEMENT_TABLE);
        elements.string("Name", &[1, 2]);
        vim.entities.add(nodes).add(elements);
        vim.build().unwrap()
    }

    #[test]
    fn test_load_scene() {
        let bytes = sample();
        let loaded = load_scene(&bytes, &SceneOptions::default()).unwrap();
        let scene = &loaded.scene;

        assert_eq!(scene.batches.len(), 2);
        assert_eq!(scene.stats.nodes, 4);
        assert_eq!(scene.stats.instanced_nodes, 2);
        assert_eq!(scene.stats.merged_nodes, 1);
        assert_eq!(scene.stats.skipped_instances, 1);
        assert!(scene.batch(BatchId::Instanced(0)).is_some());
        assert!(scene.batch(BatchId::Instanced(1)).is_none());

        let Some(RenderBatch::Merged(m)) = scene.batch(BatchId::Merged) else {
            panic!("expected merged batch");
        };
        assert_eq!(&m.positions[0..3], &[10.0, 0.0, 0.0]);
        assert!(m.colors.as_ref().unwrap().iter().all(|&c| c == 0.5));

        assert!(scene.bounds.contains_point(glam::Vec3::new(11.0, 0.5, 0.0)));
        assert!(scene.bounds.contains_point(glam::Vec3::new(0.2, 0.2, 0.0)));
    }

    #[test]
    fn test_element_name_at() {
        let bytes = sample();
        let loaded = load_scene(&bytes, &SceneOptions::default()).unwrap();
        assert_eq!(loaded.node_at(BatchId::Instanced(0), 1), Some(1));
        assert_eq!(loaded.element_name_at(BatchId::Instanced(0), 1), Some("column"));
        assert_eq!(loaded.element_name_at(BatchId::Merged, 0), Some("beam"));
        assert_eq!(loaded.element_name_at(BatchId::Merged, 1), None);
    }

    #[test]
    fn test_load_is_idempotent() {
        let bytes = sample();
        let options = SceneOptions { vertex_colors: false };
        let a = load_scene(&bytes, &options).unwrap();
        let b = load_scene(&bytes, &options).unwrap();
        assert_eq!(a.scene, b.scene);
        assert_eq!(a.model, b.model);
    }

    #[test]
    fn test_decode_error_passes_through() {
        let err = load_scene(&[0u8; 8], &SceneOptions::default()).unwrap_err();
        assert!(matches!(err, VimError::MalformedContainer(_)));
    }
}
