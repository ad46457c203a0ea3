use std::fmt::Write;
use std::path::{Path, PathBuf};

use vim_format::bfast;
use vim_scene::{load_scene, SceneOptions};

pub async fn run(file: PathBuf, options: SceneOptions) -> anyhow::Result<()> {
    let report = super::with_file(file, move |path, bytes| report(path, bytes, &options)).await?;
    print!("{report}");
    Ok(())
}

pub fn report(path: &Path, bytes: &[u8], options: &SceneOptions) -> anyhow::Result<String> {
    let outer = bfast::parse(bytes)?;
    let loaded = load_scene(bytes, options)?;
    let model = &loaded.model;
    let g3d = &model.geometry;
    let scene = &loaded.scene;
    let mut out = String::new();

    writeln!(out, "File: {} ({} bytes)", path.display(), bytes.len())?;

    writeln!(out, "Header:")?;
    for (key, value) in model.header.fields() {
        writeln!(out, "  {key} = {value}")?;
    }

    writeln!(out, "Sections:")?;
    for (name, buffer) in outer.iter() {
        writeln!(out, "  {name:<10} {:>12} bytes", buffer.len())?;
    }

    writeln!(out, "Entities: {} tables", model.entities.len())?;
    for table in model.entities.tables() {
        writeln!(
            out,
            "  {:<40} {:>8} rows {:>4} columns",
            table.name,
            table.row_count(),
            table.column_count()
        )?;
    }
    writeln!(out, "Strings: {}", model.strings.len())?;

    writeln!(out, "Geometry:")?;
    writeln!(out, "  vertices   {}", g3d.vertex_count())?;
    writeln!(out, "  triangles  {}", g3d.index_count() / 3)?;
    writeln!(out, "  meshes     {}", g3d.mesh_count())?;
    writeln!(out, "  submeshes  {}", g3d.submesh_count())?;
    writeln!(out, "  materials  {}", g3d.material_count())?;
    writeln!(out, "  instances  {}", g3d.instance_count())?;

    let stats = &scene.stats;
    writeln!(out, "Scene:")?;
    writeln!(out, "  batches          {}", scene.batches.len())?;
    writeln!(out, "  instanced        {} nodes in {} batches", stats.instanced_nodes, stats.instanced_batches)?;
    writeln!(out, "  merged           {} nodes, {} triangles", stats.merged_nodes, stats.merged_triangles)?;
    writeln!(out, "  skipped          {}", stats.skipped_instances)?;
    writeln!(out, "  empty meshes     {}", stats.empty_meshes)?;
    if scene.bounds.is_empty() {
        writeln!(out, "  bounds           empty")?;
    } else {
        let c = scene.bounds.center;
        writeln!(
            out,
            "  bounds           center ({:.3}, {:.3}, {:.3}) radius {:.3}",
            c.x, c.y, c.z, scene.bounds.radius
        )?;
    }

    Ok(out)
}
