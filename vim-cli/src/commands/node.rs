use std::fmt::Write;
use std::path::PathBuf;

use vim_scene::{load_scene, BatchId, SceneOptions};

pub async fn run(file: PathBuf, node: usize, options: SceneOptions) -> anyhow::Result<()> {
    let report = super::with_file(file, move |_, bytes| report(bytes, node, &options)).await?;
    print!("{report}");
    Ok(())
}

pub fn report(bytes: &[u8], node: usize, options: &SceneOptions) -> anyhow::Result<String> {
    let loaded = load_scene(bytes, options)?;
    let nodes = loaded.scene.index_maps.node_count();
    if node >= nodes {
        anyhow::bail!("node {node} out of range, model has {nodes} nodes");
    }

    let mut out = String::new();
    writeln!(out, "Node {node}")?;
    match loaded.model.element_index_of_node(node) {
        Some(element) => writeln!(out, "  element  {element}")?,
        None => writeln!(out, "  element  none")?,
    }
    writeln!(out, "  name     {}", loaded.model.element_name(node).unwrap_or("-"))?;

    match loaded.scene.index_maps.location_of(node) {
        Some(location) => {
            let batch = match location.batch {
                BatchId::Instanced(mesh) => format!("instanced (mesh {mesh})"),
                BatchId::Merged => "merged".to_string(),
            };
            writeln!(out, "  batch    {batch}")?;
            writeln!(out, "  slot     {}", location.slot)?;
        }
        None => writeln!(out, "  batch    not drawn")?,
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::sample;

    #[test]
    fn test_drawn_node() {
        let bytes = sample();
        let text = report(&bytes, 0, &SceneOptions::default()).unwrap();
        assert!(text.contains("name     wall"));
        assert!(text.contains("batch    merged"));
    }

    #[test]
    fn test_undrawn_node() {
        let bytes = sample();
        let text = report(&bytes, 1, &SceneOptions::default()).unwrap();
        assert!(text.contains("element  none"));
        assert!(text.contains("not drawn"));
        assert!(report(&bytes, 2, &SceneOptions::default()).is_err());
    }
}
