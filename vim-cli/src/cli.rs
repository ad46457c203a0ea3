use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vim_scene::SceneOptions;

#[derive(Parser)]
#[command(name = "vimcli", about = "Inspect VIM scene files", version)]
pub struct Cli {
    /// Leave material colors out of the rebuilt scene
    #[arg(long, global = true)]
    pub no_vertex_colors: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn scene_options(&self) -> SceneOptions {
        SceneOptions { vertex_colors: !self.no_vertex_colors }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Print header, sections, geometry counts and scene statistics
    Inspect {
        /// Path to the .vim file
        file: PathBuf,
    },
    /// List entity tables and their columns
    Tables {
        /// Path to the .vim file
        file: PathBuf,
        /// Only show this table
        #[arg(short, long)]
        table: Option<String>,
    },
    /// Show a node's element name and where it is drawn
    Node {
        /// Path to the .vim file
        file: PathBuf,
        /// Node id (instance index)
        node: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_command() {
        let cli = Cli::try_parse_from(["vimcli", "node", "model.vim", "42"]).unwrap();
        assert!(cli.scene_options().vertex_colors);
        match cli.command {
            Command::Node { file, node } => {
                assert_eq!(file, PathBuf::from("model.vim"));
                assert_eq!(node, 42);
            }
            _ => panic!("expected node command"),
        }
    }

    #[test]
    fn test_global_color_flag() {
        let cli =
            Cli::try_parse_from(["vimcli", "tables", "m.vim", "--no-vertex-colors", "-t", "Vim.Node"])
                .unwrap();
        assert!(!cli.scene_options().vertex_colors);
        assert!(matches!(cli.command, Command::Tables { table: Some(_), .. }));
    }
}
