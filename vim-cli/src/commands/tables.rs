use std::fmt::Write;
use std::path::{Path, PathBuf};

use vim_format::{parse_vim, EntityTable};

pub async fn run(file: PathBuf, table: Option<String>) -> anyhow::Result<()> {
    let report = super::with_file(file, move |path, bytes| report(path, bytes, table.as_deref())).await?;
    print!("{report}");
    Ok(())
}

pub fn report(path: &Path, bytes: &[u8], only: Option<&str>) -> anyhow::Result<String> {
    let model = parse_vim(bytes)?;
    let tables: Vec<&EntityTable<'_>> = match only {
        Some(name) => vec![model
            .table(name)
            .ok_or_else(|| anyhow::anyhow!("{} has no table '{name}'", path.display()))?],
        None => model.entities.tables().iter().collect(),
    };

    let mut out = String::new();
    for table in tables {
        writeln!(out, "{} ({} rows)", table.name, table.row_count())?;
        for (name, column) in table.columns() {
            writeln!(out, "  {:<11} {:<40} {:>8}", column.kind().tag(), name, column.len())?;
        }
    }
    Ok(out)
}
