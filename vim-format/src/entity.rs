//! Entity tables: named sets of typed columns describing the model's domain
//! objects (nodes, elements, categories, ...).
//!
//! The `entities` section is a container of containers. Outer names are table
//! names; inner names are `type:columnName`, where the type tag picks how the
//! column bytes are viewed.

use std::borrow::Cow;

use crate::bfast::{self, BFastBuilder, Container};
use crate::error::{malformed, Result, VimError};
use crate::view::pod_view;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// `numeric:`, f64 values.
    Numeric,
    /// `index:`, i32 row indices into another table, -1 for none.
    Index,
    /// `string:`, i32 indices into the string table, -1 for none.
    String,
    /// `properties:`, opaque bytes, kept uninterpreted.
    Properties,
}

impl ColumnKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "numeric" => Some(Self::Numeric),
            "index" => Some(Self::Index),
            "string" => Some(Self::String),
            "properties" => Some(Self::Properties),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Index => "index",
            Self::String => "string",
            Self::Properties => "properties",
        }
    }
}

/// One decoded column. Borrowed variants alias the input bytes; `Owned`
/// only appears when the source bytes were not aligned for the element type.
#[derive(Clone, Debug, PartialEq)]
pub enum Column<'a> {
    Numeric(Cow<'a, [f64]>),
    Index(Cow<'a, [i32]>),
    String(Cow<'a, [i32]>),
    Properties(&'a [u8]),
}

impl<'a> Column<'a> {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Numeric(_) => ColumnKind::Numeric,
            Column::Index(_) => ColumnKind::Index,
            Column::String(_) => ColumnKind::String,
            Column::Properties(_) => ColumnKind::Properties,
        }
    }

    /// Element count; byte count for properties.
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Index(v) | Column::String(v) => v.len(),
            Column::Properties(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityTable<'a> {
    pub name: &'a str,
    columns: Vec<(&'a str, Column<'a>)>,
}

impl<'a> EntityTable<'a> {
    /// Columns in file order, keyed by name without the type tag.
    pub fn columns(&self) -> impl Iterator<Item = (&'a str, &Column<'a>)> + '_ {
        self.columns.iter().map(|(name, col)| (*name, col))
    }

    pub fn column(&self, name: &str) -> Option<&Column<'a>> {
        self.columns
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, col)| col)
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find_map(|(n, col)| match col {
            Column::Numeric(v) if *n == name => Some(&**v),
            _ => None,
        })
    }

    pub fn index(&self, name: &str) -> Option<&[i32]> {
        self.columns.iter().find_map(|(n, col)| match col {
            Column::Index(v) if *n == name => Some(&**v),
            _ => None,
        })
    }

    pub fn string_index(&self, name: &str) -> Option<&[i32]> {
        self.columns.iter().find_map(|(n, col)| match col {
            Column::String(v) if *n == name => Some(&**v),
            _ => None,
        })
    }

    pub fn properties(&self, name: &str) -> Option<&'a [u8]> {
        self.columns.iter().find_map(|(n, col)| match col {
            Column::Properties(b) if *n == name => Some(*b),
            _ => None,
        })
    }

    /// Row at `row` of an index column; `None` for missing rows and negative sentinels.
    pub fn index_value(&self, name: &str, row: usize) -> Option<usize> {
        let v = *self.index(name)?.get(row)?;
        usize::try_from(v).ok()
    }

    /// Row at `row` of a string column as a string-table index.
    pub fn string_index_value(&self, name: &str, row: usize) -> Option<usize> {
        let v = *self.string_index(name)?.get(row)?;
        usize::try_from(v).ok()
    }

    /// Longest typed column. Columns are only conventionally the same length.
    pub fn row_count(&self) -> usize {
        self.columns
            .iter()
            .filter(|(_, col)| col.kind() != ColumnKind::Properties)
            .map(|(_, col)| col.len())
            .max()
            .unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityTables<'a> {
    tables: Vec<EntityTable<'a>>,
}

impl<'a> EntityTables<'a> {
    pub fn table(&self, name: &str) -> Option<&EntityTable<'a>> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn tables(&self) -> &[EntityTable<'a>] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn decode_column<'a>(table: &str, full_name: &'a str, bytes: &'a [u8]) -> Result<(&'a str, Column<'a>)> {
    let (tag, name) = full_name.split_once(':').unwrap_or((full_name, ""));
    let kind = ColumnKind::from_tag(tag).ok_or_else(|| VimError::UnknownColumnType {
        table: table.to_string(),
        column: name.to_string(),
        tag: tag.to_string(),
    })?;

    let ragged = |width: usize| {
        malformed(format!(
            "column '{full_name}' in table '{table}' has {} bytes, not a multiple of {width}",
            bytes.len()
        ))
    };
    let column = match kind {
        ColumnKind::Numeric => Column::Numeric(pod_view::<f64>(bytes).ok_or_else(|| ragged(8))?),
        ColumnKind::Index => Column::Index(pod_view::<i32>(bytes).ok_or_else(|| ragged(4))?),
        ColumnKind::String => Column::String(pod_view::<i32>(bytes).ok_or_else(|| ragged(4))?),
        ColumnKind::Properties => Column::Properties(bytes),
    };
    Ok((name, column))
}

/// Decodes one table from its inner container bytes.
pub fn decode_table<'a>(name: &'a str, bytes: &'a [u8]) -> Result<EntityTable<'a>> {
    let inner = bfast::parse(bytes)?;
    let columns = inner
        .iter()
        .map(|(column, data)| decode_column(name, column, data))
        .collect::<Result<Vec<_>>>()?;
    Ok(EntityTable { name, columns })
}

/// Decodes every table of an `entities` container.
pub fn decode_entity_tables<'a>(container: &Container<'a>) -> Result<EntityTables<'a>> {
    let tables = container
        .iter()
        .map(|(name, bytes)| decode_table(name, bytes))
        .collect::<Result<Vec<_>>>()?;
    log::debug!("entities: {} tables", tables.len());
    Ok(EntityTables { tables })
}

/// Writes one table's columns as an inner container.
#[derive(Clone, Debug)]
pub struct EntityTableBuilder {
    name: String,
    columns: BFastBuilder,
}

impl EntityTableBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: BFastBuilder::new() }
    }

    pub fn numeric(&mut self, column: &str, values: &[f64]) -> &mut Self {
        self.columns.add_pod(format!("numeric:{column}"), values);
        self
    }

    pub fn index(&mut self, column: &str, values: &[i32]) -> &mut Self {
        self.columns.add_pod(format!("index:{column}"), values);
        self
    }

    pub fn string(&mut self, column: &str, values: &[i32]) -> &mut Self {
        self.columns.add_pod(format!("string:{column}"), values);
        self
    }

    pub fn properties(&mut self, column: &str, bytes: Vec<u8>) -> &mut Self {
        self.columns.add(format!("properties:{column}"), bytes);
        self
    }

    /// Adds a column under a literal `type:name`, tag unchecked.
    pub fn raw(&mut self, full_name: &str, bytes: Vec<u8>) -> &mut Self {
        self.columns.add(full_name, bytes);
        self
    }
}

/// Writes a set of tables as an `entities` container.
#[derive(Clone, Debug, Default)]
pub struct EntityTablesBuilder {
    tables: Vec<EntityTableBuilder>,
}

impl EntityTablesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, table: EntityTableBuilder) -> &mut Self {
        self.tables.push(table);
        self
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut outer = BFastBuilder::new();
        for table in &self.tables {
            outer.add(table.name.clone(), table.columns.build()?);
        }
        outer.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_entities() -> Vec<u8> {
        let mut node = EntityTableBuilder::new("Vim.Node");
        node.index("Vim.Element:Element", &[1, -1, 0]);
        let mut element = EntityTableBuilder::new("Vim.Element");
        element
            .string("Name", &[3, 4])
            .numeric("Elevation", &[1.5, -2.25])
            .properties("Blob", vec![0xde, 0xad, 0xbe]);
        let mut tables = EntityTablesBuilder::new();
        tables.add(node).add(element);
        tables.build().unwrap()
    }

    #[test]
    fn test_decode_typed_columns() {
        let bytes = build_entities();
        let outer = bfast::parse(&bytes).unwrap();
        let tables = decode_entity_tables(&outer).unwrap();
        assert_eq!(tables.len(), 2);

        let node = tables.table("Vim.Node").unwrap();
        assert_eq!(node.index("Vim.Element:Element"), Some(&[1, -1, 0][..]));
        assert_eq!(node.row_count(), 3);

        let element = tables.table("Vim.Element").unwrap();
        assert_eq!(element.string_index("Name"), Some(&[3, 4][..]));
        assert_eq!(element.numeric("Elevation"), Some(&[1.5, -2.25][..]));
        assert_eq!(element.properties("Blob"), Some(&[0xde, 0xad, 0xbe][..]));
        assert_eq!(element.column("Blob").unwrap().kind(), ColumnKind::Properties);
        assert_eq!(element.column_count(), 3);
        assert_eq!(element.row_count(), 2);
    }

    #[test]
    fn test_typed_getters_do_not_cross_kinds() {
        let bytes = build_entities();
        let outer = bfast::parse(&bytes).unwrap();
        let tables = decode_entity_tables(&outer).unwrap();
        let element = tables.table("Vim.Element").unwrap();
        assert!(element.index("Name").is_none());
        assert!(element.numeric("Name").is_none());
        assert!(tables.table("Vim.Missing").is_none());
    }

    #[test]
    fn test_index_value_sentinels() {
        let bytes = build_entities();
        let outer = bfast::parse(&bytes).unwrap();
        let tables = decode_entity_tables(&outer).unwrap();
        let node = tables.table("Vim.Node").unwrap();
        assert_eq!(node.index_value("Vim.Element:Element", 0), Some(1));
        assert_eq!(node.index_value("Vim.Element:Element", 1), None);
        assert_eq!(node.index_value("Vim.Element:Element", 9), None);
        assert_eq!(node.index_value("Other", 0), None);
    }

    #[test]
    fn test_unknown_column_type() {
        let mut table = EntityTableBuilder::new("Vim.Thing");
        table.raw("float:Width", vec![0u8; 4]);
        let mut tables = EntityTablesBuilder::new();
        tables.add(table);
        let bytes = tables.build().unwrap();
        let outer = bfast::parse(&bytes).unwrap();

        match decode_entity_tables(&outer) {
            Err(VimError::UnknownColumnType { table, column, tag }) => {
                assert_eq!(table, "Vim.Thing");
                assert_eq!(column, "Width");
                assert_eq!(tag, "float");
            }
            other => panic!("expected UnknownColumnType, got {other:?}"),
        }
    }

    #[test]
    fn test_ragged_numeric_column() {
        let mut table = EntityTableBuilder::new("Vim.Thing");
        table.raw("numeric:Width", vec![0u8; 12]);
        let mut tables = EntityTablesBuilder::new();
        tables.add(table);
        let bytes = tables.build().unwrap();
        let outer = bfast::parse(&bytes).unwrap();
        assert!(matches!(
            decode_entity_tables(&outer),
            Err(VimError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_table_that_is_not_a_container() {
        let mut outer = BFastBuilder::new();
        outer.add("Vim.Node", vec![1u8, 2, 3]);
        let bytes = outer.build().unwrap();
        let outer = bfast::parse(&bytes).unwrap();
        assert!(matches!(
            decode_entity_tables(&outer),
            Err(VimError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_column_views_alias_input() {
        let bytes = build_entities();
        let outer = bfast::parse(&bytes).unwrap();
        let tables = decode_entity_tables(&outer).unwrap();
        let element = tables.table("Vim.Element").unwrap();
        let blob = element.properties("Blob").unwrap();
        let base = bytes.as_ptr() as usize;
        let at = blob.as_ptr() as usize;
        assert!(at >= base && at + blob.len() <= base + bytes.len());
    }
}
