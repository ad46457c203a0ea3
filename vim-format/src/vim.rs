//! The assembled VIM model: header text, entity tables, string table and
//! geometry, decoded from the outer container of a `.vim` file.

use crate::bfast::{self, split_nul_list, BFastBuilder, Container};
use crate::entity::{decode_entity_tables, EntityTable, EntityTables, EntityTablesBuilder};
use crate::error::{malformed, Result, VimError};
use crate::g3d::{decode_g3d, G3d, G3dBuilder};

pub const HEADER: &str = "header";
pub const ASSETS: &str = "assets";
pub const ENTITIES: &str = "entities";
pub const STRINGS: &str = "strings";
pub const GEOMETRY: &str = "geometry";

/// Sections every file carries, in the order they are written.
pub const REQUIRED_SECTIONS: [&str; 5] = [HEADER, ASSETS, ENTITIES, STRINGS, GEOMETRY];

pub const NODE_TABLE: &str = "Vim.Node";
pub const ELEMENT_TABLE: &str = "Vim.Element";
/// Index column on the node table pointing at the element table.
pub const NODE_ELEMENT_COLUMN: &str = "Vim.Element:Element";
/// String column on the element table.
pub const ELEMENT_NAME_COLUMN: &str = "Name";

/// `key=value` lines of the header section, in file order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VimHeader<'a> {
    pub raw: &'a str,
    fields: Vec<(&'a str, &'a str)>,
}

impl<'a> VimHeader<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let fields = raw
            .trim_end_matches('\0')
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| line.split_once('=').unwrap_or((line, "")))
            .collect();
        Self { raw, fields }
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn fields(&self) -> &[(&'a str, &'a str)] {
        &self.fields
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VimModel<'a> {
    pub header: VimHeader<'a>,
    /// Embedded files by name; `None` when the section is empty.
    pub assets: Option<Container<'a>>,
    pub entities: EntityTables<'a>,
    pub strings: Vec<&'a str>,
    pub geometry: G3d<'a>,
}

impl<'a> VimModel<'a> {
    pub fn string(&self, index: usize) -> Option<&'a str> {
        self.strings.get(index).copied()
    }

    pub fn table(&self, name: &str) -> Option<&EntityTable<'a>> {
        self.entities.table(name)
    }

    pub fn asset(&self, name: &str) -> Option<&'a [u8]> {
        self.assets.as_ref()?.get(name)
    }

    /// Value of a `string:` column resolved through the string table.
    pub fn string_column_value(&self, table: &str, column: &str, row: usize) -> Option<&'a str> {
        let index = self.table(table)?.string_index_value(column, row)?;
        self.string(index)
    }

    pub fn element_index_of_node(&self, node: usize) -> Option<usize> {
        self.table(NODE_TABLE)?.index_value(NODE_ELEMENT_COLUMN, node)
    }

    /// Node -> element -> name string. `None` when any hop is missing.
    pub fn element_name(&self, node: usize) -> Option<&'a str> {
        let element = self.element_index_of_node(node)?;
        self.string_column_value(ELEMENT_TABLE, ELEMENT_NAME_COLUMN, element)
    }
}

fn utf8<'a>(section: &str, bytes: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| malformed(format!("{section} is not UTF-8: {e}")))
}

fn section<'a>(container: &Container<'a>, name: &str) -> Result<&'a [u8]> {
    container.get(name).ok_or_else(|| VimError::InsufficientBuffers {
        context: format!("vim file has no '{name}' section"),
        expected: REQUIRED_SECTIONS.len(),
        found: container.len(),
    })
}

/// Decodes a whole `.vim` file. Errors from the nested decoders are returned
/// exactly as raised.
pub fn parse_vim(data: &[u8]) -> Result<VimModel<'_>> {
    let outer = bfast::parse(data)?;
    assemble(&outer)
}

/// Decodes `len` bytes starting at `offset` as a `.vim` file.
pub fn parse_vim_with_range(data: &[u8], offset: usize, len: usize) -> Result<VimModel<'_>> {
    let outer = bfast::parse_with_range(data, offset, len)?;
    assemble(&outer)
}

fn assemble<'a>(outer: &Container<'a>) -> Result<VimModel<'a>> {
    outer.require("vim file", REQUIRED_SECTIONS.len())?;

    let header = VimHeader::parse(utf8(HEADER, section(outer, HEADER)?)?);
    let strings = split_nul_list(utf8(STRINGS, section(outer, STRINGS)?)?);

    let asset_bytes = section(outer, ASSETS)?;
    let assets = if asset_bytes.is_empty() {
        None
    } else {
        Some(bfast::parse(asset_bytes)?)
    };

    let geometry = decode_g3d(&bfast::parse(section(outer, GEOMETRY)?)?)?;
    let entities = decode_entity_tables(&bfast::parse(section(outer, ENTITIES)?)?)?;

    log::info!(
        "vim: {} tables, {} strings, {} meshes, {} instances",
        entities.len(),
        strings.len(),
        geometry.mesh_count(),
        geometry.instance_count()
    );
    Ok(VimModel { header, assets, entities, strings, geometry })
}

/// Writes a complete `.vim` file.
#[derive(Clone, Debug)]
pub struct VimBuilder {
    pub header: String,
    pub assets: BFastBuilder,
    pub entities: EntityTablesBuilder,
    pub strings: Vec<String>,
    pub geometry: G3dBuilder,
}

impl VimBuilder {
    pub fn new(header: impl Into<String>, geometry: G3dBuilder) -> Self {
        Self {
            header: header.into(),
            assets: BFastBuilder::new(),
            entities: EntityTablesBuilder::new(),
            strings: Vec::new(),
            geometry,
        }
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let assets = if self.assets.is_empty() {
            Vec::new()
        } else {
            self.assets.build()?
        };
        let mut strings = Vec::new();
        for s in &self.strings {
            strings.extend_from_slice(s.as_bytes());
            strings.push(0);
        }

        let mut out = BFastBuilder::new();
        out.add(HEADER, self.header.as_bytes().to_vec())
            .add(ASSETS, assets)
            .add(ENTITIES, self.entities.build()?)
            .add(STRINGS, strings)
            .add(GEOMETRY, self.geometry.build()?);
        out.build()
    }
}
