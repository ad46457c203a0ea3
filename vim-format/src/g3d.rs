//! G3D geometry: a container whose first buffer is a `meta` string and whose
//! remaining buffers are attributes named by a structured descriptor
//! `g3d:<association>:<semantic>:<index>:<data_type>:<arity>`.
//!
//! Decoding validates every index and range table up front; downstream mesh
//! slicing indexes without further bounds checks on the strength of it.

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use bytemuck::Pod;

use crate::bfast::{BFastBuilder, Container};
use crate::error::{invalid_geometry, malformed, Result};
use crate::view::pod_view;

pub const POSITION: &str = "g3d:vertex:position:0:float32:3";
pub const INDEX: &str = "g3d:corner:index:0:int32:1";
pub const MESH_SUBMESH_OFFSET: &str = "g3d:mesh:submeshoffset:0:int32:1";
pub const SUBMESH_INDEX_OFFSET: &str = "g3d:submesh:indexoffset:0:int32:1";
pub const SUBMESH_MATERIAL: &str = "g3d:submesh:material:0:int32:1";
pub const MATERIAL_COLOR: &str = "g3d:material:color:0:float32:4";
pub const INSTANCE_MESH: &str = "g3d:instance:mesh:0:int32:1";
pub const INSTANCE_TRANSFORM: &str = "g3d:instance:transform:0:float32:16";

/// Material index meaning "no material".
pub const NO_MATERIAL: i32 = -1;

/// Which element each attribute value is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Association {
    All,
    Vertex,
    Corner,
    Face,
    Edge,
    Mesh,
    Submesh,
    Material,
    Instance,
    Shape,
    ShapeVertex,
}

impl Association {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "all" => Self::All,
            "vertex" => Self::Vertex,
            "corner" => Self::Corner,
            "face" => Self::Face,
            "edge" => Self::Edge,
            "mesh" => Self::Mesh,
            "submesh" => Self::Submesh,
            "material" => Self::Material,
            "instance" => Self::Instance,
            "shape" => Self::Shape,
            "shapevertex" => Self::ShapeVertex,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Vertex => "vertex",
            Self::Corner => "corner",
            Self::Face => "face",
            Self::Edge => "edge",
            Self::Mesh => "mesh",
            Self::Submesh => "submesh",
            Self::Material => "material",
            Self::Instance => "instance",
            Self::Shape => "shape",
            Self::ShapeVertex => "shapevertex",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl DataType {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "uint8" => Self::U8,
            "int8" => Self::I8,
            "uint16" => Self::U16,
            "int16" => Self::I16,
            "uint32" => Self::U32,
            "int32" => Self::I32,
            "uint64" => Self::U64,
            "int64" => Self::I64,
            "float32" => Self::F32,
            "float64" => Self::F64,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::U16 => "uint16",
            Self::I16 => "int16",
            Self::U32 => "uint32",
            Self::I32 => "int32",
            Self::U64 => "uint64",
            Self::I64 => "int64",
            Self::F32 => "float32",
            Self::F64 => "float64",
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }
}

/// Element types an attribute can be viewed as.
pub trait Scalar: Pod {
    const DATA_TYPE: DataType;
}

macro_rules! scalar {
    ($($t:ty => $dt:ident),* $(,)?) => {
        $(impl Scalar for $t {
            const DATA_TYPE: DataType = DataType::$dt;
        })*
    };
}

scalar!(u8 => U8, i8 => I8, u16 => U16, i16 => I16, u32 => U32, i32 => I32,
        u64 => U64, i64 => I64, f32 => F32, f64 => F64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeDescriptor<'a> {
    pub association: Association,
    pub semantic: &'a str,
    pub index: u32,
    pub data_type: DataType,
    pub arity: usize,
}

impl<'a> AttributeDescriptor<'a> {
    pub fn parse(name: &'a str) -> Result<Self> {
        let bad = || invalid_geometry(format!("bad attribute descriptor '{name}'"));
        let parts: Vec<&str> = name.split(':').collect();
        let [prefix, association, semantic, index, data_type, arity] = parts[..] else {
            return Err(bad());
        };
        if prefix != "g3d" || semantic.is_empty() {
            return Err(bad());
        }
        let arity: usize = arity.parse().map_err(|_| bad())?;
        if arity == 0 {
            return Err(bad());
        }
        Ok(Self {
            association: Association::parse(association).ok_or_else(bad)?,
            semantic,
            index: index.parse().map_err(|_| bad())?,
            data_type: DataType::parse(data_type).ok_or_else(bad)?,
            arity,
        })
    }

    /// Bytes per element (one value times the arity).
    pub fn stride(&self) -> usize {
        self.data_type.size() * self.arity
    }

    fn names(&self, association: Association, semantic: &str) -> bool {
        self.association == association && self.semantic == semantic && self.index == 0
    }
}

impl fmt::Display for AttributeDescriptor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "g3d:{}:{}:{}:{}:{}",
            self.association.name(),
            self.semantic,
            self.index,
            self.data_type.name(),
            self.arity
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute<'a> {
    pub descriptor: AttributeDescriptor<'a>,
    pub bytes: &'a [u8],
}

impl<'a> Attribute<'a> {
    /// Number of elements (values / arity).
    pub fn count(&self) -> usize {
        self.bytes.len() / self.descriptor.stride()
    }

    /// Flat values viewed as `T`, which must match the descriptor's data type.
    pub fn view<T: Scalar>(&self) -> Result<Cow<'a, [T]>> {
        if T::DATA_TYPE != self.descriptor.data_type {
            return Err(invalid_geometry(format!(
                "attribute {} holds {}, read as {}",
                self.descriptor,
                self.descriptor.data_type.name(),
                T::DATA_TYPE.name()
            )));
        }
        pod_view::<T>(self.bytes).ok_or_else(|| {
            invalid_geometry(format!(
                "attribute {} has {} bytes, not a multiple of {}",
                self.descriptor,
                self.bytes.len(),
                self.descriptor.data_type.size()
            ))
        })
    }
}

/// Decoded and validated geometry.
///
/// Typed arrays are views over the input bytes when aligned (see
/// [`pod_view`]); releasing the input invalidates them, which the `'a`
/// lifetime enforces.
#[derive(Clone, Debug, PartialEq)]
pub struct G3d<'a> {
    pub meta: &'a str,
    attributes: Vec<Attribute<'a>>,
    /// Vertex positions, stride 3.
    pub positions: Cow<'a, [f32]>,
    /// Triangle corner indices into `positions`, stride 1.
    pub indices: Cow<'a, [i32]>,
    /// First submesh of each mesh.
    pub mesh_submesh_offsets: Cow<'a, [i32]>,
    /// First index of each submesh.
    pub submesh_index_offsets: Cow<'a, [i32]>,
    /// Material of each submesh, or [`NO_MATERIAL`]. Empty when absent.
    pub submesh_materials: Cow<'a, [i32]>,
    /// Material colors, stride `color_arity`.
    pub material_colors: Cow<'a, [f32]>,
    pub color_arity: usize,
    /// Mesh of each instance; negative for instances without geometry.
    pub instance_meshes: Cow<'a, [i32]>,
    /// 4x4 matrix per instance, stride 16, translation in elements 12..15.
    pub instance_transforms: Cow<'a, [f32]>,
}

impl<'a> G3d<'a> {
    pub fn attributes(&self) -> &[Attribute<'a>] {
        &self.attributes
    }

    pub fn attribute(&self, descriptor: &str) -> Option<&Attribute<'a>> {
        self.attributes
            .iter()
            .find(|a| a.descriptor.to_string() == descriptor)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.mesh_submesh_offsets.len()
    }

    pub fn submesh_count(&self) -> usize {
        self.submesh_index_offsets.len()
    }

    pub fn material_count(&self) -> usize {
        self.material_colors.len() / self.color_arity
    }

    pub fn instance_count(&self) -> usize {
        self.instance_meshes.len()
    }

    pub fn mesh_submesh_range(&self, mesh: usize) -> Range<usize> {
        offset_range(&self.mesh_submesh_offsets, mesh, self.submesh_count())
    }

    pub fn submesh_index_range(&self, submesh: usize) -> Range<usize> {
        offset_range(&self.submesh_index_offsets, submesh, self.index_count())
    }

    /// Index range covered by all submeshes of `mesh`.
    pub fn mesh_index_range(&self, mesh: usize) -> Range<usize> {
        let submeshes = self.mesh_submesh_range(mesh);
        if submeshes.is_empty() {
            return 0..0;
        }
        let start = self.submesh_index_range(submeshes.start).start;
        let end = self.submesh_index_range(submeshes.end - 1).end;
        start..end
    }

    /// RGBA of the submesh's material, `None` when it has no material.
    /// Three-component colors read as opaque.
    pub fn submesh_color(&self, submesh: usize) -> Option<[f32; 4]> {
        let material = usize::try_from(*self.submesh_materials.get(submesh)?).ok()?;
        let c = self
            .material_colors
            .get(material * self.color_arity..(material + 1) * self.color_arity)?;
        Some([c[0], c[1], c[2], if self.color_arity > 3 { c[3] } else { 1.0 }])
    }

    /// Transform of instance `i`, stride-16 flat.
    pub fn instance_transform(&self, i: usize) -> Option<&[f32]> {
        self.instance_transforms.get(i * 16..(i + 1) * 16)
    }

    fn validate(&self) -> Result<()> {
        let vertex_count = self.vertex_count();
        if let Some((i, v)) = self
            .indices
            .iter()
            .enumerate()
            .find(|(_, v)| **v < 0 || **v as usize >= vertex_count)
        {
            return Err(invalid_geometry(format!(
                "index {i} is {v}, vertex count is {vertex_count}"
            )));
        }

        check_offsets("mesh submesh offsets", &self.mesh_submesh_offsets, self.submesh_count())?;
        check_offsets("submesh index offsets", &self.submesh_index_offsets, self.index_count())?;

        if !self.submesh_materials.is_empty() && self.submesh_materials.len() != self.submesh_count() {
            return Err(invalid_geometry(format!(
                "{} submesh materials for {} submeshes",
                self.submesh_materials.len(),
                self.submesh_count()
            )));
        }
        let material_count = self.material_count();
        if let Some((s, m)) = self
            .submesh_materials
            .iter()
            .enumerate()
            .find(|(_, m)| **m != NO_MATERIAL && (**m < 0 || **m as usize >= material_count))
        {
            return Err(invalid_geometry(format!(
                "submesh {s} material {m}, material count is {material_count}"
            )));
        }

        if self.instance_transforms.len() != self.instance_meshes.len() * 16 {
            return Err(invalid_geometry(format!(
                "{} transform values for {} instances",
                self.instance_transforms.len(),
                self.instance_meshes.len()
            )));
        }
        Ok(())
    }
}

fn offset_range(offsets: &[i32], i: usize, total: usize) -> Range<usize> {
    let start = offsets[i] as usize;
    let end = offsets.get(i + 1).map_or(total, |v| *v as usize);
    start..end
}

/// Offsets must be non-negative, non-decreasing, and at most `total`.
fn check_offsets(what: &str, offsets: &[i32], total: usize) -> Result<()> {
    let mut previous = 0i32;
    for (i, v) in offsets.iter().copied().enumerate() {
        if v < previous || v as usize > total {
            return Err(invalid_geometry(format!(
                "{what}: entry {i} is {v} (previous {previous}, total {total})"
            )));
        }
        previous = v;
    }
    Ok(())
}

fn find<'a>(attributes: &[Attribute<'a>], association: Association, semantic: &str) -> Option<Attribute<'a>> {
    attributes
        .iter()
        .find(|a| a.descriptor.names(association, semantic))
        .cloned()
}

/// Typed view of a known attribute, checking its arity. Absent attributes
/// are an error when `required`, otherwise an empty array.
fn known<'a, T: Scalar>(
    attributes: &[Attribute<'a>],
    association: Association,
    semantic: &str,
    arity: usize,
    required: bool,
) -> Result<Cow<'a, [T]>> {
    match find(attributes, association, semantic) {
        Some(a) if a.descriptor.arity != arity => Err(invalid_geometry(format!(
            "attribute {} should have arity {arity}",
            a.descriptor
        ))),
        Some(a) => a.view::<T>(),
        None if required => Err(invalid_geometry(format!(
            "missing {}:{semantic} attribute",
            association.name()
        ))),
        None => Ok(Cow::Borrowed(&[])),
    }
}

/// Decodes and validates a geometry container.
pub fn decode_g3d<'a>(container: &Container<'a>) -> Result<G3d<'a>> {
    container.require("g3d", 2)?;
    let names = container.names();
    let buffers = container.buffers();
    if names[0] != "meta" {
        return Err(malformed(format!(
            "first g3d buffer is '{}', expected 'meta'",
            names[0]
        )));
    }
    let meta = std::str::from_utf8(buffers[0])
        .map_err(|e| malformed(format!("g3d meta is not UTF-8: {e}")))?;

    let mut attributes = Vec::with_capacity(names.len() - 1);
    for (&name, &bytes) in names[1..].iter().zip(&buffers[1..]) {
        let descriptor = AttributeDescriptor::parse(name)?;
        if bytes.len() % descriptor.stride() != 0 {
            return Err(invalid_geometry(format!(
                "attribute {name} has {} bytes, not a multiple of its stride {}",
                bytes.len(),
                descriptor.stride()
            )));
        }
        attributes.push(Attribute { descriptor, bytes });
    }

    let color_arity = find(&attributes, Association::Material, "color")
        .map_or(4, |a| a.descriptor.arity);
    if color_arity < 3 {
        return Err(invalid_geometry(format!(
            "material colors need at least 3 components, found {color_arity}"
        )));
    }

    use Association::*;
    let g3d = G3d {
        meta,
        positions: known(&attributes, Vertex, "position", 3, true)?,
        indices: known(&attributes, Corner, "index", 1, true)?,
        mesh_submesh_offsets: known(&attributes, Mesh, "submeshoffset", 1, false)?,
        submesh_index_offsets: known(&attributes, Submesh, "indexoffset", 1, false)?,
        submesh_materials: known(&attributes, Submesh, "material", 1, false)?,
        material_colors: known(&attributes, Material, "color", color_arity, false)?,
        color_arity,
        instance_meshes: known(&attributes, Instance, "mesh", 1, false)?,
        instance_transforms: known(&attributes, Instance, "transform", 16, false)?,
        attributes,
    };
    g3d.validate()?;

    log::debug!(
        "g3d: {} vertices, {} indices, {} meshes, {} submeshes, {} materials, {} instances",
        g3d.vertex_count(),
        g3d.index_count(),
        g3d.mesh_count(),
        g3d.submesh_count(),
        g3d.material_count(),
        g3d.instance_count()
    );
    Ok(g3d)
}

/// Writes a geometry container.
#[derive(Clone, Debug)]
pub struct G3dBuilder {
    meta: String,
    attributes: BFastBuilder,
}

impl G3dBuilder {
    pub fn new(meta: impl Into<String>) -> Self {
        Self { meta: meta.into(), attributes: BFastBuilder::new() }
    }

    /// Adds an attribute under a literal descriptor, unchecked.
    pub fn attribute<T: Scalar>(&mut self, descriptor: &str, data: &[T]) -> &mut Self {
        self.attributes.add_pod(descriptor, data);
        self
    }

    pub fn positions(&mut self, data: &[f32]) -> &mut Self {
        self.attribute(POSITION, data)
    }

    pub fn indices(&mut self, data: &[i32]) -> &mut Self {
        self.attribute(INDEX, data)
    }

    pub fn mesh_submesh_offsets(&mut self, data: &[i32]) -> &mut Self {
        self.attribute(MESH_SUBMESH_OFFSET, data)
    }

    pub fn submesh_index_offsets(&mut self, data: &[i32]) -> &mut Self {
        self.attribute(SUBMESH_INDEX_OFFSET, data)
    }

    pub fn submesh_materials(&mut self, data: &[i32]) -> &mut Self {
        self.attribute(SUBMESH_MATERIAL, data)
    }

    /// RGBA per material.
    pub fn material_colors(&mut self, data: &[f32]) -> &mut Self {
        self.attribute(MATERIAL_COLOR, data)
    }

    pub fn instance_meshes(&mut self, data: &[i32]) -> &mut Self {
        self.attribute(INSTANCE_MESH, data)
    }

    pub fn instance_transforms(&mut self, data: &[f32]) -> &mut Self {
        self.attribute(INSTANCE_TRANSFORM, data)
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        let mut out = BFastBuilder::new();
        out.add("meta", self.meta.as_bytes().to_vec());
        for (name, data) in self.attributes.entries() {
            out.add(name.clone(), data.clone());
        }
        out.build()
    }
}
