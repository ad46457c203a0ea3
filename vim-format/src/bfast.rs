//! BFast container reader and writer.
//!
//! A BFast container is a flat array-of-arrays: a 32-byte header, a table of
//! `[begin, end)` descriptors, and a data region holding the arrays. The first
//! array is the NUL-joined list of names for the remaining arrays. Containers
//! nest freely: any named array may itself be a container, so parsing is a
//! plain function over a byte view with no shared state.

use std::ops::Range;

use bytemuck::Pod;

use crate::error::{malformed, Result, VimError};

/// Magic number stored in the low word of the first header field.
pub const BFAST_MAGIC: u32 = 0xBFA5;
/// Header size in bytes (four little-endian u64 fields).
pub const HEADER_SIZE: usize = 32;
/// Size of one `[begin, end)` descriptor in bytes (two u64 fields).
pub const DESCRIPTOR_SIZE: usize = 16;
/// Arrays written by [`BFastBuilder`] start on this boundary.
pub const ALIGNMENT: usize = 64;

/// Decoded container header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BFastHeader {
    pub magic: u32,
    pub data_start: usize,
    pub data_end: usize,
    /// Number of arrays including the leading name list.
    pub num_arrays: usize,
}

/// A parsed container. Names and buffers borrow from the input bytes.
///
/// `names.len() == buffers.len() == header.num_arrays - 1`: the name list
/// itself is consumed during parsing and not exposed as a buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container<'a> {
    pub header: BFastHeader,
    names: Vec<&'a str>,
    buffers: Vec<&'a [u8]>,
    ranges: Vec<Range<usize>>,
}

impl<'a> Container<'a> {
    pub fn names(&self) -> &[&'a str] {
        &self.names
    }

    pub fn buffers(&self) -> &[&'a [u8]] {
        &self.buffers
    }

    /// Byte range of each named buffer, relative to the container start.
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// First buffer with the given name.
    pub fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|i| self.buffers[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a [u8])> + '_ {
        self.names.iter().copied().zip(self.buffers.iter().copied())
    }

    /// Fails with `InsufficientBuffers` unless at least `expected` buffers are present.
    pub fn require(&self, context: &str, expected: usize) -> Result<()> {
        if self.len() < expected {
            return Err(VimError::InsufficientBuffers {
                context: context.to_string(),
                expected,
                found: self.len(),
            });
        }
        Ok(())
    }
}

// ── Word reader over the header and descriptor table ──

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.pos + 4 <= self.data.len() {
            let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
            self.pos += 4;
            Some(v)
        } else {
            None
        }
    }

    /// Reads a u64 field as its low word, requiring the reserved high word to be 0.
    fn read_field(&mut self) -> Result<usize> {
        let at = self.pos;
        let low = self
            .read_u32()
            .ok_or_else(|| malformed(format!("truncated at byte {at}")))?;
        let high = self
            .read_u32()
            .ok_or_else(|| malformed(format!("truncated at byte {}", at + 4)))?;
        if high != 0 {
            return Err(malformed(format!("expected 0 at byte {}", at + 4)));
        }
        Ok(low as usize)
    }
}

fn parse_header(data: &[u8]) -> Result<BFastHeader> {
    if data.len() < HEADER_SIZE {
        return Err(malformed(format!(
            "{} bytes is too short for a {HEADER_SIZE}-byte header",
            data.len()
        )));
    }
    let mut c = Cursor::new(data);
    let magic = c.read_field()? as u32;
    let data_start = c.read_field()?;
    let data_end = c.read_field()?;
    let num_arrays = c.read_field()?;

    if magic != BFAST_MAGIC {
        return Err(malformed(format!("bad magic {magic:#x}")));
    }
    if num_arrays == 0 {
        return Err(VimError::InsufficientBuffers {
            context: "bfast container".to_string(),
            expected: 1,
            found: 0,
        });
    }
    let table_end = num_arrays
        .checked_mul(DESCRIPTOR_SIZE)
        .and_then(|n| n.checked_add(HEADER_SIZE))
        .ok_or_else(|| malformed(format!("array count {num_arrays} overflows")))?;
    if data_start < table_end {
        return Err(malformed(format!(
            "data start {data_start} overlaps descriptor table ending at {table_end}"
        )));
    }
    if data_end < data_start || data_end > data.len() {
        return Err(malformed(format!(
            "data end {data_end} outside {data_start}..={}",
            data.len()
        )));
    }

    Ok(BFastHeader { magic, data_start, data_end, num_arrays })
}

/// Splits a NUL-joined list after stripping exactly one trailing NUL.
/// An empty list decodes to no entries.
pub fn split_nul_list(text: &str) -> Vec<&str> {
    let text = text.strip_suffix('\0').unwrap_or(text);
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\0').collect()
    }
}

/// Parses a whole byte slice as a container.
pub fn parse(data: &[u8]) -> Result<Container<'_>> {
    let header = parse_header(data)?;

    let mut c = Cursor::new(data);
    c.pos = HEADER_SIZE;
    let mut ranges = Vec::with_capacity(header.num_arrays);
    let mut previous_end = header.data_start;
    for i in 0..header.num_arrays {
        let begin = c.read_field()?;
        let end = c.read_field()?;
        if begin < header.data_start || begin > header.data_end {
            return Err(malformed(format!(
                "array {i} start {begin} outside {}..={}",
                header.data_start, header.data_end
            )));
        }
        if end < begin || end > header.data_end {
            return Err(malformed(format!(
                "array {i} end {end} outside {begin}..={}",
                header.data_end
            )));
        }
        if begin < previous_end {
            return Err(malformed(format!(
                "array {i} starts at {begin}, before the previous array ends at {previous_end}"
            )));
        }
        previous_end = end;
        ranges.push(begin..end);
    }

    let name_bytes = &data[ranges[0].clone()];
    let name_text = std::str::from_utf8(name_bytes)
        .map_err(|e| malformed(format!("array names are not UTF-8: {e}")))?;
    let names = split_nul_list(name_text);
    let expected = header.num_arrays - 1;
    if names.len() != expected {
        return Err(malformed(format!(
            "{} names for {expected} arrays",
            names.len()
        )));
    }

    ranges.remove(0);
    let buffers = ranges.iter().map(|r| &data[r.clone()]).collect();
    log::debug!(
        "bfast: {} arrays in data region {}..{}",
        expected,
        header.data_start,
        header.data_end
    );

    Ok(Container { header, names, buffers, ranges })
}

/// Parses `len` bytes starting at `offset` as a container.
pub fn parse_with_range(data: &[u8], offset: usize, len: usize) -> Result<Container<'_>> {
    let end = offset
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            malformed(format!(
                "range {offset}+{len} outside a {}-byte buffer",
                data.len()
            ))
        })?;
    parse(&data[offset..end])
}

fn align(n: usize) -> usize {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Writes named buffers as a container.
#[derive(Clone, Debug, Default)]
pub struct BFastBuilder {
    entries: Vec<(String, Vec<u8>)>,
}

impl BFastBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adding a name that is already present replaces its data in place.
    pub fn add(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        let name = name.into();
        let data = data.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = data,
            None => self.entries.push((name, data)),
        }
        self
    }

    /// Adds a typed array, stored in native (little-endian) byte order.
    pub fn add_pod<T: Pod>(&mut self, name: impl Into<String>, data: &[T]) -> &mut Self {
        self.add(name, bytemuck::cast_slice::<T, u8>(data).to_vec())
    }

    pub fn entries(&self) -> &[(String, Vec<u8>)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names must be non-empty and NUL-free so the name list decodes back.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut names = Vec::new();
        for (name, _) in &self.entries {
            if name.is_empty() || name.contains('\0') {
                return Err(malformed(format!("cannot encode array name {name:?}")));
            }
            names.extend_from_slice(name.as_bytes());
            names.push(0);
        }

        let arrays: Vec<&[u8]> = std::iter::once(names.as_slice())
            .chain(self.entries.iter().map(|(_, data)| data.as_slice()))
            .collect();
        let data_start = align(HEADER_SIZE + arrays.len() * DESCRIPTOR_SIZE);

        let mut ranges = Vec::with_capacity(arrays.len());
        let mut pos = data_start;
        for array in &arrays {
            let begin = align(pos);
            ranges.push((begin, begin + array.len()));
            pos = begin + array.len();
        }
        let data_end = pos;

        let mut out = Vec::with_capacity(data_end);
        for field in [BFAST_MAGIC as usize, data_start, data_end, arrays.len()] {
            out.extend_from_slice(&(field as u64).to_le_bytes());
        }
        for (begin, end) in &ranges {
            out.extend_from_slice(&(*begin as u64).to_le_bytes());
            out.extend_from_slice(&(*end as u64).to_le_bytes());
        }
        for (array, (begin, _)) in arrays.iter().zip(&ranges) {
            out.resize(*begin, 0);
            out.extend_from_slice(array);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_field(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
    }

    /// One name "a" and an 8-byte payload, packed with no alignment padding.
    fn build_single() -> Vec<u8> {
        let mut buf = Vec::new();
        push_field(&mut buf, BFAST_MAGIC);
        push_field(&mut buf, 64); // data start
        push_field(&mut buf, 74); // data end
        push_field(&mut buf, 2); // arrays
        push_field(&mut buf, 64);
        push_field(&mut buf, 66);
        push_field(&mut buf, 66);
        push_field(&mut buf, 74);
        buf.extend_from_slice(b"a\0");
        buf.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        buf
    }

    fn assert_malformed(result: Result<Container<'_>>) {
        match result {
            Err(VimError::MalformedContainer(_)) => {}
            other => panic!("expected MalformedContainer, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_single_named_buffer() {
        let data = build_single();
        let c = parse(&data).unwrap();
        assert_eq!(c.names(), &["a"]);
        assert_eq!(c.buffers(), &[&[1u8, 2, 3, 4, 5, 6, 7, 8][..]]);
        assert_eq!(c.header.num_arrays, 2);
        assert_eq!(c.ranges(), &[66..74]);
        assert_eq!(c.get("a"), Some(&[1u8, 2, 3, 4, 5, 6, 7, 8][..]));
        assert_eq!(c.get("b"), None);
    }

    #[test]
    fn test_round_trip() {
        for n in [0usize, 1, 5] {
            let mut builder = BFastBuilder::new();
            let payloads: Vec<Vec<u8>> = (0..n).map(|i| vec![i as u8; i * 7 + 3]).collect();
            for (i, p) in payloads.iter().enumerate() {
                builder.add(format!("buffer{i}"), p.clone());
            }
            let bytes = builder.build().unwrap();
            let c = parse(&bytes).unwrap();

            assert_eq!(c.header.num_arrays, n + 1);
            assert_eq!(c.names().len(), c.buffers().len());
            assert_eq!(c.len(), n);
            for (i, (name, data)) in c.iter().enumerate() {
                assert_eq!(name, format!("buffer{i}"));
                assert_eq!(data, payloads[i].as_slice());
            }
        }
    }

    #[test]
    fn test_builder_aligns_arrays() {
        let mut builder = BFastBuilder::new();
        builder.add("x", vec![1u8; 3]).add("y", vec![2u8; 5]);
        let bytes = builder.build().unwrap();
        let c = parse(&bytes).unwrap();
        assert_eq!(c.header.data_start % ALIGNMENT, 0);
        for r in c.ranges() {
            assert_eq!(r.start % ALIGNMENT, 0);
        }
    }

    #[test]
    fn test_builder_replaces_duplicate_names() {
        let mut builder = BFastBuilder::new();
        builder.add("x", vec![1u8]).add("y", vec![2u8]).add("x", vec![3u8]);
        let bytes = builder.build().unwrap();
        let c = parse(&bytes).unwrap();
        assert_eq!(c.names(), &["x", "y"]);
        assert_eq!(c.get("x"), Some(&[3u8][..]));
    }

    #[test]
    fn test_builder_rejects_bad_names() {
        assert!(BFastBuilder::new().add("", vec![0u8]).build().is_err());
        assert!(BFastBuilder::new().add("a\0b", vec![0u8]).build().is_err());
    }

    #[test]
    fn test_nested_container() {
        let mut inner = BFastBuilder::new();
        inner.add("leaf", vec![9u8; 4]);
        let inner_bytes = inner.build().unwrap();
        let mut outer = BFastBuilder::new();
        outer.add("inner", inner_bytes);
        let bytes = outer.build().unwrap();

        let outer = parse(&bytes).unwrap();
        let inner = parse(outer.get("inner").unwrap()).unwrap();
        assert_eq!(inner.get("leaf"), Some(&[9u8; 4][..]));
    }

    #[test]
    fn test_parse_with_range() {
        let mut data = vec![0xAAu8; 8];
        data.extend(build_single());
        data.extend([0xAAu8; 5]);
        let c = parse_with_range(&data, 8, data.len() - 13).unwrap();
        assert_eq!(c.names(), &["a"]);
        assert_malformed(parse_with_range(&data, 8, data.len()));
    }

    #[test]
    fn test_parse_twice_is_equal() {
        let data = build_single();
        assert_eq!(parse(&data).unwrap(), parse(&data).unwrap());
    }

    #[test]
    fn test_nonzero_reserved_word() {
        for word in [1usize, 3, 5, 7, 9, 11] {
            let mut data = build_single();
            data[word * 4] = 1;
            assert_malformed(parse(&data));
        }
    }

    #[test]
    fn test_non_utf8_names() {
        let mut data = build_single();
        data[64] = 0xff;
        match parse(&data) {
            Err(VimError::MalformedContainer(msg)) => assert!(msg.contains("UTF-8")),
            other => panic!("expected MalformedContainer, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut data = build_single();
        data[0] = 0;
        assert_malformed(parse(&data));
    }

    #[test]
    fn test_truncated_header() {
        assert_malformed(parse(&[0u8; 16]));
    }

    #[test]
    fn test_zero_arrays() {
        let mut data = Vec::new();
        push_field(&mut data, BFAST_MAGIC);
        push_field(&mut data, 32);
        push_field(&mut data, 32);
        push_field(&mut data, 0);
        assert!(matches!(
            parse(&data),
            Err(VimError::InsufficientBuffers { expected: 1, found: 0, .. })
        ));
    }

    #[test]
    fn test_range_violations() {
        // begin before data start
        let mut data = build_single();
        data[32] = 10;
        assert_malformed(parse(&data));

        // end before begin
        let mut data = build_single();
        data[56] = 65;
        assert_malformed(parse(&data));

        // end past data end
        let mut data = build_single();
        data[56] = 80;
        assert_malformed(parse(&data));

        // data end past the slice
        let mut data = build_single();
        data[16] = 200;
        assert_malformed(parse(&data));
    }

    #[test]
    fn test_overlapping_ranges() {
        let mut data = build_single();
        data[48] = 65; // second array starts inside the name list
        assert_malformed(parse(&data));
    }

    #[test]
    fn test_name_count_mismatch() {
        // "\0\0" strips to "\0", which splits into two names for one array
        let mut data = build_single();
        data[64] = 0;
        assert_malformed(parse(&data));
    }

    #[test]
    fn test_split_nul_list() {
        assert_eq!(split_nul_list(""), Vec::<&str>::new());
        assert_eq!(split_nul_list("a\0"), vec!["a"]);
        assert_eq!(split_nul_list("a\0b\0"), vec!["a", "b"]);
        assert_eq!(split_nul_list("a\0b"), vec!["a", "b"]);
        assert_eq!(split_nul_list("a\0\0"), vec!["a", ""]);
    }
}
