//! Canonical byte encoding of revision objects (format version 1).
//!
//! Integers are LEB128 varints unless noted, strings are `varint len | utf8`,
//! ids are the raw 32 bytes, `f64` values are big-endian IEEE bits after
//! normalization, and options are `0 | 1 payload`. Entries are written
//! sorted by name, buckets by index and maps in key order, so the encoding
//! is a pure function of logical content.

use std::collections::BTreeMap;
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};
use geo::MapCoords;
use geo_types::{Coord, Geometry};
use wkt::ToWkt;

use geovc_types::{AttributeType, Envelope, FieldValue, ObjectId, Person};

use crate::object::{
    AttributeDescriptor, Bucket, Node, NodeKind, RevCommit, RevFeature, RevFeatureType, RevTag,
    RevTree,
};

/// Current canonical encoding version. Changing the layout requires a bump.
pub const FORMAT_VERSION: u8 = 1;

const VALUE_NULL: u8 = 0;
const VALUE_BOOL: u8 = 1;
const VALUE_INT: u8 = 2;
const VALUE_DOUBLE: u8 = 3;
const VALUE_STRING: u8 = 4;
const VALUE_BYTES: u8 = 5;
const VALUE_GEOMETRY: u8 = 6;

/// Collapse `-0.0` into `0.0` and every NaN payload into the canonical NaN.
pub fn normalize_f64(v: f64) -> f64 {
    if v.is_nan() {
        f64::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Geometry with every ordinate normalized.
pub fn normalize_geometry(geom: &Geometry<f64>) -> Geometry<f64> {
    geom.map_coords(|c| Coord {
        x: normalize_f64(c.x),
        y: normalize_f64(c.y),
    })
}

/// Canonical bytes of a single field value. Used to key attribute indexes.
pub fn encode_value(value: &FieldValue) -> Vec<u8> {
    let mut enc = Encoder::bare();
    enc.put_value(value);
    enc.finish()
}

pub(crate) struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// An encoder with the version byte already written.
    pub(crate) fn new() -> Self {
        let mut enc = Self::bare();
        enc.buf.put_u8(FORMAT_VERSION);
        enc
    }

    fn bare() -> Self {
        Self {
            buf: BytesMut::with_capacity(128),
        }
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    fn put_varint(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value > 0 {
                byte |= 0x80;
            }
            self.buf.put_u8(byte);
            if value == 0 {
                break;
            }
        }
    }

    fn put_len(&mut self, len: usize) {
        self.put_varint(len as u64);
    }

    fn put_bool(&mut self, v: bool) {
        self.put_u8(u8::from(v));
    }

    fn put_bytes(&mut self, b: &[u8]) {
        self.put_len(b.len());
        self.buf.put_slice(b);
    }

    fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    fn put_opt_str(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.put_u8(1);
                self.put_str(s);
            }
            None => self.put_u8(0),
        }
    }

    fn put_id(&mut self, id: &ObjectId) {
        self.buf.put_slice(id.as_bytes());
    }

    fn put_opt_id(&mut self, id: Option<&ObjectId>) {
        match id {
            Some(id) => {
                self.put_u8(1);
                self.put_id(id);
            }
            None => self.put_u8(0),
        }
    }

    fn put_f64(&mut self, v: f64) {
        self.buf.put_u64(normalize_f64(v).to_bits());
    }

    fn put_envelope(&mut self, env: Option<&Envelope>) {
        match env {
            Some(e) => {
                self.put_u8(1);
                self.put_f64(e.min_x);
                self.put_f64(e.min_y);
                self.put_f64(e.max_x);
                self.put_f64(e.max_y);
            }
            None => self.put_u8(0),
        }
    }

    fn put_person(&mut self, p: &Person) {
        self.put_opt_str(p.name.as_deref());
        self.put_opt_str(p.email.as_deref());
        self.buf.put_i64(p.timestamp);
        self.buf.put_i32(p.tz_offset);
    }

    fn put_value(&mut self, value: &FieldValue) {
        match value {
            FieldValue::Null => self.put_u8(VALUE_NULL),
            FieldValue::Bool(b) => {
                self.put_u8(VALUE_BOOL);
                self.put_bool(*b);
            }
            FieldValue::Int(i) => {
                self.put_u8(VALUE_INT);
                self.buf.put_i64(*i);
            }
            FieldValue::Double(d) => {
                self.put_u8(VALUE_DOUBLE);
                self.put_f64(*d);
            }
            FieldValue::String(s) => {
                self.put_u8(VALUE_STRING);
                self.put_str(s);
            }
            FieldValue::Bytes(b) => {
                self.put_u8(VALUE_BYTES);
                self.put_bytes(b);
            }
            FieldValue::Geometry(g) => {
                self.put_u8(VALUE_GEOMETRY);
                self.put_str(&normalize_geometry(g).wkt_string());
            }
        }
    }

    fn put_node(&mut self, node: &Node) {
        self.put_str(&node.name);
        self.put_u8(node.kind.tag());
        self.put_id(&node.object_id);
        self.put_opt_id(node.metadata_id.as_ref());
        self.put_envelope(node.extent.as_ref());
        self.put_len(node.extra_data.len());
        for (key, value) in &node.extra_data {
            self.put_str(key);
            self.put_value(value);
        }
    }
}

/// Reads the canonical encoding back. Errors are plain reasons; callers
/// attach the object id.
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
}

type DecodeResult<T> = Result<T, String>;

impl<'a> Decoder<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn header(&mut self) -> DecodeResult<()> {
        let version = self.get_u8()?;
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }
        Ok(())
    }

    pub(crate) fn finish(&self) -> DecodeResult<()> {
        if self.buf.has_remaining() {
            return Err(format!("{} trailing bytes", self.buf.remaining()));
        }
        Ok(())
    }

    fn need(&self, n: usize) -> DecodeResult<()> {
        if self.buf.remaining() < n {
            return Err(format!(
                "truncated: need {n} bytes, {} left",
                self.buf.remaining()
            ));
        }
        Ok(())
    }

    fn get_u8(&mut self) -> DecodeResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn get_varint(&mut self) -> DecodeResult<u64> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.get_u8()?;
            if shift >= 64 {
                return Err("varint overflow".into());
            }
            value |= ((byte & 0x7F) as u64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    fn get_len(&mut self) -> DecodeResult<usize> {
        let len = self.get_varint()? as usize;
        // Every counted item takes at least one byte.
        self.need(len)?;
        Ok(len)
    }

    fn get_bool(&mut self) -> DecodeResult<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(format!("invalid bool byte {b}")),
        }
    }

    fn get_flag(&mut self) -> DecodeResult<bool> {
        self.get_bool().map_err(|_| "invalid option flag".to_string())
    }

    fn get_bytes(&mut self) -> DecodeResult<Vec<u8>> {
        let len = self.get_len()?;
        let out = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(out)
    }

    fn get_str(&mut self) -> DecodeResult<String> {
        String::from_utf8(self.get_bytes()?).map_err(|e| format!("invalid utf8: {e}"))
    }

    fn get_opt_str(&mut self) -> DecodeResult<Option<String>> {
        if self.get_flag()? {
            Ok(Some(self.get_str()?))
        } else {
            Ok(None)
        }
    }

    fn get_id(&mut self) -> DecodeResult<ObjectId> {
        self.need(ObjectId::LEN)?;
        let id = ObjectId::from_slice(&self.buf[..ObjectId::LEN]).map_err(|e| e.to_string())?;
        self.buf.advance(ObjectId::LEN);
        Ok(id)
    }

    fn get_opt_id(&mut self) -> DecodeResult<Option<ObjectId>> {
        if self.get_flag()? {
            Ok(Some(self.get_id()?))
        } else {
            Ok(None)
        }
    }

    fn get_i64(&mut self) -> DecodeResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    fn get_i32(&mut self) -> DecodeResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    fn get_f64(&mut self) -> DecodeResult<f64> {
        self.need(8)?;
        Ok(f64::from_bits(self.buf.get_u64()))
    }

    fn get_envelope(&mut self) -> DecodeResult<Option<Envelope>> {
        if !self.get_flag()? {
            return Ok(None);
        }
        Ok(Some(Envelope::new(
            self.get_f64()?,
            self.get_f64()?,
            self.get_f64()?,
            self.get_f64()?,
        )))
    }

    fn get_person(&mut self) -> DecodeResult<Person> {
        Ok(Person::new(
            self.get_opt_str()?,
            self.get_opt_str()?,
            self.get_i64()?,
            self.get_i32()?,
        ))
    }

    fn get_value(&mut self) -> DecodeResult<FieldValue> {
        Ok(match self.get_u8()? {
            VALUE_NULL => FieldValue::Null,
            VALUE_BOOL => FieldValue::Bool(self.get_bool()?),
            VALUE_INT => FieldValue::Int(self.get_i64()?),
            VALUE_DOUBLE => FieldValue::Double(self.get_f64()?),
            VALUE_STRING => FieldValue::String(self.get_str()?),
            VALUE_BYTES => FieldValue::Bytes(self.get_bytes()?),
            VALUE_GEOMETRY => FieldValue::Geometry(parse_wkt(&self.get_str()?)?),
            tag => return Err(format!("unknown value tag {tag}")),
        })
    }

    fn get_node(&mut self) -> DecodeResult<Node> {
        let name = self.get_str()?;
        let tag = self.get_u8()?;
        let kind = NodeKind::from_tag(tag).ok_or_else(|| format!("unknown node kind {tag}"))?;
        let object_id = self.get_id()?;
        let metadata_id = self.get_opt_id()?;
        let extent = self.get_envelope()?;
        let n = self.get_len()?;
        let mut extra_data = BTreeMap::new();
        let mut last: Option<String> = None;
        for _ in 0..n {
            let key = self.get_str()?;
            if last.as_ref().is_some_and(|l| *l >= key) {
                return Err(format!("extra data keys out of order at {key:?}"));
            }
            let value = self.get_value()?;
            last = Some(key.clone());
            extra_data.insert(key, value);
        }
        Ok(Node {
            name,
            object_id,
            kind,
            metadata_id,
            extent,
            extra_data,
        })
    }
}

fn parse_wkt(text: &str) -> DecodeResult<Geometry<f64>> {
    wkt::Wkt::<f64>::from_str(text)
        .map_err(|e| format!("invalid WKT: {e:?}"))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| format!("unsupported WKT: {e:?}"))
        })
}

// ---------------------------------------------------------------------------
// Per-kind bodies
// ---------------------------------------------------------------------------

pub(crate) fn encode_commit(enc: &mut Encoder, commit: &RevCommit) {
    enc.put_id(&commit.tree_id);
    enc.put_len(commit.parent_ids.len());
    for parent in &commit.parent_ids {
        enc.put_id(parent);
    }
    enc.put_person(&commit.author);
    enc.put_person(&commit.committer);
    enc.put_str(&commit.message);
}

pub(crate) fn decode_commit(dec: &mut Decoder<'_>) -> DecodeResult<RevCommit> {
    let tree_id = dec.get_id()?;
    let n = dec.get_len()?;
    let parent_ids = (0..n).map(|_| dec.get_id()).collect::<DecodeResult<_>>()?;
    Ok(RevCommit {
        tree_id,
        parent_ids,
        author: dec.get_person()?,
        committer: dec.get_person()?,
        message: dec.get_str()?,
    })
}

pub(crate) fn encode_tree(enc: &mut Encoder, tree: &RevTree) {
    enc.put_varint(tree.size);
    enc.put_len(tree.entries.len());
    for node in &tree.entries {
        enc.put_node(node);
    }
    enc.put_len(tree.buckets.len());
    for bucket in &tree.buckets {
        enc.put_varint(u64::from(bucket.index));
        enc.put_id(&bucket.tree_id);
        enc.put_envelope(bucket.bounds.as_ref());
    }
}

pub(crate) fn decode_tree(dec: &mut Decoder<'_>) -> DecodeResult<RevTree> {
    let size = dec.get_varint()?;
    let n = dec.get_len()?;
    let mut entries: Vec<Node> = Vec::with_capacity(n);
    for _ in 0..n {
        let node = dec.get_node()?;
        if let Some(prev) = entries.last() {
            if prev.name >= node.name {
                return Err(format!("tree entries out of order at {:?}", node.name));
            }
        }
        entries.push(node);
    }
    let n = dec.get_len()?;
    let mut buckets: Vec<Bucket> = Vec::with_capacity(n);
    for _ in 0..n {
        let index = u32::try_from(dec.get_varint()?).map_err(|_| "bucket index overflow")?;
        if buckets.last().is_some_and(|b| b.index >= index) {
            return Err(format!("tree buckets out of order at {index}"));
        }
        buckets.push(Bucket {
            index,
            tree_id: dec.get_id()?,
            bounds: dec.get_envelope()?,
        });
    }
    Ok(RevTree {
        size,
        entries,
        buckets,
    })
}

pub(crate) fn encode_feature(enc: &mut Encoder, feature: &RevFeature) {
    enc.put_len(feature.values.len());
    for value in &feature.values {
        enc.put_value(value);
    }
}

pub(crate) fn decode_feature(dec: &mut Decoder<'_>) -> DecodeResult<RevFeature> {
    let n = dec.get_len()?;
    let values = (0..n).map(|_| dec.get_value()).collect::<DecodeResult<_>>()?;
    Ok(RevFeature { values })
}

pub(crate) fn encode_feature_type(enc: &mut Encoder, ft: &RevFeatureType) {
    enc.put_str(&ft.name);
    enc.put_len(ft.descriptors.len());
    for d in &ft.descriptors {
        enc.put_str(&d.name);
        enc.put_u8(d.binding.tag());
        enc.put_bool(d.nillable);
        enc.put_opt_str(d.crs.as_deref());
    }
}

pub(crate) fn decode_feature_type(dec: &mut Decoder<'_>) -> DecodeResult<RevFeatureType> {
    let name = dec.get_str()?;
    let n = dec.get_len()?;
    let mut descriptors = Vec::with_capacity(n);
    for _ in 0..n {
        let name = dec.get_str()?;
        let tag = dec.get_u8()?;
        let binding =
            AttributeType::from_tag(tag).ok_or_else(|| format!("unknown binding {tag}"))?;
        descriptors.push(AttributeDescriptor {
            name,
            binding,
            nillable: dec.get_bool()?,
            crs: dec.get_opt_str()?,
        });
    }
    Ok(RevFeatureType { name, descriptors })
}

pub(crate) fn encode_tag(enc: &mut Encoder, tag: &RevTag) {
    enc.put_str(&tag.name);
    enc.put_id(&tag.commit_id);
    enc.put_str(&tag.message);
    enc.put_person(&tag.tagger);
}

pub(crate) fn decode_tag(dec: &mut Decoder<'_>) -> DecodeResult<RevTag> {
    Ok(RevTag {
        name: dec.get_str()?,
        commit_id: dec.get_id()?,
        message: dec.get_str()?,
        tagger: dec.get_person()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, polygon};

    #[test]
    fn varint_layout() {
        let mut enc = Encoder::bare();
        enc.put_varint(0);
        enc.put_varint(127);
        enc.put_varint(128);
        enc.put_varint(300);
        assert_eq!(enc.finish(), vec![0x00, 0x7F, 0x80, 0x01, 0xAC, 0x02]);
    }

    #[test]
    fn varint_decode_matches_encode() {
        for v in [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut enc = Encoder::bare();
            enc.put_varint(v);
            let bytes = enc.finish();
            let mut dec = Decoder::new(&bytes);
            assert_eq!(dec.get_varint().unwrap(), v);
            dec.finish().unwrap();
        }
    }

    #[test]
    fn truncated_varint_is_an_error() {
        let mut dec = Decoder::new(&[0x80]);
        assert!(dec.get_varint().unwrap_err().contains("truncated"));
    }

    #[test]
    fn overlong_varint_is_an_error() {
        let bytes = [0xFFu8; 11];
        let mut dec = Decoder::new(&bytes);
        assert!(dec.get_varint().is_err());
    }

    #[test]
    fn nan_payloads_collapse() {
        let quiet = f64::from_bits(0x7ff8_0000_0000_0001);
        assert_eq!(normalize_f64(quiet).to_bits(), f64::NAN.to_bits());
        assert_eq!(normalize_f64(-0.0).to_bits(), 0.0f64.to_bits());
        assert_eq!(normalize_f64(1.5), 1.5);
    }

    #[test]
    fn encode_value_distinguishes_types() {
        assert_ne!(
            encode_value(&FieldValue::Int(1)),
            encode_value(&FieldValue::Double(1.0))
        );
        assert_ne!(
            encode_value(&FieldValue::from("1")),
            encode_value(&FieldValue::Bytes(b"1".to_vec()))
        );
        assert_eq!(encode_value(&FieldValue::Null), vec![VALUE_NULL]);
    }

    #[test]
    fn geometry_values_roundtrip_through_wkt() {
        let poly = polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 3.0), (x: 0.0, y: 0.0)];
        for geom in [Geometry::Point(point!(x: -73.5, y: 45.25)), Geometry::Polygon(poly)] {
            let value = FieldValue::Geometry(geom);
            let mut enc = Encoder::bare();
            enc.put_value(&value);
            let bytes = enc.finish();
            let mut dec = Decoder::new(&bytes);
            assert_eq!(dec.get_value().unwrap(), value);
        }
    }

    #[test]
    fn bad_wkt_is_rejected() {
        assert!(parse_wkt("POINT(1 2").is_err());
        assert!(parse_wkt("NOT WKT").is_err());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut dec = Decoder::new(&[9]);
        assert!(dec.header().unwrap_err().contains("version"));
    }

    #[test]
    fn out_of_order_entries_are_rejected() {
        let tree = RevTree::leaf(vec![
            Node::feature("a", ObjectId::NULL),
            Node::feature("b", ObjectId::NULL),
        ]);
        let mut swapped = tree.clone();
        swapped.entries.swap(0, 1);
        let mut enc = Encoder::new();
        encode_tree(&mut enc, &swapped);
        let bytes = enc.finish();
        let mut dec = Decoder::new(&bytes);
        dec.header().unwrap();
        assert!(decode_tree(&mut dec).unwrap_err().contains("out of order"));
    }

    #[test]
    fn huge_length_prefix_does_not_allocate() {
        let mut enc = Encoder::bare();
        enc.put_varint(u32::MAX as u64);
        let bytes = enc.finish();
        let mut dec = Decoder::new(&bytes);
        assert!(dec.get_len().is_err());
    }
}
