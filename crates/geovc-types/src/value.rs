use std::fmt;

use geo::BoundingRect;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Binding type of a feature attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Bool,
    Int,
    Double,
    String,
    Bytes,
    Geometry,
}

impl AttributeType {
    /// Wire tag used by the canonical encoding.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Bool => 1,
            Self::Int => 2,
            Self::Double => 3,
            Self::String => 4,
            Self::Bytes => 5,
            Self::Geometry => 6,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Bool),
            2 => Some(Self::Int),
            3 => Some(Self::Double),
            4 => Some(Self::String),
            5 => Some(Self::Bytes),
            6 => Some(Self::Geometry),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Geometry => "geometry",
        };
        f.write_str(s)
    }
}

/// A single attribute value of a feature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Geometry(Geometry<f64>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The attribute type this value binds to, `None` for null.
    pub fn attribute_type(&self) -> Option<AttributeType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(AttributeType::Bool),
            Self::Int(_) => Some(AttributeType::Int),
            Self::Double(_) => Some(AttributeType::Double),
            Self::String(_) => Some(AttributeType::String),
            Self::Bytes(_) => Some(AttributeType::Bytes),
            Self::Geometry(_) => Some(AttributeType::Geometry),
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry<f64>> {
        match self {
            Self::Geometry(g) => Some(g),
            _ => None,
        }
    }

    /// Bounding rectangle of a geometry value. `None` for non-geometries and
    /// for empty geometries.
    pub fn envelope(&self) -> Option<Envelope> {
        self.as_geometry()
            .and_then(|g| g.bounding_rect())
            .map(Envelope::from)
    }
}

impl From<Geometry<f64>> for FieldValue {
    fn from(g: Geometry<f64>) -> Self {
        Self::Geometry(g)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point};

    #[test]
    fn attribute_type_tags_roundtrip() {
        for ty in [
            AttributeType::Bool,
            AttributeType::Int,
            AttributeType::Double,
            AttributeType::String,
            AttributeType::Bytes,
            AttributeType::Geometry,
        ] {
            assert_eq!(AttributeType::from_tag(ty.tag()), Some(ty));
        }
        assert!(AttributeType::from_tag(0).is_none());
    }

    #[test]
    fn point_envelope_is_degenerate() {
        let v = FieldValue::from(Geometry::Point(point!(x: 3.0, y: 4.0)));
        assert_eq!(v.envelope(), Some(Envelope::point(3.0, 4.0)));
    }

    #[test]
    fn line_envelope() {
        let line = line_string![(x: 0.0, y: 5.0), (x: 2.0, y: -1.0)];
        let v = FieldValue::from(Geometry::LineString(line));
        assert_eq!(v.envelope(), Some(Envelope::new(0.0, -1.0, 2.0, 5.0)));
    }

    #[test]
    fn non_geometry_has_no_envelope() {
        assert!(FieldValue::Int(1).envelope().is_none());
        assert!(FieldValue::Null.envelope().is_none());
        assert_eq!(FieldValue::Null.attribute_type(), None);
        assert_eq!(
            FieldValue::from("x").attribute_type(),
            Some(AttributeType::String)
        );
    }
}
