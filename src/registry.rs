//! Read-only lookup services the codec queries but does not own.
//!
//! The game defines which properties exist, what wire type each has, and
//! which defaults a brick type carries. That table is injected through the
//! [`BrickRegistry`] trait; [`MapRegistry`] is an in-memory implementation
//! for callers that assemble the table themselves.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::io::Error;
use crate::structs::{PropertyMap, PropertyValue};

/// Closed set of property wire types.
///
/// The tag fixes both the per-value binary layout and, where relevant, a
/// fixed element count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyTypeTag {
    /// Raw bytes, untouched.
    Binary,
    /// One byte, `0x01` true / `0x00` false.
    Bool,
    /// Reference to a brick of the same creation.
    BrickRef,
    /// IEEE754 binary32, little-endian.
    Float32,
    /// Exactly three binary32 floats.
    Vec3Float,
    /// Three single bytes.
    Vec3UInt8,
    /// Four single bytes.
    Vec4UInt8,
    /// Six 2-bit fields packed into one little-endian 16-bit word.
    PackedUInt2x6,
    /// 2-byte count followed by one 2-byte reference per entry.
    BrickRefList,
    /// 1-byte length prefix plus ASCII bytes.
    StringAscii,
    /// ASCII or UTF-16LE, selected by the sign of a 2-byte length prefix.
    StringAuto,
    UInt8,
}

impl PropertyTypeTag {
    /// Human-readable shape description, used in error messages.
    pub fn describe(self) -> &'static str {
        match self {
            PropertyTypeTag::Binary => "raw bytes",
            PropertyTypeTag::Bool => "a boolean",
            PropertyTypeTag::BrickRef => "a brick reference or none",
            PropertyTypeTag::Float32 => "a 32-bit float",
            PropertyTypeTag::Vec3Float => "3 floats",
            PropertyTypeTag::Vec3UInt8 => "3 integers in 0..=255",
            PropertyTypeTag::Vec4UInt8 => "4 integers in 0..=255",
            PropertyTypeTag::PackedUInt2x6 => "6 integers in 0..=3",
            PropertyTypeTag::BrickRefList => "a list of brick references",
            PropertyTypeTag::StringAscii => "an ASCII string",
            PropertyTypeTag::StringAuto => "a string",
            PropertyTypeTag::UInt8 => "an integer in 0..=255",
        }
    }
}

/// External lookup table mapping brick type names to default property sets
/// and property names to wire types.
///
/// Both lookups are read-only; the codec never mutates a registry.
pub trait BrickRegistry {
    /// Default property map for a brick type, or `None` for an unknown type.
    fn defaults_for(&self, brick_type: &str) -> Option<&PropertyMap>;

    /// Wire type of a named property, or `None` for an unknown property.
    fn type_tag_for(&self, property: &str) -> Option<PropertyTypeTag>;
}

/// In-memory [`BrickRegistry`] built by the caller.
///
/// Properties must be declared before any type that uses them; registering a
/// type validates each default value against its property's declared tag.
#[derive(Debug, Default)]
pub struct MapRegistry {
    types: IndexMap<String, PropertyMap>,
    properties: IndexMap<String, PropertyTypeTag>,
}

impl MapRegistry {
    pub fn new() -> Self {
        MapRegistry::default()
    }

    /// Declares a property and its wire type.
    pub fn add_property(&mut self, name: &str, tag: PropertyTypeTag) -> &mut Self {
        self.properties.insert(name.to_owned(), tag);
        self
    }

    /// Registers a brick type with its default property values.
    pub fn add_type<I>(&mut self, name: &str, defaults: I) -> Result<&mut Self, Error>
    where
        I: IntoIterator<Item = (&'static str, PropertyValue)>,
    {
        let mut map = PropertyMap::new();
        for (property, value) in defaults {
            let tag = self
                .properties
                .get(property)
                .copied()
                .ok_or_else(|| Error::UnknownProperty {
                    brick_type: name.to_owned(),
                    property: property.to_owned(),
                })?;
            if value.tag() != tag {
                return Err(Error::Shape {
                    property: property.to_owned(),
                    expected: tag.describe(),
                });
            }
            map.insert(property.to_owned(), Rc::new(value));
        }
        self.types.insert(name.to_owned(), map);
        Ok(self)
    }
}

impl BrickRegistry for MapRegistry {
    fn defaults_for(&self, brick_type: &str) -> Option<&PropertyMap> {
        self.types.get(brick_type)
    }

    fn type_tag_for(&self, property: &str) -> Option<PropertyTypeTag> {
        self.properties.get(property).copied()
    }
}

#[cfg(test)]
pub(crate) fn test_registry() -> MapRegistry {
    use PropertyValue as V;

    let mut registry = MapRegistry::new();
    registry
        .add_property("InputChannel.Value", PropertyTypeTag::Float32)
        .add_property("InputChannel.InputAxis", PropertyTypeTag::StringAscii)
        .add_property("InputChannel.SourceBricks", PropertyTypeTag::BrickRefList)
        .add_property("OwningSeat", PropertyTypeTag::BrickRef)
        .add_property("BrickColor", PropertyTypeTag::Vec4UInt8)
        .add_property("BrickPattern", PropertyTypeTag::StringAscii)
        .add_property("BrickMaterial", PropertyTypeTag::StringAscii)
        .add_property("BrickSize", PropertyTypeTag::Vec3Float)
        .add_property("ConnectorSpacing", PropertyTypeTag::PackedUInt2x6)
        .add_property("DisplayColor", PropertyTypeTag::Vec3UInt8)
        .add_property("NumFractionalDigits", PropertyTypeTag::UInt8)
        .add_property("bInvertDrive", PropertyTypeTag::Bool)
        .add_property("Text", PropertyTypeTag::StringAuto)
        .add_property("UserData", PropertyTypeTag::Binary);

    registry
        .add_type(
            "Switch_1sx1sx1s",
            [
                ("InputChannel.Value", V::Float(0.0)),
                ("InputChannel.InputAxis", V::Ascii("None".to_owned())),
                ("InputChannel.SourceBricks", V::BrickRefList(Vec::new())),
                ("OwningSeat", V::BrickRef(None)),
                ("BrickColor", V::Rgba([0, 0, 127, 255])),
                ("BrickPattern", V::Ascii("Default".to_owned())),
                ("BrickMaterial", V::Ascii("Plastic".to_owned())),
                ("bInvertDrive", V::Bool(false)),
            ],
        )
        .unwrap()
        .add_type(
            "Seat_2x2x7s",
            [
                ("BrickColor", V::Rgba([0, 0, 127, 255])),
                ("BrickPattern", V::Ascii("Default".to_owned())),
                ("BrickMaterial", V::Ascii("Plastic".to_owned())),
            ],
        )
        .unwrap()
        .add_type(
            "DisplayBrick",
            [
                ("Text", V::Text(String::new())),
                ("DisplayColor", V::Rgb([210, 190, 60])),
                ("NumFractionalDigits", V::UInt8(1)),
                ("BrickSize", V::Vec3([1.0, 1.0, 1.0])),
                ("ConnectorSpacing", V::Packed2x6([3; 6])),
                ("UserData", V::Binary(Vec::new())),
            ],
        )
        .unwrap();

    registry
}
