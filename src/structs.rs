use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;

use crate::io::Error;
use crate::registry::{BrickRegistry, PropertyTypeTag};

/// Ticks of 100 ns between 0001-01-01 00:00:00 UTC and the Unix epoch.
const UNIX_EPOCH_TICKS: u64 = 621_355_968_000_000_000;

/// Map of property name to its (shared) value.
///
/// Values are held behind [`Rc`] on purpose: the serializer deduplicates
/// property values by *object identity*, so two bricks that clone the same
/// `Rc` share one value slot in the file, while two separately constructed
/// but equal values each get their own slot.
pub type PropertyMap = IndexMap<String, Rc<PropertyValue>>;

/// Current time in ticks of 100 ns since 0001-01-01 00:00:00 UTC, the unit
/// used by creation timestamps.
pub fn now_100ns() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    UNIX_EPOCH_TICKS + since_epoch.as_nanos() as u64 / 100
}

/// Identity of a brick inside one creation.
///
/// Bricks are referenced by name (seat, source-brick lists, idler wheels).
/// Both strings and integers are valid identities and may be mixed freely
/// within one creation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BrickName {
    Str(String),
    Int(i64),
}

impl From<&str> for BrickName {
    fn from(s: &str) -> Self {
        BrickName::Str(s.to_owned())
    }
}

impl From<String> for BrickName {
    fn from(s: String) -> Self {
        BrickName::Str(s)
    }
}

impl From<i64> for BrickName {
    fn from(i: i64) -> Self {
        BrickName::Int(i)
    }
}

/// Who can see a published creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum Visibility {
    #[default]
    Public = 0,
    Friends = 1,
    Private = 2,
    Hidden = 3,
}

impl TryFrom<u8> for Visibility {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Visibility::Public),
            1 => Ok(Visibility::Friends),
            2 => Ok(Visibility::Private),
            3 => Ok(Visibility::Hidden),
            v => Err(Error::MalformedData(format!("invalid visibility byte {v}"))),
        }
    }
}

/// One property value, tagged with its wire type.
///
/// The variant set mirrors [`PropertyTypeTag`] one to one; the registry's tag
/// for a property name decides which variant is legal there.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Raw bytes, written untouched.
    Binary(Vec<u8>),
    Bool(bool),
    /// Reference to another brick of the same creation, `None` for "no brick".
    BrickRef(Option<BrickName>),
    Float(f32),
    Vec3([f32; 3]),
    Rgb([u8; 3]),
    Rgba([u8; 4]),
    /// Six 2-bit fields, each in `0..=3`.
    Packed2x6([u8; 6]),
    BrickRefList(Vec<BrickName>),
    /// ASCII-only string (1-byte length prefix on the wire).
    Ascii(String),
    /// String stored as ASCII when possible, UTF-16LE otherwise.
    Text(String),
    UInt8(u8),
}

impl PropertyValue {
    /// The wire type this value serializes as.
    pub fn tag(&self) -> PropertyTypeTag {
        match self {
            PropertyValue::Binary(_) => PropertyTypeTag::Binary,
            PropertyValue::Bool(_) => PropertyTypeTag::Bool,
            PropertyValue::BrickRef(_) => PropertyTypeTag::BrickRef,
            PropertyValue::Float(_) => PropertyTypeTag::Float32,
            PropertyValue::Vec3(_) => PropertyTypeTag::Vec3Float,
            PropertyValue::Rgb(_) => PropertyTypeTag::Vec3UInt8,
            PropertyValue::Rgba(_) => PropertyTypeTag::Vec4UInt8,
            PropertyValue::Packed2x6(_) => PropertyTypeTag::PackedUInt2x6,
            PropertyValue::BrickRefList(_) => PropertyTypeTag::BrickRefList,
            PropertyValue::Ascii(_) => PropertyTypeTag::StringAscii,
            PropertyValue::Text(_) => PropertyTypeTag::StringAuto,
            PropertyValue::UInt8(_) => PropertyTypeTag::UInt8,
        }
    }
}

/// A single placed component of a creation.
///
/// Position is engine axis order X, Y, Z. Rotation is pitch, yaw, roll in
/// degrees; on disk it is stored in Y, Z, X order, which the codec handles.
#[derive(Clone, Debug, PartialEq)]
pub struct Brick {
    brick_type: String,
    /// Identity of this brick, used by cross-references.
    pub name: BrickName,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    /// Property name to value. Seeded with the type's defaults on
    /// construction; only values differing from the default reach the file.
    pub properties: PropertyMap,
}

impl Brick {
    /// Creates a brick of the given type, seeded with the registry's default
    /// properties for that type.
    pub fn new<R>(
        brick_type: &str,
        name: impl Into<BrickName>,
        registry: &R,
    ) -> Result<Self, Error>
    where
        R: BrickRegistry + ?Sized,
    {
        let defaults = registry
            .defaults_for(brick_type)
            .ok_or_else(|| Error::UnknownBrickType(brick_type.to_owned()))?;

        Ok(Brick {
            brick_type: brick_type.to_owned(),
            name: name.into(),
            position: [0.0; 3],
            rotation: [0.0; 3],
            properties: defaults.clone(),
        })
    }

    /// Assembles a brick from already decoded parts, bypassing the registry
    /// default seeding of [`Brick::new`].
    pub(crate) fn from_decoded(
        brick_type: String,
        name: BrickName,
        position: [f32; 3],
        rotation: [f32; 3],
        properties: PropertyMap,
    ) -> Self {
        Brick {
            brick_type,
            name,
            position,
            rotation,
            properties,
        }
    }

    pub fn brick_type(&self) -> &str {
        &self.brick_type
    }

    /// Changes the brick's type, keeping every property the new type shares
    /// with the old one.
    pub fn set_type<R>(&mut self, new_type: &str, registry: &R) -> Result<&mut Self, Error>
    where
        R: BrickRegistry + ?Sized,
    {
        let defaults = registry
            .defaults_for(new_type)
            .ok_or_else(|| Error::UnknownBrickType(new_type.to_owned()))?;

        let mut properties = defaults.clone();
        for (key, value) in &self.properties {
            if properties.contains_key(key) {
                properties.insert(key.clone(), value.clone());
            }
        }

        self.properties = properties;
        self.brick_type = new_type.to_owned();
        Ok(self)
    }

    /// Sets a property to a freshly allocated value.
    pub fn set_property(&mut self, name: &str, value: PropertyValue) -> &mut Self {
        self.properties.insert(name.to_owned(), Rc::new(value));
        self
    }

    /// Sets a property to an already shared value. Bricks holding clones of
    /// the same `Rc` share one value slot in the serialized file.
    pub fn set_shared(&mut self, name: &str, value: Rc<PropertyValue>) -> &mut Self {
        self.properties.insert(name.to_owned(), value);
        self
    }

    /// Checks every property against the registry: the key must belong to
    /// this brick type and the value's variant must match the declared tag.
    pub fn validate<R>(&self, registry: &R) -> Result<(), Error>
    where
        R: BrickRegistry + ?Sized,
    {
        let defaults = registry
            .defaults_for(&self.brick_type)
            .ok_or_else(|| Error::UnknownBrickType(self.brick_type.clone()))?;

        for (key, value) in &self.properties {
            if !defaults.contains_key(key) {
                return Err(Error::UnknownProperty {
                    brick_type: self.brick_type.clone(),
                    property: key.clone(),
                });
            }
            let tag = registry
                .type_tag_for(key)
                .ok_or_else(|| Error::UnknownProperty {
                    brick_type: self.brick_type.clone(),
                    property: key.clone(),
                })?;
            if value.tag() != tag {
                return Err(Error::Shape {
                    property: key.clone(),
                    expected: tag.describe(),
                });
            }
        }
        Ok(())
    }
}

/// A named collection of bricks plus its presentation metadata.
///
/// Brick insertion order is significant: it defines each brick's ordinal,
/// which is what cross-references store on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Creation {
    /// Display name, shown in-game.
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    /// Physical size of the creation, in engine units.
    pub size: [f32; 3],
    /// Ticks of 100 ns since 0001-01-01 00:00:00 UTC.
    pub creation_time: u64,
    pub update_time: u64,
    /// Driver seat brick, if any.
    pub seat: Option<BrickName>,
    /// Opaque trailing bytes carried verbatim after the footer.
    pub appendix: Vec<u8>,
    pub bricks: Vec<Brick>,
}

impl Default for Creation {
    fn default() -> Self {
        Creation {
            name: String::new(),
            description: String::new(),
            tags: vec!["Other".to_owned(); 3],
            visibility: Visibility::default(),
            size: [0.0; 3],
            creation_time: 0,
            update_time: 0,
            seat: None,
            appendix: Vec::new(),
            bricks: Vec::new(),
        }
    }
}

impl Creation {
    pub fn new(name: &str) -> Self {
        let now = now_100ns();
        Creation {
            name: name.to_owned(),
            creation_time: now,
            update_time: now,
            ..Creation::default()
        }
    }

    /// Appends a brick, assigning it the next ordinal.
    pub fn add_brick(&mut self, brick: Brick) -> &mut Self {
        self.bricks.push(brick);
        self
    }

    /// Looks a brick up by its name.
    pub fn brick(&self, name: &BrickName) -> Option<&Brick> {
        self.bricks.iter().find(|b| b.name == *name)
    }
}

/// Scalar fields decoded from a metadata record.
///
/// The metadata file does not contain bricks, only their count, so reading it
/// yields this reduced form instead of a [`Creation`].
#[derive(Clone, Debug, PartialEq)]
pub struct CreationInfo {
    pub name: String,
    pub description: String,
    pub brick_count: u16,
    pub size: [f32; 3],
    pub creation_time: u64,
    pub update_time: u64,
    pub visibility: Visibility,
    pub tags: Vec<String>,
}
