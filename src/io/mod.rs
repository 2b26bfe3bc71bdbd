//! Versioned binary serialization of creations.
//!
//! All I/O goes through the [`WriteCreation`] and [`ReadCreation`] extension
//! traits, which are implemented for every [`Write`] / [`Read`]. The version
//! byte is written (or read) first and selects the record layout; anything
//! but a supported version is a hard error, never a best-effort parse.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use thiserror::Error as ThisError;

use crate::registry::BrickRegistry;
use crate::structs::{BrickName, Creation, CreationInfo};

pub(crate) mod types;
pub mod utils;
mod version;

/// The creation file format version this crate reads and writes.
pub const FORMAT_VERSION: u8 = version::v14::VERSION;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while encoding or decoding.
///
/// Errors are synchronous and non-retryable: the first one aborts the whole
/// operation, and nothing written so far should be persisted.
#[derive(ThisError, Debug)]
pub enum Error {
    /// A numeric value does not fit its wire field.
    #[error("value {value} does not fit in the {bits}-bit wire field")]
    Range { value: i128, bits: u32 },

    /// A composite value has the wrong variant or element count.
    #[error("property {property:?} must be {expected}")]
    Shape {
        property: String,
        expected: &'static str,
    },

    /// A brick reference does not resolve within the creation.
    #[error("brick {0:?} is not part of this creation")]
    UnknownBrick(BrickName),

    /// A brick type the registry does not know.
    #[error("brick type {0:?} is not in the registry")]
    UnknownBrickType(String),

    /// A property name the registry does not associate with this brick type.
    #[error("{property:?} is not a property of brick type {brick_type:?}")]
    UnknownProperty {
        brick_type: String,
        property: String,
    },

    /// Decode-time version mismatch, in either direction.
    #[error("file version {version} is not supported")]
    UnsupportedVersion { version: u8 },

    /// A string is not representable in the required charset.
    #[error("string is not representable in {0}")]
    Encoding(&'static str),

    /// Decode-time structural inconsistency in the byte stream.
    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Assigns identities to bricks reconstructed from a file.
///
/// The wire format stores only ordinals, so the decoder asks this resolver
/// what to call the brick at each position.
pub trait NameResolver {
    fn name_for(&self, ordinal: u16) -> BrickName;
}

/// Default resolver: the brick at ordinal `i` is named `i`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrdinalNames;

impl NameResolver for OrdinalNames {
    fn name_for(&self, ordinal: u16) -> BrickName {
        BrickName::Int(i64::from(ordinal))
    }
}

/// Trait for writing creations and their metadata records to a stream.
///
/// The `version` parameter selects the serialization format. Currently
/// supported: `14`.
///
/// # Errors
/// Returns an error for an unsupported version, an invalid creation (dangling
/// brick reference, out-of-range count, property unknown to the registry) or
/// a failing writer. A failed call may have written a partial prefix; callers
/// must not keep such output.
pub trait WriteCreation: Write {
    /// Writes the full creation record (bricks, properties, footer).
    fn write_creation<R>(&mut self, creation: &Creation, registry: &R, version: u8) -> Result<()>
    where
        R: BrickRegistry + ?Sized,
    {
        match version {
            version::v14::VERSION => {
                self.write_u8(version)?;
                version::v14::write_creation(self, creation, registry)
            }
            _ => Err(Error::UnsupportedVersion { version }),
        }
    }

    /// Writes the sequential metadata record (title, tags, timestamps).
    fn write_creation_info(&mut self, creation: &Creation, version: u8) -> Result<()> {
        match version {
            version::v14::VERSION => {
                self.write_u8(version)?;
                version::metadata::write_info(self, creation)
            }
            _ => Err(Error::UnsupportedVersion { version }),
        }
    }
}

impl<W: Write + ?Sized> WriteCreation for W {}

/// Trait for reading creations and their metadata records from a stream.
///
/// The version byte is read first; any version other than the supported one
/// fails with [`Error::UnsupportedVersion`].
pub trait ReadCreation: Read {
    /// Reads a full creation record. Property types are looked up in the
    /// registry by name; brick identities come from the resolver.
    fn read_creation<R, N>(&mut self, registry: &R, names: &N) -> Result<Creation>
    where
        R: BrickRegistry + ?Sized,
        N: NameResolver + ?Sized,
    {
        let version = self.read_u8()?;
        match version {
            version::v14::VERSION => version::v14::read_creation(self, registry, names),
            _ => Err(Error::UnsupportedVersion { version }),
        }
    }

    /// Reads a metadata record into its scalar form.
    fn read_creation_info(&mut self) -> Result<CreationInfo> {
        let version = self.read_u8()?;
        match version {
            version::v14::VERSION => version::metadata::read_info(self),
            _ => Err(Error::UnsupportedVersion { version }),
        }
    }
}

impl<R: Read + ?Sized> ReadCreation for R {}
