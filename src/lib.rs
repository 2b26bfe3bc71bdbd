//! # Creation Serialization Library
//!
//! This library provides **stable data structures and versioned
//! serialization/deserialization** for the creation format used by Brick Rigs.
//!
//! ## Disclaimer
//!
//! - This library is **not affiliated with the game developer**.
//! - The library is an independent Rust implementation to allow reading and
//!   writing creation files. The structs and layouts were **adapted from
//!   available examples or reverse-engineered**.
//! - Full validation of serialized files can **only be done by opening them
//!   in the game**.
//!
//! ## Purpose
//!
//! - The structs (`Creation`, `Brick`, `CreationInfo`, etc.) are **plain data
//!   containers**.
//! - They are intended as a **stable schema** for constructing or reading
//!   creation data.
//! - All actual I/O goes through the `WriteCreation` and `ReadCreation`
//!   traits; the property catalogue is injected through `BrickRegistry`.
//!
//! ## Example
//! ```rust
//! use br_creation_io::io::{OrdinalNames, ReadCreation, WriteCreation, FORMAT_VERSION};
//! use br_creation_io::registry::{MapRegistry, PropertyTypeTag};
//! use br_creation_io::structs::{Brick, Creation, PropertyValue};
//!
//! // Describe the bricks the game knows about.
//! let mut registry = MapRegistry::new();
//! registry.add_property("InputChannel.Value", PropertyTypeTag::Float32);
//! registry
//!     .add_type(
//!         "Switch_1sx1sx1s",
//!         [("InputChannel.Value", PropertyValue::Float(0.0))],
//!     )
//!     .unwrap();
//!
//! // Build a creation.
//! let mut creation = Creation::new("demo");
//! let mut switch = Brick::new("Switch_1sx1sx1s", "sw", &registry).unwrap();
//! switch.set_property("InputChannel.Value", PropertyValue::Float(1.0));
//! creation.add_brick(switch);
//!
//! // Serialize it.
//! let mut buffer = vec![];
//! buffer
//!     .write_creation(&creation, &registry, FORMAT_VERSION)
//!     .unwrap();
//!
//! // Deserialize it.
//! let loaded = (&buffer[..])
//!     .read_creation(&registry, &OrdinalNames)
//!     .unwrap();
//! assert_eq!(loaded.bricks.len(), 1);
//! ```

pub mod io;
pub mod registry;
pub mod structs;
