//! Sequential metadata record, format version 14.
//!
//! Stored next to the creation file and read without a registry: it carries
//! the display fields plus a brick count, never the bricks themselves.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::io::utils::{u16_len, ReadUtils, WriteUtils};
use crate::io::{Error, Result};
use crate::structs::{Creation, CreationInfo, Visibility};

/// Zero-filled block between the size vector and the timestamps.
const RESERVED_LEN: usize = 16;

pub(crate) fn write_info<W: Write + ?Sized>(w: &mut W, creation: &Creation) -> Result<()> {
    // Name and description are always two-byte encoded, so both length
    // prefixes are negative.
    w.write_str_utf16(&creation.name)?;
    w.write_str_utf16(&creation.description)?;

    w.write_u16::<LE>(u16_len(creation.bricks.len())?)?;
    w.write_array_f32(&creation.size)?;
    w.write_all(&[0u8; RESERVED_LEN])?;

    w.write_u64::<LE>(creation.creation_time)?;
    w.write_u64::<LE>(creation.update_time)?;
    w.write_u8(creation.visibility as u8)?;

    w.write_u16::<LE>(u16_len(creation.tags.len())?)?;
    for tag in &creation.tags {
        w.write_str8(tag)?;
    }
    Ok(())
}

pub(crate) fn read_info<R: Read + ?Sized>(r: &mut R) -> Result<CreationInfo> {
    let name = r.read_str_auto()?;
    let description = r.read_str_auto()?;

    let brick_count = r.read_u16::<LE>()?;
    let size = r.read_f32_array::<3>()?;

    let reserved = r.read_exact_buf(RESERVED_LEN, "reserved metadata block")?;
    if reserved.iter().any(|&b| b != 0) {
        return Err(Error::MalformedData(
            "reserved metadata block is not zero-filled".to_owned(),
        ));
    }

    let creation_time = r.read_u64::<LE>()?;
    let update_time = r.read_u64::<LE>()?;
    let visibility = Visibility::try_from(r.read_u8()?)?;

    let tag_count = r.read_u16::<LE>()? as usize;
    let mut tags = Vec::with_capacity(tag_count);
    for _ in 0..tag_count {
        tags.push(r.read_str8()?);
    }

    Ok(CreationInfo {
        name,
        description,
        brick_count,
        size,
        creation_time,
        update_time,
        visibility,
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{ReadCreation, WriteCreation, FORMAT_VERSION};
    use crate::registry::test_registry;
    use crate::structs::Brick;

    #[test]
    fn info_roundtrips_through_the_metadata_record() {
        let registry = test_registry();
        let mut creation = Creation::new("Tatra 813");
        creation.description = "8×8 truck, functional drivetrain".to_owned();
        creation.size = [120.0, 45.5, 38.0];
        creation.visibility = Visibility::Friends;
        creation.tags = vec!["Vehicle".to_owned(), "Offroad".to_owned()];
        creation.add_brick(Brick::new("Seat_2x2x7s", "seat", &registry).unwrap());
        creation.add_brick(Brick::new("Switch_1sx1sx1s", "sw", &registry).unwrap());

        let mut buffer = Vec::new();
        buffer
            .write_creation_info(&creation, FORMAT_VERSION)
            .unwrap();

        let mut r = &buffer[..];
        let info = r.read_creation_info().unwrap();
        assert_eq!(info.name, "Tatra 813");
        assert_eq!(info.description, "8×8 truck, functional drivetrain");
        assert_eq!(info.brick_count, 2);
        assert_eq!(info.size, [120.0, 45.5, 38.0]);
        assert_eq!(info.creation_time, creation.creation_time);
        assert_eq!(info.update_time, creation.update_time);
        assert_eq!(info.visibility, Visibility::Friends);
        assert_eq!(info.tags, ["Vehicle", "Offroad"]);
    }

    #[test]
    fn strings_use_the_two_byte_form_even_when_ascii() {
        let creation = Creation::new("abc");

        let mut buffer = Vec::new();
        buffer
            .write_creation_info(&creation, FORMAT_VERSION)
            .unwrap();

        // After the version byte: a negative code-unit count, then UTF-16LE.
        assert_eq!(&buffer[1..3], &(-3i16).to_le_bytes()[..]);
        assert_eq!(&buffer[3..9], &[b'a', 0, b'b', 0, b'c', 0]);
    }

    #[test]
    fn reserved_block_is_sixteen_zero_bytes() {
        let creation = Creation::default();

        let mut buffer = Vec::new();
        buffer
            .write_creation_info(&creation, FORMAT_VERSION)
            .unwrap();

        // version + two empty strings (2 bytes each) + count + size.
        let reserved = 1 + 2 + 2 + 2 + 12;
        assert_eq!(&buffer[reserved..reserved + RESERVED_LEN], &[0u8; 16]);

        let mut tampered = buffer.clone();
        tampered[reserved + 5] = 0xFF;
        let mut r = &tampered[..];
        let err = r.read_creation_info().unwrap_err();
        assert!(matches!(err, Error::MalformedData(_)));
    }

    #[test]
    fn default_tags_survive_the_record() {
        let creation = Creation::default();

        let mut buffer = Vec::new();
        buffer
            .write_creation_info(&creation, FORMAT_VERSION)
            .unwrap();

        let mut r = &buffer[..];
        let info = r.read_creation_info().unwrap();
        assert_eq!(info.tags, ["Other", "Other", "Other"]);
        assert_eq!(info.brick_count, 0);
    }

    #[test]
    fn metadata_rejects_other_versions() {
        let creation = Creation::default();
        let mut buffer = Vec::new();
        let err = buffer.write_creation_info(&creation, 6).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { version: 6 }));
    }
}
