//! Creation record layout, format version 14.
//!
//! Header → TypeTable → PropertyBlocks → BrickRecords → Footer, written
//! strictly in that order with no backtracking. All integers little-endian.

use std::io::{Read, Write};
use std::rc::Rc;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use indexmap::IndexSet;
use log::debug;

use crate::io::types::{BrickIndexTable, PropertyTables};
use crate::io::utils::{pack_u2x6, u16_len, u32_len, u8_len, unpack_u2x6, ReadUtils, WriteUtils};
use crate::io::{Error, NameResolver, Result};
use crate::registry::{BrickRegistry, PropertyTypeTag};
use crate::structs::{Brick, Creation, PropertyMap, PropertyValue};

pub(crate) const VERSION: u8 = 14;

pub(crate) fn write_creation<W, R>(w: &mut W, creation: &Creation, registry: &R) -> Result<()>
where
    W: Write + ?Sized,
    R: BrickRegistry + ?Sized,
{
    for brick in &creation.bricks {
        brick.validate(registry)?;
    }

    let index = BrickIndexTable::build(&creation.bricks)?;
    let tables = PropertyTables::build(&creation.bricks, registry)?;

    let mut brick_types: IndexSet<&str> = IndexSet::new();
    for brick in &creation.bricks {
        brick_types.insert(brick.brick_type());
    }

    // Header
    w.write_u16::<LE>(u16_len(creation.bricks.len())?)?;
    w.write_u16::<LE>(u16_len(brick_types.len())?)?;
    w.write_u16::<LE>(u16_len(tables.len())?)?;

    // TypeTable
    for brick_type in &brick_types {
        w.write_str8(brick_type)?;
    }
    debug!(
        "header written: {} bricks, {} types, {} properties",
        creation.bricks.len(),
        brick_types.len(),
        tables.len()
    );

    // PropertyBlocks
    for (name, table) in tables.iter() {
        w.write_str8(name)?;
        w.write_u16::<LE>(u16_len(table.values.len())?)?;

        let mut blob = Vec::new();
        let mut lengths = Vec::with_capacity(table.values.len());
        for value in &table.values {
            let start = blob.len();
            encode_value(&mut blob, value, table.tag, &index, name)?;
            lengths.push(blob.len() - start);
        }

        w.write_u32::<LE>(u32_len(blob.len())?)?;
        w.write_all(&blob)?;
        write_addon(w, &lengths)?;
    }
    debug!("property blocks written");

    // BrickRecords
    for brick in &creation.bricks {
        let type_index = brick_types
            .get_index_of(brick.brick_type())
            .ok_or_else(|| Error::UnknownBrickType(brick.brick_type().to_owned()))?;

        let mut record = Vec::new();
        let diff = tables.diff_for(brick, registry)?;
        record.write_u8(u8_len(diff.len())?)?;
        for (prop_id, val_id) in diff {
            record.write_u16::<LE>(prop_id)?;
            record.write_u16::<LE>(val_id)?;
        }
        record.write_array_f32(&brick.position)?;
        // Rotation is persisted in Y, Z, X order.
        record.write_array_f32(&[brick.rotation[1], brick.rotation[2], brick.rotation[0]])?;

        w.write_u16::<LE>(u16_len(type_index)?)?;
        w.write_u32::<LE>(u32_len(record.len())?)?;
        w.write_all(&record)?;
    }
    debug!("brick records written");

    // Footer
    match &creation.seat {
        None => w.write_u16::<LE>(0)?,
        Some(name) => w.write_u16::<LE>(index.wire_ref(name)?)?,
    }
    w.write_all(&creation.appendix)?;

    Ok(())
}

/// Serializes one property value per its wire type.
fn encode_value(
    out: &mut Vec<u8>,
    value: &PropertyValue,
    tag: PropertyTypeTag,
    index: &BrickIndexTable<'_>,
    property: &str,
) -> Result<()> {
    use PropertyTypeTag as Tag;

    match (tag, value) {
        (Tag::Binary, PropertyValue::Binary(bytes)) => out.extend_from_slice(bytes),
        (Tag::Bool, PropertyValue::Bool(b)) => out.push(u8::from(*b)),
        (Tag::BrickRef, PropertyValue::BrickRef(target)) => match target {
            None => out.write_u16::<LE>(0)?,
            Some(name) => {
                // Per-value marker distinguishing "has a reference" from the
                // 2-byte "no brick" form.
                out.write_u16::<LE>(1)?;
                out.write_u16::<LE>(index.wire_ref(name)?)?;
            }
        },
        (Tag::Float32, PropertyValue::Float(f)) => out.write_f32::<LE>(*f)?,
        (Tag::Vec3Float, PropertyValue::Vec3(v)) => out.write_array_f32(v)?,
        (Tag::Vec3UInt8, PropertyValue::Rgb(v)) => out.extend_from_slice(v),
        (Tag::Vec4UInt8, PropertyValue::Rgba(v)) => out.extend_from_slice(v),
        (Tag::PackedUInt2x6, PropertyValue::Packed2x6(fields)) => {
            out.write_u16::<LE>(pack_u2x6(fields)?)?;
        }
        (Tag::BrickRefList, PropertyValue::BrickRefList(list)) => {
            out.write_array_with_length(
                |w, n: u16| w.write_u16::<LE>(n),
                |w, name| {
                    w.write_u16::<LE>(index.wire_ref(name)?)?;
                    Ok(())
                },
                list,
            )?;
        }
        (Tag::StringAscii, PropertyValue::Ascii(s)) => out.write_str8(s)?,
        (Tag::StringAuto, PropertyValue::Text(s)) => out.write_str_auto(s)?,
        (Tag::UInt8, PropertyValue::UInt8(v)) => out.push(*v),
        _ => {
            return Err(Error::Shape {
                property: property.to_owned(),
                expected: tag.describe(),
            })
        }
    }
    Ok(())
}

/// Emits the length table that follows a property's value blob: one uniform
/// u16 when every value encoded to the same nonzero length, or a u16 zero
/// sentinel plus one u16 per value. Zero-length values would collide with
/// the sentinel, so they always take the explicit form.
fn write_addon<W: Write + ?Sized>(w: &mut W, lengths: &[usize]) -> Result<()> {
    let uniform = lengths
        .first()
        .copied()
        .filter(|&first| first > 0 && lengths.iter().all(|&len| len == first));

    match uniform {
        Some(len) => w.write_u16::<LE>(u16_len(len)?)?,
        None => {
            w.write_u16::<LE>(0)?;
            for &len in lengths {
                w.write_u16::<LE>(u16_len(len)?)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn read_creation<RD, R, N>(r: &mut RD, registry: &R, names: &N) -> Result<Creation>
where
    RD: Read + ?Sized,
    R: BrickRegistry + ?Sized,
    N: NameResolver + ?Sized,
{
    // Header
    let brick_count = r.read_u16::<LE>()? as usize;
    let type_count = r.read_u16::<LE>()? as usize;
    let property_count = r.read_u16::<LE>()? as usize;

    // TypeTable
    let mut type_names = Vec::with_capacity(type_count);
    for _ in 0..type_count {
        type_names.push(r.read_str8()?);
    }
    debug!("header read: {brick_count} bricks, {type_count} types, {property_count} properties");

    // PropertyBlocks
    let mut properties: Vec<(String, Vec<Rc<PropertyValue>>)> = Vec::with_capacity(property_count);
    for _ in 0..property_count {
        let name = r.read_str8()?;
        let tag = registry.type_tag_for(&name).ok_or_else(|| {
            Error::MalformedData(format!("file names unknown property {name:?}"))
        })?;
        let value_count = r.read_u16::<LE>()? as usize;
        let blob_len = r.read_u32::<LE>()? as usize;
        let blob = r.read_exact_buf(blob_len, &format!("value blob of property {name:?}"))?;

        let mut slices: Vec<&[u8]> = Vec::with_capacity(value_count);
        let first = r.read_u16::<LE>()? as usize;
        if first != 0 {
            if first.checked_mul(value_count) != Some(blob_len) {
                return Err(Error::MalformedData(format!(
                    "property {name:?}: uniform length {first} times {value_count} values \
                     does not cover a {blob_len}-byte blob"
                )));
            }
            for i in 0..value_count {
                slices.push(&blob[i * first..(i + 1) * first]);
            }
        } else {
            let mut offset = 0usize;
            for _ in 0..value_count {
                let len = r.read_u16::<LE>()? as usize;
                let end = offset
                    .checked_add(len)
                    .filter(|&end| end <= blob_len)
                    .ok_or_else(|| {
                        Error::MalformedData(format!(
                            "property {name:?}: value lengths exceed the {blob_len}-byte blob"
                        ))
                    })?;
                slices.push(&blob[offset..end]);
                offset = end;
            }
            if offset != blob_len {
                return Err(Error::MalformedData(format!(
                    "property {name:?}: {} trailing bytes after the last value",
                    blob_len - offset
                )));
            }
        }

        let mut values = Vec::with_capacity(value_count);
        for slice in slices {
            values.push(Rc::new(decode_value(slice, tag, names, &name)?));
        }
        properties.push((name, values));
    }
    debug!("property blocks read");

    // BrickRecords
    let mut bricks = Vec::with_capacity(brick_count);
    for ordinal in 0..brick_count {
        let type_index = r.read_u16::<LE>()? as usize;
        let brick_type = type_names.get(type_index).ok_or_else(|| {
            Error::MalformedData(format!(
                "brick {ordinal}: type index {type_index} out of range"
            ))
        })?;
        let record_len = r.read_u32::<LE>()? as usize;

        let diff_count = r.read_u8()? as usize;
        let expected = 1 + 4 * diff_count + 24;
        if record_len != expected {
            return Err(Error::MalformedData(format!(
                "brick {ordinal}: record of {record_len} bytes, expected {expected} \
                 for {diff_count} property diffs"
            )));
        }

        let mut brick_properties: PropertyMap = registry
            .defaults_for(brick_type)
            .ok_or_else(|| {
                Error::MalformedData(format!("file names unknown brick type {brick_type:?}"))
            })?
            .clone();

        for _ in 0..diff_count {
            let prop_id = r.read_u16::<LE>()? as usize;
            let val_id = r.read_u16::<LE>()? as usize;
            let (prop_name, values) = properties.get(prop_id).ok_or_else(|| {
                Error::MalformedData(format!(
                    "brick {ordinal}: property id {prop_id} out of range"
                ))
            })?;
            let value = values.get(val_id).ok_or_else(|| {
                Error::MalformedData(format!(
                    "brick {ordinal}: value id {val_id} out of range for {prop_name:?}"
                ))
            })?;
            brick_properties.insert(prop_name.clone(), value.clone());
        }

        let position = r.read_f32_array::<3>()?;
        let stored = r.read_f32_array::<3>()?;
        // Undo the on-disk Y, Z, X permutation.
        let rotation = [stored[2], stored[0], stored[1]];

        bricks.push(Brick::from_decoded(
            brick_type.clone(),
            names.name_for(ordinal as u16),
            position,
            rotation,
            brick_properties,
        ));
    }
    debug!("brick records read");

    // Footer
    let seat_ref = r.read_u16::<LE>()?;
    let seat = if seat_ref == 0 {
        None
    } else {
        let brick = bricks.get(seat_ref as usize - 1).ok_or_else(|| {
            Error::MalformedData(format!("seat reference {seat_ref} out of range"))
        })?;
        Some(brick.name.clone())
    };

    let mut appendix = Vec::new();
    r.read_to_end(&mut appendix)?;

    Ok(Creation {
        seat,
        appendix,
        bricks,
        ..Creation::default()
    })
}

/// Deserializes one property value from its slice of the blob.
fn decode_value<N>(
    slice: &[u8],
    tag: PropertyTypeTag,
    names: &N,
    property: &str,
) -> Result<PropertyValue>
where
    N: NameResolver + ?Sized,
{
    use PropertyTypeTag as Tag;

    let bad_len = || {
        Error::MalformedData(format!(
            "property {property:?}: {} byte(s) cannot hold {}",
            slice.len(),
            tag.describe()
        ))
    };

    match tag {
        Tag::Binary => Ok(PropertyValue::Binary(slice.to_vec())),
        Tag::Bool => match slice {
            [0x00] => Ok(PropertyValue::Bool(false)),
            [0x01] => Ok(PropertyValue::Bool(true)),
            _ => Err(bad_len()),
        },
        Tag::BrickRef => match slice.len() {
            2 if slice == [0, 0] => Ok(PropertyValue::BrickRef(None)),
            4 => {
                let marker = u16::from_le_bytes([slice[0], slice[1]]);
                let wire = u16::from_le_bytes([slice[2], slice[3]]);
                if marker != 1 {
                    return Err(Error::MalformedData(format!(
                        "property {property:?}: brick reference marker {marker}"
                    )));
                }
                Ok(PropertyValue::BrickRef(match wire {
                    0 => None,
                    w => Some(names.name_for(w - 1)),
                }))
            }
            _ => Err(bad_len()),
        },
        Tag::Float32 => {
            let bytes: [u8; 4] = slice.try_into().map_err(|_| bad_len())?;
            Ok(PropertyValue::Float(f32::from_le_bytes(bytes)))
        }
        Tag::Vec3Float => {
            if slice.len() != 12 {
                return Err(bad_len());
            }
            let mut r = slice;
            Ok(PropertyValue::Vec3(r.read_f32_array::<3>()?))
        }
        Tag::Vec3UInt8 => {
            let bytes: [u8; 3] = slice.try_into().map_err(|_| bad_len())?;
            Ok(PropertyValue::Rgb(bytes))
        }
        Tag::Vec4UInt8 => {
            let bytes: [u8; 4] = slice.try_into().map_err(|_| bad_len())?;
            Ok(PropertyValue::Rgba(bytes))
        }
        Tag::PackedUInt2x6 => {
            let bytes: [u8; 2] = slice.try_into().map_err(|_| bad_len())?;
            Ok(PropertyValue::Packed2x6(unpack_u2x6(u16::from_le_bytes(
                bytes,
            ))))
        }
        Tag::BrickRefList => {
            let mut r = slice;
            let list = r.read_array_with_length(
                |r| r.read_u16::<LE>(),
                |r| {
                    let wire = r.read_u16::<LE>()?;
                    if wire == 0 {
                        return Err(Error::MalformedData(format!(
                            "property {property:?}: null reference inside a brick list"
                        )));
                    }
                    Ok(names.name_for(wire - 1))
                },
            )?;
            if !r.is_empty() {
                return Err(bad_len());
            }
            Ok(PropertyValue::BrickRefList(list))
        }
        Tag::StringAscii => {
            let mut r = slice;
            let s = r.read_str8()?;
            if !r.is_empty() {
                return Err(bad_len());
            }
            Ok(PropertyValue::Ascii(s))
        }
        Tag::StringAuto => {
            let mut r = slice;
            let s = r.read_str_auto()?;
            if !r.is_empty() {
                return Err(bad_len());
            }
            Ok(PropertyValue::Text(s))
        }
        Tag::UInt8 => match slice {
            [v] => Ok(PropertyValue::UInt8(*v)),
            _ => Err(bad_len()),
        },
    }
}
