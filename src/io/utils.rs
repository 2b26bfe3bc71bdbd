//! Binary primitives shared by every record layout: little-endian integers
//! and floats, the hand-rolled half-float conversion, the two string
//! encodings, and length-prefixed array helpers.

use std::io::{self, Read, Write};
use std::mem::size_of;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use num_traits::{FromPrimitive, PrimInt, ToPrimitive, Unsigned};

use crate::io::Error;

pub(crate) fn u8_len(len: usize) -> Result<u8, Error> {
    u8::try_from(len).map_err(|_| Error::Range {
        value: len as i128,
        bits: 8,
    })
}

pub(crate) fn u16_len(len: usize) -> Result<u16, Error> {
    u16::try_from(len).map_err(|_| Error::Range {
        value: len as i128,
        bits: 16,
    })
}

pub(crate) fn u32_len(len: usize) -> Result<u32, Error> {
    u32::try_from(len).map_err(|_| Error::Range {
        value: len as i128,
        bits: 32,
    })
}

/// Converts a 32-bit float to IEEE754 binary16 bits.
///
/// Infinity and NaN pass through (NaN keeps the top 10 mantissa bits with the
/// quiet bit forced). Rebiased exponents below −24 flush to signed zero,
/// above 15 overflow to signed infinity; the range between the smallest
/// normal half and −24 produces half subnormals.
pub fn f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x007F_FFFF;

    if exponent == 0xFF {
        return if mantissa != 0 {
            sign | 0x7C00 | 0x0200 | (mantissa >> 13) as u16
        } else {
            sign | 0x7C00
        };
    }

    let exponent = exponent - 127;
    if exponent < -24 {
        return sign;
    }
    if exponent > 15 {
        return sign | 0x7C00;
    }
    if exponent < -14 {
        // Subnormal half: shift the full significand (implicit bit included)
        // down to the 2^-24 grid.
        let significand = 0x0080_0000 | mantissa;
        return sign | (significand >> -(exponent + 1)) as u16;
    }

    sign | (((exponent + 15) as u16) << 10) | (mantissa >> 13) as u16
}

/// Packs six 2-bit fields into one 16-bit word, field `i` at bits `2i..2i+2`.
pub fn pack_u2x6(fields: &[u8; 6]) -> Result<u16, Error> {
    let mut word = 0u16;
    for (i, &field) in fields.iter().enumerate() {
        if field > 3 {
            return Err(Error::Range {
                value: field as i128,
                bits: 2,
            });
        }
        word |= (field as u16) << (2 * i);
    }
    Ok(word)
}

/// Inverse of [`pack_u2x6`].
pub fn unpack_u2x6(word: u16) -> [u8; 6] {
    let mut fields = [0u8; 6];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = ((word >> (2 * i)) & 0x3) as u8;
    }
    fields
}

pub trait WriteUtils: Write {
    fn write_array_f32(&mut self, array: &[f32]) -> io::Result<()> {
        for &v in array {
            self.write_f32::<LE>(v)?;
        }
        Ok(())
    }

    fn write_f16(&mut self, value: f32) -> io::Result<()> {
        self.write_u16::<LE>(f16_bits(value))
    }

    /// 1-byte length prefix plus raw ASCII bytes.
    fn write_str8(&mut self, s: &str) -> Result<(), Error> {
        if !s.is_ascii() {
            return Err(Error::Encoding("ASCII"));
        }
        self.write_u8(u8_len(s.len())?)?;
        self.write_all(s.as_bytes())?;
        Ok(())
    }

    /// 2-byte signed prefix: positive byte count + ASCII, or negative UTF-16
    /// code-unit count + UTF-16LE (no BOM) when the string is not ASCII.
    fn write_str_auto(&mut self, s: &str) -> Result<(), Error> {
        if s.is_ascii() {
            let len = i16::try_from(s.len()).map_err(|_| Error::Range {
                value: s.len() as i128,
                bits: 16,
            })?;
            self.write_i16::<LE>(len)?;
            self.write_all(s.as_bytes())?;
            Ok(())
        } else {
            self.write_str_utf16(s)
        }
    }

    /// UTF-16LE with a negative 2-byte code-unit count, BOM stripped.
    fn write_str_utf16(&mut self, s: &str) -> Result<(), Error> {
        let units: Vec<u16> = s.encode_utf16().collect();
        let neg = i16::try_from(-(units.len() as i64)).map_err(|_| Error::Range {
            value: units.len() as i128,
            bits: 16,
        })?;
        self.write_i16::<LE>(neg)?;
        for unit in units {
            self.write_u16::<LE>(unit)?;
        }
        Ok(())
    }

    /// Writes a length of type `N` followed by every element.
    fn write_array_with_length<N, T>(
        &mut self,
        l: impl Fn(&mut Self, N) -> io::Result<()>,
        f: impl Fn(&mut Self, &T) -> Result<(), Error>,
        array: &[T],
    ) -> Result<(), Error>
    where
        N: PrimInt + Unsigned + FromPrimitive,
    {
        let len = N::from_usize(array.len()).ok_or(Error::Range {
            value: array.len() as i128,
            bits: (size_of::<N>() * 8) as u32,
        })?;
        l(self, len)?;
        for value in array {
            f(self, value)?;
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> WriteUtils for W {}

pub trait ReadUtils: Read {
    fn read_f32_array<const N: usize>(&mut self) -> io::Result<[f32; N]> {
        let mut out = [0.0f32; N];
        for v in out.iter_mut() {
            *v = self.read_f32::<LE>()?;
        }
        Ok(out)
    }

    /// Reads exactly `len` bytes, turning a short read into a decode error
    /// that names what was being read.
    fn read_exact_buf(&mut self, len: usize, what: &str) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::MalformedData(format!(
                    "{what}: declared length {len} exceeds the remaining data"
                ))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(buf)
    }

    fn read_str8(&mut self) -> Result<String, Error> {
        let len = self.read_u8()? as usize;
        let buf = self.read_exact_buf(len, "string")?;
        String::from_utf8(buf)
            .ok()
            .filter(|s| s.is_ascii())
            .ok_or(Error::Encoding("ASCII"))
    }

    /// Counterpart of [`WriteUtils::write_str_auto`] and
    /// [`WriteUtils::write_str_utf16`]: branches on the sign of the 2-byte
    /// length field.
    fn read_str_auto(&mut self) -> Result<String, Error> {
        let len = self.read_i16::<LE>()?;
        if len >= 0 {
            let buf = self.read_exact_buf(len as usize, "string")?;
            String::from_utf8(buf)
                .ok()
                .filter(|s| s.is_ascii())
                .ok_or(Error::Encoding("ASCII"))
        } else {
            let count = -(len as i32) as usize;
            let mut units = Vec::with_capacity(count);
            for _ in 0..count {
                units.push(self.read_u16::<LE>()?);
            }
            String::from_utf16(&units).map_err(|_| Error::Encoding("UTF-16"))
        }
    }

    /// Reads a length of type `N`, then that many elements.
    fn read_array_with_length<N, T>(
        &mut self,
        l: impl Fn(&mut Self) -> io::Result<N>,
        f: impl Fn(&mut Self) -> Result<T, Error>,
    ) -> Result<Vec<T>, Error>
    where
        N: PrimInt + Unsigned + ToPrimitive,
    {
        let len = l(self)?
            .to_usize()
            .ok_or_else(|| Error::MalformedData("array length does not fit in memory".into()))?;
        let mut values = Vec::with_capacity(len.min(u16::MAX as usize));
        for _ in 0..len {
            values.push(f(self)?);
        }
        Ok(values)
    }
}

impl<R: Read + ?Sized> ReadUtils for R {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f16_special_cases() {
        assert_eq!(f16_bits(f32::INFINITY), 0x7C00);
        assert_eq!(f16_bits(f32::NEG_INFINITY), 0xFC00);
        assert_eq!(f16_bits(0.0), 0x0000);
        assert_eq!(f16_bits(-0.0), 0x8000);
        // Quiet bit forced, payload truncated to the top 10 bits.
        assert_eq!(f16_bits(f32::NAN) & 0x7E00, 0x7E00);
    }

    #[test]
    fn f16_underflow_flushes_to_signed_zero() {
        // 2^-25 is below the smallest half subnormal.
        assert_eq!(f16_bits(2.0f32.powi(-25)), 0x0000);
        assert_eq!(f16_bits(-(2.0f32.powi(-25))), 0x8000);
    }

    #[test]
    fn f16_overflow_saturates_to_signed_infinity() {
        assert_eq!(f16_bits(100_000.0), 0x7C00);
        assert_eq!(f16_bits(-100_000.0), 0xFC00);
        assert_eq!(f16_bits(f32::MAX), 0x7C00);
    }

    #[test]
    fn f16_normals_and_subnormals() {
        assert_eq!(f16_bits(1.0), 0x3C00);
        assert_eq!(f16_bits(-2.0), 0xC000);
        assert_eq!(f16_bits(65504.0), 0x7BFF); // largest normal half
        assert_eq!(f16_bits(2.0f32.powi(-24)), 0x0001); // smallest subnormal
        assert_eq!(f16_bits(2.0f32.powi(-14)), 0x0400); // smallest normal
    }

    #[test]
    fn str8_rejects_non_ascii() {
        let mut buf = Vec::new();
        assert!(matches!(
            buf.write_str8("héllo"),
            Err(Error::Encoding("ASCII"))
        ));
    }

    #[test]
    fn str8_roundtrip() {
        let mut buf = Vec::new();
        buf.write_str8("Seat_2x2x7s").unwrap();
        assert_eq!(buf[0], 11);
        let mut r = &buf[..];
        assert_eq!(r.read_str8().unwrap(), "Seat_2x2x7s");
    }

    #[test]
    fn str_auto_ascii_branch_uses_positive_length() {
        let mut buf = Vec::new();
        buf.write_str_auto("abc").unwrap();
        assert_eq!(buf, [3, 0, b'a', b'b', b'c']);
        let mut r = &buf[..];
        assert_eq!(r.read_str_auto().unwrap(), "abc");
    }

    #[test]
    fn str_auto_utf16_branch_uses_negative_length() {
        let mut buf = Vec::new();
        buf.write_str_auto("héllo").unwrap();
        // -5 code units, then UTF-16LE without BOM.
        assert_eq!(&buf[..2], &(-5i16).to_le_bytes()[..]);
        assert_eq!(buf.len(), 2 + 10);
        let mut r = &buf[..];
        assert_eq!(r.read_str_auto().unwrap(), "héllo");
    }

    #[test]
    fn str_utf16_roundtrips_empty_string() {
        let mut buf = Vec::new();
        buf.write_str_utf16("").unwrap();
        assert_eq!(buf, [0, 0]);
        let mut r = &buf[..];
        assert_eq!(r.read_str_auto().unwrap(), "");
    }

    #[test]
    fn u2x6_packs_fields_low_bits_first() {
        let packed = pack_u2x6(&[1, 0, 3, 2, 0, 1]).unwrap();
        assert_eq!(packed, 0b01_00_10_11_00_01);
        assert_eq!(unpack_u2x6(packed), [1, 0, 3, 2, 0, 1]);
        assert!(matches!(
            pack_u2x6(&[4, 0, 0, 0, 0, 0]),
            Err(Error::Range { .. })
        ));
    }

    #[test]
    fn exact_buf_reports_short_reads_as_malformed() {
        let data = [1u8, 2, 3];
        let mut r = &data[..];
        let err = r.read_exact_buf(8, "value blob").unwrap_err();
        assert!(matches!(err, Error::MalformedData(_)));
    }
}
