//! Fixed-size little-endian payload values

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::traits::ParseResult;

/// A value with a fixed on-disk size inside a sub-record payload
pub trait Field: Sized {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Decode from the front of `buf`, advancing it
    fn decode(buf: &mut &[u8]) -> ParseResult<Self>;

    /// Append the encoded form to `out`
    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()>;
}

macro_rules! impl_field {
    ($ty:ty, $size:expr, $read:ident, $write:ident) => {
        impl Field for $ty {
            const SIZE: usize = $size;

            fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
                Ok(buf.$read::<LittleEndian>()?)
            }

            fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
                out.$write::<LittleEndian>(*self)?;
                Ok(())
            }
        }
    };
}

impl_field!(u16, 2, read_u16, write_u16);
impl_field!(i16, 2, read_i16, write_i16);
impl_field!(u32, 4, read_u32, write_u32);
impl_field!(i32, 4, read_i32, write_i32);
impl_field!(u64, 8, read_u64, write_u64);
impl_field!(f32, 4, read_f32, write_f32);

impl Field for u8 {
    const SIZE: usize = 1;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        Ok(buf.read_u8()?)
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.push(*self);
        Ok(())
    }
}

impl Field for i8 {
    const SIZE: usize = 1;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        Ok(buf.read_i8()?)
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.write_i8(*self)?;
        Ok(())
    }
}

impl<const N: usize> Field for [u8; N] {
    const SIZE: usize = N;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        let mut bytes = [0u8; N];
        std::io::Read::read_exact(buf, &mut bytes)?;
        Ok(bytes)
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.extend_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> Field for [i32; N] {
    const SIZE: usize = 4 * N;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        let mut values = [0i32; N];
        buf.read_i32_into::<LittleEndian>(&mut values)?;
        Ok(values)
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        for value in self {
            out.write_i32::<LittleEndian>(*value)?;
        }
        Ok(())
    }
}

impl<const N: usize> Field for [f32; N] {
    const SIZE: usize = 4 * N;

    fn decode(buf: &mut &[u8]) -> ParseResult<Self> {
        let mut values = [0f32; N];
        buf.read_f32_into::<LittleEndian>(&mut values)?;
        Ok(values)
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        for value in self {
            out.write_f32::<LittleEndian>(*value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_layout() {
        let mut out = Vec::new();
        0x0102_0304u32.encode(&mut out).unwrap();
        (-2i16).encode(&mut out).unwrap();
        assert_eq!(out, [0x04, 0x03, 0x02, 0x01, 0xFE, 0xFF]);

        let mut buf = &out[..];
        assert_eq!(u32::decode(&mut buf).unwrap(), 0x0102_0304);
        assert_eq!(i16::decode(&mut buf).unwrap(), -2);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_array_fields() {
        let mut out = Vec::new();
        [1.5f32, -3.0, 0.25].encode(&mut out).unwrap();
        assert_eq!(out.len(), <[f32; 3]>::SIZE);
        assert_eq!(<[f32; 3]>::decode(&mut &out[..]).unwrap(), [1.5, -3.0, 0.25]);
    }

    #[test]
    fn test_short_buffer_is_error() {
        let data = [1u8, 2];
        assert!(u32::decode(&mut &data[..]).is_err());
    }
}
