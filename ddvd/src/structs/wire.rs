//! Little-endian wire codec for queue records.
//!
//! Payload structs derive [`ToWire`](ddvd_macros::ToWire) and
//! [`FromWire`](ddvd_macros::FromWire) to get field-by-field encoders.

use crate::utils::errors::ProtocolError;

pub trait WireWrite {
    /// Encoded size in bytes.
    const WIRE_LEN: usize;

    fn write_wire(&self, dst: &mut Vec<u8>);
}

pub trait WireRead: Sized {
    fn read_wire(src: &mut &[u8]) -> Result<Self, ProtocolError>;
}

macro_rules! impl_num_wire {
    ($($t:ty),+) => { $(
        impl WireWrite for $t {
            const WIRE_LEN: usize = std::mem::size_of::<$t>();

            #[inline]
            fn write_wire(&self, dst: &mut Vec<u8>) {
                dst.extend_from_slice(&self.to_le_bytes());
            }
        }

        impl WireRead for $t {
            #[inline]
            fn read_wire(src: &mut &[u8]) -> Result<Self, ProtocolError> {
                let mut bytes = [0u8; std::mem::size_of::<$t>()];
                let data = *src;
                let (head, rest) = data
                    .split_at_checked(bytes.len())
                    .ok_or(ProtocolError::Truncated {
                        expected: bytes.len(),
                        available: data.len(),
                    })?;
                bytes.copy_from_slice(head);
                *src = rest;
                Ok(<$t>::from_le_bytes(bytes))
            }
        }
    )+ }
}

impl_num_wire!(u8, u16, i16, u32, i32, u64);

impl<T: WireWrite, const N: usize> WireWrite for [T; N] {
    const WIRE_LEN: usize = T::WIRE_LEN * N;

    #[inline]
    fn write_wire(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_wire(dst));
    }
}

impl<T: WireRead + Copy + Default, const N: usize> WireRead for [T; N] {
    fn read_wire(src: &mut &[u8]) -> Result<Self, ProtocolError> {
        let mut out = [T::default(); N];
        for item in out.iter_mut() {
            *item = T::read_wire(src)?;
        }
        Ok(out)
    }
}

/// Encodes `text` into a fixed NUL-padded field of `N` bytes.
pub fn fixed_string<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [0u8; N];
    let mut end = text.len().min(N.saturating_sub(1));
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&text.as_bytes()[..end]);
    out
}

/// Decodes a NUL-padded field written by [`fixed_string`].
pub fn from_fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddvd_macros::{FromWire, ToWire};

    #[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq)]
    struct Mini {
        a: u16,
        b: i32,
        tag: [u8; 4],
    }

    #[test]
    fn derive_encodes_fields_in_order() -> Result<(), ProtocolError> {
        let s = Mini {
            a: 0x1234,
            b: -2,
            tag: *b"TEST",
        };

        let mut buf = Vec::new();
        s.write_wire(&mut buf);

        assert_eq!(Mini::WIRE_LEN, 10);
        assert_eq!(
            &buf[..],
            &[0x34, 0x12, 0xFE, 0xFF, 0xFF, 0xFF, b'T', b'E', b'S', b'T']
        );

        let mut src = &buf[..];
        assert_eq!(Mini::read_wire(&mut src)?, s);
        assert!(src.is_empty());

        Ok(())
    }

    #[test]
    fn short_payload_is_rejected() {
        let mut src: &[u8] = &[0x01, 0x02, 0x03];
        assert!(matches!(
            u32::read_wire(&mut src),
            Err(ProtocolError::Truncated {
                expected: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn fixed_strings() {
        let field: [u8; 8] = fixed_string("Error: a long message");
        assert_eq!(&field, b"Error: \0");
        assert_eq!(from_fixed_string(&field), "Error: ");
        assert_eq!(from_fixed_string(&fixed_string::<4>("en")), "en");
    }
}
