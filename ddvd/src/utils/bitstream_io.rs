//! Bitstream I/O utilities for subpicture parsing.
//!
//! Provides a nibble-granular cursor over run-length encoded subpicture
//! data. Each interlaced field is read through its own cursor.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{BigEndian, BitRead, BitReader};

#[derive(Debug)]
pub struct NibbleReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type NibbleSliceReader<'a> = NibbleReader<io::Cursor<&'a [u8]>>;

impl<'a> NibbleSliceReader<'a> {
    /// Creates a cursor over `data` positioned at `byte_offset`.
    pub fn from_slice(data: &'a [u8], byte_offset: usize) -> io::Result<Self> {
        let mut reader = Self::new(io::Cursor::new(data), data.len() as u64);
        reader.bs.seek_bits(SeekFrom::Start((byte_offset as u64) << 3))?;
        Ok(reader)
    }
}

impl<R> NibbleReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn nibble(&mut self) -> io::Result<u8> {
        match self.bs.read_unsigned_var(4) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "nibble(): out of bounds bits at {}",
                    self.bs.position_in_bits().unwrap_or(0)
                ),
            )),
            Err(e) => Err(e),
        }
    }

    /// Reads one variable-length RLE code.
    ///
    /// A code is 1 to 4 nibbles long: another nibble is appended while the
    /// accumulated value stays below 0x4, 0x10 and 0x40 respectively.
    #[inline(always)]
    pub fn rle_code(&mut self) -> io::Result<u16> {
        let mut code = u16::from(self.nibble()?);
        for threshold in [0x4, 0x10, 0x40] {
            if code >= threshold {
                break;
            }
            code = (code << 4) | u16::from(self.nibble()?);
        }
        Ok(code)
    }

    /// Skips to the next byte boundary (end of scanline).
    #[inline(always)]
    pub fn align(&mut self) {
        self.bs.byte_align();
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        Ok(self.len.saturating_sub(self.position()?))
    }
}

#[test]
fn rle_code_lengths() -> io::Result<()> {
    // 1 nibble: 0x7, 2 nibbles: 0x11, 3 nibbles: 0x04_3 -> 0x043, 4 nibbles: 0x00_0D -> 0x000D
    let data = [0x71, 0x10, 0x43, 0x00, 0x0D];
    let mut reader = NibbleSliceReader::from_slice(&data, 0)?;

    assert_eq!(reader.rle_code()?, 0x7);
    assert_eq!(reader.rle_code()?, 0x11);
    assert_eq!(reader.rle_code()?, 0x043);
    assert_eq!(reader.rle_code()?, 0x000D);
    assert_eq!(reader.available()?, 0);

    Ok(())
}

#[test]
fn align_and_offset() -> io::Result<()> {
    let data = [0xAB, 0xCD, 0xEF];
    let mut reader = NibbleSliceReader::from_slice(&data, 1)?;

    assert_eq!(reader.nibble()?, 0xC);
    reader.align();
    assert_eq!(reader.position()?, 16);
    assert_eq!(reader.nibble()?, 0xE);
    assert_eq!(reader.nibble()?, 0xF);
    assert!(reader.nibble().is_err());

    Ok(())
}
