use std::io;

use log::{trace, warn};

use crate::structs::palette::PALETTE_BASE;
use crate::structs::pes::PesHeader;
use crate::structs::spu::{
    BoundingBox, DecodedSpu, FRAME_HEIGHT, FRAME_WIDTH, IndexedFrame, SpuControl, SpuKind,
};
use crate::utils::bitstream_io::NibbleSliceReader;
use crate::utils::buffer_pool::BufferPool;
use crate::utils::errors::SpuError;

/// A complete subpicture packet and the last PTS seen while collecting it.
#[derive(Debug)]
pub struct AssembledSpu {
    pub data: Vec<u8>,
    pub pts: u64,
}

/// Collects subpicture payload across sectors until the declared packet size
/// is reached.
#[derive(Debug, Default)]
pub struct SpuAssembler {
    pool: BufferPool,
    current: Option<Vec<u8>>,
    pts: u64,
}

impl SpuAssembler {
    /// Appends the payload of one subpicture sector (after the sub-stream id).
    pub fn push(&mut self, sector: &[u8], header: &PesHeader) -> Option<AssembledSpu> {
        if let Some(pts) = header.pts {
            self.pts = pts;
        }

        let start = header.payload_offset() + 1;
        let end = header.end(sector.len());
        if start >= end {
            return None;
        }

        let pool = &mut self.pool;
        let buf = self.current.get_or_insert_with(|| pool.acquire());
        buf.extend_from_slice(&sector[start..end]);

        if buf.len() < 2 {
            return None;
        }
        let size = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
        if buf.len() < size {
            return None;
        }

        let mut data = self.current.take()?;
        data.truncate(size);
        trace!("Subpicture packet complete: {size} bytes, pts {}", self.pts);
        Some(AssembledSpu {
            data,
            pts: self.pts,
        })
    }

    pub fn release(&mut self, buf: Vec<u8>) {
        self.pool.release(buf);
    }

    /// Drops a partially collected packet.
    pub fn reset(&mut self) {
        if let Some(buf) = self.current.take() {
            self.pool.release(buf);
        }
    }

    pub fn in_progress(&self) -> usize {
        self.current.as_ref().map_or(0, Vec::len)
    }
}

fn be16(data: &[u8], at: usize) -> Result<u16, SpuError> {
    match data.get(at..at + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(SpuError::Truncated {
            needed: at + 2,
            available: data.len(),
        }),
    }
}

fn operands(data: &[u8], at: usize, count: usize, size: usize) -> Result<&[u8], SpuError> {
    if at + count > size {
        return Err(SpuError::Truncated {
            needed: at + count,
            available: size,
        });
    }
    Ok(&data[at..at + count])
}

/// Pixel-code order of a `0x03`/`0x04` operand pair: codes 3,2 then 1,0.
fn nibble_quad(b: &[u8]) -> [u8; 4] {
    [b[1] & 0x0F, b[1] >> 4, b[0] & 0x0F, b[0] >> 4]
}

/// Walks the first control sequence of a subpicture packet.
pub fn parse_control(data: &[u8]) -> Result<SpuControl, SpuError> {
    let size = usize::from(be16(data, 0)?);
    let datasize = usize::from(be16(data, 2)?);
    if datasize + 2 > size {
        return Err(SpuError::InconsistentSize { datasize, size });
    }
    if size > data.len() {
        return Err(SpuError::Truncated {
            needed: size,
            available: data.len(),
        });
    }

    let mut highlight = false;
    let mut show = false;
    let mut colors = None;
    let mut alpha = None;
    let mut bbox = None;
    let mut offsets = None;

    let mut i = datasize + 4;
    while i < size && data[i] != 0xFF {
        match data[i] {
            0x00 => {
                highlight = true;
                i += 1;
            }
            0x01 => {
                show = true;
                i += 1;
            }
            0x02 => i += 1,
            0x03 => {
                colors = Some(nibble_quad(operands(data, i + 1, 2, size)?));
                i += 3;
            }
            0x04 => {
                alpha = Some(nibble_quad(operands(data, i + 1, 2, size)?));
                i += 3;
            }
            0x05 => {
                let b = operands(data, i + 1, 6, size)?;
                bbox = Some(BoundingBox::from_packed(&[b[0], b[1], b[2], b[3], b[4], b[5]]));
                i += 7;
            }
            0x06 => {
                let b = operands(data, i + 1, 4, size)?;
                offsets = Some([
                    usize::from(u16::from_be_bytes([b[0], b[1]])),
                    usize::from(u16::from_be_bytes([b[2], b[3]])),
                ]);
                i += 5;
            }
            0x07 => {
                let len = usize::from(be16(data, i + 1)?);
                i += 1 + len.max(2);
            }
            _ => i += 1,
        }
    }

    let display_time = if i + 6 < size && data[i + 5] == 0x02 && data[i + 6] == 0xFF {
        i32::from(be16(data, i + 1)?)
    } else {
        -1
    };

    let kind = if highlight {
        SpuKind::HighlightMask
    } else if show {
        SpuKind::Subtitle
    } else {
        return Err(SpuError::NoDisplayCommand);
    };

    let bbox = bbox.ok_or(SpuError::MissingBoundingBox)?;
    if !bbox.is_valid() {
        return Err(SpuError::InvalidBoundingBox {
            x1: bbox.x1,
            y1: bbox.y1,
            x2: bbox.x2,
            y2: bbox.y2,
        });
    }
    let offsets = offsets.ok_or(SpuError::MissingOffsets)?;

    Ok(SpuControl {
        kind,
        bbox,
        offsets,
        display_time,
        colors,
        alpha,
        datasize,
    })
}

/// Run-length decodes both fields into `scratch` and returns the pixels of
/// the (frame-clamped) bounding box.
///
/// Runs are clamped to the right edge of the box and decoding never goes
/// past row 575.
pub fn decode_bitmap(
    data: &[u8],
    control: &SpuControl,
    scratch: &mut IndexedFrame,
) -> Result<Vec<u8>, SpuError> {
    let bbox = control.bbox.clamped();
    let area = &data[..control.datasize.min(data.len())];

    let mut fields = [
        NibbleSliceReader::from_slice(area, control.offsets[0])?,
        NibbleSliceReader::from_slice(area, control.offsets[1])?,
    ];

    scratch.clear_rect(&bbox);

    let x1 = usize::from(bbox.x1);
    let x2 = usize::from(bbox.x2);
    let y2 = usize::from(bbox.y2).min(FRAME_HEIGHT - 1);
    let (mut x, mut y) = (x1, usize::from(bbox.y1));
    let mut field = 0;

    while y <= y2 {
        let code = match fields[field].rle_code() {
            Ok(code) => code,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };

        let remaining = x2 + 1 - x;
        let run = usize::from(code >> 2);
        let len = if run == 0 || run > remaining {
            remaining
        } else {
            run
        };
        scratch.fill_run(x, y, len, PALETTE_BASE + (code & 0x03) as u8);

        x += len;
        if x > x2 {
            fields[field].align();
            field ^= 1;
            x = x1;
            y += 1;
        }
    }

    debug_assert!(x2 < FRAME_WIDTH);
    Ok(IndexedFrame::copy_rect_from(scratch, &bbox))
}

/// Decodes a complete packet.
pub fn decode(data: &[u8], scratch: &mut IndexedFrame) -> Result<DecodedSpu, SpuError> {
    let control = parse_control(data)?;
    let pixels = decode_bitmap(data, &control, scratch)?;
    Ok(DecodedSpu {
        kind: control.kind,
        bbox: control.bbox.clamped(),
        display_time: control.display_time,
        colors: control.colors,
        alpha: control.alpha,
        pixels,
    })
}

/// Packet assembly plus decoding with a reusable scratch frame.
#[derive(Debug, Default)]
pub struct SpuDecoder {
    assembler: SpuAssembler,
    scratch: IndexedFrame,
}

impl SpuDecoder {
    /// Feeds one subpicture sector. Returns the decoded subpicture and its
    /// PTS when a packet completes; malformed packets are logged and dropped.
    pub fn push(&mut self, sector: &[u8], header: &PesHeader) -> Option<(DecodedSpu, u64)> {
        let packet = self.assembler.push(sector, header)?;
        let result = decode(&packet.data, &mut self.scratch);
        let pts = packet.pts;
        self.assembler.release(packet.data);

        match result {
            Ok(spu) => Some((spu, pts)),
            Err(e) => {
                warn!("Discarding subpicture at pts {pts}: {e}");
                None
            }
        }
    }

    pub fn reset(&mut self) {
        self.assembler.reset();
    }

    /// Bytes collected towards the next packet.
    pub fn in_progress(&self) -> usize {
        self.assembler.in_progress()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::process::classify::private_sector;
    use crate::structs::pes::PtsEncoding;
    use anyhow::Result;

    /// A 4×4 block of pixel code 1 shown for one second.
    pub(crate) const SOLID_BLOCK: [u8; 32] = [
        0x00, 0x20, 0x00, 0x08, // size, control offset
        0x11, 0x11, // even field: two runs of 4 × code 1
        0x11, 0x11, // odd field
        0x00, 0x00, 0x00, 0x08, // control sequence header
        0x06, 0x00, 0x04, 0x00, 0x06, // RLE offsets
        0x05, 0x00, 0x00, 0x03, 0x00, 0x00, 0x03, // (0,0)-(3,3)
        0x01, // show
        0xFF, // end
        0x00, 0x64, 0x00, 0x1A, 0x02, 0xFF, // hide after 100/100 s
    ];

    #[test]
    fn solid_block() -> Result<()> {
        let mut scratch = IndexedFrame::default();
        let spu = decode(&SOLID_BLOCK, &mut scratch)?;

        assert_eq!(spu.kind, SpuKind::Subtitle);
        assert_eq!(spu.display_time, 100);
        assert_eq!(
            spu.bbox,
            BoundingBox {
                x1: 0,
                y1: 0,
                x2: 3,
                y2: 3
            }
        );
        assert_eq!(spu.pixels, vec![253; 16]);
        assert_eq!(scratch.pixel(4, 0), 0);
        assert_eq!(scratch.pixel(0, 4), 0);
        Ok(())
    }

    #[test]
    fn control_commands() -> Result<()> {
        let mut packet = SOLID_BLOCK.to_vec();
        // Replace show with a highlight marker and add colour/contrast.
        packet.splice(24..25, [0x00, 0x03, 0x32, 0x10, 0x04, 0xFF, 0x0F]);
        let size = packet.len() as u16;
        packet[..2].copy_from_slice(&size.to_be_bytes());

        let control = parse_control(&packet)?;
        assert_eq!(control.kind, SpuKind::HighlightMask);
        assert_eq!(control.colors, Some([0, 1, 2, 3]));
        assert_eq!(control.alpha, Some([0xF, 0x0, 0xF, 0xF]));
        assert_eq!(control.offsets, [4, 6]);
        assert_eq!(control.display_time, 100);
        Ok(())
    }

    #[test]
    fn malformed_packets() {
        let mut no_show = SOLID_BLOCK;
        no_show[24] = 0x02;
        assert!(matches!(
            parse_control(&no_show),
            Err(SpuError::NoDisplayCommand)
        ));

        let mut inconsistent = SOLID_BLOCK;
        inconsistent[2..4].copy_from_slice(&0x001Fu16.to_be_bytes());
        assert!(matches!(
            parse_control(&inconsistent),
            Err(SpuError::InconsistentSize { .. })
        ));

        let mut no_bbox = SOLID_BLOCK;
        no_bbox[17] = 0x02;
        assert!(matches!(
            parse_control(&no_bbox),
            Err(SpuError::MissingBoundingBox)
        ));

        assert!(matches!(
            parse_control(&SOLID_BLOCK[..20]),
            Err(SpuError::Truncated { .. })
        ));
    }

    #[test]
    fn rows_past_the_frame_are_not_written() -> Result<()> {
        let mut packet = SOLID_BLOCK;
        // (0,574)-(3,0x3FF): only rows 574 and 575 fit.
        packet[17..24].copy_from_slice(&[0x05, 0x00, 0x00, 0x03, 0x23, 0xE3, 0xFF]);

        let mut scratch = IndexedFrame::default();
        let spu = decode(&packet, &mut scratch)?;
        assert_eq!(spu.bbox.y2, 575);
        assert_eq!(spu.pixels, vec![253; 8]);
        assert_eq!(scratch.pixel(0, 575), 253);
        Ok(())
    }

    #[test]
    fn box_below_the_frame_is_rejected() {
        let mut packet = SOLID_BLOCK;
        // (0,0x240)-(3,0x243): starts at row 576.
        packet[17..24].copy_from_slice(&[0x05, 0x00, 0x00, 0x03, 0x24, 0x02, 0x43]);

        let mut scratch = IndexedFrame::default();
        assert!(matches!(
            decode(&packet, &mut scratch),
            Err(SpuError::InvalidBoundingBox { y1: 576, .. })
        ));
        assert_eq!(scratch.pixel(0, 575), 0);
    }

    #[test]
    fn packet_split_across_sectors() -> Result<()> {
        let mut decoder = SpuDecoder::default();
        let first = private_sector(0x20, Some(90_000), &SOLID_BLOCK[..10]);
        let second = private_sector(0x20, None, &SOLID_BLOCK[10..]);

        let h1 = PesHeader::parse(&first, PtsEncoding::Standard).unwrap();
        assert!(decoder.push(&first, &h1).is_none());
        assert_eq!(decoder.assembler.in_progress(), 10);

        let h2 = PesHeader::parse(&second, PtsEncoding::Standard).unwrap();
        let (spu, pts) = decoder.push(&second, &h2).unwrap();
        assert_eq!(pts, 90_000);
        assert_eq!(spu.pixels.len(), 16);
        assert_eq!(decoder.assembler.in_progress(), 0);
        Ok(())
    }
}
