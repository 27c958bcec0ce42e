//! Decoded subpicture units and the indexed overlay frame they are drawn into.

use crate::structs::nav::HighlightInfo;

/// Overlay width in pixels.
pub const FRAME_WIDTH: usize = 720;
/// Overlay height in pixels.
pub const FRAME_HEIGHT: usize = 576;

/// What a decoded subpicture is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SpuKind {
    /// Visible subtitle (`0x01` show command).
    Subtitle = 1,
    /// Button region mask of a menu (`0x00` forced-display command).
    HighlightMask = 2,
    /// Neither command was seen; never rendered.
    Malformed = 0,
}

/// Inclusive pixel rectangle of a subpicture.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

impl BoundingBox {
    pub fn width(&self) -> usize {
        usize::from(self.x2.saturating_sub(self.x1)) + 1
    }

    pub fn height(&self) -> usize {
        usize::from(self.y2.saturating_sub(self.y1)) + 1
    }

    /// Unpacks the 6 bytes of a `0x05` control command:
    /// `x1:12 x2:12 y1:12 y2:12`.
    pub fn from_packed(b: &[u8; 6]) -> Self {
        Self {
            x1: u16::from(b[0]) << 4 | u16::from(b[1] >> 4),
            x2: u16::from(b[1] & 0x0F) << 8 | u16::from(b[2]),
            y1: u16::from(b[3]) << 4 | u16::from(b[4] >> 4),
            y2: u16::from(b[4] & 0x0F) << 8 | u16::from(b[5]),
        }
    }

    /// Restricts the rectangle to the overlay frame. Only meaningful for a
    /// valid box, whose top-left corner lies inside the frame.
    pub fn clamped(&self) -> Self {
        Self {
            x1: self.x1.min(FRAME_WIDTH as u16 - 1),
            y1: self.y1.min(FRAME_HEIGHT as u16 - 1),
            x2: self.x2.min(FRAME_WIDTH as u16 - 1),
            y2: self.y2.min(FRAME_HEIGHT as u16 - 1),
        }
    }

    /// Ordered corners with the top-left one inside the frame.
    pub fn is_valid(&self) -> bool {
        self.x1 <= self.x2
            && self.y1 <= self.y2
            && usize::from(self.x1) < FRAME_WIDTH
            && usize::from(self.y1) < FRAME_HEIGHT
    }
}

/// Result of walking the control sequence of a subpicture packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpuControl {
    pub kind: SpuKind,
    pub bbox: BoundingBox,
    /// Byte offsets of the even and odd field RLE streams.
    pub offsets: [usize; 2],
    /// Display duration in 1/100 s, -1 when the packet carries none.
    pub display_time: i32,
    /// CLUT indices for pixel codes 0..=3 (`0x03`).
    pub colors: Option<[u8; 4]>,
    /// Contrast levels for pixel codes 0..=3 (`0x04`).
    pub alpha: Option<[u8; 4]>,
    /// Byte count of the RLE data area.
    pub datasize: usize,
}

/// A fully decoded subpicture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedSpu {
    pub kind: SpuKind,
    pub bbox: BoundingBox,
    pub display_time: i32,
    pub colors: Option<[u8; 4]>,
    pub alpha: Option<[u8; 4]>,
    /// Row-major overlay indices covering `bbox`.
    pub pixels: Vec<u8>,
}

/// One entry of the pending subpicture ring.
#[derive(Debug, Clone, PartialEq)]
pub struct SpuPendingEntry {
    pub spu: DecodedSpu,
    pub target_pts: u64,
    /// Button geometry valid when the packet was decoded.
    pub highlight: Option<HighlightInfo>,
}

/// 720×576 indexed overlay bitmap.
#[derive(Clone, PartialEq, Eq)]
pub struct IndexedFrame {
    pixels: Vec<u8>,
}

impl std::fmt::Debug for IndexedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.pixels.iter().filter(|&&p| p != 0).count();
        f.debug_struct("IndexedFrame")
            .field("non_transparent", &used)
            .finish()
    }
}

impl Default for IndexedFrame {
    fn default() -> Self {
        Self {
            pixels: vec![0; FRAME_WIDTH * FRAME_HEIGHT],
        }
    }
}

impl IndexedFrame {
    pub fn as_slice(&self) -> &[u8] {
        &self.pixels
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn clear_rect(&mut self, bbox: &BoundingBox) {
        let b = bbox.clamped();
        for y in usize::from(b.y1)..=usize::from(b.y2) {
            let row = y * FRAME_WIDTH;
            self.pixels[row + usize::from(b.x1)..=row + usize::from(b.x2)].fill(0);
        }
    }

    /// Writes `len` pixels of `value` starting at `(x, y)`, clipped to the row.
    pub fn fill_run(&mut self, x: usize, y: usize, len: usize, value: u8) {
        if y >= FRAME_HEIGHT || x >= FRAME_WIDTH {
            return;
        }
        let end = (x + len).min(FRAME_WIDTH);
        let row = y * FRAME_WIDTH;
        self.pixels[row + x..row + end].fill(value);
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        if x >= FRAME_WIDTH || y >= FRAME_HEIGHT {
            return 0;
        }
        self.pixels[y * FRAME_WIDTH + x]
    }

    /// Copies a row-major `bbox`-sized block into the frame.
    pub fn blit(&mut self, bbox: &BoundingBox, pixels: &[u8]) {
        let w = bbox.width();
        for (dy, line) in pixels.chunks(w).enumerate().take(bbox.height()) {
            let y = usize::from(bbox.y1) + dy;
            if y >= FRAME_HEIGHT {
                break;
            }
            let x = usize::from(bbox.x1);
            if x >= FRAME_WIDTH {
                break;
            }
            let n = line.len().min(FRAME_WIDTH - x);
            let row = y * FRAME_WIDTH;
            self.pixels[row + x..row + x + n].copy_from_slice(&line[..n]);
        }
    }

    /// Copies the `bbox` region out of `src` in row-major order.
    pub fn copy_rect_from(src: &IndexedFrame, bbox: &BoundingBox) -> Vec<u8> {
        let b = bbox.clamped();
        let mut out = Vec::with_capacity(b.width() * b.height());
        for y in usize::from(b.y1)..=usize::from(b.y2) {
            let row = y * FRAME_WIDTH;
            out.extend_from_slice(&src.pixels[row + usize::from(b.x1)..=row + usize::from(b.x2)]);
        }
        out
    }

    /// Copies the `bbox` region of `src` into the same place in `self`.
    pub fn blit_region_from(&mut self, src: &[u8], src_bbox: &BoundingBox, area: &BoundingBox) {
        let area = area.clamped();
        let w = src_bbox.width();
        for y in area.y1..=area.y2 {
            if y < src_bbox.y1 || y > src_bbox.y2 {
                continue;
            }
            for x in area.x1..=area.x2 {
                if x < src_bbox.x1 || x > src_bbox.x2 {
                    continue;
                }
                let i = usize::from(y - src_bbox.y1) * w + usize::from(x - src_bbox.x1);
                if let Some(&p) = src.get(i) {
                    self.pixels[usize::from(y) * FRAME_WIDTH + usize::from(x)] = p;
                }
            }
        }
    }
}

#[test]
fn packed_bounding_box() {
    // x1=0x123 x2=0x456 y1=0x078 y2=0x09A
    let bbox = BoundingBox::from_packed(&[0x12, 0x34, 0x56, 0x07, 0x80, 0x9A]);
    assert_eq!(
        bbox,
        BoundingBox {
            x1: 0x123,
            x2: 0x456,
            y1: 0x078,
            y2: 0x09A
        }
    );
    assert_eq!(bbox.width(), 0x456 - 0x123 + 1);
    assert!(bbox.is_valid());

    let off_frame = BoundingBox {
        x1: 720,
        x2: 730,
        y1: 0,
        y2: 10,
    };
    assert!(!off_frame.is_valid());
}

#[test]
fn frame_runs_are_clipped() {
    let mut frame = IndexedFrame::default();
    frame.fill_run(716, 0, 10, 253);
    assert_eq!(frame.pixel(719, 0), 253);
    assert_eq!(frame.pixel(0, 1), 0);

    frame.fill_run(0, FRAME_HEIGHT, 10, 253);
    assert_eq!(frame.as_slice().iter().filter(|&&p| p != 0).count(), 4);

    let bbox = BoundingBox {
        x1: 716,
        y1: 0,
        x2: 719,
        y2: 0,
    };
    assert_eq!(IndexedFrame::copy_rect_from(&frame, &bbox), vec![253; 4]);
    frame.clear_rect(&bbox);
    assert_eq!(frame.pixel(719, 0), 0);
}
