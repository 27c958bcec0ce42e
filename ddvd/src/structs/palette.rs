//! Subpicture palette handling.
//!
//! The DVD carries a 16-entry YCrCb colour lookup table per program chain.
//! Subpictures select 4 of those entries (plus 4 alpha levels) into the
//! working set that occupies overlay indices 252..=255.

use ddvd_macros::{FromWire, ToWire};

/// First overlay index used by subpicture pixels.
pub const PALETTE_BASE: u8 = 252;

/// One overlay colour as sent to the host: 16-bit channels and a
/// transparency value (0 = opaque, 0xFFFF = fully transparent).
#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DdvdColor {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub trans: u16,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Converts one CLUT entry to RGB with 16.16 fixed-point BT.601 coefficients.
pub fn yuv_to_rgb(y: u8, cr: u8, cb: u8) -> Rgb {
    let y = 76310 * (i32::from(y) - 16);
    let cr = i32::from(cr) - 128;
    let cb = i32::from(cb) - 128;

    let clamp = |v: i32| (v >> 16).clamp(0, 255) as u8;

    Rgb {
        r: clamp(y + 104635 * cr),
        g: clamp(y - 53294 * cr - 25690 * cb),
        b: clamp(y + 132278 * cb),
    }
}

/// The 16-entry colour lookup table of the current program chain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Clut {
    entries: [Rgb; 16],
}

impl Clut {
    /// Builds the table from navigation CLUT words laid out as `0x00YYCrCb`.
    pub fn from_yuv(words: &[u32; 16]) -> Self {
        let mut entries = [Rgb::default(); 16];
        for (entry, &word) in entries.iter_mut().zip(words) {
            let [_, y, cr, cb] = word.to_be_bytes();
            *entry = yuv_to_rgb(y, cr, cb);
        }
        Self { entries }
    }

    pub fn get(&self, index: u8) -> Rgb {
        self.entries[usize::from(index & 0xF)]
    }
}

/// Splits a button colour word into per-slot CLUT indices and alpha levels.
///
/// Slot `i` takes its colour from bits `16 + 4i` and its alpha from bits `4i`.
pub fn split_button_colors(coli: u32) -> ([u8; 4], [u8; 4]) {
    let mut colors = [0u8; 4];
    let mut alpha = [0u8; 4];
    for i in 0..4 {
        colors[i] = ((coli >> (16 + 4 * i)) & 0xF) as u8;
        alpha[i] = ((coli >> (4 * i)) & 0xF) as u8;
    }
    (colors, alpha)
}

/// The four colours currently mapped to overlay indices 252..=255.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PaletteWorkingSet {
    colors: [DdvdColor; 4],
    dirty: bool,
}

impl PaletteWorkingSet {
    pub fn colors(&self) -> [DdvdColor; 4] {
        self.colors
    }

    pub fn get(&self, slot: usize) -> DdvdColor {
        self.colors[slot & 3]
    }

    /// Points each slot at a CLUT entry.
    pub fn apply_colors(&mut self, clut: &Clut, indices: [u8; 4]) {
        for (color, index) in self.colors.iter_mut().zip(indices) {
            let rgb = clut.get(index);
            color.red = u16::from(rgb.r) << 8;
            color.green = u16::from(rgb.g) << 8;
            color.blue = u16::from(rgb.b) << 8;
        }
        self.dirty = true;
    }

    /// Sets each slot's contrast level (0 = transparent, 0xF = opaque).
    pub fn apply_alpha(&mut self, levels: [u8; 4]) {
        for (color, level) in self.colors.iter_mut().zip(levels) {
            color.trans = u16::from(0xF - (level & 0xF)) * 0x1111;
        }
        self.dirty = true;
    }

    pub fn apply_button(&mut self, clut: &Clut, coli: u32) {
        let (colors, alpha) = split_button_colors(coli);
        self.apply_colors(clut, colors);
        self.apply_alpha(alpha);
    }

    /// Returns whether the set changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// ARGB value of an overlay index; index 0 and indices outside the
    /// working set are fully transparent.
    pub fn argb(&self, index: u8) -> u32 {
        if index < PALETTE_BASE {
            return 0;
        }
        let c = self.colors[usize::from(index - PALETTE_BASE)];
        let alpha = 0xFF - u32::from(c.trans >> 8);
        alpha << 24
            | u32::from(c.red >> 8) << 16
            | u32::from(c.green >> 8) << 8
            | u32::from(c.blue >> 8)
    }
}

/// Expands indexed overlay pixels to ARGB for 32-bit surfaces.
pub fn blit_to_argb(indexed: &[u8], palette: &PaletteWorkingSet) -> Vec<u32> {
    indexed.iter().map(|&p| palette.argb(p)).collect()
}

#[test]
fn yuv_conversion() {
    assert_eq!(yuv_to_rgb(16, 128, 128), Rgb { r: 0, g: 0, b: 0 });
    assert_eq!(
        yuv_to_rgb(235, 128, 128),
        Rgb {
            r: 255,
            g: 255,
            b: 255
        }
    );
    // Out-of-gamut values clamp rather than wrap.
    assert_eq!(
        yuv_to_rgb(235, 240, 128),
        Rgb {
            r: 255,
            g: 163,
            b: 255
        }
    );
    let red = yuv_to_rgb(81, 240, 90);
    assert_eq!((red.r, red.g, red.b), (254, 0, 0));
}

#[test]
fn working_set_from_clut() {
    let mut words = [0u32; 16];
    words[1] = 0x00EB_8080;
    words[2] = 0x0010_8080;
    let clut = Clut::from_yuv(&words);

    let mut palette = PaletteWorkingSet::default();
    palette.apply_colors(&clut, [2, 1, 1, 2]);
    palette.apply_alpha([0x0, 0xF, 0x8, 0xF]);

    assert!(palette.take_dirty());
    assert!(!palette.take_dirty());
    assert_eq!(palette.get(1).red, 255 << 8);
    assert_eq!(palette.get(0).trans, 0xFFFF);
    assert_eq!(palette.get(1).trans, 0);
    assert_eq!(palette.get(2).trans, 0x7777);

    assert_eq!(palette.argb(0), 0);
    assert_eq!(palette.argb(253), 0xFFFF_FFFF);
    assert_eq!(
        blit_to_argb(&[0, 252, 253], &palette),
        vec![0, 0x0000_0000, 0xFFFF_FFFF]
    );
}

#[test]
fn button_color_split() {
    let (colors, alpha) = split_button_colors(0x4321_8765);
    assert_eq!(colors, [1, 2, 3, 4]);
    assert_eq!(alpha, [5, 6, 7, 8]);
}
