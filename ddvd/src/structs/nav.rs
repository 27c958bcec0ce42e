//! Navigation adapter contract.
//!
//! The navigation library iterates sectors, interprets the DVD virtual
//! machine and reports structural changes as [`NavEvent`]s. The engine only
//! talks to it through the [`Navigator`] trait.

use crate::structs::pes::SECTOR_SIZE;
use crate::utils::errors::NavError;

/// DSI next-video pointer marking a VOBU as a still.
pub const NAV_STILL_VIDEO: u32 = 0xBFFF_FFFF;

/// Button slots in a PCI highlight table.
pub const MAX_BUTTONS: usize = 36;

/// Logical subpicture streams per title set.
pub const MAX_SPU_STREAMS: usize = 32;

/// Logical audio streams per title set.
pub const MAX_AUDIO_STREAMS: usize = 8;

/// `still_frame` length meaning "wait for the user".
pub const STILL_INFINITE: u32 = 0xFF;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ButtonInfo {
    pub x_start: u16,
    pub x_end: u16,
    pub y_start: u16,
    pub y_end: u16,
    /// 1-based index into the button colour table, 0 = none.
    pub color_index: u8,
}

/// Highlight information of a PCI packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightInfo {
    /// Number of button groups (0..=3).
    pub group_count: u8,
    /// Display-mode mask of each group (bit `1 << tv_scale`).
    pub group_display: [u8; 3],
    pub buttons: [ButtonInfo; MAX_BUTTONS],
    /// Colour words per colour index: `[selected, activated]`.
    pub colors: [[u32; 2]; 3],
}

impl Default for HighlightInfo {
    fn default() -> Self {
        Self {
            group_count: 0,
            group_display: [0; 3],
            buttons: [ButtonInfo::default(); MAX_BUTTONS],
            colors: [[0; 2]; 3],
        }
    }
}

/// Presentation control information.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Pci {
    /// Number of buttons defined for this VOBU.
    pub button_count: u8,
    pub highlight: HighlightInfo,
}

/// Data search information; only the still marker is used.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Dsi {
    pub next_video: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CellInfo {
    pub cell: i32,
    pub program: i32,
    pub cell_length: u64,
    pub program_length: u64,
    /// Length of the whole program chain in 90 kHz ticks.
    pub pgc_length: u64,
    pub cell_start: u64,
    pub program_start: u64,
}

/// Generic button rectangle and colour word.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HighlightArea {
    pub palette: u32,
    pub sx: u16,
    pub sy: u16,
    pub ex: u16,
    pub ey: u16,
    pub pts: u32,
    pub button: u32,
}

impl Pci {
    /// Rectangle and colour of `button` (1-based) in colour `mode`
    /// (0 = selected, 1 = activated).
    pub fn highlight_area(&self, button: u32, mode: usize) -> Option<HighlightArea> {
        if button == 0 || button > u32::from(self.button_count) {
            return None;
        }
        let info = self.highlight.buttons.get(button as usize - 1)?;
        let palette = match info.color_index {
            0 => 0,
            n => self.highlight.colors.get(usize::from(n) - 1)?[mode & 1],
        };
        Some(HighlightArea {
            palette,
            sx: info.x_start,
            sy: info.y_start,
            ex: info.x_end,
            ey: info.y_end,
            pts: 0,
            button,
        })
    }
}

/// Physical subpicture stream ids for each display mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpuStreamChange {
    pub physical_wide: u8,
    pub physical_letterbox: u8,
    pub physical_pan_scan: u8,
    pub logical: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    /// The sector buffer holds a program stream block.
    BlockReady,
    Nop,
    /// Still frame of `length` seconds, [`STILL_INFINITE`] = until the user acts.
    StillFrame(u32),
    Wait,
    /// New colour table, words laid out as `0x00YYCrCb`.
    ClutChange([u32; 16]),
    SpuStreamChange(SpuStreamChange),
    AudioStreamChange,
    Highlight { button: u32, pts: u32 },
    VtsChange,
    CellChange(CellInfo),
    NavPacket { pci: Box<Pci>, dsi: Dsi },
    HopChannel,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonMove {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuId {
    Title = 2,
    Root = 3,
    Subpicture = 4,
    Audio = 5,
    Angle = 6,
    Part = 7,
}

/// Position of the navigation library in the current title.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NavPosition {
    pub block: u32,
    pub length: u32,
}

/// The navigation library.
///
/// Sector iteration is pull-based: every call to [`next_block`](Self::next_block)
/// either fills `buf` and reports [`NavEvent::BlockReady`] or reports a
/// structural event.
pub trait Navigator {
    fn open(&mut self, path: &str) -> Result<(), NavError>;

    /// Selects menu, audio and subpicture languages and positions the
    /// library at the start of the first program chain.
    fn apply_preferences(&mut self, language: &str) -> Result<(), NavError>;

    fn close(&mut self);

    fn next_block(&mut self, buf: &mut [u8; SECTOR_SIZE]) -> Result<NavEvent, NavError>;

    fn title_string(&self) -> String;

    fn position(&self) -> Option<NavPosition>;

    /// Current `(title, part)`; title 0 means a menu.
    fn current_title_info(&self) -> Option<(i32, i32)>;

    fn number_of_titles(&self) -> Result<i32, NavError>;

    fn number_of_parts(&self, title: i32) -> Result<i32, NavError>;

    fn is_menu_domain(&self) -> bool;

    fn sector_search(&mut self, block: u32) -> Result<(), NavError>;

    fn part_play(&mut self, title: i32, part: i32) -> Result<(), NavError>;

    fn title_play(&mut self, title: i32) -> Result<(), NavError>;

    fn reset(&mut self) -> Result<(), NavError>;

    fn menu_call(&mut self, menu: MenuId) -> Result<(), NavError>;

    fn button_move(&mut self, pci: &Pci, direction: ButtonMove) -> Result<(), NavError>;

    fn button_select(&mut self, pci: &Pci, button: u32) -> Result<(), NavError>;

    fn button_activate(&mut self, pci: &Pci) -> Result<(), NavError>;

    fn current_highlight(&self) -> Option<u32>;

    fn highlight_area(&self, pci: &Pci, button: u32, mode: usize) -> Option<HighlightArea> {
        pci.highlight_area(button, mode)
    }

    fn still_skip(&mut self) -> Result<(), NavError>;

    fn wait_skip(&mut self) -> Result<(), NavError>;

    fn next_still_flag(&self) -> bool;

    /// 0 = 4:3, 3 = 16:9.
    fn video_aspect(&self) -> u8;

    /// Bit 0 forbids letterbox, bit 1 forbids pan&scan.
    fn video_scale_permission(&self) -> u8;

    fn active_audio_stream(&self) -> Option<u8>;

    /// Active physical subpicture stream; bit 7 set = not displayed unless forced.
    fn active_spu_stream(&self) -> Option<u8>;

    fn audio_stream_to_lang(&self, logical: u8) -> Option<u16>;

    /// `(physical stream id, language)` of a logical subpicture stream.
    fn spu_stream_info(&self, logical: u8) -> Option<(u8, u16)>;

    /// `(current, count)` angles.
    fn angle_info(&self) -> (i32, i32);

    fn angle_change(&mut self, angle: i32) -> Result<(), NavError>;
}

/// Language code used for "subtitles off".
pub const LANG_NONE: u16 = u16::from_be_bytes(*b"--");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpuLanguage {
    pub stream_id: u8,
    pub lang: u16,
}

/// Logical subpicture index → physical stream and language, rebuilt per VTS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpuLanguageMap {
    entries: [Option<SpuLanguage>; MAX_SPU_STREAMS],
}

impl Default for SpuLanguageMap {
    fn default() -> Self {
        Self {
            entries: [None; MAX_SPU_STREAMS],
        }
    }
}

impl SpuLanguageMap {
    pub fn rebuild<N: Navigator + ?Sized>(&mut self, nav: &N) {
        for (logical, entry) in self.entries.iter_mut().enumerate() {
            *entry = nav
                .spu_stream_info(logical as u8)
                .map(|(stream_id, lang)| SpuLanguage { stream_id, lang });
        }
    }

    pub fn get(&self, index: usize) -> Option<SpuLanguage> {
        self.entries.get(index).copied().flatten()
    }

    /// Next populated index after `current`, or `None` past the last.
    pub fn next_after(&self, current: Option<usize>) -> Option<usize> {
        let start = current.map_or(0, |c| c + 1);
        (start..MAX_SPU_STREAMS).find(|&i| self.entries[i].is_some())
    }

    /// Logical index whose physical stream is `stream_id`.
    pub fn index_of(&self, stream_id: u8) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_some_and(|e| e.stream_id == stream_id))
    }
}

/// Two-letter language code packed the way the navigation library reports it.
pub fn lang_code(lang: &str) -> u16 {
    let b = lang.as_bytes();
    match b {
        [a, c, ..] => u16::from_be_bytes([*a, *c]),
        _ => 0,
    }
}

pub fn lang_str(code: u16) -> String {
    code.to_be_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
        .collect()
}

#[test]
fn highlight_area_from_pci() {
    let mut pci = Pci {
        button_count: 2,
        ..Default::default()
    };
    pci.highlight.buttons[1] = ButtonInfo {
        x_start: 10,
        x_end: 20,
        y_start: 30,
        y_end: 40,
        color_index: 2,
    };
    pci.highlight.colors[1] = [0x1111_2222, 0x3333_4444];

    let area = pci.highlight_area(2, 0).unwrap();
    assert_eq!((area.sx, area.ex, area.sy, area.ey), (10, 20, 30, 40));
    assert_eq!(area.palette, 0x1111_2222);
    assert_eq!(pci.highlight_area(2, 1).unwrap().palette, 0x3333_4444);
    assert!(pci.highlight_area(3, 0).is_none());
    assert!(pci.highlight_area(0, 0).is_none());
}

#[test]
fn language_codes() {
    assert_eq!(lang_code("en"), 0x656E);
    assert_eq!(lang_str(0x656E), "en");
    assert_eq!(lang_str(LANG_NONE), "--");
    assert_eq!(lang_code(""), 0);
}
