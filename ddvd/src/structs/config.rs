//! Player configuration.

use crate::structs::pes::PtsEncoding;
use crate::structs::session::ResumeSnapshot;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TvAspect {
    #[default]
    Ratio4x3,
    Ratio16x9,
    Ratio16x10,
}

impl TvAspect {
    pub fn is_wide(self) -> bool {
        matches!(self, TvAspect::Ratio16x9 | TvAspect::Ratio16x10)
    }
}

/// How a 16:9 picture is fitted to the screen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TvMode {
    #[default]
    Letterbox,
    PanScan,
    JustScale,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TvSystem {
    #[default]
    Pal,
    Ntsc,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    /// Palette indices, colours sent as `ColortableUpdate` events.
    #[default]
    Indexed8,
    Argb32,
}

/// Destination geometry of the overlay blit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitGeometry {
    pub x_offset: i32,
    pub y_offset: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for BlitGeometry {
    fn default() -> Self {
        Self {
            x_offset: 0,
            y_offset: 0,
            width: 720,
            height: 576,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Two-letter code for menu, audio and subtitle preference.
    pub language: String,
    pub tv_aspect: TvAspect,
    pub tv_mode: TvMode,
    pub tv_system: TvSystem,
    pub ac3_passthrough: bool,
    pub color_depth: ColorDepth,
    pub blit: BlitGeometry,
    pub dvd_path: String,
    pub pts_encoding: PtsEncoding,
    pub spu_ring_capacity: usize,
    /// Cross-PGC subpicture sync window in 90 kHz ticks.
    pub spu_sync_tolerance: u64,
    pub resume: Option<ResumeSnapshot>,
    /// Device errors at or above this severity abort the session.
    pub fail_level: log::Level,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            language: "en".into(),
            tv_aspect: TvAspect::default(),
            tv_mode: TvMode::default(),
            tv_system: TvSystem::default(),
            ac3_passthrough: false,
            color_depth: ColorDepth::default(),
            blit: BlitGeometry::default(),
            dvd_path: "/dev/cdroms/cdrom0".into(),
            pts_encoding: PtsEncoding::default(),
            spu_ring_capacity: 8,
            spu_sync_tolerance: 180_000,
            resume: None,
            fail_level: log::Level::Error,
        }
    }
}
