//! Mutable playback state owned by the playback thread.

use crate::structs::config::{TvAspect, TvMode};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// Single-frame advance from pause; returns to `Paused` at the target pts.
    Stepping,
}

/// Non-1× playback, layered on `Playing`. Speeds are powers of two.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TrickMode {
    #[default]
    Off,
    FastForward(u32),
    FastBackward(u32),
    TrickForward(u32),
    TrickBackward(u32),
    SlowForward(u32),
    SlowBackward(u32),
}

impl TrickMode {
    pub fn speed(self) -> u32 {
        match self {
            TrickMode::Off => 0,
            TrickMode::FastForward(s)
            | TrickMode::FastBackward(s)
            | TrickMode::TrickForward(s)
            | TrickMode::TrickBackward(s)
            | TrickMode::SlowForward(s)
            | TrickMode::SlowBackward(s) => s,
        }
    }

    pub fn is_off(self) -> bool {
        self == TrickMode::Off
    }

    /// Modes that move by re-seeking on a timer.
    pub fn seeks(self) -> bool {
        matches!(
            self,
            TrickMode::FastForward(_)
                | TrickMode::FastBackward(_)
                | TrickMode::TrickForward(_)
                | TrickMode::TrickBackward(_)
                | TrickMode::SlowBackward(_)
        )
    }

    pub fn is_backward(self) -> bool {
        matches!(
            self,
            TrickMode::FastBackward(_) | TrickMode::TrickBackward(_) | TrickMode::SlowBackward(_)
        )
    }
}

/// Display scaling in effect, also the button-group mode bit index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TvScale {
    #[default]
    Off = 0,
    Letterbox = 1,
    PanScan = 2,
}

/// Position and stream selection captured on exit, restored on the next start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResumeSnapshot {
    pub title: i32,
    pub chapter: i32,
    pub block: u32,
    pub audio_id: i32,
    pub audio_lock: bool,
    pub spu_id: i32,
    pub spu_lock: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ResumePhase {
    #[default]
    Idle,
    /// Waiting for the first VTS change to jump to the saved title/chapter.
    AwaitingVts,
    /// Waiting for the next cell change to seek to the saved block.
    AwaitingCell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSession {
    pub playmode: PlayMode,
    pub trickmode: TrickMode,
    /// Selected logical audio stream.
    pub audio_id: i32,
    pub audio_locked: bool,
    /// Selected logical subpicture stream, -1 = off.
    pub spu_index: i32,
    /// Physical subpicture stream being decoded.
    pub spu_active_stream_id: Option<u8>,
    pub spu_locked: bool,
    pub in_menu: bool,
    /// User mute, independent of the trick-mode mute.
    pub mute: bool,
    pub resume: Option<ResumeSnapshot>,
    pub resume_phase: ResumePhase,
    /// Navigation aspect code (0 = 4:3, 3 = 16:9).
    pub dvd_aspect: u8,
    pub dvd_scale_perm: u8,
    pub tv_aspect: TvAspect,
    pub tv_mode: TvMode,
    pub tv_scale: TvScale,
}

impl PlaybackSession {
    pub fn new(tv_aspect: TvAspect, tv_mode: TvMode, resume: Option<ResumeSnapshot>) -> Self {
        Self {
            playmode: PlayMode::Stopped,
            trickmode: TrickMode::Off,
            audio_id: 0,
            audio_locked: false,
            spu_index: -1,
            spu_active_stream_id: None,
            spu_locked: false,
            in_menu: false,
            mute: false,
            resume_phase: if resume.is_some() {
                ResumePhase::AwaitingVts
            } else {
                ResumePhase::Idle
            },
            resume,
            dvd_aspect: 0,
            dvd_scale_perm: 0,
            tv_aspect,
            tv_mode,
            tv_scale: TvScale::Off,
        }
    }

    pub fn is_dvd_wide(&self) -> bool {
        self.dvd_aspect == 3
    }
}
