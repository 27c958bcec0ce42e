//! Trick-mode speed changes and timeline seeking.

use crate::structs::session::TrickMode;

pub const MAX_FAST_SPEED: u32 = 64;
pub const MAX_SLOW_SPEED: u32 = 8;
/// From this speed on the sink only decodes reference frames.
pub const TRICK_SPEED: u32 = 16;

pub const FORWARD_INTERVAL_MS: u64 = 300;
pub const BACKWARD_INTERVAL_MS: u64 = 500;

/// Sectors kept before the end when a jump overshoots the title.
pub const END_MARGIN: u32 = 250;

pub const TICKS_PER_SECOND: i64 = 90_000;

fn forward(speed: u32) -> TrickMode {
    match speed {
        0 | 1 => TrickMode::Off,
        s if s < TRICK_SPEED => TrickMode::FastForward(s),
        s => TrickMode::TrickForward(s.min(MAX_FAST_SPEED)),
    }
}

fn backward(speed: u32) -> TrickMode {
    match speed {
        0 | 1 => TrickMode::Off,
        s if s < TRICK_SPEED => TrickMode::FastBackward(s),
        s => TrickMode::TrickBackward(s.min(MAX_FAST_SPEED)),
    }
}

/// Mode after a fast-forward key press: doubles a forward speed, halves a
/// backward one.
pub fn fast_forward_key(mode: TrickMode) -> TrickMode {
    match mode {
        TrickMode::FastForward(s) | TrickMode::TrickForward(s) => forward(s * 2),
        TrickMode::FastBackward(s) | TrickMode::TrickBackward(s) => backward(s / 2),
        _ => forward(2),
    }
}

pub fn fast_backward_key(mode: TrickMode) -> TrickMode {
    match mode {
        TrickMode::FastBackward(s) | TrickMode::TrickBackward(s) => backward(s * 2),
        TrickMode::FastForward(s) | TrickMode::TrickForward(s) => forward(s / 2),
        _ => backward(2),
    }
}

pub fn slow_forward_key(mode: TrickMode) -> TrickMode {
    match mode {
        TrickMode::SlowForward(s) => TrickMode::SlowForward((s * 2).min(MAX_SLOW_SPEED)),
        _ => TrickMode::SlowForward(2),
    }
}

pub fn slow_backward_key(mode: TrickMode) -> TrickMode {
    match mode {
        TrickMode::SlowBackward(s) => TrickMode::SlowBackward((s * 2).min(MAX_SLOW_SPEED)),
        _ => TrickMode::SlowBackward(2),
    }
}

/// Timeline offset of one re-seek in 90 kHz ticks, for modes that seek.
pub fn jump_offset(mode: TrickMode) -> Option<i64> {
    let half = TICKS_PER_SECOND / 2;
    match mode {
        TrickMode::FastForward(s) | TrickMode::TrickForward(s) => Some(half * i64::from(s)),
        TrickMode::FastBackward(s) | TrickMode::TrickBackward(s) => {
            Some(-TICKS_PER_SECOND * i64::from(s))
        }
        TrickMode::SlowBackward(s) => Some(-(half + half / i64::from(s.max(1)))),
        TrickMode::Off | TrickMode::SlowForward(_) => None,
    }
}

pub fn jump_interval_ms(mode: TrickMode) -> u64 {
    if mode.is_backward() {
        BACKWARD_INTERVAL_MS
    } else {
        FORWARD_INTERVAL_MS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTarget {
    pub block: u32,
    pub boundary: Option<Boundary>,
}

/// Block reached by moving `offset` ticks from block `pos` in a title of
/// `len` blocks and `pgc_length` ticks, clamped to the title.
pub fn seek_target(pos: u32, len: u32, pgc_length: u64, offset: i64) -> SeekTarget {
    let len = i128::from(len.max(1));
    let pgc = match i128::from(pgc_length) {
        0 => len,
        pgc => pgc,
    };

    let t = i128::from(pos) * pgc / len + i128::from(offset);
    if t < 0 {
        return SeekTarget {
            block: 0,
            boundary: Some(Boundary::Start),
        };
    }

    let block = t * len / pgc;
    if block >= len {
        return SeekTarget {
            block: (len as u32).saturating_sub(END_MARGIN),
            boundary: Some(Boundary::End),
        };
    }
    SeekTarget {
        block: block as u32,
        boundary: None,
    }
}
