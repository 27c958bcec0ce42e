//! Event queue records (engine → host).
//!
//! A record is a little-endian `u32` kind followed by a payload whose size
//! is fixed per kind. Payload structs derive their codecs with
//! [`ToWire`]/[`FromWire`].

use ddvd_macros::{FromWire, ToWire};

use crate::structs::palette::DdvdColor;
use crate::structs::pipe::{PipeReader, PipeWriter, Wait, pipe};
use crate::structs::wire::{WireRead, WireWrite, fixed_string, from_fixed_string};
use crate::utils::errors::ProtocolError;

/// Version of the command/event record layout.
pub const PROTOCOL_VERSION: u32 = 2;

pub const TEXT_LEN: usize = 512;
pub const TITLE_LEN: usize = 96;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventKind {
    Null = 0,
    ColortableUpdate,
    ScreenUpdate,
    StatePlay,
    StatePause,
    Time,
    StateFastForward,
    StateFastBackward,
    Text,
    Audio,
    Subtitle,
    TitleString,
    EndOfFile,
    StartOfFile,
    MenuOpened,
    MenuClosed,
    Angle,
    SizeChanged,
    ProgressiveChanged,
    FramerateChanged,
    SpuRendered,
}

const EVENT_KINDS: [EventKind; 21] = [
    EventKind::Null,
    EventKind::ColortableUpdate,
    EventKind::ScreenUpdate,
    EventKind::StatePlay,
    EventKind::StatePause,
    EventKind::Time,
    EventKind::StateFastForward,
    EventKind::StateFastBackward,
    EventKind::Text,
    EventKind::Audio,
    EventKind::Subtitle,
    EventKind::TitleString,
    EventKind::EndOfFile,
    EventKind::StartOfFile,
    EventKind::MenuOpened,
    EventKind::MenuClosed,
    EventKind::Angle,
    EventKind::SizeChanged,
    EventKind::ProgressiveChanged,
    EventKind::FramerateChanged,
    EventKind::SpuRendered,
];

impl TryFrom<u32> for EventKind {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        EVENT_KINDS
            .get(value as usize)
            .copied()
            .ok_or(ProtocolError::UnknownEvent(value))
    }
}

/// Overlay region to copy to the screen, in source and destination pixels.
#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlitArea {
    pub x_start: i32,
    pub x_end: i32,
    pub y_start: i32,
    pub y_end: i32,
    pub x_offset: i32,
    pub y_offset: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfo {
    pub pos_hours: i32,
    pub pos_minutes: i32,
    pub pos_seconds: i32,
    pub pos_chapter: i32,
    pub pos_title: i32,
    pub end_hours: i32,
    pub end_minutes: i32,
    pub end_seconds: i32,
    pub end_chapter: i32,
    pub end_title: i32,
}

impl TimeInfo {
    pub fn set_position(&mut self, ticks: u64) {
        let secs = ticks / 90_000;
        self.pos_hours = (secs / 3600) as i32;
        self.pos_minutes = (secs / 60 % 60) as i32;
        self.pos_seconds = (secs % 60) as i32;
    }

    pub fn set_end(&mut self, ticks: u64) {
        let secs = ticks / 90_000;
        self.end_hours = (secs / 3600) as i32;
        self.end_minutes = (secs / 60 % 60) as i32;
        self.end_seconds = (secs % 60) as i32;
    }
}

#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrickInfo {
    pub speed: i32,
    pub time: TimeInfo,
}

#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub id: i32,
    pub lang: u16,
    pub format: u32,
}

#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SubtitleInfo {
    pub id: i32,
    pub lang: u16,
}

#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AngleInfo {
    pub current: i32,
    pub count: i32,
}

#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SizeInfo {
    pub width: i32,
    pub height: i32,
    pub aspect: i32,
}

#[derive(ToWire, FromWire, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpuRenderedInfo {
    pub target_pts: u64,
    pub kind: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Null,
    ColortableUpdate([DdvdColor; 4]),
    ScreenUpdate(BlitArea),
    StatePlay,
    StatePause,
    Time(TimeInfo),
    StateFastForward(TrickInfo),
    StateFastBackward(TrickInfo),
    Text(String),
    Audio(AudioInfo),
    Subtitle(SubtitleInfo),
    TitleString(String),
    EndOfFile,
    StartOfFile,
    MenuOpened,
    MenuClosed,
    Angle(AngleInfo),
    SizeChanged(SizeInfo),
    ProgressiveChanged(i32),
    FramerateChanged(i32),
    SpuRendered(SpuRenderedInfo),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Null => EventKind::Null,
            Event::ColortableUpdate(_) => EventKind::ColortableUpdate,
            Event::ScreenUpdate(_) => EventKind::ScreenUpdate,
            Event::StatePlay => EventKind::StatePlay,
            Event::StatePause => EventKind::StatePause,
            Event::Time(_) => EventKind::Time,
            Event::StateFastForward(_) => EventKind::StateFastForward,
            Event::StateFastBackward(_) => EventKind::StateFastBackward,
            Event::Text(_) => EventKind::Text,
            Event::Audio(_) => EventKind::Audio,
            Event::Subtitle(_) => EventKind::Subtitle,
            Event::TitleString(_) => EventKind::TitleString,
            Event::EndOfFile => EventKind::EndOfFile,
            Event::StartOfFile => EventKind::StartOfFile,
            Event::MenuOpened => EventKind::MenuOpened,
            Event::MenuClosed => EventKind::MenuClosed,
            Event::Angle(_) => EventKind::Angle,
            Event::SizeChanged(_) => EventKind::SizeChanged,
            Event::ProgressiveChanged(_) => EventKind::ProgressiveChanged,
            Event::FramerateChanged(_) => EventKind::FramerateChanged,
            Event::SpuRendered(_) => EventKind::SpuRendered,
        }
    }

    pub fn write_record(&self, dst: &mut Vec<u8>) {
        (self.kind() as u32).write_wire(dst);
        match self {
            Event::Null
            | Event::StatePlay
            | Event::StatePause
            | Event::EndOfFile
            | Event::StartOfFile
            | Event::MenuOpened
            | Event::MenuClosed => {}
            Event::ColortableUpdate(colors) => colors.write_wire(dst),
            Event::ScreenUpdate(area) => area.write_wire(dst),
            Event::Time(time) => time.write_wire(dst),
            Event::StateFastForward(trick) | Event::StateFastBackward(trick) => {
                trick.write_wire(dst)
            }
            Event::Text(text) => fixed_string::<TEXT_LEN>(text).write_wire(dst),
            Event::TitleString(text) => fixed_string::<TITLE_LEN>(text).write_wire(dst),
            Event::Audio(info) => info.write_wire(dst),
            Event::Subtitle(info) => info.write_wire(dst),
            Event::Angle(info) => info.write_wire(dst),
            Event::SizeChanged(info) => info.write_wire(dst),
            Event::ProgressiveChanged(v) | Event::FramerateChanged(v) => v.write_wire(dst),
            Event::SpuRendered(info) => info.write_wire(dst),
        }
    }
}

fn read_payload<T: WireRead + WireWrite>(pipe: &mut PipeReader) -> Result<T, ProtocolError> {
    pipe.read_record::<T>(T::WIRE_LEN)
}

/// Producer side of the event queue, owned by the playback thread.
#[derive(Debug, Clone)]
pub struct EventSender {
    pipe: PipeWriter,
}

impl EventSender {
    pub fn send(&self, event: &Event) -> Result<(), ProtocolError> {
        let mut record = Vec::with_capacity(64);
        event.write_record(&mut record);
        self.pipe.write_owned(record)
    }
}

/// Consumer side of the event queue.
#[derive(Debug)]
pub struct EventReceiver {
    pipe: PipeReader,
}

impl EventReceiver {
    pub fn poll(&mut self, wait: Wait) -> Result<Option<Event>, ProtocolError> {
        if !self.pipe.poll(wait)? {
            return Ok(None);
        }
        let kind = EventKind::try_from(read_payload::<u32>(&mut self.pipe)?)?;
        let pipe = &mut self.pipe;

        let event = match kind {
            EventKind::Null => Event::Null,
            EventKind::ColortableUpdate => Event::ColortableUpdate(read_payload(pipe)?),
            EventKind::ScreenUpdate => Event::ScreenUpdate(read_payload(pipe)?),
            EventKind::StatePlay => Event::StatePlay,
            EventKind::StatePause => Event::StatePause,
            EventKind::Time => Event::Time(read_payload(pipe)?),
            EventKind::StateFastForward => Event::StateFastForward(read_payload(pipe)?),
            EventKind::StateFastBackward => Event::StateFastBackward(read_payload(pipe)?),
            EventKind::Text => {
                let text: [u8; TEXT_LEN] = read_payload(pipe)?;
                Event::Text(from_fixed_string(&text))
            }
            EventKind::Audio => Event::Audio(read_payload(pipe)?),
            EventKind::Subtitle => Event::Subtitle(read_payload(pipe)?),
            EventKind::TitleString => {
                let text: [u8; TITLE_LEN] = read_payload(pipe)?;
                Event::TitleString(from_fixed_string(&text))
            }
            EventKind::EndOfFile => Event::EndOfFile,
            EventKind::StartOfFile => Event::StartOfFile,
            EventKind::MenuOpened => Event::MenuOpened,
            EventKind::MenuClosed => Event::MenuClosed,
            EventKind::Angle => Event::Angle(read_payload(pipe)?),
            EventKind::SizeChanged => Event::SizeChanged(read_payload(pipe)?),
            EventKind::ProgressiveChanged => Event::ProgressiveChanged(read_payload(pipe)?),
            EventKind::FramerateChanged => Event::FramerateChanged(read_payload(pipe)?),
            EventKind::SpuRendered => Event::SpuRendered(read_payload(pipe)?),
        };
        Ok(Some(event))
    }

    /// Drains every event already queued.
    pub fn drain(&mut self) -> Result<Vec<Event>, ProtocolError> {
        let mut events = Vec::new();
        loop {
            match self.poll(Wait::NonBlocking) {
                Ok(Some(event)) => events.push(event),
                Ok(None) | Err(ProtocolError::Disconnected) => return Ok(events),
                Err(e) => return Err(e),
            }
        }
    }
}

pub fn event_queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = pipe();
    (EventSender { pipe: tx }, EventReceiver { pipe: rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn payload_sizes() {
        assert_eq!(BlitArea::WIRE_LEN, 32);
        assert_eq!(TimeInfo::WIRE_LEN, 40);
        assert_eq!(TrickInfo::WIRE_LEN, 44);
        assert_eq!(AudioInfo::WIRE_LEN, 10);
        assert_eq!(SubtitleInfo::WIRE_LEN, 6);
        assert_eq!(<[DdvdColor; 4]>::WIRE_LEN, 32);
        assert_eq!(SpuRenderedInfo::WIRE_LEN, 12);
    }

    #[test]
    fn records_are_read_back_in_order() -> Result<()> {
        let (tx, mut rx) = event_queue();
        let mut time = TimeInfo {
            pos_chapter: 2,
            pos_title: 1,
            ..Default::default()
        };
        time.set_position(90_000 * 3725);

        let events = [
            Event::MenuOpened,
            Event::Time(time),
            Event::Audio(AudioInfo {
                id: 1,
                lang: 0x656E,
                format: 1,
            }),
            Event::Text("Error: Cant open DVD Source: /dev/sr0".into()),
            Event::SpuRendered(SpuRenderedInfo {
                target_pts: 90_000,
                kind: 1,
            }),
            Event::EndOfFile,
        ];
        for event in &events {
            tx.send(event)?;
        }

        let received = rx.drain()?;
        assert_eq!(received, events);
        match &received[1] {
            Event::Time(t) => assert_eq!((t.pos_hours, t.pos_minutes, t.pos_seconds), (1, 2, 5)),
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn text_record_has_fixed_size() {
        let mut record = Vec::new();
        Event::Text("hello".into()).write_record(&mut record);
        assert_eq!(record.len(), 4 + TEXT_LEN);
        assert_eq!(&record[..4], &8u32.to_le_bytes());
    }
}
