//! Command queue records (host → engine).
//!
//! A record is a little-endian `u32` opcode followed by the opcode's fixed
//! number of `u32` arguments. The arity table is part of the protocol: a
//! reader that meets an unknown opcode cannot resynchronise.

use std::fmt::Display;
use std::str::FromStr;

use crate::structs::pipe::{PipeReader, PipeWriter, Wait, pipe};
use crate::structs::wire::WireWrite;
use crate::utils::errors::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Null = 0,
    Exit,
    Left,
    Right,
    Up,
    Down,
    Ok,
    Play,
    Pause,
    NextChapter,
    PrevChapter,
    NextTitle,
    PrevTitle,
    FastForward,
    FastBackward,
    Menu,
    AudioMenu,
    Audio,
    Subtitle,
    GetTime,
    SkipForward,
    SkipBackward,
    SetTitle,
    SetChapter,
    SeekAbsolute,
    SetMute,
    UnsetMute,
    Angle,
    GetAngle,
    SetAudio,
    SetSubtitle,
    SlowForward,
    SlowBackward,
}

const OPCODES: [Opcode; 33] = [
    Opcode::Null,
    Opcode::Exit,
    Opcode::Left,
    Opcode::Right,
    Opcode::Up,
    Opcode::Down,
    Opcode::Ok,
    Opcode::Play,
    Opcode::Pause,
    Opcode::NextChapter,
    Opcode::PrevChapter,
    Opcode::NextTitle,
    Opcode::PrevTitle,
    Opcode::FastForward,
    Opcode::FastBackward,
    Opcode::Menu,
    Opcode::AudioMenu,
    Opcode::Audio,
    Opcode::Subtitle,
    Opcode::GetTime,
    Opcode::SkipForward,
    Opcode::SkipBackward,
    Opcode::SetTitle,
    Opcode::SetChapter,
    Opcode::SeekAbsolute,
    Opcode::SetMute,
    Opcode::UnsetMute,
    Opcode::Angle,
    Opcode::GetAngle,
    Opcode::SetAudio,
    Opcode::SetSubtitle,
    Opcode::SlowForward,
    Opcode::SlowBackward,
];

impl TryFrom<u32> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        OPCODES
            .get(value as usize)
            .copied()
            .ok_or(ProtocolError::UnknownOpcode(value))
    }
}

impl Opcode {
    /// Number of `u32` arguments following the opcode.
    pub fn arity(self) -> usize {
        match self {
            Opcode::SkipForward
            | Opcode::SkipBackward
            | Opcode::SetTitle
            | Opcode::SetChapter
            | Opcode::SeekAbsolute
            | Opcode::SetAudio
            | Opcode::SetSubtitle => 1,
            _ => 0,
        }
    }
}

/// A decoded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Null,
    Exit,
    Left,
    Right,
    Up,
    Down,
    Ok,
    Play,
    Pause,
    NextChapter,
    PrevChapter,
    NextTitle,
    PrevTitle,
    FastForward,
    FastBackward,
    SlowForward,
    SlowBackward,
    Menu,
    AudioMenu,
    /// Cycle the audio track.
    Audio,
    /// Cycle the subtitle track.
    Subtitle,
    GetTime,
    /// Relative jump in seconds, negative = backwards.
    SkipSeconds(i32),
    SetTitle(i32),
    SetChapter(i32),
    /// Absolute position in seconds from the start of the title.
    SeekAbsolute(i32),
    SetMute(bool),
    Angle,
    GetAngle,
    SetAudio(i32),
    /// -1 switches subtitles off.
    SetSubtitle(i32),
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match *self {
            Command::Null => Opcode::Null,
            Command::Exit => Opcode::Exit,
            Command::Left => Opcode::Left,
            Command::Right => Opcode::Right,
            Command::Up => Opcode::Up,
            Command::Down => Opcode::Down,
            Command::Ok => Opcode::Ok,
            Command::Play => Opcode::Play,
            Command::Pause => Opcode::Pause,
            Command::NextChapter => Opcode::NextChapter,
            Command::PrevChapter => Opcode::PrevChapter,
            Command::NextTitle => Opcode::NextTitle,
            Command::PrevTitle => Opcode::PrevTitle,
            Command::FastForward => Opcode::FastForward,
            Command::FastBackward => Opcode::FastBackward,
            Command::SlowForward => Opcode::SlowForward,
            Command::SlowBackward => Opcode::SlowBackward,
            Command::Menu => Opcode::Menu,
            Command::AudioMenu => Opcode::AudioMenu,
            Command::Audio => Opcode::Audio,
            Command::Subtitle => Opcode::Subtitle,
            Command::GetTime => Opcode::GetTime,
            Command::SkipSeconds(s) if s < 0 => Opcode::SkipBackward,
            Command::SkipSeconds(_) => Opcode::SkipForward,
            Command::SetTitle(_) => Opcode::SetTitle,
            Command::SetChapter(_) => Opcode::SetChapter,
            Command::SeekAbsolute(_) => Opcode::SeekAbsolute,
            Command::SetMute(true) => Opcode::SetMute,
            Command::SetMute(false) => Opcode::UnsetMute,
            Command::Angle => Opcode::Angle,
            Command::GetAngle => Opcode::GetAngle,
            Command::SetAudio(_) => Opcode::SetAudio,
            Command::SetSubtitle(_) => Opcode::SetSubtitle,
        }
    }

    fn argument(&self) -> Option<i32> {
        match *self {
            Command::SkipSeconds(v)
            | Command::SetTitle(v)
            | Command::SetChapter(v)
            | Command::SeekAbsolute(v)
            | Command::SetAudio(v)
            | Command::SetSubtitle(v) => Some(v),
            _ => None,
        }
    }

    fn from_parts(opcode: Opcode, arg: i32) -> Self {
        match opcode {
            Opcode::Null => Command::Null,
            Opcode::Exit => Command::Exit,
            Opcode::Left => Command::Left,
            Opcode::Right => Command::Right,
            Opcode::Up => Command::Up,
            Opcode::Down => Command::Down,
            Opcode::Ok => Command::Ok,
            Opcode::Play => Command::Play,
            Opcode::Pause => Command::Pause,
            Opcode::NextChapter => Command::NextChapter,
            Opcode::PrevChapter => Command::PrevChapter,
            Opcode::NextTitle => Command::NextTitle,
            Opcode::PrevTitle => Command::PrevTitle,
            Opcode::FastForward => Command::FastForward,
            Opcode::FastBackward => Command::FastBackward,
            Opcode::SlowForward => Command::SlowForward,
            Opcode::SlowBackward => Command::SlowBackward,
            Opcode::Menu => Command::Menu,
            Opcode::AudioMenu => Command::AudioMenu,
            Opcode::Audio => Command::Audio,
            Opcode::Subtitle => Command::Subtitle,
            Opcode::GetTime => Command::GetTime,
            Opcode::SkipForward | Opcode::SkipBackward => Command::SkipSeconds(arg),
            Opcode::SetTitle => Command::SetTitle(arg),
            Opcode::SetChapter => Command::SetChapter(arg),
            Opcode::SeekAbsolute => Command::SeekAbsolute(arg),
            Opcode::SetMute => Command::SetMute(true),
            Opcode::UnsetMute => Command::SetMute(false),
            Opcode::Angle => Command::Angle,
            Opcode::GetAngle => Command::GetAngle,
            Opcode::SetAudio => Command::SetAudio(arg),
            Opcode::SetSubtitle => Command::SetSubtitle(arg),
        }
    }

    pub fn write_record(&self, dst: &mut Vec<u8>) {
        (self.opcode() as u32).write_wire(dst);
        if let Some(arg) = self.argument() {
            arg.write_wire(dst);
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.argument() {
            Some(arg) => write!(f, "{:?}({arg})", self.opcode()),
            None => write!(f, "{:?}", self.opcode()),
        }
    }
}

impl FromStr for Command {
    type Err = String;

    /// Parses the key names used by scripts and the interactive prompt,
    /// e.g. `ffwd`, `ok`, `skip:+30`, `title:2`, `subtitle:-1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => {
                let arg = arg
                    .trim_start_matches('+')
                    .parse::<i32>()
                    .map_err(|e| format!("invalid argument in '{s}': {e}"))?;
                (name, Some(arg))
            }
            None => (s.as_str(), None),
        };

        let cmd = match (name, arg) {
            ("exit" | "quit", None) => Command::Exit,
            ("left", None) => Command::Left,
            ("right", None) => Command::Right,
            ("up", None) => Command::Up,
            ("down", None) => Command::Down,
            ("ok" | "enter", None) => Command::Ok,
            ("play", None) => Command::Play,
            ("pause", None) => Command::Pause,
            ("next" | "nextchapter", None) => Command::NextChapter,
            ("prev" | "prevchapter", None) => Command::PrevChapter,
            ("nexttitle", None) => Command::NextTitle,
            ("prevtitle", None) => Command::PrevTitle,
            ("ffwd", None) => Command::FastForward,
            ("fbwd", None) => Command::FastBackward,
            ("slowfwd", None) => Command::SlowForward,
            ("slowbwd", None) => Command::SlowBackward,
            ("menu", None) => Command::Menu,
            ("audiomenu", None) => Command::AudioMenu,
            ("audio", None) => Command::Audio,
            ("subtitle", None) => Command::Subtitle,
            ("time", None) => Command::GetTime,
            ("mute", None) => Command::SetMute(true),
            ("unmute", None) => Command::SetMute(false),
            ("angle", None) => Command::Angle,
            ("getangle", None) => Command::GetAngle,
            ("skip", Some(v)) => Command::SkipSeconds(v),
            ("title", Some(v)) => Command::SetTitle(v),
            ("chapter", Some(v)) => Command::SetChapter(v),
            ("seek", Some(v)) => Command::SeekAbsolute(v),
            ("audio", Some(v)) => Command::SetAudio(v),
            ("subtitle", Some(v)) => Command::SetSubtitle(v),
            _ => return Err(format!("unknown key '{s}'")),
        };
        Ok(cmd)
    }
}

/// Producer side of the command queue.
#[derive(Debug, Clone)]
pub struct CommandSender {
    pipe: PipeWriter,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<(), ProtocolError> {
        let mut record = Vec::with_capacity(8);
        command.write_record(&mut record);
        self.pipe.write_owned(record)
    }

    /// Sends raw bytes, for hosts that frame records themselves.
    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.pipe.write(bytes)
    }
}

/// Consumer side of the command queue, owned by the playback thread.
#[derive(Debug)]
pub struct CommandReceiver {
    pipe: PipeReader,
}

impl CommandReceiver {
    /// Reads the next command if one starts within `wait`.
    pub fn poll(&mut self, wait: Wait) -> Result<Option<Command>, ProtocolError> {
        if !self.pipe.poll(wait)? {
            return Ok(None);
        }
        let opcode = Opcode::try_from(self.pipe.read_record::<u32>(u32::WIRE_LEN)?)?;
        let arg = match opcode.arity() {
            0 => 0,
            _ => self.pipe.read_record::<i32>(i32::WIRE_LEN)?,
        };
        Ok(Some(Command::from_parts(opcode, arg)))
    }
}

pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = pipe();
    (CommandSender { pipe: tx }, CommandReceiver { pipe: rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn arity_is_honoured() -> Result<()> {
        let (tx, mut rx) = command_queue();
        tx.send(Command::SkipSeconds(10))?;
        tx.send(Command::Pause)?;
        tx.send(Command::SkipSeconds(-30))?;
        tx.send(Command::SetSubtitle(-1))?;

        assert_eq!(rx.poll(Wait::NonBlocking)?, Some(Command::SkipSeconds(10)));
        assert_eq!(rx.poll(Wait::NonBlocking)?, Some(Command::Pause));
        assert_eq!(rx.poll(Wait::NonBlocking)?, Some(Command::SkipSeconds(-30)));
        assert_eq!(rx.poll(Wait::NonBlocking)?, Some(Command::SetSubtitle(-1)));
        assert_eq!(rx.poll(Wait::NonBlocking)?, None);
        Ok(())
    }

    #[test]
    fn argument_split_across_writes() -> Result<()> {
        let (tx, mut rx) = command_queue();
        let mut record = Vec::new();
        Command::SetTitle(3).write_record(&mut record);
        assert_eq!(record.len(), 8);

        tx.send_raw(&record[..2])?;
        tx.send_raw(&record[2..5])?;
        tx.send_raw(&record[5..])?;
        assert_eq!(rx.poll(Wait::NonBlocking)?, Some(Command::SetTitle(3)));
        Ok(())
    }

    #[test]
    fn unknown_opcode_is_fatal() -> Result<()> {
        let (tx, mut rx) = command_queue();
        tx.send_raw(&99u32.to_le_bytes())?;
        assert!(matches!(
            rx.poll(Wait::NonBlocking),
            Err(ProtocolError::UnknownOpcode(99))
        ));
        Ok(())
    }

    #[test]
    fn opcode_numbering() {
        assert_eq!(Opcode::try_from(20).ok(), Some(Opcode::SkipForward));
        assert_eq!(Opcode::try_from(32).ok(), Some(Opcode::SlowBackward));
        assert_eq!(Command::SetMute(false).opcode() as u32, 26);
        for (i, op) in OPCODES.iter().enumerate() {
            assert_eq!(*op as usize, i);
        }
    }

    #[test]
    fn parse_key_names() {
        assert_eq!("ffwd".parse(), Ok(Command::FastForward));
        assert_eq!("skip:+30".parse(), Ok(Command::SkipSeconds(30)));
        assert_eq!("skip:-10".parse(), Ok(Command::SkipSeconds(-10)));
        assert_eq!("Subtitle:-1".parse(), Ok(Command::SetSubtitle(-1)));
        assert!("warp".parse::<Command>().is_err());
        assert!("title".parse::<Command>().is_err());
    }
}
