//! Threads around the playback loop: key input and event reporting.

use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use indicatif::ProgressBar;

use ddvd::structs::command::{Command, CommandSender};
use ddvd::structs::event::{Event, EventReceiver, TimeInfo};
use ddvd::structs::nav::lang_str;
use ddvd::structs::pipe::Wait;
use ddvd::utils::errors::ProtocolError;

pub fn parse_keys(keys: &[String]) -> Result<Vec<Command>> {
    keys.iter()
        .filter(|k| !k.trim().is_empty())
        .map(|k| k.parse::<Command>().map_err(|e| anyhow!(e)))
        .collect()
}

/// Sends `keys` one per `interval`. The engine has gone away once a send
/// fails, which ends the script quietly.
pub fn spawn_key_script(
    keys: Vec<Command>,
    interval: Duration,
    commands: CommandSender,
) -> thread::JoinHandle<Result<()>> {
    thread::spawn(move || -> Result<()> {
        for key in keys {
            thread::sleep(interval);
            log::debug!("Key {key:?}");
            if commands.send(key).is_err() {
                break;
            }
        }
        Ok(())
    })
}

/// Reads one key per stdin line; end of input exits the session.
pub fn spawn_interactive(commands: CommandSender) -> thread::JoinHandle<Result<()>> {
    thread::spawn(move || -> Result<()> {
        for line in io::stdin().lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(key) => {
                    if commands.send(key).is_err() {
                        return Ok(());
                    }
                }
                Err(e) => log::warn!("{e}"),
            }
        }
        // The engine may already be gone.
        let _ = commands.send(Command::Exit);
        Ok(())
    })
}

/// Logs every event until the engine drops its sender.
pub fn spawn_event_logger(
    mut events: EventReceiver,
    pb: Option<ProgressBar>,
) -> thread::JoinHandle<Result<()>> {
    thread::spawn(move || -> Result<()> {
        loop {
            let event = match events.poll(Wait::Blocking) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(ProtocolError::Disconnected) => break,
                Err(e) => return Err(e.into()),
            };
            report(&event, pb.as_ref());
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        Ok(())
    })
}

fn report(event: &Event, pb: Option<&ProgressBar>) {
    match event {
        Event::Time(time) => match pb {
            Some(pb) => pb.set_message(position(time)),
            None => log::debug!("Time {}", position(time)),
        },
        Event::StateFastForward(trick) => {
            log::info!("Fast forward x{} at {}", trick.speed, position(&trick.time))
        }
        Event::StateFastBackward(trick) => {
            log::info!("Fast backward x{} at {}", trick.speed, position(&trick.time))
        }
        Event::StatePlay => log::info!("Playing"),
        Event::StatePause => log::info!("Paused"),
        Event::Text(text) => log::warn!("{text}"),
        Event::TitleString(title) => log::info!("Title \"{title}\""),
        Event::Audio(audio) => log::info!(
            "Audio stream {} ({}), format {:#x}",
            audio.id,
            lang_str(audio.lang),
            audio.format
        ),
        Event::Subtitle(sub) if sub.id < 0 => log::info!("Subtitles off"),
        Event::Subtitle(sub) => {
            log::info!("Subtitle stream {} ({})", sub.id, lang_str(sub.lang))
        }
        Event::Angle(angle) => log::info!("Angle {} of {}", angle.current, angle.count),
        Event::EndOfFile => log::info!("End of title"),
        Event::StartOfFile => log::info!("Start of title"),
        Event::MenuOpened => log::info!("Menu opened"),
        Event::MenuClosed => log::info!("Menu closed"),
        Event::SizeChanged(size) => log::info!(
            "Video {}x{}, aspect code {}",
            size.width,
            size.height,
            size.aspect
        ),
        Event::SpuRendered(spu) => log::debug!("Subpicture rendered for PTS {}", spu.target_pts),
        other => log::trace!("{other:?}"),
    }
}

fn position(time: &TimeInfo) -> String {
    format!(
        "title {} chapter {} {:02}:{:02}:{:02} / {:02}:{:02}:{:02}",
        time.pos_title,
        time.pos_chapter,
        time.pos_hours,
        time.pos_minutes,
        time.pos_seconds,
        time.end_hours,
        time.end_minutes,
        time.end_seconds
    )
}
