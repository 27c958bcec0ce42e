pub mod devices;
pub mod nav;
pub mod remote;

use std::time::Duration;

use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, PlayArgs};
use crate::config::{load_resume, player_config, store_resume};
use devices::{DumpOverlay, FileSink};
use nav::FileNavigator;
use remote::{parse_keys, spawn_event_logger, spawn_interactive, spawn_key_script};

use ddvd::process::engine::{Collaborators, Engine};
use ddvd::structs::command::command_queue;
use ddvd::structs::event::event_queue;
use ddvd::structs::sink::{NullOverlay, Overlay};
use ddvd::utils::timing::SystemClock;

pub fn cmd_play(args: &PlayArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let mut config = player_config(cli.config.as_deref(), args, cli.strict)?;
    if let Some(path) = &args.resume {
        config.resume = load_resume(path)?;
        if let Some(resume) = config.resume {
            log::info!(
                "Resuming title {} chapter {} at block {}",
                resume.title,
                resume.chapter,
                resume.block
            );
        }
    }
    let keys = parse_keys(&args.keys)?;

    let overlay: Box<dyn Overlay> = match &args.dump_overlay {
        Some(dir) => Box::new(DumpOverlay::new(dir.clone())?),
        None => Box::new(NullOverlay),
    };
    let io = Collaborators {
        nav: Box::new(FileNavigator::new(config.pts_encoding)),
        video: Box::new(FileSink::video(args.video_out.clone(), args.realtime)),
        audio: Box::new(FileSink::audio(args.audio_out.clone())),
        overlay,
        clock: Box::new(SystemClock::default()),
        ac3: None,
        encoder: None,
    };

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message("Starting playback...");
            Some(pb)
        }
        None => None,
    };

    let (commands, command_rx) = command_queue();
    let (event_tx, events) = event_queue();
    let logger = spawn_event_logger(events, pb);

    // Input threads are left running; they notice the engine is gone on
    // their next send.
    if args.interactive {
        spawn_interactive(commands.clone());
    } else if !keys.is_empty() {
        spawn_key_script(
            keys,
            Duration::from_millis(args.key_interval),
            commands.clone(),
        );
    }

    let engine = Engine::new(config, io, command_rx, event_tx);
    let outcome = engine.run();
    drop(commands);

    match logger.join() {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("Event logger thread panicked")),
    }

    let outcome = outcome
        .map_err(|e| anyhow!("Playback failed ({:?}): {e}", e.result_code()))?;
    if let Some(path) = &args.resume {
        store_resume(path, outcome.resume)?;
        match outcome.resume {
            Some(_) => log::info!("Stored resume position in {}", path.display()),
            None => log::debug!("No resume position to store"),
        }
    }
    Ok(())
}
