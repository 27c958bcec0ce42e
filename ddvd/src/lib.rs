#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! The engine sits between a DVD navigation library and the presentation
//! devices of a set-top box.
//!
//! ### Data Path
//!
//! **Sectors**: 2048-byte program stream packs pulled one at a time from the
//! navigation library and sorted into video, audio and subpicture streams.
//! **Subpictures**: reassembled from PES packets, RLE-decoded into an indexed
//! bitmap and queued until the video clock reaches their PTS.
//!
//! ### Control Path
//!
//! A host application sends remote-control commands through a byte queue and
//! receives state, time, menu and overlay events through another. Both queues
//! use a fixed little-endian record layout.
//!
//! ## Quick Start
//!
//! 1. Implement [`structs::nav::Navigator`] over the navigation library and
//!    [`structs::sink::MediaSink`] over the video and audio devices
//! 2. Create the queues with [`structs::command::command_queue`] and
//!    [`structs::event::event_queue`]
//! 3. Run a session with [`process::engine::Engine::run`]
//!
//! ```rust,no_run
//! use ddvd::process::engine::{Collaborators, Engine};
//! use ddvd::structs::command::{Command, command_queue};
//! use ddvd::structs::config::PlayerConfig;
//! use ddvd::structs::event::event_queue;
//!
//! # fn collaborators() -> Collaborators { unimplemented!() }
//! let (commands, command_rx) = command_queue();
//! let (event_tx, mut events) = event_queue();
//!
//! std::thread::spawn(move || {
//!     while let Ok(Some(event)) = events.poll(ddvd::structs::pipe::Wait::Blocking) {
//!         println!("{event:?}");
//!     }
//! });
//!
//! commands.send(Command::FastForward)?;
//! let engine = Engine::new(PlayerConfig::default(), collaborators(), command_rx, event_tx);
//! let outcome = engine.run()?;
//! println!("Resume at {:?}", outcome.resume);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Playback processing.
///
/// 1. **Classification** ([`process::classify`]): sorts sectors into streams.
///
/// 2. **Subpictures** ([`process::spu_decode`], [`process::spu_sync`],
///    [`process::highlight`]): decoding, scheduling and menu highlights.
///
/// 3. **Playback** ([`process::engine`]): the loop, trick modes and commands.
pub mod process;

/// Data structures of the playback engine.
///
/// - **Sectors** ([`structs::pes`]): PES framing
/// - **Subpictures** ([`structs::spu`]): decoded units and the overlay frame
/// - **Palette** ([`structs::palette`]): colour lookup and blending
/// - **Navigation** ([`structs::nav`]): navigation library contract
/// - **Devices** ([`structs::sink`], [`structs::codec`]): presentation and codec contracts
/// - **Protocol** ([`structs::command`], [`structs::event`]): host queues
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Nibble reader for RLE data
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Timing** ([`utils::timing`]): Clock and deadlines
/// - **Buffer Management** ([`utils::buffer_pool`]): Packet buffer reuse
pub mod utils;
