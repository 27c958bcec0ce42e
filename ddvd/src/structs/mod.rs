//! Data structures of the playback engine.
//!
//! Contains the sector and subpicture representations, the palette working
//! set, the session state, the collaborator contracts (navigation, devices,
//! codecs) and the command/event wire protocol.

pub mod codec;
pub mod command;
pub mod config;
pub mod event;
pub mod nav;
pub mod palette;
pub mod pes;
pub mod pipe;
pub mod session;
pub mod sink;
pub mod spu;
pub mod stream;
pub mod wire;
