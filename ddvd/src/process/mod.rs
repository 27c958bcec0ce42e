/// Display scaling derived from the title set aspect and the TV setup.
pub mod aspect;

/// Audio route selection and the AC3/LPCM re-encode path.
pub mod audio_route;

/// Per-sector stream classification, aspect patching and I-frame capture.
pub mod classify;

/// The playback loop.
///
/// Provides the [`Engine`](engine::Engine) that pulls blocks from the
/// navigation library, feeds the devices, schedules subpictures and
/// answers remote-control commands.
pub mod engine;

/// Menu highlight masks and their pairing with highlight events.
pub mod highlight;

/// Two-phase restoration of a saved position.
pub mod resume;

/// Stream statistics over a whole sector dump.
pub mod scan;

/// Subpicture packet assembly, control parsing and RLE decoding.
pub mod spu_decode;

/// The pending-subpicture ring and its presentation-time decisions.
pub mod spu_sync;

/// Trick-mode speed transitions and re-seek targets.
pub mod trick;

#[cfg(test)]
pub(crate) mod mock;
