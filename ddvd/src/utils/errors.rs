#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Result codes reported to the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DdvdResult {
    Ok = 0,
    Inval,
    NoMem,
    Busy,
    FailOpen,
    FailPrefs,
    FailRead,
}

#[derive(thiserror::Error, Debug)]
pub enum NavError {
    #[error("Cannot open DVD source: {0}")]
    Open(String),

    #[error("Cannot apply navigation preference: {0}")]
    Preferences(String),

    #[error("Block read failed: {0}")]
    Read(String),

    #[error("Sector search to {0} failed")]
    Seek(u32),

    #[error("Navigation call {call} failed: {reason}")]
    Call { call: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("Cannot open device {0}")]
    Open(String),

    #[error("Device operation {op} failed: {reason}")]
    Device { op: &'static str, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SpuError {
    #[error("Subpicture packet truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Inconsistent subpicture sizes: datasize {datasize} + 2 > size {size}")]
    InconsistentSize { datasize: usize, size: usize },

    #[error("Subpicture control sequence never set a bounding box")]
    MissingBoundingBox,

    #[error("Invalid subpicture bounding box ({x1},{y1})-({x2},{y2})")]
    InvalidBoundingBox { x1: u16, y1: u16, x2: u16, y2: u16 },

    #[error("Subpicture control sequence never set the RLE offsets")]
    MissingOffsets,

    #[error("Subpicture has neither a show nor a highlight command")]
    NoDisplayCommand,

    #[error("RLE decode failed: {0}")]
    Bitmap(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("AC3 frame decode failed: {0}")]
    Decode(String),

    #[error("MPEG audio encode failed: {0}")]
    Encode(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown command opcode {0}")]
    UnknownOpcode(u32),

    #[error("Unknown event kind {0}")]
    UnknownEvent(u32),

    #[error("Queue peer disconnected")]
    Disconnected,

    #[error("Record truncated: expected {expected} bytes, got {available}")]
    Truncated { expected: usize, available: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Cannot open DVD source: {0}")]
    Open(#[source] NavError),

    #[error("Cannot set navigation preferences: {0}")]
    Preferences(#[source] NavError),

    #[error("Getting next block failed: {0}")]
    Read(#[source] NavError),

    #[error("Cannot open presentation device: {0}")]
    DeviceOpen(#[source] SinkError),

    #[error("Presentation device error: {0}")]
    Device(#[source] SinkError),

    #[error("Command protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
}

impl EngineError {
    pub fn result_code(&self) -> DdvdResult {
        match self {
            EngineError::Open(_) | EngineError::DeviceOpen(_) => DdvdResult::FailOpen,
            EngineError::Preferences(_) => DdvdResult::FailPrefs,
            EngineError::Read(_) => DdvdResult::FailRead,
            EngineError::Device(_) => DdvdResult::Busy,
            EngineError::Protocol(_) => DdvdResult::Inval,
        }
    }
}

#[test]
fn result_codes() {
    let err = EngineError::Read(NavError::Read("sector 12".into()));
    assert_eq!(err.result_code(), DdvdResult::FailRead);
    assert_eq!(err.result_code() as u32, 6);
    assert_eq!(
        EngineError::Protocol(ProtocolError::UnknownOpcode(99)).result_code(),
        DdvdResult::Inval
    );
}
