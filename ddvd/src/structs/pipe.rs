//! Unbounded single-producer/single-consumer byte pipe.
//!
//! Records are framed by the command and event codecs; the pipe itself only
//! moves bytes. A reader polls for the first byte of a record and then reads
//! the rest blocking, retrying short reads.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use crate::structs::wire::WireRead;
use crate::utils::errors::ProtocolError;

/// How long a reader may wait for the start of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    NonBlocking,
    Blocking,
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel();
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            pending: VecDeque::new(),
        },
    )
}

impl PipeWriter {
    pub fn write(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.write_owned(bytes.to_vec())
    }

    pub fn write_owned(&self, bytes: Vec<u8>) -> Result<(), ProtocolError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.tx.send(bytes).map_err(|_| ProtocolError::Disconnected)
    }
}

impl PipeReader {
    fn receive(&mut self, wait: Wait) -> Result<bool, ProtocolError> {
        let chunk = match wait {
            Wait::NonBlocking => match self.rx.try_recv() {
                Ok(chunk) => chunk,
                Err(TryRecvError::Empty) => return Ok(false),
                Err(TryRecvError::Disconnected) => return Err(ProtocolError::Disconnected),
            },
            Wait::Blocking => self.rx.recv().map_err(|_| ProtocolError::Disconnected)?,
            Wait::Timeout(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return Err(ProtocolError::Disconnected),
            },
        };
        self.pending.extend(chunk);
        Ok(true)
    }

    /// Returns `true` once at least one byte is available.
    ///
    /// Fails with [`ProtocolError::Disconnected`] when the writer is gone and
    /// nothing is buffered.
    pub fn poll(&mut self, wait: Wait) -> Result<bool, ProtocolError> {
        while self.pending.is_empty() {
            if !self.receive(wait)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fills `out` completely, blocking for the remainder of a record.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<(), ProtocolError> {
        let mut filled = 0;
        while filled < out.len() {
            if self.pending.is_empty() {
                self.receive(Wait::Blocking)
                    .map_err(|_| ProtocolError::Truncated {
                        expected: out.len(),
                        available: filled,
                    })?;
                continue;
            }
            let n = self.pending.len().min(out.len() - filled);
            for (dst, src) in out[filled..filled + n].iter_mut().zip(self.pending.drain(..n)) {
                *dst = src;
            }
            filled += n;
        }
        Ok(())
    }

    /// Reads one fixed-size value.
    pub fn read_record<T: WireRead>(&mut self, len: usize) -> Result<T, ProtocolError> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        T::read_wire(&mut &buf[..])
    }
}
