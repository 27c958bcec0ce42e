use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::Result;
use ddvd::structs::pes::SECTOR_SIZE;

/// Sector reader over a file or stdin.
pub struct InputReader {
    reader: Box<dyn Read>,
}

impl InputReader {
    /// Use "-" for stdin pipe input.
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let is_pipe = input_path.as_ref().to_string_lossy() == "-";

        let reader: Box<dyn Read> = if is_pipe {
            Box::new(io::stdin().lock())
        } else {
            Box::new(BufReader::new(File::open(input_path)?))
        };

        Ok(Self { reader })
    }

    /// Fills `sector`. Returns `false` at the end of input; a trailing
    /// partial sector is dropped.
    pub fn read_sector(&mut self, sector: &mut [u8; SECTOR_SIZE]) -> Result<bool> {
        read_full_sector(&mut self.reader, sector)
    }

    /// Calls `callback` for every sector until it returns `Ok(false)`.
    pub fn process_sectors<F>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(&mut [u8; SECTOR_SIZE]) -> Result<bool>,
    {
        let mut sector = [0u8; SECTOR_SIZE];
        while self.read_sector(&mut sector)? {
            if !callback(&mut sector)? {
                break;
            }
        }
        Ok(())
    }
}

pub fn read_full_sector<R: Read + ?Sized>(reader: &mut R, sector: &mut [u8; SECTOR_SIZE]) -> Result<bool> {
    let mut filled = 0;
    while filled < SECTOR_SIZE {
        match reader.read(&mut sector[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    if filled != 0 && filled < SECTOR_SIZE {
        log::warn!("Dropping trailing partial sector of {filled} bytes");
    }
    Ok(filled == SECTOR_SIZE)
}

/// Number of whole sectors in a seekable input.
pub fn sector_count<S: Seek>(input: &mut S) -> Result<u32> {
    let len = input.seek(SeekFrom::End(0))?;
    input.seek(SeekFrom::Start(0))?;
    Ok(u32::try_from(len / SECTOR_SIZE as u64)?)
}
