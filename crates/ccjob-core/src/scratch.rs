//! Bounded download buffer that spills to a temporary file.
//!
//! Small objects stay in memory; once the buffered size passes the threshold
//! the contents move to an anonymous temp file, which the OS removes as soon
//! as the buffer is dropped.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

enum Backing {
    Memory(Cursor<Vec<u8>>),
    Disk(File),
}

/// Scratch area for one remote download
pub struct ScratchBuffer {
    backing: Backing,
    threshold: usize,
    dir: Option<PathBuf>,
}

impl ScratchBuffer {
    /// `dir` is where the spill file is created; the platform temp dir when `None`.
    pub fn new(threshold: usize, dir: Option<PathBuf>) -> Self {
        Self {
            backing: Backing::Memory(Cursor::new(Vec::new())),
            threshold,
            dir,
        }
    }

    /// Whether contents have moved to disk
    pub fn is_spilled(&self) -> bool {
        matches!(self.backing, Backing::Disk(_))
    }

    /// Drop all contents and return to position 0.
    ///
    /// A spilled buffer stays on disk.
    pub fn reset(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::Memory(cursor) => {
                cursor.get_mut().clear();
                cursor.set_position(0);
            }
            Backing::Disk(file) => {
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
            }
        }
        Ok(())
    }

    fn spill(&mut self) -> io::Result<()> {
        let Backing::Memory(cursor) = &self.backing else {
            return Ok(());
        };
        let mut file = match &self.dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        file.write_all(cursor.get_ref())?;
        file.seek(SeekFrom::Start(cursor.position()))?;
        log::debug!(
            "scratch buffer passed {} bytes, spilled to disk",
            self.threshold
        );
        self.backing = Backing::Disk(file);
        Ok(())
    }
}

impl Write for ScratchBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let overflow = matches!(
            &self.backing,
            Backing::Memory(cursor) if cursor.position() as usize + buf.len() > self.threshold
        );
        if overflow {
            self.spill()?;
        }
        match &mut self.backing {
            Backing::Memory(cursor) => cursor.write(buf),
            Backing::Disk(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::Memory(_) => Ok(()),
            Backing::Disk(file) => file.flush(),
        }
    }
}

impl Read for ScratchBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.backing {
            Backing::Memory(cursor) => cursor.read(buf),
            Backing::Disk(file) => file.read(buf),
        }
    }
}

impl Seek for ScratchBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.backing {
            Backing::Memory(cursor) => cursor.seek(pos),
            Backing::Disk(file) => file.seek(pos),
        }
    }
}
