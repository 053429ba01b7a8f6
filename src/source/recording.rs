//! Recorded readout streams.
//!
//! A recording is a flat sequence of entries:
//!
//! ```text
//! u32 LE  size     bytes following this field (4 + payload)
//! u32 LE  header   [31:24] stream channel, [23:16] error, [15:0] flags
//! [u8]    payload  size - 4 bytes
//! ```

use super::{FrameSource, RawFrame, SourceError};
use std::io::{self, Read, Write};

const HEADER_BYTES: u32 = 4;

/// Reads raw frames from a recorded stream.
pub struct RecordingSource<R> {
    reader: R,
    entries: u64,
}

impl<R: Read> RecordingSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, entries: 0 }
    }

    /// Number of entries read so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Reads the size field, distinguishing a clean end of stream.
    fn read_size(&mut self) -> Result<Option<u32>, SourceError> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(SourceError::Truncated { entry: self.entries }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(u32::from_le_bytes(buf)))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SourceError> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => SourceError::Truncated { entry: self.entries },
            _ => SourceError::Io(e),
        })
    }
}

impl RecordingSource<io::BufReader<std::fs::File>> {
    /// Opens a recording file.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "Opened recording");
        Ok(Self::new(io::BufReader::new(file)))
    }
}

impl<R: Read> FrameSource for RecordingSource<R> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        let Some(size) = self.read_size()? else {
            tracing::debug!(entries = self.entries, "End of recording");
            return Ok(None);
        };
        if size < HEADER_BYTES {
            return Err(SourceError::InvalidEntry {
                entry: self.entries,
                size,
            });
        }

        let mut header = [0u8; 4];
        self.read_exact(&mut header)?;
        let header = u32::from_le_bytes(header);

        // The size field is untrusted; only allocate what is actually read.
        let len = u64::from(size - HEADER_BYTES);
        let mut payload = Vec::new();
        (&mut self.reader).take(len).read_to_end(&mut payload)?;
        if (payload.len() as u64) < len {
            return Err(SourceError::Truncated {
                entry: self.entries,
            });
        }
        self.entries += 1;

        let channel = header >> 24;
        let error = ((header >> 16) & 0xFF) as u8;
        let flags = (channel << 24) | (header & 0xFFFF);

        Ok(Some(RawFrame::new(payload, flags).with_error(error)))
    }
}

/// Writes raw frames in the recording format.
pub struct RecordingWriter<W> {
    writer: W,
    entries: u64,
}

impl<W: Write> RecordingWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, entries: 0 }
    }

    /// Appends one frame to the recording.
    pub fn write_frame(&mut self, frame: &RawFrame) -> io::Result<()> {
        let size = u32::try_from(frame.len())
            .ok()
            .and_then(|len| len.checked_add(HEADER_BYTES))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;

        let header = (frame.flags() & 0xFF00_FFFF) | ((frame.error() as u32) << 16);

        self.writer.write_all(&size.to_le_bytes())?;
        self.writer.write_all(&header.to_le_bytes())?;
        self.writer.write_all(frame.payload())?;
        self.entries += 1;
        Ok(())
    }

    /// Number of entries written.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl RecordingWriter<io::BufWriter<std::fs::File>> {
    /// Creates (or truncates) a recording file.
    pub fn create(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        let file = std::fs::File::create(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "Recording frames");
        Ok(Self::new(io::BufWriter::new(file)))
    }
}
