//! Raw frame type as delivered by the upstream stream source.

/// Bit position of the stream channel inside the flag word.
const CHANNEL_SHIFT: u32 = 24;

/// A single raw frame from the readout stream.
///
/// Carries the undecoded payload along with the flag word and the
/// transport error code reported by the stream layer.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Raw payload bytes (header followed by records).
    payload: Vec<u8>,
    /// Flag word; the top byte selects the stream channel.
    flags: u32,
    /// Transport error code (0 = no error).
    error: u8,
}

impl RawFrame {
    /// Creates a new frame with the given payload and flag word.
    pub fn new(payload: Vec<u8>, flags: u32) -> Self {
        Self {
            payload,
            flags,
            error: 0,
        }
    }

    /// Creates a sample-data frame (stream channel 0).
    pub fn data(payload: Vec<u8>) -> Self {
        Self::new(payload, 0)
    }

    /// Creates a diagnostic text frame on the given stream channel.
    pub fn text(channel: u8, text: &str) -> Self {
        Self::new(text.as_bytes().to_vec(), (channel as u32) << CHANNEL_SHIFT)
    }

    /// Marks the frame with a transport error code.
    pub fn with_error(mut self, error: u8) -> Self {
        self.error = error;
        self
    }

    /// Returns a reference to the payload.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the full flag word.
    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Returns the stream channel (top byte of the flag word).
    #[inline]
    pub fn channel(&self) -> u8 {
        (self.flags >> CHANNEL_SHIFT) as u8
    }

    /// Returns the transport error code.
    #[inline]
    pub fn error(&self) -> u8 {
        self.error
    }

    /// Returns true if the stream layer flagged this frame as errored.
    #[inline]
    pub fn is_errored(&self) -> bool {
        self.error != 0
    }

    /// Returns true if this frame carries diagnostic text rather than samples.
    #[inline]
    pub fn is_text(&self) -> bool {
        self.channel() != 0
    }

    /// Returns the payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("channel", &self.channel())
            .field("flags", &format_args!("{:#010x}", self.flags))
            .field("error", &self.error)
            .field("payload_bytes", &self.payload.len())
            .finish()
    }
}
