//! XDMA control window.
//!
//! Each H2C channel owns a 256-byte block in the control BAR. The first two
//! words describe the channel:
//!
//! ```text
//! +0x0  identifier   [15] stream  [11:8] channel id  [3:0] version
//! +0x4  control      [26] poll-mode write-back enable
//! ```

/// Start of the H2C channel blocks in the control window.
pub const XDMA_CTRL_BASE: u64 = 0x0000;

/// Stride between two channel blocks.
pub const XDMA_CTRL_SIZE: u64 = 0x100;

/// Identifier word offset inside a channel block.
pub const IDENTIFIER: u64 = 0x0;

/// Control word offset inside a channel block.
pub const CONTROL: u64 = 0x4;

/// Identifier word bit fields.
pub mod identifier {
    /// Channel id, bits `[11:8]`.
    pub const CHANNEL_ID_SHIFT: u32 = 8;
    /// Version, bits `[3:0]`.
    pub const VERSION_SHIFT: u32 = 0;
    /// Four-bit field mask.
    pub const NIBBLE: u32 = 0xF;
    /// AXI-Stream (1) vs. AXI-MM (0), bit 15.
    pub const STREAM_BIT: u32 = 15;
}

/// Control word bit fields.
pub mod control {
    /// Poll-mode write-back enable, bit 26.
    pub const POLL_MODE_BIT: u32 = 26;
}

/// Address of the identifier word of `channel`.
#[must_use]
pub const fn identifier_addr(channel: u32) -> u64 {
    XDMA_CTRL_BASE + channel as u64 * XDMA_CTRL_SIZE + IDENTIFIER
}

/// Address of the control word of `channel`.
#[must_use]
pub const fn control_addr(channel: u32) -> u64 {
    XDMA_CTRL_BASE + channel as u64 * XDMA_CTRL_SIZE + CONTROL
}

/// Decoded description of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportInfo {
    /// Channel id reported by the core.
    pub channel_id: u8,
    /// Core version nibble.
    pub version: u8,
    /// Channel is configured for AXI-Stream.
    pub streaming: bool,
    /// Completion is signalled by polling write-back instead of interrupts.
    pub polling: bool,
}

impl TransportInfo {
    /// Decode the identifier (`+0x0`) and control (`+0x4`) words.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_words(identifier: u32, control: u32) -> Self {
        Self {
            channel_id: ((identifier >> identifier::CHANNEL_ID_SHIFT) & identifier::NIBBLE) as u8,
            version: ((identifier >> identifier::VERSION_SHIFT) & identifier::NIBBLE) as u8,
            streaming: (identifier >> identifier::STREAM_BIT) & 1 == 1,
            polling: (control >> control::POLL_MODE_BIT) & 1 == 1,
        }
    }

    /// Same as the default, but with the streaming flag set.
    #[must_use]
    pub const fn streaming() -> Self {
        Self {
            channel_id: 0,
            version: 0,
            streaming: true,
            polling: false,
        }
    }
}

impl core::fmt::Display for TransportInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Channel ID: {}", self.channel_id)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Streaming: {}", self.streaming)?;
        write!(f, "Polling: {}", self.polling)
    }
}
