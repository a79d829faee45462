use super::{Pt, Ssrc};

/// An already decrypted and parsed RTP packet.
///
/// The receiver never looks at the payload. Header extensions are kept as the raw
/// block and are only walked with bounds checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// Synchronization source.
    pub ssrc: Ssrc,
    /// Payload type.
    pub pt: Pt,
    /// Sequence number.
    pub sequence_number: u16,
    /// RTP timestamp.
    pub timestamp: u32,
    /// Marker bit.
    pub marker: bool,
    /// Contributing sources, in header order.
    pub csrc: Vec<Ssrc>,
    /// The "defined by profile" field of the extension header. 0 when absent.
    pub ext_profile: u16,
    /// The raw header extension block, without the 4 byte extension header.
    pub ext_data: Vec<u8>,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// A packet with no extensions, CSRCs or payload.
    pub fn new(ssrc: Ssrc, pt: Pt) -> Self {
        RtpPacket {
            ssrc,
            pt,
            sequence_number: 0,
            timestamp: 0,
            marker: false,
            csrc: vec![],
            ext_profile: 0,
            ext_data: vec![],
            payload: vec![],
        }
    }

    /// Set the raw header extension block.
    pub fn with_extensions(mut self, profile: u16, data: Vec<u8>) -> Self {
        self.ext_profile = profile;
        self.ext_data = data;
        self
    }
}
