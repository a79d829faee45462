use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    /// Audio media.
    Audio,
    /// Video media.
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Known codecs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum Codec {
    Opus,
    Isac,
    G722,
    Ilbc,
    PCMU,
    PCMA,
    H264,
    Vp8,
    Vp9,
    /// Comfort noise.
    CN,
    /// DTMF tones.
    TelephoneEvent,
    /// Technically not a codec, but used in places where codecs go
    /// in `a=rtpmap` lines.
    Rtx,
    /// Redundant encoding.
    Red,
    Ulpfec,
    FlexFec,
    #[doc(hidden)]
    Unknown,
}

/// What role the payload of a codec plays in a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// Primary audio.
    Audio,
    /// Audio that only accompanies a primary audio stream (comfort noise, DTMF).
    AudioSupplemental,
    /// Primary video.
    Video,
    /// Retransmission.
    Rtx,
    /// Forward error correction, RED included.
    Fec,
    /// Not a codec we know.
    Unknown,
}

impl CodecKind {
    /// Tells if this is a primary media kind that fills an encoding's own SSRC slot.
    pub fn is_primary(&self) -> bool {
        use CodecKind::*;
        matches!(self, Audio | Video)
    }
}

impl Codec {
    /// The role this codec plays.
    pub fn codec_kind(&self) -> CodecKind {
        use Codec::*;
        match self {
            Opus | Isac | G722 | Ilbc | PCMU | PCMA => CodecKind::Audio,
            CN | TelephoneEvent => CodecKind::AudioSupplemental,
            H264 | Vp8 | Vp9 => CodecKind::Video,
            Rtx => CodecKind::Rtx,
            Red | Ulpfec | FlexFec => CodecKind::Fec,
            Unknown => CodecKind::Unknown,
        }
    }

    /// The media kind implied by the codec, `None` for codecs valid in both.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self.codec_kind() {
            CodecKind::Audio | CodecKind::AudioSupplemental => Some(MediaKind::Audio),
            CodecKind::Video => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl<'a> From<&'a str> for Codec {
    fn from(v: &'a str) -> Self {
        let lc = v.to_ascii_lowercase();
        match &lc[..] {
            "opus" => Codec::Opus,
            "isac" => Codec::Isac,
            "g722" => Codec::G722,
            "ilbc" => Codec::Ilbc,
            "pcmu" => Codec::PCMU,
            "pcma" => Codec::PCMA,
            "h264" => Codec::H264,
            "vp8" => Codec::Vp8,
            "vp9" => Codec::Vp9,
            "cn" => Codec::CN,
            "telephone-event" => Codec::TelephoneEvent,
            "rtx" => Codec::Rtx, // resends
            "red" => Codec::Red,
            "ulpfec" => Codec::Ulpfec,
            "flexfec" | "flexfec-03" => Codec::FlexFec,
            _ => Codec::Unknown,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Opus => write!(f, "opus"),
            Codec::Isac => write!(f, "ISAC"),
            Codec::G722 => write!(f, "G722"),
            Codec::Ilbc => write!(f, "ILBC"),
            Codec::PCMU => write!(f, "PCMU"),
            Codec::PCMA => write!(f, "PCMA"),
            Codec::H264 => write!(f, "H264"),
            Codec::Vp8 => write!(f, "VP8"),
            Codec::Vp9 => write!(f, "VP9"),
            Codec::CN => write!(f, "CN"),
            Codec::TelephoneEvent => write!(f, "telephone-event"),
            Codec::Rtx => write!(f, "rtx"),
            Codec::Red => write!(f, "red"),
            Codec::Ulpfec => write!(f, "ulpfec"),
            Codec::FlexFec => write!(f, "flexfec"),
            Codec::Unknown => write!(f, "unknown"),
        }
    }
}
