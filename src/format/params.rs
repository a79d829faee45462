use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rtp::{Mid, Pt, Rid, Ssrc};

use super::{Codec, CodecKind, MediaKind};

/// Errors in a set of receive parameters.
///
/// These are reported when the parameters are handed to the receiver. The receiver is
/// left untouched when one occurs.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParameterError {
    /// The codec list has both audio and video codecs.
    #[error("Parameters mix audio and video codecs")]
    MixedMediaKinds,

    /// No codec in the list tells whether this is audio or video.
    #[error("No audio or video codec in parameters")]
    UnknownMediaKind,

    /// The parameters are for another media kind than the receiver was created for.
    #[error("Media kind can't change from {0} to {1}")]
    MediaKindChanged(MediaKind, MediaKind),

    /// Two codecs use the same payload type.
    #[error("Duplicate payload type: {0}")]
    DuplicatePayloadType(Pt),

    /// Header extension id 0 is not allowed.
    #[error("Invalid header extension id: {0}")]
    InvalidExtensionId(u8),

    /// Two header extensions use the same id.
    #[error("Duplicate header extension id: {0}")]
    DuplicateExtensionId(u8),

    /// An RTX codec points to a payload type that isn't in the codec list.
    #[error("RTX codec {0} has no associated codec")]
    MissingAssociatedPayloadType(Pt),

    /// A RID that is empty or has characters other than alphanumerics, `-` and `_`.
    #[error("Invalid RID: {0}")]
    InvalidRid(Rid),

    /// Two encodings use the same RID.
    #[error("Duplicate RID: {0}")]
    DuplicateRid(Rid),
}

/// Negotiated parameters for receiving one media track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameters {
    /// Mux id (MID) of the media section.
    #[serde(default)]
    pub mux_id: Option<Mid>,

    /// Codecs that may be received.
    #[serde(default)]
    pub codecs: Vec<CodecParameters>,

    /// Header extensions that may be received.
    #[serde(default)]
    pub header_extensions: Vec<HeaderExtensionParameters>,

    /// Encodings that may be received. An empty list means "latch on to anything".
    #[serde(default)]
    pub encodings: Vec<EncodingParameters>,

    /// RTCP settings.
    #[serde(default)]
    pub rtcp: RtcpParameters,
}

/// One codec the remote may send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecParameters {
    /// The codec.
    pub codec: Codec,
    /// Payload type used on the wire.
    pub pt: Pt,
    /// Clock rate in Hz.
    pub clock_rate: u32,
    /// Number of audio channels.
    #[serde(default)]
    pub channels: Option<u8>,
    /// For RTX, the payload type being resent.
    #[serde(default)]
    pub apt: Option<Pt>,
}

/// One header extension registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeaderExtensionParameters {
    /// URI of the extension.
    pub uri: String,
    /// Id used on the wire.
    pub id: u8,
    /// Whether the extension is encrypted.
    #[serde(default)]
    pub encrypt: bool,
}

/// One encoding (stream) the remote may send.
///
/// Every field is optional. Fields left out are discovered from the traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodingParameters {
    /// SSRC of the encoding.
    #[serde(default)]
    pub ssrc: Option<Ssrc>,
    /// Payload type of the encoding.
    #[serde(default)]
    pub codec_pt: Option<Pt>,
    /// Retransmission stream.
    #[serde(default)]
    pub rtx: Option<RtxParameters>,
    /// Forward error correction stream.
    #[serde(default)]
    pub fec: Option<FecParameters>,
    /// RTP stream id.
    #[serde(default)]
    pub rid: Option<Rid>,
    /// RIDs this encoding depends on (layered coding).
    #[serde(default)]
    pub dependency_rids: Vec<Rid>,
    /// Inactive encodings still receive, but are never made the active channel.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Default for EncodingParameters {
    fn default() -> Self {
        EncodingParameters {
            ssrc: None,
            codec_pt: None,
            rtx: None,
            fec: None,
            rid: None,
            dependency_rids: vec![],
            active: true,
        }
    }
}

/// Retransmission stream of an encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RtxParameters {
    /// SSRC of the resends.
    #[serde(default)]
    pub ssrc: Option<Ssrc>,
    /// Payload type of the resends.
    #[serde(default)]
    pub pt: Option<Pt>,
}

/// Forward error correction stream of an encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FecParameters {
    /// SSRC of the FEC stream.
    #[serde(default)]
    pub ssrc: Option<Ssrc>,
    /// How FEC is carried.
    #[serde(default)]
    pub mechanism: Option<FecMechanism>,
}

/// The FEC scheme of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FecMechanism {
    /// RED without ULPFEC.
    Red,
    /// ULPFEC wrapped in RED.
    RedUlpfec,
    /// FlexFEC.
    FlexFec,
}

impl FecMechanism {
    /// The name used in capabilities.
    pub fn as_str(&self) -> &'static str {
        match self {
            FecMechanism::Red => "red",
            FecMechanism::RedUlpfec => "red+ulpfec",
            FecMechanism::FlexFec => "flexfec",
        }
    }
}

/// RTCP settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RtcpParameters {
    /// Canonical name of the remote.
    #[serde(default)]
    pub cname: Option<String>,
    /// Reduced size RTCP (RFC 5506).
    #[serde(default)]
    pub reduced_size: bool,
    /// RTCP multiplexed with RTP.
    #[serde(default)]
    pub mux: bool,
}

impl Parameters {
    /// A set with no encodings latches on to whatever traffic arrives.
    pub fn should_latch_all(&self) -> bool {
        self.encodings.is_empty()
    }

    /// Find the codec for a payload type.
    pub fn find_codec(&self, pt: Pt) -> Option<&CodecParameters> {
        self.codecs.iter().find(|c| c.pt == pt)
    }

    /// Hash over the entire content. Equal parameters always give the same hash.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Infer audio or video from the codec list.
    ///
    /// `Ok(None)` when no codec tells, for instance a list with only RTX.
    pub fn media_kind(&self) -> Result<Option<MediaKind>, ParameterError> {
        let mut found = None;

        for c in &self.codecs {
            let Some(kind) = c.codec.media_kind() else {
                continue;
            };

            match found {
                None => found = Some(kind),
                Some(k) if k != kind => return Err(ParameterError::MixedMediaKinds),
                _ => {}
            }
        }

        Ok(found)
    }

    /// Check the parameters are self consistent.
    pub fn validate(&self) -> Result<(), ParameterError> {
        let mut pts = HashSet::new();
        for c in &self.codecs {
            if !pts.insert(c.pt) {
                return Err(ParameterError::DuplicatePayloadType(c.pt));
            }
        }

        for c in &self.codecs {
            if c.codec.codec_kind() != CodecKind::Rtx {
                continue;
            }
            if let Some(apt) = c.apt {
                if !pts.contains(&apt) {
                    return Err(ParameterError::MissingAssociatedPayloadType(c.pt));
                }
            }
        }

        let mut ids = HashSet::new();
        for e in &self.header_extensions {
            if e.id == 0 {
                return Err(ParameterError::InvalidExtensionId(e.id));
            }
            if !ids.insert(e.id) {
                return Err(ParameterError::DuplicateExtensionId(e.id));
            }
        }

        let mut rids = HashSet::new();
        for e in &self.encodings {
            for rid in e.rid.iter().chain(e.dependency_rids.iter()) {
                if !Rid::is_valid(rid) {
                    return Err(ParameterError::InvalidRid(*rid));
                }
            }
            if let Some(rid) = e.rid {
                if !rids.insert(rid) {
                    return Err(ParameterError::DuplicateRid(rid));
                }
            }
        }

        Ok(())
    }
}

impl CodecParameters {
    /// Create codec parameters.
    pub fn new(codec: Codec, pt: impl Into<Pt>, clock_rate: u32) -> Self {
        CodecParameters {
            codec,
            pt: pt.into(),
            clock_rate,
            channels: None,
            apt: None,
        }
    }

    /// RTX resending the given payload type.
    pub fn rtx(pt: impl Into<Pt>, apt: impl Into<Pt>, clock_rate: u32) -> Self {
        CodecParameters {
            apt: Some(apt.into()),
            ..Self::new(Codec::Rtx, pt, clock_rate)
        }
    }
}
