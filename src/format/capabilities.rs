use serde::{Deserialize, Serialize};

use crate::rtp::{Extension, Pt};

use super::{Codec, FecMechanism, MediaKind};

/// What a receiver is able to receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Receivable codecs.
    pub codecs: Vec<CodecCapability>,
    /// Receivable header extensions.
    pub header_extensions: Vec<HeaderExtensionCapability>,
    /// Supported FEC schemes.
    pub fec_mechanisms: Vec<String>,
}

/// One receivable codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecCapability {
    /// The codec.
    pub codec: Codec,
    /// Media kind, `None` for codecs used with both.
    pub kind: Option<MediaKind>,
    /// Clock rate in Hz.
    pub clock_rate: u32,
    /// Payload type we'd like the remote to use.
    pub preferred_pt: Pt,
    /// Audio channels.
    pub channels: Option<u8>,
    /// Maximum packet time in milliseconds.
    pub max_ptime: Option<u32>,
    /// Preferred packet time in milliseconds.
    pub ptime: Option<u32>,
    /// RTCP feedback mechanisms.
    pub feedback: Vec<RtcpFeedback>,
}

/// An RTCP feedback mechanism, as in `a=rtcp-fb`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpFeedback {
    /// Feedback type, i.e. `nack`.
    pub kind: String,
    /// Feedback parameter, i.e. `pli`.
    pub parameter: Option<String>,
}

/// One receivable header extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderExtensionCapability {
    /// Media kind the extension applies to.
    pub kind: MediaKind,
    /// The extension URI.
    pub uri: String,
    /// Id we'd like the remote to use.
    pub preferred_id: u8,
    /// Whether we prefer it encrypted.
    pub preferred_encrypt: bool,
}

// (codec, kind, clock rate, pt, channels, ptime, max ptime)
const CODECS: &[(Codec, Option<MediaKind>, u32, u8, Option<u8>, Option<u32>, Option<u32>)] = &[
    (Codec::Opus, Some(MediaKind::Audio), 48_000, 111, Some(2), Some(20), Some(120)),
    (Codec::Isac, Some(MediaKind::Audio), 32_000, 104, Some(1), Some(30), Some(60)),
    (Codec::Isac, Some(MediaKind::Audio), 16_000, 103, Some(1), Some(30), Some(60)),
    (Codec::G722, Some(MediaKind::Audio), 16_000, 9, Some(1), Some(20), None),
    (Codec::Ilbc, Some(MediaKind::Audio), 16_000, 102, Some(1), Some(30), Some(30)),
    (Codec::Ilbc, Some(MediaKind::Audio), 8_000, 101, Some(1), Some(30), Some(30)),
    (Codec::PCMU, Some(MediaKind::Audio), 8_000, 0, Some(1), Some(20), None),
    (Codec::PCMA, Some(MediaKind::Audio), 8_000, 8, Some(1), Some(20), None),
    (Codec::CN, Some(MediaKind::Audio), 32_000, 106, Some(1), None, None),
    (Codec::CN, Some(MediaKind::Audio), 16_000, 105, Some(1), None, None),
    (Codec::CN, Some(MediaKind::Audio), 8_000, 13, Some(1), None, None),
    (Codec::TelephoneEvent, Some(MediaKind::Audio), 8_000, 126, None, None, None),
    (Codec::Vp8, Some(MediaKind::Video), 90_000, 100, None, None, None),
    (Codec::Vp9, Some(MediaKind::Video), 90_000, 99, None, None, None),
    (Codec::H264, Some(MediaKind::Video), 90_000, 98, None, None, None),
    (Codec::Rtx, None, 90_000, 115, None, None, None),
    (Codec::Red, None, 90_000, 116, None, None, None),
    (Codec::Ulpfec, None, 90_000, 117, None, None, None),
];

const VIDEO_FEEDBACK: &[(&str, Option<&str>)] = &[
    ("goog-remb", None),
    ("nack", Some("pli")),
    ("ccm", Some("fir")),
    ("nack", Some("rpsi")),
    ("ccm", Some("tmmbr")),
];

const EXTENSIONS: &[(Extension, u8)] = &[
    (Extension::RtpMid, 1),
    (Extension::RtpStreamId, 2),
    (Extension::AudioLevel, 3),
    (Extension::CsrcAudioLevels, 4),
    (Extension::FrameMarking, 5),
    (Extension::VideoOrientation, 6),
    (Extension::VideoOrientation6, 7),
];

impl Capabilities {
    /// Everything the receiver can take, optionally limited to one media kind.
    pub fn for_kind(kind: Option<MediaKind>) -> Self {
        let wanted = |k: Option<MediaKind>| match (kind, k) {
            (None, _) | (_, None) => true,
            (Some(a), Some(b)) => a == b,
        };

        let codecs = CODECS
            .iter()
            .filter(|c| wanted(c.1))
            .filter(|c| {
                // Resends and FEC only make sense for video.
                c.1.is_some() || kind != Some(MediaKind::Audio)
            })
            .map(|&(codec, k, clock_rate, pt, channels, ptime, max_ptime)| {
                let feedback = if k == Some(MediaKind::Video) {
                    VIDEO_FEEDBACK
                        .iter()
                        .map(|(t, p)| RtcpFeedback {
                            kind: t.to_string(),
                            parameter: p.map(|p| p.to_string()),
                        })
                        .collect()
                } else {
                    vec![]
                };

                CodecCapability {
                    codec,
                    kind: k,
                    clock_rate,
                    preferred_pt: pt.into(),
                    channels,
                    max_ptime,
                    ptime,
                    feedback,
                }
            })
            .collect();

        let mut header_extensions = vec![];
        for (ext, id) in EXTENSIONS {
            for k in [MediaKind::Audio, MediaKind::Video] {
                if !wanted(Some(k)) {
                    continue;
                }
                let applies = match k {
                    MediaKind::Audio => ext.is_audio(),
                    MediaKind::Video => ext.is_video(),
                };
                if applies {
                    header_extensions.push(HeaderExtensionCapability {
                        kind: k,
                        uri: ext.as_uri().to_string(),
                        preferred_id: *id,
                        preferred_encrypt: false,
                    });
                }
            }
        }

        let fec_mechanisms = if kind == Some(MediaKind::Audio) {
            vec![]
        } else {
            [FecMechanism::Red, FecMechanism::RedUlpfec]
                .iter()
                .map(|m| m.as_str().to_string())
                .collect()
        };

        Capabilities {
            codecs,
            header_extensions,
            fec_mechanisms,
        }
    }
}
