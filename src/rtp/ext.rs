use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Mid, Rid};

/// RTP header extensions this crate knows by URI.
///
/// Only a few of them are acted upon when routing packets, see [`Extension::is_routing`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Extension {
    /// <urn:ietf:params:rtp-hdrext:sdes:mid>
    ///
    /// The mux id, identifying which negotiated media section a packet belongs to.
    RtpMid,
    /// <urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id>
    ///
    /// UTF8 encoded identifier for the RTP stream. Lets a receiver tell simulcast
    /// layers apart before their SSRC is known.
    RtpStreamId,
    /// <urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id>
    RepairedRtpStreamId,
    /// <urn:ietf:params:rtp-hdrext:ssrc-audio-level>
    ///
    /// Client-to-mixer audio level of the packet's own SSRC.
    AudioLevel,
    /// <urn:ietf:params:rtp-hdrext:csrc-audio-level>
    ///
    /// Mixer-to-client audio levels, one per CSRC in the packet.
    CsrcAudioLevels,
    /// <urn:ietf:params:rtp-hdrext:framemarking>
    FrameMarking,
    /// <urn:3gpp:video-orientation>
    VideoOrientation,
    /// <urn:3gpp:video-orientation:6>
    VideoOrientation6,
    /// <http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time>
    AbsoluteSendTime,
    /// <http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01>
    TransportSequenceNumber,
    /// Any URI not in the list above.
    UnknownUri(String),
}

/// Mapping of extension URI to our enum
const EXT_URI: &[(Extension, &str)] = &[
    (Extension::RtpMid, "urn:ietf:params:rtp-hdrext:sdes:mid"),
    (
        Extension::RtpStreamId,
        "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id",
    ),
    (
        Extension::RepairedRtpStreamId,
        "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id",
    ),
    (
        Extension::AudioLevel,
        "urn:ietf:params:rtp-hdrext:ssrc-audio-level",
    ),
    (
        Extension::CsrcAudioLevels,
        "urn:ietf:params:rtp-hdrext:csrc-audio-level",
    ),
    (
        Extension::FrameMarking,
        "urn:ietf:params:rtp-hdrext:framemarking",
    ),
    (
        Extension::VideoOrientation, //
        "urn:3gpp:video-orientation",
    ),
    (
        Extension::VideoOrientation6, //
        "urn:3gpp:video-orientation:6",
    ),
    (
        Extension::AbsoluteSendTime,
        "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time",
    ),
    (
        Extension::TransportSequenceNumber,
        "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01",
    ),
];

impl Extension {
    /// Parses an extension from a URI. Never fails, unknown URIs are kept as is.
    pub fn from_uri(uri: &str) -> Self {
        for (t, known) in EXT_URI.iter() {
            if *known == uri {
                return t.clone();
            }
        }

        Extension::UnknownUri(uri.to_string())
    }

    /// The URI of the extension.
    pub fn as_uri(&self) -> &str {
        for (t, known) in EXT_URI.iter() {
            if t == self {
                return known;
            }
        }

        match self {
            Extension::UnknownUri(uri) => uri,
            _ => unreachable!("all known extensions are in EXT_URI"),
        }
    }

    /// Whether the receiver reads this extension when routing packets.
    ///
    /// Everything else is filtered out at registration.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            Extension::RtpMid
                | Extension::RtpStreamId
                | Extension::AudioLevel
                | Extension::CsrcAudioLevels
        )
    }

    pub(crate) fn is_audio(&self) -> bool {
        use Extension::*;
        matches!(
            self,
            RtpMid | RtpStreamId | AudioLevel | CsrcAudioLevels | AbsoluteSendTime
        )
    }

    pub(crate) fn is_video(&self) -> bool {
        use Extension::*;
        matches!(
            self,
            RtpMid
                | RtpStreamId
                | RepairedRtpStreamId
                | FrameMarking
                | VideoOrientation
                | VideoOrientation6
                | AbsoluteSendTime
                | TransportSequenceNumber
        )
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_uri())
    }
}

/// The header extension form, given by the "defined by profile" field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionsForm {
    /// One byte header extension, `0xbede`. IDs 1-14, values 1-16 bytes.
    OneByte = 0xBEDE,
    /// Two byte header extension, `0x100x`. IDs 1-255, values 0-255 bytes.
    TwoByte = 0x1000,
}

impl ExtensionsForm {
    pub(crate) fn as_u16(&self) -> u16 {
        *self as u16
    }

    pub(crate) fn parse(profile: u16) -> Option<Self> {
        if profile == ExtensionsForm::OneByte.as_u16() {
            Some(ExtensionsForm::OneByte)
        // Ignore the app bits
        } else if (profile & 0xFFF0) == ExtensionsForm::TwoByte.as_u16() {
            Some(ExtensionsForm::TwoByte)
        } else {
            None
        }
    }
}

/// Walks the elements of a header extension block.
///
/// Every id/length pair is checked against the remaining bytes. Iteration stops at the
/// first element that doesn't fit, so a malformed block yields only the elements
/// before the damage.
pub struct ExtensionIter<'a> {
    form: ExtensionsForm,
    buf: &'a [u8],
}

impl<'a> ExtensionIter<'a> {
    pub(crate) fn new(profile: u16, buf: &'a [u8]) -> Self {
        match ExtensionsForm::parse(profile) {
            Some(form) => ExtensionIter { form, buf },
            None => {
                if !buf.is_empty() {
                    trace!("Unknown header extension profile: {:#06x}", profile);
                }
                ExtensionIter {
                    form: ExtensionsForm::OneByte,
                    buf: &[],
                }
            }
        }
    }
}

impl<'a> Iterator for ExtensionIter<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.buf.is_empty() {
                return None;
            }

            if self.buf[0] == 0 {
                // padding
                self.buf = &self.buf[1..];
                continue;
            }

            let (id, len) = match self.form {
                ExtensionsForm::OneByte => {
                    let id = self.buf[0] >> 4;
                    let len = (self.buf[0] & 0xf) as usize + 1;

                    if id == 15 {
                        // Reserved. Processing of the block terminates here.
                        self.buf = &[];
                        return None;
                    }

                    self.buf = &self.buf[1..];
                    (id, len)
                }
                ExtensionsForm::TwoByte => {
                    if self.buf.len() < 2 {
                        trace!("Not enough ext header len: {} < {}", self.buf.len(), 2);
                        self.buf = &[];
                        return None;
                    }
                    let id = self.buf[0];
                    let len = self.buf[1] as usize;
                    self.buf = &self.buf[2..];
                    (id, len)
                }
            };

            if self.buf.len() < len {
                trace!("Not enough type ext len: {} < {}", self.buf.len(), len);
                self.buf = &[];
                return None;
            }

            let value = &self.buf[..len];
            self.buf = &self.buf[len..];

            return Some((id, value));
        }
    }
}

/// Values read from the routing-relevant header extensions of one packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionValues {
    /// Mux id (MID).
    pub mid: Option<Mid>,
    /// RTP stream id (RID).
    pub rid: Option<Rid>,
    /// Client-to-mixer audio level in -dBov, and the voice activity flag.
    pub audio_level: Option<(i8, bool)>,
    /// Mixer-to-client levels in -dBov, in CSRC order.
    pub csrc_audio_levels: Vec<i8>,
}

/// Header extension ids registered for reception.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionMap(BTreeMap<u8, Extension>);

impl ExtensionMap {
    /// An empty map.
    pub fn empty() -> Self {
        ExtensionMap(BTreeMap::new())
    }

    /// Register an extension for an id.
    pub fn set(&mut self, id: u8, ext: Extension) {
        self.0.insert(id, ext);
    }

    /// Look up the extension registered for an id.
    pub fn lookup(&self, id: u8) -> Option<&Extension> {
        self.0.get(&id)
    }

    /// Remove all registrations.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Tells if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read the routing-relevant values out of a raw extension block.
    pub fn parse(&self, profile: u16, buf: &[u8]) -> ExtensionValues {
        let mut vals = ExtensionValues::default();

        if self.is_empty() {
            return vals;
        }

        for (id, value) in ExtensionIter::new(profile, buf) {
            let Some(ext) = self.lookup(id) else {
                continue;
            };

            match ext {
                Extension::RtpMid => vals.mid = Mid::parse(value),
                Extension::RtpStreamId => vals.rid = Rid::parse(value),
                Extension::AudioLevel => {
                    if let Some(b) = value.first() {
                        vals.audio_level = Some((-(0x7f & *b as i8), *b & 0x80 > 0));
                    }
                }
                Extension::CsrcAudioLevels => {
                    vals.csrc_audio_levels = value.iter().map(|b| -(0x7f & *b as i8)).collect();
                }
                _ => {}
            }
        }

        vals
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn map() -> ExtensionMap {
        let mut m = ExtensionMap::empty();
        m.set(1, Extension::RtpMid);
        m.set(3, Extension::RtpStreamId);
        m.set(5, Extension::AudioLevel);
        m.set(6, Extension::CsrcAudioLevels);
        m
    }

    #[test]
    fn uri_mapping() {
        assert_eq!(
            Extension::from_uri("urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id"),
            Extension::RtpStreamId
        );
        assert_eq!(
            Extension::from_uri("urn:example:foo"),
            Extension::UnknownUri("urn:example:foo".into())
        );
        assert_eq!(
            Extension::CsrcAudioLevels.as_uri(),
            "urn:ietf:params:rtp-hdrext:csrc-audio-level"
        );
        assert!(Extension::RtpStreamId.is_routing());
        assert!(!Extension::FrameMarking.is_routing());
    }

    #[test]
    fn parse_one_byte_form() {
        // mid "0", padding, rid "lo", audio level 0x85 (voice, -5)
        let buf = [0x10, b'0', 0x00, 0x31, b'l', b'o', 0x50, 0x85];
        let v = map().parse(0xbede, &buf);
        assert_eq!(v.mid, Some("0".into()));
        assert_eq!(v.rid, Some("lo".into()));
        assert_eq!(v.audio_level, Some((-5, true)));
    }

    #[test]
    fn parse_two_byte_form() {
        let buf = [3, 2, b'h', b'i', 6, 3, 10, 20, 30];
        let v = map().parse(0x1000, &buf);
        assert_eq!(v.rid, Some("hi".into()));
        assert_eq!(v.csrc_audio_levels, vec![-10, -20, -30]);
    }

    #[test]
    fn id_15_terminates() {
        let buf = [0xf0, 0x31, b'l', b'o'];
        let v = map().parse(0xbede, &buf);
        assert_eq!(v.rid, None);
    }

    #[test]
    fn truncated_element_is_dropped() {
        // mid ok, then rid claims 4 bytes but only 2 remain.
        let buf = [0x10, b'0', 0x33, b'l', b'o'];
        let items: Vec<_> = ExtensionIter::new(0xbede, &buf).collect();
        assert_eq!(items, vec![(1, &b"0"[..])]);

        // two byte header cut short
        let items: Vec<_> = ExtensionIter::new(0x1000, &[3]).collect();
        assert!(items.is_empty());

        // two byte value longer than the buffer
        let items: Vec<_> = ExtensionIter::new(0x1000, &[3, 200, b'x']).collect();
        assert!(items.is_empty());
    }

    #[test]
    fn unknown_profile_yields_nothing() {
        let buf = [0x31, b'l', b'o'];
        assert_eq!(ExtensionIter::new(0x1234, &buf).count(), 0);
    }

    #[test]
    fn unregistered_ids_ignored() {
        let buf = [0x21, b'l', b'o'];
        let v = map().parse(0xbede, &buf);
        assert_eq!(v, ExtensionValues::default());
    }
}
