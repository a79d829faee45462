use super::Ssrc;

/// An already decrypted and parsed compound RTCP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpPacket {
    /// The individual reports in the compound packet.
    pub items: Vec<Rtcp>,
}

/// One report of a compound RTCP packet.
///
/// Only the reports the receiver acts on are broken out. Everything else is passed on
/// to the channels untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rtcp {
    /// Sender report (PT 200).
    SenderReport(SenderReport),
    /// Goodbye (PT 203).
    Goodbye(Goodbye),
    /// Any other report, kept opaque.
    Other {
        /// RTCP packet type.
        packet_type: u8,
        /// The report bytes, header included.
        data: Vec<u8>,
    },
}

/// The part of a sender report the receiver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderReport {
    /// The sender's SSRC.
    pub ssrc: Ssrc,
    /// NTP timestamp of the report.
    pub ntp_time: u64,
    /// RTP timestamp corresponding to `ntp_time`.
    pub rtp_time: u32,
}

/// A BYE, telling the listed sources are leaving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goodbye {
    /// Sources leaving.
    pub reports: Vec<Ssrc>,
    /// Optional reason.
    pub reason: Option<String>,
}

impl RtcpPacket {
    /// Wrap reports into a compound packet.
    pub fn new(items: Vec<Rtcp>) -> Self {
        RtcpPacket { items }
    }

    /// All SSRCs named by BYE reports.
    pub fn goodbyes(&self) -> impl Iterator<Item = Ssrc> + '_ {
        self.items
            .iter()
            .filter_map(|i| match i {
                Rtcp::Goodbye(g) => Some(g.reports.iter().copied()),
                _ => None,
            })
            .flatten()
    }

    /// All sender reports.
    pub fn sender_reports(&self) -> impl Iterator<Item = &SenderReport> + '_ {
        self.items.iter().filter_map(|i| match i {
            Rtcp::SenderReport(sr) => Some(sr),
            _ => None,
        })
    }
}
