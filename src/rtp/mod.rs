//! RTP and RTCP packet model, identifiers and header extensions.

mod id;
pub use id::{ChannelId, Mid, Pt, ReceiverId, Rid, Ssrc};

mod ext;
pub use ext::{Extension, ExtensionIter, ExtensionMap, ExtensionValues, ExtensionsForm};

mod packet;
pub use packet::RtpPacket;

mod rtcp;
pub use rtcp::{Goodbye, Rtcp, RtcpPacket, SenderReport};
