//! The collaborators a [`Receiver`][crate::Receiver] talks to.
//!
//! The receiver itself does no IO. Decryption, parsing, decoding and sending all
//! happen behind these traits.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::format::{MediaKind, Parameters};
use crate::rtp::{ChannelId, Mid, Pt, ReceiverId, Rid, RtcpPacket, RtpPacket, Ssrc};

/// ICE component a packet travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// The RTP component (also RTCP when muxed).
    Rtp,
    /// The separate RTCP component.
    Rtcp,
}

/// State of a secure transport as seen by channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// Not yet connected.
    Pending,
    /// Connected, packets flow.
    Connected,
    /// Lost connectivity, might come back.
    Disconnected,
    /// Gone for good. A channel hears nothing after this.
    Closed,
}

impl TransportState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            TransportState::Pending => 0,
            TransportState::Connected => 1,
            TransportState::Disconnected => 2,
            TransportState::Closed => 3,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => TransportState::Pending,
            1 => TransportState::Connected,
            2 => TransportState::Disconnected,
            _ => TransportState::Closed,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportState::Pending => "pending",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// A transport that decrypts incoming packets and encrypts outgoing ones.
pub trait SecureTransport: Send + Sync {
    /// Current state of the transport.
    fn state(&self) -> TransportState;

    /// Encrypt and send an RTCP packet. Returns `false` if it couldn't be sent.
    fn send_rtcp(&self, via: Component, buf: &[u8]) -> bool;
}

/// Routes traffic from a transport to the receivers registered on it.
pub trait Listener: Send {
    /// Register a receiver for a media kind and set of parameters.
    ///
    /// Called every time the receiver's parameters change.
    fn register_receiver(&mut self, receiver: ReceiverId, kind: MediaKind, params: &Parameters);

    /// Forget a receiver.
    fn unregister_receiver(&mut self, receiver: ReceiverId);

    /// RTCP packets seen so far, handed to channels that start late.
    fn historical_rtcp(&self) -> Vec<RtcpPacket>;

    /// Notification of an RTP packet the receiver could not route (yet).
    fn notify_unhandled(&mut self, receiver: ReceiverId, unhandled: Unhandled);
}

/// What could be told about an unroutable packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unhandled {
    /// Mux id (MID) header extension, if present and registered.
    pub mux_id: Option<Mid>,
    /// RTP stream id header extension, if present and registered.
    pub rid: Option<Rid>,
    /// SSRC of the packet.
    pub ssrc: Ssrc,
    /// Payload type of the packet.
    pub pt: Pt,
}

/// A decode pipeline for one encoding group.
///
/// All calls come from the receiver's owner, except `handle_rtcp` that can come
/// from whoever holds a [`ChannelSetHandle`][crate::ChannelSetHandle].
pub trait Channel: Send + Sync {
    /// Take an RTP packet. Returns whether the packet was accepted.
    fn handle_rtp(&self, packet: RtpPacket) -> bool;

    /// Take an RTCP packet. Returns whether the packet was of interest.
    fn handle_rtcp(&self, packet: &RtcpPacket) -> bool;

    /// Take RTCP packets received before the channel existed.
    fn handle_historical_rtcp(&self, packets: &[RtcpPacket]);

    /// The negotiated parameters changed.
    fn update(&self, params: &Parameters);

    /// The transport state changed.
    fn notify_transport_state(&self, state: TransportState);
}

/// The channel a track should render.
#[derive(Clone)]
pub struct ActiveChannel {
    /// Logical id of the channel.
    pub id: ChannelId,
    /// The channel itself.
    pub channel: Arc<dyn Channel>,
}

impl fmt::Debug for ActiveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveChannel").field("id", &self.id).finish()
    }
}

/// The media sink of a receiver.
pub trait MediaStreamTrack: Send {
    /// The channel to render changed. `None` when there is no channel.
    fn notify_active_channel(&mut self, active: Option<ActiveChannel>);
}

/// Creates tracks and channels.
pub trait MediaEngine: Send + Sync {
    /// Create the track for a receiver.
    fn create_track(&self, kind: MediaKind) -> Box<dyn MediaStreamTrack>;

    /// Create an audio channel.
    fn create_audio_channel(&self, setup: ChannelSetup<'_>) -> Arc<dyn Channel>;

    /// Create a video channel.
    fn create_video_channel(&self, setup: ChannelSetup<'_>) -> Arc<dyn Channel>;
}

/// Everything a new channel starts from.
pub struct ChannelSetup<'a> {
    /// Logical channel id.
    pub id: ChannelId,
    /// The negotiated parameters of the channel.
    pub params: &'a Parameters,
    /// RTCP received before the channel was created.
    pub historical_rtcp: &'a [RtcpPacket],
    /// For sending RTCP (receiver reports, NACK etc).
    pub rtcp_sender: RtcpSender,
}

/// Shared media engine passed to every receiver.
///
/// Cloning is cheap, all clones share the same engine.
#[derive(Clone)]
pub struct MediaContext {
    engine: Arc<dyn MediaEngine>,
}

impl MediaContext {
    /// Wrap an engine.
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        MediaContext { engine }
    }

    pub(crate) fn create_track(&self, kind: MediaKind) -> Box<dyn MediaStreamTrack> {
        self.engine.create_track(kind)
    }

    pub(crate) fn create_channel(
        &self,
        kind: MediaKind,
        setup: ChannelSetup<'_>,
    ) -> Arc<dyn Channel> {
        match kind {
            MediaKind::Audio => self.engine.create_audio_channel(setup),
            MediaKind::Video => self.engine.create_video_channel(setup),
        }
    }
}

impl fmt::Debug for MediaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaContext").finish()
    }
}

/// Handle for channels to send RTCP through the receiver's current transport.
///
/// Sending never touches the receiver itself. After the receiver stops, or while it has
/// no transport, sends are refused.
#[derive(Clone, Default)]
pub struct RtcpSender {
    inner: Arc<RtcpSenderInner>,
}

#[derive(Default)]
struct RtcpSenderInner {
    stopped: AtomicBool,
    route: ArcSwapOption<RtcpRoute>,
}

struct RtcpRoute {
    transport: Arc<dyn SecureTransport>,
    component: Component,
}

impl RtcpSender {
    /// Send an RTCP packet. Returns `false` if it couldn't be sent.
    pub fn send(&self, buf: &[u8]) -> bool {
        if self.inner.stopped.load(Ordering::Acquire) {
            trace!("Drop RTCP send, receiver stopped");
            return false;
        }

        let route = self.inner.route.load();
        let Some(route) = &*route else {
            trace!("Drop RTCP send, no transport");
            return false;
        };

        route.transport.send_rtcp(route.component, buf)
    }

    pub(crate) fn set_route(&self, transport: Option<Arc<dyn SecureTransport>>, component: Component) {
        let route = transport.map(|transport| Arc::new(RtcpRoute {
            transport,
            component,
        }));
        self.inner.route.store(route);
    }

    pub(crate) fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.route.store(None);
    }
}

impl fmt::Debug for RtcpSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtcpSender")
            .field("stopped", &self.inner.stopped.load(Ordering::Relaxed))
            .finish()
    }
}
