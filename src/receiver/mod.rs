//! The receiver and its channel bookkeeping.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ReceiverConfig;
use crate::context::{ActiveChannel, Component, Listener, MediaContext, MediaStreamTrack};
use crate::context::{RtcpSender, SecureTransport, TransportState, Unhandled};
use crate::format::{calculate_delta, split_into_channels, Capabilities, MediaKind};
use crate::format::{FecParameters, ParameterError, Parameters, RtxParameters};
use crate::rtp::{ChannelId, Extension, ExtensionMap, ExtensionValues, ReceiverId, Ssrc};
use crate::rtp::{RtcpPacket, RtpPacket};
use crate::util::{already_happened, half, Soonest};
use crate::ReceiverError;

mod buffer;
use buffer::PacketBuffer;

mod channel;
use channel::{ssrcs_of, ChannelRegistry, InfoKey};
pub use channel::{ChannelHolder, ChannelSet, ChannelSetHandle};

mod csrc;
pub use csrc::ContributingSource;
use csrc::ContributingSources;

mod resolve;

mod table;
use table::{RidTable, SsrcTable};

/// Lifecycle of a [`Receiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverState {
    /// Created, not yet driven by time.
    Pending,
    /// Up and running.
    Ready,
    /// Stopping.
    ShuttingDown,
    /// Stopped. There is no way back.
    Shutdown,
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReceiverState::Pending => "pending",
            ReceiverState::Ready => "ready",
            ReceiverState::ShuttingDown => "shutting down",
            ReceiverState::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// Receive side of one media track.
///
/// Routes incoming RTP packets to channels, creating channels as traffic shows up,
/// and passes incoming RTCP to all of them.
///
/// The receiver does no IO and has no internal threads. Time is driven from the
/// outside: every call that depends on time takes a `now`, and the receiver tells
/// when it next needs attention through [`Receiver::poll_timeout`].
///
/// ```no_run
/// # use rtp_receiver::Receiver;
/// # fn run(mut receiver: Receiver) {
/// loop {
///     let Some(timeout) = receiver.poll_timeout() else {
///         break;
///     };
///     // Sleep until timeout, unless packets arrive.
///     receiver.handle_timeout(timeout);
/// }
/// # }
/// ```
pub struct Receiver {
    id: ReceiverId,
    config: ReceiverConfig,
    context: MediaContext,
    listener: Box<dyn Listener>,
    rtp_transport: Option<Arc<dyn SecureTransport>>,
    rtcp_transport: Option<Arc<dyn SecureTransport>>,
    rtcp_sender: RtcpSender,

    state: ReceiverState,
    kind: Option<MediaKind>,
    track: Option<Box<dyn MediaStreamTrack>>,
    params: Option<Parameters>,
    params_hash: u64,

    registry: ChannelRegistry,
    extensions: ExtensionMap,
    ssrcs: SsrcTable,
    rids: RidTable,
    buffer: PacketBuffer,
    csrcs: ContributingSources,

    active: Option<InfoKey>,
    last_switch: Option<Instant>,
    last_transport_state: TransportState,

    /// Buffered packets should be retried.
    reattempt: bool,
    /// The published channel set should be rid of dead references.
    clean: bool,
    /// A step is due on the next timeout.
    wake: bool,

    next_ssrc_sweep: Option<Instant>,
    next_csrc_sweep: Option<Instant>,
    last_now: Instant,
}

impl Receiver {
    /// Creates a new receiver with default config.
    ///
    /// When `rtcp_transport` is `None`, RTCP is muxed on the RTP transport.
    pub fn new(
        context: MediaContext,
        listener: Box<dyn Listener>,
        rtp_transport: Arc<dyn SecureTransport>,
        rtcp_transport: Option<Arc<dyn SecureTransport>>,
    ) -> Self {
        ReceiverConfig::default().build(context, listener, rtp_transport, rtcp_transport)
    }

    pub(crate) fn new_from_config(
        config: ReceiverConfig,
        context: MediaContext,
        listener: Box<dyn Listener>,
        rtp_transport: Arc<dyn SecureTransport>,
        rtcp_transport: Option<Arc<dyn SecureTransport>>,
    ) -> Self {
        let id = ReceiverId::new();
        let buffer = PacketBuffer::new(config.max_buffered_packets, config.max_packet_age);

        let mut r = Receiver {
            id,
            config,
            context,
            listener,
            rtp_transport: Some(rtp_transport),
            rtcp_transport,
            rtcp_sender: RtcpSender::default(),
            state: ReceiverState::Pending,
            kind: None,
            track: None,
            params: None,
            params_hash: 0,
            registry: ChannelRegistry::new(),
            extensions: ExtensionMap::empty(),
            ssrcs: SsrcTable::default(),
            rids: RidTable::default(),
            buffer,
            csrcs: ContributingSources::default(),
            active: None,
            last_switch: None,
            last_transport_state: TransportState::Pending,
            reattempt: false,
            clean: false,
            wake: true,
            next_ssrc_sweep: None,
            next_csrc_sweep: None,
            last_now: already_happened(),
        };

        let (transport, component) = r.rtcp_route();
        r.rtcp_sender.set_route(transport, component);

        debug!("Created receiver {}", id);

        r
    }

    /// Identity of this receiver towards the listener.
    pub fn id(&self) -> ReceiverId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Media kind, known after the first successful [`Receiver::receive`].
    pub fn kind(&self) -> Option<MediaKind> {
        self.kind
    }

    /// The current receive parameters.
    pub fn parameters(&self) -> Option<&Parameters> {
        self.params.as_ref()
    }

    /// Number of packets waiting for a channel.
    pub fn buffered_packets(&self) -> usize {
        self.buffer.len()
    }

    /// The channel the track currently renders.
    pub fn active_channel(&self) -> Option<ChannelId> {
        self.active
            .and_then(|k| self.registry.holder(k))
            .map(|h| h.id())
    }

    /// Shared access to the live channels, for instance to broadcast RTCP from
    /// another thread.
    pub fn channels(&self) -> ChannelSetHandle {
        self.registry.handle()
    }

    /// What a receiver can receive, optionally for one media kind.
    pub fn capabilities(kind: Option<MediaKind>) -> Capabilities {
        Capabilities::for_kind(kind)
    }

    /// Contributing sources seen within the CSRC expiry.
    pub fn contributing_sources(&self) -> Vec<ContributingSource> {
        self.csrcs.snapshot()
    }

    /// Set or change the receive parameters.
    ///
    /// The first call decides the media kind from the codecs. Identical parameters
    /// are a no-op. On error nothing is changed.
    pub fn receive(&mut self, params: Parameters) -> Result<(), ReceiverError> {
        if matches!(
            self.state,
            ReceiverState::ShuttingDown | ReceiverState::Shutdown
        ) {
            return Err(ReceiverError::Shutdown);
        }

        params.validate()?;

        let found = params.media_kind()?;
        let kind = match (self.kind, found) {
            (Some(k), Some(f)) if k != f => {
                return Err(ParameterError::MediaKindChanged(k, f).into());
            }
            (Some(k), _) => k,
            (None, Some(f)) => f,
            (None, None) => return Err(ParameterError::UnknownMediaKind.into()),
        };

        let hash = params.content_hash();
        if self.params.is_some() && self.params_hash == hash && self.params.as_ref() == Some(&params) {
            trace!("Receiver {} parameters unchanged", self.id);
            return Ok(());
        }

        if self.track.is_none() {
            debug!("Receiver {} is {}", self.id, kind);
            self.kind = Some(kind);
            self.track = Some(self.context.create_track(kind));
        }

        let groups = split_into_channels(&params);

        if self.params.is_none() {
            let mut keys = vec![];
            for g in groups {
                keys.push(self.add_channel(g));
            }
            self.registry.set_negotiated(keys);
            self.params = Some(params);
        } else {
            let was_latch_all = self.should_latch_all();

            let (old_keys, delta) = {
                let old: Vec<(InfoKey, &Parameters)> = self
                    .registry
                    .negotiated_infos()
                    .map(|i| (i.key, &i.original))
                    .collect();
                let old_params: Vec<&Parameters> = old.iter().map(|(_, p)| *p).collect();
                let delta = calculate_delta(&old_params, &groups);
                let old_keys: Vec<InfoKey> = old.iter().map(|(k, _)| *k).collect();
                (old_keys, delta)
            };

            for oi in &delta.removed {
                self.remove_channel(old_keys[*oi]);
            }

            let mut new_keys: Vec<Option<InfoKey>> = vec![None; groups.len()];

            for (oi, ni) in &delta.unchanged {
                new_keys[*ni] = Some(old_keys[*oi]);
            }

            for (oi, ni) in &delta.updated {
                let key = old_keys[*oi];
                self.update_channel(key, groups[*ni].clone());
                new_keys[*ni] = Some(key);
            }

            for ni in &delta.added {
                new_keys[*ni] = Some(self.add_channel(groups[*ni].clone()));
            }

            self.registry
                .set_negotiated(new_keys.into_iter().flatten().collect());
            self.params = Some(params);

            let is_latch_all = self.should_latch_all();
            if was_latch_all && (!is_latch_all || !delta.removed.is_empty()) {
                self.flush_all_auto_latched();
            }

            self.reattempt_delivery();
        }

        self.params_hash = hash;

        if let Some(params) = &self.params {
            self.listener.register_receiver(self.id, kind, params);
        }
        self.register_header_extensions();
        self.release_unreferenced();

        Ok(())
    }

    /// Stop the receiver. Every channel is told the transport closed.
    ///
    /// Calling stop more than once does nothing.
    pub fn stop(&mut self) {
        self.cancel();
    }

    /// Take an incoming, decrypted RTP packet.
    ///
    /// Returns `false` if the packet was dropped.
    pub fn handle_rtp(&mut self, now: Instant, via: Component, packet: RtpPacket) -> bool {
        self.init_time(now);

        if self.state == ReceiverState::Shutdown {
            debug!("Drop RTP SSRC {} after shutdown", packet.ssrc);
            return false;
        }

        trace!("Handle RTP SSRC: {} PT: {} via {:?}", packet.ssrc, packet.pt, via);

        let vals = self.extensions.parse(packet.ext_profile, &packet.ext_data);

        let result = match self.resolve(now, &packet, &vals) {
            Some(key) => self.deliver(now, key, packet, &vals),
            None => {
                if self.state == ReceiverState::ShuttingDown {
                    false
                } else {
                    let unhandled = Unhandled {
                        mux_id: vals.mid,
                        rid: vals.rid,
                        ssrc: packet.ssrc,
                        pt: packet.pt,
                    };
                    trace!("Buffer RTP SSRC: {}", packet.ssrc);
                    self.buffer.push(now, packet);
                    self.listener.notify_unhandled(self.id, unhandled);
                    true
                }
            }
        };

        self.release_unreferenced();

        result
    }

    /// Take an incoming, decrypted RTCP packet.
    ///
    /// Sender reports keep SSRCs alive, BYEs forget discovered SSRCs. The packet is
    /// then given to every channel. Returns whether any channel was interested.
    pub fn handle_rtcp(&mut self, now: Instant, via: Component, packet: RtcpPacket) -> bool {
        self.init_time(now);

        if self.state == ReceiverState::Shutdown {
            return false;
        }

        trace!("Handle RTCP ({} items) via {:?}", packet.items.len(), via);

        self.process_sender_reports(now, &packet);
        self.process_byes(&packet);

        let (handled, dirty) = self.registry.snapshot().broadcast_rtcp(&packet);
        if dirty {
            self.clean_channels();
        }

        self.release_unreferenced();

        handled
    }

    /// The transport state changed. Channels are told the new state.
    pub fn handle_transport_state_change(&mut self) {
        self.notify_channels_of_transport_state();
    }

    /// Move the receiver to another transport.
    ///
    /// The receiver re-registers with the new listener, and the channels get the RTCP
    /// the new listener has seen so far.
    pub fn set_transport(
        &mut self,
        listener: Box<dyn Listener>,
        rtp_transport: Arc<dyn SecureTransport>,
        rtcp_transport: Option<Arc<dyn SecureTransport>>,
    ) {
        if matches!(
            self.state,
            ReceiverState::ShuttingDown | ReceiverState::Shutdown
        ) {
            warn!("Receiver {} set transport after shutdown", self.id);
            return;
        }

        if self.params.is_some() {
            self.listener.unregister_receiver(self.id);
        }

        self.listener = listener;
        self.rtp_transport = Some(rtp_transport);
        self.rtcp_transport = rtcp_transport;

        let (transport, component) = self.rtcp_route();
        self.rtcp_sender.set_route(transport, component);

        if let (Some(kind), Some(params)) = (self.kind, &self.params) {
            self.listener.register_receiver(self.id, kind, params);
        }

        let historical = self.listener.historical_rtcp();
        if !historical.is_empty() {
            for h in self.registry.holders() {
                h.handle_historical_rtcp(&historical);
            }
        }

        debug!("Receiver {} moved transport", self.id);

        self.notify_channels_of_transport_state();
    }

    /// When the receiver next needs [`Receiver::handle_timeout`].
    ///
    /// `None` once the receiver is shut down.
    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.state == ReceiverState::Shutdown {
            return None;
        }

        if self.wake || self.registry.is_dirty() {
            return Some(self.last_now);
        }

        self.next_ssrc_sweep.soonest(self.next_csrc_sweep)
    }

    /// Drive time forward: sweep stale SSRCs and CSRCs, and retry buffered packets.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.state == ReceiverState::Shutdown {
            return;
        }

        self.init_time(now);

        if self.next_ssrc_sweep.map(|t| now >= t).unwrap_or(false) {
            let count = self.ssrcs.expire(now, self.config.ssrc_timeout);
            if count > 0 {
                debug!("Expired {} SSRCs", count);
            }
            self.next_ssrc_sweep = now.checked_add(half(self.config.ssrc_timeout));
        }

        if self.next_csrc_sweep.map(|t| now >= t).unwrap_or(false) {
            self.csrcs.expire(now, self.config.csrc_expiry);
            self.next_csrc_sweep = now.checked_add(half(self.config.csrc_expiry));
        }

        if self.registry.is_dirty() {
            self.clean_channels();
        }

        if self.wake {
            self.step(now);
        }

        self.release_unreferenced();
    }

    fn init_time(&mut self, now: Instant) {
        self.last_now = now;

        if self.state == ReceiverState::Shutdown {
            return;
        }

        if self.next_ssrc_sweep.is_none() {
            self.next_ssrc_sweep = now.checked_add(half(self.config.ssrc_timeout));
        }
        if self.next_csrc_sweep.is_none() {
            self.next_csrc_sweep = now.checked_add(half(self.config.csrc_expiry));
        }
    }

    fn set_state(&mut self, state: ReceiverState) {
        if self.state == state {
            return;
        }
        debug!("Receiver {} state: {} -> {}", self.id, self.state, state);
        self.state = state;
    }

    fn reattempt_delivery(&mut self) {
        self.reattempt = true;
        self.wake = true;
    }

    fn clean_channels(&mut self) {
        self.clean = true;
        self.wake = true;
    }

    fn step(&mut self, now: Instant) {
        self.wake = false;

        if matches!(
            self.state,
            ReceiverState::ShuttingDown | ReceiverState::Shutdown
        ) {
            self.cancel();
            return;
        }

        self.step_attempt_delivery(now);
        self.step_clean_channels();

        self.set_state(ReceiverState::Ready);
    }

    fn step_attempt_delivery(&mut self, now: Instant) {
        if !self.reattempt {
            return;
        }
        self.reattempt = false;

        self.buffer.expire(now);

        // Delivering one packet can create the channel another one needs, so keep going
        // until a pass makes no progress.
        loop {
            let mut pending = self.buffer.take();
            if pending.is_empty() {
                break;
            }

            let mut progress = false;
            let mut left = VecDeque::new();

            while let Some(b) = pending.pop_front() {
                let vals = self.extensions.parse(b.packet.ext_profile, &b.packet.ext_data);
                match self.resolve(now, &b.packet, &vals) {
                    Some(key) => {
                        trace!("Deliver buffered RTP SSRC: {}", b.packet.ssrc);
                        progress = true;
                        self.deliver(now, key, b.packet, &vals);
                    }
                    None => left.push_back(b),
                }
            }

            self.buffer.restore(left);

            if !progress {
                break;
            }
        }
    }

    fn step_clean_channels(&mut self) {
        if !self.clean {
            return;
        }
        self.clean = false;
        self.registry.clean();
    }

    fn deliver(&mut self, now: Instant, key: InfoKey, packet: RtpPacket, vals: &ExtensionValues) -> bool {
        self.post_resolve(now, key, &packet, vals);

        let Some(holder) = self.registry.holder(key).cloned() else {
            return false;
        };

        holder.handle_rtp(packet)
    }

    /// Contributing sources and active channel switching for a routed packet.
    fn post_resolve(&mut self, now: Instant, key: InfoKey, packet: &RtpPacket, vals: &ExtensionValues) {
        let Some(info) = self.registry.info(key) else {
            return;
        };
        let Some(base) = info.filled.encodings.first() else {
            return;
        };
        if !base.active {
            return;
        }

        self.extract_csrcs(now, packet, vals);

        if self.active == Some(key) {
            return;
        }

        if self.active.is_some() {
            if let Some(t) = self.last_switch {
                // Too far out to represent means locked for good.
                let locked = t
                    .checked_add(self.config.lock_after_switch)
                    .map(|until| now < until)
                    .unwrap_or(true);
                if locked {
                    return;
                }
            }
        }

        let Some(holder) = self.registry.holder(key) else {
            return;
        };

        let active = ActiveChannel {
            id: holder.id(),
            channel: holder.channel().clone(),
        };

        debug!("Receiver {} active channel: {}", self.id, active.id);

        self.active = Some(key);
        self.last_switch = Some(now);

        if let Some(track) = &mut self.track {
            track.notify_active_channel(Some(active));
        }
    }

    fn extract_csrcs(&mut self, now: Instant, packet: &RtpPacket, vals: &ExtensionValues) {
        if let Some((level, voice)) = vals.audio_level {
            self.csrcs.set(now, packet.ssrc, level, Some(voice));
        }

        let n = vals.csrc_audio_levels.len().min(packet.csrc.len());
        for (csrc, level) in packet.csrc[..n].iter().zip(&vals.csrc_audio_levels[..n]) {
            self.csrcs.set(now, *csrc, *level, None);
        }
    }

    fn reset_active(&mut self) {
        if self.active.take().is_none() {
            return;
        }
        self.last_switch = None;

        debug!("Receiver {} no active channel", self.id);

        if let Some(track) = &mut self.track {
            track.notify_active_channel(None);
        }
    }

    fn should_latch_all(&self) -> bool {
        self.params
            .as_ref()
            .map(|p| p.should_latch_all())
            .unwrap_or(false)
    }

    fn add_channel(&mut self, params: Parameters) -> InfoKey {
        let id = self.registry.next_channel_id();
        let latch_all = params.should_latch_all();
        let rid = params.encodings.first().and_then(|e| e.rid);
        let ssrcs = ssrcs_of(&params);

        let key = self.registry.add(id, true, params.clone(), params);

        if !latch_all {
            if let Some(rid) = rid {
                self.rids.set(rid, key);
            }
            for ssrc in ssrcs {
                self.register_ssrc(key, ssrc);
            }
        }

        debug!(
            "Add channel {}{}",
            id,
            if latch_all { " (latch all)" } else { "" }
        );

        key
    }

    /// Bind a negotiated SSRC to a channel.
    fn register_ssrc(&mut self, key: InfoKey, ssrc: Ssrc) {
        let mut rid = self.registry.info(key).and_then(|i| i.rid());
        let mut holder = self.registry.holder(key).map(|_| key);

        self.set_ssrc_usage(self.last_now, ssrc, &mut rid, &mut holder);
        self.ssrcs.register(ssrc, key);

        // Negotiation trumps whatever the SSRC was bound to before.
        let own = self.registry.holder(key).map(|_| key);
        if let Some(info) = self.ssrcs.get_mut(ssrc) {
            info.holder = own;
        }
    }

    fn update_channel(&mut self, key: InfoKey, params: Parameters) {
        let new_ssrcs = ssrcs_of(&params);

        for ssrc in self.ssrcs.registered_to(key) {
            if !new_ssrcs.contains(&ssrc) {
                self.ssrcs.unregister(ssrc, key);
            }
        }

        let Some(info) = self.registry.info_mut(key) else {
            return;
        };

        let old_rid = info.rid();
        let old_original = std::mem::replace(&mut info.original, params.clone());
        let mut filled = params;

        // Values discovered from traffic carry over, unless now negotiated.
        for ((new, old), orig) in filled
            .encodings
            .iter_mut()
            .zip(info.filled.encodings.iter())
            .zip(old_original.encodings.iter())
        {
            if orig.ssrc.is_none() && new.ssrc.is_none() && old.ssrc.is_some() {
                new.ssrc = old.ssrc;
                if orig.codec_pt.is_none() && new.codec_pt.is_none() {
                    new.codec_pt = old.codec_pt;
                }
            }

            let old_rtx = old.rtx.as_ref().and_then(|r| r.ssrc);
            let orig_rtx = orig.rtx.as_ref().and_then(|r| r.ssrc);
            let new_rtx = new.rtx.as_ref().and_then(|r| r.ssrc);
            if orig_rtx.is_none() && new_rtx.is_none() && old_rtx.is_some() {
                let rtx = new.rtx.get_or_insert_with(RtxParameters::default);
                rtx.ssrc = old_rtx;
                if rtx.pt.is_none() {
                    rtx.pt = old.rtx.as_ref().and_then(|r| r.pt);
                }
            }

            let old_fec = old.fec.as_ref().and_then(|f| f.ssrc);
            let orig_fec = orig.fec.as_ref().and_then(|f| f.ssrc);
            let new_fec = new.fec.as_ref().and_then(|f| f.ssrc);
            if orig_fec.is_none() && new_fec.is_none() && old_fec.is_some() {
                new.fec.get_or_insert_with(FecParameters::default).ssrc = old_fec;
            }

            if orig.rid.is_none() && new.rid.is_none() {
                new.rid = old.rid;
            }
        }

        info.filled = filled;
        let id = info.id;
        let latch_all = info.should_latch_all();
        let new_rid = info.rid();

        if let Some(rid) = old_rid {
            if latch_all || new_rid != Some(rid) {
                self.rids.remove(rid);
            }
        }
        if let Some(rid) = new_rid {
            self.rids.set(rid, key);
        }

        if !latch_all {
            for ssrc in new_ssrcs {
                self.register_ssrc(key, ssrc);
            }
        }

        debug!("Update channel {}", id);

        if let (Some(holder), Some(info)) = (self.registry.holder(key), self.registry.info(key)) {
            holder.update(&info.original);
        }

        if latch_all {
            self.update_auto_latched(key, id);
        }
    }

    /// Latched channels follow the parameters of the latch-all channel they came from.
    fn update_auto_latched(&mut self, key: InfoKey, id: ChannelId) {
        let Some(base) = self.registry.info(key).map(|i| Parameters {
            encodings: vec![],
            ..i.original.clone()
        }) else {
            return;
        };

        for k in self.registry.keys_with_id(id) {
            let Some(info) = self.registry.info_mut(k) else {
                continue;
            };
            if info.negotiated {
                continue;
            }

            let encodings = std::mem::take(&mut info.filled.encodings);
            info.filled = Parameters {
                encodings,
                ..base.clone()
            };
            info.original = base.clone();

            if let Some(holder) = self.registry.holder(k) {
                holder.update(&base);
            }
        }
    }

    /// Tear down a channel, and every auto-latched channel sharing its id.
    fn remove_channel(&mut self, key: InfoKey) {
        let Some(info) = self.registry.info(key) else {
            return;
        };
        let id = info.id;
        let group = self.registry.keys_with_id(id);

        debug!("Remove channel {}", id);

        self.ssrcs.remove_where(|info, registered_to| {
            let routed = info.holder.map(|h| group.contains(&h)).unwrap_or(false);
            let registered = registered_to.map(|k| group.contains(&k)).unwrap_or(false);
            routed || registered
        });
        self.rids.remove_where(|k| group.contains(&k));

        if self.active.map(|k| group.contains(&k)).unwrap_or(false) {
            self.reset_active();
        }

        for holder in self.registry.remove_holders(|k| group.contains(&k)) {
            holder.notify(TransportState::Closed);
        }

        for k in group {
            self.registry.remove_info(k);
        }
    }

    /// Drop all runtime state from latching. Negotiated channels stay.
    fn flush_all_auto_latched(&mut self) {
        debug!("Receiver {} flush latched channels", self.id);

        self.reset_active();

        for holder in self.registry.remove_holders(|_| true) {
            holder.notify(TransportState::Closed);
        }

        self.ssrcs.clear_cached();

        let auto = self.registry.auto_latched();
        self.rids.remove_where(|k| auto.contains(&k));
        for k in auto {
            self.registry.remove_info(k);
        }
    }

    /// Drop runtime channels nothing routes to anymore.
    fn release_unreferenced(&mut self) {
        let mut referenced: HashSet<InfoKey> = self.ssrcs.holders().collect();
        referenced.extend(self.active);

        let gone = self.registry.remove_holders(|k| !referenced.contains(&k));
        if gone.is_empty() {
            return;
        }

        for holder in gone {
            debug!("Release channel {}", holder.id());
            holder.notify(TransportState::Closed);

            let key = holder.key();
            let negotiated = self
                .registry
                .info(key)
                .map(|i| i.negotiated)
                .unwrap_or(true);
            if !negotiated {
                self.rids.remove_where(|k| k == key);
                self.registry.remove_info(key);
            }
        }

        self.clean_channels();
    }

    fn process_sender_reports(&mut self, now: Instant, packet: &RtcpPacket) {
        for sr in packet.sender_reports() {
            if self.ssrcs.active(sr.ssrc).is_none() {
                continue;
            }
            if let Some(info) = self.ssrcs.get_mut(sr.ssrc) {
                trace!("Sender report refreshes SSRC {}", sr.ssrc);
                info.last_usage = now;
            }
        }
    }

    fn process_byes(&mut self, packet: &RtcpPacket) {
        let mut freed = false;

        for ssrc in packet.goodbyes() {
            if self.ssrcs.remove_cached(ssrc) {
                debug!("BYE for SSRC {}", ssrc);
            }

            for key in self.registry.negotiated().to_vec() {
                let Some(info) = self.registry.info_mut(key) else {
                    continue;
                };
                let id = info.id;

                for (f, o) in info
                    .filled
                    .encodings
                    .iter_mut()
                    .zip(info.original.encodings.iter())
                {
                    if o.ssrc.is_none() && f.ssrc == Some(ssrc) {
                        debug!("Channel {} forgets SSRC {}", id, ssrc);
                        f.ssrc = None;
                        if o.codec_pt.is_none() {
                            f.codec_pt = None;
                        }
                        freed = true;
                    }

                    let o_rtx = o.rtx.as_ref().and_then(|r| r.ssrc);
                    if let Some(rtx) = f.rtx.as_mut() {
                        if o_rtx.is_none() && rtx.ssrc == Some(ssrc) {
                            debug!("Channel {} forgets RTX SSRC {}", id, ssrc);
                            rtx.ssrc = None;
                            freed = true;
                        }
                    }

                    let o_fec = o.fec.as_ref().and_then(|f| f.ssrc);
                    if let Some(fec) = f.fec.as_mut() {
                        if o_fec.is_none() && fec.ssrc == Some(ssrc) {
                            debug!("Channel {} forgets FEC SSRC {}", id, ssrc);
                            fec.ssrc = None;
                            freed = true;
                        }
                    }
                }
            }
        }

        // Buffered packets might fit the freed slots.
        if freed {
            self.reattempt_delivery();
        }
    }

    fn register_header_extensions(&mut self) {
        self.extensions.clear();

        let Some(params) = &self.params else {
            return;
        };

        for e in &params.header_extensions {
            let ext = Extension::from_uri(&e.uri);
            let fits_kind = match self.kind {
                Some(MediaKind::Audio) => ext.is_audio(),
                Some(MediaKind::Video) => ext.is_video(),
                None => true,
            };
            if !ext.is_routing() || !fits_kind {
                trace!("Ignore header extension: {}", e.uri);
                continue;
            }
            self.extensions.set(e.id, ext);
        }
    }

    fn rtcp_route(&self) -> (Option<Arc<dyn SecureTransport>>, Component) {
        match &self.rtcp_transport {
            Some(t) => (Some(t.clone()), Component::Rtcp),
            None => (self.rtp_transport.clone(), Component::Rtp),
        }
    }

    fn notify_channels_of_transport_state(&mut self) {
        let (transport, _) = self.rtcp_route();

        let state = match transport.map(|t| t.state()) {
            None | Some(TransportState::Closed) => TransportState::Disconnected,
            Some(s) => s,
        };

        if state == self.last_transport_state {
            return;
        }

        debug!("Receiver {} transport state: {}", self.id, state);
        self.last_transport_state = state;

        for h in self.registry.holders() {
            h.notify(state);
        }
    }

    fn cancel(&mut self) {
        if self.state == ReceiverState::Shutdown {
            return;
        }

        self.set_state(ReceiverState::ShuttingDown);

        self.reset_active();

        for h in self.registry.holders() {
            h.notify(TransportState::Closed);
        }
        self.registry.clear();

        if self.params.is_some() {
            self.listener.unregister_receiver(self.id);
        }

        self.extensions.clear();
        self.ssrcs.clear();
        self.rids.clear();
        self.buffer.clear();
        self.csrcs.clear();

        self.reattempt = false;
        self.clean = false;
        self.wake = false;
        self.next_ssrc_sweep = None;
        self.next_csrc_sweep = None;

        self.rtcp_sender.stop();
        self.rtp_transport = None;
        self.rtcp_transport = None;
        self.track = None;

        self.set_state(ReceiverState::Shutdown);

        info!("Receiver {} stopped", self.id);
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("kind", &self.kind)
            .field("channels", &self.registry.snapshot().len())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
