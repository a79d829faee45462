use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use crate::context::{Channel, TransportState};
use crate::format::Parameters;
use crate::rtp::{ChannelId, Rid, RtcpPacket, RtpPacket, Ssrc};

/// Arena key of a [`ChannelInfo`]. Unique per info, unlike [`ChannelId`] which
/// auto-latched channels share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct InfoKey(pub usize);

/// One channel worth of parameters.
///
/// Negotiated infos come from splitting the receive parameters. Auto-latched infos are
/// made up on the fly for traffic a latch-all channel picks up.
#[derive(Debug)]
pub(crate) struct ChannelInfo {
    pub key: InfoKey,
    pub id: ChannelId,
    pub negotiated: bool,
    /// As negotiated. Never changed by discovery.
    pub original: Parameters,
    /// Working copy where discovered SSRC/PT/RID are filled in.
    pub filled: Parameters,
}

impl ChannelInfo {
    pub fn should_latch_all(&self) -> bool {
        self.original.should_latch_all()
    }

    pub fn rid(&self) -> Option<Rid> {
        if self.should_latch_all() {
            return None;
        }
        self.filled.encodings.first().and_then(|e| e.rid)
    }
}

/// All SSRCs (primary, RTX and FEC) set in some parameters.
pub(crate) fn ssrcs_of(params: &Parameters) -> Vec<Ssrc> {
    let mut v = vec![];
    for e in &params.encodings {
        v.extend(e.ssrc);
        v.extend(e.rtx.as_ref().and_then(|r| r.ssrc));
        v.extend(e.fec.as_ref().and_then(|f| f.ssrc));
    }
    v
}

const CLOSED: u8 = 3;

/// A runtime channel, created the first time traffic is routed to it.
///
/// Once it has been told the transport is closed, it passes nothing more on to the
/// channel. Dropping the holder closes the channel.
pub struct ChannelHolder {
    key: InfoKey,
    id: ChannelId,
    channel: Arc<dyn Channel>,
    last_state: AtomicU8,
}

impl ChannelHolder {
    pub(crate) fn new(key: InfoKey, id: ChannelId, channel: Arc<dyn Channel>) -> Self {
        ChannelHolder {
            key,
            id,
            channel,
            last_state: AtomicU8::new(TransportState::Pending.to_u8()),
        }
    }

    pub(crate) fn key(&self) -> InfoKey {
        self.key
    }

    /// Logical id of the channel.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// The channel.
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Last transport state given to the channel.
    pub fn transport_state(&self) -> TransportState {
        TransportState::from_u8(self.last_state.load(Ordering::Acquire))
    }

    fn is_closed(&self) -> bool {
        self.last_state.load(Ordering::Acquire) == CLOSED
    }

    pub(crate) fn notify(&self, state: TransportState) {
        let next = state.to_u8();
        let changed = self
            .last_state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                if prev == CLOSED || prev == next {
                    None
                } else {
                    Some(next)
                }
            })
            .is_ok();

        if changed {
            trace!("Channel {} transport state: {}", self.id, state);
            self.channel.notify_transport_state(state);
        }
    }

    pub(crate) fn handle_rtp(&self, packet: RtpPacket) -> bool {
        if self.is_closed() {
            return false;
        }
        self.channel.handle_rtp(packet)
    }

    /// Pass an RTCP packet to the channel, unless it's closed.
    pub fn handle_rtcp(&self, packet: &RtcpPacket) -> bool {
        if self.is_closed() {
            return false;
        }
        self.channel.handle_rtcp(packet)
    }

    pub(crate) fn handle_historical_rtcp(&self, packets: &[RtcpPacket]) {
        if self.is_closed() {
            return;
        }
        self.channel.handle_historical_rtcp(packets);
    }

    pub(crate) fn update(&self, params: &Parameters) {
        if self.is_closed() {
            return;
        }
        self.channel.update(params);
    }
}

impl Drop for ChannelHolder {
    fn drop(&mut self) {
        self.notify(TransportState::Closed);
    }
}

impl fmt::Debug for ChannelHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHolder")
            .field("id", &self.id)
            .field("state", &self.transport_state())
            .finish()
    }
}

/// An immutable snapshot of the live channels.
///
/// Changes to the channels install a new snapshot, they never alter an existing one.
/// The snapshot only holds weak references, a channel that went away in the meantime
/// is skipped.
#[derive(Debug, Default)]
pub struct ChannelSet {
    channels: Vec<(InfoKey, Weak<ChannelHolder>)>,
}

impl ChannelSet {
    /// Number of channels in the snapshot, including ones that went away.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Tells if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// The channels that are still alive.
    pub fn live(&self) -> impl Iterator<Item = Arc<ChannelHolder>> + '_ {
        self.channels.iter().filter_map(|(_, w)| w.upgrade())
    }

    /// Give an RTCP packet to every live channel.
    ///
    /// Returns whether any channel was interested, and whether a dead reference was found.
    pub fn broadcast_rtcp(&self, packet: &RtcpPacket) -> (bool, bool) {
        let mut handled = false;
        let mut dirty = false;

        for (_, w) in &self.channels {
            let Some(holder) = w.upgrade() else {
                dirty = true;
                continue;
            };
            handled |= holder.handle_rtcp(packet);
        }

        (handled, dirty)
    }

    fn with(&self, holder: &Arc<ChannelHolder>) -> ChannelSet {
        let mut channels = self.channels.clone();
        channels.push((holder.key(), Arc::downgrade(holder)));
        channels.sort_by_key(|(k, _)| *k);
        ChannelSet { channels }
    }

    fn without(&self, gone: &[InfoKey]) -> ChannelSet {
        let channels = self
            .channels
            .iter()
            .filter(|(k, _)| !gone.contains(k))
            .cloned()
            .collect();
        ChannelSet { channels }
    }

    fn cleaned(&self) -> ChannelSet {
        let channels = self
            .channels
            .iter()
            .filter(|(_, w)| w.strong_count() > 0)
            .cloned()
            .collect();
        ChannelSet { channels }
    }
}

/// Shared access to the current [`ChannelSet`] of a receiver.
///
/// Reading never blocks, not even while the receiver installs a new snapshot. Can be
/// cloned and moved to another thread to broadcast RTCP.
#[derive(Clone, Default)]
pub struct ChannelSetHandle {
    current: Arc<ArcSwap<ChannelSet>>,
    dirty: Arc<AtomicBool>,
}

impl ChannelSetHandle {
    /// The current snapshot.
    pub fn load(&self) -> Arc<ChannelSet> {
        self.current.load_full()
    }

    /// Give an RTCP packet to every live channel of the current snapshot.
    ///
    /// A reference to a channel that went away is cleaned up by the receiver's next
    /// [`handle_timeout`][crate::Receiver::handle_timeout].
    pub fn broadcast_rtcp(&self, packet: &RtcpPacket) -> bool {
        let (handled, dirty) = self.current.load().broadcast_rtcp(packet);
        if dirty {
            self.dirty.store(true, Ordering::Release);
        }
        handled
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn store(&self, set: ChannelSet) {
        self.current.store(Arc::new(set));
    }
}

impl fmt::Debug for ChannelSetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSetHandle")
            .field("len", &self.current.load().len())
            .finish()
    }
}

/// Owner of all channel infos and runtime channels of a receiver.
#[derive(Debug)]
pub(crate) struct ChannelRegistry {
    infos: BTreeMap<InfoKey, ChannelInfo>,
    /// Negotiated infos in the order the parameters list them.
    negotiated: Vec<InfoKey>,
    /// The only strong references to the holders owned by the receiver.
    holders: BTreeMap<InfoKey, Arc<ChannelHolder>>,
    published: ChannelSetHandle,
    next_key: usize,
    next_id: ChannelId,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        ChannelRegistry {
            infos: BTreeMap::new(),
            negotiated: vec![],
            holders: BTreeMap::new(),
            published: ChannelSetHandle::default(),
            next_key: 0,
            next_id: ChannelId::from(1),
        }
    }

    pub fn next_channel_id(&mut self) -> ChannelId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    pub fn add(
        &mut self,
        id: ChannelId,
        negotiated: bool,
        original: Parameters,
        filled: Parameters,
    ) -> InfoKey {
        let key = InfoKey(self.next_key);
        self.next_key += 1;

        self.infos.insert(
            key,
            ChannelInfo {
                key,
                id,
                negotiated,
                original,
                filled,
            },
        );

        key
    }

    pub fn info(&self, key: InfoKey) -> Option<&ChannelInfo> {
        self.infos.get(&key)
    }

    pub fn info_mut(&mut self, key: InfoKey) -> Option<&mut ChannelInfo> {
        self.infos.get_mut(&key)
    }

    pub fn remove_info(&mut self, key: InfoKey) -> Option<ChannelInfo> {
        self.negotiated.retain(|k| *k != key);
        self.infos.remove(&key)
    }

    /// Keys of all infos, negotiated or not, sharing a logical id.
    pub fn keys_with_id(&self, id: ChannelId) -> Vec<InfoKey> {
        self.infos
            .values()
            .filter(|i| i.id == id)
            .map(|i| i.key)
            .collect()
    }

    /// Keys of the auto-latched infos.
    pub fn auto_latched(&self) -> Vec<InfoKey> {
        self.infos
            .values()
            .filter(|i| !i.negotiated)
            .map(|i| i.key)
            .collect()
    }

    pub fn negotiated(&self) -> &[InfoKey] {
        &self.negotiated
    }

    pub fn set_negotiated(&mut self, keys: Vec<InfoKey>) {
        self.negotiated = keys;
    }

    pub fn negotiated_infos(&self) -> impl Iterator<Item = &ChannelInfo> + '_ {
        self.negotiated.iter().filter_map(|k| self.infos.get(k))
    }

    pub fn first_negotiated_id(&self) -> Option<ChannelId> {
        self.negotiated_infos().next().map(|i| i.id)
    }

    pub fn holder(&self, key: InfoKey) -> Option<&Arc<ChannelHolder>> {
        self.holders.get(&key)
    }

    pub fn holder_keys(&self) -> Vec<InfoKey> {
        self.holders.keys().copied().collect()
    }

    pub fn holders(&self) -> impl Iterator<Item = &Arc<ChannelHolder>> + '_ {
        self.holders.values()
    }

    /// Take ownership of a new holder and publish it.
    pub fn insert_holder(&mut self, holder: Arc<ChannelHolder>) {
        let next = self.published.load().with(&holder);
        self.published.store(next);
        self.holders.insert(holder.key(), holder);
    }

    /// Remove holders for which `f` is true and publish the remaining set.
    pub fn remove_holders(&mut self, mut f: impl FnMut(InfoKey) -> bool) -> Vec<Arc<ChannelHolder>> {
        let gone: Vec<InfoKey> = self.holders.keys().copied().filter(|k| f(*k)).collect();
        if gone.is_empty() {
            return vec![];
        }

        let next = self.published.load().without(&gone);
        self.published.store(next);

        gone.iter().filter_map(|k| self.holders.remove(k)).collect()
    }

    pub fn handle(&self) -> ChannelSetHandle {
        self.published.clone()
    }

    pub fn snapshot(&self) -> Arc<ChannelSet> {
        self.published.load()
    }

    pub fn is_dirty(&self) -> bool {
        self.published.is_dirty()
    }

    /// Republish the snapshot without dead references.
    pub fn clean(&mut self) {
        self.published.dirty.store(false, Ordering::Release);
        let next = self.published.load().cleaned();
        self.published.store(next);
    }

    pub fn clear(&mut self) {
        self.published.store(ChannelSet::default());
        self.published.dirty.store(false, Ordering::Release);
        self.holders.clear();
        self.infos.clear();
        self.negotiated.clear();
    }
}
