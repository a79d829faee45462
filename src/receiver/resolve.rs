//! Finding the channel of an incoming RTP packet.
//!
//! The evidence is tried from most to least specific: an SSRC already bound to a
//! channel, the RID header extension, an SSRC set in a channel's parameters, and
//! finally the payload type. Payload types are shared between channels all the time
//! (simulcast, RTX), so the last step refuses to guess when recent activity can't
//! tell two channels apart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::ChannelSetup;
use crate::format::{fec_mechanism_for, pick_encoding_to_fill, CodecKind, CodecParameters};
use crate::format::{EncodingParameters, Parameters};
use crate::rtp::{ExtensionValues, Pt, Rid, RtpPacket, Ssrc};

use super::channel::{ChannelHolder, InfoKey};
use super::table::SsrcInfo;
use super::Receiver;

/// A channel an RTX/FEC packet might belong to.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub key: InfoKey,
    pub slot: usize,
    /// Last activity of the channel's primary SSRC.
    pub last_usage: Instant,
}

/// The candidate whose primary SSRC was used most recently.
///
/// `None` if any two candidates were active within `window` of each other, since
/// there is no telling which one the packet is for.
pub(crate) fn most_recent_unambiguous(candidates: &[Candidate], window: Duration) -> Option<Candidate> {
    let mut sorted: Vec<Candidate> = candidates.to_vec();
    sorted.sort_by(|a, b| b.last_usage.cmp(&a.last_usage));

    for pair in sorted.windows(2) {
        let diff = pair[0].last_usage.saturating_duration_since(pair[1].last_usage);
        if diff < window {
            return None;
        }
    }

    sorted.first().copied()
}

impl Receiver {
    /// Find, and if needed create, the runtime channel for a packet.
    pub(super) fn resolve(
        &mut self,
        now: Instant,
        packet: &RtpPacket,
        vals: &ExtensionValues,
    ) -> Option<InfoKey> {
        let ssrc = packet.ssrc;
        let mut rid = vals.rid;
        let mut holder = None;

        self.set_ssrc_usage(now, ssrc, &mut rid, &mut holder);

        if holder.is_some() {
            return holder;
        }

        let key = if let Some(key) = self.find_by_rid(now, ssrc, rid, &mut holder) {
            trace!("Route SSRC {} by RID {:?}", ssrc, rid);
            key
        } else if let Some(key) = self.find_by_encoding_ssrc(now, ssrc, rid, &mut holder) {
            trace!("Route SSRC {} by negotiated SSRC", ssrc);
            key
        } else if let Some(key) = self.find_by_payload_type(now, packet, rid, &mut holder) {
            trace!("Route SSRC {} by PT {}", ssrc, packet.pt);
            key
        } else {
            trace!("No channel for SSRC {} PT {}", ssrc, packet.pt);
            return None;
        };

        if !self.fill_rid_parameters(rid, key) {
            return None;
        }

        if holder.is_none() {
            self.create_channel(now, ssrc, rid, key, &mut holder);
        }

        holder
    }

    /// Refresh or create the SSRC table entry for `ssrc`.
    ///
    /// A given `rid`/`holder` is written to the entry. A missing one is read back from
    /// the entry.
    pub(super) fn set_ssrc_usage(
        &mut self,
        now: Instant,
        ssrc: Ssrc,
        rid: &mut Option<Rid>,
        holder: &mut Option<InfoKey>,
    ) {
        if let Some(k) = *holder {
            if self.registry.holder(k).is_none() {
                *holder = None;
            }
        }

        let registry = &self.registry;
        let rid_of = |k: Option<InfoKey>| k.and_then(|k| registry.info(k)).and_then(|i| i.rid());

        if let Some(entry) = self.ssrcs.get_mut(ssrc) {
            entry.last_usage = now;

            match *holder {
                Some(k) => entry.holder = Some(k),
                None => *holder = entry.holder.filter(|k| registry.holder(*k).is_some()),
            }

            if rid.is_some() {
                entry.rid = *rid;
            } else if entry.rid.is_none() {
                entry.rid = rid_of(*holder);
                *rid = entry.rid;
            } else {
                *rid = entry.rid;
            }

            self.ssrcs.cache(ssrc);
            return;
        }

        if rid.is_none() {
            *rid = rid_of(*holder);
        }

        trace!("New SSRC {} RID {:?}", ssrc, rid);

        self.ssrcs.insert(SsrcInfo {
            ssrc,
            rid: *rid,
            last_usage: now,
            holder: *holder,
        });

        self.reattempt_delivery();
    }

    fn find_by_rid(
        &mut self,
        now: Instant,
        ssrc: Ssrc,
        rid: Option<Rid>,
        holder: &mut Option<InfoKey>,
    ) -> Option<InfoKey> {
        let r = rid?;
        let key = self.rids.get(r)?;

        if self.registry.info(key).is_none() {
            self.rids.remove(r);
            return None;
        }

        *holder = self.registry.holder(key).map(|_| key);

        let mut rid = rid;
        self.set_ssrc_usage(now, ssrc, &mut rid, holder);

        Some(key)
    }

    fn find_by_encoding_ssrc(
        &mut self,
        now: Instant,
        ssrc: Ssrc,
        rid: Option<Rid>,
        holder: &mut Option<InfoKey>,
    ) -> Option<InfoKey> {
        let key = self
            .registry
            .negotiated_infos()
            .find(|info| {
                let Some(base) = info.filled.encodings.first() else {
                    return false;
                };

                if let (Some(a), Some(b)) = (base.rid, rid) {
                    if a != b {
                        return false;
                    }
                }

                info.filled.encodings.iter().any(|e| has_ssrc(e, ssrc))
            })
            .map(|info| info.key)?;

        *holder = self.registry.holder(key).map(|_| key);

        let mut rid = rid;
        self.set_ssrc_usage(now, ssrc, &mut rid, holder);

        Some(key)
    }

    fn find_by_payload_type(
        &mut self,
        now: Instant,
        packet: &RtpPacket,
        rid: Option<Rid>,
        holder: &mut Option<InfoKey>,
    ) -> Option<InfoKey> {
        let ssrc = packet.ssrc;
        let pt = packet.pt;

        // (channel id, key, slot, kind) of the oldest channel with an open primary slot.
        let mut primary = None;
        let mut aux = vec![];
        let mut aux_kind = CodecKind::Unknown;

        for key in self.registry.negotiated().to_vec() {
            let Some(info) = self.registry.info(key) else {
                continue;
            };
            let Some(pick) = pick_encoding_to_fill(pt, rid, &info.filled) else {
                continue;
            };

            if info.should_latch_all() {
                let kind = pick.kind;
                let codec = pick.codec.clone();
                let found = self.find_best_existing_latch_all_or_create_new(packet, rid, kind, &codec)?;

                *holder = Some(found);
                let mut rid = rid;
                self.set_ssrc_usage(now, ssrc, &mut rid, holder);

                return Some(found);
            }

            let Some(slot) = pick.slot else {
                continue;
            };

            match pick.kind {
                CodecKind::Rtx | CodecKind::Fec => {
                    let base_ssrc = info.filled.encodings.get(slot).and_then(|e| e.ssrc);
                    let Some(active) = base_ssrc.and_then(|s| self.ssrcs.active(s)) else {
                        trace!("Skip channel {} for {:?}, primary SSRC not active", info.id, pick.kind);
                        continue;
                    };
                    aux_kind = pick.kind;
                    aux.push(Candidate {
                        key,
                        slot,
                        last_usage: active.last_usage,
                    });
                }
                CodecKind::Unknown => {}
                kind => {
                    let better = match primary {
                        None => true,
                        Some((id, _, _, _)) => info.id < id,
                    };
                    if better {
                        primary = Some((info.id, key, slot, kind));
                    }
                }
            }
        }

        let (key, slot, kind) = if let Some((_, key, slot, kind)) = primary {
            (key, slot, kind)
        } else if !aux.is_empty() {
            let Some(c) = most_recent_unambiguous(&aux, self.config.ambiguous_payload_window) else {
                warn!(
                    "Ambiguous {:?} SSRC {} PT {} between {} channels",
                    aux_kind,
                    ssrc,
                    pt,
                    aux.len()
                );
                return None;
            };
            (c.key, c.slot, aux_kind)
        } else {
            return None;
        };

        self.fill_slot(key, slot, kind, ssrc, pt);

        let mut rid = rid;
        self.set_ssrc_usage(now, ssrc, &mut rid, holder);

        Some(key)
    }

    fn fill_slot(&mut self, key: InfoKey, slot: usize, kind: CodecKind, ssrc: Ssrc, pt: Pt) {
        let Some(info) = self.registry.info_mut(key) else {
            return;
        };
        let id = info.id;
        let Some(enc) = info.filled.encodings.get_mut(slot) else {
            return;
        };

        match kind {
            CodecKind::Audio | CodecKind::Video => {
                enc.ssrc = Some(ssrc);
                enc.codec_pt = Some(pt);
            }
            CodecKind::Rtx => {
                let rtx = enc.rtx.get_or_insert_with(Default::default);
                rtx.ssrc = Some(ssrc);
                rtx.pt = Some(pt);
            }
            CodecKind::Fec => {
                enc.fec.get_or_insert_with(Default::default).ssrc = Some(ssrc);
            }
            CodecKind::AudioSupplemental | CodecKind::Unknown => return,
        }

        debug!("Channel {} encoding {} {:?} SSRC: {}", id, slot, kind, ssrc);
    }

    /// Route traffic for a latch-all channel.
    ///
    /// Reuses a runtime channel that already has this SSRC/RID, or one with room for
    /// it. Otherwise a new channel is made for primary media.
    fn find_best_existing_latch_all_or_create_new(
        &mut self,
        packet: &RtpPacket,
        rid: Option<Rid>,
        kind: CodecKind,
        codec: &CodecParameters,
    ) -> Option<InfoKey> {
        let ssrc = packet.ssrc;
        let pt = packet.pt;
        let mut candidates = vec![];

        for key in self.registry.holder_keys() {
            let Some(info) = self.registry.info(key) else {
                continue;
            };
            let Some(base) = info.filled.encodings.first() else {
                continue;
            };

            let base_rid = base.rid;
            let base_ssrc = base.ssrc;
            let rtx_ssrc = base.rtx.as_ref().and_then(|r| r.ssrc);
            let fec_ssrc = base.fec.as_ref().and_then(|f| f.ssrc);

            // The channel's own codec must run at the same clock.
            let same_clock = base
                .codec_pt
                .and_then(|p| info.filled.find_codec(p))
                .map(|c| c.clock_rate == codec.clock_rate)
                .unwrap_or(false);

            if let (Some(a), Some(b)) = (base_rid, rid) {
                if a == b {
                    return Some(key);
                }
                continue;
            }

            match kind {
                CodecKind::Audio | CodecKind::Video => {
                    match base_ssrc {
                        Some(s) if s == ssrc => return Some(key),
                        Some(_) => continue,
                        None => {
                            self.fill_slot(key, 0, kind, ssrc, pt);
                            return Some(key);
                        }
                    }
                }
                CodecKind::AudioSupplemental => {
                    if base_ssrc == Some(ssrc) {
                        return Some(key);
                    }
                }
                CodecKind::Rtx => match rtx_ssrc {
                    Some(s) if s == ssrc => return Some(key),
                    Some(_) => continue,
                    None => {}
                },
                CodecKind::Fec => match fec_ssrc {
                    Some(s) if s == ssrc => return Some(key),
                    Some(_) => continue,
                    None => {}
                },
                CodecKind::Unknown => continue,
            }

            if !same_clock {
                continue;
            }

            // Possible match, if the primary SSRC is active.
            let Some(active) = base_ssrc.and_then(|s| self.ssrcs.active(s)) else {
                continue;
            };

            candidates.push(Candidate {
                key,
                slot: 0,
                last_usage: active.last_usage,
            });
        }

        if !candidates.is_empty() {
            let Some(c) = most_recent_unambiguous(&candidates, self.config.ambiguous_payload_window)
            else {
                warn!(
                    "Ambiguous latch-all {:?} SSRC {} PT {} between {} channels",
                    kind,
                    ssrc,
                    pt,
                    candidates.len()
                );
                return None;
            };

            if matches!(kind, CodecKind::Rtx | CodecKind::Fec) {
                self.fill_slot(c.key, 0, kind, ssrc, pt);
                if kind == CodecKind::Fec {
                    self.fill_fec_mechanism(c.key, codec);
                }
            }

            return Some(c.key);
        }

        if !kind.is_primary() {
            trace!("No latch-all channel for {:?} SSRC {}", kind, ssrc);
            return None;
        }

        let base = self.params.as_ref()?;
        let original = Parameters {
            encodings: vec![],
            ..base.clone()
        };
        let mut filled = original.clone();
        filled.encodings.push(EncodingParameters {
            ssrc: Some(ssrc),
            codec_pt: Some(pt),
            rid,
            ..Default::default()
        });

        let id = match self.registry.first_negotiated_id() {
            Some(id) => id,
            None => self.registry.next_channel_id(),
        };
        let key = self.registry.add(id, false, original, filled);

        debug!("Latch channel {} on SSRC {}", id, ssrc);

        self.materialize(key, ssrc);

        self.registry.holder(key).map(|_| key)
    }

    fn fill_fec_mechanism(&mut self, key: InfoKey, codec: &CodecParameters) {
        let Some(info) = self.registry.info_mut(key) else {
            return;
        };

        let mechanism = fec_mechanism_for(codec, &info.filled.codecs);

        let Some(fec) = info.filled.encodings.first_mut().and_then(|e| e.fec.as_mut()) else {
            return;
        };

        if fec.mechanism.is_some() {
            return;
        }

        fec.mechanism = mechanism;
    }

    /// Write a RID discovered from traffic into the channel's parameters.
    ///
    /// Returns `false` if the channel already has another RID.
    pub(super) fn fill_rid_parameters(&mut self, rid: Option<Rid>, key: InfoKey) -> bool {
        let Some(rid) = rid else {
            return true;
        };
        let Some(info) = self.registry.info_mut(key) else {
            return false;
        };

        if !info.should_latch_all() {
            let id = info.id;
            let Some(base) = info.filled.encodings.first_mut() else {
                return false;
            };
            match base.rid {
                Some(r) if r != rid => {
                    warn!("RID mismatch on channel {}: {} != {}", id, r, rid);
                    return false;
                }
                Some(_) => {}
                None => {
                    debug!("Channel {} RID: {}", id, rid);
                    base.rid = Some(rid);
                }
            }
        }

        self.rids.set(rid, key);
        true
    }

    fn create_channel(
        &mut self,
        now: Instant,
        ssrc: Ssrc,
        rid: Option<Rid>,
        key: InfoKey,
        holder: &mut Option<InfoKey>,
    ) {
        if self.registry.holder(key).is_none() {
            self.materialize(key, ssrc);
        }

        if self.registry.holder(key).is_none() {
            return;
        }

        *holder = Some(key);

        let mut rid = rid;
        self.set_ssrc_usage(now, ssrc, &mut rid, holder);
    }

    /// Create the runtime channel of an info.
    fn materialize(&mut self, key: InfoKey, ssrc: Ssrc) {
        let Some(kind) = self.kind else {
            return;
        };
        let Some(info) = self.registry.info(key) else {
            return;
        };

        let id = info.id;
        let historical = self.listener.historical_rtcp();
        let channel = self.context.create_channel(
            kind,
            ChannelSetup {
                id,
                params: &info.original,
                historical_rtcp: &historical,
                rtcp_sender: self.rtcp_sender.clone(),
            },
        );

        let holder = Arc::new(ChannelHolder::new(key, id, channel));
        holder.notify(self.last_transport_state);

        debug!("Create {} channel {} for SSRC {}", kind, id, ssrc);

        self.registry.insert_holder(holder);
    }
}

fn has_ssrc(e: &EncodingParameters, ssrc: Ssrc) -> bool {
    e.ssrc == Some(ssrc)
        || e.rtx.as_ref().and_then(|r| r.ssrc) == Some(ssrc)
        || e.fec.as_ref().and_then(|f| f.ssrc) == Some(ssrc)
}
