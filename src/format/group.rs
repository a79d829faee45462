//! Splitting receive parameters into channels, and matching them up on renegotiation.

use crate::rtp::{Pt, Rid};

use super::{Codec, CodecKind, CodecParameters, EncodingParameters, FecMechanism, Parameters};

/// Split parameters into one set per channel.
///
/// Every encoding that isn't layered on top of another forms its own channel. An
/// encoding whose `dependency_rids` names the RID of an earlier base encoding joins
/// that base's channel. A set without encodings is a single latch-all channel.
pub fn split_into_channels(params: &Parameters) -> Vec<Parameters> {
    if params.should_latch_all() {
        return vec![params.clone()];
    }

    let mut groups: Vec<Parameters> = vec![];

    for enc in &params.encodings {
        let base = groups.iter_mut().find(|g| {
            let base_rid = g.encodings.first().and_then(|e| e.rid);
            base_rid
                .map(|rid| enc.dependency_rids.contains(&rid))
                .unwrap_or(false)
        });

        if let Some(group) = base {
            group.encodings.push(enc.clone());
            continue;
        }

        let mut group = Parameters {
            encodings: vec![],
            ..params.clone()
        };
        group.encodings.push(enc.clone());
        groups.push(group);
    }

    groups
}

/// How the channels of a new parameter set relate to the previous ones.
///
/// Indexes point into the old and new channel lists.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChannelDelta {
    /// `(old, new)` pairs with identical content.
    pub unchanged: Vec<(usize, usize)>,
    /// `(old, new)` pairs that are the same channel with changed parameters.
    pub updated: Vec<(usize, usize)>,
    /// New channels.
    pub added: Vec<usize>,
    /// Channels that are gone.
    pub removed: Vec<usize>,
}

/// Match up old and new channel parameters.
pub fn calculate_delta(old: &[&Parameters], new: &[Parameters]) -> ChannelDelta {
    let mut delta = ChannelDelta::default();

    let mut old_used = vec![false; old.len()];
    let mut new_used = vec![false; new.len()];

    // Exact matches first, so that an unchanged channel never gets claimed as an update.
    for (ni, n) in new.iter().enumerate() {
        let found = (0..old.len()).find(|oi| !old_used[*oi] && old[*oi] == n);
        if let Some(oi) = found {
            old_used[oi] = true;
            new_used[ni] = true;
            delta.unchanged.push((oi, ni));
        }
    }

    for (ni, n) in new.iter().enumerate() {
        if new_used[ni] {
            continue;
        }
        let found = (0..old.len()).find(|oi| !old_used[*oi] && same_channel(old[*oi], n));
        if let Some(oi) = found {
            old_used[oi] = true;
            new_used[ni] = true;
            delta.updated.push((oi, ni));
        }
    }

    // A lone remaining pair without any identity is taken to be the same channel.
    let old_left: Vec<usize> = (0..old.len()).filter(|i| !old_used[*i]).collect();
    let new_left: Vec<usize> = (0..new.len()).filter(|i| !new_used[*i]).collect();
    if old_left.len() == 1 && new_left.len() == 1 {
        let (oi, ni) = (old_left[0], new_left[0]);
        if !has_identity(old[oi]) && !has_identity(&new[ni]) {
            old_used[oi] = true;
            new_used[ni] = true;
            delta.updated.push((oi, ni));
        }
    }

    delta.removed = (0..old.len()).filter(|i| !old_used[*i]).collect();
    delta.added = (0..new.len()).filter(|i| !new_used[*i]).collect();

    delta
}

fn same_channel(a: &Parameters, b: &Parameters) -> bool {
    if a.should_latch_all() && b.should_latch_all() {
        return true;
    }

    let (Some(ea), Some(eb)) = (a.encodings.first(), b.encodings.first()) else {
        return false;
    };

    if let (Some(ra), Some(rb)) = (ea.rid, eb.rid) {
        return ra == rb;
    }

    if let (Some(sa), Some(sb)) = (ea.ssrc, eb.ssrc) {
        return sa == sb;
    }

    false
}

fn has_identity(p: &Parameters) -> bool {
    p.encodings
        .first()
        .map(|e| e.rid.is_some() || e.ssrc.is_some())
        .unwrap_or(false)
}

/// The encoding slot an incoming payload type could fill in a set of parameters.
#[derive(Debug)]
pub(crate) struct EncodingPick<'a> {
    /// The codec the payload type maps to.
    pub codec: &'a CodecParameters,
    /// The role of the codec.
    pub kind: CodecKind,
    /// Index of an encoding with an empty slot for this kind.
    pub slot: Option<usize>,
}

/// Find the codec for `pt` and an encoding with an unfilled slot for it.
///
/// Encodings with a RID other than the packet's are passed over. `None` when the
/// payload type isn't in the codec list.
pub(crate) fn pick_encoding_to_fill(
    pt: Pt,
    rid: Option<Rid>,
    params: &Parameters,
) -> Option<EncodingPick<'_>> {
    let codec = params.find_codec(pt)?;
    let kind = codec.codec.codec_kind();

    let slot = params.encodings.iter().position(|enc| {
        let rid_ok = match (enc.rid, rid) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        rid_ok && slot_is_open(kind, codec, pt, enc)
    });

    Some(EncodingPick { codec, kind, slot })
}

fn slot_is_open(kind: CodecKind, codec: &CodecParameters, pt: Pt, enc: &EncodingParameters) -> bool {
    match kind {
        CodecKind::Audio | CodecKind::Video => {
            enc.ssrc.is_none() && enc.codec_pt.map(|p| p == pt).unwrap_or(true)
        }
        CodecKind::AudioSupplemental => enc.ssrc.is_none(),
        CodecKind::Rtx => {
            let rtx_open = enc.rtx.as_ref().map(|r| r.ssrc.is_none()).unwrap_or(true);
            let associated = match (codec.apt, enc.codec_pt) {
                (Some(apt), Some(p)) => apt == p,
                _ => true,
            };
            enc.ssrc.is_some() && rtx_open && associated
        }
        CodecKind::Fec => {
            let fec_open = enc.fec.as_ref().map(|f| f.ssrc.is_none()).unwrap_or(true);
            enc.ssrc.is_some() && fec_open
        }
        CodecKind::Unknown => false,
    }
}

/// How FEC is carried by a stream with the payload `codec`.
///
/// RED counts as `red+ulpfec` when there is a ULPFEC codec at the same clock rate.
pub(crate) fn fec_mechanism_for(codec: &CodecParameters, codecs: &[CodecParameters]) -> Option<FecMechanism> {
    let has_ulpfec = codecs
        .iter()
        .any(|c| c.codec == Codec::Ulpfec && c.clock_rate == codec.clock_rate);

    match codec.codec {
        Codec::Red if has_ulpfec => Some(FecMechanism::RedUlpfec),
        Codec::Red => Some(FecMechanism::Red),
        Codec::FlexFec => Some(FecMechanism::FlexFec),
        _ => None,
    }
}
