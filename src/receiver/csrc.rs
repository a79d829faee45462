use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::rtp::Ssrc;

/// A source that contributed to received audio, with its last known level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributingSource {
    /// The contributing source. For client-to-mixer levels this is the packet's SSRC.
    pub csrc: Ssrc,
    /// When the source was last seen.
    pub timestamp: Instant,
    /// Audio level in -dBov, 0 is loudest and -127 silence.
    pub audio_level: i8,
    /// Voice activity, when the sender tells.
    pub voice_activity: Option<bool>,
}

/// Tracks contributing sources from audio level header extensions.
#[derive(Debug, Default)]
pub(crate) struct ContributingSources {
    sources: HashMap<Ssrc, ContributingSource>,
}

impl ContributingSources {
    pub fn set(&mut self, now: Instant, csrc: Ssrc, audio_level: i8, voice_activity: Option<bool>) {
        self.sources.insert(
            csrc,
            ContributingSource {
                csrc,
                timestamp: now,
                audio_level,
                voice_activity,
            },
        );
    }

    /// Drop sources where `timestamp + expiry < now`.
    pub fn expire(&mut self, now: Instant, expiry: Duration) {
        self.sources.retain(|_, s| {
            s.timestamp
                .checked_add(expiry)
                .map(|t| t >= now)
                .unwrap_or(true)
        });
    }

    /// All sources, ordered by CSRC.
    pub fn snapshot(&self) -> Vec<ContributingSource> {
        let mut v: Vec<_> = self.sources.values().copied().collect();
        v.sort_by_key(|s| s.csrc);
        v
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }
}
