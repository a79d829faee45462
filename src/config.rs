use std::sync::Arc;
use std::time::Duration;

use crate::context::{Listener, MediaContext, SecureTransport};
use crate::Receiver;

const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Customized config for creating a [`Receiver`] instance.
///
/// ```
/// use std::time::Duration;
/// use rtp_receiver::ReceiverConfig;
///
/// let config = ReceiverConfig::new()
///     .set_ssrc_timeout(Duration::from_secs(30))
///     .set_max_buffered_packets(50);
///
/// assert_eq!(config.ssrc_timeout(), Duration::from_secs(30));
/// ```
///
/// Configs implement [`Clone`] to help create multiple `Receiver` instances.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub(crate) ssrc_timeout: Duration,
    pub(crate) max_buffered_packets: usize,
    pub(crate) max_packet_age: Duration,
    pub(crate) csrc_expiry: Duration,
    pub(crate) ambiguous_payload_window: Duration,
    pub(crate) lock_after_switch: Duration,
}

impl ReceiverConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        ReceiverConfig::default()
    }

    /// How long an SSRC is remembered without seeing traffic or sender reports for it.
    ///
    /// Values below one second are raised to one second. Stale entries are swept
    /// every half of this time.
    ///
    /// Defaults to 60 seconds.
    pub fn set_ssrc_timeout(mut self, d: Duration) -> Self {
        self.ssrc_timeout = d.max(MIN_TIMEOUT);
        self
    }

    /// Get the SSRC timeout.
    pub fn ssrc_timeout(&self) -> Duration {
        self.ssrc_timeout
    }

    /// Max number of RTP packets kept while waiting for a channel to route them to.
    ///
    /// The oldest packet is dropped to make room for a new one.
    ///
    /// Defaults to 100.
    pub fn set_max_buffered_packets(mut self, n: usize) -> Self {
        self.max_buffered_packets = n;
        self
    }

    /// Get the max number of buffered packets.
    pub fn max_buffered_packets(&self) -> usize {
        self.max_buffered_packets
    }

    /// Max time an RTP packet is kept while waiting for a channel.
    ///
    /// Defaults to 30 seconds.
    pub fn set_max_packet_age(mut self, d: Duration) -> Self {
        self.max_packet_age = d;
        self
    }

    /// Get the max age of buffered packets.
    pub fn max_packet_age(&self) -> Duration {
        self.max_packet_age
    }

    /// How long a contributing source is reported after it was last seen.
    ///
    /// Values below one second are raised to one second.
    ///
    /// Defaults to 10 seconds.
    pub fn set_csrc_expiry(mut self, d: Duration) -> Self {
        self.csrc_expiry = d.max(MIN_TIMEOUT);
        self
    }

    /// Get the contributing source expiry.
    pub fn csrc_expiry(&self) -> Duration {
        self.csrc_expiry
    }

    /// Minimum difference in recent activity needed to tell which channel an RTX or
    /// FEC stream belongs to, when it can't be told by SSRC or RID.
    ///
    /// Packets that can't be told apart are not routed.
    ///
    /// Defaults to 5 seconds.
    pub fn set_ambiguous_payload_window(mut self, d: Duration) -> Self {
        self.ambiguous_payload_window = d;
        self
    }

    /// Get the ambiguous payload window.
    pub fn ambiguous_payload_window(&self) -> Duration {
        self.ambiguous_payload_window
    }

    /// After switching which channel is active for the track, how long to hold on to
    /// that choice.
    ///
    /// Defaults to 3 seconds.
    pub fn set_lock_after_switch(mut self, d: Duration) -> Self {
        self.lock_after_switch = d;
        self
    }

    /// Get the lock after switch duration.
    pub fn lock_after_switch(&self) -> Duration {
        self.lock_after_switch
    }

    /// Create a [`Receiver`] from this config.
    ///
    /// When `rtcp_transport` is `None`, RTCP is muxed on the RTP transport.
    pub fn build(
        self,
        context: MediaContext,
        listener: Box<dyn Listener>,
        rtp_transport: Arc<dyn SecureTransport>,
        rtcp_transport: Option<Arc<dyn SecureTransport>>,
    ) -> Receiver {
        Receiver::new_from_config(self, context, listener, rtp_transport, rtcp_transport)
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            ssrc_timeout: Duration::from_secs(60),
            max_buffered_packets: 100,
            max_packet_age: Duration::from_secs(30),
            csrc_expiry: Duration::from_secs(10),
            ambiguous_payload_window: Duration::from_millis(5000),
            lock_after_switch: Duration::from_millis(3000),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let c = ReceiverConfig::new();
        assert_eq!(c.ssrc_timeout(), Duration::from_secs(60));
        assert_eq!(c.max_buffered_packets(), 100);
        assert_eq!(c.max_packet_age(), Duration::from_secs(30));
        assert_eq!(c.csrc_expiry(), Duration::from_secs(10));
        assert_eq!(c.ambiguous_payload_window(), Duration::from_secs(5));
        assert_eq!(c.lock_after_switch(), Duration::from_secs(3));
    }

    #[test]
    fn timeouts_have_a_floor() {
        let c = ReceiverConfig::new()
            .set_ssrc_timeout(Duration::from_millis(10))
            .set_csrc_expiry(Duration::ZERO);
        assert_eq!(c.ssrc_timeout(), Duration::from_secs(1));
        assert_eq!(c.csrc_expiry(), Duration::from_secs(1));
    }
}
