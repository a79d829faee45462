use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::rtp::RtpPacket;

/// An RTP packet waiting for a channel.
#[derive(Debug)]
pub(crate) struct BufferedPacket {
    pub arrival: Instant,
    pub packet: RtpPacket,
}

/// Packets that could not be routed yet, oldest first.
///
/// Bounded both in count and in age.
#[derive(Debug)]
pub(crate) struct PacketBuffer {
    packets: VecDeque<BufferedPacket>,
    max_count: usize,
    max_age: Duration,
}

impl PacketBuffer {
    pub fn new(max_count: usize, max_age: Duration) -> Self {
        PacketBuffer {
            packets: VecDeque::new(),
            max_count,
            max_age,
        }
    }

    /// Drop packets older than the max age, or over the max count.
    pub fn expire(&mut self, now: Instant) {
        while let Some(front) = self.packets.front() {
            let too_many = self.packets.len() > self.max_count;
            let too_old = now.saturating_duration_since(front.arrival) > self.max_age;
            if !too_many && !too_old {
                break;
            }
            trace!(
                "Drop buffered packet SSRC: {} ({})",
                front.packet.ssrc,
                if too_many { "count" } else { "age" }
            );
            self.packets.pop_front();
        }
    }

    /// Add a packet, making room by dropping the oldest if needed.
    pub fn push(&mut self, now: Instant, packet: RtpPacket) {
        self.expire(now);

        if self.max_count == 0 {
            trace!("Drop packet SSRC: {}, no buffering", packet.ssrc);
            return;
        }

        while self.packets.len() >= self.max_count {
            self.packets.pop_front();
        }

        self.packets.push_back(BufferedPacket {
            arrival: now,
            packet,
        });
    }

    /// Take all packets out, for a delivery attempt.
    pub fn take(&mut self) -> VecDeque<BufferedPacket> {
        std::mem::take(&mut self.packets)
    }

    /// Put back packets that are still undelivered, ahead of anything newer.
    pub fn restore(&mut self, mut packets: VecDeque<BufferedPacket>) {
        packets.append(&mut self.packets);
        self.packets = packets;
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn clear(&mut self) {
        self.packets.clear();
    }
}
