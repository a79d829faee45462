//! Receive side channel resolution for RTP.
//!
//! A [`Receiver`] takes decrypted RTP and RTCP packets for one media track and works
//! out which channel each packet belongs to. Channels come from the receive
//! [`Parameters`][format::Parameters], which may leave out SSRCs, payload types and
//! RIDs. Whatever is left out is discovered from the traffic: the receiver latches
//! on to SSRCs, fills in RTX and FEC streams and, when the parameters have no
//! encodings at all, creates channels for every SSRC that shows up.
//!
//! This is a [Sans I/O][sansio] implementation. The receiver does no network
//! talking, has no internal threads or async tasks and reads no clocks. All
//! operations happen from calls to the public API, and time is passed in as an
//! explicit `now`.
//!
//! # Collaborators
//!
//! The receiver talks to the world through the traits in [`context`]:
//!
//! * [`MediaEngine`] creates tracks and the decoding channels.
//! * [`Listener`] is the transport side demultiplexer the receiver registers with.
//! * [`SecureTransport`] is what channels send RTCP through.
//!
//! # Run loop
//!
//! ```no_run
//! # use rtp_receiver::{Receiver, Component};
//! # use rtp_receiver::rtp::RtpPacket;
//! # use std::time::Instant;
//! # fn next_packet() -> Option<RtpPacket> { todo!() }
//! # fn run(mut receiver: Receiver) {
//! loop {
//!     let Some(timeout) = receiver.poll_timeout() else {
//!         // Receiver is shut down.
//!         return;
//!     };
//!
//!     // Wait for a packet until timeout.
//!     if let Some(packet) = next_packet() {
//!         receiver.handle_rtp(Instant::now(), Component::Rtp, packet);
//!     } else {
//!         receiver.handle_timeout(timeout);
//!     }
//! }
//! # }
//! ```
//!
//! [sansio]: https://sans-io.readthedocs.io

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_range_contains)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

use thiserror::Error;

mod config;
pub use config::ReceiverConfig;

pub mod context;
pub use context::{ActiveChannel, Channel, ChannelSetup, Component, Listener};
pub use context::{MediaContext, MediaEngine, MediaStreamTrack, RtcpSender};
pub use context::{SecureTransport, TransportState, Unhandled};

pub mod format;

pub mod rtp;

mod receiver;
pub use receiver::{ChannelHolder, ChannelSet, ChannelSetHandle, ContributingSource};
pub use receiver::{Receiver, ReceiverState};

mod util;

/// Various error types.
pub mod error {
    pub use crate::format::ParameterError;
}

/// Errors from a [`Receiver`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReceiverError {
    /// The receive parameters were rejected.
    #[error("{0}")]
    Parameters(#[from] error::ParameterError),

    /// The receiver was stopped.
    #[error("Receiver is shut down")]
    Shutdown,
}
