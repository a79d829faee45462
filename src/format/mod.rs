//! Codecs and receive parameters.

mod codec;
pub use codec::{Codec, CodecKind, MediaKind};

mod params;
pub use params::{CodecParameters, EncodingParameters, FecMechanism, FecParameters};
pub use params::{HeaderExtensionParameters, ParameterError, Parameters};
pub use params::{RtcpParameters, RtxParameters};

mod group;
pub(crate) use group::{fec_mechanism_for, pick_encoding_to_fill};
pub use group::{calculate_delta, split_into_channels, ChannelDelta};

mod capabilities;
pub use capabilities::{Capabilities, CodecCapability, HeaderExtensionCapability, RtcpFeedback};
