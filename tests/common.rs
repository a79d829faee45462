#![allow(unused)]
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use rtp_receiver::format::{Codec, CodecParameters, EncodingParameters};
use rtp_receiver::format::{HeaderExtensionParameters, MediaKind, Parameters};
use rtp_receiver::rtp::{ChannelId, Extension, Pt, ReceiverId, Rid, RtcpPacket, RtpPacket, Ssrc};
use rtp_receiver::{ActiveChannel, Channel, ChannelSetHandle, ChannelSetup, Component};
use rtp_receiver::{Listener, MediaContext};
use rtp_receiver::{MediaEngine, MediaStreamTrack, Receiver, ReceiverConfig, RtcpSender};
use rtp_receiver::{SecureTransport, TransportState, Unhandled};

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

/// A channel that records everything it is given.
pub struct FakeChannel {
    pub id: ChannelId,
    pub params: Mutex<Parameters>,
    pub historical: usize,
    pub rtp: Mutex<Vec<RtpPacket>>,
    pub rtcp: Mutex<Vec<RtcpPacket>>,
    pub late_rtcp: Mutex<usize>,
    pub states: Mutex<Vec<TransportState>>,
    pub sender: RtcpSender,
}

impl FakeChannel {
    pub fn rtp_ssrcs(&self) -> Vec<Ssrc> {
        self.rtp.lock().unwrap().iter().map(|p| p.ssrc).collect()
    }

    pub fn states(&self) -> Vec<TransportState> {
        self.states.lock().unwrap().clone()
    }
}

impl Channel for FakeChannel {
    fn handle_rtp(&self, packet: RtpPacket) -> bool {
        self.rtp.lock().unwrap().push(packet);
        true
    }

    fn handle_rtcp(&self, packet: &RtcpPacket) -> bool {
        self.rtcp.lock().unwrap().push(packet.clone());
        true
    }

    fn handle_historical_rtcp(&self, packets: &[RtcpPacket]) {
        *self.late_rtcp.lock().unwrap() += packets.len();
    }

    fn update(&self, params: &Parameters) {
        *self.params.lock().unwrap() = params.clone();
    }

    fn notify_transport_state(&self, state: TransportState) {
        self.states.lock().unwrap().push(state);
    }
}

/// Everything the engine and track have seen.
#[derive(Default)]
pub struct EngineLog {
    pub tracks: Vec<MediaKind>,
    pub channels: Vec<(MediaKind, Arc<FakeChannel>)>,
    pub active: Vec<Option<ChannelId>>,
}

#[derive(Default)]
pub struct FakeEngine {
    pub log: Arc<Mutex<EngineLog>>,
}

impl FakeEngine {
    fn create(&self, kind: MediaKind, setup: ChannelSetup<'_>) -> Arc<dyn Channel> {
        let channel = Arc::new(FakeChannel {
            id: setup.id,
            params: Mutex::new(setup.params.clone()),
            historical: setup.historical_rtcp.len(),
            rtp: Mutex::new(vec![]),
            rtcp: Mutex::new(vec![]),
            late_rtcp: Mutex::new(0),
            states: Mutex::new(vec![]),
            sender: setup.rtcp_sender,
        });
        self.log.lock().unwrap().channels.push((kind, channel.clone()));
        channel
    }
}

impl MediaEngine for FakeEngine {
    fn create_track(&self, kind: MediaKind) -> Box<dyn MediaStreamTrack> {
        self.log.lock().unwrap().tracks.push(kind);
        Box::new(FakeTrack {
            log: self.log.clone(),
        })
    }

    fn create_audio_channel(&self, setup: ChannelSetup<'_>) -> Arc<dyn Channel> {
        self.create(MediaKind::Audio, setup)
    }

    fn create_video_channel(&self, setup: ChannelSetup<'_>) -> Arc<dyn Channel> {
        self.create(MediaKind::Video, setup)
    }
}

pub struct FakeTrack {
    log: Arc<Mutex<EngineLog>>,
}

impl MediaStreamTrack for FakeTrack {
    fn notify_active_channel(&mut self, active: Option<ActiveChannel>) {
        self.log.lock().unwrap().active.push(active.map(|a| a.id));
    }
}

#[derive(Default)]
pub struct ListenerLog {
    pub registered: Vec<(ReceiverId, MediaKind, Parameters)>,
    pub unregistered: Vec<ReceiverId>,
    pub unhandled: Vec<Unhandled>,
    pub historical: Vec<RtcpPacket>,
}

#[derive(Default)]
pub struct FakeListener {
    pub log: Arc<Mutex<ListenerLog>>,
}

impl Listener for FakeListener {
    fn register_receiver(&mut self, receiver: ReceiverId, kind: MediaKind, params: &Parameters) {
        self.log
            .lock()
            .unwrap()
            .registered
            .push((receiver, kind, params.clone()));
    }

    fn unregister_receiver(&mut self, receiver: ReceiverId) {
        self.log.lock().unwrap().unregistered.push(receiver);
    }

    fn historical_rtcp(&self) -> Vec<RtcpPacket> {
        self.log.lock().unwrap().historical.clone()
    }

    fn notify_unhandled(&mut self, _receiver: ReceiverId, unhandled: Unhandled) {
        self.log.lock().unwrap().unhandled.push(unhandled);
    }
}

pub struct FakeTransport {
    pub state: Mutex<TransportState>,
    pub sent: Mutex<Vec<(Component, Vec<u8>)>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeTransport {
            state: Mutex::new(TransportState::Pending),
            sent: Mutex::new(vec![]),
        })
    }

    pub fn set_state(&self, state: TransportState) {
        *self.state.lock().unwrap() = state;
    }
}

impl SecureTransport for FakeTransport {
    fn state(&self) -> TransportState {
        *self.state.lock().unwrap()
    }

    fn send_rtcp(&self, via: Component, buf: &[u8]) -> bool {
        self.sent.lock().unwrap().push((via, buf.to_vec()));
        true
    }
}

/// A receiver wired up to fakes, with its own clock.
pub struct TestReceiver {
    pub receiver: Receiver,
    pub engine: Arc<Mutex<EngineLog>>,
    pub listener: Arc<Mutex<ListenerLog>>,
    pub transport: Arc<FakeTransport>,
    pub start: Instant,
    pub now: Instant,
}

impl TestReceiver {
    pub fn new() -> Self {
        Self::with_config(ReceiverConfig::new())
    }

    pub fn with_config(config: ReceiverConfig) -> Self {
        let engine = FakeEngine::default();
        let engine_log = engine.log.clone();
        let listener = FakeListener::default();
        let listener_log = listener.log.clone();
        let transport = FakeTransport::new();

        let receiver = config.build(
            MediaContext::new(Arc::new(engine)),
            Box::new(listener),
            transport.clone(),
            None,
        );

        let now = Instant::now();

        TestReceiver {
            receiver,
            engine: engine_log,
            listener: listener_log,
            transport,
            start: now,
            now,
        }
    }

    pub fn advance(&mut self, d: Duration) {
        self.now += d;
    }

    pub fn rtp(&mut self, packet: RtpPacket) -> bool {
        let now = self.now;
        self.receiver.handle_rtp(now, Component::Rtp, packet)
    }

    pub fn rtcp(&mut self, packet: RtcpPacket) -> bool {
        let now = self.now;
        self.receiver.handle_rtcp(now, Component::Rtp, packet)
    }

    pub fn tick(&mut self) {
        let now = self.now;
        self.receiver.handle_timeout(now);
    }

    pub fn channels(&self) -> Vec<Arc<FakeChannel>> {
        self.engine
            .lock()
            .unwrap()
            .channels
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn channels_handle(&self) -> ChannelSetHandle {
        self.receiver.channels()
    }

    pub fn active_log(&self) -> Vec<Option<ChannelId>> {
        self.engine.lock().unwrap().active.clone()
    }

    pub fn unhandled(&self) -> Vec<Unhandled> {
        self.listener.lock().unwrap().unhandled.clone()
    }
}

impl Deref for TestReceiver {
    type Target = Receiver;

    fn deref(&self) -> &Self::Target {
        &self.receiver
    }
}

impl DerefMut for TestReceiver {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.receiver
    }
}

pub const RID_EXT_ID: u8 = 10;
pub const LEVEL_EXT_ID: u8 = 1;

pub fn rid_ext() -> HeaderExtensionParameters {
    HeaderExtensionParameters {
        uri: Extension::RtpStreamId.as_uri().to_string(),
        id: RID_EXT_ID,
        encrypt: false,
    }
}

pub fn level_ext() -> HeaderExtensionParameters {
    HeaderExtensionParameters {
        uri: Extension::AudioLevel.as_uri().to_string(),
        id: LEVEL_EXT_ID,
        encrypt: false,
    }
}

/// VP8 on PT 96 with RTX on 97.
pub fn vp8_params(encodings: Vec<EncodingParameters>) -> Parameters {
    Parameters {
        codecs: vec![
            CodecParameters::new(Codec::Vp8, 96, 90_000),
            CodecParameters::rtx(97, 96, 90_000),
        ],
        header_extensions: vec![rid_ext()],
        encodings,
        ..Default::default()
    }
}

/// Opus on PT 111.
pub fn opus_params(encodings: Vec<EncodingParameters>) -> Parameters {
    Parameters {
        codecs: vec![CodecParameters::new(Codec::Opus, 111, 48_000)],
        header_extensions: vec![level_ext()],
        encodings,
        ..Default::default()
    }
}

pub fn with_rid(rid: &str) -> EncodingParameters {
    EncodingParameters {
        rid: Some(rid.into()),
        ..Default::default()
    }
}

pub fn with_ssrc(ssrc: u32) -> EncodingParameters {
    EncodingParameters {
        ssrc: Some(ssrc.into()),
        ..Default::default()
    }
}

pub fn packet(ssrc: u32, pt: u8) -> RtpPacket {
    RtpPacket::new(ssrc.into(), pt.into())
}

/// A one-byte form header extension block, padded to 32 bits.
pub fn one_byte_ext(elements: &[(u8, &[u8])]) -> Vec<u8> {
    let mut buf = vec![];
    for (id, value) in elements {
        buf.push(id << 4 | (value.len() as u8 - 1));
        buf.extend_from_slice(value);
    }
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
    buf
}

pub fn packet_with_rid(ssrc: u32, pt: u8, rid: &str) -> RtpPacket {
    let data = one_byte_ext(&[(RID_EXT_ID, rid.as_bytes())]);
    packet(ssrc, pt).with_extensions(0xBEDE, data)
}

/// A two-byte form header extension block, padded to 32 bits.
pub fn two_byte_ext(elements: &[(u8, &[u8])]) -> Vec<u8> {
    let mut buf = vec![];
    for (id, value) in elements {
        buf.push(*id);
        buf.push(value.len() as u8);
        buf.extend_from_slice(value);
    }
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
    buf
}

/// RID sent in the two-byte form, which allows values longer than 16 bytes.
pub fn packet_with_long_rid(ssrc: u32, pt: u8, rid: &str) -> RtpPacket {
    let data = two_byte_ext(&[(RID_EXT_ID, rid.as_bytes())]);
    packet(ssrc, pt).with_extensions(0x1000, data)
}
