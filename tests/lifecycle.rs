use std::time::Duration;

use rtp_receiver::format::MediaKind;
use rtp_receiver::rtp::ChannelId;
use rtp_receiver::{Receiver, ReceiverConfig, ReceiverError, ReceiverState, TransportState};

mod common;
use common::{init_log, packet, vp8_params, with_ssrc, TestReceiver};

#[test]
pub fn first_timeout_makes_ready() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    assert_eq!(r.state(), ReceiverState::Pending);

    // Something to do straight away.
    assert!(r.poll_timeout().is_some());

    r.tick();
    assert_eq!(r.state(), ReceiverState::Ready);

    // Next is the sweep.
    let next = r.poll_timeout().unwrap();
    assert!(next > r.now);
    assert!(next <= r.now + Duration::from_secs(30));

    Ok(())
}

#[test]
pub fn stale_ssrc_is_forgotten() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![Default::default()]))?;

    r.rtp(packet(1, 96));
    assert_eq!(r.channels().len(), 1);
    r.tick();

    // Keep ticking well past the SSRC timeout.
    for _ in 0..5 {
        r.advance(Duration::from_secs(30));
        r.tick();
    }

    // The SSRC is gone from the table, but the encoding slot stays taken until a BYE.
    r.advance(Duration::from_secs(1));
    r.rtp(packet(2, 96));
    assert_eq!(r.channels().len(), 1);
    assert_eq!(r.buffered_packets(), 1);

    // Back after the timeout, the old SSRC finds its channel again.
    r.rtp(packet(1, 96));
    assert_eq!(r.channels()[0].rtp_ssrcs(), vec![1.into(), 1.into()]);

    Ok(())
}

#[test]
pub fn stop_shuts_down() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![with_ssrc(1)]))?;
    r.rtp(packet(1, 96));

    r.stop();

    assert_eq!(r.state(), ReceiverState::Shutdown);
    assert_eq!(r.poll_timeout(), None);
    assert_eq!(r.active_channel(), None);
    assert_eq!(r.channels()[0].states(), vec![TransportState::Closed]);
    assert_eq!(r.listener.lock().unwrap().unregistered.len(), 1);

    assert!(!r.rtp(packet(1, 96)));
    assert_eq!(r.channels()[0].rtp_ssrcs().len(), 1);

    let err = r.receive(vp8_params(vec![])).unwrap_err();
    assert!(matches!(err, ReceiverError::Shutdown));

    // A second stop does nothing.
    r.stop();
    assert_eq!(r.listener.lock().unwrap().unregistered.len(), 1);

    Ok(())
}

#[test]
pub fn drop_closes_channels() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![with_ssrc(1)]))?;
    r.rtp(packet(1, 96));

    let channels = r.channels();
    let listener = r.listener.clone();
    drop(r);

    assert_eq!(channels[0].states(), vec![TransportState::Closed]);
    assert_eq!(listener.lock().unwrap().unregistered.len(), 1);

    Ok(())
}

#[test]
pub fn track_created_once_with_kind() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    assert_eq!(r.kind(), None);

    r.receive(vp8_params(vec![with_ssrc(1)]))?;
    r.receive(vp8_params(vec![with_ssrc(2)]))?;

    assert_eq!(r.kind(), Some(MediaKind::Video));
    assert_eq!(r.engine.lock().unwrap().tracks, vec![MediaKind::Video]);

    let log = r.listener.lock().unwrap();
    assert_eq!(log.registered.len(), 2);
    assert_eq!(log.registered[1].0, r.id());

    Ok(())
}

#[test]
pub fn capabilities_per_kind() {
    let audio = Receiver::capabilities(Some(MediaKind::Audio));
    assert!(audio
        .codecs
        .iter()
        .all(|c| c.codec.media_kind() != Some(MediaKind::Video)));

    let all = Receiver::capabilities(None);
    assert!(all.codecs.len() > audio.codecs.len());
}

#[test]
pub fn huge_durations_mean_never() -> Result<(), ReceiverError> {
    init_log();

    let config = ReceiverConfig::new()
        .set_ssrc_timeout(Duration::MAX)
        .set_csrc_expiry(Duration::MAX)
        .set_lock_after_switch(Duration::MAX)
        .set_max_packet_age(Duration::MAX);

    let mut r = TestReceiver::with_config(config);
    r.receive(vp8_params(vec![with_ssrc(1), with_ssrc(2)]))?;

    r.rtp(packet(1, 96));
    r.advance(Duration::from_secs(10));
    r.rtp(packet(2, 96));

    // The switch lock never runs out.
    assert_eq!(r.active_channel(), Some(ChannelId::from(1)));

    r.tick();
    r.advance(Duration::from_secs(3600));
    r.tick();
    r.rtp(packet(2, 96));
    assert_eq!(r.active_channel(), Some(ChannelId::from(1)));

    // No sweep in any foreseeable time.
    r.tick();
    let year = Duration::from_secs(3600 * 24 * 365);
    assert!(r.poll_timeout().map(|t| t > r.now + year).unwrap_or(true));

    Ok(())
}
