use std::time::Duration;

use rtp_receiver::rtp::ChannelId;
use rtp_receiver::ReceiverError;

mod common;
use common::{init_log, packet, vp8_params, with_ssrc, TestReceiver};

#[test]
pub fn rtx_between_recent_channels_is_ambiguous() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![with_ssrc(1000), with_ssrc(2000)]))?;

    r.rtp(packet(1000, 96));
    r.advance(Duration::from_secs(1));
    r.rtp(packet(2000, 96));
    r.advance(Duration::from_secs(1));

    // Both primaries were active within the window, no telling where RTX belongs.
    assert!(r.rtp(packet(3000, 97)));

    let channels = r.channels();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0].rtp_ssrcs(), vec![1000.into()]);
    assert_eq!(channels[1].rtp_ssrcs(), vec![2000.into()]);
    assert_eq!(r.buffered_packets(), 1);
    assert_eq!(r.unhandled()[0].ssrc, 3000.into());

    Ok(())
}

#[test]
pub fn rtx_goes_to_most_recent_channel() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![with_ssrc(1000), with_ssrc(2000)]))?;

    r.rtp(packet(1000, 96));
    r.advance(Duration::from_secs(10));
    r.rtp(packet(2000, 96));
    r.advance(Duration::from_secs(1));

    assert!(r.rtp(packet(3000, 97)));

    let channels = r.channels();
    assert_eq!(channels[0].rtp_ssrcs(), vec![1000.into()]);
    assert_eq!(channels[1].rtp_ssrcs(), vec![2000.into(), 3000.into()]);
    assert_eq!(r.buffered_packets(), 0);

    // The RTX SSRC is now bound and keeps going to the same channel.
    r.advance(Duration::from_secs(1));
    r.rtp(packet(1000, 96));
    r.advance(Duration::from_millis(10));
    r.rtp(packet(3000, 97));
    assert_eq!(r.channels()[1].rtp_ssrcs().len(), 3);

    Ok(())
}

#[test]
pub fn rtx_without_active_primary_waits() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![Default::default()]))?;

    // The primary SSRC isn't known yet.
    assert!(r.rtp(packet(3000, 97)));
    assert_eq!(r.buffered_packets(), 1);
    assert!(r.channels().is_empty());

    r.advance(Duration::from_millis(10));
    r.rtp(packet(1000, 96));

    // Driving time retries the buffered RTX, which now has a primary.
    r.tick();

    let channels = r.channels();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, ChannelId::from(1));
    assert_eq!(channels[0].rtp_ssrcs(), vec![1000.into(), 3000.into()]);
    assert_eq!(r.buffered_packets(), 0);

    Ok(())
}

#[test]
pub fn open_slots_fill_oldest_channel_first() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![Default::default(), Default::default()]))?;

    assert!(r.rtp(packet(5000, 96)));

    let channels = r.channels();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, ChannelId::from(1));
    assert_eq!(channels[0].rtp_ssrcs(), vec![5000.into()]);

    // The first slot is taken, the next SSRC gets the other channel.
    r.advance(Duration::from_millis(10));
    assert!(r.rtp(packet(6000, 96)));

    let channels = r.channels();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[1].id, ChannelId::from(2));
    assert_eq!(channels[1].rtp_ssrcs(), vec![6000.into()]);

    Ok(())
}
