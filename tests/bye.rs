use std::time::Duration;

use rtp_receiver::rtp::{Goodbye, Rtcp, RtcpPacket, SenderReport};
use rtp_receiver::ReceiverError;

mod common;
use common::{init_log, packet, vp8_params, with_ssrc, TestReceiver};

fn bye(ssrc: u32) -> RtcpPacket {
    RtcpPacket::new(vec![Rtcp::Goodbye(Goodbye {
        reports: vec![ssrc.into()],
        reason: None,
    })])
}

#[test]
pub fn bye_frees_discovered_ssrc() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![Default::default()]))?;

    r.rtp(packet(5000, 96));
    assert_eq!(r.channels().len(), 1);

    // The slot is taken, another SSRC has nowhere to go.
    r.advance(Duration::from_millis(20));
    r.rtp(packet(6000, 96));
    assert_eq!(r.buffered_packets(), 1);

    r.advance(Duration::from_millis(20));
    assert!(r.rtcp(bye(5000)));

    // The buffered packet takes over the freed slot, in the same channel.
    r.advance(Duration::from_millis(20));
    r.tick();

    let channels = r.channels();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].rtp_ssrcs(), vec![5000.into(), 6000.into()]);
    assert_eq!(r.buffered_packets(), 0);

    Ok(())
}

#[test]
pub fn bye_keeps_negotiated_ssrc() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![with_ssrc(7000)]))?;

    r.rtp(packet(7000, 96));
    r.advance(Duration::from_millis(20));
    r.rtcp(bye(7000));

    r.advance(Duration::from_millis(20));
    assert!(r.rtp(packet(7000, 96)));

    let channels = r.channels();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].rtp_ssrcs(), vec![7000.into(), 7000.into()]);

    Ok(())
}

#[test]
pub fn rtcp_reaches_every_channel() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![with_ssrc(1), with_ssrc(2)]))?;

    let sr = RtcpPacket::new(vec![Rtcp::SenderReport(SenderReport {
        ssrc: 1.into(),
        ntp_time: 0,
        rtp_time: 0,
    })]);

    // No channels yet.
    assert!(!r.rtcp(sr.clone()));

    r.rtp(packet(1, 96));
    r.rtp(packet(2, 96));
    assert!(r.rtcp(sr.clone()));

    for c in r.channels() {
        assert_eq!(c.rtcp.lock().unwrap().len(), 1);
    }

    // The shared handle broadcasts the same way.
    let handle = r.channels_handle();
    assert!(handle.broadcast_rtcp(&sr));
    assert_eq!(r.channels()[0].rtcp.lock().unwrap().len(), 2);

    Ok(())
}
