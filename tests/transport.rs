use std::sync::Arc;
use std::time::Duration;

use rtp_receiver::rtp::{Rtcp, RtcpPacket};
use rtp_receiver::{Component, ReceiverError, TransportState};

mod common;
use common::{init_log, packet, vp8_params, with_ssrc, FakeListener, FakeTransport, TestReceiver};

#[test]
pub fn transport_state_reaches_channels() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![with_ssrc(1), with_ssrc(2)]))?;
    r.rtp(packet(1, 96));

    r.transport.set_state(TransportState::Connected);
    r.handle_transport_state_change();
    // Same state again is not repeated.
    r.handle_transport_state_change();

    assert_eq!(r.channels()[0].states(), vec![TransportState::Connected]);

    // A channel created later starts out with the current state.
    r.advance(Duration::from_millis(20));
    r.rtp(packet(2, 96));
    assert_eq!(r.channels()[1].states(), vec![TransportState::Connected]);

    // A closed transport only disconnects the channels.
    r.transport.set_state(TransportState::Closed);
    r.handle_transport_state_change();
    assert_eq!(
        r.channels()[0].states(),
        vec![TransportState::Connected, TransportState::Disconnected]
    );

    Ok(())
}

#[test]
pub fn rtcp_sender_follows_transport() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(vp8_params(vec![with_ssrc(1)]))?;
    r.rtp(packet(1, 96));

    let sender = r.channels()[0].sender.clone();
    assert!(sender.send(&[1, 2, 3]));
    assert_eq!(
        *r.transport.sent.lock().unwrap(),
        vec![(Component::Rtp, vec![1, 2, 3])]
    );

    // Separate RTCP transport.
    let listener = FakeListener::default();
    let rtp = FakeTransport::new();
    let rtcp = FakeTransport::new();
    r.set_transport(Box::new(listener), rtp.clone(), Some(rtcp.clone()));

    assert!(sender.send(&[4]));
    assert!(rtp.sent.lock().unwrap().is_empty());
    assert_eq!(*rtcp.sent.lock().unwrap(), vec![(Component::Rtcp, vec![4])]);

    // Nothing goes out after stop.
    r.stop();
    assert!(!sender.send(&[5]));
    assert_eq!(rtcp.sent.lock().unwrap().len(), 1);

    Ok(())
}

#[test]
pub fn set_transport_moves_registration() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    let params = vp8_params(vec![with_ssrc(1)]);
    r.receive(params.clone())?;
    r.rtp(packet(1, 96));

    let listener = FakeListener::default();
    let log = listener.log.clone();
    log.lock().unwrap().historical = vec![RtcpPacket::new(vec![Rtcp::Other {
        packet_type: 201,
        data: vec![],
    }])];

    let transport = FakeTransport::new();
    transport.set_state(TransportState::Connected);
    r.set_transport(Box::new(listener), transport, None);

    let id = r.id();
    assert_eq!(r.listener.lock().unwrap().unregistered, vec![id]);

    let new_log = log.lock().unwrap();
    assert_eq!(new_log.registered.len(), 1);
    assert_eq!(new_log.registered[0].0, id);
    assert_eq!(new_log.registered[0].2, params);
    drop(new_log);

    let channels = r.channels();
    let channel = &channels[0];
    assert_eq!(*channel.late_rtcp.lock().unwrap(), 1);
    assert_eq!(channel.states(), vec![TransportState::Connected]);

    Ok(())
}
