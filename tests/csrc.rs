use std::time::Duration;

use rtp_receiver::format::HeaderExtensionParameters;
use rtp_receiver::rtp::Extension;
use rtp_receiver::ReceiverError;

mod common;
use common::{init_log, one_byte_ext, opus_params, packet, with_ssrc, TestReceiver, LEVEL_EXT_ID};

const CSRC_LEVELS_EXT_ID: u8 = 2;

#[test]
pub fn audio_levels_tracked_per_source() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    let mut params = opus_params(vec![with_ssrc(1)]);
    params.header_extensions.push(HeaderExtensionParameters {
        uri: Extension::CsrcAudioLevels.as_uri().to_string(),
        id: CSRC_LEVELS_EXT_ID,
        encrypt: false,
    });
    r.receive(params)?;

    let mut p = packet(1, 111).with_extensions(
        0xBEDE,
        one_byte_ext(&[
            (LEVEL_EXT_ID, &[0x80 | 30][..]),
            (CSRC_LEVELS_EXT_ID, &[10, 20][..]),
        ]),
    );
    p.csrc = vec![100.into(), 200.into()];
    assert!(r.rtp(p));

    let sources = r.contributing_sources();
    assert_eq!(sources.len(), 3);

    assert_eq!(sources[0].csrc, 1.into());
    assert_eq!(sources[0].audio_level, -30);
    assert_eq!(sources[0].voice_activity, Some(true));

    assert_eq!(sources[1].csrc, 100.into());
    assert_eq!(sources[1].audio_level, -10);
    assert_eq!(sources[1].voice_activity, None);

    assert_eq!(sources[2].csrc, 200.into());
    assert_eq!(sources[2].audio_level, -20);
    assert_eq!(sources[2].timestamp, r.now);

    Ok(())
}

#[test]
pub fn sources_expire() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    r.receive(opus_params(vec![with_ssrc(1)]))?;

    let p = packet(1, 111).with_extensions(0xBEDE, one_byte_ext(&[(LEVEL_EXT_ID, &[40][..])]));
    r.rtp(p);
    assert_eq!(r.contributing_sources().len(), 1);

    r.advance(Duration::from_secs(6));
    r.tick();
    assert_eq!(r.contributing_sources().len(), 1);

    r.advance(Duration::from_secs(6));
    r.tick();
    assert!(r.contributing_sources().is_empty());

    Ok(())
}

#[test]
pub fn unregistered_extension_is_ignored() -> Result<(), ReceiverError> {
    init_log();

    let mut r = TestReceiver::new();
    let mut params = opus_params(vec![with_ssrc(1)]);
    params.header_extensions.clear();
    r.receive(params)?;

    let p = packet(1, 111).with_extensions(0xBEDE, one_byte_ext(&[(LEVEL_EXT_ID, &[40][..])]));
    r.rtp(p);
    assert!(r.contributing_sources().is_empty());

    Ok(())
}
