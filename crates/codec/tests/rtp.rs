use anyhow::Result;
use voxrtp_codec::RtpPacket;

#[test]
fn parse_then_serialize_is_byte_equal_for_well_formed_packet() -> Result<()> {
    let bytes: [u8; 20] = [
        0b1001_0001, // V=2, P=0, X=0, CC=1
        0b1000_0000, // M=1, PT=0
        0x00, 0x05, // sequence 5
        0x00, 0x00, 0x00, 0xA0, // timestamp 160
        0x00, 0x00, 0x00, 0x2A, // ssrc
        0x00, 0x00, 0x00, 0x01, // csrc[0]
        0xFF, 0xFF, 0xFF, 0xFF, // payload
    ];

    let packet = RtpPacket::parse(&bytes)?;
    assert_eq!(packet.csrc, vec![1]);
    assert_eq!(packet.marker, true);
    assert_eq!(packet.serialize(), bytes.to_vec());
    Ok(())
}

#[test]
fn fifty_frame_sequence_advances_monotonically() -> Result<()> {
    let mut packets = Vec::new();
    for i in 0..50u16 {
        let packet = RtpPacket {
            padding: false,
            extension: false,
            marker: i == 0,
            payload_type: 0,
            sequence_number: i,
            timestamp: i as u32 * 160,
            ssrc: 0x1234,
            csrc: vec![],
            extension_profile: None,
            extension_value: vec![],
            payload: vec![0xFF; 160],
            padding_len: 0,
        };
        packets.push(RtpPacket::parse(&packet.serialize())?);
    }

    for window in packets.windows(2) {
        assert_eq!(window[1].timestamp - window[0].timestamp, 160);
    }

    Ok(())
}
