use anyhow::Result;
use voxrtp_codec::rtcp::{
    parse_compound, sdes_with_cname, serialize_compound, ReceiverReport, ReportBlock, RtcpPacket,
};

#[test]
fn rr_on_silence_then_sdes_round_trips_as_compound() -> Result<()> {
    let packets = vec![
        RtcpPacket::ReceiverReport(ReceiverReport {
            ssrc: 0xC0FFEE,
            reports: vec![ReportBlock {
                ssrc: 0xBEEF,
                fraction_lost: 0,
                cumulative_lost: 0,
                extended_highest_sequence: 65537,
                jitter: 0,
                last_sr_timestamp: 0,
                delay_since_last_sr: 0,
            }],
        }),
        RtcpPacket::Sdes(sdes_with_cname(0xC0FFEE, "user@host")),
    ];

    let bytes = serialize_compound(&packets);
    let parsed = parse_compound(&bytes)?;
    assert_eq!(parsed, packets);

    // first sub-packet must be SR or RR
    assert!(matches!(
        parsed[0],
        RtcpPacket::SenderReport(_) | RtcpPacket::ReceiverReport(_)
    ));

    Ok(())
}

#[test]
fn sequence_wrap_extended_highest_sequence_is_65537() -> Result<()> {
    // sequences 65534,65535,0,1 delivered -> cycle count 1, seq 1
    let extended = (1u32 << 16) | 1;
    assert_eq!(extended, 65537);
    Ok(())
}
