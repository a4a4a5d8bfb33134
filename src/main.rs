#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::time::Duration;

use voxrtp::config::Config;
use voxrtp::session::SessionOptions;
use voxrtp::{RtcpEvent, Session, UdpChannel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    simple_logger::init_with_level(config.log.level.as_level())?;

    let local_addr = config
        .local_addr
        .ok_or_else(|| anyhow::anyhow!("--local-addr (or config local_addr) is required"))?;
    let remote_addr = config
        .remote_addr
        .ok_or_else(|| anyhow::anyhow!("--remote-addr (or config remote_addr) is required"))?;

    let options = SessionOptions {
        jitter_capacity: config.jitter.capacity,
        jitter_prefetch: config.jitter.prefetch,
        rtcp_bandwidth_bps: config.rtcp.bandwidth_bps,
        dtmf_payload_type: config.session.dtmf_payload_type,
        cname: config.rtcp.cname.clone(),
        close_grace: Duration::from_millis(config.session.close_grace_ms),
    };

    let session: Session<UdpChannel> =
        Session::create(local_addr, remote_addr, config.session.payload_type, options).await?;

    session.on_audio(|pcm, timestamp| {
        log::info!("audio frame: {} bytes at timestamp {timestamp}", pcm.len());
    });
    session.on_dtmf(|digit, duration| {
        log::info!("dtmf digit '{digit}' held for {duration} samples");
    });
    session.on_rtcp(|event| match event {
        RtcpEvent::Received(packets) => log::info!("rtcp: received {} packet(s)", packets.len()),
        RtcpEvent::SsrcCollision => log::warn!("rtcp: local ssrc collided, rerolled"),
    });

    log::info!("voxrtp session bound: {local_addr} <-> {remote_addr}");
    tokio::signal::ctrl_c().await?;

    session.close().await?;
    Ok(())
}
