//! DTMF assembly: turns a digit into the RFC 4733 packet train the session
//! sends, and reassembles inbound telephone-event packets back into single
//! digit events.
//!
//! Wire framing of the 4-byte telephone-event payload lives in
//! `voxrtp_codec::dtmf`; this module owns the send-side packet-train
//! construction and the receive-side per-timestamp grouping state machine,
//! which is genuinely session-local (it tracks wall-clock timeouts) and has
//! no wire-format concern.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use voxrtp_codec::dtmf::{digit_to_event, event_to_digit, TelephoneEventPayload};

/// Samples per non-end packet step at the 8 kHz clock RFC 4733 telephone
/// events assume.
const STEP_SAMPLES: u16 = 160;
const END_PACKET_REPEATS: usize = 3;
const GROUP_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DtmfError {
    #[error("'{0}' is not a valid DTMF digit")]
    InvalidDigit(char),
}

/// One outbound telephone-event packet plus whether the session's marker
/// bit should be set when it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEvent {
    pub payload: TelephoneEventPayload,
    pub marker: bool,
}

/// Builds the full packet train for one DTMF send: non-end packets growing
/// by [`STEP_SAMPLES`] until `duration_ms` is reached, followed by three
/// identical end packets for loss redundancy.
pub fn send_plan(
    digit: char,
    duration_ms: u32,
    volume: u8,
) -> Result<Vec<PlannedEvent>, DtmfError> {
    let event = digit_to_event(digit).ok_or(DtmfError::InvalidDigit(digit))?;
    let total_samples = (duration_ms * 8000 / 1000) as u16;

    let mut plan = Vec::new();
    let mut elapsed = 0u16;
    let mut first = true;

    while elapsed < total_samples {
        elapsed = (elapsed + STEP_SAMPLES).min(total_samples);
        plan.push(PlannedEvent {
            payload: TelephoneEventPayload {
                event,
                end: false,
                volume,
                duration: elapsed,
            },
            marker: first,
        });
        first = false;
    }

    for _ in 0..END_PACKET_REPEATS {
        plan.push(PlannedEvent {
            payload: TelephoneEventPayload {
                event,
                end: true,
                volume,
                duration: total_samples,
            },
            marker: false,
        });
    }

    Ok(plan)
}

/// A fully reassembled DTMF event, ready for `on_dtmf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtmfEvent {
    pub digit: char,
    pub end: bool,
    pub volume: u8,
    pub duration: u16,
}

struct Group {
    event: u8,
    volume: u8,
    max_duration: u16,
    delivered: bool,
    last_seen: Instant,
}

/// Receive-side grouping state, keyed by the RTP timestamp shared across a
/// digit's whole packet train.
#[derive(Default)]
pub struct Assembler {
    groups: HashMap<u32, Group>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one inbound telephone-event packet. Returns the assembled
    /// event the first time an end packet for its group arrives; duplicate
    /// end packets for an already-delivered group are suppressed.
    pub fn on_packet(&mut self, timestamp: u32, payload: TelephoneEventPayload) -> Option<DtmfEvent> {
        let now = Instant::now();
        let group = self.groups.entry(timestamp).or_insert_with(|| Group {
            event: payload.event,
            volume: payload.volume,
            max_duration: 0,
            delivered: false,
            last_seen: now,
        });

        group.last_seen = now;
        group.max_duration = group.max_duration.max(payload.duration);

        if payload.end && !group.delivered {
            group.delivered = true;
            let digit = event_to_digit(group.event)?;
            return Some(DtmfEvent {
                digit,
                end: true,
                volume: group.volume,
                duration: group.max_duration,
            });
        }

        None
    }

    /// Flushes any group that has gone 200 ms without an end packet since
    /// its last non-end packet. Call this periodically from the session's
    /// own timer; groups already `delivered` are dropped silently once
    /// they age out.
    pub fn expire(&mut self, now: Instant) -> Vec<DtmfEvent> {
        let mut expired = Vec::new();
        self.groups.retain(|_, group| {
            if now.duration_since(group.last_seen) < GROUP_TIMEOUT {
                return true;
            }

            if !group.delivered {
                if let Some(digit) = event_to_digit(group.event) {
                    expired.push(DtmfEvent {
                        digit,
                        end: false,
                        volume: group.volume,
                        duration: group.max_duration,
                    });
                }
            }

            false
        });

        expired
    }
}
