//! DPI stage list codec.
//!
//! Payload layout (after the storage byte of the 0x04 0x06 report):
//!   [0]      stage count
//!   [1]      active stage, 1-based
//!   [2..]    per stage: X (u16 BE), Y (u16 BE)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Most stages a device keeps.
pub const MAX_DPI_STAGES: usize = 5;

/// Bytes per encoded stage.
pub const STAGE_LEN: usize = 4;

/// One DPI stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpiStage {
    pub x: u16,
    pub y: u16,
}

impl DpiStage {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// What to do with input that exceeds a device limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationPolicy {
    /// Drop the excess and log a warning.
    #[default]
    Truncate,
    /// Reject the input.
    Strict,
}

/// Encode a stage list.
///
/// `active` must lie in `1..=stages.len()`. Lists longer than
/// [`MAX_DPI_STAGES`] are cut down under [`TruncationPolicy::Truncate`] and
/// rejected under [`TruncationPolicy::Strict`].
pub fn encode_stages(stages: &[DpiStage], active: u8, policy: TruncationPolicy) -> Result<Vec<u8>> {
    check_active(active, stages.len())?;

    let kept = if stages.len() > MAX_DPI_STAGES {
        match policy {
            TruncationPolicy::Strict => {
                return Err(Error::InvalidPayloadSize {
                    actual: stages.len(),
                    expected: MAX_DPI_STAGES,
                })
            }
            TruncationPolicy::Truncate => {
                warn!(
                    requested = stages.len(),
                    kept = MAX_DPI_STAGES,
                    "Truncating DPI stage list"
                );
                &stages[..MAX_DPI_STAGES]
            }
        }
    } else {
        stages
    };
    // The active stage may have been cut off.
    check_active(active, kept.len())?;

    let mut out = Vec::with_capacity(2 + kept.len() * STAGE_LEN);
    out.push(kept.len() as u8);
    out.push(active);
    for stage in kept {
        out.extend_from_slice(&stage.x.to_be_bytes());
        out.extend_from_slice(&stage.y.to_be_bytes());
    }
    Ok(out)
}

/// Decode a stage list, returning `(active, stages)`.
///
/// Reads at most [`MAX_DPI_STAGES`] stages and never past the end of
/// `payload`, whatever the count byte claims. The active index is returned
/// as the device reported it.
pub fn decode_stages(payload: &[u8]) -> Result<(u8, Vec<DpiStage>)> {
    if payload.len() < 2 {
        return Err(Error::MalformedResponse(format!(
            "DPI stage payload too short: {} bytes",
            payload.len()
        )));
    }
    let count = (payload[0] as usize).min(MAX_DPI_STAGES);
    let active = payload[1];

    let stages: Vec<DpiStage> = payload[2..]
        .chunks_exact(STAGE_LEN)
        .take(count)
        .map(|c| DpiStage {
            x: u16::from_be_bytes([c[0], c[1]]),
            y: u16::from_be_bytes([c[2], c[3]]),
        })
        .collect();

    if stages.len() < payload[0] as usize {
        warn!(
            claimed = payload[0],
            decoded = stages.len(),
            "DPI stage count exceeds payload"
        );
    }
    Ok((active, stages))
}

fn check_active(active: u8, count: usize) -> Result<()> {
    if active == 0 || active as usize > count {
        return Err(Error::InvalidActiveStage { active, count });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn three() -> Vec<DpiStage> {
        vec![
            DpiStage::new(800, 800),
            DpiStage::new(1800, 1800),
            DpiStage::new(3600, 3200),
        ]
    }

    #[test]
    fn encode_layout() {
        let bytes = encode_stages(&three(), 2, TruncationPolicy::Truncate).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x03, 0x02, // count, active
                0x03, 0x20, 0x03, 0x20, // 800x800
                0x07, 0x08, 0x07, 0x08, // 1800x1800
                0x0E, 0x10, 0x0C, 0x80, // 3600x3200
            ]
        );
    }

    #[test]
    fn three_stage_roundtrip() {
        let bytes = encode_stages(&three(), 2, TruncationPolicy::Strict).unwrap();
        let (active, stages) = decode_stages(&bytes).unwrap();
        assert_eq!(active, 2);
        assert_eq!(stages, three());
    }

    #[test]
    fn active_out_of_range() {
        for active in [0u8, 4] {
            let err = encode_stages(&three(), active, TruncationPolicy::Truncate).unwrap_err();
            assert!(matches!(
                err,
                Error::InvalidActiveStage { active: a, count: 3 } if a == active
            ));
        }
        assert!(encode_stages(&[], 1, TruncationPolicy::Truncate).is_err());
    }

    #[test]
    fn overlong_list_truncates_or_fails() {
        let stages: Vec<_> = (1..=7).map(|i| DpiStage::new(i * 400, i * 400)).collect();

        let bytes = encode_stages(&stages, 3, TruncationPolicy::Truncate).unwrap();
        assert_eq!(bytes[0], MAX_DPI_STAGES as u8);
        assert_eq!(bytes.len(), 2 + MAX_DPI_STAGES * STAGE_LEN);

        let err = encode_stages(&stages, 3, TruncationPolicy::Strict).unwrap_err();
        assert!(matches!(err, Error::InvalidPayloadSize { actual: 7, expected: 5 }));

        // Active stage 7 is dropped by truncation.
        let err = encode_stages(&stages, 7, TruncationPolicy::Truncate).unwrap_err();
        assert!(matches!(err, Error::InvalidActiveStage { active: 7, count: 5 }));
    }

    #[test]
    fn decode_never_reads_past_payload() {
        // Count claims 5 stages, only one and a half are present.
        let payload = [0x05, 0x01, 0x03, 0x20, 0x03, 0x20, 0x07, 0x08];
        let (active, stages) = decode_stages(&payload).unwrap();
        assert_eq!(active, 1);
        assert_eq!(stages, vec![DpiStage::new(800, 800)]);
    }

    #[test]
    fn decode_caps_at_max_stages() {
        let mut payload = vec![0xFF, 0x01];
        payload.extend(std::iter::repeat([0x01, 0x00, 0x01, 0x00]).take(8).flatten());
        let (_, stages) = decode_stages(&payload).unwrap();
        assert_eq!(stages.len(), MAX_DPI_STAGES);
    }

    #[test]
    fn decode_short_payload() {
        assert!(matches!(
            decode_stages(&[0x01]),
            Err(Error::MalformedResponse(_))
        ));
    }

    proptest! {
        #[test]
        fn roundtrip_within_limits(
            raw in proptest::collection::vec((any::<u16>(), any::<u16>()), 1..=MAX_DPI_STAGES),
            pick in any::<prop::sample::Index>(),
        ) {
            let stages: Vec<_> = raw.iter().map(|&(x, y)| DpiStage::new(x, y)).collect();
            let active = (pick.index(stages.len()) + 1) as u8;
            let bytes = encode_stages(&stages, active, TruncationPolicy::Strict).unwrap();
            let (got_active, got) = decode_stages(&bytes).unwrap();
            prop_assert_eq!(got_active, active);
            prop_assert_eq!(got, stages);
        }
    }
}
