/// Warning emitted when an incoming timestamp is far from local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSkewWarning {
    /// The incoming timestamp that triggered the warning.
    pub incoming_ms: i64,
    /// The local clock reading.
    pub local_ms: i64,
    /// Detected skew in milliseconds (positive = incoming is in the future).
    pub skew_ms: i64,
    /// The threshold that was exceeded.
    pub threshold_ms: u64,
    /// Human-readable warning message.
    pub message: String,
}

/// Default skew threshold in milliseconds (5 minutes).
pub const DEFAULT_SKEW_THRESHOLD_MS: u64 = 300_000;

/// Check whether an incoming timestamp runs ahead of the local clock by
/// more than `threshold_ms`.
///
/// Only future skew is reported: old timestamps are the normal case for
/// nodes that have not been touched in a while. Nodes are NEVER rejected
/// for skew; timestamps remain authoritative for merge ordering.
#[must_use]
pub fn check_clock_skew(incoming_ms: i64, local_ms: i64, threshold_ms: u64) -> Option<ClockSkewWarning> {
    let skew_ms = incoming_ms.saturating_sub(local_ms);
    let ahead = u64::try_from(skew_ms).ok()?;

    if ahead > threshold_ms {
        let message = format!(
            "Clock skew detected: incoming timestamp is {ahead} ms in the future, threshold is {threshold_ms} ms"
        );

        Some(ClockSkewWarning {
            incoming_ms,
            local_ms,
            skew_ms,
            threshold_ms,
            message,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_skew() {
        assert!(check_clock_skew(1_050, 1_000, 100).is_none());
    }

    #[test]
    fn test_future_skew() {
        let warning = check_clock_skew(1_200, 1_000, 100).expect("skewed");
        assert_eq!(warning.skew_ms, 200);
        assert!(warning.message.contains("future"));
    }

    #[test]
    fn test_past_is_not_skew() {
        assert!(check_clock_skew(0, 1_000_000, 100).is_none());
    }
}
