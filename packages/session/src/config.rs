//! Timing and retry configuration of a sync session.

use std::time::Duration;

/// Tunables of the sync protocol.
///
/// `Default` gives the values every participant is expected to run with;
/// tests shorten or disable individual timers.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Interval of `ping` to every open connection
    pub heartbeat_interval: Duration,
    /// Interval of the transport identity health check
    pub health_check_interval: Duration,
    /// Interval of periodic drift reconciliation
    pub reconcile_interval: Duration,
    pub periodic_reconcile: bool,
    /// Same-type local events inside this window are dropped
    pub debounce_window: Duration,
    /// Liveness degrades to idle when no pong arrived within this window
    pub liveness_timeout: Duration,
    /// Quiet period after the last raw `seeked` before a `seek` is sent
    pub seek_debounce: Duration,
    /// Delay of the play/pause re-send that follows a `seek`
    pub seek_follow_up: Duration,
    /// Delay before a raw `played`/`paused` is checked against the player
    pub play_pause_confirm: Duration,
    /// Delay of an automatic same-domain redirect
    pub redirect_delay: Duration,
    /// Drift (seconds) above which a remote `seek` moves the player
    pub seek_tolerance: f64,
    /// Drift (seconds) above which a remote `sync` moves the player
    pub sync_tolerance: f64,
    /// Drift (seconds) above which periodic reconciliation emits a `sync`
    pub reconcile_drift: f64,
    pub max_reconnect_attempts: u32,
    pub max_init_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            health_check_interval: Duration::from_secs(2),
            reconcile_interval: Duration::from_secs(3),
            periodic_reconcile: true,
            debounce_window: Duration::from_millis(700),
            liveness_timeout: Duration::from_millis(4000),
            seek_debounce: Duration::from_millis(100),
            seek_follow_up: Duration::from_millis(200),
            play_pause_confirm: Duration::from_millis(100),
            redirect_delay: Duration::from_millis(1500),
            seek_tolerance: 0.5,
            sync_tolerance: 2.0,
            reconcile_drift: 3.0,
            max_reconnect_attempts: 10,
            max_init_attempts: 5,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(30000),
        }
    }
}

impl SyncConfig {
    /// Reconnect delay for the given (1-based) attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.backoff_base.saturating_mul(1u32 << exponent);
        delay.min(self.backoff_max)
    }
}

/// Milliseconds of a duration as used by the clock
pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_doubles_then_caps() {
        // テスト項目: 再接続の待ち時間が倍々に増え、30 秒で頭打ちになる
        // given (前提条件):
        let config = SyncConfig::default();

        // when (操作):
        let delays: Vec<u128> = (1..=8)
            .map(|attempt| config.backoff_delay(attempt).as_millis())
            .collect();

        // then (期待する結果):
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn test_backoff_with_huge_attempt_does_not_overflow() {
        // テスト項目: 非常に大きな試行回数でもオーバーフローしない
        // given (前提条件):
        let config = SyncConfig::default();

        // when (操作):
        let delay = config.backoff_delay(u32::MAX);

        // then (期待する結果):
        assert_eq!(delay, Duration::from_millis(30000));
    }
}
