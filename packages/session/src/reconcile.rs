//! Reconciliation: periodic drift correction and room URL compatibility.

use crate::{
    adapter::PlaybackState,
    config::{SyncConfig, millis},
    page::{base_url, is_same_domain},
    protocol::{EventData, PlayState},
};

/// Client reaction to a room URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlCheck {
    Matches,
    /// Follow automatically after the redirect delay
    Redirect(String),
    /// Let the user decide
    Offer(String),
}

/// Host reaction to its own navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostNavigation {
    /// New room URL to store and broadcast
    Republish(String),
    Unchanged,
    /// Another domain; the room URL stays
    Ignored,
}

/// Compare the local page against the room URL
pub fn check_room_url(local_url: Option<&str>, room_url: &str, force_redirect: bool) -> UrlCheck {
    let Some(local_url) = local_url else {
        return UrlCheck::Offer(room_url.to_string());
    };
    if base_url(local_url) == room_url {
        return UrlCheck::Matches;
    }
    if force_redirect && is_same_domain(local_url, room_url) {
        UrlCheck::Redirect(room_url.to_string())
    } else {
        UrlCheck::Offer(room_url.to_string())
    }
}

/// Decide whether a host navigation changes the room URL
pub fn host_navigation(room_url: Option<&str>, new_url: &str) -> HostNavigation {
    let base = base_url(new_url);
    match room_url {
        Some(room_url) if room_url == base => HostNavigation::Unchanged,
        Some(room_url) if !is_same_domain(room_url, new_url) => HostNavigation::Ignored,
        _ => HostNavigation::Republish(base),
    }
}

#[derive(Debug)]
pub struct Reconciler {
    interval: i64,
    enabled: bool,
    drift: f64,
    redirect_delay: i64,
    last_sent: Option<(f64, PlayState)>,
    next_check_at: Option<i64>,
    redirect: Option<(i64, String)>,
}

impl Reconciler {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            interval: millis(config.reconcile_interval),
            enabled: config.periodic_reconcile,
            drift: config.reconcile_drift,
            redirect_delay: millis(config.redirect_delay),
            last_sent: None,
            next_check_at: None,
            redirect: None,
        }
    }

    /// Arm the periodic check, if enabled
    pub fn start(&mut self, now: i64) {
        if self.enabled {
            self.next_check_at = Some(now + self.interval);
        }
    }

    pub fn stop(&mut self) {
        self.next_check_at = None;
        self.redirect = None;
        self.last_sent = None;
    }

    /// True once per interval
    pub fn check_due(&mut self, now: i64) -> bool {
        match self.next_check_at {
            Some(at) if at <= now => {
                self.next_check_at = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// `sync` payload when the player moved away from what was last sent
    pub fn drift_check(&mut self, state: PlaybackState) -> Option<EventData> {
        let play_state = PlayState::from_playing(state.playing);
        let differs = match self.last_sent {
            Some((time, sent_state)) => {
                (state.current_time - time).abs() > self.drift || sent_state != play_state
            }
            None => true,
        };
        if !differs {
            return None;
        }
        self.last_sent = Some((state.current_time, play_state));
        Some(EventData {
            current_time: Some(state.current_time),
            state: Some(play_state),
        })
    }

    pub fn schedule_redirect(&mut self, url: String, now: i64) {
        self.redirect = Some((now + self.redirect_delay, url));
    }

    pub fn take_due_redirect(&mut self, now: i64) -> Option<String> {
        match &self.redirect {
            Some((at, _)) if *at <= now => self.redirect.take().map(|(_, url)| url),
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<i64> {
        [self.next_check_at, self.redirect.as_ref().map(|(at, _)| *at)]
            .into_iter()
            .flatten()
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(current_time: f64, playing: bool) -> PlaybackState {
        PlaybackState {
            current_time,
            playing,
        }
    }

    #[test]
    fn test_drift_check_reports_only_material_changes() {
        // テスト項目: 3 秒を超えるズレか再生状態の変化があるときだけ sync を出す
        // given (前提条件):
        let mut reconciler = Reconciler::new(&SyncConfig::default());
        reconciler.drift_check(state(10.0, true));

        // when (操作):
        let small = reconciler.drift_check(state(12.9, true));
        let large = reconciler.drift_check(state(13.5, true));
        let paused = reconciler.drift_check(state(13.5, false));

        // then (期待する結果):
        assert_eq!(small, None);
        assert_eq!(
            large,
            Some(EventData {
                current_time: Some(13.5),
                state: Some(PlayState::Playing),
            })
        );
        assert_eq!(
            paused.and_then(|data| data.state),
            Some(PlayState::Paused)
        );
    }

    #[test]
    fn test_periodic_check_can_be_disabled() {
        // テスト項目: 定期同期を無効にするとチェックが予約されない
        // given (前提条件):
        let config = SyncConfig {
            periodic_reconcile: false,
            ..SyncConfig::default()
        };
        let mut reconciler = Reconciler::new(&config);

        // when (操作):
        reconciler.start(0);

        // then (期待する結果):
        assert_eq!(reconciler.next_deadline(), None);
        assert!(!reconciler.check_due(10_000));
    }

    #[test]
    fn test_host_navigation_same_domain_republishes() {
        // テスト項目: 同じドメイン内の移動はルーム URL を更新する
        // given (前提条件):
        let room_url = "https://svc.example/show/ep1";

        // when (操作):
        let decision = host_navigation(Some(room_url), "https://svc.example/show/ep2?t=5");

        // then (期待する結果):
        assert_eq!(
            decision,
            HostNavigation::Republish("https://svc.example/show/ep2".to_string())
        );
    }

    #[test]
    fn test_host_navigation_other_domain_is_ignored() {
        // テスト項目: 別ドメインへの移動はルーム URL を変えない
        // given (前提条件):
        let room_url = "https://svc.example/show/ep1";

        // when (操作):
        let decision = host_navigation(Some(room_url), "https://mail.example/inbox");

        // then (期待する結果):
        assert_eq!(decision, HostNavigation::Ignored);
    }

    #[test]
    fn test_client_redirect_requires_force_and_same_domain() {
        // テスト項目: 強制フラグかつ同一ドメインのときだけ自動で移動する
        // given (前提条件):
        let room_url = "https://svc.example/show/ep2";
        let local = Some("https://svc.example/show/ep1");

        // when (操作):
        let forced = check_room_url(local, room_url, true);
        let offered = check_room_url(local, room_url, false);
        let foreign = check_room_url(Some("https://other.example/"), room_url, true);
        let matching = check_room_url(Some("https://svc.example/show/ep2#t"), room_url, true);

        // then (期待する結果):
        assert_eq!(forced, UrlCheck::Redirect(room_url.to_string()));
        assert_eq!(offered, UrlCheck::Offer(room_url.to_string()));
        assert_eq!(foreign, UrlCheck::Offer(room_url.to_string()));
        assert_eq!(matching, UrlCheck::Matches);
    }

    #[test]
    fn test_redirect_fires_after_delay() {
        // テスト項目: 自動リダイレクトは 1500ms 後に一度だけ実行される
        // given (前提条件):
        let mut reconciler = Reconciler::new(&SyncConfig::default());
        reconciler.schedule_redirect("https://svc.example/ep2".to_string(), 1_000);

        // when (操作):
        let early = reconciler.take_due_redirect(2_499);
        let due = reconciler.take_due_redirect(2_500);
        let again = reconciler.take_due_redirect(2_600);

        // then (期待する結果):
        assert_eq!(early, None);
        assert_eq!(due.as_deref(), Some("https://svc.example/ep2"));
        assert_eq!(again, None);
    }
}
