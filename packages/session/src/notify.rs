//! User-facing notification surface.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Show an advisory that disappears after `duration`
    fn notify(&self, message: &str, duration: Duration);

    /// Offer (not force) navigation to `url`
    fn offer_redirect(&self, url: &str);

    /// Navigate the local page to `url`
    fn navigate(&self, url: &str);
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, duration: Duration) {
        tracing::info!("[notice {}ms] {}", duration.as_millis(), message);
    }

    fn offer_redirect(&self, url: &str) {
        tracing::info!("Host is on another page: {} (type `nav {}` to follow)", url, url);
    }

    fn navigate(&self, url: &str) {
        tracing::info!("Navigating to {}", url);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Message(String),
    RedirectOffer(String),
    Navigate(String),
}

/// Keeps every notification. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    records: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Notification>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, _duration: Duration) {
        self.lock().push(Notification::Message(message.to_string()));
    }

    fn offer_redirect(&self, url: &str) {
        self.lock().push(Notification::RedirectOffer(url.to_string()));
    }

    fn navigate(&self, url: &str) {
        self.lock().push(Notification::Navigate(url.to_string()));
    }
}
