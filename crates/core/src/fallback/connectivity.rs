//! Online/offline state and the offline-view redirect.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared online flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the flag. Returns true when the state actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// The page's location.
pub trait Navigator: Send + Sync {
    /// Current location (path, optionally with query).
    fn current(&self) -> String;

    fn navigate(&self, to: &str);
}

/// A location held in memory, with the visited history.
#[derive(Debug)]
pub struct MemoryNavigator {
    history: Mutex<Vec<String>>,
}

impl MemoryNavigator {
    pub fn new(start: impl Into<String>) -> Self {
        Self { history: Mutex::new(vec![start.into()]) }
    }

    pub fn history(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Navigator for MemoryNavigator {
    fn current(&self) -> String {
        self.lock().last().cloned().unwrap_or_else(|| "/".to_string())
    }

    fn navigate(&self, to: &str) {
        tracing::info!(to, "navigating");
        self.lock().push(to.to_string());
    }
}

/// Sends the page to the offline view while offline and back afterwards.
pub struct OfflineRedirector {
    connectivity: Connectivity,
    navigator: Arc<dyn Navigator>,
    offline_path: String,
    last_page: Mutex<Option<String>>,
}

impl OfflineRedirector {
    pub fn new(connectivity: Connectivity, navigator: Arc<dyn Navigator>, offline_path: impl Into<String>) -> Self {
        Self { connectivity, navigator, offline_path: offline_path.into(), last_page: Mutex::new(None) }
    }

    fn on_offline_view(&self) -> bool {
        self.navigator.current().contains(&self.offline_path)
    }

    /// Offline and not on the offline view: remember the page and go there.
    pub fn check_and_redirect(&self) -> bool {
        if self.connectivity.is_online() || self.on_offline_view() {
            return false;
        }
        let current = self.navigator.current();
        tracing::info!(from = %current, "offline, redirecting to offline view");
        *self.last_page.lock().unwrap_or_else(|p| p.into_inner()) = Some(current);
        self.navigator.navigate(&self.offline_path);
        true
    }

    /// Online and on the offline view: go back to the remembered page, or `/`.
    pub fn return_from_offline(&self) -> bool {
        if !self.connectivity.is_online() || !self.on_offline_view() {
            return false;
        }
        let target = self
            .last_page
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or_else(|| "/".to_string());
        tracing::info!(to = %target, "back online, leaving offline view");
        self.navigator.navigate(&target);
        true
    }

    /// One poll step.
    pub fn tick(&self) -> bool {
        if self.connectivity.is_online() { self.return_from_offline() } else { self.check_and_redirect() }
    }

    /// Poll every `period` until the task is aborted.
    pub fn spawn_poll(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redirector(online: bool, start: &str) -> (Connectivity, Arc<MemoryNavigator>, OfflineRedirector) {
        let connectivity = Connectivity::new(online);
        let navigator = Arc::new(MemoryNavigator::new(start));
        let redirector = OfflineRedirector::new(connectivity.clone(), navigator.clone(), "/offline.html");
        (connectivity, navigator, redirector)
    }

    #[test]
    fn test_set_online_reports_changes() {
        let connectivity = Connectivity::new(true);
        assert!(!connectivity.set_online(true));
        assert!(connectivity.set_online(false));
        assert!(!connectivity.clone().is_online());
    }

    #[test]
    fn test_offline_redirects_and_returns() {
        let (connectivity, navigator, redirector) = redirector(true, "/news.html?id=3");
        assert!(!redirector.tick());

        connectivity.set_online(false);
        assert!(redirector.tick());
        assert_eq!(navigator.current(), "/offline.html");
        assert!(!redirector.tick(), "already on the offline view");

        connectivity.set_online(true);
        assert!(redirector.tick());
        assert_eq!(navigator.current(), "/news.html?id=3");
    }

    #[test]
    fn test_return_defaults_to_root() {
        let (_, navigator, redirector) = redirector(true, "/offline.html");
        assert!(redirector.return_from_offline());
        assert_eq!(navigator.current(), "/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_redirects() {
        let (connectivity, navigator, redirector) = redirector(false, "/index.html");
        let handle = Arc::new(redirector).spawn_poll(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(navigator.current(), "/offline.html");

        connectivity.set_online(true);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(navigator.current(), "/index.html");
        handle.abort();
    }
}
