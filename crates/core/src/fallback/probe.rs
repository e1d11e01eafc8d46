//! Network quality probe.
//!
//! Times a small same-origin request. Under 300 ms is good, under 1 s is
//! medium, anything slower, a failed probe or being offline is poor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use super::connectivity::Connectivity;
use crate::Error;
use crate::http::{Network, Request};

const GOOD_BELOW: Duration = Duration::from_millis(300);
const MEDIUM_BELOW: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Good,
    Medium,
    Poor,
    #[default]
    Unknown,
}

impl std::fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Good => "good",
            Self::Medium => "medium",
            Self::Poor => "poor",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

pub fn classify(elapsed: Duration) -> NetworkQuality {
    if elapsed < GOOD_BELOW {
        NetworkQuality::Good
    } else if elapsed < MEDIUM_BELOW {
        NetworkQuality::Medium
    } else {
        NetworkQuality::Poor
    }
}

pub struct QualityProbe {
    network: Arc<dyn Network>,
    origin: Url,
    connectivity: Connectivity,
    quality: watch::Sender<NetworkQuality>,
}

impl QualityProbe {
    pub fn new(network: Arc<dyn Network>, origin: Url, connectivity: Connectivity) -> Self {
        let (quality, _) = watch::channel(NetworkQuality::Unknown);
        Self { network, origin, connectivity, quality }
    }

    /// Last measured quality.
    pub fn quality(&self) -> NetworkQuality {
        *self.quality.borrow()
    }

    /// Force a quality without probing (e.g. poor on going offline).
    pub fn set_quality(&self, quality: NetworkQuality) {
        self.quality.send_replace(quality);
    }

    fn probe_url(&self) -> Result<Url, Error> {
        let path = format!("/favicon.ico?_={}", chrono::Utc::now().timestamp_millis());
        self.origin.join(&path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
    }

    /// Measure once and record the result.
    pub async fn probe(&self) -> NetworkQuality {
        let quality = if !self.connectivity.is_online() {
            NetworkQuality::Poor
        } else {
            self.measure().await
        };
        self.set_quality(quality);
        quality
    }

    async fn measure(&self) -> NetworkQuality {
        let url = match self.probe_url() {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "cannot build probe url");
                return NetworkQuality::Poor;
            }
        };
        let started = Instant::now();
        match self.network.fetch(&Request::get(url)).await {
            Ok(_) => {
                let elapsed = started.elapsed();
                let quality = classify(elapsed);
                tracing::debug!(%quality, elapsed_ms = elapsed.as_millis() as u64, "network quality measured");
                quality
            }
            Err(e) => {
                tracing::warn!(error = %e, "network probe failed");
                NetworkQuality::Poor
            }
        }
    }

    /// Probe every `period` until the task is aborted.
    pub fn spawn_loop(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.probe().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNetwork, ORIGIN};

    #[test]
    fn test_classify_thresholds() {
        assert_eq!(classify(Duration::from_millis(0)), NetworkQuality::Good);
        assert_eq!(classify(Duration::from_millis(299)), NetworkQuality::Good);
        assert_eq!(classify(Duration::from_millis(300)), NetworkQuality::Medium);
        assert_eq!(classify(Duration::from_millis(999)), NetworkQuality::Medium);
        assert_eq!(classify(Duration::from_millis(1000)), NetworkQuality::Poor);
    }

    fn probe(network: Arc<FakeNetwork>, online: bool) -> QualityProbe {
        QualityProbe::new(network, Url::parse(ORIGIN).unwrap(), Connectivity::new(online))
    }

    #[tokio::test]
    async fn test_offline_is_poor_without_fetching() {
        let network = Arc::new(FakeNetwork::new());
        let probe = probe(network.clone(), false);
        assert_eq!(probe.probe().await, NetworkQuality::Poor);
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_probe_is_poor() {
        let network = Arc::new(FakeNetwork::new().offline());
        let probe = probe(network, true);
        assert_eq!(probe.probe().await, NetworkQuality::Poor);
        assert_eq!(probe.quality(), NetworkQuality::Poor);
    }

    #[tokio::test]
    async fn test_fast_probe_hits_favicon() {
        let network = Arc::new(FakeNetwork::new());
        let probe = probe(network.clone(), true);
        assert_eq!(probe.quality(), NetworkQuality::Unknown);
        assert_eq!(probe.probe().await, NetworkQuality::Good);
        assert_eq!(network.requested(), vec!["/favicon.ico".to_string()]);
    }
}
