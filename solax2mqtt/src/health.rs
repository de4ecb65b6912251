use std::time::Duration;

use log::{debug, warn};

pub static PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives the outcome of every cycle.
pub trait LivenessProbe {
    fn ping(&self, success: bool);
}

/// Healthchecks.io style endpoint: `GET <url>` on success, `GET <url>/fail`
/// otherwise. Without a URL every ping is skipped.
pub struct Healthchecks {
    url: Option<String>,
    agent: ureq::Agent,
}

impl Healthchecks {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        let url = url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());
        Self {
            url,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    pub fn ping_url(&self, success: bool) -> Option<String> {
        self.url.as_ref().map(|url| {
            if success {
                url.clone()
            } else {
                format!("{url}/fail")
            }
        })
    }
}

impl LivenessProbe for Healthchecks {
    fn ping(&self, success: bool) {
        let Some(url) = self.ping_url(success) else {
            debug!("Healthchecks URL is not provided. Skipping healthcheck ping.");
            return;
        };
        match self.agent.get(&url).call() {
            Ok(_) => debug!("Healthcheck ping sent to {url}"),
            Err(e) => warn!("Healthcheck ping failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_failure_urls() {
        let hc = Healthchecks::new(Some("https://hc-ping.com/abc/".to_string()), PING_TIMEOUT);
        assert!(hc.is_enabled());
        assert_eq!(hc.ping_url(true).as_deref(), Some("https://hc-ping.com/abc"));
        assert_eq!(hc.ping_url(false).as_deref(), Some("https://hc-ping.com/abc/fail"));
    }

    #[test]
    fn blank_url_disables_pinging() {
        for url in [None, Some(String::new()), Some("  ".to_string())] {
            let hc = Healthchecks::new(url, PING_TIMEOUT);
            assert!(!hc.is_enabled());
            assert_eq!(hc.ping_url(false), None);
            // must return without touching the network
            hc.ping(true);
        }
    }
}
