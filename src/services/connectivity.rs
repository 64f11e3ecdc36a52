use crate::http_client::{PortalTransport, ProbeReply};
use log::{info, warn};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// Answers whether the host currently has genuine internet access
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait ConnectivityCheck {
    fn is_connected(&self) -> bool;
}

impl<C: ConnectivityCheck + ?Sized> ConnectivityCheck for &C {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// A well-known connectivity check url
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeTarget {
    pub label: String,
    pub url: String,
    /// Body text proving the real endpoint answered, for endpoints that
    /// don't reply with 204
    pub success_marker: Option<String>,
}

impl ProbeTarget {
    pub fn new(label: &str, url: &str, success_marker: Option<&str>) -> Self {
        Self {
            label: label.to_string(),
            url: url.to_string(),
            success_marker: success_marker.map(str::to_string),
        }
    }

    /// Probe list for the platform this binary was built for
    pub fn platform_defaults() -> Vec<Self> {
        let google = Self::new("google", "http://clients3.google.com/generate_204", None);

        if cfg!(target_os = "macos") {
            vec![
                Self::new(
                    "apple",
                    "http://captive.apple.com/hotspot-detect.html",
                    Some("Success"),
                ),
                google,
            ]
        } else {
            vec![
                google,
                Self::new(
                    "msft",
                    "http://www.msftconnecttest.com/connecttest.txt",
                    Some("Microsoft Connect Test"),
                ),
            ]
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verdict {
    Connected,
    Captive,
    Inconclusive,
}

const REDIRECT_STATUSES: [u16; 4] = [301, 302, 307, 308];

/// Connectivity check against the probe targets, one after the other
///
/// Holds no state between calls, every call probes from scratch.
pub struct ConnectivityProbe<T> {
    transport: T,
    targets: Vec<ProbeTarget>,
}

impl<T: PortalTransport> ConnectivityProbe<T> {
    pub fn new(transport: T) -> Self {
        Self::with_targets(transport, ProbeTarget::platform_defaults())
    }

    pub fn with_targets(transport: T, targets: Vec<ProbeTarget>) -> Self {
        Self { transport, targets }
    }

    fn classify(target: &ProbeTarget, reply: &ProbeReply) -> Verdict {
        if reply.status == 204 {
            return Verdict::Connected;
        }

        if target
            .success_marker
            .as_deref()
            .is_some_and(|marker| reply.body.contains(marker))
        {
            return Verdict::Connected;
        }

        if REDIRECT_STATUSES.contains(&reply.status) {
            return Verdict::Captive;
        }

        Verdict::Inconclusive
    }
}

impl<T: PortalTransport> ConnectivityCheck for ConnectivityProbe<T> {
    fn is_connected(&self) -> bool {
        for target in &self.targets {
            let reply = match self.transport.probe(&target.url) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("internet check ({}) failed: {e:#}", target.label);
                    continue;
                }
            };

            let hint: String = reply.body.chars().take(30).collect();
            info!(
                "internet check ({}): {}, status: {}, content hint: {hint:?}",
                target.label, target.url, reply.status
            );

            match Self::classify(target, &reply) {
                Verdict::Connected => {
                    info!("connection verified via {}", target.label);
                    return true;
                }
                Verdict::Captive => {
                    warn!(
                        "internet check ({}) was redirected, likely captive portal",
                        target.label
                    );
                    return false;
                }
                Verdict::Inconclusive => {}
            }
        }

        info!("no endpoint confirmed a direct internet connection");
        false
    }
}
