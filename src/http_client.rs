use crate::{config::Timeouts, types::Credentials};
use anyhow::{Context, Result};
use log::debug;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::{
    blocking::{Client, Response},
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT},
    redirect::Policy,
};
use serde::Serialize;

/// Status line and body of a connectivity probe response
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeReply {
    pub status: u16,
    pub body: String,
}

/// Network operations needed to detect a captive portal and log in to a
/// SonicWall gateway
///
/// Every method is a single blocking request with its own timeout. Transport
/// failures (timeouts, DNS, refused connections) are returned as `Err`, the
/// callers decide how to classify them.
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait PortalTransport {
    /// GET a connectivity probe url without following redirects
    fn probe(&self, url: &str) -> Result<ProbeReply>;

    /// GET the gateway login page and return the response status
    fn fetch_login_page(&self, base_url: &str) -> Result<u16>;

    /// POST the credentials to the gateway auth api and return the response status
    fn authenticate(&self, base_url: &str, credentials: &Credentials) -> Result<u16>;
}

impl<T: PortalTransport + ?Sized> PortalTransport for &T {
    fn probe(&self, url: &str) -> Result<ProbeReply> {
        (**self).probe(url)
    }

    fn fetch_login_page(&self, base_url: &str) -> Result<u16> {
        (**self).fetch_login_page(base_url)
    }

    fn authenticate(&self, base_url: &str, credentials: &Credentials) -> Result<u16> {
        (**self).authenticate(base_url, credentials)
    }
}

#[derive(Debug, Serialize)]
struct AuthRequest {
    #[serde(rename = "override")]
    override_session: bool,
    snwl: bool,
}

/// reqwest based transport speaking the SonicOS login protocol
///
/// Certificate verification is disabled for all requests, the gateways use
/// self-signed certificates.
pub struct SonicWallTransport {
    probe_client: Client,
    portal_client: Client,
    timeouts: Timeouts,
}

impl SonicWallTransport {
    pub const LOGIN_PAGE_PATH: &str = "/sonicui/7/login/";
    pub const AUTH_API_PATH: &str = "/api/sonicos/auth";

    const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.93 Safari/537.36";
    const ACCEPT_VALUE: &str = "application/json, text/plain, */*";
    const SNWL_TIMER: &str = "x-snwl-timer";
    const SNWL_API_SCOPE: &str = "x-snwl-api-scope";

    pub fn new(timeouts: Timeouts) -> Result<Self> {
        let probe_client = Client::builder()
            .redirect(Policy::none())
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to create probe HTTP client")?;

        let portal_client = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to create portal HTTP client")?;

        Ok(Self {
            probe_client,
            portal_client,
            timeouts,
        })
    }

    fn build_url(base_url: &str, path: &str) -> String {
        format!("{}{path}", base_url.trim_end_matches('/'))
    }

    fn auth_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(Self::BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(Self::ACCEPT_VALUE));
        headers.insert(
            HeaderName::from_static(Self::SNWL_TIMER),
            HeaderValue::from_static("no-reset"),
        );
        headers.insert(
            HeaderName::from_static(Self::SNWL_API_SCOPE),
            HeaderValue::from_static("extended"),
        );
        headers
    }

    fn body_hint(res: Response) -> String {
        res.text()
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect()
    }
}

impl PortalTransport for SonicWallTransport {
    fn probe(&self, url: &str) -> Result<ProbeReply> {
        let res = self
            .probe_client
            .get(url)
            .timeout(self.timeouts.probe)
            .send()
            .context(format!("failed to send GET request to {url}"))?;

        let status = res.status().as_u16();
        if let Some(location) = res.headers().get(reqwest::header::LOCATION) {
            debug!("probe {url} redirects to {location:?}");
        }

        let body = match res.text() {
            Ok(body) => body,
            Err(e) => {
                debug!("failed to read probe body from {url}: {e}");
                String::new()
            }
        };

        Ok(ProbeReply { status, body })
    }

    fn fetch_login_page(&self, base_url: &str) -> Result<u16> {
        let url = Self::build_url(base_url, Self::LOGIN_PAGE_PATH);
        debug!("GET {url}");

        let res = self
            .portal_client
            .get(&url)
            .timeout(self.timeouts.reach)
            .send()
            .context(format!("failed to send GET request to {url}"))?;

        Ok(res.status().as_u16())
    }

    fn authenticate(&self, base_url: &str, credentials: &Credentials) -> Result<u16> {
        let url = Self::build_url(base_url, Self::AUTH_API_PATH);
        debug!("POST {url} for user {}", credentials.username_hint());

        let res = self
            .portal_client
            .post(&url)
            .timeout(self.timeouts.auth)
            .headers(Self::auth_headers())
            .basic_auth(&credentials.username, Some(&credentials.password))
            .json(&AuthRequest {
                override_session: false,
                snwl: true,
            })
            .send()
            .context(format!("failed to send POST request to {url}"))?;

        let status = res.status().as_u16();
        debug!("POST {url} answered {status}: {}", Self::body_hint(res));

        Ok(status)
    }
}
