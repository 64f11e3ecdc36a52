//! Shared data model: endpoints, credentials and login outcomes.

use serde::Serialize;
use std::fmt;

/// A captive-portal gateway reachable at `base_url`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub base_url: String,
}

/// Ordered set of endpoints keyed by name.
///
/// Iteration follows insertion order. Inserting a name that is already
/// present replaces its url in place, so names stay unique.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Endpoints(Vec<Endpoint>);

impl Endpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, base_url: impl Into<String>) {
        let name = name.into();
        let base_url = base_url.into();

        match self.0.iter_mut().find(|e| e.name == name) {
            Some(existing) => existing.base_url = base_url,
            None => self.0.push(Endpoint { name, base_url }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.0.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a copy with `name` moved to the front, other entries keep
    /// their relative order. Unknown or missing names leave the order as is.
    pub fn preferring(&self, name: Option<&str>) -> Self {
        let Some(first) = name.and_then(|n| self.get(n)) else {
            return self.clone();
        };

        let mut ordered = Vec::with_capacity(self.0.len());
        ordered.push(first.clone());
        ordered.extend(self.0.iter().filter(|e| e.name != first.name).cloned());

        Self(ordered)
    }
}

impl<N, U> FromIterator<(N, U)> for Endpoints
where
    N: Into<String>,
    U: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, U)>>(iter: I) -> Self {
        let mut endpoints = Self::new();
        for (name, base_url) in iter {
            endpoints.insert(name, base_url);
        }
        endpoints
    }
}

impl<'a> IntoIterator for &'a Endpoints {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Portal login credentials.
///
/// `Debug` masks both fields so credentials can't leak through logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn username_hint(&self) -> String {
        username_hint(&self.username)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username_hint())
            .field("password", &"***")
            .finish()
    }
}

/// Masks a username for display: `abc***xyz` for names longer than five
/// characters, `abc***` otherwise.
pub fn username_hint(username: &str) -> String {
    let chars: Vec<char> = username.chars().collect();
    let head: String = chars.iter().take(3).collect();

    if chars.len() > 5 {
        let tail: String = chars[chars.len() - 3..].iter().collect();
        format!("{head}***{tail}")
    } else {
        format!("{head}***")
    }
}

/// Result classification of a single login attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    LoginSuccessful,
    #[serde(rename = "AUTH_FAILED_401")]
    AuthFailed401,
    AuthOkNoInternet,
    PostError,
    NoLocationReachable,
    AlreadyConnected,
    MissingCredentials,
}

impl Outcome {
    /// Whether the host ends up with working internet access.
    pub fn is_connected(self) -> bool {
        matches!(self, Outcome::LoginSuccessful | Outcome::AlreadyConnected)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::LoginSuccessful => "login successful",
            Outcome::AuthFailed401 => "authentication rejected (401)",
            Outcome::AuthOkNoInternet => "authenticated but no internet access",
            Outcome::PostError => "authentication request failed",
            Outcome::NoLocationReachable => "no location reachable",
            Outcome::AlreadyConnected => "already connected",
            Outcome::MissingCredentials => "missing credentials",
        };
        f.write_str(s)
    }
}

/// Outcome of one `attempt_login` call plus the endpoint it concerns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoginReport {
    pub outcome: Outcome,
    pub endpoint: Option<String>,
}

impl LoginReport {
    pub fn new(outcome: Outcome, endpoint: impl Into<String>) -> Self {
        Self {
            outcome,
            endpoint: Some(endpoint.into()),
        }
    }

    pub fn without_endpoint(outcome: Outcome) -> Self {
        Self {
            outcome,
            endpoint: None,
        }
    }
}

/// Final state of a forced-retry run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForceLoginReport {
    pub success: bool,
    pub outcome: Outcome,
    pub endpoint: Option<String>,
    pub attempts: u32,
}
