use crate::{
    config::ForcePolicy,
    services::{portal::Authenticate, retry::ForcedRetryController, sleeper::Sleeper},
    store::{ConfigStore, CredentialStore},
    types::{Credentials, Endpoints, ForceLoginReport, LoginReport},
};
use anyhow::Result;
use log::{info, warn};

/// Ties the login services to the persisted state
///
/// Loads endpoints and credentials from the stores, runs one command and
/// remembers the endpoint it ended on.
pub struct SessionOrchestrator<C, K, A, S> {
    config: C,
    credential_store: K,
    authenticator: A,
    sleeper: S,
}

impl<C, K, A, S> SessionOrchestrator<C, K, A, S>
where
    C: ConfigStore,
    K: CredentialStore,
    A: Authenticate,
    S: Sleeper,
{
    pub fn new(config: C, credential_store: K, authenticator: A, sleeper: S) -> Self {
        Self {
            config,
            credential_store,
            authenticator,
            sleeper,
        }
    }

    /// Credentials of `username`, with an empty password if none is stored
    pub fn credentials(&self, username: Option<&str>) -> Result<Credentials> {
        let Some(username) = username else {
            warn!("no username configured");
            return Ok(Credentials::default());
        };

        let password = self.credential_store.password(username)?.unwrap_or_default();

        Ok(Credentials::new(username, password))
    }

    /// Regular login, skipped when the internet is already reachable
    pub fn connect(&self, credentials: &Credentials) -> Result<LoginReport> {
        self.login(credentials, false)
    }

    /// Forced login used right after setup
    pub fn bootstrap(&self, credentials: &Credentials) -> Result<LoginReport> {
        self.login(credentials, true)
    }

    /// Forced login with retries on the last used gateway
    ///
    /// Without a valid last gateway, a forced attempt over all gateways picks
    /// one first. The retry count of the report covers the pinned attempts
    /// only. The gateway of every attempt is saved as soon as it is known.
    pub fn force(
        &self,
        credentials: &Credentials,
        policy: ForcePolicy,
    ) -> Result<ForceLoginReport> {
        let endpoints = self.config.endpoints()?;

        let target = match self
            .config
            .last_endpoint()?
            .filter(|name| endpoints.contains(name))
        {
            Some(name) => name,
            None => {
                info!("no valid last location, discovering a gateway first");
                let report =
                    self.authenticator
                        .attempt_login(&endpoints, credentials, true, None);
                self.remember(&report)?;

                match report.endpoint {
                    Some(name) if !report.outcome.is_connected() => name,
                    endpoint => {
                        return Ok(ForceLoginReport {
                            success: report.outcome.is_connected(),
                            outcome: report.outcome,
                            endpoint,
                            attempts: 0,
                        });
                    }
                }
            }
        };

        let mut persisted = Ok(());
        let controller = ForcedRetryController::new(&self.authenticator, &self.sleeper);
        let report = controller.force_login(
            &endpoints,
            credentials,
            &target,
            policy.max_attempts,
            policy.delay,
            |attempt| {
                if persisted.is_ok() {
                    persisted = self.remember(attempt);
                }
            },
        );
        persisted?;

        Ok(report)
    }

    fn login(&self, credentials: &Credentials, forced: bool) -> Result<LoginReport> {
        let endpoints = self.ordered_endpoints()?;

        let report = self
            .authenticator
            .attempt_login(&endpoints, credentials, forced, None);
        self.remember(&report)?;

        Ok(report)
    }

    fn ordered_endpoints(&self) -> Result<Endpoints> {
        let endpoints = self.config.endpoints()?;
        let last = self.config.last_endpoint()?;

        Ok(endpoints.preferring(last.as_deref()))
    }

    fn remember(&self, report: &LoginReport) -> Result<()> {
        match &report.endpoint {
            Some(name) => self.config.set_last_endpoint(Some(name)),
            None => Ok(()),
        }
    }
}
