use crate::{
    http_client::PortalTransport,
    services::{connectivity::ConnectivityCheck, sleeper::Sleeper},
    types::{Credentials, Endpoint, Endpoints, LoginReport, Outcome},
};
use log::{error, info, warn};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use std::time::Duration;

/// A single login attempt over a set of gateways
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait Authenticate {
    /// Try to log in, returning the outcome and the endpoint it concerns
    ///
    /// # Arguments
    /// * `endpoints` - Candidate gateways, tried in the given order
    /// * `credentials` - Portal credentials
    /// * `forced` - Skip the initial connectivity check
    /// * `pinned` - Only try this endpoint. Unknown or empty names fall back
    ///   to the full set.
    fn attempt_login<'a>(
        &self,
        endpoints: &Endpoints,
        credentials: &Credentials,
        forced: bool,
        pinned: Option<&'a str>,
    ) -> LoginReport;
}

impl<A: Authenticate + ?Sized> Authenticate for &A {
    fn attempt_login<'a>(
        &self,
        endpoints: &Endpoints,
        credentials: &Credentials,
        forced: bool,
        pinned: Option<&'a str>,
    ) -> LoginReport {
        (**self).attempt_login(endpoints, credentials, forced, pinned)
    }
}

/// Two-phase SonicWall login: a reachability GET on the login page, then the
/// authentication POST on the first gateway that answered
pub struct PortalAuthenticator<C, T, S> {
    connectivity: C,
    transport: T,
    sleeper: S,
    settle_delay: Duration,
}

impl<C, T, S> PortalAuthenticator<C, T, S>
where
    C: ConnectivityCheck,
    T: PortalTransport,
    S: Sleeper,
{
    pub fn new(connectivity: C, transport: T, sleeper: S, settle_delay: Duration) -> Self {
        Self {
            connectivity,
            transport,
            sleeper,
            settle_delay,
        }
    }

    fn is_reachable(&self, endpoint: &Endpoint) -> bool {
        info!("checking reachability of {} ({})", endpoint.name, endpoint.base_url);

        match self.transport.fetch_login_page(&endpoint.base_url) {
            Ok(200) => true,
            Ok(status) => {
                warn!("{}: login page answered {status}", endpoint.name);
                false
            }
            Err(e) => {
                warn!("{}: login page unreachable: {e:#}", endpoint.name);
                false
            }
        }
    }

    fn authenticate(&self, endpoint: &Endpoint, credentials: &Credentials) -> LoginReport {
        info!("{} reachable, posting credentials", endpoint.name);

        let outcome = match self.transport.authenticate(&endpoint.base_url, credentials) {
            Ok(200) => {
                self.sleeper.sleep(self.settle_delay);

                if self.connectivity.is_connected() {
                    info!("logged in at {}, internet confirmed", endpoint.name);
                    Outcome::LoginSuccessful
                } else {
                    warn!("login at {} accepted but internet check failed", endpoint.name);
                    Outcome::AuthOkNoInternet
                }
            }
            Ok(401) => {
                warn!(
                    "login at {} rejected for user {}: 401 unauthorized",
                    endpoint.name,
                    credentials.username_hint()
                );
                Outcome::AuthFailed401
            }
            Ok(status) => {
                warn!("login at {} failed with status {status}", endpoint.name);
                Outcome::PostError
            }
            Err(e) => {
                warn!("login at {} failed: {e:#}", endpoint.name);
                Outcome::PostError
            }
        };

        LoginReport::new(outcome, &endpoint.name)
    }
}

impl<C, T, S> Authenticate for PortalAuthenticator<C, T, S>
where
    C: ConnectivityCheck,
    T: PortalTransport,
    S: Sleeper,
{
    fn attempt_login<'a>(
        &self,
        endpoints: &Endpoints,
        credentials: &Credentials,
        forced: bool,
        pinned: Option<&'a str>,
    ) -> LoginReport {
        let pinned = pinned.filter(|name| !name.is_empty());

        if !credentials.is_complete() {
            error!("login attempt with missing username or password");
            return LoginReport::without_endpoint(Outcome::MissingCredentials);
        }

        if !forced && self.connectivity.is_connected() {
            info!("already connected, skipping login");
            return LoginReport::without_endpoint(Outcome::AlreadyConnected);
        }

        info!(
            "starting login for user {}, forced: {forced}, pinned: {pinned:?}",
            credentials.username_hint()
        );

        let candidates: Vec<&Endpoint> = match pinned.and_then(|name| endpoints.get(name)) {
            Some(endpoint) => vec![endpoint],
            None => {
                if let Some(name) = pinned {
                    warn!("pinned location {name} not configured, trying all locations");
                }
                endpoints.iter().collect()
            }
        };

        for endpoint in candidates {
            if self.is_reachable(endpoint) {
                // any answer to the POST ends the attempt, a 401 included
                return self.authenticate(endpoint, credentials);
            }

            if pinned.is_some() {
                return LoginReport::new(Outcome::NoLocationReachable, &endpoint.name);
            }
        }

        warn!("no configured location was reachable");
        LoginReport::without_endpoint(Outcome::NoLocationReachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        http_client::MockPortalTransport, services::connectivity::MockConnectivityCheck,
        services::sleeper::MockSleeper,
    };
    use anyhow::anyhow;
    use mockall::{Sequence, predicate::eq};

    const URL_A: &str = "https://a.test:444";
    const URL_B: &str = "https://b.test:444";
    const SETTLE: Duration = Duration::from_secs(2);

    type Authenticator =
        PortalAuthenticator<MockConnectivityCheck, MockPortalTransport, MockSleeper>;

    fn endpoints() -> Endpoints {
        [("A", URL_A), ("B", URL_B)].into_iter().collect()
    }

    fn credentials() -> Credentials {
        Credentials::new("m.rossi42", "secret")
    }

    fn authenticator(
        connectivity: MockConnectivityCheck,
        transport: MockPortalTransport,
        sleeper: MockSleeper,
    ) -> Authenticator {
        PortalAuthenticator::new(connectivity, transport, sleeper, SETTLE)
    }

    fn offline_transport() -> MockPortalTransport {
        let mut transport = MockPortalTransport::new();
        transport.expect_probe().never();
        transport.expect_fetch_login_page().never();
        transport.expect_authenticate().never();
        transport
    }

    fn connected_after_login() -> MockConnectivityCheck {
        let mut connectivity = MockConnectivityCheck::new();
        connectivity.expect_is_connected().times(1).return_const(true);
        connectivity
    }

    fn settles_once() -> MockSleeper {
        let mut sleeper = MockSleeper::new();
        sleeper.expect_sleep().with(eq(SETTLE)).times(1).return_const(());
        sleeper
    }

    fn never_sleeps() -> MockSleeper {
        let mut sleeper = MockSleeper::new();
        sleeper.expect_sleep().never();
        sleeper
    }

    mod short_circuits {
        use super::*;

        #[test]
        fn already_connected_skips_network() {
            let mut connectivity = MockConnectivityCheck::new();
            connectivity.expect_is_connected().times(1).return_const(true);

            let report = authenticator(connectivity, offline_transport(), never_sleeps())
                .attempt_login(&endpoints(), &credentials(), false, None);

            assert_eq!(report, LoginReport::without_endpoint(Outcome::AlreadyConnected));
        }

        #[test]
        fn empty_username_skips_network() {
            let mut connectivity = MockConnectivityCheck::new();
            connectivity.expect_is_connected().never();

            let report = authenticator(connectivity, offline_transport(), never_sleeps())
                .attempt_login(&endpoints(), &Credentials::new("", "secret"), false, None);

            assert_eq!(report, LoginReport::without_endpoint(Outcome::MissingCredentials));
        }

        #[test]
        fn empty_password_skips_network_even_when_forced_and_pinned() {
            let mut connectivity = MockConnectivityCheck::new();
            connectivity.expect_is_connected().never();

            let report = authenticator(connectivity, offline_transport(), never_sleeps())
                .attempt_login(&endpoints(), &Credentials::new("user", ""), true, Some("A"));

            assert_eq!(report, LoginReport::without_endpoint(Outcome::MissingCredentials));
        }
    }

    mod full_iteration {
        use super::*;

        #[test]
        fn unreachable_first_endpoint_falls_through_to_second() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_A))
                .times(1)
                .returning(|_| Err(anyhow!("connection timed out")));
            transport
                .expect_fetch_login_page()
                .with(eq(URL_B))
                .times(1)
                .returning(|_| Ok(200));
            transport
                .expect_authenticate()
                .withf(|url, creds| url == URL_B && creds.username == "m.rossi42")
                .times(1)
                .returning(|_, _| Ok(200));

            let report = authenticator(connected_after_login(), transport, settles_once())
                .attempt_login(&endpoints(), &credentials(), true, None);

            assert_eq!(report, LoginReport::new(Outcome::LoginSuccessful, "B"));
        }

        #[test]
        fn non_200_login_page_counts_as_unreachable() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_A))
                .times(1)
                .returning(|_| Ok(503));
            transport
                .expect_fetch_login_page()
                .with(eq(URL_B))
                .times(1)
                .returning(|_| Ok(404));
            transport.expect_authenticate().never();

            let mut connectivity = MockConnectivityCheck::new();
            connectivity.expect_is_connected().never();

            let report = authenticator(connectivity, transport, never_sleeps())
                .attempt_login(&endpoints(), &credentials(), true, None);

            assert_eq!(report, LoginReport::without_endpoint(Outcome::NoLocationReachable));
        }

        #[test]
        fn captive_check_then_login_when_not_forced() {
            let mut seq = Sequence::new();
            let mut connectivity = MockConnectivityCheck::new();
            connectivity
                .expect_is_connected()
                .times(1)
                .in_sequence(&mut seq)
                .return_const(false);
            connectivity
                .expect_is_connected()
                .times(1)
                .in_sequence(&mut seq)
                .return_const(true);

            let mut transport = MockPortalTransport::new();
            transport.expect_fetch_login_page().times(1).returning(|_| Ok(200));
            transport.expect_authenticate().times(1).returning(|_, _| Ok(200));

            let report = authenticator(connectivity, transport, settles_once())
                .attempt_login(&endpoints(), &credentials(), false, None);

            assert_eq!(report, LoginReport::new(Outcome::LoginSuccessful, "A"));
        }

        #[test]
        fn unauthorized_stops_iteration() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_A))
                .times(1)
                .returning(|_| Ok(200));
            transport.expect_fetch_login_page().with(eq(URL_B)).never();
            transport.expect_authenticate().times(1).returning(|_, _| Ok(401));

            let mut connectivity = MockConnectivityCheck::new();
            connectivity.expect_is_connected().never();

            let report = authenticator(connectivity, transport, never_sleeps())
                .attempt_login(&endpoints(), &credentials(), true, None);

            assert_eq!(report, LoginReport::new(Outcome::AuthFailed401, "A"));
        }

        #[test]
        fn accepted_login_without_internet() {
            let mut transport = MockPortalTransport::new();
            transport.expect_fetch_login_page().times(1).returning(|_| Ok(200));
            transport.expect_authenticate().times(1).returning(|_, _| Ok(200));

            let mut connectivity = MockConnectivityCheck::new();
            connectivity.expect_is_connected().times(1).return_const(false);

            let report = authenticator(connectivity, transport, settles_once())
                .attempt_login(&endpoints(), &credentials(), true, None);

            assert_eq!(report, LoginReport::new(Outcome::AuthOkNoInternet, "A"));
        }

        #[test]
        fn unexpected_status_is_post_error() {
            let mut transport = MockPortalTransport::new();
            transport.expect_fetch_login_page().times(1).returning(|_| Ok(200));
            transport.expect_authenticate().times(1).returning(|_, _| Ok(500));

            let report = authenticator(MockConnectivityCheck::new(), transport, never_sleeps())
                .attempt_login(&endpoints(), &credentials(), true, None);

            assert_eq!(report, LoginReport::new(Outcome::PostError, "A"));
        }

        #[test]
        fn post_transport_error_is_post_error_and_terminal() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_A))
                .times(1)
                .returning(|_| Ok(200));
            transport.expect_fetch_login_page().with(eq(URL_B)).never();
            transport
                .expect_authenticate()
                .times(1)
                .returning(|_, _| Err(anyhow!("operation timed out")));

            let report = authenticator(MockConnectivityCheck::new(), transport, never_sleeps())
                .attempt_login(&endpoints(), &credentials(), true, None);

            assert_eq!(report, LoginReport::new(Outcome::PostError, "A"));
        }
    }

    mod pinned {
        use super::*;

        #[test]
        fn unreachable_pin_does_not_try_others() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_B))
                .times(1)
                .returning(|_| Err(anyhow!("connection refused")));
            transport.expect_fetch_login_page().with(eq(URL_A)).never();
            transport.expect_authenticate().never();

            let report = authenticator(MockConnectivityCheck::new(), transport, never_sleeps())
                .attempt_login(&endpoints(), &credentials(), true, Some("B"));

            assert_eq!(report, LoginReport::new(Outcome::NoLocationReachable, "B"));
        }

        #[test]
        fn reachable_pin_is_the_only_endpoint_used() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_B))
                .times(1)
                .returning(|_| Ok(200));
            transport
                .expect_authenticate()
                .withf(|url, _| url == URL_B)
                .times(1)
                .returning(|_, _| Ok(401));

            let report = authenticator(MockConnectivityCheck::new(), transport, never_sleeps())
                .attempt_login(&endpoints(), &credentials(), true, Some("B"));

            assert_eq!(report, LoginReport::new(Outcome::AuthFailed401, "B"));
        }

        #[test]
        fn unknown_pin_falls_back_to_full_set() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_A))
                .times(1)
                .returning(|_| Ok(200));
            transport.expect_authenticate().times(1).returning(|_, _| Ok(200));

            let report = authenticator(connected_after_login(), transport, settles_once())
                .attempt_login(&endpoints(), &credentials(), true, Some("rosso"));

            assert_eq!(report, LoginReport::new(Outcome::LoginSuccessful, "A"));
        }

        #[test]
        fn unknown_pin_still_stops_at_first_unreachable_endpoint() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_A))
                .times(1)
                .returning(|_| Ok(502));
            transport.expect_fetch_login_page().with(eq(URL_B)).never();

            let report = authenticator(MockConnectivityCheck::new(), transport, never_sleeps())
                .attempt_login(&endpoints(), &credentials(), true, Some("rosso"));

            assert_eq!(report, LoginReport::new(Outcome::NoLocationReachable, "A"));
        }

        #[test]
        fn empty_pin_iterates_like_no_pin() {
            let mut transport = MockPortalTransport::new();
            transport
                .expect_fetch_login_page()
                .with(eq(URL_A))
                .times(1)
                .returning(|_| Err(anyhow!("connection refused")));
            transport
                .expect_fetch_login_page()
                .with(eq(URL_B))
                .times(1)
                .returning(|_| Ok(200));
            transport
                .expect_authenticate()
                .withf(|url, _| url == URL_B)
                .times(1)
                .returning(|_, _| Ok(401));

            let report = authenticator(MockConnectivityCheck::new(), transport, never_sleeps())
                .attempt_login(&endpoints(), &credentials(), true, Some(""));

            assert_eq!(report, LoginReport::new(Outcome::AuthFailed401, "B"));
        }
    }

    #[test]
    fn successful_login_names_a_configured_endpoint() {
        let mut transport = MockPortalTransport::new();
        transport.expect_fetch_login_page().returning(|_| Ok(200));
        transport.expect_authenticate().returning(|_, _| Ok(200));

        let endpoints = endpoints();
        let report = authenticator(connected_after_login(), transport, settles_once())
            .attempt_login(&endpoints, &credentials(), true, None);

        assert_eq!(report.outcome, Outcome::LoginSuccessful);
        let name = report.endpoint.expect("successful login names its endpoint");
        assert!(!name.is_empty());
        assert!(endpoints.contains(&name));
    }
}
