use crate::{
    services::{portal::Authenticate, sleeper::Sleeper},
    types::{Credentials, Endpoints, ForceLoginReport, LoginReport, Outcome},
};
use log::{info, warn};
use std::time::Duration;

/// State of one forced login run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrySession {
    pub target_endpoint: String,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetrySession {
    pub fn new(target_endpoint: &str, max_attempts: u32, delay: Duration) -> Self {
        Self {
            target_endpoint: target_endpoint.to_string(),
            attempts_made: 0,
            max_attempts,
            delay,
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.max_attempts
    }

    fn finish(self, success: bool, report: LoginReport) -> ForceLoginReport {
        ForceLoginReport {
            success,
            outcome: report.outcome,
            endpoint: report.endpoint,
            attempts: self.attempts_made,
        }
    }
}

enum Step {
    Done(bool),
    Retry,
}

impl Step {
    fn after(outcome: Outcome) -> Self {
        match outcome {
            Outcome::LoginSuccessful | Outcome::AlreadyConnected => Step::Done(true),
            // the pinned gateway went away, retrying it is pointless
            Outcome::NoLocationReachable => Step::Done(false),
            Outcome::AuthFailed401 | Outcome::AuthOkNoInternet | Outcome::PostError => Step::Retry,
            Outcome::MissingCredentials => Step::Done(false),
        }
    }
}

/// Repeats forced login attempts against one pinned gateway
///
/// Attempts are separated by a fixed blocking delay. The run ends on
/// success, when the gateway becomes unreachable, on a fatal outcome or once
/// the attempt budget is spent.
pub struct ForcedRetryController<A, S> {
    authenticator: A,
    sleeper: S,
}

impl<A: Authenticate, S: Sleeper> ForcedRetryController<A, S> {
    pub fn new(authenticator: A, sleeper: S) -> Self {
        Self {
            authenticator,
            sleeper,
        }
    }

    /// Force a login on `target`, at most `max_attempts` times
    ///
    /// The endpoint named by each attempt becomes the pin of the next one, so
    /// a fallback picked for an unknown target sticks. `on_attempt` sees every
    /// report right after its attempt.
    pub fn force_login(
        &self,
        endpoints: &Endpoints,
        credentials: &Credentials,
        target: &str,
        max_attempts: u32,
        delay: Duration,
        mut on_attempt: impl FnMut(&LoginReport),
    ) -> ForceLoginReport {
        let mut session = RetrySession::new(target, max_attempts, delay);

        if !session.has_attempts_left() {
            warn!("forced login on {target} requested with no attempts");
            return session.finish(
                false,
                LoginReport::new(Outcome::NoLocationReachable, target),
            );
        }

        loop {
            session.attempts_made += 1;
            info!(
                "forced attempt {}/{} on {}",
                session.attempts_made, session.max_attempts, session.target_endpoint
            );

            let report = self.authenticator.attempt_login(
                endpoints,
                credentials,
                true,
                Some(&session.target_endpoint),
            );

            on_attempt(&report);

            if let Some(name) = &report.endpoint {
                session.target_endpoint.clone_from(name);
            }

            match Step::after(report.outcome) {
                Step::Done(success) => {
                    info!(
                        "forced login on {} ended after {} attempt(s): {}",
                        session.target_endpoint, session.attempts_made, report.outcome
                    );
                    return session.finish(success, report);
                }
                Step::Retry if session.has_attempts_left() => {
                    warn!(
                        "forced login on {} not completed ({}), retrying in {:?}",
                        session.target_endpoint, report.outcome, session.delay
                    );
                    self.sleeper.sleep(session.delay);
                }
                Step::Retry => {
                    warn!(
                        "forced login on {} gave up after {} attempts: {}",
                        session.target_endpoint, session.attempts_made, report.outcome
                    );
                    return session.finish(false, report);
                }
            }
        }
    }
}
