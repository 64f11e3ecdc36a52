use crate::{
    store::{CredentialStore, settings::DEFAULT_USERNAME_PLACEHOLDER},
    types::username_hint,
};
use anyhow::{Context, Result, ensure};
use keyring::Entry;
use log::{info, warn};

/// Portal passwords kept in the OS keyring, one entry per username
#[derive(Clone, Debug)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn save(&self, username: &str, password: &str) -> Result<()> {
        ensure!(!password.is_empty(), "failed to save password: password is empty");

        self.entry(username)?
            .set_password(password)
            .context("failed to save password to keyring")?;

        info!("password saved for user {}", username_hint(username));
        Ok(())
    }

    /// Remove the password of `username`
    ///
    /// # Returns
    /// false if there was nothing to remove
    pub fn delete(&self, username: &str) -> Result<bool> {
        match self.entry(username)?.delete_credential() {
            Ok(()) => {
                info!("password deleted for user {}", username_hint(username));
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e).context("failed to delete password from keyring"),
        }
    }

    fn entry(&self, username: &str) -> Result<Entry> {
        ensure!(
            is_valid_username(username),
            "failed to access keyring: username is not set"
        );

        Entry::new(&self.service, username).context("failed to open keyring entry")
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn password(&self, username: &str) -> Result<Option<String>> {
        if !is_valid_username(username) {
            warn!("no username configured, skipping keyring lookup");
            return Ok(None);
        }

        match self.entry(username)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => {
                warn!("no password stored for user {}", username_hint(username));
                Ok(None)
            }
            Err(e) => Err(e).context("failed to load password from keyring"),
        }
    }
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && username != DEFAULT_USERNAME_PLACEHOLDER
}
