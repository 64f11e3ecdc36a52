//! Persistent state consumed by the login services
//!
//! The services only see the `ConfigStore` and `CredentialStore` traits, the
//! concrete stores live in the submodules.

pub mod keychain;
pub mod settings;

use crate::types::Endpoints;
use anyhow::Result;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// Endpoint list and last used location
pub trait ConfigStore {
    fn endpoints(&self) -> Result<Endpoints>;
    fn last_endpoint(&self) -> Result<Option<String>>;
    fn set_last_endpoint(&self, name: Option<&str>) -> Result<()>;
}

impl<C: ConfigStore + ?Sized> ConfigStore for &C {
    fn endpoints(&self) -> Result<Endpoints> {
        (**self).endpoints()
    }

    fn last_endpoint(&self) -> Result<Option<String>> {
        (**self).last_endpoint()
    }

    fn set_last_endpoint(&self, name: Option<&str>) -> Result<()> {
        (**self).set_last_endpoint(name)
    }
}

/// Password lookup by username
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait CredentialStore {
    fn password(&self, username: &str) -> Result<Option<String>>;
}

impl<C: CredentialStore + ?Sized> CredentialStore for &C {
    fn password(&self, username: &str) -> Result<Option<String>> {
        (**self).password(username)
    }
}
