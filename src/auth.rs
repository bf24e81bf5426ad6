//! Operator identity and administrator credentials
//!
//! Both are external concerns: the store only asks who is signed in (to pick
//! a storage key) and whether an administrator secret is valid (to clear a
//! journal).

use std::sync::{Arc, Mutex};

/// Supplies the signed-in operator, if any
pub trait IdentityProvider {
    /// Stable key of the current user, or `None` when nobody is signed in
    fn current_user(&self) -> Option<String>;
}

/// Identity set from the command line or config
///
/// Clones share the same slot, so sign-in and sign-out are visible to the
/// store holding another handle.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Arc<Mutex<Option<String>>>,
}

impl StaticIdentity {
    #[must_use]
    pub fn new(user: Option<String>) -> Self {
        Self {
            user: Arc::new(Mutex::new(user.filter(|u| !u.trim().is_empty()))),
        }
    }

    pub fn sign_in(&self, user: impl Into<String>) {
        *self.lock() = Some(user.into());
    }

    pub fn sign_out(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.user.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<String> {
        self.lock().clone()
    }
}

/// Checks an administrator secret
pub trait CredentialCheck {
    fn verify(&self, secret: &str) -> bool;
}

/// A single shared administrator secret, compared verbatim
///
/// An empty secret rejects everything, so journal clearing stays disabled
/// until one is configured.
#[derive(Clone)]
pub struct SharedSecret {
    secret: String,
}

impl SharedSecret {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.secret.is_empty()
    }
}

impl CredentialCheck for SharedSecret {
    fn verify(&self, secret: &str) -> bool {
        self.is_configured() && self.secret == secret
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("configured", &self.is_configured())
            .finish()
    }
}
