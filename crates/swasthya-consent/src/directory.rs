//! User lookup contract consumed by the consent store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use swasthya_shared::Role;

/// The account fields consent needs
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub role: Role,
}

/// Resolves users registered with the platform
pub trait UserDirectory: Send + Sync {
    fn find_by_email(&self, email: &str) -> Option<UserRecord>;
}

/// Directory held in process memory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the user registered under `user.email`
    pub fn register(&self, user: UserRecord) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.email.clone(), user);
    }
}

impl UserDirectory for InMemoryDirectory {
    fn find_by_email(&self, email: &str) -> Option<UserRecord> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(email)
            .cloned()
    }
}
