use std::collections::HashMap;

use parking_lot::RwLock;

use crate::crypto::SecretBytes;

/// Credentials accepted by RAKP, keyed by user name.
#[derive(Debug, Default)]
pub(crate) struct UserTable {
    users: RwLock<HashMap<Vec<u8>, SecretBytes>>,
}

impl UserTable {
    pub(crate) fn with_user(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) -> Self {
        let table = Self::default();
        table.insert(username, password);
        table
    }

    pub(crate) fn insert(&self, username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>) {
        self.users
            .write()
            .insert(username.into(), SecretBytes::new(password.into()));
    }

    pub(crate) fn password(&self, username: &[u8]) -> Option<SecretBytes> {
        self.users.read().get(username).cloned()
    }
}
