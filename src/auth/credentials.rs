//! Allowed credential set.

use std::collections::HashSet;
use std::fmt;

/// Set of `username_password` keys accepted by the login flow.
#[derive(Clone, Default)]
pub struct AllowedCredentials {
    keys: HashSet<String>,
}

impl AllowedCredentials {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Lookup key for a username/password pair.
    pub fn key(username: &str, password: &str) -> String {
        format!("{}_{}", username, password)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.contains(&Self::key(username, password))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// Keys embed passwords; only the count is printable.
impl fmt::Debug for AllowedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllowedCredentials")
            .field("len", &self.keys.len())
            .finish()
    }
}
