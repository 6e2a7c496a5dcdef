use std::sync::Arc;
use swarmer::Sequence;

/// Number of `TestUser_<n>_Email` / `TestUser_<n>_Password` pairs read from
/// the environment.
pub const TEST_ACCOUNTS: usize = 3;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Test accounts handed out round-robin across every user of a class.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    accounts: Arc<Vec<Credentials>>,
    next: Sequence,
}

impl CredentialPool {
    pub fn new(accounts: Vec<Credentials>) -> Self {
        Self {
            accounts: Arc::new(accounts),
            next: Sequence::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Accounts missing either variable are skipped.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let accounts = (1..=TEST_ACCOUNTS)
            .filter_map(|n| {
                Some(Credentials {
                    email: lookup(&format!("TestUser_{n}_Email"))?,
                    password: lookup(&format!("TestUser_{n}_Password"))?,
                })
            })
            .collect();
        Self::new(accounts)
    }

    pub fn next(&self) -> Option<&Credentials> {
        if self.accounts.is_empty() {
            return None;
        }
        self.accounts.get(self.next.next_index(self.accounts.len()))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
