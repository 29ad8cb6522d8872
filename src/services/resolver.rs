// src/services/resolver.rs

use std::collections::HashMap;

use super::{GamificationError, require};
use crate::store::{SecondaryStore, paths, read_str};

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Snapshot of `display name -> account ids`, taken from one listing of the
/// `users` collection.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    accounts_by_name: HashMap<String, Vec<String>>,
}

impl NameIndex {
    pub fn from_accounts<'a>(accounts: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut accounts_by_name: HashMap<String, Vec<String>> = HashMap::new();
        for (account, name) in accounts {
            let key = normalize(name);
            if key.is_empty() {
                continue;
            }
            accounts_by_name
                .entry(key)
                .or_default()
                .push(account.to_string());
        }
        Self { accounts_by_name }
    }

    /// The account whose display name matches, if exactly one does.
    pub fn resolve(&self, name: &str) -> Result<String, GamificationError> {
        let matches = self
            .accounts_by_name
            .get(&normalize(name))
            .map(Vec::as_slice)
            .unwrap_or_default();
        match matches {
            [account] => Ok(account.clone()),
            _ => Err(GamificationError::AmbiguousIdentity {
                name: name.to_string(),
                matches: matches.len(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NameResolver {
    store: SecondaryStore,
}

impl NameResolver {
    pub fn new(store: SecondaryStore) -> Self {
        Self { store }
    }

    pub async fn index(&self) -> Result<NameIndex, GamificationError> {
        let users = require(&self.store)?.list(&paths::users()).await?;
        Ok(NameIndex::from_accounts(users.iter().filter_map(
            |(account, doc)| read_str(doc, "name").map(|name| (account.as_str(), name)),
        )))
    }

    /// Best-effort lookup of an account from a free-text display name.
    /// Zero or several matches come back as `AmbiguousIdentity`.
    pub async fn resolve_account_by_name(&self, name: &str) -> Result<String, GamificationError> {
        if normalize(name).is_empty() {
            return Err(GamificationError::AmbiguousIdentity {
                name: name.to_string(),
                matches: 0,
            });
        }
        self.index().await?.resolve(name)
    }
}
