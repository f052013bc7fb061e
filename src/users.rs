use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{random_bytes, srp};

/// Account may authenticate.
pub const USER_FLAG_ENABLED: u32 = 1;

const SALT_SIZE: usize = 64;
const SEED_KEY_SIZE: usize = 64;

/// One credential record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub group: u16,
    pub salt: Vec<u8>,
    pub verifier: Vec<u8>,
    pub sessions: u32,
    pub flags: u32,
}

impl User {
    /// Builds an enabled record for `name` in the default SRP group.
    pub fn create(name: &str, password: &str, sessions: u32) -> Self {
        let group = srp::default_group();
        let salt = random_bytes(SALT_SIZE);
        let verifier = srp::calc_v(name, password.as_bytes(), &salt, &group).to_bytes_be();
        Self {
            name: name.to_owned(),
            group: group.id,
            salt,
            verifier,
            sessions,
            flags: USER_FLAG_ENABLED,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flags & USER_FLAG_ENABLED != 0
    }
}

/// Case-insensitive comparison in the UTF-16 code unit domain.
fn name_eq(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a.encode_utf16().eq(b.encode_utf16())
}

/// Immutable snapshot of the credential set plus the fleet seed key.
pub struct UserList {
    users: Vec<User>,
    seed_key: Zeroizing<Vec<u8>>,
}

impl UserList {
    pub fn new(users: Vec<User>, seed_key: Vec<u8>) -> Self {
        Self {
            users,
            seed_key: Zeroizing::new(seed_key),
        }
    }

    /// Empty list with a fresh random seed key.
    pub fn empty() -> Self {
        Self::new(Vec::new(), random_bytes(SEED_KEY_SIZE))
    }

    pub fn find(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|user| name_eq(&user.name, name))
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Fleet-wide secret used to fabricate verifiers for unknown names.
    pub fn seed_key(&self) -> &[u8] {
        &self.seed_key
    }
}

/// Shared, read-mostly credential store.
///
/// Readers take an `Arc` snapshot; writers build a new list and publish it,
/// so in-flight handshakes keep the generation they started with.
#[derive(Clone)]
pub struct UserStore {
    inner: Arc<RwLock<Arc<UserList>>>,
}

impl UserStore {
    pub fn new(list: UserList) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(list))),
        }
    }

    pub fn snapshot(&self) -> Arc<UserList> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Adds or replaces a record, matching names case-insensitively.
    pub fn upsert(&self, user: User) {
        self.mutate(|users| {
            users.retain(|existing| !name_eq(&existing.name, &user.name));
            users.push(user);
        });
    }

    /// Removes a record; absent names are a no-op.
    pub fn remove(&self, name: &str) {
        self.mutate(|users| users.retain(|existing| !name_eq(&existing.name, name)));
    }

    fn mutate(&self, apply: impl FnOnce(&mut Vec<User>)) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut users = guard.users.clone();
        apply(&mut users);
        let next = UserList::new(users, guard.seed_key.to_vec());
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let list = UserList::new(vec![User::create("Alice", "pw", 1)], vec![0; 8]);
        assert!(list.find("alice").is_some());
        assert!(list.find("ALICE").is_some());
        assert!(list.find("bob").is_none());
    }

    #[test]
    fn lookup_folds_non_ascii_names() {
        let list = UserList::new(vec![User::create("Żółw", "pw", 1)], vec![0; 8]);
        assert!(list.find("żółw").is_some());
    }

    #[test]
    fn created_user_is_enabled_in_default_group() {
        let user = User::create("carol", "secret", 0b11);
        assert!(user.is_enabled());
        assert_eq!(user.group, srp::GROUP_8192);
        assert_eq!(user.salt.len(), SALT_SIZE);
        assert!(!user.verifier.is_empty());
        assert_eq!(user.sessions, 0b11);
    }

    #[test]
    fn snapshots_are_stable_across_writes() {
        let store = UserStore::new(UserList::empty());
        let before = store.snapshot();
        store.upsert(User::create("dave", "pw", 1));
        assert!(before.find("dave").is_none());
        assert!(store.snapshot().find("dave").is_some());
    }

    #[test]
    fn upsert_replaces_case_insensitively() {
        let store = UserStore::new(UserList::empty());
        store.upsert(User::create("Eve", "one", 1));
        store.upsert(User::create("eve", "two", 2));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.users().len(), 1);
        assert_eq!(snapshot.find("EVE").map(|u| u.sessions), Some(2));
    }

    #[test]
    fn remove_deletes_record() {
        let store = UserStore::new(UserList::empty());
        store.upsert(User::create("frank", "pw", 1));
        store.remove("FRANK");
        assert!(store.snapshot().find("frank").is_none());
    }

    #[test]
    fn seed_key_survives_mutation() {
        let store = UserStore::new(UserList::new(Vec::new(), vec![9; 16]));
        store.upsert(User::create("gina", "pw", 1));
        assert_eq!(store.snapshot().seed_key(), &[9; 16][..]);
    }
}
