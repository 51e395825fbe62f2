//! Saved connection profiles.
//!
//! All profiles are kept as one JSON array under a single storage key. Every
//! mutation reads the whole list, changes it, and writes the whole list back.
//! There is no partial update and no protection against concurrent writers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PicoError;
use crate::models::ConnectionProfile;
use crate::services::password;
use crate::services::storage::LocalStorage;

/// Storage key holding the serialized profile list.
pub const CONNECTIONS_KEY: &str = "picopg_connections";

/// CRUD over the persisted profile list.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    storage: Arc<LocalStorage>,
}

impl ProfileStore {
    /// Create a store on top of local storage.
    pub fn new(storage: Arc<LocalStorage>) -> Self {
        Self { storage }
    }

    /// Load every saved profile, in stored order, with plain passwords.
    ///
    /// A stored list that cannot be parsed reads as empty.
    pub fn list(&self) -> Result<Vec<ConnectionProfile>, PicoError> {
        let Some(stored) = self.storage.get_item(CONNECTIONS_KEY)? else {
            return Ok(Vec::new());
        };

        let entries: Vec<StoredProfile> = match serde_json::from_str(&stored) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Stored connections are unreadable, treating as empty");
                return Ok(Vec::new());
            }
        };

        let mut profiles = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.into_profile() {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    tracing::warn!(error = %e, "Stored connections are unreadable, treating as empty");
                    return Ok(Vec::new());
                }
            }
        }
        Ok(profiles)
    }

    /// Overwrite the saved list.
    pub fn save_all(&self, profiles: &[ConnectionProfile]) -> Result<(), PicoError> {
        let entries: Vec<StoredProfile> = profiles.iter().map(StoredProfile::from_profile).collect();
        let json = serde_json::to_string(&entries)?;
        self.storage.set_item(CONNECTIONS_KEY, &json)?;
        tracing::debug!(count = profiles.len(), "Connections saved");
        Ok(())
    }

    /// Get a profile by id.
    pub fn get(&self, id: Uuid) -> Result<Option<ConnectionProfile>, PicoError> {
        Ok(self.list()?.into_iter().find(|p| p.id == id))
    }

    /// Find a profile by id, exact name, or case-insensitive name.
    ///
    /// A case-insensitive match is only taken when it is unique.
    pub fn find(&self, key: &str) -> Result<Option<ConnectionProfile>, PicoError> {
        let profiles = self.list()?;
        if let Ok(id) = Uuid::parse_str(key) {
            if let Some(profile) = profiles.iter().find(|p| p.id == id) {
                return Ok(Some(profile.clone()));
            }
        }
        if let Some(profile) = profiles.iter().find(|p| p.name == key) {
            return Ok(Some(profile.clone()));
        }

        let mut matches = profiles.into_iter().filter(|p| p.name.eq_ignore_ascii_case(key));
        match (matches.next(), matches.next()) {
            (Some(_), Some(_)) => Err(PicoError::validation(format!(
                "Several connections are named like \"{key}\"; use the exact name or the id"
            ))),
            (found, _) => Ok(found),
        }
    }

    /// Append a new profile.
    pub fn add(&self, profile: ConnectionProfile) -> Result<(), PicoError> {
        let mut profiles = self.list()?;
        if profiles.iter().any(|p| p.id == profile.id) {
            return Err(PicoError::validation(format!(
                "A connection with id {} already exists",
                profile.id
            )));
        }
        tracing::debug!(connection_id = %profile.id, name = %profile.name, "Adding connection");
        profiles.push(profile);
        self.save_all(&profiles)
    }

    /// Replace the profile with the same id, keeping its position.
    pub fn update(&self, profile: ConnectionProfile) -> Result<(), PicoError> {
        let mut profiles = self.list()?;
        let Some(index) = profiles.iter().position(|p| p.id == profile.id) else {
            tracing::warn!(connection_id = %profile.id, "Update of unknown connection");
            return Err(PicoError::profile_not_found(profile.id.to_string()));
        };
        tracing::debug!(connection_id = %profile.id, name = %profile.name, "Updating connection");
        profiles[index] = profile;
        self.save_all(&profiles)
    }

    /// Remove the profile with `id`. Returns whether anything was removed.
    pub fn delete(&self, id: Uuid) -> Result<bool, PicoError> {
        let mut profiles = self.list()?;
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        let removed = profiles.len() != before;
        self.save_all(&profiles)?;
        tracing::debug!(connection_id = %id, removed, "Connection deleted");
        Ok(removed)
    }
}

/// On-disk shape of a profile: identical to [`ConnectionProfile`] except the
/// password, which is base64-encoded.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct StoredProfile {
    profile: ConnectionProfile,
}

impl StoredProfile {
    fn from_profile(profile: &ConnectionProfile) -> Self {
        let mut profile = profile.clone();
        profile.password = password::encode(&profile.password);
        Self { profile }
    }

    fn into_profile(self) -> Result<ConnectionProfile, PicoError> {
        let mut profile = self.profile;
        profile.password = password::decode(&profile.password)?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SslMode;

    fn store() -> ProfileStore {
        ProfileStore::new(Arc::new(LocalStorage::open_in_memory().unwrap()))
    }

    fn profile(name: &str) -> ConnectionProfile {
        let mut p = ConnectionProfile::new(name, "localhost", "app", "postgres");
        p.password = format!("{name}-secret");
        p
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        assert!(store().list().unwrap().is_empty());
    }

    #[test]
    fn test_add_preserves_existing_entries() {
        let store = store();
        let a = profile("a");
        let b = profile("b");
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        let names: Vec<_> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_add_duplicate_id_fails() {
        let store = store();
        let a = profile("a");
        store.add(a.clone()).unwrap();
        assert!(matches!(store.add(a), Err(PicoError::Validation { .. })));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_update_replaces_in_place() {
        let store = store();
        let a = profile("a");
        let mut b = profile("b");
        let c = profile("c");
        for p in [&a, &b, &c] {
            store.add(p.clone()).unwrap();
        }

        b.host = "db.internal".to_string();
        b.ssl_mode = Some(SslMode::Require);
        store.update(b.clone()).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(listed[1].host, "db.internal");
        assert_eq!(listed[1].ssl_mode, Some(SslMode::Require));
        assert_eq!(listed[0].host, "localhost");
        assert_eq!(listed[2].password, "c-secret");
    }

    #[test]
    fn test_update_unknown_id_fails_and_keeps_list() {
        let store = store();
        store.add(profile("a")).unwrap();

        let stranger = profile("stranger");
        let err = store.update(stranger).unwrap_err();
        assert!(matches!(err, PicoError::ProfileNotFound { .. }));

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a");
    }

    #[test]
    fn test_delete_keeps_others() {
        let store = store();
        let a = profile("a");
        let b = profile("b");
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        assert!(store.delete(a.id).unwrap());
        assert!(!store.delete(a.id).unwrap());

        let listed = store.list().unwrap();
        assert_eq!(listed, vec![b]);
    }

    #[test]
    fn test_passwords_are_encoded_at_rest() {
        let storage = Arc::new(LocalStorage::open_in_memory().unwrap());
        let store = ProfileStore::new(storage.clone());
        store.add(profile("a")).unwrap();

        let raw = storage.get_item(CONNECTIONS_KEY).unwrap().unwrap();
        assert!(!raw.contains("a-secret"));
        assert!(raw.contains(&password::encode("a-secret")));

        assert_eq!(store.list().unwrap()[0].password, "a-secret");
    }

    #[test]
    fn test_empty_password_stored_as_empty() {
        let storage = Arc::new(LocalStorage::open_in_memory().unwrap());
        let store = ProfileStore::new(storage.clone());
        let mut p = profile("a");
        p.password.clear();
        store.add(p).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&storage.get_item(CONNECTIONS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw[0]["password"], "");
    }

    #[test]
    fn test_corrupt_list_reads_as_empty() {
        let storage = Arc::new(LocalStorage::open_in_memory().unwrap());
        storage.set_item(CONNECTIONS_KEY, "{not json").unwrap();
        let store = ProfileStore::new(storage);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_reads_existing_stored_format() {
        let storage = Arc::new(LocalStorage::open_in_memory().unwrap());
        storage
            .set_item(
                CONNECTIONS_KEY,
                r#"[{"id":"7f1d3c1e-8a51-4a8e-9b57-2a3f7c9d0e11","name":"Local","host":"localhost",
                    "port":5432,"database":"postgres","username":"postgres","password":"cG9zdGdyZXM=",
                    "createdAt":"2024-05-01T10:00:00.000Z","updatedAt":"2024-05-02T10:00:00.000Z",
                    "lastConnected":"2024-05-02T10:00:00.000Z"}]"#,
            )
            .unwrap();
        let store = ProfileStore::new(storage);

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].password, "postgres");
        assert!(listed[0].last_connected.is_some());
        assert_eq!(listed[0].ssl_mode, None);
    }

    #[test]
    fn test_find_by_id_or_name() {
        let store = store();
        let a = profile("Analytics");
        store.add(a.clone()).unwrap();

        assert_eq!(store.find(&a.id.to_string()).unwrap(), Some(a.clone()));
        assert_eq!(store.find("analytics").unwrap(), Some(a.clone()));
        assert_eq!(store.get(a.id).unwrap(), Some(a));
        assert_eq!(store.find("nope").unwrap(), None);
    }

    #[test]
    fn test_find_prefers_exact_name() {
        let store = store();
        let mut upper = profile("Prod");
        upper.host = "h1".to_string();
        let mut lower = profile("prod");
        lower.host = "h2".to_string();
        store.add(upper.clone()).unwrap();
        store.add(lower.clone()).unwrap();

        assert_eq!(store.find("prod").unwrap().unwrap().host, "h2");
        assert_eq!(store.find("Prod").unwrap().unwrap().host, "h1");
        assert!(matches!(store.find("PROD"), Err(PicoError::Validation { .. })));
        assert_eq!(store.find(&lower.id.to_string()).unwrap(), Some(lower));
    }
}
