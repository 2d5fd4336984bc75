use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::db::ApartmentChoice;

use super::email::email_is_valid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apartment: Option<ApartmentChoice>,
}

/// The current voter, mirrored into a session-scoped JSON slot on disk.
///
/// Opening a store on an existing slot picks the voter back up; the slot is
/// deleted when the session ends. No method here returns an error: write
/// failures are logged and the in-memory state still changes.
pub struct SessionStore {
    path: PathBuf,
    data: RwLock<Option<Voter>>,
}

impl SessionStore {
    pub fn open(path: PathBuf) -> Self {
        let data = read_slot(&path);
        if let Some(voter) = &data {
            info!("Restored session for {}", voter.email);
        }

        Self {
            path,
            data: RwLock::new(data),
        }
    }

    pub fn current(&self) -> Option<Voter> {
        self.read().clone()
    }

    pub fn email(&self) -> Option<String> {
        self.read().as_ref().map(|voter| voter.email.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().is_some()
    }

    /// Start a session for `email` with no customization. Malformed emails
    /// are ignored; callers validate first.
    pub fn login(&self, email: &str) -> bool {
        if email.trim().is_empty() || !email_is_valid(email) {
            warn!("Ignoring login with malformed email {email:?}");
            return false;
        }

        let mut guard = self.write();
        *guard = Some(Voter {
            email: email.to_string(),
            apartment: None,
        });
        self.persist_logged(&guard);
        true
    }

    /// Store the voter's customization. No-op without a voter.
    pub fn set_apartment(&self, choice: ApartmentChoice) -> bool {
        let mut guard = self.write();
        let Some(voter) = guard.as_mut() else {
            return false;
        };
        voter.apartment = Some(choice);
        self.persist_logged(&guard);
        true
    }

    pub fn logout(&self) {
        let mut guard = self.write();
        if let Some(voter) = guard.take() {
            info!("Logged out {}", voter.email);
        }
        self.persist_logged(&guard);
    }

    fn persist_logged(&self, data: &Option<Voter>) {
        if let Err(err) = self.persist(data) {
            warn!("Session slot not updated: {err:#}");
        }
    }

    fn persist(&self, data: &Option<Voter>) -> Result<()> {
        match data {
            Some(voter) => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create session directory {}", parent.display())
                    })?;
                }
                let serialized = serde_json::to_string_pretty(voter)?;
                fs::write(&self.path, serialized).with_context(|| {
                    format!("Failed to write session to {}", self.path.display())
                })
            }
            None => remove_slot(&self.path),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Voter>> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Voter>> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn read_slot(path: &Path) -> Option<Voter> {
    if !path.exists() {
        return None;
    }

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!("Failed to read session from {}: {err}", path.display());
            return None;
        }
    };

    match serde_json::from_str::<Voter>(&contents) {
        Ok(voter) if email_is_valid(&voter.email) => Some(voter),
        Ok(voter) => {
            warn!("Discarding session with malformed email {:?}", voter.email);
            discard_slot(path);
            None
        }
        Err(err) => {
            warn!("Discarding unreadable session at {}: {err}", path.display());
            discard_slot(path);
            None
        }
    }
}

fn discard_slot(path: &Path) {
    if let Err(err) = remove_slot(path) {
        warn!("{err:#}");
    }
}

fn remove_slot(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err)
            .with_context(|| format!("Failed to remove session slot {}", path.display())),
    }
}
