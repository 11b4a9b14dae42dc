//! In-process store backend.
//!
//! Keeps accounts, projects and items in memory behind a shared lock. Every
//! handle (client, account, collection and item managers) points at the same
//! state, so writes through one are visible through all of them. Used by the
//! test suite and by local tooling that does not need a server.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::config::Credentials;
use crate::remote::{
    Collection, CollectionManager, Item, ItemManager, Metadata, RemoteAccount, RemoteClient,
    RemoteError,
};

#[derive(Debug, Default)]
struct StoredProject {
    meta: Metadata,
    content: Vec<u8>,
    members: BTreeSet<String>,
    /// Committed items, in creation order.
    items: Vec<Item>,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<String, String>,
    projects: BTreeMap<String, StoredProject>,
    /// (username, project uid)
    invitations: Vec<(String, String)>,
    collection_fetches: usize,
}

type Shared = Arc<Mutex<MemoryState>>;

fn lock(state: &Shared) -> Result<MutexGuard<'_, MemoryState>, RemoteError> {
    state.lock().map_err(|e| RemoteError::Storage(e.to_string()))
}

fn lock_seed(state: &Shared) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Shared,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account that can log in.
    pub fn register_user(&self, username: impl Into<String>, password: impl Into<String>) {
        lock_seed(&self.state)
            .users
            .insert(username.into(), password.into());
    }

    /// Create a project owned by `owner` and return its uid.
    pub fn create_project(&self, owner: &str, content: Vec<u8>) -> String {
        let uid = Uuid::new_v4().to_string();
        let project = StoredProject {
            content,
            members: BTreeSet::from([owner.to_string()]),
            ..StoredProject::default()
        };
        lock_seed(&self.state).projects.insert(uid.clone(), project);
        uid
    }

    /// Queue an invitation for `username` to join `project_uid`.
    pub fn invite(&self, username: &str, project_uid: &str) {
        lock_seed(&self.state)
            .invitations
            .push((username.to_string(), project_uid.to_string()));
    }

    /// Collection manager acting as `username`, without going through login.
    pub fn collections_for(&self, username: &str) -> MemoryCollections {
        MemoryCollections {
            state: Arc::clone(&self.state),
            username: username.to_string(),
        }
    }

    /// Number of project fetches served so far.
    pub fn collection_fetches(&self) -> usize {
        lock_seed(&self.state).collection_fetches
    }

    pub fn project_content(&self, project_uid: &str) -> Option<Vec<u8>> {
        lock_seed(&self.state)
            .projects
            .get(project_uid)
            .map(|p| p.content.clone())
    }

    pub fn is_member(&self, username: &str, project_uid: &str) -> bool {
        lock_seed(&self.state)
            .projects
            .get(project_uid)
            .is_some_and(|p| p.members.contains(username))
    }

    /// Committed items of a project.
    pub fn project_items(&self, project_uid: &str) -> Vec<Item> {
        lock_seed(&self.state)
            .projects
            .get(project_uid)
            .map(|p| p.items.clone())
            .unwrap_or_default()
    }

    /// Drop an item, bypassing the gallery. For simulating partial failures.
    pub fn remove_item(&self, project_uid: &str, item_uid: &str) -> bool {
        let mut state = lock_seed(&self.state);
        match state.projects.get_mut(project_uid) {
            Some(project) => {
                let before = project.items.len();
                project.items.retain(|item| item.uid != item_uid);
                project.items.len() != before
            }
            None => false,
        }
    }
}

impl RemoteClient for MemoryRemote {
    type Account = MemoryAccount;

    fn login(&self, credentials: &Credentials) -> Result<MemoryAccount, RemoteError> {
        let state = lock(&self.state)?;
        match state.users.get(&credentials.username) {
            Some(password) if *password == credentials.password => Ok(MemoryAccount {
                state: Arc::clone(&self.state),
                username: credentials.username.clone(),
            }),
            _ => Err(RemoteError::Auth(format!(
                "invalid credentials for {}",
                credentials.username
            ))),
        }
    }
}

/// A logged-in account on a [`MemoryRemote`].
#[derive(Debug)]
pub struct MemoryAccount {
    state: Shared,
    username: String,
}

impl RemoteAccount for MemoryAccount {
    type Collections = MemoryCollections;

    fn username(&self) -> &str {
        &self.username
    }

    fn collection_manager(&self) -> Result<MemoryCollections, RemoteError> {
        Ok(MemoryCollections {
            state: Arc::clone(&self.state),
            username: self.username.clone(),
        })
    }

    fn accept_pending_invitations(&self) -> Result<usize, RemoteError> {
        let mut state = lock(&self.state)?;
        let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(&mut state.invitations)
            .into_iter()
            .partition(|(user, _)| *user == self.username);
        state.invitations = others;

        let mut accepted = 0;
        for (_, project_uid) in mine {
            if let Some(project) = state.projects.get_mut(&project_uid) {
                project.members.insert(self.username.clone());
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    fn logout(self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Project access for one account.
#[derive(Debug, Clone)]
pub struct MemoryCollections {
    state: Shared,
    username: String,
}

impl CollectionManager for MemoryCollections {
    type Items = MemoryItems;

    fn fetch(&self, uid: &str) -> Result<Collection, RemoteError> {
        let mut state = lock(&self.state)?;
        state.collection_fetches += 1;
        match state.projects.get(uid) {
            Some(project) if project.members.contains(&self.username) => Ok(Collection {
                uid: uid.to_string(),
                meta: project.meta.clone(),
                content: project.content.clone(),
            }),
            _ => Err(RemoteError::NotFound(format!("project {uid}"))),
        }
    }

    fn commit(&self, collection: &Collection) -> Result<(), RemoteError> {
        let mut state = lock(&self.state)?;
        let project = state
            .projects
            .get_mut(&collection.uid)
            .filter(|p| p.members.contains(&self.username))
            .ok_or_else(|| RemoteError::NotFound(format!("project {}", collection.uid)))?;
        project.meta = collection.meta.clone();
        project.content = collection.content.clone();
        Ok(())
    }

    fn item_manager(&self, collection: &Collection) -> Result<MemoryItems, RemoteError> {
        Ok(MemoryItems {
            state: Arc::clone(&self.state),
            project_uid: collection.uid.clone(),
            username: self.username.clone(),
        })
    }

    fn leave(&self, collection: &Collection) -> Result<(), RemoteError> {
        let mut state = lock(&self.state)?;
        let project = state
            .projects
            .get_mut(&collection.uid)
            .ok_or_else(|| RemoteError::NotFound(format!("project {}", collection.uid)))?;
        project.members.remove(&self.username);
        Ok(())
    }
}

/// Item access scoped to one project and checked against its member list.
#[derive(Debug, Clone)]
pub struct MemoryItems {
    state: Shared,
    project_uid: String,
    username: String,
}

impl MemoryItems {
    fn with_project<T>(
        &self,
        f: impl FnOnce(&mut StoredProject) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut state = lock(&self.state)?;
        let project = state
            .projects
            .get_mut(&self.project_uid)
            .filter(|p| p.members.contains(&self.username))
            .ok_or_else(|| RemoteError::NotFound(format!("project {}", self.project_uid)))?;
        f(project)
    }
}

impl ItemManager for MemoryItems {
    fn create(&self, meta: Metadata, content: Vec<u8>) -> Result<Item, RemoteError> {
        Ok(Item {
            uid: Uuid::new_v4().to_string(),
            meta,
            content,
        })
    }

    fn fetch(&self, uid: &str) -> Result<Item, RemoteError> {
        self.with_project(|project| {
            project
                .items
                .iter()
                .find(|item| item.uid == uid)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(format!("item {uid}")))
        })
    }

    fn list(&self) -> Result<Vec<Item>, RemoteError> {
        self.with_project(|project| Ok(project.items.clone()))
    }

    fn commit(&self, items: &[Item]) -> Result<(), RemoteError> {
        self.with_project(|project| {
            for item in items {
                match project.items.iter_mut().find(|stored| stored.uid == item.uid) {
                    Some(stored) => *stored = item.clone(),
                    None => project.items.push(item.clone()),
                }
            }
            Ok(())
        })
    }
}
