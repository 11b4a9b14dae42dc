//! Contracts of the encrypted, versioned store the core talks to.
//!
//! The store owns accounts, projects (collections) and items. The core only
//! reads and writes their `meta` and `content`; each `commit` is atomic on
//! its own, but two commits are never atomic together.

use serde_json::{Map, Value};

use crate::config::Credentials;

/// Free-form metadata attached to collections and items.
pub type Metadata = Map<String, Value>;

/// Errors reported by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// A project as fetched from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub uid: String,
    pub meta: Metadata,
    pub content: Vec<u8>,
}

impl Collection {
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }
}

/// An item inside a project. Created locally, persisted on commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub uid: String,
    pub meta: Metadata,
    pub content: Vec<u8>,
}

impl Item {
    /// `meta.type`, if set.
    pub fn item_type(&self) -> Option<&str> {
        self.meta.get("type").and_then(Value::as_str)
    }
}

/// Entry point of a store: turns credentials into an account.
pub trait RemoteClient {
    type Account: RemoteAccount;

    fn login(&self, credentials: &Credentials) -> Result<Self::Account, RemoteError>;
}

/// A logged-in account.
pub trait RemoteAccount {
    type Collections: CollectionManager;

    fn username(&self) -> &str;

    fn collection_manager(&self) -> Result<Self::Collections, RemoteError>;

    /// Accept every invitation waiting for this account. Returns how many
    /// were accepted.
    fn accept_pending_invitations(&self) -> Result<usize, RemoteError>;

    fn logout(self) -> Result<(), RemoteError>;
}

/// Access to the account's projects.
pub trait CollectionManager {
    type Items: ItemManager;

    fn fetch(&self, uid: &str) -> Result<Collection, RemoteError>;

    /// Persist the collection's `meta` and `content` in one transaction.
    fn commit(&self, collection: &Collection) -> Result<(), RemoteError>;

    fn item_manager(&self, collection: &Collection) -> Result<Self::Items, RemoteError>;

    /// Remove the current account from the project's members.
    fn leave(&self, collection: &Collection) -> Result<(), RemoteError>;
}

/// Access to the items of one project.
pub trait ItemManager {
    /// Build a new item with a fresh uid. Nothing is stored until `commit`.
    fn create(&self, meta: Metadata, content: Vec<u8>) -> Result<Item, RemoteError>;

    fn fetch(&self, uid: &str) -> Result<Item, RemoteError>;

    /// Every committed item of the project.
    fn list(&self) -> Result<Vec<Item>, RemoteError>;

    /// Persist all `items` in one transaction.
    fn commit(&self, items: &[Item]) -> Result<(), RemoteError>;
}
