//! The open project and its gallery.
//!
//! A [`ProjectSession`] caches at most one project together with its item
//! manager. [`ProjectSession::ensure`] refetches only when a different project
//! is requested, and every higher-level operation goes through it first.
//!
//! The session is single-threaded: callers that need concurrency must
//! serialize access or use one session per thread.

use tracing::{debug, info, warn};

use crate::content;
use crate::error::{Error, Result};
use crate::gallery::Gallery;
use crate::remote::{Collection, CollectionManager};

struct ActiveProject<I> {
    collection: Collection,
    items: I,
}

/// Cache of the currently open project.
pub struct ProjectSession<C: CollectionManager> {
    collections: C,
    active: Option<ActiveProject<C::Items>>,
    fetch_count: usize,
}

impl<C: CollectionManager> ProjectSession<C> {
    pub fn new(collections: C) -> Self {
        Self {
            collections,
            active: None,
            fetch_count: 0,
        }
    }

    /// Make `project_uid` the active project, fetching it unless it is
    /// already cached.
    pub fn ensure(&mut self, project_uid: &str) -> Result<()> {
        if self.project_uid() == Some(project_uid) {
            debug!(project_uid, "project already cached");
            return Ok(());
        }

        info!(project_uid, "fetching project data");
        let collection = self.collections.fetch(project_uid)?;
        let items = self.collections.item_manager(&collection)?;
        self.fetch_count += 1;
        self.active = Some(ActiveProject { collection, items });
        info!(project_uid, "project data fetched");
        Ok(())
    }

    /// How many times a project has been fetched from the store.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }

    pub fn project_uid(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.collection.uid.as_str())
    }

    pub fn collections(&self) -> &C {
        &self.collections
    }

    pub fn project(&self) -> Result<&Collection> {
        self.active
            .as_ref()
            .map(|a| &a.collection)
            .ok_or(Error::NoActiveProject)
    }

    pub fn items(&self) -> Result<&C::Items> {
        self.active
            .as_ref()
            .map(|a| &a.items)
            .ok_or(Error::NoActiveProject)
    }

    /// Forget the cached project.
    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Decode the project's content. A project with no content yet has an
    /// empty gallery.
    pub fn get_gallery(&self) -> Result<Gallery> {
        let project = self.project()?;
        if project.content().is_empty() {
            return Ok(Gallery::new());
        }
        content::decode(project.content()).map_err(|e| {
            warn!(project_uid = %project.uid, "error while accessing the project's content: {e}");
            Error::from(e)
        })
    }

    /// Encode `gallery` and write it as the project's content in one commit.
    /// The cached copy only changes once the commit succeeds.
    pub fn set_gallery(&mut self, gallery: &Gallery) -> Result<()> {
        let bytes = content::encode(gallery)?;
        let active = self.active.as_mut().ok_or(Error::NoActiveProject)?;
        let mut updated = active.collection.clone();
        updated.set_content(bytes);
        self.collections.commit(&updated)?;
        active.collection = updated;
        Ok(())
    }

    /// Read, modify and write back the gallery. Nothing is written when `f`
    /// fails.
    pub fn update_gallery<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Gallery) -> Result<T>,
    {
        let mut gallery = self.get_gallery()?;
        let out = f(&mut gallery)?;
        self.set_gallery(&gallery)?;
        Ok(out)
    }
}
