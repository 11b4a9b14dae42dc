//! Client facade over a store account.
//!
//! [`AnnotationClient`] logs in, keeps a [`ProjectSession`] for the account
//! and exposes the image and annotation operations. Every operation first
//! makes the requested project active; without a logged-in account they
//! fail with [`Error::NoActiveProject`].

use image::DynamicImage;
use tracing::{debug, error, info, warn};

use crate::annotation::Annotation;
use crate::config::{ClientConfig, Credentials};
use crate::content;
use crate::error::{or_none, Error, Result};
use crate::gallery::{Tile, TilePatch};
use crate::image_codec::{self, ImageSource, PreparedImage};
use crate::item_meta;
use crate::reconcile::{self, ConsistencyReport};
use crate::records;
use crate::remote::{
    CollectionManager, Item, ItemManager, Metadata, RemoteAccount, RemoteClient,
};
use crate::session::ProjectSession;

type SessionOf<R> =
    ProjectSession<<<R as RemoteClient>::Account as RemoteAccount>::Collections>;

/// A tile's metadata and image-wise labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDetails {
    pub metadata: Metadata,
    pub labels: Vec<String>,
}

pub struct AnnotationClient<R: RemoteClient> {
    remote: R,
    account: Option<R::Account>,
    session: Option<SessionOf<R>>,
}

impl<R: RemoteClient> AnnotationClient<R> {
    /// A client that is not logged in yet.
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            account: None,
            session: None,
        }
    }

    /// Create a client and log in with the config's access key.
    pub fn connect(remote: R, config: &ClientConfig) -> Result<Self> {
        let credentials = config.credentials()?;
        let mut client = Self::new(remote);
        client.login(&credentials)?;
        Ok(client)
    }

    /// Log in, accept pending project invitations and start a fresh session.
    pub fn login(&mut self, credentials: &Credentials) -> Result<()> {
        if self.account.is_some() {
            self.logout()?;
        }

        info!(username = %credentials.username, "logging in to store");
        let account = self.remote.login(credentials)?;
        info!("logged in");

        let accepted = account.accept_pending_invitations()?;
        if accepted > 0 {
            info!(accepted, "invitations accepted");
        }

        info!("fetching project manager");
        self.session = Some(ProjectSession::new(account.collection_manager()?));
        self.account = Some(account);
        Ok(())
    }

    /// Log out and drop the cached project. Does nothing when logged out.
    pub fn logout(&mut self) -> Result<()> {
        self.session = None;
        if let Some(account) = self.account.take() {
            info!(username = account.username(), "logging out");
            account.logout()?;
            info!("logged out");
        }
        Ok(())
    }

    pub fn username(&self) -> Option<&str> {
        self.account.as_ref().map(|a| a.username())
    }

    pub fn is_logged_in(&self) -> bool {
        self.account.is_some()
    }

    /// The project session, if logged in.
    pub fn session(&self) -> Option<&SessionOf<R>> {
        self.session.as_ref()
    }

    fn session_mut(&mut self) -> Result<&mut SessionOf<R>> {
        self.session.as_mut().ok_or_else(|| {
            warn!("log in to a store account to use this method");
            Error::NoActiveProject
        })
    }

    fn active(&mut self, project_uid: &str) -> Result<&mut SessionOf<R>> {
        let session = self.session_mut()?;
        session.ensure(project_uid)?;
        Ok(session)
    }

    pub fn get_project_item(&mut self, project_uid: &str, item_uid: &str) -> Result<Item> {
        let session = self.active(project_uid)?;
        info!(item_uid, "fetching item");
        let item = session.items()?.fetch(item_uid)?;
        info!(item_uid, "item fetched");
        Ok(item)
    }

    /// Store a 2-D image as a new image item and append its gallery tile.
    /// Returns the image item's uid, which is also the tile id.
    pub fn upload_image(
        &mut self,
        project_uid: &str,
        name: &str,
        image: impl Into<ImageSource>,
        image_labels: Vec<String>,
        metadata: Metadata,
    ) -> Result<String> {
        info!(name, "creating new image item");
        let session = self.active(project_uid)?;
        let prepared = PreparedImage::from_source(image.into())?;

        let items = session.items()?;
        let item = items.create(
            item_meta::image_item_meta(name),
            content::encode(&prepared.slices())?,
        )?;
        items.commit(std::slice::from_ref(&item))?;
        info!(item_uid = %item.uid, "image item created");

        let mut file_info = Metadata::new();
        file_info.insert("imageName".into(), name.into());
        file_info.insert("width".into(), prepared.width.into());
        file_info.insert("height".into(), prepared.height.into());
        file_info.extend(metadata);

        let tile = Tile::new(item.uid.clone(), prepared.thumbnail)
            .with_labels(image_labels)
            .with_file_info(file_info);
        info!("updating gallery's content");
        session.update_gallery(|gallery| {
            gallery.insert(tile);
            Ok(())
        })?;
        Ok(item.uid)
    }

    /// Merge `metadata` into the tile's `fileInfo` and, when given, replace its
    /// labels. An empty list clears them once there is something to write.
    /// Also refreshes the image item's `modifiedTime`.
    pub fn update_metadata_and_labels(
        &mut self,
        project_uid: &str,
        item_uid: &str,
        image_labels: Option<Vec<String>>,
        metadata: Metadata,
    ) -> Result<()> {
        if metadata.is_empty() && image_labels.as_ref().map_or(true, Vec::is_empty) {
            debug!(item_uid, "nothing to update");
            return Ok(());
        }

        info!(item_uid, "updating image item's metadata");
        let session = self.active(project_uid)?;
        let items = session.items()?;
        let mut item = items.fetch(item_uid)?;
        item_meta::touch(&mut item.meta);
        items.commit(std::slice::from_ref(&item))?;

        let mut patch = TilePatch::new().file_info(metadata);
        patch.image_labels = image_labels;
        session.update_gallery(|gallery| {
            gallery.patch(item_uid, patch)?;
            Ok(())
        })?;
        info!(item_uid, "metadata updated");
        Ok(())
    }

    /// Decode an image item back into one raster: a single channel as-is,
    /// three channels merged as RGB. `None` if the payload is unusable.
    pub fn get_image_data(
        &mut self,
        project_uid: &str,
        item_uid: &str,
    ) -> Result<Option<DynamicImage>> {
        let session = self.active(project_uid)?;
        info!(item_uid, "fetching item's image data");
        let item = session.items()?.fetch(item_uid)?;
        let image = content::decode::<Vec<Vec<String>>>(&item.content)
            .map_err(Error::from)
            .and_then(|slices| image_codec::image_from_slices(&slices).map_err(Error::from));
        let image = or_none(image.map(Some), "fetching an item's image data")?;
        if image.is_some() {
            info!(item_uid, "image data fetched");
        }
        Ok(image)
    }

    /// Metadata and labels of the tile for `item_uid`, or `None` when there
    /// is no such tile.
    pub fn get_metadata_and_labels(
        &mut self,
        project_uid: &str,
        item_uid: &str,
    ) -> Result<Option<ImageDetails>> {
        let session = self.active(project_uid)?;
        let details = session.get_gallery().map(|gallery| {
            let details = gallery.get(item_uid).map(|tile| ImageDetails {
                metadata: tile.file_info.clone(),
                labels: tile.image_labels.clone(),
            });
            if details.is_none() {
                error!(item_uid, "no gallery tile for image item");
            }
            details
        });
        or_none(details, "retrieving image item's metadata")
    }

    /// Append `annotations` to `username`'s record for the image, creating it
    /// on first use. Returns the annotation item's uid.
    pub fn upload_annotation(
        &mut self,
        project_uid: &str,
        image_item_uid: &str,
        username: &str,
        annotations: Vec<Annotation>,
        metadata: Metadata,
    ) -> Result<String> {
        let session = self.session_mut()?;
        records::upload(session, project_uid, image_item_uid, username, annotations, metadata)
    }

    /// `username`'s annotations for the image, `None` if there are none yet.
    pub fn get_annotations(
        &mut self,
        project_uid: &str,
        image_item_uid: &str,
        username: &str,
    ) -> Result<Option<Vec<Annotation>>> {
        let session = self.session_mut()?;
        records::list(session, project_uid, image_item_uid, username)
    }

    pub fn set_annotation_complete(
        &mut self,
        project_uid: &str,
        image_item_uid: &str,
        username: &str,
        done: bool,
    ) -> Result<()> {
        let session = self.session_mut()?;
        records::set_complete(session, project_uid, image_item_uid, username, done)
    }

    /// Report disagreements between the gallery and the stored items.
    pub fn check_consistency(&mut self, project_uid: &str) -> Result<ConsistencyReport> {
        let session = self.session_mut()?;
        reconcile::check_consistency(session, project_uid)
    }

    /// Leave the project and drop it from the cache.
    pub fn leave_project(&mut self, project_uid: &str) -> Result<()> {
        let session = self.active(project_uid)?;
        info!(project_uid, "leaving project");
        session.collections().leave(session.project()?)?;
        session.clear();
        info!(project_uid, "left project");
        Ok(())
    }
}

impl<R: RemoteClient> Drop for AnnotationClient<R> {
    fn drop(&mut self) {
        if let Err(e) = self.logout() {
            error!("error while logging out: {e}");
        }
    }
}
