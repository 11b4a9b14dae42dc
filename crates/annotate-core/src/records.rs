//! Annotation record management.
//!
//! Each (image, user) pair owns one annotation item whose content is the
//! JSON list of that user's [`Annotation`]s. The gallery tile of the image
//! links the pair to the item through `annotationUID[username]`; whether an
//! upload creates or updates is decided by that link alone.
//!
//! Creating a record is two commits: the item first, then the gallery patch
//! that links it. A failure between them leaves an item no tile points at;
//! [`crate::reconcile::check_consistency`] reports such items.

use tracing::{debug, info};

use crate::annotation::{merge_annotations, Annotation};
use crate::content;
use crate::error::{or_none, Error, Result};
use crate::gallery::{Gallery, GalleryError, TilePatch};
use crate::item_meta;
use crate::remote::{CollectionManager, ItemManager, Metadata};
use crate::session::ProjectSession;

/// Annotation item uid linked for (image, user), if any.
pub fn resolve_annotation_item(
    gallery: &Gallery,
    image_id: &str,
    username: &str,
) -> Option<String> {
    gallery
        .annotation_item(image_id, username)
        .map(str::to_string)
}

/// Store `annotations` for (image, user) and return the annotation item uid.
///
/// The first upload creates the item exactly as given and links it with
/// `annotationComplete[username] = false`, merging `metadata` into the
/// tile's `fileInfo`. Later uploads append to the existing record after
/// dropping a trailing empty placeholder, and patch `fileInfo` only when
/// `metadata` is non-empty.
pub fn upload<C: CollectionManager>(
    session: &mut ProjectSession<C>,
    project_uid: &str,
    image_id: &str,
    username: &str,
    annotations: Vec<Annotation>,
    metadata: Metadata,
) -> Result<String> {
    session.ensure(project_uid)?;
    let gallery = session.get_gallery()?;
    if gallery.find(image_id).is_none() {
        return Err(GalleryError::TileNotFound(image_id.to_string()).into());
    }

    match resolve_annotation_item(&gallery, image_id, username) {
        None => create_record(session, image_id, username, annotations, metadata),
        Some(item_uid) => {
            update_record(session, image_id, &item_uid, annotations, metadata)?;
            Ok(item_uid)
        }
    }
}

fn create_record<C: CollectionManager>(
    session: &mut ProjectSession<C>,
    image_id: &str,
    username: &str,
    annotations: Vec<Annotation>,
    metadata: Metadata,
) -> Result<String> {
    info!(image_id, username, "creating new annotation item");
    let items = session.items()?;
    let item = items.create(item_meta::annotation_item_meta(), content::encode(&annotations)?)?;
    items.commit(std::slice::from_ref(&item))?;
    info!(item_uid = %item.uid, "annotation item created");

    let patch = TilePatch::new()
        .file_info(metadata)
        .annotation(username, item.uid.clone())
        .complete(username, false);
    session.update_gallery(|gallery| {
        gallery.patch(image_id, patch)?;
        Ok(())
    })?;
    Ok(item.uid)
}

fn update_record<C: CollectionManager>(
    session: &mut ProjectSession<C>,
    image_id: &str,
    item_uid: &str,
    annotations: Vec<Annotation>,
    metadata: Metadata,
) -> Result<()> {
    info!(item_uid, "updating annotation item");
    let items = session.items()?;
    let mut item = items.fetch(item_uid)?;
    let prior: Vec<Annotation> = content::decode(&item.content)?;
    let merged = merge_annotations(prior, annotations);

    item_meta::touch(&mut item.meta);
    item.content = content::encode(&merged)?;
    items.commit(std::slice::from_ref(&item))?;
    info!(item_uid, count = merged.len(), "annotation item updated");

    if !metadata.is_empty() {
        session.update_gallery(|gallery| {
            gallery.patch(image_id, TilePatch::new().file_info(metadata))?;
            Ok(())
        })?;
    }
    Ok(())
}

/// The stored annotations of (image, user).
///
/// `None` when the user has not annotated the image yet, or when the gallery
/// or record cannot be decoded (logged). Store failures are returned.
pub fn list<C: CollectionManager>(
    session: &mut ProjectSession<C>,
    project_uid: &str,
    image_id: &str,
    username: &str,
) -> Result<Option<Vec<Annotation>>> {
    session.ensure(project_uid)?;
    or_none(
        find_record(session, image_id, username),
        "fetching an item's annotations",
    )
}

fn find_record<C: CollectionManager>(
    session: &ProjectSession<C>,
    image_id: &str,
    username: &str,
) -> Result<Option<Vec<Annotation>>> {
    let gallery = session.get_gallery()?;
    let Some(item_uid) = resolve_annotation_item(&gallery, image_id, username) else {
        debug!(image_id, username, "no annotation item yet");
        return Ok(None);
    };
    let item = session.items()?.fetch(&item_uid)?;
    Ok(Some(content::decode(&item.content)?))
}

/// Flag (image, user)'s annotation as complete or not, on both the item and
/// the gallery tile.
pub fn set_complete<C: CollectionManager>(
    session: &mut ProjectSession<C>,
    project_uid: &str,
    image_id: &str,
    username: &str,
    done: bool,
) -> Result<()> {
    session.ensure(project_uid)?;
    let gallery = session.get_gallery()?;
    let item_uid = resolve_annotation_item(&gallery, image_id, username).ok_or_else(|| {
        Error::from(GalleryError::AnnotationNotLinked {
            image_id: image_id.to_string(),
            username: username.to_string(),
        })
    })?;

    let items = session.items()?;
    let mut item = items.fetch(&item_uid)?;
    item_meta::set_complete(&mut item.meta, done);
    item_meta::touch(&mut item.meta);
    items.commit(std::slice::from_ref(&item))?;

    session.update_gallery(|gallery| {
        gallery.patch(image_id, TilePatch::new().complete(username, done))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Spline, Toolbox, XyPoint};
    use crate::gallery::Tile;
    use crate::memory::{MemoryCollections, MemoryRemote};
    use serde_json::{json, Value};

    struct Fixture {
        remote: MemoryRemote,
        project: String,
        session: ProjectSession<MemoryCollections>,
    }

    fn fixture() -> Fixture {
        let remote = MemoryRemote::new();
        let gallery = Gallery::from(vec![Tile::new("img-1", "thumb")]);
        let project = remote.create_project("ana", content::encode(&gallery).unwrap());
        let session = ProjectSession::new(remote.collections_for("ana"));
        Fixture {
            remote,
            project,
            session,
        }
    }

    fn drawn(x: f64) -> Annotation {
        Annotation::new(Toolbox::Spline).with_spline(Spline::new(vec![XyPoint::new(x, x)]))
    }

    fn meta(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn stored_record(f: &Fixture, uid: &str) -> Vec<Annotation> {
        let item = f
            .remote
            .project_items(&f.project)
            .into_iter()
            .find(|i| i.uid == uid)
            .unwrap();
        content::decode(&item.content).unwrap()
    }

    fn put(
        f: &mut Fixture,
        username: &str,
        annotations: Vec<Annotation>,
        metadata: Metadata,
    ) -> Result<String> {
        upload(&mut f.session, &f.project, "img-1", username, annotations, metadata)
    }

    #[test]
    fn first_upload_creates_and_links() {
        let mut f = fixture();
        let uid = put(&mut f, "ana", vec![drawn(1.0)], meta(json!({"source": "ui"}))).unwrap();

        let gallery = f.session.get_gallery().unwrap();
        let tile = gallery.get("img-1").unwrap();
        assert_eq!(tile.annotation_item("ana"), Some(uid.as_str()));
        assert_eq!(tile.annotation_complete.get("ana"), Some(&false));
        assert_eq!(tile.file_info["source"], "ui");

        let items = f.remote.project_items(&f.project);
        assert_eq!(items.len(), 1);
        assert!(item_meta::is_annotation(&items[0].meta));
        assert_eq!(items[0].meta["isComplete"], false);
    }

    #[test]
    fn first_upload_stores_annotations_as_given() {
        let mut f = fixture();
        let placeholder = Annotation::new(Toolbox::Paintbrush);
        let uid = put(&mut f, "ana", vec![placeholder.clone()], Metadata::new()).unwrap();
        assert_eq!(stored_record(&f, &uid), vec![placeholder]);
    }

    #[test]
    fn second_upload_updates_the_same_item() {
        let mut f = fixture();
        let first = put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();
        let second = put(&mut f, "ana", vec![drawn(2.0)], Metadata::new()).unwrap();

        assert_eq!(first, second);
        assert_eq!(f.remote.project_items(&f.project).len(), 1);
        assert_eq!(stored_record(&f, &first), vec![drawn(1.0), drawn(2.0)]);
    }

    #[test]
    fn trailing_placeholder_is_replaced_on_update() {
        let mut f = fixture();
        let uid = put(
            &mut f,
            "ana",
            vec![drawn(1.0), Annotation::new(Toolbox::Spline)],
            Metadata::new(),
        )
        .unwrap();
        put(&mut f, "ana", vec![drawn(2.0)], Metadata::new()).unwrap();
        assert_eq!(stored_record(&f, &uid), vec![drawn(1.0), drawn(2.0)]);
    }

    #[test]
    fn users_get_separate_records() {
        let mut f = fixture();
        let ana = put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();
        let bo = put(&mut f, "bo", vec![drawn(2.0)], Metadata::new()).unwrap();
        assert_ne!(ana, bo);

        let gallery = f.session.get_gallery().unwrap();
        let tile = gallery.get("img-1").unwrap();
        assert_eq!(tile.annotation_uid.len(), 2);
    }

    #[test]
    fn update_patches_file_info_only_with_metadata() {
        let mut f = fixture();
        put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();
        let before = f.remote.project_content(&f.project).unwrap();

        put(&mut f, "ana", vec![drawn(2.0)], Metadata::new()).unwrap();
        assert_eq!(f.remote.project_content(&f.project).unwrap(), before);

        put(&mut f, "ana", vec![], meta(json!({"reviewed": true}))).unwrap();
        let gallery = f.session.get_gallery().unwrap();
        assert_eq!(gallery.get("img-1").unwrap().file_info["reviewed"], true);
    }

    #[test]
    fn other_clients_tile_fields_survive_an_upload() {
        let remote = MemoryRemote::new();
        let project = remote.create_project(
            "ana",
            br#"[{"id":"img","imageUID":"img","frontEndField":"keep-me"}]"#.to_vec(),
        );
        let mut session = ProjectSession::new(remote.collections_for("ana"));
        upload(&mut session, &project, "img", "ana", vec![drawn(1.0)], Metadata::new()).unwrap();

        let stored: Value = content::decode(&remote.project_content(&project).unwrap()).unwrap();
        assert_eq!(stored[0]["frontEndField"], "keep-me");
        assert!(stored[0]["annotationUID"]["ana"].is_string());
    }

    #[test]
    fn other_clients_annotation_fields_survive_an_update() {
        let mut f = fixture();
        let uid = put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();

        let items = f.session.items().unwrap();
        let mut item = items.fetch(&uid).unwrap();
        let mut record: Value = content::decode(&item.content).unwrap();
        record[0]["id"] = json!(42);
        item.content = content::encode(&record).unwrap();
        items.commit(std::slice::from_ref(&item)).unwrap();

        put(&mut f, "ana", vec![drawn(2.0)], Metadata::new()).unwrap();
        let item = f.session.items().unwrap().fetch(&uid).unwrap();
        let record: Value = content::decode(&item.content).unwrap();
        assert_eq!(record[0]["id"], 42);
        assert_eq!(record.as_array().map(Vec::len), Some(2));

        let listed = list(&mut f.session, &f.project, "img-1", "ana").unwrap().unwrap();
        assert_eq!(listed[0].extra.get("id"), Some(&json!(42)));
    }

    #[test]
    fn upload_to_unknown_image_creates_nothing() {
        let mut f = fixture();
        let (session, project) = (&mut f.session, &f.project);
        let err =
            upload(session, project, "nope", "ana", vec![drawn(1.0)], Metadata::new()).unwrap_err();
        assert!(matches!(err, Error::Gallery(GalleryError::TileNotFound(_))));
        assert!(f.remote.project_items(&f.project).is_empty());
    }

    #[test]
    fn update_with_missing_item_is_a_remote_error() {
        let mut f = fixture();
        let uid = put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();
        f.remote.remove_item(&f.project, &uid);
        let err = put(&mut f, "ana", vec![drawn(2.0)], Metadata::new()).unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
    }

    #[test]
    fn list_is_none_before_any_upload() {
        let mut f = fixture();
        assert_eq!(list(&mut f.session, &f.project, "img-1", "ana").unwrap(), None);
        assert_eq!(list(&mut f.session, &f.project, "unknown", "ana").unwrap(), None);
    }

    #[test]
    fn list_returns_record_as_stored() {
        let mut f = fixture();
        put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();
        assert_eq!(
            list(&mut f.session, &f.project, "img-1", "ana").unwrap(),
            Some(vec![drawn(1.0)])
        );
    }

    #[test]
    fn list_of_undecodable_record_is_none() {
        let mut f = fixture();
        let uid = put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();

        let items = f.session.items().unwrap();
        let mut item = items.fetch(&uid).unwrap();
        item.content = b"not json".to_vec();
        items.commit(std::slice::from_ref(&item)).unwrap();

        assert_eq!(list(&mut f.session, &f.project, "img-1", "ana").unwrap(), None);
    }

    #[test]
    fn list_reports_store_failures() {
        let mut f = fixture();
        let uid = put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();
        f.remote.remove_item(&f.project, &uid);
        assert!(list(&mut f.session, &f.project, "img-1", "ana").is_err());
    }

    #[test]
    fn set_complete_updates_item_and_tile() {
        let mut f = fixture();
        let uid = put(&mut f, "ana", vec![drawn(1.0)], Metadata::new()).unwrap();
        set_complete(&mut f.session, &f.project, "img-1", "ana", true).unwrap();

        let gallery = f.session.get_gallery().unwrap();
        let tile = gallery.get("img-1").unwrap();
        assert_eq!(tile.annotation_complete.get("ana"), Some(&true));
        let item = f.session.items().unwrap().fetch(&uid).unwrap();
        assert_eq!(item.meta["isComplete"], true);

        let err = set_complete(&mut f.session, &f.project, "img-1", "bo", true).unwrap_err();
        assert!(matches!(err, Error::Gallery(GalleryError::AnnotationNotLinked { .. })));
    }
}
