//! The gallery: a project's ordered list of image tiles.
//!
//! A project's content is the JSON-encoded gallery. Each [`Tile`] describes
//! one uploaded image and links it to every user's annotation item.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-image record in the gallery. `id` equals the image item's uid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub id: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub image_labels: Vec<String>,
    #[serde(default)]
    pub file_info: Map<String, Value>,
    #[serde(default, rename = "imageUID")]
    pub image_uid: String,
    /// Username to annotation item uid.
    #[serde(default, rename = "annotationUID")]
    pub annotation_uid: BTreeMap<String, String>,
    /// Username to audit item uid.
    #[serde(default, rename = "auditUID")]
    pub audit_uid: BTreeMap<String, String>,
    #[serde(default)]
    pub annotation_complete: BTreeMap<String, bool>,
    /// Fields other clients store on the tile. Carried through every rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tile {
    /// A fresh tile for a newly uploaded image item.
    pub fn new(image_item_uid: impl Into<String>, thumbnail: impl Into<String>) -> Self {
        let uid = image_item_uid.into();
        Self {
            id: uid.clone(),
            thumbnail: thumbnail.into(),
            image_labels: Vec::new(),
            file_info: Map::new(),
            image_uid: uid,
            annotation_uid: BTreeMap::new(),
            audit_uid: BTreeMap::new(),
            annotation_complete: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.image_labels = labels;
        self
    }

    pub fn with_file_info(mut self, file_info: Map<String, Value>) -> Self {
        self.file_info = file_info;
        self
    }

    /// Annotation item uid for `username`, if they have annotated this image.
    pub fn annotation_item(&self, username: &str) -> Option<&str> {
        self.annotation_uid.get(username).map(String::as_str)
    }

    /// Merge a patch into this tile. Map fields merge key-wise, labels are
    /// replaced, absent fields are left alone.
    pub fn apply(&mut self, patch: TilePatch) {
        if let Some(file_info) = patch.file_info {
            self.file_info.extend(file_info);
        }
        if let Some(annotation_uid) = patch.annotation_uid {
            self.annotation_uid.extend(annotation_uid);
        }
        if let Some(audit_uid) = patch.audit_uid {
            self.audit_uid.extend(audit_uid);
        }
        if let Some(annotation_complete) = patch.annotation_complete {
            self.annotation_complete.extend(annotation_complete);
        }
        if let Some(labels) = patch.image_labels {
            self.image_labels = labels;
        }
    }
}

/// Fields to update on an existing tile. `None` means "leave untouched".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TilePatch {
    pub image_labels: Option<Vec<String>>,
    pub file_info: Option<Map<String, Value>>,
    pub annotation_uid: Option<BTreeMap<String, String>>,
    pub audit_uid: Option<BTreeMap<String, String>>,
    pub annotation_complete: Option<BTreeMap<String, bool>>,
}

impl TilePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.image_labels = Some(labels);
        self
    }

    pub fn file_info(mut self, file_info: Map<String, Value>) -> Self {
        self.file_info = Some(file_info);
        self
    }

    /// Link `username`'s annotation item.
    pub fn annotation(mut self, username: impl Into<String>, item_uid: impl Into<String>) -> Self {
        self.annotation_uid
            .get_or_insert_with(BTreeMap::new)
            .insert(username.into(), item_uid.into());
        self
    }

    pub fn audit(mut self, username: impl Into<String>, item_uid: impl Into<String>) -> Self {
        self.audit_uid
            .get_or_insert_with(BTreeMap::new)
            .insert(username.into(), item_uid.into());
        self
    }

    pub fn complete(mut self, username: impl Into<String>, done: bool) -> Self {
        self.annotation_complete
            .get_or_insert_with(BTreeMap::new)
            .insert(username.into(), done);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Error from gallery lookups that must find a tile.
#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("no gallery tile for image item {0}")]
    TileNotFound(String),

    #[error("{username} has no annotation item for image {image_id}")]
    AnnotationNotLinked { image_id: String, username: String },
}

/// Ordered tiles, in upload order. Encoded as a bare JSON list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gallery {
    tiles: Vec<Tile>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Index of the first tile with this id.
    pub fn find(&self, id: &str) -> Option<usize> {
        self.tiles.iter().position(|tile| tile.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Tile> {
        self.find(id).map(|i| &self.tiles[i])
    }

    /// Append a tile. The caller guarantees its id is not already present;
    /// a duplicate is stored anyway and shadowed by the earlier tile.
    pub fn insert(&mut self, tile: Tile) {
        self.tiles.push(tile);
    }

    /// Merge `patch` into the tile with this id.
    pub fn patch(&mut self, id: &str, patch: TilePatch) -> Result<&Tile, GalleryError> {
        let index = self
            .find(id)
            .ok_or_else(|| GalleryError::TileNotFound(id.to_string()))?;
        self.tiles[index].apply(patch);
        Ok(&self.tiles[index])
    }

    /// Annotation item uid for (image, user), if one has been linked.
    pub fn annotation_item(&self, image_id: &str, username: &str) -> Option<&str> {
        self.get(image_id)
            .and_then(|tile| tile.annotation_item(username))
    }
}

impl From<Vec<Tile>> for Gallery {
    fn from(tiles: Vec<Tile>) -> Self {
        Self { tiles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn gallery_of(ids: &[&str]) -> Gallery {
        ids.iter().map(|id| Tile::new(*id, "")).collect::<Vec<_>>().into()
    }

    #[test]
    fn find_returns_position() {
        let gallery = gallery_of(&["a", "b", "c"]);
        assert_eq!(gallery.find("b"), Some(1));
        assert_eq!(gallery.find("zzz"), None);
    }

    #[test]
    fn insert_appends_in_upload_order() {
        let mut gallery = gallery_of(&["a"]);
        gallery.insert(Tile::new("b", ""));
        let ids: Vec<_> = gallery.tiles().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_insert_is_shadowed_by_first() {
        let mut gallery = gallery_of(&["a"]);
        gallery.insert(Tile::new("a", "second").with_labels(vec!["dup".into()]));
        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.find("a"), Some(0));
        assert_eq!(gallery.get("a").unwrap().thumbnail, "");

        gallery.patch("a", TilePatch::new().labels(vec!["x".into()])).unwrap();
        assert_eq!(gallery.tiles()[0].image_labels, vec!["x".to_string()]);
        assert_eq!(gallery.tiles()[1].image_labels, vec!["dup".to_string()]);
    }

    #[test]
    fn file_info_merges_key_wise() {
        let mut gallery =
            Gallery::from(vec![Tile::new("a", "").with_file_info(info(json!({"b": 2})))]);
        let tile = gallery
            .patch("a", TilePatch::new().file_info(info(json!({"a": 1}))))
            .unwrap();
        assert_eq!(Value::Object(tile.file_info.clone()), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn labels_are_replaced_not_merged() {
        let mut gallery =
            Gallery::from(vec![Tile::new("a", "").with_labels(vec!["old".into(), "keep?".into()])]);
        let tile = gallery.patch("a", TilePatch::new().labels(vec!["x".into()])).unwrap();
        assert_eq!(tile.image_labels, vec!["x".to_string()]);
    }

    #[test]
    fn absent_fields_are_untouched() {
        let mut gallery = Gallery::from(vec![Tile::new("a", "thumb")
            .with_labels(vec!["l".into()])
            .with_file_info(info(json!({"k": true})))]);
        let before = gallery.get("a").unwrap().clone();
        gallery.patch("a", TilePatch::new().complete("ana", false)).unwrap();
        let after = gallery.get("a").unwrap();
        assert_eq!(after.image_labels, before.image_labels);
        assert_eq!(after.file_info, before.file_info);
        assert_eq!(after.annotation_complete.get("ana"), Some(&false));
    }

    #[test]
    fn user_maps_merge_key_wise() {
        let mut gallery = gallery_of(&["a"]);
        gallery
            .patch("a", TilePatch::new().annotation("ana", "i1").audit("ana", "au1"))
            .unwrap();
        gallery.patch("a", TilePatch::new().annotation("bo", "i2")).unwrap();
        let tile = gallery.get("a").unwrap();
        assert_eq!(tile.annotation_item("ana"), Some("i1"));
        assert_eq!(tile.annotation_item("bo"), Some("i2"));
        assert_eq!(tile.audit_uid.get("ana").map(String::as_str), Some("au1"));
    }

    #[test]
    fn patching_missing_tile_fails() {
        let mut gallery = gallery_of(&["a"]);
        let err = gallery.patch("nope", TilePatch::new()).unwrap_err();
        assert!(matches!(err, GalleryError::TileNotFound(ref id) if id == "nope"));
    }

    #[test]
    fn wire_format_matches_front_end() {
        let gallery = gallery_of(&["img-1"]);
        let value = serde_json::to_value(&gallery).unwrap();
        assert_eq!(
            value,
            json!([{
                "id": "img-1",
                "thumbnail": "",
                "imageLabels": [],
                "fileInfo": {},
                "imageUID": "img-1",
                "annotationUID": {},
                "auditUID": {},
                "annotationComplete": {}
            }])
        );
    }

    #[test]
    fn tiles_without_optional_maps_decode() {
        let gallery: Gallery =
            serde_json::from_value(json!([{"id": "x", "imageUID": "x"}])).unwrap();
        assert!(gallery.get("x").unwrap().annotation_complete.is_empty());
        assert!(serde_json::from_value::<Gallery>(json!([{"thumbnail": ""}])).is_err());
    }

    #[test]
    fn unmodelled_tile_fields_survive_patch_and_encode() {
        let mut gallery: Gallery = serde_json::from_value(json!([{
            "id": "img",
            "imageUID": "img",
            "frontEndField": "keep-me",
            "segmentation": {"model": "v2"}
        }]))
        .unwrap();
        gallery
            .patch("img", TilePatch::new().annotation("ana", "item-1"))
            .unwrap();

        let value = serde_json::to_value(&gallery).unwrap();
        assert_eq!(value[0]["frontEndField"], "keep-me");
        assert_eq!(value[0]["segmentation"], json!({"model": "v2"}));
        assert_eq!(value[0]["annotationUID"], json!({"ana": "item-1"}));
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(TilePatch::new().is_empty());
        assert!(!TilePatch::new().file_info(Map::new()).is_empty());
    }
}
