//! Consistency check between the gallery and the project's items.
//!
//! Gallery patches and item commits are separate transactions, so an
//! interrupted upload can leave a tile pointing at an item that was never
//! stored, or an annotation item that no tile links. This module only
//! reports those states; repairing them is left to the caller.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::error::Result;
use crate::item_meta;
use crate::remote::{CollectionManager, ItemManager};
use crate::session::ProjectSession;

/// A tile's reference to an annotation item that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingAnnotation {
    pub image_id: String,
    pub username: String,
    pub item_uid: String,
}

/// Findings of [`check_consistency`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Tiles whose image item is missing.
    pub missing_images: Vec<String>,
    /// `annotationUID` entries naming missing items.
    pub dangling_annotations: Vec<DanglingAnnotation>,
    /// Annotation items no tile links to.
    pub orphaned_annotations: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_images.is_empty()
            && self.dangling_annotations.is_empty()
            && self.orphaned_annotations.is_empty()
    }
}

/// Compare the gallery of `project_uid` against its stored items.
pub fn check_consistency<C: CollectionManager>(
    session: &mut ProjectSession<C>,
    project_uid: &str,
) -> Result<ConsistencyReport> {
    session.ensure(project_uid)?;
    let gallery = session.get_gallery()?;
    let items = session.items()?.list()?;

    let stored: BTreeSet<&str> = items.iter().map(|item| item.uid.as_str()).collect();
    let mut linked = BTreeSet::new();
    let mut report = ConsistencyReport::default();

    for tile in gallery.tiles() {
        if !stored.contains(tile.image_uid.as_str()) {
            report.missing_images.push(tile.id.clone());
        }
        for (username, item_uid) in &tile.annotation_uid {
            linked.insert(item_uid.as_str());
            if !stored.contains(item_uid.as_str()) {
                report.dangling_annotations.push(DanglingAnnotation {
                    image_id: tile.id.clone(),
                    username: username.clone(),
                    item_uid: item_uid.clone(),
                });
            }
        }
    }

    report.orphaned_annotations = items
        .iter()
        .filter(|item| item_meta::is_annotation(&item.meta))
        .filter(|item| !linked.contains(item.uid.as_str()))
        .map(|item| item.uid.clone())
        .collect();

    if report.is_consistent() {
        info!(project_uid, "gallery and items are consistent");
    } else {
        warn!(
            project_uid,
            missing_images = report.missing_images.len(),
            dangling = report.dangling_annotations.len(),
            orphaned = report.orphaned_annotations.len(),
            "gallery and items disagree"
        );
    }
    Ok(report)
}
