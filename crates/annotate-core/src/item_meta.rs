//! Metadata conventions for image and annotation items.

use chrono::Utc;
use serde_json::Value;

use crate::remote::Metadata;

pub const IMAGE_ITEM_TYPE: &str = "gliff.image";
pub const ANNOTATION_ITEM_TYPE: &str = "gliff.annotation";

const TYPE: &str = "type";
const CREATED_TIME: &str = "createdTime";
const MODIFIED_TIME: &str = "modifiedTime";
const IMAGE_NAME: &str = "imageName";
const IS_COMPLETE: &str = "isComplete";

/// Current UTC time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn stamped(kind: &str) -> Metadata {
    let now = now_millis();
    let mut meta = Metadata::new();
    meta.insert(TYPE.into(), kind.into());
    meta.insert(CREATED_TIME.into(), now.into());
    meta.insert(MODIFIED_TIME.into(), now.into());
    meta
}

pub fn image_item_meta(name: &str) -> Metadata {
    let mut meta = stamped(IMAGE_ITEM_TYPE);
    meta.insert(IMAGE_NAME.into(), name.into());
    meta
}

pub fn annotation_item_meta() -> Metadata {
    let mut meta = stamped(ANNOTATION_ITEM_TYPE);
    meta.insert(IS_COMPLETE.into(), false.into());
    meta
}

/// Refresh `modifiedTime`.
pub fn touch(meta: &mut Metadata) {
    meta.insert(MODIFIED_TIME.into(), now_millis().into());
}

pub fn set_complete(meta: &mut Metadata, done: bool) {
    meta.insert(IS_COMPLETE.into(), Value::Bool(done));
}

pub fn is_annotation(meta: &Metadata) -> bool {
    meta.get(TYPE).and_then(Value::as_str) == Some(ANNOTATION_ITEM_TYPE)
}

pub fn is_image(meta: &Metadata) -> bool {
    meta.get(TYPE).and_then(Value::as_str) == Some(IMAGE_ITEM_TYPE)
}

pub fn modified_time(meta: &Metadata) -> Option<i64> {
    meta.get(MODIFIED_TIME).and_then(Value::as_i64)
}
