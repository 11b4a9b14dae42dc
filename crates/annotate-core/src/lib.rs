//! Annotate Core - Client-side consistency layer for collaborative image annotation
//!
//! Projects live in an encrypted, versioned store. Each project carries a
//! gallery (one tile per uploaded image) and holds one item per image plus
//! one annotation item per (image, user). This crate keeps those pieces in
//! step:
//!
//! - **Session**: caches the active project and its item manager
//! - **Gallery**: tile lookups and field-wise tile patches
//! - **Records**: create-or-append of per-user annotation items
//! - **Annotation**: annotation data model and the trailing-placeholder merge
//! - **Image codec**: base64 PNG payloads, thumbnails and channel merging
//! - **Reconcile**: reports gallery entries that disagree with stored items
//! - **Client**: login, logout and the operations above behind one facade
//! - **Remote**: traits for the store, with in-memory and SQLite backends
//!
//! # Layout in the store
//!
//! ```text
//! Project (collection) -> gallery JSON
//!   ├─ image item       "gliff.image"      -> [[base64 PNG]]
//!   └─ annotation item  "gliff.annotation" -> [Annotation, ...]
//! ```

pub mod annotation;
pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod gallery;
pub mod image_codec;
pub mod item_meta;
pub mod memory;
pub mod reconcile;
pub mod records;
pub mod remote;
pub mod session;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use annotation::{
    merge_annotations, Annotation, BoundingBox, BoxCorners, Brush, BrushStroke, OptionalPoint,
    SpaceTimeInfo, Spline, Toolbox, XyPoint,
};
pub use client::{AnnotationClient, ImageDetails};
pub use config::{ClientConfig, ConfigError, Credentials};
pub use error::{Error, Result};
pub use gallery::{Gallery, GalleryError, Tile, TilePatch};
pub use image_codec::{ImageError, ImageSource, PreparedImage};
pub use memory::MemoryRemote;
pub use reconcile::{ConsistencyReport, DanglingAnnotation};
pub use remote::{
    Collection, CollectionManager, Item, ItemManager, Metadata, RemoteAccount, RemoteClient,
    RemoteError,
};
pub use session::ProjectSession;
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteRemote;
