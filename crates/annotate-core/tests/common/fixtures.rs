//! Shared setup for client integration tests

use annotate_core::image_codec::encode_image;
use annotate_core::{AnnotationClient, Credentials, MemoryRemote};
use image::{DynamicImage, GrayImage, Luma};

pub const PASSWORD: &str = "correct horse";

/// A store with `ana` registered and one empty project she owns.
pub fn seeded_remote() -> (MemoryRemote, String) {
    let remote = MemoryRemote::new();
    remote.register_user("ana", PASSWORD);
    let project = remote.create_project("ana", Vec::new());
    (remote, project)
}

/// A client logged in as `username` against a shared store.
pub fn logged_in(remote: &MemoryRemote, username: &str) -> AnnotationClient<MemoryRemote> {
    let mut client = AnnotationClient::new(remote.clone());
    client
        .login(&Credentials::new(username, PASSWORD))
        .unwrap_or_else(|e| panic!("login as {}: {}", username, e));
    client
}

/// A uniform grayscale raster.
pub fn gray(width: u32, height: u32, value: u8) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
}

/// Base64 PNG payload of a uniform grayscale raster.
#[allow(dead_code)]
pub fn gray_payload(width: u32, height: u32, value: u8) -> String {
    encode_image(&gray(width, height, value), false).expect("encode fixture image")
}
