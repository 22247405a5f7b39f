//! File naming and filtering used by transfers.

use std::path::Path;
use uuid::Uuid;

/// Extensions accepted as content images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Returns true if the path has one of the [IMAGE_EXTENSIONS].
///
/// Only the name is inspected. The file is never opened.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
}

/// Generate a file name that can not collide with concurrent writers.
///
/// The name carries a nanosecond timestamp for ordering plus a random discriminator, so two
/// handlers writing in the same nanosecond still get distinct names.
pub fn unique_file_name(prefix: &str, extension: &str) -> String {
    let discriminator = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}.{extension}", crate::now_nanos(), &discriminator[..8])
}
