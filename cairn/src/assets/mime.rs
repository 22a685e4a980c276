/// Content type by lowercase file extension.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("pdf", "application/pdf"),
    ("json", "application/json"),
    ("zip", "application/zip"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
];

/// Look up the content type for a filename by its extension.
pub fn content_type_for(filename: &str) -> Option<&'static str> {
    let (_, extension) = filename.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, content_type)| *content_type)
}

/// Image types that can be decoded into pixels (everything under `image/` but SVG).
pub fn is_raster_image(content_type: &str) -> bool {
    content_type.starts_with("image/") && content_type != "image/svg+xml"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_extension() {
        assert_eq!(content_type_for("photo.JPG"), Some("image/jpeg"));
        assert_eq!(content_type_for("archive.tar.zip"), Some("application/zip"));
        assert_eq!(content_type_for("README"), None);
        assert_eq!(content_type_for("data.xyz"), None);
    }

    #[test]
    fn test_raster_images() {
        assert!(is_raster_image("image/png"));
        assert!(!is_raster_image("image/svg+xml"));
        assert!(!is_raster_image("video/mp4"));
    }
}
