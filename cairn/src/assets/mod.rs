//! Binary assets under `<content>/assets/`, with on-demand image derivatives.

mod mime;
#[cfg(feature = "image-processing")]
mod raster;
mod transform;

pub use mime::{content_type_for, is_raster_image};
#[cfg(feature = "image-processing")]
pub use raster::RasterImageProcessor;
pub use transform::{plan_resize, Fit, OutputFormat, Position, Rect, ResizePlan, TransformOptions};

use crate::error::{CairnError, Result};
use crate::store::ContentStore;
use crate::util::is_safe_name;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Decoding and derivative generation for raster images.
pub trait ImageProcessor: Send + Sync {
    /// Width and height of an encoded image.
    fn dimensions(&self, bytes: &[u8]) -> Result<(u32, u32)>;

    /// Resize, reformat and recompress an encoded image.
    fn transform(&self, bytes: &[u8], options: &TransformOptions) -> Result<TransformedImage>;
}

#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The processor a new [`ContentStore`] starts with.
#[cfg(feature = "image-processing")]
pub fn default_image_processor() -> Option<Box<dyn ImageProcessor>> {
    Some(Box::new(RasterImageProcessor))
}

#[cfg(not(feature = "image-processing"))]
pub fn default_image_processor() -> Option<Box<dyn ImageProcessor>> {
    None
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub filename: String,
    /// Overrides the content type derived from the extension
    pub content_type: Option<String>,
}

impl UploadOptions {
    pub fn new(filename: &str) -> Self {
        UploadOptions {
            filename: filename.to_string(),
            content_type: None,
        }
    }
}

/// Metadata of a stored asset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Asset bytes as served, either the original file or a derivative.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub size: u64,
    pub content_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListAssetsOptions {
    /// Case-insensitive substring of the filename
    pub search: Option<String>,
    pub limit: Option<usize>,
    /// Only list filenames that sort after this one
    pub start_after: Option<String>,
}

impl ContentStore {
    /// Store `bytes` under the requested filename, or under the first free
    /// `name-N.ext` variant if it is taken. Never overwrites an existing asset.
    pub fn upload_asset(&self, bytes: &[u8], options: &UploadOptions) -> Result<AssetInfo> {
        if !is_safe_name(&options.filename) {
            return Err(CairnError::InvalidName(options.filename.clone()));
        }
        let dir = self.assets_dir();
        std::fs::create_dir_all(&dir)?;

        let mut suffix = 0u32;
        let (filename, path, mut file) = loop {
            let candidate = numbered_filename(&options.filename, suffix);
            let path = dir.join(&candidate);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (candidate, path, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = file.write_all(bytes).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(e.into());
        }
        log::debug!("Stored asset {filename} ({} bytes)", bytes.len());

        let content_type = options
            .content_type
            .clone()
            .or_else(|| content_type_for(&filename).map(str::to_string));
        let (width, height) = self.image_dimensions(content_type.as_deref(), bytes);

        Ok(AssetInfo {
            filename,
            path,
            size: bytes.len() as u64,
            content_type,
            width,
            height,
        })
    }

    /// Read an asset's bytes. `AssetNotFound` when there is no such file.
    pub fn read_asset(&self, filename: &str) -> Result<Vec<u8>> {
        if !is_safe_name(filename) {
            return Err(CairnError::AssetNotFound(filename.to_string()));
        }
        std::fs::read(self.assets_dir().join(filename)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CairnError::AssetNotFound(filename.to_string())
            } else {
                e.into()
            }
        })
    }

    /// Get an asset, transformed when `options` ask for a derivative of a raster
    /// image. If the derivative cannot be produced the original bytes are served.
    pub fn get_asset(&self, filename: &str, options: &TransformOptions) -> Option<Asset> {
        let bytes = match self.read_asset(filename) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::debug!("Asset {filename} unavailable: {e}");
                return None;
            }
        };
        let content_type = content_type_for(filename);

        if !options.is_empty() && content_type.is_some_and(is_raster_image) {
            match self.derivative(&bytes, options) {
                Ok(derived) => {
                    let content_type = options
                        .format
                        .map(OutputFormat::content_type)
                        .or(content_type);
                    return Some(Asset {
                        filename: filename.to_string(),
                        size: derived.bytes.len() as u64,
                        bytes: derived.bytes,
                        content_type: content_type.map(str::to_string),
                        width: Some(derived.width),
                        height: Some(derived.height),
                    });
                }
                Err(e) => log::warn!("Serving original {filename}: {e}"),
            }
        }

        let (width, height) = self.image_dimensions(content_type, &bytes);
        Some(Asset {
            filename: filename.to_string(),
            size: bytes.len() as u64,
            bytes,
            content_type: content_type.map(str::to_string),
            width,
            height,
        })
    }

    /// List assets in filename order: search, then cursor, then limit.
    pub fn list_assets(&self, options: &ListAssetsOptions) -> Result<Vec<AssetInfo>> {
        let dir = self.assets_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut filenames = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if is_safe_name(&name) => filenames.push(name),
                Ok(name) => log::debug!("Not listing asset with unsafe name {name:?}"),
                Err(name) => log::debug!("Not listing asset with non-UTF-8 name {name:?}"),
            }
        }
        filenames.sort();

        let search = options.search.as_deref().map(str::to_lowercase);
        let selected = filenames
            .into_iter()
            .filter(|name| {
                search
                    .as_deref()
                    .map_or(true, |needle| name.to_lowercase().contains(needle))
            })
            .filter(|name| {
                options
                    .start_after
                    .as_deref()
                    .map_or(true, |cursor| name.as_str() > cursor)
            })
            .take(options.limit.unwrap_or(usize::MAX));

        Ok(selected
            .filter_map(|filename| self.stored_asset_info(filename))
            .collect())
    }

    /// Metadata of a file in the assets directory, or None if it has gone away.
    fn stored_asset_info(&self, filename: String) -> Option<AssetInfo> {
        let path = self.assets_dir().join(&filename);
        let size = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                log::debug!("Skipping asset {filename}: {e}");
                return None;
            }
        };
        let content_type = content_type_for(&filename);
        let (width, height) = if content_type.is_some_and(is_raster_image) {
            std::fs::read(&path)
                .map(|bytes| self.image_dimensions(content_type, &bytes))
                .unwrap_or((None, None))
        } else {
            (None, None)
        };
        Some(AssetInfo {
            filename,
            path,
            size,
            content_type: content_type.map(str::to_string),
            width,
            height,
        })
    }

    /// Delete an asset. Returns false if there was nothing to delete.
    pub fn delete_asset(&self, filename: &str) -> Result<bool> {
        if !is_safe_name(filename) {
            return Ok(false);
        }
        let removed = crate::store::remove_file_if_exists(&self.assets_dir().join(filename))?;
        if removed {
            log::debug!("Deleted asset {filename}");
        }
        Ok(removed)
    }

    fn derivative(&self, bytes: &[u8], options: &TransformOptions) -> Result<TransformedImage> {
        let processor = self
            .image_processor()
            .ok_or_else(|| CairnError::Image("no image processor configured".to_string()))?;
        processor.transform(bytes, options)
    }

    /// Best-effort width and height of a raster image.
    fn image_dimensions(&self, content_type: Option<&str>, bytes: &[u8]) -> (Option<u32>, Option<u32>) {
        let processor = match (content_type, self.image_processor()) {
            (Some(content_type), Some(processor)) if is_raster_image(content_type) => processor,
            _ => return (None, None),
        };
        match processor.dimensions(bytes) {
            Ok((width, height)) => (Some(width), Some(height)),
            Err(e) => {
                log::debug!("Could not read image dimensions: {e}");
                (None, None)
            }
        }
    }
}

/// `logo.png` with suffix 2 is `logo-2.png`; suffix 0 is the name itself.
fn numbered_filename(filename: &str, suffix: u32) -> String {
    if suffix == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, extension)) => format!("{stem}-{suffix}.{extension}"),
        None => format!("{filename}-{suffix}"),
    }
}
