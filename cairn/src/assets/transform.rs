//! Derivative options and the resize geometry they imply.
//!
//! Nothing here touches pixels: [`plan_resize`] turns a source size plus
//! [`TransformOptions`] into a [`ResizePlan`] that an [`ImageProcessor`]
//! carries out.
//!
//! [`ImageProcessor`]: super::ImageProcessor

use serde::{Deserialize, Serialize};

/// Largest derivative, in pixels, that will be produced. Bigger requests fail and
/// the original is served instead.
pub const MAX_OUTPUT_PIXELS: u64 = 40_000_000;

/// Requested derivative of a raster image. All fields optional; an empty set of
/// options means "serve the original".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<OutputFormat>,
    /// 1-100. Only the JPEG encoder honours it; PNG, WebP and GIF output
    /// ignore it.
    pub quality: Option<u8>,
    pub fit: Option<Fit>,
    pub position: Option<Position>,
    /// `#rgb`, `#rrggbb` or `#rrggbbaa`; fills the padding of `contain`
    pub background: Option<String>,
    pub without_enlargement: bool,
    pub without_reduction: bool,
}

impl TransformOptions {
    pub fn is_empty(&self) -> bool {
        self == &TransformOptions::default()
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn fit(mut self, fit: Fit) -> Self {
        self.fit = Some(fit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[serde(alias = "jpg")]
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Gif => "image/gif",
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "image/jpeg" => Some(OutputFormat::Jpeg),
            "image/png" => Some(OutputFormat::Png),
            "image/webp" => Some(OutputFormat::Webp),
            "image/gif" => Some(OutputFormat::Gif),
            _ => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::Webp),
            "gif" => Ok(OutputFormat::Gif),
            other => Err(format!("unsupported image format '{other}'")),
        }
    }
}

/// How the image is fitted when both width and height are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Fill the box, cropping the overflow
    #[default]
    Cover,
    /// Fit inside the box, padding with the background colour
    Contain,
    /// Stretch to the exact box, ignoring aspect ratio
    Fill,
    /// Fit inside the box; the output may be smaller than it
    Inside,
    /// Cover the box; the output may be larger than it
    Outside,
}

impl std::str::FromStr for Fit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cover" => Ok(Fit::Cover),
            "contain" => Ok(Fit::Contain),
            "fill" => Ok(Fit::Fill),
            "inside" => Ok(Fit::Inside),
            "outside" => Ok(Fit::Outside),
            other => Err(format!("unknown fit '{other}'")),
        }
    }
}

/// Anchor for cropping (`cover`) and placement (`contain`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Position {
    #[default]
    #[serde(rename = "center", alias = "centre")]
    Center,
    #[serde(rename = "top", alias = "north")]
    Top,
    #[serde(rename = "right top", alias = "northeast")]
    RightTop,
    #[serde(rename = "right", alias = "east")]
    Right,
    #[serde(rename = "right bottom", alias = "southeast")]
    RightBottom,
    #[serde(rename = "bottom", alias = "south")]
    Bottom,
    #[serde(rename = "left bottom", alias = "southwest")]
    LeftBottom,
    #[serde(rename = "left", alias = "west")]
    Left,
    #[serde(rename = "left top", alias = "northwest")]
    LeftTop,
}

impl Position {
    /// Horizontal and vertical anchor, each 0 (start), 1 (middle) or 2 (end).
    fn anchors(self) -> (u32, u32) {
        match self {
            Position::Center => (1, 1),
            Position::Top => (1, 0),
            Position::RightTop => (2, 0),
            Position::Right => (2, 1),
            Position::RightBottom => (2, 2),
            Position::Bottom => (1, 2),
            Position::LeftBottom => (0, 2),
            Position::Left => (0, 1),
            Position::LeftTop => (0, 0),
        }
    }

    /// Offset of a span of `inner` within `outer` along one axis.
    fn offset(anchor: u32, outer: u32, inner: u32) -> u32 {
        let slack = outer.saturating_sub(inner);
        match anchor {
            0 => 0,
            1 => slack / 2,
            _ => slack,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Geometry of a derivative: scale to `resize`, then either crop a window out of
/// the scaled image or place it on a padded canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub resize: (u32, u32),
    pub crop: Option<Rect>,
    /// Canvas size, with the scaled image at (`x`, `y`)
    pub pad: Option<Rect>,
}

impl ResizePlan {
    fn scale_only(width: u32, height: u32) -> Self {
        ResizePlan {
            resize: (width, height),
            crop: None,
            pad: None,
        }
    }

    /// Dimensions of the finished derivative.
    pub fn output_size(&self) -> (u32, u32) {
        if let Some(crop) = self.crop {
            (crop.width, crop.height)
        } else if let Some(pad) = self.pad {
            (pad.width, pad.height)
        } else {
            self.resize
        }
    }

    /// Largest buffer the plan allocates, in pixels.
    pub fn pixel_count(&self) -> u64 {
        let area = |(width, height): (u32, u32)| u64::from(width) * u64::from(height);
        let canvas = self.pad.map_or(0, |pad| area((pad.width, pad.height)));
        area(self.resize).max(canvas)
    }
}

/// Work out the derivative geometry for a `source` of (width, height).
pub fn plan_resize(source: (u32, u32), options: &TransformOptions) -> ResizePlan {
    let (sw, sh) = (source.0.max(1), source.1.max(1));
    let identity = ResizePlan::scale_only(sw, sh);

    let (scale_x, scale_y) = match (options.width, options.height) {
        (None, None) => return identity,
        (Some(w), None) => {
            let s = ratio(w, sw);
            (s, s)
        }
        (None, Some(h)) => {
            let s = ratio(h, sh);
            (s, s)
        }
        (Some(w), Some(h)) => {
            let (sx, sy) = (ratio(w, sw), ratio(h, sh));
            match options.fit.unwrap_or_default() {
                Fit::Fill => (sx, sy),
                Fit::Cover | Fit::Outside => (sx.max(sy), sx.max(sy)),
                Fit::Contain | Fit::Inside => (sx.min(sy), sx.min(sy)),
            }
        }
    };

    if options.without_enlargement && (scale_x > 1.0 || scale_y > 1.0) {
        return identity;
    }
    if options.without_reduction && (scale_x < 1.0 || scale_y < 1.0) {
        return identity;
    }

    let resize = (scaled(sw, scale_x), scaled(sh, scale_y));
    let (Some(w), Some(h)) = (options.width, options.height) else {
        return ResizePlan::scale_only(resize.0, resize.1);
    };

    let (ax, ay) = options.position.unwrap_or_default().anchors();
    match options.fit.unwrap_or_default() {
        Fit::Cover => ResizePlan {
            resize,
            crop: Some(Rect {
                x: Position::offset(ax, resize.0, w),
                y: Position::offset(ay, resize.1, h),
                width: w.min(resize.0),
                height: h.min(resize.1),
            }),
            pad: None,
        },
        Fit::Contain => ResizePlan {
            resize,
            crop: None,
            pad: Some(Rect {
                x: Position::offset(ax, w, resize.0),
                y: Position::offset(ay, h, resize.1),
                width: w,
                height: h,
            }),
        },
        Fit::Fill | Fit::Inside | Fit::Outside => ResizePlan::scale_only(resize.0, resize.1),
    }
}

fn ratio(target: u32, source: u32) -> f64 {
    f64::from(target) / f64::from(source)
}

fn scaled(length: u32, scale: f64) -> u32 {
    ((f64::from(length) * scale).round() as u32).max(1)
}
