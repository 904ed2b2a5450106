//! # Atlas Dialects
//!
//! Atlas packers describe their output in several formats. Every parser here
//! turns its dialect into the same list of [`FrameDescriptor`]s, which the
//! [`TextureRegistry`](super::TextureRegistry) then turns into frames.
//!
//! | Dialect        | Shape                                               |
//! |----------------|-----------------------------------------------------|
//! | JSON array     | `{"frames": [{"filename": .., "frame": {..}}, ..]}`   |
//! | JSON hash      | `{"frames": {"name": {"frame": {..}}, ..}}`           |
//! | Starling XML   | `<TextureAtlas><SubTexture name=.. x=.. ../>`         |
//! | Bitmap font    | `<font><chars><char id=.. x=.. ../></chars></font>`   |
//! | Grid           | fixed-size cells with margin and spacing            |
//!
//! The two JSON forms carry identical per-frame objects and differ only in
//! whether the name sits inside the object or is the map key. Hash order is
//! file order (`serde_json` is built with `preserve_order`), so the same
//! sprite set parses to the same descriptor list either way.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use super::frame::Trim;

/// One frame as an atlas describes it, before it is attached to a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub trim: Option<Trim>,
    pub rotated: bool,
}

impl FrameDescriptor {
    pub fn new(name: impl Into<String>, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            width,
            height,
            trim: None,
            rotated: false,
        }
    }

    pub fn trimmed(mut self, x: u32, y: u32, source_width: u32, source_height: u32) -> Self {
        self.trim = Some(Trim {
            x,
            y,
            source_width,
            source_height,
        });
        self
    }

    pub fn rotated(mut self, rotated: bool) -> Self {
        self.rotated = rotated;
        self
    }
}

/// Errors from parsing atlas data or building frames from it.
#[derive(Debug)]
pub enum AtlasError {
    Json(serde_json::Error),
    Xml(roxmltree::Error),
    /// A required element or attribute is absent or not a number.
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    /// The declared untrimmed size cannot contain the cut rect.
    InvalidTrim {
        frame: String,
        source: (u32, u32),
        cut: (u32, u32),
    },
    ZeroSizedFrame,
    /// The image is too small to hold a single grid cell.
    GridTooSmall {
        image: (u32, u32),
        frame: (u32, u32),
    },
    /// A frame's far edge does not fit in `u32` pixel coordinates.
    RectOverflow { frame: String },
}

impl fmt::Display for AtlasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtlasError::Json(e) => write!(f, "malformed atlas JSON: {e}"),
            AtlasError::Xml(e) => write!(f, "malformed atlas XML: {e}"),
            AtlasError::MissingAttribute { element, attribute } => {
                write!(f, "<{element}> is missing required attribute '{attribute}'")
            }
            AtlasError::InvalidTrim { frame, source, cut } => write!(
                f,
                "frame '{frame}': source size {}x{} cannot contain cut {}x{}",
                source.0, source.1, cut.0, cut.1
            ),
            AtlasError::ZeroSizedFrame => write!(f, "grid frame width and height must be non-zero"),
            AtlasError::GridTooSmall { image, frame } => write!(
                f,
                "image {}x{} holds no {}x{} grid frames",
                image.0, image.1, frame.0, frame.1
            ),
            AtlasError::RectOverflow { frame } => {
                write!(f, "frame '{frame}' extends past the u32 coordinate range")
            }
        }
    }
}

impl std::error::Error for AtlasError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AtlasError::Json(e) => Some(e),
            AtlasError::Xml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AtlasError {
    fn from(e: serde_json::Error) -> Self {
        AtlasError::Json(e)
    }
}

impl From<roxmltree::Error> for AtlasError {
    fn from(e: roxmltree::Error) -> Self {
        AtlasError::Xml(e)
    }
}

// ---------------------------------------------------------------------------
// JSON (TexturePacker array and hash)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonRect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

#[derive(Deserialize)]
struct JsonSize {
    w: u32,
    h: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonFrame {
    #[serde(default)]
    filename: Option<String>,
    frame: JsonRect,
    #[serde(default)]
    rotated: bool,
    #[serde(default)]
    trimmed: bool,
    #[serde(default)]
    sprite_source_size: Option<JsonRect>,
    #[serde(default)]
    source_size: Option<JsonSize>,
}

impl JsonFrame {
    fn into_descriptor(self, name: String) -> FrameDescriptor {
        let mut desc = FrameDescriptor::new(name, self.frame.x, self.frame.y, self.frame.w, self.frame.h)
            .rotated(self.rotated);
        if self.trimmed {
            if let (Some(offset), Some(source)) = (self.sprite_source_size, self.source_size) {
                desc = desc.trimmed(offset.x, offset.y, source.w, source.h);
            }
        }
        desc
    }
}

fn frames_value(text: &str) -> Result<Value, AtlasError> {
    let mut doc: Value = serde_json::from_str(text)?;
    doc.get_mut("frames")
        .map(Value::take)
        .ok_or(AtlasError::MissingAttribute {
            element: "atlas",
            attribute: "frames",
        })
}

fn array_descriptors(items: Vec<Value>) -> Result<Vec<FrameDescriptor>, AtlasError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let frame: JsonFrame = serde_json::from_value(item)?;
            let name = frame.filename.clone().unwrap_or_else(|| index.to_string());
            Ok(frame.into_descriptor(name))
        })
        .collect()
}

fn hash_descriptors(map: serde_json::Map<String, Value>) -> Result<Vec<FrameDescriptor>, AtlasError> {
    map.into_iter()
        .map(|(name, item)| {
            let frame: JsonFrame = serde_json::from_value(item)?;
            Ok(frame.into_descriptor(name))
        })
        .collect()
}

/// Parse the JSON-array dialect: `"frames"` is a list of objects that each
/// carry their own `"filename"`.
pub fn parse_json_array(text: &str) -> Result<Vec<FrameDescriptor>, AtlasError> {
    match frames_value(text)? {
        Value::Array(items) => array_descriptors(items),
        _ => Err(AtlasError::MissingAttribute {
            element: "frames",
            attribute: "[]",
        }),
    }
}

/// Parse the JSON-hash dialect: `"frames"` maps each name to its frame.
pub fn parse_json_hash(text: &str) -> Result<Vec<FrameDescriptor>, AtlasError> {
    match frames_value(text)? {
        Value::Object(map) => hash_descriptors(map),
        _ => Err(AtlasError::MissingAttribute {
            element: "frames",
            attribute: "{}",
        }),
    }
}

/// Parse either JSON dialect, deciding by the shape of `"frames"`.
pub fn parse_json(text: &str) -> Result<Vec<FrameDescriptor>, AtlasError> {
    match frames_value(text)? {
        Value::Array(items) => array_descriptors(items),
        Value::Object(map) => hash_descriptors(map),
        _ => Err(AtlasError::MissingAttribute {
            element: "atlas",
            attribute: "frames",
        }),
    }
}

// ---------------------------------------------------------------------------
// XML (Starling atlas and bitmap font)
// ---------------------------------------------------------------------------

fn required<T: std::str::FromStr>(
    node: roxmltree::Node<'_, '_>,
    element: &'static str,
    attribute: &'static str,
) -> Result<T, AtlasError> {
    node.attribute(attribute)
        .and_then(|v| v.trim().parse().ok())
        .ok_or(AtlasError::MissingAttribute { element, attribute })
}

fn optional<T: std::str::FromStr>(node: roxmltree::Node<'_, '_>, attribute: &str) -> Option<T> {
    node.attribute(attribute).and_then(|v| v.trim().parse().ok())
}

/// Parse a Starling-style `<TextureAtlas>` document.
///
/// `frameX`/`frameY` are the (usually negative) offsets of the untrimmed
/// sprite relative to the cut rect; their magnitudes are the trim offsets.
pub fn parse_starling_xml(text: &str) -> Result<Vec<FrameDescriptor>, AtlasError> {
    let doc = roxmltree::Document::parse(text)?;
    let mut frames = Vec::new();

    for sub in doc.descendants().filter(|n| n.has_tag_name("SubTexture")) {
        let name = sub
            .attribute("name")
            .ok_or(AtlasError::MissingAttribute {
                element: "SubTexture",
                attribute: "name",
            })?;
        let mut desc = FrameDescriptor::new(
            name,
            required(sub, "SubTexture", "x")?,
            required(sub, "SubTexture", "y")?,
            required(sub, "SubTexture", "width")?,
            required(sub, "SubTexture", "height")?,
        );
        desc.rotated = sub.attribute("rotated") == Some("true");

        let frame_x: Option<i64> = optional(sub, "frameX");
        let frame_y: Option<i64> = optional(sub, "frameY");
        let frame_w: Option<u32> = optional(sub, "frameWidth");
        let frame_h: Option<u32> = optional(sub, "frameHeight");
        if let (Some(fx), Some(fy), Some(fw), Some(fh)) = (frame_x, frame_y, frame_w, frame_h) {
            desc = desc.trimmed(fx.unsigned_abs() as u32, fy.unsigned_abs() as u32, fw, fh);
        }
        frames.push(desc);
    }
    Ok(frames)
}

/// Placement metrics for one glyph of a bitmap font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    /// Index of this glyph's frame in the parsed descriptor list.
    pub frame: usize,
    pub x_offset: i32,
    pub y_offset: i32,
    pub x_advance: i32,
}

/// Font-wide metrics from a bitmap-font document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BitmapFont {
    pub face: String,
    pub size: i32,
    pub line_height: i32,
    pub glyphs: HashMap<u32, Glyph>,
    pub kernings: HashMap<(u32, u32), i32>,
}

impl BitmapFont {
    /// Kerning adjustment between two consecutive characters, 0 if none.
    pub fn kerning(&self, first: char, second: char) -> i32 {
        self.kernings
            .get(&(first as u32, second as u32))
            .copied()
            .unwrap_or(0)
    }

    pub fn glyph(&self, ch: char) -> Option<&Glyph> {
        self.glyphs.get(&(ch as u32))
    }

    /// Width in pixels of a single line of `text`, advances plus kerning.
    /// Characters the font lacks contribute nothing.
    pub fn measure(&self, text: &str) -> i32 {
        let mut width = 0;
        let mut previous: Option<char> = None;
        for ch in text.chars() {
            if let Some(glyph) = self.glyph(ch) {
                if let Some(prev) = previous {
                    width += self.kerning(prev, ch);
                }
                width += glyph.x_advance;
            }
            previous = Some(ch);
        }
        width
    }
}

/// Parse an XML bitmap font. Every `<char>` becomes a frame named by its
/// character code.
pub fn parse_bitmap_font_xml(text: &str) -> Result<(Vec<FrameDescriptor>, BitmapFont), AtlasError> {
    let doc = roxmltree::Document::parse(text)?;
    let mut font = BitmapFont::default();

    if let Some(info) = doc.descendants().find(|n| n.has_tag_name("info")) {
        font.face = info.attribute("face").unwrap_or_default().to_string();
        font.size = optional(info, "size").unwrap_or(0);
    }
    let common = doc
        .descendants()
        .find(|n| n.has_tag_name("common"))
        .ok_or(AtlasError::MissingAttribute {
            element: "font",
            attribute: "common",
        })?;
    font.line_height = required(common, "common", "lineHeight")?;

    let mut frames = Vec::new();
    for ch in doc.descendants().filter(|n| n.has_tag_name("char")) {
        let id: u32 = required(ch, "char", "id")?;
        font.glyphs.insert(
            id,
            Glyph {
                frame: frames.len(),
                x_offset: optional(ch, "xoffset").unwrap_or(0),
                y_offset: optional(ch, "yoffset").unwrap_or(0),
                x_advance: optional(ch, "xadvance").unwrap_or(0),
            },
        );
        frames.push(FrameDescriptor::new(
            id.to_string(),
            required(ch, "char", "x")?,
            required(ch, "char", "y")?,
            required(ch, "char", "width")?,
            required(ch, "char", "height")?,
        ));
    }

    for kerning in doc.descendants().filter(|n| n.has_tag_name("kerning")) {
        let first: u32 = required(kerning, "kerning", "first")?;
        let second: u32 = required(kerning, "kerning", "second")?;
        let amount: i32 = required(kerning, "kerning", "amount")?;
        font.kernings.insert((first, second), amount);
    }
    Ok((frames, font))
}

// ---------------------------------------------------------------------------
// Grid sprite sheets
// ---------------------------------------------------------------------------

/// Layout of a uniform sprite sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Border around the whole sheet.
    pub margin: u32,
    /// Gap between neighbouring cells.
    pub spacing: u32,
    /// Stop after this many frames.
    pub max_frames: Option<usize>,
}

impl GridLayout {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            margin: 0,
            spacing: 0,
            max_frames: None,
        }
    }
}

/// Slice an image into row-major grid cells named `"0"`, `"1"`, ...
pub fn grid(layout: GridLayout, image_width: u32, image_height: u32) -> Result<Vec<FrameDescriptor>, AtlasError> {
    let GridLayout {
        frame_width: fw,
        frame_height: fh,
        margin,
        spacing,
        max_frames,
    } = layout;
    if fw == 0 || fh == 0 {
        return Err(AtlasError::ZeroSizedFrame);
    }

    // Widened so extreme margins and spacings cannot overflow.
    let cells = |extent: u32, cell: u32| {
        (u64::from(extent) + u64::from(spacing)).saturating_sub(u64::from(margin) * 2)
            / (u64::from(cell) + u64::from(spacing))
    };
    let columns = cells(image_width, fw);
    let rows = cells(image_height, fh);
    let mut total = usize::try_from(columns.saturating_mul(rows)).unwrap_or(usize::MAX);
    if let Some(max) = max_frames {
        total = total.min(max);
    }
    if total == 0 {
        return Err(AtlasError::GridTooSmall {
            image: (image_width, image_height),
            frame: (fw, fh),
        });
    }

    let origin = |cell: u64, size: u32| {
        u32::try_from(u64::from(margin) + cell * (u64::from(size) + u64::from(spacing))).ok()
    };
    (0..total)
        .map(|i| {
            let (column, row) = (i as u64 % columns, i as u64 / columns);
            match (origin(column, fw), origin(row, fh)) {
                (Some(x), Some(y)) => Ok(FrameDescriptor::new(i.to_string(), x, y, fw, fh)),
                _ => Err(AtlasError::RectOverflow { frame: i.to_string() }),
            }
        })
        .collect()
}
