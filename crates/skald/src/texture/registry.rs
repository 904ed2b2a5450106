//! # Texture Registry — Keys to Pixels and Frames
//!
//! The registry is an explicitly constructed object handed to whoever renders.
//! It maps a string key to a [`Texture`]: the pixel source, the frames cut
//! from it, and (for fonts) glyph metrics.
//!
//! ```text
//! TextureRegistry
//! ┌──────────────────────────────────────────────────────────┐
//! │ entries: HashMap<String, Entry>                          │
//! │   "__MISSING" → checkerboard placeholder  ◄── always here │
//! │   "hero"      → Arc<Texture> + gpu_dirty [true, false]    │
//! │   "tiles"     → Arc<Texture> + gpu_dirty [false]          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Missing Resources
//!
//! Asking for a key or frame that does not exist is not an error. The
//! caller gets the checkerboard placeholder frame so the problem is visible
//! on screen, and a warning is logged once per distinct [`MissingResource`].
//! Each first sighting is also queued for
//! [`take_missing`](TextureRegistry::take_missing), so a renderer can report
//! it as a structured event.
//!
//! ## Atomic Replacement
//!
//! A texture is never edited in place. Adding, replacing, or removing swaps
//! the whole `Arc<Texture>`, so a renderer holding the previous `Arc` keeps a
//! complete, consistent frame list for the rest of its frame.
//!
//! ## GPU Residency
//!
//! Each entry keeps one dirty flag per render-context slot. Replacing the
//! pixels marks every slot dirty; a renderer calls
//! [`take_dirty`](TextureRegistry::take_dirty) with its own slot before
//! binding, uploading only when that returns `true`. A slot the registry
//! has never heard of counts as dirty, so a new context uploads everything
//! on first use.
//!
//! Removing a texture queues its id for every context that renders from the
//! registry; each drains its share with
//! [`take_released`](TextureRegistry::take_released) and frees the GPU copy.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};

use super::atlas::{self, AtlasError, BitmapFont, FrameDescriptor, GridLayout};
use super::frame::{Frame, FrameKey};

/// Key of the checkerboard placeholder texture.
pub const MISSING_KEY: &str = "__MISSING";

const MISSING_SIZE: u32 = 32;

/// Stable identity of one registered texture, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u32);

impl TextureId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// The pixels behind a texture. `pixels` is `None` for sources that only
/// exist on the GPU side (render targets, externally uploaded images).
#[derive(Debug, Clone)]
pub struct TextureSource {
    pub width: u32,
    pub height: u32,
    pub pixels: Option<Arc<RgbaImage>>,
}

impl TextureSource {
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: Some(Arc::new(image)),
        }
    }

    /// A source with dimensions but no CPU-side pixels.
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: None,
        }
    }
}

/// A registered texture: its source, the whole-image base frame, and any
/// frames cut from it.
#[derive(Debug, Clone)]
pub struct Texture {
    id: TextureId,
    key: String,
    source: TextureSource,
    base: Frame,
    frames: Vec<Frame>,
    names: HashMap<String, usize>,
    font: Option<BitmapFont>,
}

impl Texture {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.source.width
    }

    pub fn height(&self) -> u32 {
        self.source.height
    }

    pub fn base_frame(&self) -> &Frame {
        &self.base
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn font(&self) -> Option<&BitmapFont> {
        self.font.as_ref()
    }

    /// Look up a frame. Unknown names and out-of-range indices give `None`.
    pub fn frame(&self, key: &FrameKey) -> Option<&Frame> {
        match key {
            FrameKey::Base => Some(&self.base),
            FrameKey::Name(name) => self.names.get(name).map(|&i| &self.frames[i]),
            FrameKey::Index(index) => self.frames.get(*index),
        }
    }

    fn slot_of(&self, key: &FrameKey) -> Option<FrameSlot> {
        match key {
            FrameKey::Base => Some(FrameSlot::Base),
            FrameKey::Name(name) => self.names.get(name).map(|&i| FrameSlot::Index(i)),
            FrameKey::Index(index) => (*index < self.frames.len()).then_some(FrameSlot::Index(*index)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameSlot {
    Base,
    Index(usize),
}

/// A resolved frame that stays valid even if the registry entry is swapped
/// out afterwards.
#[derive(Debug, Clone)]
pub struct FrameRef {
    texture: Arc<Texture>,
    slot: FrameSlot,
    missing: bool,
}

impl FrameRef {
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn frame(&self) -> &Frame {
        match self.slot {
            FrameSlot::Base => &self.texture.base,
            FrameSlot::Index(i) => &self.texture.frames[i],
        }
    }

    /// True when the requested texture or frame did not exist and this is
    /// the placeholder.
    pub fn is_missing(&self) -> bool {
        self.missing
    }
}

/// Errors from registering textures.
#[derive(Debug)]
pub enum TextureError {
    EmptyKey,
    /// The key is already registered; use `replace_source` to change pixels.
    KeyInUse(String),
    Atlas(AtlasError),
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::EmptyKey => write!(f, "texture key must not be empty"),
            TextureError::KeyInUse(key) => write!(f, "texture key '{key}' is already in use"),
            TextureError::Atlas(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TextureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TextureError::Atlas(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AtlasError> for TextureError {
    fn from(e: AtlasError) -> Self {
        TextureError::Atlas(e)
    }
}

struct Entry {
    texture: Arc<Texture>,
    gpu_dirty: Vec<bool>,
}

/// A texture or frame that was asked for but is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MissingResource {
    Texture(String),
    Frame { key: String, frame: FrameKey },
}

#[derive(Default)]
struct MissingLog {
    seen: HashSet<MissingResource>,
    unreported: Vec<MissingResource>,
}

/// Removed texture ids, read independently by each context slot.
#[derive(Default)]
struct ReleaseQueue {
    ids: Vec<TextureId>,
    /// Per slot: how far into `ids` it has read.
    cursors: HashMap<usize, usize>,
}

impl ReleaseQueue {
    fn take(&mut self, slot: usize) -> Vec<TextureId> {
        let len = self.ids.len();
        // A slot that starts reading now never uploaded anything removed before.
        let cursor = self.cursors.entry(slot).or_insert(len);
        let taken = self.ids[*cursor..].to_vec();
        *cursor = len;

        let consumed = self.cursors.values().copied().min().unwrap_or(len);
        if consumed > 0 {
            self.ids.drain(..consumed);
            self.cursors.values_mut().for_each(|c| *c -= consumed);
        }
        taken
    }
}

pub struct TextureRegistry {
    entries: HashMap<String, Entry>,
    next_id: u32,
    missing: Mutex<MissingLog>,
    released: ReleaseQueue,
}

impl TextureRegistry {
    /// A registry holding only the missing-texture placeholder.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
            next_id: 0,
            missing: Mutex::new(MissingLog::default()),
            released: ReleaseQueue::default(),
        };
        let placeholder = TextureSource::from_image(checkerboard());
        let texture = registry.build(MISSING_KEY, placeholder, Vec::new(), None);
        registry.insert(texture);
        registry
    }

    fn build(
        &mut self,
        key: &str,
        source: TextureSource,
        mut frames: Vec<Frame>,
        font: Option<BitmapFont>,
    ) -> Texture {
        let id = TextureId(self.next_id);
        self.next_id += 1;
        let size = (source.width, source.height);
        for frame in &mut frames {
            frame.attach(id);
        }
        let names = frames
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().to_string(), i))
            .collect();
        Texture {
            id,
            key: key.to_string(),
            base: Frame::new("__BASE", id, (0, 0, size.0, size.1), size),
            source,
            frames,
            names,
            font,
        }
    }

    fn insert(&mut self, texture: Texture) -> TextureId {
        let id = texture.id;
        self.entries.insert(
            texture.key.clone(),
            Entry {
                texture: Arc::new(texture),
                gpu_dirty: Vec::new(),
            },
        );
        id
    }

    fn check_key(&self, key: &str) -> Result<(), TextureError> {
        if key.is_empty() {
            return Err(TextureError::EmptyKey);
        }
        if self.entries.contains_key(key) {
            return Err(TextureError::KeyInUse(key.to_string()));
        }
        Ok(())
    }

    /// Register a plain image. Its only frame is the whole-image base frame.
    pub fn add_image(&mut self, key: &str, source: TextureSource) -> Result<TextureId, TextureError> {
        self.add_atlas(key, source, &[])
    }

    /// Register an image with frames cut from it.
    pub fn add_atlas(
        &mut self,
        key: &str,
        source: TextureSource,
        descriptors: &[FrameDescriptor],
    ) -> Result<TextureId, TextureError> {
        self.add_with_font(key, source, descriptors, None)
    }

    fn add_with_font(
        &mut self,
        key: &str,
        source: TextureSource,
        descriptors: &[FrameDescriptor],
        font: Option<BitmapFont>,
    ) -> Result<TextureId, TextureError> {
        self.check_key(key)?;
        let size = (source.width, source.height);
        let frames = descriptors
            .iter()
            .map(|desc| frame_from_descriptor(desc, size))
            .collect::<Result<Vec<_>, _>>()?;
        let texture = self.build(key, source, frames, font);
        log::debug!("texture '{key}' registered with {} frames", texture.frames.len());
        Ok(self.insert(texture))
    }

    /// Register an atlas described in either JSON dialect.
    pub fn add_atlas_json(&mut self, key: &str, source: TextureSource, json: &str) -> Result<TextureId, TextureError> {
        let descriptors = atlas::parse_json(json)?;
        self.add_atlas(key, source, &descriptors)
    }

    /// Register an atlas described by a Starling `<TextureAtlas>` document.
    pub fn add_atlas_xml(&mut self, key: &str, source: TextureSource, xml: &str) -> Result<TextureId, TextureError> {
        let descriptors = atlas::parse_starling_xml(xml)?;
        self.add_atlas(key, source, &descriptors)
    }

    /// Register a bitmap font page. Glyph frames are named by character code.
    pub fn add_bitmap_font(&mut self, key: &str, source: TextureSource, xml: &str) -> Result<TextureId, TextureError> {
        let (descriptors, font) = atlas::parse_bitmap_font_xml(xml)?;
        self.add_with_font(key, source, &descriptors, Some(font))
    }

    /// Register a uniform sprite sheet sliced by `layout`.
    pub fn add_spritesheet(
        &mut self,
        key: &str,
        source: TextureSource,
        layout: GridLayout,
    ) -> Result<TextureId, TextureError> {
        let descriptors = atlas::grid(layout, source.width, source.height)?;
        self.add_atlas(key, source, &descriptors)
    }

    /// Drop a texture. The placeholder cannot be removed. Contexts learn
    /// about the removal through [`take_released`](Self::take_released).
    pub fn remove(&mut self, key: &str) -> bool {
        if key == MISSING_KEY {
            return false;
        }
        match self.entries.remove(key) {
            Some(entry) => {
                log::debug!("texture '{key}' removed");
                self.released.ids.push(entry.texture.id);
                true
            }
            None => false,
        }
    }

    /// Ids removed since context `slot` last asked. The first call for a
    /// slot starts its history there and returns nothing.
    pub fn take_released(&mut self, slot: usize) -> Vec<TextureId> {
        self.released.take(slot)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of registered textures, the placeholder included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn texture(&self, key: &str) -> Option<Arc<Texture>> {
        self.entries.get(key).map(|e| Arc::clone(&e.texture))
    }

    /// Number of cut frames on `key`, not counting the base frame.
    pub fn frame_count(&self, key: &str) -> Option<usize> {
        self.entries.get(key).map(|e| e.texture.frames.len())
    }

    fn placeholder(&self) -> &Arc<Texture> {
        // Inserted in `new` and never removable.
        &self.entries[MISSING_KEY].texture
    }

    /// The frame `frame` of texture `key`, or the placeholder frame if either
    /// does not exist.
    pub fn get(&self, key: &str, frame: impl Into<FrameKey>) -> &Frame {
        let frame = frame.into();
        match self.entries.get(key) {
            Some(entry) => match entry.texture.frame(&frame) {
                Some(found) => found,
                None => {
                    self.warn_missing_frame(key, &frame);
                    self.placeholder().base_frame()
                }
            },
            None => {
                self.warn_missing_texture(key);
                self.placeholder().base_frame()
            }
        }
    }

    /// Like [`get`](Self::get), but returns a handle that keeps the texture
    /// alive and says whether the placeholder was substituted.
    pub fn resolve(&self, key: &str, frame: &FrameKey) -> FrameRef {
        let missing = || FrameRef {
            texture: Arc::clone(self.placeholder()),
            slot: FrameSlot::Base,
            missing: true,
        };
        match self.entries.get(key) {
            Some(entry) => match entry.texture.slot_of(frame) {
                Some(slot) => FrameRef {
                    texture: Arc::clone(&entry.texture),
                    slot,
                    missing: false,
                },
                None => {
                    self.warn_missing_frame(key, frame);
                    missing()
                }
            },
            None => {
                self.warn_missing_texture(key);
                missing()
            }
        }
    }

    /// Number of distinct missing resources reported so far.
    pub fn missing_reports(&self) -> usize {
        self.missing_log().seen.len()
    }

    /// Missing resources first seen since the last call, in order.
    pub fn take_missing(&self) -> Vec<MissingResource> {
        std::mem::take(&mut self.missing_log().unreported)
    }

    fn missing_log(&self) -> std::sync::MutexGuard<'_, MissingLog> {
        self.missing.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a miss. Returns `true` the first time it is seen.
    fn note_missing(&self, resource: MissingResource) -> bool {
        let mut log = self.missing_log();
        if !log.seen.insert(resource.clone()) {
            return false;
        }
        log.unreported.push(resource);
        true
    }

    fn warn_missing_texture(&self, key: &str) {
        if self.note_missing(MissingResource::Texture(key.to_string())) {
            log::warn!("texture '{key}' not found, drawing the missing-texture placeholder");
        }
    }

    fn warn_missing_frame(&self, key: &str, frame: &FrameKey) {
        let resource = MissingResource::Frame {
            key: key.to_string(),
            frame: frame.clone(),
        };
        if self.note_missing(resource) {
            log::warn!("frame {frame:?} not found on texture '{key}', drawing the missing-texture placeholder");
        }
    }

    /// Swap in new pixels for an existing texture. Frames keep their
    /// rectangles; their UVs are rebuilt only if the size changed. Every
    /// context slot is marked dirty.
    pub fn replace_source(&mut self, key: &str, source: TextureSource) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        let mut texture = Texture::clone(&entry.texture);
        let size = (source.width, source.height);
        texture.base.set_rect(0, 0, size.0, size.1);
        texture.base.set_texture_size(size.0, size.1);
        for frame in &mut texture.frames {
            frame.set_texture_size(size.0, size.1);
        }
        texture.source = source;
        entry.texture = Arc::new(texture);
        entry.gpu_dirty.iter_mut().for_each(|d| *d = true);
        true
    }

    /// Mark a texture's pixels as changed (for example a canvas-backed
    /// texture that was drawn into) so every context re-uploads it.
    pub fn mark_dirty(&mut self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.gpu_dirty.iter_mut().for_each(|d| *d = true);
                true
            }
            None => false,
        }
    }

    /// Mark a texture dirty for one context only, for example after that
    /// context failed to upload it.
    pub fn mark_dirty_slot(&mut self, key: &str, slot: usize) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if slot >= entry.gpu_dirty.len() {
            entry.gpu_dirty.resize(slot + 1, true);
        }
        entry.gpu_dirty[slot] = true;
        true
    }

    /// Returns whether `key` needs uploading for context `slot`, and clears
    /// the flag. Unknown keys are never dirty.
    pub fn take_dirty(&mut self, key: &str, slot: usize) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if slot >= entry.gpu_dirty.len() {
            entry.gpu_dirty.resize(slot + 1, true);
        }
        std::mem::replace(&mut entry.gpu_dirty[slot], false)
    }

    /// A context lost its GPU objects: everything must be uploaded again.
    pub fn invalidate_slot(&mut self, slot: usize) {
        for entry in self.entries.values_mut() {
            if let Some(flag) = entry.gpu_dirty.get_mut(slot) {
                *flag = true;
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for TextureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn frame_from_descriptor(desc: &FrameDescriptor, texture_size: (u32, u32)) -> Result<Frame, AtlasError> {
    let (region_w, region_h) = if desc.rotated {
        (desc.height, desc.width)
    } else {
        (desc.width, desc.height)
    };
    if desc.x.checked_add(region_w).is_none() || desc.y.checked_add(region_h).is_none() {
        return Err(AtlasError::RectOverflow {
            frame: desc.name.clone(),
        });
    }
    // The real id is assigned in `build`.
    let mut frame = Frame::new(
        desc.name.clone(),
        TextureId(u32::MAX),
        (desc.x, desc.y, desc.width, desc.height),
        texture_size,
    );
    frame.set_rotated(desc.rotated);
    if let Some(trim) = desc.trim {
        frame.set_trim(trim)?;
    }
    Ok(frame)
}

fn checkerboard() -> RgbaImage {
    let magenta = Rgba([255, 0, 255, 255]);
    let black = Rgba([0, 0, 0, 255]);
    RgbaImage::from_fn(MISSING_SIZE, MISSING_SIZE, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 { magenta } else { black }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(w: u32, h: u32) -> TextureSource {
        TextureSource::sized(w, h)
    }

    fn hero_registry() -> TextureRegistry {
        let mut registry = TextureRegistry::new();
        registry
            .add_atlas(
                "hero",
                source(128, 64),
                &[
                    FrameDescriptor::new("idle", 0, 0, 32, 48),
                    FrameDescriptor::new("walk", 32, 0, 30, 44).trimmed(1, 4, 32, 48),
                ],
            )
            .unwrap();
        registry
    }

    #[test]
    fn placeholder_always_present() {
        let registry = TextureRegistry::new();
        assert!(registry.exists(MISSING_KEY));
        assert_eq!(registry.len(), 1);
        let texture = registry.texture(MISSING_KEY).unwrap();
        assert_eq!((texture.width(), texture.height()), (32, 32));
        let pixels = texture.source().pixels.as_ref().unwrap();
        assert_eq!(pixels.get_pixel(0, 0), &Rgba([255, 0, 255, 255]));
        assert_eq!(pixels.get_pixel(8, 0), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn missing_texture_returns_placeholder_and_warns_once() {
        let registry = TextureRegistry::new();
        let placeholder_id = registry.texture(MISSING_KEY).unwrap().id();

        let first = registry.get("nonexistent", "frame");
        assert_eq!(first.texture(), placeholder_id);
        assert_eq!(registry.missing_reports(), 1);

        let second = registry.get("nonexistent", "frame");
        assert_eq!(second.texture(), placeholder_id);
        assert_eq!(registry.missing_reports(), 1);

        registry.get("also-missing", FrameKey::Base);
        assert_eq!(registry.missing_reports(), 2);
    }

    #[test]
    fn known_texture_unknown_frame_is_placeholder() {
        let registry = hero_registry();
        let resolved = registry.resolve("hero", &FrameKey::from("run"));
        assert!(resolved.is_missing());
        assert_eq!(resolved.texture().key(), MISSING_KEY);
        registry.resolve("hero", &FrameKey::from("run"));
        registry.resolve("hero", &FrameKey::Index(9));
        assert_eq!(registry.missing_reports(), 2);
    }

    #[test]
    fn frames_by_name_and_index() {
        let registry = hero_registry();
        let walk = registry.get("hero", "walk");
        assert_eq!((walk.x(), walk.width()), (32, 30));
        assert_eq!(walk.source_size(), (32, 48));
        assert_eq!(registry.get("hero", 0usize).name(), "idle");
        assert_eq!(registry.get("hero", FrameKey::Base).width(), 128);
        assert_eq!(registry.frame_count("hero"), Some(2));
        let hero_id = registry.texture("hero").unwrap().id();
        assert_eq!(walk.texture(), hero_id);
        assert_eq!(registry.missing_reports(), 0);
    }

    #[test]
    fn rejects_duplicate_and_empty_keys() {
        let mut registry = hero_registry();
        assert!(matches!(
            registry.add_image("hero", source(4, 4)),
            Err(TextureError::KeyInUse(_))
        ));
        assert!(matches!(
            registry.add_image("", source(4, 4)),
            Err(TextureError::EmptyKey)
        ));
    }

    #[test]
    fn invalid_trim_rejects_atlas() {
        let mut registry = TextureRegistry::new();
        let result = registry.add_atlas(
            "bad",
            source(64, 64),
            &[FrameDescriptor::new("f", 0, 0, 32, 32).trimmed(0, 0, 16, 32)],
        );
        assert!(matches!(
            result,
            Err(TextureError::Atlas(AtlasError::InvalidTrim { .. }))
        ));
        assert!(!registry.exists("bad"));
    }

    #[test]
    fn overflowing_rect_rejects_atlas() {
        let mut registry = TextureRegistry::new();
        let result = registry.add_atlas(
            "far",
            source(64, 64),
            &[FrameDescriptor::new("f", u32::MAX - 4, 0, 8, 8)],
        );
        assert!(matches!(
            result,
            Err(TextureError::Atlas(AtlasError::RectOverflow { .. }))
        ));

        let rotated = FrameDescriptor::new("r", 0, u32::MAX - 4, 8, 2).rotated(true);
        assert!(registry.add_atlas("far", source(64, 64), &[rotated]).is_err());
        assert!(!registry.exists("far"));
    }

    #[test]
    fn add_atlas_json_and_spritesheet() {
        let mut registry = TextureRegistry::new();
        let json = r#"{"frames": {"a": {"frame": {"x": 0, "y": 0, "w": 8, "h": 8}},
                                  "b": {"frame": {"x": 8, "y": 0, "w": 8, "h": 8}}}}"#;
        registry.add_atlas_json("ab", source(16, 8), json).unwrap();
        assert_eq!(registry.get("ab", 1usize).name(), "b");

        registry
            .add_spritesheet("sheet", source(64, 32), GridLayout::new(16, 16))
            .unwrap();
        assert_eq!(registry.frame_count("sheet"), Some(8));
        assert_eq!(registry.get("sheet", "5").x(), 16);
    }

    #[test]
    fn resolved_handle_survives_replacement() {
        let mut registry = hero_registry();
        let before = registry.resolve("hero", &FrameKey::from("idle"));
        assert!(registry.replace_source("hero", source(256, 64)));

        // The old handle still sees the old, complete texture.
        assert_eq!(before.texture().width(), 128);
        assert_eq!(before.frame().uvs().corners[1], [0.25, 0.0]);

        let after = registry.resolve("hero", &FrameKey::from("idle"));
        assert_eq!(after.texture().width(), 256);
        assert_eq!(after.frame().uvs().corners[1], [0.125, 0.0]);
        assert_eq!(after.texture().id(), before.texture().id());
    }

    #[test]
    fn gpu_dirty_flags_per_slot() {
        let mut registry = hero_registry();
        // Never seen: dirty on first use, then clean.
        assert!(registry.take_dirty("hero", 0));
        assert!(!registry.take_dirty("hero", 0));
        assert!(registry.take_dirty("hero", 1));

        registry.mark_dirty("hero");
        assert!(registry.take_dirty("hero", 0));
        assert!(registry.take_dirty("hero", 1));

        registry.invalidate_slot(1);
        assert!(!registry.take_dirty("hero", 0));
        assert!(registry.take_dirty("hero", 1));

        assert!(!registry.take_dirty("nope", 0));
    }

    #[test]
    fn index_and_hash_name_frames_warn_separately() {
        let registry = hero_registry();
        registry.resolve("hero", &FrameKey::Index(3));
        registry.resolve("hero", &FrameKey::from("#3"));
        assert_eq!(registry.missing_reports(), 2);
        assert_eq!(
            registry.take_missing(),
            vec![
                MissingResource::Frame {
                    key: "hero".into(),
                    frame: FrameKey::Index(3)
                },
                MissingResource::Frame {
                    key: "hero".into(),
                    frame: FrameKey::Name("#3".into())
                },
            ]
        );
        assert!(registry.take_missing().is_empty());
        registry.resolve("hero", &FrameKey::Index(3));
        assert!(registry.take_missing().is_empty());
    }

    #[test]
    fn mark_dirty_slot_leaves_other_slots_clean() {
        let mut registry = hero_registry();
        registry.take_dirty("hero", 0);
        registry.take_dirty("hero", 1);
        assert!(registry.mark_dirty_slot("hero", 0));
        assert!(!registry.take_dirty("hero", 1));
        assert!(registry.take_dirty("hero", 0));
        assert!(!registry.mark_dirty_slot("nope", 0));
    }

    #[test]
    fn removed_ids_reach_every_reading_slot_once() {
        let mut registry = hero_registry();
        assert!(registry.take_released(0).is_empty());
        assert!(registry.take_released(1).is_empty());

        let id = registry.texture("hero").unwrap().id();
        registry.remove("hero");
        assert_eq!(registry.take_released(0), vec![id]);
        assert!(registry.take_released(0).is_empty());
        assert_eq!(registry.take_released(1), vec![id]);

        // A slot that starts reading later never saw the texture.
        assert!(registry.take_released(2).is_empty());
        assert!(registry.released.ids.is_empty());
    }

    #[test]
    fn remove_keeps_placeholder() {
        let mut registry = hero_registry();
        assert!(registry.remove("hero"));
        assert!(!registry.remove("hero"));
        assert!(!registry.remove(MISSING_KEY));
        assert!(registry.get("hero", "idle").texture() == registry.texture(MISSING_KEY).unwrap().id());
    }

    #[test]
    fn bitmap_font_keeps_metrics() {
        let mut registry = TextureRegistry::new();
        let xml = r#"<font><info face="Mono" size="8"/><common lineHeight="10"/>
            <chars><char id="72" x="0" y="0" width="6" height="8" xoffset="0" yoffset="1" xadvance="7"/></chars>
            </font>"#;
        registry.add_bitmap_font("mono", source(32, 32), xml).unwrap();
        let texture = registry.texture("mono").unwrap();
        assert_eq!(texture.font().unwrap().line_height, 10);
        assert_eq!(registry.get("mono", "72").width(), 6);
    }
}
