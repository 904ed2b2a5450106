//! Textures, frames, and the atlas formats that describe them.
//!
//! - [`TextureRegistry`]: key → [`Texture`], with a placeholder for anything
//!   missing and per-context GPU dirty flags.
//! - [`Frame`]: a cut rectangle with cached UVs, optional trim, and
//!   rotated-in-atlas support.
//! - [`atlas`]: parsers for JSON array/hash, Starling XML, bitmap fonts, and
//!   grid sprite sheets.

pub mod atlas;
mod frame;
mod registry;

pub use atlas::{AtlasError, BitmapFont, FrameDescriptor, Glyph, GridLayout};
pub use frame::{Frame, FrameKey, FrameUvs, Trim};
pub use registry::{
    FrameRef, MISSING_KEY, MissingResource, Texture, TextureError, TextureId, TextureRegistry,
    TextureSource,
};
