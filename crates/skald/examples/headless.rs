//! Headless rendering: a small scene drawn without a window.
//!
//! Builds procedural textures (a sprite sheet and a JSON atlas), arranges a
//! rotating group of sprites under one parent, then draws the same stage
//! twice:
//!
//! - through `CanvasBlitter` into an `ImageCanvas`, saved as a PNG;
//! - through the batched `RenderPass` into a `RecordingBackend`, whose
//!   recorded commands stand in for a GPU.
//!
//! Run with: `cargo run -p skald --example headless [output.png]`

use image::{Rgba, RgbaImage};
use skald::prelude::*;

const WIDTH: u32 = 256;
const HEIGHT: u32 = 192;

const ATLAS_JSON: &str = r#"{
    "frames": {
        "gem":  { "frame": { "x": 0,  "y": 0, "w": 16, "h": 16 } },
        "coin": { "frame": { "x": 16, "y": 0, "w": 12, "h": 12 },
                  "trimmed": true,
                  "spriteSourceSize": { "x": 2, "y": 2, "w": 12, "h": 12 },
                  "sourceSize": { "w": 16, "h": 16 } }
    }
}"#;

/// Four 16x16 cells, each a different solid color with a dark border.
fn sheet_image() -> RgbaImage {
    let colors = [[230, 80, 60], [240, 200, 60], [80, 200, 120], [70, 130, 230]];
    RgbaImage::from_fn(64, 16, |x, y| {
        let [r, g, b] = colors[(x / 16) as usize];
        let (cx, cy) = (x % 16, y);
        if cx == 0 || cy == 0 || cx == 15 || cy == 15 {
            Rgba([20, 20, 30, 255])
        } else {
            Rgba([r, g, b, 255])
        }
    })
}

fn atlas_image() -> RgbaImage {
    RgbaImage::from_fn(32, 16, |x, y| {
        if x < 16 {
            // Diamond
            let d = (x as i32 - 8).abs() + (y as i32 - 8).abs();
            if d < 8 { Rgba([120, 220, 255, 255]) } else { Rgba([0, 0, 0, 0]) }
        } else {
            Rgba([250, 210, 40, 255])
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();
    let output = std::env::args().nth(1).unwrap_or_else(|| "headless.png".to_string());

    let mut registry = TextureRegistry::new();
    registry.add_spritesheet("blocks", TextureSource::from_image(sheet_image()), GridLayout::new(16, 16))?;
    registry.add_atlas_json("items", TextureSource::from_image(atlas_image()), ATLAS_JSON)?;
    let walk = AnimationClip::all_frames(&registry, "blocks", 8.0, true)?;

    let mut stage = Stage::new();
    let ring = stage.add(Node::new().at(128.0, 96.0));
    let mut blocks = Vec::new();
    for i in 0..8 {
        let angle = i as f32 / 8.0 * std::f32::consts::TAU;
        let mut node = Node::with_sprite(Sprite::new("blocks")).at(angle.cos() * 60.0 - 8.0, angle.sin() * 60.0 - 8.0);
        node.set_alpha(0.6 + 0.05 * i as f32);
        if let Some(id) = stage.add_child(ring, node, None) {
            blocks.push(id);
        }
    }
    stage.add_child(ring, Node::with_sprite(Sprite::new("items").frame("gem")).at(-8.0, -8.0).depth(1.0), None);
    stage.add(Node::with_sprite(Sprite::new("items").frame("coin").blend(BlendMode::Add)).at(8.0, 8.0));
    stage.add(Node::with_sprite(Sprite::new("items").frame("missing")).at(224.0, 8.0));

    // Advance half a second: rotate the ring and step the animation.
    let elapsed = 0.5;
    if let Some(node) = stage.get_mut(ring) {
        node.set_rotation(elapsed);
    }
    for (i, id) in blocks.iter().enumerate() {
        let frame = walk.frame_at(elapsed + i as f32 * 0.125).clone();
        if let Some(node) = stage.get_mut(*id) {
            node.set_frame(frame);
        }
    }

    let camera = Camera::new(WIDTH as f32, HEIGHT as f32);
    let config = RendererConfig {
        clear_color: [0.05, 0.05, 0.1, 1.0],
        ..RendererConfig::default()
    };

    let mut canvas = ImageCanvas::new(WIDTH, HEIGHT);
    let mut blitter = CanvasBlitter::new(config.clone())?;
    let canvas_stats = blitter.render_frame(&mut canvas, &mut stage, &registry, &camera);
    canvas.image().save(&output)?;
    log::info!(
        "canvas: {} draws ({} transformed), wrote {output}",
        canvas_stats.draw_calls,
        canvas_stats.transformed_draws
    );

    let mut backend = RecordingBackend::new(4);
    let mut pass = RenderPass::new(config)?;
    let stats = pass.render_frame(&mut backend, &mut stage, &mut registry, &camera);
    log::info!(
        "batched: {} quads in {} draw calls, {} texture uploads",
        stats.quads,
        stats.draw_calls,
        stats.texture_uploads
    );

    #[cfg(feature = "diagnostics")]
    println!("{}", skald::diag::snapshot_json(&stats, &registry));

    Ok(())
}
