//! Rendering of world snapshots into pixel buffers.

use crate::grid::World;
use eco_core::{Color, Error, Result};
use image::{ImageBuffer, Rgb, RgbImage};
use std::path::Path;

/// A `0xRRGGBB` pixel buffer, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl Frame {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![background.0; width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        Color(self.pixels[y as usize * self.width as usize + x as usize])
    }

    fn fill_block(&mut self, x0: u32, y0: u32, size: u32, color: Color) {
        for y in y0..y0 + size {
            let row = y as usize * self.width as usize;
            self.pixels[row + x0 as usize..row + (x0 + size) as usize].fill(color.0);
        }
    }

    pub fn to_image(&self) -> RgbImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| Rgb(self.pixel(x, y).rgb()))
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_image()
            .save_with_format(path.as_ref(), image::ImageFormat::Png)
            .map_err(|e| Error::Render(format!("{}: {}", path.as_ref().display(), e)))
    }
}

/// Draw every cell of `world` as a `zoom` x `zoom` block on a black background.
///
/// A cell shared by several populations takes the color of the one with the
/// highest index. A zoom of 0 is treated as 1.
pub fn render(world: &World, zoom: u32) -> Frame {
    let zoom = zoom.max(1);
    let mut frame = Frame::new(
        world.width() as u32 * zoom,
        world.height() as u32 * zoom,
        Color::BLACK,
    );
    for y in 0..world.height() {
        for x in 0..world.width() {
            if let Some(population) = world.top_population_at(x, y) {
                let color = world.population(population).color;
                frame.fill_block(x as u32 * zoom, y as u32 * zoom, zoom, color);
            }
        }
    }
    frame
}
