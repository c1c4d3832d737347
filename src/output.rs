use anyhow::{anyhow, Result};

use crate::types::Frame;

/// Desktop window showing annotated frames.
pub struct WindowOutput {
    window: minifb::Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl WindowOutput {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = minifb::Window::new(
            title,
            width,
            height,
            minifb::WindowOptions {
                resize: true,
                ..minifb::WindowOptions::default()
            },
        )
        .map_err(|e| anyhow!("Failed to create window: {}", e))?;

        window.limit_update_rate(Some(std::time::Duration::from_micros(16600))); // ~60 FPS

        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    pub fn is_key_down(&self, key: minifb::Key) -> bool {
        self.window.is_key_down(key)
    }

    pub fn keys_pressed(&self) -> Vec<minifb::Key> {
        self.window.get_keys_pressed(minifb::KeyRepeat::No)
    }

    /// Show `frame`, adopting its size if the camera changed resolution.
    pub fn show(&mut self, frame: &Frame) -> Result<()> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        if w != self.width || h != self.height {
            self.width = w;
            self.height = h;
        }
        self.buffer.resize(self.width * self.height, 0);

        for (dst, px) in self.buffer.iter_mut().zip(frame.pixels()) {
            *dst = ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32;
        }

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| anyhow!("Window update failed: {}", e))
    }

    /// Keep the window responsive when there is no new frame to show.
    pub fn pump(&mut self) {
        self.window.update();
    }
}
