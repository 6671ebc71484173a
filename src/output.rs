use anyhow::Result;
use image::RgbImage;
use std::time::Duration;

/// Where composed frames go.
pub trait DisplaySink {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Polled once per frame after `show`.
    fn quit_requested(&self) -> bool {
        false
    }
}

pub struct WindowOutput {
    window: minifb::Window,
    buffer: Vec<u32>,
    quit_key: minifb::Key,
}

impl WindowOutput {
    /// `poll` bounds how long each `show` waits, which is also the key polling interval.
    pub fn new(title: &str, width: usize, height: usize, poll: Duration) -> Result<Self> {
        let mut window = minifb::Window::new(
            title,
            width,
            height,
            minifb::WindowOptions {
                resize: true,
                ..minifb::WindowOptions::default()
            },
        )
        .map_err(|e| anyhow::anyhow!("Failed to create window: {}", e))?;

        window.limit_update_rate(Some(poll));

        Ok(Self {
            window,
            buffer: vec![0; width * height],
            quit_key: minifb::Key::Q,
        })
    }
}

impl DisplaySink for WindowOutput {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        self.buffer.resize(w * h, 0);
        pack_argb(frame, &mut self.buffer);

        self.window
            .update_with_buffer(&self.buffer, w, h)
            .map_err(|e| anyhow::anyhow!("Window update failed: {}", e))
    }

    fn quit_requested(&self) -> bool {
        !self.window.is_open() || self.window.is_key_down(self.quit_key)
    }
}

/// Discards frames but remembers the last frame size.
#[derive(Debug, Default)]
pub struct HeadlessOutput {
    pub frames_shown: usize,
    pub last_size: Option<(u32, u32)>,
}

impl DisplaySink for HeadlessOutput {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames_shown += 1;
        self.last_size = Some(frame.dimensions());
        Ok(())
    }
}

/// RGB8 -> 0RGB u32, as minifb expects.
fn pack_argb(frame: &RgbImage, out: &mut [u32]) {
    for (dst, p) in out.iter_mut().zip(frame.pixels()) {
        *dst = ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32;
    }
}
