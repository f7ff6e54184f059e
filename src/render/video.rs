use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use image::{
    codecs::gif::{GifEncoder, Repeat},
    imageops::{self, FilterType},
    Delay, DynamicImage, RgbImage,
};

/// Destination for annotated frames, in order.
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close; returns the number of frames written.
    fn finish(self: Box<Self>) -> Result<usize>;
}

/// Animated GIF at the capture frame rate and the first frame's resolution.
pub struct GifVideoWriter {
    encoder: GifEncoder<BufWriter<File>>,
    path: PathBuf,
    width: u32,
    height: u32,
    delay: Delay,
    frames: usize,
}

pub const VIDEO_EXTENSION: &str = "gif";
pub const VIDEO_MEDIA_TYPE: &str = "image/gif";

// Quantizer speed: 1 is best quality, 30 fastest.
const ENCODER_SPEED: i32 = 10;

impl GifVideoWriter {
    pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("cannot encode {width}x{height} video");
        }
        if !fps.is_finite() || fps <= 0.0 {
            bail!("invalid frame rate {fps}");
        }

        let file = File::create(path)
            .with_context(|| format!("failed to create video {}", path.display()))?;
        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), ENCODER_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .context("failed to write video header")?;

        // Millisecond delay of 1000 / fps, kept as a ratio.
        let denom = ((fps * 1000.0).round() as u32).max(1);
        let delay = Delay::from_numer_denom_ms(1_000_000, denom);

        Ok(Self {
            encoder,
            path: path.to_path_buf(),
            width,
            height,
            delay,
            frames: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl VideoSink for GifVideoWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let rgba = if frame.dimensions() == (self.width, self.height) {
            DynamicImage::ImageRgb8(frame.clone()).to_rgba8()
        } else {
            let resized = imageops::resize(frame, self.width, self.height, FilterType::Triangle);
            DynamicImage::ImageRgb8(resized).to_rgba8()
        };

        self.encoder
            .encode_frame(image::Frame::from_parts(rgba, 0, 0, self.delay))
            .with_context(|| format!("failed to encode frame {} into {}", self.frames, self.path.display()))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<usize> {
        let frames = self.frames;
        // The trailer is written when the encoder is dropped.
        drop(self.encoder);
        Ok(frames)
    }
}
