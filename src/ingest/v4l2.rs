//! V4L2 frame source.
//!
//! Captures from a local device node (e.g. `/dev/video0`) into memory,
//! normalises each buffer to RGB24 and hands it over as a `Frame`. Buffers are
//! never written anywhere.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::FrameSource;
use crate::frame::Frame;

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Requested frame rate. 0 leaves the driver default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<V4l2State>,
    format: PixelFormat,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
        }
    }

    /// Negotiate a format, preferring RGB3 and falling back to YUYV.
    fn negotiate(&mut self, device: &mut v4l::Device) -> Result<()> {
        use v4l::video::Capture;

        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;

        let mut negotiated = None;
        for fourcc in [b"RGB3", b"YUYV"] {
            format.fourcc = v4l::FourCC::new(fourcc);
            match device.set_format(&format) {
                Ok(active) => {
                    if let Some(pixel_format) = PixelFormat::from_fourcc(&active.fourcc.repr) {
                        negotiated = Some((active, pixel_format));
                        break;
                    }
                }
                Err(err) => log::warn!(
                    "V4l2Source: {} rejected {}: {}",
                    self.config.device,
                    String::from_utf8_lossy(fourcc),
                    err
                ),
            }
        }
        let (active, pixel_format) = negotiated.ok_or_else(|| {
            anyhow!(
                "{} supports neither RGB3 nor YUYV capture",
                self.config.device
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = active.width;
        self.active_height = active.height;
        self.format = pixel_format;
        Ok(())
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        format!("{} (v4l2)", self.config.device)
    }

    fn open(&mut self) -> Result<()> {
        use v4l::buffer::Type;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        self.negotiate(&mut device)?;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);
        self.frame_count = 0;

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let rgb = state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, width, height, format)
        })?;

        let frame = Frame::from_rgb(rgb, width, height, self.frame_count)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::debug!("V4l2Source: closed {}", self.config.device);
        }
    }
}
