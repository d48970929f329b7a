//! Synthetic frame source (`stub://`) for tests and dry runs.
//!
//! Pixels are a pure function of (index, position), so any frame can be
//! regenerated later and compared against a decrypted artifact.

use anyhow::{anyhow, Result};

use super::{FrameSource, STUB_SCHEME};
use crate::frame::{rgb_len, Frame};

const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 48;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Frames available before the source reports exhaustion. Unbounded when `None`.
    pub frames: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frames: None,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    next_index: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            next_index: 0,
            open: false,
        }
    }

    /// Parse `stub://name[?frames=N&size=WxH]`.
    pub fn parse(id: &str) -> Result<Self> {
        let rest = id
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| anyhow!("synthetic source must start with {}", STUB_SCHEME))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut config = SyntheticConfig::default();
        if !name.is_empty() {
            config.name = name.to_string();
        }
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed query parameter '{}' in {}", pair, id))?;
            match key {
                "frames" => {
                    config.frames = Some(
                        value
                            .parse()
                            .map_err(|_| anyhow!("frames must be an integer in {}", id))?,
                    )
                }
                "size" => {
                    let (w, h) = value
                        .split_once('x')
                        .ok_or_else(|| anyhow!("size must be WxH in {}", id))?;
                    config.width = w
                        .parse()
                        .map_err(|_| anyhow!("invalid width in {}", id))?;
                    config.height = h
                        .parse()
                        .map_err(|_| anyhow!("invalid height in {}", id))?;
                }
                other => return Err(anyhow!("unknown parameter '{}' in {}", other, id)),
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic frame size must be non-zero in {}", id));
        }
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

/// Pixels of synthetic frame `index`: a diagonal gradient shifted per frame.
pub fn synthetic_pixels(width: u32, height: u32, index: u64) -> Result<Vec<u8>> {
    let len = rgb_len(width, height)?;
    let shift = index.wrapping_mul(7);
    Ok((0..len)
        .map(|i| ((i as u64).wrapping_add(shift) % 256) as u8)
        .collect())
}

/// Regenerate frame `index` exactly as the source would have produced it.
pub fn synthetic_frame(config: &SyntheticConfig, index: u64) -> Result<Frame> {
    let pixels = synthetic_pixels(config.width, config.height, index)?;
    Frame::from_rgb(pixels, config.width, config.height, index)
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{}{} (synthetic)", STUB_SCHEME, self.config.name)
    }

    fn open(&mut self) -> Result<()> {
        self.open = true;
        self.next_index = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("synthetic source {} is not open", self.config.name));
        }
        if self
            .config
            .frames
            .is_some_and(|limit| self.next_index >= limit)
        {
            return Ok(None);
        }
        let frame = synthetic_frame(&self.config, self.next_index)?;
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.open = false;
    }
}
