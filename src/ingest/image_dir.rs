//! Image-sequence source: every PNG/JPEG in a directory, in file-name order.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::FrameSource;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    open: bool,
}

impl ImageDirSource {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            files: Vec::new(),
            next: 0,
            open: false,
        }
    }
}

impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        format!("{} (image directory)", self.dir.display())
    }

    fn open(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("read image directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();
        log::debug!(
            "ImageDirSource: {} image(s) in {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.next = 0;
        self.open = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if !self.open {
            return Err(anyhow!("image directory {} is not open", self.dir.display()));
        }
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("decode image {}", path.display()))?
            .into_rgb8();
        let (width, height) = (image.width(), image.height());
        let frame = Frame::from_rgb(image.into_raw(), width, height, self.next as u64)?;
        self.next += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.open = false;
        self.files.clear();
    }
}
