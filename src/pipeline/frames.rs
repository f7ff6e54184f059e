use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{SessionError, SessionResult};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// One decoded input frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the source, counting frames that failed to decode.
    pub index: usize,
    pub path: PathBuf,
    pub image: RgbImage,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Ordered list of frame files making up one capture.
#[derive(Debug, Clone)]
pub struct FrameSource {
    files: Vec<PathBuf>,
}

impl FrameSource {
    /// Resolve `path` into frames: a directory is scanned for
    /// `<prefix>*.<extension>` files, a regular file is a single-frame source.
    pub fn open(path: &Path, prefix: &str, extension: &str) -> SessionResult<Self> {
        if path.is_file() {
            return Ok(Self {
                files: vec![path.to_path_buf()],
            });
        }

        if !path.is_dir() {
            return Err(SessionError::InvalidInput(format!(
                "frame folder not found: {}",
                path.display()
            )));
        }

        let entries = std::fs::read_dir(path).map_err(|err| {
            SessionError::InvalidInput(format!("cannot read {}: {err}", path.display()))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|candidate| candidate.is_file() && matches_pattern(candidate, prefix, extension))
            .collect();

        if files.is_empty() {
            return Err(SessionError::InvalidInput(format!(
                "no frames ({prefix}*.{extension}) found in {}",
                path.display()
            )));
        }

        files.sort_by_key(|file| frame_sort_key(file));
        Ok(Self { files })
    }

    pub fn from_files(files: Vec<PathBuf>) -> SessionResult<Self> {
        if files.is_empty() {
            return Err(SessionError::InvalidInput("frame list is empty".into()));
        }
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Decode the first frame; the whole request is rejected if this fails.
    pub fn first_frame(&self) -> SessionResult<Frame> {
        let path = self
            .files
            .first()
            .ok_or_else(|| SessionError::InvalidInput("frame list is empty".into()))?;
        let image = decode(path).map_err(|err| {
            SessionError::InvalidInput(format!("unreadable first frame {}: {err}", path.display()))
        })?;
        Ok(Frame {
            index: 0,
            path: path.clone(),
            image,
        })
    }

    /// Decode every frame in order, skipping (and logging) the ones that fail.
    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        self.files
            .iter()
            .enumerate()
            .filter_map(|(index, path)| match decode(path) {
                Ok(image) => Some(Frame {
                    index,
                    path: path.clone(),
                    image,
                }),
                Err(err) => {
                    log_warn!("skipping undecodable frame {} ({}): {err}", index, path.display());
                    None
                }
            })
    }
}

fn decode(path: &Path) -> image::ImageResult<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

fn matches_pattern(path: &Path, prefix: &str, extension: &str) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(prefix))
        .unwrap_or(false);
    let ext_ok = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false);
    name_ok && ext_ok
}

/// Order by the trailing number in the file stem so `Frame_10` follows
/// `Frame_9`; names without a number sort after numbered ones, by name.
fn frame_sort_key(path: &Path) -> (bool, u64, String) {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)
        .unwrap_or(stem.len());
    let number = stem[digits_start..].parse::<u64>().ok();
    (number.is_none(), number.unwrap_or(0), stem.to_string())
}
