//! Image loading through the `image` crate.

use planar_kinematics_core::{GrayImage, GrayImageView};
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no images found in {0}")]
    NoImages(PathBuf),
}

/// File extensions treated as frames or calibration images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pgm"];

/// Convert an `image::GrayImage` into the core view type.
pub fn gray_view(img: &image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Load any supported image and convert it to 8-bit luma.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(path), fields(path = %path.as_ref().display())))]
pub fn load_gray(path: impl AsRef<Path>) -> Result<GrayImage, IoError> {
    let path = path.as_ref();
    let img = image::open(path)
        .map_err(|source| IoError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_luma8();
    Ok(gray_view(&img).to_owned_image())
}

/// Write a luma image; the format follows the extension.
pub fn save_gray(path: impl AsRef<Path>, img: &GrayImage) -> Result<(), IoError> {
    let path = path.as_ref();
    let buffer = image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .ok_or_else(|| IoError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "pixel buffer does not match the image size",
            ),
        })?;
    buffer.save(path).map_err(|source| IoError::Image {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, IoError> {
    let dir = dir.as_ref();
    let io_err = |source| IoError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut img = GrayImage::new(7, 5);
        img.set(3, 2, 200);
        img.set(6, 4, 17);
        let path = dir.path().join("frame.png");
        save_gray(&path, &img).unwrap();
        let back = load_gray(&path).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn listing_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        let img = GrayImage::new(2, 2);
        save_gray(dir.path().join("b.png"), &img).unwrap();
        std::fs::copy(dir.path().join("b.png"), dir.path().join("a.PNG")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let names: Vec<_> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.png"]);
    }

    #[test]
    fn missing_file_is_an_image_error() {
        let err = load_gray("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, IoError::Image { .. }), "{err}");
    }
}
