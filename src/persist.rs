//! Writing captured frames to disk.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ExtendedColorType, ImageEncoder};

use crate::error::PersistError;

/// Default output path for a captured frame.
pub const DEFAULT_OUTPUT: &str = "img_captured.ppm";

/// Destination for a captured grayscale frame.
pub trait ImageSink {
    /// Write `buffer` as a `width` x `height` grayscale image.
    fn write_grayscale_image(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        bytes_per_pixel: u8,
        buffer: &[u8],
    ) -> Result<(), PersistError>;
}

/// Writes frames as binary PGM (P5) files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgmFileSink;

impl ImageSink for PgmFileSink {
    fn write_grayscale_image(
        &mut self,
        path: &Path,
        width: u32,
        height: u32,
        bytes_per_pixel: u8,
        buffer: &[u8],
    ) -> Result<(), PersistError> {
        let color = match bytes_per_pixel {
            1 => ExtendedColorType::L8,
            2 => ExtendedColorType::L16,
            other => return Err(PersistError::UnsupportedDepth(other)),
        };

        let expected = width as usize * height as usize * usize::from(bytes_per_pixel);
        if buffer.len() != expected {
            return Err(PersistError::SizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }

        // A failed write must never leave a truncated image at `path`.
        let partial = partial_path(path)?;
        let written = encode_graymap(&partial, width, height, color, buffer)
            .and_then(|()| fs::rename(&partial, path).map_err(PersistError::from));
        if written.is_err() {
            let _ = fs::remove_file(&partial);
        }
        written
    }
}

fn encode_graymap(
    path: &Path,
    width: u32,
    height: u32,
    color: ExtendedColorType,
    buffer: &[u8],
) -> Result<(), PersistError> {
    let mut writer = BufWriter::new(File::create(path)?);
    PnmEncoder::new(&mut writer)
        .with_subtype(PnmSubtype::Graymap(SampleEncoding::Binary))
        .write_image(buffer, width, height, color)?;
    writer.flush()?;
    Ok(())
}

/// Hidden sibling of `path` used while encoding.
fn partial_path(path: &Path) -> Result<PathBuf, PersistError> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", path.display()),
        )
    })?;
    let mut partial = OsString::from(".");
    partial.push(name);
    partial.push(".partial");
    Ok(path.with_file_name(partial))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_binary_graymap() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("frame.ppm");
        let buffer: Vec<u8> = (0..12).collect();

        PgmFileSink
            .write_grayscale_image(&path, 4, 3, 1, &buffer)
            .expect("write failed");

        let bytes = std::fs::read(&path).expect("read failed");
        assert!(bytes.starts_with(b"P5"));
        assert!(bytes.ends_with(&buffer));

        let decoded = image::open(&path).expect("decode failed").to_luma8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.into_raw(), buffer);
    }

    #[test]
    fn test_successful_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("frame.ppm");

        PgmFileSink
            .write_grayscale_image(&path, 2, 2, 1, &[1, 2, 3, 4])
            .expect("write failed");

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir failed")
            .map(|entry| entry.expect("bad entry").file_name())
            .collect();
        assert_eq!(entries, [OsString::from("frame.ppm")]);
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        // A directory at the target makes the final rename fail after encoding.
        let path = dir.path().join("frame.ppm");
        std::fs::create_dir(&path).expect("mkdir failed");

        let result = PgmFileSink.write_grayscale_image(&path, 2, 2, 1, &[1, 2, 3, 4]);
        assert!(matches!(result, Err(PersistError::Io(_))));
        assert!(path.is_dir());
        assert!(!dir.path().join(".frame.ppm.partial").exists());
    }

    #[test]
    fn test_failed_encode_leaves_no_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let missing = dir.path().join("missing").join("frame.ppm");

        let result = PgmFileSink.write_grayscale_image(&missing, 2, 2, 1, &[1, 2, 3, 4]);
        assert!(matches!(result, Err(PersistError::Io(_))));
        assert!(!missing.exists());
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let partial = partial_path(Path::new("/tmp/out/img_captured.ppm")).expect("no name");
        assert_eq!(partial, Path::new("/tmp/out/.img_captured.ppm.partial"));
        assert!(partial_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_rejects_wrong_buffer_size() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("frame.ppm");

        let result = PgmFileSink.write_grayscale_image(&path, 4, 3, 1, &[0u8; 11]);
        assert!(matches!(
            result,
            Err(PersistError::SizeMismatch {
                expected: 12,
                actual: 11
            })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_unsupported_depth() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("frame.ppm");

        let result = PgmFileSink.write_grayscale_image(&path, 2, 2, 3, &[0u8; 12]);
        assert!(matches!(result, Err(PersistError::UnsupportedDepth(3))));
    }
}
