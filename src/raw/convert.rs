/// RAW to preview conversion
///
/// The embedded preview is extracted by an external decoder (dcraw or a
/// compatible tool) into a temporary file, then decoded and downscaled so
/// the UI can show it without further work.
use chrono::NaiveDateTime;
use image::imageops::FilterType;
use image::{ImageReader, RgbaImage};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, warn};

use super::metadata;
use crate::error::ConversionError;

/// A decoded preview, cheap to clone
#[derive(Debug, Clone)]
pub struct Preview {
    image: Arc<RgbaImage>,
}

impl Preview {
    pub fn new(image: RgbaImage) -> Self {
        Self { image: Arc::new(image) }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// RGBA8 pixel data, row-major
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Result of one successful conversion.
///
/// The owner of a `Conversion` owns the temporary artifact: dropping it
/// deletes the file.
#[derive(Debug)]
pub struct Conversion {
    pub preview: Preview,
    pub artifact: TempPath,
    pub captured_at: Option<NaiveDateTime>,
}

/// Runs the external decoder. Holds no state besides its configuration,
/// so one instance is shared by every worker.
#[derive(Debug, Clone)]
pub struct Converter {
    program: PathBuf,
    leading_args: Vec<OsString>,
    max_dimension: u32,
}

impl Converter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            max_dimension: 2048,
        }
    }

    /// Arguments placed before the fixed `-e -c <source>` shape
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Longest edge of produced previews; zero disables downscaling
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Convert one RAW file. Blocks for the lifetime of the decoder
    /// process, so call it from a blocking worker.
    pub fn convert(&self, source: &Path) -> Result<Conversion, ConversionError> {
        let artifact = self.extract(source)?;
        let preview = self.decode(source, &artifact)?;
        let captured_at = metadata::capture_time(source);

        Ok(Conversion {
            preview,
            artifact,
            captured_at,
        })
    }

    /// Run the decoder with stdout redirected into a fresh temp file
    fn extract(&self, source: &Path) -> Result<TempPath, ConversionError> {
        let artifact_error = |err| ConversionError::Artifact {
            path: source.to_path_buf(),
            source: err,
        };

        let file = tempfile::Builder::new()
            .prefix("picknick-")
            .suffix(".jpg")
            .tempfile()
            .map_err(artifact_error)?;
        let stdout = file.reopen().map_err(artifact_error)?;
        // From here on the artifact is deleted on every early return
        let artifact = file.into_temp_path();

        debug!(source = %source.display(), "converting");

        let status = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("-e") // Extract embedded thumbnail
            .arg("-c") // Write image data to standard output
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::inherit())
            .status()
            .map_err(|err| ConversionError::Unavailable {
                program: self.program.clone(),
                path: source.to_path_buf(),
                source: err,
            })?;

        if !status.success() {
            return Err(ConversionError::Exit {
                path: source.to_path_buf(),
                status,
            });
        }

        Ok(artifact)
    }

    fn decode(&self, source: &Path, artifact: &Path) -> Result<Preview, ConversionError> {
        let decode_error = |err| ConversionError::Decode {
            path: source.to_path_buf(),
            source: err,
        };

        // dcraw writes JPEG for most cameras and PPM for some, so sniff
        // the format from the content rather than trusting the suffix
        let img = ImageReader::open(artifact)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|err| ConversionError::Artifact {
                path: source.to_path_buf(),
                source: err,
            })?
            .decode()
            .map_err(decode_error)?;

        let max = self.max_dimension;
        let img = if max > 0 && (img.width() > max || img.height() > max) {
            img.resize(max, max, FilterType::Triangle)
        } else {
            img
        };

        debug!(
            source = %source.display(),
            width = img.width(),
            height = img.height(),
            "decoded preview"
        );
        Ok(Preview::new(img.to_rgba8()))
    }
}

/// Delete an artifact now instead of waiting for drop, logging failures
pub fn discard(artifact: TempPath) {
    let path = artifact.to_path_buf();
    if let Err(err) = artifact.close() {
        warn!(path = %path.display(), error = %err, "failed to delete temporary image");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{fake_decoder, write_jpeg};

    #[test]
    fn test_convert_writes_artifact_and_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = fake_decoder(dir.path());
        let source = dir.path().join("DSC_0001.NEF");
        write_jpeg(&source, 40, 30);

        let conversion = decoder.converter().convert(&source).unwrap();

        assert!(conversion.artifact.exists());
        assert_eq!((conversion.preview.width(), conversion.preview.height()), (40, 30));
        assert_eq!(conversion.preview.pixels().len(), 40 * 30 * 4);
        assert_eq!(conversion.captured_at, None);
        assert_eq!(decoder.invocations(), vec![source]);
    }

    #[test]
    fn test_preview_is_downscaled() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = fake_decoder(dir.path());
        let source = dir.path().join("wide.nef");
        write_jpeg(&source, 64, 32);

        let conversion = decoder
            .converter()
            .with_max_dimension(16)
            .convert(&source)
            .unwrap();

        assert_eq!((conversion.preview.width(), conversion.preview.height()), (16, 8));
    }

    #[test]
    fn test_discard_deletes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = fake_decoder(dir.path());
        let source = dir.path().join("a.nef");
        write_jpeg(&source, 8, 8);

        let conversion = decoder.converter().convert(&source).unwrap();
        let path = conversion.artifact.to_path_buf();
        discard(conversion.artifact);

        assert!(!path.exists());
    }

    #[test]
    fn test_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = fake_decoder(dir.path());
        let source = dir.path().join("corrupt.nef");
        write_jpeg(&source, 8, 8);

        let err = decoder.converter().convert(&source).unwrap_err();

        assert!(matches!(err, ConversionError::Exit { .. }));
        assert_eq!(err.path(), source);
    }

    #[test]
    fn test_missing_decoder_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.nef");
        write_jpeg(&source, 8, 8);

        let err = Converter::new(dir.path().join("no-such-dcraw"))
            .convert(&source)
            .unwrap_err();

        assert!(matches!(err, ConversionError::Unavailable { .. }));
    }

    #[test]
    fn test_garbage_output_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let decoder = fake_decoder(dir.path());
        let source = dir.path().join("a.nef");
        std::fs::write(&source, b"not an image at all").unwrap();

        let err = decoder.converter().convert(&source).unwrap_err();

        assert!(matches!(err, ConversionError::Decode { .. }));
    }
}
