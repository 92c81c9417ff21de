//! Output containers. Every format accepts the same page sequence and metadata and writes one file.

mod cbz;
mod epub;
mod path;
mod pdf;

pub use cbz::CbzPackager;
pub use epub::EpubPackager;
pub use path::{resolve_output_path, sanitize_file_name};
pub use pdf::PdfPackager;

use crate::metadata::Metadata;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors from packaging pages into an output file.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Unsupported output format '{0}'. Use cbz, pdf, or epub.")]
    UnsupportedFormat(String),

    #[error("Cannot decode page image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to build PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("I/O error while packaging: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot write output in {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot save output to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Nothing to write: no pages were added.")]
    NoPages,
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Cbz,
    Pdf,
    Epub,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Cbz => "cbz",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Epub => "epub",
        }
    }

    pub fn from_extension(ext: &str) -> Result<Self, PackageError> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "cbz" => Ok(OutputFormat::Cbz),
            "pdf" => Ok(OutputFormat::Pdf),
            "epub" => Ok(OutputFormat::Epub),
            other => Err(PackageError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An in-progress output file.
///
/// Pages appear in the output in `add_page` order. Nothing reaches the output directory before
/// [Packager::finalize]; dropping a packager discards its staged pages.
pub trait Packager {
    /// Append one page. `extension` names the image type (`jpg`, `png`, ...).
    fn add_page(&mut self, extension: &str, bytes: &[u8]) -> Result<(), PackageError>;

    /// Number of pages added so far.
    fn page_count(&self) -> usize;

    /// Write the container to `output_dir` under a collision-free name derived from `base_name`.
    fn finalize(
        self: Box<Self>,
        output_dir: &Path,
        base_name: &str,
        metadata: &Metadata,
        range_label: Option<&str>,
    ) -> Result<PathBuf, PackageError>;
}

/// Fresh packager for `format`.
pub fn new_packager(format: OutputFormat) -> Result<Box<dyn Packager>, PackageError> {
    Ok(match format {
        OutputFormat::Cbz => Box::new(CbzPackager::new()),
        OutputFormat::Pdf => Box::new(PdfPackager::new()),
        OutputFormat::Epub => Box::new(EpubPackager::new()?),
    })
}

/// Write a file through a temporary file in `output_dir`, then move it to a free name.
///
/// The final path never holds a partial file, and an existing file is never replaced.
pub(crate) fn persist_with<F>(
    output_dir: &Path,
    base_name: &str,
    extension: &str,
    write: F,
) -> Result<PathBuf, PackageError>
where
    F: FnOnce(&mut std::fs::File) -> Result<(), PackageError>,
{
    let write_err = |source| PackageError::Write {
        path: output_dir.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(output_dir).map_err(write_err)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".mdpack-")
        .suffix(".part")
        .tempfile_in(output_dir)
        .map_err(write_err)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush().map_err(write_err)?;

    let path = resolve_output_path(output_dir, base_name, extension);
    tmp.persist_noclobber(&path)
        .map_err(|e| PackageError::Persist {
            path: path.clone(),
            source: e.error,
        })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses_extensions() {
        assert_eq!("cbz".parse::<OutputFormat>().unwrap(), OutputFormat::Cbz);
        assert_eq!(".PDF".parse::<OutputFormat>().unwrap(), OutputFormat::Pdf);
        assert_eq!(
            OutputFormat::from_extension("epub").unwrap(),
            OutputFormat::Epub
        );
        assert!(matches!(
            "mobi".parse::<OutputFormat>(),
            Err(PackageError::UnsupportedFormat(ext)) if ext == "mobi"
        ));
        assert_eq!(OutputFormat::Epub.to_string(), "epub");
    }

    #[test]
    fn persist_with_never_overwrites() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = persist_with(dir.path(), "Book", "cbz", |f| Ok(f.write_all(b"one")?))?;
        let second = persist_with(dir.path(), "Book", "cbz", |f| Ok(f.write_all(b"two")?))?;
        assert_eq!(first, dir.path().join("Book.cbz"));
        assert_eq!(second, dir.path().join("Book (1).cbz"));
        assert_eq!(std::fs::read(&first)?, b"one");
        assert_eq!(std::fs::read(&second)?, b"two");
        Ok(())
    }

    #[test]
    fn persist_with_leaves_nothing_on_write_failure() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = persist_with(dir.path(), "Book", "pdf", |_| Err(PackageError::NoPages));
        assert!(matches!(result, Err(PackageError::NoPages)));
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn persist_with_creates_missing_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a").join("b");
        let path = persist_with(&nested, "x", "epub", |f| Ok(f.write_all(b"z")?))?;
        assert_eq!(path, nested.join("x.epub"));
        Ok(())
    }
}
