//! Comic book archive (CBZ): numbered image entries, `ComicInfo.xml`, and a ComicBookInfo comment.

use super::{persist_with, PackageError, Packager};
use crate::metadata::Metadata;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const COMIC_INFO_ENTRY: &str = "ComicInfo.xml";

/// CBZ built in memory and written out at finalize.
pub struct CbzPackager {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    pages: usize,
}

impl CbzPackager {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            pages: 0,
        }
    }
}

impl Default for CbzPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl Packager for CbzPackager {
    fn add_page(&mut self, extension: &str, bytes: &[u8]) -> Result<(), PackageError> {
        // Images are already compressed.
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        let name = format!("{:04}.{}", self.pages + 1, extension);
        self.zip.start_file(name, options)?;
        self.zip.write_all(bytes)?;
        self.pages += 1;
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn finalize(
        self: Box<Self>,
        output_dir: &Path,
        base_name: &str,
        metadata: &Metadata,
        _range_label: Option<&str>,
    ) -> Result<PathBuf, PackageError> {
        if self.pages == 0 {
            return Err(PackageError::NoPages);
        }
        let mut zip = self.zip;
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);
        zip.start_file(COMIC_INFO_ENTRY, options)?;
        zip.write_all(metadata.comic_info_xml().as_bytes())?;
        zip.set_comment(metadata.comic_book_json()?);
        let archive = zip.finish()?.into_inner();

        persist_with(output_dir, base_name, "cbz", |file| {
            file.write_all(&archive)?;
            Ok(())
        })
    }
}
