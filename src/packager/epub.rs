//! EPUB 3 writer for image-only books (mimetype, container, OPF, nav, one XHTML section per page).
//!
//! Pages are staged in a temporary directory while the chapter downloads; the directory is
//! removed when the packager is finalized or dropped.

use super::{persist_with, PackageError, Packager};
use crate::metadata::{xml_escape, Metadata};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";

/// A page written to the staging directory.
#[derive(Debug)]
struct StagedPage {
    /// Zero-padded page number plus extension, e.g. `0001.jpg`.
    file_name: String,
    extension: String,
}

impl StagedPage {
    fn id(&self) -> String {
        format!("page-{}", self.stem())
    }

    fn stem(&self) -> &str {
        self.file_name
            .split_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.file_name)
    }
}

/// EPUB staged on disk, assembled at finalize.
pub struct EpubPackager {
    staging: TempDir,
    pages: Vec<StagedPage>,
}

impl EpubPackager {
    pub fn new() -> Result<Self, PackageError> {
        let staging = tempfile::Builder::new().prefix("mdpack-epub-").tempdir()?;
        Ok(Self {
            staging,
            pages: Vec::new(),
        })
    }

    #[cfg(test)]
    fn staging_path(&self) -> PathBuf {
        self.staging.path().to_path_buf()
    }
}

fn image_media_type(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/png",
    }
}

impl Packager for EpubPackager {
    fn add_page(&mut self, extension: &str, bytes: &[u8]) -> Result<(), PackageError> {
        let extension = extension.to_ascii_lowercase();
        let file_name = format!("{:04}.{}", self.pages.len() + 1, extension);
        std::fs::write(self.staging.path().join(&file_name), bytes)?;
        self.pages.push(StagedPage {
            file_name,
            extension,
        });
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn finalize(
        self: Box<Self>,
        output_dir: &Path,
        base_name: &str,
        metadata: &Metadata,
        range_label: Option<&str>,
    ) -> Result<PathBuf, PackageError> {
        if self.pages.is_empty() {
            return Err(PackageError::NoPages);
        }
        let book = BookInfo {
            identifier: format!("urn:mdpack:{}", base_name),
            title: metadata.display_title(range_label),
            author: metadata.author_line(),
            language: if metadata.language().is_empty() {
                "en".to_string()
            } else {
                metadata.language().to_string()
            },
            description: metadata.comic_info.summary.clone(),
        };
        // `self` (and with it the staging directory) is dropped on every return path below.
        persist_with(output_dir, base_name, "epub", |file| {
            write_epub(&book, self.staging.path(), &self.pages, file)
        })
    }
}

/// Book-level fields for the package document.
struct BookInfo {
    identifier: String,
    title: String,
    author: String,
    language: String,
    description: String,
}

fn write_epub(
    book: &BookInfo,
    staging: &Path,
    pages: &[StagedPage],
    out: impl Write + Seek,
) -> Result<(), PackageError> {
    let mut zip = ZipWriter::new(out);
    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first, uncompressed
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    write_opf(book, pages, &mut zip, options_deflate)?;
    write_nav_xhtml(book, pages, &mut zip, options_deflate)?;
    write_page_sections(book, pages, &mut zip, options_deflate)?;

    for page in pages {
        let data = std::fs::read(staging.join(&page.file_name))?;
        zip.start_file(
            format!("{}images/{}", OEBPS_PREFIX, page.file_name),
            options_stored,
        )?;
        zip.write_all(&data)?;
    }

    zip.finish()?;
    Ok(())
}

fn write_opf(
    book: &BookInfo,
    pages: &[StagedPage],
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), PackageError> {
    let mut manifest = String::from(
        r#"    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
"#,
    );
    let mut spine = String::new();
    for (i, page) in pages.iter().enumerate() {
        // First page doubles as the cover image.
        let properties = if i == 0 { r#" properties="cover-image""# } else { "" };
        manifest.push_str(&format!(
            r#"    <item id="img-{stem}" href="images/{file}" media-type="{media}"{properties}/>
    <item id="{id}" href="{id}.xhtml" media-type="application/xhtml+xml"/>
"#,
            stem = page.stem(),
            file = page.file_name,
            media = image_media_type(&page.extension),
            properties = properties,
            id = page.id(),
        ));
        spine.push_str(&format!("    <itemref idref=\"{}\"/>\n", page.id()));
    }

    let description_el = if book.description.is_empty() {
        String::new()
    } else {
        format!(
            "\n    <dc:description>{}</dc:description>",
            xml_escape(&book.description)
        )
    };

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{creator}</dc:creator>
    <dc:language>{language}</dc:language>{description_el}
    <meta property="rendition:layout">pre-paginated</meta>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>
"#,
        id = xml_escape(&book.identifier),
        title = xml_escape(&book.title),
        creator = xml_escape(&book.author),
        language = xml_escape(&book.language),
        description_el = description_el,
        manifest = manifest,
        spine = spine,
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn write_nav_xhtml(
    book: &BookInfo,
    pages: &[StagedPage],
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), PackageError> {
    let mut nav_links = String::new();
    for (i, page) in pages.iter().enumerate() {
        nav_links.push_str(&format!(
            "      <li><a href=\"{}.xhtml\">{}</a></li>\n",
            page.id(),
            i + 1
        ));
    }
    let nav = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>{title}</h1>
    <ol>
{links}    </ol>
  </nav>
</body>
</html>
"#,
        lang = xml_escape(&book.language),
        title = xml_escape(&book.title),
        links = nav_links
    );
    zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(nav.as_bytes())?;
    Ok(())
}

fn write_page_sections(
    book: &BookInfo,
    pages: &[StagedPage],
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), PackageError> {
    for (i, page) in pages.iter().enumerate() {
        let section = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{lang}">
<head>
  <meta charset="UTF-8"/>
  <title>{n}</title>
  <style>body {{ margin: 0; }} img {{ display: block; max-width: 100%; max-height: 100vh; margin: 0 auto; }}</style>
</head>
<body>
  <img src="images/{file}" alt="{n}"/>
</body>
</html>
"#,
            lang = xml_escape(&book.language),
            n = i + 1,
            file = page.file_name,
        );
        zip.start_file(format!("{}{}.xhtml", OEBPS_PREFIX, page.id()), options)?;
        zip.write_all(section.as_bytes())?;
    }
    Ok(())
}
