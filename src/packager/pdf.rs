//! Paged document (PDF): one page per image, each page sized to its image.
//!
//! JPEG data is embedded unchanged as a DCT stream. PDF cannot carry PNG, GIF or WebP streams
//! directly, so those are decoded to RGB and stored as a Flate stream.

use super::{persist_with, PackageError, Packager};
use crate::metadata::Metadata;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// Image stream ready to place on a page.
struct EmbeddedImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
}

/// Component count from the first JPEG start-of-frame marker.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        let len = usize::from(u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]));
        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            return bytes.get(i + 9).copied();
        }
        i += 2 + len;
    }
    None
}

fn embed_image(bytes: &[u8]) -> Result<EmbeddedImage, PackageError> {
    // CMYK JPEGs take the RGB path.
    if image::guess_format(bytes)? == ImageFormat::Jpeg && jpeg_components(bytes) != Some(4) {
        let decoder = JpegDecoder::new(Cursor::new(bytes))?;
        let (width, height) = decoder.dimensions();
        let color_space = match decoder.color_type() {
            ColorType::L8 | ColorType::L16 => "DeviceGray",
            _ => "DeviceRGB",
        };
        return Ok(EmbeddedImage {
            width,
            height,
            color_space,
            filter: "DCTDecode",
            data: bytes.to_vec(),
        });
    }
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(rgb.as_raw())?;
    Ok(EmbeddedImage {
        width,
        height,
        color_space: "DeviceRGB",
        filter: "FlateDecode",
        data: encoder.finish()?,
    })
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::string_literal(s);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// PDF assembled in memory, page by page.
pub struct PdfPackager {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfPackager {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }
}

impl Default for PdfPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl Packager for PdfPackager {
    /// Decodes the image header (and, for non-JPEG, the pixels); malformed data fails here.
    fn add_page(&mut self, _extension: &str, bytes: &[u8]) -> Result<(), PackageError> {
        let img = embed_image(bytes)?;
        let (w, h) = (i64::from(img.width), i64::from(img.height));

        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => img.color_space,
                "BitsPerComponent" => 8,
                "Filter" => img.filter,
            },
            img.data,
        ));
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn finalize(
        self: Box<Self>,
        output_dir: &Path,
        base_name: &str,
        metadata: &Metadata,
        range_label: Option<&str>,
    ) -> Result<PathBuf, PackageError> {
        if self.kids.is_empty() {
            return Err(PackageError::NoPages);
        }
        let PdfPackager {
            mut doc,
            pages_id,
            kids,
        } = *self;
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let creation_date = metadata
            .last_modified
            .format("D:%Y%m%d%H%M%SZ")
            .to_string();
        let info_id = doc.add_object(dictionary! {
            "Title" => text_string(&metadata.display_title(range_label)),
            "Author" => text_string(&metadata.author_line()),
            "Subject" => text_string(&metadata.comic_book.info.title),
            "Creator" => text_string(metadata.app_id()),
            "Producer" => text_string(metadata.app_id()),
            "CreationDate" => Object::string_literal(creation_date),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        persist_with(output_dir, base_name, "pdf", |file| {
            file.write_all(&buffer)?;
            Ok(())
        })
    }
}
