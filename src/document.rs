//! Slide-deck assembly.
//!
//! [`assemble_pdf`] turns an ordered list of image files into a PDF with one
//! page per image, in list order. JPEG files are embedded as-is
//! (`DCTDecode`), so retained slides are not re-compressed; other formats are
//! decoded and re-encoded as JPEG first. Pages are sized to the image at
//! 96 dpi. An empty list produces a valid zero-page document.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ColorType, ImageDecoder, ImageFormat, ImageReader, codecs::jpeg::JpegEncoder};
use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};

use crate::error::SlideError;

/// JPEG quality used when a non-JPEG page image has to be re-encoded.
const REENCODE_QUALITY: u8 = 92;

/// One page's image, ready to embed.
struct PageImage {
    width: u32,
    height: u32,
    color_space: &'static str,
    jpeg: Vec<u8>,
}

impl PageImage {
    fn load(path: &Path) -> Result<Self, SlideError> {
        let bytes = fs::read(path)?;
        let reader = ImageReader::new(Cursor::new(&bytes)).with_guessed_format()?;

        if reader.format() == Some(ImageFormat::Jpeg) {
            let decoder = reader.into_decoder()?;
            let (width, height) = decoder.dimensions();
            let color_space = match decoder.color_type() {
                ColorType::L8 => Some("DeviceGray"),
                ColorType::Rgb8 => Some("DeviceRGB"),
                _ => None,
            };
            if let Some(color_space) = color_space {
                return Ok(Self {
                    width,
                    height,
                    color_space,
                    jpeg: bytes,
                });
            }
        }

        // Anything else (PNG, CMYK JPEG, ...) goes through RGB.
        let rgb = image::load_from_memory(&bytes)?.to_rgb8();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, REENCODE_QUALITY).encode_image(&rgb)?;
        Ok(Self {
            width: rgb.width(),
            height: rgb.height(),
            color_space: "DeviceRGB",
            jpeg,
        })
    }

    /// Page size in points (1/72 in) for a 96 dpi image.
    fn page_size(&self) -> (i64, i64) {
        let points = |pixels: u32| ((i64::from(pixels) * 3 + 2) / 4).max(1);
        (points(self.width), points(self.height))
    }
}

/// Build a PDF with one page per image, in the given order.
///
/// # Errors
///
/// - [`SlideError::IoError`] / [`SlideError::ImageError`] if an image cannot
///   be read.
/// - [`SlideError::DocumentError`] if PDF serialisation fails.
pub fn assemble_pdf<P: AsRef<Path>>(images: &[P]) -> Result<Vec<u8>, SlideError> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for path in images {
        let page = PageImage::load(path.as_ref())?;
        let (page_width, page_height) = page.page_size();

        let image_id = document.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(page.width),
                "Height" => i64::from(page.height),
                "ColorSpace" => page.color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            page.jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        page_width.into(),
                        0.into(),
                        0.into(),
                        page_height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec!["Slide".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content
            .encode()
            .map_err(|error| SlideError::DocumentError(error.to_string()))?;
        let content_id = document.add_object(Stream::new(dictionary! {}, content_bytes));

        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Slide" => image_id,
                },
            },
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document
        .save_to(&mut bytes)
        .map_err(|error| SlideError::DocumentError(error.to_string()))?;
    Ok(bytes)
}

/// Image files in `directory`, sorted by file name.
///
/// # Errors
///
/// Returns [`SlideError::IoError`] if the directory cannot be listed.
pub fn collect_images(directory: &Path) -> Result<Vec<PathBuf>, SlideError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() && ImageFormat::from_path(&path).is_ok() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Write a document to `output`, creating missing parent directories.
///
/// # Errors
///
/// Returns [`SlideError::OutputWrite`] if the file cannot be written.
pub fn write_document(output: &Path, bytes: &[u8]) -> Result<(), SlideError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, bytes)
    };
    write().map_err(|source| SlideError::OutputWrite {
        path: output.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma, Rgb, RgbImage};

    use super::*;

    fn page_count(bytes: &[u8]) -> usize {
        Document::load_mem(bytes)
            .expect("Failed to parse generated PDF")
            .get_pages()
            .len()
    }

    #[test]
    fn empty_list_gives_zero_pages() {
        let bytes = assemble_pdf::<PathBuf>(&[]).expect("Failed to assemble");
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(page_count(&bytes), 0);
    }

    #[test]
    fn one_page_per_image() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        let mut paths = Vec::new();
        for index in 0..3u8 {
            let path = directory.path().join(format!("slide_{index}.jpg"));
            RgbImage::from_pixel(64, 48, Rgb([index * 40, 100, 200]))
                .save(&path)
                .expect("Failed to save jpeg");
            paths.push(path);
        }
        let png = directory.path().join("slide_3.png");
        GrayImage::from_pixel(32, 32, Luma([128]))
            .save(&png)
            .expect("Failed to save png");
        paths.push(png);

        let bytes = assemble_pdf(&paths).expect("Failed to assemble");
        assert_eq!(page_count(&bytes), 4);
    }

    #[test]
    fn jpeg_data_is_embedded_unchanged() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        let path = directory.path().join("slide.jpg");
        RgbImage::from_fn(40, 30, |x, y| Rgb([x as u8 * 6, y as u8 * 8, 50]))
            .save(&path)
            .expect("Failed to save jpeg");
        let original = fs::read(&path).expect("read");

        let bytes = assemble_pdf(&[&path]).expect("Failed to assemble");
        assert!(
            bytes.windows(original.len()).any(|window| window == original.as_slice()),
            "JPEG bytes should appear verbatim in the PDF"
        );
    }

    #[test]
    fn collect_images_sorts_by_name() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        for name in ["b.jpg", "a.jpg", "c.jpg"] {
            RgbImage::new(2, 2)
                .save(directory.path().join(name))
                .expect("save");
        }
        fs::write(directory.path().join("notes.txt"), b"skip").expect("write");
        let names: Vec<String> = collect_images(directory.path())
            .expect("list")
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn write_document_creates_parents() {
        let directory = tempfile::tempdir().expect("Failed to create temp dir");
        let output = directory.path().join("nested/deeper/deck.pdf");
        write_document(&output, b"%PDF-1.5").expect("write");
        assert!(output.is_file());
    }
}
