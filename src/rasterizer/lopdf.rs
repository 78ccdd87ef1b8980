//! Pure Rust rasterizer for scanned PDFs
//!
//! Scanned documents carry each page as one embedded image, so "rendering" a
//! page means decoding the largest image XObject it references. Pages made of
//! vector text have no such image and fail to rasterize. The page's
//! `/Rotate` entry is applied so the image comes out upright.

use super::{PageRasterizer, PdfDocument};
use crate::error::OcrError;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;

/// Guard against cyclic Parent links in malformed page trees
const MAX_TREE_DEPTH: usize = 32;

/// Rasterizer backed by lopdf
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfRasterizer;

impl PageRasterizer for LopdfRasterizer {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn PdfDocument>, OcrError> {
        let doc = Document::load(path)
            .map_err(|e| OcrError::CorruptFile(format!("Failed to load PDF: {}", e)))?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();

        tracing::debug!("Opened PDF with {} pages", pages.len());

        Ok(Box::new(LopdfDocument { doc, pages }))
    }
}

struct LopdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
}

impl PdfDocument for LopdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn render_page(&self, index: usize) -> Result<DynamicImage, OcrError> {
        let page_error = |reason: String| OcrError::RasterizationError {
            page: index + 1,
            reason,
        };

        let page_id = *self
            .pages
            .get(index)
            .ok_or_else(|| page_error(format!("document has {} pages", self.pages.len())))?;

        let images = page_images(&self.doc, page_id).map_err(page_error)?;
        let stream = images
            .into_iter()
            .max_by_key(|stream| {
                let (width, height) = dimensions(stream).unwrap_or((0, 0));
                width as u64 * height as u64
            })
            .ok_or_else(|| page_error("page contains no embedded image".to_string()))?;

        let image = decode_image(&self.doc, stream).map_err(page_error)?;
        let rotation = page_rotation(&self.doc, page_id).map_err(page_error)?;
        Ok(rotate_clockwise(image, rotation))
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, String> {
    match object {
        Object::Reference(id) => doc
            .get_object(*id)
            .map_err(|e| format!("broken reference {:?}: {}", id, e)),
        other => Ok(other),
    }
}

/// Look up a page attribute, walking up the page tree when the page does
/// not set it directly
fn inherited_entry<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Result<Option<&'a Object>, String> {
    let mut node = doc
        .get_dictionary(page_id)
        .map_err(|e| format!("invalid page object: {}", e))?;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value).map(Some);
        }
        match node.get(b"Parent") {
            Ok(parent) => {
                node = resolve(doc, parent)?
                    .as_dict()
                    .map_err(|e| format!("invalid Parent: {}", e))?;
            }
            Err(_) => return Ok(None),
        }
    }

    Err("page tree is too deep".to_string())
}

fn inherited_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>, String> {
    inherited_entry(doc, page_id, b"Resources")?
        .map(|resources| {
            resources
                .as_dict()
                .map_err(|e| format!("invalid Resources: {}", e))
        })
        .transpose()
}

/// Clockwise page rotation in degrees, normalized to 0, 90, 180 or 270
fn page_rotation(doc: &Document, page_id: ObjectId) -> Result<i64, String> {
    let Some(rotate) = inherited_entry(doc, page_id, b"Rotate")? else {
        return Ok(0);
    };
    let degrees = rotate
        .as_i64()
        .map_err(|e| format!("invalid Rotate: {}", e))?;
    if degrees % 90 != 0 {
        return Err(format!("Rotate must be a multiple of 90, got {}", degrees));
    }
    Ok(degrees.rem_euclid(360))
}

fn rotate_clockwise(image: DynamicImage, degrees: i64) -> DynamicImage {
    match degrees {
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        _ => image,
    }
}

/// Image XObjects referenced by a page
fn page_images(doc: &Document, page_id: ObjectId) -> Result<Vec<&Stream>, String> {
    let Some(resources) = inherited_resources(doc, page_id)? else {
        return Ok(Vec::new());
    };
    let Ok(xobjects) = resources.get(b"XObject") else {
        return Ok(Vec::new());
    };
    let xobjects = resolve(doc, xobjects)?
        .as_dict()
        .map_err(|e| format!("invalid XObject dictionary: {}", e))?;

    let mut images = Vec::new();
    for (_, value) in xobjects.iter() {
        let Ok(stream) = resolve(doc, value)?.as_stream() else {
            continue;
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(|subtype| subtype.as_name())
            .map(|name| name == b"Image")
            .unwrap_or(false);
        if is_image {
            images.push(stream);
        }
    }

    Ok(images)
}

fn int_entry(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key).ok().and_then(|value| value.as_i64().ok())
}

fn dimensions(stream: &Stream) -> Option<(u32, u32)> {
    let width = u32::try_from(int_entry(&stream.dict, b"Width")?).ok()?;
    let height = u32::try_from(int_entry(&stream.dict, b"Height")?).ok()?;
    Some((width, height))
}

fn filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(|name| name.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

fn decode_image(doc: &Document, stream: &Stream) -> Result<DynamicImage, String> {
    let (width, height) = dimensions(stream).ok_or("image has no valid Width/Height")?;
    let filters = filters(stream);

    match filters.last().map(Vec::as_slice) {
        Some(b"DCTDecode") if filters.len() == 1 => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|e| format!("invalid JPEG image: {}", e));
        }
        Some(b"DCTDecode") | Some(b"JPXDecode") | Some(b"JBIG2Decode") | Some(b"CCITTFaxDecode") => {
            let names: Vec<String> = filters
                .iter()
                .map(|f| String::from_utf8_lossy(f).to_string())
                .collect();
            return Err(format!("unsupported image filter chain: {}", names.join(", ")));
        }
        _ => {}
    }

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| format!("failed to decompress image: {}", e))?
    };

    let bits_per_component = int_entry(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    let (color_space, components) = color_space(doc, stream);

    tracing::debug!(
        "PDF image: {}x{}, {} bits, color_space={}, data_len={}",
        width,
        height,
        bits_per_component,
        color_space,
        data.len()
    );

    let mut image = raw_to_image(width, height, bits_per_component, components, data)
        .ok_or_else(|| {
            format!(
                "unsupported image layout: {} bits, color space {}, {} bytes for {}x{}",
                bits_per_component,
                color_space,
                stream.content.len(),
                width,
                height
            )
        })?;

    // Decode [1 0] flips gray samples, common in bilevel scans
    if components == Some(1) && is_inverted_decode(doc, stream) {
        image.invert();
    }

    Ok(image)
}

fn is_inverted_decode(doc: &Document, stream: &Stream) -> bool {
    let Some(decode) = stream
        .dict
        .get(b"Decode")
        .ok()
        .and_then(|object| resolve(doc, object).ok())
        .and_then(|object| object.as_array().ok())
    else {
        return false;
    };
    let bounds: Vec<f32> = decode
        .iter()
        .filter_map(|value| value.as_float().ok())
        .collect();
    matches!(bounds.as_slice(), [low, high] if low > high)
}

/// Color space name and component count, resolving indirect references
fn color_space(doc: &Document, stream: &Stream) -> (String, Option<usize>) {
    let Ok(object) = stream.dict.get(b"ColorSpace") else {
        return ("DeviceGray".to_string(), Some(1));
    };
    let Ok(object) = resolve(doc, object) else {
        return ("unknown".to_string(), None);
    };

    let (name, icc_profile) = match object {
        Object::Name(name) => (name.as_slice(), None),
        Object::Array(items) => match items.first().and_then(|first| first.as_name().ok()) {
            Some(name) => (name, items.get(1)),
            None => return ("unknown".to_string(), None),
        },
        _ => return ("unknown".to_string(), None),
    };

    let components = match name {
        b"DeviceGray" | b"CalGray" => Some(1),
        b"DeviceRGB" | b"CalRGB" => Some(3),
        b"DeviceCMYK" => Some(4),
        b"ICCBased" => icc_profile
            .and_then(|profile| resolve(doc, profile).ok())
            .and_then(|profile| profile.as_stream().ok())
            .and_then(|profile| int_entry(&profile.dict, b"N"))
            .and_then(|n| usize::try_from(n).ok()),
        _ => None,
    };

    (String::from_utf8_lossy(name).to_string(), components)
}

fn raw_to_image(
    width: u32,
    height: u32,
    bits_per_component: i64,
    components: Option<usize>,
    data: Vec<u8>,
) -> Option<DynamicImage> {
    let pixels = width as usize * height as usize;

    match (bits_per_component, components) {
        // Bilevel scans: 1 is white, rows padded to whole bytes
        (1, Some(1)) => {
            let stride = (width as usize).div_ceil(8);
            if data.len() < stride * height as usize {
                return None;
            }
            let img = GrayImage::from_fn(width, height, |x, y| {
                let byte = data[y as usize * stride + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                Luma([if bit == 1 { 255 } else { 0 }])
            });
            Some(DynamicImage::ImageLuma8(img))
        }
        (8, Some(1)) => {
            let mut data = data;
            data.truncate(pixels);
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        (8, Some(3)) => {
            let mut data = data;
            data.truncate(pixels * 3);
            RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
        }
        (8, Some(4)) => {
            if data.len() < pixels * 4 {
                return None;
            }
            let rgb_data: Vec<u8> = data[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = 1.0 - cmyk[3] as f32 / 255.0;
                    [0, 1, 2].map(|i| ((1.0 - cmyk[i] as f32 / 255.0) * k * 255.0) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb_data).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    }
}
