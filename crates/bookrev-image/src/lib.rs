use std::io::{BufWriter, Cursor};

use fast_image_resize::{IntoImageView as _, Resizer, images::Image};
use image::{
    DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder as _, ImageReader,
    codecs::png::PngEncoder,
};

type Result<T> = anyhow::Result<T>;

pub const COVER_MAX_WIDTH: u32 = 600;
pub const COVER_MAX_HEIGHT: u32 = 900;

/// Dimensions fitting into `bounds` with preserved aspect ratio, never enlarged
fn fit_dimensions(bounds: (u32, u32), actual: (u32, u32)) -> (u32, u32) {
    let scale = f32::min(
        bounds.0 as f32 / actual.0 as f32,
        bounds.1 as f32 / actual.1 as f32,
    );
    if scale >= 1.0 {
        return actual;
    }
    let nw = (actual.0 as f32 * scale).round() as u32;
    let nh = (actual.1 as f32 * scale).round() as u32;
    (nw.max(1), nh.max(1))
}

/// Decodes uploaded image, downsizes it to cover bounds and encodes as PNG
pub fn normalize_cover(data: &[u8]) -> Result<Vec<u8>> {
    scale_image(data, (COVER_MAX_WIDTH, COVER_MAX_HEIGHT))
}

pub fn scale_image(data: &[u8], bounds: (u32, u32)) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;
    // uniform pixel layout, source can be anything from grayscale to 16bit
    let img = DynamicImage::ImageRgba8(img.to_rgba8());
    let (width, height) = fit_dimensions(bounds, img.dimensions());
    let mut dst_image = Image::new(
        width,
        height,
        img.pixel_type()
            .ok_or_else(|| anyhow::anyhow!("Cannot get pixel type"))?,
    );
    let mut resizer = Resizer::new();
    resizer.resize(&img, &mut dst_image, None)?;

    let data = Vec::with_capacity(64 * 1024);
    let mut writer = BufWriter::new(data);
    PngEncoder::new(&mut writer).write_image(
        dst_image.buffer(),
        width,
        height,
        ExtendedColorType::Rgba8,
    )?;
    Ok(writer.into_inner()?)
}
