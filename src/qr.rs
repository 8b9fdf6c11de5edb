use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::render::svg;
use qrcode::QrCode;

use crate::crypto::generate_random_string;
use crate::env;
use crate::error::ServiceResult;

const SHORT_CODE_LENGTH: usize = 8;
const IMAGE_SIZE: u32 = 512;

/// Public lookup key of a qr code.
pub fn generate_short_code() -> String {
    generate_random_string(SHORT_CODE_LENGTH).to_lowercase()
}

pub fn build_tip_url(short_code: &str) -> String {
    format!("{}/tip/{}", env::BASE_URL.trim_end_matches('/'), short_code)
}

pub fn render_png(content: &str) -> ServiceResult<Vec<u8>> {
    let code = QrCode::new(content.as_bytes())?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(IMAGE_SIZE, IMAGE_SIZE)
        .build();

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

pub fn render_svg(content: &str) -> ServiceResult<String> {
    let code = QrCode::new(content.as_bytes())?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(IMAGE_SIZE, IMAGE_SIZE)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_code() {
        let code = generate_short_code();
        assert_eq!(code.len(), SHORT_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tip_url() {
        assert!(build_tip_url("table01").ends_with("/tip/table01"));
    }

    #[test]
    fn test_render_formats() {
        let png = render_png("http://localhost:3000/tip/table01").unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let svg = render_svg("http://localhost:3000/tip/table01").unwrap();
        assert!(svg.contains("<svg"));
    }
}
