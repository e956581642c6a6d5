//! PNG encoding for composite rasters.
//!
//! Two encodings:
//! - **Indexed (color type 3)** when the raster has at most 256 distinct
//!   colors, which is common for masks and color-mapped planes.
//! - **RGBA (color type 6)** otherwise.
//!
//! `create_png_auto` picks between them; `create_png` always writes RGBA.

use std::collections::HashMap;
use std::io::Write;

use flate2::{write::ZlibEncoder, Compression};
use view_common::{Raster, ViewError, ViewResult};

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
const MAX_PALETTE_SIZE: usize = 256;

/// Encode a raster as an RGBA PNG.
pub fn create_png(raster: &Raster) -> ViewResult<Vec<u8>> {
    let row_len = raster.width() * 4;
    let idat = deflate_rows(raster.as_rgba(), row_len, raster.height())?;

    let mut png = Vec::with_capacity(idat.len() + 64);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(raster, 6));
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// Encode a raster, using a palette when it has few enough colors.
pub fn create_png_auto(raster: &Raster) -> ViewResult<Vec<u8>> {
    let Some((palette, indices)) = extract_palette(raster.as_rgba()) else {
        return create_png(raster);
    };

    let idat = deflate_rows(&indices, raster.width(), raster.height())?;

    let mut plte = Vec::with_capacity(palette.len() * 3);
    let mut trns = Vec::with_capacity(palette.len());
    for [r, g, b, a] in &palette {
        plte.extend_from_slice(&[*r, *g, *b]);
        trns.push(*a);
    }
    // tRNS may be shortened to the last non-opaque entry
    while trns.last() == Some(&255) {
        trns.pop();
    }

    let mut png = Vec::with_capacity(idat.len() + plte.len() + 96);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(raster, 3));
    write_chunk(&mut png, b"PLTE", &plte);
    if !trns.is_empty() {
        write_chunk(&mut png, b"tRNS", &trns);
    }
    write_chunk(&mut png, b"IDAT", &idat);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn ihdr(raster: &Raster, color_type: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&(raster.width() as u32).to_be_bytes());
    data.extend_from_slice(&(raster.height() as u32).to_be_bytes());
    data.push(8); // bit depth
    data.push(color_type);
    data.push(0); // compression
    data.push(0); // filter
    data.push(0); // interlace
    data
}

/// Palette and per-pixel indices, or `None` above 256 colors.
fn extract_palette(pixels: &[u8]) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let mut lookup: HashMap<[u8; 4], u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices = Vec::with_capacity(pixels.len() / 4);

    for px in pixels.chunks_exact(4) {
        let color = [px[0], px[1], px[2], px[3]];
        let index = match lookup.get(&color) {
            Some(&i) => i,
            None => {
                if palette.len() == MAX_PALETTE_SIZE {
                    return None;
                }
                let i = palette.len() as u8;
                palette.push(color);
                lookup.insert(color, i);
                i
            }
        };
        indices.push(index);
    }
    Some((palette, indices))
}

/// Prefix each row with filter type 0 and zlib-compress.
fn deflate_rows(data: &[u8], row_len: usize, rows: usize) -> ViewResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(rows * (row_len + 1));
    for row in 0..rows {
        raw.push(0);
        raw.extend_from_slice(&data[row * row_len..(row + 1) * row_len]);
    }

    let compress = |raw: &[u8]| -> std::io::Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(raw)?;
        encoder.finish()
    };
    compress(&raw).map_err(|e| ViewError::RenderError(format!("IDAT compression failed: {}", e)))
}

fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use view_common::PixelSize;

    #[test]
    fn test_extract_palette_small() {
        let pixels = [255, 0, 0, 255, 0, 255, 0, 255, 255, 0, 0, 255];
        let (palette, indices) = extract_palette(&pixels).unwrap();
        assert_eq!(palette.len(), 2);
        assert_eq!(indices, vec![0, 1, 0]);
    }

    #[test]
    fn test_extract_palette_too_many_colors() {
        let pixels: Vec<u8> = (0..300u32)
            .flat_map(|i| [(i % 256) as u8, (i / 256) as u8, 0, 255])
            .collect();
        assert!(extract_palette(&pixels).is_none());
    }

    #[test]
    fn test_chunk_layout() {
        let raster = Raster::transparent(PixelSize::new(3, 2));
        let png = create_png(&raster).unwrap();
        assert_eq!(&png[..8], &SIGNATURE);
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(u32::from_be_bytes([png[16], png[17], png[18], png[19]]), 3);
        assert_eq!(png[25], 6);
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
    }
}
