use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::processing::raster_walk::RasterBand;
use crate::source::spatial_ref::{KEY_GT_RASTER_TYPE, RASTER_PIXEL_IS_POINT, SpatialRef};
use crate::utils::error::{Error, Result};
use crate::utils::geometry::GeoTransform;

pub const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
pub const TAG_MODEL_TIEPOINT: u16 = 33922;
pub const TAG_MODEL_TRANSFORMATION: u16 = 34264;
pub const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
pub const TAG_GEO_DOUBLE_PARAMS: u16 = 34736;
pub const TAG_GEO_ASCII_PARAMS: u16 = 34737;
pub const TAG_GDAL_METADATA: u16 = 42112;
pub const TAG_GDAL_NODATA: u16 = 42113;

/// True when `head` starts with a classic or BigTIFF byte-order mark.
pub fn is_tiff(head: &[u8]) -> bool {
    matches!(
        head.get(..4),
        Some(b"II*\0") | Some(b"MM\0*") | Some(b"II+\0") | Some(b"MM\0+")
    )
}

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Value of the GDAL metadata item with `role` for the first sample.
fn metadata_item(metadata: &str, role: &str) -> Option<f64> {
    let needle = format!("role=\"{role}\"");
    metadata.split("<Item").skip(1).find_map(|item| {
        let (attributes, rest) = item.split_once('>')?;
        let first_sample = !attributes.contains("sample=") || attributes.contains("sample=\"0\"");
        if !attributes.contains(&needle) || !first_sample {
            return None;
        }
        let (value, _) = rest.split_once('<')?;
        fast_float2::parse::<f64, _>(value.trim()).ok()
    })
}

/// Band 1 of a GeoTIFF, decoded one strip or tile row at a time.
pub struct GeoTiffBand {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    width: usize,
    height: usize,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    samples: usize,
    no_data: Option<f64>,
    scale: f64,
    offset: f64,
    block_row: Option<usize>,
    block: Vec<f64>,
}

fn samples_to_f64(result: DecodingResult) -> Option<Vec<f64>> {
    #[allow(unreachable_patterns)]
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|s| s as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => return None,
    };
    Some(values)
}

impl GeoTiffBand {
    fn load_block(&mut self, block_row: usize) -> Result<()> {
        let first_row = block_row * self.chunk_height;
        let rows = self.chunk_height.min(self.height - first_row);
        self.block.clear();
        self.block.resize(rows * self.width, f64::NAN);
        self.block_row = None;

        for across in 0..self.chunks_across {
            let index = block_row * self.chunks_across + across;
            let first_col = across * self.chunk_width;
            let data_width = self.chunk_width.min(self.width - first_col);
            let decoded = self.decoder.read_chunk(index as u32)?;
            let values = samples_to_f64(decoded)
                .ok_or_else(|| Error::decode(&self.path, "unsupported sample format"))?;
            let stride = data_width * self.samples;
            for r in 0..rows {
                let source = values.get(r * stride..(r + 1) * stride).ok_or_else(|| {
                    Error::decode(&self.path, format!("chunk {index} is shorter than expected"))
                })?;
                let target = &mut self.block[r * self.width + first_col..][..data_width];
                for (cell, pixel) in target.iter_mut().zip(source.chunks_exact(self.samples)) {
                    *cell = pixel[0];
                }
            }
        }
        self.block_row = Some(block_row);
        Ok(())
    }
}

impl RasterBand for GeoTiffBand {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn no_data(&self) -> Option<f64> {
        self.no_data
    }

    fn scale(&self) -> f64 {
        self.scale
    }

    fn offset(&self) -> f64 {
        self.offset
    }

    fn read_row(&mut self, row: usize, row_buffer: &mut [f64]) -> Result<()> {
        if row >= self.height {
            return Err(Error::decode(&self.path, format!("row {row} out of range")));
        }
        let block_row = row / self.chunk_height;
        if self.block_row != Some(block_row) {
            self.load_block(block_row)?;
        }
        let start = (row - block_row * self.chunk_height) * self.width;
        row_buffer.copy_from_slice(&self.block[start..start + self.width]);
        Ok(())
    }
}

/// A GeoTIFF opened for reading: georeferencing plus its first band.
pub struct GeoTiffDataset {
    band: GeoTiffBand,
    transform: Option<GeoTransform>,
    spatial_ref: Option<SpatialRef>,
}

impl GeoTiffDataset {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let samples = match decoder.colortype()? {
            ColorType::Gray(_) | ColorType::Palette(_) => 1,
            ColorType::GrayA(_) => 2,
            ColorType::RGB(_) => 3,
            ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
            other => {
                return Err(Error::decode(path, format!("unsupported color type {other:?}")));
            }
        };
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunk_width = chunk_width.max(1) as usize;
        let chunk_height = chunk_height.max(1) as usize;
        let width = width as usize;
        let height = height as usize;

        let no_data = decoder
            .get_tag_ascii_string(tag(TAG_GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f64>().ok());

        let metadata = decoder.get_tag_ascii_string(tag(TAG_GDAL_METADATA)).ok();
        let scale = metadata
            .as_deref()
            .and_then(|m| metadata_item(m, "scale"))
            .unwrap_or(1.0);
        let offset = metadata
            .as_deref()
            .and_then(|m| metadata_item(m, "offset"))
            .unwrap_or(0.0);

        let spatial_ref = decoder
            .get_tag_u16_vec(tag(TAG_GEO_KEY_DIRECTORY))
            .ok()
            .map(|directory| SpatialRef::GeoKeys {
                directory,
                doubles: decoder
                    .get_tag_f64_vec(tag(TAG_GEO_DOUBLE_PARAMS))
                    .unwrap_or_default(),
                ascii: decoder
                    .get_tag_ascii_string(tag(TAG_GEO_ASCII_PARAMS))
                    .unwrap_or_default(),
            });

        let mut transform = read_transform(&mut decoder);
        let pixel_is_point = match &spatial_ref {
            Some(SpatialRef::GeoKeys { directory, .. }) => {
                SpatialRef::geo_key(directory, KEY_GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT)
            }
            _ => false,
        };
        if pixel_is_point {
            // Tie points address cell centres; move the origin to the corner
            transform = transform.map(|GeoTransform([c0, c1, c2, c3, c4, c5])| {
                GeoTransform([c0 - 0.5 * (c1 + c2), c1, c2, c3 - 0.5 * (c4 + c5), c4, c5])
            });
        }

        debug!(
            "GTiff {}: {width}x{height}, {samples} sample(s), chunk {chunk_width}x{chunk_height}, nodata {no_data:?}, scale {scale}, offset {offset}",
            path.display()
        );

        Ok(Self {
            band: GeoTiffBand {
                path: path.to_path_buf(),
                decoder,
                width,
                height,
                chunk_width,
                chunk_height,
                chunks_across: width.div_ceil(chunk_width),
                samples,
                no_data,
                scale,
                offset,
                block_row: None,
                block: Vec::new(),
            },
            transform,
            spatial_ref,
        })
    }

    pub fn raster_count(&self) -> usize {
        1
    }

    pub fn transform(&self) -> Option<GeoTransform> {
        self.transform
    }

    pub fn spatial_ref(&self) -> Option<SpatialRef> {
        self.spatial_ref.clone()
    }

    pub fn band_mut(&mut self) -> &mut GeoTiffBand {
        &mut self.band
    }
}

fn read_transform(decoder: &mut Decoder<BufReader<File>>) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(tag(TAG_MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Some(GeoTransform([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }
    let scale = decoder.get_tag_f64_vec(tag(TAG_MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(tag(TAG_MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    Some(GeoTransform([
        x - i * scale[0],
        scale[0],
        0.0,
        y + j * scale[1],
        0.0,
        -scale[1],
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::raster_walk::walk_raster;
    use crate::utils::geometry::Point3;
    use tiff::encoder::{TiffEncoder, colortype};

    fn write_tiff(path: &Path, width: u32, height: u32, data: &[f32], geo: bool) {
        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(width, height)
            .unwrap();
        if geo {
            let dir = image.encoder();
            dir.write_tag(tag(TAG_MODEL_PIXEL_SCALE), &[2.0f64, 2.0, 0.0][..])
                .unwrap();
            dir.write_tag(tag(TAG_MODEL_TIEPOINT), &[0.0f64, 0.0, 0.0, 10.0, 20.0, 0.0][..])
                .unwrap();
            dir.write_tag(tag(TAG_GDAL_NODATA), "-9999").unwrap();
            dir.write_tag(
                tag(TAG_GDAL_METADATA),
                r#"<GDALMetadata><Item name="SCALE" sample="0" role="scale">2</Item><Item name="OFFSET" sample="0" role="offset">10</Item></GDALMetadata>"#,
            )
            .unwrap();
            dir.write_tag(
                tag(TAG_GEO_KEY_DIRECTORY),
                &[1u16, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32633][..],
            )
            .unwrap();
        }
        image.write_data(data).unwrap();
    }

    #[test]
    fn test_metadata_item() {
        let meta = r#"<GDALMetadata><Item name="SCALE" sample="1" role="scale">9</Item><Item name="SCALE" sample="0" role="scale">2.5</Item><Item name="OFFSET" role="offset"> -1 </Item></GDALMetadata>"#;
        assert_eq!(metadata_item(meta, "scale"), Some(2.5));
        assert_eq!(metadata_item(meta, "offset"), Some(-1.0));
        assert_eq!(metadata_item("<GDALMetadata/>", "scale"), None);
    }

    #[test]
    fn test_magic() {
        assert!(is_tiff(b"II*\0rest"));
        assert!(is_tiff(b"MM\0*"));
        assert!(!is_tiff(b"1 2 3"));
        assert!(!is_tiff(b"II"));
    }

    #[test]
    fn test_georeferenced_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        write_tiff(&path, 2, 2, &[1.0, -9999.0, 3.0, f32::NAN], true);

        let mut dataset = GeoTiffDataset::open(&path).unwrap();
        assert_eq!(
            dataset.transform(),
            Some(GeoTransform([10.0, 2.0, 0.0, 20.0, 0.0, -2.0]))
        );
        assert_eq!(dataset.spatial_ref().unwrap().to_string(), "EPSG:32633");

        let transform = dataset.transform();
        let mut points = Vec::new();
        let stats = walk_raster(dataset.band_mut(), transform.as_ref(), |p| {
            points.push(p);
            Ok(())
        })
        .unwrap();
        assert_eq!(stats.excluded, 2);
        assert_eq!(
            points,
            vec![Point3::new(11.0, 19.0, 12.0), Point3::new(11.0, 17.0, 16.0)]
        );
    }

    #[test]
    fn test_plain_tiff_has_no_georeference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        write_tiff(&path, 3, 1, &[1.0, 2.0, 3.0], false);

        let mut dataset = GeoTiffDataset::open(&path).unwrap();
        assert_eq!(dataset.transform(), None);
        assert_eq!(dataset.spatial_ref(), None);

        let mut row = vec![0.0; 3];
        dataset.band_mut().read_row(0, &mut row).unwrap();
        assert_eq!(row, vec![1.0, 2.0, 3.0]);
        assert!(dataset.band_mut().read_row(1, &mut row).is_err());
    }

    #[test]
    fn test_rows_across_strip_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strips.tif");
        let data: Vec<f32> = (0..15).map(|v| v as f32).collect();
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            let mut image = encoder.new_image::<colortype::Gray32Float>(3, 5).unwrap();
            image.rows_per_strip(2).unwrap();
            image.write_data(&data).unwrap();
        }

        let mut dataset = GeoTiffDataset::open(&path).unwrap();
        let band = dataset.band_mut();
        assert_eq!((band.chunk_width, band.chunk_height), (3, 2));
        let mut row = vec![0.0; 3];
        // Last strip holds a single row
        band.read_row(4, &mut row).unwrap();
        assert_eq!(row, vec![12.0, 13.0, 14.0]);
        band.read_row(1, &mut row).unwrap();
        assert_eq!(row, vec![3.0, 4.0, 5.0]);
        band.read_row(2, &mut row).unwrap();
        assert_eq!(row, vec![6.0, 7.0, 8.0]);

        let mut dataset = GeoTiffDataset::open(&path).unwrap();
        let mut z = Vec::new();
        let stats = walk_raster(dataset.band_mut(), None, |p| {
            z.push(p.z);
            Ok(())
        })
        .unwrap();
        assert_eq!(stats.points, 15);
        assert_eq!(z, (0..15).map(f64::from).collect::<Vec<_>>());
    }
}
