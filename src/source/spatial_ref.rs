use std::fmt;

use serde::Serialize;

pub const KEY_GT_RASTER_TYPE: u16 = 1025;
pub const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
pub const KEY_PROJECTED_CS_TYPE: u16 = 3072;

pub const RASTER_PIXEL_IS_POINT: u16 = 2;

/// OGC WKT for WGS 84, the only CRS RFC 7946 GeoJSON may use.
pub const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

/// Spatial reference carried from a source to the output header.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialRef {
    Wkt(String),
    /// Raw GeoTIFF key directory with its double and ASCII parameters.
    GeoKeys {
        directory: Vec<u16>,
        doubles: Vec<f64>,
        ascii: String,
    },
}

impl SpatialRef {
    /// Inline value of `key` in a GeoKey directory.
    pub fn geo_key(directory: &[u16], key: u16) -> Option<u16> {
        let count = *directory.get(3)? as usize;
        directory
            .get(4..4 + count * 4)?
            .chunks_exact(4)
            .find(|entry| entry[0] == key && entry[1] == 0)
            .map(|entry| entry[3])
    }

    /// EPSG code of the horizontal CRS, when one is declared.
    pub fn epsg(&self) -> Option<u16> {
        match self {
            SpatialRef::GeoKeys { directory, .. } => {
                Self::geo_key(directory, KEY_PROJECTED_CS_TYPE)
                    .or_else(|| Self::geo_key(directory, KEY_GEOGRAPHIC_TYPE))
                    .filter(|code| *code != 0 && *code != 32767)
            }
            SpatialRef::Wkt(_) => None,
        }
    }
}

impl fmt::Display for SpatialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialRef::Wkt(wkt) => f.write_str(wkt),
            SpatialRef::GeoKeys { .. } => match self.epsg() {
                Some(code) => write!(f, "EPSG:{code}"),
                None => f.write_str("GeoTIFF user-defined CRS"),
            },
        }
    }
}
