//! Geometry decoding, reprojection and clipping.

use crate::error::{FeatureError, Result};
use geo::{BooleanOps, Coord, Geometry, Intersects, MapCoords, MultiPolygon};
use std::str::FromStr;
use wkt::Wkt;

/// Spherical Web Mercator radius in metres.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Coordinate reference systems a table can be converted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// Geographic longitude/latitude; the reference CRS.
    Wgs84,
    /// Spherical (pseudo) Mercator in metres.
    WebMercator,
}

impl Crs {
    /// Parse a CRS identifier such as `EPSG:4326`.
    pub fn parse(name: &str) -> Result<Crs> {
        match name.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "OGC:CRS84" | "WGS84" | "CRS84" => Ok(Crs::Wgs84),
            "EPSG:3857" | "EPSG:900913" | "EPSG:3785" => Ok(Crs::WebMercator),
            _ => Err(FeatureError::UnsupportedCrs(name.to_string())),
        }
    }

    pub fn is_reference(self) -> bool {
        self == Crs::Wgs84
    }

    /// Convert a geometry from this CRS to longitude/latitude.
    pub fn to_reference(self, geometry: &Geometry<f64>) -> Geometry<f64> {
        match self {
            Crs::Wgs84 => geometry.clone(),
            Crs::WebMercator => geometry.map_coords(mercator_to_lon_lat),
        }
    }
}

fn mercator_to_lon_lat(c: Coord<f64>) -> Coord<f64> {
    let lon = (c.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    Coord { x: lon, y: lat }
}

/// Decode a WKT string such as `POINT (27.479 42.486)`.
pub fn parse_wkt(text: &str) -> Result<Geometry<f64>> {
    let parsed = Wkt::<f64>::from_str(text.trim())
        .map_err(|e| FeatureError::Geometry(format!("'{}': {}", text, e)))?;
    Geometry::try_from(parsed).map_err(|e| FeatureError::Geometry(format!("'{}': {}", text, e)))
}

/// Short name of a geometry's type, as used in error messages.
pub fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Collect all polygonal parts of a set of geometries into one mask.
pub fn polygons_to_mask<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> MultiPolygon<f64> {
    let mut polygons = Vec::new();
    for geometry in geometries {
        match geometry {
            Geometry::Polygon(p) => polygons.push(p.clone()),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0.iter().cloned()),
            other => log::warn!(
                "geometry: Ignoring {} in mask, only polygons are used",
                geometry_name(other)
            ),
        }
    }
    MultiPolygon::new(polygons)
}

/// Clip a geometry to a mask.
///
/// Polygons are replaced by their intersection with the mask; any other
/// geometry is kept unchanged when it touches the mask. Returns `None`
/// when nothing of the geometry lies inside.
pub fn clip_geometry(geometry: &Geometry<f64>, mask: &MultiPolygon<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Polygon(p) => {
            intersection_geometry(MultiPolygon::new(vec![p.clone()]).intersection(mask))
        }
        Geometry::MultiPolygon(mp) => intersection_geometry(mp.intersection(mask)),
        other => other.intersects(mask).then(|| other.clone()),
    }
}

fn intersection_geometry(mut clipped: MultiPolygon<f64>) -> Option<Geometry<f64>> {
    match clipped.0.len() {
        0 => None,
        1 => clipped.0.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(clipped)),
    }
}
