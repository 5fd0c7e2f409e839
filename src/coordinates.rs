use serde::Serialize;
use std::f64::consts::PI;
use std::str::FromStr;

use super::error::{Error, Result};

// Krasovsky 1940 ellipsoid, which the GCJ-02 offset is defined against.
const SEMI_MAJOR_AXIS: f64 = 6_378_245.0;
const ECCENTRICITY_SQUARED: f64 = 0.006_693_421_622_965_943_23;

/// A longitude/latitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinate {
    pub fn new(lng: f64, lat: f64) -> Self {
        Coordinate { lng, lat }
    }

    /// Parses a pair of decimal strings, e.g. the two halves of an AMap location.
    pub fn parse(lng: &str, lat: &str) -> Result<Self> {
        Ok(Coordinate {
            lng: parse_degrees(lng)?,
            lat: parse_degrees(lat)?,
        })
    }

    /// Parses an AMap `"lng,lat"` location string.
    pub fn from_location(location: &str) -> Result<Self> {
        let mut parts = location.split(',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(lng), Some(lat), None) => Coordinate::parse(lng, lat),
            _ => Err(Error::Parse(format!(
                "expected \"lng,lat\" but found {location:?}"
            ))),
        }
    }

    fn rounded(self) -> Self {
        Coordinate {
            lng: round_6(self.lng),
            lat: round_6(self.lat),
        }
    }
}

impl FromStr for Coordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Coordinate::from_location(s)
    }
}

fn parse_degrees(s: &str) -> Result<f64> {
    let value = s
        .trim()
        .parse::<f64>()
        .map_err(|e| Error::Parse(format!("invalid coordinate {s:?}: {e}")))?;
    // f64::from_str accepts "NaN" and "inf"
    if !value.is_finite() {
        return Err(Error::Parse(format!("invalid coordinate {s:?}: not finite")));
    }
    Ok(value)
}

fn round_6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// The GCJ-02 obfuscation is only applied inside mainland China.
pub fn out_of_china(point: Coordinate) -> bool {
    !(72.004..=137.8347).contains(&point.lng) || !(0.8293..=55.8271).contains(&point.lat)
}

/// Shifts a WGS-84 point into the GCJ-02 datum used by AMap.
pub fn wgs84_to_gcj02(point: Coordinate) -> Coordinate {
    if out_of_china(point) {
        return point;
    }
    let (d_lng, d_lat) = offset(point);
    Coordinate::new(point.lng + d_lng, point.lat + d_lat).rounded()
}

/// Converts an AMap (GCJ-02) point to WGS-84.
///
/// This is the usual single-step inverse: the forward offset at the input point
/// is subtracted, which is accurate to a couple of metres.
pub fn gcj02_to_wgs84(point: Coordinate) -> Coordinate {
    if out_of_china(point) {
        return point;
    }
    let (d_lng, d_lat) = offset(point);
    Coordinate::new(point.lng - d_lng, point.lat - d_lat).rounded()
}

fn offset(point: Coordinate) -> (f64, f64) {
    let x = point.lng - 105.0;
    let y = point.lat - 35.0;
    let rad_lat = point.lat / 180.0 * PI;
    let magic = 1.0 - ECCENTRICITY_SQUARED * rad_lat.sin().powi(2);
    let sqrt_magic = magic.sqrt();

    let d_lat = (transform_lat(x, y) * 180.0)
        / ((SEMI_MAJOR_AXIS * (1.0 - ECCENTRICITY_SQUARED)) / (magic * sqrt_magic) * PI);
    let d_lng = (transform_lng(x, y) * 180.0) / (SEMI_MAJOR_AXIS / sqrt_magic * rad_lat.cos() * PI);
    (d_lng, d_lat)
}

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lng(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}
