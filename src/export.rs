use csv::ReaderBuilder;
use log::info;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::aggregate::read_stop_file;
use super::error::Result;
use super::records::{PolylineRecord, RouteInfoRecord};
use super::utils::{ensure_dir, write_json_file};
use super::writer::OutputPaths;

/// Receives the finished tables once a run is complete.
pub trait ExportSink {
    fn export(&self, paths: &OutputPaths, city: &str, province: &str) -> Result<()>;
}

/// Leaves the CSV tables as the only output.
pub struct NoExport;

impl ExportSink for NoExport {
    fn export(&self, _paths: &OutputPaths, _city: &str, _province: &str) -> Result<()> {
        Ok(())
    }
}

/// Writes the aggregated stops and the route paths as GeoJSON next to the CSVs.
pub struct GeoJsonExport {
    output_dir: PathBuf,
}

impl GeoJsonExport {
    pub fn new(output_dir: PathBuf) -> Self {
        GeoJsonExport { output_dir }
    }
}

#[derive(Debug, Serialize)]
struct FeatureCollection<P> {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature<P>>,
}

impl<P> FeatureCollection<P> {
    fn new(features: Vec<Feature<P>>) -> Self {
        FeatureCollection {
            kind: "FeatureCollection",
            features,
        }
    }
}

#[derive(Debug, Serialize)]
struct Feature<P> {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: Geometry,
    properties: P,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
enum Geometry {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
}

#[derive(Debug, Serialize)]
struct StopProperties {
    city: String,
    name: String,
    routes: String,
    direction: u32,
    frequency: u32,
}

#[derive(Debug, Serialize)]
struct LineProperties {
    city: String,
    name: String,
    keyword_prefix: String,
    #[serde(flatten)]
    info: Option<LineInfo>,
}

#[derive(Debug, Serialize)]
struct LineInfo {
    route_type: String,
    start_stop: String,
    end_stop: String,
    first_departure: String,
    last_departure: String,
    boarding_price: String,
    full_price: String,
    distance: String,
}

impl From<&RouteInfoRecord> for LineInfo {
    fn from(record: &RouteInfoRecord) -> Self {
        LineInfo {
            route_type: record.route_type.clone(),
            start_stop: record.start_stop_name.clone(),
            end_stop: record.end_stop_name.clone(),
            first_departure: record.first_departure_time.clone(),
            last_departure: record.last_departure_time.clone(),
            boarding_price: record.boarding_price.clone(),
            full_price: record.full_price.clone(),
            distance: record.distance.clone(),
        }
    }
}

fn read_table<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.deserialize(None)?);
    }
    Ok(rows)
}

fn stop_features(paths: &OutputPaths, city: &str) -> Result<Vec<Feature<StopProperties>>> {
    Ok(read_stop_file(&paths.stops)?
        .into_iter()
        .map(|stop| Feature {
            kind: "Feature",
            geometry: Geometry::Point([stop.lng, stop.lat]),
            properties: StopProperties {
                city: city.to_string(),
                name: stop.stop_name,
                routes: stop.route_names,
                direction: stop.route_direction_index,
                frequency: stop.visit_frequency,
            },
        })
        .collect())
}

/// A new line starts whenever the route name changes or the sequence restarts,
/// so a line fetched under two keywords becomes two features. A line with a
/// single point is exported as a Point, since a LineString needs two.
fn line_features(paths: &OutputPaths) -> Result<Vec<Feature<LineProperties>>> {
    let info: Vec<RouteInfoRecord> = read_table(&paths.route_info)?;
    let mut info_by_name: HashMap<&str, &RouteInfoRecord> = HashMap::new();
    for record in &info {
        info_by_name.entry(record.full_route_name.as_str()).or_insert(record);
    }

    let points: Vec<PolylineRecord> = read_table(&paths.polyline)?;
    let mut features: Vec<Feature<LineProperties>> = Vec::new();
    let mut last_index = 0;
    for point in points {
        let continues = features.last().is_some_and(|f| {
            f.properties.name == point.full_route_name && point.sequence_index > last_index
        });
        last_index = point.sequence_index;
        if continues {
            if let Some(Feature {
                geometry: Geometry::LineString(coords),
                ..
            }) = features.last_mut()
            {
                coords.push([point.lng, point.lat]);
            }
            continue;
        }
        let info = info_by_name.get(point.full_route_name.as_str());
        features.push(Feature {
            kind: "Feature",
            geometry: Geometry::LineString(vec![[point.lng, point.lat]]),
            properties: LineProperties {
                info: info.map(|r| LineInfo::from(*r)),
                city: point.city,
                name: point.full_route_name,
                keyword_prefix: point.keyword_prefix,
            },
        });
    }

    for feature in &mut features {
        let single = match &feature.geometry {
            Geometry::LineString(coords) if coords.len() == 1 => Some(coords[0]),
            _ => None,
        };
        if let Some(point) = single {
            feature.geometry = Geometry::Point(point);
        }
    }
    Ok(features)
}

impl GeoJsonExport {
    pub fn stops_path(&self, city: &str) -> PathBuf {
        self.output_dir.join(format!("{city}公交站点.geojson"))
    }

    pub fn lines_path(&self, city: &str) -> PathBuf {
        self.output_dir.join(format!("{city}公交线路.geojson"))
    }
}

impl ExportSink for GeoJsonExport {
    fn export(&self, paths: &OutputPaths, city: &str, province: &str) -> Result<()> {
        info!("Exporting GeoJSON for {province} {city}");
        ensure_dir(&self.output_dir)?;
        let stops = FeatureCollection::new(stop_features(paths, city)?);
        write_json_file(&self.stops_path(city), &stops)?;
        let lines = FeatureCollection::new(line_features(paths)?);
        write_json_file(&self.lines_path(city), &lines)?;
        Ok(())
    }
}
