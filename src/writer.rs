use csv::{Terminator, WriterBuilder};
use fs_err::File;
use log::warn;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::amap::BusLine;
use super::coordinates::{Coordinate, gcj02_to_wgs84};
use super::error::Result;
use super::records::{
    POLYLINE_HEADERS, PolylineRecord, ROUTE_INFO_HEADERS, RouteInfoRecord, STOP_HEADERS,
    StopRecord, keyword_prefix, polyline_points,
};

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// The three tables written for a city.
#[derive(Clone, Debug)]
pub struct OutputPaths {
    pub stops: PathBuf,
    pub route_info: PathBuf,
    pub polyline: PathBuf,
}

impl OutputPaths {
    pub fn new(csv_dir: &Path, city: &str) -> Self {
        OutputPaths {
            stops: csv_dir.join(format!("{city}公交站点.csv")),
            route_info: csv_dir.join(format!("{city}公交线路信息.csv")),
            polyline: csv_dir.join(format!("{city}公交线路.csv")),
        }
    }
}

/// Row counts for what has been written.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WriteSummary {
    pub routes: usize,
    pub stops: usize,
    pub skipped_stops: usize,
    pub polyline_points: usize,
    pub skipped_points: usize,
}

impl WriteSummary {
    pub fn add(&mut self, other: &WriteSummary) {
        self.routes += other.routes;
        self.stops += other.stops;
        self.skipped_stops += other.skipped_stops;
        self.polyline_points += other.polyline_points;
        self.skipped_points += other.skipped_points;
    }
}

/// Creates (or truncates) a table and writes its BOM and header row.
pub fn create_table(path: &Path, headers: &[&str]) -> Result<csv::Writer<File>> {
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::CRLF)
        .from_writer(file);
    writer.write_record(headers)?;
    Ok(writer)
}

/// Writes the stop, route info and polyline tables for one city run and keeps
/// the running per-stop visit counter.
pub struct DatasetWriter {
    city: String,
    stops: csv::Writer<File>,
    route_info: csv::Writer<File>,
    polyline: csv::Writer<File>,
    frequencies: HashMap<String, u32>,
}

impl DatasetWriter {
    pub fn create(paths: &OutputPaths, city: &str) -> Result<Self> {
        Ok(DatasetWriter {
            city: city.to_string(),
            stops: create_table(&paths.stops, &STOP_HEADERS)?,
            route_info: create_table(&paths.route_info, &ROUTE_INFO_HEADERS)?,
            polyline: create_table(&paths.polyline, &POLYLINE_HEADERS)?,
            frequencies: HashMap::new(),
        })
    }

    /// Appends the rows for the bus lines returned for one keyword. A line's
    /// direction index is its 1-based position in `lines`.
    pub fn write_lines(&mut self, keyword: &str, lines: &[BusLine]) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        for (i, line) in lines.iter().enumerate() {
            let route_direction_index = (i + 1) as u32;
            self.write_stops(line, route_direction_index, &mut summary)?;

            let info =
                RouteInfoRecord::from_bus_line(&self.city, keyword, line, route_direction_index);
            self.route_info.serialize(info)?;
            summary.routes += 1;

            self.write_polyline(keyword, line, &mut summary)?;
        }
        Ok(summary)
    }

    fn write_stops(
        &mut self,
        line: &BusLine,
        route_direction_index: u32,
        summary: &mut WriteSummary,
    ) -> Result<()> {
        for stop in &line.busstops {
            let mut record =
                match StopRecord::from_bus_stop(&self.city, stop, line, route_direction_index) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Skipping stop {} ({}) on {}: {e}", stop.id, stop.name, line.name);
                        summary.skipped_stops += 1;
                        continue;
                    }
                };
            let frequency = self.frequencies.entry(stop.id.clone()).or_insert(0);
            *frequency += 1;
            record.visit_frequency = *frequency;
            self.stops.serialize(record)?;
            summary.stops += 1;
        }
        Ok(())
    }

    fn write_polyline(
        &mut self,
        keyword: &str,
        line: &BusLine,
        summary: &mut WriteSummary,
    ) -> Result<()> {
        let converted: Vec<(usize, Result<Coordinate>)> = polyline_points(&line.polyline)
            .into_par_iter()
            .map(|(position, point)| {
                (position, Coordinate::from_location(point).map(gcj02_to_wgs84))
            })
            .collect();

        let prefix = keyword_prefix(keyword);
        let mut sequence_index = 0;
        for (position, point) in converted {
            let point = match point {
                Ok(point) => point,
                Err(e) => {
                    warn!("Skipping polyline point {position} of {}: {e}", line.name);
                    summary.skipped_points += 1;
                    continue;
                }
            };
            sequence_index += 1;
            self.polyline.serialize(PolylineRecord {
                city: self.city.clone(),
                sequence_index,
                full_route_name: line.name.clone(),
                keyword_prefix: prefix.clone(),
                lng: point.lng,
                lat: point.lat,
            })?;
            summary.polyline_points += 1;
        }
        Ok(())
    }

    /// Current visit count for a stop id.
    pub fn frequency(&self, stop_id: &str) -> u32 {
        self.frequencies.get(stop_id).copied().unwrap_or(0)
    }

    /// Flushes all three tables and hands back the final visit counts.
    pub fn finish(mut self) -> Result<HashMap<String, u32>> {
        self.stops.flush()?;
        self.route_info.flush()?;
        self.polyline.flush()?;
        Ok(self.frequencies)
    }
}
