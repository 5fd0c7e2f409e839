use indicatif::ProgressIterator;
use log::{info, warn};
use serde::Serialize;

use super::aggregate::aggregate_stop_file;
use super::amap::RouteSource;
use super::config::Config;
use super::directory::RouteDirectory;
use super::error::{Error, Result};
use super::export::ExportSink;
use super::utils::{ensure_dir, progress_bar_for_count};
use super::writer::{DatasetWriter, OutputPaths, WriteSummary};

/// What a run produced.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub routes_enumerated: usize,
    pub routes_with_data: usize,
    pub routes_without_data: usize,
    pub routes_failed: usize,
    pub distinct_stop_ids: usize,
    pub aggregated_stops: usize,
    pub written: WriteSummary,
}

/// Crawls one city: enumerate its routes, fetch and write each in turn, then
/// aggregate the stop table and hand the tables to the export sink.
pub struct Orchestrator<'a> {
    config: &'a Config,
    directory: &'a dyn RouteDirectory,
    source: &'a dyn RouteSource,
    sink: &'a dyn ExportSink,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a Config,
        directory: &'a dyn RouteDirectory,
        source: &'a dyn RouteSource,
        sink: &'a dyn ExportSink,
    ) -> Self {
        Orchestrator {
            config,
            directory,
            source,
            sink,
        }
    }

    pub fn output_paths(&self) -> OutputPaths {
        OutputPaths::new(&self.config.csv_dir(), &self.config.city)
    }

    pub fn run(&self) -> Result<RunReport> {
        let city = self.config.city.as_str();
        let province = self.config.province.as_str();
        let mut report = RunReport::default();

        // Previous output is only truncated once there is something to replace it with
        let routes = self.directory.routes(city)?;
        report.routes_enumerated = routes.len();
        info!("【正在获取{city}公交线路数据】 {} routes", routes.len());

        ensure_dir(&self.config.csv_dir())?;
        let paths = self.output_paths();
        let mut writer = DatasetWriter::create(&paths, city)?;

        let progress = progress_bar_for_count(routes.len());
        for route in routes.iter().progress_with(progress.clone()) {
            progress.set_message(route.name.clone());
            let lines = match self.source.fetch(city, &route.name) {
                Ok(lines) => lines,
                Err(e @ (Error::Request(_) | Error::Parse(_))) => {
                    warn!("Skipping {}: {e}", route.name);
                    report.routes_failed += 1;
                    continue;
                }
                Err(Error::NoData { .. }) => Vec::new(),
                Err(e) => return Err(e),
            };
            if lines.is_empty() {
                report.routes_without_data += 1;
                continue;
            }
            report.routes_with_data += 1;
            let summary = writer.write_lines(&route.name, &lines)?;
            report.written.add(&summary);
        }
        progress.finish_with_message("done");

        let frequencies = writer.finish()?;
        report.distinct_stop_ids = frequencies.len();
        report.aggregated_stops = aggregate_stop_file(&paths.stops)?;

        self.sink.export(&paths, city, province)?;
        info!(
            "Finished {city}: {} of {} routes had data, {} bus lines, {} stops",
            report.routes_with_data,
            report.routes_enumerated,
            report.written.routes,
            report.aggregated_stops
        );
        Ok(report)
    }
}
