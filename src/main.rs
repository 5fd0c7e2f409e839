use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use bus_data::config::Config;
use bus_data::export::{ExportSink, GeoJsonExport, NoExport};
use bus_data::orchestrator::Orchestrator;
use bus_data::{amap, directory};

/// Crawls the bus routes, stops and route paths of one city from AMap into CSV.
#[derive(Parser)]
struct Args {
    /// TOML configuration; flags below override its values
    #[clap(long, default_value = "config/bus_data.toml")]
    config: PathBuf,
    /// City name without the 市/县 suffix, e.g. 哈尔滨
    #[clap(long)]
    city: Option<String>,
    #[clap(long)]
    province: Option<String>,
    #[clap(long)]
    output_root: Option<PathBuf>,
    /// AMap web service key
    #[clap(long, env = "AMAP_KEY", hide_env_values = true)]
    key: Option<String>,
    /// Security code paired with the key
    #[clap(long, env = "AMAP_JSCODE", hide_env_values = true)]
    jscode: Option<String>,
    #[clap(long)]
    directory_url: Option<String>,
    #[clap(long)]
    directory_file: Option<PathBuf>,
    /// Skip the GeoJSON export after the crawl
    #[clap(long)]
    no_export: bool,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = if self.config.is_file() {
            Config::from_file(&self.config)
                .with_context(|| format!("reading {}", self.config.display()))?
        } else {
            let city = self.city.clone().context("--city is required without a config file")?;
            let province = self
                .province
                .clone()
                .context("--province is required without a config file")?;
            Config::new(&city, &province)
        };

        if let Some(city) = self.city {
            config.city = city;
        }
        if let Some(province) = self.province {
            config.province = province;
        }
        if let Some(output_root) = self.output_root {
            config.output_root = output_root;
        }
        if let Some(key) = self.key {
            config.api.key = key;
        }
        if let Some(jscode) = self.jscode {
            config.api.jscode = jscode;
        }
        if let Some(url) = self.directory_url {
            config.directory.url = Some(url);
        }
        if let Some(file) = self.directory_file {
            config.directory.file = Some(file);
        }
        if self.no_export {
            config.export_geojson = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = Args::parse().into_config()?;

    let timeout = Duration::from_secs(config.api.timeout_secs);
    let directory = directory::from_config(&config.directory, timeout)?;
    let source = amap::AmapClient::new(&config.api)?;
    let sink: Box<dyn ExportSink> = if config.export_geojson {
        Box::new(GeoJsonExport::new(config.geojson_dir()))
    } else {
        Box::new(NoExport)
    };

    let report = Orchestrator::new(&config, directory.as_ref(), &source, sink.as_ref())
        .run()
        .with_context(|| format!("crawling {} {}", config.province, config.city))?;
    log::info!("{}", serde_json::to_string(&report)?);

    Ok(())
}
