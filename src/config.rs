use fs_err::read_to_string;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "https://restapi.amap.com/v3/bus/linename";

/// Everything one crawl of one city needs.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub city: String,
    pub province: String,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default = "default_true")]
    pub export_geojson: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoint: String,
    /// Web service key
    pub key: String,
    /// Security code paired with the key
    pub jscode: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            key: String::new(),
            jscode: String::new(),
            timeout_secs: 20,
            retries: 3,
            retry_delay_ms: 500,
        }
    }
}

/// Where the list of a city's route names comes from.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Service returning a JSON list of `{"name": ...}` objects
    pub url: Option<String>,
    /// Query parameter the city is passed in
    pub city_param: Option<String>,
    /// Local JSON file with the same shape, takes precedence over `url`
    pub file: Option<PathBuf>,
}

fn default_output_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads the configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = read_to_string(path)?;
        Ok(toml::from_str(&file)?)
    }

    /// A config with defaults for everything but the city and province.
    pub fn new(city: &str, province: &str) -> Self {
        Config {
            city: city.to_string(),
            province: province.to_string(),
            output_root: default_output_root(),
            api: ApiConfig::default(),
            directory: DirectoryConfig::default(),
            export_geojson: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.city.trim().is_empty() {
            return Err(Error::Config("city must not be empty".to_string()));
        }
        if self.province.trim().is_empty() {
            return Err(Error::Config("province must not be empty".to_string()));
        }
        if self.api.key.trim().is_empty() {
            return Err(Error::Config(
                "an AMap web service key is required (--key or AMAP_KEY)".to_string(),
            ));
        }
        if self.directory.url.is_none() && self.directory.file.is_none() {
            return Err(Error::Config(
                "a route directory url or file is required".to_string(),
            ));
        }
        Ok(())
    }

    /// `<output_root>/<province>/csv`
    pub fn csv_dir(&self) -> PathBuf {
        self.output_root.join(&self.province).join("csv")
    }

    /// `<output_root>/<province>/geojson`
    pub fn geojson_dir(&self) -> PathBuf {
        self.output_root.join(&self.province).join("geojson")
    }
}
