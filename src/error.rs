use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while crawling and writing a city's bus data.
#[derive(Error, Debug)]
pub enum Error {
    /// Network or API level failure while enumerating or fetching routes
    #[error("request failed: {0}")]
    Request(String),
    /// Malformed coordinate, polyline segment or payload shape
    #[error("parse error: {0}")]
    Parse(String),
    /// The API answered with a non-success status for a keyword
    #[error("no data found for city {city} keyword {keyword}")]
    NoData { city: String, keyword: String },
    /// Missing or invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
