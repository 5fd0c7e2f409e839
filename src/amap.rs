use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::thread;
use std::time::Duration;

use super::config::ApiConfig;
use super::error::{Error, Result};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/75.0.3770.80 Safari/537.36";

/// Anything that can look up bus lines by keyword for a city.
pub trait RouteSource {
    /// Returns the bus lines matching `keyword`, or an empty list when the
    /// provider has no data for it.
    fn fetch(&self, city: &str, keyword: &str) -> Result<Vec<BusLine>>;
}

/// Top level body of the `bus/linename` endpoint.
#[derive(Debug, Deserialize)]
pub struct BusLineResponse {
    pub status: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub buslines: Vec<BusLine>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BusLine {
    #[serde(deserialize_with = "amap_string")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "amap_string")]
    pub line_type: String,
    #[serde(default, deserialize_with = "amap_string")]
    pub polyline: String,
    #[serde(default, deserialize_with = "amap_string")]
    pub start_stop: String,
    #[serde(default, deserialize_with = "amap_string")]
    pub end_stop: String,
    #[serde(default, deserialize_with = "amap_string")]
    pub start_time: String,
    #[serde(default, deserialize_with = "amap_string")]
    pub end_time: String,
    #[serde(default, deserialize_with = "amap_string")]
    pub distance: String,
    #[serde(default, deserialize_with = "amap_string")]
    pub basic_price: String,
    #[serde(default, deserialize_with = "amap_string")]
    pub total_price: String,
    #[serde(default)]
    pub busstops: Vec<BusStop>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BusStop {
    #[serde(deserialize_with = "amap_string")]
    pub id: String,
    #[serde(deserialize_with = "amap_string")]
    pub name: String,
    #[serde(deserialize_with = "amap_string")]
    pub location: String,
}

/// AMap sends empty fields as `[]` and some numeric fields as bare numbers.
fn amap_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Null => String::new(),
        other => return Err(D::Error::custom(format!("expected a string, found {other}"))),
    })
}

impl BusLineResponse {
    /// Parses a raw response body, mapping a non-"1" status to `Error::NoData`.
    pub fn into_lines(body: &str, city: &str, keyword: &str) -> Result<Vec<BusLine>> {
        let response: BusLineResponse = serde_json::from_str(body).map_err(|e| {
            Error::Parse(format!("unexpected bus line payload for {keyword}: {e}"))
        })?;
        if response.status != "1" {
            debug!(
                "status {} ({}) for {keyword}",
                response.status,
                response.info.as_deref().unwrap_or("no info")
            );
            return Err(Error::NoData {
                city: city.to_string(),
                keyword: keyword.to_string(),
            });
        }
        Ok(response.buslines)
    }
}

/// Blocking client for the AMap bus-route-by-name endpoint.
pub struct AmapClient {
    client: Client,
    endpoint: String,
    key: String,
    jscode: String,
    retries: u32,
    retry_delay: Duration,
}

impl AmapClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(|e| Error::Request(format!("failed to create HTTP client: {e}")))?;

        Ok(AmapClient {
            client,
            endpoint: api.endpoint.clone(),
            key: api.key.clone(),
            jscode: api.jscode.clone(),
            retries: api.retries.max(1),
            retry_delay: Duration::from_millis(api.retry_delay_ms),
        })
    }

    fn get(&self, city: &str, keyword: &str) -> Result<String> {
        let query = [
            ("s", "rsv3"),
            ("extensions", "all"),
            ("key", self.key.as_str()),
            ("jscode", self.jscode.as_str()),
            ("output", "json"),
            ("city", city),
            ("offset", "2"),
            ("keywords", keyword),
            ("platform", "JS"),
        ];
        let response = self.client.get(&self.endpoint).query(&query).send()?;
        if !response.status().is_success() {
            return Err(Error::Request(format!(
                "API returned {} for {keyword}",
                response.status()
            )));
        }
        Ok(response.text()?)
    }
}

impl RouteSource for AmapClient {
    fn fetch(&self, city: &str, keyword: &str) -> Result<Vec<BusLine>> {
        let mut attempt = 1;
        let body = loop {
            match self.get(city, keyword) {
                Ok(body) => break body,
                Err(e) if attempt < self.retries => {
                    warn!("attempt {attempt}/{} for {keyword} failed: {e}", self.retries);
                    thread::sleep(self.retry_delay * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        match BusLineResponse::into_lines(&body, city, keyword) {
            Err(e @ Error::NoData { .. }) => {
                warn!("{e}");
                Ok(Vec::new())
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::tests::serve_responses;

    fn client_for(endpoint: &str, retries: u32) -> AmapClient {
        AmapClient::new(&ApiConfig {
            endpoint: endpoint.to_string(),
            key: "test-key".to_string(),
            jscode: "test-jscode".to_string(),
            timeout_secs: 5,
            retries,
            retry_delay_ms: 0,
        })
        .unwrap()
    }

    const PAYLOAD: &str = r#"{
        "status": "1",
        "info": "OK",
        "count": "1",
        "buslines": [{
            "id": "230100011035",
            "type": "普通公交",
            "name": "1路(哈尔滨站--东大直街)",
            "polyline": "126.63,45.76;126.64,45.77",
            "start_stop": "哈尔滨站",
            "end_stop": "东大直街",
            "start_time": "0530",
            "end_time": "2100",
            "distance": "12.5",
            "basic_price": "1.0",
            "total_price": [],
            "busstops": [
                {"id": "BV1", "location": "126.63,45.76", "name": "哈尔滨站", "sequence": "1"},
                {"id": "BV2", "location": "126.64,45.77", "name": "东大直街", "sequence": "2"}
            ]
        }]
    }"#;

    #[test]
    fn test_parses_bus_lines() {
        let lines = BusLineResponse::into_lines(PAYLOAD, "哈尔滨", "1路").unwrap();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.line_type, "普通公交");
        assert_eq!(line.basic_price, "1.0");
        assert_eq!(line.total_price, "");
        assert_eq!(line.busstops.len(), 2);
        assert_eq!(line.busstops[1].id, "BV2");
    }

    #[test]
    fn test_numeric_fields_become_strings() {
        let body = r#"{"status":"1","buslines":[{"name":"2路","distance":7.25,"busstops":[]}]}"#;
        let lines = BusLineResponse::into_lines(body, "哈尔滨", "2路").unwrap();
        assert_eq!(lines[0].distance, "7.25");
        assert_eq!(lines[0].polyline, "");
    }

    #[test]
    fn test_non_success_status_is_no_data() {
        let body = r#"{"status":"0","info":"INVALID_USER_KEY","buslines":[]}"#;
        let result = BusLineResponse::into_lines(body, "哈尔滨", "3路");
        assert!(matches!(result, Err(Error::NoData { .. })));
    }

    #[test]
    fn test_shape_mismatch_is_parse_error() {
        let body = r#"{"status":"1","buslines":[{"busstops":[]}]}"#;
        let result = BusLineResponse::into_lines(body, "哈尔滨", "4路");
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_object_in_string_field_is_parse_error() {
        let body = r#"{"status":"1","buslines":[{"name":{"zh":"5路"},"busstops":[]}]}"#;
        let result = BusLineResponse::into_lines(body, "哈尔滨", "5路");
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_fetch_sends_query_and_parses_lines() {
        let (endpoint, server) = serve_responses(vec![(200, PAYLOAD)]);
        let lines = client_for(&endpoint, 3).fetch("哈尔滨", "1路").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].busstops.len(), 2);

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("GET /?s=rsv3&extensions=all&key=test-key"));
        assert!(requests[0].contains("&keywords=1%E8%B7%AF&platform=JS"));
    }

    #[test]
    fn test_fetch_maps_failure_status_to_empty_result() {
        let body = r#"{"status":"0","info":"INVALID_USER_KEY","buslines":[]}"#;
        let (endpoint, server) = serve_responses(vec![(200, body)]);
        let lines = client_for(&endpoint, 3).fetch("哈尔滨", "3路").unwrap();
        assert!(lines.is_empty());
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn test_fetch_retries_after_server_error() {
        let (endpoint, server) = serve_responses(vec![(500, "{}"), (200, PAYLOAD)]);
        let lines = client_for(&endpoint, 3).fetch("哈尔滨", "1路").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_fetch_gives_up_after_last_attempt() {
        let (endpoint, server) = serve_responses(vec![(503, "{}"), (503, "{}")]);
        let result = client_for(&endpoint, 2).fetch("哈尔滨", "1路");
        assert!(matches!(result, Err(Error::Request(_))));
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn test_fetch_does_not_retry_a_malformed_body() {
        let (endpoint, server) = serve_responses(vec![(200, "<html></html>")]);
        let result = client_for(&endpoint, 3).fetch("哈尔滨", "1路");
        assert!(matches!(result, Err(Error::Parse(_))));
        assert_eq!(server.join().unwrap().len(), 1);
    }
}
