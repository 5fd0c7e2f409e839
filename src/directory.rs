use fs_err::read_to_string;
use log::info;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::config::DirectoryConfig;
use super::error::{Error, Result};

/// A named bus route of a city. Other fields of the directory entry are ignored.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RouteDescriptor {
    pub name: String,
}

/// Lists the bus routes known for a city.
pub trait RouteDirectory {
    fn routes(&self, city: &str) -> Result<Vec<RouteDescriptor>>;
}

/// Either a bare list or the list wrapped in an object under `lines`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DirectoryBody {
    List(Vec<RouteDescriptor>),
    Wrapped { lines: Vec<RouteDescriptor> },
}

fn parse_directory(body: &str, source: &str) -> Result<Vec<RouteDescriptor>> {
    let body: DirectoryBody = serde_json::from_str(body).map_err(|e| {
        Error::Request(format!("unexpected route directory body from {source}: {e}"))
    })?;
    let routes = match body {
        DirectoryBody::List(routes) | DirectoryBody::Wrapped { lines: routes } => routes,
    };
    if routes.is_empty() {
        return Err(Error::Request(format!("route directory {source} returned no routes")));
    }
    Ok(routes)
}

const CITY_PLACEHOLDER: &str = "{city}";

/// Fetches the route list over HTTP. A `{city}` placeholder in the URL is
/// replaced with the percent-encoded city; without one the city is sent as a
/// query parameter.
pub struct HttpRouteDirectory {
    client: Client,
    url: String,
    city_param: String,
}

impl HttpRouteDirectory {
    pub fn new(url: &str, city_param: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(HttpRouteDirectory {
            client,
            url: url.to_string(),
            city_param: city_param.to_string(),
        })
    }
}

impl HttpRouteDirectory {
    fn request(&self, city: &str) -> RequestBuilder {
        if self.url.contains(CITY_PLACEHOLDER) {
            let url = self.url.replace(CITY_PLACEHOLDER, &urlencoding::encode(city));
            self.client.get(url)
        } else {
            self.client.get(&self.url).query(&[(self.city_param.as_str(), city)])
        }
    }
}

impl RouteDirectory for HttpRouteDirectory {
    fn routes(&self, city: &str) -> Result<Vec<RouteDescriptor>> {
        info!("Requesting route list for {city} from {}", self.url);
        let response = self.request(city).send()?;
        if !response.status().is_success() {
            return Err(Error::Request(format!(
                "route directory returned {}",
                response.status()
            )));
        }
        parse_directory(&response.text()?, &self.url)
    }
}

/// Reads the route list from a local JSON file; the city argument is ignored.
pub struct FileRouteDirectory {
    path: PathBuf,
}

impl FileRouteDirectory {
    pub fn new(path: PathBuf) -> Self {
        FileRouteDirectory { path }
    }
}

impl RouteDirectory for FileRouteDirectory {
    fn routes(&self, city: &str) -> Result<Vec<RouteDescriptor>> {
        info!("Reading route list for {city} from {}", self.path.display());
        let body = read_to_string(&self.path)?;
        parse_directory(&body, &self.path.display().to_string())
    }
}

/// Builds the directory named by the config, preferring a local file.
pub fn from_config(
    config: &DirectoryConfig,
    timeout: Duration,
) -> Result<Box<dyn RouteDirectory>> {
    match (&config.file, &config.url) {
        (Some(path), _) => Ok(Box::new(FileRouteDirectory::new(path.clone()))),
        (None, Some(url)) => {
            let city_param = config.city_param.as_deref().unwrap_or("city");
            Ok(Box::new(HttpRouteDirectory::new(url, city_param, timeout)?))
        }
        (None, None) => Err(Error::Config(
            "a route directory url or file is required".to_string(),
        )),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serves one canned `(status, body)` response per connection on a local
    /// port and hands back the request lines it saw once all were served.
    pub(crate) fn serve_responses(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut request_lines = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let request = String::from_utf8_lossy(&request).to_string();
                request_lines.push(request.lines().next().unwrap_or_default().to_string());
                write!(
                    stream,
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                )
                .unwrap();
            }
            request_lines
        });
        (base_url, handle)
    }

    #[test]
    fn test_parses_list_and_wrapped_bodies() {
        let list =
            parse_directory(r#"[{"name": "1路", "id": 7}, {"name": "2路"}]"#, "test").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "1路");

        let wrapped = parse_directory(r#"{"lines": [{"name": "3路"}]}"#, "test").unwrap();
        assert_eq!(wrapped, vec![RouteDescriptor { name: "3路".to_string() }]);
    }

    #[test]
    fn test_unexpected_or_empty_body_is_request_error() {
        for body in [r#"{"status": "0"}"#, "[]", "<html></html>", r#"[{"title": "1路"}]"#] {
            assert!(
                matches!(parse_directory(body, "test"), Err(Error::Request(_))),
                "{body} should be rejected"
            );
        }
    }

    #[test]
    fn test_file_directory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "11路"}}, {{"name": "12路"}}]"#).unwrap();
        let directory = FileRouteDirectory::new(file.path().to_path_buf());
        let routes = directory.routes("哈尔滨").unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].name, "12路");
    }

    #[test]
    fn test_city_placeholder_is_substituted_into_the_path() {
        let (base_url, server) = serve_responses(vec![(200, r#"[{"name": "1路"}]"#)]);
        let url = format!("{base_url}/lines/{{city}}.json");
        let directory = HttpRouteDirectory::new(&url, "city", Duration::from_secs(5)).unwrap();
        let routes = directory.routes("哈尔滨").unwrap();
        assert_eq!(routes[0].name, "1路");
        assert_eq!(
            server.join().unwrap(),
            vec!["GET /lines/%E5%93%88%E5%B0%94%E6%BB%A8.json HTTP/1.1"]
        );
    }

    #[test]
    fn test_url_without_placeholder_sends_city_as_query() {
        let body = r#"{"lines": [{"name": "2路"}]}"#;
        let (base_url, server) = serve_responses(vec![(200, body)]);
        let url = format!("{base_url}/lines");
        let directory =
            HttpRouteDirectory::new(&url, "cityname", Duration::from_secs(5)).unwrap();
        assert_eq!(directory.routes("哈尔滨").unwrap().len(), 1);
        assert_eq!(
            server.join().unwrap(),
            vec!["GET /lines?cityname=%E5%93%88%E5%B0%94%E6%BB%A8 HTTP/1.1"]
        );
    }

    #[test]
    fn test_non_success_status_is_request_error() {
        let (base_url, server) = serve_responses(vec![(503, "{}")]);
        let directory =
            HttpRouteDirectory::new(&base_url, "city", Duration::from_secs(5)).unwrap();
        assert!(matches!(directory.routes("哈尔滨"), Err(Error::Request(_))));
        server.join().unwrap();
    }
}
