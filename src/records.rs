use serde::{Deserialize, Serialize};

use super::amap::{BusLine, BusStop};
use super::coordinates::{Coordinate, gcj02_to_wgs84};
use super::error::Result;

pub const STOP_HEADERS: [&str; 8] = [
    "城市", "站点名称", "lng", "lat", "id", "线路名称", "正反线路", "线路频次",
];

pub const AGGREGATED_STOP_HEADERS: [&str; 6] =
    ["站点名称", "lng", "lat", "正反线路", "线路名称", "线路频次"];

pub const ROUTE_INFO_HEADERS: [&str; 12] = [
    "城市", "正反线路", "简称", "全称", "上车票价", "全程票价",
    "距离", "起点站", "终点站", "线路类型", "首班时间", "末班时间",
];

pub const POLYLINE_HEADERS: [&str; 6] = ["城市", "序号", "全称", "简称", "lng", "lat"];

/// One visit of a route to a stop. Columns follow `STOP_HEADERS`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StopRecord {
    pub city: String,
    pub stop_name: String,
    pub lng: f64,
    pub lat: f64,
    pub stop_id: String,
    pub route_name: String,
    pub route_direction_index: u32,
    pub visit_frequency: u32,
}

impl StopRecord {
    /// Builds the record for `stop`, converting its location to WGS-84.
    /// The frequency is left at zero for the writer to fill in.
    pub fn from_bus_stop(
        city: &str,
        stop: &BusStop,
        line: &BusLine,
        route_direction_index: u32,
    ) -> Result<Self> {
        let point = gcj02_to_wgs84(Coordinate::from_location(&stop.location)?);
        Ok(StopRecord {
            city: city.to_string(),
            stop_name: stop.name.clone(),
            lng: point.lng,
            lat: point.lat,
            stop_id: stop.id.clone(),
            route_name: line.name.clone(),
            route_direction_index,
            visit_frequency: 0,
        })
    }
}

/// One row per distinct stop name after aggregation. Columns follow
/// `AGGREGATED_STOP_HEADERS`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AggregatedStop {
    pub stop_name: String,
    pub lng: f64,
    pub lat: f64,
    pub route_direction_index: u32,
    pub route_names: String,
    pub visit_frequency: u32,
}

impl From<StopRecord> for AggregatedStop {
    fn from(record: StopRecord) -> Self {
        AggregatedStop {
            stop_name: record.stop_name,
            lng: record.lng,
            lat: record.lat,
            route_direction_index: record.route_direction_index,
            route_names: record.route_name,
            visit_frequency: record.visit_frequency,
        }
    }
}

/// Metadata of one bus line. Columns follow `ROUTE_INFO_HEADERS`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RouteInfoRecord {
    pub city: String,
    pub route_direction_index: u32,
    pub keyword_prefix: String,
    pub full_route_name: String,
    pub boarding_price: String,
    pub full_price: String,
    pub distance: String,
    pub start_stop_name: String,
    pub end_stop_name: String,
    pub route_type: String,
    pub first_departure_time: String,
    pub last_departure_time: String,
}

impl RouteInfoRecord {
    pub fn from_bus_line(
        city: &str,
        keyword: &str,
        line: &BusLine,
        route_direction_index: u32,
    ) -> Self {
        RouteInfoRecord {
            city: city.to_string(),
            route_direction_index,
            keyword_prefix: keyword_prefix(keyword),
            full_route_name: line.name.clone(),
            boarding_price: line.basic_price.clone(),
            full_price: line.total_price.clone(),
            distance: line.distance.clone(),
            start_stop_name: line.start_stop.clone(),
            end_stop_name: line.end_stop.clone(),
            route_type: line.line_type.clone(),
            first_departure_time: line.start_time.clone(),
            last_departure_time: line.end_time.clone(),
        }
    }
}

/// One point along a route's path. Columns follow `POLYLINE_HEADERS`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PolylineRecord {
    pub city: String,
    pub sequence_index: u32,
    pub full_route_name: String,
    pub keyword_prefix: String,
    pub lng: f64,
    pub lat: f64,
}

/// The first four characters of a search keyword.
pub fn keyword_prefix(keyword: &str) -> String {
    keyword.chars().take(4).collect()
}

/// Splits an AMap polyline (`"lng,lat;lng,lat;..."`) into its points, keeping
/// each point's 1-based position so malformed ones can be reported.
pub fn polyline_points(polyline: &str) -> Vec<(usize, &str)> {
    if polyline.trim().is_empty() {
        return Vec::new();
    }
    polyline.split(';').enumerate().map(|(i, point)| (i + 1, point)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_prefix_counts_characters() {
        assert_eq!(keyword_prefix("1路"), "1路");
        assert_eq!(keyword_prefix("机场大巴1线"), "机场大巴");
        assert_eq!(keyword_prefix("K101"), "K101");
    }

    #[test]
    fn test_polyline_points() {
        let points = polyline_points("126.1,45.1;126.2,45.2;126.3,45.3");
        assert_eq!(points, vec![(1, "126.1,45.1"), (2, "126.2,45.2"), (3, "126.3,45.3")]);
        assert!(polyline_points("").is_empty());
    }

    #[test]
    fn test_headers_match_record_widths() {
        assert_eq!(STOP_HEADERS.len(), 8);
        assert_eq!(ROUTE_INFO_HEADERS.len(), 12);
        assert_eq!(POLYLINE_HEADERS.len(), 6);
        assert_eq!(AGGREGATED_STOP_HEADERS.len(), 6);
    }
}
