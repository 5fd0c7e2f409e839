use csv::ReaderBuilder;
use log::info;
use std::collections::BTreeMap;
use std::path::Path;

use super::error::{Error, Result};
use super::records::{AGGREGATED_STOP_HEADERS, AggregatedStop, STOP_HEADERS, StopRecord};
use super::writer::create_table;

/// Collapses stop rows to one row per stop name, sorted by name.
///
/// The first row seen for a name supplies its coordinates and direction index,
/// route names are joined with ", " in the order seen and frequencies summed.
/// Rows are grouped by name, not id, so distinct stops sharing a name merge.
pub fn aggregate<I>(rows: I) -> Vec<AggregatedStop>
where
    I: IntoIterator<Item = AggregatedStop>,
{
    let mut groups: BTreeMap<String, AggregatedStop> = BTreeMap::new();
    for row in rows {
        match groups.get_mut(&row.stop_name) {
            Some(group) => {
                group.route_names.push_str(", ");
                group.route_names.push_str(&row.route_names);
                group.visit_frequency += row.visit_frequency;
            }
            None => {
                groups.insert(row.stop_name.clone(), row);
            }
        }
    }
    groups.into_values().collect()
}

/// Reads a stop table, either as written by the crawl or already aggregated.
pub fn read_stop_file(path: &Path) -> Result<Vec<AggregatedStop>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let width = reader.headers()?.len();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // Deserialize by position so a BOM on the first header can't matter
        let row: AggregatedStop = if width == STOP_HEADERS.len() {
            record.deserialize::<StopRecord>(None)?.into()
        } else if width == AGGREGATED_STOP_HEADERS.len() {
            record.deserialize::<AggregatedStop>(None)?
        } else {
            return Err(Error::Parse(format!(
                "{} has {width} columns, expected {} or {}",
                path.display(),
                STOP_HEADERS.len(),
                AGGREGATED_STOP_HEADERS.len()
            )));
        };
        rows.push(row);
    }
    Ok(rows)
}

/// Rewrites the stop table in place with one row per stop name and returns
/// the number of rows written.
pub fn aggregate_stop_file(path: &Path) -> Result<usize> {
    let rows = read_stop_file(path)?;
    let before = rows.len();
    let aggregated = aggregate(rows);

    let mut writer = create_table(path, &AGGREGATED_STOP_HEADERS)?;
    for stop in &aggregated {
        writer.serialize(stop)?;
    }
    writer.flush()?;

    info!(
        "Aggregated {before} stop rows into {} stops in {}",
        aggregated.len(),
        path.display()
    );
    Ok(aggregated.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(name: &str, lng: f64, route: &str, direction: u32, frequency: u32) -> StopRecord {
        StopRecord {
            city: "哈尔滨".to_string(),
            stop_name: name.to_string(),
            lng,
            lat: 45.75,
            stop_id: format!("id-{name}-{route}"),
            route_name: route.to_string(),
            route_direction_index: direction,
            visit_frequency: frequency,
        }
    }

    fn write_stop_file(path: &Path, rows: &[StopRecord]) {
        let mut writer = create_table(path, &STOP_HEADERS).unwrap();
        for row in rows {
            writer.serialize(row).unwrap();
        }
        writer.flush().unwrap();
    }

    #[test]
    fn test_groups_by_name_keeping_first_values() {
        let rows = vec![
            stop("秋林", 126.65, "1路", 1, 1),
            stop("博物馆", 126.64, "1路", 1, 1),
            stop("秋林", 126.66, "2路", 2, 2),
            stop("秋林", 126.67, "3路", 1, 1),
        ];
        let aggregated = aggregate(rows.into_iter().map(AggregatedStop::from));
        assert_eq!(aggregated.len(), 2);

        let qiulin = aggregated.iter().find(|s| s.stop_name == "秋林").unwrap();
        assert_eq!(qiulin.lng, 126.65);
        assert_eq!(qiulin.route_direction_index, 1);
        assert_eq!(qiulin.route_names, "1路, 2路, 3路");
        assert_eq!(qiulin.visit_frequency, 4);
    }

    #[test]
    fn test_output_is_sorted_by_name() {
        let rows = vec![
            stop("c", 126.1, "1路", 1, 1),
            stop("a", 126.2, "1路", 1, 1),
            stop("b", 126.3, "1路", 1, 1),
        ];
        let names: Vec<String> = aggregate(rows.into_iter().map(AggregatedStop::from))
            .into_iter()
            .map(|s| s.stop_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_aggregating_the_file_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stops.csv");
        write_stop_file(
            &path,
            &[
                stop("秋林", 126.651234, "1路", 1, 1),
                stop("博物馆", 126.64, "1路", 1, 1),
                stop("秋林", 126.66, "2路", 2, 2),
            ],
        );

        assert_eq!(aggregate_stop_file(&path).unwrap(), 2);
        let once = fs_err::read(&path).unwrap();
        assert_eq!(aggregate_stop_file(&path).unwrap(), 2);
        let twice = fs_err::read(&path).unwrap();
        assert_eq!(once, twice);

        let rows = read_stop_file(&path).unwrap();
        assert_eq!(rows[1].stop_name, "秋林");
        assert_eq!(rows[1].route_names, "1路, 2路");
        assert_eq!(rows[1].visit_frequency, 3);
    }

    #[test]
    fn test_unknown_width_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        fs_err::write(&path, "a,b\n1,2\n").unwrap();
        assert!(matches!(read_stop_file(&path), Err(Error::Parse(_))));
    }
}
