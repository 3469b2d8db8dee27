//! Builds the departure table from a directory of GTFS static files.
//!
//! Rather than querying the raw GTFS tables at request time, departures are
//! materialised per service date over a rolling horizon: service calendars
//! are resolved up front and every stop time becomes one denormalised row
//! with an absolute UTC timestamp.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate, Utc};
use rusqlite::params;
use serde::Deserialize;

use super::time::GtfsTimeParser;
use super::{ScheduleError, ScheduleResult, ScheduleStore};

const EXCEPTION_ADDED: i32 = 1;
const EXCEPTION_REMOVED: i32 = 2;

#[derive(Deserialize, Debug)]
struct AgencyRow {
    agency_timezone: String,
}

#[derive(Deserialize, Debug)]
struct RouteRow {
    route_id: String,
    #[serde(default)]
    route_short_name: Option<String>,
    #[serde(default)]
    route_long_name: Option<String>,
    route_type: i32,
}

#[derive(Deserialize, Debug)]
struct TripRow {
    route_id: String,
    service_id: String,
    trip_id: String,
    #[serde(default)]
    trip_headsign: Option<String>,
    #[serde(default)]
    direction_id: Option<i32>,
}

#[derive(Deserialize, Debug)]
struct CalendarRow {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Deserialize, Debug)]
struct CalendarDateRow {
    service_id: String,
    date: String,
    exception_type: i32,
}

#[derive(Deserialize, Debug)]
struct StopRow {
    stop_id: String,
    #[serde(default)]
    stop_code: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StopTimeRow {
    trip_id: String,
    departure_time: String,
    stop_id: String,
    stop_sequence: u32,
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> ScheduleResult<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// calendar.txt and calendar_dates.txt are each optional in GTFS, as long as
/// the other is present.
fn read_rows_optional<T: serde::de::DeserializeOwned>(path: &Path) -> ScheduleResult<Vec<T>> {
    if path.exists() {
        read_rows(path)
    } else {
        Ok(Vec::new())
    }
}

struct WeeklyService {
    days: [bool; 7],
    start: NaiveDate,
    end: NaiveDate,
}

/// Which services run on which dates: weekly patterns from calendar.txt,
/// date exceptions from calendar_dates.txt.
struct ServiceCalendar {
    weekly: HashMap<String, WeeklyService>,
    exceptions: HashMap<String, HashMap<NaiveDate, i32>>,
}

impl ServiceCalendar {
    fn new(
        parser: &GtfsTimeParser,
        calendar: Vec<CalendarRow>,
        calendar_dates: Vec<CalendarDateRow>,
    ) -> ScheduleResult<Self> {
        let mut weekly = HashMap::new();
        for row in calendar {
            let service = WeeklyService {
                days: [
                    row.monday == 1,
                    row.tuesday == 1,
                    row.wednesday == 1,
                    row.thursday == 1,
                    row.friday == 1,
                    row.saturday == 1,
                    row.sunday == 1,
                ],
                start: parser.parse_date(&row.start_date)?,
                end: parser.parse_date(&row.end_date)?,
            };
            weekly.insert(row.service_id, service);
        }

        let mut exceptions: HashMap<String, HashMap<NaiveDate, i32>> = HashMap::new();
        for row in calendar_dates {
            let date = parser.parse_date(&row.date)?;
            exceptions
                .entry(row.service_id)
                .or_default()
                .insert(date, row.exception_type);
        }

        Ok(Self { weekly, exceptions })
    }

    fn runs_on(&self, service_id: &str, date: NaiveDate) -> bool {
        match self.exceptions.get(service_id).and_then(|dates| dates.get(&date)) {
            Some(&EXCEPTION_ADDED) => return true,
            Some(&EXCEPTION_REMOVED) => return false,
            _ => {}
        }

        self.weekly.get(service_id).is_some_and(|service| {
            date >= service.start
                && date <= service.end
                && service.days[date.weekday().num_days_from_monday() as usize]
        })
    }
}

fn do_import(store: &ScheduleStore, dir: &Path, horizon_days: u32) -> ScheduleResult<usize> {
    let mut parser = GtfsTimeParser::new();

    let agencies: Vec<AgencyRow> = read_rows(&dir.join("agency.txt"))?;
    let timezone = agencies
        .first()
        .map(|a| a.agency_timezone.clone())
        .ok_or_else(|| ScheduleError::Other("agency.txt has no rows".to_string()))?;

    let routes: HashMap<String, RouteRow> = read_rows(&dir.join("routes.txt"))?
        .into_iter()
        .map(|r: RouteRow| (r.route_id.clone(), r))
        .collect();
    let trips: Vec<TripRow> = read_rows(&dir.join("trips.txt"))?;
    let stops: HashMap<String, StopRow> = read_rows(&dir.join("stops.txt"))?
        .into_iter()
        .map(|s: StopRow| (s.stop_id.clone(), s))
        .collect();

    let services = ServiceCalendar::new(
        &parser,
        read_rows_optional(&dir.join("calendar.txt"))?,
        read_rows_optional(&dir.join("calendar_dates.txt"))?,
    )?;

    let mut stop_times: HashMap<String, Vec<StopTimeRow>> = HashMap::new();
    for row in read_rows::<StopTimeRow>(&dir.join("stop_times.txt"))? {
        stop_times.entry(row.trip_id.clone()).or_default().push(row);
    }
    for rows in stop_times.values_mut() {
        rows.sort_by_key(|r| r.stop_sequence);
    }

    // start a day back so that trips already underway keep their departures
    let start_date = (Utc::now() - Duration::days(1)).date_naive();

    let mut conn = store.open()?;
    let tx = conn.transaction()?;
    let mut inserted = 0usize;
    {
        tx.execute("DELETE FROM departure", [])?;

        let mut insert = tx.prepare(include_str!("sql/insert_departure.sql"))?;

        let mut date = start_date;
        for _ in 0..horizon_days {
            log::info!("Building departures for {}", date);

            for trip in &trips {
                if !services.runs_on(&trip.service_id, date) {
                    continue;
                }
                let Some(route) = routes.get(&trip.route_id) else {
                    log::warn!(
                        "Trip {} references unknown route {}",
                        trip.trip_id,
                        trip.route_id
                    );
                    continue;
                };
                let Some(rows) = stop_times.get(&trip.trip_id) else {
                    continue;
                };

                for row in rows {
                    let departure = parser.parse_time(date, &row.departure_time, &timezone)?;
                    let stop_code = stops
                        .get(&row.stop_id)
                        .and_then(|s| s.stop_code.clone())
                        .unwrap_or_else(|| row.stop_id.clone());

                    insert.execute(params![
                        row.stop_id,
                        stop_code,
                        trip.trip_id,
                        date.format("%Y-%m-%d").to_string(),
                        row.stop_sequence,
                        departure.timestamp_millis(),
                        trip.direction_id.map(|d| d != 0),
                        trip.trip_headsign,
                        route.route_short_name,
                        route.route_long_name,
                        route.route_type,
                    ])?;
                    inserted += 1;
                }
            }

            date = date
                .succ_opt()
                .ok_or_else(|| ScheduleError::Other("Date overflow".to_string()))?;
        }
    }
    tx.commit()?;

    log::info!("Imported {} departures", inserted);

    Ok(inserted)
}

/// Rebuilds the departure table from the GTFS static files in `dir`.
/// Runs on a blocking thread; the rebuild is a single transaction, so
/// concurrent reads keep seeing the old data until it commits.
pub async fn import_static(
    store: ScheduleStore,
    dir: PathBuf,
    horizon_days: u32,
) -> ScheduleResult<usize> {
    tokio::task::spawn_blocking(move || do_import(&store, &dir, horizon_days)).await?
}
