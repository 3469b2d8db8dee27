pub mod import;
mod time;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use crate::model::BaseStopTime;

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Error parsing date: {0}")]
    Date(#[from] time::DateError),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Handle to the schedule database. Connections are opened per operation;
/// the heavy work runs on blocking threads anyway.
#[derive(Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn open(&self) -> ScheduleResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(include_str!("sql/schema.sql"))?;
        Ok(conn)
    }

    fn departures_for_stop_blocking(
        &self,
        stop_code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ScheduleResult<Vec<BaseStopTime>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(include_str!("sql/stop_times.sql"))?;

        let rows = stmt.query_map(
            params![from.timestamp_millis(), to.timestamp_millis(), stop_code],
            |row| {
                let departure_ms: i64 = row.get(2)?;
                let departure_time = DateTime::from_timestamp_millis(departure_ms)
                    .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, departure_ms))?;
                let service_date: String = row.get(3)?;
                let service_date = NaiveDate::parse_from_str(&service_date, "%Y-%m-%d")
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                    })?;

                Ok(BaseStopTime {
                    stop_id: row.get(0)?,
                    trip_id: row.get(1)?,
                    departure_time,
                    service_date,
                    stop_sequence: row.get(4)?,
                    direction_id: row.get(5)?,
                    trip_headsign: row.get(6)?,
                    route_short_name: row.get(7)?,
                    route_long_name: row.get(8)?,
                    route_type: row.get(9)?,
                })
            },
        )?;

        let mut departures = Vec::new();
        for row in rows {
            departures.push(row?);
        }
        Ok(departures)
    }

    /// Scheduled departures from a stop within the window, soonest first.
    pub async fn departures_for_stop(
        &self,
        stop_code: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ScheduleResult<Vec<BaseStopTime>> {
        let store = self.clone();
        let stop_code = stop_code.to_string();
        tokio::task::spawn_blocking(move || {
            store.departures_for_stop_blocking(&stop_code, from, to)
        })
        .await?
    }
}
