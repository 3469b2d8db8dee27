use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct DateError(String);

pub type DateResult<T> = Result<T, DateError>;

/// Parses GTFS dates and stop times. Stop times regularly run past 24:00 for
/// trips that operate beyond midnight of their service date.
pub struct GtfsTimeParser {
    re_time: Regex,
    tz: Tz,
}

impl GtfsTimeParser {
    pub fn new() -> Self {
        // compiled once, reused for every row
        Self {
            re_time: Regex::new(r"(\d+):(\d{2}):(\d{2})").unwrap(),
            tz: Tz::UTC,
        }
    }

    pub fn parse_date(&self, date: &str) -> DateResult<NaiveDate> {
        NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|e| DateError(e.to_string()))
    }

    /// Resolves an HH:MM:SS stop time on a service date, in the agency
    /// timezone, to UTC. Hours of 24 and beyond roll over into later days.
    pub fn parse_time(
        &mut self,
        date: NaiveDate,
        time: &str,
        tz: &str,
    ) -> DateResult<DateTime<Utc>> {
        if self.tz.name() != tz {
            self.tz = tz
                .parse()
                .map_err(|_| DateError(format!("Invalid timezone {:?}", tz)))?;
        }

        let captures = self
            .re_time
            .captures(time)
            .ok_or_else(|| DateError(format!("Invalid time {:?}", time)))?;
        let field = |i: usize| -> DateResult<u32> {
            captures[i]
                .parse()
                .map_err(|_| DateError(format!("Invalid time {:?}", time)))
        };
        let raw_hour = field(1)?;
        let minute = field(2)?;
        let second = field(3)?;

        let days_offset = Days::new(u64::from(raw_hour / 24));
        let naive_time = NaiveTime::from_hms_opt(raw_hour % 24, minute, second)
            .ok_or_else(|| DateError(format!("Invalid time {:?}", time)))?;
        let dt_local = NaiveDateTime::new(date, naive_time) + days_offset;

        let dt = self
            .tz
            .from_local_datetime(&dt_local)
            .earliest()
            .ok_or_else(|| DateError(format!("Nonexistent local time {}", dt_local)))?;
        Ok(dt.with_timezone(&Utc))
    }
}
