use chrono::{DateTime, Duration, Utc};

use crate::error::TimetableResult;
use crate::model::{BaseStopTime, RealtimeUpdate, TimetableUpdate};
use crate::realtime::RealtimeQueryKey;
use crate::ContextData;

/// Margin before the window start when querying the schedule, so that
/// delayed trips scheduled earlier than the window still show up.
const DELAY_MARGIN_MINS: i64 = 30;

pub struct DepartureWindow {
    pub now: DateTime<Utc>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DepartureWindow {
    pub fn around_now(range_start_mins: u32, range_end_mins: u32) -> Self {
        let now = Utc::now();
        Self {
            now,
            from: now - Duration::minutes(range_start_mins.into()),
            to: now + Duration::minutes(range_end_mins.into()),
        }
    }
}

/// Departures from a stop within the window, with realtime corrections
/// applied. Window membership is decided by the effective departure time.
pub async fn get_stop_departures(
    ctx: &ContextData,
    stop_code: &str,
    window: &DepartureWindow,
) -> TimetableResult<Vec<TimetableUpdate>> {
    let margin = window.from - Duration::minutes(DELAY_MARGIN_MINS);
    let base_times = ctx
        .schedule
        .departures_for_stop(stop_code, margin, window.to)
        .await?;

    let realtime = ctx
        .realtime
        .lock()
        .unwrap()
        .lookup(base_times.iter().map(|base| RealtimeQueryKey {
            service_date: base.service_date,
            trip_id: &base.trip_id,
            stop_sequence: base.stop_sequence,
        }));

    let trips = base_times
        .into_iter()
        .zip(realtime)
        .filter_map(|(base, realtime)| merge_departure(base, realtime, window))
        .collect();

    Ok(trips)
}

fn merge_departure(
    base: BaseStopTime,
    realtime: Option<RealtimeUpdate>,
    window: &DepartureWindow,
) -> Option<TimetableUpdate> {
    match realtime {
        Some(mut update) => {
            let departure_time = update.departure_time.unwrap_or_else(|| {
                base.departure_time + Duration::seconds(update.delay.unwrap_or(0).into())
            });
            if departure_time < window.from || departure_time > window.to {
                return None;
            }
            update.departure_time = Some(departure_time);
            Some(TimetableUpdate {
                base,
                realtime: Some(update),
            })
        }
        None => {
            if base.departure_time < window.from || base.departure_time > window.to {
                return None;
            }
            Some(TimetableUpdate {
                base,
                realtime: None,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::NaiveDate;

    use super::*;

    fn window() -> DepartureWindow {
        let now = DateTime::parse_from_rfc3339("2024-02-05T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        DepartureWindow {
            now,
            from: now - Duration::minutes(2),
            to: now + Duration::minutes(60),
        }
    }

    fn base(departure: &str) -> BaseStopTime {
        BaseStopTime {
            stop_id: "9001-abc".to_string(),
            trip_id: "T1".to_string(),
            departure_time: DateTime::parse_from_rfc3339(departure)
                .unwrap()
                .with_timezone(&Utc),
            service_date: NaiveDate::from_ymd_opt(2024, 2, 5).unwrap(),
            stop_sequence: 1,
            direction_id: None,
            trip_headsign: None,
            route_short_name: None,
            route_long_name: None,
            route_type: 2,
        }
    }

    #[test]
    fn scheduled_departure_keeps_no_realtime() {
        let merged = merge_departure(base("2024-02-05T08:30:00Z"), None, &window()).unwrap();
        assert_eq!(merged.realtime, None);
    }

    #[test]
    fn scheduled_departure_outside_window_is_dropped() {
        assert_eq!(merge_departure(base("2024-02-05T09:30:00Z"), None, &window()), None);
        assert_eq!(merge_departure(base("2024-02-05T07:00:00Z"), None, &window()), None);
    }

    #[test]
    fn delay_sets_effective_departure() {
        let update = RealtimeUpdate {
            delay: Some(120),
            ..Default::default()
        };
        let merged =
            merge_departure(base("2024-02-05T08:30:00Z"), Some(update), &window()).unwrap();
        assert_eq!(
            merged.realtime.unwrap().departure_time.unwrap().to_rfc3339(),
            "2024-02-05T08:32:00+00:00"
        );
    }

    #[test]
    fn delay_can_push_departure_out_of_window() {
        let update = RealtimeUpdate {
            delay: Some(3600),
            ..Default::default()
        };
        assert_eq!(
            merge_departure(base("2024-02-05T08:30:00Z"), Some(update), &window()),
            None
        );
    }

    #[test]
    fn delay_can_pull_earlier_departure_into_window() {
        // scheduled before the window, running late enough to fall inside it
        let update = RealtimeUpdate {
            delay: Some(20 * 60),
            ..Default::default()
        };
        let merged =
            merge_departure(base("2024-02-05T07:45:00Z"), Some(update), &window()).unwrap();
        assert_eq!(
            merged.realtime.unwrap().departure_time.unwrap().to_rfc3339(),
            "2024-02-05T08:05:00+00:00"
        );
    }

    #[test]
    fn replacement_time_wins_over_delay() {
        let replacement = DateTime::parse_from_rfc3339("2024-02-05T08:10:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let update = RealtimeUpdate {
            delay: Some(3600),
            departure_time: Some(replacement),
            ..Default::default()
        };
        let merged =
            merge_departure(base("2024-02-05T08:30:00Z"), Some(update), &window()).unwrap();
        assert_eq!(merged.realtime.unwrap().departure_time, Some(replacement));
    }
}
