use chrono::{DateTime, NaiveDate, Utc};
// Equivalent lets lookups borrow the trip id instead of allocating a key.
use indexmap::{Equivalent, IndexMap};
use itertools::Itertools;

use crate::feed::structure::{FeedMessage, TripUpdate};
use crate::model::{RealtimeUpdate, VehicleDescriptor};

#[derive(PartialEq, Eq, Hash)]
struct TripKey(NaiveDate, String);

#[derive(PartialEq, Eq, Hash)]
struct TripKeyRef<'a>(NaiveDate, &'a str);

impl Equivalent<TripKey> for TripKeyRef<'_> {
    fn equivalent(&self, key: &TripKey) -> bool {
        self.0 == key.0 && self.1 == key.1
    }
}

/// One scheduled stop event to find realtime data for.
pub struct RealtimeQueryKey<'a> {
    pub service_date: NaiveDate,
    pub trip_id: &'a str,
    pub stop_sequence: u32,
}

/// Holds the latest trip updates, keyed by trip instance. The feed is a full
/// dataset, so every load replaces the index wholesale.
#[derive(Default)]
pub struct RealtimeUpdateManager {
    trip_updates: IndexMap<TripKey, TripUpdate>,
}

impl RealtimeUpdateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_feed(&mut self, feed: FeedMessage) {
        self.trip_updates.clear();

        for entity in feed.entity {
            if entity.is_deleted == Some(true) {
                continue;
            }
            let Some(trip_update) = entity.trip_update else {
                continue;
            };

            let Some(trip_id) = trip_update.trip.trip_id.clone() else {
                log::warn!("Trip update {} has no trip_id", entity.id);
                continue;
            };
            let service_date = match &trip_update.trip.start_date {
                Some(raw) => match NaiveDate::parse_from_str(raw, "%Y%m%d") {
                    Ok(date) => date,
                    Err(e) => {
                        log::warn!("Bad start_date {:?} for trip {}: {}", raw, trip_id, e);
                        continue;
                    }
                },
                None => {
                    log::warn!("Trip update {} has no start_date", entity.id);
                    continue;
                }
            };

            self.trip_updates
                .insert(TripKey(service_date, trip_id), trip_update);
        }
    }

    /// Realtime data for each key, in key order. `None` means the trip
    /// instance has no update at all, as opposed to an empty update.
    pub fn lookup<'a, I>(&self, keys: I) -> Vec<Option<RealtimeUpdate>>
    where
        I: IntoIterator<Item = RealtimeQueryKey<'a>>,
    {
        keys.into_iter()
            .map(|key| {
                self.trip_updates
                    .get(&TripKeyRef(key.service_date, key.trip_id))
                    .map(|trip_update| realtime_update_at(trip_update, key.stop_sequence))
            })
            .collect()
    }
}

/// Applies the GTFS-realtime propagation rule: a stop time update covers its
/// own stop and every following stop up to the next update of the trip.
fn realtime_update_at(trip_update: &TripUpdate, stop_sequence: u32) -> RealtimeUpdate {
    let mut update = RealtimeUpdate::default();

    let relevant = trip_update
        .stop_time_update
        .clone()
        .map(Vec::from)
        .unwrap_or_default()
        .into_iter()
        .sorted_by_key(|u| u.stop_sequence)
        .take_while(|u| u.stop_sequence <= Some(stop_sequence))
        .last();

    if let Some(stop_time_update) = relevant {
        let event = stop_time_update
            .departure
            .as_ref()
            .or(stop_time_update.arrival.as_ref());
        if let Some(event) = event {
            update.delay = event.delay;
            update.departure_time = event.time.and_then(|t| DateTime::<Utc>::from_timestamp(t, 0));
        }
        update.schedule_relationship = stop_time_update.schedule_relationship;
    }

    // trip-level delay propagates until the first per-stop value
    if update.delay.is_none() && update.departure_time.is_none() {
        update.delay = trip_update.delay;
    }

    update.vehicle = trip_update
        .vehicle
        .as_ref()
        .and_then(VehicleDescriptor::from_feed);

    update
}
