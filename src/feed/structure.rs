//! The trip-update subset of the GTFS-realtime feed, as rendered to JSON.
//! Field names and cardinality follow gtfs-realtime.proto; unrelated entity
//! types (vehicle positions, alerts) are ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_repr::Deserialize_repr;

use super::serde_helpers::{deserialize_option_unix_date, Many};

/// One fetch of the feed. Entity ids are resolved against the static GTFS
/// data by trip and stop ids.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct FeedMessage {
    pub header: FeedHeader,
    pub entity: Vec<FeedEntity>,
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct FeedHeader {
    /// "1.0" or "2.0".
    pub gtfs_realtime_version: String,
    pub incrementality: Option<Incrementality>,
    /// When the feed content was created, server side.
    #[serde(default, deserialize_with = "deserialize_option_unix_date")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize_repr)]
#[repr(i32)]
pub enum Incrementality {
    FullDataset = 0,
    Differential = 1,
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct FeedEntity {
    /// Unique within one message.
    pub id: String,
    /// Only meaningful for differential feeds.
    pub is_deleted: Option<bool>,
    pub trip_update: Option<TripUpdate>,
}

/// Realtime progress of a vehicle along a trip. At most one per trip
/// instance; absence means no prediction, not an on-time trip.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct TripUpdate {
    pub trip: TripDescriptor,
    pub vehicle: Option<VehicleDescriptor>,
    /// Sorted by stop_sequence; each update applies to its own stop and all
    /// following stops up to the next specified one.
    pub stop_time_update: Option<Many<StopTimeUpdate>>,
    /// When the vehicle's progress was last measured.
    #[serde(default, deserialize_with = "deserialize_option_unix_date")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Trip-level schedule deviation in seconds. Superseded per stop by
    /// [`StopTimeUpdate`] delays.
    pub delay: Option<i32>,
}

/// Identifies a single trip instance: trip_id plus, for trips that can
/// collide across midnight, the start date.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct TripDescriptor {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub direction_id: Option<u32>,
    /// HH:MM:SS, possibly past 24:00.
    pub start_time: Option<String>,
    /// YYYYMMDD.
    pub start_date: Option<String>,
    /// Raw schedule relationship code (scheduled, added, canceled, ...).
    pub schedule_relationship: Option<i32>,
}

/// Arrival/departure prediction for one stop of a trip. Linked to the stop
/// by stop_sequence or stop_id; at least one must be set.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct StopTimeUpdate {
    pub stop_sequence: Option<u32>,
    pub stop_id: Option<String>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
    /// Raw schedule relationship code (scheduled, skipped, no data, ...).
    pub schedule_relationship: Option<i32>,
}

/// A predicted event time: a delay relative to the schedule and/or an
/// absolute time. Time takes precedence when both are given.
#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct StopTimeEvent {
    /// Seconds of deviation from the schedule, negative when early.
    pub delay: Option<i32>,
    /// Event as absolute POSIX time.
    pub time: Option<i64>,
    pub uncertainty: Option<i32>,
}

#[derive(Clone, PartialEq, Deserialize, Debug)]
pub struct VehicleDescriptor {
    pub id: Option<String>,
    /// Passenger-visible label.
    pub label: Option<String>,
    pub license_plate: Option<String>,
}
