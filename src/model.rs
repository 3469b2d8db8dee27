use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::feed;

/// One departure as served by the API: the scheduled stop time plus the
/// realtime correction, when one is known for the trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimetableUpdate {
    pub base: BaseStopTime,
    pub realtime: Option<RealtimeUpdate>,
}

/// A scheduled stop event, straight from the static timetable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseStopTime {
    pub stop_id: String,
    pub trip_id: String,
    pub departure_time: DateTime<Utc>,
    pub service_date: NaiveDate,
    pub stop_sequence: u32,
    pub direction_id: Option<bool>,
    pub trip_headsign: Option<String>,
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_type: i32,
}

/// Correction layer over a [`BaseStopTime`]. Every field is optional; an
/// update with no fields means the trip is tracked but nothing is known to
/// deviate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeUpdate {
    /// Seconds behind schedule, negative when running early.
    pub delay: Option<i32>,
    /// Predicted departure replacing the scheduled one.
    pub departure_time: Option<DateTime<Utc>>,
    /// Raw GTFS-realtime schedule relationship code.
    pub schedule_relationship: Option<i32>,
    pub vehicle: Option<VehicleDescriptor>,
}

/// The physical vehicle serving a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleDescriptor {
    pub id: String,
    pub label: Option<String>,
    pub license_plate: Option<String>,
}

impl VehicleDescriptor {
    /// Feed vehicles without an id cannot be referenced and are dropped.
    pub fn from_feed(vehicle: &feed::structure::VehicleDescriptor) -> Option<Self> {
        vehicle.id.as_ref().map(|id| VehicleDescriptor {
            id: id.clone(),
            label: vehicle.label.clone(),
            license_plate: vehicle.license_plate.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_realtime_update_is_valid() {
        let update: RealtimeUpdate = serde_json::from_str("{}").unwrap();
        assert_eq!(update, RealtimeUpdate::default());
    }

    #[test]
    fn timetable_update_requires_base() {
        let result = serde_json::from_str::<TimetableUpdate>(r#"{"realtime": {}}"#);
        assert!(result.is_err());

        let msg = r#"{
            "base": {
                "stop_id": "4221",
                "trip_id": "1300-90602",
                "departure_time": "2024-02-05T06:30:00Z",
                "service_date": "2024-02-05",
                "stop_sequence": 3,
                "route_type": 3
            }
        }"#;
        let update: TimetableUpdate = serde_json::from_str(msg).unwrap();
        assert_eq!(update.base.stop_sequence, 3);
        assert_eq!(update.realtime, None);
        assert_eq!(update.base.trip_headsign, None);
    }

    #[test]
    fn feed_vehicle_without_id_is_dropped() {
        let with_id = feed::structure::VehicleDescriptor {
            id: Some("22781".to_string()),
            label: Some("RT1349".to_string()),
            license_plate: None,
        };
        let vehicle = VehicleDescriptor::from_feed(&with_id).unwrap();
        assert_eq!(vehicle.id, "22781");
        assert_eq!(vehicle.label.as_deref(), Some("RT1349"));

        let without_id = feed::structure::VehicleDescriptor {
            id: None,
            label: Some("RT1349".to_string()),
            license_plate: None,
        };
        assert_eq!(VehicleDescriptor::from_feed(&without_id), None);
    }
}
