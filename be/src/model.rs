use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::proximity::{Coordinate, Positioned};

pub type BusId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Bus {
    pub bus_id: BusId,
    pub bus_no: String,
    pub bus_name: String,
    pub popularity: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBus {
    pub bus_no: String,
    pub bus_name: String,
}

/// One observed position. Never updated once written.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub bus_id: BusId,
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

/// The most recent sample per bus.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestLocation {
    pub bus_id: BusId,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}

// A registered bus joined with its latest location
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct BusLocation {
    pub bus_id: BusId,
    pub bus_no: String,
    pub bus_name: String,
    pub popularity: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Positioned for BusLocation {
    fn position(&self) -> Option<Coordinate> {
        Coordinate::new(self.latitude, self.longitude).ok()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}
