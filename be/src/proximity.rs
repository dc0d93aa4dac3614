//! Proximity ranking of moving entities against a reference point.
//!
//! Everything here is synchronous and free of I/O. Callers pass the current
//! time in, so ranking the same inputs always yields the same output.

use chrono::{DateTime, TimeDelta, Utc};
use crate::error::ValidationError;

/// Mean Earth radius of the spherical approximation, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Builds a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::new(format!(
                "latitude must be a number between -90 and 90, got {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::new(format!(
                "longitude must be a number between -180 and 180, got {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to `other`, in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(self, other)
    }
}

// Calculate haversine distance between two GPS coordinates (returns meters)
pub fn haversine_distance(from: &Coordinate, to: &Coordinate) -> f64 {
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] near antipodes.
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Anything with a last-known position that can be ranked.
pub trait Positioned {
    fn position(&self) -> Option<Coordinate>;
    fn updated_at(&self) -> Option<DateTime<Utc>>;
}

/// A candidate together with its distance from the reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub entity: T,
    pub distance_m: f64,
    /// Time since the entity last reported; never negative.
    pub staleness: TimeDelta,
}

/// A nearby query: a reference point and an optional distance ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityQuery {
    reference: Coordinate,
    max_distance_m: Option<f64>,
}

impl ProximityQuery {
    pub fn new(reference: Coordinate) -> Self {
        Self {
            reference,
            max_distance_m: None,
        }
    }

    /// Drops candidates farther than `meters` (inclusive bound).
    pub fn with_max_distance(self, meters: f64) -> Result<Self, ValidationError> {
        if !meters.is_finite() || meters < 0.0 {
            return Err(ValidationError::new(format!(
                "max_distance_m must be a non-negative number, got {meters}"
            )));
        }
        Ok(Self {
            max_distance_m: Some(meters),
            ..self
        })
    }

    pub fn reference(&self) -> Coordinate {
        self.reference
    }

    /// Ranks `candidates` by ascending distance from the reference point.
    ///
    /// Candidates that never reported a position are left out. Equal
    /// distances keep their input order.
    pub fn rank<T, I>(&self, candidates: I, now: DateTime<Utc>) -> Vec<Ranked<T>>
    where
        T: Positioned,
        I: IntoIterator<Item = T>,
    {
        let mut ranked: Vec<Ranked<T>> = candidates
            .into_iter()
            .filter_map(|entity| {
                let updated_at = entity.updated_at()?;
                let position = entity.position()?;
                let distance_m = self.reference.distance_to(&position);
                if self.max_distance_m.is_some_and(|max| distance_m > max) {
                    return None;
                }
                Some(Ranked {
                    staleness: (now - updated_at).max(TimeDelta::zero()),
                    distance_m,
                    entity,
                })
            })
            .collect();

        // sort_by is stable, which keeps ties in input order
        ranked.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        ranked
    }
}
