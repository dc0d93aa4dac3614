use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::error::{ApiResult, ValidationError};
use crate::model::{Bus, BusId, BusLocation, NewBus};
use crate::proximity::{Coordinate, ProximityQuery, Ranked};
use crate::store::BusStore;
use crate::sweeper;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn BusStore>,
    retention: TimeDelta,
}

impl AppState {
    pub fn new(store: Arc<dyn BusStore>, retention: TimeDelta) -> Self {
        Self { store, retention }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/register_bus", post(register_bus))
        .route("/update_location", post(update_location))
        .route("/get_nearby_buses", post(get_nearby_buses))
        .route("/cleanup_old_locations", post(cleanup_old_locations))
        .route("/buses", get(list_buses))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// Bus codes like `12` often arrive as JSON numbers; they are stored as text
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextField {
    Text(String),
    Number(serde_json::Number),
}

impl From<TextField> for String {
    fn from(field: TextField) -> Self {
        match field {
            TextField::Text(text) => text,
            TextField::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RegisterBusRequest {
    bus_no: Option<TextField>,
    bus_name: Option<TextField>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateLocationRequest {
    bus_id: Option<BusId>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct NearbyRequest {
    latitude: Option<f64>,
    longitude: Option<f64>,
    max_distance_m: Option<f64>,
}

impl NearbyRequest {
    // No reference point means the caller wants the plain, unranked list
    fn query(&self) -> Result<Option<ProximityQuery>, ValidationError> {
        let query = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => {
                ProximityQuery::new(Coordinate::new(latitude, longitude)?)
            }
            (None, None) if self.max_distance_m.is_some() => {
                return Err(ValidationError::new(
                    "max_distance_m requires latitude and longitude",
                ));
            }
            (None, None) => return Ok(None),
            _ => return Err(ValidationError::new("Missing latitude or longitude")),
        };

        match self.max_distance_m {
            Some(meters) => query.with_max_distance(meters).map(Some),
            None => Ok(Some(query)),
        }
    }
}

#[derive(Debug, Serialize)]
struct NearbyBus {
    bus_id: BusId,
    bus_no: String,
    bus_name: String,
    latitude: f64,
    longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    staleness_s: Option<i64>,
    updated_at: Option<DateTime<Utc>>,
    popularity: i32,
}

impl NearbyBus {
    fn unranked(location: BusLocation, now: DateTime<Utc>) -> Self {
        let staleness_s = location
            .updated_at
            .map(|at| (now - at).max(TimeDelta::zero()).num_seconds());
        Self::build(location, None, staleness_s)
    }

    fn ranked(ranked: Ranked<BusLocation>) -> Self {
        // Round to 0.1 m for display
        let distance_m = (ranked.distance_m * 10.0).round() / 10.0;
        Self::build(
            ranked.entity,
            Some(distance_m),
            Some(ranked.staleness.num_seconds()),
        )
    }

    fn build(location: BusLocation, distance_m: Option<f64>, staleness_s: Option<i64>) -> Self {
        Self {
            bus_id: location.bus_id,
            bus_no: location.bus_no,
            bus_name: location.bus_name,
            latitude: location.latitude,
            longitude: location.longitude,
            distance_m,
            staleness_s,
            updated_at: location.updated_at,
            popularity: location.popularity,
        }
    }
}

// An empty body or a JSON `null` reads as "no fields supplied"
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let parsed: Option<T> = serde_json::from_slice(body)
        .map_err(|e| ValidationError::new(format!("Invalid JSON body: {}", e)))?;
    Ok(parsed.unwrap_or_default())
}

async fn home() -> &'static str {
    "🚍 Bus Tracking API is running"
}

async fn register_bus(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request: RegisterBusRequest = parse_body(&body)?;
    let (Some(bus_no), Some(bus_name)) = (request.bus_no, request.bus_name) else {
        return Err(ValidationError::new("Missing bus_no or bus_name").into());
    };

    let bus = state
        .store
        .register_bus(NewBus {
            bus_no: bus_no.into(),
            bus_name: bus_name.into(),
        })
        .await
        .inspect_err(|e| error!("Register bus error: {}", e))?;

    info!(bus_id = bus.bus_id, bus_no = %bus.bus_no, "Registered bus");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Bus registered successfully!",
            "bus_id": bus.bus_id,
        })),
    ))
}

async fn update_location(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request: UpdateLocationRequest = parse_body(&body)?;
    let (Some(bus_id), Some(latitude), Some(longitude)) =
        (request.bus_id, request.latitude, request.longitude)
    else {
        return Err(ValidationError::new("Missing bus_id, latitude, or longitude").into());
    };
    let position = Coordinate::new(latitude, longitude)?;

    state
        .store
        .record_location(bus_id, position, Utc::now())
        .await
        .inspect_err(|e| error!("Update location error: {}", e))?;

    debug!(bus_id, latitude, longitude, "Recorded bus location");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Location updated successfully!" })),
    ))
}

async fn get_nearby_buses(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Vec<NearbyBus>>> {
    let request: NearbyRequest = parse_body(&body)?;
    let query = request.query()?;

    let locations = state
        .store
        .latest_locations()
        .await
        .inspect_err(|e| error!("Get buses error: {}", e))?;

    let now = Utc::now();
    let buses: Vec<NearbyBus> = match query {
        Some(query) => query
            .rank(locations, now)
            .into_iter()
            .map(NearbyBus::ranked)
            .collect(),
        None => locations
            .into_iter()
            .map(|location| NearbyBus::unranked(location, now))
            .collect(),
    };

    debug!(count = buses.len(), ranked = query.is_some(), "Serving nearby buses");
    Ok(Json(buses))
}

async fn cleanup_old_locations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let deleted = sweeper::sweep_once(state.store.as_ref(), state.retention, Utc::now())
        .await
        .inspect_err(|e| error!("Cleanup error: {}", e))?;

    Ok(Json(json!({
        "message": "Old locations cleaned up successfully.",
        "deleted": deleted,
    })))
}

async fn list_buses(State(state): State<AppState>) -> ApiResult<Json<Vec<Bus>>> {
    let buses = state
        .store
        .list_buses()
        .await
        .inspect_err(|e| error!("List buses error: {}", e))?;
    Ok(Json(buses))
}
