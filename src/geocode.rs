use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::models::Coordinates;
use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl Retryable for GeocodeError {
    fn is_retryable(&self) -> bool {
        matches!(self, GeocodeError::Http(_))
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-form location; `Ok(None)` when nothing matched.
    async fn geocode(&self, location: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search restricted to Singapore.
pub struct NominatimGeocoder {
    endpoint: String,
    client: Client,
}

impl NominatimGeocoder {
    pub fn new(endpoint: &str, user_agent: &str) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| GeocodeError::Http(err.to_string()))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    #[instrument(skip(self))]
    async fn geocode(&self, location: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let url = Url::parse_with_params(
            &format!("{}/search", self.endpoint),
            [
                ("q", location),
                ("format", "json"),
                ("limit", "1"),
                ("countrycodes", "sg"),
            ],
        )
        .map_err(|err| GeocodeError::Http(err.to_string()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| GeocodeError::Http(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GeocodeError::Http(err.to_string()))?;
        if !status.is_success() {
            return Err(GeocodeError::Http(format!("status {status}: {body}")));
        }

        let results: Vec<NominatimResponse> =
            serde_json::from_str(&body).map_err(|err| GeocodeError::Parse(err.to_string()))?;
        let first = match results.first() {
            Some(first) => first,
            None => {
                warn!(location, "location not found by geocoder");
                return Ok(None);
            }
        };

        let coordinates = Coordinates {
            latitude: first
                .lat
                .parse()
                .map_err(|err| GeocodeError::Parse(format!("invalid latitude: {err}")))?,
            longitude: first
                .lon
                .parse()
                .map_err(|err| GeocodeError::Parse(format!("invalid longitude: {err}")))?,
        };
        debug!(
            location,
            latitude = coordinates.latitude,
            longitude = coordinates.longitude,
            "geocoded"
        );
        Ok(Some(coordinates))
    }
}

/// Great-circle distance in kilometres (haversine).
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (dlng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}
