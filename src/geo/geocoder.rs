use super::GeoPoint;
use crate::error::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const MAPQUEST_URL: &str = "https://www.mapquestapi.com/geocoding/v1/address";

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoder is not configured")]
    NotConfigured,
    #[error("geocoder request failed: {0}")]
    Request(reqwest::Error),
    #[error("geocoder returned an unexpected payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GeocodeError {
    /// The request URL carries the API key, so it is dropped before the error is kept.
    fn from(e: reqwest::Error) -> Self {
        GeocodeError::Request(e.without_url())
    }
}

impl From<GeocodeError> for AppError {
    fn from(e: GeocodeError) -> Self {
        tracing::warn!(error = %e, "geocoding failed");
        AppError::UpstreamFailure("Geocoding service unavailable".into())
    }
}

/// Resolves free-form addresses or postal codes to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// First match for `location`, `None` when the provider found nothing.
    async fn geocode(&self, location: &str) -> Result<Option<GeoPoint>, GeocodeError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Stand-in used when no provider key is configured.
#[derive(Clone, Debug, Default)]
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn geocode(&self, _location: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        Err(GeocodeError::NotConfigured)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
pub struct MapQuestGeocoder {
    client: reqwest::Client,
    api_key: String,
}

impl MapQuestGeocoder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(MapQuestGeocoder {
            client,
            api_key: api_key.into(),
        })
    }
}

#[derive(Deserialize)]
struct MapQuestResponse {
    #[serde(default)]
    results: Vec<MapQuestResult>,
}

#[derive(Deserialize)]
struct MapQuestResult {
    #[serde(default)]
    locations: Vec<MapQuestLocation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapQuestLocation {
    lat_lng: LatLng,
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    admin_area5: Option<String>,
    #[serde(default)]
    admin_area3: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    admin_area1: Option<String>,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

impl From<MapQuestLocation> for GeoPoint {
    fn from(loc: MapQuestLocation) -> Self {
        let street = non_empty(loc.street);
        let city = non_empty(loc.admin_area5);
        let state = non_empty(loc.admin_area3);
        let zipcode = non_empty(loc.postal_code);
        let country = non_empty(loc.admin_area1);
        let formatted = [&street, &city, &state, &zipcode, &country]
            .iter()
            .filter_map(|p| p.as_deref())
            .collect::<Vec<_>>()
            .join(", ");
        GeoPoint {
            latitude: loc.lat_lng.lat,
            longitude: loc.lat_lng.lng,
            formatted_address: (!formatted.is_empty()).then_some(formatted),
            street,
            city,
            state,
            zipcode,
            country,
        }
    }
}

fn first_location(body: MapQuestResponse) -> Option<GeoPoint> {
    body.results
        .into_iter()
        .next()
        .and_then(|r| r.locations.into_iter().next())
        .map(GeoPoint::from)
}

#[async_trait]
impl Geocoder for MapQuestGeocoder {
    async fn geocode(&self, location: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let response = self
            .client
            .get(MAPQUEST_URL)
            .query(&[("key", self.api_key.as_str()), ("location", location)])
            .send()
            .await?
            .error_for_status()?;
        let body: MapQuestResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Malformed(e.without_url().to_string()))?;
        let point = first_location(body);
        tracing::debug!(location, found = point.is_some(), "geocoded");
        Ok(point)
    }
}
