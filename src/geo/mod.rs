//! Spherical geometry for radius search, and geocoding of addresses and postal codes.

mod geocoder;

pub use geocoder::{DisabledGeocoder, GeocodeError, Geocoder, MapQuestGeocoder};

use serde_json::{json, Value};

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3963.0;

/// Distance along the surface in miles → angular radius in radians.
pub fn radius_radians(miles: f64) -> f64 {
    miles / EARTH_RADIUS_MILES
}

/// Central angle in radians between two (longitude, latitude) points in degrees.
pub fn central_angle(lng1: f64, lat1: f64, lng2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = phi2 - phi1;
    let d_lambda = (lng2 - lng1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * a.sqrt().min(1.0).asin()
}

/// A geocoded location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub country: Option<String>,
}

impl GeoPoint {
    /// GeoJSON point with the address parts alongside the coordinates.
    pub fn to_geojson(&self) -> Value {
        json!({
            "type": "Point",
            "coordinates": [self.longitude, self.latitude],
            "formattedAddress": self.formatted_address,
            "street": self.street,
            "city": self.city,
            "state": self.state,
            "zipcode": self.zipcode,
            "country": self.country,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earth_radius_in_miles_is_one_radian() {
        assert_eq!(radius_radians(3963.0), 1.0);
        assert_eq!(radius_radians(0.0), 0.0);
    }

    #[test]
    fn central_angle_matches_known_distance() {
        // Boston → New York is roughly 190 miles.
        let angle = central_angle(-71.0589, 42.3601, -74.0060, 40.7128);
        let miles = angle * EARTH_RADIUS_MILES;
        assert!((185.0..195.0).contains(&miles), "{miles}");
        assert_eq!(central_angle(10.0, 20.0, 10.0, 20.0), 0.0);
    }

    #[test]
    fn geojson_puts_longitude_first() {
        let p = GeoPoint {
            latitude: 42.35,
            longitude: -71.1,
            city: Some("Boston".into()),
            ..Default::default()
        };
        let v = p.to_geojson();
        assert_eq!(v["type"], "Point");
        assert_eq!(v["coordinates"], json!([-71.1, 42.35]));
        assert_eq!(v["city"], "Boston");
    }
}
