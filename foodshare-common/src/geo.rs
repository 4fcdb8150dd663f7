use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Equatorial radius used to turn kilometres into an angle on the sphere.
pub const EARTH_RADIUS_KM: f64 = 6378.1;
pub const DEFAULT_RADIUS_KM: u32 = 10;

#[derive(Copy, Clone, PartialEq, Debug, Error)]
#[error("Coordinates out of range: longitude {longitude}, latitude {latitude}")]
pub struct InvalidGeoPointError {
    longitude: f64,
    latitude: f64,
}

impl Eq for InvalidGeoPointError {}

impl std::hash::Hash for InvalidGeoPointError {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.longitude.to_bits().hash(state);
        self.latitude.to_bits().hash(state);
    }
}

/// A point on the globe, serialized as `[longitude, latitude]`.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    longitude: f64,
    latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, InvalidGeoPointError> {
        if (-180.0..=180.0).contains(&longitude) && (-90.0..=90.0).contains(&latitude) {
            Ok(Self {
                longitude,
                latitude,
            })
        } else {
            Err(InvalidGeoPointError {
                longitude,
                latitude,
            })
        }
    }

    #[must_use]
    pub fn longitude(self) -> f64 {
        self.longitude
    }

    #[must_use]
    pub fn latitude(self) -> f64 {
        self.latitude
    }

    /// Great-circle angle between two points in radians (haversine).
    #[must_use]
    pub fn angular_distance(self, other: GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let half_dlat = (other.latitude - self.latitude).to_radians() / 2.0;
        let half_dlng = (other.longitude - self.longitude).to_radians() / 2.0;

        let a = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlng.sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }
}

impl TryFrom<[f64; 2]> for GeoPoint {
    type Error = InvalidGeoPointError;

    fn try_from([longitude, latitude]: [f64; 2]) -> Result<Self, Self::Error> {
        Self::new(longitude, latitude)
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(value: GeoPoint) -> Self {
        [value.longitude, value.latitude]
    }
}

/// Points within `radius_km` of `center`.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct GeoFilter {
    pub center: GeoPoint,
    pub radius_km: u32,
}

impl GeoFilter {
    #[must_use]
    pub fn new(center: GeoPoint, radius_km: u32) -> Self {
        let radius_km = if radius_km == 0 {
            DEFAULT_RADIUS_KM
        } else {
            radius_km
        };

        Self { center, radius_km }
    }

    #[must_use]
    pub fn radius_radians(self) -> f64 {
        f64::from(self.radius_km) / EARTH_RADIUS_KM
    }

    #[must_use]
    pub fn contains(self, point: GeoPoint) -> bool {
        self.center.angular_distance(point) <= self.radius_radians()
    }
}

#[cfg(test)]
mod tests {
    use crate::geo::{DEFAULT_RADIUS_KM, EARTH_RADIUS_KM, GeoFilter, GeoPoint};

    fn point(longitude: f64, latitude: f64) -> GeoPoint {
        GeoPoint::new(longitude, latitude).unwrap()
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(180.5, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -91.0).is_err());
        assert!(serde_json::from_str::<GeoPoint>("[200.0, 10.0]").is_err());
    }

    #[test]
    fn serializes_longitude_first() {
        let json = serde_json::to_string(&point(13.4, 52.5)).unwrap();
        assert_eq!(json, "[13.4,52.5]");
        assert_eq!(serde_json::from_str::<GeoPoint>(&json).unwrap(), point(13.4, 52.5));
    }

    #[test]
    fn one_degree_of_latitude() {
        let distance_km = point(0.0, 0.0).angular_distance(point(0.0, 1.0)) * EARTH_RADIUS_KM;
        assert!((distance_km - 111.3).abs() < 0.1);
    }

    #[test]
    fn radius_filter() {
        let berlin = point(13.405, 52.52);
        let potsdam = point(13.064, 52.391);
        let hamburg = point(9.993, 53.551);

        let filter = GeoFilter::new(berlin, 50);
        assert!(filter.contains(berlin));
        assert!(filter.contains(potsdam));
        assert!(!filter.contains(hamburg));
    }

    #[test]
    fn zero_radius_falls_back_to_default() {
        assert_eq!(GeoFilter::new(point(0.0, 0.0), 0).radius_km, DEFAULT_RADIUS_KM);
    }
}
