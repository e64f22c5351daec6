// ABOUTME: Coordinate helpers shared by the geometry matchers
// ABOUTME: Equirectangular local meter frame, haversine distance, and point centroids
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 RunBase Contributors

use geo::{Distance, Haversine, Point};
use runbase_core::constants::units::METERS_PER_DEGREE_LAT;

/// Great-circle distance in meters between two `(lat, lon)` pairs
#[must_use]
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    Haversine::distance(Point::new(a.1, a.0), Point::new(b.1, b.0))
}

/// Mean latitude / longitude of a set of positions
#[must_use]
pub fn centroid(positions: impl IntoIterator<Item = (f64, f64)>) -> Option<(f64, f64)> {
    let (lat_sum, lon_sum, count) = positions
        .into_iter()
        .fold((0.0, 0.0, 0_u32), |(la, lo, n), (lat, lon)| {
            (la + lat, lo + lon, n + 1)
        });
    (count > 0).then(|| (lat_sum / f64::from(count), lon_sum / f64::from(count)))
}

/// Flat east / north meter frame around an origin
///
/// Accurate to well under a meter across the few hundred meters a track
/// window spans.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin_lat: f64,
    origin_lon: f64,
    meters_per_degree_lon: f64,
}

impl LocalFrame {
    /// Frame centred on `(lat, lon)`
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            origin_lat: lat,
            origin_lon: lon,
            meters_per_degree_lon: METERS_PER_DEGREE_LAT * lat.to_radians().cos(),
        }
    }

    /// Project a position to `(east_m, north_m)`
    #[must_use]
    pub fn project(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            (lon - self.origin_lon) * self.meters_per_degree_lon,
            (lat - self.origin_lat) * METERS_PER_DEGREE_LAT,
        )
    }

    /// Inverse of [`Self::project`]
    #[must_use]
    pub fn unproject(&self, east_m: f64, north_m: f64) -> (f64, f64) {
        (
            self.origin_lat + north_m / METERS_PER_DEGREE_LAT,
            self.origin_lon + east_m / self.meters_per_degree_lon,
        )
    }
}
