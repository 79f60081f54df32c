use crate::models::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;
const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

pub fn approximate_distance_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlng = (dlng / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlng * sin_dlng;
    2.0 * EARTH_RADIUS_KM * h.min(1.0).sqrt().asin()
}

pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    haversine_km(a, b) * 1000.0
}

pub fn midpoint(a: Coordinate, b: Coordinate) -> Coordinate {
    a.interpolate(b, 0.5)
}

/// Split every segment longer than `max_segment_m` into pieces so that
/// consecutive points are never further apart than the limit.
///
/// Pieces are equal in lat/lng, not in metres, so the count grows until the
/// longest piece fits.
pub fn densify(coords: &[Coordinate], max_segment_m: f64) -> Vec<Coordinate> {
    if coords.len() < 2 || !(max_segment_m > 0.0) {
        return coords.to_vec();
    }

    let mut result = Vec::with_capacity(coords.len() * 2);
    result.push(coords[0]);

    for window in coords.windows(2) {
        let start = window[0];
        let end = window[1];

        let distance_m = haversine_m(start, end);
        if distance_m > max_segment_m {
            let mut pieces = (distance_m / max_segment_m).ceil() as usize;
            loop {
                let interior = split(start, end, pieces);
                let fits = std::iter::once(start)
                    .chain(interior.iter().copied())
                    .zip(interior.iter().copied().chain(std::iter::once(end)))
                    .all(|(a, b)| haversine_m(a, b) <= max_segment_m);
                if fits {
                    result.extend(interior);
                    break;
                }
                pieces += 1 + pieces / 64;
            }
        }

        result.push(end);
    }

    result
}

/// The `pieces - 1` evenly spaced points strictly between `start` and `end`.
fn split(start: Coordinate, end: Coordinate, pieces: usize) -> Vec<Coordinate> {
    (1..pieces)
        .map(|i| start.interpolate(end, i as f64 / pieces as f64))
        .collect()
}

/// Equirectangular projection onto a local metric plane (x east, y north).
///
/// Accurate to well under a metre across a city-sized area, which is all the
/// shade estimator and the node index need.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: Coordinate,
    cos_lat: f64,
}

impl LocalProjection {
    pub fn new(origin: Coordinate) -> Self {
        Self {
            origin,
            cos_lat: origin.lat.to_radians().cos().max(1e-6),
        }
    }

    /// Projection centred on the midpoint of the extent of `coords`.
    pub fn centred_on(coords: impl IntoIterator<Item = Coordinate>) -> Self {
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;
        let mut any = false;
        for c in coords {
            any = true;
            min_lat = min_lat.min(c.lat);
            max_lat = max_lat.max(c.lat);
            min_lng = min_lng.min(c.lng);
            max_lng = max_lng.max(c.lng);
        }
        if !any {
            return Self::new(Coordinate::new(0.0, 0.0));
        }
        Self::new(Coordinate::new(
            (min_lat + max_lat) / 2.0,
            (min_lng + max_lng) / 2.0,
        ))
    }

    pub fn project(&self, c: Coordinate) -> [f64; 2] {
        [
            (c.lng - self.origin.lng).to_radians() * EARTH_RADIUS_M * self.cos_lat,
            (c.lat - self.origin.lat).to_radians() * EARTH_RADIUS_M,
        ]
    }

    pub fn unproject(&self, [x, y]: [f64; 2]) -> Coordinate {
        Coordinate {
            lat: self.origin.lat + (y / EARTH_RADIUS_M).to_degrees(),
            lng: self.origin.lng + (x / (EARTH_RADIUS_M * self.cos_lat)).to_degrees(),
        }
    }
}
