//! Landmark lookup for free-text locations.
//!
//! Two contracts share the matching logic: [`LocationResolver::resolve`] must
//! pick exactly one coordinate or fail, while [`LocationResolver::suggest`]
//! backs the autocomplete list and may return any number of matches.

use crate::{
    error::{Field, PlanError},
    models::{Coordinate, Landmark},
};

#[derive(Debug, Clone)]
pub struct LocationResolver {
    landmarks: Vec<Landmark>,
    /// Lower-cased names, parallel to `landmarks`.
    folded: Vec<String>,
}

impl LocationResolver {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        let folded = landmarks
            .iter()
            .map(|l| l.name.trim().to_lowercase())
            .collect();
        Self { landmarks, folded }
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn resolve(&self, query: &str, field: Field) -> Result<Coordinate, PlanError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(PlanError::invalid(field, "location must not be empty"));
        }

        if let Some(idx) = self.folded.iter().position(|name| *name == needle) {
            return Ok(self.landmarks[idx].coordinate());
        }

        if let Some(coord) = parse_lat_lng(query) {
            if !coord.is_valid() {
                return Err(PlanError::invalid(
                    field,
                    format!("coordinate {query:?} is out of range"),
                ));
            }
            return Ok(coord);
        }

        let hits: Vec<&Landmark> = self.matching(&needle).collect();
        match hits.as_slice() {
            [] => Err(PlanError::LocationNotResolved {
                field,
                query: query.trim().to_string(),
            }),
            [single] => {
                tracing::debug!("{field} {query:?} resolved to {:?} by substring", single.name);
                Ok(single.coordinate())
            }
            many => Err(PlanError::AmbiguousLocation {
                field,
                query: query.trim().to_string(),
                candidates: many.iter().map(|l| l.name.clone()).collect(),
            }),
        }
    }

    /// Autocomplete: every landmark whose name contains `query`, in dataset order.
    pub fn suggest(&self, query: &str) -> Vec<Landmark> {
        let needle = query.trim().to_lowercase();
        self.matching(&needle).cloned().collect()
    }

    fn matching<'a>(&'a self, needle: &'a str) -> impl Iterator<Item = &'a Landmark> + 'a {
        self.folded
            .iter()
            .zip(&self.landmarks)
            .filter(move |(name, _)| name.contains(needle))
            .map(|(_, landmark)| landmark)
    }
}

/// Parse a `lat,lng` literal. Range is checked by the caller.
fn parse_lat_lng(raw: &str) -> Option<Coordinate> {
    let (lat, lng) = raw.trim().split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    Some(Coordinate { lat, lng })
}
