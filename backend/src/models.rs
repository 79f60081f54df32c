use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use petgraph::graph::EdgeIndex;
use serde::{Deserialize, Serialize};

use crate::error::{Field, PlanError};

pub use shared::{Coordinate, Landmark, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    Walking,
    Cycling,
    Running,
}

impl Activity {
    pub fn speed_kmh(self) -> f64 {
        match self {
            Activity::Walking => 5.0,
            Activity::Cycling => 15.0,
            Activity::Running => 9.0,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "walking" => Some(Activity::Walking),
            "cycling" => Some(Activity::Cycling),
            "running" => Some(Activity::Running),
            _ => None,
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activity::Walking => "walking",
            Activity::Cycling => "cycling",
            Activity::Running => "running",
        };
        f.write_str(name)
    }
}

/// Validated route request. Only obtainable through `TryFrom<shared::RouteRequest>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteRequest {
    start: String,
    end: String,
    date: NaiveDate,
    time: NaiveTime,
    activity: Activity,
}

impl RouteRequest {
    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }
}

impl TryFrom<shared::RouteRequest> for RouteRequest {
    type Error = PlanError;

    fn try_from(payload: shared::RouteRequest) -> Result<Self, Self::Error> {
        let start = non_empty(&payload.start, Field::Start)?;
        let end = non_empty(&payload.end, Field::End)?;

        let date = NaiveDate::parse_from_str(payload.date.trim(), "%Y-%m-%d").map_err(|_| {
            PlanError::invalid(Field::Date, format!("expected YYYY-MM-DD, got {:?}", payload.date))
        })?;
        let time = NaiveTime::parse_from_str(payload.time.trim(), "%H:%M").map_err(|_| {
            PlanError::invalid(Field::Time, format!("expected HH:MM, got {:?}", payload.time))
        })?;
        let activity = Activity::parse(&payload.activity).ok_or_else(|| {
            PlanError::invalid(
                Field::Activity,
                format!(
                    "expected one of walking, cycling, running, got {:?}",
                    payload.activity
                ),
            )
        })?;

        Ok(Self {
            start,
            end,
            date,
            time,
            activity,
        })
    }
}

fn non_empty(raw: &str, field: Field) -> Result<String, PlanError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PlanError::invalid(field, "location must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SunPosition {
    pub altitude_deg: f64,
    pub azimuth_deg: f64,
}

impl SunPosition {
    pub fn is_up(&self) -> bool {
        self.altitude_deg > 0.0
    }
}

/// One alternative path geometry, before shading.
#[derive(Debug, Clone, PartialEq)]
pub struct PathCandidate {
    pub points: Vec<Coordinate>,
    pub length_km: f64,
    pub edges: Vec<EdgeIndex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShadedSegment {
    pub from: Coordinate,
    pub to: Coordinate,
    pub length_m: f64,
    pub shade_fraction: f64,
}

/// A candidate paired with its per-segment shading, ready for ranking.
#[derive(Debug, Clone)]
pub struct ShadedPath {
    pub points: Vec<Coordinate>,
    pub segments: Vec<ShadedSegment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> shared::RouteRequest {
        shared::RouteRequest {
            start: " Stanley Park ".into(),
            end: "Science World".into(),
            date: "2024-06-21".into(),
            time: "12:00".into(),
            activity: "Walking".into(),
        }
    }

    #[test]
    fn valid_payload_is_trimmed_and_typed() {
        let req = RouteRequest::try_from(payload()).unwrap();
        assert_eq!(req.start(), "Stanley Park");
        assert_eq!(req.activity(), Activity::Walking);
        assert_eq!(req.time(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn rejects_bad_fields_with_their_name() {
        let cases = [
            (shared::RouteRequest { date: "21/06/2024".into(), ..payload() }, Field::Date),
            (shared::RouteRequest { time: "25:00".into(), ..payload() }, Field::Time),
            (shared::RouteRequest { time: "noon".into(), ..payload() }, Field::Time),
            (shared::RouteRequest { activity: "skating".into(), ..payload() }, Field::Activity),
            (shared::RouteRequest { start: "   ".into(), ..payload() }, Field::Start),
            (shared::RouteRequest { end: String::new(), ..payload() }, Field::End),
        ];

        for (bad, field) in cases {
            match RouteRequest::try_from(bad) {
                Err(PlanError::InvalidRequest { field: got, .. }) => assert_eq!(got, field),
                other => panic!("expected InvalidRequest on {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn activity_speeds() {
        assert_eq!(Activity::Walking.speed_kmh(), 5.0);
        assert_eq!(Activity::Cycling.speed_kmh(), 15.0);
        assert_eq!(Activity::Running.speed_kmh(), 9.0);
    }
}
