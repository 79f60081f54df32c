use std::fmt;

use thiserror::Error;

/// Request field an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Start,
    End,
    Date,
    Time,
    Activity,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Start => "start",
            Field::End => "end",
            Field::Date => "date",
            Field::Time => "time",
            Field::Activity => "activity",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("{field} location {query:?} did not match any landmark or coordinate")]
    LocationNotResolved { field: Field, query: String },
    #[error("{field} location {query:?} is ambiguous, matches: {}", candidates.join(", "))]
    AmbiguousLocation {
        field: Field,
        query: String,
        candidates: Vec<String>,
    },
    #[error("{field} location is not reachable on the path network")]
    NoRouteFound { field: Field },
    #[error("invalid {field}: {reason}")]
    InvalidRequest { field: Field, reason: String },
    #[error("route computation exceeded its deadline")]
    RouteComputationTimeout,
}

impl PlanError {
    pub fn invalid(field: Field, reason: impl Into<String>) -> Self {
        PlanError::InvalidRequest {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::LocationNotResolved { .. } => "LocationNotResolved",
            PlanError::AmbiguousLocation { .. } => "AmbiguousLocation",
            PlanError::NoRouteFound { .. } => "NoRouteFound",
            PlanError::InvalidRequest { .. } => "InvalidRequest",
            PlanError::RouteComputationTimeout => "RouteComputationTimeout",
        }
    }

    pub fn field(&self) -> Option<Field> {
        match self {
            PlanError::LocationNotResolved { field, .. }
            | PlanError::AmbiguousLocation { field, .. }
            | PlanError::NoRouteFound { field }
            | PlanError::InvalidRequest { field, .. } => Some(*field),
            PlanError::RouteComputationTimeout => None,
        }
    }
}
