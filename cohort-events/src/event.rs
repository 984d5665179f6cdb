//! Invalidation event vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Named change notification carried by the [`InvalidationBus`](crate::InvalidationBus).
///
/// Events carry no payload: receivers re-query their own source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidationEvent {
    /// One or more predictions were stored.
    PredictionCreated,
    /// One or more predictions were removed.
    PredictionDeleted,
    /// The model was retrained on a regenerated dataset.
    ModelTrained,
}

impl InvalidationEvent {
    pub const ALL: [InvalidationEvent; 3] = [
        InvalidationEvent::PredictionCreated,
        InvalidationEvent::PredictionDeleted,
        InvalidationEvent::ModelTrained,
    ];

    /// Events that change the rows shown by list and table views.
    pub const PREDICTION_CHANGES: [InvalidationEvent; 2] = [
        InvalidationEvent::PredictionCreated,
        InvalidationEvent::PredictionDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationEvent::PredictionCreated => "predictionCreated",
            InvalidationEvent::PredictionDeleted => "predictionDeleted",
            InvalidationEvent::ModelTrained => "modelTrained",
        }
    }
}

impl fmt::Display for InvalidationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown invalidation event: {0}")]
pub struct UnknownEventError(pub String);

impl FromStr for InvalidationEvent {
    type Err = UnknownEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvalidationEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEventError(s.to_string()))
    }
}

/// A data-changing operation performed by some part of the client.
///
/// Batch operations map to a single event per batch, not one per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    SingleCreate,
    SingleDelete,
    BatchDelete,
    BatchUpload,
    DemoReset,
    Retrain,
}

impl MutationKind {
    /// The event announcing this mutation.
    pub fn event(&self) -> InvalidationEvent {
        match self {
            MutationKind::SingleCreate | MutationKind::BatchUpload => {
                InvalidationEvent::PredictionCreated
            }
            MutationKind::SingleDelete | MutationKind::BatchDelete | MutationKind::DemoReset => {
                InvalidationEvent::PredictionDeleted
            }
            MutationKind::Retrain => InvalidationEvent::ModelTrained,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_event_names_match_wire_vocabulary() {
        assert_eq!(InvalidationEvent::PredictionCreated.as_str(), "predictionCreated");
        assert_eq!(InvalidationEvent::PredictionDeleted.as_str(), "predictionDeleted");
        let json = serde_json::to_string(&InvalidationEvent::ModelTrained).unwrap();
        assert_eq!(json, "\"modelTrained\"");
    }

    #[test]
    fn test_mutations_map_to_two_prediction_events() {
        assert_eq!(MutationKind::SingleCreate.event(), InvalidationEvent::PredictionCreated);
        assert_eq!(MutationKind::BatchUpload.event(), InvalidationEvent::PredictionCreated);
        assert_eq!(MutationKind::SingleDelete.event(), InvalidationEvent::PredictionDeleted);
        assert_eq!(MutationKind::BatchDelete.event(), InvalidationEvent::PredictionDeleted);
        assert_eq!(MutationKind::DemoReset.event(), InvalidationEvent::PredictionDeleted);
        assert_eq!(MutationKind::Retrain.event(), InvalidationEvent::ModelTrained);
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = "studentRenamed".parse::<InvalidationEvent>().unwrap_err();
        assert!(err.to_string().contains("studentRenamed"));
    }

    proptest! {
        #[test]
        fn prop_display_parse_roundtrip(idx in 0usize..3) {
            let event = InvalidationEvent::ALL[idx];
            let parsed: InvalidationEvent = event.to_string().parse().unwrap();
            prop_assert_eq!(parsed, event);
        }

        #[test]
        fn prop_arbitrary_names_never_panic(name in "[a-zA-Z]{0,24}") {
            let parsed = name.parse::<InvalidationEvent>();
            prop_assert_eq!(
                parsed.is_ok(),
                InvalidationEvent::ALL.iter().any(|e| e.as_str() == name)
            );
        }
    }
}
