//! Entity errors - failures converting entities to and from their wire form

use thiserror::Error;

use crate::entities::EntityKind;

/// Entity conversion errors
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Expected a JSON object for {0}")]
    NotAnObject(EntityKind),

    #[error("Failed to decode {kind}: {source}")]
    Decode {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {kind}: {source}")]
    Encode {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

impl EntityError {
    /// Get the kind of entity involved
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::NotAnObject(kind)
            | Self::Decode { kind, .. }
            | Self::Encode { kind, .. } => *kind,
        }
    }
}
