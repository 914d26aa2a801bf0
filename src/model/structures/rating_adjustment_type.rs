use serde_repr::{Deserialize_repr, Serialize_repr};

/// Classifies a row in the rating audit trail.
#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RatingAdjustmentType {
    /// Record created with default values on first sighting of a player.
    Initial = 0,
    /// Updated from at least one outcome in the rating period.
    Rated = 1,
    /// Zero games in the period; deviation inflated only.
    Decay = 2
}
