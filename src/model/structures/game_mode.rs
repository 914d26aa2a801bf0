use serde_repr::{Deserialize_repr, Serialize_repr};
use std::convert::TryFrom;
use strum_macros::EnumIter;

#[derive(Deserialize_repr, Serialize_repr, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
#[repr(u8)]
pub enum GameMode {
    Racing = 0,
    Football = 1
}

impl GameMode {
    /// Wire name used by the sessions table (`mode` column).
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Racing => "carreras",
            GameMode::Football => "futbol"
        }
    }
}

impl TryFrom<i32> for GameMode {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(GameMode::Racing),
            1 => Ok(GameMode::Football),
            _ => Err(())
        }
    }
}

impl TryFrom<&str> for GameMode {
    type Error = ();

    fn try_from(v: &str) -> Result<Self, Self::Error> {
        match v {
            "carreras" => Ok(GameMode::Racing),
            "futbol" => Ok(GameMode::Football),
            _ => Err(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::structures::game_mode::GameMode;
    use strum::IntoEnumIterator;

    #[test]
    fn test_convert_racing() {
        assert_eq!(GameMode::try_from(0), Ok(GameMode::Racing));
    }

    #[test]
    fn test_convert_football() {
        assert_eq!(GameMode::try_from(1), Ok(GameMode::Football));
    }

    #[test]
    fn test_convert_invalid() {
        assert_eq!(GameMode::try_from(2), Err(()));
    }

    #[test]
    fn test_wire_names_round_trip() {
        for mode in GameMode::iter() {
            assert_eq!(GameMode::try_from(mode.as_str()), Ok(mode));
        }
    }

    #[test]
    fn test_convert_unknown_wire_name() {
        assert_eq!(GameMode::try_from("ajedrez"), Err(()));
    }
}
