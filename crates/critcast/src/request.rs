//! Authoring a roll from user input.

use chrono::Utc;
use critcast_dice::RollOutcome;
use critcast_protocol::{NewRoll, RollContext, RollSource, TableId};
use rand::Rng;

use crate::CritcastError;

/// What the user asked to roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollRequest {
    pub notation: String,
    pub character: String,
    pub roll_type: String,
    pub weapon: Option<String>,
}

impl RollRequest {
    pub fn new(
        notation: impl Into<String>,
        character: impl Into<String>,
        roll_type: impl Into<String>,
    ) -> Self {
        Self {
            notation: notation.into(),
            character: character.into(),
            roll_type: roll_type.into(),
            weapon: None,
        }
    }

    pub fn with_weapon(mut self, weapon: impl Into<String>) -> Self {
        self.weapon = Some(weapon.into());
        self
    }

    /// Trims every field and drops a blank weapon.
    ///
    /// # Errors
    /// [`CritcastError::MissingRollField`] when notation or character is
    /// blank.
    pub fn normalized(self) -> Result<Self, CritcastError> {
        let notation = self.notation.trim().to_string();
        let character = self.character.trim().to_string();
        if notation.is_empty() {
            return Err(CritcastError::MissingRollField("notation"));
        }
        if character.is_empty() {
            return Err(CritcastError::MissingRollField("character"));
        }
        Ok(Self {
            notation,
            character,
            roll_type: self.roll_type.trim().to_string(),
            weapon: self
                .weapon
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty()),
        })
    }

    /// Parses and rolls the notation, producing the ingest body.
    ///
    /// # Errors
    /// [`CritcastError::Dice`] when the notation has no usable term or
    /// cannot be rolled without overflowing.
    pub(crate) fn author<R: Rng>(
        &self,
        table_id: TableId,
        source: RollSource,
        rng: &mut R,
    ) -> Result<NewRoll, CritcastError> {
        let terms = critcast_dice::parse(&self.notation)?;
        let RollOutcome {
            dice,
            modifiers,
            total,
        } = critcast_dice::simulate_with(&terms, rng)?;

        Ok(NewRoll {
            table_id,
            notation: self.notation.clone(),
            dice,
            modifiers,
            total,
            context: RollContext {
                roll_type: Some(self.roll_type.clone()).filter(|t| !t.is_empty()),
                character: Some(self.character.clone()),
                weapon: self.weapon.clone(),
                ..RollContext::default()
            },
            source,
            timestamp: Utc::now(),
        })
    }
}
