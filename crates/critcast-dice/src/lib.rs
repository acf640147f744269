//! Dice notation interpreter for CritCast.
//!
//! Two steps, usable separately or together:
//!
//! 1. [`parse`] turns `"2d6+3"` into ordered, signed [`Term`]s.
//! 2. [`simulate`] rolls the terms into a [`RollOutcome`] of dice,
//!    modifiers, and a total.
//!
//! [`roll`] does both. Randomness is for casual tabletop use; it is not
//! meant to be cryptographically fair.

mod error;
mod notation;
mod roll;

pub use error::DiceError;
pub use notation::{MAX_DICE_PER_GROUP, Term, parse};
pub use roll::{RollOutcome, roll, simulate, simulate_with};
