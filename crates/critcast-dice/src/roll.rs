//! Roll simulation: turns parsed terms into dice, modifiers, and a total.

use critcast_protocol::{DieResult, ModifierResult};
use rand::Rng;

use crate::{DiceError, Term, parse};

/// The folded result of rolling a list of terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollOutcome {
    /// One entry per die rolled, in declaration order, sign applied.
    pub dice: Vec<DieResult>,
    /// One entry per flat term, in declaration order.
    pub modifiers: Vec<ModifierResult>,
    /// Signed sum of every die and modifier.
    pub total: i64,
}

/// Rolls `terms` with the thread-local RNG.
///
/// # Errors
/// Returns [`DiceError::InvalidNotation`] if the total does not fit in an
/// `i64`.
pub fn simulate(terms: &[Term]) -> Result<RollOutcome, DiceError> {
    simulate_with(terms, &mut rand::rng())
}

/// Rolls `terms` with the given RNG. Use a seeded RNG for reproducible
/// results.
///
/// # Errors
/// Same as [`simulate`].
pub fn simulate_with<R: Rng>(terms: &[Term], rng: &mut R) -> Result<RollOutcome, DiceError> {
    let mut dice = Vec::new();
    let mut modifiers = Vec::new();
    let mut total: i64 = 0;

    for term in terms {
        match *term {
            Term::DieGroup {
                count,
                sides,
                negative,
            } => {
                for _ in 0..count {
                    let face = i64::from(rng.random_range(1..=sides));
                    let value = if negative { -face } else { face };
                    dice.push(DieResult::standard(sides, value));
                    total = checked_total(terms, total, value)?;
                }
            }
            Term::Flat { value, negative } => {
                let magnitude = i64::try_from(value)
                    .map_err(|_| DiceError::invalid(&render(terms), "modifier is too large"))?;
                let signed = if negative { -magnitude } else { magnitude };
                modifiers.push(ModifierResult::from_signed(signed));
                total = checked_total(terms, total, signed)?;
            }
        }
    }

    Ok(RollOutcome {
        dice,
        modifiers,
        total,
    })
}

fn checked_total(terms: &[Term], total: i64, value: i64) -> Result<i64, DiceError> {
    total
        .checked_add(value)
        .ok_or_else(|| DiceError::invalid(&render(terms), "total is out of range"))
}

fn render(terms: &[Term]) -> String {
    terms.iter().map(ToString::to_string).collect()
}

/// Parses and rolls `notation` in one step.
///
/// # Errors
/// Returns [`DiceError::InvalidNotation`] if the notation has no usable term
/// or its total overflows.
pub fn roll(notation: &str) -> Result<RollOutcome, DiceError> {
    let terms = parse(notation)?;
    let outcome = simulate(&terms)?;
    tracing::debug!(notation, total = outcome.total, dice = outcome.dice.len(), "rolled");
    Ok(outcome)
}
