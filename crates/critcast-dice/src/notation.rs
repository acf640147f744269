//! Dice notation parsing.
//!
//! Supports additive combinations of die groups and flat numbers:
//! `1d20+5`, `2d6-1`, `d8`, `1d4+1d6+2`, `-1d20`.
//!
//! Parsing is lenient. A term that is neither a valid die group nor a
//! number (`+abc`, `1d0`, `2dx`) is skipped, and the parse fails only when
//! no usable term remains. A well-formed term that is too large to roll
//! (more than [`MAX_DICE_PER_GROUP`] dice, or a number beyond `i64`) is
//! rejected instead of skipped.

use std::fmt;

use crate::DiceError;

/// Largest die count accepted in a single group.
pub const MAX_DICE_PER_GROUP: u32 = 1_000;

/// One signed component of a notation string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    /// Roll `count` dice with `sides` faces each.
    DieGroup {
        count: u32,
        sides: u32,
        negative: bool,
    },
    /// Add or subtract a fixed amount.
    Flat { value: u64, negative: bool },
}

impl Term {
    /// Whether the term subtracts from the total.
    pub fn is_negative(&self) -> bool {
        match self {
            Self::DieGroup { negative, .. } | Self::Flat { negative, .. } => *negative,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { '-' } else { '+' };
        match self {
            Self::DieGroup { count, sides, .. } => write!(f, "{sign}{count}d{sides}"),
            Self::Flat { value, .. } => write!(f, "{sign}{value}"),
        }
    }
}

/// Parses notation into its ordered, signed terms.
///
/// The input is lower-cased and stripped of all whitespace, then split
/// before every `+` or `-`. Each piece is read as `[count]d<sides>` (count
/// defaults to 1 when missing, unparsable or zero) or as a plain number.
///
/// # Errors
/// Returns [`DiceError::InvalidNotation`] when the normalized input is
/// empty, none of its pieces is a usable term, or a term exceeds the
/// supported range.
///
/// # Example
///
/// ```rust
/// use critcast_dice::{parse, Term};
///
/// let terms = parse("2d6 + 3").unwrap();
/// assert_eq!(
///     terms,
///     vec![
///         Term::DieGroup { count: 2, sides: 6, negative: false },
///         Term::Flat { value: 3, negative: false },
///     ]
/// );
/// ```
pub fn parse(notation: &str) -> Result<Vec<Term>, DiceError> {
    let normalized: String = notation
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    if normalized.is_empty() {
        return Err(DiceError::invalid(notation, "notation is empty"));
    }

    let mut terms = Vec::new();
    for piece in split_signed(&normalized) {
        match parse_term(piece) {
            Ok(Some(term)) => terms.push(term),
            Ok(None) => tracing::debug!(piece, notation, "skipping unrecognized dice term"),
            Err(reason) => return Err(DiceError::invalid(notation, &reason)),
        }
    }

    if terms.is_empty() {
        return Err(DiceError::invalid(notation, "no recognizable dice or numbers"));
    }
    Ok(terms)
}

/// Splits before every sign character, so each piece after the first
/// starts with `+` or `-`.
fn split_signed(input: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, c) in input.char_indices() {
        if (c == '+' || c == '-') && idx > start {
            pieces.push(&input[start..idx]);
            start = idx;
        }
    }
    pieces.push(&input[start..]);
    pieces
}

/// `Ok(None)` for a piece that is not a term at all, `Err` for a term that
/// is recognizable but out of range.
fn parse_term(piece: &str) -> Result<Option<Term>, String> {
    let (negative, body) = match piece.as_bytes().first() {
        Some(b'-') => (true, &piece[1..]),
        Some(b'+') => (false, &piece[1..]),
        _ => (false, piece),
    };

    if let Some((count_text, sides)) = body.split_once('d') {
        let Some(sides) = sides.parse::<u32>().ok().filter(|s| *s > 0) else {
            return Ok(None);
        };
        // Missing, zero or non-numeric counts mean one die.
        let count = if is_digits(count_text) {
            match count_text.parse::<u32>() {
                Ok(0) => 1,
                Ok(n) if n <= MAX_DICE_PER_GROUP => n,
                _ => {
                    return Err(format!(
                        "{count_text}d{sides} rolls more than {MAX_DICE_PER_GROUP} dice"
                    ));
                }
            }
        } else {
            1
        };
        return Ok(Some(Term::DieGroup {
            count,
            sides,
            negative,
        }));
    }

    if !is_digits(body) {
        return Ok(None);
    }
    match body.parse::<u64>() {
        Ok(value) if value <= i64::MAX as u64 => Ok(Some(Term::Flat { value, negative })),
        _ => Err(format!("{body} is too large")),
    }
}

fn is_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
