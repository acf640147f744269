//! Roll data types shared by the wire protocol, the feed, and the REST
//! ingest endpoint.
//!
//! Field names follow the server's camelCase JSON. Fields that remote
//! peers are known to omit carry `#[serde(default)]` so a sparse payload
//! still decodes into a usable [`RollRecord`].

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque unique identifier of a roll.
///
/// Server-assigned for rolls that went through the ingest endpoint,
/// client-generated (see [`RollId::generate`]) for rolls synthesized from
/// proxy events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RollId(pub String);

impl RollId {
    /// Generates a fresh id of the form `roll_<unix-millis>_<9 base36 chars>`.
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::rng();
        let suffix: String = (0..9)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!("roll_{}_{suffix}", Utc::now().timestamp_millis()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RollId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a shared rolling table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub String);

impl TableId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TableId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Dice and modifiers
// ---------------------------------------------------------------------------

/// The kind of a single die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DieKind {
    #[default]
    Standard,
}

/// The outcome of one die.
///
/// `value` already carries the sign of the term it came from, so a die
/// rolled for `-1d20` has a value in `-20..=-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieResult {
    /// Number of faces. `None` when the peer did not say (proxy rolls
    /// only carry raw values).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sides: Option<u32>,
    pub value: i64,
    #[serde(rename = "type", default)]
    pub kind: DieKind,
}

impl DieResult {
    /// A standard die with known sides.
    pub fn standard(sides: u32, value: i64) -> Self {
        Self {
            sides: Some(sides),
            value,
            kind: DieKind::Standard,
        }
    }

    /// A die whose size is unknown.
    pub fn unknown_sides(value: i64) -> Self {
        Self {
            sides: None,
            value,
            kind: DieKind::Standard,
        }
    }
}

impl fmt::Display for DieResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sides {
            Some(sides) => write!(f, "d{sides}({})", self.value),
            None => write!(f, "d?({})", self.value),
        }
    }
}

/// Whether a modifier adds to or subtracts from the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierKind {
    #[default]
    Add,
    Subtract,
}

fn default_modifier_origin() -> String {
    "modifier".to_string()
}

/// A flat modifier applied to a roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierResult {
    #[serde(rename = "type", default)]
    pub kind: ModifierKind,
    /// Magnitude; the direction lives in `kind`.
    pub value: u64,
    #[serde(rename = "source", default = "default_modifier_origin")]
    pub origin: String,
}

impl ModifierResult {
    /// Builds a modifier from a signed amount.
    pub fn from_signed(amount: i64) -> Self {
        Self {
            kind: if amount < 0 {
                ModifierKind::Subtract
            } else {
                ModifierKind::Add
            },
            value: amount.unsigned_abs(),
            origin: default_modifier_origin(),
        }
    }

    /// The modifier's contribution to a total.
    pub fn signed_value(&self) -> i64 {
        let magnitude = i64::try_from(self.value).unwrap_or(i64::MAX);
        match self.kind {
            ModifierKind::Add => magnitude,
            ModifierKind::Subtract => -magnitude,
        }
    }
}

impl fmt::Display for ModifierResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.kind {
            ModifierKind::Add => '+',
            ModifierKind::Subtract => '-',
        };
        write!(f, "{sign}{}", self.value)
    }
}

// ---------------------------------------------------------------------------
// Context and source
// ---------------------------------------------------------------------------

/// Who rolled, and what for.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weapon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
}

/// Where a roll came from.
///
/// Serialized as a plain string (`"app"`, `"proxy"`, or whatever the peer
/// sent) so unknown kinds survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    App,
    Proxy,
    Other(String),
}

impl From<String> for SourceKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "app" => Self::App,
            "proxy" => Self::Proxy,
            _ => Self::Other(value),
        }
    }
}

impl From<SourceKind> for String {
    fn from(value: SourceKind) -> Self {
        match value {
            SourceKind::App => "app".to_string(),
            SourceKind::Proxy => "proxy".to_string(),
            SourceKind::Other(other) => other,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => f.write_str("app"),
            Self::Proxy => f.write_str("proxy"),
            Self::Other(other) => f.write_str(other),
        }
    }
}

impl Default for SourceKind {
    fn default() -> Self {
        Self::Other("unknown".to_string())
    }
}

/// Descriptor of the application that produced a roll.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RollSource {
    #[serde(rename = "type", default)]
    pub kind: SourceKind,
    #[serde(rename = "appName", default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ---------------------------------------------------------------------------
// Roll records
// ---------------------------------------------------------------------------

/// The canonical unit stored in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollRecord {
    #[serde(rename = "rollId")]
    pub id: RollId,
    pub notation: String,
    #[serde(default)]
    pub dice: Vec<DieResult>,
    #[serde(default)]
    pub modifiers: Vec<ModifierResult>,
    pub total: i64,
    #[serde(default)]
    pub context: RollContext,
    #[serde(default)]
    pub source: RollSource,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl RollRecord {
    /// Signed sum of every die and modifier, saturating at the `i64`
    /// bounds. Equals `total` for rolls simulated by this client.
    pub fn component_sum(&self) -> i64 {
        self.dice
            .iter()
            .map(|d| d.value)
            .chain(self.modifiers.iter().map(ModifierResult::signed_value))
            .fold(0i64, i64::saturating_add)
    }
}

impl fmt::Display for RollRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.notation, self.total)?;
        let dice: Vec<String> = self.dice.iter().map(ToString::to_string).collect();
        let mods: Vec<String> = self.modifiers.iter().map(ToString::to_string).collect();
        let detail = match (dice.is_empty(), mods.is_empty()) {
            (true, true) => return Ok(()),
            (false, true) => dice.join(" + "),
            (true, false) => mods.join(" "),
            (false, false) => format!("{} {}", dice.join(" + "), mods.join(" ")),
        };
        write!(f, " [{detail}]")
    }
}

/// Body of a `POST /api/v1/ingest` request: a roll without its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRoll {
    pub table_id: TableId,
    pub notation: String,
    pub dice: Vec<DieResult>,
    pub modifiers: Vec<ModifierResult>,
    pub total: i64,
    pub context: RollContext,
    pub source: RollSource,
    pub timestamp: DateTime<Utc>,
}

impl NewRoll {
    /// Turns the submitted roll into a feed record once the server has
    /// assigned its id.
    pub fn into_record(self, id: RollId) -> RollRecord {
        RollRecord {
            id,
            notation: self.notation,
            dice: self.dice,
            modifiers: self.modifiers,
            total: self.total,
            context: self.context,
            source: self.source,
            timestamp: self.timestamp,
        }
    }
}

/// Successful response of the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub roll_id: RollId,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> RollRecord {
        RollRecord {
            id: RollId::from("r-1"),
            notation: "2d6+3".into(),
            dice: vec![DieResult::standard(6, 4), DieResult::standard(6, 2)],
            modifiers: vec![ModifierResult::from_signed(3)],
            total: 9,
            context: RollContext {
                roll_type: Some("attack".into()),
                character: Some("Vex".into()),
                weapon: Some("longbow".into()),
                ..RollContext::default()
            },
            source: RollSource {
                kind: SourceKind::App,
                label: Some("CritCast Client".into()),
                version: None,
            },
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn test_roll_record_json_uses_wire_field_names() {
        let json = serde_json::to_value(sample_record()).unwrap();

        assert_eq!(json["rollId"], "r-1");
        assert_eq!(json["dice"][0]["sides"], 6);
        assert_eq!(json["dice"][0]["type"], "standard");
        assert_eq!(json["modifiers"][0]["type"], "add");
        assert_eq!(json["modifiers"][0]["source"], "modifier");
        assert_eq!(json["context"]["rollType"], "attack");
        assert_eq!(json["source"]["type"], "app");
        assert_eq!(json["source"]["appName"], "CritCast Client");
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_absent_optional_fields_are_omitted() {
        let json = serde_json::to_value(sample_record()).unwrap();
        let context = json["context"].as_object().unwrap();

        assert!(!context.contains_key("spell"));
        assert!(!context.contains_key("skill"));
        assert!(json["source"].get("version").is_none());
    }

    #[test]
    fn test_sparse_roll_record_decodes_with_defaults() {
        let json = r#"{"rollId": "abc", "notation": "1d20", "total": 12}"#;
        let record: RollRecord = serde_json::from_str(json).unwrap();

        assert!(record.dice.is_empty());
        assert!(record.modifiers.is_empty());
        assert_eq!(record.context, RollContext::default());
        assert_eq!(record.source.kind, SourceKind::Other("unknown".into()));
    }

    #[test]
    fn test_die_without_sides_decodes_as_unknown() {
        let die: DieResult = serde_json::from_str(r#"{"value": 5}"#).unwrap();
        assert_eq!(die, DieResult::unknown_sides(5));
        assert_eq!(die.to_string(), "d?(5)");
    }

    #[test]
    fn test_source_kind_keeps_unknown_strings() {
        let source: RollSource =
            serde_json::from_str(r#"{"type": "discord-bot"}"#).unwrap();
        assert_eq!(source.kind, SourceKind::Other("discord-bot".into()));

        let back = serde_json::to_value(&source).unwrap();
        assert_eq!(back["type"], "discord-bot");
    }

    #[test]
    fn test_modifier_from_signed_splits_sign_and_magnitude() {
        let minus = ModifierResult::from_signed(-2);
        assert_eq!(minus.kind, ModifierKind::Subtract);
        assert_eq!(minus.value, 2);
        assert_eq!(minus.signed_value(), -2);
        assert_eq!(minus.to_string(), "-2");

        assert_eq!(ModifierResult::from_signed(0).kind, ModifierKind::Add);
    }

    #[test]
    fn test_component_sum_matches_total() {
        let record = sample_record();
        assert_eq!(record.component_sum(), record.total);
    }

    #[test]
    fn test_roll_record_display() {
        assert_eq!(
            sample_record().to_string(),
            "2d6+3 = 9 [d6(4) + d6(2) +3]"
        );
    }

    #[test]
    fn test_new_roll_serializes_table_id_without_roll_id() {
        let record = sample_record();
        let new_roll = NewRoll {
            table_id: TableId::from("table-7"),
            notation: record.notation,
            dice: record.dice,
            modifiers: record.modifiers,
            total: record.total,
            context: record.context,
            source: record.source,
            timestamp: record.timestamp,
        };
        let json = serde_json::to_value(&new_roll).unwrap();

        assert_eq!(json["tableId"], "table-7");
        assert!(json.get("rollId").is_none());

        let stored = new_roll.into_record(RollId::from("srv-9"));
        assert_eq!(stored.id.as_str(), "srv-9");
        assert_eq!(stored.total, 9);
    }

    #[test]
    fn test_ingest_receipt_reads_roll_id() {
        let receipt: IngestReceipt =
            serde_json::from_str(r#"{"rollId": "srv-1", "status": "ok"}"#).unwrap();
        assert_eq!(receipt.roll_id, RollId::from("srv-1"));
    }

    #[test]
    fn test_generated_roll_ids_have_expected_shape_and_differ() {
        let a = RollId::generate();
        let b = RollId::generate();

        assert!(a.as_str().starts_with("roll_"));
        let suffix = a.as_str().rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
