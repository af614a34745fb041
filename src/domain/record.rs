//! Player Records
//!
//! The full-fidelity entity record tracked by the cache, and the stable
//! class table shared by the compression codec.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// =============================================================================
// Class Table
// =============================================================================

/// Code used for any class name missing from the table.
pub const FALLBACK_CLASS_CODE: u8 = 0;

/// Canonical class names indexed by their compact code.
const CLASS_NAMES: [&str; 6] = ["novice", "warrior", "mage", "rogue", "ranger", "cleric"];

static CLASS_CODES: Lazy<std::collections::HashMap<&'static str, u8>> = Lazy::new(|| {
    CLASS_NAMES
        .iter()
        .enumerate()
        .map(|(code, name)| (*name, code as u8))
        .collect()
});

/// Map a class name to its compact code. Unknown names get the fallback code.
pub fn class_code(name: &str) -> u8 {
    CLASS_CODES
        .get(name.trim().to_ascii_lowercase().as_str())
        .copied()
        .unwrap_or(FALLBACK_CLASS_CODE)
}

/// Map a compact code back to its canonical class name.
pub fn class_name(code: u8) -> &'static str {
    CLASS_NAMES
        .get(code as usize)
        .copied()
        .unwrap_or(CLASS_NAMES[FALLBACK_CLASS_CODE as usize])
}

// =============================================================================
// Player Record
// =============================================================================

/// Full player record as held by hot and warm tiers.
///
/// Only the summary fields are understood by the cache; everything else the
/// application tracks (inventory, quests, settings, ...) lives in `attributes`
/// and is dropped when the record is compressed into the cold tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Player identifier
    pub id: String,
    /// Character level
    pub level: u32,
    /// Accumulated experience
    pub experience: u64,
    /// Resource pool (energy)
    pub energy: u32,
    /// Class name
    pub class: String,
    /// Last time the player was active
    pub last_active: DateTime<Utc>,
    /// Total damage dealt
    pub damage_dealt: u64,
    /// Currency balance
    pub credits: u64,
    /// Everything outside the summary subset
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Set when this record was rebuilt from a compact record
    #[serde(default)]
    pub partial: bool,
}

impl PlayerRecord {
    /// Create a fresh level-1 record.
    pub fn new(id: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level: 1,
            experience: 0,
            energy: 100,
            class: class.into(),
            last_active: Utc::now(),
            damage_dealt: 0,
            credits: 0,
            attributes: Map::new(),
            partial: false,
        }
    }

    /// Set an extra attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Copy the summary fields of `summary` onto this record.
    ///
    /// The class changes only when `summary` carries a different class code,
    /// so a class name missing from the table is not degraded to the fallback.
    pub fn with_summary_of(mut self, summary: &PlayerRecord) -> Self {
        self.level = summary.level;
        self.experience = summary.experience;
        self.energy = summary.energy;
        self.last_active = summary.last_active;
        self.damage_dealt = summary.damage_dealt;
        self.credits = summary.credits;
        if class_code(&summary.class) != class_code(&self.class) {
            self.class = summary.class.clone();
        }
        self
    }

    /// Whether this record can be trusted for fields outside the summary subset.
    pub fn is_authoritative(&self) -> bool {
        !self.partial
    }

    /// Read an attribute outside the summary subset.
    ///
    /// Fails on partial records: their attribute map is empty because the data
    /// was dropped on compression, not because the player has none.
    pub fn attribute(&self, name: &str) -> Result<Option<&Value>> {
        if self.partial {
            return Err(Error::PartialRecord {
                id: self.id.clone(),
                field: name.to_string(),
            });
        }
        Ok(self.attributes.get(name))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_class_table_is_bidirectional() {
        for (code, name) in CLASS_NAMES.iter().enumerate() {
            assert_eq!(class_code(name), code as u8);
            assert_eq!(class_name(code as u8), *name);
        }
    }

    #[test]
    fn test_class_code_normalizes_case() {
        assert_eq!(class_code("Mage"), 2);
        assert_eq!(class_code("  ROGUE "), 3);
    }

    #[test]
    fn test_unknown_class_falls_back() {
        assert_eq!(class_code("bard"), FALLBACK_CLASS_CODE);
        assert_eq!(class_name(200), "novice");
    }

    #[test]
    fn test_new_record_is_authoritative() {
        let record = PlayerRecord::new("u1", "warrior");
        assert!(record.is_authoritative());
        assert_eq!(record.level, 1);
    }

    #[test]
    fn test_attribute_access_on_full_record() {
        let record =
            PlayerRecord::new("u1", "warrior").with_attribute("guild", json!("night-watch"));
        assert_eq!(record.attribute("guild").unwrap(), Some(&json!("night-watch")));
        assert_eq!(record.attribute("missing").unwrap(), None);
    }

    #[test]
    fn test_summary_fields_merge_onto_full_record() {
        let full = PlayerRecord::new("u1", "bard").with_attribute("guild", json!("ash"));
        let mut summary = PlayerRecord::new("u1", "novice");
        summary.partial = true;
        summary.level = 14;
        summary.credits = 300;

        let merged = full.with_summary_of(&summary);
        assert_eq!((merged.level, merged.credits), (14, 300));
        assert_eq!(merged.class, "bard");
        assert!(merged.is_authoritative());
        assert_eq!(merged.attribute("guild").unwrap(), Some(&json!("ash")));

        summary.class = "mage".into();
        assert_eq!(merged.with_summary_of(&summary).class, "mage");
    }

    #[test]
    fn test_attribute_access_on_partial_record_fails() {
        let mut record = PlayerRecord::new("u1", "warrior");
        record.partial = true;

        assert_matches!(
            record.attribute("guild"),
            Err(Error::PartialRecord { id, field }) if id == "u1" && field == "guild"
        );
    }

    #[test]
    fn test_record_deserializes_without_optional_fields() {
        let record: PlayerRecord = serde_json::from_value(json!({
            "id": "u9",
            "level": 3,
            "experience": 40,
            "energy": 90,
            "class": "cleric",
            "last_active": "2024-05-01T12:00:00Z",
            "damage_dealt": 7,
            "credits": 12
        }))
        .unwrap();

        assert!(record.attributes.is_empty());
        assert!(!record.partial);
    }
}
