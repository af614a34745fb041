//! Compression Codec
//!
//! Lossy transform between a full [`PlayerRecord`] and the [`CompactRecord`]
//! kept in the cold tier. Only the summary subset survives; every other
//! attribute is dropped for good.
//!
//! # Example
//!
//! ```
//! use strata::cache::compact::{compress, decompress};
//! use strata::domain::PlayerRecord;
//!
//! let record = PlayerRecord::new("u1", "mage")
//!     .with_attribute("guild", serde_json::json!("night-watch"));
//!
//! let restored = decompress(&compress(&record));
//! assert!(restored.partial);
//! assert_eq!(restored.class, "mage");
//! assert!(restored.attribute("guild").is_err());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::domain::record::{class_code, class_name, PlayerRecord};

/// Compact summary of a player record.
///
/// `partial` is always `true`: a compact record is never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactRecord {
    pub id: String,
    #[serde(rename = "lvl")]
    pub level: u32,
    #[serde(rename = "exp")]
    pub experience: u64,
    #[serde(rename = "nrg")]
    pub energy: u32,
    #[serde(rename = "cls")]
    pub class_code: u8,
    #[serde(rename = "lst")]
    pub last_active: DateTime<Utc>,
    #[serde(rename = "dmg")]
    pub damage_dealt: u64,
    #[serde(rename = "crd")]
    pub credits: u64,
    pub partial: bool,
}

/// Reduce a full record to its compact summary.
pub fn compress(record: &PlayerRecord) -> CompactRecord {
    CompactRecord {
        id: record.id.clone(),
        level: record.level,
        experience: record.experience,
        energy: record.energy,
        class_code: class_code(&record.class),
        last_active: record.last_active,
        damage_dealt: record.damage_dealt,
        credits: record.credits,
        partial: true,
    }
}

/// Rebuild a degraded player record from a compact summary.
///
/// The result has no attributes and is marked `partial`.
pub fn decompress(compact: &CompactRecord) -> PlayerRecord {
    PlayerRecord {
        id: compact.id.clone(),
        level: compact.level,
        experience: compact.experience,
        energy: compact.energy,
        class: class_name(compact.class_code).to_string(),
        last_active: compact.last_active,
        damage_dealt: compact.damage_dealt,
        credits: compact.credits,
        attributes: Map::new(),
        partial: true,
    }
}

// =============================================================================
// Tests
// =============================================================================
