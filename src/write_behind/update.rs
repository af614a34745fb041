//! Pending Update Records
//!
//! Each write-behind buffer holds updates of exactly one [`UpdateKind`].
//! [`UpdateKind::Player`] carries a whole player row written through the
//! cache. The other kinds are raw counter updates: their fields are optional
//! and only the fields a caller supplied are written, so a partial update
//! never resets the columns it leaves out.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::PlayerRecord;
use crate::error::{Error, Result};

// =============================================================================
// Update Kind
// =============================================================================

/// Entity kinds with a write-behind buffer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Full player row, replaced as a whole
    Player,
    Stats,
    Inventory,
    Achievements,
    Telemetry,
}

impl UpdateKind {
    /// Every kind, in buffer order.
    pub const ALL: [UpdateKind; 5] = [
        UpdateKind::Player,
        UpdateKind::Stats,
        UpdateKind::Inventory,
        UpdateKind::Achievements,
        UpdateKind::Telemetry,
    ];

    /// Kinds accepted from raw caller fields.
    pub const RAW: [UpdateKind; 4] = [
        UpdateKind::Stats,
        UpdateKind::Inventory,
        UpdateKind::Achievements,
        UpdateKind::Telemetry,
    ];

    /// Position of this kind in [`UpdateKind::ALL`].
    pub const fn index(self) -> usize {
        match self {
            UpdateKind::Player => 0,
            UpdateKind::Stats => 1,
            UpdateKind::Inventory => 2,
            UpdateKind::Achievements => 3,
            UpdateKind::Telemetry => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            UpdateKind::Player => "player",
            UpdateKind::Stats => "stats",
            UpdateKind::Inventory => "inventory",
            UpdateKind::Achievements => "achievements",
            UpdateKind::Telemetry => "telemetry",
        }
    }

    /// Backing-store table receiving this kind.
    ///
    /// Stats land on the player row itself, so a later load sees them.
    pub const fn table(self) -> &'static str {
        match self {
            UpdateKind::Player | UpdateKind::Stats => "players",
            UpdateKind::Inventory => "player_inventory",
            UpdateKind::Achievements => "player_achievements",
            UpdateKind::Telemetry => "player_telemetry",
        }
    }

    /// Value columns written for this kind, excluding `id`.
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            UpdateKind::Player => &[
                "level",
                "experience",
                "energy",
                "class",
                "last_active",
                "damage_dealt",
                "credits",
                "attributes",
            ],
            UpdateKind::Stats => &["level", "experience", "energy", "damage_dealt", "credits"],
            UpdateKind::Inventory => &["item_count", "rare_items", "equipped"],
            UpdateKind::Achievements => &["unlocked", "points"],
            UpdateKind::Telemetry => &["sessions", "commands", "play_seconds"],
        }
    }

    /// Whether updates of this kind replace the whole row.
    pub const fn replaces_row(self) -> bool {
        matches!(self, UpdateKind::Player)
    }
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for UpdateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UpdateKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::ValidationFailure {
                field: "kind".into(),
                reason: format!("unknown update kind '{}'", s),
            })
    }
}

// =============================================================================
// Typed Field Sets
// =============================================================================

/// Core player statistics. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatUpdate {
    pub id: String,
    pub level: Option<u32>,
    pub experience: Option<u64>,
    pub energy: Option<u32>,
    pub damage_dealt: Option<u64>,
    pub credits: Option<u64>,
}

impl StatUpdate {
    fn merge(&mut self, newer: StatUpdate) {
        self.level = newer.level.or(self.level);
        self.experience = newer.experience.or(self.experience);
        self.energy = newer.energy.or(self.energy);
        self.damage_dealt = newer.damage_dealt.or(self.damage_dealt);
        self.credits = newer.credits.or(self.credits);
    }

    /// Write the supplied fields onto `record`.
    pub fn apply_to(&self, record: &mut PlayerRecord) {
        if let Some(level) = self.level {
            record.level = level;
        }
        if let Some(experience) = self.experience {
            record.experience = experience;
        }
        if let Some(energy) = self.energy {
            record.energy = energy;
        }
        if let Some(damage_dealt) = self.damage_dealt {
            record.damage_dealt = damage_dealt;
        }
        if let Some(credits) = self.credits {
            record.credits = credits;
        }
    }
}

/// Inventory summary counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUpdate {
    pub id: String,
    pub item_count: Option<u64>,
    pub rare_items: Option<u64>,
    pub equipped: Option<u64>,
}

impl InventoryUpdate {
    fn merge(&mut self, newer: InventoryUpdate) {
        self.item_count = newer.item_count.or(self.item_count);
        self.rare_items = newer.rare_items.or(self.rare_items);
        self.equipped = newer.equipped.or(self.equipped);
    }
}

/// Achievement progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementUpdate {
    pub id: String,
    pub unlocked: Option<u64>,
    pub points: Option<u64>,
}

impl AchievementUpdate {
    fn merge(&mut self, newer: AchievementUpdate) {
        self.unlocked = newer.unlocked.or(self.unlocked);
        self.points = newer.points.or(self.points);
    }
}

/// Usage telemetry counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    pub id: String,
    pub sessions: Option<u64>,
    pub commands: Option<u64>,
    pub play_seconds: Option<u64>,
}

impl TelemetryUpdate {
    fn merge(&mut self, newer: TelemetryUpdate) {
        self.sessions = newer.sessions.or(self.sessions);
        self.commands = newer.commands.or(self.commands);
        self.play_seconds = newer.play_seconds.or(self.play_seconds);
    }
}

// =============================================================================
// Pending Update
// =============================================================================

/// A normalized update waiting in a write-behind buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingUpdate {
    Player(PlayerRecord),
    Stats(StatUpdate),
    Inventory(InventoryUpdate),
    Achievements(AchievementUpdate),
    Telemetry(TelemetryUpdate),
}

impl PendingUpdate {
    /// Full-row update for `record`.
    ///
    /// Partial records are refused: persisting one would overwrite the
    /// stored attributes with the empty map left by compression.
    pub fn from_record(record: &PlayerRecord) -> Result<Self> {
        if record.partial {
            return Err(Error::PartialRecord {
                id: record.id.clone(),
                field: "attributes".into(),
            });
        }

        let mut row = record.clone();
        row.level = row.level.max(1);
        Ok(PendingUpdate::Player(row))
    }

    /// Build a raw update of `kind` from caller input.
    ///
    /// The identifier may be a string or an integer and is trimmed. Numeric
    /// fields accept numbers or numeric strings; negatives clamp to zero,
    /// fractions truncate, `level` is floored at 1. Missing or `null` fields
    /// are left unset. Unknown fields, non-numeric values and the
    /// [`UpdateKind::Player`] kind are rejected.
    pub fn normalize(kind: UpdateKind, id: &Value, fields: &Map<String, Value>) -> Result<Self> {
        let id = canonical_id(id)?;

        if let Some(unknown) = fields
            .keys()
            .find(|name| !kind.columns().contains(&name.as_str()))
        {
            return Err(Error::ValidationFailure {
                field: unknown.clone(),
                reason: format!("not a {} field", kind),
            });
        }

        let field = |name: &str| numeric_field(fields, name);

        let update = match kind {
            UpdateKind::Stats => PendingUpdate::Stats(StatUpdate {
                id,
                level: field("level")?.map(|level| clamp_u32(level).max(1)),
                experience: field("experience")?,
                energy: field("energy")?.map(clamp_u32),
                damage_dealt: field("damage_dealt")?,
                credits: field("credits")?,
            }),
            UpdateKind::Inventory => PendingUpdate::Inventory(InventoryUpdate {
                id,
                item_count: field("item_count")?,
                rare_items: field("rare_items")?,
                equipped: field("equipped")?,
            }),
            UpdateKind::Achievements => PendingUpdate::Achievements(AchievementUpdate {
                id,
                unlocked: field("unlocked")?,
                points: field("points")?,
            }),
            UpdateKind::Telemetry => PendingUpdate::Telemetry(TelemetryUpdate {
                id,
                sessions: field("sessions")?,
                commands: field("commands")?,
                play_seconds: field("play_seconds")?,
            }),
            UpdateKind::Player => {
                return Err(Error::ValidationFailure {
                    field: "kind".into(),
                    reason: format!("{} rows are written from full records", kind),
                })
            }
        };

        Ok(update)
    }

    pub fn kind(&self) -> UpdateKind {
        match self {
            PendingUpdate::Player(_) => UpdateKind::Player,
            PendingUpdate::Stats(_) => UpdateKind::Stats,
            PendingUpdate::Inventory(_) => UpdateKind::Inventory,
            PendingUpdate::Achievements(_) => UpdateKind::Achievements,
            PendingUpdate::Telemetry(_) => UpdateKind::Telemetry,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PendingUpdate::Player(r) => &r.id,
            PendingUpdate::Stats(u) => &u.id,
            PendingUpdate::Inventory(u) => &u.id,
            PendingUpdate::Achievements(u) => &u.id,
            PendingUpdate::Telemetry(u) => &u.id,
        }
    }

    /// Fold a newer update for the same id into this one.
    ///
    /// A full player row replaces whatever was there. Raw updates keep the
    /// earlier value of every field the newer update leaves unset.
    pub fn merge(&mut self, newer: PendingUpdate) {
        match (self, newer) {
            (PendingUpdate::Stats(old), PendingUpdate::Stats(new)) => old.merge(new),
            (PendingUpdate::Inventory(old), PendingUpdate::Inventory(new)) => old.merge(new),
            (PendingUpdate::Achievements(old), PendingUpdate::Achievements(new)) => {
                old.merge(new)
            }
            (PendingUpdate::Telemetry(old), PendingUpdate::Telemetry(new)) => old.merge(new),
            (slot, newer) => *slot = newer,
        }
    }

    /// Numeric column values in the order of [`UpdateKind::columns`], as SQL
    /// bigints; `None` for fields left unset.
    ///
    /// Full player rows carry text and JSON columns and yield no values here.
    pub fn values(&self) -> Vec<Option<i64>> {
        match self {
            PendingUpdate::Player(_) => Vec::new(),
            PendingUpdate::Stats(u) => vec![
                u.level.map(i64::from),
                u.experience.map(to_bigint),
                u.energy.map(i64::from),
                u.damage_dealt.map(to_bigint),
                u.credits.map(to_bigint),
            ],
            PendingUpdate::Inventory(u) => vec![
                u.item_count.map(to_bigint),
                u.rare_items.map(to_bigint),
                u.equipped.map(to_bigint),
            ],
            PendingUpdate::Achievements(u) => {
                vec![u.unlocked.map(to_bigint), u.points.map(to_bigint)]
            }
            PendingUpdate::Telemetry(u) => vec![
                u.sessions.map(to_bigint),
                u.commands.map(to_bigint),
                u.play_seconds.map(to_bigint),
            ],
        }
    }

    /// Column name and value pairs of a raw update.
    pub fn columns(&self) -> Vec<(&'static str, Option<i64>)> {
        self.kind()
            .columns()
            .iter()
            .copied()
            .zip(self.values())
            .collect()
    }
}

// =============================================================================
// Normalization Helpers
// =============================================================================

fn canonical_id(id: &Value) -> Result<String> {
    let canonical = match id {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        other => {
            return Err(Error::ValidationFailure {
                field: "id".into(),
                reason: format!("expected string or integer, got {}", other),
            })
        }
    };

    if canonical.is_empty() {
        return Err(Error::ValidationFailure {
            field: "id".into(),
            reason: "identifier is empty".into(),
        });
    }

    Ok(canonical)
}

fn numeric_field(fields: &Map<String, Value>, name: &str) -> Result<Option<u64>> {
    let invalid = |reason: String| Error::ValidationFailure {
        field: name.to_string(),
        reason,
    };

    let raw = match fields.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(other) => return Err(invalid(format!("expected a number, got {}", other))),
    };

    match raw {
        Some(value) if value.is_finite() => Ok(Some(clamp_non_negative(value))),
        _ => Err(invalid("not a finite number".into())),
    }
}

fn clamp_non_negative(value: f64) -> u64 {
    if value <= 0.0 {
        0
    } else if value >= u64::MAX as f64 {
        u64::MAX
    } else {
        value.trunc() as u64
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn stat(id: &str, value: Value) -> PendingUpdate {
        PendingUpdate::normalize(UpdateKind::Stats, &json!(id), &fields(value)).unwrap()
    }

    #[test]
    fn test_normalize_clamps_and_floors() {
        let update = stat(
            "  u7 ",
            json!({
                "level": 0,
                "experience": -40,
                "energy": 12.9,
                "damage_dealt": "300",
                "credits": null,
            }),
        );

        assert_eq!(
            update,
            PendingUpdate::Stats(StatUpdate {
                id: "u7".into(),
                level: Some(1),
                experience: Some(0),
                energy: Some(12),
                damage_dealt: Some(300),
                credits: None,
            })
        );
    }

    #[test]
    fn test_missing_fields_stay_unset() {
        let update = stat("u1", json!({ "credits": 5 }));
        assert_eq!(update.values(), vec![None, None, None, None, Some(5)]);
    }

    #[test]
    fn test_numeric_id_is_canonicalized() {
        let update =
            PendingUpdate::normalize(UpdateKind::Achievements, &json!(42), &Map::new()).unwrap();
        assert_eq!(update.id(), "42");
        assert_eq!(update.kind(), UpdateKind::Achievements);
    }

    #[test]
    fn test_non_numeric_field_is_rejected() {
        let err = PendingUpdate::normalize(
            UpdateKind::Stats,
            &json!("u1"),
            &fields(json!({ "level": "high" })),
        )
        .unwrap_err();

        assert_matches!(err, Error::ValidationFailure { ref field, .. } if field == "level");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = PendingUpdate::normalize(
            UpdateKind::Telemetry,
            &json!("u1"),
            &fields(json!({ "credits": 5 })),
        )
        .unwrap_err();

        assert_matches!(err, Error::ValidationFailure { ref field, .. } if field == "credits");
    }

    #[test]
    fn test_player_kind_is_not_built_from_raw_fields() {
        let err = PendingUpdate::normalize(UpdateKind::Player, &json!("u1"), &Map::new())
            .unwrap_err();
        assert_matches!(err, Error::ValidationFailure { ref field, .. } if field == "kind");
    }

    #[test]
    fn test_bad_identifier_is_rejected() {
        for id in [json!(""), json!("   "), json!(null), json!(1.5), json!(["u1"])] {
            let err = PendingUpdate::normalize(UpdateKind::Stats, &id, &Map::new()).unwrap_err();
            assert_matches!(err, Error::ValidationFailure { ref field, .. } if field == "id");
        }
    }

    #[test]
    fn test_columns_follow_kind_order() {
        let update = PendingUpdate::Inventory(InventoryUpdate {
            id: "u1".into(),
            item_count: Some(12),
            rare_items: None,
            equipped: Some(3),
        });

        assert_eq!(
            update.columns(),
            vec![("item_count", Some(12)), ("rare_items", None), ("equipped", Some(3))]
        );
    }

    #[test]
    fn test_values_saturate_to_bigint() {
        let update = PendingUpdate::Achievements(AchievementUpdate {
            id: "u1".into(),
            unlocked: Some(u64::MAX),
            points: Some(7),
        });
        assert_eq!(update.values(), vec![Some(i64::MAX), Some(7)]);
    }

    #[test]
    fn test_merge_keeps_earlier_fields() {
        let mut merged = stat("u1", json!({ "level": 4, "credits": 10 }));
        merged.merge(stat("u1", json!({ "credits": 25, "energy": 60 })));

        assert_eq!(merged.values(), vec![Some(4), None, Some(60), None, Some(25)]);
    }

    #[test]
    fn test_merge_replaces_player_rows() {
        let mut merged = PendingUpdate::from_record(&PlayerRecord::new("u1", "mage")).unwrap();
        let newer = PendingUpdate::from_record(&PlayerRecord::new("u1", "rogue")).unwrap();
        merged.merge(newer.clone());
        assert_eq!(merged, newer);
    }

    #[test]
    fn test_stat_update_applies_only_supplied_fields() {
        let mut record = PlayerRecord::new("u1", "cleric");
        record.level = 12;
        record.experience = 900;

        let PendingUpdate::Stats(update) = stat("u1", json!({ "credits": 5 })) else {
            panic!("expected a stats update");
        };
        update.apply_to(&mut record);

        assert_eq!(record.level, 12);
        assert_eq!(record.experience, 900);
        assert_eq!(record.credits, 5);
    }

    #[test]
    fn test_from_record() {
        let mut record = PlayerRecord::new("u3", "rogue").with_attribute("guild", json!("ash"));
        record.level = 0;
        record.credits = 90;

        let update = PendingUpdate::from_record(&record).unwrap();
        assert_eq!(update.kind(), UpdateKind::Player);
        assert_matches!(update, PendingUpdate::Player(ref r) if r.level == 1 && r.credits == 90);
    }

    #[test]
    fn test_from_partial_record_is_refused() {
        let mut record = PlayerRecord::new("u3", "rogue");
        record.partial = true;

        assert_matches!(
            PendingUpdate::from_record(&record),
            Err(Error::PartialRecord { ref id, .. }) if id == "u3"
        );
    }

    #[test]
    fn test_kind_parsing_and_names() {
        assert_eq!("Telemetry".parse::<UpdateKind>().unwrap(), UpdateKind::Telemetry);
        assert!("weather".parse::<UpdateKind>().is_err());
        assert_eq!(serde_json::to_value(UpdateKind::Stats).unwrap(), json!("stats"));
        assert_eq!(UpdateKind::Stats.table(), UpdateKind::Player.table());

        for (i, kind) in UpdateKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        assert!(UpdateKind::RAW.iter().all(|kind| !kind.replaces_row()));
    }

    #[test]
    fn test_pending_update_serializes_with_kind_tag() {
        let update = PendingUpdate::normalize(UpdateKind::Stats, &json!("u1"), &Map::new()).unwrap();
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["kind"], "stats");
        assert_eq!(json["id"], "u1");

        let row = PendingUpdate::from_record(&PlayerRecord::new("u2", "mage")).unwrap();
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["kind"], "player");
        assert_eq!(json["class"], "mage");
    }
}
