//! The consequence engine.
//!
//! Applies one chosen option's effects to a progress candidate and checks
//! the story's stat bounds afterwards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use storyloop_core::progress::PlayerProgress;
use storyloop_core::story::{StorySetup, Termination};

/// Effects of one option, as stored in scene content under `cons`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Consequences {
    /// Stat deltas. Keys are stat names or, as a fallback, indices into the
    /// story's stats in name order.
    #[serde(default, rename = "cs", skip_serializing_if = "BTreeMap::is_empty")]
    pub stat_changes: BTreeMap<String, i64>,
    /// Variable writes; `null` deletes the variable.
    #[serde(default, rename = "sv", skip_serializing_if = "BTreeMap::is_empty")]
    pub variable_changes: BTreeMap<String, Value>,
    #[serde(default, rename = "gf_add", skip_serializing_if = "Vec::is_empty")]
    pub flags_added: Vec<String>,
    #[serde(default, rename = "gf_rem", skip_serializing_if = "Vec::is_empty")]
    pub flags_removed: Vec<String>,
    /// Text shown to the player after choosing.
    #[serde(default, rename = "rt", skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

/// Applies `consequences` to `candidate` and returns the termination, if
/// the resulting state trips a bound.
///
/// Stats are added to, variables written (an explicit null deletes), flags
/// removed and then added. Bounds are checked over the final state.
pub fn apply_consequences(
    candidate: &mut PlayerProgress,
    consequences: &Consequences,
    setup: &StorySetup,
) -> Option<Termination> {
    for (key, delta) in &consequences.stat_changes {
        let name = resolve_stat_name(key, setup);
        let value = candidate.core_stats.entry(name).or_insert(0);
        *value = value.saturating_add(*delta);
    }

    for (name, value) in &consequences.variable_changes {
        if value.is_null() {
            candidate.story_variables.remove(name);
        } else {
            candidate
                .story_variables
                .insert(name.clone(), value.clone());
        }
    }

    for flag in &consequences.flags_removed {
        candidate.global_flags.remove(flag);
    }
    for flag in &consequences.flags_added {
        candidate.global_flags.insert(flag.clone());
    }

    evaluate_bounds(&candidate.core_stats, setup)
}

/// Checks every defined stat, in name order, and reports the first one at
/// or beyond a bound. A stat missing from `stats` counts as zero.
#[must_use]
pub fn evaluate_bounds(stats: &BTreeMap<String, i64>, setup: &StorySetup) -> Option<Termination> {
    setup.stats.iter().find_map(|(name, definition)| {
        let value = stats.get(name).copied().unwrap_or(0);
        definition.breached_bound(value).map(|bound| Termination {
            stat: name.clone(),
            bound,
            limit: definition.limit(bound),
            value,
        })
    })
}

fn resolve_stat_name(key: &str, setup: &StorySetup) -> String {
    if setup.stats.contains_key(key) {
        return key.to_owned();
    }
    key.parse::<usize>()
        .ok()
        .and_then(|index| setup.stats.keys().nth(index))
        .map_or_else(|| key.to_owned(), Clone::clone)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use storyloop_core::story::StatBound;
    use uuid::Uuid;

    use super::*;

    fn setup() -> StorySetup {
        StorySetup::from_value(&json!({
            "stats": {
                "courage": {"initial": 5, "min": 0, "max": 10},
                "tension": {"initial": 4, "min": 0, "max": 10}
            }
        }))
        .unwrap()
    }

    fn candidate() -> PlayerProgress {
        PlayerProgress::initial(
            Uuid::new_v4(),
            Uuid::new_v4(),
            BTreeMap::from([("courage".to_owned(), 5), ("tension".to_owned(), 4)]),
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_consequences_parse_from_scene_json() {
        let cons: Consequences = serde_json::from_value(json!({
            "cs": {"tension": 3},
            "sv": {"door": "open", "key": null},
            "gf_add": ["met_mara"],
            "rt": "She nods."
        }))
        .unwrap();

        assert_eq!(cons.stat_changes["tension"], 3);
        assert!(cons.variable_changes["key"].is_null());
        assert_eq!(cons.flags_added, vec!["met_mara".to_owned()]);
        assert!(cons.flags_removed.is_empty());
        assert_eq!(cons.response_text.as_deref(), Some("She nods."));
    }

    #[test]
    fn test_apply_updates_stats_variables_and_flags() {
        // Arrange
        let mut progress = candidate();
        progress.story_variables.insert("key".into(), json!("brass"));
        progress.global_flags.insert("lamp_lit".into());
        let cons = Consequences {
            stat_changes: BTreeMap::from([("tension".to_owned(), 3)]),
            variable_changes: BTreeMap::from([
                ("door".to_owned(), json!("open")),
                ("key".to_owned(), Value::Null),
            ]),
            flags_added: vec!["met_mara".into(), "met_mara".into()],
            flags_removed: vec!["lamp_lit".into()],
            response_text: None,
        };

        // Act
        let termination = apply_consequences(&mut progress, &cons, &setup());

        // Assert
        assert!(termination.is_none());
        assert_eq!(progress.core_stats["tension"], 7);
        assert_eq!(progress.story_variables.get("door"), Some(&json!("open")));
        assert!(!progress.story_variables.contains_key("key"));
        assert_eq!(
            progress.global_flags,
            BTreeSet::from(["met_mara".to_owned()])
        );
    }

    #[test]
    fn test_flag_removed_and_added_in_same_option_ends_up_set() {
        let mut progress = candidate();
        let cons = Consequences {
            flags_added: vec!["door_open".into()],
            flags_removed: vec!["door_open".into()],
            ..Consequences::default()
        };

        apply_consequences(&mut progress, &cons, &setup());

        assert!(progress.global_flags.contains("door_open"));
    }

    #[test]
    fn test_exceeding_max_terminates_with_raw_value() {
        // Arrange
        let mut progress = candidate();
        let cons = Consequences {
            stat_changes: BTreeMap::from([("tension".to_owned(), 15)]),
            ..Consequences::default()
        };

        // Act
        let termination = apply_consequences(&mut progress, &cons, &setup()).unwrap();

        // Assert
        assert_eq!(termination.stat, "tension");
        assert_eq!(termination.bound, StatBound::Max);
        assert_eq!(termination.limit, 10);
        assert_eq!(termination.value, 19);
        assert_eq!(progress.core_stats["tension"], 19);
    }

    #[test]
    fn test_reaching_min_exactly_terminates() {
        let mut progress = candidate();
        let cons = Consequences {
            stat_changes: BTreeMap::from([("courage".to_owned(), -5)]),
            ..Consequences::default()
        };

        let termination = apply_consequences(&mut progress, &cons, &setup()).unwrap();

        assert_eq!(termination.stat, "courage");
        assert_eq!(termination.bound, StatBound::Min);
        assert_eq!(termination.value, 0);
    }

    #[test]
    fn test_simultaneous_breaches_report_first_stat_by_name() {
        // Arrange
        let mut progress = candidate();
        let cons = Consequences {
            stat_changes: BTreeMap::from([
                ("tension".to_owned(), 20),
                ("courage".to_owned(), -9),
            ]),
            ..Consequences::default()
        };

        // Act
        let termination = apply_consequences(&mut progress, &cons, &setup()).unwrap();

        // Assert
        assert_eq!(termination.stat, "courage");
    }

    #[test]
    fn test_index_key_addresses_stat_in_name_order() {
        let mut progress = candidate();
        let cons = Consequences {
            stat_changes: BTreeMap::from([("1".to_owned(), 2)]),
            ..Consequences::default()
        };

        apply_consequences(&mut progress, &cons, &setup());

        assert_eq!(progress.core_stats["tension"], 6);
        assert_eq!(progress.core_stats["courage"], 5);
    }

    #[test]
    fn test_missing_defined_stat_counts_as_zero() {
        let stats = BTreeMap::from([("tension".to_owned(), 4)]);

        let termination = evaluate_bounds(&stats, &setup()).unwrap();

        assert_eq!(termination.stat, "courage");
        assert_eq!(termination.value, 0);
        assert_eq!(termination.bound, StatBound::Min);
    }

    #[test]
    fn test_undefined_stat_is_tracked_but_never_terminates() {
        let mut progress = candidate();
        let cons = Consequences {
            stat_changes: BTreeMap::from([("luck".to_owned(), 500)]),
            ..Consequences::default()
        };

        let termination = apply_consequences(&mut progress, &cons, &setup());

        assert!(termination.is_none());
        assert_eq!(progress.core_stats["luck"], 500);
    }
}
