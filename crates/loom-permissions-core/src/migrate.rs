// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rewrites legacy two-level permission documents into the three-level schema.
//!
//! Legacy documents carry a single "can view" flag per module and per lesson
//! entry. The flag becomes the lowest new level, `view_lesson`, and the old
//! key is dropped. A document that already has `view_lesson` is left alone,
//! which makes the rewrite idempotent.

use serde_json::{Map, Value};

use crate::level::CapabilityLevel;

/// Key spellings the legacy schema used for the view flag.
pub const LEGACY_VIEW_KEYS: &[&str] = &["can_view", "canView", "can view"];

/// Returns a migrated copy of `record`. Total: any JSON value is accepted.
pub fn migrate(record: &Value) -> Value {
	let mut migrated = record.clone();
	migrate_in_place(&mut migrated);
	migrated
}

/// Migrates `record` in place. Returns true if anything was rewritten.
pub fn migrate_in_place(record: &mut Value) -> bool {
	match record {
		Value::Object(map) => {
			let mut changed = migrate_object(map);
			for nested in map.values_mut() {
				changed |= migrate_in_place(nested);
			}
			changed
		}
		Value::Array(items) => items
			.iter_mut()
			.fold(false, |changed, item| migrate_in_place(item) | changed),
		_ => false,
	}
}

/// Returns true if `record` or any nested entry still uses the legacy schema.
pub fn needs_migration(record: &Value) -> bool {
	match record {
		Value::Object(map) => is_legacy_object(map) || map.values().any(needs_migration),
		Value::Array(items) => items.iter().any(needs_migration),
		_ => false,
	}
}

fn is_legacy_object(map: &Map<String, Value>) -> bool {
	!map.contains_key(CapabilityLevel::ViewLesson.as_str())
		&& LEGACY_VIEW_KEYS.iter().any(|key| map.contains_key(*key))
}

fn migrate_object(map: &mut Map<String, Value>) -> bool {
	if !is_legacy_object(map) {
		return false;
	}

	let mut flag = false;
	for key in LEGACY_VIEW_KEYS {
		if let Some(value) = map.remove(*key) {
			flag |= legacy_flag(&value);
		}
	}
	map.insert(
		CapabilityLevel::ViewLesson.as_str().to_string(),
		Value::Bool(flag),
	);
	true
}

/// Interprets a legacy flag value. Anything unrecognized counts as not granted.
fn legacy_flag(value: &Value) -> bool {
	match value {
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
		Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;

	#[test]
	fn rewrites_view_flag_to_view_lesson() {
		let record = json!({ "module_id": 7, "can_view": true });
		assert_eq!(migrate(&record), json!({ "module_id": 7, "view_lesson": true }));
	}

	#[test]
	fn keeps_false_flags() {
		let record = json!({ "canView": false, "title": "Algebra" });
		assert_eq!(migrate(&record), json!({ "view_lesson": false, "title": "Algebra" }));
	}

	#[test]
	fn migrates_nested_lesson_entries() {
		let record = json!({
			"can view": true,
			"lessons": {
				"1": { "can_view": false },
				"2": { "can_view": 1 }
			},
			"history": [{ "canView": "true" }]
		});

		let migrated = migrate(&record);
		assert_eq!(
			migrated,
			json!({
				"view_lesson": true,
				"lessons": {
					"1": { "view_lesson": false },
					"2": { "view_lesson": true }
				},
				"history": [{ "view_lesson": true }]
			})
		);
		assert!(!needs_migration(&migrated));
	}

	#[test]
	fn already_migrated_record_is_untouched() {
		let record = json!({ "view_lesson": true, "view_plan": true, "edit": false });
		let mut copy = record.clone();
		assert!(!migrate_in_place(&mut copy));
		assert_eq!(copy, record);
	}

	#[test]
	fn record_with_both_fields_is_left_alone() {
		let record = json!({ "view_lesson": false, "can_view": true });
		assert!(!needs_migration(&record));
		assert_eq!(migrate(&record), record);
	}

	#[test]
	fn scalars_pass_through() {
		assert_eq!(migrate(&json!(null)), json!(null));
		assert_eq!(migrate(&json!("can_view")), json!("can_view"));
		assert_eq!(migrate(&json!([1, 2])), json!([1, 2]));
	}

	fn arb_json() -> impl Strategy<Value = Value> {
		let leaf = prop_oneof![
			Just(Value::Null),
			any::<bool>().prop_map(Value::Bool),
			any::<i32>().prop_map(|n| json!(n)),
			"[a-z]{0,6}".prop_map(Value::String),
		];
		leaf.prop_recursive(4, 48, 6, |inner| {
			let key = prop_oneof![
				Just("can_view".to_string()),
				Just("canView".to_string()),
				Just("view_lesson".to_string()),
				Just("lessons".to_string()),
				"[a-z]{1,5}",
			];
			prop_oneof![
				prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
				prop::collection::btree_map(key, inner, 0..5)
					.prop_map(|m| Value::Object(m.into_iter().collect())),
			]
		})
	}

	proptest! {
		#[test]
		fn migration_is_idempotent(record in arb_json()) {
			let once = migrate(&record);
			let twice = migrate(&once);
			prop_assert_eq!(&once, &twice);
			prop_assert!(!needs_migration(&once));
		}
	}
}
