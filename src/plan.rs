//! Schema-driven planning.
//!
//! Every resource plans the same way: compare the proposal with the prior
//! state attribute by attribute, carry computed values forward, and require a
//! replacement when a `force_new` attribute changes.

use serde_json::{Map, Value};

use crate::schema::Schema;
use crate::types::{AttributeChange, PlanResult};

/// Plan a resource of `schema` moving from `prior` to `proposed`.
///
/// A `null` proposal plans a destroy; a missing or `null` prior plans a
/// create.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let prior = prior.filter(|p| !p.is_null());

    if proposed.is_null() {
        return match prior {
            Some(prior) => plan_destroy(prior),
            None => PlanResult::no_change(Value::Null),
        };
    }

    let mut planned = as_object(proposed);
    apply_defaults(schema, &mut planned);

    let Some(prior) = prior else {
        let changes = planned
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
            .collect();
        return PlanResult::with_changes(Value::Object(planned), changes, false);
    };

    let prior = as_object(prior);
    for (name, attr) in &schema.block.attributes {
        let unset = planned.get(name).map_or(true, Value::is_null);
        if attr.flags.computed && unset {
            if let Some(value) = prior.get(name) {
                planned.insert(name.clone(), value.clone());
            }
        }
    }

    let mut changes = Vec::new();
    let mut requires_replace = false;
    let mut keys: Vec<&String> = planned.keys().chain(prior.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let before = prior.get(key).cloned().unwrap_or(Value::Null);
        let after = planned.get(key).cloned().unwrap_or(Value::Null);
        if before == after {
            continue;
        }
        requires_replace |= schema.forces_new(key);
        changes.push(match (before.is_null(), after.is_null()) {
            (true, _) => AttributeChange::added(key.clone(), after),
            (_, true) => AttributeChange::removed(key.clone(), before),
            _ => AttributeChange::modified(key.clone(), before, after),
        });
    }

    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

fn plan_destroy(prior: &Value) -> PlanResult {
    let changes = as_object(prior)
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| AttributeChange::removed(k, v))
        .collect();
    PlanResult::with_changes(Value::Null, changes, false)
}

fn apply_defaults(schema: &Schema, planned: &mut Map<String, Value>) {
    for (name, attr) in &schema.block.attributes {
        if let Some(default) = &attr.default {
            let unset = planned.get(name).map_or(true, Value::is_null);
            if unset {
                planned.insert(name.clone(), default.clone());
            }
        }
    }
}

fn as_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    }
}
