use proptest::prelude::*;
use serde_json::{Map, Value};
use vignette::{merge, ComponentMeta, ListFilter, Loader, Registry, RegistryEntry, RenderContext};

// Keys are drawn from a small pool so fragments overlap often; the reserved
// keys are included and always carry string values.
fn context_strategy() -> impl Strategy<Value = RenderContext> {
    let key = prop_oneof![
        Just("locale".to_string()),
        Just("channel".to_string()),
        "[a-e]",
    ];
    prop::collection::btree_map(key, "[a-z]{0,4}", 0..6).prop_map(|pairs| {
        let map: Map<String, Value> = pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        RenderContext::from_value(Value::Object(map)).unwrap()
    })
}

fn as_map(ctx: &RenderContext) -> Map<String, Value> {
    match ctx.to_value() {
        Value::Object(map) => map,
        other => panic!("context serialized to {:?}", other),
    }
}

proptest! {
    #[test]
    fn test_merge_later_fragment_wins(
        base in context_strategy(),
        overrides in context_strategy(),
    ) {
        let merged = as_map(&merge([Some(&base), Some(&overrides)]));
        let base_map = as_map(&base);
        let override_map = as_map(&overrides);

        for (key, value) in &merged {
            let expected = override_map.get(key).or_else(|| base_map.get(key));
            prop_assert_eq!(Some(value), expected);
        }
        // nothing beyond the union of the fragments
        for key in base_map.keys().chain(override_map.keys()) {
            prop_assert!(merged.contains_key(key));
        }
        prop_assert!(merged.len() <= base_map.len() + override_map.len());
    }

    #[test]
    fn test_merge_is_associative(
        a in context_strategy(),
        b in context_strategy(),
        c in context_strategy(),
    ) {
        let left = merge([Some(&merge([Some(&a), Some(&b)])), Some(&c)]);
        let right = merge([Some(&a), Some(&merge([Some(&b), Some(&c)]))]);
        prop_assert_eq!(left, right);
    }

    #[test]
    fn test_merge_skips_missing_fragments(
        a in context_strategy(),
        b in context_strategy(),
    ) {
        let with_gaps = merge([None, Some(&a), None, Some(&b), None]);
        let without = merge([Some(&a), Some(&b)]);
        prop_assert_eq!(with_gaps, without);
    }

    #[test]
    fn test_context_survives_json_text(ctx in context_strategy()) {
        let text = serde_json::to_string(&ctx).unwrap();
        prop_assert_eq!(RenderContext::from_json(&text).unwrap(), ctx);
    }
}

#[derive(Debug, Clone)]
enum Op {
    Register(String, u32),
    Unregister(String),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => ("[a-f]", any::<u32>()).prop_map(|(id, version)| Op::Register(id, version)),
        1 => "[a-f]".prop_map(Op::Unregister),
    ]
}

proptest! {
    #[test]
    fn test_registry_list_follows_registration_order(
        ops in prop::collection::vec(op_strategy(), 0..40),
    ) {
        let mut registry: Registry<u32> = Registry::new();
        // (id, version) in expected listing order
        let mut model: Vec<(String, u32)> = Vec::new();

        for op in ops {
            match op {
                Op::Register(id, version) => {
                    let entry = RegistryEntry::new(id.clone(), Loader::ready(version))
                        .with_meta(ComponentMeta::new().description(version.to_string()));
                    registry.register(entry).unwrap();
                    match model.iter_mut().find(|(existing, _)| *existing == id) {
                        Some(slot) => slot.1 = version,
                        None => model.push((id, version)),
                    }
                }
                Op::Unregister(id) => {
                    let expected = model.iter().any(|(existing, _)| *existing == id);
                    prop_assert_eq!(registry.unregister(&id), expected);
                    model.retain(|(existing, _)| *existing != id);
                }
            }
        }

        let listed: Vec<(String, u32)> = registry
            .list(&ListFilter::new())
            .iter()
            .map(|e| {
                let version = e.meta().description.as_deref().unwrap_or("").parse().unwrap();
                (e.id().to_string(), version)
            })
            .collect();
        prop_assert_eq!(listed, model);
        prop_assert_eq!(registry.len(), registry.ids().count());
    }
}
