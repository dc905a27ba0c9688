use proptest::prelude::*;
use serde_json::json;
use zvon::{matches, Event, Kwargs, Value};

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::from),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    (
        "[a-z]{1,8}",
        prop::collection::vec(arb_value(), 0..5),
        prop::collection::btree_map("[a-z]{1,4}", arb_value(), 0..4),
    )
        .prop_map(|(kind, args, kwargs)| Event::with_payload(kind, args, kwargs))
}

proptest! {
    #[test]
    fn prop_event_hears_itself(event in arb_event()) {
        prop_assert!(matches(&event, &event));
    }

    #[test]
    fn prop_prefix_pattern_hears_full_event(event in arb_event(), cut in 0usize..5) {
        let cut = cut.min(event.args().len());
        let prefix = Event::with_payload(
            event.event_type().clone(),
            event.args()[..cut].to_vec(),
            Kwargs::new(),
        );
        prop_assert!(matches(&prefix, &event));
        prop_assert!(matches(&Event::any(), &event));
    }

    #[test]
    fn prop_kwarg_subset_hears_event(event in arb_event()) {
        let mut subset = Kwargs::new();
        if let Some((k, v)) = event.kwargs().iter().next() {
            subset.insert(k.clone(), v.clone());
        }
        let pattern = Event::with_payload(event.event_type().clone(), Vec::new(), subset);
        prop_assert!(matches(&pattern, &event));
    }

    #[test]
    fn prop_other_type_never_heard(event in arb_event()) {
        let other = Event::new(format!("{}_other", event.event_type()));
        prop_assert!(!matches(&other, &event));
    }
}

/// Тест проверяет несимметричность: короткий шаблон слышит длинный
/// экземпляр, но не наоборот.
#[test]
fn test_matching_is_not_commutative() {
    let short = Event::parse("dog[55]").unwrap();
    let long = Event::parse("dog[55, 66]").unwrap();

    assert!(matches(&short, &long));
    assert!(!matches(&long, &short));
}

/// Тест проверяет сопоставление по записи с именованными аргументами.
#[test]
fn test_notation_with_kwargs() {
    let pattern = Event::parse("temp[threshold: 90]").unwrap();
    let reading = Event::new("temp").arg(72).kwarg("threshold", 90);
    let other = Event::new("temp").arg(72).kwarg("threshold", 80);

    assert!(matches(&pattern, &reading));
    assert!(!matches(&pattern, &other));
    assert_eq!(reading.get("threshold"), Some(&json!(90)));
}

/// Тест проверяет, что wildcard-шаблон с аргументами всё ещё проверяет
/// аргументы.
#[test]
fn test_wildcard_with_args() {
    let pattern = Event::new("*").arg(1);

    assert!(matches(&pattern, &Event::new("a").arg(1).arg(2)));
    assert!(!matches(&pattern, &Event::new("a").arg(2)));
}
