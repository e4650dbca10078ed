use fragment_history::codec;
use fragment_history::sim::SimBrowser;
use fragment_history::{Cast, RESERVED_KEY, StateAccessor, StateMapping, StateValue};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::{FileFailurePersistence, TestCaseError, TestCaseResult};

const STATE_PROPTEST_REGRESSION_FILE: &str =
    "tests/proptest-regressions/state_property_test.txt";
const DEFAULT_STATE_PROPTEST_CASES: u32 = 256;
const PAGE: &str = "https://app.local/list?page=2";

fn state_proptest_cases() -> u32 {
    std::env::var("FRAGMENT_HISTORY_PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_STATE_PROPTEST_CASES)
}

fn key_strategy() -> BoxedStrategy<String> {
    "[a-z][a-z0-9_]{0,8}".boxed()
}

fn scalar_strategy() -> BoxedStrategy<StateValue> {
    prop_oneof![
        "\\PC{0,16}".prop_map(StateValue::Str),
        any::<i64>().prop_map(StateValue::Int),
        any::<bool>().prop_map(StateValue::Bool),
    ]
    .boxed()
}

fn existing_fragment_strategy() -> BoxedStrategy<Vec<(String, String)>> {
    vec((key_strategy(), "[a-z0-9]{0,6}"), 0..=4).boxed()
}

fn browser_with(existing: &[(String, String)]) -> SimBrowser {
    let body = existing
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    if body.is_empty() {
        SimBrowser::modern(PAGE)
    } else {
        SimBrowser::modern(&format!("{PAGE}#{body}"))
    }
}

fn cast_for(value: &StateValue) -> Cast {
    match value {
        StateValue::Str(_) => Cast::String,
        StateValue::Int(_) => Cast::Integer,
        StateValue::Float(_) => Cast::Float,
        StateValue::Bool(_) => Cast::Boolean,
    }
}

fn tokens_for(browser: &SimBrowser, key: &str) -> usize {
    let hash = browser.hash();
    codec::split_tokens(hash.trim_start_matches('#'))
        .filter(|token| codec::token_key(token) == key)
        .count()
}

fn fail(err: fragment_history::Error) -> TestCaseError {
    TestCaseError::fail(format!("{err:?}"))
}

fn assert_round_trip(
    existing: &[(String, String)],
    key: &str,
    value: &StateValue,
    merge: bool,
) -> TestCaseResult {
    let browser = browser_with(existing);
    let state = StateAccessor::new(browser.handle());
    state.set(key, value.clone(), merge).map_err(fail)?;

    let read = state.get(key, cast_for(value));
    prop_assert_eq!(read.as_ref(), Some(value), "hash={}", browser.hash());
    prop_assert_eq!(tokens_for(&browser, key), 1, "hash={}", browser.hash());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: state_proptest_cases(),
        failure_persistence: Some(Box::new(
            FileFailurePersistence::Direct(STATE_PROPTEST_REGRESSION_FILE),
        )),
        .. ProptestConfig::default()
    })]

    #[test]
    fn set_then_get_round_trips(
        existing in existing_fragment_strategy(),
        key in key_strategy(),
        value in scalar_strategy(),
        merge in any::<bool>(),
    ) {
        // repeated keys in the starting fragment are a separate case
        let mut seen = std::collections::HashSet::new();
        let existing = existing
            .into_iter()
            .filter(|(existing_key, _)| seen.insert(existing_key.clone()))
            .collect::<Vec<_>>();
        assert_round_trip(&existing, &key, &value, merge)?;
    }

    #[test]
    fn merging_twice_keeps_one_token(
        key in key_strategy(),
        first in scalar_strategy(),
        second in scalar_strategy(),
    ) {
        let browser = SimBrowser::modern(PAGE);
        let state = StateAccessor::new(browser.handle());
        state.set(&key, first, true).map_err(fail)?;
        state.set(&key, second.clone(), true).map_err(fail)?;
        prop_assert_eq!(tokens_for(&browser, &key), 1);
        prop_assert_eq!(state.get(&key, cast_for(&second)), Some(second));
    }

    #[test]
    fn set_all_without_merge_keeps_exactly_the_mapping(
        existing in existing_fragment_strategy(),
        pairs in vec((key_strategy(), scalar_strategy()), 1..=5),
    ) {
        let browser = browser_with(&existing);
        let state = StateAccessor::new(browser.handle());
        let mapping = pairs.into_iter().collect::<StateMapping>();
        state.set_all(&mapping, false).map_err(fail)?;

        let hash = browser.hash();
        let keys = codec::split_tokens(hash.trim_start_matches('#'))
            .map(codec::token_key)
            .collect::<Vec<_>>();
        let expected = mapping.iter().map(|(key, _)| key).collect::<Vec<_>>();
        prop_assert_eq!(keys, expected);
    }

    #[test]
    fn reserved_key_stays_hidden(marker in "[0-9]{1,12}", existing in existing_fragment_strategy()) {
        let mut existing = existing;
        existing.push((RESERVED_KEY.to_string(), marker));
        let browser = browser_with(&existing);
        let state = StateAccessor::new(browser.handle());
        prop_assert_eq!(state.get(RESERVED_KEY, Cast::String), None);
        prop_assert!(!state.snapshot().contains_key(RESERVED_KEY));
    }
}
