use super::*;

fn browser_at(fragment: &str) -> SimBrowser {
    SimBrowser::modern(&page(fragment))
}

#[test]
fn set_then_get_round_trips_scalars() -> Result<()> {
    let browser = browser_at("");
    let state = StateAccessor::new(browser.handle());

    state.set("name", "Taro Yamada", true)?;
    state.set("count", 42, true)?;
    state.set("open", true, true)?;

    assert_eq!(state.get_string("name").as_deref(), Some("Taro Yamada"));
    assert_eq!(state.get_int("count"), Some(42));
    assert_eq!(state.get_bool("open"), Some(true));
    assert_eq!(
        browser.location(),
        page("#name=Taro%20Yamada&count=42&open=true")
    );
    Ok(())
}

#[test]
fn merge_replaces_existing_token_in_place() -> Result<()> {
    let browser = browser_at("#a=1&b=2&c=3");
    let state = StateAccessor::new(browser.handle());

    state.set("b", "x", true)?;
    assert_eq!(browser.hash(), "#a=1&b=x&c=3");

    state.set("b", "y", true)?;
    assert_eq!(browser.hash(), "#a=1&b=y&c=3");
    assert_eq!(browser.hash().matches("b=").count(), 1);
    Ok(())
}

#[test]
fn merge_appends_missing_key() -> Result<()> {
    let browser = browser_at("#a=1");
    let state = StateAccessor::new(browser.handle());
    state.set("z", "last", true)?;
    assert_eq!(browser.hash(), "#a=1&z=last");

    let empty = browser_at("");
    let state = StateAccessor::new(empty.handle());
    state.set("z", "first", true)?;
    assert_eq!(empty.hash(), "#z=first");
    Ok(())
}

#[test]
fn merge_drops_leading_separator() -> Result<()> {
    let browser = browser_at("#&a=1");
    let state = StateAccessor::new(browser.handle());
    state.set("b", 2, true)?;
    assert_eq!(browser.hash(), "#a=1&b=2");
    Ok(())
}

#[test]
fn set_without_merge_replaces_whole_fragment() -> Result<()> {
    let browser = browser_at("#a=1&b=2");
    let state = StateAccessor::new(browser.handle());
    state.set("c", 1.5, false)?;
    assert_eq!(browser.hash(), "#c=1.5");
    assert_eq!(state.get_float("c"), Some(1.5));
    assert_eq!(state.get_string("a"), None);
    Ok(())
}

#[test]
fn set_ignores_empty_and_reserved_keys() -> Result<()> {
    let browser = browser_at("#a=1");
    let state = StateAccessor::new(browser.handle());
    state.set("", "x", true)?;
    state.set(RESERVED_KEY, "123", false)?;
    assert_eq!(browser.hash(), "#a=1");
    assert!(browser.navigations().is_empty());
    Ok(())
}

#[test]
fn values_are_percent_encoded() -> Result<()> {
    let browser = browser_at("");
    let state = StateAccessor::new(browser.handle());
    state.set("q", "a b&c=d/é", true)?;
    assert_eq!(browser.hash(), "#q=a%20b%26c%3Dd%2F%C3%A9");
    assert_eq!(state.get_string("q").as_deref(), Some("a b&c=d/é"));
    Ok(())
}

#[test]
fn reserved_key_is_never_readable() {
    let browser = browser_at("#__t=1234567890&a=1");
    let state = StateAccessor::new(browser.handle());
    assert_eq!(state.get(RESERVED_KEY, Cast::String), None);
    assert_eq!(state.get(RESERVED_KEY, Cast::Integer), None);
    assert_eq!(state.get("", Cast::Boolean), None);
    assert_eq!(state.get_int("a"), Some(1));
}

#[test]
fn missing_key_casts_to_defaults() {
    let browser = browser_at("#a=1");
    let state = StateAccessor::new(browser.handle());
    assert_eq!(state.get("missing", Cast::String), None);
    assert_eq!(state.get("missing", Cast::Integer), Some(StateValue::Int(0)));
    assert_eq!(state.get_bool("missing"), Some(false));
    assert!(state.get_float("missing").is_some_and(f64::is_nan));
}

#[test]
fn casts_apply_to_present_values() {
    let browser = browser_at("#n=12px&f=2.5e1&t=TRUE&w=yes&e=");
    let state = StateAccessor::new(browser.handle());
    assert_eq!(state.get_int("n"), Some(12));
    assert_eq!(state.get_float("f"), Some(25.0));
    assert_eq!(state.get_bool("t"), Some(true));
    assert_eq!(state.get_bool("w"), Some(true));
    assert_eq!(state.get_bool("e"), Some(false));
    assert_eq!(state.get_int("w"), Some(0));
    assert_eq!(state.get_string("e").as_deref(), Some(""));
}

#[test]
fn set_all_without_merge_keeps_only_given_keys_in_order() -> Result<()> {
    let browser = browser_at("#old=1&other=2");
    let state = StateAccessor::new(browser.handle());
    let mapping: StateMapping = [
        ("a", StateValue::from(1)),
        ("b", StateValue::from("x")),
    ]
    .into_iter()
    .collect();
    state.set_all(&mapping, false)?;
    assert_eq!(browser.hash(), "#a=1&b=x");
    Ok(())
}

#[test]
fn set_all_merge_updates_matches_and_appends_the_rest() -> Result<()> {
    let browser = browser_at("#a=1&b=2");
    let state = StateAccessor::new(browser.handle());
    let mut mapping = StateMapping::new();
    mapping.insert("b", true);
    mapping.insert("c", 3);
    state.set_all(&mapping, true)?;
    assert_eq!(browser.hash(), "#a=1&b=true&c=3");
    Ok(())
}

#[test]
fn set_all_merge_on_empty_fragment_replaces() -> Result<()> {
    let browser = browser_at("");
    let state = StateAccessor::new(browser.handle());
    let mapping: StateMapping = [("a", false), ("b", true)].into_iter().collect();
    state.set_all(&mapping, true)?;
    assert_eq!(browser.hash(), "#a=false&b=true");
    Ok(())
}

#[test]
fn set_all_skips_reserved_key_when_merging_and_replacing() -> Result<()> {
    let browser = browser_at("#a=1");
    let state = StateAccessor::new(browser.handle());
    let mut mapping = StateMapping::new();
    mapping.insert(RESERVED_KEY, 99);
    mapping.insert("b", 2);

    state.set_all(&mapping, true)?;
    assert_eq!(browser.hash(), "#a=1&b=2");

    state.set_all(&mapping, false)?;
    assert_eq!(browser.hash(), "#b=2");
    Ok(())
}

#[test]
fn remove_without_key_clears_fragment() -> Result<()> {
    let browser = browser_at("#a=1&b=2");
    let state = StateAccessor::new(browser.handle());
    state.remove(None)?;
    assert_eq!(browser.location(), page("#"));
    assert_eq!(browser.hash(), "");
    assert!(state.snapshot().is_empty());
    Ok(())
}

// Removing a single key rewrites the fragment without its token instead of
// leaving the address untouched.
#[test]
fn remove_with_key_drops_only_that_token() -> Result<()> {
    let browser = browser_at("#a=1&b=2&c=3");
    let state = StateAccessor::new(browser.handle());
    state.remove(Some("b"))?;
    assert_eq!(browser.hash(), "#a=1&c=3");

    state.remove(Some("a"))?;
    state.remove(Some("c"))?;
    assert_eq!(browser.location(), page("#"));
    Ok(())
}

#[test]
fn remove_absent_key_does_not_navigate() -> Result<()> {
    let browser = browser_at("#a=1");
    let state = StateAccessor::new(browser.handle());
    state.remove(Some("missing"))?;
    state.remove(Some(RESERVED_KEY))?;
    assert!(browser.navigations().is_empty());
    Ok(())
}

#[test]
fn snapshot_decodes_everything_but_the_marker() {
    let browser = browser_at("#a=1&__t=77&b=hello%20world");
    let state = StateAccessor::new(browser.handle());
    let snapshot = state.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        snapshot.get("b"),
        Some(&StateValue::Str("hello world".to_string()))
    );
}

#[test]
fn writes_fail_on_unparseable_location() {
    let browser = SimBrowser::modern("not a url");
    let state = StateAccessor::new(browser.handle());
    assert!(matches!(
        state.set("a", 1, true),
        Err(Error::InvalidLocation(_))
    ));
    assert!(matches!(state.remove(None), Err(Error::InvalidLocation(_))));
}
