//! End-to-end tests of the watch -> reload -> registry pipeline.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use prevue::config::Settings;
use prevue::engine::Engine;
use prevue::loader::{LoaderEvent, Priority};
use prevue::registry::shorten_preview_names;

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.runner.command = vec!["/bin/sh".to_string()];
    settings
}

/// A unit that registers artifacts on load and answers render requests.
fn write_unit(dir: &Path, name: &str, registrations: &[(&str, Option<&str>)]) {
    let mut script = String::from("if [ \"$PREVUE_MODE\" = \"render\" ]; then\n");
    script.push_str("  echo \"{\\\"layout\\\": [[\\\"rendered $PREVUE_KEY\\\"]]}\"\n");
    script.push_str("else\n");
    for (symbol, group) in registrations {
        match group {
            Some(group) => script.push_str(&format!(
                "  echo '{{\"register\": {{\"symbol\": \"{symbol}\", \"group\": \"{group}\"}}}}'\n"
            )),
            None => script.push_str(&format!(
                "  echo '{{\"register\": {{\"symbol\": \"{symbol}\"}}}}'\n"
            )),
        }
    }
    if registrations.is_empty() {
        // /bin/sh rejects an empty else branch
        script.push_str("  :\n");
    }
    script.push_str("fi\n");
    fs::write(dir.join(name), script).unwrap();
}

/// Spin on [`Engine::step`] until a change is handled or time runs out.
fn step_until_handled(engine: &mut Engine) -> usize {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let handled = engine.step().unwrap();
        if handled > 0 || Instant::now() > deadline {
            return handled;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_package_load_builds_full_catalog() {
    let temp = TempDir::new().unwrap();
    let proj = temp.path().join("proj");
    let sub = proj.join("sub");
    fs::create_dir_all(&sub).unwrap();
    write_unit(&proj, "__root__.pv", &[("banner", None)]);
    write_unit(&proj, "cards.pv", &[("small", Some("cards")), ("large", Some("cards"))]);
    write_unit(&sub, "__root__.pv", &[]);
    write_unit(&sub, "table.pv", &[("grid", Some("tables"))]);

    let mut engine = Engine::new(test_settings());
    let summary = engine.set_project(&proj).unwrap();
    assert_eq!(summary.failed, 0);

    let registry = engine.registry().read();
    assert_eq!(
        registry.list_keys(None),
        vec![
            "proj.__root__.banner",
            "proj.cards.large",
            "proj.cards.small",
            "proj.sub.table.grid",
        ]
    );
    assert_eq!(registry.groups(), vec!["cards", "tables"]);
    assert_eq!(
        registry.list_keys(Some("cards")),
        vec!["proj.cards.large", "proj.cards.small"]
    );
}

#[test]
fn test_edit_keeps_sibling_artifacts() {
    let temp = TempDir::new().unwrap();
    let proj = temp.path().join("proj");
    fs::create_dir(&proj).unwrap();
    write_unit(&proj, "__root__.pv", &[]);
    write_unit(&proj, "a.pv", &[("x", None)]);
    write_unit(&proj, "b.pv", &[("y", None)]);

    let mut engine = Engine::new(test_settings());
    engine.set_project(&proj).unwrap();

    write_unit(&proj, "a.pv", &[("x2", None)]);
    assert!(step_until_handled(&mut engine) >= 1);

    let keys = engine.registry().read().list_keys(None);
    assert!(keys.contains(&"proj.a.x2".to_string()));
    assert!(!keys.contains(&"proj.a.x".to_string()));
    assert!(keys.contains(&"proj.b.y".to_string()));
}

#[test]
fn test_render_reexecutes_the_owning_unit() {
    let temp = TempDir::new().unwrap();
    let proj = temp.path().join("proj");
    fs::create_dir(&proj).unwrap();
    write_unit(&proj, "__root__.pv", &[]);
    write_unit(&proj, "card.pv", &[("wide", None)]);

    let mut engine = Engine::new(test_settings());
    engine.load_once(&proj).unwrap();

    let registry = engine.registry().read();
    let preview = registry.get("proj.card.wide").unwrap();
    let layout = preview.produce().unwrap();
    assert_eq!(layout.0, serde_json::json!([["rendered proj.card.wide"]]));
}

#[test]
fn test_catalog_names_shorten_against_each_other() {
    let temp = TempDir::new().unwrap();
    let proj = temp.path().join("proj");
    let a = proj.join("a");
    let b = proj.join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    write_unit(&proj, "__root__.pv", &[]);
    write_unit(&a, "__root__.pv", &[]);
    write_unit(&b, "__root__.pv", &[]);
    write_unit(&a, "card.pv", &[("layout", None)]);
    write_unit(&b, "card.pv", &[("layout", None)]);

    let mut engine = Engine::new(test_settings());
    engine.load_once(&proj).unwrap();

    let keys = engine.registry().read().list_keys(None);
    let aliases = shorten_preview_names(&keys);
    // The two card.layout symbols disambiguate by their package segment
    assert!(aliases.contains(&"a.card.layout".to_string()));
    assert!(aliases.contains(&"b.card.layout".to_string()));
    let unique: std::collections::HashSet<_> = aliases.iter().collect();
    assert_eq!(unique.len(), aliases.len());
}

#[test]
fn test_rapid_writes_coalesce_into_bounded_reloads() {
    let temp = TempDir::new().unwrap();
    let proj = temp.path().join("proj");
    fs::create_dir(&proj).unwrap();
    write_unit(&proj, "__root__.pv", &[]);
    write_unit(&proj, "a.pv", &[("x", None)]);

    let mut engine = Engine::new(test_settings());
    engine.set_project(&proj).unwrap();

    // A burst well inside the 50ms cooldown window
    for _ in 0..10 {
        write_unit(&proj, "a.pv", &[("x", None)]);
        std::thread::sleep(Duration::from_millis(2));
    }
    std::thread::sleep(Duration::from_millis(200));

    let mut handled = engine.step().unwrap();
    std::thread::sleep(Duration::from_millis(200));
    handled += engine.step().unwrap();

    // Leading-edge suppression: far fewer reloads than writes
    assert!(handled >= 1);
    assert!(handled <= 5, "expected coalesced events, got {handled}");
    assert_eq!(engine.registry().read().list_keys(None), vec!["proj.a.x"]);
}

#[test]
fn test_edit_fires_unload_then_load_for_that_unit_only() {
    let temp = TempDir::new().unwrap();
    let proj = temp.path().join("proj");
    fs::create_dir(&proj).unwrap();
    write_unit(&proj, "__root__.pv", &[("x", None)]);
    write_unit(&proj, "a.pv", &[("y", None)]);

    let mut engine = Engine::new(test_settings());
    engine.set_project(&proj).unwrap();

    let events = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let seen = events.clone();
    engine.loader_mut().subscribe(Priority::Normal, move |e| {
        seen.borrow_mut().push(e.clone());
    });
    let before = engine
        .registry()
        .read()
        .get("proj.a.y")
        .map(|p| p.created_at)
        .unwrap();

    write_unit(&proj, "a.pv", &[("y", None)]);
    assert!(step_until_handled(&mut engine) >= 1);

    let events = events.borrow();
    let a_path = proj.join("a.pv").canonicalize().unwrap();
    assert_eq!(events[0], LoaderEvent::UnitUnloaded(a_path.clone()));
    assert_eq!(events[1], LoaderEvent::UnitLoaded(a_path));
    assert!(!events
        .iter()
        .any(|e| matches!(e, LoaderEvent::ReloadStarted(_))));

    let registry = engine.registry().read();
    // The sibling is untouched, the edited unit re-registered under the
    // same key with a fresh timestamp
    assert!(registry.get("proj.__root__.x").is_some());
    let after = registry.get("proj.a.y").map(|p| p.created_at).unwrap();
    assert!(after > before);
}

#[test]
fn test_failing_single_project_leaves_engine_responsive() {
    let temp = TempDir::new().unwrap();
    let unit = temp.path().join("solo.pv");
    fs::write(&unit, "exit 1\n").unwrap();

    let mut engine = Engine::new(test_settings());
    let summary = engine.set_project(&unit).unwrap();

    assert_eq!(summary.failed, 1);
    assert!(engine.registry().read().is_empty());
    assert!(engine.is_watching());

    // A fixing edit brings the preview in
    write_unit(temp.path(), "solo.pv", &[("x", None)]);
    assert!(step_until_handled(&mut engine) >= 1);
    assert_eq!(engine.registry().read().list_keys(None), vec!["solo.x"]);
}

#[test]
fn test_transitive_binding_skips_reexecution() {
    let temp = TempDir::new().unwrap();
    let proj = temp.path().join("proj");
    fs::create_dir(&proj).unwrap();
    // The root claims it already executed proj.helper while loading
    fs::write(
        proj.join("__root__.pv"),
        "echo '{\"bind\": \"proj.helper\"}'\n",
    )
    .unwrap();
    // A later load of helper.pv would register; the bind suppresses it
    write_unit(&proj, "helper.pv", &[("tool", None)]);

    let mut engine = Engine::new(test_settings());
    let summary = engine.set_project(&proj).unwrap();

    assert_eq!(summary.loaded, 1);
    assert_eq!(summary.skipped, 1);
    assert!(engine.registry().read().is_empty());
}
