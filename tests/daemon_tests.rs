//! End-to-end tests of `notes-wakatime run`
//!
//! Host events are fed through stdin or an events file; a shell script
//! stands in for the agent where an installed agent is needed.

mod common;

use common::{event_lines, TestEnv, VALID_KEY};
use predicates::prelude::*;

#[test]
fn test_run_without_agent_exits_cleanly() {
    let env = TestEnv::new();
    let input = event_lines(&[
        r#"{"type":"notes","notes":[{"id":"a1","title":"Groceries"}]}"#,
        r#"{"type":"note_selected","id":"a1","title":"Groceries","project":"Home"}"#,
        r#"{"type":"note_saved","id":"a1","title":"Groceries","project":"Home"}"#,
    ]);

    env.cmd()
        .arg("run")
        .env("NOTES_WAKATIME_API_KEY", VALID_KEY)
        .write_stdin(input)
        .assert()
        .success();

    assert!(!env.agent_binary().exists());
}

#[test]
fn test_run_reads_events_file() {
    let env = TestEnv::new();
    let events = env.write(
        "events.jsonl",
        &event_lines(&[
            "this is not json",
            r#"{"type":"note_changed","id":"a1","title":"Groceries"}"#,
        ]),
    );

    env.cmd()
        .args(["run", "--events"])
        .arg(&events)
        .env("NOTES_WAKATIME_API_KEY", VALID_KEY)
        .assert()
        .success()
        .stderr(predicate::str::contains("unreadable host message"));
}

#[test]
fn test_run_missing_events_file() {
    let env = TestEnv::new();
    env.cmd()
        .args(["run", "--events", "absent.jsonl"])
        .env("NOTES_WAKATIME_API_KEY", VALID_KEY)
        .assert()
        .failure()
        .code(20)
        .stderr(predicate::str::contains("E200"));
}

#[test]
fn test_run_warns_about_invalid_key() {
    let env = TestEnv::new();
    env.cmd()
        .arg("run")
        .write_stdin(event_lines(&[r#"{"type":"note_selected","id":"a1","title":"Groceries"}"#]))
        .assert()
        .success()
        .stderr(predicate::str::contains("Invalid WakaTime API key"));
}

#[cfg(unix)]
#[test]
fn test_run_reports_heartbeats_through_agent() {
    let env = TestEnv::new();
    env.install_fake_agent(0);

    let input = event_lines(&[
        r#"{"type":"notes","notes":[{"id":"a1","title":"Groceries"},{"id":"b2","title":"Recipes"}]}"#,
        r#"{"type":"note_selected","id":"a1","title":"Groceries","project":"Home"}"#,
        // same note, well inside the idle refresh: throttled
        r#"{"type":"note_changed","id":"a1","title":"Groceries","project":"Home"}"#,
        // rename: absorbed
        r#"{"type":"note_changed","id":"b2","title":"Family Recipes"}"#,
        r#"{"type":"note_selected","id":"b2","title":"Family Recipes","project":"Kitchen Notes"}"#,
        r#"{"type":"note_saved","id":"b2","title":"Family Recipes","project":"Kitchen Notes","timestamp":"2024-03-01T09:00:00Z"}"#,
        // previous save is fresh: sent
        r#"{"type":"note_saved","id":"b2","title":"Family Recipes","project":"Kitchen Notes","timestamp":"2024-03-01T09:10:00Z"}"#,
        // previous save is more than 30 minutes old: suppressed
        r#"{"type":"note_saved","id":"b2","title":"Family Recipes","project":"Kitchen Notes","timestamp":"2024-03-01T09:41:00Z"}"#,
    ]);

    env.cmd()
        .arg("run")
        .env("NOTES_WAKATIME_API_KEY", VALID_KEY)
        .write_stdin(input)
        .assert()
        .success();

    let mut calls = env.agent_calls();
    calls.sort();
    assert_eq!(calls.len(), 4, "calls: {:?}", calls);
    assert!(calls[0].starts_with("--entity \"Family Recipes\""));
    assert!(calls[0].contains("--project \"Kitchen Notes\""));
    assert!(!calls[0].ends_with("--write"));
    for save in &calls[1..3] {
        assert!(save.starts_with("--entity \"Family Recipes\""));
        assert!(save.ends_with("--write"));
    }
    assert!(calls[3].starts_with("--entity Groceries"));
    assert!(calls[3].contains("--project Home"));
}

#[cfg(unix)]
#[test]
fn test_run_with_invalid_key_never_calls_agent() {
    let env = TestEnv::new();
    env.install_fake_agent(0);

    env.cmd()
        .arg("run")
        .env("NOTES_WAKATIME_API_KEY", "not-a-key")
        .write_stdin(event_lines(&[
            r#"{"type":"note_selected","id":"a1","title":"Groceries"}"#,
            r#"{"type":"note_saved","id":"a1","title":"Groceries"}"#,
        ]))
        .assert()
        .success();

    assert!(env.agent_calls().is_empty());
}

#[cfg(unix)]
#[test]
fn test_run_survives_agent_errors() {
    let env = TestEnv::new();
    env.install_fake_agent(102);

    env.cmd()
        .arg("run")
        .env("NOTES_WAKATIME_API_KEY", VALID_KEY)
        .write_stdin(event_lines(&[r#"{"type":"note_selected","id":"a1","title":"Groceries"}"#]))
        .assert()
        .success()
        .stderr(predicate::str::contains("WakaTime Offline"));

    assert_eq!(env.agent_calls().len(), 1);
}
