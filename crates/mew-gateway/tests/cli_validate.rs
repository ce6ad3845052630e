//! `mew-gateway validate` (§6.6): parses and validates a space file without starting a server.

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn validate_accepts_a_well_formed_space_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("space.yaml");
    std::fs::write(
        &path,
        r#"
name: demo
participants:
  a:
    type: human
    tokens: ["tok-a"]
    capabilities:
      - kind: chat
tokens:
  tok-a:
    participant_id: a
"#,
    )
    .unwrap();

    Command::cargo_bin("mew-gateway")
        .unwrap()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(contains("space 'demo' is valid"));
}

#[test]
fn validate_rejects_a_dangling_token_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("space.yaml");
    std::fs::write(
        &path,
        r#"
name: demo
participants: {}
tokens:
  tok-a:
    participant_id: ghost
"#,
    )
    .unwrap();

    Command::cargo_bin("mew-gateway").unwrap().arg("validate").arg(&path).assert().failure();
}
