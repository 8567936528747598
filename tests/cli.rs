use assert_cmd::Command;
use predicates::prelude::*;

fn lurelens() -> Command {
    let mut cmd = Command::cargo_bin("lurelens").unwrap();
    cmd.env_remove("LURELENS_PROVIDER")
        .env_remove("GEMINI_API_KEY")
        .env_remove("LURELENS_CORPUS");
    cmd
}

#[test]
fn test_cli_help() {
    lurelens()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: lurelens"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("defend"))
        .stdout(predicate::str::contains("augment"))
        .stdout(predicate::str::contains("--provider <PROVIDER>"))
        .stdout(predicate::str::contains("--context-window <CONTEXT_WINDOW>"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_simulate_help() {
    lurelens()
        .arg("simulate")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: lurelens simulate"))
        .stdout(predicate::str::contains("--turns <TURNS>"))
        .stdout(predicate::str::contains("--starting-role <STARTING_ROLE>"));
}

#[test]
fn test_cli_no_command() {
    lurelens()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: lurelens"));
}

#[test]
fn test_cli_scripted_simulation_flags_turns() {
    lurelens()
        .args(["--provider", "scripted", "simulate", "--turns", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#0 🎣 Attacker: [SIMULATION]"))
        .stdout(predicate::str::contains("#1 🙂 Victim: [SIMULATION]"))
        .stdout(predicate::str::contains("🚩 Red flags detected:"));
}

#[test]
fn test_cli_rejects_unknown_starting_role() {
    lurelens()
        .args(["--provider", "scripted", "simulate", "--turns", "1", "--starting-role", "narrator"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown role 'narrator'"));
}

#[test]
fn test_cli_gemini_without_key_fails_before_any_call() {
    lurelens()
        .args(["--provider", "gemini", "simulate", "--turns", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires an API key"));
}

#[test]
fn test_cli_defend_scripted() {
    lurelens()
        .args(["--provider", "scripted", "defend", "Send me money right now, babe"])
        .assert()
        .success()
        .stdout(predicate::str::contains("🚩 Red flags detected:"))
        .stdout(predicate::str::contains("[DEFENDER MODE]"));
}

#[test]
fn test_cli_interactive_user_reply() {
    lurelens()
        .args(["--provider", "scripted", "simulate", "--starting-role", "victim"])
        .write_stdin("hi, my pin is 1234\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sensitive words were removed"))
        .stdout(predicate::str::contains("#0 🙂 Victim: hi, my [REDACTED_SENSITIVE] is 1234"))
        .stdout(predicate::str::contains("#1 🎣 Attacker: [SIMULATION] Hey!"))
        .stdout(predicate::str::contains("🚩 Red flags detected:"));
}
