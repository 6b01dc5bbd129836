//! Tests for the job script parser

use pipekv::jobs::{parse_line, parse_script, JobCommand, MAX_WRITE_SIZE};
use pipekv::KvsError;

fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
    list.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn test_parse_write() {
    assert_eq!(
        parse_line("WRITE [(a,1)(b,2)]").unwrap(),
        Some(JobCommand::Write(pairs(&[("a", "1"), ("b", "2")])))
    );
}

#[test]
fn test_parse_write_tolerates_separators() {
    assert_eq!(
        parse_line("WRITE [ (a,1), (b,2) ]").unwrap(),
        Some(JobCommand::Write(pairs(&[("a", "1"), ("b", "2")])))
    );
}

#[test]
fn test_parse_read_and_delete() {
    assert_eq!(
        parse_line("READ [a,b, c]").unwrap(),
        Some(JobCommand::Read(keys(&["a", "b", "c"])))
    );
    assert_eq!(
        parse_line("DELETE [a]").unwrap(),
        Some(JobCommand::Delete(keys(&["a"])))
    );
}

#[test]
fn test_parse_simple_commands() {
    assert_eq!(parse_line("SHOW").unwrap(), Some(JobCommand::Show));
    assert_eq!(parse_line("BACKUP").unwrap(), Some(JobCommand::Backup));
    assert_eq!(parse_line("HELP").unwrap(), Some(JobCommand::Help));
    assert_eq!(parse_line("WAIT 250").unwrap(), Some(JobCommand::Wait(250)));
}

#[test]
fn test_blank_and_comment_lines_are_skipped() {
    assert_eq!(parse_line("").unwrap(), None);
    assert_eq!(parse_line("   ").unwrap(), None);
    assert_eq!(parse_line("# WRITE [(a,1)]").unwrap(), None);
}

// =============================================================================
// Rejection Tests
// =============================================================================

#[test]
fn test_commands_are_case_sensitive() {
    assert!(matches!(parse_line("show"), Err(KvsError::Parse(_))));
}

#[test]
fn test_malformed_lines_rejected() {
    for line in [
        "WRITE (a,1)",
        "WRITE [(a,1]",
        "WRITE [(a)]",
        "WRITE []",
        "READ []",
        "READ [a,,b]",
        "WAIT",
        "WAIT soon",
        "SHOW now",
        "FLUSH",
    ] {
        assert!(
            matches!(parse_line(line), Err(KvsError::Parse(_))),
            "{:?} should not parse",
            line
        );
    }
}

#[test]
fn test_oversized_token_rejected() {
    let long = "k".repeat(41);
    assert!(parse_line(&format!("READ [{}]", long)).is_err());
    assert!(parse_line(&format!("READ [{}]", "k".repeat(40))).is_ok());
}

#[test]
fn test_too_many_keys_rejected() {
    let many = vec!["k"; MAX_WRITE_SIZE + 1].join(",");
    assert!(parse_line(&format!("READ [{}]", many)).is_err());

    let limit = vec!["k"; MAX_WRITE_SIZE].join(",");
    assert!(parse_line(&format!("READ [{}]", limit)).is_ok());
}

// =============================================================================
// Script Tests
// =============================================================================

#[test]
fn test_parse_script_keeps_order_and_marks_invalid_lines() {
    let script = "WRITE [(a,1)]\n\n# comment\nbogus\nREAD [a]\n";
    let commands = parse_script(script);

    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0], JobCommand::Write(pairs(&[("a", "1")])));
    assert!(matches!(commands[1], JobCommand::Invalid { line: 4, .. }));
    assert_eq!(commands[2], JobCommand::Read(keys(&["a"])));
}
