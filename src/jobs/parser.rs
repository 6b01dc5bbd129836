//! Job script parser
//!
//! ## Grammar
//! ```text
//! WRITE [(key,value)(key2,value2)...]
//! READ [key,key2,...]
//! DELETE [key,key2,...]
//! SHOW
//! WAIT <delay_ms>
//! BACKUP
//! HELP
//! # comment
//! ```
//! Commands are case-sensitive. Keys and values are at most
//! `MAX_STRING_SIZE` bytes and may not contain `()[],` or whitespace.

use crate::error::{KvsError, Result};
use crate::protocol::MAX_STRING_SIZE;

use super::JobCommand;

/// Max pairs or keys in a single WRITE/READ/DELETE
pub const MAX_WRITE_SIZE: usize = 256;

/// Parse a whole script. Blank and comment lines are dropped; lines that
/// fail to parse become [`JobCommand::Invalid`].
pub fn parse_script(script: &str) -> Vec<JobCommand> {
    script
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match parse_line(line) {
            Ok(command) => command,
            Err(e) => Some(JobCommand::Invalid {
                line: index + 1,
                reason: e.to_string(),
            }),
        })
        .collect()
}

/// Parse one line. `Ok(None)` for blank lines and comments.
pub fn parse_line(line: &str) -> Result<Option<JobCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "WRITE" => JobCommand::Write(parse_pairs(rest)?),
        "READ" => JobCommand::Read(parse_keys(rest)?),
        "DELETE" => JobCommand::Delete(parse_keys(rest)?),
        "SHOW" => no_arguments(word, rest, JobCommand::Show)?,
        "BACKUP" => no_arguments(word, rest, JobCommand::Backup)?,
        "HELP" => no_arguments(word, rest, JobCommand::Help)?,
        "WAIT" => {
            let delay = rest
                .parse()
                .map_err(|_| KvsError::Parse(format!("WAIT expects a delay in ms, got {:?}", rest)))?;
            JobCommand::Wait(delay)
        }
        other => return Err(KvsError::Parse(format!("Unknown command {:?}", other))),
    };
    Ok(Some(command))
}

fn no_arguments(word: &str, rest: &str, command: JobCommand) -> Result<JobCommand> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(KvsError::Parse(format!("{} takes no arguments", word)))
    }
}

/// Strip the surrounding `[` `]`
fn bracketed(rest: &str) -> Result<&str> {
    rest.strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .map(str::trim)
        .ok_or_else(|| KvsError::Parse(format!("Expected [...], got {:?}", rest)))
}

fn token(raw: &str) -> Result<String> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(KvsError::Parse("Empty key or value".into()));
    }
    if token.len() > MAX_STRING_SIZE {
        return Err(KvsError::Parse(format!(
            "{:?} exceeds {} bytes",
            token, MAX_STRING_SIZE
        )));
    }
    if token
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | ','))
    {
        return Err(KvsError::Parse(format!("{:?} contains a reserved character", token)));
    }
    Ok(token.to_string())
}

fn check_count(count: usize) -> Result<()> {
    match count {
        0 => Err(KvsError::Parse("Empty list".into())),
        n if n > MAX_WRITE_SIZE => Err(KvsError::Parse(format!(
            "Too many entries: {} (max {})",
            n, MAX_WRITE_SIZE
        ))),
        _ => Ok(()),
    }
}

fn parse_keys(rest: &str) -> Result<Vec<String>> {
    let inner = bracketed(rest)?;
    let keys = inner.split(',').map(token).collect::<Result<Vec<_>>>()?;
    check_count(keys.len())?;
    Ok(keys)
}

fn parse_pairs(rest: &str) -> Result<Vec<(String, String)>> {
    let mut remaining = bracketed(rest)?;
    let mut pairs = Vec::new();

    loop {
        remaining = remaining.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if remaining.is_empty() {
            break;
        }
        let body = remaining
            .strip_prefix('(')
            .ok_or_else(|| KvsError::Parse(format!("Expected '(' at {:?}", remaining)))?;
        let close = body
            .find(')')
            .ok_or_else(|| KvsError::Parse("Unterminated pair".into()))?;
        let (key, value) = body[..close]
            .split_once(',')
            .ok_or_else(|| KvsError::Parse(format!("Pair {:?} lacks a value", &body[..close])))?;
        pairs.push((token(key)?, token(value)?));
        remaining = &body[close + 1..];
    }

    check_count(pairs.len())?;
    Ok(pairs)
}
