//! PipeKV CLI Client
//!
//! Connects to a running server over named pipes, prints notifications as
//! they arrive, and reads session commands from stdin:
//!
//! ```text
//! SUBSCRIBE [key]
//! UNSUBSCRIBE [key]
//! DELAY <ms>
//! DISCONNECT
//! ```

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use pipekv::client::connect_fifo;
use pipekv::protocol::{ConnectRequest, Notification};
use tracing_subscriber::{fmt, EnvFilter};

/// PipeKV CLI
#[derive(Parser, Debug)]
#[command(name = "pipekv-cli")]
#[command(about = "Subscribe to key changes on a PipeKV server")]
struct Args {
    /// Unique id; channels are created as /tmp/req<id>, /tmp/resp<id>, /tmp/notif<id>
    client_id: String,

    /// Path of the server's registration FIFO
    registration: PathBuf,
}

#[derive(Debug)]
enum Command {
    Subscribe(String),
    Unsubscribe(String),
    Delay(u64),
    Disconnect,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let key = || {
        rest.trim()
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .map(str::trim)
            .filter(|k| !k.is_empty() && !k.contains(','))
            .map(String::from)
    };
    match word {
        "SUBSCRIBE" => key().map(Command::Subscribe),
        "UNSUBSCRIBE" => key().map(Command::Unsubscribe),
        "DELAY" => rest.trim().parse().ok().map(Command::Delay),
        "DISCONNECT" if rest.trim().is_empty() => Some(Command::Disconnect),
        _ => None,
    }
}

/// Result code as the server reports it: 0 on success, 1 on error
fn result_code(ok: bool) -> u8 {
    if ok {
        0
    } else {
        1
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let request = ConnectRequest::new(
        format!("/tmp/req{}", args.client_id),
        format!("/tmp/resp{}", args.client_id),
        format!("/tmp/notif{}", args.client_id),
    );

    let (mut client, mut notifications) = match connect_fifo(&args.registration, &request) {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!("Failed to connect to the server: {}", e);
            std::process::exit(1);
        }
    };
    println!("Connected to {}", args.registration.display());

    let printer = thread::Builder::new()
        .name("notification-printer".into())
        .spawn(move || loop {
            match notifications.next() {
                Ok(Some(Notification::Updated { key, value })) => println!("({},{})", key, value),
                Ok(Some(Notification::Deleted { key })) => println!("({},DELETED)", key),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Notification channel failed: {}", e);
                    break;
                }
            }
        });
    if let Err(e) = printer {
        eprintln!("Failed to start notification printer: {}", e);
        std::process::exit(1);
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match parse_command(&line) {
            Some(Command::Subscribe(key)) => client.subscribe(&key).map(|ok| {
                println!("Server returned {} for operation: subscribe", result_code(ok));
            }),
            Some(Command::Unsubscribe(key)) => client.unsubscribe(&key).map(|ok| {
                println!("Server returned {} for operation: unsubscribe", result_code(ok));
            }),
            Some(Command::Delay(ms)) => {
                if ms > 0 {
                    println!("Waiting...");
                    thread::sleep(Duration::from_millis(ms));
                }
                Ok(())
            }
            Some(Command::Disconnect) => {
                match client.disconnect() {
                    Ok(_) => println!("Disconnected from server"),
                    Err(e) => eprintln!("Failed to disconnect to the server: {}", e),
                }
                return;
            }
            None => {
                eprintln!("Invalid command. See HELP for usage");
                Ok(())
            }
        };

        if let Err(e) = result {
            eprintln!("Lost connection to the server: {}", e);
            std::process::exit(1);
        }
    }
}
