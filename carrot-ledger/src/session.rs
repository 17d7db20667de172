use std::future::Future;
use std::io::Write;

use carrot_ledger::service::Service;
use carrot_shared::auth::Actor;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{Instrument, info_span, warn};
use uuid::Uuid;

use crate::cli::{SessionCommand, SessionLine};
use crate::commands;

enum Flow {
    Continue,
    Quit,
}

/// Reads commands from stdin until `quit`, end of input or `stop` resolves.
/// Timer ticks and bonus credits are printed as they happen.
pub async fn run(service: &Service, mut actor: Actor, json: bool, stop: impl Future<Output = ()>) -> i32 {
    let mut events = service.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::pin!(stop);

    prompt(&actor);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = events.recv() => match event {
                Ok(event) => {
                    if json {
                        if let Ok(text) = serde_json::to_string(&event) {
                            println!("{text}");
                        }
                    } else if let Some(text) = commands::event_line(&event) {
                        println!("{text}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "session fell behind on events"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Flow::Quit = handle_line(service, &mut actor, json, &line).await {
                        break;
                    }
                    prompt(&actor);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error=%e, "failed to read stdin");
                    return 1;
                }
            },
        }
    }
    0
}

fn prompt(actor: &Actor) {
    print!("{actor}> ");
    let _ = std::io::stdout().flush();
}

async fn handle_line(service: &Service, actor: &mut Actor, json: bool, line: &str) -> Flow {
    let words = match tokenize(line) {
        Ok(words) if words.is_empty() => return Flow::Continue,
        Ok(words) => words,
        Err(e) => {
            eprintln!("error: {e}");
            return Flow::Continue;
        }
    };
    let parsed = match SessionLine::try_parse_from(words) {
        Ok(parsed) => parsed,
        Err(e) => {
            // also covers --help
            let _ = e.print();
            return Flow::Continue;
        }
    };
    match parsed.command {
        SessionCommand::Quit => Flow::Quit,
        SessionCommand::As { actor: next } => {
            println!("acting as {next}");
            *actor = next;
            Flow::Continue
        }
        SessionCommand::Ledger(cmd) => {
            let span = info_span!("command", request_id = %Uuid::new_v4(), actor = %actor);
            match commands::run(service, actor, cmd).instrument(span).await {
                Ok(out) => println!("{}", out.render(json)),
                Err(e) => eprintln!("error: {e}"),
            }
            Flow::Continue
        }
    }
}

/// Splits a line into words. Single or double quotes group words; a
/// backslash escapes the next character.
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "dangling backslash".to_string())?;
                current.push(escaped);
                in_word = true;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return Err("unterminated quote".into());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
