//! Interactive REPL.

use crate::commands::{format_table, format_update};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::sync::Arc;
use subd_client::{Action, ClientConfig, Session, SyncEvent, SyncPoller};
use subd_protocol::{Filter, RecordFields};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

const HELP_TEXT: &str = r#"
Available commands:
  help                            Show this help
  status                          Show file, page and selection

  open <file>                     Open a data file on the server
  reopen                          Open the current file again
  save                            Save the server's data to disk
  connect                         Reconnect after the connection was lost

  select [id=N] [name="S"] [group=G] [rating=R]
                                  Select from the whole file
  reselect [id=N] [name="S"] [group=G] [rating=R]
                                  Narrow the current selection
  add name="S" group=G rating=R [info="S"]
                                  Add a record
  update [name="S"] [group=G] [rating=R] [info="S"]
                                  Change the selected records
  remove                          Remove the selected records

  reload                          Fetch the current page again
  next, prev                      Move one page
  page <n>                        Go to page n
  size <n>                        Rows per page (10, 20, 50, 100, ...)
  row <n>                         Mark row n of the page as selected

  raw <command>                   Send a command as typed

  quit, exit                      Exit the REPL
"#;

pub async fn run(
    mut session: Session,
    config: &ClientConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "subd client".bold().cyan());
    println!("Connecting to {}...", config.connection_config().addr());

    let connection = session.connection().clone();
    let mut events = connection.subscribe();

    match connection.connect().await {
        Ok(()) => println!("{}", "Connected!".green()),
        Err(e) => println!(
            "{}: {} (type 'connect' to retry)",
            "Connection failed".red(),
            e
        ),
    }

    // Watch for changes made by other clients
    let poller = if config.sync.enabled {
        let poller = Arc::new(
            SyncPoller::new(connection.clone()).with_interval(config.sync.poll_interval()),
        );
        let runner = poller.clone();
        tokio::spawn(async move {
            runner.run().await;
        });
        Some(poller)
    } else {
        None
    };

    // Restore the file from the last run
    if connection.is_connected() && session.state().current_file().is_some() {
        let update = session.dispatch(Action::Reopen).await;
        println!("{}\n", format_update(&update, session.state()));
    }

    // Create readline editor
    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".subd_history"))
        .unwrap_or_else(|_| ".subd_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        report_events(&mut events);

        let prompt = format!("{} ", "subd>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&mut session, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    if let Some(poller) = poller {
        poller.shutdown();
    }

    // Disconnect
    let _ = session.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

/// Prints events raised since the last prompt.
fn report_events(events: &mut Receiver<SyncEvent>) {
    let mut changed = false;
    loop {
        match events.try_recv() {
            Ok(SyncEvent::RemoteChange) => changed = true,
            Ok(SyncEvent::Disconnected) => println!(
                "{} (type 'connect' to reconnect)\n",
                "Connection to the server was lost".red()
            ),
            Err(TryRecvError::Lagged(_)) => changed = true,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    if changed {
        println!(
            "{} Continue with this version, or type 'reopen' to load the new one.\n",
            "The data was changed by another user.".yellow()
        );
    }
}

async fn execute_repl_command(
    session: &mut Session,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
        None => (line.to_lowercase(), ""),
    };

    let action = match cmd.as_str() {
        "help" | "?" => return Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => return Ok(None),

        "status" => return Ok(Some(describe(session))),

        "connect" => {
            session.connection().connect().await?;
            return Ok(Some("Connected!".green().to_string()));
        }

        "open" | "o" => {
            if rest.is_empty() {
                return Ok(Some("Usage: open <file>".to_string()));
            }
            Action::Open(rest.to_string())
        }

        "reopen" => Action::Reopen,
        "save" => Action::Save,
        "select" | "s" => Action::Select(parse_filter(rest)?),
        "reselect" | "rs" => Action::Reselect(parse_filter(rest)?),

        "add" | "a" => {
            if rest.is_empty() {
                return Ok(Some(
                    "Usage: add name=\"S\" group=G rating=R [info=\"S\"]".to_string(),
                ));
            }
            Action::Add(parse_fields(rest)?)
        }

        "update" | "u" => Action::Update(parse_fields(rest)?),
        "remove" | "rm" => Action::Remove,
        "reload" | "show" | "r" => Action::Reload,
        "next" | "n" => Action::NextPage,
        "prev" | "p" => Action::PrevPage,

        "page" => match rest.parse() {
            Ok(page) => Action::GotoPage(page),
            Err(_) => return Ok(Some("Usage: page <n>".to_string())),
        },

        "size" => match rest.parse() {
            Ok(size) => Action::ChangePageSize(size),
            Err(_) => return Ok(Some("Usage: size <n>".to_string())),
        },

        "row" => match rest.parse::<usize>() {
            Ok(n) if n >= 1 => Action::SelectRow(n - 1),
            _ => return Ok(Some("Usage: row <n> (1-based)".to_string())),
        },

        "raw" => {
            if rest.is_empty() {
                return Ok(Some("Usage: raw <command>".to_string()));
            }
            Action::Raw(rest.to_string())
        }

        _ => {
            return Ok(Some(format!(
                "Unknown command: {}. Type 'help' for help.",
                cmd
            )))
        }
    };

    let update = session.dispatch(action).await;
    Ok(Some(format_update(&update, session.state())))
}

fn describe(session: &Session) -> String {
    let state = session.state();
    let connection = if session.connection().is_connected() {
        "connected".green()
    } else {
        "disconnected".red()
    };
    let mut output = format!(
        "Server: {} ({})\nFile: {}\nPage: {} ({} per page)\nLast query: {}\nSelected: {}",
        session.connection().config().addr(),
        connection,
        state.current_file().unwrap_or("-"),
        state.page(),
        state.page_size(),
        state.last_query(),
        state.selected_id().unwrap_or("-"),
    );
    if !state.rows().is_empty() {
        output.push_str("\n\n");
        output.push_str(&format_table(state.rows()));
    }
    output
}

/// Splits `key=value` arguments. Double quotes group words and are removed.
fn parse_pairs(input: &str) -> Result<Vec<(String, String)>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err("unterminated quote".to_string());
    }
    if has_token {
        tokens.push(current);
    }

    tokens
        .into_iter()
        .map(|token| match token.split_once('=') {
            Some((key, value)) => Ok((key.to_lowercase(), value.to_string())),
            None => Err(format!("expected key=value, got '{}'", token)),
        })
        .collect()
}

fn parse_filter(input: &str) -> Result<Filter, String> {
    let mut filter = Filter::new();
    for (key, value) in parse_pairs(input)? {
        match key.as_str() {
            "id" => filter.id = value,
            "name" => filter.name = value,
            "group" => filter.group = value,
            "rating" => filter.rating = value,
            other => return Err(format!("unknown filter field '{}'", other)),
        }
    }
    Ok(filter)
}

fn parse_fields(input: &str) -> Result<RecordFields, String> {
    let mut fields = RecordFields::new();
    for (key, value) in parse_pairs(input)? {
        match key.as_str() {
            "name" => fields.name = value,
            "group" => fields.group = value,
            "rating" => fields.rating = value,
            "info" => fields.info = value,
            other => return Err(format!("unknown record field '{}'", other)),
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs(r#"id=3 name="Ivanov Ivan" group=101"#).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), "3".to_string()),
                ("name".to_string(), "Ivanov Ivan".to_string()),
                ("group".to_string(), "101".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_pairs_empty_quoted_value() {
        let pairs = parse_pairs(r#"info="""#).unwrap();
        assert_eq!(pairs, vec![("info".to_string(), String::new())]);
    }

    #[test]
    fn test_parse_pairs_errors() {
        assert!(parse_pairs(r#"name="open"#).is_err());
        assert!(parse_pairs("ivanov").is_err());
        assert!(parse_pairs("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_filter() {
        let filter = parse_filter(r#"ID=3 name="Ivanov""#).unwrap();
        assert_eq!(filter, Filter::new().with_id("3").with_name("Ivanov"));
        assert!(parse_filter("").unwrap().is_empty());
        assert!(parse_filter("info=x").is_err());
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields("rating=5").unwrap();
        assert_eq!(fields, RecordFields::new().with_rating("5"));
        assert!(parse_fields("id=1").is_err());
    }
}
