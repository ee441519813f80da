//! Line-oriented interactive shell over a [`Session`].
pub mod history;

use crate::command::{self, CommandResult};
use crate::errors;
use crate::session::Session;
use crossterm::{
    execute,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use history::History;
use std::io::{self, BufRead, Write};
use std::time::Instant;
use tracing::{error, info};

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

const BANNER: &str = r#"
Keys are integers. Values are inferred: true/false, integers, decimals, or text.
Quote a value ('42') to keep it as text. Type 'help' for help.
"#;

const HELP: &str = r#"List of all kvtree commands:

insert KEY VALUE   Insert or overwrite a pair.
get KEY            Look a key up.
delete KEY         Remove a key.
range LO HI        Show pairs with LO <= key <= HI.
all                Show every pair in key order.
count              Number of pairs.
height             Number of tree levels.
stats              Tree statistics.
validate           Check the tree structure.
tree               Show the keys of every node.
clear              Remove every pair.
backup FILE        Write all pairs to a CSV file.
restore FILE       Replace all pairs with a CSV backup.
export FILE        Write all pairs to a JSON file.
import FILE        Replace all pairs with a JSON file.

help      (\h) Display this help.
version   (\v) Show version information.
quit      (\q) Quit kvtree.
"#;

/// What the shell should do after a line.
#[derive(Debug, PartialEq)]
pub enum Reply {
    Nothing,
    Text(String),
    Error(String),
    Quit,
}

pub struct Shell<'a> {
    session: &'a mut Session,
    history: History,
}

impl<'a> Shell<'a> {
    pub fn new(session: &'a mut Session, history: History) -> Self {
        Shell { session, history }
    }

    /// Reads lines from `input` until EOF or `quit`.
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<(), errors::Error> {
        info!(session_id = %self.session.id, "Starting shell session...");
        echo_line(&format!("Welcome to the {} {} shell.", NAME, VERSION))?;
        echo_line(BANNER)?;

        let mut lines = input.lines();
        loop {
            prompt()?;
            let Some(line) = lines.next() else {
                break;
            };
            match self.handle_line(&line?) {
                Reply::Nothing => {}
                Reply::Text(text) => echo_line(&text)?,
                Reply::Error(text) => echo_error(&text)?,
                Reply::Quit => break,
            }
        }

        echo_line("Bye")?;
        Ok(())
    }

    /// Handles one input line and returns what to show.
    pub fn handle_line(&mut self, line: &str) -> Reply {
        let input = line.trim();
        if input.is_empty() {
            return Reply::Nothing;
        }
        self.history.push(input);

        match input.trim_end_matches(';').trim() {
            "exit" | "quit" | "\\q" => Reply::Quit,
            "version" | "\\v" => Reply::Text(format!("{} version: {}", NAME, VERSION)),
            "help" | "\\h" | "\\?" | "?" => Reply::Text(HELP.to_string()),
            cmd if cmd.starts_with('\\') => {
                Reply::Error(format!("Unrecognized command: {}", cmd))
            }
            _ => self.handle_command(input),
        }
    }

    fn handle_command(&mut self, input: &str) -> Reply {
        let start = Instant::now();
        match command::run(&mut self.session.database, input) {
            Ok(result) => {
                let elapsed = start.elapsed().as_secs_f32();
                match result {
                    CommandResult::ResultSet { ref rows, .. } if rows.is_empty() => {
                        Reply::Text(format!("Empty set ({:.2} sec)", elapsed))
                    }
                    result => Reply::Text(format!("{} ({:.2} sec)", result.render(), elapsed)),
                }
            }
            Err(e) => {
                error!(input, "{}", e);
                Reply::Error(e.to_string())
            }
        }
    }
}

/// Opens a session with history in the home directory and runs it on stdin.
pub fn start(mut session: Session) -> Result<(), errors::Error> {
    let history = History::open(history::get_home_file(&format!(".{}_history", NAME)));
    let result = Shell::new(&mut session, history).run(io::stdin().lock());

    session.close().map_err(|e| {
        error!("Failed to close session: {}", e);
        e
    })?;
    info!("Shell session ended.");
    result
}

fn prompt() -> io::Result<()> {
    execute!(
        io::stdout(),
        SetAttribute(Attribute::Bold),
        SetForegroundColor(Color::Green),
        Print(format!("{}> ", NAME)),
        SetAttribute(Attribute::Reset),
        ResetColor
    )?;
    io::stdout().flush()
}

/// Echoes a string to the console.
pub fn echo_line(s: &str) -> io::Result<()> {
    execute!(io::stdout(), Print(s), Print("\n"))?;
    io::stdout().flush()
}

/// Echoes an error message in red to the console.
pub fn echo_error(s: &str) -> io::Result<()> {
    execute!(
        io::stdout(),
        SetForegroundColor(Color::Red),
        Print(s),
        ResetColor,
        Print("\n")
    )?;
    io::stdout().flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Text(text) => text,
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_meta_commands() {
        let mut session = Session::open(None, 4).unwrap();
        let mut shell = Shell::new(&mut session, History::open(None));

        assert_eq!(shell.handle_line("   "), Reply::Nothing);
        assert!(text(shell.handle_line("help")).contains("insert KEY VALUE"));
        assert!(text(shell.handle_line("\\v")).contains(VERSION));
        assert!(matches!(shell.handle_line("\\x"), Reply::Error(_)));
        assert_eq!(shell.handle_line("quit;"), Reply::Quit);
    }

    #[test]
    fn test_commands_run_against_session() {
        let mut session = Session::open(None, 4).unwrap();
        let mut shell = Shell::new(&mut session, History::open(None));

        assert!(text(shell.handle_line("insert 1 one")).starts_with("Query OK, 1 row affected"));
        assert!(text(shell.handle_line("get 1")).contains("| 1   | one   | TEXT |"));
        assert!(text(shell.handle_line("get 2")).starts_with("Empty set"));
        assert!(matches!(shell.handle_line("get x"), Reply::Error(e) if e.starts_with("[4000]")));
        assert_eq!(shell.history.lines().len(), 4);
        drop(shell);
        assert_eq!(session.database.len(), 1);
    }

    #[test]
    fn test_run_reads_until_quit() {
        let mut session = Session::open(None, 4).unwrap();
        let input = "insert 1 a\ninsert 2 b\nquit\ninsert 3 c\n";
        Shell::new(&mut session, History::open(None))
            .run(input.as_bytes())
            .unwrap();
        assert_eq!(session.database.len(), 2);
    }
}
