use super::tokenizer;
use super::Command;
use crate::database::parse_key;
use crate::errors;
use crate::storage::{Key, Value};
use std::collections::VecDeque;
use std::path::PathBuf;

/// Parses a value token. Quoted text is always a string; anything else is inferred.
///
/// # Arguments
/// * `token` - The raw token, quotes included.
///
/// # Returns
/// A `Result` containing the `Value` or an `errors::Error` for empty values.
fn parse_value(token: &str) -> Result<Value, errors::Error> {
    match token
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        Some(text) => Value::Str(text.replace("''", "'")).validated(),
        None => Value::parse(token),
    }
}

fn parse_key_token(tokens: &mut VecDeque<String>, error_msg: &str) -> Result<Key, errors::Error> {
    let token = pop_token(tokens, error_msg)?;
    parse_key(&token)
}

fn parse_path_token(
    tokens: &mut VecDeque<String>,
    error_msg: &str,
) -> Result<PathBuf, errors::Error> {
    let token = pop_token(tokens, error_msg)?;
    let path = token
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(&token);
    Ok(PathBuf::from(path.replace("''", "'")))
}

/// Helper function to pop a token or return an error.
fn pop_token(tokens: &mut VecDeque<String>, error_msg: &str) -> Result<String, errors::Error> {
    tokens
        .pop_front()
        .ok_or_else(|| errors::Error::Syntax(error_msg.to_owned()))
}

/// Parses one command line into a `Command`.
///
/// Keywords are case-insensitive and a trailing `;` is ignored.
///
/// # Errors
/// Returns `Error::Syntax` for unknown commands, missing arguments or extra tokens, and
/// `Error::InvalidEntry` for a key that is not an integer or an empty value.
pub fn parse(line: &str) -> Result<Command, errors::Error> {
    let line = line.trim();
    let mut tokens = tokenizer::tokenize(line.strip_suffix(';').unwrap_or(line))?;

    let first = pop_token(&mut tokens, "Command cannot be empty.")?.to_lowercase();
    let command = match first.as_str() {
        "insert" | "set" => {
            let key = parse_key_token(&mut tokens, "'INSERT' must be followed by a key.")?;
            let value = pop_token(&mut tokens, "'INSERT key' must be followed by a value.")?;
            Command::Insert {
                key,
                value: parse_value(&value)?,
            }
        }
        "get" | "search" => Command::Get {
            key: parse_key_token(&mut tokens, "'GET' must be followed by a key.")?,
        },
        "delete" | "del" => Command::Delete {
            key: parse_key_token(&mut tokens, "'DELETE' must be followed by a key.")?,
        },
        "range" => {
            let lo = parse_key_token(&mut tokens, "'RANGE' must be followed by a lower bound.")?;
            let hi = parse_key_token(
                &mut tokens,
                "'RANGE lo' must be followed by an upper bound.",
            )?;
            Command::Range { lo, hi }
        }
        "all" => Command::All,
        "count" => Command::Count,
        "height" => Command::Height,
        "stats" => Command::Stats,
        "validate" => Command::Validate,
        "tree" => Command::Tree,
        "clear" => Command::Clear,
        "backup" => Command::Backup {
            path: parse_path_token(&mut tokens, "'BACKUP' must be followed by a file path.")?,
        },
        "restore" => Command::Restore {
            path: parse_path_token(&mut tokens, "'RESTORE' must be followed by a file path.")?,
        },
        "export" => Command::Export {
            path: parse_path_token(&mut tokens, "'EXPORT' must be followed by a file path.")?,
        },
        "import" => Command::Import {
            path: parse_path_token(&mut tokens, "'IMPORT' must be followed by a file path.")?,
        },
        _ => {
            return Err(errors::Error::Syntax(format!(
                "Unrecognized command: {}.",
                first
            )))
        }
    };
    if !tokens.is_empty() {
        return Err(errors::Error::Syntax(
            "Unexpected tokens after command.".to_owned(),
        ));
    }
    Ok(command)
}
