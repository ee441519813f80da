use crate::errors;
use std::collections::VecDeque;

/// Splits a command line into tokens on whitespace, keeping single-quoted text together.
///
/// Quotes are kept in the token so the parser can tell `'42'` (text) from `42` (number).
/// Two quotes in a row inside quoted text stand for one literal quote.
///
/// # Arguments
/// * `line` - The raw command line.
///
/// # Returns
/// A `Result` containing a `VecDeque<String>` of tokens or an `errors::Error` if a quote is
/// left open.
pub fn tokenize(line: &str) -> Result<VecDeque<String>, errors::Error> {
    let mut result = VecDeque::new();
    let mut current = String::new();
    let mut inside_text = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if inside_text && chars.peek() == Some(&'\'') => {
                chars.next();
                current.push_str("''");
            }
            '\'' => {
                inside_text = !inside_text;
                current.push(c);
            }
            c if c.is_whitespace() && !inside_text => {
                if !current.is_empty() {
                    result.push_back(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }

    if inside_text {
        return Err(errors::Error::Syntax("Unclosed text literal.".to_owned()));
    }
    if !current.is_empty() {
        result.push_back(current);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_whitespace() {
        let tokens = tokenize("  insert   10\tten ").unwrap();
        assert_eq!(tokens, ["insert", "10", "ten"]);
    }

    #[test]
    fn test_keeps_quoted_text_together() {
        let tokens = tokenize("insert 1 'hello big world'").unwrap();
        assert_eq!(tokens, ["insert", "1", "'hello big world'"]);
    }

    #[test]
    fn test_doubled_quote_is_literal() {
        let tokens = tokenize("insert 1 'it''s'").unwrap();
        assert_eq!(tokens, ["insert", "1", "'it''s'"]);
    }

    #[test]
    fn test_unclosed_quote() {
        let err = tokenize("insert 1 'open").unwrap_err();
        assert_eq!(err.code(), 3000);
    }

    #[test]
    fn test_empty_line() {
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
