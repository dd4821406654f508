//! Operator commands read line by line from stdin.

use thiserror::Error;

/// One parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Output {
        article_id: String,
        quantity: u32,
    },
    Search(String),
    Cancel,
    Stock,
    Orders,
    Help,
    Quit,
}

/// A console line that is not a valid command; the message is shown as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(String);

pub const HELP: &str = concat!(
    "commands: refresh | out <article> <qty> | search <term> | cancel",
    " | stock | orders | help | quit",
);

/// Parse a console line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "refresh" | "r" => Command::Refresh,
        "out" | "output" => {
            let article_id = words
                .next()
                .ok_or_else(|| ParseError("usage: out <article> <qty>".into()))?;
            let quantity = match words.next() {
                Some(raw) => raw
                    .parse::<u32>()
                    .map_err(|_| ParseError(format!("invalid quantity '{raw}'")))?,
                None => 1,
            };
            if quantity == 0 {
                return Err(ParseError("quantity must be at least 1".into()));
            }
            Command::Output {
                article_id: article_id.to_string(),
                quantity,
            }
        }
        "search" | "s" => {
            let term: Vec<&str> = words.by_ref().collect();
            if term.is_empty() {
                return Err(ParseError("usage: search <term>".into()));
            }
            return Ok(Some(Command::Search(term.join(" "))));
        }
        "cancel" => Command::Cancel,
        "stock" => Command::Stock,
        "orders" => Command::Orders,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(ParseError(format!("unknown command '{other}'"))),
    };

    if let Some(extra) = words.next() {
        return Err(ParseError(format!("unexpected argument '{extra}'")));
    }
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_ignored() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    fn output(quantity: u32) -> Option<Command> {
        Some(Command::Output {
            article_id: "4711".into(),
            quantity,
        })
    }

    #[test]
    fn output_with_and_without_quantity() {
        assert_eq!(parse("out 4711 3").unwrap(), output(3));
        assert_eq!(parse("OUT 4711").unwrap(), output(1));
    }

    #[test]
    fn output_rejects_bad_quantities() {
        assert!(parse("out 4711 zero").is_err());
        assert!(parse("out 4711 0").is_err());
        assert!(parse("out").is_err());
    }

    #[test]
    fn search_keeps_the_whole_term() {
        assert_eq!(parse("search 12 34").unwrap(), Some(Command::Search("12 34".into())));
        assert!(parse("search").is_err());
    }

    #[test]
    fn simple_commands_reject_extra_arguments() {
        assert_eq!(parse("refresh").unwrap(), Some(Command::Refresh));
        assert_eq!(parse("q").unwrap(), Some(Command::Quit));
        assert!(parse("stock now").is_err());
        assert!(parse("launch").is_err());
    }

    #[test]
    fn errors_display_their_message() {
        let err = parse("launch").unwrap_err();
        assert_eq!(err.to_string(), "unknown command 'launch'");

        // Usable behind anyhow like any other error.
        let err = anyhow::Error::from(parse("out 4711 x").unwrap_err());
        assert_eq!(err.to_string(), "invalid quantity 'x'");
    }
}
