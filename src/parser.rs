//! Line grammar consumed from the REPL driver: whitespace tokens, `|`
//! splitting a pipeline into commands, a trailing `&` setting the
//! background flag. No quoting, escaping, or expansion.

/// A pipeline parsed out of one input line.
pub struct ParsedLine {
    /// One argv per pipeline stage; each is non-empty.
    pub commands: Vec<Vec<String>>,
    pub background: bool,
}

/// Tokenize on whitespace only. `|` and `&` are recognized as
/// metacharacters when they appear as standalone tokens.
fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Parse one already-trimmed, non-empty line. Returns `Err` with a
/// one-line diagnostic for malformed pipe placement.
pub fn parse_line(line: &str) -> Result<ParsedLine, String> {
    let mut tokens = tokenize(line);

    let background = if tokens.last().map(String::as_str) == Some("&") {
        tokens.pop();
        true
    } else {
        false
    };

    if tokens.is_empty() {
        // The only token was "&" itself.
        return Err("wsh: syntax error: unexpected token `&'".to_string());
    }

    let mut commands = Vec::new();
    let mut current = Vec::new();

    for token in tokens {
        if token == "|" {
            if current.is_empty() {
                return Err("Pipe has no target".to_string());
            }
            commands.push(std::mem::take(&mut current));
        } else {
            current.push(token);
        }
    }

    if current.is_empty() {
        return Err("Pipe has no target".to_string());
    }
    commands.push(current);

    Ok(ParsedLine {
        commands,
        background,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_command_no_pipe() {
        let parsed = parse_line("ls -l").unwrap();
        assert_eq!(parsed.commands, vec![vec!["ls", "-l"]]);
        assert!(!parsed.background);
    }

    #[test]
    fn pipeline_splits_on_pipe_tokens() {
        let parsed = parse_line("ls | wc -l").unwrap();
        assert_eq!(
            parsed.commands,
            vec![
                vec!["ls".to_string()],
                vec!["wc".to_string(), "-l".to_string()]
            ]
        );
    }

    #[test]
    fn trailing_ampersand_sets_background_and_is_not_an_arg() {
        let parsed = parse_line("sleep 10 &").unwrap();
        assert_eq!(parsed.commands, vec![vec!["sleep", "10"]]);
        assert!(parsed.background);
    }

    #[test]
    fn trailing_pipe_is_a_parse_error() {
        let err = parse_line("ls |").unwrap_err();
        assert_eq!(err, "Pipe has no target");
    }

    #[test]
    fn leading_pipe_is_a_parse_error() {
        let err = parse_line("| ls").unwrap_err();
        assert_eq!(err, "Pipe has no target");
    }

    #[test]
    fn consecutive_pipes_are_a_parse_error() {
        let err = parse_line("ls || wc").unwrap_err();
        assert_eq!(err, "Pipe has no target");
    }

    #[test]
    fn ampersand_only_line_is_a_parse_error() {
        assert!(parse_line("&").is_err());
    }

    #[test]
    fn single_stage_pipeline_has_length_one() {
        let parsed = parse_line("echo hi").unwrap();
        assert_eq!(parsed.commands.len(), 1);
    }
}
