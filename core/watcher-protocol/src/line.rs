//! Line tokenizer, parser and formatter.
//!
//! Words are split on unquoted whitespace. Single quotes are literal. Double
//! quotes accept `\"`, `\\`, `\$`, `` \` ``, `\n` and `\t` escapes; any other
//! backslash inside double quotes is kept as-is. Outside quotes a backslash
//! escapes the next character.

use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};

use crate::{Notification, NotificationKind, ParseError, Payload, MAX_LINE_BYTES};

#[derive(Debug, Parser)]
#[command(
    name = "notification",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true,
    disable_help_subcommand = true
)]
struct LineArgs {
    #[command(subcommand)]
    kind: LineKind,
}

#[derive(Debug, Subcommand)]
enum LineKind {
    #[command(alias = "preopen", disable_help_flag = true)]
    Open(SessionArgs),

    #[command(alias = "preexec", disable_help_flag = true)]
    Exec {
        #[command(flatten)]
        session: SessionArgs,

        #[arg(long, allow_hyphen_values = true)]
        command: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        path: String,

        #[arg(long, allow_hyphen_values = true)]
        shell: Option<String>,
    },

    #[command(alias = "precmd", disable_help_flag = true)]
    Result {
        #[command(flatten)]
        session: SessionArgs,

        #[arg(long = "exit-code", allow_negative_numbers = true)]
        exit_code: Option<i32>,
    },

    #[command(alias = "preclose", disable_help_flag = true)]
    Close(SessionArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long)]
    pid: String,

    #[arg(long)]
    time: String,
}

/// Parses one pipe line into a validated [`Notification`].
pub fn parse_line(line: &str) -> Result<Notification, ParseError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ParseError::new(
            "line_too_long",
            format!("line exceeded {} bytes", MAX_LINE_BYTES),
        ));
    }

    let words = split_words(line)?;
    let first = match words.first() {
        Some(word) => word,
        None => return Err(ParseError::new("empty_line", "line contained no words")),
    };
    if NotificationKind::from_name(first).is_none() {
        return Err(ParseError::new(
            "unknown_kind",
            format!("unknown notification kind: {}", first),
        ));
    }

    let args = LineArgs::try_parse_from(&words)
        .map_err(|err| ParseError::new("invalid_arguments", clap_summary(&err.to_string())))?;

    match args.kind {
        LineKind::Open(session) => build(session, Payload::Open),
        LineKind::Exec {
            session,
            command,
            path,
            shell,
        } => {
            require_string(&path, "path")?;
            let shell = shell.filter(|value| !value.trim().is_empty());
            build(
                session,
                Payload::Exec {
                    command,
                    path,
                    shell,
                },
            )
        }
        LineKind::Result { session, exit_code } => build(session, Payload::Result { exit_code }),
        LineKind::Close(session) => build(session, Payload::Close),
    }
}

/// First two non-empty lines of a clap error, so "required arguments were
/// not provided:" keeps the argument names that follow it.
fn clap_summary(rendered: &str) -> String {
    let summary = rendered
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(2)
        .collect::<Vec<_>>()
        .join(" ");
    let summary = summary.trim_start_matches("error: ");
    if summary.is_empty() {
        "invalid arguments".to_string()
    } else {
        summary.to_string()
    }
}

fn build(session: SessionArgs, payload: Payload) -> Result<Notification, ParseError> {
    require_string(&session.pid, "pid")?;
    let timestamp = parse_timestamp(&session.time)?;
    Ok(Notification {
        session_id: session.pid,
        timestamp,
        payload,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            ParseError::new(
                "invalid_timestamp",
                format!("time must be RFC3339 with offset ({}): {}", value, err),
            )
        })
}

fn require_string(value: &str, field: &str) -> Result<(), ParseError> {
    if value.trim().is_empty() {
        return Err(ParseError::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}

fn split_words(line: &str) -> Result<Vec<String>, ParseError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unterminated('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some('n') => current.push('\n'),
                            Some('t') => current.push('\t'),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(unterminated('"')),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unterminated('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn unterminated(quote: char) -> ParseError {
    ParseError::new(
        "unterminated_quote",
        format!("missing closing {} quote", quote),
    )
}

/// Formats a notification as a single pipe line (without the trailing newline).
pub fn format_line(notification: &Notification) -> String {
    let mut words = vec![
        notification.kind().as_str().to_string(),
        "--pid".to_string(),
        quote(&notification.session_id),
        "--time".to_string(),
        notification
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true),
    ];

    match &notification.payload {
        Payload::Open | Payload::Close => {}
        Payload::Exec {
            command,
            path,
            shell,
        } => {
            words.push("--path".to_string());
            words.push(quote(path));
            if let Some(shell) = shell {
                words.push("--shell".to_string());
                words.push(quote(shell));
            }
            if let Some(command) = command {
                words.push("--command".to_string());
                words.push(quote(command));
            }
        }
        Payload::Result { exit_code } => {
            if let Some(exit_code) = exit_code {
                words.push("--exit-code".to_string());
                words.push(exit_code.to_string());
            }
        }
    }

    words.join(" ")
}

fn quote(value: &str) -> String {
    let is_plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./:=+@%,-".contains(c));
    if is_plain && !value.starts_with('-') {
        return value.to_string();
    }

    if value.contains(['\n', '\t']) {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('"');
        for c in value.chars() {
            match c {
                '"' | '\\' | '$' | '`' => {
                    quoted.push('\\');
                    quoted.push(c);
                }
                '\n' => quoted.push_str("\\n"),
                '\t' => quoted.push_str("\\t"),
                c => quoted.push(c),
            }
        }
        quoted.push('"');
        return quoted;
    }

    format!("'{}'", value.replace('\'', "'\\''"))
}
