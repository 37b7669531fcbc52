use std::sync::LazyLock;

use regex::Regex;

use super::InvocationMode;

pub const REDACTED: &str = "<redacted>";

/// Flags whose value is a credential.
const SENSITIVE_FLAGS: &[&str] = &[
    "--token",
    "--code",
    "--auth-code",
    "--authorization-code",
    "--bearer-token",
];

#[allow(clippy::expect_used)]
static SHELL_SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(--(?:token|code|auth-code|authorization-code|bearer-token))(\s+|=)("[^"]*"|'[^']*'|[^\s"']+)"#,
    )
    .expect("valid shell secret regex")
});

/// Command string safe to log, plus the raw secret values it hid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redaction {
    pub command: String,
    pub secrets: Vec<String>,
}

impl Redaction {
    /// Replaces every known secret occurring in `text`.
    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        out
    }
}

/// Redacts the argument vector in the shape it is handed to the OS.
///
/// Direct mode sees one token per argument, so a flag and its value are
/// separate elements (or joined by `=`). Shell mode sees a single script
/// string, where the value has to be found with a pattern.
pub fn redact(mode: InvocationMode, argv: &[String]) -> Redaction {
    match mode {
        InvocationMode::Direct => redact_direct(argv),
        InvocationMode::Shell => redact_shell(argv),
    }
}

fn redact_direct(argv: &[String]) -> Redaction {
    let mut tokens = Vec::with_capacity(argv.len());
    let mut secrets = Vec::new();
    let mut value_follows = false;

    for arg in argv {
        if value_follows {
            value_follows = false;
            push_secret(&mut secrets, arg);
            tokens.push(REDACTED.to_string());
            continue;
        }

        if SENSITIVE_FLAGS.contains(&arg.as_str()) {
            value_follows = true;
            tokens.push(arg.clone());
            continue;
        }

        match split_flag_value(arg) {
            Some((flag, value)) => {
                push_secret(&mut secrets, value);
                tokens.push(format!("{flag}={REDACTED}"));
            }
            None => tokens.push(arg.clone()),
        }
    }

    Redaction {
        command: join_for_display(&tokens),
        secrets,
    }
}

fn redact_shell(argv: &[String]) -> Redaction {
    let mut secrets = Vec::new();
    let mut tokens = Vec::with_capacity(argv.len());

    for arg in argv {
        for captures in SHELL_SECRET_RE.captures_iter(arg) {
            if let Some(value) = captures.get(3) {
                push_secret(&mut secrets, value.as_str());
                push_secret(&mut secrets, unquote(value.as_str()));
            }
        }
        let replaced = SHELL_SECRET_RE.replace_all(arg, format!("${{1}}${{2}}{REDACTED}"));
        tokens.push(replaced.into_owned());
    }

    Redaction {
        command: join_for_display(&tokens),
        secrets,
    }
}

fn split_flag_value(arg: &str) -> Option<(&str, &str)> {
    let (flag, value) = arg.split_once('=')?;
    SENSITIVE_FLAGS.contains(&flag).then_some((flag, value))
}

fn push_secret(secrets: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !secrets.iter().any(|known| known == value) {
        secrets.push(value.to_string());
    }
    // Longest first so a secret containing another is replaced whole.
    secrets.sort_by_key(|secret| std::cmp::Reverse(secret.len()));
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

fn join_for_display(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| {
            if token.is_empty() || token.chars().any(char::is_whitespace) {
                format!("\"{token}\"")
            } else {
                token.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
