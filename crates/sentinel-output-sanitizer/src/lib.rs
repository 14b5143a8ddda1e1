//! Redacts secrets from adapter output before it reaches the audit
//! ledger or stdout.
//!
//! Receipts and error details can embed upstream response bodies,
//! which occasionally echo back request headers or URLs containing
//! the very secret used to authenticate. This crate is pure string
//! scanning with no runtime dependencies, matching how the rest of the
//! pipeline keeps its boundary layers dependency-light.

const REDACTED: &str = "[redacted]";

/// Redact `secret` wherever it appears verbatim in `text`. A no-op if
/// `secret` is empty, since matching an empty string would redact
/// everything.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, REDACTED)
}

/// Redact every secret in `secrets` from `text`, in order.
pub fn redact_secrets<'a>(text: &str, secrets: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = text.to_string();
    for secret in secrets {
        out = redact_secret(&out, secret);
    }
    out
}

/// Redact common bearer-token and basic-auth header shapes even when
/// the exact secret value isn't known ahead of time, e.g. in upstream
/// error bodies that echo a request header back.
pub fn redact_known_patterns(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        out.push_str(&redact_line(line));
    }
    out
}

fn redact_line(line: &str) -> String {
    for prefix in ["Authorization: Bearer ", "Authorization: Basic ", "authorization: Bearer "] {
        if let Some(idx) = line.find(prefix) {
            let (head, rest) = line.split_at(idx + prefix.len());
            let token_end = rest.find(|c: char| c.is_whitespace()).unwrap_or(rest.len());
            let (_, tail) = rest.split_at(token_end);
            return format!("{head}{REDACTED}{tail}");
        }
    }
    line.to_string()
}
