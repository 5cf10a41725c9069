//! Shell `export` rendering of a resolved batch
//!
//! `AWSSECRETS://a/b/some-key` resolving to `v` renders as
//! `export SOME_KEY='v'`. A token with a key path contributes its key path to
//! the name (`db|password` becomes `DB__PASSWORD`). A value that is a JSON
//! object is expanded into one line per top-level field instead.

use configmanager_secrets::{Config, ResolvedTokens, Token, value_text};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Separator that stands in for the key-path separator in variable names
const KEY_PATH_JOINER: &str = "__";

/// Normalise `raw` into a variable name.
///
/// Uppercases, drops spaces, `@` and `!`, turns `-` into `_`, and replaces
/// every occurrence of `key_separator` with `__`.
#[must_use]
pub fn normalize_key(raw: &str, key_separator: &str) -> String {
    let joined = if key_separator.is_empty() {
        raw.to_string()
    } else {
        raw.replace(key_separator, KEY_PATH_JOINER)
    };
    joined
        .chars()
        .filter(|c| !matches!(c, ' ' | '@' | '!'))
        .map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect()
}

/// Variable name for a token: the last segment of its store path, plus its
/// key path when it has one.
#[must_use]
pub fn variable_name(token: &Token) -> String {
    let store = token.store_token().trim_end_matches('/');
    let segment = store.rsplit('/').next().unwrap_or(store);
    if token.key_path().is_empty() {
        normalize_key(segment, token.key_separator())
    } else {
        normalize_key(
            &format!("{segment}{}{}", token.key_separator(), token.key_path()),
            token.key_separator(),
        )
    }
}

/// Render every resolved token as `export` lines, sorted by token.
///
/// Tokens that no longer parse under `config` are skipped.
#[must_use]
pub fn render(resolved: &ResolvedTokens, config: &Config) -> String {
    let sorted: BTreeMap<_, _> = resolved.iter().collect();
    let mut out = String::new();
    for (raw, value) in sorted {
        let Some(token) = Token::parse(raw, config) else {
            tracing::debug!(token = %raw, "skipping unparsable token in export");
            continue;
        };
        match as_object(value) {
            Some(fields) => {
                for (field, field_value) in &fields {
                    push_line(&mut out, &normalize_key(field, config.key_separator()), field_value);
                }
            }
            None => push_line(&mut out, &variable_name(&token), value),
        }
    }
    out
}

fn as_object(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn push_line(out: &mut String, key: &str, value: &Value) {
    let text = value_text(value).replace('\'', r"'\''");
    out.push_str(&format!("export {key}='{text}'\n"));
}
