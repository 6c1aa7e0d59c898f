//! Reversible email redaction

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use super::store::{check_slot, RedactionStore};
use super::token::{self, DIGEST_LENGTHS, TOKEN_PREFIX};
use crate::content::Content;
use crate::error::RedactionError;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email pattern")
});

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("{}[0-9a-f]{{8,}}", TOKEN_PREFIX)).expect("valid token pattern")
});

/// Replaces email addresses with salted hash tokens and back.
///
/// Each codec writes into its `RedactionStore`. All tokens produced by one
/// `redact` call are committed together under a single lock, so a failed
/// call leaves the store untouched.
#[derive(Debug, Clone)]
pub struct RedactionCodec {
    store: RedactionStore,
    salt: String,
}

impl RedactionCodec {
    pub fn new(store: RedactionStore, salt: impl Into<String>) -> Self {
        Self {
            store,
            salt: salt.into(),
        }
    }

    pub fn store(&self) -> &RedactionStore {
        &self.store
    }

    /// The default (shortest) token for `email`, ignoring the store
    pub fn token_for(&self, email: &str) -> String {
        token::derive(&self.salt, email, DIGEST_LENGTHS[0])
    }

    /// Email addresses in `text`, in order of appearance.
    ///
    /// An address whose local part is already a token (`EMAIL_<hex>@host`) is
    /// what redacting `a@b.com@host` leaves behind, so it is skipped.
    pub fn find_emails(text: &str) -> Vec<&str> {
        EMAIL_PATTERN
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|email| !is_redacted_local_part(email))
            .collect()
    }

    pub fn redact_text(&self, text: &str) -> Result<String, RedactionError> {
        let assigned = self.assign_tokens(Self::find_emails(text))?;
        Ok(replace_emails(text, &assigned))
    }

    /// Redact every text leaf of `content`, keeping its shape
    pub fn redact(&self, content: &Content) -> Result<Content, RedactionError> {
        let mut emails = Vec::new();
        content.for_each_text(&mut |text| {
            emails.extend(Self::find_emails(text).into_iter().map(str::to_string));
        });
        let assigned = self.assign_tokens(emails.iter().map(String::as_str))?;
        Ok(content.map_text(&mut |text| replace_emails(text, &assigned)))
    }

    pub fn redact_value(&self, value: &Value) -> Result<Value, RedactionError> {
        self.redact(&Content::from(value.clone())).map(Value::from)
    }

    /// Replace known tokens with their email. Unknown tokens are left as is.
    pub fn reconstruct_text(&self, text: &str) -> String {
        if !text.contains(TOKEN_PREFIX) {
            return text.to_string();
        }
        self.store
            .with_entries(|entries| replace_tokens(text, entries))
    }

    pub fn reconstruct(&self, content: &Content) -> Content {
        self.store
            .with_entries(|entries| content.map_text(&mut |text| replace_tokens(text, entries)))
    }

    pub fn reconstruct_value(&self, value: &Value) -> Value {
        Value::from(self.reconstruct(&Content::from(value.clone())))
    }

    /// Resolve a token for every distinct email and commit them in one step.
    ///
    /// When the default token is already bound to another address, longer
    /// digest prefixes are tried in turn.
    fn assign_tokens<'a>(
        &self,
        emails: impl IntoIterator<Item = &'a str>,
    ) -> Result<HashMap<String, String>, RedactionError> {
        let mut assigned: HashMap<String, String> = HashMap::new();
        let emails: Vec<&str> = emails.into_iter().collect();
        if emails.is_empty() {
            return Ok(assigned);
        }

        self.store.with_entries(|entries| {
            let mut staged: HashMap<String, String> = HashMap::new();

            for email in emails {
                if assigned.contains_key(email) {
                    continue;
                }

                let mut outcome = Ok(String::new());
                for len in DIGEST_LENGTHS {
                    let candidate = token::derive(&self.salt, email, len);
                    outcome = check_slot(entries, &candidate, email)
                        .and_then(|_| check_slot(&staged, &candidate, email))
                        .map(|_| candidate);
                    if outcome.is_ok() {
                        break;
                    }
                    tracing::warn!(digest_len = len, "Redaction token collision");
                }

                let token = outcome?;
                staged.insert(token.clone(), email.to_string());
                assigned.insert(email.to_string(), token);
            }

            entries.extend(staged);
            Ok(assigned)
        })
    }
}

fn is_redacted_local_part(email: &str) -> bool {
    email
        .split_once('@')
        .is_some_and(|(local, _)| token::looks_like_token(local))
}

fn replace_emails(text: &str, assigned: &HashMap<String, String>) -> String {
    EMAIL_PATTERN
        .replace_all(text, |caps: &Captures| {
            assigned
                .get(&caps[0])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Replace each token-shaped run with the longest known token it starts with
fn replace_tokens(text: &str, entries: &HashMap<String, String>) -> String {
    TOKEN_PATTERN
        .replace_all(text, |caps: &Captures| {
            let run = &caps[0];
            let hex_len = run.len() - TOKEN_PREFIX.len();
            DIGEST_LENGTHS
                .iter()
                .rev()
                .filter(|len| **len <= hex_len)
                .find_map(|len| {
                    let (token, rest) = run.split_at(TOKEN_PREFIX.len() + len);
                    entries.get(token).map(|email| format!("{}{}", email, rest))
                })
                .unwrap_or_else(|| run.to_string())
        })
        .into_owned()
}
