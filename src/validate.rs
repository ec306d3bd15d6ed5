//! Column validators.
//!
//! A column carries an ordered list of [`Validator`]s. Every present,
//! non-null, non-empty value is checked on insert and update; the first
//! failing validator aborts the write with its interpolated message.

use crate::schema::Table;
use async_trait::async_trait;
use basemodel_core::{BaseModelError, Result, Row, Value};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

/// Asynchronous predicate, for checks that need I/O.
#[async_trait]
pub trait AsyncCheck: Send + Sync {
    async fn check(&self, value: &Value) -> bool;
}

/// Built-in rules, referenced by name from metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum NamedRule {
    #[serde(rename = "isEmail")]
    IsEmail,
    #[serde(rename = "isURL")]
    IsUrl,
    #[serde(rename = "isInt")]
    IsInt,
    #[serde(rename = "isFloat")]
    IsFloat,
    #[serde(rename = "isNumeric")]
    IsNumeric,
    #[serde(rename = "isAlpha")]
    IsAlpha,
    #[serde(rename = "isAlphanumeric")]
    IsAlphanumeric,
    #[serde(rename = "isLowercase")]
    IsLowercase,
    #[serde(rename = "isUppercase")]
    IsUppercase,
    #[serde(rename = "isUUID")]
    IsUuid,
    #[serde(rename = "isBoolean")]
    IsBoolean,
    #[serde(rename = "isJSON")]
    IsJson,
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern")
});
static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(https?|ftp)://[^\s/$.?#][^\s]*$|^[\w-]+(\.[\w-]+)+(/[^\s]*)?$")
        .expect("url pattern")
});
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid pattern")
});

impl NamedRule {
    /// Named rules test the value's text form.
    pub fn check(self, text: &str) -> bool {
        match self {
            NamedRule::IsEmail => EMAIL.is_match(text),
            NamedRule::IsUrl => URL.is_match(text),
            NamedRule::IsInt => {
                let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            }
            NamedRule::IsFloat => text.parse::<f64>().is_ok_and(f64::is_finite),
            NamedRule::IsNumeric => {
                let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
                let mut parts = digits.splitn(2, '.');
                let int = parts.next().unwrap_or_default();
                let frac = parts.next();
                let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
                match frac {
                    None => !int.is_empty() && all_digits(int),
                    Some(frac) => {
                        !(int.is_empty() && frac.is_empty()) && all_digits(int) && all_digits(frac)
                    }
                }
            }
            NamedRule::IsAlpha => text.chars().all(char::is_alphabetic),
            NamedRule::IsAlphanumeric => text.chars().all(char::is_alphanumeric),
            NamedRule::IsLowercase => text == text.to_lowercase(),
            NamedRule::IsUppercase => text == text.to_uppercase(),
            NamedRule::IsUuid => UUID.is_match(text),
            NamedRule::IsBoolean => matches!(text, "true" | "false" | "1" | "0"),
            NamedRule::IsJson => serde_json::from_str::<serde_json::Value>(text)
                .is_ok_and(|v| v.is_object() || v.is_array()),
        }
    }
}

#[derive(Clone)]
pub enum Check {
    Named(NamedRule),
    Sync(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
    Async(Arc<dyn AsyncCheck>),
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Check::Named(rule) => f.debug_tuple("Named").field(rule).finish(),
            Check::Sync(_) => f.write_str("Sync(..)"),
            Check::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// A check plus the message template reported when it fails.
///
/// `{VALUE}` is replaced by the rejected value; `{cn}` and `{columnName}` by
/// the column alias.
#[derive(Debug, Clone)]
pub struct Validator {
    pub check: Check,
    pub message: String,
}

impl Validator {
    pub fn named(rule: NamedRule, message: impl Into<String>) -> Self {
        Self {
            check: Check::Named(rule),
            message: message.into(),
        }
    }

    pub fn sync<F>(check: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            check: Check::Sync(Arc::new(check)),
            message: message.into(),
        }
    }

    pub fn with_async(check: Arc<dyn AsyncCheck>, message: impl Into<String>) -> Self {
        Self {
            check: Check::Async(check),
            message: message.into(),
        }
    }

    async fn passes(&self, value: &Value) -> bool {
        match &self.check {
            Check::Named(rule) => rule.check(&value.to_string()),
            Check::Sync(check) => check(value),
            Check::Async(check) => check.check(value).await,
        }
    }

    fn render(&self, value: &Value, alias: &str) -> String {
        self.message
            .replace("{VALUE}", &value.to_string())
            .replace("{cn}", alias)
            .replace("{columnName}", alias)
    }
}

impl<'de> Deserialize<'de> for Validator {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Named {
            #[serde(alias = "func")]
            rule: NamedRule,
            #[serde(alias = "msg")]
            message: String,
        }
        let named = Named::deserialize(deserializer)?;
        Ok(Validator::named(named.rule, named.message))
    }
}

/// Runs every column's validators over a physical row.
pub async fn validate_row(table: &Table, row: &Row) -> Result<()> {
    for column in table.columns() {
        let Some(value) = row.get(&column.name) else {
            continue;
        };
        if value.is_blank() {
            continue;
        }
        for validator in &column.validators {
            if !validator.passes(value).await {
                return Err(BaseModelError::Validation {
                    column: column.alias.clone(),
                    message: validator.render(value, &column.alias),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_rules() {
        assert!(NamedRule::IsEmail.check("a@b.co"));
        assert!(!NamedRule::IsEmail.check("a@b"));
        assert!(NamedRule::IsUrl.check("https://nocodb.com/x?y=1"));
        assert!(NamedRule::IsInt.check("-12"));
        assert!(!NamedRule::IsInt.check("1.5"));
        assert!(NamedRule::IsNumeric.check("1.5"));
        assert!(!NamedRule::IsNumeric.check("."));
        assert!(NamedRule::IsUuid.check("6F9619FF-8B86-D011-B42D-00CF4FC964FF"));
        assert!(NamedRule::IsJson.check(r#"{"a":1}"#));
        assert!(!NamedRule::IsJson.check("3"));
    }

    #[test]
    fn deserializes_named_rules() {
        let validator: Validator =
            serde_json::from_str(r#"{"func": "isEmail", "msg": "{VALUE} is not an email"}"#)
                .unwrap();
        assert!(matches!(validator.check, Check::Named(NamedRule::IsEmail)));
        assert_eq!(validator.render(&Value::from("x"), "Email"), "x is not an email");
    }
}
