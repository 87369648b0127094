//! Per-column filter inputs. Each entity's `...Where` struct holds one of these
//! per column; they deserialize from the usual camelCase JSON filter shapes,
//! e.g. `{"email": {"endsWith": "@bank.test", "mode": "insensitive"}}`.

use serde::{de::DeserializeOwned, de::Error as _, Deserialize, Deserializer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Default,
    Insensitive,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StringFilter {
    pub equals: Option<String>,
    pub not: Option<String>,
    #[serde(rename = "in")]
    pub in_: Option<Vec<String>>,
    pub not_in: Option<Vec<String>>,
    pub lt: Option<String>,
    pub lte: Option<String>,
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub contains: Option<String>,
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
    #[serde(default)]
    pub mode: QueryMode,
}

impl StringFilter {
    pub fn insensitive(mut self) -> Self {
        self.mode = QueryMode::Insensitive;
        self
    }
}

impl From<&str> for StringFilter {
    fn from(value: &str) -> Self {
        Self {
            equals: Some(value.to_owned()),
            ..Default::default()
        }
    }
}

impl From<String> for StringFilter {
    fn from(value: String) -> Self {
        Self {
            equals: Some(value),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IntFilter {
    pub equals: Option<i32>,
    pub not: Option<i32>,
    #[serde(rename = "in")]
    pub in_: Option<Vec<i32>>,
    pub not_in: Option<Vec<i32>>,
    pub lt: Option<i32>,
    pub lte: Option<i32>,
    pub gt: Option<i32>,
    pub gte: Option<i32>,
}

impl From<i32> for IntFilter {
    fn from(value: i32) -> Self {
        Self {
            equals: Some(value),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DateTimeFilter {
    pub equals: Option<jiff::Timestamp>,
    pub not: Option<jiff::Timestamp>,
    #[serde(rename = "in")]
    pub in_: Option<Vec<jiff::Timestamp>>,
    pub not_in: Option<Vec<jiff::Timestamp>>,
    pub lt: Option<jiff::Timestamp>,
    pub lte: Option<jiff::Timestamp>,
    pub gt: Option<jiff::Timestamp>,
    pub gte: Option<jiff::Timestamp>,
}

impl DateTimeFilter {
    pub fn before(at: jiff::Timestamp) -> Self {
        Self {
            lt: Some(at),
            ..Default::default()
        }
    }

    pub fn after(at: jiff::Timestamp) -> Self {
        Self {
            gt: Some(at),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoolFilter {
    pub equals: Option<bool>,
    pub not: Option<bool>,
}

impl From<bool> for BoolFilter {
    fn from(value: bool) -> Self {
        Self {
            equals: Some(value),
            not: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnumFilter<T> {
    pub equals: Option<T>,
    pub not: Option<T>,
    #[serde(rename = "in")]
    pub in_: Option<Vec<T>>,
    pub not_in: Option<Vec<T>>,
}

impl<T> Default for EnumFilter<T> {
    fn default() -> Self {
        Self {
            equals: None,
            not: None,
            in_: None,
            not_in: None,
        }
    }
}

impl<T> EnumFilter<T> {
    pub fn equals(value: T) -> Self {
        Self {
            equals: Some(value),
            ..Default::default()
        }
    }
}

pub type RoleFilter = EnumFilter<crate::models::Role>;
pub type TokenTypeFilter = EnumFilter<crate::models::TokenType>;

/// Filters over `TEXT[]` columns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StringListFilter {
    pub has: Option<String>,
    pub has_every: Option<Vec<String>>,
    pub has_some: Option<Vec<String>>,
    pub is_empty: Option<bool>,
    pub equals: Option<Vec<String>>,
}

/// Filters over `JSONB` columns. The document shape is never inspected beyond
/// containment and top level keys.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JsonFilter {
    pub equals: Option<serde_json::Value>,
    pub not: Option<serde_json::Value>,
    pub contains: Option<serde_json::Value>,
    pub has_key: Option<String>,
}

/// Wraps the filter of an optional column, adding `isNull`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Nullable<F> {
    pub filter: F,
    pub is_null: Option<bool>,
}

/// Takes `isNull` out of the object and hands the remaining operators to
/// `F`, so unknown operators are still rejected by the inner filter.
impl<'de, F: DeserializeOwned> Deserialize<'de> for Nullable<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut operators: serde_json::Map<String, serde_json::Value> =
            Deserialize::deserialize(deserializer)?;
        let is_null = match operators.remove("isNull") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Bool(is_null)) => Some(is_null),
            Some(other) => {
                return Err(D::Error::custom(format!("isNull must be a boolean, found {other}")))
            }
        };
        let filter = F::deserialize(serde_json::Value::Object(operators)).map_err(D::Error::custom)?;
        Ok(Self { filter, is_null })
    }
}

impl<F: Default> Nullable<F> {
    pub fn is_null(is_null: bool) -> Self {
        Self {
            filter: F::default(),
            is_null: Some(is_null),
        }
    }
}

impl<F> From<F> for Nullable<F> {
    fn from(filter: F) -> Self {
        Self {
            filter,
            is_null: None,
        }
    }
}

/// Escapes the `LIKE` wildcards of a literal fragment.
pub(crate) fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub(crate) fn contains_pattern(fragment: &str) -> String {
    format!("%{}%", escape_like(fragment))
}

pub(crate) fn prefix_pattern(fragment: &str) -> String {
    format!("{}%", escape_like(fragment))
}

pub(crate) fn suffix_pattern(fragment: &str) -> String {
    format!("%{}", escape_like(fragment))
}

/// Accepts either a single nested filter or a list of them.
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(
        Option::<OneOrMany<T>>::deserialize(deserializer)?.map(|v| match v {
            OneOrMany::Many(many) => many,
            OneOrMany::One(one) => vec![one],
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_off\\"), "100\\%\\_off\\\\");
        assert_eq!(contains_pattern("a_b"), "%a\\_b%");
        assert_eq!(prefix_pattern("ab"), "ab%");
        assert_eq!(suffix_pattern("ab"), "%ab");
    }

    #[test]
    fn string_filters_read_camel_case_operators() {
        let filter: StringFilter = serde_json::from_value(serde_json::json!({
            "in": ["a", "b"],
            "notIn": ["c"],
            "startsWith": "x",
            "mode": "insensitive"
        }))
        .expect("valid filter");
        assert_eq!(filter.in_, Some(vec!["a".to_owned(), "b".to_owned()]));
        assert_eq!(filter.not_in, Some(vec!["c".to_owned()]));
        assert_eq!(filter.starts_with.as_deref(), Some("x"));
        assert_eq!(filter.mode, QueryMode::Insensitive);
    }

    #[test]
    fn nullable_filters_flatten_the_inner_filter() {
        let filter: Nullable<StringFilter> = serde_json::from_value(serde_json::json!({
            "isNull": false,
            "contains": "ops"
        }))
        .expect("valid filter");
        assert_eq!(filter.is_null, Some(false));
        assert_eq!(filter.filter.contains.as_deref(), Some("ops"));
    }

    #[test]
    fn enum_filters_use_database_spelling() {
        let filter: TokenTypeFilter = serde_json::from_value(serde_json::json!({
            "in": ["RESET_PASSWORD", "VERIFY_EMAIL"]
        }))
        .expect("valid filter");
        assert_eq!(
            filter.in_,
            Some(vec![
                crate::models::TokenType::ResetPassword,
                crate::models::TokenType::VerifyEmail
            ])
        );
    }

    #[test]
    fn misspelled_operators_are_rejected() {
        let typo = serde_json::json!({ "equal": "nobody@nowhere" });
        assert!(serde_json::from_value::<StringFilter>(typo.clone()).is_err());
        assert!(serde_json::from_value::<Nullable<StringFilter>>(typo).is_err());
        assert!(serde_json::from_value::<IntFilter>(serde_json::json!({ "gte": 1, "le": 4 })).is_err());
        assert!(serde_json::from_value::<BoolFilter>(serde_json::json!({ "is": true })).is_err());
        assert!(serde_json::from_value::<RoleFilter>(serde_json::json!({ "notin": ["ADMIN"] })).is_err());
        assert!(serde_json::from_value::<JsonFilter>(serde_json::json!({ "haskey": "a" })).is_err());
        assert!(serde_json::from_value::<Nullable<DateTimeFilter>>(serde_json::json!({ "isNull": "yes" })).is_err());
    }

    #[test]
    fn is_null_alone_leaves_the_inner_filter_empty() {
        let filter: Nullable<DateTimeFilter> =
            serde_json::from_value(serde_json::json!({ "isNull": true })).expect("valid filter");
        assert_eq!(filter, Nullable::is_null(true));
    }
}
