use crate::{
    value::{Record, ScalarValue},
    Error,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrderBy<F> {
    pub field: F,
    #[serde(default)]
    pub direction: SortOrder,
}

impl<F> OrderBy<F> {
    pub fn asc(field: F) -> Self {
        Self {
            field,
            direction: SortOrder::Asc,
        }
    }

    pub fn desc(field: F) -> Self {
        Self {
            field,
            direction: SortOrder::Desc,
        }
    }

    pub fn reverse(self) -> Self {
        Self {
            field: self.field,
            direction: self.direction.reverse(),
        }
    }
}

/// Arguments of `find_many` / `find_first`.
#[derive(Clone, Debug, Deserialize)]
#[serde(
    rename_all = "camelCase",
    deny_unknown_fields,
    bound(deserialize = "W: Deserialize<'de> + Default, U: Deserialize<'de>, F: Deserialize<'de>")
)]
pub struct FindMany<W, U, F> {
    #[serde(rename = "where", default)]
    pub filter: W,
    #[serde(default)]
    pub order_by: Vec<OrderBy<F>>,
    #[serde(default)]
    pub cursor: Option<U>,
    #[serde(default)]
    pub skip: Option<i64>,
    /// Negative values page backwards from the end (or from the cursor).
    #[serde(default)]
    pub take: Option<i64>,
    #[serde(default)]
    pub distinct: Vec<F>,
}

impl<W: Default, U, F> Default for FindMany<W, U, F> {
    fn default() -> Self {
        Self::new(W::default())
    }
}

impl<W, U, F> FindMany<W, U, F> {
    pub fn new(filter: W) -> Self {
        Self {
            filter,
            order_by: Vec::new(),
            cursor: None,
            skip: None,
            take: None,
            distinct: Vec::new(),
        }
    }

    pub fn order_by(mut self, order: OrderBy<F>) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn cursor(mut self, cursor: U) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn distinct(mut self, field: F) -> Self {
        self.distinct.push(field);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        match self.skip {
            Some(skip) if skip < 0 => Err(Error::validation(format!(
                "skip must not be negative, got {skip}"
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn backwards(&self) -> bool {
        self.take.is_some_and(|take| take < 0)
    }
}

/// Applies `skip`/`take` to already ordered rows. A negative `take` keeps the
/// rows at the end, `skip` then counts from the end as well.
pub(crate) fn paginate<T>(mut rows: Vec<T>, skip: Option<i64>, take: Option<i64>) -> Vec<T> {
    let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(0);
    match take {
        Some(take) if take < 0 => {
            let take = usize::try_from(take.unsigned_abs()).unwrap_or(usize::MAX);
            let end = rows.len().saturating_sub(skip);
            rows.truncate(end);
            let start = end.saturating_sub(take);
            rows.drain(..start);
            rows
        }
        take => {
            let take = take
                .and_then(|take| usize::try_from(take).ok())
                .unwrap_or(usize::MAX);
            rows.into_iter().skip(skip).take(take).collect()
        }
    }
}

/// Keeps the first row of each distinct combination of `fields`.
pub(crate) fn distinct_by<R: Record>(rows: Vec<R>, fields: &[R::Field]) -> Vec<R> {
    let mut seen = BTreeSet::new();
    rows.into_iter()
        .filter(|row| {
            let key: Vec<ScalarValue> = fields.iter().map(|field| row.value(*field)).collect();
            seen.insert(key)
        })
        .collect()
}
