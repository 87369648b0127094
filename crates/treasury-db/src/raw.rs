//! Raw SQL passthrough. Statements use positional `$1..$n` placeholders bound
//! from [`RawValue`]s; queries come back as one JSON object per row.

use crate::{
    delegate::Target,
    transaction::Transaction,
    Error, Store,
};
use diesel::{
    pg::Pg,
    query_builder::{BoxedSqlQuery, SqlQuery},
    sql_types::{Array, BigInt, Bool, Double, Integer, Jsonb, Nullable, Text, Timestamptz},
    QueryableByName,
};

/// A positional bind parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    /// Bound as a `NULL` of type `text`; cast in the statement when another
    /// type is needed.
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Text(String),
    Timestamp(jiff::Timestamp),
    TextArray(Vec<String>),
    Json(serde_json::Value),
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::BigInt(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<jiff::Timestamp> for RawValue {
    fn from(value: jiff::Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<String>> for RawValue {
    fn from(value: Vec<String>) -> Self {
        Self::TextArray(value)
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Jsonb)]
    record_json: serde_json::Value,
}

fn bind_all(sql: String, binds: Vec<RawValue>) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
    binds
        .into_iter()
        .fold(diesel::sql_query(sql).into_boxed(), |query, value| match value {
            RawValue::Null => query.bind::<Nullable<Text>, _>(None::<String>),
            RawValue::Bool(v) => query.bind::<Bool, _>(v),
            RawValue::Int(v) => query.bind::<Integer, _>(v),
            RawValue::BigInt(v) => query.bind::<BigInt, _>(v),
            RawValue::Float(v) => query.bind::<Double, _>(v),
            RawValue::Text(v) => query.bind::<Text, _>(v),
            RawValue::Timestamp(v) => query.bind::<Timestamptz, _>(jiff_diesel::Timestamp::from(v)),
            RawValue::TextArray(v) => query.bind::<Array<Text>, _>(v),
            RawValue::Json(v) => query.bind::<Jsonb, _>(v),
        })
}

/// Wraps a row-returning statement so each row arrives as one `jsonb`
/// column, whatever its shape. A CTE accepts data-modifying statements with
/// `RETURNING` as well as queries.
fn as_json_rows(sql: &str) -> String {
    let statement = sql.trim().trim_end_matches(';').trim_end();
    format!("WITH q AS ({statement}) SELECT row_to_json(q)::jsonb AS record_json FROM q")
}

async fn execute(target: Target<'_>, sql: String, binds: Vec<RawValue>) -> Result<usize, Error> {
    let (mut conn, log) = target.connect().await?;
    execute!(log, bind_all(sql, binds), execute(&mut *conn))
        .map_err(|err| log.failed(Error::query(err, None)))
}

async fn query(
    target: Target<'_>,
    sql: String,
    binds: Vec<RawValue>,
) -> Result<Vec<serde_json::Value>, Error> {
    let (mut conn, log) = target.connect().await?;
    let rows: Vec<JsonRow> = execute!(log, bind_all(as_json_rows(&sql), binds), load(&mut *conn))
        .map_err(|err| log.failed(Error::query(err, None)))?;
    Ok(rows.into_iter().map(|row| row.record_json).collect())
}

impl Store {
    /// Runs a statement known at compile time and returns the affected row
    /// count.
    #[tracing::instrument(skip_all)]
    pub async fn execute_raw(&self, sql: &'static str, binds: Vec<RawValue>) -> Result<usize, Error> {
        execute(Target::Store(self), sql.to_owned(), binds).await
    }

    /// As [`Store::execute_raw`] for statements assembled at run time. Never
    /// splice untrusted input into `sql`; bind it instead.
    #[tracing::instrument(skip_all)]
    pub async fn execute_raw_unsafe(&self, sql: impl Into<String>, binds: Vec<RawValue>) -> Result<usize, Error> {
        execute(Target::Store(self), sql.into(), binds).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn query_raw(
        &self,
        sql: &'static str,
        binds: Vec<RawValue>,
    ) -> Result<Vec<serde_json::Value>, Error> {
        query(Target::Store(self), sql.to_owned(), binds).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn query_raw_unsafe(
        &self,
        sql: impl Into<String>,
        binds: Vec<RawValue>,
    ) -> Result<Vec<serde_json::Value>, Error> {
        query(Target::Store(self), sql.into(), binds).await
    }
}

impl Transaction<'_> {
    fn target(&mut self) -> Target<'_> {
        Target::Transaction {
            conn: &mut *self.conn,
            log: &self.log,
            settings_changed: &self.settings_changed,
        }
    }

    pub async fn execute_raw(&mut self, sql: &'static str, binds: Vec<RawValue>) -> Result<usize, Error> {
        execute(self.target(), sql.to_owned(), binds).await
    }

    pub async fn execute_raw_unsafe(
        &mut self,
        sql: impl Into<String>,
        binds: Vec<RawValue>,
    ) -> Result<usize, Error> {
        execute(self.target(), sql.into(), binds).await
    }

    pub async fn query_raw(
        &mut self,
        sql: &'static str,
        binds: Vec<RawValue>,
    ) -> Result<Vec<serde_json::Value>, Error> {
        query(self.target(), sql.to_owned(), binds).await
    }

    pub async fn query_raw_unsafe(
        &mut self,
        sql: impl Into<String>,
        binds: Vec<RawValue>,
    ) -> Result<Vec<serde_json::Value>, Error> {
        query(self.target(), sql.into(), binds).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_are_wrapped_into_json_rows() {
        assert_eq!(
            as_json_rows("  SELECT id, email FROM treasury.users WHERE id = $1;\n"),
            "WITH q AS (SELECT id, email FROM treasury.users WHERE id = $1) \
             SELECT row_to_json(q)::jsonb AS record_json FROM q"
        );
        assert_eq!(
            as_json_rows("DELETE FROM treasury.tokens WHERE blacklisted RETURNING id"),
            "WITH q AS (DELETE FROM treasury.tokens WHERE blacklisted RETURNING id) \
             SELECT row_to_json(q)::jsonb AS record_json FROM q"
        );
    }

    #[test]
    fn binds_render_in_position_order() {
        let query = bind_all(
            "UPDATE treasury.reports SET status = $1 WHERE id = $2 AND file_size > $3".into(),
            vec!["ARCHIVED".into(), "report-1".into(), RawValue::Int(10)],
        );
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        let archived = sql.find("ARCHIVED").expect("first bind rendered");
        let report = sql.find("report-1").expect("second bind rendered");
        assert!(archived < report, "{sql}");
        assert!(sql.contains("10"), "{sql}");
    }

    #[test]
    fn absent_options_bind_as_null() {
        assert_eq!(RawValue::from(None::<i32>), RawValue::Null);
        assert_eq!(RawValue::from(Some("x")), RawValue::Text("x".into()));
    }
}
