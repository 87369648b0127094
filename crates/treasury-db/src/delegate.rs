//! Machinery shared by the per-entity delegates: where a delegate runs
//! (pool or open transaction), query execution with logging, and the
//! `delegate!` macro that stamps out filter, ordering, cursor and CRUD code
//! for one table.

use crate::{logger::Logger, Error, Store};
use diesel::{
    expression::{
        is_aggregate, AppearsOnTable, BoxableExpression, Expression, SelectableExpression,
        ValidGrouping,
    },
    pg::Pg,
    query_builder::{AstPass, QueryFragment, QueryId},
    sql_types::Bool,
    QueryResult,
};
use diesel_async::{pooled_connection::AsyncDieselConnectionManager, AsyncPgConnection};
use std::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
};

/// A type-erased predicate over table `T`, usable in plain and boxed
/// statements alike.
pub(crate) struct Condition<T>(Box<dyn BoxableExpression<T, Pg, SqlType = Bool> + Send>);

pub(crate) fn boxed<T, E>(expr: E) -> Condition<T>
where
    E: BoxableExpression<T, Pg, SqlType = Bool> + Send + 'static,
{
    Condition(Box::new(expr))
}

impl<T> Expression for Condition<T> {
    type SqlType = Bool;
}

impl<T> AppearsOnTable<T> for Condition<T> {}

impl<T> SelectableExpression<T> for Condition<T> {}

impl<T> ValidGrouping<()> for Condition<T> {
    type IsAggregate = is_aggregate::No;
}

impl<T> QueryId for Condition<T> {
    type QueryId = ();

    const HAS_STATIC_QUERY_ID: bool = false;
}

impl<T> QueryFragment<Pg> for Condition<T> {
    fn walk_ast<'b>(&'b self, pass: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        self.0.walk_ast(pass)
    }
}

/// Comparison used when turning a cursor row into a keyset predicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cmp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// What a delegate runs against.
pub(crate) enum Target<'a> {
    Store(&'a Store),
    Transaction {
        conn: &'a mut AsyncPgConnection,
        log: &'a Logger,
        settings_changed: &'a AtomicBool,
    },
}

pub(crate) enum Conn<'a> {
    Pooled(mobc::Connection<AsyncDieselConnectionManager<AsyncPgConnection>>),
    Borrowed(&'a mut AsyncPgConnection),
}

impl Deref for Conn<'_> {
    type Target = AsyncPgConnection;

    fn deref(&self) -> &AsyncPgConnection {
        match self {
            Self::Pooled(conn) => conn,
            Self::Borrowed(conn) => conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut AsyncPgConnection {
        match self {
            Self::Pooled(conn) => conn,
            Self::Borrowed(conn) => conn,
        }
    }
}

impl<'a> Target<'a> {
    pub(crate) async fn connect(self) -> Result<(Conn<'a>, &'a Logger), Error> {
        match self {
            Self::Store(store) => {
                let log: &'a Logger = &store.log;
                let conn = store.connection().await.map_err(|err| log.failed(err))?;
                Ok((Conn::Pooled(conn), log))
            }
            Self::Transaction { conn, log, .. } => Ok((Conn::Borrowed(conn), log)),
        }
    }

    pub(crate) fn store(&self) -> Option<&'a Store> {
        match self {
            Self::Store(store) => Some(store),
            Self::Transaction { .. } => None,
        }
    }

    /// Marks the enclosing transaction, if any, as having written settings.
    pub(crate) fn settings_written(&self) {
        if let Self::Transaction {
            settings_changed, ..
        } = self
        {
            settings_changed.store(true, Ordering::Release);
        }
    }
}

pub(crate) trait Classify<T> {
    fn classify(self, log: &Logger, model: &'static str) -> Result<T, Error>;
}

impl<T> Classify<T> for diesel::QueryResult<T> {
    fn classify(self, log: &Logger, model: &'static str) -> Result<T, Error> {
        self.map_err(|err| log.failed(Error::query(err, Some(model))))
    }
}

/// Runs `$method` of `diesel_async::RunQueryDsl` on `$query`, reporting the
/// rendered statement and its duration to the logger.
macro_rules! execute {
    ($log:expr, $query:expr, $method:ident($conn:expr)) => {{
        let query = $query;
        let sql = if $log.renders_queries() {
            Some(diesel::debug_query::<diesel::pg::Pg, _>(&query).to_string())
        } else {
            None
        };
        let started = std::time::Instant::now();
        let result = diesel_async::RunQueryDsl::$method(query, $conn).await;
        $log.query(sql, started.elapsed());
        result
    }};
}

macro_rules! filter_type {
    (int) => { $crate::filter::IntFilter };
    (text) => { $crate::filter::StringFilter };
    (bool) => { $crate::filter::BoolFilter };
    (time) => { $crate::filter::DateTimeFilter };
    (role) => { $crate::filter::RoleFilter };
    (token_type) => { $crate::filter::TokenTypeFilter };
    (list) => { $crate::filter::StringListFilter };
    (json) => { $crate::filter::JsonFilter };
    (opt_text) => { $crate::filter::Nullable<$crate::filter::StringFilter> };
    (opt_time) => { $crate::filter::Nullable<$crate::filter::DateTimeFilter> };
    (opt_json) => { $crate::filter::Nullable<$crate::filter::JsonFilter> };
}

macro_rules! field_kind {
    (int) => { $crate::value::FieldKind::Int };
    (text) => { $crate::value::FieldKind::Text };
    (bool) => { $crate::value::FieldKind::Bool };
    (time) => { $crate::value::FieldKind::Timestamp };
    (role) => { $crate::value::FieldKind::Enum };
    (token_type) => { $crate::value::FieldKind::Enum };
    (list) => { $crate::value::FieldKind::List };
    (json) => { $crate::value::FieldKind::Json };
    (opt_text) => { $crate::value::FieldKind::Text };
    (opt_time) => { $crate::value::FieldKind::Timestamp };
    (opt_json) => { $crate::value::FieldKind::Json };
}

macro_rules! comparisons {
    ($conds:ident, $f:expr, $col:expr, $conv:expr) => {{
        use $crate::delegate::boxed;
        let f = $f;
        let conv = $conv;
        if let Some(v) = &f.equals {
            $conds.push(boxed($col.eq(conv(v))));
        }
        if let Some(v) = &f.not {
            $conds.push(boxed($col.ne(conv(v))));
        }
        if let Some(vs) = &f.in_ {
            $conds.push(boxed($col.eq_any(vs.iter().map(conv).collect::<Vec<_>>())));
        }
        if let Some(vs) = &f.not_in {
            $conds.push(boxed($col.ne_all(vs.iter().map(conv).collect::<Vec<_>>())));
        }
        if let Some(v) = &f.lt {
            $conds.push(boxed($col.lt(conv(v))));
        }
        if let Some(v) = &f.lte {
            $conds.push(boxed($col.le(conv(v))));
        }
        if let Some(v) = &f.gt {
            $conds.push(boxed($col.gt(conv(v))));
        }
        if let Some(v) = &f.gte {
            $conds.push(boxed($col.ge(conv(v))));
        }
    }};
}

macro_rules! string_conditions {
    ($conds:ident, $f:expr, $col:expr) => {{
        use $crate::{
            delegate::boxed,
            filter::{contains_pattern, prefix_pattern, suffix_pattern, QueryMode},
            sql_functions::lower,
        };
        let f = $f;
        match f.mode {
            QueryMode::Default => {
                comparisons!($conds, f, $col, |v: &String| v.clone());
                if let Some(v) = &f.contains {
                    $conds.push(boxed($col.like(contains_pattern(v))));
                }
                if let Some(v) = &f.starts_with {
                    $conds.push(boxed($col.like(prefix_pattern(v))));
                }
                if let Some(v) = &f.ends_with {
                    $conds.push(boxed($col.like(suffix_pattern(v))));
                }
            }
            QueryMode::Insensitive => {
                comparisons!($conds, f, lower($col), |v: &String| v.to_lowercase());
                if let Some(v) = &f.contains {
                    $conds.push(boxed($col.ilike(contains_pattern(v))));
                }
                if let Some(v) = &f.starts_with {
                    $conds.push(boxed($col.ilike(prefix_pattern(v))));
                }
                if let Some(v) = &f.ends_with {
                    $conds.push(boxed($col.ilike(suffix_pattern(v))));
                }
            }
        }
    }};
}

macro_rules! enum_conditions {
    ($conds:ident, $f:expr, $col:expr) => {{
        use $crate::delegate::boxed;
        let f = $f;
        if let Some(v) = f.equals {
            $conds.push(boxed($col.eq(v)));
        }
        if let Some(v) = f.not {
            $conds.push(boxed($col.ne(v)));
        }
        if let Some(vs) = &f.in_ {
            $conds.push(boxed($col.eq_any(vs.clone())));
        }
        if let Some(vs) = &f.not_in {
            $conds.push(boxed($col.ne_all(vs.clone())));
        }
    }};
}

macro_rules! nullable_conditions {
    ($kind:ident, $conds:ident, $f:expr, $col:expr) => {{
        use $crate::delegate::boxed;
        let f = $f;
        match f.is_null {
            Some(true) => $conds.push(boxed($col.is_null())),
            Some(false) => $conds.push(boxed($col.is_not_null())),
            None => (),
        }
        conditions!($kind, $conds, &f.filter, $col.assume_not_null());
    }};
}

/// Pushes one predicate per operator set in filter `$f` over column `$col`.
macro_rules! conditions {
    (int, $conds:ident, $f:expr, $col:expr) => {
        comparisons!($conds, $f, $col, |v: &i32| *v)
    };
    (time, $conds:ident, $f:expr, $col:expr) => {
        comparisons!($conds, $f, $col, |v: &jiff::Timestamp| {
            jiff_diesel::Timestamp::from(*v)
        })
    };
    (text, $conds:ident, $f:expr, $col:expr) => {
        string_conditions!($conds, $f, $col)
    };
    (bool, $conds:ident, $f:expr, $col:expr) => {{
        use $crate::delegate::boxed;
        let f = $f;
        if let Some(v) = f.equals {
            $conds.push(boxed($col.eq(v)));
        }
        if let Some(v) = f.not {
            $conds.push(boxed($col.ne(v)));
        }
    }};
    (role, $conds:ident, $f:expr, $col:expr) => {
        enum_conditions!($conds, $f, $col)
    };
    (token_type, $conds:ident, $f:expr, $col:expr) => {
        enum_conditions!($conds, $f, $col)
    };
    (list, $conds:ident, $f:expr, $col:expr) => {{
        use $crate::{delegate::boxed, sql_functions::cardinality};
        let f = $f;
        if let Some(v) = &f.has {
            $conds.push(boxed($col.contains(vec![v.clone()])));
        }
        if let Some(vs) = &f.has_every {
            $conds.push(boxed($col.contains(vs.clone())));
        }
        if let Some(vs) = &f.has_some {
            $conds.push(boxed($col.overlaps_with(vs.clone())));
        }
        match f.is_empty {
            Some(true) => $conds.push(boxed(cardinality($col).eq(0))),
            Some(false) => $conds.push(boxed(cardinality($col).gt(0))),
            None => (),
        }
        if let Some(vs) = &f.equals {
            $conds.push(boxed($col.eq(vs.clone())));
        }
    }};
    (json, $conds:ident, $f:expr, $col:expr) => {{
        use $crate::delegate::boxed;
        let f = $f;
        if let Some(v) = &f.equals {
            $conds.push(boxed($col.eq(v.clone())));
        }
        if let Some(v) = &f.not {
            $conds.push(boxed($col.ne(v.clone())));
        }
        if let Some(v) = &f.contains {
            $conds.push(boxed($col.contains(v.clone())));
        }
        if let Some(key) = &f.has_key {
            $conds.push(boxed($col.has_key(key.clone())));
        }
    }};
    (opt_text, $conds:ident, $f:expr, $col:expr) => {
        nullable_conditions!(text, $conds, $f, $col)
    };
    (opt_time, $conds:ident, $f:expr, $col:expr) => {
        nullable_conditions!(time, $conds, $f, $col)
    };
    (opt_json, $conds:ident, $f:expr, $col:expr) => {
        nullable_conditions!(json, $conds, $f, $col)
    };
}

macro_rules! sort {
    (list, $model:tt, $query:expr, $col:expr, $direction:expr, $name:tt) => {
        Err($crate::Error::validation(concat!($model, ".", $name, " is a list and cannot order rows")))
    };
    (json, $model:tt, $query:expr, $col:expr, $direction:expr, $name:tt) => {
        Err($crate::Error::validation(concat!($model, ".", $name, " is JSON and cannot order rows")))
    };
    (opt_json, $model:tt, $query:expr, $col:expr, $direction:expr, $name:tt) => {
        sort!(json, $model, $query, $col, $direction, $name)
    };
    ($kind:ident, $model:tt, $query:expr, $col:expr, $direction:expr, $name:tt) => {
        match $direction {
            $crate::query::SortOrder::Asc => Ok($query.then_order_by($col.asc())),
            $crate::query::SortOrder::Desc => Ok($query.then_order_by($col.desc())),
        }
    };
}

macro_rules! compare {
    ($col:expr, $cmp:expr, $value:expr) => {{
        use $crate::delegate::{boxed, Cmp};
        let value = $value;
        match $cmp {
            Cmp::Eq => boxed($col.eq(value)),
            Cmp::Gt => boxed($col.gt(value)),
            Cmp::Gte => boxed($col.ge(value)),
            Cmp::Lt => boxed($col.lt(value)),
            Cmp::Lte => boxed($col.le(value)),
        }
    }};
}

/// `compare!` for a nullable column. Postgres sorts NULL after every value
/// in ascending order (first in descending), so rows ascending past a
/// non-null anchor include the NULL ones.
macro_rules! compare_nullable {
    ($col:expr, $cmp:expr, $value:expr) => {{
        use $crate::delegate::{boxed, Cmp};
        let value = $value;
        match $cmp {
            Cmp::Eq => boxed($col.assume_not_null().eq(value)),
            Cmp::Gt => boxed($col.assume_not_null().gt(value).or($col.is_null())),
            Cmp::Gte => boxed($col.assume_not_null().ge(value).or($col.is_null())),
            Cmp::Lt => boxed($col.assume_not_null().lt(value)),
            Cmp::Lte => boxed($col.assume_not_null().le(value)),
        }
    }};
}

/// Compares column `$col` against the cursor row's `$value`.
macro_rules! seek {
    (time, $model:tt, $col:expr, $cmp:expr, $value:expr, $name:tt) => {
        Ok(compare!($col, $cmp, jiff_diesel::Timestamp::from($value)))
    };
    (list, $model:tt, $col:expr, $cmp:expr, $value:expr, $name:tt) => {
        Err($crate::Error::validation(concat!($model, ".", $name, " cannot be part of a cursor ordering")))
    };
    (json, $model:tt, $col:expr, $cmp:expr, $value:expr, $name:tt) => {
        seek!(list, $model, $col, $cmp, $value, $name)
    };
    (opt_json, $model:tt, $col:expr, $cmp:expr, $value:expr, $name:tt) => {
        seek!(list, $model, $col, $cmp, $value, $name)
    };
    (opt_text, $model:tt, $col:expr, $cmp:expr, $value:expr, $name:tt) => {
        match $value {
            Some(value) => Ok(compare_nullable!($col, $cmp, value)),
            None => Err($crate::Error::validation(concat!(
                "the cursor row has no ", $model, ".", $name, " to page from"
            ))),
        }
    };
    (opt_time, $model:tt, $col:expr, $cmp:expr, $value:expr, $name:tt) => {
        match $value {
            Some(value) => Ok(compare_nullable!($col, $cmp, jiff_diesel::Timestamp::from(value))),
            None => Err($crate::Error::validation(concat!(
                "the cursor row has no ", $model, ".", $name, " to page from"
            ))),
        }
    };
    ($kind:ident, $model:tt, $col:expr, $cmp:expr, $value:expr, $name:tt) => {
        Ok(compare!($col, $cmp, $value))
    };
}

/// Declares everything one entity needs: its field enumeration, `Where`,
/// `WhereUnique`, argument aliases, and the delegate with the full set of
/// CRUD, aggregate and group-by operations.
macro_rules! delegate {
    {
        model: $model:ident, $model_name:tt;
        table: $table:ident;
        primary: $pk_variant:ident($pk_ty:ty) => $pk:ident;
        names: $delegate:ident, $field:ident, $where:ident, $unique:ident, $create:ident, $update:ident;
        args: $find_many:ident, $aggregate:ident, $group_by:ident;
        accessor: $accessor:ident;
        unique { $($uvariant:ident($uty:ty) => $ucol:ident),+ $(,)? }
        fields { $($variant:ident $col:ident $name:tt $kind:ident),+ $(,)? }
    } => {
        #[doc = concat!("The columns of ", $model_name, ", named as on the wire.")]
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub enum $field {
            $(#[serde(rename = $name)] $variant),+
        }

        impl $crate::value::FieldSpec for $field {
            const MODEL: &'static str = $model_name;
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),+
                }
            }

            fn kind(self) -> $crate::value::FieldKind {
                match self {
                    $(Self::$variant => field_kind!($kind)),+
                }
            }
        }

        impl $crate::value::Record for $crate::models::$model {
            type Field = $field;

            fn value(&self, field: $field) -> $crate::value::ScalarValue {
                match field {
                    $($field::$variant => $crate::value::ScalarValue::from(self.$col.clone())),+
                }
            }
        }

        #[doc = concat!("Filter over ", $model_name, " rows. An empty filter matches every row.")]
        #[derive(Clone, Debug, Default, serde::Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct $where {
            $(
                #[serde(rename = $name)]
                pub $col: Option<filter_type!($kind)>,
            )+
            #[serde(rename = "AND", deserialize_with = "crate::filter::one_or_many")]
            pub and: Option<Vec<$where>>,
            #[serde(rename = "OR")]
            pub or: Option<Vec<$where>>,
            #[serde(rename = "NOT", deserialize_with = "crate::filter::one_or_many")]
            pub not: Option<Vec<$where>>,
        }

        impl $where {
            pub(crate) fn to_condition(
                &self,
            ) -> $crate::delegate::Condition<$crate::schema::treasury::$table::table> {
                use diesel::prelude::*;
                use $crate::schema::treasury::$table as t;
                let mut conds: Vec<$crate::delegate::Condition<t::table>> = Vec::new();
                $(
                    if let Some(f) = &self.$col {
                        conditions!($kind, conds, f, t::$col);
                    }
                )+
                if let Some(and) = &self.and {
                    conds.push(Self::all_of(and.iter().map(Self::to_condition).collect()));
                }
                if let Some(or) = &self.or {
                    conds.push(Self::any_of(or.iter().map(Self::to_condition).collect()));
                }
                if let Some(not) = &self.not {
                    for nested in not {
                        conds.push($crate::delegate::boxed(diesel::dsl::not(nested.to_condition())));
                    }
                }
                Self::all_of(conds)
            }

            pub(crate) fn all_of(
                conds: Vec<$crate::delegate::Condition<$crate::schema::treasury::$table::table>>,
            ) -> $crate::delegate::Condition<$crate::schema::treasury::$table::table> {
                use diesel::prelude::*;
                conds
                    .into_iter()
                    .reduce(|acc, cond| $crate::delegate::boxed(acc.and(cond)))
                    .unwrap_or_else(|| {
                        $crate::delegate::boxed(diesel::dsl::sql::<diesel::sql_types::Bool>("TRUE"))
                    })
            }

            pub(crate) fn any_of(
                conds: Vec<$crate::delegate::Condition<$crate::schema::treasury::$table::table>>,
            ) -> $crate::delegate::Condition<$crate::schema::treasury::$table::table> {
                use diesel::prelude::*;
                conds
                    .into_iter()
                    .reduce(|acc, cond| $crate::delegate::boxed(acc.or(cond)))
                    .unwrap_or_else(|| {
                        $crate::delegate::boxed(diesel::dsl::sql::<diesel::sql_types::Bool>("FALSE"))
                    })
            }
        }

        #[doc = concat!("Identifies exactly one ", $model_name, " row.")]
        #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub enum $unique {
            $($uvariant($uty)),+
        }

        impl $unique {
            pub(crate) fn to_condition(
                &self,
            ) -> $crate::delegate::Condition<$crate::schema::treasury::$table::table> {
                use diesel::prelude::*;
                use $crate::schema::treasury::$table as t;
                match self {
                    $(Self::$uvariant(v) => $crate::delegate::boxed(t::$ucol.eq(v.clone()))),+
                }
            }
        }

        impl $field {
            fn sort(
                self,
                query: $crate::schema::treasury::$table::BoxedQuery<'static, diesel::pg::Pg>,
                direction: $crate::query::SortOrder,
            ) -> Result<
                $crate::schema::treasury::$table::BoxedQuery<'static, diesel::pg::Pg>,
                $crate::Error,
            > {
                use diesel::prelude::*;
                use $crate::schema::treasury::$table as t;
                match self {
                    $(Self::$variant => sort!($kind, $model_name, query, t::$col, direction, $name)),+
                }
            }

            fn seek(
                self,
                cmp: $crate::delegate::Cmp,
                anchor: &$crate::models::$model,
            ) -> Result<$crate::delegate::Condition<$crate::schema::treasury::$table::table>, $crate::Error>
            {
                use diesel::prelude::*;
                use $crate::schema::treasury::$table as t;
                match self {
                    $(Self::$variant => seek!($kind, $model_name, t::$col, cmp, anchor.$col.clone(), $name)),+
                }
            }

            /// Rows at or after `anchor` in `order`, which must end in a
            /// unique column.
            fn keyset(
                order: &[$crate::query::OrderBy<Self>],
                anchor: &$crate::models::$model,
            ) -> Result<$crate::delegate::Condition<$crate::schema::treasury::$table::table>, $crate::Error>
            {
                use $crate::{delegate::Cmp, query::SortOrder};
                let mut branches = Vec::with_capacity(order.len());
                for (i, current) in order.iter().enumerate() {
                    let mut parts = Vec::with_capacity(i + 1);
                    for previous in &order[..i] {
                        parts.push(previous.field.seek(Cmp::Eq, anchor)?);
                    }
                    let last = i + 1 == order.len();
                    let cmp = match (current.direction, last) {
                        (SortOrder::Asc, false) => Cmp::Gt,
                        (SortOrder::Asc, true) => Cmp::Gte,
                        (SortOrder::Desc, false) => Cmp::Lt,
                        (SortOrder::Desc, true) => Cmp::Lte,
                    };
                    parts.push(current.field.seek(cmp, anchor)?);
                    branches.push($where::all_of(parts));
                }
                Ok($where::any_of(branches))
            }
        }

        pub type $find_many = $crate::query::FindMany<$where, $unique, $field>;
        pub type $aggregate = $crate::aggregate::Aggregate<$where, $unique, $field>;
        pub type $group_by = $crate::aggregate::GroupBy<$where, $field>;

        #[doc = concat!("CRUD operations over ", $model_name, " rows.")]
        pub struct $delegate<'a> {
            target: $crate::delegate::Target<'a>,
        }

        impl $crate::Store {
            pub fn $accessor(&self) -> $delegate<'_> {
                $delegate {
                    target: $crate::delegate::Target::Store(self),
                }
            }
        }

        impl<'r> $crate::transaction::Transaction<'r> {
            pub fn $accessor(&mut self) -> $delegate<'_> {
                $delegate {
                    target: $crate::delegate::Target::Transaction {
                        conn: &mut *self.conn,
                        log: &self.log,
                        settings_changed: &self.settings_changed,
                    },
                }
            }
        }

        impl<'a> $delegate<'a> {
            const MODEL: &'static str = $model_name;

            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn find_unique(
                self,
                filter: $unique,
            ) -> Result<Option<$crate::models::$model>, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{delegate::Classify, models::$model, schema::treasury::$table as t};
                let (mut conn, log) = self.target.connect().await?;
                let found: Option<$model> = execute!(
                    log,
                    t::table.filter(filter.to_condition()).select($model::as_select()),
                    first(&mut *conn)
                )
                .optional()
                .classify(log, Self::MODEL)?;
                Ok(found)
            }

            pub async fn find_unique_or_throw(
                self,
                filter: $unique,
            ) -> Result<$crate::models::$model, $crate::Error> {
                self.find_unique(filter)
                    .await?
                    .ok_or_else(|| $crate::Error::not_found(Self::MODEL))
            }

            pub async fn find_first(
                self,
                mut args: $find_many,
            ) -> Result<Option<$crate::models::$model>, $crate::Error> {
                args.take = Some(if args.backwards() { -1 } else { 1 });
                Ok(self.find_many(args).await?.into_iter().next())
            }

            pub async fn find_first_or_throw(
                self,
                args: $find_many,
            ) -> Result<$crate::models::$model, $crate::Error> {
                self.find_first(args)
                    .await?
                    .ok_or_else(|| $crate::Error::not_found(Self::MODEL))
            }

            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn find_many(
                self,
                args: $find_many,
            ) -> Result<Vec<$crate::models::$model>, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{
                    delegate::Classify,
                    models::$model,
                    query::{distinct_by, paginate, OrderBy},
                    schema::treasury::$table as t,
                };
                args.validate()?;
                let (mut conn, log) = self.target.connect().await?;
                let backwards = args.backwards();
                let mut order = args.order_by.clone();
                let anchor = match &args.cursor {
                    Some(cursor) => {
                        let anchor: Option<$model> = execute!(
                            log,
                            t::table.filter(cursor.to_condition()).select($model::as_select()),
                            first(&mut *conn)
                        )
                        .optional()
                        .classify(log, Self::MODEL)?;
                        let Some(anchor) = anchor else {
                            return Ok(Vec::new());
                        };
                        if !order.iter().any(|o| o.field == $field::$pk_variant) {
                            order.push(OrderBy::asc($field::$pk_variant));
                        }
                        Some(anchor)
                    }
                    None => None,
                };
                if backwards {
                    order = order.into_iter().map(OrderBy::reverse).collect();
                }

                let mut query: t::BoxedQuery<'static, diesel::pg::Pg> = t::table.into_boxed();
                query = query.filter(args.filter.to_condition());
                if let Some(anchor) = &anchor {
                    query = query.filter($field::keyset(&order, anchor)?);
                }
                for o in &order {
                    query = o.field.sort(query, o.direction)?;
                }

                if args.distinct.is_empty() {
                    if let Some(skip) = args.skip {
                        query = query.offset(skip);
                    }
                    if let Some(take) = args.take {
                        query = query.limit(take.checked_abs().unwrap_or(i64::MAX));
                    }
                    let mut rows: Vec<$model> =
                        execute!(log, query, load(&mut *conn)).classify(log, Self::MODEL)?;
                    if backwards {
                        rows.reverse();
                    }
                    Ok(rows)
                } else {
                    let mut rows: Vec<$model> =
                        execute!(log, query, load(&mut *conn)).classify(log, Self::MODEL)?;
                    if backwards {
                        rows.reverse();
                    }
                    let rows = distinct_by(rows, &args.distinct);
                    Ok(paginate(rows, args.skip, args.take))
                }
            }

            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn create(
                self,
                data: $crate::models::$create,
            ) -> Result<$crate::models::$model, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{
                    delegate::Classify,
                    models::{$model, CreateInput},
                    schema::treasury::$table as t,
                };
                let row = data.into_row(jiff::Timestamp::now());
                let (mut conn, log) = self.target.connect().await?;
                let created: $model = execute!(
                    log,
                    diesel::insert_into(t::table)
                        .values(row)
                        .returning($model::as_returning()),
                    get_result(&mut *conn)
                )
                .classify(log, Self::MODEL)?;
                Ok(created)
            }

            /// Inserts every row in one statement and returns how many were
            /// written. With `skip_duplicates` conflicting rows are dropped.
            #[tracing::instrument(skip_all, fields(model = $model_name, rows = data.len()))]
            pub async fn create_many(
                self,
                data: Vec<$crate::models::$create>,
                skip_duplicates: bool,
            ) -> Result<usize, $crate::Error> {
                use $crate::{delegate::Classify, models::CreateInput, schema::treasury::$table as t};
                if data.is_empty() {
                    return Ok(0);
                }
                let now = jiff::Timestamp::now();
                let total = data.len();
                let rows: Vec<_> = data.into_iter().map(|d| d.into_row(now)).collect();
                let (mut conn, log) = self.target.connect().await?;
                let inserted = if skip_duplicates {
                    execute!(
                        log,
                        diesel::insert_into(t::table).values(rows).on_conflict_do_nothing(),
                        execute(&mut *conn)
                    )
                } else {
                    execute!(log, diesel::insert_into(t::table).values(rows), execute(&mut *conn))
                };
                let inserted = inserted.classify(log, Self::MODEL)?;
                if inserted < total {
                    log.warn(format!(
                        "{}.create_many skipped {} conflicting rows",
                        Self::MODEL,
                        total - inserted
                    ));
                }
                Ok(inserted)
            }

            #[tracing::instrument(skip_all, fields(model = $model_name, rows = data.len()))]
            pub async fn create_many_and_return(
                self,
                data: Vec<$crate::models::$create>,
                skip_duplicates: bool,
            ) -> Result<Vec<$crate::models::$model>, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{
                    delegate::Classify,
                    models::{$model, CreateInput},
                    schema::treasury::$table as t,
                };
                if data.is_empty() {
                    return Ok(Vec::new());
                }
                let now = jiff::Timestamp::now();
                let total = data.len();
                let rows: Vec<_> = data.into_iter().map(|d| d.into_row(now)).collect();
                let (mut conn, log) = self.target.connect().await?;
                let created = if skip_duplicates {
                    execute!(
                        log,
                        diesel::insert_into(t::table)
                            .values(rows)
                            .on_conflict_do_nothing()
                            .returning($model::as_returning()),
                        get_results(&mut *conn)
                    )
                } else {
                    execute!(
                        log,
                        diesel::insert_into(t::table)
                            .values(rows)
                            .returning($model::as_returning()),
                        get_results(&mut *conn)
                    )
                };
                let created: Vec<$model> = created.classify(log, Self::MODEL)?;
                if created.len() < total {
                    log.warn(format!(
                        "{}.create_many_and_return skipped {} conflicting rows",
                        Self::MODEL,
                        total - created.len()
                    ));
                }
                Ok(created)
            }

            /// Updates the row identified by `filter`. An update with no
            /// field set writes nothing and returns the current row.
            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn update(
                self,
                filter: $unique,
                data: $crate::models::$update,
            ) -> Result<$crate::models::$model, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{
                    delegate::Classify,
                    models::{$model, UpdateInput},
                    schema::treasury::$table as t,
                };
                let (mut conn, log) = self.target.connect().await?;
                let row: Option<$model> = if data.is_empty() {
                    execute!(
                        log,
                        t::table.filter(filter.to_condition()).select($model::as_select()),
                        first(&mut *conn)
                    )
                    .optional()
                    .classify(log, Self::MODEL)?
                } else {
                    let changes = data.into_changes(jiff::Timestamp::now());
                    execute!(
                        log,
                        diesel::update(t::table)
                            .filter(filter.to_condition())
                            .set(changes)
                            .returning($model::as_returning()),
                        get_result(&mut *conn)
                    )
                    .optional()
                    .classify(log, Self::MODEL)?
                };
                row.ok_or_else(|| $crate::Error::not_found(Self::MODEL))
            }

            /// Updates every matching row, at most `limit` of them, and
            /// returns how many matched.
            #[tracing::instrument(skip_all, fields(model = $model_name, limit = ?limit))]
            pub async fn update_many(
                self,
                filter: $where,
                data: $crate::models::$update,
                limit: Option<i64>,
            ) -> Result<usize, $crate::Error> {
                use diesel::prelude::*;
                use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection};
                use $crate::{delegate::Classify, models::UpdateInput, schema::treasury::$table as t};
                let limit = $crate::delegate::check_limit(limit)?;
                let (mut conn, log) = self.target.connect().await?;
                if data.is_empty() {
                    let matching: i64 = execute!(
                        log,
                        t::table.filter(filter.to_condition()).count(),
                        get_result(&mut *conn)
                    )
                    .classify(log, Self::MODEL)?;
                    let matching = usize::try_from(matching).unwrap_or(0);
                    return Ok(limit.map_or(matching, |limit| {
                        matching.min(usize::try_from(limit).unwrap_or(usize::MAX))
                    }));
                }
                let changes = data.into_changes(jiff::Timestamp::now());
                let updated = match limit {
                    None => execute!(
                        log,
                        diesel::update(t::table).filter(filter.to_condition()).set(changes),
                        execute(&mut *conn)
                    ),
                    Some(limit) => {
                        let conn: &mut AsyncPgConnection = &mut conn;
                        conn.transaction(|conn| {
                            async move {
                                let keys: Vec<$pk_ty> = execute!(
                                    log,
                                    t::table
                                        .select(t::$pk)
                                        .filter(filter.to_condition())
                                        .order_by(t::$pk)
                                        .limit(limit)
                                        .for_update(),
                                    load(&mut *conn)
                                )?;
                                execute!(
                                    log,
                                    diesel::update(t::table).filter(t::$pk.eq_any(keys)).set(changes),
                                    execute(&mut *conn)
                                )
                            }
                            .scope_boxed()
                        })
                        .await
                    }
                };
                updated.classify(log, Self::MODEL)
            }

            /// Inserts `create` when no row matches `filter`, applies `update`
            /// otherwise. Runs in one transaction holding a row lock on the
            /// matched row.
            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn upsert(
                self,
                filter: $unique,
                create: $crate::models::$create,
                update: $crate::models::$update,
            ) -> Result<$crate::models::$model, $crate::Error> {
                use diesel::prelude::*;
                use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection};
                use $crate::{
                    delegate::Classify,
                    models::{$model, CreateInput, UpdateInput},
                    schema::treasury::$table as t,
                };
                let (mut conn, log) = self.target.connect().await?;
                let conn: &mut AsyncPgConnection = &mut conn;
                let now = jiff::Timestamp::now();
                let upserted: diesel::QueryResult<$model> = conn
                    .transaction(|conn| {
                        async move {
                            let current: Option<$model> = execute!(
                                log,
                                t::table
                                    .filter(filter.to_condition())
                                    .select($model::as_select())
                                    .for_update(),
                                first(&mut *conn)
                            )
                            .optional()?;
                            match current {
                                Some(current) if update.is_empty() => Ok(current),
                                Some(_) => execute!(
                                    log,
                                    diesel::update(t::table)
                                        .filter(filter.to_condition())
                                        .set(update.into_changes(now))
                                        .returning($model::as_returning()),
                                    get_result(&mut *conn)
                                ),
                                None => execute!(
                                    log,
                                    diesel::insert_into(t::table)
                                        .values(create.into_row(now))
                                        .returning($model::as_returning()),
                                    get_result(&mut *conn)
                                ),
                            }
                        }
                        .scope_boxed()
                    })
                    .await;
                upserted.classify(log, Self::MODEL)
            }

            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn delete(self, filter: $unique) -> Result<$crate::models::$model, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{delegate::Classify, models::$model, schema::treasury::$table as t};
                let (mut conn, log) = self.target.connect().await?;
                let deleted: Option<$model> = execute!(
                    log,
                    diesel::delete(t::table)
                        .filter(filter.to_condition())
                        .returning($model::as_returning()),
                    get_result(&mut *conn)
                )
                .optional()
                .classify(log, Self::MODEL)?;
                deleted.ok_or_else(|| $crate::Error::not_found(Self::MODEL))
            }

            #[tracing::instrument(skip_all, fields(model = $model_name, limit = ?limit))]
            pub async fn delete_many(self, filter: $where, limit: Option<i64>) -> Result<usize, $crate::Error> {
                use diesel::prelude::*;
                use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection};
                use $crate::{delegate::Classify, schema::treasury::$table as t};
                let limit = $crate::delegate::check_limit(limit)?;
                let (mut conn, log) = self.target.connect().await?;
                let deleted = match limit {
                    None => execute!(
                        log,
                        diesel::delete(t::table).filter(filter.to_condition()),
                        execute(&mut *conn)
                    ),
                    Some(limit) => {
                        let conn: &mut AsyncPgConnection = &mut conn;
                        conn.transaction(|conn| {
                            async move {
                                let keys: Vec<$pk_ty> = execute!(
                                    log,
                                    t::table
                                        .select(t::$pk)
                                        .filter(filter.to_condition())
                                        .order_by(t::$pk)
                                        .limit(limit)
                                        .for_update(),
                                    load(&mut *conn)
                                )?;
                                execute!(
                                    log,
                                    diesel::delete(t::table).filter(t::$pk.eq_any(keys)),
                                    execute(&mut *conn)
                                )
                            }
                            .scope_boxed()
                        })
                        .await
                    }
                };
                deleted.classify(log, Self::MODEL)
            }

            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn count(self, filter: $where) -> Result<i64, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{delegate::Classify, schema::treasury::$table as t};
                let (mut conn, log) = self.target.connect().await?;
                let count: i64 = execute!(
                    log,
                    t::table.filter(filter.to_condition()).count(),
                    get_result(&mut *conn)
                )
                .classify(log, Self::MODEL)?;
                Ok(count)
            }

            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn aggregate(self, args: $aggregate) -> Result<$crate::aggregate::Aggregates, $crate::Error> {
                args.select.validate()?;
                let select = args.select.clone();
                let rows = self.find_many(args.into_find_many()).await?;
                let rows: Vec<_> = rows.iter().collect();
                Ok(select.evaluate(&rows))
            }

            #[tracing::instrument(skip_all, fields(model = $model_name))]
            pub async fn group_by(
                self,
                mut args: $group_by,
            ) -> Result<Vec<$crate::aggregate::GroupRow>, $crate::Error> {
                args.validate()?;
                let filter = std::mem::take(&mut args.filter);
                let rows = self.find_many($crate::query::FindMany::new(filter)).await?;
                Ok(args.evaluate(&rows))
            }
        }
    };
}

/// Single-parent and batched accessors for a one-to-many relation.
macro_rules! has_many {
    ($delegate:ident, $parent:ident => $children:ident, $with_children:ident: $child:ident, $child_name:tt) => {
        impl<'a> $delegate<'a> {
            #[tracing::instrument(skip_all, fields(model = $child_name))]
            pub async fn $children(
                self,
                parent: &$crate::models::$parent,
            ) -> Result<Vec<$crate::models::$child>, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{delegate::Classify, models::$child};
                let (mut conn, log) = self.target.connect().await?;
                let children: Vec<$child> = execute!(
                    log,
                    $child::belonging_to(parent).select($child::as_select()),
                    load(&mut *conn)
                )
                .classify(log, $child_name)?;
                Ok(children)
            }

            /// Pairs each parent with its children, in the order of `parents`.
            #[tracing::instrument(skip_all, fields(model = $child_name, parents = parents.len()))]
            pub async fn $with_children(
                self,
                parents: Vec<$crate::models::$parent>,
            ) -> Result<Vec<($crate::models::$parent, Vec<$crate::models::$child>)>, $crate::Error> {
                use diesel::prelude::*;
                use $crate::{delegate::Classify, models::$child};
                if parents.is_empty() {
                    return Ok(Vec::new());
                }
                let (mut conn, log) = self.target.connect().await?;
                let children: Vec<$child> = execute!(
                    log,
                    $child::belonging_to(&parents).select($child::as_select()),
                    load(&mut *conn)
                )
                .classify(log, $child_name)?;
                let grouped = children.grouped_by(&parents);
                Ok(parents.into_iter().zip(grouped).collect())
            }
        }
    };
}

/// Loads the parent a row points at through its required foreign key.
macro_rules! belongs_to {
    ($delegate:ident, $child:ident => $method:ident: $parent_delegate:ident, $parent:ident, $unique:ident::$variant:ident($fk:ident)) => {
        impl<'a> $delegate<'a> {
            pub async fn $method(
                self,
                child: &$crate::models::$child,
            ) -> Result<$crate::models::$parent, $crate::Error> {
                $parent_delegate { target: self.target }
                    .find_unique_or_throw($unique::$variant(child.$fk.clone()))
                    .await
            }
        }
    };
}

pub(crate) fn check_limit(limit: Option<i64>) -> Result<Option<i64>, Error> {
    match limit {
        Some(limit) if limit < 0 => Err(Error::validation(format!(
            "limit must not be negative, got {limit}"
        ))),
        limit => Ok(limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_limits_are_rejected() {
        assert!(matches!(check_limit(Some(-1)), Err(Error::Validation(_))));
        assert_eq!(check_limit(Some(3)).ok(), Some(Some(3)));
        assert_eq!(check_limit(None).ok(), Some(None));
    }
}
