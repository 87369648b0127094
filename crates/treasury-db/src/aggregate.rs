use crate::{
    query::{paginate, FindMany, OrderBy, SortOrder},
    value::{FieldSpec, Record, ScalarValue},
    Error,
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap};

/// Which aggregates to compute, e.g.
/// `{"countAll": true, "avg": ["size"], "max": ["uploadedAt"]}`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "F: Deserialize<'de>"))]
pub struct AggregateSelection<F> {
    #[serde(default)]
    pub count_all: bool,
    #[serde(default = "Vec::new")]
    pub count: Vec<F>,
    #[serde(default = "Vec::new")]
    pub avg: Vec<F>,
    #[serde(default = "Vec::new")]
    pub sum: Vec<F>,
    #[serde(default = "Vec::new")]
    pub min: Vec<F>,
    #[serde(default = "Vec::new")]
    pub max: Vec<F>,
}

impl<F> Default for AggregateSelection<F> {
    fn default() -> Self {
        Self {
            count_all: false,
            count: Vec::new(),
            avg: Vec::new(),
            sum: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
        }
    }
}

impl<F: FieldSpec> AggregateSelection<F> {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        for field in self.avg.iter().chain(&self.sum) {
            check_numeric(*field)?;
        }
        for field in self.min.iter().chain(&self.max) {
            check_orderable(*field)?;
        }
        Ok(())
    }

    pub(crate) fn evaluate<R: Record<Field = F>>(&self, rows: &[&R]) -> Aggregates {
        let mut aggregates = Aggregates {
            count_all: self.count_all.then(|| rows.len() as i64),
            ..Default::default()
        };
        for field in &self.count {
            aggregates.count.insert(field.name(), count(rows, *field));
        }
        for field in &self.avg {
            aggregates.avg.insert(field.name(), avg(rows, *field));
        }
        for field in &self.sum {
            aggregates.sum.insert(field.name(), sum(rows, *field));
        }
        for field in &self.min {
            aggregates.min.insert(field.name(), extreme(rows, *field, Ordering::Less));
        }
        for field in &self.max {
            aggregates.max.insert(field.name(), extreme(rows, *field, Ordering::Greater));
        }
        aggregates
    }
}

/// Arguments of `aggregate`: the rows are selected like `find_many`, then
/// reduced in process.
#[derive(Clone, Debug, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "W: Deserialize<'de> + Default, U: Deserialize<'de>, F: Deserialize<'de>")
)]
pub struct Aggregate<W, U, F> {
    #[serde(rename = "where", default)]
    pub filter: W,
    #[serde(default = "Vec::new")]
    pub order_by: Vec<OrderBy<F>>,
    #[serde(default = "Option::default")]
    pub cursor: Option<U>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub take: Option<i64>,
    #[serde(flatten)]
    pub select: AggregateSelection<F>,
}

impl<W, U, F> Aggregate<W, U, F> {
    pub fn new(filter: W, select: AggregateSelection<F>) -> Self {
        Self {
            filter,
            order_by: Vec::new(),
            cursor: None,
            skip: None,
            take: None,
            select,
        }
    }

    pub(crate) fn into_find_many(self) -> FindMany<W, U, F> {
        FindMany {
            filter: self.filter,
            order_by: self.order_by,
            cursor: self.cursor,
            skip: self.skip,
            take: self.take,
            distinct: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_all: Option<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub count: BTreeMap<&'static str, i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub avg: BTreeMap<&'static str, Option<f64>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub sum: BTreeMap<&'static str, Option<i64>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub min: BTreeMap<&'static str, ScalarValue>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub max: BTreeMap<&'static str, ScalarValue>,
}

/// A value computed per group, usable in `having` and `orderBy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric<F> {
    /// One of the `by` fields.
    Field(F),
    CountAll,
    Count(F),
    Avg(F),
    Sum(F),
    Min(F),
    Max(F),
}

impl<F: FieldSpec> Metric<F> {
    fn validate(self, by: &[F], role: &str) -> Result<(), Error> {
        match self {
            Self::Field(field) if !by.contains(&field) => Err(Error::validation(format!(
                "{role} field {}.{} must also appear in `by`",
                F::MODEL,
                field.name()
            ))),
            Self::Field(field) if role == "orderBy" => check_orderable(field),
            Self::Field(_) | Self::CountAll | Self::Count(_) => Ok(()),
            Self::Avg(field) | Self::Sum(field) => check_numeric(field),
            Self::Min(field) | Self::Max(field) => check_orderable(field),
        }
    }

    fn value<R: Record<Field = F>>(self, key: &BTreeMap<F, ScalarValue>, rows: &[&R]) -> ScalarValue {
        match self {
            Self::Field(field) => key.get(&field).cloned().unwrap_or(ScalarValue::Null),
            Self::CountAll => ScalarValue::Int(rows.len() as i64),
            Self::Count(field) => ScalarValue::Int(count(rows, field)),
            Self::Avg(field) => avg(rows, field).into(),
            Self::Sum(field) => sum(rows, field).into(),
            Self::Min(field) => extreme(rows, field, Ordering::Less),
            Self::Max(field) => extreme(rows, field, Ordering::Greater),
        }
    }
}

/// Operand comparisons of a `having` condition. Ordering operators never
/// match a null metric.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub equals: Option<serde_json::Value>,
    pub not: Option<serde_json::Value>,
    pub lt: Option<serde_json::Value>,
    pub lte: Option<serde_json::Value>,
    pub gt: Option<serde_json::Value>,
    pub gte: Option<serde_json::Value>,
}

impl Comparison {
    fn matches(&self, value: &ScalarValue) -> bool {
        let operand = |json: &serde_json::Value| ScalarValue::from_json(json, value);
        let ordered = |json: &Option<serde_json::Value>, accept: fn(Ordering) -> bool| match json {
            None => true,
            Some(json) => {
                let operand = operand(json);
                !value.is_null() && !operand.is_null() && accept(value.cmp(&operand))
            }
        };
        self.equals.as_ref().map_or(true, |json| *value == operand(json))
            && self.not.as_ref().map_or(true, |json| *value != operand(json))
            && ordered(&self.lt, Ordering::is_lt)
            && ordered(&self.lte, Ordering::is_le)
            && ordered(&self.gt, Ordering::is_gt)
            && ordered(&self.gte, Ordering::is_ge)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub struct Having<F> {
    pub metric: Metric<F>,
    #[serde(flatten)]
    pub comparison: Comparison,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(bound(deserialize = "F: Deserialize<'de>"))]
pub struct GroupOrderBy<F> {
    pub metric: Metric<F>,
    #[serde(default)]
    pub direction: SortOrder,
}

/// Arguments of `group_by`, e.g.
/// `{"by": ["status"], "countAll": true, "orderBy": [{"metric": {"field": "status"}}]}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(
    rename_all = "camelCase",
    bound(deserialize = "W: Deserialize<'de> + Default, F: Deserialize<'de>")
)]
pub struct GroupBy<W, F> {
    #[serde(rename = "where", default)]
    pub filter: W,
    pub by: Vec<F>,
    #[serde(flatten)]
    pub select: AggregateSelection<F>,
    #[serde(default = "Vec::new")]
    pub having: Vec<Having<F>>,
    #[serde(default = "Vec::new")]
    pub order_by: Vec<GroupOrderBy<F>>,
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub take: Option<i64>,
}

impl<W, F> GroupBy<W, F> {
    pub fn new(filter: W, by: Vec<F>) -> Self {
        Self {
            filter,
            by,
            select: AggregateSelection::default(),
            having: Vec::new(),
            order_by: Vec::new(),
            skip: None,
            take: None,
        }
    }
}

impl<W, F: FieldSpec> GroupBy<W, F> {
    /// Rejects malformed arguments before any row is read.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.by.is_empty() {
            return Err(Error::validation(format!(
                "{} group_by needs at least one `by` field",
                F::MODEL
            )));
        }
        for field in &self.by {
            if !field.kind().is_groupable() {
                return Err(Error::validation(format!(
                    "{}.{} cannot be grouped by",
                    F::MODEL,
                    field.name()
                )));
            }
        }
        self.select.validate()?;
        for order in &self.order_by {
            order.metric.validate(&self.by, "orderBy")?;
        }
        for having in &self.having {
            having.metric.validate(&self.by, "having")?;
        }
        if (self.skip.is_some() || self.take.is_some()) && self.order_by.is_empty() {
            return Err(Error::validation(
                "group_by with skip or take needs an orderBy",
            ));
        }
        if self.skip.is_some_and(|skip| skip < 0) || self.take.is_some_and(|take| take < 0) {
            return Err(Error::validation(
                "group_by skip and take must not be negative",
            ));
        }
        Ok(())
    }

    pub(crate) fn evaluate<R: Record<Field = F>>(&self, rows: &[R]) -> Vec<GroupRow> {
        let mut groups: BTreeMap<Vec<ScalarValue>, Vec<&R>> = BTreeMap::new();
        for row in rows {
            let key = self.by.iter().map(|field| row.value(*field)).collect();
            groups.entry(key).or_default().push(row);
        }

        let mut evaluated: Vec<(BTreeMap<F, ScalarValue>, Vec<&R>)> = groups
            .into_iter()
            .map(|(key, rows)| (self.by.iter().copied().zip(key).collect(), rows))
            .filter(|(key, rows)| {
                self.having
                    .iter()
                    .all(|having| having.comparison.matches(&having.metric.value(key, rows)))
            })
            .collect();

        // Stable, so groups tied on every order key keep their key order.
        evaluated.sort_by(|(a_key, a_rows), (b_key, b_rows)| {
            self.order_by
                .iter()
                .map(|order| {
                    let ordering = order
                        .metric
                        .value(a_key, a_rows)
                        .cmp(&order.metric.value(b_key, b_rows));
                    match order.direction {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        let rows = evaluated
            .into_iter()
            .map(|(key, rows)| GroupRow {
                key: key.into_iter().map(|(field, value)| (field.name(), value)).collect(),
                aggregates: self.select.evaluate(&rows),
            })
            .collect();
        paginate(rows, self.skip, self.take)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: BTreeMap<&'static str, ScalarValue>,
    #[serde(flatten)]
    pub aggregates: Aggregates,
}

fn check_numeric<F: FieldSpec>(field: F) -> Result<(), Error> {
    if field.kind().is_numeric() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{}.{} is not numeric",
            F::MODEL,
            field.name()
        )))
    }
}

fn check_orderable<F: FieldSpec>(field: F) -> Result<(), Error> {
    if field.kind().is_orderable() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "{}.{} has no ordering",
            F::MODEL,
            field.name()
        )))
    }
}

fn count<R: Record>(rows: &[&R], field: R::Field) -> i64 {
    rows.iter().filter(|row| !row.value(field).is_null()).count() as i64
}

fn avg<R: Record>(rows: &[&R], field: R::Field) -> Option<f64> {
    let values: Vec<f64> = rows.iter().filter_map(|row| row.value(field).as_f64()).collect();
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn sum<R: Record>(rows: &[&R], field: R::Field) -> Option<i64> {
    rows.iter()
        .filter_map(|row| match row.value(field) {
            ScalarValue::Int(v) => Some(v),
            _ => None,
        })
        .reduce(|a, b| a.saturating_add(b))
}

fn extreme<R: Record>(rows: &[&R], field: R::Field, wanted: Ordering) -> ScalarValue {
    rows.iter()
        .map(|row| row.value(field))
        .filter(|value| !value.is_null())
        .reduce(|best, value| if value.cmp(&best) == wanted { value } else { best })
        .unwrap_or(ScalarValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldKind;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
    #[serde(rename_all = "camelCase")]
    enum FileField {
        Status,
        Size,
        Tags,
        Meta,
    }

    impl FieldSpec for FileField {
        const MODEL: &'static str = "StatementFile";
        const ALL: &'static [Self] = &[Self::Status, Self::Size, Self::Tags, Self::Meta];

        fn name(self) -> &'static str {
            match self {
                Self::Status => "status",
                Self::Size => "size",
                Self::Tags => "tags",
                Self::Meta => "meta",
            }
        }

        fn kind(self) -> FieldKind {
            match self {
                Self::Status => FieldKind::Text,
                Self::Size => FieldKind::Int,
                Self::Tags => FieldKind::List,
                Self::Meta => FieldKind::Json,
            }
        }
    }

    struct File {
        status: &'static str,
        size: Option<i32>,
    }

    impl Record for File {
        type Field = FileField;

        fn value(&self, field: FileField) -> ScalarValue {
            match field {
                FileField::Status => self.status.into(),
                FileField::Size => self.size.into(),
                FileField::Tags => ScalarValue::List(Vec::new()),
                FileField::Meta => ScalarValue::Json(serde_json::Value::Null),
            }
        }
    }

    fn files() -> Vec<File> {
        vec![
            File { status: "PARSED", size: Some(10) },
            File { status: "FAILED", size: Some(4) },
            File { status: "PARSED", size: Some(30) },
            File { status: "PENDING", size: None },
            File { status: "PARSED", size: None },
        ]
    }

    fn group_by(value: serde_json::Value) -> GroupBy<(), FileField> {
        serde_json::from_value(value).expect("valid group_by arguments")
    }

    #[test]
    fn aggregates_skip_nulls() {
        let rows = files();
        let refs: Vec<&File> = rows.iter().collect();
        let select: AggregateSelection<FileField> = serde_json::from_value(serde_json::json!({
            "countAll": true,
            "count": ["size"],
            "avg": ["size"],
            "sum": ["size"],
            "min": ["size", "status"],
            "max": ["size"]
        }))
        .expect("valid selection");
        select.validate().expect("selection is valid");
        let result = select.evaluate(&refs);
        assert_eq!(result.count_all, Some(5));
        assert_eq!(result.count["size"], 3);
        assert_eq!(result.avg["size"], Some(44.0 / 3.0));
        assert_eq!(result.sum["size"], Some(44));
        assert_eq!(result.min["size"], ScalarValue::Int(4));
        assert_eq!(result.min["status"], ScalarValue::Text("FAILED".into()));
        assert_eq!(result.max["size"], ScalarValue::Int(30));
    }

    #[test]
    fn aggregates_over_no_rows_are_null() {
        let select = AggregateSelection {
            count_all: true,
            sum: vec![FileField::Size],
            max: vec![FileField::Size],
            ..Default::default()
        };
        let result = select.evaluate::<File>(&[]);
        assert_eq!(result.count_all, Some(0));
        assert_eq!(result.sum["size"], None);
        assert!(result.max["size"].is_null());
    }

    #[test]
    fn averaging_text_is_rejected() {
        let select = AggregateSelection {
            avg: vec![FileField::Status],
            ..Default::default()
        };
        assert!(matches!(select.validate(), Err(Error::Validation(_))));
        let select = AggregateSelection {
            max: vec![FileField::Tags],
            ..Default::default()
        };
        assert!(matches!(select.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn empty_by_is_rejected() {
        let args = group_by(serde_json::json!({ "by": [], "countAll": true }));
        assert!(matches!(args.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn ordering_by_a_field_outside_by_is_rejected() {
        let args = group_by(serde_json::json!({
            "by": ["status"],
            "orderBy": [{ "metric": { "field": "size" } }]
        }));
        assert!(matches!(args.validate(), Err(Error::Validation(_))));

        let args = group_by(serde_json::json!({
            "by": ["status"],
            "orderBy": [{ "metric": { "sum": "size" }, "direction": "desc" }]
        }));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn having_on_a_field_outside_by_is_rejected() {
        let args = group_by(serde_json::json!({
            "by": ["status"],
            "having": [{ "metric": { "field": "size" }, "gt": 1 }]
        }));
        assert!(matches!(args.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn paging_groups_needs_an_order() {
        let args = group_by(serde_json::json!({ "by": ["status"], "take": 1 }));
        assert!(matches!(args.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn grouping_by_json_is_rejected() {
        let args = group_by(serde_json::json!({ "by": ["meta"] }));
        assert!(matches!(args.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn groups_are_filtered_ordered_and_paged() {
        let args = group_by(serde_json::json!({
            "by": ["status"],
            "countAll": true,
            "sum": ["size"],
            "having": [{ "metric": "countAll", "gte": 1 }],
            "orderBy": [{ "metric": "countAll", "direction": "desc" }, { "metric": { "field": "status" } }],
            "take": 2
        }));
        args.validate().expect("valid group_by");
        let groups = args.evaluate(&files());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key["status"], ScalarValue::Text("PARSED".into()));
        assert_eq!(groups[0].aggregates.count_all, Some(3));
        assert_eq!(groups[0].aggregates.sum["size"], Some(40));
        assert_eq!(groups[1].key["status"], ScalarValue::Text("FAILED".into()));
    }

    #[test]
    fn having_drops_groups_with_a_null_metric() {
        let args = group_by(serde_json::json!({
            "by": ["status"],
            "having": [{ "metric": { "sum": "size" }, "gt": 5 }]
        }));
        let groups = args.evaluate(&files());
        let statuses: Vec<_> = groups.iter().map(|g| g.key["status"].clone()).collect();
        assert_eq!(statuses, vec![ScalarValue::Text("PARSED".into())]);
    }
}
