use crate::value::ScalarValue;
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::{Nullable, Text, Timestamptz},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, io::Write};

#[derive(thiserror::Error, Debug)]
#[error("unknown {what} {value:?}")]
pub struct UnknownVariant {
    what: &'static str,
    value: String,
}

macro_rules! text_enum {
    {
        $(#[$meta:meta])* $name:ident; $($variant:ident => $text:tt),+ $(,)?
    } => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash,
            AsExpression, FromSqlRow, Serialize, Deserialize,
        )]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        what: stringify!($name),
                        value: other.to_owned(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                Ok(std::str::from_utf8(bytes.as_bytes())?.parse()?)
            }
        }

        impl From<$name> for ScalarValue {
            fn from(value: $name) -> Self {
                ScalarValue::Text(value.as_str().to_owned())
            }
        }
    };
}

text_enum! {
    /// Stored as `TEXT` guarded by a `CHECK` constraint.
    Role;
    User => "USER",
    Admin => "ADMIN",
}

impl Default for Role {
    fn default() -> Self {
        Self::User
    }
}

text_enum! {
    TokenType;
    Access => "ACCESS",
    Refresh => "REFRESH",
    ResetPassword => "RESET_PASSWORD",
    VerifyEmail => "VERIFY_EMAIL",
}

/// Loads a `Nullable<Timestamptz>` column into an `Option<jiff::Timestamp>`.
#[doc(hidden)]
pub struct NullableTimestamp(Option<jiff::Timestamp>);

impl diesel::deserialize::Queryable<Nullable<Timestamptz>, Pg> for NullableTimestamp {
    type Row = Option<jiff_diesel::Timestamp>;

    fn build(row: Self::Row) -> deserialize::Result<Self> {
        Ok(Self(row.map(jiff::Timestamp::from)))
    }
}

impl From<NullableTimestamp> for Option<jiff::Timestamp> {
    fn from(value: NullableTimestamp) -> Self {
        value.0
    }
}

/// Conversion of a public create input into the row actually inserted.
pub(crate) trait CreateInput {
    type Row;

    fn into_row(self, now: jiff::Timestamp) -> Self::Row;
}

/// Conversion of a public update input into the changeset applied.
pub(crate) trait UpdateInput {
    type Changes;

    fn is_empty(&self) -> bool;
    fn into_changes(self, now: jiff::Timestamp) -> Self::Changes;
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in update inputs.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn stamp(at: jiff::Timestamp) -> jiff_diesel::Timestamp {
    at.into()
}

fn stamp_opt(at: Option<jiff::Timestamp>) -> Option<jiff_diesel::Timestamp> {
    at.map(Into::into)
}

fn stamp_nullable(at: Option<Option<jiff::Timestamp>>) -> Option<Option<jiff_diesel::Timestamp>> {
    at.map(|at| at.map(Into::into))
}

macro_rules! none_of {
    ($($field:expr),+ $(,)?) => {
        true $(&& $field.is_none())+
    };
}

// ---------------------------------------------------------------- users

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::treasury::users)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: Role,
    pub is_email_verified: bool,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub created_at: jiff::Timestamp,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub updated_at: jiff::Timestamp,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserCreate {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Expected to already be a pass phrase hash.
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_email_verified: Option<bool>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub updated_at: Option<jiff::Timestamp>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewUser {
    email: String,
    name: Option<String>,
    password: String,
    role: Role,
    is_email_verified: bool,
    created_at: jiff_diesel::Timestamp,
    updated_at: jiff_diesel::Timestamp,
}

impl CreateInput for UserCreate {
    type Row = NewUser;

    fn into_row(self, now: jiff::Timestamp) -> NewUser {
        NewUser {
            email: self.email,
            name: self.name,
            password: self.password,
            role: self.role.unwrap_or_default(),
            is_email_verified: self.is_email_verified.unwrap_or(false),
            created_at: stamp(self.created_at.unwrap_or(now)),
            updated_at: stamp(self.updated_at.unwrap_or(now)),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub name: Option<Option<String>>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_email_verified: Option<bool>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub updated_at: Option<jiff::Timestamp>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserChanges {
    email: Option<String>,
    name: Option<Option<String>>,
    password: Option<String>,
    role: Option<Role>,
    is_email_verified: Option<bool>,
    created_at: Option<jiff_diesel::Timestamp>,
    updated_at: Option<jiff_diesel::Timestamp>,
}

impl UpdateInput for UserUpdate {
    type Changes = UserChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.email,
            self.name,
            self.password,
            self.role,
            self.is_email_verified,
            self.created_at,
            self.updated_at,
        )
    }

    fn into_changes(self, now: jiff::Timestamp) -> UserChanges {
        UserChanges {
            email: self.email,
            name: self.name,
            password: self.password,
            role: self.role,
            is_email_verified: self.is_email_verified,
            created_at: stamp_opt(self.created_at),
            updated_at: Some(stamp(self.updated_at.unwrap_or(now))),
        }
    }
}

// ---------------------------------------------------------------- tokens

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Associations, Serialize)]
#[diesel(table_name = crate::schema::treasury::tokens)]
#[diesel(belongs_to(User))]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: i32,
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub expires: jiff::Timestamp,
    pub blacklisted: bool,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub created_at: jiff::Timestamp,
    pub user_id: i32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TokenCreate {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub expires: jiff::Timestamp,
    #[serde(default)]
    pub blacklisted: Option<bool>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    pub user_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewToken {
    token: String,
    token_type: TokenType,
    expires: jiff_diesel::Timestamp,
    blacklisted: bool,
    created_at: jiff_diesel::Timestamp,
    user_id: i32,
}

impl CreateInput for TokenCreate {
    type Row = NewToken;

    fn into_row(self, now: jiff::Timestamp) -> NewToken {
        NewToken {
            token: self.token,
            token_type: self.token_type,
            expires: stamp(self.expires),
            blacklisted: self.blacklisted.unwrap_or(false),
            created_at: stamp(self.created_at.unwrap_or(now)),
            user_id: self.user_id,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TokenUpdate {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "type")]
    pub token_type: Option<TokenType>,
    #[serde(default)]
    pub expires: Option<jiff::Timestamp>,
    #[serde(default)]
    pub blacklisted: Option<bool>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub user_id: Option<i32>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TokenChanges {
    token: Option<String>,
    token_type: Option<TokenType>,
    expires: Option<jiff_diesel::Timestamp>,
    blacklisted: Option<bool>,
    created_at: Option<jiff_diesel::Timestamp>,
    user_id: Option<i32>,
}

impl UpdateInput for TokenUpdate {
    type Changes = TokenChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.token,
            self.token_type,
            self.expires,
            self.blacklisted,
            self.created_at,
            self.user_id,
        )
    }

    fn into_changes(self, _now: jiff::Timestamp) -> TokenChanges {
        TokenChanges {
            token: self.token,
            token_type: self.token_type,
            expires: stamp_opt(self.expires),
            blacklisted: self.blacklisted,
            created_at: stamp_opt(self.created_at),
            user_id: self.user_id,
        }
    }
}

// ---------------------------------------------------------------- clients

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::treasury::clients)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub account_ids: Vec<String>,
    pub relationship_manager: String,
    pub status: String,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub created_at: jiff::Timestamp,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub updated_at: jiff::Timestamp,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientCreate {
    /// Generated (UUID v4) when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub account_ids: Vec<String>,
    pub relationship_manager: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub updated_at: Option<jiff::Timestamp>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::clients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewClient {
    id: String,
    name: String,
    account_ids: Vec<String>,
    relationship_manager: String,
    status: String,
    created_at: jiff_diesel::Timestamp,
    updated_at: jiff_diesel::Timestamp,
}

impl CreateInput for ClientCreate {
    type Row = NewClient;

    fn into_row(self, now: jiff::Timestamp) -> NewClient {
        NewClient {
            id: self.id.unwrap_or_else(new_id),
            name: self.name,
            account_ids: self.account_ids,
            relationship_manager: self.relationship_manager,
            status: self.status,
            created_at: stamp(self.created_at.unwrap_or(now)),
            updated_at: stamp(self.updated_at.unwrap_or(now)),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub account_ids: Option<Vec<String>>,
    #[serde(default)]
    pub relationship_manager: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub updated_at: Option<jiff::Timestamp>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::clients)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ClientChanges {
    name: Option<String>,
    account_ids: Option<Vec<String>>,
    relationship_manager: Option<String>,
    status: Option<String>,
    created_at: Option<jiff_diesel::Timestamp>,
    updated_at: Option<jiff_diesel::Timestamp>,
}

impl UpdateInput for ClientUpdate {
    type Changes = ClientChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.name,
            self.account_ids,
            self.relationship_manager,
            self.status,
            self.created_at,
            self.updated_at,
        )
    }

    fn into_changes(self, now: jiff::Timestamp) -> ClientChanges {
        ClientChanges {
            name: self.name,
            account_ids: self.account_ids,
            relationship_manager: self.relationship_manager,
            status: self.status,
            created_at: stamp_opt(self.created_at),
            updated_at: Some(stamp(self.updated_at.unwrap_or(now))),
        }
    }
}

// ---------------------------------------------------------------- statement_files

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Associations, Serialize)]
#[diesel(table_name = crate::schema::treasury::statement_files)]
#[diesel(belongs_to(Client))]
#[serde(rename_all = "camelCase")]
pub struct StatementFile {
    pub id: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: i32,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub uploaded_at: jiff::Timestamp,
    pub status: String,
    pub client_id: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatementFileCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub filename: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: i32,
    #[serde(default)]
    pub uploaded_at: Option<jiff::Timestamp>,
    pub status: String,
    pub client_id: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::statement_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewStatementFile {
    id: String,
    filename: String,
    file_type: String,
    size: i32,
    uploaded_at: jiff_diesel::Timestamp,
    status: String,
    client_id: String,
}

impl CreateInput for StatementFileCreate {
    type Row = NewStatementFile;

    fn into_row(self, now: jiff::Timestamp) -> NewStatementFile {
        NewStatementFile {
            id: self.id.unwrap_or_else(new_id),
            filename: self.filename,
            file_type: self.file_type,
            size: self.size,
            uploaded_at: stamp(self.uploaded_at.unwrap_or(now)),
            status: self.status,
            client_id: self.client_id,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatementFileUpdate {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, rename = "type")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub size: Option<i32>,
    #[serde(default)]
    pub uploaded_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::statement_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct StatementFileChanges {
    filename: Option<String>,
    file_type: Option<String>,
    size: Option<i32>,
    uploaded_at: Option<jiff_diesel::Timestamp>,
    status: Option<String>,
    client_id: Option<String>,
}

impl UpdateInput for StatementFileUpdate {
    type Changes = StatementFileChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.filename,
            self.file_type,
            self.size,
            self.uploaded_at,
            self.status,
            self.client_id,
        )
    }

    fn into_changes(self, _now: jiff::Timestamp) -> StatementFileChanges {
        StatementFileChanges {
            filename: self.filename,
            file_type: self.file_type,
            size: self.size,
            uploaded_at: stamp_opt(self.uploaded_at),
            status: self.status,
            client_id: self.client_id,
        }
    }
}

// ---------------------------------------------------------------- parse_results

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Associations, Serialize)]
#[diesel(table_name = crate::schema::treasury::parse_results)]
#[diesel(belongs_to(StatementFile))]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub id: String,
    pub statement_file_id: String,
    pub total_transactions: i32,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub date_range_start: jiff::Timestamp,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub date_range_end: jiff::Timestamp,
    pub accounts: serde_json::Value,
    pub status: String,
    pub errors: Option<serde_json::Value>,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub created_at: jiff::Timestamp,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParseResultCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub statement_file_id: String,
    pub total_transactions: i32,
    pub date_range_start: jiff::Timestamp,
    pub date_range_end: jiff::Timestamp,
    pub accounts: serde_json::Value,
    pub status: String,
    #[serde(default)]
    pub errors: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::parse_results)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewParseResult {
    id: String,
    statement_file_id: String,
    total_transactions: i32,
    date_range_start: jiff_diesel::Timestamp,
    date_range_end: jiff_diesel::Timestamp,
    accounts: serde_json::Value,
    status: String,
    errors: Option<serde_json::Value>,
    created_at: jiff_diesel::Timestamp,
}

impl CreateInput for ParseResultCreate {
    type Row = NewParseResult;

    fn into_row(self, now: jiff::Timestamp) -> NewParseResult {
        NewParseResult {
            id: self.id.unwrap_or_else(new_id),
            statement_file_id: self.statement_file_id,
            total_transactions: self.total_transactions,
            date_range_start: stamp(self.date_range_start),
            date_range_end: stamp(self.date_range_end),
            accounts: self.accounts,
            status: self.status,
            errors: self.errors,
            created_at: stamp(self.created_at.unwrap_or(now)),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParseResultUpdate {
    #[serde(default)]
    pub statement_file_id: Option<String>,
    #[serde(default)]
    pub total_transactions: Option<i32>,
    #[serde(default)]
    pub date_range_start: Option<jiff::Timestamp>,
    #[serde(default)]
    pub date_range_end: Option<jiff::Timestamp>,
    #[serde(default)]
    pub accounts: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub errors: Option<Option<serde_json::Value>>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::parse_results)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ParseResultChanges {
    statement_file_id: Option<String>,
    total_transactions: Option<i32>,
    date_range_start: Option<jiff_diesel::Timestamp>,
    date_range_end: Option<jiff_diesel::Timestamp>,
    accounts: Option<serde_json::Value>,
    status: Option<String>,
    errors: Option<Option<serde_json::Value>>,
    created_at: Option<jiff_diesel::Timestamp>,
}

impl UpdateInput for ParseResultUpdate {
    type Changes = ParseResultChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.statement_file_id,
            self.total_transactions,
            self.date_range_start,
            self.date_range_end,
            self.accounts,
            self.status,
            self.errors,
            self.created_at,
        )
    }

    fn into_changes(self, _now: jiff::Timestamp) -> ParseResultChanges {
        ParseResultChanges {
            statement_file_id: self.statement_file_id,
            total_transactions: self.total_transactions,
            date_range_start: stamp_opt(self.date_range_start),
            date_range_end: stamp_opt(self.date_range_end),
            accounts: self.accounts,
            status: self.status,
            errors: self.errors,
            created_at: stamp_opt(self.created_at),
        }
    }
}

// ---------------------------------------------------------------- analyses

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Associations, Serialize)]
#[diesel(table_name = crate::schema::treasury::analyses)]
#[diesel(belongs_to(Client))]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: String,
    pub client_id: String,
    pub statement_file_ids: Vec<String>,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub created_at: jiff::Timestamp,
    pub status: String,
    pub summary: serde_json::Value,
    pub liquidity_metrics: serde_json::Value,
    pub spending_breakdown: serde_json::Value,
    pub idle_balance_analysis: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalysisCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub statement_file_ids: Vec<String>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    pub status: String,
    pub summary: serde_json::Value,
    pub liquidity_metrics: serde_json::Value,
    pub spending_breakdown: serde_json::Value,
    pub idle_balance_analysis: serde_json::Value,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::analyses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewAnalysis {
    id: String,
    client_id: String,
    statement_file_ids: Vec<String>,
    created_at: jiff_diesel::Timestamp,
    status: String,
    summary: serde_json::Value,
    liquidity_metrics: serde_json::Value,
    spending_breakdown: serde_json::Value,
    idle_balance_analysis: serde_json::Value,
}

impl CreateInput for AnalysisCreate {
    type Row = NewAnalysis;

    fn into_row(self, now: jiff::Timestamp) -> NewAnalysis {
        NewAnalysis {
            id: self.id.unwrap_or_else(new_id),
            client_id: self.client_id,
            statement_file_ids: self.statement_file_ids,
            created_at: stamp(self.created_at.unwrap_or(now)),
            status: self.status,
            summary: self.summary,
            liquidity_metrics: self.liquidity_metrics,
            spending_breakdown: self.spending_breakdown,
            idle_balance_analysis: self.idle_balance_analysis,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AnalysisUpdate {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub statement_file_ids: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub summary: Option<serde_json::Value>,
    #[serde(default)]
    pub liquidity_metrics: Option<serde_json::Value>,
    #[serde(default)]
    pub spending_breakdown: Option<serde_json::Value>,
    #[serde(default)]
    pub idle_balance_analysis: Option<serde_json::Value>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::analyses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AnalysisChanges {
    client_id: Option<String>,
    statement_file_ids: Option<Vec<String>>,
    created_at: Option<jiff_diesel::Timestamp>,
    status: Option<String>,
    summary: Option<serde_json::Value>,
    liquidity_metrics: Option<serde_json::Value>,
    spending_breakdown: Option<serde_json::Value>,
    idle_balance_analysis: Option<serde_json::Value>,
}

impl UpdateInput for AnalysisUpdate {
    type Changes = AnalysisChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.client_id,
            self.statement_file_ids,
            self.created_at,
            self.status,
            self.summary,
            self.liquidity_metrics,
            self.spending_breakdown,
            self.idle_balance_analysis,
        )
    }

    fn into_changes(self, _now: jiff::Timestamp) -> AnalysisChanges {
        AnalysisChanges {
            client_id: self.client_id,
            statement_file_ids: self.statement_file_ids,
            created_at: stamp_opt(self.created_at),
            status: self.status,
            summary: self.summary,
            liquidity_metrics: self.liquidity_metrics,
            spending_breakdown: self.spending_breakdown,
            idle_balance_analysis: self.idle_balance_analysis,
        }
    }
}

// ---------------------------------------------------------------- treasury_products

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::treasury::treasury_products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct TreasuryProduct {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub features: Vec<String>,
    pub eligibility_rules: serde_json::Value,
    pub benefits: serde_json::Value,
    pub pricing: serde_json::Value,
    pub is_active: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TreasuryProductCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    pub eligibility_rules: serde_json::Value,
    pub benefits: serde_json::Value,
    pub pricing: serde_json::Value,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::treasury_products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewTreasuryProduct {
    id: String,
    name: String,
    category: String,
    description: String,
    features: Vec<String>,
    eligibility_rules: serde_json::Value,
    benefits: serde_json::Value,
    pricing: serde_json::Value,
    is_active: bool,
}

impl CreateInput for TreasuryProductCreate {
    type Row = NewTreasuryProduct;

    fn into_row(self, _now: jiff::Timestamp) -> NewTreasuryProduct {
        NewTreasuryProduct {
            id: self.id.unwrap_or_else(new_id),
            name: self.name,
            category: self.category,
            description: self.description,
            features: self.features,
            eligibility_rules: self.eligibility_rules,
            benefits: self.benefits,
            pricing: self.pricing,
            is_active: self.is_active.unwrap_or(true),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TreasuryProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Option<Vec<String>>,
    #[serde(default)]
    pub eligibility_rules: Option<serde_json::Value>,
    #[serde(default)]
    pub benefits: Option<serde_json::Value>,
    #[serde(default)]
    pub pricing: Option<serde_json::Value>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::treasury_products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TreasuryProductChanges {
    name: Option<String>,
    category: Option<String>,
    description: Option<String>,
    features: Option<Vec<String>>,
    eligibility_rules: Option<serde_json::Value>,
    benefits: Option<serde_json::Value>,
    pricing: Option<serde_json::Value>,
    is_active: Option<bool>,
}

impl UpdateInput for TreasuryProductUpdate {
    type Changes = TreasuryProductChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.name,
            self.category,
            self.description,
            self.features,
            self.eligibility_rules,
            self.benefits,
            self.pricing,
            self.is_active,
        )
    }

    fn into_changes(self, _now: jiff::Timestamp) -> TreasuryProductChanges {
        TreasuryProductChanges {
            name: self.name,
            category: self.category,
            description: self.description,
            features: self.features,
            eligibility_rules: self.eligibility_rules,
            benefits: self.benefits,
            pricing: self.pricing,
            is_active: self.is_active,
        }
    }
}

// ---------------------------------------------------------------- recommendations

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Associations, Serialize)]
#[diesel(table_name = crate::schema::treasury::recommendations)]
#[diesel(belongs_to(Analysis))]
#[diesel(belongs_to(TreasuryProduct, foreign_key = product_id))]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub analysis_id: String,
    pub product_id: String,
    pub priority: String,
    pub rationale: String,
    pub data_points: Vec<String>,
    pub benefit_projection: serde_json::Value,
    pub status: String,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub created_at: jiff::Timestamp,
    pub approved_by: Option<String>,
    #[diesel(deserialize_as = NullableTimestamp)]
    pub approved_at: Option<jiff::Timestamp>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecommendationCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub analysis_id: String,
    pub product_id: String,
    pub priority: String,
    pub rationale: String,
    #[serde(default)]
    pub data_points: Vec<String>,
    pub benefit_projection: serde_json::Value,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<jiff::Timestamp>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::recommendations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewRecommendation {
    id: String,
    analysis_id: String,
    product_id: String,
    priority: String,
    rationale: String,
    data_points: Vec<String>,
    benefit_projection: serde_json::Value,
    status: String,
    created_at: jiff_diesel::Timestamp,
    approved_by: Option<String>,
    approved_at: Option<jiff_diesel::Timestamp>,
}

impl CreateInput for RecommendationCreate {
    type Row = NewRecommendation;

    fn into_row(self, now: jiff::Timestamp) -> NewRecommendation {
        NewRecommendation {
            id: self.id.unwrap_or_else(new_id),
            analysis_id: self.analysis_id,
            product_id: self.product_id,
            priority: self.priority,
            rationale: self.rationale,
            data_points: self.data_points,
            benefit_projection: self.benefit_projection,
            status: self.status,
            created_at: stamp(self.created_at.unwrap_or(now)),
            approved_by: self.approved_by,
            approved_at: stamp_opt(self.approved_at),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecommendationUpdate {
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub data_points: Option<Vec<String>>,
    #[serde(default)]
    pub benefit_projection: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default, deserialize_with = "nullable")]
    pub approved_by: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub approved_at: Option<Option<jiff::Timestamp>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::recommendations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RecommendationChanges {
    analysis_id: Option<String>,
    product_id: Option<String>,
    priority: Option<String>,
    rationale: Option<String>,
    data_points: Option<Vec<String>>,
    benefit_projection: Option<serde_json::Value>,
    status: Option<String>,
    created_at: Option<jiff_diesel::Timestamp>,
    approved_by: Option<Option<String>>,
    approved_at: Option<Option<jiff_diesel::Timestamp>>,
}

impl UpdateInput for RecommendationUpdate {
    type Changes = RecommendationChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.analysis_id,
            self.product_id,
            self.priority,
            self.rationale,
            self.data_points,
            self.benefit_projection,
            self.status,
            self.created_at,
            self.approved_by,
            self.approved_at,
        )
    }

    fn into_changes(self, _now: jiff::Timestamp) -> RecommendationChanges {
        RecommendationChanges {
            analysis_id: self.analysis_id,
            product_id: self.product_id,
            priority: self.priority,
            rationale: self.rationale,
            data_points: self.data_points,
            benefit_projection: self.benefit_projection,
            status: self.status,
            created_at: stamp_opt(self.created_at),
            approved_by: self.approved_by,
            approved_at: stamp_nullable(self.approved_at),
        }
    }
}

// ---------------------------------------------------------------- reports

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Associations, Serialize)]
#[diesel(table_name = crate::schema::treasury::reports)]
#[diesel(belongs_to(Analysis))]
#[diesel(belongs_to(Client))]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub title: String,
    pub analysis_id: String,
    pub client_id: String,
    pub format: String,
    pub template: String,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub created_at: jiff::Timestamp,
    pub created_by: String,
    pub file_size: i32,
    pub download_count: i32,
    pub status: String,
    pub file_path: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReportCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub analysis_id: String,
    pub client_id: String,
    pub format: String,
    pub template: String,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    pub created_by: String,
    pub file_size: i32,
    #[serde(default)]
    pub download_count: Option<i32>,
    pub status: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewReport {
    id: String,
    title: String,
    analysis_id: String,
    client_id: String,
    format: String,
    template: String,
    created_at: jiff_diesel::Timestamp,
    created_by: String,
    file_size: i32,
    download_count: i32,
    status: String,
    file_path: Option<String>,
}

impl CreateInput for ReportCreate {
    type Row = NewReport;

    fn into_row(self, now: jiff::Timestamp) -> NewReport {
        NewReport {
            id: self.id.unwrap_or_else(new_id),
            title: self.title,
            analysis_id: self.analysis_id,
            client_id: self.client_id,
            format: self.format,
            template: self.template,
            created_at: stamp(self.created_at.unwrap_or(now)),
            created_by: self.created_by,
            file_size: self.file_size,
            download_count: self.download_count.unwrap_or(0),
            status: self.status,
            file_path: self.file_path,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReportUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub created_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub file_size: Option<i32>,
    #[serde(default)]
    pub download_count: Option<i32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub file_path: Option<Option<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::reports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ReportChanges {
    title: Option<String>,
    analysis_id: Option<String>,
    client_id: Option<String>,
    format: Option<String>,
    template: Option<String>,
    created_at: Option<jiff_diesel::Timestamp>,
    created_by: Option<String>,
    file_size: Option<i32>,
    download_count: Option<i32>,
    status: Option<String>,
    file_path: Option<Option<String>>,
}

impl UpdateInput for ReportUpdate {
    type Changes = ReportChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.title,
            self.analysis_id,
            self.client_id,
            self.format,
            self.template,
            self.created_at,
            self.created_by,
            self.file_size,
            self.download_count,
            self.status,
            self.file_path,
        )
    }

    fn into_changes(self, _now: jiff::Timestamp) -> ReportChanges {
        ReportChanges {
            title: self.title,
            analysis_id: self.analysis_id,
            client_id: self.client_id,
            format: self.format,
            template: self.template,
            created_at: stamp_opt(self.created_at),
            created_by: self.created_by,
            file_size: self.file_size,
            download_count: self.download_count,
            status: self.status,
            file_path: self.file_path,
        }
    }
}

// ---------------------------------------------------------------- system_configs

#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::treasury::system_configs)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    pub id: String,
    pub config_key: String,
    pub config_value: serde_json::Value,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub updated_at: jiff::Timestamp,
    pub updated_by: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SystemConfigCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub config_key: String,
    pub config_value: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<jiff::Timestamp>,
    pub updated_by: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::system_configs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewSystemConfig {
    id: String,
    config_key: String,
    config_value: serde_json::Value,
    updated_at: jiff_diesel::Timestamp,
    updated_by: String,
}

impl CreateInput for SystemConfigCreate {
    type Row = NewSystemConfig;

    fn into_row(self, now: jiff::Timestamp) -> NewSystemConfig {
        NewSystemConfig {
            id: self.id.unwrap_or_else(new_id),
            config_key: self.config_key,
            config_value: self.config_value,
            updated_at: stamp(self.updated_at.unwrap_or(now)),
            updated_by: self.updated_by,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SystemConfigUpdate {
    #[serde(default)]
    pub config_key: Option<String>,
    #[serde(default)]
    pub config_value: Option<serde_json::Value>,
    #[serde(default)]
    pub updated_at: Option<jiff::Timestamp>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::system_configs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SystemConfigChanges {
    config_key: Option<String>,
    config_value: Option<serde_json::Value>,
    updated_at: Option<jiff_diesel::Timestamp>,
    updated_by: Option<String>,
}

impl UpdateInput for SystemConfigUpdate {
    type Changes = SystemConfigChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.config_key,
            self.config_value,
            self.updated_at,
            self.updated_by,
        )
    }

    fn into_changes(self, now: jiff::Timestamp) -> SystemConfigChanges {
        SystemConfigChanges {
            config_key: self.config_key,
            config_value: self.config_value,
            updated_at: Some(stamp(self.updated_at.unwrap_or(now))),
            updated_by: self.updated_by,
        }
    }
}

// ---------------------------------------------------------------- audit_entries

/// Written once per audited action. Nothing here prevents later edits; the
/// services writing audit rows simply never update them.
#[derive(Clone, Debug, PartialEq, Identifiable, Queryable, Selectable, Associations, Serialize)]
#[diesel(table_name = crate::schema::treasury::audit_entries)]
#[diesel(belongs_to(User))]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: String,
    pub severity: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    #[diesel(deserialize_as = jiff_diesel::Timestamp)]
    pub timestamp: jiff::Timestamp,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuditEntryCreate {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub resource_id: Option<String>,
    pub details: String,
    pub severity: String,
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub timestamp: Option<jiff::Timestamp>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::treasury::audit_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct NewAuditEntry {
    id: String,
    user_id: i32,
    user_name: String,
    user_email: String,
    action: String,
    resource: String,
    resource_id: Option<String>,
    details: String,
    severity: String,
    ip_address: String,
    user_agent: Option<String>,
    timestamp: jiff_diesel::Timestamp,
}

impl CreateInput for AuditEntryCreate {
    type Row = NewAuditEntry;

    fn into_row(self, now: jiff::Timestamp) -> NewAuditEntry {
        NewAuditEntry {
            id: self.id.unwrap_or_else(new_id),
            user_id: self.user_id,
            user_name: self.user_name,
            user_email: self.user_email,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            details: self.details,
            severity: self.severity,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            timestamp: stamp(self.timestamp.unwrap_or(now)),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuditEntryUpdate {
    #[serde(default)]
    pub user_id: Option<i32>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub resource_id: Option<Option<String>>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub user_agent: Option<Option<String>>,
    #[serde(default)]
    pub timestamp: Option<jiff::Timestamp>,
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::treasury::audit_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AuditEntryChanges {
    user_id: Option<i32>,
    user_name: Option<String>,
    user_email: Option<String>,
    action: Option<String>,
    resource: Option<String>,
    resource_id: Option<Option<String>>,
    details: Option<String>,
    severity: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<Option<String>>,
    timestamp: Option<jiff_diesel::Timestamp>,
}

impl UpdateInput for AuditEntryUpdate {
    type Changes = AuditEntryChanges;

    fn is_empty(&self) -> bool {
        none_of!(
            self.user_id,
            self.user_name,
            self.user_email,
            self.action,
            self.resource,
            self.resource_id,
            self.details,
            self.severity,
            self.ip_address,
            self.user_agent,
            self.timestamp,
        )
    }

    fn into_changes(self, _now: jiff::Timestamp) -> AuditEntryChanges {
        AuditEntryChanges {
            user_id: self.user_id,
            user_name: self.user_name,
            user_email: self.user_email,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            details: self.details,
            severity: self.severity,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            timestamp: stamp_opt(self.timestamp),
        }
    }
}
