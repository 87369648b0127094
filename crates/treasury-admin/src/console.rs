use serde::de::DeserializeOwned;
use serde_json::Value;
use treasury_db::Store;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Model {
    User,
    Token,
    Client,
    StatementFile,
    ParseResult,
    Analysis,
    TreasuryProduct,
    Recommendation,
    Report,
    SystemConfig,
    AuditEntry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Find,
    Count,
    Aggregate,
    GroupBy,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid {operation:?} arguments for {model:?}: {source}")]
    Arguments {
        model: Model,
        operation: Operation,
        source: serde_json::Error,
    },
    #[error("Database error: {0}")]
    Db(#[from] treasury_db::Error),
    #[error("unable to render result: {0}")]
    Output(serde_json::Error),
}

/// Parses console arguments. A blank argument string means `{}`.
fn parse<T: DeserializeOwned>(model: Model, operation: Operation, args: &str) -> Result<T, Error> {
    let args = match args.trim() {
        "" => "{}",
        args => args,
    };
    serde_json::from_str(args).map_err(|source| Error::Arguments {
        model,
        operation,
        source,
    })
}

fn render<T: serde::Serialize>(value: T) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(Error::Output)
}

macro_rules! dispatch {
    ($store:expr, $model:expr, $operation:expr, $args:expr;
     $($variant:ident => $accessor:ident, $find_many:ident, $where:ident, $aggregate:ident, $group_by:ident;)+) => {
        match $model {
            $(Model::$variant => {
                let delegate = $store.$accessor();
                match $operation {
                    Operation::Find => render(
                        delegate
                            .find_many(parse::<treasury_db::$find_many>($model, $operation, $args)?)
                            .await?,
                    ),
                    Operation::Count => render(
                        delegate
                            .count(parse::<treasury_db::$where>($model, $operation, $args)?)
                            .await?,
                    ),
                    Operation::Aggregate => render(
                        delegate
                            .aggregate(parse::<treasury_db::$aggregate>($model, $operation, $args)?)
                            .await?,
                    ),
                    Operation::GroupBy => render(
                        delegate
                            .group_by(parse::<treasury_db::$group_by>($model, $operation, $args)?)
                            .await?,
                    ),
                }
            })+
        }
    };
}

/// Runs a read operation against `model`, taking and returning JSON.
#[tracing::instrument(skip(store, args))]
pub async fn run(store: &Store, model: Model, operation: Operation, args: &str) -> Result<Value, Error> {
    dispatch!(store, model, operation, args;
        User => user, UserFindMany, UserWhere, UserAggregate, UserGroupBy;
        Token => token, TokenFindMany, TokenWhere, TokenAggregate, TokenGroupBy;
        Client => client, ClientFindMany, ClientWhere, ClientAggregate, ClientGroupBy;
        StatementFile => statement_file, StatementFileFindMany, StatementFileWhere,
            StatementFileAggregate, StatementFileGroupBy;
        ParseResult => parse_result, ParseResultFindMany, ParseResultWhere,
            ParseResultAggregate, ParseResultGroupBy;
        Analysis => analysis, AnalysisFindMany, AnalysisWhere, AnalysisAggregate, AnalysisGroupBy;
        TreasuryProduct => treasury_product, TreasuryProductFindMany, TreasuryProductWhere,
            TreasuryProductAggregate, TreasuryProductGroupBy;
        Recommendation => recommendation, RecommendationFindMany, RecommendationWhere,
            RecommendationAggregate, RecommendationGroupBy;
        Report => report, ReportFindMany, ReportWhere, ReportAggregate, ReportGroupBy;
        SystemConfig => system_config, SystemConfigFindMany, SystemConfigWhere,
            SystemConfigAggregate, SystemConfigGroupBy;
        AuditEntry => audit_entry, AuditEntryFindMany, AuditEntryWhere,
            AuditEntryAggregate, AuditEntryGroupBy;
    )
}
