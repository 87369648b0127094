//! The eleven treasury entities, their relations and the few helpers that
//! go beyond generated CRUD.

use crate::{
    delegate::Classify,
    models::{ParseResult, Report, SystemConfig, SystemConfigCreate, SystemConfigUpdate, Token, TokenType},
    schema::treasury::{reports, tokens},
    Error,
};
use diesel::prelude::*;

delegate! {
    model: User, "User";
    table: users;
    primary: Id(i32) => id;
    names: UserDelegate, UserField, UserWhere, UserWhereUnique, UserCreate, UserUpdate;
    args: UserFindMany, UserAggregate, UserGroupBy;
    accessor: user;
    unique { Id(i32) => id, Email(String) => email }
    fields {
        Id id "id" int,
        Email email "email" text,
        Name name "name" opt_text,
        Password password "password" text,
        Role role "role" role,
        IsEmailVerified is_email_verified "isEmailVerified" bool,
        CreatedAt created_at "createdAt" time,
        UpdatedAt updated_at "updatedAt" time,
    }
}

delegate! {
    model: Token, "Token";
    table: tokens;
    primary: Id(i32) => id;
    names: TokenDelegate, TokenField, TokenWhere, TokenWhereUnique, TokenCreate, TokenUpdate;
    args: TokenFindMany, TokenAggregate, TokenGroupBy;
    accessor: token;
    unique { Id(i32) => id }
    fields {
        Id id "id" int,
        Token token "token" text,
        TokenType token_type "type" token_type,
        Expires expires "expires" time,
        Blacklisted blacklisted "blacklisted" bool,
        CreatedAt created_at "createdAt" time,
        UserId user_id "userId" int,
    }
}

delegate! {
    model: Client, "Client";
    table: clients;
    primary: Id(String) => id;
    names: ClientDelegate, ClientField, ClientWhere, ClientWhereUnique, ClientCreate, ClientUpdate;
    args: ClientFindMany, ClientAggregate, ClientGroupBy;
    accessor: client;
    unique { Id(String) => id }
    fields {
        Id id "id" text,
        Name name "name" text,
        AccountIds account_ids "accountIds" list,
        RelationshipManager relationship_manager "relationshipManager" text,
        Status status "status" text,
        CreatedAt created_at "createdAt" time,
        UpdatedAt updated_at "updatedAt" time,
    }
}

delegate! {
    model: StatementFile, "StatementFile";
    table: statement_files;
    primary: Id(String) => id;
    names: StatementFileDelegate, StatementFileField, StatementFileWhere, StatementFileWhereUnique,
        StatementFileCreate, StatementFileUpdate;
    args: StatementFileFindMany, StatementFileAggregate, StatementFileGroupBy;
    accessor: statement_file;
    unique { Id(String) => id }
    fields {
        Id id "id" text,
        Filename filename "filename" text,
        FileType file_type "type" text,
        Size size "size" int,
        UploadedAt uploaded_at "uploadedAt" time,
        Status status "status" text,
        ClientId client_id "clientId" text,
    }
}

delegate! {
    model: ParseResult, "ParseResult";
    table: parse_results;
    primary: Id(String) => id;
    names: ParseResultDelegate, ParseResultField, ParseResultWhere, ParseResultWhereUnique,
        ParseResultCreate, ParseResultUpdate;
    args: ParseResultFindMany, ParseResultAggregate, ParseResultGroupBy;
    accessor: parse_result;
    unique { Id(String) => id, StatementFileId(String) => statement_file_id }
    fields {
        Id id "id" text,
        StatementFileId statement_file_id "statementFileId" text,
        TotalTransactions total_transactions "totalTransactions" int,
        DateRangeStart date_range_start "dateRangeStart" time,
        DateRangeEnd date_range_end "dateRangeEnd" time,
        Accounts accounts "accounts" json,
        Status status "status" text,
        Errors errors "errors" opt_json,
        CreatedAt created_at "createdAt" time,
    }
}

delegate! {
    model: Analysis, "Analysis";
    table: analyses;
    primary: Id(String) => id;
    names: AnalysisDelegate, AnalysisField, AnalysisWhere, AnalysisWhereUnique, AnalysisCreate, AnalysisUpdate;
    args: AnalysisFindMany, AnalysisAggregate, AnalysisGroupBy;
    accessor: analysis;
    unique { Id(String) => id }
    fields {
        Id id "id" text,
        ClientId client_id "clientId" text,
        StatementFileIds statement_file_ids "statementFileIds" list,
        CreatedAt created_at "createdAt" time,
        Status status "status" text,
        Summary summary "summary" json,
        LiquidityMetrics liquidity_metrics "liquidityMetrics" json,
        SpendingBreakdown spending_breakdown "spendingBreakdown" json,
        IdleBalanceAnalysis idle_balance_analysis "idleBalanceAnalysis" json,
    }
}

delegate! {
    model: TreasuryProduct, "TreasuryProduct";
    table: treasury_products;
    primary: Id(String) => id;
    names: TreasuryProductDelegate, TreasuryProductField, TreasuryProductWhere, TreasuryProductWhereUnique,
        TreasuryProductCreate, TreasuryProductUpdate;
    args: TreasuryProductFindMany, TreasuryProductAggregate, TreasuryProductGroupBy;
    accessor: treasury_product;
    unique { Id(String) => id, Name(String) => name }
    fields {
        Id id "id" text,
        Name name "name" text,
        Category category "category" text,
        Description description "description" text,
        Features features "features" list,
        EligibilityRules eligibility_rules "eligibilityRules" json,
        Benefits benefits "benefits" json,
        Pricing pricing "pricing" json,
        IsActive is_active "isActive" bool,
    }
}

delegate! {
    model: Recommendation, "Recommendation";
    table: recommendations;
    primary: Id(String) => id;
    names: RecommendationDelegate, RecommendationField, RecommendationWhere, RecommendationWhereUnique,
        RecommendationCreate, RecommendationUpdate;
    args: RecommendationFindMany, RecommendationAggregate, RecommendationGroupBy;
    accessor: recommendation;
    unique { Id(String) => id }
    fields {
        Id id "id" text,
        AnalysisId analysis_id "analysisId" text,
        ProductId product_id "productId" text,
        Priority priority "priority" text,
        Rationale rationale "rationale" text,
        DataPoints data_points "dataPoints" list,
        BenefitProjection benefit_projection "benefitProjection" json,
        Status status "status" text,
        CreatedAt created_at "createdAt" time,
        ApprovedBy approved_by "approvedBy" opt_text,
        ApprovedAt approved_at "approvedAt" opt_time,
    }
}

delegate! {
    model: Report, "Report";
    table: reports;
    primary: Id(String) => id;
    names: ReportDelegate, ReportField, ReportWhere, ReportWhereUnique, ReportCreate, ReportUpdate;
    args: ReportFindMany, ReportAggregate, ReportGroupBy;
    accessor: report;
    unique { Id(String) => id }
    fields {
        Id id "id" text,
        Title title "title" text,
        AnalysisId analysis_id "analysisId" text,
        ClientId client_id "clientId" text,
        Format format "format" text,
        Template template "template" text,
        CreatedAt created_at "createdAt" time,
        CreatedBy created_by "createdBy" text,
        FileSize file_size "fileSize" int,
        DownloadCount download_count "downloadCount" int,
        Status status "status" text,
        FilePath file_path "filePath" opt_text,
    }
}

delegate! {
    model: SystemConfig, "SystemConfig";
    table: system_configs;
    primary: Id(String) => id;
    names: SystemConfigDelegate, SystemConfigField, SystemConfigWhere, SystemConfigWhereUnique,
        SystemConfigCreate, SystemConfigUpdate;
    args: SystemConfigFindMany, SystemConfigAggregate, SystemConfigGroupBy;
    accessor: system_config;
    unique { Id(String) => id, ConfigKey(String) => config_key }
    fields {
        Id id "id" text,
        ConfigKey config_key "configKey" text,
        ConfigValue config_value "configValue" json,
        UpdatedAt updated_at "updatedAt" time,
        UpdatedBy updated_by "updatedBy" text,
    }
}

delegate! {
    model: AuditEntry, "AuditEntry";
    table: audit_entries;
    primary: Id(String) => id;
    names: AuditEntryDelegate, AuditEntryField, AuditEntryWhere, AuditEntryWhereUnique,
        AuditEntryCreate, AuditEntryUpdate;
    args: AuditEntryFindMany, AuditEntryAggregate, AuditEntryGroupBy;
    accessor: audit_entry;
    unique { Id(String) => id }
    fields {
        Id id "id" text,
        UserId user_id "userId" int,
        UserName user_name "userName" text,
        UserEmail user_email "userEmail" text,
        Action action "action" text,
        Resource resource "resource" text,
        ResourceId resource_id "resourceId" opt_text,
        Details details "details" text,
        Severity severity "severity" text,
        IpAddress ip_address "ipAddress" text,
        UserAgent user_agent "userAgent" opt_text,
        Timestamp timestamp "timestamp" time,
    }
}

has_many!(UserDelegate, User => tokens, with_tokens: Token, "Token");
has_many!(UserDelegate, User => audit_entries, with_audit_entries: AuditEntry, "AuditEntry");
belongs_to!(TokenDelegate, Token => user: UserDelegate, User, UserWhereUnique::Id(user_id));
belongs_to!(AuditEntryDelegate, AuditEntry => user: UserDelegate, User, UserWhereUnique::Id(user_id));

has_many!(ClientDelegate, Client => statement_files, with_statement_files: StatementFile, "StatementFile");
has_many!(ClientDelegate, Client => analyses, with_analyses: Analysis, "Analysis");
has_many!(ClientDelegate, Client => reports, with_reports: Report, "Report");

belongs_to!(StatementFileDelegate, StatementFile => client: ClientDelegate, Client, ClientWhereUnique::Id(client_id));
belongs_to!(ParseResultDelegate, ParseResult => statement_file: StatementFileDelegate, StatementFile,
    StatementFileWhereUnique::Id(statement_file_id));

has_many!(AnalysisDelegate, Analysis => recommendations, with_recommendations: Recommendation, "Recommendation");
has_many!(AnalysisDelegate, Analysis => reports, with_reports: Report, "Report");
belongs_to!(AnalysisDelegate, Analysis => client: ClientDelegate, Client, ClientWhereUnique::Id(client_id));

has_many!(TreasuryProductDelegate, TreasuryProduct => recommendations, with_recommendations: Recommendation,
    "Recommendation");
belongs_to!(RecommendationDelegate, Recommendation => analysis: AnalysisDelegate, Analysis,
    AnalysisWhereUnique::Id(analysis_id));
belongs_to!(RecommendationDelegate, Recommendation => product: TreasuryProductDelegate, TreasuryProduct,
    TreasuryProductWhereUnique::Id(product_id));

belongs_to!(ReportDelegate, Report => analysis: AnalysisDelegate, Analysis, AnalysisWhereUnique::Id(analysis_id));
belongs_to!(ReportDelegate, Report => client: ClientDelegate, Client, ClientWhereUnique::Id(client_id));

impl StatementFileDelegate<'_> {
    /// A statement file has at most one parse result.
    pub async fn parse_result(
        self,
        file: &crate::models::StatementFile,
    ) -> Result<Option<ParseResult>, Error> {
        ParseResultDelegate {
            target: self.target,
        }
        .find_unique(ParseResultWhereUnique::StatementFileId(file.id.clone()))
        .await
    }
}

impl ReportDelegate<'_> {
    /// Bumps `downloadCount` in place and returns the updated row.
    #[tracing::instrument(skip_all, fields(model = "Report"))]
    pub async fn record_download(self, filter: ReportWhereUnique) -> Result<Report, Error> {
        let (mut conn, log) = self.target.connect().await?;
        let updated: Option<Report> = execute!(
            log,
            diesel::update(reports::table)
                .filter(filter.to_condition())
                .set(reports::download_count.eq(reports::download_count + 1))
                .returning(Report::as_returning()),
            get_result(&mut *conn)
        )
        .optional()
        .classify(log, "Report")?;
        updated.ok_or_else(|| Error::not_found("Report"))
    }
}

impl TokenDelegate<'_> {
    /// A token of `token_type` that is neither blacklisted nor expired.
    #[tracing::instrument(skip_all, fields(model = "Token", token_type = %token_type))]
    pub async fn find_active(self, token: &str, token_type: TokenType) -> Result<Option<Token>, Error> {
        let now = jiff_diesel::Timestamp::from(jiff::Timestamp::now());
        let (mut conn, log) = self.target.connect().await?;
        let found: Option<Token> = execute!(
            log,
            tokens::table
                .filter(tokens::token.eq(token.to_owned()))
                .filter(tokens::token_type.eq(token_type))
                .filter(tokens::blacklisted.eq(false))
                .filter(tokens::expires.gt(now))
                .select(Token::as_select()),
            first(&mut *conn)
        )
        .optional()
        .classify(log, "Token")?;
        Ok(found)
    }

    /// Blacklists the user's live tokens, all of them or only those of
    /// `token_type`, returning how many changed.
    #[tracing::instrument(skip_all, fields(model = "Token", user_id = user_id))]
    pub async fn blacklist_for_user(
        self,
        user_id: i32,
        token_type: Option<TokenType>,
    ) -> Result<usize, Error> {
        let mut filter = TokenWhere {
            user_id: Some(user_id.into()),
            blacklisted: Some(false.into()),
            ..Default::default()
        };
        if let Some(token_type) = token_type {
            filter.token_type = Some(crate::filter::EnumFilter::equals(token_type));
        }
        let (mut conn, log) = self.target.connect().await?;
        let changed = execute!(
            log,
            diesel::update(tokens::table)
                .filter(filter.to_condition())
                .set(tokens::blacklisted.eq(true)),
            execute(&mut *conn)
        )
        .classify(log, "Token")?;
        Ok(changed)
    }

    /// Deletes up to `limit` tokens that expired before `now` or were
    /// blacklisted.
    pub async fn delete_stale(self, now: jiff::Timestamp, limit: i64) -> Result<usize, Error> {
        let filter = TokenWhere {
            or: Some(vec![
                TokenWhere {
                    expires: Some(crate::filter::DateTimeFilter::before(now)),
                    ..Default::default()
                },
                TokenWhere {
                    blacklisted: Some(true.into()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        self.delete_many(filter, Some(limit)).await
    }
}

impl SystemConfigDelegate<'_> {
    /// Creates or replaces the setting `key`, refreshing the store's
    /// settings cache once the write succeeds. Inside a transaction the
    /// cache is refreshed when it commits.
    pub async fn set(
        self,
        key: &str,
        value: serde_json::Value,
        updated_by: &str,
    ) -> Result<SystemConfig, Error> {
        let store = self.target.store();
        self.target.settings_written();
        let create = SystemConfigCreate {
            id: None,
            config_key: key.to_owned(),
            config_value: value.clone(),
            updated_at: None,
            updated_by: updated_by.to_owned(),
        };
        let update = SystemConfigUpdate {
            config_value: Some(value),
            updated_by: Some(updated_by.to_owned()),
            ..Default::default()
        };
        let row = self
            .upsert(SystemConfigWhereUnique::ConfigKey(key.to_owned()), create, update)
            .await?;
        if let Some(store) = store {
            store.settings.insert(&row.config_key, row.config_value.clone());
        }
        Ok(row)
    }
}
