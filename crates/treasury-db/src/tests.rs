use crate::{
    aggregate::{AggregateSelection, GroupOrderBy, Metric},
    filter::{IntFilter, StringFilter},
    models::*,
    query::{FindMany, OrderBy, SortOrder},
    raw::RawValue,
    *,
};
use diesel_async::{AsyncConnection, AsyncPgConnection, SimpleAsyncConnection};
use dotenvy::dotenv;
use std::{env, time::Duration};

const SCHEMA: &str = include_str!("../migrations/2025-06-01-000000_create_treasury_schema/up.sql");
const SCHEMA_LOCK: i64 = 7_305_001;

/// A store on `DATABASE_URL` with the schema applied, or `None` (the test
/// is skipped) when no database is configured.
pub async fn establish_store() -> Option<Store> {
    establish_store_with(|config| config).await
}

/// As [`establish_store`] with the pool settings adjusted by `configure`.
pub async fn establish_store_with(configure: impl FnOnce(Config) -> Config) -> Option<Store> {
    dotenv().ok();
    let database_url = env::var("DATABASE_URL").ok()?;
    let mut conn = AsyncPgConnection::establish(&database_url)
        .await
        .unwrap_or_else(|_| panic!("Error connecting to {}", database_url));
    conn.batch_execute(&format!(
        "SELECT pg_advisory_lock({SCHEMA_LOCK});\n{SCHEMA}\nSELECT pg_advisory_unlock({SCHEMA_LOCK});"
    ))
    .await
    .expect("schema should apply");
    Some(
        crate::create(&configure(Config::from_url(database_url)))
            .await
            .expect("store should be created"),
    )
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}

async fn new_client(store: &Store) -> Client {
    store
        .client()
        .create(ClientCreate {
            name: unique("Acme Treasury"),
            account_ids: vec!["ACC-1".into()],
            relationship_manager: "rm@bank.test".into(),
            status: "ACTIVE".into(),
            ..Default::default()
        })
        .await
        .expect("client should be created")
}

async fn new_statement_file(store: &Store, client: &Client, size: i32) -> StatementFile {
    store
        .statement_file()
        .create(StatementFileCreate {
            filename: unique("statement") + ".csv",
            file_type: "CSV".into(),
            size,
            status: "UPLOADED".into(),
            client_id: client.id.clone(),
            ..Default::default()
        })
        .await
        .expect("statement file should be created")
}

async fn new_user(store: &Store, email: String, name: Option<String>) -> User {
    store
        .user()
        .create(UserCreate {
            email,
            name,
            password: "hash".into(),
            ..Default::default()
        })
        .await
        .expect("user should be created")
}

fn file_of(client: &Client, id: &str, size: i32, status: &str) -> StatementFileCreate {
    StatementFileCreate {
        id: Some(id.to_owned()),
        filename: format!("{id}.csv"),
        file_type: "CSV".into(),
        size,
        status: status.into(),
        client_id: client.id.clone(),
        ..Default::default()
    }
}

fn parse_result_for(file: &StatementFile) -> ParseResultCreate {
    let now = jiff::Timestamp::now();
    ParseResultCreate {
        id: None,
        statement_file_id: file.id.clone(),
        total_transactions: 12,
        date_range_start: now,
        date_range_end: now,
        accounts: serde_json::json!([{ "accountId": "ACC-1" }]),
        status: "COMPLETED".into(),
        errors: None,
        created_at: None,
    }
}

mod user {
    use super::*;

    #[tokio::test]
    async fn it_creates_then_finds_the_same_user_with_defaults_applied() {
        let Some(store) = establish_store().await else {
            return;
        };
        let email = unique("ops") + "@bank.test";
        let created = store
            .user()
            .create(UserCreate {
                email: email.clone(),
                password: "$argon2id$v=19$placeholder".into(),
                ..Default::default()
            })
            .await
            .expect("should create user");
        assert!(created.id > 0, "should have been assigned an id number greater than 0");
        assert_eq!(created.role, Role::User, "role should default to USER");
        assert!(!created.is_email_verified, "email should start unverified");
        assert_eq!(created.name, None);

        let by_id = store
            .user()
            .find_unique(UserWhereUnique::Id(created.id))
            .await
            .expect("should query by id");
        assert_eq!(by_id.as_ref(), Some(&created));
        let by_email = store
            .user()
            .find_unique_or_throw(UserWhereUnique::Email(email))
            .await
            .expect("should find by email");
        assert_eq!(by_email, created);
    }

    #[tokio::test]
    async fn a_duplicate_email_is_a_unique_violation() {
        let Some(store) = establish_store().await else {
            return;
        };
        let data = UserCreate {
            email: unique("dup") + "@bank.test",
            password: "hash".into(),
            ..Default::default()
        };
        store.user().create(data.clone()).await.expect("first create");
        let err = store.user().create(data).await.expect_err("second create must fail");
        assert_eq!(err.code(), Some("P2002"));
    }

    #[tokio::test]
    async fn tokens_are_loaded_per_user_and_found_only_while_active() {
        let Some(store) = establish_store().await else {
            return;
        };
        let user = store
            .user()
            .create(UserCreate {
                email: unique("tokens") + "@bank.test",
                password: "hash".into(),
                ..Default::default()
            })
            .await
            .expect("should create user");
        let value = unique("refresh");
        let token = store
            .token()
            .create(TokenCreate {
                token: value.clone(),
                token_type: TokenType::Refresh,
                expires: jiff::Timestamp::now() + jiff::SignedDuration::from_hours(1),
                blacklisted: None,
                created_at: None,
                user_id: user.id,
            })
            .await
            .expect("should create token");

        let tokens = store.user().tokens(&user).await.expect("should load tokens");
        assert_eq!(tokens, vec![token.clone()]);
        let owner = store.token().user(&token).await.expect("should load owner");
        assert_eq!(owner.id, user.id);

        let active = store
            .token()
            .find_active(&value, TokenType::Refresh)
            .await
            .expect("should look up token");
        assert_eq!(active.map(|t| t.id), Some(token.id));
        let blacklisted = store
            .token()
            .blacklist_for_user(user.id, None)
            .await
            .expect("should blacklist");
        assert_eq!(blacklisted, 1);
        let active = store
            .token()
            .find_active(&value, TokenType::Refresh)
            .await
            .expect("should look up token");
        assert_eq!(active, None);
    }

    #[tokio::test]
    async fn cursor_pages_over_a_nullable_column_keep_the_unnamed_users() {
        let Some(store) = establish_store().await else {
            return;
        };
        let domain = unique("cursor") + ".test";
        let ada = new_user(&store, format!("ada@{domain}"), Some("a".into())).await;
        let bob = new_user(&store, format!("bob@{domain}"), Some("b".into())).await;
        let anon = new_user(&store, format!("anon@{domain}"), None).await;
        let of_domain = || UserWhere {
            email: Some(StringFilter {
                ends_with: Some(domain.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let ids = |users: Vec<User>| users.into_iter().map(|u| u.id).collect::<Vec<_>>();

        let ascending = store
            .user()
            .find_many(FindMany::new(of_domain()).order_by(OrderBy::asc(UserField::Name)))
            .await
            .expect("ascending page");
        assert_eq!(ids(ascending), vec![ada.id, bob.id, anon.id]);
        let from_ada = store
            .user()
            .find_many(
                FindMany::new(of_domain())
                    .order_by(OrderBy::asc(UserField::Name))
                    .cursor(UserWhereUnique::Id(ada.id)),
            )
            .await
            .expect("page from cursor");
        assert_eq!(ids(from_ada), vec![ada.id, bob.id, anon.id]);

        let from_bob = store
            .user()
            .find_many(
                FindMany::new(of_domain())
                    .order_by(OrderBy::desc(UserField::Name))
                    .cursor(UserWhereUnique::Id(bob.id)),
            )
            .await
            .expect("descending page from cursor");
        assert_eq!(ids(from_bob), vec![bob.id, ada.id]);

        let before_bob = store
            .user()
            .find_many(
                FindMany::new(of_domain())
                    .order_by(OrderBy::asc(UserField::Name))
                    .cursor(UserWhereUnique::Id(bob.id))
                    .take(-2),
            )
            .await
            .expect("backward page from cursor");
        assert_eq!(ids(before_bob), vec![ada.id, bob.id]);
    }

    #[tokio::test]
    async fn tokens_load_for_many_users_in_one_pass() {
        let Some(store) = establish_store().await else {
            return;
        };
        let with_token = new_user(&store, unique("holder") + "@bank.test", None).await;
        let without = new_user(&store, unique("empty") + "@bank.test", None).await;
        let token = store
            .token()
            .create(TokenCreate {
                token: unique("access"),
                token_type: TokenType::Access,
                expires: jiff::Timestamp::now() + jiff::SignedDuration::from_mins(5),
                blacklisted: None,
                created_at: None,
                user_id: with_token.id,
            })
            .await
            .expect("should create token");
        let loaded = store
            .user()
            .with_tokens(vec![without.clone(), with_token.clone()])
            .await
            .expect("batched relation loads");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].0.id, without.id);
        assert!(loaded[0].1.is_empty());
        assert_eq!(loaded[1].0.id, with_token.id);
        assert_eq!(loaded[1].1, vec![token]);
    }
}

mod client {
    use super::*;

    #[tokio::test]
    async fn update_of_a_missing_row_fails_while_upsert_creates_it() {
        let Some(store) = establish_store().await else {
            return;
        };
        let id = unique("client");
        let err = store
            .client()
            .update(
                ClientWhereUnique::Id(id.clone()),
                ClientUpdate {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("update of a missing row must fail");
        assert!(err.is_not_found(), "expected P2025, got {err:?}");

        let created = store
            .client()
            .upsert(
                ClientWhereUnique::Id(id.clone()),
                ClientCreate {
                    id: Some(id.clone()),
                    name: "Upserted".into(),
                    relationship_manager: "rm@bank.test".into(),
                    status: "ACTIVE".into(),
                    ..Default::default()
                },
                ClientUpdate {
                    name: Some("Updated".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("upsert should create");
        assert_eq!(created.id, id);
        assert_eq!(created.name, "Upserted");

        let updated = store
            .client()
            .upsert(
                ClientWhereUnique::Id(id.clone()),
                ClientCreate::default(),
                ClientUpdate {
                    name: Some("Updated".into()),
                    ..Default::default()
                },
            )
            .await
            .expect("upsert should update");
        assert_eq!(updated.name, "Updated");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn deleting_a_client_with_statement_files_is_rejected() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        new_statement_file(&store, &client, 100).await;
        let err = store
            .client()
            .delete(ClientWhereUnique::Id(client.id.clone()))
            .await
            .expect_err("delete must be restricted");
        assert_eq!(err.code(), Some("P2003"));
        assert!(store
            .client()
            .find_unique(ClientWhereUnique::Id(client.id))
            .await
            .expect("should query")
            .is_some());
    }

    #[tokio::test]
    async fn statement_files_page_forward_from_a_cursor() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        for size in [10, 20, 30, 40] {
            new_statement_file(&store, &client, size).await;
        }
        let of_client = || StatementFileWhere {
            client_id: Some(StringFilter::from(client.id.as_str())),
            ..Default::default()
        };
        let first_page = store
            .statement_file()
            .find_many(
                FindMany::new(of_client())
                    .order_by(OrderBy::asc(StatementFileField::Size))
                    .take(2),
            )
            .await
            .expect("first page");
        assert_eq!(first_page.iter().map(|f| f.size).collect::<Vec<_>>(), vec![10, 20]);

        let second_page = store
            .statement_file()
            .find_many(
                FindMany::new(of_client())
                    .order_by(OrderBy::asc(StatementFileField::Size))
                    .cursor(StatementFileWhereUnique::Id(first_page[1].id.clone()))
                    .skip(1)
                    .take(2),
            )
            .await
            .expect("second page");
        assert_eq!(second_page.iter().map(|f| f.size).collect::<Vec<_>>(), vec![30, 40]);

        let last = store
            .statement_file()
            .find_first(
                FindMany::new(of_client())
                    .order_by(OrderBy::asc(StatementFileField::Size))
                    .take(-1),
            )
            .await
            .expect("last row");
        assert_eq!(last.map(|f| f.size), Some(40));

        let files = store
            .client()
            .statement_files(&client)
            .await
            .expect("relation loads");
        assert_eq!(files.len(), 4);
    }

    #[tokio::test]
    async fn aggregates_and_groups_cover_the_filtered_rows() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        for size in [10, 20, 60] {
            new_statement_file(&store, &client, size).await;
        }
        let of_client = StatementFileWhere {
            client_id: Some(StringFilter::from(client.id.as_str())),
            ..Default::default()
        };
        let count = store
            .statement_file()
            .count(of_client.clone())
            .await
            .expect("count");
        assert_eq!(count, 3);

        let aggregates = store
            .statement_file()
            .aggregate(StatementFileAggregate::new(
                of_client.clone(),
                AggregateSelection {
                    count_all: true,
                    avg: vec![StatementFileField::Size],
                    sum: vec![StatementFileField::Size],
                    ..Default::default()
                },
            ))
            .await
            .expect("aggregate");
        assert_eq!(aggregates.count_all, Some(3));
        assert_eq!(aggregates.avg.get("size").copied().flatten(), Some(30.0));
        assert_eq!(aggregates.sum.get("size").copied().flatten(), Some(90));

        let mut group_by = StatementFileGroupBy::new(of_client, vec![StatementFileField::Status]);
        group_by.select.count_all = true;
        group_by.order_by.push(GroupOrderBy {
            metric: Metric::Field(StatementFileField::Status),
            direction: SortOrder::Asc,
        });
        let groups = store.statement_file().group_by(group_by).await.expect("group by");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].aggregates.count_all, Some(3));
    }

    #[tokio::test]
    async fn group_by_arguments_are_validated_before_querying() {
        let Some(store) = establish_store().await else {
            return;
        };
        let err = store
            .client()
            .group_by(ClientGroupBy::new(ClientWhere::default(), Vec::new()))
            .await
            .expect_err("empty by must be rejected");
        assert!(matches!(err, Error::Validation(_)));

        let mut group_by = ClientGroupBy::new(ClientWhere::default(), vec![ClientField::Status]);
        group_by.order_by.push(GroupOrderBy {
            metric: Metric::Field(ClientField::Name),
            direction: SortOrder::Desc,
        });
        let err = store
            .client()
            .group_by(group_by)
            .await
            .expect_err("order by outside of by must be rejected");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn create_many_skips_duplicates_only_when_asked() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        let [first, second, third, fourth] = [unique("file"), unique("file"), unique("file"), unique("file")];
        let written = store
            .statement_file()
            .create_many(
                vec![file_of(&client, &first, 1, "UPLOADED"), file_of(&client, &second, 2, "UPLOADED")],
                false,
            )
            .await
            .expect("both rows written");
        assert_eq!(written, 2);

        let err = store
            .statement_file()
            .create_many(vec![file_of(&client, &first, 1, "UPLOADED")], false)
            .await
            .expect_err("duplicate id must fail");
        assert_eq!(err.code(), Some("P2002"));

        let written = store
            .statement_file()
            .create_many(
                vec![file_of(&client, &first, 1, "UPLOADED"), file_of(&client, &third, 3, "UPLOADED")],
                true,
            )
            .await
            .expect("duplicate skipped");
        assert_eq!(written, 1);

        let created = store
            .statement_file()
            .create_many_and_return(
                vec![file_of(&client, &second, 2, "UPLOADED"), file_of(&client, &fourth, 4, "PARSED")],
                true,
            )
            .await
            .expect("duplicate skipped");
        assert_eq!(created.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), vec![fourth.as_str()]);
        assert_eq!(created[0].status, "PARSED");
        assert_eq!(created[0].client_id, client.id);
    }

    #[tokio::test]
    async fn distinct_keeps_the_first_row_of_each_value_in_order() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        let files = [(10, "UPLOADED"), (20, "UPLOADED"), (30, "PARSED"), (40, "PARSED"), (50, "FAILED")]
            .into_iter()
            .map(|(size, status)| file_of(&client, &unique("file"), size, status))
            .collect();
        store
            .statement_file()
            .create_many(files, false)
            .await
            .expect("rows written");
        let distinct = store
            .statement_file()
            .find_many(
                FindMany::new(StatementFileWhere {
                    client_id: Some(StringFilter::from(client.id.as_str())),
                    ..Default::default()
                })
                .order_by(OrderBy::asc(StatementFileField::Size))
                .distinct(StatementFileField::Status)
                .skip(1),
            )
            .await
            .expect("distinct rows");
        assert_eq!(distinct.iter().map(|f| f.size).collect::<Vec<_>>(), vec![30, 50]);
    }

    #[tokio::test]
    async fn bulk_updates_and_deletes_stop_at_the_limit() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        for size in [1, 2, 3, 4] {
            new_statement_file(&store, &client, size).await;
        }
        let of_client = || StatementFileWhere {
            client_id: Some(StringFilter::from(client.id.as_str())),
            ..Default::default()
        };
        let updated = store
            .statement_file()
            .update_many(
                of_client(),
                StatementFileUpdate {
                    status: Some("ARCHIVED".into()),
                    ..Default::default()
                },
                Some(2),
            )
            .await
            .expect("limited update");
        assert_eq!(updated, 2);
        let archived = store
            .statement_file()
            .count(StatementFileWhere {
                status: Some(StringFilter::from("ARCHIVED")),
                ..of_client()
            })
            .await
            .expect("count");
        assert_eq!(archived, 2);

        let deleted = store
            .statement_file()
            .delete_many(of_client(), Some(3))
            .await
            .expect("limited delete");
        assert_eq!(deleted, 3);
        assert_eq!(store.statement_file().count(of_client()).await.expect("count"), 1);

        let err = store
            .statement_file()
            .delete_many(of_client(), Some(-1))
            .await
            .expect_err("negative limit");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn statement_files_load_for_many_clients_in_one_pass() {
        let Some(store) = establish_store().await else {
            return;
        };
        let busy = new_client(&store).await;
        let idle = new_client(&store).await;
        for size in [5, 6] {
            new_statement_file(&store, &busy, size).await;
        }
        let loaded = store
            .client()
            .with_statement_files(vec![busy.clone(), idle.clone()])
            .await
            .expect("batched relation loads");
        assert_eq!(loaded[0].0, busy);
        assert_eq!(loaded[0].1.len(), 2);
        assert!(loaded[0].1.iter().all(|f| f.client_id == busy.id));
        assert_eq!(loaded[1].0, idle);
        assert!(loaded[1].1.is_empty());
    }
}

mod parse_result {
    use super::*;

    #[tokio::test]
    async fn a_second_parse_result_for_one_statement_file_is_a_unique_violation() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        let file = new_statement_file(&store, &client, 1).await;
        let first = store
            .parse_result()
            .create(parse_result_for(&file))
            .await
            .expect("first parse result");
        let err = store
            .parse_result()
            .create(parse_result_for(&file))
            .await
            .expect_err("second parse result must fail");
        assert_eq!(err.code(), Some("P2002"));

        let loaded = store
            .statement_file()
            .parse_result(&file)
            .await
            .expect("relation loads");
        assert_eq!(loaded.map(|p| p.id), Some(first.id));
    }
}

mod transaction {
    use super::*;

    #[tokio::test]
    async fn an_error_rolls_back_every_write_of_the_transaction() {
        let Some(store) = establish_store().await else {
            return;
        };
        let name = unique("Rolled back");
        let result: Result<(), Error> = store
            .transaction(TransactionOptions::default(), |mut tx| {
                let name = name.clone();
                async move {
                    tx.client()
                        .create(ClientCreate {
                            name,
                            relationship_manager: "rm@bank.test".into(),
                            status: "ACTIVE".into(),
                            ..Default::default()
                        })
                        .await?;
                    Err(Error::validation("abort"))
                }
                .scope_boxed()
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        let count = store
            .client()
            .count(ClientWhere {
                name: Some(StringFilter::from(name.as_str())),
                ..Default::default()
            })
            .await
            .expect("count");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn a_timed_out_transaction_leaves_the_pool_usable() {
        let Some(store) = establish_store_with(|config| Config {
            max_open: 1,
            max_idle: 1,
            ..config
        })
        .await
        else {
            return;
        };
        let abandoned = unique("Abandoned");
        let result: Result<(), Error> = store
            .transaction(
                TransactionOptions::default().timeout(Duration::from_millis(200)),
                |mut tx| {
                    let name = abandoned.clone();
                    async move {
                        tx.client()
                            .create(ClientCreate {
                                name,
                                relationship_manager: "rm@bank.test".into(),
                                status: "ACTIVE".into(),
                                ..Default::default()
                            })
                            .await?;
                        tokio::time::sleep(Duration::from_millis(800)).await;
                        Ok(())
                    }
                    .scope_boxed()
                },
            )
            .await;
        let err = result.expect_err("transaction must time out");
        assert_eq!(err.code(), Some("P2028"));

        let after = new_client(&store).await;
        let Some(observer) = establish_store().await else {
            return;
        };
        let visible = observer
            .client()
            .find_unique(ClientWhereUnique::Id(after.id.clone()))
            .await
            .expect("query from another pool");
        assert_eq!(visible.map(|c| c.id), Some(after.id));
        let leaked = observer
            .client()
            .count(ClientWhere {
                name: Some(StringFilter::from(abandoned.as_str())),
                ..Default::default()
            })
            .await
            .expect("count");
        assert_eq!(leaked, 0);
    }

    #[tokio::test]
    async fn waiting_too_long_for_a_connection_fails_fast() {
        let Some(store) = establish_store_with(|config| Config {
            max_open: 1,
            max_idle: 1,
            ..config
        })
        .await
        else {
            return;
        };
        let held = store.connection().await.expect("the only connection");
        let result: Result<(), Error> = store
            .transaction(
                TransactionOptions::default().max_wait(Duration::from_millis(100)),
                |_tx| async move { Ok(()) }.scope_boxed(),
            )
            .await;
        let err = result.expect_err("no connection within max wait");
        assert_eq!(err.code(), Some("P2028"));
        drop(held);
        assert!(store.client().count(ClientWhere::default()).await.is_ok());
    }

    #[tokio::test]
    async fn settings_written_in_a_transaction_are_cached_after_commit() {
        let Some(store) = establish_store().await else {
            return;
        };
        let committed = unique("committed");
        let rolled_back = unique("rolled-back");
        store
            .transaction(TransactionOptions::default(), |mut tx| {
                let key = committed.clone();
                async move {
                    tx.system_config().set(&key, serde_json::json!(7), "admin").await?;
                    Ok(())
                }
                .scope_boxed()
            })
            .await
            .expect("commit");
        assert_eq!(store.settings().get(&committed), Some(serde_json::json!(7)));

        let result: Result<(), Error> = store
            .transaction(TransactionOptions::default(), |mut tx| {
                let key = rolled_back.clone();
                async move {
                    tx.system_config().set(&key, serde_json::json!(8), "admin").await?;
                    Err(Error::validation("abort"))
                }
                .scope_boxed()
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.settings().get(&rolled_back), None);
    }

    #[tokio::test]
    async fn raw_queries_accept_data_modifying_statements_with_returning() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        let rows = store
            .query_raw(
                "UPDATE treasury.clients SET status = $1 WHERE id = $2 RETURNING id, status",
                vec!["SUSPENDED".into(), client.id.as_str().into()],
            )
            .await
            .expect("update returning");
        assert_eq!(rows, vec![serde_json::json!({ "id": client.id, "status": "SUSPENDED" })]);
    }

    #[tokio::test]
    async fn raw_queries_return_json_rows() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        let rows = store
            .query_raw(
                "SELECT id, name FROM treasury.clients WHERE id = $1",
                vec![RawValue::from(client.id.as_str())],
            )
            .await
            .expect("raw query");
        assert_eq!(rows, vec![serde_json::json!({ "id": client.id, "name": client.name })]);

        let changed = store
            .execute_raw(
                "UPDATE treasury.clients SET status = $1 WHERE id = $2",
                vec!["SUSPENDED".into(), client.id.as_str().into()],
            )
            .await
            .expect("raw statement");
        assert_eq!(changed, 1);
    }
}

mod system_config {
    use super::*;

    #[tokio::test]
    async fn set_upserts_by_key_and_refreshes_the_cache() {
        let Some(store) = establish_store().await else {
            return;
        };
        let key = unique("retention-days");
        store
            .system_config()
            .set(&key, serde_json::json!(30), "admin")
            .await
            .expect("first set");
        let row = store
            .system_config()
            .set(&key, serde_json::json!(45), "admin")
            .await
            .expect("second set");
        assert_eq!(row.config_value, serde_json::json!(45));
        assert_eq!(store.settings().get_as::<u32>(&key).ok().flatten(), Some(45));
        let stored = store
            .system_config()
            .count(SystemConfigWhere {
                config_key: Some(StringFilter::from(key.as_str())),
                ..Default::default()
            })
            .await
            .expect("count");
        assert_eq!(stored, 1);
    }
}

mod report {
    use super::*;

    #[tokio::test]
    async fn downloads_are_counted_in_place() {
        let Some(store) = establish_store().await else {
            return;
        };
        let client = new_client(&store).await;
        let analysis = store
            .analysis()
            .create(AnalysisCreate {
                id: None,
                client_id: client.id.clone(),
                statement_file_ids: Vec::new(),
                created_at: None,
                status: "COMPLETED".into(),
                summary: serde_json::json!({}),
                liquidity_metrics: serde_json::json!({}),
                spending_breakdown: serde_json::json!({}),
                idle_balance_analysis: serde_json::json!({}),
            })
            .await
            .expect("analysis");
        let report = store
            .report()
            .create(ReportCreate {
                id: None,
                title: "Quarterly liquidity".into(),
                analysis_id: analysis.id.clone(),
                client_id: client.id.clone(),
                format: "PDF".into(),
                template: "standard".into(),
                created_at: None,
                created_by: "rm@bank.test".into(),
                file_size: 2048,
                download_count: None,
                status: "READY".into(),
                file_path: None,
            })
            .await
            .expect("report");
        assert_eq!(report.download_count, 0);
        let report = store
            .report()
            .record_download(ReportWhereUnique::Id(report.id))
            .await
            .expect("download recorded");
        assert_eq!(report.download_count, 1);

        let with_reports = store
            .analysis()
            .with_reports(vec![analysis])
            .await
            .expect("batched relation loads");
        assert_eq!(with_reports[0].1.len(), 1);

        let missing = store
            .report()
            .record_download(ReportWhereUnique::Id(unique("missing")))
            .await
            .expect_err("missing report");
        assert!(missing.is_not_found());
        let big = store
            .report()
            .count(ReportWhere {
                file_size: Some(IntFilter {
                    gte: Some(2048),
                    ..Default::default()
                }),
                client_id: Some(StringFilter::from(client.id.as_str())),
                ..Default::default()
            })
            .await
            .expect("count");
        assert_eq!(big, 1);
    }
}
