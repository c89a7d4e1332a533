//! SQLite schema reader integration tests.
//!
//! This test suite covers:
//! - Table and column enumeration from sqlite_master and PRAGMA table_info
//! - Nullability, ordinal positions and key flags
//! - Bounded sampling reduced to shape digests
//! - Identifier quoting for awkward table and column names
//!
//! Note: SQLite tests use in-memory databases, so no containers needed.

#![cfg(feature = "sqlite")]

use privsurvey_core::{
    Result,
    config::SamplingConfig,
    schema::{SchemaReader, SqliteSchemaReader, create_reader},
};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Single-connection pool so every query sees the same in-memory database
async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite")
}

async fn execute(pool: &SqlitePool, statements: &[&str]) {
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .expect("Failed to run setup statement");
    }
}

async fn users_pool() -> SqlitePool {
    let pool = memory_pool().await;
    execute(
        &pool,
        &[
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                nickname VARCHAR(40),
                last_login TIMESTAMP
            )",
            "INSERT INTO users (email, nickname, last_login) VALUES
                ('a@example.com', 'Bob', '2024-01-01 10:00:00'),
                ('b@example.com', 'Alice', NULL)",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, total NUMERIC)",
        ],
    )
    .await;
    pool
}

#[tokio::test]
async fn test_read_empty_database() -> Result<()> {
    let reader = SqliteSchemaReader::from_pool(memory_pool().await, "empty", SamplingConfig::default());
    let schema = reader.read_schema().await?;
    assert_eq!(schema.database_name(), "empty");
    assert!(schema.tables().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_read_tables_and_columns() -> Result<()> {
    let reader = SqliteSchemaReader::from_pool(users_pool().await, "app", SamplingConfig::default());
    let schema = reader.read_schema().await?;

    let names: Vec<&str> = schema.tables().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["orders", "users"]);

    let users = &schema.tables()[1];
    let columns: Vec<&str> = users.columns.iter().map(|c| c.name()).collect();
    assert_eq!(columns, vec!["id", "email", "nickname", "last_login"]);

    let email = &users.columns[1];
    assert_eq!(email.declared_type(), "TEXT");
    assert!(!email.is_nullable());
    assert_eq!(email.ordinal_position(), 2);

    let nickname = &users.columns[2];
    assert_eq!(nickname.declared_type(), "VARCHAR(40)");
    assert!(nickname.is_nullable());
    Ok(())
}

#[tokio::test]
async fn test_key_flags_from_primary_key_and_unique_indexes() -> Result<()> {
    let pool = memory_pool().await;
    execute(
        &pool,
        &[
            "CREATE TABLE accounts (
                id INTEGER PRIMARY KEY,
                handle TEXT UNIQUE,
                region TEXT,
                branch TEXT,
                notes TEXT
            )",
            "CREATE UNIQUE INDEX accounts_region_branch ON accounts (region, branch)",
        ],
    )
    .await;
    let reader = SqliteSchemaReader::from_pool(pool, "app", SamplingConfig::default());
    let schema = reader.read_schema().await?;
    let accounts = &schema.tables()[0];

    let flags: Vec<(&str, bool, bool)> = accounts
        .columns
        .iter()
        .map(|c| (c.name(), c.is_primary_key(), c.is_unique()))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("id", true, true),
            ("handle", false, true),
            ("region", false, false),
            ("branch", false, false),
            ("notes", false, false),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_sampling_produces_digests() -> Result<()> {
    let reader = SqliteSchemaReader::from_pool(users_pool().await, "app", SamplingConfig::default());
    let schema = reader.read_schema().await?;
    let users = &schema.tables()[1];

    let nickname = &users.columns[2];
    assert!(nickname.sample_digest().is_some());
    // Empty table yields no digest
    let orders_total = &schema.tables()[0].columns[1];
    assert!(orders_total.sample_digest().is_none());
    Ok(())
}

#[tokio::test]
async fn test_digest_does_not_contain_values() -> Result<()> {
    let reader = SqliteSchemaReader::from_pool(users_pool().await, "app", SamplingConfig::default());
    let schema = reader.read_schema().await?;
    let serialized = serde_json::to_string(&schema).expect("schema serializes");
    assert!(!serialized.contains("example.com"));
    assert!(!serialized.contains("Alice"));
    Ok(())
}

#[tokio::test]
async fn test_sampling_disabled() -> Result<()> {
    let reader = SqliteSchemaReader::from_pool(
        users_pool().await,
        "app",
        SamplingConfig::default().with_sample_size(0),
    );
    let schema = reader.read_schema().await?;
    assert!(schema.columns().all(|c| c.sample_digest().is_none()));
    Ok(())
}

#[tokio::test]
async fn test_quoted_identifiers() -> Result<()> {
    let pool = memory_pool().await;
    execute(
        &pool,
        &[
            r#"CREATE TABLE "user ""profile""" ("first name" TEXT, "select" TEXT)"#,
            r#"INSERT INTO "user ""profile""" VALUES ('Ann', 'x')"#,
        ],
    )
    .await;

    let reader = SqliteSchemaReader::from_pool(pool, "app", SamplingConfig::default());
    let schema = reader.read_schema().await?;
    let table = &schema.tables()[0];
    assert_eq!(table.name, "user \"profile\"");
    assert_eq!(table.columns[0].name(), "first name");
    assert!(table.columns[0].sample_digest().is_some());
    assert_eq!(table.columns[1].name(), "select");
    Ok(())
}

#[tokio::test]
async fn test_create_reader_opens_file_database() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("crm.db");
    let url = format!("sqlite://{}?mode=rwc", path.display());
    {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .expect("Failed to create database file");
        execute(&pool, &["CREATE TABLE contacts (phone TEXT)"]).await;
        pool.close().await;
    }

    let reader = create_reader(&path.display().to_string(), &SamplingConfig::default()).await?;
    let schema = reader.read_schema().await?;
    assert_eq!(schema.database_name(), "crm");
    assert_eq!(schema.column_count(), 1);
    assert!(reader.source_description().contains("SQLite"));
    Ok(())
}
