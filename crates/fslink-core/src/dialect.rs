//! SQL dialects.
//!
//! Each backend exposes one [`SqlDialect`] that supplies the statement
//! templates the engine needs. Analyses never branch on the backend type;
//! they ask the dialect.

use sqlparser::dialect::{
    Dialect, DuckDbDialect as SpDuckDb, PostgreSqlDialect, SQLiteDialect as SpSqlite,
};

/// Statement templates for one SQL dialect.
pub trait SqlDialect: Send + Sync {
    /// Dialect name used in logs.
    fn name(&self) -> &'static str;

    /// Parser dialect used to reformat statements in error messages.
    fn parser_dialect(&self) -> Box<dyn Dialect>;

    /// Statement that materialises `sql` as a table named `physical_name`.
    fn create_table_as(&self, physical_name: &str, sql: &str) -> String {
        format!("CREATE TABLE {} AS {}", physical_name, sql)
    }

    /// Statement that drops a table if present.
    fn drop_table_if_exists(&self, physical_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", physical_name)
    }

    /// Floating point type name for casts.
    fn float_type(&self) -> &'static str {
        "float"
    }

    /// Quote an identifier.
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Quote a string literal.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Concatenate string expressions.
    fn concat(&self, parts: &[String]) -> String {
        parts.join(" || ")
    }
}

/// SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn parser_dialect(&self) -> Box<dyn Dialect> {
        Box::new(SpSqlite {})
    }

    fn float_type(&self) -> &'static str {
        "real"
    }
}

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn parser_dialect(&self) -> Box<dyn Dialect> {
        Box::new(PostgreSqlDialect {})
    }

    fn float_type(&self) -> &'static str {
        "float8"
    }
}

/// DuckDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDialect;

impl SqlDialect for DuckDbDialect {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn parser_dialect(&self) -> Box<dyn Dialect> {
        Box::new(SpDuckDb {})
    }

    fn create_table_as(&self, physical_name: &str, sql: &str) -> String {
        format!("CREATE OR REPLACE TABLE {} AS {}", physical_name, sql)
    }

    fn float_type(&self) -> &'static str {
        "double"
    }
}

/// Whether `name` can be used unquoted as a table name.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        let d = SqliteDialect;
        assert_eq!(d.quote_identifier("first name"), "\"first name\"");
        assert_eq!(d.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(d.quote_literal("o'neil"), "'o''neil'");
    }

    #[test]
    fn test_create_table_templates_differ() {
        assert_eq!(
            SqliteDialect.create_table_as("t_1", "select 1"),
            "CREATE TABLE t_1 AS select 1"
        );
        assert_eq!(
            DuckDbDialect.create_table_as("t_1", "select 1"),
            "CREATE OR REPLACE TABLE t_1 AS select 1"
        );
        assert_eq!(PostgresDialect.float_type(), "float8");
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("__fslink__df_concat"));
        assert!(is_plain_identifier("df_left2"));
        assert!(!is_plain_identifier("2df"));
        assert!(!is_plain_identifier("df-left"));
        assert!(!is_plain_identifier(""));
    }
}
