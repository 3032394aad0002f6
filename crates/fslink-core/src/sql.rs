//! Statement formatting helpers.

use std::ops::ControlFlow;

use sqlparser::ast::visit_relations;
use sqlparser::parser::Parser;
use tracing::warn;

use crate::dialect::SqlDialect;

/// Reformat a statement for error messages.
///
/// Best effort: if the statement cannot be parsed in the given dialect the
/// raw text is returned unchanged.
pub fn reformat_statement(sql: &str, dialect: &dyn SqlDialect) -> String {
    let parser_dialect = dialect.parser_dialect();
    match Parser::parse_sql(parser_dialect.as_ref(), sql) {
        Ok(statements) if !statements.is_empty() => statements
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(";\n"),
        Ok(_) => sql.to_string(),
        Err(e) => {
            warn!(error = %e, dialect = dialect.name(), "could not reformat statement");
            sql.to_string()
        }
    }
}

/// Whether a statement reads from `table`.
///
/// Relations are collected from the parsed statement; CTE names count as
/// reads too, so the answer errs towards `true`. Statements the dialect
/// cannot parse fall back to a whole-word search.
pub fn reads_table(sql: &str, table: &str, dialect: &dyn SqlDialect) -> bool {
    let parser_dialect = dialect.parser_dialect();
    match Parser::parse_sql(parser_dialect.as_ref(), sql) {
        Ok(statements) => visit_relations(&statements, |name| match name.0.last() {
            Some(ident) if ident.value.eq_ignore_ascii_case(table) => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        })
        .is_break(),
        Err(_) => mentions_word(sql, table),
    }
}

fn mentions_word(sql: &str, word: &str) -> bool {
    let sql = sql.to_ascii_lowercase();
    let word = word.to_ascii_lowercase();
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    sql.match_indices(&word).any(|(i, _)| {
        let before = sql[..i].chars().next_back();
        let after = sql[i + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;

    #[test]
    fn test_reformat_normalises_whitespace() {
        let sql = "select   a,\n\n   b   from t";
        assert_eq!(reformat_statement(sql, &SqliteDialect), "SELECT a, b FROM t");
    }

    #[test]
    fn test_unparseable_statement_kept_raw() {
        let sql = "selec a frm t";
        assert_eq!(reformat_statement(sql, &SqliteDialect), sql);
    }

    #[test]
    fn test_reads_table() {
        let sql = "with\nfiltered as (\nselect * from people where id < 3\n)\nselect * from filtered";
        assert!(reads_table(sql, "people", &SqliteDialect));
        assert!(reads_table(sql, "PEOPLE", &SqliteDialect));
        assert!(!reads_table(sql, "people_2", &SqliteDialect));
        assert!(!reads_table("select 1 as people", "people", &SqliteDialect));
    }

    #[test]
    fn test_reads_table_unparseable_falls_back_to_words() {
        assert!(reads_table("selec * frm people", "people", &SqliteDialect));
        assert!(!reads_table("selec * frm people_2", "people", &SqliteDialect));
    }
}
