//! Blocking rules.

use std::ops::ControlFlow;

use serde::Serialize;
use sqlparser::ast::{visit_expressions, visit_expressions_mut, BinaryOperator, Expr};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use tracing::debug;

use crate::dialect::SqlDialect;

/// Which side of a pair an expression reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// A predicate over a left record `l` and a right record `r`.
///
/// Equi-join keys are extracted best effort from top-level `AND`-ed
/// equalities whose sides each read from only one record, e.g.
/// `l.surname = r.surname AND substr(l.dob, 1, 4) = substr(r.dob, 1, 4)`.
/// Anything else is kept in the predicate but contributes no key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingRule {
    predicate: String,
    equi_join_keys: Vec<(String, String)>,
    has_residual: bool,
}

impl BlockingRule {
    /// Parse a rule in the given dialect.
    pub fn new(predicate: impl Into<String>, dialect: &dyn SqlDialect) -> Self {
        let predicate = predicate.into();
        let (equi_join_keys, has_residual) = match parse_predicate(&predicate, dialect) {
            Some(expr) => extract_keys(expr),
            None => {
                debug!(rule = %predicate, "blocking rule not parsed; no join keys extracted");
                (Vec::new(), true)
            }
        };
        Self {
            predicate,
            equi_join_keys,
            has_residual,
        }
    }

    /// The predicate text.
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// `(left_key, right_key)` expressions with the `l.`/`r.` qualifiers removed.
    pub fn equi_join_keys(&self) -> &[(String, String)] {
        &self.equi_join_keys
    }

    /// Whether the rule contains conditions other than equi-joins.
    pub fn has_residual(&self) -> bool {
        self.has_residual
    }
}

impl std::fmt::Display for BlockingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.predicate)
    }
}

fn parse_predicate(predicate: &str, dialect: &dyn SqlDialect) -> Option<Expr> {
    let parser_dialect = dialect.parser_dialect();
    let mut parser = Parser::new(parser_dialect.as_ref())
        .try_with_sql(predicate)
        .ok()?;
    let expr = parser.parse_expr().ok()?;
    // Trailing tokens mean the predicate was not a single expression
    if parser.peek_token().token != Token::EOF {
        return None;
    }
    Some(expr)
}

fn extract_keys(expr: Expr) -> (Vec<(String, String)>, bool) {
    let mut conjuncts = Vec::new();
    split_conjuncts(expr, &mut conjuncts);

    let mut keys = Vec::new();
    let mut has_residual = false;
    for conjunct in conjuncts {
        match equi_join_pair(conjunct) {
            Some(pair) => keys.push(pair),
            None => has_residual = true,
        }
    }
    (keys, has_residual)
}

fn split_conjuncts(expr: Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            split_conjuncts(*left, out);
            split_conjuncts(*right, out);
        }
        Expr::Nested(inner) => split_conjuncts(*inner, out),
        other => out.push(other),
    }
}

fn equi_join_pair(expr: Expr) -> Option<(String, String)> {
    let (left, right) = match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => (*left, *right),
        _ => return None,
    };

    match (side_of(&left)?, side_of(&right)?) {
        (Side::Left, Side::Right) => Some((unqualified(left), unqualified(right))),
        (Side::Right, Side::Left) => Some((unqualified(right), unqualified(left))),
        _ => None,
    }
}

/// The single record an expression reads from, if there is exactly one.
fn side_of(expr: &Expr) -> Option<Side> {
    let mut side = None;
    let flow = visit_expressions(expr, |e| {
        let this = match e {
            Expr::CompoundIdentifier(parts) if parts.len() == 2 => {
                match parts[0].value.to_ascii_lowercase().as_str() {
                    "l" => Side::Left,
                    "r" => Side::Right,
                    _ => return ControlFlow::Break(()),
                }
            }
            Expr::CompoundIdentifier(_) | Expr::Identifier(_) => return ControlFlow::Break(()),
            _ => return ControlFlow::Continue(()),
        };
        match side {
            Some(s) if s != this => ControlFlow::Break(()),
            _ => {
                side = Some(this);
                ControlFlow::Continue(())
            }
        }
    });
    if flow.is_break() {
        return None;
    }
    side
}

fn unqualified(mut expr: Expr) -> String {
    let _ = visit_expressions_mut(&mut expr, |e| {
        if let Expr::CompoundIdentifier(parts) = e {
            if let Some(column) = parts.last() {
                *e = Expr::Identifier(column.clone());
            }
        }
        ControlFlow::<()>::Continue(())
    });
    expr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;

    fn rule(sql: &str) -> BlockingRule {
        BlockingRule::new(sql, &SqliteDialect)
    }

    #[test]
    fn test_simple_equi_join() {
        let r = rule("l.postcode = r.postcode");
        assert_eq!(r.equi_join_keys(), &[("postcode".to_string(), "postcode".to_string())]);
        assert!(!r.has_residual());

        // Quoted columns keep their quotes
        let r = rule(r#"l."post code" = r."post code""#);
        assert_eq!(
            r.equi_join_keys(),
            &[(r#""post code""#.to_string(), r#""post code""#.to_string())]
        );
        assert!(!r.has_residual());
    }

    #[test]
    fn test_swapped_sides_and_functions() {
        let r = rule("r.surname = l.surname and substr(l.dob, 1, 4) = substr(r.dob, 1, 4)");
        assert_eq!(
            r.equi_join_keys(),
            &[
                ("surname".to_string(), "surname".to_string()),
                ("substr(dob, 1, 4)".to_string(), "substr(dob, 1, 4)".to_string()),
            ]
        );
    }

    #[test]
    fn test_residual_conditions() {
        let r = rule("l.city = r.city and l.age > r.age");
        assert_eq!(r.equi_join_keys().len(), 1);
        assert!(r.has_residual());

        let r = rule("l.first_name = r.surname or l.surname = r.first_name");
        assert!(r.equi_join_keys().is_empty());
        assert!(r.has_residual());
    }

    #[test]
    fn test_no_keys() {
        let r = rule("1=1");
        assert!(r.equi_join_keys().is_empty());

        // Both sides reading from the same record is not a join key
        let r = rule("l.a = l.b");
        assert!(r.equi_join_keys().is_empty());
    }

    #[test]
    fn test_unparseable_rule_kept() {
        let r = rule("l.a = = r.a");
        assert_eq!(r.predicate(), "l.a = = r.a");
        assert!(r.equi_join_keys().is_empty());
        assert!(r.has_residual());
    }
}
