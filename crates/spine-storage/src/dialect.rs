//! The `Dialect` abstraction (spec.md §4.1): the core never formats
//! placeholders literally — all SQL is parameterised through `dialect.ph(n)`.

/// Answers the four questions a query-builder needs to target either
/// backend: placeholder style, identifier quoting, upsert clause, and the
/// `now()` expression. Grounded in spec.md §9 "SQL dialect differences":
/// SQLite uses `?` and TEXT for JSON; PostgreSQL uses `$n` and JSONB.
pub trait Dialect: Send + Sync {
    /// Placeholder for the `n`-th bound parameter (1-indexed).
    fn ph(&self, n: usize) -> String;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{ident}\"")
    }

    /// `INSERT ... ON CONFLICT (cols) DO UPDATE SET ...` clause, built from
    /// the conflict columns and the assignment fragments to upsert.
    fn upsert_clause(&self, conflict_cols: &[&str], set_exprs: &[String]) -> String;

    fn now_expr(&self) -> &'static str;

    fn name(&self) -> &'static str;
}

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn ph(&self, _n: usize) -> String {
        "?".to_string()
    }

    fn upsert_clause(&self, conflict_cols: &[&str], set_exprs: &[String]) -> String {
        format!(
            "ON CONFLICT({}) DO UPDATE SET {}",
            conflict_cols.join(", "),
            set_exprs.join(", ")
        )
    }

    fn now_expr(&self) -> &'static str {
        "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn ph(&self, n: usize) -> String {
        format!("${n}")
    }

    fn upsert_clause(&self, conflict_cols: &[&str], set_exprs: &[String]) -> String {
        format!(
            "ON CONFLICT({}) DO UPDATE SET {}",
            conflict_cols.join(", "),
            set_exprs.join(", ")
        )
    }

    fn now_expr(&self) -> &'static str {
        "now()"
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_always_uses_question_mark() {
        let d = SqliteDialect;
        assert_eq!(d.ph(1), "?");
        assert_eq!(d.ph(7), "?");
    }

    #[test]
    fn postgres_uses_positional_dollar_placeholders() {
        let d = PostgresDialect;
        assert_eq!(d.ph(1), "$1");
        assert_eq!(d.ph(3), "$3");
    }
}
