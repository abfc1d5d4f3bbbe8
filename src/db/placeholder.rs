//! Placeholder counting and dialect rewriting.
//!
//! Every statement in the crate is written with `?` placeholders and
//! backtick-quoted identifiers. MySQL and SQLite accept that as is;
//! PostgreSQL needs `$1, $2, ...` and double-quoted identifiers.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;

/// Number of `?` placeholders outside quoted strings and identifiers.
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    scan(sql, |token| {
        if let Token::Placeholder = token {
            count += 1;
        }
    });
    count
}

/// Check arity and rewrite `sql` for the target backend.
pub fn prepare(sql: &str, args_len: usize, db_type: DatabaseType) -> DbResult<String> {
    let expected = count_placeholders(sql);
    if expected != args_len {
        return Err(DbError::binding(format!(
            "statement has {} placeholder(s) but {} argument(s) were given: {}",
            expected, args_len, sql
        )));
    }

    match db_type {
        DatabaseType::PostgreSQL => Ok(rewrite_postgres(sql)),
        DatabaseType::MySQL | DatabaseType::SQLite => Ok(sql.to_string()),
    }
}

fn rewrite_postgres(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    scan(sql, |token| match token {
        Token::Placeholder => {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        }
        Token::IdentQuote => out.push('"'),
        Token::Char(c) => out.push(c),
    });
    out
}

enum Token {
    Placeholder,
    /// Opening or closing backtick of an identifier.
    IdentQuote,
    Char(char),
}

fn scan(sql: &str, mut emit: impl FnMut(Token)) {
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (None, '?') => emit(Token::Placeholder),
            (None, '`') => {
                quote = Some('`');
                emit(Token::IdentQuote);
            }
            (None, '\'' | '"') => {
                quote = Some(c);
                emit(Token::Char(c));
            }
            (Some('`'), '`') => {
                quote = None;
                emit(Token::IdentQuote);
            }
            (Some(q), c) if q == c => {
                // A doubled quote re-opens immediately, so escapes need no special case.
                quote = None;
                emit(Token::Char(c));
            }
            (_, c) => emit(Token::Char(c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_ignores_quoted_marks() {
        assert_eq!(count_placeholders("SELECT 1"), 0);
        assert_eq!(count_placeholders("UPDATE `t` SET `a`=?,`b`=? WHERE `id`=?"), 3);
        assert_eq!(count_placeholders("SELECT * FROM t WHERE a='?' AND b=?"), 1);
        assert_eq!(count_placeholders("SELECT \"what?\" FROM t"), 0);
        assert_eq!(count_placeholders("SELECT `odd?col` FROM t WHERE x=?"), 1);
        assert_eq!(count_placeholders("SELECT 'it''s?' , ?"), 1);
    }

    #[test]
    fn test_arity_mismatch_is_binding_error() {
        let err = prepare("SELECT * FROM t WHERE id=?", 0, DatabaseType::MySQL).unwrap_err();
        assert!(matches!(err, DbError::Binding { .. }));

        let err = prepare("SELECT * FROM t", 2, DatabaseType::SQLite).unwrap_err();
        assert!(matches!(err, DbError::Binding { .. }));
    }

    #[test]
    fn test_mysql_and_sqlite_unchanged() {
        let sql = "INSERT INTO `blogs` (`name`,`id`) VALUES (?,?)";
        assert_eq!(prepare(sql, 2, DatabaseType::MySQL).unwrap(), sql);
        assert_eq!(prepare(sql, 2, DatabaseType::SQLite).unwrap(), sql);
    }

    #[test]
    fn test_postgres_rewrite() {
        let sql = "UPDATE `users` SET `name`=?,`note`='keep `this` and ?' WHERE `id`=?";
        assert_eq!(
            prepare(sql, 2, DatabaseType::PostgreSQL).unwrap(),
            "UPDATE \"users\" SET \"name\"=$1,\"note\"='keep `this` and ?' WHERE \"id\"=$2"
        );
    }

    #[test]
    fn test_postgres_limit_offset() {
        let sql = "SELECT `id` FROM `t` ORDER BY `id` OFFSET ? LIMIT ?";
        assert_eq!(
            prepare(sql, 2, DatabaseType::PostgreSQL).unwrap(),
            "SELECT \"id\" FROM \"t\" ORDER BY \"id\" OFFSET $1 LIMIT $2"
        );
    }
}
