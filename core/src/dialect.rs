//! Dialect type re-exported from basemodel-types with core-specific extensions.

use std::borrow::Cow;
use std::fmt::Write;

pub use basemodel_types::Dialect;

/// Extension trait for dialect-specific rendering
pub trait DialectExt {
    /// Renders a placeholder for this dialect with the given 1-based index.
    ///
    /// - PostgreSQL: `$1`, `$2`
    /// - MSSQL: `@p1`, `@p2`
    /// - SQLite/MySQL: `?`
    fn render_placeholder(&self, index: usize) -> Cow<'static, str>;

    /// Writes a quoted identifier.
    ///
    /// - PostgreSQL/SQLite: `"name"`
    /// - MySQL: `` `name` ``
    /// - MSSQL: `[name]`
    fn write_ident(&self, buf: &mut String, name: &str);
}

impl DialectExt for Dialect {
    #[inline]
    fn render_placeholder(&self, index: usize) -> Cow<'static, str> {
        match self {
            Dialect::PostgreSQL => Cow::Owned(format!("${}", index)),
            Dialect::MsSql => Cow::Owned(format!("@p{}", index)),
            Dialect::SQLite | Dialect::MySQL => Cow::Borrowed("?"),
        }
    }

    fn write_ident(&self, buf: &mut String, name: &str) {
        let (open, close) = match self {
            Dialect::PostgreSQL | Dialect::SQLite => ('"', '"'),
            Dialect::MySQL => ('`', '`'),
            Dialect::MsSql => ('[', ']'),
        };
        let _ = buf.write_char(open);
        for ch in name.chars() {
            // doubling the closing quote is the escape on every dialect
            if ch == close {
                let _ = buf.write_char(close);
            }
            let _ = buf.write_char(ch);
        }
        let _ = buf.write_char(close);
    }
}
