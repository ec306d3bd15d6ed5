//! Unified database dialect enum
//!
//! The dialect tag selects placeholder syntax, identifier quoting, pagination
//! syntax and the handful of quirks the query layer has to work around.

/// SQL dialect for database-specific behavior
///
/// # Examples
///
/// ```
/// use basemodel_types::Dialect;
///
/// let dialect = Dialect::PostgreSQL;
/// assert!(dialect.uses_numbered_placeholders());
/// assert!(dialect.supports_returning());
///
/// let sqlite = Dialect::SQLite;
/// assert!(!sqlite.uses_numbered_placeholders());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Dialect {
    /// SQLite - uses `?` positional placeholders
    #[default]
    SQLite,

    /// PostgreSQL - uses `$1, $2, ...` numbered placeholders
    PostgreSQL,

    /// MySQL - uses `?` positional placeholders
    MySQL,

    /// Microsoft SQL Server - uses `@p1, @p2, ...` numbered placeholders
    #[cfg_attr(feature = "serde", serde(rename = "mssql"))]
    MsSql,
}

impl Dialect {
    /// Returns `true` if this dialect uses numbered placeholders
    #[inline]
    #[must_use]
    pub const fn uses_numbered_placeholders(&self) -> bool {
        matches!(self, Dialect::PostgreSQL | Dialect::MsSql)
    }

    /// Returns `true` if INSERT/UPDATE can hand back the written row in the
    /// same statement (`RETURNING` on Postgres, `OUTPUT INSERTED` on MSSQL).
    #[inline]
    #[must_use]
    pub const fn supports_returning(&self) -> bool {
        matches!(self, Dialect::PostgreSQL | Dialect::MsSql)
    }

    /// Unioned sub-queries carrying their own ORDER BY/LIMIT must be wrapped in
    /// a derived table on these dialects.
    #[inline]
    #[must_use]
    pub const fn wraps_union_branches(&self) -> bool {
        matches!(self, Dialect::SQLite | Dialect::MsSql)
    }

    /// OFFSET/FETCH on MSSQL is only legal after an ORDER BY.
    #[inline]
    #[must_use]
    pub const fn requires_order_for_offset(&self) -> bool {
        matches!(self, Dialect::MsSql)
    }

    /// Parse a dialect from a string (case-insensitive)
    ///
    /// Supports the common aliases:
    /// - SQLite: `"sqlite"`, `"sqlite3"`
    /// - PostgreSQL: `"postgresql"`, `"postgres"`, `"pg"`
    /// - MySQL: `"mysql"`, `"mysql2"`
    /// - MSSQL: `"mssql"`, `"sqlserver"`
    ///
    /// ```
    /// use basemodel_types::Dialect;
    ///
    /// assert_eq!(Dialect::parse("sqlite3"), Some(Dialect::SQLite));
    /// assert_eq!(Dialect::parse("pg"), Some(Dialect::PostgreSQL));
    /// assert_eq!(Dialect::parse("mssql"), Some(Dialect::MsSql));
    /// assert_eq!(Dialect::parse("unknown"), None);
    /// ```
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("sqlite") || s.eq_ignore_ascii_case("sqlite3") {
            Some(Dialect::SQLite)
        } else if s.eq_ignore_ascii_case("postgresql")
            || s.eq_ignore_ascii_case("postgres")
            || s.eq_ignore_ascii_case("pg")
        {
            Some(Dialect::PostgreSQL)
        } else if s.eq_ignore_ascii_case("mysql") || s.eq_ignore_ascii_case("mysql2") {
            Some(Dialect::MySQL)
        } else if s.eq_ignore_ascii_case("mssql") || s.eq_ignore_ascii_case("sqlserver") {
            Some(Dialect::MsSql)
        } else {
            None
        }
    }

    /// Get the dialect name as a lowercase string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Dialect::SQLite => "sqlite",
            Dialect::PostgreSQL => "postgresql",
            Dialect::MySQL => "mysql",
            Dialect::MsSql => "mssql",
        }
    }
}

impl core::fmt::Display for Dialect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Dialect {
    type Err = DialectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::parse(s).ok_or(DialectParseError)
    }
}

/// Error returned when parsing an unknown dialect string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectParseError;

impl core::fmt::Display for DialectParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("unknown dialect")
    }
}

impl std::error::Error for DialectParseError {}
