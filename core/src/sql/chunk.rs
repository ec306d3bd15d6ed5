use crate::dialect::{Dialect, DialectExt};
use crate::sql::tokens::Token;
use crate::value::Value;
use compact_str::CompactString;
use std::fmt::Write;

/// A SQL chunk represents a part of an SQL statement.
///
/// - `Token` - SQL keywords and operators (SELECT, FROM, =, etc.)
/// - `Ident` - Quoted identifiers, quoted per dialect at render time
/// - `Qualified` - `table.column` reference, both parts quoted
/// - `Raw` - Unquoted raw SQL text (function names, casts)
/// - `Number` - Unsigned integer literal (LIMIT/OFFSET)
/// - `Param` - Bound parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SQLChunk {
    /// SQL keywords and operators: SELECT, FROM, WHERE, =, AND, etc.
    Token(Token),

    /// Quoted identifier for table, column and alias names
    Ident(CompactString),

    /// Qualified column reference
    /// Renders as: "table"."column"
    Qualified {
        table: CompactString,
        column: CompactString,
    },

    /// Raw SQL text (unquoted)
    /// Never built from user input.
    Raw(CompactString),

    /// Unsigned integer literal
    Number(usize),

    /// Parameter value
    /// Renders as: ? or $1 or @p1 depending on dialect
    Param(Value),
}

impl SQLChunk {
    /// Creates a quoted identifier
    #[inline]
    pub fn ident(name: impl Into<CompactString>) -> Self {
        Self::Ident(name.into())
    }

    /// Creates raw SQL text
    #[inline]
    pub fn raw(text: impl Into<CompactString>) -> Self {
        Self::Raw(text.into())
    }

    /// Creates a qualified column reference
    #[inline]
    pub fn qualified(table: impl Into<CompactString>, column: impl Into<CompactString>) -> Self {
        Self::Qualified {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Write chunk content to buffer. Params are handled by the caller since
    /// their rendering depends on position.
    pub(crate) fn write(&self, buf: &mut String, dialect: Dialect) {
        match self {
            SQLChunk::Token(token) => {
                let _ = buf.write_str(token.as_str());
            }
            SQLChunk::Ident(name) => dialect.write_ident(buf, name),
            SQLChunk::Qualified { table, column } => {
                dialect.write_ident(buf, table);
                let _ = buf.write_char('.');
                dialect.write_ident(buf, column);
            }
            SQLChunk::Raw(text) => {
                let _ = buf.write_str(text);
            }
            SQLChunk::Number(n) => {
                let _ = write!(buf, "{n}");
            }
            SQLChunk::Param(_) => {
                let _ = buf.write_char('?');
            }
        }
    }

    /// Check if this chunk is "word-like" (needs space separation from other word-like chunks)
    #[inline]
    pub(crate) const fn is_word_like(&self) -> bool {
        match self {
            SQLChunk::Token(t) => !t.is_punctuation() && !t.is_operator(),
            SQLChunk::Ident(_)
            | SQLChunk::Qualified { .. }
            | SQLChunk::Raw(_)
            | SQLChunk::Number(_)
            | SQLChunk::Param(_) => true,
        }
    }
}

// ==================== From implementations ====================

impl From<Token> for SQLChunk {
    #[inline]
    fn from(value: Token) -> Self {
        Self::Token(value)
    }
}

impl From<Value> for SQLChunk {
    #[inline]
    fn from(value: Value) -> Self {
        Self::Param(value)
    }
}
