/// SQL keywords, operators and punctuation.
///
/// Multi-word keywords are single tokens so spacing logic treats them as one
/// word-like unit.
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    // statements
    SELECT,
    DISTINCT,
    FROM,
    WHERE,
    INSERT_INTO,
    VALUES,
    DEFAULT_VALUES,
    UPDATE,
    SET,
    DELETE_FROM,
    RETURNING,
    OUTPUT,
    // clauses
    JOIN,
    INNER_JOIN,
    LEFT_JOIN,
    ON,
    GROUP_BY,
    HAVING,
    ORDER_BY,
    ASC,
    DESC,
    LIMIT,
    OFFSET,
    ROWS,
    FETCH_NEXT,
    ROWS_ONLY,
    UNION,
    UNION_ALL,
    AS,
    // predicates
    AND,
    OR,
    NOT,
    IN,
    NOT_IN,
    IS_NULL,
    IS_NOT_NULL,
    LIKE,
    NOT_LIKE,
    ILIKE,
    NOT_ILIKE,
    BETWEEN,
    NOT_BETWEEN,
    NULL,
    // operators
    EQ,
    NE,
    LT,
    GT,
    LE,
    GE,
    // punctuation
    STAR,
    COMMA,
    LPAREN,
    RPAREN,
    DOT,
    SEMI,
}

impl Token {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Token::SELECT => "SELECT",
            Token::DISTINCT => "DISTINCT",
            Token::FROM => "FROM",
            Token::WHERE => "WHERE",
            Token::INSERT_INTO => "INSERT INTO",
            Token::VALUES => "VALUES",
            Token::DEFAULT_VALUES => "DEFAULT VALUES",
            Token::UPDATE => "UPDATE",
            Token::SET => "SET",
            Token::DELETE_FROM => "DELETE FROM",
            Token::RETURNING => "RETURNING",
            Token::OUTPUT => "OUTPUT",
            Token::JOIN => "JOIN",
            Token::INNER_JOIN => "INNER JOIN",
            Token::LEFT_JOIN => "LEFT JOIN",
            Token::ON => "ON",
            Token::GROUP_BY => "GROUP BY",
            Token::HAVING => "HAVING",
            Token::ORDER_BY => "ORDER BY",
            Token::ASC => "ASC",
            Token::DESC => "DESC",
            Token::LIMIT => "LIMIT",
            Token::OFFSET => "OFFSET",
            Token::ROWS => "ROWS",
            Token::FETCH_NEXT => "FETCH NEXT",
            Token::ROWS_ONLY => "ROWS ONLY",
            Token::UNION => "UNION",
            Token::UNION_ALL => "UNION ALL",
            Token::AS => "AS",
            Token::AND => "AND",
            Token::OR => "OR",
            Token::NOT => "NOT",
            Token::IN => "IN",
            Token::NOT_IN => "NOT IN",
            Token::IS_NULL => "IS NULL",
            Token::IS_NOT_NULL => "IS NOT NULL",
            Token::LIKE => "LIKE",
            Token::NOT_LIKE => "NOT LIKE",
            Token::ILIKE => "ILIKE",
            Token::NOT_ILIKE => "NOT ILIKE",
            Token::BETWEEN => "BETWEEN",
            Token::NOT_BETWEEN => "NOT BETWEEN",
            Token::NULL => "NULL",
            Token::EQ => "=",
            Token::NE => "<>",
            Token::LT => "<",
            Token::GT => ">",
            Token::LE => "<=",
            Token::GE => ">=",
            Token::STAR => "*",
            Token::COMMA => ",",
            Token::LPAREN => "(",
            Token::RPAREN => ")",
            Token::DOT => ".",
            Token::SEMI => ";",
        }
    }

    /// Comparison operators get a space on both sides.
    #[inline]
    pub const fn is_operator(&self) -> bool {
        matches!(
            self,
            Token::EQ | Token::NE | Token::LT | Token::GT | Token::LE | Token::GE
        )
    }

    /// Punctuation renders without surrounding word spacing.
    #[inline]
    pub const fn is_punctuation(&self) -> bool {
        matches!(
            self,
            Token::COMMA | Token::LPAREN | Token::RPAREN | Token::DOT | Token::SEMI
        )
    }
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
