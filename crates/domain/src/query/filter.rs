//! Filter expression parser.
//!
//! Recursive descent over a deliberately small grammar:
//!
//! ```text
//! expr    := and (("||" | "or") and)*
//! and     := unary (("&&" | "and") unary)*
//! unary   := ("!" | "not") unary | primary
//! primary := "(" expr ")"
//!          | field op literal
//!          | field "." method "(" string ")"
//! op      := "==" | "=" | "!=" | "<>" | "<" | "<=" | ">" | ">="
//! method  := Contains | StartsWith | EndsWith
//! literal := "..." | '...' | number | true | false | null
//! ```
//!
//! Only bare field names and literals are accepted: there are no member
//! paths, no field-to-field comparisons and no calls beyond the three text
//! methods, so a filter can never reach anything but declared fields.

use super::QueryError;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Text matching methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

impl TextOp {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "contains" => Some(TextOp::Contains),
            "startswith" => Some(TextOp::StartsWith),
            "endswith" => Some(TextOp::EndsWith),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A literal as written, before it is typed against a field.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLiteral {
    Null,
    Bool(bool),
    Number(String),
    Text(String),
}

/// A parsed, not yet resolved, filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare {
        field: String,
        op: CompareOp,
        value: RawLiteral,
    },
    Text {
        field: String,
        op: TextOp,
        value: String,
    },
    Logical {
        left: Box<FilterExpr>,
        op: LogicalOp,
        right: Box<FilterExpr>,
    },
    Not(Box<FilterExpr>),
    Group(Box<FilterExpr>),
}

/// Nesting deeper than this is rejected.
const MAX_DEPTH: usize = 32;

/// Upper bound on comparisons in one filter. Together with [`MAX_DEPTH`]
/// this bounds the height of every tree built from a filter, including
/// long `and`/`or` chains.
const MAX_TERMS: usize = 100;

pub struct FilterParser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    terms: usize,
}

impl<'a> FilterParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            terms: 0,
        }
    }

    pub fn parse(&mut self) -> Result<FilterExpr, QueryError> {
        self.skip_whitespace();
        let expr = self.parse_or()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(QueryError::new(format!(
                "Unexpected input at position {}: '{}'",
                self.pos,
                &self.input[self.pos..]
            )));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<FilterExpr, QueryError> {
        let mut left = self.parse_and()?;

        loop {
            self.skip_whitespace();
            if self.try_consume_str("||") || self.try_consume_keyword("or") {
                let right = self.parse_and()?;
                left = FilterExpr::Logical {
                    left: Box::new(left),
                    op: LogicalOp::Or,
                    right: Box::new(right),
                };
            } else {
                break;
            }
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterExpr, QueryError> {
        let mut left = self.parse_unary()?;

        loop {
            self.skip_whitespace();
            if self.try_consume_str("&&") || self.try_consume_keyword("and") {
                let right = self.parse_unary()?;
                left = FilterExpr::Logical {
                    left: Box::new(left),
                    op: LogicalOp::And,
                    right: Box::new(right),
                };
            } else {
                break;
            }
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<FilterExpr, QueryError> {
        self.skip_whitespace();

        let negated = if self.peek_str("!=") {
            false
        } else {
            self.try_consume_char('!') || self.try_consume_keyword("not")
        };

        if negated {
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(FilterExpr::Not(Box::new(inner)));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterExpr, QueryError> {
        self.skip_whitespace();

        if self.try_consume_char('(') {
            self.enter()?;
            let expr = self.parse_or()?;
            self.depth -= 1;
            self.skip_whitespace();
            if !self.try_consume_char(')') {
                return Err(QueryError::new("Expected ')' to close group"));
            }
            return Ok(FilterExpr::Group(Box::new(expr)));
        }

        self.terms += 1;
        if self.terms > MAX_TERMS {
            return Err(QueryError::new(format!(
                "Filter has more than {} conditions",
                MAX_TERMS
            )));
        }

        let field = self.parse_identifier()?;
        self.skip_whitespace();

        if self.try_consume_char('.') {
            return self.parse_method(field);
        }

        let op = self.parse_operator()?;
        self.skip_whitespace();
        let value = self.parse_literal()?;

        Ok(FilterExpr::Compare { field, op, value })
    }

    fn parse_method(&mut self, field: String) -> Result<FilterExpr, QueryError> {
        let name = self.parse_identifier()?;
        let op = TextOp::from_name(&name)
            .ok_or_else(|| QueryError::new(format!("Unsupported method: {}", name)))?;

        self.skip_whitespace();
        if !self.try_consume_char('(') {
            return Err(QueryError::new(format!("Expected '(' after {}", name)));
        }
        self.skip_whitespace();
        let value = match self.parse_literal()? {
            RawLiteral::Text(value) => value,
            _ => {
                return Err(QueryError::new(format!(
                    "{} expects a string argument",
                    name
                )))
            }
        };
        self.skip_whitespace();
        if !self.try_consume_char(')') {
            return Err(QueryError::new(format!("Expected ')' after {} argument", name)));
        }

        Ok(FilterExpr::Text { field, op, value })
    }

    fn parse_identifier(&mut self) -> Result<String, QueryError> {
        let start = self.pos;

        while self.pos < self.input.len() {
            let c = self.current_char();
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }

        if self.pos == start || self.input[start..].starts_with(|c: char| c.is_ascii_digit()) {
            return Err(QueryError::new(format!(
                "Expected field name at position {}",
                start
            )));
        }

        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_operator(&mut self) -> Result<CompareOp, QueryError> {
        // Longest match first.
        const OPERATORS: &[(&str, CompareOp)] = &[
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            ("<>", CompareOp::Ne),
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
            ("=", CompareOp::Eq),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
        ];

        for (symbol, op) in OPERATORS {
            if self.try_consume_str(symbol) {
                return Ok(*op);
            }
        }

        Err(QueryError::new(format!(
            "Expected comparison operator at position {}",
            self.pos
        )))
    }

    fn parse_literal(&mut self) -> Result<RawLiteral, QueryError> {
        self.skip_whitespace();

        let quote = self.current_char();
        if quote == '"' || quote == '\'' {
            self.pos += 1;
            return self.parse_string(quote).map(RawLiteral::Text);
        }

        let start = self.pos;
        while self.pos < self.input.len() {
            let c = self.current_char();
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '+' || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }

        let word = &self.input[start..self.pos];
        if word.is_empty() {
            return Err(QueryError::new(format!("Expected value at position {}", start)));
        }

        match word.to_ascii_lowercase().as_str() {
            "null" => Ok(RawLiteral::Null),
            "true" => Ok(RawLiteral::Bool(true)),
            "false" => Ok(RawLiteral::Bool(false)),
            _ if word.parse::<f64>().is_ok() => Ok(RawLiteral::Number(word.to_string())),
            _ => Err(QueryError::new(format!(
                "Expected a literal value but found '{}'",
                word
            ))),
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<String, QueryError> {
        let mut value = String::new();

        while self.pos < self.input.len() {
            let c = self.current_char();
            self.pos += c.len_utf8();

            if c == quote {
                return Ok(value);
            }

            if c == '\\' && self.pos < self.input.len() {
                let escaped = self.current_char();
                self.pos += escaped.len_utf8();
                value.push(escaped);
            } else {
                value.push(c);
            }
        }

        Err(QueryError::new("Unterminated string"))
    }

    fn enter(&mut self) -> Result<(), QueryError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(QueryError::new("Filter is nested too deeply"));
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.current_char().is_whitespace() {
            self.pos += self.current_char().len_utf8();
        }
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn try_consume_char(&mut self, c: char) -> bool {
        if self.pos < self.input.len() && self.current_char() == c {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn try_consume_str(&mut self, s: &str) -> bool {
        if self.peek_str(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn try_consume_keyword(&mut self, keyword: &str) -> bool {
        let end = self.pos + keyword.len();
        let matches = self
            .input
            .get(self.pos..end)
            .map(|word| word.eq_ignore_ascii_case(keyword))
            .unwrap_or(false);

        if !matches {
            return false;
        }

        let boundary = self.input[end..]
            .chars()
            .next()
            .map(|c| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(true);

        if boundary {
            self.pos = end;
        }
        boundary
    }
}

/// Parses a filter string.
pub fn parse(input: &str) -> Result<FilterExpr, QueryError> {
    FilterParser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(field: &str, op: CompareOp, value: RawLiteral) -> FilterExpr {
        FilterExpr::Compare {
            field: field.to_string(),
            op,
            value,
        }
    }

    #[test]
    fn test_simple_equality() {
        let expr = parse(r#"State == "Open""#).unwrap();
        assert_eq!(
            expr,
            compare("State", CompareOp::Eq, RawLiteral::Text("Open".into()))
        );
    }

    #[test]
    fn test_single_equals_and_single_quotes() {
        let expr = parse("name = 'Acme'").unwrap();
        assert_eq!(
            expr,
            compare("name", CompareOp::Eq, RawLiteral::Text("Acme".into()))
        );
    }

    #[test]
    fn test_all_comparison_operators() {
        for (text, op) in [
            ("id == 1", CompareOp::Eq),
            ("id != 1", CompareOp::Ne),
            ("id <> 1", CompareOp::Ne),
            ("id < 1", CompareOp::Lt),
            ("id <= 1", CompareOp::Le),
            ("id > 1", CompareOp::Gt),
            ("id >= 1", CompareOp::Ge),
        ] {
            assert_eq!(
                parse(text).unwrap(),
                compare("id", op, RawLiteral::Number("1".into())),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a == 1 or b == 2 and c == 3").unwrap();
        match expr {
            FilterExpr::Logical {
                op: LogicalOp::Or,
                right,
                ..
            } => assert!(matches!(
                *right,
                FilterExpr::Logical {
                    op: LogicalOp::And,
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_symbolic_logical_operators() {
        let expr = parse("a == 1 && (b == 2 || !c)").unwrap_err();
        assert!(expr.to_string().contains("operator"));

        let expr = parse("a == 1 && !(b == 2 || c == 3)").unwrap();
        assert!(matches!(
            expr,
            FilterExpr::Logical {
                op: LogicalOp::And,
                ..
            }
        ));
    }

    #[test]
    fn test_not_keyword() {
        let expr = parse("not deleted == true").unwrap();
        assert!(matches!(expr, FilterExpr::Not(_)));
    }

    #[test]
    fn test_text_methods() {
        let expr = parse(r#"name.Contains("cme")"#).unwrap();
        assert_eq!(
            expr,
            FilterExpr::Text {
                field: "name".into(),
                op: TextOp::Contains,
                value: "cme".into()
            }
        );
        assert!(parse(r#"name.startswith("A")"#).is_ok());
        assert!(parse(r#"name.EndsWith('.')"#).is_ok());
    }

    #[test]
    fn test_arbitrary_method_is_rejected() {
        let err = parse(r#"name.ToUpper("x")"#).unwrap_err();
        assert!(err.to_string().contains("Unsupported method"));
    }

    #[test]
    fn test_member_path_is_rejected() {
        assert!(parse(r#"client.name == "Acme""#).is_err());
    }

    #[test]
    fn test_field_to_field_comparison_is_rejected() {
        assert!(parse("startDate < endDate").is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse("ended == null").unwrap(),
            compare("ended", CompareOp::Eq, RawLiteral::Null)
        );
        assert_eq!(
            parse("deleted == FALSE").unwrap(),
            compare("deleted", CompareOp::Eq, RawLiteral::Bool(false))
        );
        assert_eq!(
            parse("count > -2").unwrap(),
            compare("count", CompareOp::Gt, RawLiteral::Number("-2".into()))
        );
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let expr = parse(r#"name == "Say \"hi\"""#).unwrap();
        assert_eq!(
            expr,
            compare("name", CompareOp::Eq, RawLiteral::Text("Say \"hi\"".into()))
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(parse(r#"name == "Acme"#).is_err());
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse("id == 1 ; drop table clients").unwrap_err();
        assert!(err.to_string().contains("Unexpected input"));
    }

    #[test]
    fn test_keyword_prefix_of_identifier_is_not_a_keyword() {
        let expr = parse("a == 1 or orders == 2").unwrap();
        assert!(matches!(
            expr,
            FilterExpr::Logical {
                op: LogicalOp::Or,
                ..
            }
        ));
        assert!(parse("notes == 'x'").is_ok());
    }

    #[test]
    fn test_excessive_nesting_is_rejected() {
        let deep = format!("{}id == 1{}", "(".repeat(64), ")".repeat(64));
        assert!(parse(&deep).is_err());
    }

    #[test]
    fn test_long_or_chain_is_rejected() {
        let chain = vec!["id=1"; 10_000].join("||");
        assert!(chain.len() > 50_000);

        let err = parse(&chain).unwrap_err();
        assert!(err.to_string().contains("more than 100 conditions"));
    }

    #[test]
    fn test_long_and_chain_is_rejected() {
        let chain = vec!["id == 1"; 101].join(" and ");
        assert!(parse(&chain).is_err());

        let chain = vec!["id == 1"; 100].join(" and ");
        assert!(parse(&chain).is_ok());
    }
}
