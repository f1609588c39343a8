use std::fmt;

use crate::expression::{BinaryOperator, Expr, UnaryOperator};

/// A malformed expression. `offset` is a character offset into the text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionError {
    pub message: String,
    pub offset: usize,
}

impl ExpressionError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        ExpressionError {
            message: message.into(),
            offset,
        }
    }
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (column {})", self.message, self.offset + 1)
    }
}

impl std::error::Error for ExpressionError {}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn parse_expression(text: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(text)?;
    let end = text.chars().count();
    let mut parser = ExprParser::new(tokens, end);
    if parser.at_end() {
        return Err(ExpressionError::new("empty expression", 0));
    }
    let expr = parser.parse_expr(0)?;
    if let Some((token, offset)) = parser.tokens.get(parser.pos) {
        return Err(ExpressionError::new(
            format!("unexpected {} after expression", token_kind(token)),
            *offset,
        ));
    }
    Ok(expr)
}

/// Split `text` at every `separator` that is outside brackets and quotes.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AmpAmp,
    PipePipe,
    Bang,
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TokenKind {
    Number,
    Str,
    Ident,
    Boolean,
    And,
    Or,
    Not,
    In,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn token_kind(t: &Token) -> TokenKind {
    match t {
        Token::Int(_) | Token::Float(_) => TokenKind::Number,
        Token::Str(_) => TokenKind::Str,
        Token::Ident(_) => TokenKind::Ident,
        Token::True | Token::False => TokenKind::Boolean,
        Token::And | Token::AmpAmp => TokenKind::And,
        Token::Or | Token::PipePipe => TokenKind::Or,
        Token::Not | Token::Bang => TokenKind::Not,
        Token::In => TokenKind::In,
        Token::Plus => TokenKind::Plus,
        Token::Minus => TokenKind::Minus,
        Token::Star => TokenKind::Star,
        Token::StarStar => TokenKind::StarStar,
        Token::Slash => TokenKind::Slash,
        Token::SlashSlash => TokenKind::SlashSlash,
        Token::Percent => TokenKind::Percent,
        Token::EqEq => TokenKind::EqEq,
        Token::BangEq => TokenKind::BangEq,
        Token::Lt => TokenKind::Lt,
        Token::LtEq => TokenKind::LtEq,
        Token::Gt => TokenKind::Gt,
        Token::GtEq => TokenKind::GtEq,
        Token::Question => TokenKind::Question,
        Token::Colon => TokenKind::Colon,
        Token::Comma => TokenKind::Comma,
        Token::LParen => TokenKind::LParen,
        Token::RParen => TokenKind::RParen,
        Token::LBracket => TokenKind::LBracket,
        Token::RBracket => TokenKind::RBracket,
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Number => "number",
            TokenKind::Str => "string",
            TokenKind::Ident => "name",
            TokenKind::Boolean => "boolean",
            TokenKind::And => "`and`",
            TokenKind::Or => "`or`",
            TokenKind::Not => "`not`",
            TokenKind::In => "`in`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::StarStar => "`**`",
            TokenKind::Slash => "`/`",
            TokenKind::SlashSlash => "`//`",
            TokenKind::Percent => "`%`",
            TokenKind::EqEq => "`==`",
            TokenKind::BangEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::LtEq => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::GtEq => "`>=`",
            TokenKind::Question => "`?`",
            TokenKind::Colon => "`:`",
            TokenKind::Comma => "`,`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
        };
        f.write_str(text)
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let (token, next) = read_number(&chars, i)?;
            tokens.push((token, start));
            i = next;
            continue;
        }

        if c == '"' || c == '\'' {
            let (s, next) = read_string(&chars, i)?;
            tokens.push((Token::Str(s), start));
            i = next;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let token = match word.as_str() {
                "true" | "True" => Token::True,
                "false" | "False" => Token::False,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                _ => Token::Ident(word),
            };
            tokens.push((token, start));
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('*', Some('*')) => (Token::StarStar, 2),
            ('/', Some('/')) => (Token::SlashSlash, 2),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('!', Some('=')) => (Token::BangEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('&', Some('&')) => (Token::AmpAmp, 2),
            ('|', Some('|')) => (Token::PipePipe, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('?', _) => (Token::Question, 1),
            (':', _) => (Token::Colon, 1),
            (',', _) => (Token::Comma, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('=', _) => {
                return Err(ExpressionError::new("unexpected `=`, did you mean `==`?", start));
            }
            _ => return Err(ExpressionError::new(format!("unexpected character `{c}`"), start)),
        };
        tokens.push((token, start));
        i += width;
    }

    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> Result<(Token, usize), ExpressionError> {
    let mut i = start;
    let mut is_float = false;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().collect();
    let token = if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ExpressionError::new(format!("invalid number `{text}`"), start))?
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| ExpressionError::new(format!("integer `{text}` is out of range"), start))?
    };
    Ok((token, i))
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ExpressionError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let escaped = chars[i + 1];
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ExpressionError::new("unterminated string literal", start))
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

struct ExprParser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

const BP_CONDITIONAL: u8 = 2; // ? :
const BP_OR: u8 = 4; // or ||
const BP_AND: u8 = 6; // and &&
const BP_COMPARISON: u8 = 8; // == != < <= > >= in
const BP_ADDITIVE: u8 = 10; // + -
const BP_MULTIPLICATIVE: u8 = 12; // * / // %
const BP_UNARY: u8 = 14; // - +
const BP_POWER: u8 = 16; // **

impl ExprParser {
    fn new(tokens: Vec<(Token, usize)>, end: usize) -> Self {
        ExprParser { tokens, pos: 0, end }
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|(t, _)| token_kind(t))
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, offset)| *offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::new(message, self.offset())
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExpressionError> {
        match self.peek_kind() {
            Some(k) if k == kind => {
                self.pos += 1;
                Ok(())
            }
            Some(k) => Err(self.error(format!("expected {kind}, found {k}"))),
            None => Err(self.error(format!("expected {kind}, found end of expression"))),
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_prefix()?;

        loop {
            let Some(kind) = self.peek_kind() else { break };

            // Postfix: calls and indexing bind tightest.
            if kind == TokenKind::LParen {
                let Expr::Variable(callee) = left else {
                    return Err(self.error("only named functions can be called"));
                };
                self.pos += 1;
                let arguments = self.parse_list(TokenKind::RParen)?;
                left = Expr::Call { callee, arguments };
                continue;
            }
            if kind == TokenKind::LBracket {
                self.pos += 1;
                let index = self.parse_expr(0)?;
                self.expect(TokenKind::RBracket)?;
                left = Expr::Index {
                    target: Box::new(left),
                    index: Box::new(index),
                };
                continue;
            }

            let Some((l_bp, r_bp)) = infix_bp(kind) else { break };
            if l_bp < min_bp {
                break;
            }

            if kind == TokenKind::Question {
                self.pos += 1;
                let true_branch = self.parse_expr(0)?;
                self.expect(TokenKind::Colon)?;
                let false_branch = self.parse_expr(r_bp)?;
                left = Expr::Conditional {
                    condition: Box::new(left),
                    true_branch: Box::new(true_branch),
                    false_branch: Box::new(false_branch),
                };
                continue;
            }

            self.pos += 1;
            let right = self.parse_expr(r_bp)?;
            let operator = match kind {
                TokenKind::Plus => BinaryOperator::Addition,
                TokenKind::Minus => BinaryOperator::Subtraction,
                TokenKind::Star => BinaryOperator::Multiplication,
                TokenKind::StarStar => BinaryOperator::Power,
                TokenKind::Slash => BinaryOperator::Division,
                TokenKind::SlashSlash => BinaryOperator::FloorDivision,
                TokenKind::Percent => BinaryOperator::Modulo,
                TokenKind::EqEq => BinaryOperator::Equality,
                TokenKind::BangEq => BinaryOperator::Inequality,
                TokenKind::Gt => BinaryOperator::GreaterThan,
                TokenKind::Lt => BinaryOperator::LessThan,
                TokenKind::GtEq => BinaryOperator::GreaterThanOrEqual,
                TokenKind::LtEq => BinaryOperator::LessThanOrEqual,
                TokenKind::In => BinaryOperator::Membership,
                TokenKind::And => BinaryOperator::LogicalAnd,
                TokenKind::Or => BinaryOperator::LogicalOr,
                _ => return Err(self.error("unexpected infix operator")),
            };
            left = Expr::BinaryOperation {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        let token = self
            .advance()
            .ok_or_else(|| self.error("unexpected end of expression"))?;

        match token {
            Token::Int(n) => Ok(Expr::IntegerLiteral(n)),
            Token::Float(x) => Ok(Expr::FloatLiteral(x)),
            Token::Str(s) => Ok(Expr::StringLiteral(s)),
            Token::True => Ok(Expr::BooleanLiteral(true)),
            Token::False => Ok(Expr::BooleanLiteral(false)),
            Token::Ident(name) => Ok(Expr::Variable(name)),

            Token::Not | Token::Bang => {
                let operand = self.parse_expr(BP_COMPARISON)?;
                Ok(unary(UnaryOperator::LogicalNot, operand))
            }
            Token::Minus => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(unary(UnaryOperator::Negation, operand))
            }
            Token::Plus => {
                let operand = self.parse_expr(BP_UNARY)?;
                Ok(unary(UnaryOperator::Identity, operand))
            }

            // Parenthesized expression or tuple
            Token::LParen => {
                if self.peek_kind() == Some(TokenKind::RParen) {
                    self.pos += 1;
                    return Ok(Expr::SequenceLiteral(Vec::new()));
                }
                let first = self.parse_expr(0)?;
                if self.peek_kind() != Some(TokenKind::Comma) {
                    self.expect(TokenKind::RParen)?;
                    return Ok(first);
                }
                self.pos += 1;
                let mut items = vec![first];
                items.extend(self.parse_list(TokenKind::RParen)?);
                Ok(Expr::SequenceLiteral(items))
            }
            Token::LBracket => Ok(Expr::SequenceLiteral(self.parse_list(TokenKind::RBracket)?)),

            other => Err(ExpressionError::new(
                format!("unexpected {}", token_kind(&other)),
                offset,
            )),
        }
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn parse_list(&mut self, close: TokenKind) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        loop {
            if self.peek_kind() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.parse_expr(0)?);
            match self.peek_kind() {
                Some(TokenKind::Comma) => self.pos += 1,
                Some(k) if k == close => {}
                _ => return Err(self.error(format!("expected `,` or {close}"))),
            }
        }
    }
}

fn unary(operator: UnaryOperator, operand: Expr) -> Expr {
    Expr::UnaryOperation {
        operator,
        operand: Box::new(operand),
    }
}

fn infix_bp(kind: TokenKind) -> Option<(u8, u8)> {
    match kind {
        TokenKind::Question => Some((BP_CONDITIONAL, BP_CONDITIONAL)),
        TokenKind::Or => Some((BP_OR, BP_OR + 1)),
        TokenKind::And => Some((BP_AND, BP_AND + 1)),
        TokenKind::EqEq
        | TokenKind::BangEq
        | TokenKind::Lt
        | TokenKind::LtEq
        | TokenKind::Gt
        | TokenKind::GtEq
        | TokenKind::In => Some((BP_COMPARISON, BP_COMPARISON + 1)),
        TokenKind::Plus | TokenKind::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        TokenKind::Star | TokenKind::Slash | TokenKind::SlashSlash | TokenKind::Percent => {
            Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1))
        }
        // Right-associative.
        TokenKind::StarStar => Some((BP_POWER, BP_POWER)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(operator: BinaryOperator, left: Expr, right: Expr) -> Expr {
        Expr::BinaryOperation {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn int(n: i64) -> Expr {
        Expr::IntegerLiteral(n)
    }

    #[test]
    fn precedence_of_arithmetic() {
        assert_eq!(
            parse_expression("1 + 2 * 3").unwrap(),
            binary(BinaryOperator::Addition, int(1), binary(BinaryOperator::Multiplication, int(2), int(3)))
        );
    }

    #[test]
    fn power_is_right_associative_and_binds_over_negation() {
        assert_eq!(
            parse_expression("2 ** 3 ** 2").unwrap(),
            binary(BinaryOperator::Power, int(2), binary(BinaryOperator::Power, int(3), int(2)))
        );
        assert_eq!(
            parse_expression("-2 ** 2").unwrap(),
            unary(UnaryOperator::Negation, binary(BinaryOperator::Power, int(2), int(2)))
        );
    }

    #[test]
    fn not_applies_to_the_whole_comparison() {
        assert_eq!(
            parse_expression("not x == 1").unwrap(),
            unary(
                UnaryOperator::LogicalNot,
                binary(BinaryOperator::Equality, Expr::Variable("x".into()), int(1))
            )
        );
    }

    #[test]
    fn conditional_calls_and_indexing() {
        let expr = parse_expression("len(xs) > 0 ? xs[0] : 'none'").unwrap();
        let Expr::Conditional { condition, true_branch, false_branch } = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*condition, Expr::BinaryOperation { operator: BinaryOperator::GreaterThan, .. }));
        assert!(matches!(*true_branch, Expr::Index { .. }));
        assert_eq!(*false_branch, Expr::StringLiteral("none".into()));
    }

    #[test]
    fn tuples_and_lists() {
        assert_eq!(parse_expression("(1, 2)").unwrap(), Expr::SequenceLiteral(vec![int(1), int(2)]));
        assert_eq!(parse_expression("[1, 2,]").unwrap(), Expr::SequenceLiteral(vec![int(1), int(2)]));
        assert_eq!(parse_expression("(1)").unwrap(), int(1));
        assert_eq!(parse_expression("[]").unwrap(), Expr::SequenceLiteral(vec![]));
    }

    #[test]
    fn literals() {
        assert_eq!(parse_expression("1.5e1").unwrap(), Expr::FloatLiteral(15.0));
        assert_eq!(parse_expression("\"a\\\"b\"").unwrap(), Expr::StringLiteral("a\"b".into()));
        assert_eq!(parse_expression("True").unwrap(), Expr::BooleanLiteral(true));
    }

    #[test]
    fn errors_report_offsets() {
        let err = parse_expression("x = 1").unwrap_err();
        assert_eq!(err.offset, 2);
        assert!(parse_expression("").is_err());
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("(1").is_err());
        assert!(parse_expression("1 2").is_err());
        assert!(parse_expression("'abc").is_err());
        assert!(parse_expression("99999999999999999999").is_err());
    }

    #[test]
    fn split_respects_nesting_and_quotes() {
        assert_eq!(split_top_level("1, f(2, 3), ','", ','), vec!["1", " f(2, 3)", " ','"]);
        assert_eq!(split_top_level("a", ','), vec!["a"]);
    }
}
