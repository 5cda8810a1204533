// 🧮 Formula Evaluator - In-Cell Arithmetic
// Normalizes and evaluates the restricted arithmetic a user can commit into
// an expense cell. A recursive descent parser over a whitelisted grammar —
// the character whitelist runs before evaluation, never instead of it.

use thiserror::Error;

pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Rejection of a committed expression. All variants are recoverable input
/// errors: the caller keeps the cell's prior stored value and surfaces the
/// message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    #[error("invalid character '{0}' in expression")]
    UnsupportedChar(char),

    #[error("invalid expression: {0}")]
    Parse(String),

    #[error("expression has no finite result")]
    NotFinite,
}

/// Outcome of classifying and evaluating one committed cell entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Whitespace-only entry; the cell is cleared.
    Empty,

    /// Plain entry kept as typed. Resolves to the parsed amount
    /// (zero when the text is not numeric).
    Plain(f64),

    /// Arithmetic entered without '='. Only the computed result survives.
    Computed(f64),

    /// '='-prefixed formula. The original text is retained so the editor
    /// can re-surface it.
    Formula { text: String, value: f64 },
}

/// Classify raw cell input and evaluate it.
///
/// - empty → `Empty`
/// - starts with `=` → explicit formula, text retained
/// - contains an arithmetic character → implicit expression, result only
/// - anything else → plain value (non-numeric text counts as zero)
pub fn evaluate_entry(raw: &str) -> FormulaResult<Evaluation> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Ok(Evaluation::Empty);
    }

    if let Some(body) = trimmed.strip_prefix('=') {
        let value = evaluate_expression(body)?;
        return Ok(Evaluation::Formula {
            text: trimmed.to_string(),
            value,
        });
    }

    if trimmed
        .chars()
        .any(|c| matches!(c, '+' | '-' | '*' | '/' | '(' | ')'))
    {
        return Ok(Evaluation::Computed(evaluate_expression(trimmed)?));
    }

    Ok(Evaluation::Plain(parse_amount(trimmed)))
}

/// Evaluate one arithmetic expression body (no '=' prefix) and round the
/// result to cents.
pub fn evaluate_expression(expr: &str) -> FormulaResult<f64> {
    let normalized = normalize(expr)?;

    let mut parser = ExprParser::new(&normalized)?;
    let value = parser.parse_additive()?;

    // The whole input must be one expression
    if parser.current_token() != &Token::Eof {
        return Err(FormulaError::Parse(format!(
            "unexpected {} after expression",
            parser.current_token().describe()
        )));
    }

    let rounded = round_cents(value);
    if !rounded.is_finite() {
        return Err(FormulaError::NotFinite);
    }

    Ok(rounded)
}

/// Resolve a stored value string to a number. Thousands separators are
/// stripped; anything unparseable (or non-finite) counts as zero.
pub fn parse_amount(text: &str) -> f64 {
    match text.trim().replace(',', "").parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Round to two decimal places, half away from zero.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Format an amount with exactly two decimals, as stored and displayed.
pub fn format_amount(value: f64) -> String {
    let cents = round_cents(value);
    // -0.0 would print with a sign
    let cents = if cents == 0.0 { 0.0 } else { cents };
    format!("{:.2}", cents)
}

// ============================================================================
// NORMALIZATION
// ============================================================================
// Applied in order, each step exactly once:
//   1. strip thousands-separator commas
//   2. collapse runs of identical '+', '*', '/' operators
//   3. sign-pair rewrites: "+-" → "-", then "-+" → "-", then "--" → "+"
//   4. whitelist check
// Runs of '-' are left to step 3 so that "5--3" reads as 5-(-3). Residual
// sign pairs after the single rewrite pass (e.g. from "5---3") are handled
// by the parser's unary operators.

fn normalize(expr: &str) -> FormulaResult<String> {
    let stripped = expr.replace(',', "");
    let collapsed = collapse_operator_runs(&stripped);

    let rewritten = collapsed
        .replace("+-", "-")
        .replace("-+", "-")
        .replace("--", "+");

    for c in rewritten.chars() {
        let allowed = c.is_ascii_digit()
            || c.is_whitespace()
            || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.');
        if !allowed {
            return Err(FormulaError::UnsupportedChar(c));
        }
    }

    Ok(rewritten)
}

fn collapse_operator_runs(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut prev: Option<char> = None;

    for c in expr.chars() {
        if matches!(c, '+' | '*' | '/') && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }

    out
}

// ============================================================================
// PARSER
// ============================================================================
// Recursive descent with standard precedence:
//   additive (+ -) → multiplicative (* /) → unary (+ -) → primary
// Primary is a numeric literal or a parenthesized expression.

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Eof => "end of expression".to_string(),
        }
    }
}

struct ExprParser<'a> {
    input: &'a str,
    pos: usize,
    current: Token,
}

impl<'a> ExprParser<'a> {
    fn new(input: &'a str) -> FormulaResult<Self> {
        let mut parser = Self {
            input,
            pos: 0,
            current: Token::Eof,
        };
        parser.advance_token()?;
        Ok(parser)
    }

    // === Token scanning ===

    fn advance_token(&mut self) -> FormulaResult<()> {
        self.current = self.scan_token()?;
        Ok(())
    }

    fn scan_token(&mut self) -> FormulaResult<Token> {
        self.skip_whitespace();

        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        match c {
            '+' => {
                self.advance();
                Ok(Token::Plus)
            }
            '-' => {
                self.advance();
                Ok(Token::Minus)
            }
            '*' => {
                self.advance();
                Ok(Token::Star)
            }
            '/' => {
                self.advance();
                Ok(Token::Slash)
            }
            '(' => {
                self.advance();
                Ok(Token::LeftParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RightParen)
            }
            c if c.is_ascii_digit() || c == '.' => self.scan_number(),
            other => Err(FormulaError::UnsupportedChar(other)),
        }
    }

    fn scan_number(&mut self) -> FormulaResult<Token> {
        let start = self.pos;

        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_digit() || c == '.')
        {
            self.advance();
        }

        let text = &self.input[start..self.pos];
        let value: f64 = text
            .parse()
            .map_err(|_| FormulaError::Parse(format!("bad number '{}'", text)))?;

        Ok(Token::Number(value))
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn current_token(&self) -> &Token {
        &self.current
    }

    fn consume(&mut self) -> FormulaResult<Token> {
        let token = std::mem::replace(&mut self.current, Token::Eof);
        self.advance_token()?;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> FormulaResult<()> {
        if self.current == expected {
            self.consume()?;
            Ok(())
        } else {
            Err(FormulaError::Parse(format!(
                "expected {}, got {}",
                expected.describe(),
                self.current.describe()
            )))
        }
    }

    // === Expression parsing with precedence ===

    fn parse_additive(&mut self) -> FormulaResult<f64> {
        let mut left = self.parse_multiplicative()?;

        loop {
            match self.current_token() {
                Token::Plus => {
                    self.consume()?;
                    left += self.parse_multiplicative()?;
                }
                Token::Minus => {
                    self.consume()?;
                    left -= self.parse_multiplicative()?;
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<f64> {
        let mut left = self.parse_unary()?;

        loop {
            match self.current_token() {
                Token::Star => {
                    self.consume()?;
                    left *= self.parse_unary()?;
                }
                Token::Slash => {
                    self.consume()?;
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err(FormulaError::NotFinite);
                    }
                    left /= right;
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> FormulaResult<f64> {
        match self.current_token() {
            Token::Plus => {
                self.consume()?;
                self.parse_unary()
            }
            Token::Minus => {
                self.consume()?;
                Ok(-self.parse_unary()?)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> FormulaResult<f64> {
        match self.consume()? {
            Token::Number(value) => Ok(value),
            Token::LeftParen => {
                let value = self.parse_additive()?;
                self.expect(Token::RightParen)?;
                Ok(value)
            }
            other => Err(FormulaError::Parse(format!(
                "unexpected {}",
                other.describe()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computed(entry: &str) -> f64 {
        match evaluate_entry(entry).unwrap() {
            Evaluation::Computed(v) => v,
            other => panic!("expected computed value for {:?}, got {:?}", entry, other),
        }
    }

    #[test]
    fn test_plain_values() {
        assert_eq!(evaluate_entry("1200").unwrap(), Evaluation::Plain(1200.0));
        assert_eq!(
            evaluate_entry("1,234.5").unwrap(),
            Evaluation::Plain(1234.5)
        );
        assert_eq!(evaluate_entry("abc").unwrap(), Evaluation::Plain(0.0));
        assert_eq!(evaluate_entry("").unwrap(), Evaluation::Empty);
        assert_eq!(evaluate_entry("   ").unwrap(), Evaluation::Empty);

        println!("✅ Plain value classification test PASSED");
    }

    #[test]
    fn test_explicit_formula_keeps_text() {
        let result = evaluate_entry(" =2*(3+4) ").unwrap();
        assert_eq!(
            result,
            Evaluation::Formula {
                text: "=2*(3+4)".to_string(),
                value: 14.0,
            }
        );

        println!("✅ Explicit formula test PASSED");
    }

    #[test]
    fn test_implicit_expression_discards_text() {
        assert_eq!(computed("100+50"), 150.0);
        assert_eq!(computed("-5"), -5.0);
        assert_eq!(computed("10/4"), 2.5);

        println!("✅ Implicit expression test PASSED");
    }

    #[test]
    fn test_operator_precedence_and_parens() {
        assert_eq!(computed("2+3*4"), 14.0);
        assert_eq!(computed("(2+3)*4"), 20.0);
        assert_eq!(computed("100-10/2"), 95.0);
        assert_eq!(computed("-(3+2)"), -5.0);

        println!("✅ Precedence test PASSED");
    }

    #[test]
    fn test_sign_pair_rewrites() {
        // The pinned sign behaviors: consecutive signs combine
        assert_eq!(computed("5--3"), 8.0);
        assert_eq!(computed("5+-3"), 2.0);
        assert_eq!(computed("5-+3"), 2.0);
        // Triple minus leaves one pair for the unary parser
        assert_eq!(computed("5---3"), 2.0);

        println!("✅ Sign pair rewrite test PASSED");
    }

    #[test]
    fn test_operator_run_collapse() {
        assert_eq!(computed("5+++3"), 8.0);
        assert_eq!(computed("5**3"), 15.0);
        assert_eq!(computed("10//4"), 2.5);
        // Collapse and sign rewrites interact: "++--" ends up as one "+"
        assert_eq!(computed("5++--3"), 8.0);

        println!("✅ Operator run collapse test PASSED");
    }

    #[test]
    fn test_thousands_separators_in_expressions() {
        assert_eq!(computed("1,000+500"), 1500.0);
        assert_eq!(computed("1,234.50*2"), 2469.0);

        println!("✅ Thousands separator test PASSED");
    }

    #[test]
    fn test_rejections() {
        assert_eq!(evaluate_expression("1/0"), Err(FormulaError::NotFinite));
        assert!(matches!(
            evaluate_expression("(2+3"),
            Err(FormulaError::Parse(_))
        ));
        assert!(matches!(
            evaluate_expression("2+3)"),
            Err(FormulaError::Parse(_))
        ));
        assert!(matches!(
            evaluate_expression("()"),
            Err(FormulaError::Parse(_))
        ));
        assert!(matches!(
            evaluate_expression("5+"),
            Err(FormulaError::Parse(_))
        ));
        assert!(matches!(
            evaluate_expression(""),
            Err(FormulaError::Parse(_))
        ));
        assert_eq!(
            evaluate_expression("2+x"),
            Err(FormulaError::UnsupportedChar('x'))
        );
        assert!(matches!(
            evaluate_expression("2..5+1"),
            Err(FormulaError::Parse(_))
        ));

        // An '=' in the body is not arithmetic
        assert_eq!(
            evaluate_entry("2+2=4"),
            Err(FormulaError::UnsupportedChar('='))
        );

        println!("✅ Rejection test PASSED");
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        assert_eq!(format_amount(0.125), "0.13");
        assert_eq!(format_amount(-0.125), "-0.13");
        // 2.675 decodes just below the .005 boundary
        assert_eq!(format_amount(2.675), "2.67");
        assert_eq!(format_amount(2.0), "2.00");
        assert_eq!(format_amount(-0.0), "0.00");

        // Results are rounded before they are stored
        assert_eq!(evaluate_expression("1/3").unwrap(), 0.33);
        assert_eq!(evaluate_expression("2/3").unwrap(), 0.67);

        println!("✅ Rounding test PASSED");
    }

    #[test]
    fn test_negative_zero_result() {
        assert_eq!(format_amount(computed("0*-5")), "0.00");

        println!("✅ Negative zero test PASSED");
    }

    #[test]
    fn test_parse_amount_lenient() {
        assert_eq!(parse_amount("1,234.56"), 1234.56);
        assert_eq!(parse_amount("  42 "), 42.0);
        assert_eq!(parse_amount("-3.5"), -3.5);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("n/a"), 0.0);
        // Textual float specials never leak into aggregation
        assert_eq!(parse_amount("NaN"), 0.0);
        assert_eq!(parse_amount("inf"), 0.0);

        println!("✅ Lenient amount parsing test PASSED");
    }

    #[test]
    fn test_whitespace_inside_expression() {
        assert_eq!(computed(" 2 + 3 * 4 "), 14.0);
        assert_eq!(computed("5 + + 3"), 8.0);

        println!("✅ Whitespace handling test PASSED");
    }
}
