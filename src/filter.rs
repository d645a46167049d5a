//! Boolean filter expressions over fieldset values.
//!
//! Grammar:
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := term ( "&&" term )*
//! term    := "(" expr ")" | field op literal
//! op      := "=" | "==" | "!=" | "<" | ">" | "<=" | ">="
//! literal := integer | "quoted" | 'quoted' | bare_word
//! ```
//!
//! Field names are resolved against the schema and type-checked when the
//! expression is parsed, so evaluation never fails. Integer and bool fields
//! accept integer literals (`true`/`false` also work for bools). String
//! fields accept only `=`/`!=`. A `Null` value fails every comparison.

use crate::fieldset::{FieldType, FieldValue, Fieldset, FieldsetSchema};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("unexpected end of filter expression")]
    UnexpectedEnd,

    #[error("unexpected '{found}' at position {pos}")]
    UnexpectedToken { pos: usize, found: String },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("invalid integer literal '{0}'")]
    BadNumber(String),

    #[error("unknown field '{0}' in filter")]
    UnknownField(String),

    #[error("field '{field}' has type {ty}, cannot compare with {literal}")]
    TypeMismatch {
        field: String,
        ty: FieldType,
        literal: &'static str,
    },

    #[error("operator '{op}' is not supported for {ty} field '{field}'")]
    UnsupportedOperator {
        field: String,
        ty: FieldType,
        op: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
        }
    }

    fn apply<T: Ord>(&self, lhs: T, rhs: T) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Gt => lhs > rhs,
            Self::Le => lhs <= rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Int(u64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Or(Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Cmp { index: usize, op: CmpOp, rhs: Operand },
}

impl Node {
    fn eval(&self, fs: &Fieldset<'_>) -> bool {
        match self {
            Self::Or(a, b) => a.eval(fs) || b.eval(fs),
            Self::And(a, b) => a.eval(fs) && b.eval(fs),
            Self::Cmp { index, op, rhs } => {
                let Ok(value) = fs.get_by_index(*index) else {
                    return false;
                };
                match (value, rhs) {
                    (FieldValue::Str(s), Operand::Str(r)) => op.apply(s.as_str(), r.as_str()),
                    (v, Operand::Int(r)) => match v.as_u64() {
                        Some(l) => op.apply(l, *r),
                        None => false,
                    },
                    _ => false,
                }
            }
        }
    }
}

/// Compiled filter. [`Filter::pass_all`] accepts every fieldset.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    root: Option<Node>,
}

impl Filter {
    pub fn pass_all() -> Self {
        Self { root: None }
    }

    /// Parse `src` against `schema`. An empty or all-whitespace expression
    /// compiles to pass-all.
    pub fn parse(src: &str, schema: &FieldsetSchema) -> Result<Self, FilterError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Ok(Self::pass_all());
        }
        let mut p = Parser {
            tokens,
            pos: 0,
            schema,
        };
        let root = p.expr()?;
        if let Some((pos, tok)) = p.tokens.get(p.pos) {
            return Err(FilterError::UnexpectedToken {
                pos: *pos,
                found: tok.to_string(),
            });
        }
        Ok(Self { root: Some(root) })
    }

    pub fn evaluate(&self, fs: &Fieldset<'_>) -> bool {
        match &self.root {
            None => true,
            Some(node) => node.eval(fs),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tokenizer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Op(CmpOp),
    Word(String),
    Quoted(String),
    Number(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
            Self::Op(op) => write!(f, "{}", op.as_str()),
            Self::Word(w) | Self::Number(w) => write!(f, "{w}"),
            Self::Quoted(s) => write!(f, "\"{s}\""),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, FilterError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let two = bytes.get(i..i + 2);
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'(' => {
                out.push((start, Token::LParen));
                i += 1;
            }
            b')' => {
                out.push((start, Token::RParen));
                i += 1;
            }
            b'&' if two == Some(b"&&") => {
                out.push((start, Token::And));
                i += 2;
            }
            b'|' if two == Some(b"||") => {
                out.push((start, Token::Or));
                i += 2;
            }
            b'=' => {
                i += if two == Some(b"==") { 2 } else { 1 };
                out.push((start, Token::Op(CmpOp::Eq)));
            }
            b'!' if two == Some(b"!=") => {
                out.push((start, Token::Op(CmpOp::Ne)));
                i += 2;
            }
            b'<' | b'>' => {
                let with_eq = bytes.get(i + 1) == Some(&b'=');
                let op = match (c, with_eq) {
                    (b'<', false) => CmpOp::Lt,
                    (b'<', true) => CmpOp::Le,
                    (_, false) => CmpOp::Gt,
                    (_, true) => CmpOp::Ge,
                };
                out.push((start, Token::Op(op)));
                i += if with_eq { 2 } else { 1 };
            }
            b'"' | b'\'' => {
                let rest = &src[i + 1..];
                let end = rest
                    .find(c as char)
                    .ok_or(FilterError::UnterminatedString(start))?;
                out.push((start, Token::Quoted(rest[..end].to_string())));
                i += end + 2;
            }
            b'0'..=b'9' => {
                while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                out.push((start, Token::Number(src[start..i].to_string())));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'-' | b'.' | b':'))
                {
                    i += 1;
                }
                out.push((start, Token::Word(src[start..i].to_string())));
            }
            _ => {
                let found = src[start..].chars().next().map(String::from).unwrap_or_default();
                return Err(FilterError::UnexpectedToken { pos: start, found });
            }
        }
    }
    Ok(out)
}

fn parse_number(s: &str) -> Result<u64, FilterError> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| FilterError::BadNumber(s.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Parser
// ─────────────────────────────────────────────────────────────────────────────

struct Parser<'s> {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    schema: &'s FieldsetSchema,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Token), FilterError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(FilterError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn expr(&mut self) -> Result<Node, FilterError> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            lhs = Node::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Node, FilterError> {
        let mut lhs = self.term()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node, FilterError> {
        match self.next()? {
            (_, Token::LParen) => {
                let inner = self.expr()?;
                match self.next()? {
                    (_, Token::RParen) => Ok(inner),
                    (pos, tok) => Err(FilterError::UnexpectedToken {
                        pos,
                        found: tok.to_string(),
                    }),
                }
            }
            (_, Token::Word(name)) => self.comparison(name),
            (pos, tok) => Err(FilterError::UnexpectedToken {
                pos,
                found: tok.to_string(),
            }),
        }
    }

    fn comparison(&mut self, field: String) -> Result<Node, FilterError> {
        let index = self
            .schema
            .index_of(&field)
            .ok_or_else(|| FilterError::UnknownField(field.clone()))?;
        let ty = self.schema.defs()[index].ty;

        let op = match self.next()? {
            (_, Token::Op(op)) => op,
            (pos, tok) => {
                return Err(FilterError::UnexpectedToken {
                    pos,
                    found: tok.to_string(),
                })
            }
        };

        let (pos, literal) = self.next()?;
        let rhs = match (ty, literal) {
            (FieldType::Int | FieldType::Bool, Token::Number(n)) => Operand::Int(parse_number(&n)?),
            (FieldType::Bool, Token::Word(w)) if w == "true" => Operand::Int(1),
            (FieldType::Bool, Token::Word(w)) if w == "false" => Operand::Int(0),
            (FieldType::Int | FieldType::Bool, Token::Word(_) | Token::Quoted(_)) => {
                return Err(FilterError::TypeMismatch {
                    field,
                    ty,
                    literal: "a string",
                })
            }
            (FieldType::String, Token::Word(s) | Token::Quoted(s) | Token::Number(s)) => {
                if !matches!(op, CmpOp::Eq | CmpOp::Ne) {
                    return Err(FilterError::UnsupportedOperator {
                        field,
                        ty,
                        op: op.as_str(),
                    });
                }
                Operand::Str(s)
            }
            (FieldType::Binary, Token::Word(_) | Token::Quoted(_) | Token::Number(_)) => {
                return Err(FilterError::UnsupportedOperator {
                    field,
                    ty,
                    op: op.as_str(),
                })
            }
            (_, tok) => {
                return Err(FilterError::UnexpectedToken {
                    pos,
                    found: tok.to_string(),
                })
            }
        };
        Ok(Node::Cmp { index, op, rhs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldset::FieldDef;

    const PROBE: &[FieldDef] = &[
        FieldDef::new("sport", FieldType::Int, ""),
        FieldDef::new("classification", FieldType::String, ""),
        FieldDef::new("data", FieldType::Binary, ""),
        FieldDef::new("success", FieldType::Bool, ""),
    ];

    fn schema() -> FieldsetSchema {
        FieldsetSchema::build(PROBE).unwrap()
    }

    fn fs<'s>(s: &'s FieldsetSchema, sport: u64, class: &str, success: bool) -> Fieldset<'s> {
        let mut f = s.new_fieldset();
        f.set_int("sport", sport).unwrap();
        f.set_str("classification", class).unwrap();
        f.set_bool("success", success).unwrap();
        f
    }

    #[test]
    fn test_empty_expression_passes_all() {
        let s = schema();
        let f = Filter::parse("   ", &s).unwrap();
        assert!(f.root.is_none());
        assert!(f.evaluate(&s.new_fieldset()));
    }

    #[test]
    fn test_int_comparisons() {
        let s = schema();
        let rec = fs(&s, 443, "synack", true);
        for (expr, want) in [
            ("sport = 443", true),
            ("sport == 443", true),
            ("sport != 443", false),
            ("sport > 80", true),
            ("sport < 80", false),
            ("sport >= 443", true),
            ("sport <= 442", false),
            ("sport = 0x1bb", true),
        ] {
            let f = Filter::parse(expr, &s).unwrap();
            assert_eq!(f.evaluate(&rec), want, "{expr}");
        }
    }

    #[test]
    fn test_bool_field_compares_as_int() {
        let s = schema();
        let ok = fs(&s, 80, "synack", true);
        let bad = fs(&s, 80, "rst", false);
        let f = Filter::parse("success = 1", &s).unwrap();
        assert!(f.evaluate(&ok));
        assert!(!f.evaluate(&bad));
        let f = Filter::parse("success = false", &s).unwrap();
        assert!(f.evaluate(&bad));
    }

    #[test]
    fn test_string_comparisons() {
        let s = schema();
        let rec = fs(&s, 80, "synack", true);
        assert!(Filter::parse("classification = synack", &s).unwrap().evaluate(&rec));
        assert!(Filter::parse("classification = \"synack\"", &s).unwrap().evaluate(&rec));
        assert!(Filter::parse("classification != 'rst'", &s).unwrap().evaluate(&rec));
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let s = schema();
        let rec = fs(&s, 22, "rst", false);
        // && binds tighter than ||
        let f = Filter::parse("sport = 22 || sport = 80 && success = 1", &s).unwrap();
        assert!(f.evaluate(&rec));
        let f = Filter::parse("(sport = 22 || sport = 80) && success = 1", &s).unwrap();
        assert!(!f.evaluate(&rec));
    }

    #[test]
    fn test_null_value_fails_comparison() {
        let s = schema();
        let empty = s.new_fieldset();
        assert!(!Filter::parse("sport != 1", &s).unwrap().evaluate(&empty));
        assert!(!Filter::parse("classification != x", &s).unwrap().evaluate(&empty));
    }

    #[test]
    fn test_parse_errors() {
        let s = schema();
        assert_eq!(
            Filter::parse("bogus = 1", &s).unwrap_err(),
            FilterError::UnknownField("bogus".into())
        );
        assert!(matches!(
            Filter::parse("sport = synack", &s).unwrap_err(),
            FilterError::TypeMismatch { .. }
        ));
        assert!(matches!(
            Filter::parse("classification > a", &s).unwrap_err(),
            FilterError::UnsupportedOperator { .. }
        ));
        assert!(matches!(
            Filter::parse("data = 1", &s).unwrap_err(),
            FilterError::UnsupportedOperator { .. }
        ));
        assert_eq!(Filter::parse("sport =", &s).unwrap_err(), FilterError::UnexpectedEnd);
        assert!(matches!(
            Filter::parse("(sport = 1", &s).unwrap_err(),
            FilterError::UnexpectedEnd
        ));
        assert!(matches!(
            Filter::parse("sport = 1 sport", &s).unwrap_err(),
            FilterError::UnexpectedToken { pos: 10, .. }
        ));
        assert_eq!(
            Filter::parse("classification = \"open", &s).unwrap_err(),
            FilterError::UnterminatedString(17)
        );
        assert!(matches!(
            Filter::parse("sport = 12abc", &s).unwrap_err(),
            FilterError::BadNumber(_)
        ));
        assert!(matches!(
            Filter::parse("sport # 1", &s).unwrap_err(),
            FilterError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn test_system_fields_filterable() {
        let s = schema();
        let mut rec = fs(&s, 80, "synack", true);
        rec.add_system_fields(false, true, chrono::Utc::now()).unwrap();
        assert!(Filter::parse("repeat = 0 && cooldown = 1", &s).unwrap().evaluate(&rec));
    }
}
