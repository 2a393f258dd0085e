//! PEP 508 environment markers: parsing and evaluation.
//!
//! ```text
//! marker    := or_expr
//! or_expr   := and_expr ('or' and_expr)*
//! and_expr  := atom ('and' atom)*
//! atom      := '(' marker ')' | value op value
//! value     := variable | quoted string
//! op        := '==' | '!=' | '<' | '<=' | '>' | '>=' | '~=' | '===' | 'in' | 'not in'
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::name::normalize;
use crate::specifier::{Operator, Specifier};
use crate::version::Version;

/// Marker variables understood by the evaluator.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MarkerVariable {
    PythonVersion,
    PythonFullVersion,
    ImplementationVersion,
    ImplementationName,
    PlatformPythonImplementation,
    OsName,
    SysPlatform,
    PlatformSystem,
    PlatformMachine,
    PlatformRelease,
    PlatformVersion,
    Extra,
}

impl MarkerVariable {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "python_version" => Self::PythonVersion,
            "python_full_version" => Self::PythonFullVersion,
            "implementation_version" => Self::ImplementationVersion,
            "implementation_name" => Self::ImplementationName,
            "platform_python_implementation"
            | "platform.python_implementation"
            | "python_implementation" => Self::PlatformPythonImplementation,
            "os_name" | "os.name" => Self::OsName,
            "sys_platform" | "sys.platform" => Self::SysPlatform,
            "platform_system" => Self::PlatformSystem,
            "platform_machine" | "platform.machine" => Self::PlatformMachine,
            "platform_release" => Self::PlatformRelease,
            "platform_version" | "platform.version" => Self::PlatformVersion,
            "extra" => Self::Extra,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::PythonVersion => "python_version",
            Self::PythonFullVersion => "python_full_version",
            Self::ImplementationVersion => "implementation_version",
            Self::ImplementationName => "implementation_name",
            Self::PlatformPythonImplementation => "platform_python_implementation",
            Self::OsName => "os_name",
            Self::SysPlatform => "sys_platform",
            Self::PlatformSystem => "platform_system",
            Self::PlatformMachine => "platform_machine",
            Self::PlatformRelease => "platform_release",
            Self::PlatformVersion => "platform_version",
            Self::Extra => "extra",
        }
    }

    fn is_version_like(self) -> bool {
        matches!(
            self,
            Self::PythonVersion | Self::PythonFullVersion | Self::ImplementationVersion
        )
    }
}

/// Values of the marker variables for one interpreter on one platform.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MarkerEnvironment {
    pub python_version: String,
    pub python_full_version: String,
    pub implementation_name: String,
    pub platform_python_implementation: String,
    pub os_name: String,
    pub sys_platform: String,
    pub platform_system: String,
    pub platform_machine: String,
    pub platform_release: String,
    pub platform_version: String,
}

impl MarkerEnvironment {
    fn get(&self, var: MarkerVariable) -> &str {
        match var {
            MarkerVariable::PythonVersion => &self.python_version,
            MarkerVariable::PythonFullVersion | MarkerVariable::ImplementationVersion => {
                &self.python_full_version
            }
            MarkerVariable::ImplementationName => &self.implementation_name,
            MarkerVariable::PlatformPythonImplementation => &self.platform_python_implementation,
            MarkerVariable::OsName => &self.os_name,
            MarkerVariable::SysPlatform => &self.sys_platform,
            MarkerVariable::PlatformSystem => &self.platform_system,
            MarkerVariable::PlatformMachine => &self.platform_machine,
            MarkerVariable::PlatformRelease => &self.platform_release,
            MarkerVariable::PlatformVersion => &self.platform_version,
            MarkerVariable::Extra => "",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MarkerOp {
    Version(Operator),
    In,
    NotIn,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum MarkerValue {
    Variable(MarkerVariable),
    Literal(String),
}

/// A parsed marker expression tree.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum MarkerTree {
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
    Compare {
        lhs: MarkerValue,
        op: MarkerOp,
        rhs: MarkerValue,
    },
}

impl MarkerTree {
    pub fn parse(input: &str) -> Result<Self, String> {
        let tokens = tokenize(input)?;
        let mut parser = MarkerParser { tokens, pos: 0 };
        let tree = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(format!("unexpected `{}` in marker", parser.tokens[parser.pos]));
        }
        Ok(tree)
    }

    /// Evaluate against `env` with the given set of requested extras.
    ///
    /// An `extra == "x"` comparison holds when `x` is among `extras`.
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &BTreeSet<String>) -> bool {
        match self {
            Self::And(children) => children.iter().all(|c| c.evaluate(env, extras)),
            Self::Or(children) => children.iter().any(|c| c.evaluate(env, extras)),
            Self::Compare { lhs, op, rhs } => {
                let mentions_extra = [lhs, rhs]
                    .iter()
                    .any(|v| matches!(v, MarkerValue::Variable(MarkerVariable::Extra)));
                if mentions_extra {
                    if extras.is_empty() {
                        return compare(lhs, *op, rhs, env, "");
                    }
                    extras.iter().any(|extra| compare(lhs, *op, rhs, env, extra))
                } else {
                    compare(lhs, *op, rhs, env, "")
                }
            }
        }
    }
}

fn resolve<'a>(value: &'a MarkerValue, env: &'a MarkerEnvironment, extra: &'a str) -> &'a str {
    match value {
        MarkerValue::Variable(MarkerVariable::Extra) => extra,
        MarkerValue::Variable(var) => env.get(*var),
        MarkerValue::Literal(s) => s,
    }
}

fn compare(
    lhs: &MarkerValue,
    op: MarkerOp,
    rhs: &MarkerValue,
    env: &MarkerEnvironment,
    extra: &str,
) -> bool {
    let is_extra = |v: &MarkerValue| matches!(v, MarkerValue::Variable(MarkerVariable::Extra));
    let (left, right) = if is_extra(lhs) || is_extra(rhs) {
        (normalize(resolve(lhs, env, extra)), normalize(resolve(rhs, env, extra)))
    } else {
        (resolve(lhs, env, extra).to_string(), resolve(rhs, env, extra).to_string())
    };
    let version_like = [lhs, rhs]
        .iter()
        .any(|v| matches!(v, MarkerValue::Variable(var) if var.is_version_like()));

    match op {
        MarkerOp::In => right.contains(left.as_str()),
        MarkerOp::NotIn => !right.contains(left.as_str()),
        MarkerOp::Version(operator) => {
            if version_like {
                let spec_text = format!("{operator}{right}");
                if let (Ok(spec), Ok(candidate)) =
                    (Specifier::parse(&spec_text), Version::parse(&left))
                {
                    return spec.contains(&candidate);
                }
            }
            match operator {
                Operator::Equal | Operator::Arbitrary => left == right,
                Operator::NotEqual => left != right,
                // Ordering on plain strings is undefined; treat it as not matching.
                _ => false,
            }
        }
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(var) => f.write_str(var.name()),
            Self::Literal(s) => write!(f, "\"{s}\""),
        }
    }
}

impl fmt::Display for MarkerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(op) => write!(f, "{op}"),
            Self::In => f.write_str("in"),
            Self::NotIn => f.write_str("not in"),
        }
    }
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, children: &[MarkerTree], sep: &str| -> fmt::Result {
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                match child {
                    MarkerTree::Compare { .. } => write!(f, "{child}")?,
                    _ => write!(f, "({child})")?,
                }
            }
            Ok(())
        };
        match self {
            Self::And(children) => join(f, children, "and"),
            Self::Or(children) => join(f, children, "or"),
            Self::Compare { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Token {
    LParen,
    RParen,
    Op(MarkerOp),
    And,
    Or,
    Ident(String),
    Str(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::Op(op) => write!(f, "{op}"),
            Self::And => f.write_str("and"),
            Self::Or => f.write_str("or"),
            Self::Ident(s) => f.write_str(s),
            Self::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ch)
                    .ok_or_else(|| "unterminated string in marker".to_string())?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '=' | '!' | '<' | '>' | '~' => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let (op, tail) = Operator::split_prefix(&rest)
                    .ok_or_else(|| format!("invalid operator at `{rest}`"))?;
                tokens.push(Token::Op(MarkerOp::Version(op)));
                i += rest.len() - tail.len();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "in" => tokens.push(Token::Op(MarkerOp::In)),
                    "not" => {
                        if tokens_follow(&chars, i, "in") {
                            while chars[i].is_whitespace() {
                                i += 1;
                            }
                            i += 2;
                            tokens.push(Token::Op(MarkerOp::NotIn));
                        } else {
                            return Err("expected `in` after `not`".to_string());
                        }
                    }
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => return Err(format!("unexpected character `{other}` in marker")),
        }
    }
    Ok(tokens)
}

/// Whether the next non-blank word after `pos` is `word`.
fn tokens_follow(chars: &[char], pos: usize, word: &str) -> bool {
    let rest: String = chars[pos..].iter().collect();
    let rest = rest.trim_start();
    rest.starts_with(word)
        && !rest[word.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct MarkerParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl MarkerParser {
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or_expr(&mut self) -> Result<MarkerTree, String> {
        let mut children = vec![self.and_expr()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            children.push(self.and_expr()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            MarkerTree::Or(children)
        })
    }

    fn and_expr(&mut self) -> Result<MarkerTree, String> {
        let mut children = vec![self.atom()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            children.push(self.atom()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            MarkerTree::And(children)
        })
    }

    fn atom(&mut self) -> Result<MarkerTree, String> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.or_expr()?;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                _ => Err("expected `)` in marker".to_string()),
            };
        }
        let lhs = self.value()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            other => {
                return Err(format!(
                    "expected a comparison operator, found `{}`",
                    other.map(|t| t.to_string()).unwrap_or_else(|| "end of marker".into())
                ))
            }
        };
        let rhs = self.value()?;
        Ok(MarkerTree::Compare { lhs, op, rhs })
    }

    fn value(&mut self) -> Result<MarkerValue, String> {
        match self.next() {
            Some(Token::Str(s)) => Ok(MarkerValue::Literal(s)),
            Some(Token::Ident(name)) => MarkerVariable::from_name(&name)
                .map(MarkerValue::Variable)
                .ok_or_else(|| format!("unknown marker variable `{name}`")),
            Some(other) => Err(format!("expected a marker value, found `{other}`")),
            None => Err("unexpected end of marker".to_string()),
        }
    }
}
