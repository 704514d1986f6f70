//! A tiny boolean expression grammar for content-rule selectors (spec.md §9
//! design note: parse once per schema load rather than interpret a runtime
//! string). Tokens: identifier, string literal, `==`, `!=`, `&&`, `||`,
//! `in`, parentheses.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub enum Term {
    Ident(String),
    Str(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Eq(Term, Term),
    Ne(Term, Term),
    In(Term, Term),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A resolved binding for an identifier in the evaluation environment.
#[derive(Debug, Clone)]
pub enum EnvValue {
    Str(String),
    Set(Vec<String>),
}

pub type Env = BTreeMap<String, EnvValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    In,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let mut j = i + 1;
                let mut s = String::new();
                while j < chars.len() && chars[j] != '"' {
                    s.push(chars[j]);
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(format!("unterminated string literal in selector {src:?}"));
                }
                tokens.push(Token::Str(s));
                i = j + 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut j = i;
                let mut ident = String::new();
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                    ident.push(chars[j]);
                    j += 1;
                }
                tokens.push(if ident == "in" { Token::In } else { Token::Ident(ident) });
                i = j;
            }
            other => return Err(format!("unexpected character {other:?} in selector {src:?}")),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OrOr)) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek(), Some(Token::AndAnd)) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            let inner = self.parse_expr()?;
            return match self.advance() {
                Some(Token::RParen) => Ok(inner),
                other => Err(format!("expected closing parenthesis, found {other:?}")),
            };
        }
        let left = self.parse_term()?;
        let op = self.advance().ok_or("expected comparison operator")?;
        let right = self.parse_term()?;
        match op {
            Token::EqEq => Ok(Expr::Eq(left, right)),
            Token::NotEq => Ok(Expr::Ne(left, right)),
            Token::In => Ok(Expr::In(left, right)),
            other => Err(format!("unexpected operator token: {other:?}")),
        }
    }

    fn parse_term(&mut self) -> Result<Term, String> {
        match self.advance() {
            Some(Token::Ident(s)) => Ok(Term::Ident(s)),
            Some(Token::Str(s)) => Ok(Term::Str(s)),
            other => Err(format!("expected identifier or string literal, found {other:?}")),
        }
    }
}

/// Parse a single selector expression.
///
/// # Errors
///
/// Returns a description of the first malformed token or unexpected trailing
/// input.
pub fn parse(selector: &str) -> Result<Expr, String> {
    let tokens = tokenize(selector)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing tokens after parsing selector {selector:?}"));
    }
    Ok(expr)
}

#[must_use]
pub fn eval(expr: &Expr, env: &Env) -> bool {
    match expr {
        Expr::Eq(l, r) => resolve_str(l, env) == resolve_str(r, env),
        Expr::Ne(l, r) => resolve_str(l, env) != resolve_str(r, env),
        Expr::In(l, r) => resolve_set(r, env).is_some_and(|set| set.contains(&resolve_str(l, env))),
        Expr::And(l, r) => eval(l, env) && eval(r, env),
        Expr::Or(l, r) => eval(l, env) || eval(r, env),
    }
}

fn resolve_str(term: &Term, env: &Env) -> String {
    match term {
        Term::Str(s) => s.clone(),
        Term::Ident(name) => match env.get(name) {
            Some(EnvValue::Str(s)) => s.clone(),
            _ => String::new(),
        },
    }
}

fn resolve_set(term: &Term, env: &Env) -> Option<Vec<String>> {
    match term {
        Term::Ident(name) => match env.get(name) {
            Some(EnvValue::Set(s)) => Some(s.clone()),
            _ => None,
        },
        Term::Str(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_for(extension: &str, suffix: &str, base_dir: &str) -> Env {
        let mut env = Env::new();
        env.insert("extension".to_string(), EnvValue::Str(extension.to_string()));
        env.insert("suffix".to_string(), EnvValue::Str(suffix.to_string()));
        env.insert("baseDir".to_string(), EnvValue::Str(base_dir.to_string()));
        env
    }

    #[test]
    fn parses_and_evaluates_equality() {
        let expr = parse("extension == \".csv\"").unwrap();
        assert!(eval(&expr, &env_for(".csv", "data", "data")));
        assert!(!eval(&expr, &env_for(".json", "data", "data")));
    }

    #[test]
    fn parses_and_evaluates_conjunction() {
        let expr = parse("extension == \".csv\" && suffix == \"data\"").unwrap();
        assert!(eval(&expr, &env_for(".csv", "data", "data")));
        assert!(!eval(&expr, &env_for(".csv", "events", "data")));
    }

    #[test]
    fn parses_and_evaluates_disjunction() {
        let expr = parse("baseDir == \"data\" || baseDir == \"/\"").unwrap();
        assert!(eval(&expr, &env_for(".csv", "data", "/")));
    }

    #[test]
    fn membership_checks_set_bindings() {
        let mut env = Env::new();
        env.insert(
            "keywords".to_string(),
            EnvValue::Set(vec!["sub".to_string(), "task".to_string()]),
        );
        let expr = parse("\"sub\" in keywords").unwrap();
        assert!(eval(&expr, &env));
        let expr = parse("\"run\" in keywords").unwrap();
        assert!(!eval(&expr, &env));
    }

    #[test]
    fn rejects_unterminated_string_literal() {
        assert!(parse("extension == \".csv").is_err());
    }
}
