//! A reduced CUE-like expression evaluator.
//!
//! `(templateSources, paramSchema, args) -> evaluatedValue` is treated as a
//! pure, referentially transparent transform and isolated behind this one
//! module so a real CUE evaluator can substitute for it later without the
//! rest of the renderer noticing. It implements the subset of CUE that
//! addon templates in the wild actually use: object/array/scalar literals,
//! `*default | type` fields, `parameter.`/`context.` references, simple
//! string interpolation, and `package` headers for file unification. It
//! does not implement CUE's full unification lattice, disjunction, or
//! constraint solver.

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::CharIndices;

use serde_json::Value;

use addon_definitions::error::AddonError;
use addon_definitions::Result;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    Colon,
    Comma,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Pipe,
    Star,
    Dot,
}

struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Lexer<'a> {
        Lexer { chars: src.char_indices().peekable(), src }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        while let Some(&(i, c)) = self.chars.peek() {
            match c {
                ',' => {
                    self.chars.next();
                    out.push(Token::Comma);
                }
                ' ' | '\t' | '\r' | '\n' => {
                    self.chars.next();
                }
                '/' => {
                    self.chars.next();
                    if let Some(&(_, '/')) = self.chars.peek() {
                        while let Some(&(_, c)) = self.chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.chars.next();
                        }
                    } else {
                        return Err(AddonError::parse("cue source", format!("unexpected '/' at byte {}", i)).into());
                    }
                }
                '{' => {
                    self.chars.next();
                    out.push(Token::LBrace);
                }
                '}' => {
                    self.chars.next();
                    out.push(Token::RBrace);
                }
                '[' => {
                    self.chars.next();
                    out.push(Token::LBracket);
                }
                ']' => {
                    self.chars.next();
                    out.push(Token::RBracket);
                }
                ':' => {
                    self.chars.next();
                    out.push(Token::Colon);
                }
                '|' => {
                    self.chars.next();
                    out.push(Token::Pipe);
                }
                '*' => {
                    self.chars.next();
                    out.push(Token::Star);
                }
                '.' => {
                    self.chars.next();
                    out.push(Token::Dot);
                }
                '"' => {
                    out.push(self.lex_string()?);
                }
                c if c == '-' || c.is_ascii_digit() => {
                    out.push(self.lex_number());
                }
                c if c.is_alphabetic() || c == '_' || c == '$' => {
                    out.push(self.lex_ident());
                }
                _ => {
                    return Err(AddonError::parse("cue source", format!("unexpected character '{}' at byte {}", c, i)).into());
                }
            }
        }
        Ok(out)
    }

    fn lex_string(&mut self) -> Result<Token> {
        self.chars.next(); // opening quote
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => break,
                Some((_, '\\')) => {
                    match self.chars.next() {
                        Some((_, 'n')) => s.push('\n'),
                        Some((_, 't')) => s.push('\t'),
                        Some((_, '"')) => s.push('"'),
                        Some((_, '\\')) => s.push('\\'),
                        Some((_, other)) => s.push(other),
                        None => return Err(AddonError::parse("cue source", "unterminated escape").into()),
                    }
                }
                Some((_, c)) => s.push(c),
                None => return Err(AddonError::parse("cue source", "unterminated string literal").into()),
            }
        }
        Ok(Token::Str(s))
    }

    fn lex_number(&mut self) -> Token {
        let start = self.chars.peek().map(|&(i, _)| i).unwrap_or(0);
        let mut end = start;
        if let Some(&(_, '-')) = self.chars.peek() {
            self.chars.next();
        }
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        Token::Num(text.parse().unwrap_or(0.0))
    }

    fn lex_ident(&mut self) -> Token {
        let start = self.chars.peek().map(|&(i, _)| i).unwrap_or(0);
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '$' {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        match text {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            other => Token::Ident(other.to_string()),
        }
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a Value,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat_comma(&mut self) {
        while matches!(self.peek(), Some(Token::Comma)) {
            self.pos += 1;
        }
    }

    /// Parses zero or more top-level fields, skipping a leading `package
    /// IDENT` clause if present.
    fn parse_document(&mut self) -> Result<serde_json::Map<String, Value>> {
        if let (Some(Token::Ident(kw)), Some(Token::Ident(_))) =
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1))
        {
            if kw == "package" {
                self.pos += 2;
            }
        }
        self.parse_fields()
    }

    fn parse_fields(&mut self) -> Result<serde_json::Map<String, Value>> {
        let mut map = serde_json::Map::new();
        loop {
            self.eat_comma();
            match self.peek() {
                None | Some(Token::RBrace) => break,
                Some(Token::Ident(_)) | Some(Token::Str(_)) => {
                    let name = match self.next().unwrap() {
                        Token::Ident(s) | Token::Str(s) => s,
                        _ => unreachable!(),
                    };
                    match self.next() {
                        Some(Token::Colon) => {}
                        other => {
                            return Err(AddonError::parse(
                                "cue source",
                                format!("expected ':' after field '{}', found {:?}", name, other),
                            )
                            .into())
                        }
                    }
                    let value = self.parse_value()?;
                    map.insert(name, value);
                    self.eat_comma();
                }
                other => {
                    return Err(AddonError::parse("cue source", format!("unexpected token {:?} in field list", other)).into())
                }
            }
        }
        Ok(map)
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek().cloned() {
            Some(Token::Star) => {
                self.pos += 1;
                let default = self.parse_value()?;
                // optional `| type-or-alternatives`: consume and discard
                // everything up to the next comma/brace at this depth.
                if matches!(self.peek(), Some(Token::Pipe)) {
                    self.pos += 1;
                    self.skip_disjunction_tail()?;
                }
                Ok(default)
            }
            Some(Token::LBrace) => {
                self.pos += 1;
                let map = self.parse_fields()?;
                match self.next() {
                    Some(Token::RBrace) => Ok(Value::Object(map)),
                    other => Err(AddonError::parse("cue source", format!("expected '}}', found {:?}", other)).into()),
                }
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.eat_comma();
                    if matches!(self.peek(), Some(Token::RBracket)) {
                        break;
                    }
                    items.push(self.parse_value()?);
                    self.eat_comma();
                }
                self.pos += 1; // ']'
                Ok(Value::Array(items))
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(Value::String(self.interpolate(&s)))
            }
            Some(Token::Num(n)) => {
                self.pos += 1;
                Ok(serde_json::json!(n))
            }
            Some(Token::True) => {
                self.pos += 1;
                Ok(Value::Bool(true))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Value::Bool(false))
            }
            Some(Token::Null) => {
                self.pos += 1;
                Ok(Value::Null)
            }
            Some(Token::Ident(_)) => self.parse_reference(),
            other => Err(AddonError::parse("cue source", format!("unexpected token {:?} in value position", other)).into()),
        }
    }

    /// A bare-type disjunction tail (`string`, `int & >0`, `"a" | "b"`, a
    /// trailing value literal, ...) is discarded -- only the default
    /// picked by the leading `*` matters to this evaluator.
    fn skip_disjunction_tail(&mut self) -> Result<()> {
        let mut depth = 0i32;
        while let Some(t) = self.peek() {
            match t {
                Token::LBrace | Token::LBracket => {
                    depth += 1;
                    self.pos += 1;
                }
                Token::RBrace | Token::RBracket if depth > 0 => {
                    depth -= 1;
                    self.pos += 1;
                }
                Token::RBrace | Token::RBracket => break,
                Token::Comma if depth == 0 => break,
                _ => {
                    self.pos += 1;
                }
            }
        }
        Ok(())
    }

    /// `parameter.foo.bar` / `context.clusterName` -- the only two bound
    /// roots this evaluator resolves references against. Anything else
    /// resolves to `null` (an unbound identifier in a reduced evaluator,
    /// rather than a hard parse failure, since templates may reference
    /// names this evaluator doesn't track, e.g. comprehension variables).
    fn parse_reference(&mut self) -> Result<Value> {
        let mut path = Vec::new();
        match self.next() {
            Some(Token::Ident(s)) => path.push(s),
            other => return Err(AddonError::parse("cue source", format!("expected identifier, found {:?}", other)).into()),
        }
        while matches!(self.peek(), Some(Token::Dot)) {
            self.pos += 1;
            match self.next() {
                Some(Token::Ident(s)) => path.push(s),
                other => return Err(AddonError::parse("cue source", format!("expected identifier after '.', found {:?}", other)).into()),
            }
        }
        Ok(lookup(self.ctx, &path).unwrap_or(Value::Null))
    }

    fn interpolate(&self, s: &str) -> String {
        // `\(parameter.foo)` interpolation -- resolved against the same
        // context as bare references.
        let mut out = String::new();
        let mut rest = s;
        while let Some(start) = rest.find("\\(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            if let Some(end) = after.find(')') {
                let expr = &after[..end];
                let path: Vec<String> = expr.split('.').map(str::to_string).collect();
                let resolved = lookup(self.ctx, &path).unwrap_or(Value::Null);
                out.push_str(&value_to_display(&resolved));
                rest = &after[end + 1..];
            } else {
                out.push_str("\\(");
                rest = after;
            }
        }
        out.push_str(rest);
        out
    }
}

fn value_to_display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn lookup(root: &Value, path: &[String]) -> Option<Value> {
    let mut cur = root;
    for seg in path {
        cur = cur.get(seg)?;
    }
    Some(cur.clone())
}

/// Parses one CUE source document into a JSON object of its top-level
/// fields, resolving `parameter.*`/`context.*` references against `ctx`.
/// `ctx` is expected to carry a `parameter` key (the merged parameter
/// scope) and a `context` key (addon/render context such as `name`,
/// `namespace`, `clusterName`).
pub fn parse_document(src: &str, ctx: &Value) -> Result<Value> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0, ctx };
    let map = parser.parse_document()?;
    Ok(Value::Object(map))
}

/// Parses `parameter.cue` into a defaults document: every declared
/// top-level field maps to its default (or `null` if the field has no
/// default, meaning it's still "declared" but required). No `context`
/// binding is available while parsing the parameter scope itself.
pub fn parse_parameter_schema(src: &str) -> Result<Value> {
    parse_document(src, &Value::Null)
}

/// Deep-merges several parsed package-member documents into one scope
/// (CUE's unification, reduced to "later object fields win" rather than
/// full lattice-meet semantics).
pub fn unify(docs: &[Value]) -> Value {
    let mut merged = Value::Object(Default::default());
    for doc in docs {
        merged = addon_definitions::merge::merge_args(&merged, doc);
    }
    merged
}

/// Builds a render context: `{"parameter": <merged params>, "context": <addon context>}`,
/// the shape every `parse_document` call is evaluated against.
pub fn render_context(parameters: Value, addon_context: BTreeMap<String, Value>) -> Value {
    serde_json::json!({ "parameter": parameters, "context": addon_context })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_and_array_literals() {
        let ctx = Value::Null;
        let out = parse_document(r#"name: "demo", count: 2, tags: ["a", "b"], nested: {x: true}"#, &ctx).unwrap();
        assert_eq!(out["name"], "demo");
        assert_eq!(out["count"], 2.0);
        assert_eq!(out["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(out["nested"]["x"], true);
    }

    #[test]
    fn default_constrained_field_picks_default() {
        let ctx = Value::Null;
        let out = parse_document(r#"replicas: *1 | int"#, &ctx).unwrap();
        assert_eq!(out["replicas"], 1.0);
    }

    #[test]
    fn resolves_parameter_and_context_references() {
        let ctx = render_context(
            serde_json::json!({"image": "nginx:1.0"}),
            [("name".to_string(), serde_json::json!("my-addon"))].into_iter().collect(),
        );
        let out = parse_document(
            r#"output: {image: parameter.image, label: "addon-\(context.name)"}"#,
            &ctx,
        )
        .unwrap();
        assert_eq!(out["output"]["image"], "nginx:1.0");
        assert_eq!(out["output"]["label"], "addon-my-addon");
    }

    #[test]
    fn skips_package_header() {
        let ctx = Value::Null;
        let out = parse_document("package main\noutput: {replicas: 1}", &ctx).unwrap();
        assert_eq!(out["output"]["replicas"], 1.0);
    }

    #[test]
    fn unify_merges_package_member_documents() {
        let a = serde_json::json!({"output": {"a": 1}});
        let b = serde_json::json!({"output": {"b": 2}});
        let merged = unify(&[a, b]);
        assert_eq!(merged["output"]["a"], 1);
        assert_eq!(merged["output"]["b"], 2);
    }
}
