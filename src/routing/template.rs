//! Reverse a URL regex into concrete templates
//!
//! A regex such as `/accounts/(?P<id>\d+)(?:/history)?` describes many URLs.
//! To build one we reduce it to the smallest representative strings, keeping
//! named groups as placeholders:
//!
//! - anchors are dropped, escapes become a representative character
//!   (`\d` -> `0`, `\w` -> `x`, `\s` -> space)
//! - a character class becomes its first member (`x` when negated)
//! - `?` and `*` keep zero occurrences, plus one occurrence when the element
//!   carries placeholders; `+` and `{m,n}` keep their minimum
//! - alternation keeps its first branch
//! - unnamed groups are transparent, flag-only groups vanish

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One piece of a concrete template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    Param(String),
}

/// A concrete URL template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    fn from_pieces(raw: Vec<Piece>) -> Self {
        let mut pieces: Vec<Piece> = Vec::with_capacity(raw.len());
        for piece in raw {
            match (pieces.last_mut(), piece) {
                (Some(Piece::Literal(prev)), Piece::Literal(next)) => prev.push_str(&next),
                (_, Piece::Literal(next)) if next.is_empty() => {}
                (_, piece) => pieces.push(piece),
            }
        }
        Self { pieces }
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Placeholder names, deduplicated
    pub fn params(&self) -> BTreeSet<&str> {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Param(name) => Some(name.as_str()),
                Piece::Literal(_) => None,
            })
            .collect()
    }

    /// True when the placeholders are exactly `keys`
    pub fn accepts(&self, keys: &BTreeSet<&str>) -> bool {
        self.params() == *keys
    }

    /// Substitute every placeholder. Missing values render empty.
    pub fn render(&self, values: &BTreeMap<&str, &str>) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Param(name) => out.push_str(values.get(name.as_str()).copied().unwrap_or("")),
            }
        }
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => f.write_str(text)?,
                Piece::Param(name) => write!(f, "{{{}}}", name)?,
            }
        }
        Ok(())
    }
}

type Variants = Vec<Vec<Piece>>;

/// Reduce a regex to its concrete templates, in preference order
///
/// The input is expected to be a valid regex; unbalanced input is read
/// leniently rather than rejected.
pub fn normalize(pattern: &str) -> Vec<Template> {
    let mut parser = Parser {
        chars: pattern.chars().collect(),
        pos: 0,
    };

    let mut variants = Vec::new();
    loop {
        variants.extend(parser.sequence());
        // stray closing parenthesis at top level
        if parser.peek() == Some(')') {
            parser.pos += 1;
            continue;
        }
        break;
    }

    let mut templates: Vec<Template> = Vec::new();
    for variant in variants {
        let template = Template::from_pieces(variant);
        if !templates.contains(&template) {
            templates.push(template);
        }
    }
    templates
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Parse up to the closing parenthesis of the current level (not consumed)
    fn sequence(&mut self) -> Variants {
        let mut variants: Variants = vec![Vec::new()];
        while let Some(c) = self.peek() {
            match c {
                ')' => break,
                '|' => {
                    self.pos += 1;
                    self.skip_to_group_end();
                    break;
                }
                _ => {
                    let element = self.element();
                    let element = self.quantified(element);
                    variants = product(&variants, &element);
                }
            }
        }
        variants
    }

    fn element(&mut self) -> Variants {
        let literal = |s: String| vec![vec![Piece::Literal(s)]];
        match self.bump() {
            Some('^') | Some('$') | None => vec![Vec::new()],
            Some('\\') => literal(self.escape()),
            Some('[') => literal(self.class()),
            Some('(') => self.group(),
            Some(c) => literal(c.to_string()),
        }
    }

    /// Called after the backslash
    fn escape(&mut self) -> String {
        match self.bump() {
            Some('d') => "0".into(),
            Some('w') | Some('D') | Some('S') => "x".into(),
            Some('s') => " ".into(),
            Some('W') => "!".into(),
            Some('A') | Some('b') | Some('B') | Some('z') | Some('Z') => String::new(),
            Some('n') => "\n".into(),
            Some('t') => "\t".into(),
            Some(c) => c.to_string(),
            None => String::new(),
        }
    }

    /// Called after the opening bracket
    fn class(&mut self) -> String {
        let negated = if self.peek() == Some('^') {
            self.pos += 1;
            true
        } else {
            false
        };

        let first = match self.peek() {
            Some('\\') => {
                self.pos += 1;
                self.escape()
            }
            Some('[') => {
                self.pos += 1;
                self.skip_class();
                "x".into()
            }
            Some(c) => {
                self.pos += 1;
                c.to_string()
            }
            None => String::new(),
        };
        self.skip_class();

        if negated {
            "x".into()
        } else {
            first
        }
    }

    /// Advance past the bracket closing the current class
    fn skip_class(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.pos += 1;
                }
                '[' => depth += 1,
                ']' if depth == 0 => return,
                ']' => depth -= 1,
                _ => {}
            }
        }
    }

    /// Called after the opening parenthesis
    fn group(&mut self) -> Variants {
        if self.peek() != Some('?') {
            return self.group_body();
        }
        self.pos += 1;

        let named = match (self.peek(), self.peek_at(1)) {
            (Some('P'), Some('<')) => {
                self.pos += 2;
                true
            }
            (Some('<'), Some(c)) if c != '=' && c != '!' => {
                self.pos += 1;
                true
            }
            _ => false,
        };

        if named {
            let mut name = String::new();
            while let Some(c) = self.bump() {
                if c == '>' {
                    break;
                }
                name.push(c);
            }
            self.skip_to_group_end();
            self.pos += 1;
            return vec![vec![Piece::Param(name)]];
        }

        // flags, possibly scoped: (?i) or (?i:...)
        while let Some(c) = self.peek() {
            match c {
                ':' => {
                    self.pos += 1;
                    return self.group_body();
                }
                ')' => {
                    self.pos += 1;
                    return vec![Vec::new()];
                }
                c if c.is_ascii_alphabetic() || c == '-' => self.pos += 1,
                _ => break,
            }
        }

        // anything else contributes nothing
        self.skip_to_group_end();
        self.pos += 1;
        vec![Vec::new()]
    }

    fn group_body(&mut self) -> Variants {
        let inner = self.sequence();
        if self.peek() == Some(')') {
            self.pos += 1;
        }
        inner
    }

    /// Skip to the parenthesis closing the current group, leaving it unconsumed
    fn skip_to_group_end(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '\\' => self.pos += 1,
                '[' => {
                    self.pos += 1;
                    self.skip_class();
                    continue;
                }
                '(' => depth += 1,
                ')' if depth == 0 => return,
                ')' => depth -= 1,
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn quantified(&mut self, element: Variants) -> Variants {
        let min = match self.peek() {
            Some('?') | Some('*') => {
                self.pos += 1;
                0
            }
            Some('+') => {
                self.pos += 1;
                1
            }
            Some('{') => match self.repetition() {
                Some(min) => min,
                None => return element,
            },
            _ => return element,
        };

        // lazy or possessive suffix
        if matches!(self.peek(), Some('?') | Some('+')) {
            self.pos += 1;
        }

        let has_params = element
            .iter()
            .any(|v| v.iter().any(|p| matches!(p, Piece::Param(_))));

        if min == 0 {
            let mut out: Variants = vec![Vec::new()];
            if has_params {
                out.extend(element);
            }
            return out;
        }

        let mut out = element.clone();
        for _ in 1..min {
            out = product(&out, &element);
        }
        out
    }

    /// `{m}`, `{m,}` or `{m,n}`; returns `m`, consuming nothing when malformed
    fn repetition(&mut self) -> Option<usize> {
        let start = self.pos;
        self.pos += 1;

        let mut digits = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            digits.push(c);
            self.pos += 1;
        }
        if self.peek() == Some(',') {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        match (self.peek(), digits.parse::<usize>()) {
            (Some('}'), Ok(min)) => {
                self.pos += 1;
                Some(min)
            }
            _ => {
                self.pos = start;
                None
            }
        }
    }
}

fn product(left: &Variants, right: &Variants) -> Variants {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut v = l.clone();
            v.extend(r.iter().cloned());
            out.push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(pattern: &str) -> Vec<String> {
        normalize(pattern).iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_literal_and_named_group() {
        assert_eq!(rendered(r"/accounts/(?P<id>\d+)"), vec!["/accounts/{id}"]);
        assert_eq!(rendered(r"^/login$"), vec!["/login"]);
    }

    #[test]
    fn test_escapes_and_classes() {
        assert_eq!(rendered(r"/a\.html"), vec!["/a.html"]);
        assert_eq!(rendered(r"/page\d+"), vec!["/page0"]);
        assert_eq!(rendered(r"/[abc]/[^/]"), vec!["/a/x"]);
        assert_eq!(rendered(r"http://test\.com/\?id=(?P<id>\d+)&name=(?P<name>.+)"),
            vec!["http://test.com/?id={id}&name={name}"]);
    }

    #[test]
    fn test_optional_group_with_params() {
        assert_eq!(
            rendered(r"/list(?:/(?P<page>\d+))?"),
            vec!["/list", "/list/{page}"]
        );
    }

    #[test]
    fn test_optional_without_params_is_dropped() {
        assert_eq!(rendered(r"/history/?"), vec!["/history"]);
        assert_eq!(rendered(r"/x(?:\.html)*"), vec!["/x"]);
    }

    #[test]
    fn test_repetition_minimum() {
        assert_eq!(rendered(r"/a{3}"), vec!["/aaa"]);
        assert_eq!(rendered(r"/b{2,5}c"), vec!["/bbc"]);
        assert_eq!(rendered(r"/c{0,1}d"), vec!["/d"]);
    }

    #[test]
    fn test_alternation_takes_first_branch() {
        assert_eq!(rendered(r"/(?:fr|en)/home"), vec!["/fr/home"]);
        assert_eq!(rendered(r"/one|/two"), vec!["/one"]);
    }

    #[test]
    fn test_flags_and_unnamed_groups() {
        assert_eq!(rendered(r"(?i)/Login"), vec!["/Login"]);
        assert_eq!(rendered(r"/(abc)/(?s:d.)"), vec!["/abc/d."]);
    }

    #[test]
    fn test_params_and_accepts() {
        let template = &normalize(r"/(?P<a>\w+)/(?P<b>\d+)")[0];
        let keys: BTreeSet<&str> = ["a", "b"].into_iter().collect();
        assert!(template.accepts(&keys));
        assert!(!template.accepts(&["a"].into_iter().collect()));

        let values: BTreeMap<&str, &str> = [("a", "x"), ("b", "1")].into_iter().collect();
        assert_eq!(template.render(&values), "/x/1");
    }
}
