//! Selector grammar
//!
//! ```text
//! selector := entity tail | indexed tail | key tail
//! entity   := ("rule" | "section") "[" field "=" value "]"
//! field    := "id" | "fingerprint" | "heading"
//! value    := quoted | bare          (bare runs until ']')
//! indexed  := key "[" digits "]"
//! tail     := ( "." key | "[" digits "]" )*
//! key      := any chars except . [ ] = and whitespace
//! ```

use std::fmt;

use crate::error::SelectorError;

/// Kind of logical entity an entity selector addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Rule,
    Section,
}

/// Field an entity selector matches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityField {
    /// Alias of `Fingerprint`
    Id,
    Fingerprint,
    /// Compared after heading normalization
    Heading,
}

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Entity {
        kind: EntityKind,
        field: EntityField,
        value: String,
        path: Vec<PathSegment>,
    },
    Index {
        collection: String,
        index: usize,
        path: Vec<PathSegment>,
    },
    Path(Vec<PathSegment>),
}

impl Selector {
    /// Path that follows the entity or index root (the whole path for `Path`).
    pub fn tail(&self) -> &[PathSegment] {
        match self {
            Self::Entity { path, .. } | Self::Index { path, .. } => path,
            Self::Path(path) => path,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule => write!(f, "rule"),
            Self::Section => write!(f, "section"),
        }
    }
}

impl fmt::Display for EntityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id => write!(f, "id"),
            Self::Fingerprint => write!(f, "fingerprint"),
            Self::Heading => write!(f, "heading"),
        }
    }
}

fn write_path(f: &mut fmt::Formatter<'_>, path: &[PathSegment], leading_dot: bool) -> fmt::Result {
    for (i, segment) in path.iter().enumerate() {
        match segment {
            PathSegment::Key(key) if i == 0 && !leading_dot => write!(f, "{}", key)?,
            PathSegment::Key(key) => write!(f, ".{}", key)?,
            PathSegment::Index(index) => write!(f, "[{}]", index)?,
        }
    }
    Ok(())
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity {
                kind,
                field,
                value,
                path,
            } => {
                if value.contains(']') || value.contains('"') || value.trim() != value {
                    write!(f, "{}[{}='{}']", kind, field, value)?;
                } else {
                    write!(f, "{}[{}={}]", kind, field, value)?;
                }
                write_path(f, path, true)
            }
            Self::Index {
                collection,
                index,
                path,
            } => {
                write!(f, "{}[{}]", collection, index)?;
                write_path(f, path, true)
            }
            Self::Path(path) => write_path(f, path, false),
        }
    }
}

struct Cursor<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(o, _)| *o)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, message: impl Into<String>) -> SelectorError {
        SelectorError::parse(self.source, self.offset(), message)
    }

    fn expect(&mut self, expected: char) -> Result<(), SelectorError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn key(&mut self) -> Result<String, SelectorError> {
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '.' | '[' | ']' | '=') || c.is_whitespace() {
                break;
            }
            key.push(c);
            self.pos += 1;
        }
        if key.is_empty() {
            return Err(self.error("expected a key"));
        }
        Ok(key)
    }

    fn index(&mut self) -> Result<usize, SelectorError> {
        let start = self.offset();
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.pos += 1;
        }
        if digits.is_empty() {
            return Err(self.error("expected a non-negative index"));
        }
        digits
            .parse()
            .map_err(|_| SelectorError::parse(self.source, start, "index out of range"))
    }

    fn entity_value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut value = String::new();
                loop {
                    match self.bump() {
                        Some(c) if c == quote => break,
                        Some(c) => value.push(c),
                        None => return Err(self.error("unterminated quoted value")),
                    }
                }
                Ok(value)
            }
            _ => {
                let mut value = String::new();
                while let Some(c) = self.peek() {
                    if c == ']' {
                        break;
                    }
                    value.push(c);
                    self.pos += 1;
                }
                let value = value.trim().to_string();
                if value.is_empty() {
                    return Err(self.error("expected a value"));
                }
                Ok(value)
            }
        }
    }

    fn tail(&mut self) -> Result<Vec<PathSegment>, SelectorError> {
        let mut path = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.pos += 1;
                    path.push(PathSegment::Key(self.key()?));
                }
                '[' => {
                    self.pos += 1;
                    path.push(PathSegment::Index(self.index()?));
                    self.expect(']')?;
                }
                other => return Err(self.error(format!("unexpected '{}'", other))),
            }
        }
        Ok(path)
    }
}

fn entity_kind(word: &str) -> Option<EntityKind> {
    match word {
        "rule" => Some(EntityKind::Rule),
        "section" => Some(EntityKind::Section),
        _ => None,
    }
}

fn entity_field(word: &str) -> Option<EntityField> {
    match word {
        "id" => Some(EntityField::Id),
        "fingerprint" => Some(EntityField::Fingerprint),
        "heading" => Some(EntityField::Heading),
        _ => None,
    }
}

/// Parse a selector string.
pub fn parse_selector(input: &str) -> Result<Selector, SelectorError> {
    let trimmed = input.trim();
    let mut cursor = Cursor::new(trimmed);
    if cursor.at_end() {
        return Err(cursor.error("selector is empty"));
    }

    let head = cursor.key()?;

    if cursor.peek() != Some('[') {
        let mut path = vec![PathSegment::Key(head)];
        path.extend(cursor.tail()?);
        return Ok(Selector::Path(path));
    }

    // Entity form needs `field=`; otherwise `head[digits]`
    if let Some(kind) = entity_kind(&head) {
        let checkpoint = cursor.pos;
        cursor.pos += 1;
        if cursor.peek().map_or(false, |c| !c.is_ascii_digit()) {
            let field_word = cursor.key()?;
            let field = entity_field(&field_word).ok_or_else(|| {
                cursor.error(format!(
                    "unknown field '{}' (expected id, fingerprint or heading)",
                    field_word
                ))
            })?;
            cursor.expect('=')?;
            let value = cursor.entity_value()?;
            cursor.expect(']')?;
            let path = cursor.tail()?;
            return Ok(Selector::Entity {
                kind,
                field,
                value,
                path,
            });
        }
        cursor.pos = checkpoint;
    }

    cursor.expect('[')?;
    let index = cursor.index()?;
    cursor.expect(']')?;
    let path = cursor.tail()?;
    Ok(Selector::Index {
        collection: head,
        index,
        path,
    })
}
