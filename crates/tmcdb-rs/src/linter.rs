// crates/tmcdb-rs/src/linter.rs

//! Validation of rendered records against a record-definition file.
//!
//! The definition grammar is the usual database-definition subset:
//! `recordtype(kind) { field(NAME, DBF_TYPE) { menu(name) } }` and
//! `menu(name) { choice(ident, "value") }`. Unrelated top-level blocks
//! (`device`, `driver`, `registrar`, ...) are skipped without complaint.

use std::collections::BTreeMap;

use crate::error::TmcDbError;
use crate::record::RecordPackage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One lint finding, attached to the record it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct LintMessage {
    pub severity: Severity,
    pub message: String,
    /// The record name (and field, when applicable) the finding points at.
    pub location: String,
}

#[derive(Debug, Clone, Default)]
struct FieldDef {
    field_type: String,
    menu: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct RecordTypeDef {
    fields: BTreeMap<String, FieldDef>,
}

/// A parsed record-definition file: record kinds with their legal fields,
/// and menus with their legal choices. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct DbdFile {
    record_types: BTreeMap<String, RecordTypeDef>,
    menus: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Open,
    Close,
    BraceOpen,
    BraceClose,
    Comma,
}

fn tokenize(text: &str) -> Result<Vec<Token>, TmcDbError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '#' => {
                // Comment to end of line.
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '{' => {
                chars.next();
                tokens.push(Token::BraceOpen);
            }
            '}' => {
                chars.next();
                tokens.push(Token::BraceClose);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => {
                                return Err(TmcDbError::MalformedDefinition(
                                    "unterminated escape in string".into(),
                                ))
                            }
                        },
                        Some('"') => break,
                        Some(c) => value.push(c),
                        None => {
                            return Err(TmcDbError::MalformedDefinition(
                                "unterminated string".into(),
                            ))
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' || c == '%' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' || c == '%' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(TmcDbError::MalformedDefinition(format!(
                    "unexpected character {other:?}"
                )))
            }
        }
    }
    Ok(tokens)
}

struct Cursor {
    tokens: Vec<Token>,
    position: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), TmcDbError> {
        match self.next() {
            Some(token) if token == *expected => Ok(()),
            other => Err(TmcDbError::MalformedDefinition(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    /// A single identifier or string argument.
    fn name(&mut self) -> Result<String, TmcDbError> {
        match self.next() {
            Some(Token::Ident(name)) | Some(Token::Str(name)) => Ok(name),
            other => Err(TmcDbError::MalformedDefinition(format!(
                "expected a name, found {other:?}"
            ))),
        }
    }

    /// Consume `( ... )`, returning the comma-separated names.
    fn arguments(&mut self) -> Result<Vec<String>, TmcDbError> {
        self.expect(&Token::Open)?;
        let mut arguments = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Close) => {
                    self.next();
                    return Ok(arguments);
                }
                Some(Token::Comma) => {
                    self.next();
                }
                _ => arguments.push(self.name()?),
            }
        }
    }

    /// Skip a balanced `{ ... }` block.
    fn skip_block(&mut self) -> Result<(), TmcDbError> {
        self.expect(&Token::BraceOpen)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.next() {
                Some(Token::BraceOpen) => depth += 1,
                Some(Token::BraceClose) => depth -= 1,
                Some(_) => {}
                None => {
                    return Err(TmcDbError::MalformedDefinition(
                        "unterminated block".into(),
                    ))
                }
            }
        }
        Ok(())
    }
}

impl DbdFile {
    pub fn parse(text: &str) -> Result<DbdFile, TmcDbError> {
        let mut cursor = Cursor {
            tokens: tokenize(text)?,
            position: 0,
        };
        let mut dbd = DbdFile::default();

        while let Some(token) = cursor.next() {
            let Token::Ident(keyword) = token else {
                return Err(TmcDbError::MalformedDefinition(format!(
                    "expected a block keyword, found {token:?}"
                )));
            };
            match keyword.as_str() {
                "menu" => dbd.parse_menu(&mut cursor)?,
                "recordtype" => dbd.parse_record_type(&mut cursor)?,
                _ => {
                    // device(...), driver(...), registrar(...), include
                    // "file", etc.
                    match cursor.peek() {
                        Some(Token::Open) => {
                            cursor.arguments()?;
                        }
                        Some(Token::Str(_)) | Some(Token::Ident(_)) => {
                            cursor.next();
                        }
                        _ => {}
                    }
                    if matches!(cursor.peek(), Some(Token::BraceOpen)) {
                        cursor.skip_block()?;
                    }
                }
            }
        }
        Ok(dbd)
    }

    fn parse_menu(&mut self, cursor: &mut Cursor) -> Result<(), TmcDbError> {
        let arguments = cursor.arguments()?;
        let name = arguments.into_iter().next().ok_or_else(|| {
            TmcDbError::MalformedDefinition("menu block without a name".into())
        })?;
        cursor.expect(&Token::BraceOpen)?;

        let mut choices = Vec::new();
        loop {
            match cursor.next() {
                Some(Token::BraceClose) => break,
                Some(Token::Ident(keyword)) if keyword == "choice" => {
                    let arguments = cursor.arguments()?;
                    if let Some(choice) = arguments.into_iter().nth(1) {
                        choices.push(choice);
                    }
                }
                other => {
                    return Err(TmcDbError::MalformedDefinition(format!(
                        "unexpected token in menu block: {other:?}"
                    )))
                }
            }
        }
        self.menus.insert(name, choices);
        Ok(())
    }

    fn parse_record_type(&mut self, cursor: &mut Cursor) -> Result<(), TmcDbError> {
        let arguments = cursor.arguments()?;
        let name = arguments.into_iter().next().ok_or_else(|| {
            TmcDbError::MalformedDefinition("recordtype block without a name".into())
        })?;
        cursor.expect(&Token::BraceOpen)?;

        let mut record_type = RecordTypeDef::default();
        loop {
            match cursor.next() {
                Some(Token::BraceClose) => break,
                Some(Token::Ident(keyword)) if keyword == "field" => {
                    let arguments = cursor.arguments()?;
                    let mut arguments = arguments.into_iter();
                    let field_name = arguments.next().ok_or_else(|| {
                        TmcDbError::MalformedDefinition("field without a name".into())
                    })?;
                    let field_type = arguments.next().unwrap_or_default();

                    let mut field = FieldDef {
                        field_type,
                        menu: None,
                    };
                    if matches!(cursor.peek(), Some(Token::BraceOpen)) {
                        field.menu = parse_field_body(cursor)?;
                    }
                    record_type.fields.insert(field_name, field);
                }
                Some(Token::Ident(_)) => {
                    // include-style or misc entries: skip their arguments.
                    match cursor.peek() {
                        Some(Token::Open) => {
                            cursor.arguments()?;
                        }
                        Some(Token::Str(_)) | Some(Token::Ident(_)) => {
                            cursor.next();
                        }
                        _ => {}
                    }
                    if matches!(cursor.peek(), Some(Token::BraceOpen)) {
                        cursor.skip_block()?;
                    }
                }
                other => {
                    return Err(TmcDbError::MalformedDefinition(format!(
                        "unexpected token in recordtype block: {other:?}"
                    )))
                }
            }
        }
        self.record_types.insert(name, record_type);
        Ok(())
    }

    pub fn has_record_type(&self, kind: &str) -> bool {
        self.record_types.contains_key(kind)
    }
}

/// Parse a `field(...) { ... }` body, returning the referenced menu name,
/// if any.
fn parse_field_body(cursor: &mut Cursor) -> Result<Option<String>, TmcDbError> {
    cursor.expect(&Token::BraceOpen)?;
    let mut menu = None;
    loop {
        match cursor.next() {
            Some(Token::BraceClose) => return Ok(menu),
            Some(Token::Ident(keyword)) => {
                let arguments = cursor.arguments()?;
                if keyword == "menu" {
                    menu = arguments.into_iter().next();
                }
            }
            other => {
                return Err(TmcDbError::MalformedDefinition(format!(
                    "unexpected token in field block: {other:?}"
                )))
            }
        }
    }
}

/// Check every record of every package against the grammar: the record
/// kind must be known, every field name must exist on that kind, and
/// menu-typed fields must use a declared choice.
pub fn lint_packages(dbd: &DbdFile, packages: &[RecordPackage]) -> Vec<LintMessage> {
    let mut messages = Vec::new();

    for package in packages {
        for record in &package.records {
            let Some(record_type) = dbd.record_types.get(&record.record_type) else {
                messages.push(LintMessage {
                    severity: Severity::Error,
                    message: format!("unknown record kind {:?}", record.record_type),
                    location: record.pvname.clone(),
                });
                continue;
            };

            for (name, value) in record.fields.iter() {
                let Some(field) = record_type.fields.get(name) else {
                    messages.push(LintMessage {
                        severity: Severity::Error,
                        message: format!(
                            "field {name} is not defined for record kind {}",
                            record.record_type
                        ),
                        location: format!("{}.{name}", record.pvname),
                    });
                    continue;
                };

                if field.field_type == "DBF_MENU" {
                    let choices = field
                        .menu
                        .as_ref()
                        .and_then(|menu| dbd.menus.get(menu));
                    match choices {
                        Some(choices) if !choices.iter().any(|choice| choice.as_str() == value) => {
                            messages.push(LintMessage {
                                severity: Severity::Error,
                                message: format!(
                                    "{value:?} is not a valid choice for {name}"
                                ),
                                location: format!("{}.{name}", record.pvname),
                            });
                        }
                        None => messages.push(LintMessage {
                            severity: Severity::Warning,
                            message: format!(
                                "field {name} references an unknown menu"
                            ),
                            location: format!("{}.{name}", record.pvname),
                        }),
                        _ => {}
                    }
                }
            }
        }
    }
    messages
}
