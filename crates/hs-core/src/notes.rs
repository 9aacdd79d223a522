//! Ledger note rendering and identity keys.
//!
//! A note is rendered from a template such as
//! `{jira} {title} [{date} {start}] | {end}`. Everything before the last key
//! separator is the note key: it stays stable while the trailing segment
//! (typically the end time) changes, which lets a lengthened meeting patch the
//! existing row instead of creating a new one.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;
use thiserror::Error;

use crate::block::EventBlock;

/// Maximum length of a rendered note, in characters.
pub const MAX_NOTE_LEN: usize = 280;

/// Errors raised while validating note settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template names a field that does not exist.
    #[error("unknown note template field '{{{0}}}'")]
    UnknownField(String),
    /// A `{` was never closed.
    #[error("unclosed '{{' in note template")]
    Unclosed,
    /// A `}` appeared without a matching `{`.
    #[error("unmatched '}}' in note template")]
    Unmatched,
    /// A strftime pattern could not be parsed.
    #[error("invalid {name} pattern '{pattern}'")]
    InvalidPattern { name: &'static str, pattern: String },
    /// The key separator was empty.
    #[error("key separator cannot be empty")]
    EmptySeparator,
}

/// A field that can be substituted into a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Date,
    Start,
    Title,
    Jira,
    End,
}

impl Field {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        match name {
            "date" => Ok(Self::Date),
            "start" => Ok(Self::Start),
            "title" => Ok(Self::Title),
            "jira" => Ok(Self::Jira),
            "end" => Ok(Self::End),
            other => Err(TemplateError::UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed note template.
///
/// `{name}` substitutes a field; `{{` and `}}` are literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTemplate {
    segments: Vec<Segment>,
}

impl NoteTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => return Err(TemplateError::Unclosed),
                        }
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(Field::parse(&name)?));
                }
                '}' => return Err(TemplateError::Unmatched),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }
}

/// Everything needed to render notes and derive their keys.
#[derive(Debug, Clone)]
pub struct NoteFormat {
    template: NoteTemplate,
    date_format: String,
    time_format: String,
    separator: String,
    zone: Tz,
}

impl NoteFormat {
    /// Validates the note settings.
    pub fn new(
        template: &str,
        date_format: impl Into<String>,
        time_format: impl Into<String>,
        separator: impl Into<String>,
        zone: Tz,
    ) -> Result<Self, TemplateError> {
        let date_format = date_format.into();
        let time_format = time_format.into();
        let separator = separator.into();
        check_pattern("date", &date_format)?;
        check_pattern("time", &time_format)?;
        if separator.is_empty() {
            return Err(TemplateError::EmptySeparator);
        }
        Ok(Self {
            template: NoteTemplate::parse(template)?,
            date_format,
            time_format,
            separator,
            zone,
        })
    }

    pub const fn zone(&self) -> Tz {
        self.zone
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Renders the note for a block. See [`build_note`].
    pub fn render(&self, block: &EventBlock) -> String {
        build_note(block, self)
    }

    /// Derives the note key. See [`note_key`].
    pub fn key<'a>(&self, note: &'a str) -> &'a str {
        note_key(note, &self.separator)
    }

    /// Formats a block's start and end as times in the display zone.
    pub fn time_span(&self, block: &EventBlock) -> (String, String) {
        let start = block.begin().with_timezone(&self.zone);
        let end = block.end().with_timezone(&self.zone);
        (
            start.format(&self.time_format).to_string(),
            end.format(&self.time_format).to_string(),
        )
    }
}

fn check_pattern(name: &'static str, pattern: &str) -> Result<(), TemplateError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(TemplateError::InvalidPattern {
            name,
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

/// Renders the ledger note for a block, truncated to [`MAX_NOTE_LEN`]
/// characters.
///
/// Dates and times are formatted in the display zone. Truncation happens after
/// rendering and may cut through a field.
pub fn build_note(block: &EventBlock, format: &NoteFormat) -> String {
    let start = block.begin().with_timezone(&format.zone);
    let end = block.end().with_timezone(&format.zone);

    let mut note = String::new();
    for segment in &format.template.segments {
        // Patterns were validated in `NoteFormat::new`, so formatting cannot fail.
        let written = match segment {
            Segment::Literal(text) => note.write_str(text),
            Segment::Field(Field::Date) => write!(note, "{}", start.format(&format.date_format)),
            Segment::Field(Field::Start) => write!(note, "{}", start.format(&format.time_format)),
            Segment::Field(Field::End) => write!(note, "{}", end.format(&format.time_format)),
            Segment::Field(Field::Title) => note.write_str(block.title()),
            Segment::Field(Field::Jira) => note.write_str(block.jira_key()),
        };
        written.unwrap();
    }

    match note.char_indices().nth(MAX_NOTE_LEN) {
        Some((cut, _)) => {
            note.truncate(cut);
            note
        }
        None => note,
    }
}

/// Returns everything before the last `separator` in `note`.
///
/// When the separator does not occur, the whole note is the key.
pub fn note_key<'a>(note: &'a str, separator: &str) -> &'a str {
    if separator.is_empty() {
        return note;
    }
    note.rsplit_once(separator)
        .map_or(note, |(prefix, _)| prefix)
}
