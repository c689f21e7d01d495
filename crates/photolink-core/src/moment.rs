//! moment.js-style date formats.
//!
//! User settings (thumbnail filenames, note-title dates) are written with
//! moment.js tokens such as `YYYY-MM-DD[_google-photo_]HHmmss[.jpg]`. This
//! module compiles such a string once into a list of chrono format items so
//! the same format can be used both for rendering and strict parsing.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("'{input}' does not match format '{format}'")]
    NoMatch { input: String, format: String },

    #[error("format '{0}' cannot be used for parsing (ordinal day tokens are output-only)")]
    NotParseable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Spec(&'static str),
    /// `Do`: day of month with English ordinal suffix.
    Ordinal,
}

// Longest tokens first so that `YYYY` is not read as two `YY`.
const TOKENS: &[(&str, &str)] = &[
    ("YYYY", "%Y"),
    ("YY", "%y"),
    ("MMMM", "%B"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%-m"),
    ("DDDD", "%j"),
    ("DD", "%d"),
    ("D", "%-d"),
    ("dddd", "%A"),
    ("ddd", "%a"),
    ("HH", "%H"),
    ("H", "%-H"),
    ("hh", "%I"),
    ("h", "%-I"),
    ("mm", "%M"),
    ("m", "%-M"),
    ("ss", "%S"),
    ("s", "%-S"),
    ("SSS", "%3f"),
    ("A", "%p"),
    ("a", "%P"),
    ("ZZ", "%z"),
    ("Z", "%:z"),
    ("X", "%s"),
];

/// A compiled moment.js format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MomentFormat {
    source: String,
    tokens: Vec<Token>,
}

impl MomentFormat {
    pub fn new(format: &str) -> Self {
        Self {
            source: format.to_string(),
            tokens: tokenize(format),
        }
    }

    /// The format string as the user wrote it.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Renders a timestamp.
    pub fn format<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Spec(spec) => out.push_str(&at.format(spec).to_string()),
                Token::Ordinal => out.push_str(&ordinal(at.day())),
            }
        }
        out
    }

    /// Renders a calendar date. Time-of-day tokens render as midnight.
    pub fn format_date(&self, date: NaiveDate) -> String {
        let mut out = String::new();
        let midnight = date.and_time(chrono::NaiveTime::MIN);
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                // Offset tokens are meaningless on a naive date.
                Token::Spec(spec) if matches!(*spec, "%z" | "%:z" | "%s") => {}
                Token::Spec(spec) => out.push_str(&midnight.format(spec).to_string()),
                Token::Ordinal => out.push_str(&ordinal(date.day())),
            }
        }
        out
    }

    /// Strictly parses a calendar date written in this format.
    ///
    /// The whole input must match, like moment's strict mode.
    pub fn parse_date(&self, input: &str) -> Result<NaiveDate, FormatError> {
        if self.tokens.iter().any(|t| matches!(t, Token::Ordinal)) {
            return Err(FormatError::NotParseable(self.source.clone()));
        }

        NaiveDate::parse_from_str(input, &self.to_strftime()).map_err(|_| FormatError::NoMatch {
            input: input.to_string(),
            format: self.source.clone(),
        })
    }

    fn to_strftime(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(&text.replace('%', "%%")),
                Token::Spec(spec) => out.push_str(spec),
                Token::Ordinal => {}
            }
        }
        out
    }
}

impl Default for MomentFormat {
    fn default() -> Self {
        Self::new("YYYY-MM-DD")
    }
}

impl std::fmt::Display for MomentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn tokenize(format: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = format;

    'outer: while let Some(c) = rest.chars().next() {
        if c == '[' {
            if let Some(end) = rest.find(']') {
                literal.push_str(&rest[1..end]);
                rest = &rest[end + 1..];
                continue;
            }
        }

        if rest.starts_with("Do") {
            flush(&mut literal, &mut tokens);
            tokens.push(Token::Ordinal);
            rest = &rest[2..];
            continue;
        }

        for &(moment, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(moment) {
                flush(&mut literal, &mut tokens);
                tokens.push(Token::Spec(spec));
                rest = tail;
                continue 'outer;
            }
        }

        literal.push(c);
        rest = &rest[c.len_utf8()..];
    }

    flush(&mut literal, &mut tokens);
    tokens
}

fn flush(literal: &mut String, tokens: &mut Vec<Token>) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{day}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn default_thumbnail_filename() {
        let format = MomentFormat::new("YYYY-MM-DD[_google-photo_]HHmmss[.jpg]");
        assert_eq!(
            format.format(&at(2023, 7, 4, 9, 5, 1)),
            "2023-07-04_google-photo_090501.jpg"
        );
    }

    #[test]
    fn bracketed_text_is_not_tokenized() {
        let format = MomentFormat::new("[YYYY] YYYY");
        assert_eq!(format.format(&at(2020, 1, 1, 0, 0, 0)), "YYYY 2020");
    }

    #[test]
    fn percent_in_literal_is_preserved() {
        let format = MomentFormat::new("YYYY[%]MM");
        assert_eq!(format.format(&at(2020, 2, 1, 0, 0, 0)), "2020%02");

        let dated = MomentFormat::new("DD[%]MM[%]YYYY");
        assert_eq!(
            dated.parse_date("03%04%2021").unwrap(),
            NaiveDate::from_ymd_opt(2021, 4, 3).unwrap()
        );
    }

    #[test]
    fn names_and_ordinals() {
        let format = MomentFormat::new("dddd, MMMM Do YYYY");
        assert_eq!(
            format.format(&at(2024, 3, 22, 0, 0, 0)),
            "Friday, March 22nd 2024"
        );
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(113), "113th");
    }

    #[test]
    fn unpadded_tokens() {
        let format = MomentFormat::new("D/M/YY h:mm A");
        assert_eq!(format.format(&at(2024, 3, 5, 14, 7, 0)), "5/3/24 2:07 PM");
    }

    #[test]
    fn parses_note_title_dates() {
        let format = MomentFormat::new("YYYY-MM-DD");
        assert_eq!(
            format.parse_date("2024-01-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(format.parse_date("Meeting notes").is_err());
        assert!(format.parse_date("2024-01-01 extra").is_err());
        assert!(format.parse_date("2024-02-30").is_err());
    }

    #[test]
    fn parses_literal_heavy_formats() {
        let format = MomentFormat::new("[Journal ]DD.MM.YYYY");
        assert_eq!(
            format.parse_date("Journal 31.12.1999").unwrap(),
            NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()
        );
    }

    #[test]
    fn ordinal_formats_refuse_to_parse() {
        let format = MomentFormat::new("MMMM Do");
        assert!(matches!(
            format.parse_date("March 1st"),
            Err(FormatError::NotParseable(_))
        ));
    }

    #[test]
    fn format_date_renders_naive_dates() {
        let format = MomentFormat::default();
        let date = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
        assert_eq!(format.format_date(date), "2024-06-09");
        assert_eq!(format.to_string(), "YYYY-MM-DD");
    }
}
