//! Daily-photos mode: which date a note is about, and the filter for it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::media::DateFilter;
use crate::moment::{FormatError, MomentFormat};

/// Where the date of a note comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateSource {
    /// The note's file name, parsed with the configured format.
    #[default]
    NoteTitle,
    /// A front-matter property, parsed with the configured format.
    FrontMatter,
    /// Always today.
    Today,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateSettings {
    /// Open the browser filtered to the note's date.
    pub default_to_daily_photos: bool,
    pub source: DateSource,
    pub front_matter_key: String,
    /// moment.js format of titles and front-matter values.
    pub format: String,
    /// Widen the daily filter into a range around the note date.
    pub show_range: bool,
    pub past_days: u32,
    pub future_days: u32,
}

impl Default for DateSettings {
    fn default() -> Self {
        Self {
            default_to_daily_photos: true,
            source: DateSource::NoteTitle,
            front_matter_key: "date".to_string(),
            format: "YYYY-MM-DD".to_string(),
            show_range: false,
            past_days: 7,
            future_days: 1,
        }
    }
}

/// What the host knows about the active note.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoteContext<'a> {
    /// File name without extension.
    pub title: &'a str,
    /// Value of the configured front-matter key, if the note has one.
    pub front_matter_value: Option<&'a str>,
}

/// Outcome of resolving a note's date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteDate {
    Valid(NaiveDate),
    /// The note had no usable date; callers should notify and use `fallback`.
    Invalid {
        fallback: NaiveDate,
        error: FormatError,
    },
}

impl NoteDate {
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Valid(date) => *date,
            Self::Invalid { fallback, .. } => *fallback,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

impl DateSettings {
    pub fn moment_format(&self) -> MomentFormat {
        MomentFormat::new(&self.format)
    }

    /// Resolves the date a note is about.
    pub fn note_date(&self, note: NoteContext<'_>, today: NaiveDate) -> NoteDate {
        let raw = match self.source {
            DateSource::Today => return NoteDate::Valid(today),
            DateSource::NoteTitle => note.title,
            DateSource::FrontMatter => note.front_matter_value.unwrap_or_default(),
        };

        match self.moment_format().parse_date(raw.trim()) {
            Ok(date) => NoteDate::Valid(date),
            Err(error) => NoteDate::Invalid {
                fallback: today,
                error,
            },
        }
    }

    /// The date filter for daily-photos mode.
    pub fn filter_for(&self, date: NaiveDate) -> DateFilter {
        if self.show_range {
            DateFilter::around(date, self.past_days, self.future_days)
        } else {
            DateFilter::single(date)
        }
    }
}
