//! Browsing modes layered over the same fetch session and sink.

use chrono::NaiveDate;
use photolink_core::{Codeblock, DateSettings, NoteContext, NoteDate, SearchQuery};
use photolink_providers::StaticSource;
use photolink_providers::google::{PickerSessionEngine, PickerState};
use tracing::{info, warn};

use crate::error::{ClientError, ClientResult};
use crate::host::{ActiveNote, Notifier};

/// Library browsing that can be narrowed to the date a note is about.
#[derive(Debug, Clone)]
pub struct DailyPhotos {
    settings: DateSettings,
    date: NaiveDate,
    filtered: bool,
}

impl DailyPhotos {
    /// Works out the note's date. An unusable date falls back to `today`
    /// and is reported through `notifier`.
    pub fn for_note(
        settings: DateSettings,
        note: Option<&ActiveNote>,
        today: NaiveDate,
        notifier: &dyn Notifier,
    ) -> Self {
        let context = NoteContext {
            title: note.map(|n| n.title.as_str()).unwrap_or_default(),
            front_matter_value: note
                .and_then(|n| n.front_matter.get(&settings.front_matter_key))
                .map(String::as_str),
        };

        let date = match settings.note_date(context, today) {
            NoteDate::Valid(date) => date,
            NoteDate::Invalid { fallback, error } => {
                warn!("note date unusable: {}", error);
                notifier.notice(&format!(
                    "Note date doesn't match the format {}, showing photos from today instead",
                    settings.format
                ));
                fallback
            }
        };

        Self {
            filtered: settings.default_to_daily_photos,
            settings,
            date,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered
    }

    pub fn query(&self) -> SearchQuery {
        if self.filtered {
            SearchQuery::with_date_filter(self.settings.filter_for(self.date))
        } else {
            SearchQuery::all()
        }
    }

    /// Switches between the date filter and the whole library; the caller
    /// resets its session with the returned query.
    pub fn toggle(&mut self) -> SearchQuery {
        self.filtered = !self.filtered;
        self.query()
    }

    pub fn label(&self) -> String {
        match (self.filtered, self.settings.show_range) {
            (false, _) => "All photos".to_string(),
            (true, false) => format!("Photos from {}", self.date),
            (true, true) => format!(
                "Photos from {} (-{} / +{} days)",
                self.date, self.settings.past_days, self.settings.future_days
            ),
        }
    }

    /// The query for a `photos` code block body, resolved against this
    /// note's date.
    pub fn codeblock_query(&self, body: &str, today: NaiveDate) -> ClientResult<(String, SearchQuery)> {
        let block = Codeblock::parse(body).map_err(|e| ClientError::Config(e.to_string()))?;
        let title = block
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| match &block {
                Codeblock::Today => format!("Photos from {today}"),
                Codeblock::NoteDate => format!("Photos from {}", self.date),
                _ => "Photos".to_string(),
            });
        Ok((title, block.to_query(today, self.date)))
    }
}

/// Picks photos through a Picker API session, then serves them like a
/// search result.
#[derive(Debug)]
pub struct PickerMode {
    engine: PickerSessionEngine,
}

impl PickerMode {
    pub fn new(engine: PickerSessionEngine) -> Self {
        Self { engine }
    }

    /// Waits for the user's selection. An expired session yields an empty
    /// source.
    pub async fn pick(&mut self, notifier: &dyn Notifier) -> ClientResult<StaticSource> {
        notifier.notice("Select photos in the Google Photos picker, then click Done.");
        let items = self.engine.run().await?;
        match self.engine.state() {
            PickerState::Completed => info!("{} photos picked", items.len()),
            PickerState::Expired => notifier.notice("The picker session expired."),
            state => warn!("picker ended in state {:?}", state),
        }
        Ok(StaticSource::new(items))
    }

    /// Deletes the remote session. Must run when the view goes away.
    pub async fn close(mut self) {
        self.engine.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photolink_core::{ApiDate, DateSource};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Notices(Mutex<Vec<String>>);
    impl Notifier for Notices {
        fn notice(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn note(title: &str, front_matter: &[(&str, &str)]) -> ActiveNote {
        ActiveNote {
            path: format!("Daily/{title}.md"),
            title: title.to_string(),
            front_matter: front_matter
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn date_of(query: &SearchQuery) -> Option<ApiDate> {
        query
            .filters
            .as_ref()?
            .date_filter
            .as_ref()?
            .dates
            .first()
            .cloned()
    }

    #[test]
    fn filters_on_note_title_date() {
        let notices = Notices::default();
        let mode = DailyPhotos::for_note(
            DateSettings::default(),
            Some(&note("2024-01-01", &[])),
            today(),
            &notices,
        );
        assert_eq!(mode.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(mode.is_filtered());
        assert_eq!(
            date_of(&mode.query()),
            Some(ApiDate {
                year: 2024,
                month: 1,
                day: 1
            })
        );
        assert_eq!(mode.label(), "Photos from 2024-01-01");
        assert!(notices.0.lock().unwrap().is_empty());
    }

    #[test]
    fn invalid_title_falls_back_to_today_with_notice() {
        let notices = Notices::default();
        let mode = DailyPhotos::for_note(
            DateSettings::default(),
            Some(&note("Shopping list", &[])),
            today(),
            &notices,
        );
        assert_eq!(mode.date(), today());
        assert_eq!(notices.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn front_matter_source_and_range() {
        let settings = DateSettings {
            source: DateSource::FrontMatter,
            front_matter_key: "day".to_string(),
            format: "DD/MM/YYYY".to_string(),
            show_range: true,
            ..DateSettings::default()
        };
        let mode = DailyPhotos::for_note(
            settings,
            Some(&note("Trip", &[("day", "03/02/2024")])),
            today(),
            &Notices::default(),
        );
        assert_eq!(mode.date(), NaiveDate::from_ymd_opt(2024, 2, 3).unwrap());
        let query = mode.query();
        let filter = query.filters.unwrap().date_filter.unwrap();
        assert!(filter.dates.is_empty());
        assert_eq!(filter.ranges.len(), 1);
        assert_eq!(filter.ranges[0].start_date.day, 27);
        assert_eq!(filter.ranges[0].end_date.day, 4);
    }

    #[test]
    fn toggle_switches_to_whole_library() {
        let mut mode = DailyPhotos::for_note(
            DateSettings::default(),
            Some(&note("2024-01-01", &[])),
            today(),
            &Notices::default(),
        );
        let all = mode.toggle();
        assert!(all.filters.is_none());
        assert_eq!(mode.label(), "All photos");
        assert!(mode.toggle().filters.is_some());
    }

    #[test]
    fn unfiltered_by_default_when_disabled() {
        let settings = DateSettings {
            default_to_daily_photos: false,
            ..DateSettings::default()
        };
        let mode = DailyPhotos::for_note(settings, None, today(), &Notices::default());
        assert!(!mode.is_filtered());
        assert!(mode.query().filters.is_none());
    }

    #[test]
    fn codeblock_queries() {
        let mode = DailyPhotos::for_note(
            DateSettings::default(),
            Some(&note("2024-01-01", &[])),
            today(),
            &Notices::default(),
        );

        let (title, query) = mode.codeblock_query("notedate", today()).unwrap();
        assert_eq!(title, "Photos from 2024-01-01");
        assert_eq!(date_of(&query).map(|d| d.day), Some(1));

        let (title, query) = mode
            .codeblock_query(r#"{"title": "Alps", "query": {"albumId": "A1"}}"#, today())
            .unwrap();
        assert_eq!(title, "Alps");
        assert_eq!(query.album_id.as_deref(), Some("A1"));

        let (title, query) = mode.codeblock_query("", today()).unwrap();
        assert_eq!(title, "Photos");
        assert!(query.album_id.is_none() && query.filters.is_none());
    }
}
