//! `{{ placeholder }}` substitution for the inserted Markdown.

use regex::{NoExpand, RegexBuilder};
use tracing::warn;

/// Default insertion template: a linked thumbnail followed by a space.
pub const DEFAULT_TEMPLATE: &str = "[![]({{local_thumbnail_link}})]({{google_photo_url}}) ";

/// Replaces every `{{ key }}` in `template` with its value.
///
/// Keys match case-insensitively and tolerate whitespace inside the braces.
/// Placeholders with no matching key are left verbatim. Values are inserted
/// literally; `$` in a value has no special meaning.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for &(key, value) in values {
        let pattern = format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(key));
        match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(re) => out = re.replace_all(&out, NoExpand(value)).into_owned(),
            Err(err) => warn!(key, error = %err, "skipping template key"),
        }
    }
    out
}

/// The values available to the insertion template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertionFields {
    pub local_thumbnail_link: String,
    pub google_photo_url: String,
    pub google_photo_id: String,
    pub google_base_url: String,
    pub google_photo_desc: String,
    pub taken_date: String,
}

impl InsertionFields {
    pub fn render(&self, template: &str) -> String {
        render(
            template,
            &[
                ("local_thumbnail_link", self.local_thumbnail_link.as_str()),
                ("google_photo_url", self.google_photo_url.as_str()),
                ("google_photo_id", self.google_photo_id.as_str()),
                ("google_base_url", self.google_base_url.as_str()),
                ("google_photo_desc", self.google_photo_desc.as_str()),
                ("taken_date", self.taken_date.as_str()),
            ],
        )
    }
}
