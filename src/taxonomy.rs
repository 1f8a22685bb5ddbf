//! Maps free-text catalog tags and declared languages onto the controlled
//! language / audience / topic vocabularies.
//!
//! Every resolver terminates in a value. When the data is missing or
//! contradictory a [`ClassificationError`] is pushed onto the caller's sink and
//! a fallback is returned.

use std::collections::HashMap;

use crate::catalog::CatalogEntry;
use crate::diagnostics::ClassificationError;
use crate::model::{AudienceCode, LanguageCode, TopicCode};

/// Case-insensitive synonym lookup.
///
/// When the same synonym is listed under several codes, the code listed first
/// keeps it.
#[derive(Debug, Clone)]
pub struct SynonymMap<T> {
    lookup: HashMap<String, T>,
}

impl<T: Copy> SynonymMap<T> {
    pub fn new(groups: &[(T, &[&str])]) -> Self {
        let mut lookup = HashMap::new();
        for (code, synonyms) in groups {
            for synonym in *synonyms {
                lookup.entry(normalize_key(synonym)).or_insert(*code);
            }
        }
        Self { lookup }
    }

    pub fn get(&self, value: &str) -> Option<T> {
        self.lookup.get(&normalize_key(value)).copied()
    }

    /// First tag (in source order) that maps to a code.
    pub fn first_match<'a, I>(&self, tags: I) -> Option<(&'a str, T)>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter()
            .find_map(|tag| self.get(tag).map(|code| (tag.as_str(), code)))
    }
}

fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

const LANGUAGE_SYNONYMS: &[(LanguageCode, &[&str])] = &[
    (
        LanguageCode::Farsi,
        &[
            "Farsi",
            "Farsi kids fiction",
            "Farsi adults fiction",
            "Persian",
            "Dari",
            "Pashto",
        ],
    ),
    (LanguageCode::Arabic, &["Arabic"]),
    (LanguageCode::Somali, &["Somali"]),
    (LanguageCode::French, &["French"]),
    (LanguageCode::English, &["English"]),
    (LanguageCode::German, &["German"]),
    (LanguageCode::Greek, &["Greek"]),
    (LanguageCode::Amharic, &["Amharic"]),
];

const AUDIENCE_SYNONYMS: &[(AudienceCode, &[&str])] = &[
    (
        AudienceCode::Adults,
        &["Adults", "Adult", "Adults fiction", "Farsi adults fiction"],
    ),
    (AudienceCode::Kids, &["Kids", "Teen", "Farsi kids fiction"]),
];

const AUDIENCE_FALLBACK_SYNONYMS: &[(AudienceCode, &[&str])] =
    &[(AudienceCode::Adults, &["Dictionary"])];

const TOPIC_SYNONYMS: &[(TopicCode, &[&str])] = &[
    (
        TopicCode::Fiction,
        &[
            "Fiction",
            "Farsi kids fiction",
            "Adults Fiction",
            "Crime Fiction",
        ],
    ),
    (
        TopicCode::NonFiction,
        &[
            "Non fiction",
            "Health & Fitness",
            "Travel",
            "Cooking",
            "Poetry",
            "Magazine",
        ],
    ),
    (
        TopicCode::EducationalSciences,
        &[
            "Educational/sciences",
            "Science",
            "Education",
            "Geography",
            "Nature",
            "History",
            "Academic",
            "Culture",
            "Animals",
            "Encyclopedia",
            "Art",
            "Creative",
            "Religion",
            "Handicrafts",
        ],
    ),
    (
        TopicCode::Languages,
        &[
            "Languages",
            "Language Learning",
            "Dictionary",
            "English Readers",
        ],
    ),
];

#[derive(Debug, Clone)]
pub struct Taxonomy {
    languages: SynonymMap<LanguageCode>,
    audiences: SynonymMap<AudienceCode>,
    audience_fallbacks: SynonymMap<AudienceCode>,
    topics: SynonymMap<TopicCode>,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::new()
    }
}

impl Taxonomy {
    pub fn new() -> Self {
        Self {
            languages: SynonymMap::new(LANGUAGE_SYNONYMS),
            audiences: SynonymMap::new(AUDIENCE_SYNONYMS),
            audience_fallbacks: SynonymMap::new(AUDIENCE_FALLBACK_SYNONYMS),
            topics: SynonymMap::new(TOPIC_SYNONYMS),
        }
    }

    pub fn resolve_language(
        &self,
        entry: &CatalogEntry,
        sink: &mut Vec<ClassificationError>,
    ) -> LanguageCode {
        let declared_raw = entry.declared_language();
        let declared = declared_raw.and_then(|l| self.languages.get(l));
        let tags = entry.tags();

        // Items shelved under "English" that also carry another language tag
        // are minority-language items; the English tag and an English
        // declaration are both ignored for them.
        let is_english = |tag: &String| self.languages.get(tag) == Some(LanguageCode::English);
        let multilingual = tags.iter().any(is_english)
            && tags.iter().any(|tag| {
                matches!(self.languages.get(tag), Some(code) if code != LanguageCode::English)
            });

        let from_tags = if multilingual {
            self.languages
                .first_match(tags.iter().filter(|tag| !is_english(tag)))
        } else {
            self.languages.first_match(tags)
        };
        let declared_for_conflict = match declared {
            Some(LanguageCode::English) if multilingual => None,
            other => other,
        };

        if let Some((tag, code)) = from_tags {
            if let (Some(raw), Some(declared_code)) = (declared_raw, declared_for_conflict)
                && declared_code != code
            {
                sink.push(ClassificationError::error(
                    format!("Language says \"{raw}\" but tags say \"{tag}\""),
                    entry.book_id(),
                    entry.title(),
                ));
            }
            return code;
        }

        if declared_raw.is_some() {
            return declared.unwrap_or(LanguageCode::Other);
        }

        let mut err =
            ClassificationError::error("No language found", entry.book_id(), entry.title());
        if let Some(language) = detect_shelf_code(entry.title()).and_then(|h| h.language) {
            err = err.with_data("suggested", serde_json::json!(language));
        }
        sink.push(err);
        LanguageCode::Other
    }

    pub fn resolve_audience(
        &self,
        entry: &CatalogEntry,
        sink: &mut Vec<ClassificationError>,
    ) -> AudienceCode {
        let tags = entry.tags();
        if let Some((_, code)) = self
            .audiences
            .first_match(tags)
            .or_else(|| self.audience_fallbacks.first_match(tags))
        {
            return code;
        }

        let mut err = ClassificationError::warning(
            "No audience found, falling back to \"Adults\"",
            entry.book_id(),
            entry.title(),
        );
        if let Some(audience) = detect_shelf_code(entry.title()).and_then(|h| h.audience) {
            err = err.with_data("suggested", serde_json::json!(audience));
        }
        sink.push(err);
        AudienceCode::Adults
    }

    pub fn resolve_topic(
        &self,
        entry: &CatalogEntry,
        sink: &mut Vec<ClassificationError>,
    ) -> TopicCode {
        if let Some((_, code)) = self.topics.first_match(entry.tags()) {
            return code;
        }

        sink.push(ClassificationError::warning(
            "No topic found, falling back to \"Other\"",
            entry.book_id(),
            entry.title(),
        ));
        TopicCode::Other
    }
}

/// Language/audience hint read from a shelf code such as `FA12` in a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfHint {
    pub code: String,
    pub language: Option<LanguageCode>,
    pub audience: Option<AudienceCode>,
}

/// Finds the first `[A-Z]{2}[0-9]{1,2}` run in `title` and decodes it.
///
/// First letter: F/D Farsi, A Arabic, S Somali. Second letter: A/D adults,
/// C kids.
pub fn detect_shelf_code(title: &str) -> Option<ShelfHint> {
    let bytes = title.as_bytes();
    let start = (0..bytes.len().saturating_sub(2)).find(|&i| {
        bytes[i].is_ascii_uppercase()
            && bytes[i + 1].is_ascii_uppercase()
            && bytes[i + 2].is_ascii_digit()
    })?;
    let end = if bytes.get(start + 3).is_some_and(u8::is_ascii_digit) {
        start + 4
    } else {
        start + 3
    };

    let language = match bytes[start] {
        b'F' | b'D' => Some(LanguageCode::Farsi),
        b'A' => Some(LanguageCode::Arabic),
        b'S' => Some(LanguageCode::Somali),
        _ => None,
    };
    let audience = match bytes[start + 1] {
        b'A' | b'D' => Some(AudienceCode::Adults),
        b'C' => Some(AudienceCode::Kids),
        _ => None,
    };
    if language.is_none() && audience.is_none() {
        return None;
    }

    Some(ShelfHint {
        code: title[start..end].to_owned(),
        language,
        audience,
    })
}
