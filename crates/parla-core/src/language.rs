//! The closed language registry.
//!
//! Translation sessions only accept languages from this fixed set; a free
//! string is resolved against it and rejected with
//! [`LanguageError::UnknownLanguage`] when it does not match. Each entry has
//! a canonical code (`"en-us"`), a primary subtag (`"en"`), and a human
//! label. Comparison is always by canonical code, case-insensitive.
//!
//! Regional variants of the same primary subtag are ordered default-first in
//! the registry, so a bare primary subtag (`"en"`) resolves to the default
//! variant (`en-us`).

use std::fmt;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::error::LanguageError;

/// A language from the closed registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::doc_markdown)]
pub enum Language {
    Arabic,
    Azerbaijani,
    Bulgarian,
    ChineseSimplified,
    ChineseTraditional,
    Croatian,
    Czech,
    Danish,
    Dutch,
    EnglishUs,
    EnglishAu,
    EnglishCa,
    EnglishGb,
    Estonian,
    Filipino,
    Finnish,
    French,
    FrenchCa,
    German,
    Greek,
    Hebrew,
    Hindi,
    Hungarian,
    Indonesian,
    Italian,
    Japanese,
    Korean,
    Latvian,
    Lithuanian,
    Malay,
    Norwegian,
    Polish,
    Portuguese,
    PortugueseBr,
    Romanian,
    Russian,
    Slovak,
    Slovenian,
    Spanish,
    SpanishMx,
    Swedish,
    Tamil,
    Thai,
    Turkish,
    Ukrainian,
    Vietnamese,
}

/// One registry row.
struct Entry {
    language: Language,
    code: &'static str,
    primary: &'static str,
    label: &'static str,
}

/// The registry itself. Default regional variants come before their
/// siblings so that primary-subtag resolution picks them first.
const REGISTRY: &[Entry] = &[
    Entry { language: Language::Arabic, code: "ar", primary: "ar", label: "Arabic" },
    Entry { language: Language::Azerbaijani, code: "az", primary: "az", label: "Azerbaijani" },
    Entry { language: Language::Bulgarian, code: "bg", primary: "bg", label: "Bulgarian" },
    Entry { language: Language::ChineseSimplified, code: "zh-hans", primary: "zh", label: "Chinese (Simplified)" },
    Entry { language: Language::ChineseTraditional, code: "zh-hant", primary: "zh", label: "Chinese (Traditional)" },
    Entry { language: Language::Croatian, code: "hr", primary: "hr", label: "Croatian" },
    Entry { language: Language::Czech, code: "cs", primary: "cs", label: "Czech" },
    Entry { language: Language::Danish, code: "da", primary: "da", label: "Danish" },
    Entry { language: Language::Dutch, code: "nl", primary: "nl", label: "Dutch" },
    Entry { language: Language::EnglishUs, code: "en-us", primary: "en", label: "English (US)" },
    Entry { language: Language::EnglishAu, code: "en-au", primary: "en", label: "English (Australia)" },
    Entry { language: Language::EnglishCa, code: "en-ca", primary: "en", label: "English (Canada)" },
    Entry { language: Language::EnglishGb, code: "en-gb", primary: "en", label: "English (UK)" },
    Entry { language: Language::Estonian, code: "et", primary: "et", label: "Estonian" },
    Entry { language: Language::Filipino, code: "fil", primary: "fil", label: "Filipino" },
    Entry { language: Language::Finnish, code: "fi", primary: "fi", label: "Finnish" },
    Entry { language: Language::French, code: "fr", primary: "fr", label: "French" },
    Entry { language: Language::FrenchCa, code: "fr-ca", primary: "fr", label: "French (Canada)" },
    Entry { language: Language::German, code: "de", primary: "de", label: "German" },
    Entry { language: Language::Greek, code: "el", primary: "el", label: "Greek" },
    Entry { language: Language::Hebrew, code: "he", primary: "he", label: "Hebrew" },
    Entry { language: Language::Hindi, code: "hi", primary: "hi", label: "Hindi" },
    Entry { language: Language::Hungarian, code: "hu", primary: "hu", label: "Hungarian" },
    Entry { language: Language::Indonesian, code: "id", primary: "id", label: "Indonesian" },
    Entry { language: Language::Italian, code: "it", primary: "it", label: "Italian" },
    Entry { language: Language::Japanese, code: "ja", primary: "ja", label: "Japanese" },
    Entry { language: Language::Korean, code: "ko", primary: "ko", label: "Korean" },
    Entry { language: Language::Latvian, code: "lv", primary: "lv", label: "Latvian" },
    Entry { language: Language::Lithuanian, code: "lt", primary: "lt", label: "Lithuanian" },
    Entry { language: Language::Malay, code: "ms", primary: "ms", label: "Malay" },
    Entry { language: Language::Norwegian, code: "no", primary: "no", label: "Norwegian" },
    Entry { language: Language::Polish, code: "pl", primary: "pl", label: "Polish" },
    Entry { language: Language::Portuguese, code: "pt", primary: "pt", label: "Portuguese" },
    Entry { language: Language::PortugueseBr, code: "pt-br", primary: "pt", label: "Portuguese (Brazil)" },
    Entry { language: Language::Romanian, code: "ro", primary: "ro", label: "Romanian" },
    Entry { language: Language::Russian, code: "ru", primary: "ru", label: "Russian" },
    Entry { language: Language::Slovak, code: "sk", primary: "sk", label: "Slovak" },
    Entry { language: Language::Slovenian, code: "sl", primary: "sl", label: "Slovenian" },
    Entry { language: Language::Spanish, code: "es", primary: "es", label: "Spanish" },
    Entry { language: Language::SpanishMx, code: "es-mx", primary: "es", label: "Spanish (Mexico)" },
    Entry { language: Language::Swedish, code: "sv", primary: "sv", label: "Swedish" },
    Entry { language: Language::Tamil, code: "ta", primary: "ta", label: "Tamil" },
    Entry { language: Language::Thai, code: "th", primary: "th", label: "Thai" },
    Entry { language: Language::Turkish, code: "tr", primary: "tr", label: "Turkish" },
    Entry { language: Language::Ukrainian, code: "uk", primary: "uk", label: "Ukrainian" },
    Entry { language: Language::Vietnamese, code: "vi", primary: "vi", label: "Vietnamese" },
];

impl Language {
    /// Resolve a canonical code (`"en-us"`), case-insensitively.
    pub fn from_code(code: &str) -> Result<Self, LanguageError> {
        REGISTRY
            .iter()
            .find(|e| e.code.eq_ignore_ascii_case(code))
            .map(|e| e.language)
            .ok_or_else(|| LanguageError::UnknownLanguage(code.to_owned()))
    }

    /// Resolve a bare primary subtag (`"en"`), case-insensitively.
    ///
    /// Returns the default regional variant for subtags with several entries.
    pub fn from_primary(primary: &str) -> Result<Self, LanguageError> {
        REGISTRY
            .iter()
            .find(|e| e.primary.eq_ignore_ascii_case(primary))
            .map(|e| e.language)
            .ok_or_else(|| LanguageError::UnknownLanguage(primary.to_owned()))
    }

    /// Resolve a free string: canonical code first, then primary subtag.
    ///
    /// This is the lookup order the message router uses for inbound
    /// transcription languages.
    pub fn resolve(tag: &str) -> Result<Self, LanguageError> {
        Self::from_code(tag).or_else(|_| Self::from_primary(tag))
    }

    /// The canonical code, e.g. `"en-us"`.
    #[must_use]
    pub fn code(self) -> &'static str {
        self.entry().code
    }

    /// The primary subtag, e.g. `"en"`.
    #[must_use]
    pub fn primary(self) -> &'static str {
        self.entry().primary
    }

    /// The human-readable label, e.g. `"English (US)"`.
    #[must_use]
    pub fn label(self) -> &'static str {
        self.entry().label
    }

    /// Every language in the registry, in registry order.
    pub fn all() -> impl Iterator<Item = Self> {
        REGISTRY.iter().map(|e| e.language)
    }

    fn entry(self) -> &'static Entry {
        REGISTRY
            .iter()
            .find(|e| e.language == self)
            .expect("registry covers every variant")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// On the wire a language is always its canonical code.
impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Self::from_code(&code).map_err(de::Error::custom)
    }
}
