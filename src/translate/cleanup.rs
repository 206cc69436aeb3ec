//! Cleanup of backend output.
//!
//! Models like to announce their answer ("Here is the translation:",
//! "English translation:", "**Korean:**") even when told not to. Those
//! leading lines are removed with a fixed set of case-insensitive,
//! line-start patterns; nothing after the first real content line is
//! touched.

use once_cell::sync::Lazy;
use regex::Regex;

/// Language names a preface may use, in English and in the languages themselves.
const LANGUAGES: &str = "english|korean|japanese|chinese|한국어|영어|일본어|중국어|日本語|英語|中国語|韓国語|中文|英文|日语|韩语";

// "Here is the translation:", "Here's the English version:" ...
// The line must name a translation or version; "Here are the key findings:"
// is content.
static RE_PREFACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^[ \t]*(?:here\s+is|here's|here\s+are|below\s+is)\s[^\n:]*\b(?:translat\w*|version)\b[^\n:]*:[ \t]*(?:\n|$)",
    )
    .unwrap()
});

// "Translation: ..." keeps whatever follows the colon on the same line.
static RE_TRANSLATION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[ \t]*(?:\*\*)?(?:translation|translated text|번역|翻訳|翻译)(?:\*\*)?[ \t]*[:：](?:\*\*)?[ \t]*")
        .unwrap()
});

// "English translation:", "## Korean", "**English:**" on a line of their own.
static RE_LANGUAGE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^[ \t]*(?:#{{1,6}}[ \t]*|\*\*)?(?:{LANGUAGES})[ \t]*(?:translation|translated text|text|version|번역|번역문)?(?:\*\*)?[ \t]*[:：]?[ \t]*(?:\*\*)?[ \t]*(?:\n|$)"
    ))
    .unwrap()
});

/// Strips leading boilerplate and surrounding whitespace.
pub fn clean_translation(raw: &str) -> String {
    let mut s = raw.trim_start();
    loop {
        let before = s.len();
        for re in [&*RE_PREFACE, &*RE_LANGUAGE_HEADER, &*RE_TRANSLATION_LABEL] {
            if let Some(m) = re.find(s) {
                s = s[m.end()..].trim_start();
            }
        }
        if s.len() == before {
            break;
        }
    }
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_translation_label() {
        assert_eq!(clean_translation("Translation: Hello world"), "Hello world");
        assert_eq!(clean_translation("**Translation:**\nHello"), "Hello");
    }

    #[test]
    fn strips_here_is_preface() {
        assert_eq!(
            clean_translation("Here is the English translation:\n\n# Page 1\n\nHello"),
            "# Page 1\n\nHello"
        );
    }

    #[test]
    fn strips_language_headers_in_either_language() {
        assert_eq!(clean_translation("English translation:\nHello"), "Hello");
        assert_eq!(clean_translation("## Korean\n\n안녕"), "안녕");
        assert_eq!(clean_translation("영어 번역:\nHello"), "Hello");
        assert_eq!(clean_translation("**English:**\nHello"), "Hello");
    }

    #[test]
    fn stacked_prefaces_are_all_removed() {
        assert_eq!(
            clean_translation("Here's the translated text:\nEnglish translation:\nTranslation: Hi"),
            "Hi"
        );
    }

    #[test]
    fn content_is_left_alone() {
        let md = "# Page 2\n\nThe translation: a process.\n\n---";
        assert_eq!(clean_translation(md), md);
        assert_eq!(clean_translation("English is spoken here."), "English is spoken here.");
    }

    #[test]
    fn here_are_lines_without_translation_wording_are_kept() {
        for md in [
            "Here are the key findings:\n\n- Revenue grew\n- Costs fell",
            "Here is the plan:\n1. Collect\n2. Review",
            "Below is a summary of version history",
        ] {
            assert_eq!(clean_translation(md), md);
        }
        assert_eq!(
            clean_translation("Here is the Korean version:\n안녕하세요"),
            "안녕하세요"
        );
    }
}
