//! Translation prompts.
//!
//! The system prompt fixes the translator's role; the user prompt carries
//! the guidelines, optional glossary and context, and the text itself
//! fenced by `---` lines so the model can tell instructions from content.

use std::collections::BTreeMap;

/// System instructions sent with every chunk.
pub const SYSTEM_PROMPT: &str =
    "You are a professional translator specializing in technical and educational content.";

/// English name for the language codes we know; other codes pass through.
pub fn language_name(code: &str) -> &str {
    match code {
        "ko" => "Korean",
        "en" => "English",
        "ja" => "Japanese",
        "zh" => "Chinese",
        other => other,
    }
}

const GUIDELINES: &[&str] = &[
    "- Preserve Markdown formatting (headers, lists, tables, links)",
    "- Maintain technical terminology accurately",
    "- Keep natural and fluent expression",
    "- Preserve line breaks and spacing",
    "- Do not translate code blocks",
    "- Keep `# Page N` lines and image references exactly as they are",
];

/// Builds the user prompt for one chunk.
///
/// Glossary entries are passed on verbatim as `- source → target` lines.
pub fn build_user_prompt(
    text: &str,
    source_lang: &str,
    target_lang: &str,
    context: Option<&str>,
    glossary: Option<&BTreeMap<String, String>>,
) -> String {
    let source = language_name(source_lang);
    let target = language_name(target_lang);

    let mut parts: Vec<String> = vec![
        format!("Translate the following {source} text to {target}."),
        String::new(),
        "Guidelines:".to_string(),
    ];
    parts.extend(GUIDELINES.iter().map(|g| g.to_string()));

    if let Some(glossary) = glossary.filter(|g| !g.is_empty()) {
        parts.push(String::new());
        parts.push("Use these custom terms:".to_string());
        for (src, tgt) in glossary {
            parts.push(format!("- {src} → {tgt}"));
        }
    }

    if let Some(context) = context.filter(|c| !c.is_empty()) {
        parts.push(String::new());
        parts.push(format!("Previous context: {context}"));
    }

    parts.push(String::new());
    parts.push(format!("{source} text:"));
    parts.push("---".to_string());
    parts.push(text.to_string());
    parts.push("---".to_string());
    parts.push(String::new());
    parts.push(format!("{target} translation:"));

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_languages() {
        assert_eq!(language_name("ko"), "Korean");
        assert_eq!(language_name("zh"), "Chinese");
        assert_eq!(language_name("de"), "de");
    }

    #[test]
    fn prompt_layout() {
        let p = build_user_prompt("안녕하세요", "ko", "en", None, None);
        assert!(p.starts_with("Translate the following Korean text to English.\n\nGuidelines:\n"));
        assert!(p.ends_with("Korean text:\n---\n안녕하세요\n---\n\nEnglish translation:"));
        assert!(!p.contains("Previous context"));
        assert!(!p.contains("custom terms"));
    }

    #[test]
    fn glossary_and_context_are_included() {
        let mut glossary = BTreeMap::new();
        glossary.insert("인공지능".to_string(), "AI".to_string());
        let p = build_user_prompt("text", "ko", "en", Some("...the end."), Some(&glossary));
        assert!(p.contains("Use these custom terms:\n- 인공지능 → AI"));
        assert!(p.contains("Previous context: ...the end."));
        let glossary_at = p.find("custom terms").unwrap();
        let context_at = p.find("Previous context").unwrap();
        assert!(glossary_at < context_at);
    }
}
