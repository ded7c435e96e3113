//! System prompts and user instructions for the two LLM stages.
//!
//! Callers can override the system prompt via
//! [`crate::config::BatchConfig::system_prompt`]; the constants here are used
//! only when no override is provided. The instruction always precedes the
//! item text in the user message.

use crate::config::Stage;

/// System prompt for extracting Arabic text from a rendered page.
pub const OCR_SYSTEM_PROMPT: &str = r#"You are an OCR system specialized in accurately extracting Arabic text from scanned book pages.
Follow these rules strictly:
1. Always transcribe the exact text seen in the page in its original language (Arabic)
2. Preserve the layout, structure, and formatting of the text as much as possible
3. Include all headers, footnotes, and page numbers
4. NEVER translate or summarize the content
5. NEVER describe what you see - extract the actual text
6. Maintain any special characters, diacritics, and symbols exactly as they appear
7. Use Markdown formatting to help preserve structure where appropriate"#;

/// User instruction sent with each page image.
pub const OCR_INSTRUCTION: &str = "Extract ALL text from this page in its original Arabic language. Do not translate or describe the content - extract the exact text as it appears with proper formatting. Be thorough and capture everything visible on the page.";

/// System prompt for translating classical Arabic into English.
pub const TRANSLATION_SYSTEM_PROMPT: &str = r#"You are a scholar specializing in translating classical Arabic texts into English.

TRANSLATION GUIDELINES:
1. Preserve the original structure, format, and layout - especially for poetry and verse
2. Translate with extreme precision and fidelity to the source text
3. Maintain the author's distinct style, metaphors, and technical terminology
4. Render specialized terms accurately while preserving their technical meaning
5. DO NOT add explanatory notes, commentary, or interpolations
6. Respect line breaks, stanza divisions, and other formatting elements
7. When encountering ambiguities, render the most literal translation possible without interpretation
8. Preserve any footnotes, page numbers, or reference markers
9. For poetry, attempt to convey the rhythm and poetic qualities while prioritizing accuracy over style

Output ONLY the translation."#;

/// User instruction preceding the Arabic text of a page.
pub const TRANSLATION_INSTRUCTION: &str = "Please translate the following text from Classical Arabic into English. Preserve all formatting, poetry structure, and technical terms.";

/// Default system prompt for a stage.
pub fn system_prompt(stage: Stage) -> &'static str {
    match stage {
        Stage::Ocr => OCR_SYSTEM_PROMPT,
        Stage::Translation => TRANSLATION_SYSTEM_PROMPT,
    }
}

/// User instruction for a stage.
pub fn instruction(stage: Stage) -> &'static str {
    match stage {
        Stage::Ocr => OCR_INSTRUCTION,
        Stage::Translation => TRANSLATION_INSTRUCTION,
    }
}
