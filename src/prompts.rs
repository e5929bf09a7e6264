//! Prompt for the vision-LLM recognizer.
//!
//! The vision model stands in for Tesseract, so it must behave like OCR: a
//! plain transcription the structural parser can read line by line, not a
//! reformatted or summarised document. Keeping the prompt here lets tests
//! pin the rules the parser depends on.

/// System prompt for transcribing one circular page.
pub const TRANSCRIPTION_PROMPT: &str = r#"You are an OCR engine. Transcribe the text of this scanned pharmaceutical price circular page exactly as printed.

Rules:

1. Output plain text only. No Markdown, no tables, no code fences, no commentary.
2. One printed line per output line. Each medication row of a price table goes on a single line with its cells separated by single spaces, in the order: code, designation, prices, category, margin.
3. Copy numbers exactly, including the decimal separator and all three decimals of a price (for example 1.403 or 82,100). Never round, convert or compute prices.
4. Keep Arabic text in logical reading order and in Arabic script. Keep French and English text as printed.
5. Keep laboratory names on their own line, exactly as printed.
6. Skip stamps, signatures, page numbers and decorative lines.
7. If the page has no readable text, output nothing."#;

/// User turn accompanying the page image, naming the expected scripts.
pub fn page_instruction(languages: &str) -> String {
    format!("Transcribe this page. Expected languages (Tesseract codes): {languages}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_forbids_markdown_and_keeps_rows_on_one_line() {
        assert!(TRANSCRIPTION_PROMPT.contains("No Markdown"));
        assert!(TRANSCRIPTION_PROMPT.contains("single line"));
    }

    #[test]
    fn instruction_names_languages() {
        assert!(page_instruction("ara+fra").ends_with("ara+fra."));
    }
}
