//! Prompts for VLM-based transcription and harmonisation.
//!
//! Every prompt lives here so that changing model behaviour means editing
//! exactly one place, and so unit tests can inspect prompts without a live
//! model.
//!
//! A transcription request is composed of [`TRANSCRIPTION_RULES`] (system
//! message) and a task instruction (user message, followed by the page
//! images). The task instruction comes from a
//! [`crate::config::InstructionProfile`] or a user-supplied override.

/// Literal text inserted before each batch's transcription.
///
/// `{n}` is the 1-based batch ordinal. See [`batch_marker`].
pub const BATCH_MARKER_PREFIX: &str = "--- END OF BATCH ";

/// Render the boundary marker that precedes batch `n` (1-based).
pub fn batch_marker(n: usize) -> String {
    format!("\n\n{BATCH_MARKER_PREFIX}{n} ---\n\n")
}

/// Fixed transcription rules sent as the system message of every OCR request.
pub const TRANSCRIPTION_RULES: &str = r#"You are an extremely meticulous and literal OCR engine. Your sole purpose is to transcribe every single visible character and piece of text from the provided document pages, in the order the pages are given. The output feeds a retrieval (RAG) system, so completeness and absolute fidelity to the source are paramount.

Follow these rules precisely:

1. NO SUMMARISATION, NO INTERPRETATION, NO ADDITIONS, NO DELETIONS, NO MODIFICATIONS.

2. TRANSCRIBE EXACTLY WHAT YOU SEE
   - Every word, number, symbol and punctuation mark

3. STRUCTURE
   - Keep original paragraph breaks
   - Include all headings and subheadings as they appear
   - Replicate bullet points, numbered lists and other list formats
   - Preserve indentation where it carries meaning (outlines, code)

4. TABLES
   - Convert tables into well-formed Markdown tables
   - Align every column header and row value correctly
   - Transcribe numeric data exactly, including decimals and currency symbols

5. MULTI-COLUMN LAYOUTS
   - Read strictly column by column: left to right, then top to bottom
   - Never mix text from different columns on the same line

6. CHARTS, GRAPHS, IMAGES
   - Extract all legible text: titles, captions, axis labels, legends, data labels
   - Do not describe the picture itself

7. HEADERS, FOOTERS, PAGE NUMBERS, FOOTNOTES
   - Include them as they appear; they are part of the document

8. WHITESPACE
   - Keep line breaks and spacing that carry structure
   - Avoid excessive or unnecessary blank lines

9. OUTPUT FORMAT
   - Output ONLY the transcribed document content
   - No introductions ("Here is the extracted text:"), no closing remarks
   - Do NOT wrap the output in code fences"#;

/// Task instruction for documents with complex layouts (default profile).
pub const COMPLEX_LAYOUT_INSTRUCTION: &str = r#"Task: High-fidelity text extraction for complex layouts.

Capture all textual information while faithfully representing the original document's structure, so the text can be chunked for retrieval."#;

/// Task instruction for financial documents.
pub const FINANCIAL_INSTRUCTION: &str = r#"Task: Financial document transcription.

Extract text from these financial reports with extreme precision, focusing on numerical and structured data.

Key focus areas (in addition to the general rules):
1. Numerical accuracy: every number, decimal and percentage exactly as printed
2. Currency symbols: keep $, €, £ etc. attached to their values
3. Financial tables: replicate balance sheets, income statements and cash-flow statements as Markdown tables
4. Critical sections: cash-flow statements, footnotes and disclosures
5. Dates: capture every reporting-period date
6. Context: keep every number next to its label or description"#;

/// System prompt for the harmonisation pass.
///
/// The assembled text is sent as the user message.
pub const HARMONIZE_PROMPT: &str = r#"Task: Document harmonisation with absolute fidelity.

The user message contains text extracted from a single large document in several batches. The batches are separated by lines of the form '--- END OF BATCH N ---'.

Merge this content into one seamless, coherent document. The highest priority is to retain EVERY piece of information and keep the original structure, flow and formatting.

Rules (adhere strictly):
1. Remove ALL batch separation markers.
2. Stitch content across former batch boundaries:
   - Paragraphs, headings and lists must flow naturally across the boundary
   - Fix line breaks, extra spaces or missing spaces introduced by the batching
3. Stitch broken tables: if a Markdown table was split across a boundary, merge it back into a single well-formed Markdown table with aligned, complete rows
4. Preserve all formatting: bold, italics and other structural cues
5. Do NOT summarise, paraphrase, interpret, comment or add information
6. Output ONLY the complete merged text, nothing more"#;

/// System prompt for page verification.
///
/// The user message carries the extracted text between `---` lines, followed
/// by one page image.
pub const VERIFY_PROMPT: &str = r#"Task: OCR quality verification.

You are a quality assurance analyst. You are given an original document page image and text that was extracted from it by OCR. The text may cover neighbouring pages as well; only check the content visible on this page.

Compare the image with the text and report every discrepancy:
1. Missing text: words, lines or sections on the page that are absent from the text
2. Incorrect characters: misread letters or digits (e.g. 'l' vs '1', 'O' vs '0')
3. Table structure errors: misaligned columns, merged or split cells, missing rows
4. Formatting issues: lost headings, list structure or paragraph breaks

Provide a concise summary of the errors found. If no errors are found, respond with exactly "No errors found.""#;

/// Reply that marks a page as matching its transcription.
pub const VERIFY_CLEAN_REPLY: &str = "No errors found.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_marker_format() {
        assert_eq!(batch_marker(1), "\n\n--- END OF BATCH 1 ---\n\n");
        assert_eq!(batch_marker(12), "\n\n--- END OF BATCH 12 ---\n\n");
    }

    #[test]
    fn harmonize_prompt_names_the_marker() {
        assert!(HARMONIZE_PROMPT.contains(BATCH_MARKER_PREFIX.trim()));
    }

    #[test]
    fn rules_forbid_commentary_and_fences() {
        assert!(TRANSCRIPTION_RULES.contains("no closing remarks"));
        assert!(TRANSCRIPTION_RULES.contains("code fences"));
    }

    #[test]
    fn verify_prompt_names_the_clean_reply() {
        assert!(VERIFY_PROMPT.contains(VERIFY_CLEAN_REPLY));
    }
}
