//! Prompt templates for the enrichment operations.
//!
//! Templates are static strings with named `{placeholder}` slots resolved
//! by [`render`] before dispatch. Keep instructions terse: the model is told
//! to return the payload only, with no preamble, so responses can be used
//! verbatim after a trim.

pub const SUMMARY: &str = "\
Write a concise summary of the following article.

Requirements:
1. Keep it between 80 and 100 words
2. Capture the core argument and theme of the article
3. Plain, fluent prose
4. Return only the summary, with no prefix or commentary

Article:
{content}";

pub const TAGS: &str = "\
Analyze the following article and extract 3 to 5 keyword tags that best
represent its topic.

Requirements:
1. Each tag is one short word or phrase
2. Separate tags with plain commas
3. Return only the tags, nothing else
4. Prefer widely used technical terminology

Title: {title}
Article:
{content}";

pub const PROOFREAD: &str = "\
Proofread the following article, fixing typos and grammatical mistakes.

Requirements:
1. Only correct clear spelling and grammar errors
2. Preserve the writing style and all Markdown formatting
3. Do not change the structure or meaning of the article
4. Return the full corrected article, with no commentary

Original:
{content}";

/// Resolve `{name}` placeholders in a template.
///
/// Unknown placeholders are left in place; substitution values are inserted
/// literally and never re-scanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Truncate a string to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
