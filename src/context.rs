//! Formatting of retrieved passages into the prompt's context block.

use crate::storage::Passage;

/// Context used when retrieval comes back empty, so the prompt never carries a blank block.
pub const NO_CONTEXT_SENTINEL: &str = "No relevant documents were found.";

pub const PASSAGE_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    max_context_chars: Option<usize>,
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the block to `max_chars`; passages are kept whole and the first one always fits.
    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            max_context_chars: Some(max_chars),
        }
    }

    pub fn max_context_chars(&self) -> Option<usize> {
        self.max_context_chars
    }

    /// Join passage texts in rank order. Metadata is left out of the block.
    pub fn assemble(&self, passages: &[Passage]) -> String {
        if passages.is_empty() {
            return NO_CONTEXT_SENTINEL.to_string();
        }

        let mut context = String::new();
        let mut context_chars = 0;
        for (idx, passage) in passages.iter().enumerate() {
            let text_chars = passage.text.chars().count();
            let added = if idx == 0 {
                text_chars
            } else {
                PASSAGE_SEPARATOR.chars().count() + text_chars
            };

            if let Some(limit) = self.max_context_chars {
                if idx > 0 && context_chars + added > limit {
                    break;
                }
            }
            context_chars += added;

            if idx > 0 {
                context.push_str(PASSAGE_SEPARATOR);
            }
            context.push_str(&passage.text);
        }

        // Passages with only whitespace still count as no context
        if context.trim().is_empty() {
            return NO_CONTEXT_SENTINEL.to_string();
        }
        context
    }
}
