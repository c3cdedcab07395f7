//! Prompt templates for citation-aware answers

use std::fmt;

use crate::types::SourceChunk;

const CITATION_QA_HEADER: &str = "\
Please provide an answer based solely on the provided sources. \
Your response consists of the answer followed by the citations. \
When referencing information from a source, add its number to the citation list at the end of the answer. \
Every answer should include at least one source citation. \
Only cite a source when you are explicitly referencing it. \
If none of the sources are helpful, you should indicate that. \
End the answer with the list of cited source numbers in square brackets, separated by commas.\n\
For example:\n\
Source 1:\n\
The sky is red in the evening and blue in the morning.\n\
Source 2:\n\
Water is wet when the sky is red.\n\
Query: When is water wet?\n\
Answer: Water will be wet when the sky is red, which occurs in the evening. [2, 1]\n\
Now it's your turn. Below are several numbered sources of information:\
\n------\n";

const JSON_OUTPUT_INSTRUCTION: &str = "\n\
Respond with a JSON object of the form \
{\"answer\": \"<answer without the bracketed list>\", \"citations\": [<source numbers>]} \
and nothing else.\n";

/// A rendered citation prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationPrompt(String);

impl CitationPrompt {
    /// Render the numbered sources and the query into one prompt
    pub fn build(chunks: &[SourceChunk], query: &str) -> Self {
        let mut prompt = String::from(CITATION_QA_HEADER);

        for chunk in chunks {
            prompt.push_str(&format!("Source {}:\n{}\n", chunk.index, chunk.text));
        }

        prompt.push_str("\n------\n");
        prompt.push_str(&format!("Query: {}\nAnswer: ", query.trim()));

        Self(prompt)
    }

    /// The prompt text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Variant asking for `{"answer", "citations"}` JSON instead of prose
    pub fn with_json_output(&self) -> String {
        let base = self.0.trim_end_matches("Answer: ");
        format!("{}{}Answer: ", base, JSON_OUTPUT_INSTRUCTION)
    }
}

impl fmt::Display for CitationPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CitationPrompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
