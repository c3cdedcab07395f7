//! Streaming citation parser
//!
//! The model is told to finish its answer with a bracketed list of source
//! numbers (`... in the evening. [2, 1]`). Tokens arrive one at a time, so the
//! parser decides online what is prose, which is forwarded at once, and what
//! belongs to a citation list, which is accumulated until the stream ends.
//!
//! ```text
//!            token contains `[`                 token contains `]`
//!   PROSE ─────────────────────────▶ IN_CITATION_LIST ─────────────────▶ PROSE
//!     │ forward text                   │ buffer, split entries on `,`     (emit separator)
//! ```
//!
//! Whitespace-only tokens are skipped in both states. The citation region is
//! buffered rather than read one number per token, so `[2,` `1]`, `[2, 1]`
//! and `[` `2` `,` `1` `]` all parse the same.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::{CitationError, MalformedCitation, Result};
use crate::providers::llm::TokenStream;

/// Where the parser currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Prose,
    InCitationList,
}

/// Output of a single `feed` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserEvent {
    /// Prose, forwarded verbatim
    Text(String),
    /// A citation list closed here
    Separator,
}

/// Everything the parser saw, available once the stream is over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Prose with separators rendered
    pub text: String,
    /// Citation numbers in order of appearance
    pub citations: Vec<usize>,
    /// Set when the citation list cannot be trusted
    pub fault: Option<CitationError>,
}

/// Item of a parsed token stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedItem {
    Event(ParserEvent),
    /// Always last, and only after the token stream ended cleanly
    Finished(ParseOutcome),
}

/// Online prose / citation-list separator
#[derive(Debug, Clone)]
pub struct CitationParser {
    state: ParserState,
    separator: String,
    text: String,
    entry: String,
    // set after a bad entry; the rest of the region is ignored
    poisoned: bool,
    citations: Vec<usize>,
    fault: Option<CitationError>,
}

impl Default for CitationParser {
    fn default() -> Self {
        Self::new("\n")
    }
}

impl CitationParser {
    /// Create a parser that renders closed lists as `separator`
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            state: ParserState::Prose,
            separator: separator.into(),
            text: String::new(),
            entry: String::new(),
            poisoned: false,
            citations: Vec::new(),
            fault: None,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Citations completed so far
    pub fn citations(&self) -> &[usize] {
        &self.citations
    }

    /// Consume one token, returning what should be forwarded downstream
    pub fn feed(&mut self, token: &str) -> Vec<ParserEvent> {
        let mut events = Vec::new();
        let mut rest = token;

        while !rest.trim().is_empty() {
            match self.state {
                ParserState::Prose => {
                    if let Some(after) = rest.trim_start().strip_prefix('[') {
                        self.open_region();
                        rest = after;
                        continue;
                    }

                    match rest.find('[') {
                        Some(pos) => {
                            self.emit_text(rest[..pos].trim_end(), &mut events);
                            self.open_region();
                            rest = &rest[pos + 1..];
                        }
                        None => {
                            self.emit_text(rest, &mut events);
                            break;
                        }
                    }
                }
                ParserState::InCitationList => match rest.find(']') {
                    Some(pos) => {
                        self.absorb(&rest[..pos]);
                        self.close_region();
                        self.text.push_str(&self.separator);
                        events.push(ParserEvent::Separator);
                        rest = &rest[pos + 1..];
                    }
                    None => {
                        self.absorb(rest);
                        break;
                    }
                },
            }
        }

        events
    }

    /// Close the parser at end of stream
    pub fn finish(mut self) -> ParseOutcome {
        if self.state == ParserState::InCitationList {
            // a number may have been cut mid-way; only completed entries count
            tracing::warn!(
                "Citation list never closed; keeping {} completed citations",
                self.citations.len()
            );
            self.entry.clear();
            self.fault
                .get_or_insert(CitationError::malformed(MalformedCitation::Unterminated));
        }

        ParseOutcome {
            text: self.text,
            citations: self.citations,
            fault: self.fault,
        }
    }

    fn emit_text(&mut self, text: &str, events: &mut Vec<ParserEvent>) {
        if text.is_empty() {
            return;
        }
        self.text.push_str(text);
        events.push(ParserEvent::Text(text.to_string()));
    }

    fn open_region(&mut self) {
        self.state = ParserState::InCitationList;
        self.entry.clear();
        self.poisoned = false;
    }

    fn close_region(&mut self) {
        self.close_entry();
        self.state = ParserState::Prose;
        self.poisoned = false;
    }

    fn absorb(&mut self, fragment: &str) {
        for ch in fragment.chars() {
            if ch == ',' {
                self.close_entry();
            } else {
                self.entry.push(ch);
            }
        }
    }

    fn close_entry(&mut self) {
        let entry = std::mem::take(&mut self.entry);
        let entry = entry.trim();
        if self.poisoned || entry.is_empty() {
            return;
        }

        match citation_number(entry) {
            Some(index) => self.citations.push(index),
            None => {
                tracing::warn!("Non-numeric citation entry '{}', dropping rest of list", entry);
                self.poisoned = true;
                self.fault.get_or_insert(CitationError::malformed(
                    MalformedCitation::NonInteger(entry.to_string()),
                ));
            }
        }
    }
}

/// Read one base-10 citation entry.
///
/// Integers below 1 come back as 0 and integers too large for `usize`
/// saturate, so both fail resolution as out of range instead of being
/// mistaken for non-numbers. `None` means the entry is not an integer.
pub(crate) fn citation_number(entry: &str) -> Option<usize> {
    let (negative, digits) = match entry.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, entry.strip_prefix('+').unwrap_or(entry)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if negative {
        return Some(0);
    }
    Some(digits.parse().unwrap_or(usize::MAX))
}

/// Parse a complete answer in one go
pub fn parse_complete(text: &str, separator: &str) -> ParseOutcome {
    let mut parser = CitationParser::new(separator);
    parser.feed(text);
    parser.finish()
}

/// Run a token stream through a parser.
///
/// Prose is yielded as soon as it is seen. The `Finished` item comes last and
/// only if the token stream ended without error; a stream error is yielded
/// once and ends the output.
pub fn parse_stream(tokens: TokenStream, parser: CitationParser) -> BoxStream<'static, Result<ParsedItem>> {
    struct Feed {
        tokens: TokenStream,
        parser: Option<CitationParser>,
        pending: VecDeque<ParsedItem>,
    }

    let feed = Feed {
        tokens,
        parser: Some(parser),
        pending: VecDeque::new(),
    };

    stream::unfold(feed, |mut feed| async move {
        loop {
            if let Some(item) = feed.pending.pop_front() {
                return Some((Ok(item), feed));
            }
            if feed.parser.is_none() {
                return None;
            }

            match feed.tokens.next().await {
                Some(Ok(token)) => {
                    if let Some(parser) = feed.parser.as_mut() {
                        feed.pending
                            .extend(parser.feed(&token).into_iter().map(ParsedItem::Event));
                    }
                }
                Some(Err(e)) => {
                    feed.parser = None;
                    return Some((Err(e), feed));
                }
                None => {
                    if let Some(parser) = feed.parser.take() {
                        feed.pending.push_back(ParsedItem::Finished(parser.finish()));
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use proptest::prelude::*;

    fn run(tokens: &[&str]) -> (Vec<ParserEvent>, ParseOutcome) {
        let mut parser = CitationParser::default();
        let events = tokens.iter().flat_map(|t| parser.feed(t)).collect();
        (events, parser.finish())
    }

    fn whitespace_tokens(text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        for (i, word) in text.split(' ').enumerate() {
            tokens.push(if i == 0 { word.to_string() } else { format!(" {}", word) });
        }
        tokens
    }

    #[test]
    fn test_trailing_list_scenario() {
        let (events, outcome) = run(&["The", " sky", " is", " red.", " [2,", "1]"]);

        assert_eq!(
            events,
            vec![
                ParserEvent::Text("The".into()),
                ParserEvent::Text(" sky".into()),
                ParserEvent::Text(" is".into()),
                ParserEvent::Text(" red.".into()),
                ParserEvent::Separator,
            ]
        );
        assert_eq!(outcome.text, "The sky is red.\n");
        assert_eq!(outcome.citations, vec![2, 1]);
        assert_eq!(outcome.fault, None);
    }

    #[test]
    fn test_single_token_matches_word_tokens() {
        let answers = [
            "The sky is red. [2, 1]",
            "Water will be wet when the sky is red, which occurs in the evening. [2, 1]",
            "None of the sources mention it.",
            "Grass is green [1] and the sky is red. [2]",
            "Sky is red. [3, 3, 1] More text follows.",
            "Broken list [1, 2",
        ];

        for answer in answers {
            let whole = parse_complete(answer, "\n");
            let tokens = whitespace_tokens(answer);
            let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
            let (_, split) = run(&refs);
            assert_eq!(whole, split, "{:?}", answer);
        }
    }

    proptest! {
        #[test]
        fn test_generated_answers_parse_the_same_split_or_whole(
            words in prop::collection::vec("[A-Za-z.,!?]{1,8}", 1..12),
            list in prop::option::of((prop::collection::vec(0usize..40, 0..4), any::<bool>())),
            trailer in prop::collection::vec("[a-z]{1,6}", 0..3),
        ) {
            let mut answer = words.join(" ");
            if let Some((numbers, closed)) = &list {
                let entries: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
                answer.push_str(" [");
                answer.push_str(&entries.join(", "));
                if *closed {
                    answer.push(']');
                    for word in &trailer {
                        answer.push(' ');
                        answer.push_str(word);
                    }
                }
            }

            let whole = parse_complete(&answer, "\n");
            let tokens = whitespace_tokens(&answer);
            let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
            let (_, split) = run(&refs);
            prop_assert_eq!(whole, split);
        }
    }

    #[test]
    fn test_blank_tokens_are_skipped() {
        let (events, outcome) = run(&["", "Hello", "   ", " [", " ", "1", "\n", "]"]);
        assert_eq!(events, vec![ParserEvent::Text("Hello".into()), ParserEvent::Separator]);
        assert_eq!(outcome.citations, vec![1]);
    }

    #[test]
    fn test_one_number_per_token() {
        let (_, outcome) = run(&["Answer.", " [", "2", ",", " 1", "]"]);
        assert_eq!(outcome.citations, vec![2, 1]);
        assert_eq!(outcome.text, "Answer.\n");
    }

    #[test]
    fn test_subword_tokens_are_aggregated() {
        let (_, outcome) = run(&["Answer. [1", "2, 3", "]"]);
        assert_eq!(outcome.citations, vec![12, 3]);
    }

    #[test]
    fn test_duplicates_keep_order() {
        let outcome = parse_complete("x [3, 1, 3]", "\n");
        assert_eq!(outcome.citations, vec![3, 1, 3]);
    }

    #[test]
    fn test_unterminated_list_keeps_completed_entries() {
        let (_, outcome) = run(&["The", " sky.", " [2,", " 1"]);
        assert_eq!(outcome.text, "The sky.");
        assert_eq!(outcome.citations, vec![2]);
        assert_eq!(
            outcome.fault,
            Some(CitationError::malformed(MalformedCitation::Unterminated))
        );
    }

    #[test]
    fn test_non_integer_entry_truncates_list() {
        let (events, outcome) = run(&["Answer.", " [1,", " two,", " 3]", " Done."]);
        assert_eq!(outcome.citations, vec![1]);
        assert_eq!(
            outcome.fault,
            Some(CitationError::malformed(MalformedCitation::NonInteger("two".into())))
        );
        // prose around the list is untouched
        assert_eq!(outcome.text, "Answer.\n Done.");
        assert_eq!(events.last(), Some(&ParserEvent::Text(" Done.".into())));
    }

    #[test]
    fn test_numbers_below_one_are_kept_for_resolution() {
        let outcome = parse_complete("x [-1, 0, 2]", "\n");
        assert_eq!(outcome.citations, vec![0, 0, 2]);
        assert_eq!(outcome.fault, None);
    }

    #[test]
    fn test_oversized_number_saturates() {
        let outcome = parse_complete("x [99999999999999999999999]", "\n");
        assert_eq!(outcome.citations, vec![usize::MAX]);
        assert_eq!(outcome.fault, None);
    }

    #[test]
    fn test_citation_number() {
        assert_eq!(citation_number("12"), Some(12));
        assert_eq!(citation_number("+3"), Some(3));
        assert_eq!(citation_number("-7"), Some(0));
        assert_eq!(citation_number("1.5"), None);
        assert_eq!(citation_number("-"), None);
        assert_eq!(citation_number("two"), None);
    }

    #[test]
    fn test_closing_bracket_in_prose_is_text() {
        let outcome = parse_complete("a) first, b] second", "\n");
        assert_eq!(outcome.text, "a) first, b] second");
        assert!(outcome.citations.is_empty());
    }

    #[test]
    fn test_custom_separator() {
        let outcome = parse_complete("Sky is red. [1]", ". ");
        assert_eq!(outcome.text, "Sky is red.. ");
    }

    #[tokio::test]
    async fn test_stream_yields_text_then_finished() {
        let tokens: TokenStream = stream::iter(
            ["The", " sky", " is", " red.", " [2,", "1]"]
                .into_iter()
                .map(|t| Ok(t.to_string())),
        )
        .boxed();

        let items: Vec<ParsedItem> = parse_stream(tokens, CitationParser::default())
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(items.len(), 6);
        assert_eq!(items[0], ParsedItem::Event(ParserEvent::Text("The".into())));
        assert_eq!(items[4], ParsedItem::Event(ParserEvent::Separator));
        match &items[5] {
            ParsedItem::Finished(outcome) => assert_eq!(outcome.citations, vec![2, 1]),
            other => panic!("expected Finished, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_error_ends_without_citations() {
        let tokens: TokenStream = stream::iter(vec![
            Ok("Partial".to_string()),
            Ok(" answer [1,".to_string()),
            Err(Error::model("connection reset")),
            Ok(" 2]".to_string()),
        ])
        .boxed();

        let items: Vec<Result<ParsedItem>> =
            parse_stream(tokens, CitationParser::default()).collect().await;

        assert_eq!(items.len(), 3);
        assert!(matches!(items[0], Ok(ParsedItem::Event(ParserEvent::Text(_)))));
        assert!(matches!(items[2], Err(Error::ModelInvocation(_))));
        assert!(!items
            .iter()
            .any(|item| matches!(item, Ok(ParsedItem::Finished(_)))));
    }

    #[tokio::test]
    async fn test_stream_ending_inside_list_still_finishes() {
        let tokens: TokenStream = stream::iter(
            ["Sky.", " [1,", " 2"].into_iter().map(|t| Ok(t.to_string())),
        )
        .boxed();

        let items: Vec<ParsedItem> = parse_stream(tokens, CitationParser::default())
            .map(|item| item.unwrap())
            .collect()
            .await;

        match items.last() {
            Some(ParsedItem::Finished(outcome)) => {
                assert_eq!(outcome.citations, vec![1]);
                assert!(outcome.fault.is_some());
            }
            other => panic!("expected Finished, got {:?}", other),
        }
    }
}
