//! Catalog-driven completion engine for console front-ends.
//!
//! The line editor can invoke this module to look up suggestions based on the
//! current buffer contents and cursor position without pulling in `std`.

use heapless::Vec as HeaplessVec;

use super::catalog::{self, CommandSpec, CommandTag};

const MAX_SUGGESTIONS: usize = 16;

/// Completion result returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionResult {
    /// Replacement to apply when one candidate matches or when the candidates
    /// share a prefix longer than what was typed.
    pub replacement: Option<Replacement>,
    /// Candidates for the word under the cursor. Empty when nothing matched.
    pub options: HeaplessVec<&'static str, MAX_SUGGESTIONS>,
}

impl CompletionResult {
    const fn empty() -> Self {
        Self {
            replacement: None,
            options: HeaplessVec::new(),
        }
    }
}

/// Portion of the buffer to substitute with a completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    pub value: &'static str,
    pub append_space: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompletionContext {
    Root,
    Keyword(&'static CommandSpec),
    HelpTopic,
    None,
}

/// Stateless completion engine that mirrors the command catalog.
#[derive(Default)]
pub struct CompletionEngine;

impl CompletionEngine {
    pub const fn new() -> Self {
        Self
    }

    /// Computes completions for `buffer` with the cursor at byte `cursor`.
    ///
    /// The cursor must sit on a UTF-8 boundary; callers restrict input to ASCII.
    pub fn complete(&self, buffer: &str, cursor: usize) -> CompletionResult {
        if cursor > buffer.len() || !buffer.is_char_boundary(cursor) {
            return CompletionResult::empty();
        }

        let upto_cursor = &buffer[..cursor];
        let prefix_start = token_start(upto_cursor);
        let prefix = &upto_cursor[prefix_start..];
        let context = determine_context(&upto_cursor[..prefix_start]);

        let mut matches: HeaplessVec<&'static str, MAX_SUGGESTIONS> = HeaplessVec::new();
        let mut push = |candidate: &'static str| {
            if starts_with_ignore_ascii_case(candidate, prefix) {
                let _ = matches.push(candidate);
            }
        };
        match context {
            CompletionContext::Root | CompletionContext::HelpTopic => {
                catalog::commands().iter().for_each(|spec| push(spec.name));
            }
            CompletionContext::Keyword(spec) => spec.keywords.iter().for_each(|word| push(*word)),
            CompletionContext::None => {}
        }

        if matches.is_empty() {
            return CompletionResult::empty();
        }

        let replacement_value = if let [candidate] = matches.as_slice() {
            Some(*candidate)
        } else {
            let lcp = longest_common_prefix(matches.as_slice());
            let shared = common_prefix_len_ignore_case(prefix, lcp);
            if lcp.len() > shared { Some(lcp) } else { None }
        };

        let append_space = matches.len() == 1
            && context == CompletionContext::Root
            && catalog::find(matches[0]).is_some_and(takes_arguments);

        CompletionResult {
            replacement: replacement_value.map(|value| Replacement {
                start: prefix_start,
                end: cursor,
                value,
                append_space,
            }),
            options: matches,
        }
    }
}

fn determine_context(leading: &str) -> CompletionContext {
    let mut words = leading.split_ascii_whitespace();
    let Some(first) = words.next() else {
        return CompletionContext::Root;
    };
    if words.next().is_some() {
        return CompletionContext::None;
    }

    match catalog::find(first) {
        Some(spec) if spec.tag == CommandTag::Help => CompletionContext::HelpTopic,
        Some(spec) if !spec.keywords.is_empty() => CompletionContext::Keyword(spec),
        _ => CompletionContext::None,
    }
}

fn takes_arguments(spec: &CommandSpec) -> bool {
    spec.usage.len() > spec.name.len()
}

fn token_start(buffer: &str) -> usize {
    buffer
        .rfind([' ', '\t'])
        .map_or(0, |position| position + 1)
}

fn starts_with_ignore_ascii_case(candidate: &str, prefix: &str) -> bool {
    prefix.len() <= candidate.len()
        && candidate.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn common_prefix_len_ignore_case(lhs: &str, rhs: &str) -> usize {
    lhs.as_bytes()
        .iter()
        .zip(rhs.as_bytes())
        .take_while(|(l, r)| l.eq_ignore_ascii_case(r))
        .count()
}

fn longest_common_prefix(candidates: &[&'static str]) -> &'static str {
    if let Some((first, rest)) = candidates.split_first() {
        let mut prefix = *first;
        for candidate in rest {
            let len = common_prefix_len_ignore_case(prefix, candidate);
            prefix = &prefix[..len];
            if prefix.is_empty() {
                break;
            }
        }
        prefix
    } else {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offers_all_commands_from_empty_buffer() {
        let result = CompletionEngine::new().complete("", 0);
        assert!(result.replacement.is_none());
        assert_eq!(result.options.len(), catalog::commands().len());
    }

    #[test]
    fn filters_root_commands_by_prefix() {
        let result = CompletionEngine::new().complete("re", 2);
        assert_eq!(result.options.as_slice(), ["resched"]);
        let replacement = result.replacement.expect("expected replacement");
        assert_eq!(replacement.value, "resched");
        assert!(replacement.append_space);
    }

    #[test]
    fn shared_prefix_extends_partial_word() {
        let result = CompletionEngine::new().complete("s", 1);
        assert_eq!(result.options.as_slice(), ["suspend", "screen", "status"]);
        assert!(result.replacement.is_none());

        let result = CompletionEngine::new().complete("i", 1);
        assert_eq!(result.options.as_slice(), ["inactive", "irq", "idle"]);
        assert!(result.replacement.is_none());
    }

    #[test]
    fn does_not_append_space_for_bare_commands() {
        let result = CompletionEngine::new().complete("stat", 4);
        let replacement = result.replacement.expect("expected replacement");
        assert_eq!(replacement.value, "status");
        assert!(!replacement.append_space);
    }

    #[test]
    fn suggests_command_keywords() {
        let result = CompletionEngine::new().complete("rail ", 5);
        assert_eq!(result.options.as_slice(), ["need", "release"]);

        let result = CompletionEngine::new().complete("SUSPEND PR", 10);
        let replacement = result.replacement.expect("expected replacement");
        assert_eq!(replacement.start, 8);
        assert_eq!(replacement.end, 10);
        assert_eq!(replacement.value, "prepare");
    }

    #[test]
    fn provides_help_topics() {
        let result = CompletionEngine::new().complete("help ra", 7);
        assert_eq!(result.options.as_slice(), ["rail"]);
        assert!(!result.replacement.expect("expected replacement").append_space);
    }

    #[test]
    fn nothing_after_complete_arguments() {
        let result = CompletionEngine::new().complete("screen on ", 10);
        assert!(result.options.is_empty());
    }
}
