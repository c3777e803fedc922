//! Guided text generation: compose a full piece from a topic, re-prompting
//! for the missing conclusion when the model truncates, then repairing
//! whatever is left.

use crate::models::{ContentKind, Usage};
use crate::services::completion::{self, CompletionPolicy};
use crate::services::llm::{GenerationBackend, GenerationRequest, LlmError};

pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// How many trailing characters of existing text are handed back to the
/// model as context for a completion-only call.
const COMPLETION_CONTEXT_CHARS: usize = 800;
const COMPLETION_MAX_TOKENS: u32 = 1000;

struct Profile {
    label: &'static str,
    template: &'static str,
    conclusion: &'static str,
}

fn profile(kind: ContentKind) -> Profile {
    match kind {
        ContentKind::Article => Profile {
            label: "article",
            template: "Write a well-structured article with:\n- INTRODUCTION: present the theme in an engaging way\n- MAIN BODY: develop the subject in clear, well-organized paragraphs, each with one main idea\n- CONCLUSION: close with a final paragraph that sums up the key points and offers a final reflection or a call to action\nUse an informative but engaging style.",
            conclusion: "The conclusion must sum up the main points and offer a final reflection or a call to action.",
        },
        ContentKind::Essay => Profile {
            label: "essay",
            template: "Write an argumentative essay with:\n- THESIS: state your position clearly\n- ARGUMENTS: develop your arguments with examples and logical reasoning\n- CONCLUSION: close by restating the thesis and reinforcing your position with a final reflection\nKeep a formal, academic style.",
            conclusion: "The conclusion must restate the thesis and offer a final reflection that reinforces the argued position.",
        },
        ContentKind::Blog => Profile {
            label: "blog post",
            template: "Write a blog post with:\n- OPENING: grab attention with an engaging start\n- BODY: lay out the main content in short, clear paragraphs\n- CLOSING: end with a personal reflection, a call to action or a question for the readers\nUse a conversational, engaging style with short paragraphs.",
            conclusion: "The conclusion must be engaging, ideally with a question for the readers or a call to action.",
        },
        ContentKind::Story => Profile {
            label: "short story",
            template: "Write a narrative story with:\n- BEGINNING: introduce characters and setting\n- DEVELOPMENT: build the plot through events and conflict\n- CONCLUSION: close with a satisfying resolution that gives the story meaning\nUse vivid descriptions and natural dialogue.",
            conclusion: "The conclusion must resolve the plot in a satisfying way, giving the story a sense of completeness.",
        },
    }
}

/// Token budget for the main call, roughly 1.3 tokens per requested word,
/// clamped to the 2000..=4000 range.
pub fn token_budget(target_words: u32) -> u32 {
    ((target_words as f64 * 1.3).ceil() as u32).clamp(2000, 4000)
}

#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub topic: String,
    pub target_words: u32,
    pub kind: ContentKind,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct ComposeOutcome {
    pub text: String,
    pub usage: Usage,
}

pub struct Composer<'a, B: GenerationBackend> {
    backend: &'a B,
    policy: CompletionPolicy,
}

impl<'a, B: GenerationBackend> Composer<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Composer {
            backend,
            policy: CompletionPolicy::default(),
        }
    }

    /// Generates a complete piece of text. Retries are only for content
    /// completeness; any upstream failure aborts the whole operation.
    pub async fn compose(&self, request: &ComposeRequest) -> Result<ComposeOutcome, LlmError> {
        let max_retries = if request.max_retries == 0 {
            DEFAULT_MAX_RETRIES
        } else {
            request.max_retries
        };
        let budget = token_budget(request.target_words);

        let mut usage = Usage::default();
        let mut content = String::new();

        for attempt in 1..=max_retries {
            if attempt == 1 {
                let reply = self
                    .backend
                    .generate(&GenerationRequest {
                        prompt: main_prompt(request),
                        context: None,
                        max_tokens: Some(budget),
                    })
                    .await?;
                usage.absorb(&reply.usage);
                content = reply.content.trim().to_string();
            } else {
                tracing::debug!(attempt, "text incomplete, requesting continuation");
                let continuation = self.request_continuation(&content, &mut usage).await?;
                if !continuation.is_empty() {
                    let kept = completion::strip_trailing_incomplete(&content);
                    let base = if kept.is_empty() {
                        content.trim().to_string()
                    } else {
                        kept
                    };
                    content = format!("{base} {continuation}");
                }
            }

            if completion::is_complete(&content, &self.policy) {
                break;
            }
        }

        // Local repair is the last line of defense regardless of how the
        // retry loop ended.
        let text = completion::repair(&content, &self.policy);
        Ok(ComposeOutcome { text, usage })
    }

    async fn request_continuation(
        &self,
        content: &str,
        usage: &mut Usage,
    ) -> Result<String, LlmError> {
        let tail = tail_chars(content, COMPLETION_CONTEXT_CHARS);
        let stripped = completion::strip_trailing_incomplete(tail);
        let context_snippet = if stripped.is_empty() {
            tail.to_string()
        } else {
            stripped
        };

        let reply = self
            .backend
            .generate(&GenerationRequest {
                prompt: completion_prompt(&context_snippet),
                context: Some(head_chars(content, 1500).to_string()),
                max_tokens: Some(COMPLETION_MAX_TOKENS),
            })
            .await?;
        usage.absorb(&reply.usage);

        Ok(dedupe_overlap(content, reply.content.trim()))
    }
}

fn main_prompt(request: &ComposeRequest) -> String {
    let prof = profile(request.kind);
    let target = request.target_words;
    let min_words = (target as f64 * 0.8).floor() as u32;
    let max_words = (target as f64 * 1.2).floor() as u32;

    format!(
        "Create a complete, well-structured {label} based on this theme: \"{topic}\"\n\n{template}\n\nCORE REQUIREMENTS:\n1. LENGTH: about {target} words (minimum {min_words}, maximum {max_words})\n2. STRUCTURE: well organized in clear paragraphs, each developing one main idea\n3. MANDATORY CONCLUSION: {conclusion} The text MUST end with a complete, satisfying closing paragraph\n4. COMPLETENESS:\n   - the text MUST always end with a complete, grammatically correct sentence\n   - the final sentence MUST end with appropriate punctuation (period, exclamation mark or question mark)\n   - NEVER stop mid-sentence, mid-thought or on weak punctuation (comma, colon, dash)\n   - the final sentence must make sense and close the thought\n5. COHERENCE: the whole text must be consistent, logical and well connected from start to finish\n\nIMPORTANT: make sure to write ALL of the requested text, including a proper, complete conclusion. Do not stop halfway.",
        label = prof.label,
        topic = request.topic,
        template = prof.template,
        conclusion = prof.conclusion,
    )
}

fn completion_prompt(context_snippet: &str) -> String {
    format!(
        "The following text is incomplete. Write ONLY the missing part, a proper and complete conclusion. Do not rewrite the existing text.\n\nExisting text (final sentences):\n{context_snippet}\n\nComplete the text with a conclusion that:\n1. is logical and consistent with the rest of the text\n2. ends with a complete, grammatically correct sentence\n3. ends with appropriate punctuation (period, exclamation mark or question mark)\n4. gives the reader a sense of closure\n\nWrite ONLY the missing part (the conclusion), without repeating the existing text."
    )
}

/// Removes a naive duplication at the seam: the longest run (up to 5 words)
/// where the continuation starts with the same words the existing text ends
/// with, compared case-insensitively.
fn dedupe_overlap(existing: &str, continuation: &str) -> String {
    let tail: Vec<String> = existing
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let tail = &tail[tail.len().saturating_sub(5)..];
    let words: Vec<&str> = continuation.split_whitespace().collect();

    let mut skip = 0;
    for k in (1..=tail.len().min(words.len())).rev() {
        let offset = tail.len() - k;
        if (0..k).all(|i| words[i].to_lowercase() == tail[offset + i]) {
            skip = k;
            break;
        }
    }

    if skip == 0 {
        continuation.to_string()
    } else {
        words[skip..].join(" ")
    }
}

fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    s.char_indices()
        .nth(count - n)
        .map_or(s, |(i, _)| &s[i..])
}

fn head_chars(s: &str, n: usize) -> &str {
    s.char_indices().nth(n).map_or(s, |(i, _)| &s[..i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Usage;
    use crate::services::completion::{CompletionPolicy, is_complete};
    use crate::services::llm::GenerationReply;
    use std::sync::Mutex;

    struct ScriptedBackend {
        replies: Mutex<Vec<Result<GenerationReply, LlmError>>>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<GenerationReply, LlmError>>) -> Self {
            ScriptedBackend {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl GenerationBackend for ScriptedBackend {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationReply, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            assert!(!replies.is_empty(), "backend called more times than scripted");
            replies.remove(0)
        }
    }

    fn reply(content: &str, input: u64, output: u64) -> GenerationReply {
        GenerationReply {
            content: content.to_string(),
            usage: Usage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: input + output,
                cost: 0.001,
            },
        }
    }

    #[test]
    fn token_budget_is_clamped() {
        assert_eq!(token_budget(500), 2000);
        assert_eq!(token_budget(2500), 3250);
        assert_eq!(token_budget(5000), 4000);
    }

    #[test]
    fn overlap_dedup_skips_repeated_words() {
        let existing = "The fox walked toward the old bridge";
        let continuation = "the old bridge and crossed it without looking back.";
        assert_eq!(
            dedupe_overlap(existing, continuation),
            "and crossed it without looking back."
        );
    }

    #[test]
    fn overlap_dedup_keeps_distinct_continuations() {
        let existing = "The fox walked toward the old bridge";
        let continuation = "Night fell quickly over the valley.";
        assert_eq!(dedupe_overlap(existing, continuation), continuation);
    }

    #[tokio::test]
    async fn truncated_first_reply_triggers_exactly_one_followup() {
        let backend = ScriptedBackend::new(vec![
            Ok(reply(
                "A fox set out across the frozen fields before sunrise. It carried nothing but hunger,",
                100, 200,
            )),
            Ok(reply(
                "and by the time the sun cleared the hills it had found its way home to the den.",
                50, 80,
            )),
        ]);

        let composer = Composer::new(&backend);
        let outcome = composer
            .compose(&ComposeRequest {
                topic: "A fox".to_string(),
                target_words: 500,
                kind: ContentKind::Story,
                max_retries: 2,
            })
            .await
            .unwrap();

        assert_eq!(backend.calls(), 2);
        assert!(is_complete(&outcome.text, &CompletionPolicy::default()));
        assert_eq!(outcome.usage.input_tokens, 150);
        assert_eq!(outcome.usage.output_tokens, 280);
        assert_eq!(outcome.usage.total_tokens, 430);
    }

    #[tokio::test]
    async fn complete_first_reply_needs_no_followup() {
        let backend = ScriptedBackend::new(vec![Ok(reply(
            "A fox set out across the frozen fields before sunrise and came home at dusk.",
            100,
            200,
        ))]);

        let composer = Composer::new(&backend);
        let outcome = composer
            .compose(&ComposeRequest {
                topic: "A fox".to_string(),
                target_words: 500,
                kind: ContentKind::Story,
                max_retries: 2,
            })
            .await
            .unwrap();

        assert_eq!(backend.calls(), 1);
        assert!(outcome.text.ends_with("dusk."));
    }

    #[tokio::test]
    async fn upstream_failure_aborts_immediately() {
        let backend = ScriptedBackend::new(vec![Err(LlmError::Upstream {
            status: 429,
            message: "Rate limit exceeded. Try again later".to_string(),
        })]);

        let composer = Composer::new(&backend);
        let err = composer
            .compose(&ComposeRequest {
                topic: "A fox".to_string(),
                target_words: 500,
                kind: ContentKind::Article,
                max_retries: 2,
            })
            .await
            .unwrap_err();

        assert_eq!(backend.calls(), 1);
        assert!(matches!(err, LlmError::Upstream { status: 429, .. }));
    }

    #[tokio::test]
    async fn follow_up_context_strips_the_dangling_sentence() {
        let backend = ScriptedBackend::new(vec![
            Ok(reply(
                "The expedition reached the ridge after nine days of climbing. The weather finally turned and the",
                10, 10,
            )),
            Ok(reply(
                "summit came into view, and the team knew the hardest part was behind them.",
                10, 10,
            )),
        ]);

        let composer = Composer::new(&backend);
        composer
            .compose(&ComposeRequest {
                topic: "An expedition".to_string(),
                target_words: 800,
                kind: ContentKind::Article,
                max_retries: 2,
            })
            .await
            .unwrap();

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        // The completion-only prompt carries the complete leading sentence
        // but not the dangling fragment.
        assert!(requests[1].prompt.contains("nine days of climbing."));
        assert!(!requests[1].prompt.contains("finally turned and the"));
        assert_eq!(requests[1].max_tokens, Some(1000));
    }
}
