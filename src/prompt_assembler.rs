//! Prompt Assembler (C1): a pure function from `(TriageRequest, mode)` to
//! `(systemPrompt, userPrompt, schema, metadata)`. No I/O beyond the
//! template and schema bodies, which are compiled into the binary and
//! loaded once per process (owned by the orchestrator, borrowed here).

use crate::config::Config;
use crate::models::{CandidateKeyword, PiiEntity, Span, TopicLabel, TriageRequest};
use crate::types::PipelineContext;

const SYSTEM_PROMPT: &str = include_str!("templates/system_prompt.txt");
const USER_PROMPT_TEMPLATE: &str = include_str!("templates/user_prompt.txt");

/// Loaded once at process start; shared by reference across requests.
pub struct PromptTemplates {
    pub system_prompt: &'static str,
    pub user_prompt_template: &'static str,
    pub schema: serde_json::Value,
}

impl PromptTemplates {
    pub fn load(schema: serde_json::Value) -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT,
            user_prompt_template: USER_PROMPT_TEMPLATE,
            schema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssembleMode {
    Normal,
    Shrink,
}

/// Returned alongside the rendered prompts; mirrors `spec.md` §4.1
/// "Metadata returned".
#[derive(Debug, Clone)]
pub struct AssembleMetadata {
    pub truncation_applied: bool,
    pub original_body_len: usize,
    pub final_body_len: usize,
    pub redaction_applied: bool,
    pub pii_kept: usize,
    pub candidate_count: usize,
    pub shrink_mode: bool,
}

#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: serde_json::Value,
    pub metadata: AssembleMetadata,
}

/// Truncate `body` at the last sentence boundary within the first `limit`
/// characters, falling back to the last whitespace if it is not too far
/// back, else a hard cut. All indices are byte offsets on char boundaries.
fn truncate_at_sentence_boundary(body: &str, limit: usize) -> (String, bool) {
    if body.chars().count() <= limit {
        return (body.to_string(), false);
    }

    // Byte offset of the `limit`-th character (exclusive upper bound for the scan window).
    let cutoff = body
        .char_indices()
        .nth(limit)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    let window = &body[..cutoff];

    let mut best_sentence_end: Option<usize> = None;
    let chars: Vec<(usize, char)> = window.char_indices().collect();
    for (idx, (byte_pos, ch)) in chars.iter().enumerate() {
        if matches!(ch, '.' | '!' | '?') {
            let after = chars.get(idx + 1).map(|(_, c)| *c);
            let followed_by_boundary = match after {
                None => true,
                Some(c) => c.is_whitespace(),
            };
            if followed_by_boundary {
                best_sentence_end = Some(byte_pos + ch.len_utf8());
            }
        }
    }

    if let Some(end) = best_sentence_end {
        return (body[..end].to_string(), true);
    }

    let last_space = window
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .last();

    if let Some(space_idx) = last_space {
        if space_idx as f64 >= 0.8 * cutoff as f64 {
            return (body[..space_idx].to_string(), true);
        }
    }

    (window.to_string(), true)
}

/// Drop PII spans past the truncated body, clamp spans straddling the cut.
fn fixup_pii_spans(entities: &[PiiEntity], truncated_len: usize) -> Vec<PiiEntity> {
    entities
        .iter()
        .filter(|e| e.span.start < truncated_len)
        .map(|e| {
            let mut e = e.clone();
            if e.span.end > truncated_len {
                e.span = Span::new(e.span.start, truncated_len);
            }
            e
        })
        .collect()
}

/// Replace each in-bounds PII span with `[REDACTED_<TYPE>]`, walking in
/// reverse start order so earlier offsets remain valid during substitution.
///
/// Shared with the Result & DLQ Store for `redactForStorage` (`spec.md`
/// §6): the assembler calls it on the truncated prompt body, the store
/// calls it on the full persisted body.
pub(crate) fn redact_body(body: &str, entities: &[PiiEntity]) -> String {
    let mut sorted: Vec<&PiiEntity> = entities.iter().collect();
    sorted.sort_by(|a, b| b.span.start.cmp(&a.span.start));

    let mut result = body.to_string();
    for entity in sorted {
        let Span { start, end } = entity.span;
        if end <= result.len() && result.is_char_boundary(start) && result.is_char_boundary(end) {
            let replacement = format!("[REDACTED_{}]", entity.r#type.to_uppercase());
            result.replace_range(start..end, &replacement);
        }
    }
    result
}

fn candidate_line(c: &CandidateKeyword) -> String {
    format!(
        "{} | {} | {} | {} | {}",
        c.candidate_id, c.term, c.lemma, c.count, c.score
    )
}

fn allowed_topics_list() -> String {
    TopicLabel::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Assemble the system and user prompts plus the schema for a request.
/// Pure; deterministic given `(request, mode, config)`.
pub fn assemble(
    request: &TriageRequest,
    mode: AssembleMode,
    config: &Config,
    templates: &PromptTemplates,
) -> AssembledPrompt {
    let shrink_mode = mode == AssembleMode::Shrink;
    let (body_limit, top_n) = config.limits_for(shrink_mode);

    let original_body = &request.email.body_text_canonical;
    let original_body_len = original_body.chars().count();

    let (mut truncated_body, truncation_applied) =
        truncate_at_sentence_boundary(original_body, body_limit);

    let truncated_len = truncated_body.len();
    let kept_entities = fixup_pii_spans(&request.email.pii_entities, truncated_len);

    let redaction_applied = config.redact_for_llm;
    if redaction_applied {
        truncated_body = redact_body(&truncated_body, &kept_entities);
    }

    let mut candidates: Vec<CandidateKeyword> = request
        .candidate_keywords
        .iter()
        .take(top_n)
        .cloned()
        .collect();

    if redaction_applied {
        let redacted_terms: Vec<String> = kept_entities
            .iter()
            .filter_map(|e| {
                let Span { start, end } = e.span;
                if end <= original_body.len()
                    && original_body.is_char_boundary(start)
                    && original_body.is_char_boundary(end)
                {
                    Some(original_body[start..end].to_lowercase())
                } else {
                    None
                }
            })
            .collect();
        candidates.retain(|c| {
            let term = c.term.to_lowercase();
            let lemma = c.lemma.to_lowercase();
            !redacted_terms.iter().any(|r| *r == term || *r == lemma)
        });
    }

    let final_body_len = truncated_body.chars().count();
    let candidate_count = candidates.len();

    let candidates_block = candidates
        .iter()
        .map(candidate_line)
        .collect::<Vec<_>>()
        .join("\n");

    let ctx = PipelineContext::new()
        .insert("dictionary_version", request.dictionary_version.to_string())
        .insert("subject", request.email.subject_canonical.clone())
        .insert("from_addr", request.email.from_addr_redacted.clone())
        .insert("body", truncated_body.clone())
        .insert("allowed_topics", allowed_topics_list())
        .insert("candidates", candidates_block);

    let user_prompt = crate::prompt::render(templates.user_prompt_template, &truncated_body, &ctx);

    AssembledPrompt {
        system_prompt: templates.system_prompt.to_string(),
        user_prompt,
        schema: templates.schema.clone(),
        metadata: AssembleMetadata {
            truncation_applied,
            original_body_len,
            final_body_len,
            redaction_applied,
            pii_kept: kept_entities.len(),
            candidate_count,
            shrink_mode,
        },
    }
}
