//! Stage prompt templates
//!
//! Each builder reads only the request, the retrieved context and the
//! outputs of earlier stages.

use super::stages::{Draft, EditedDraft, Outline, ResearchBrief, ReviewVerdict, StageRules};
use crate::context::Prompt;
use crate::errors::ForgeError;
use crate::rag::RetrievedContext;
use crate::types::GenerationRequest;

const WRITER_SYSTEM: &str = "You are an experienced technical blogger. You write clear, accurate \
articles grounded in the reference material you are given, in the author's established voice.";

fn request_summary(request: &GenerationRequest) -> String {
    let mut summary = format!(
        "Topic: {}\nStyle: {}\nTone: {}",
        request.topic(),
        request.style(),
        request.tone()
    );
    if !request.keywords().is_empty() {
        summary.push_str(&format!("\nKeywords: {}", request.keywords().join(", ")));
    }
    if !request.categories().is_empty() {
        summary.push_str(&format!("\nCategories: {}", request.categories().join(", ")));
    }
    if !request.tags().is_empty() {
        summary.push_str(&format!("\nTags: {}", request.tags().join(", ")));
    }
    summary
}

fn source_list(context: &RetrievedContext) -> String {
    if context.sources.is_empty() {
        return "No reference material was found; rely on general knowledge and leave facts empty.".to_string();
    }
    context
        .sources
        .iter()
        .map(|s| format!("[{}] {}", s.label, s.title))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn research(request: &GenerationRequest, context: &RetrievedContext) -> Prompt {
    let task = format!(
        "{summary}\n\nSources:\n{sources}\n\n\
         Analyse the reference material for an upcoming article on this topic. Respond with one JSON object:\n\
         {{\"themes\": [string], \"facts\": [{{\"statement\": string, \"source\": \"S1\"}}], \
         \"gaps\": [string], \"focus_areas\": [string]}}\n\
         Every fact must name the label of the source it comes from, and every source listed above \
         must be cited by at least one fact.",
        summary = request_summary(request),
        sources = source_list(context),
    );
    Prompt::new(WRITER_SYSTEM, task).with_context(context.blocks.clone())
}

pub fn outline(request: &GenerationRequest, brief: &ResearchBrief, rules: &StageRules) -> Prompt {
    let (min_sections, max_sections) = rules.outline_sections;
    let (min_words, max_words) = rules.word_bounds;
    let facts = brief
        .facts
        .iter()
        .map(|f| format!("- {} [{}]", f.statement, f.source))
        .collect::<Vec<_>>()
        .join("\n");
    let task = format!(
        "{summary}\n\nThemes: {themes}\nFocus areas: {focus}\nGaps to fill: {gaps}\nFacts:\n{facts}\n\n\
         Outline the article in {min_sections} to {max_sections} top-level sections totalling \
         {min_words}-{max_words} words. Respond with one JSON object:\n\
         {{\"headline\": string, \"sections\": [{{\"heading\": string, \"subpoints\": [string], \
         \"target_words\": number}}], \"seo_notes\": [string]}}",
        summary = request_summary(request),
        themes = brief.themes.join(", "),
        focus = brief.focus_areas.join(", "),
        gaps = brief.gaps.join(", "),
        facts = facts,
        min_sections = min_sections,
        max_sections = max_sections,
        min_words = min_words,
        max_words = max_words,
    );
    Prompt::new(WRITER_SYSTEM, task)
}

pub fn write(
    request: &GenerationRequest,
    outline: &Outline,
    context: &RetrievedContext,
    rules: &StageRules,
    density_target: f64,
) -> Prompt {
    let (min_words, max_words) = rules.word_bounds;
    let sections = outline
        .sections
        .iter()
        .map(|s| {
            let mut line = format!("## {} (~{} words)", s.heading, s.target_words);
            for point in &s.subpoints {
                line.push_str(&format!("\n  - {}", point));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");
    let mut task = format!(
        "{summary}\n\nHeadline: {headline}\nOutline:\n{sections}\n\n\
         Write the full article in Markdown. Start with a single '# {headline}' heading, use '##' for \
         sections and '###' for subsections, never skip a level. The article must be between \
         {min_words} and {max_words} words. Do not include frontmatter.",
        summary = request_summary(request),
        headline = outline.headline,
        sections = sections,
        min_words = min_words,
        max_words = max_words,
    );
    if !request.keywords().is_empty() {
        task.push_str(&format!(
            " Use the keywords naturally, at roughly {:.1}% density.",
            density_target * 100.0
        ));
    }
    Prompt::new(WRITER_SYSTEM, task).with_context(context.blocks.clone())
}

pub fn edit(request: &GenerationRequest, draft: &Draft, rules: &StageRules) -> Prompt {
    let (min_words, max_words) = rules.word_bounds;
    let task = format!(
        "{summary}\n\nEdit the draft below for clarity, flow and accuracy. Keep exactly one '#' heading \
         and never skip a heading level. Keep the length between {min_words} and {max_words} words \
         (it is {current} now). Return only the revised Markdown article.\n\n{body}",
        summary = request_summary(request),
        min_words = min_words,
        max_words = max_words,
        current = draft.word_count,
        body = draft.body,
    );
    Prompt::new(WRITER_SYSTEM, task)
}

pub fn seo(request: &GenerationRequest, edited: &EditedDraft, context: &RetrievedContext, rules: &StageRules) -> Prompt {
    let (meta_min, meta_max) = rules.meta_description_chars;
    let (excerpt_min, excerpt_max) = rules.excerpt_chars;
    let related = context
        .sources
        .iter()
        .map(|s| format!("- {} ({})", s.title, s.source_id))
        .collect::<Vec<_>>()
        .join("\n");
    let task = format!(
        "{summary}\n\nRelated posts:\n{related}\n\nArticle:\n{body}\n\n\
         Produce search metadata for the article. Respond with one JSON object:\n\
         {{\"title\": string, \"meta_description\": string, \"slug\": string, \"tags\": [string], \
         \"categories\": [string], \"excerpt\": string, \"internal_links\": [string]}}\n\
         The meta description must be {meta_min}-{meta_max} characters, the excerpt \
         {excerpt_min}-{excerpt_max} characters, and the slug lowercase words joined by hyphens.",
        summary = request_summary(request),
        related = if related.is_empty() { "(none)".to_string() } else { related },
        body = edited.body,
        meta_min = meta_min,
        meta_max = meta_max,
        excerpt_min = excerpt_min,
        excerpt_max = excerpt_max,
    );
    Prompt::new(WRITER_SYSTEM, task)
}

const REVIEWER_SYSTEM: &str = "You are the editor-in-chief of a technical blog. You decide whether an \
article is ready to publish and, when it is not, say exactly what must change.";

pub fn review(request: &GenerationRequest, edited: &EditedDraft, rules: &StageRules) -> Prompt {
    let (min_words, max_words) = rules.word_bounds;
    let task = format!(
        "{summary}\n\nReview the article below for publication. Check the structure (introduction, \
         body sections, conclusion), coherence, technical accuracy, originality and Markdown. It has \
         {current} words; the allowed range is {min_words}-{max_words}.\n\
         Reply with APPROVED or REJECTED on the first line. After REJECTED, list each problem with \
         its location and the concrete fix, most important first.\n\n{body}",
        summary = request_summary(request),
        current = edited.word_count,
        min_words = min_words,
        max_words = max_words,
        body = edited.body,
    );
    Prompt::new(REVIEWER_SYSTEM, task)
}

/// Append an editorial rejection to the edit prompt
pub fn with_review_feedback(mut prompt: Prompt, verdict: &ReviewVerdict) -> Prompt {
    prompt.task.push_str(&format!(
        "\n\nYour previous edit was sent back by the editor-in-chief:\n{}\n\
         Address only these points and keep the structure and word range.",
        verdict.feedback
    ));
    prompt
}

/// Append the reason the previous attempt was rejected
pub fn with_correction(mut prompt: Prompt, error: &ForgeError) -> Prompt {
    let detail = match error {
        ForgeError::Validation { code, detail } => format!("{} ({})", detail, code),
        other => other.to_string(),
    };
    prompt.task.push_str(&format!(
        "\n\nYour previous answer was rejected: {}. Correct this and answer again in the same format.",
        detail
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeoConfig;

    fn request() -> GenerationRequest {
        GenerationRequest::builder("Building Agentic Workflows")
            .keywords(["agents", "workflows"])
            .build()
    }

    #[test]
    fn test_research_prompt_carries_context() {
        let mut context = RetrievedContext::empty(100);
        context.blocks.push("[S1] Agents (May 2024)\ntext".to_string());
        let prompt = research(&request(), &context);
        assert_eq!(prompt.context.len(), 1);
        assert!(prompt.task.contains("Building Agentic Workflows"));
        assert!(prompt.task.contains("Keywords: agents, workflows"));
    }

    #[test]
    fn test_correction_is_appended() {
        let prompt = Prompt::new("s", "task");
        let err = ForgeError::validation("word_count_below_minimum", "412 words, needs 800");
        let corrected = with_correction(prompt, &err);
        assert!(corrected.task.starts_with("task"));
        assert!(corrected.task.contains("412 words, needs 800 (word_count_below_minimum)"));
    }

    #[test]
    fn test_review_prompt_and_feedback() {
        let rules = StageRules::from_parts((800, 2000), &SeoConfig::default());
        let edited = EditedDraft {
            body: "# Agents\n\nbody".to_string(),
            word_count: 900,
        };
        let prompt = review(&request(), &edited, &rules);
        assert!(prompt.task.contains("Reply with APPROVED or REJECTED"));
        assert!(prompt.task.contains("It has 900 words"));
        assert!(prompt.task.ends_with("# Agents\n\nbody"));

        let verdict = ReviewVerdict {
            approved: false,
            feedback: "Add a conclusion".to_string(),
        };
        let revised = with_review_feedback(Prompt::new("s", "Edit the draft below"), &verdict);
        assert!(revised.task.starts_with("Edit the draft below"));
        assert!(revised.task.contains("editor-in-chief:\nAdd a conclusion"));
    }

    #[test]
    fn test_write_prompt_states_bounds() {
        let rules = StageRules::from_parts((800, 2000), &SeoConfig::default());
        let outline = Outline {
            headline: "Agents".to_string(),
            sections: vec![],
            seo_notes: vec![],
        };
        let prompt = write(&request(), &outline, &RetrievedContext::empty(0), &rules, 0.02);
        assert!(prompt.task.contains("between 800 and 2000 words"));
        assert!(prompt.task.contains("2.0% density"));
    }
}
