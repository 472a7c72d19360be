//! `SummaryComposer`: per-step summaries + a selected SharedMemory
//! view -> `{answer, reasoning}` via one LLM call. Falls back to a
//! concatenation of step summaries on JSON-parse failure rather than
//! failing the whole request — the steps already ran successfully.

use crate::domain::StepSummary;
use crate::llm_client::LlmClient;
use crate::memory::SharedMemory;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Summary {
    pub answer: String,
    pub reasoning: String,
}

#[derive(Deserialize)]
struct SummaryReply {
    answer: String,
    reasoning: String,
}

pub struct SummaryComposer<'a> {
    llm: &'a dyn LlmClient,
}

impl<'a> SummaryComposer<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self { llm }
    }

    pub async fn compose(&self, prompt: &str, step_summaries: &[StepSummary], memory: &SharedMemory) -> Summary {
        let rendered_prompt = render_prompt(prompt, step_summaries, memory);
        match self.llm.generate(&rendered_prompt).await {
            Ok(raw) => parse_reply(&raw).unwrap_or_else(|| fallback(step_summaries)),
            Err(_) => fallback(step_summaries),
        }
    }
}

fn render_prompt(prompt: &str, step_summaries: &[StepSummary], memory: &SharedMemory) -> String {
    let steps_text = step_summaries
        .iter()
        .map(|s| format!("- {}: {}", s.title, s.summary))
        .collect::<Vec<_>>()
        .join("\n");
    let memory_text = memory
        .snapshot()
        .into_iter()
        .map(|(id, entry)| format!("- {id}: {}", entry.value))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Original request: {prompt}\n\nStep results:\n{steps_text}\n\nShared values:\n{memory_text}\n\n\
         Respond with JSON matching {{\"answer\": string, \"reasoning\": string}}."
    )
}

fn parse_reply(raw: &str) -> Option<Summary> {
    let json_text = crate::snippet::strip_code_fence(raw);
    let value = crate::schema::validate_summary_reply(json_text.trim()).ok()?;
    let reply: SummaryReply = serde_json::from_value(value).ok()?;
    Some(Summary { answer: reply.answer, reasoning: reply.reasoning })
}

fn fallback(step_summaries: &[StepSummary]) -> Summary {
    let answer = step_summaries.iter().map(|s| s.summary.as_str()).collect::<Vec<_>>().join(" ");
    Summary { answer, reasoning: "summary_fallback".to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubLlmClient;

    #[tokio::test]
    async fn composes_answer_from_well_formed_llm_reply() {
        let llm = StubLlmClient::ok(vec![r#"{"answer":"42","reasoning":"single-step"}"#]);
        let composer = SummaryComposer::new(&llm);
        let summaries = vec![StepSummary { title: "t1".into(), summary: "42".into() }];
        let memory = SharedMemory::new();
        let summary = composer.compose("echo 42", &summaries, &memory).await;
        assert_eq!(summary.answer, "42");
        assert_eq!(summary.reasoning, "single-step");
    }

    #[tokio::test]
    async fn falls_back_to_concatenated_summaries_on_parse_failure() {
        let llm = StubLlmClient::ok(vec!["not valid json"]);
        let composer = SummaryComposer::new(&llm);
        let summaries = vec![
            StepSummary { title: "t1".into(), summary: "wrote 10".into() },
            StepSummary { title: "t2".into(), summary: "wrote 20".into() },
        ];
        let memory = SharedMemory::new();
        let summary = composer.compose("do things", &summaries, &memory).await;
        assert_eq!(summary.answer, "wrote 10 wrote 20");
        assert_eq!(summary.reasoning, "summary_fallback");
    }

    #[tokio::test]
    async fn falls_back_when_llm_call_fails() {
        let llm = StubLlmClient::new(vec![Err("unreachable".to_string())]);
        let composer = SummaryComposer::new(&llm);
        let summaries = vec![StepSummary { title: "t1".into(), summary: "ok".into() }];
        let memory = SharedMemory::new();
        let summary = composer.compose("p", &summaries, &memory).await;
        assert_eq!(summary.reasoning, "summary_fallback");
    }

    #[tokio::test]
    async fn strips_code_fence_before_parsing_reply() {
        let llm = StubLlmClient::ok(vec!["```json\n{\"answer\":\"42\",\"reasoning\":\"r\"}\n```"]);
        let composer = SummaryComposer::new(&llm);
        let summaries = vec![StepSummary { title: "t1".into(), summary: "42".into() }];
        let memory = SharedMemory::new();
        let summary = composer.compose("p", &summaries, &memory).await;
        assert_eq!(summary.answer, "42");
    }
}
