//! `Classifier` over an `LlmProvider`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::classifier::parse::{parse_object, parse_qualify_word};
use crate::classifier::{
    Classifier, END_SESSION_TOOL, IdentityVerdict, QualifyDecision, Reply, ReplyContext,
    ResumeVerdict, Synthesis, ToolRequest, heuristics,
};
use crate::error::LlmError;
use crate::llm::{
    ChatMessage, CompletionRequest, LlmProvider, ToolCompletionRequest, ToolDefinition,
};
use crate::outreach::model::{HistoryEntry, MessageRole, User, UserType};

const REPLY_TEMPERATURE: f32 = 0.7;
const REPLY_MAX_TOKENS: u32 = 800;
const VERDICT_TEMPERATURE: f32 = 0.0;
const VERDICT_MAX_TOKENS: u32 = 600;
const SYNTH_TEMPERATURE: f32 = 0.5;
const SYNTH_MAX_TOKENS: u32 = 600;
/// Document text beyond this many chars is not sent.
const MAX_DOCUMENT_CHARS: usize = 8000;

pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    async fn ask(
        &self,
        system: String,
        user: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request =
            CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
                .with_temperature(temperature)
                .with_max_tokens(max_tokens);
        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }
}

fn end_session_tool() -> ToolDefinition {
    ToolDefinition {
        name: END_SESSION_TOOL.to_string(),
        description: "End the current session. Call once the user's role is clear, a \
                      hiring need has been fully described, profile updates are complete, \
                      or an opportunity conversation has reached a decision."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "new_type": {
                    "type": "string",
                    "enum": ["idol", "candidate", "freelancer", "client", "hr"],
                    "description": "Role to assign to the user"
                },
                "candidates": {
                    "type": "array",
                    "description": "People the user explicitly named for this need",
                    "items": {
                        "type": "object",
                        "properties": {
                            "phone": {"type": "string"},
                            "name": {"type": "string"}
                        },
                        "required": ["phone"]
                    }
                }
            }
        }),
    }
}

fn reply_system_prompt(user: &User) -> String {
    let role = match user.user_type {
        UserType::New => {
            "You are meeting this person for the first time. Find out whether they are \
             looking for a job (candidate), offer freelance work (freelancer), want to hire \
             a freelancer (client), recruit employees (hr), or just want to stay in touch (idol)."
        }
        UserType::Idol => {
            "This person is in your network. Chat helpfully and offer to update their role."
        }
        UserType::Candidate => {
            "This person is a job seeker. Help them keep their profile current. They may \
             share a resume or a LinkedIn profile."
        }
        UserType::Freelancer => {
            "This person is a freelancer. Help them keep their profile current. They may \
             share a portfolio link or a resume."
        }
        UserType::Client | UserType::Hr => {
            "This person wants to hire. Ask until you understand the role, skills, \
             seniority, location and budget, then end the session."
        }
        UserType::Rof | UserType::Roc => {
            "You are presenting an opportunity to this person on someone else's behalf. \
             Answer their questions and learn whether they are interested and suitable. \
             End the session once they clearly accept or decline."
        }
    };
    format!(
        "You are a friendly recruiting assistant on a messaging app. Keep replies short.\n\n\
         {role}\n\nUser name: {}\nCurrent role: {}\n\n\
         When the session goal is met, call the `{END_SESSION_TOOL}` tool.",
        user.display_name(),
        user.user_type
    )
}

fn history_messages(history: &[HistoryEntry]) -> Vec<ChatMessage> {
    history
        .iter()
        .map(|h| match h.role {
            MessageRole::User => ChatMessage::user(&h.text),
            MessageRole::Model => ChatMessage::assistant(&h.text),
        })
        .collect()
}

fn transcript(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|h| {
            let who = match h.role {
                MessageRole::User => "User",
                MessageRole::Model => "Assistant",
            };
            format!("{who}: {}", h.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text used when the model returns nothing usable.
fn synthesis_fallback(task: &Synthesis) -> String {
    match task {
        Synthesis::Opening {
            author,
            opportunity,
            ..
        } => format!(
            "Hi! {author} asked me to reach out about an opportunity:\n\n{opportunity}\n\n\
             Would you be interested?"
        ),
        Synthesis::Notification {
            author,
            opportunity,
            ..
        } => format!("Heads up: {author} is looking for the following and I shared your profile.\n\n{opportunity}"),
        Synthesis::TargetInfo { target, .. } => target.metadata.to_string(),
        Synthesis::UserSummary { history, .. } => transcript(history),
        Synthesis::NeedStatement { history } => history
            .iter()
            .filter(|h| h.role == MessageRole::User)
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        Synthesis::SuccessSummary { need, qualified } => format!(
            "Good news! {} people are a fit for \"{need}\":\n\n{}",
            qualified.len(),
            qualified
                .iter()
                .map(|q| format!("- {q}"))
                .collect::<Vec<_>>()
                .join("\n")
        ),
    }
}

fn synthesis_prompt(task: &Synthesis) -> (String, String) {
    match task {
        Synthesis::Opening {
            author,
            opportunity,
            target,
        } => (
            "Write a short, warm first message introducing an opportunity to someone on \
             behalf of a contact. Ask whether they are interested. Plain text only."
                .to_string(),
            format!(
                "Contact: {author}\nOpportunity: {opportunity}\nRecipient: {}\nRecipient profile: {}",
                target.display_name(),
                target.metadata
            ),
        ),
        Synthesis::Notification {
            author,
            opportunity,
            target,
        } => (
            "Write a short message telling someone that their profile was shared with a \
             contact for an opportunity. No question needed. Plain text only."
                .to_string(),
            format!(
                "Contact: {author}\nOpportunity: {opportunity}\nRecipient: {}",
                target.display_name()
            ),
        ),
        Synthesis::TargetInfo {
            opportunity,
            target,
        } => (
            "Summarize in two sentences why this person could fit the opportunity. Use only \
             facts from the profile."
                .to_string(),
            format!(
                "Opportunity: {opportunity}\nName: {}\nProfile: {}",
                target.display_name(),
                target.metadata
            ),
        ),
        Synthesis::UserSummary {
            opportunity,
            history,
        } => (
            "Summarize in up to three sentences what this person said that is relevant to \
             the opportunity. Use only facts from the conversation."
                .to_string(),
            format!(
                "Opportunity: {opportunity}\n\nConversation:\n{}",
                transcript(history)
            ),
        ),
        Synthesis::NeedStatement { history } => (
            "Condense this hiring conversation into one need statement covering role, \
             skills, seniority, location and budget where stated. Plain text only."
                .to_string(),
            transcript(history),
        ),
        Synthesis::SuccessSummary { need, qualified } => (
            "Tell the requester that suitable people were found and list them briefly. \
             Plain text only."
                .to_string(),
            format!("Need: {need}\n\nPeople:\n{}", qualified.join("\n")),
        ),
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn reply(&self, ctx: &ReplyContext) -> Result<Reply, LlmError> {
        let mut messages = vec![ChatMessage::system(reply_system_prompt(&ctx.user))];
        messages.extend(history_messages(&ctx.history));
        messages.push(ChatMessage::user(&ctx.prompt));

        let request = ToolCompletionRequest::new(messages, vec![end_session_tool()])
            .with_temperature(REPLY_TEMPERATURE)
            .with_max_tokens(REPLY_MAX_TOKENS);
        let response = self.llm.complete_with_tools(request).await?;

        let mut calls = response.tool_calls.into_iter();
        let tool = calls.next().map(|call| ToolRequest {
            name: call.name,
            arguments: call.arguments,
        });
        let extra = calls.count();
        if extra > 0 {
            warn!(extra, "Model requested more than one tool call, keeping the first");
        }

        Ok(Reply {
            text: response.content.unwrap_or_default().trim().to_string(),
            tool,
        })
    }

    async fn match_identity(
        &self,
        claimed: &User,
        subject: &str,
    ) -> Result<IdentityVerdict, LlmError> {
        let system = "You verify whether a link describes the same person as a known \
             contact. Never merge two distinct identities. If anything is ambiguous or \
             conflicting, answer matched=false. Never invent fields that are not in the source.\n\n\
             Respond with ONLY a JSON object:\n\
             {\"matched\": false, \"confidence\": 0.0, \"reasons\": [\"...\"], \"profile\": {}}"
            .to_string();
        let user = format!(
            "Known contact:\nName: {}\nPhone: {}\nProfile: {}\n\nLink: {subject}",
            claimed.name.as_deref().unwrap_or("(unknown)"),
            claimed.phone.as_deref().unwrap_or("(unknown)"),
            claimed.metadata
        );
        let raw = self
            .ask(system, user, VERDICT_TEMPERATURE, VERDICT_MAX_TOKENS)
            .await?;

        match parse_object::<IdentityVerdict>(&raw) {
            Ok(verdict) => {
                debug!(matched = verdict.matched, confidence = verdict.confidence, "Identity verdict");
                Ok(verdict)
            }
            Err(e) => {
                warn!(raw_response = %raw, error = %e, "Failed to parse identity verdict, using heuristic");
                Ok(heuristics::identity_verdict(claimed, subject))
            }
        }
    }

    async fn classify_document(&self, text: &str) -> Result<ResumeVerdict, LlmError> {
        let system = "You decide whether a document is a resume or CV.\n\n\
             Respond with ONLY a JSON object:\n\
             {\"is_resume\": false, \"confidence\": 0.0, \"reasons\": [\"...\"], \
             \"key_fields\": {\"email\": null, \"phone\": null, \"name\": null, \
             \"top_skills\": [], \"years_experience\": null}}"
            .to_string();
        let excerpt: String = text.chars().take(MAX_DOCUMENT_CHARS).collect();
        let raw = self
            .ask(system, excerpt, VERDICT_TEMPERATURE, VERDICT_MAX_TOKENS)
            .await?;

        match parse_object::<ResumeVerdict>(&raw) {
            Ok(verdict) => Ok(verdict),
            Err(e) => {
                warn!(raw_response = %raw, error = %e, "Failed to parse resume verdict, using heuristic");
                Ok(heuristics::resume_verdict(text))
            }
        }
    }

    async fn qualify(
        &self,
        opportunity: &str,
        history: &[HistoryEntry],
    ) -> Result<QualifyDecision, LlmError> {
        let system = "Judge whether the person in this conversation accepted and fits the \
             opportunity. Answer with exactly one word: qualify, fail or neither."
            .to_string();
        let user = format!(
            "Opportunity: {opportunity}\n\nConversation:\n{}",
            transcript(history)
        );
        let raw = self.ask(system, user, VERDICT_TEMPERATURE, 10).await?;

        match parse_qualify_word(&raw) {
            Ok(decision) => Ok(decision),
            Err(e) => {
                warn!(raw_response = %raw, error = %e, "Unclear qualify verdict, scanning text");
                Ok(heuristics::qualify_decision(&raw))
            }
        }
    }

    async fn synthesize(&self, task: Synthesis) -> Result<String, LlmError> {
        let (system, user) = synthesis_prompt(&task);
        let raw = self
            .ask(system, user, SYNTH_TEMPERATURE, SYNTH_MAX_TOKENS)
            .await?;
        let text = raw.trim();
        if text.is_empty() {
            warn!("Empty synthesis output, using template");
            return Ok(synthesis_fallback(&task));
        }
        Ok(text.to_string())
    }

    async fn profile_facts(
        &self,
        profile: &serde_json::Value,
        history: &[HistoryEntry],
    ) -> Result<serde_json::Value, LlmError> {
        let system = "Extract facts about the user from the conversation that are new or \
             changed relative to their current profile. Never invent facts.\n\n\
             Respond with ONLY a JSON object of field names to values. Use {} if nothing is new."
            .to_string();
        let user = format!(
            "Current profile: {profile}\n\nConversation:\n{}",
            transcript(history)
        );
        let raw = self
            .ask(system, user, VERDICT_TEMPERATURE, VERDICT_MAX_TOKENS)
            .await?;

        match parse_object::<serde_json::Value>(&raw) {
            Ok(value @ serde_json::Value::Object(_)) => Ok(value),
            Ok(other) => {
                warn!(raw_response = %other, "Profile facts were not an object, ignoring");
                Ok(serde_json::json!({}))
            }
            Err(e) => {
                warn!(raw_response = %raw, error = %e, "Failed to parse profile facts, ignoring");
                Ok(serde_json::json!({}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionResponse, FinishReason, ToolCall, ToolCompletionResponse};

    /// Mock LLM that returns a fixed response.
    struct MockLlm {
        response: String,
        tool_calls: Vec<ToolCall>,
    }

    impl MockLlm {
        fn text(response: &str) -> Arc<dyn LlmProvider> {
            Arc::new(Self {
                response: response.to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            Ok(ToolCompletionResponse {
                content: Some(self.response.clone()),
                tool_calls: self.tool_calls.clone(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[tokio::test]
    async fn reply_surfaces_first_tool_call() {
        let llm = Arc::new(MockLlm {
            response: "Great, noted!".into(),
            tool_calls: vec![ToolCall {
                id: "t1".into(),
                name: END_SESSION_TOOL.into(),
                arguments: serde_json::json!({"new_type": "candidate"}),
            }],
        });
        let classifier = LlmClassifier::new(llm);
        let reply = classifier
            .reply(&ReplyContext {
                user: User::new("1"),
                prompt: "I'm looking for a job".into(),
                history: vec![],
            })
            .await
            .unwrap();
        assert_eq!(reply.text, "Great, noted!");
        let tool = reply.tool.unwrap();
        assert_eq!(tool.name, END_SESSION_TOOL);
        assert_eq!(tool.arguments["new_type"], "candidate");
    }

    #[tokio::test]
    async fn malformed_resume_verdict_falls_back_to_heuristic() {
        let classifier = LlmClassifier::new(MockLlm::text("Sure! Looks like a document."));
        let verdict = classifier
            .classify_document("Quarterly report. Revenue grew. Skills were discussed.")
            .await
            .unwrap();
        assert!(!verdict.is_resume);
    }

    #[tokio::test]
    async fn identity_verdict_parses_fenced_json() {
        let classifier = LlmClassifier::new(MockLlm::text(
            "```json\n{\"matched\": true, \"confidence\": 0.93, \"reasons\": [\"same name\"], \"profile\": {\"title\": \"Engineer\"}}\n```",
        ));
        let verdict = classifier
            .match_identity(&User::new("1").with_name("Ada Lovelace"), "https://linkedin.com/in/ada")
            .await
            .unwrap();
        assert!(verdict.matched);
        assert_eq!(verdict.profile["title"], "Engineer");
    }

    #[tokio::test]
    async fn unclear_qualify_falls_back_to_scan() {
        let classifier = LlmClassifier::new(MockLlm::text("I would say they failed the bar."));
        let decision = classifier.qualify("Rust role", &[]).await.unwrap();
        assert_eq!(decision, QualifyDecision::Fail);
    }

    #[tokio::test]
    async fn short_negative_qualify_reply_is_a_fail() {
        let classifier = LlmClassifier::new(MockLlm::text("Not qualified."));
        let decision = classifier.qualify("Rust role", &[]).await.unwrap();
        assert_eq!(decision, QualifyDecision::Fail);
    }

    #[tokio::test]
    async fn empty_synthesis_uses_template() {
        let classifier = LlmClassifier::new(MockLlm::text("   "));
        let text = classifier
            .synthesize(Synthesis::Opening {
                author: "Grace".into(),
                opportunity: "Senior backend engineer, remote".into(),
                target: User::new("1"),
            })
            .await
            .unwrap();
        assert!(text.contains("Grace"));
        assert!(text.contains("Senior backend engineer"));
    }

    #[tokio::test]
    async fn non_object_profile_facts_are_ignored() {
        let classifier = LlmClassifier::new(MockLlm::text("[1, 2, 3]"));
        let facts = classifier
            .profile_facts(&serde_json::json!({}), &[])
            .await
            .unwrap();
        assert_eq!(facts, serde_json::json!({}));
    }
}
