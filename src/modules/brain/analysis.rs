use std::sync::Arc;
use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::settings::{LlmConfig, RetrievalConfig};
use crate::modules::ideas::structs::SummaryField;
use super::llm::{extract_json, CompletionRequest, LanguageModel};
use super::prompts::PromptBook;

/// Generic words the classifier sometimes returns as concepts.
const STOP_CONCEPTS: &[&str] = &[
    "idea", "ideas", "point for", "points for", "point against", "points against",
    "pro", "pros", "con", "cons", "table",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionIntent {
    AskingAboutOneIdea,
    AskingAboutManyIdeas,
    AskingAboutPointsForOrAgainst,
    AskingAboutProsOrCons,
    #[serde(rename = "asking_about_the_project_rules_and_overall_organization_of_the_project")]
    AskingAboutProjectRules,
    #[serde(other)]
    Unknown,
}

impl QuestionIntent {
    pub fn from_label(label: &str) -> Self {
        serde_json::from_value(Value::String(label.trim().to_string())).unwrap_or(QuestionIntent::Unknown)
    }
}

/// Which stored document to retrieve and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalPlan {
    pub view: SummaryField,
    pub top_k: usize,
}

impl RetrievalPlan {
    pub fn for_intent(intent: QuestionIntent, config: &RetrievalConfig) -> Self {
        match intent {
            QuestionIntent::AskingAboutOneIdea => Self {
                view: SummaryField::FullSummaryWithPoints,
                top_k: config.one_idea_k,
            },
            QuestionIntent::AskingAboutPointsForOrAgainst | QuestionIntent::AskingAboutProsOrCons => Self {
                view: SummaryField::ShortSummaryWithPoints,
                top_k: config.points_k,
            },
            QuestionIntent::AskingAboutManyIdeas
            | QuestionIntent::AskingAboutProjectRules
            | QuestionIntent::Unknown => Self {
                view: SummaryField::ShortSummary,
                top_k: config.many_ideas_k,
            },
        }
    }
}

/// Concepts and neighborhood carried from one turn to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    pub last_concepts: Vec<String>,
    pub last_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionAnalysis {
    pub intent: QuestionIntent,
    pub concepts: Vec<String>,
    pub group_name: Option<String>,
    pub plan: RetrievalPlan,
    /// The classifier reply could not be read and defaults were used.
    pub fell_back: bool,
}

impl QuestionAnalysis {
    /// Text embedded for retrieval: the concepts, or the question when there are none.
    pub fn query_text(&self, question: &str) -> String {
        if self.concepts.is_empty() {
            question.to_string()
        } else {
            self.concepts.join(" ")
        }
    }
}

/// Shortest classifier value accepted as a prefix of a neighborhood name.
const MIN_PREFIX_CHARS: usize = 3;

/// Case-insensitive exact match, then a prefix match in either direction.
/// A prefix shared by several neighborhoods matches none of them.
pub fn normalize_neighborhood(raw: &str, known: &[String]) -> Option<String> {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() || needle == "null" {
        return None;
    }
    if let Some(exact) = known.iter().find(|k| k.to_lowercase() == needle) {
        return Some(exact.clone());
    }

    let long_enough = needle.chars().count() >= MIN_PREFIX_CHARS;
    let mut matches = known.iter().filter(|k| {
        let k = k.to_lowercase();
        (long_enough && k.starts_with(&needle)) || needle.starts_with(&k)
    });
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

fn is_stop_concept(concept: &str) -> bool {
    let c = concept.trim().to_lowercase();
    STOP_CONCEPTS.iter().any(|s| *s == c)
}

/// Turns a raw classifier reply into an analysis, updating the carried context.
pub fn interpret(
    raw_reply: &str,
    ctx: &mut ConversationContext,
    neighborhoods: &[String],
    retrieval: &RetrievalConfig,
) -> QuestionAnalysis {
    let parsed = extract_json(raw_reply).ok().filter(|v| v.get("question_intent").and_then(Value::as_str).is_some());

    let (intent, concepts, group, fell_back) = match parsed {
        Some(v) => {
            let intent = QuestionIntent::from_label(v["question_intent"].as_str().unwrap_or_default());
            let concepts: Vec<String> = v["concepts"]
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_str).map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            let group = v["neighborhood_name"]
                .as_str()
                .and_then(|n| normalize_neighborhood(n, neighborhoods));
            (intent, concepts, group, false)
        }
        None => (QuestionIntent::AskingAboutManyIdeas, Vec::new(), None, true),
    };

    let concepts: Vec<String> = concepts.into_iter().filter(|c| !c.is_empty() && !is_stop_concept(c)).collect();
    let concepts = if concepts.is_empty() {
        ctx.last_concepts.clone()
    } else {
        ctx.last_concepts = concepts.clone();
        concepts
    };

    let group_name = match group {
        Some(g) => {
            ctx.last_group = Some(g.clone());
            Some(g)
        }
        None => ctx.last_group.clone(),
    };

    QuestionAnalysis {
        intent,
        concepts,
        group_name,
        plan: RetrievalPlan::for_intent(intent, retrieval),
        fell_back,
    }
}

/// Classifies questions with the fast model.
pub struct QuestionAnalyzer {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<PromptBook>,
    model: String,
    max_tokens: u32,
    retrieval: RetrievalConfig,
}

impl QuestionAnalyzer {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<PromptBook>, llm_config: &LlmConfig, retrieval: RetrievalConfig) -> Self {
        Self {
            llm,
            prompts,
            model: llm_config.fast_model.clone(),
            max_tokens: llm_config.classifier_max_tokens,
            retrieval,
        }
    }

    /// Transport failures are returned; an unreadable reply falls back to defaults.
    pub async fn analyze(&self, question: &str, ctx: &mut ConversationContext) -> Result<QuestionAnalysis> {
        let request = CompletionRequest::new(&self.model, self.prompts.classifier_messages(question))
            .temperature(0.0)
            .max_tokens(self.max_tokens);

        let reply = self.llm.complete(&request).await.context("question classification failed")?;
        let analysis = interpret(&reply, ctx, &self.prompts.project().neighborhoods, &self.retrieval);

        if analysis.fell_back {
            warn!("⚠️ Unreadable classifier reply, using defaults: {}", reply.trim());
        }
        info!(
            intent = ?analysis.intent,
            concepts = ?analysis.concepts,
            group = ?analysis.group_name,
            top_k = analysis.plan.top_k,
            "🧭 Question analysed"
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::ProjectConfig;
    use crate::modules::brain::testing::ScriptedModel;

    fn hoods() -> Vec<String> {
        ProjectConfig::default().neighborhoods
    }

    #[test]
    fn intent_labels() {
        assert_eq!(QuestionIntent::from_label("asking_about_one_idea"), QuestionIntent::AskingAboutOneIdea);
        assert_eq!(
            QuestionIntent::from_label("asking_about_the_project_rules_and_overall_organization_of_the_project"),
            QuestionIntent::AskingAboutProjectRules
        );
        assert_eq!(QuestionIntent::from_label("asking_about_weather"), QuestionIntent::Unknown);
    }

    #[test]
    fn plans_follow_intent() {
        let cfg = RetrievalConfig::default();
        let plan = |i| RetrievalPlan::for_intent(i, &cfg);
        assert_eq!(plan(QuestionIntent::AskingAboutManyIdeas), RetrievalPlan { view: SummaryField::ShortSummary, top_k: 38 });
        assert_eq!(plan(QuestionIntent::AskingAboutProjectRules).top_k, 38);
        assert_eq!(plan(QuestionIntent::Unknown).view, SummaryField::ShortSummary);
        assert_eq!(plan(QuestionIntent::AskingAboutOneIdea), RetrievalPlan { view: SummaryField::FullSummaryWithPoints, top_k: 8 });
        assert_eq!(plan(QuestionIntent::AskingAboutProsOrCons), RetrievalPlan { view: SummaryField::ShortSummaryWithPoints, top_k: 12 });
        assert_eq!(plan(QuestionIntent::AskingAboutPointsForOrAgainst).top_k, 12);
    }

    #[test]
    fn neighborhood_normalization() {
        let h = hoods();
        assert_eq!(normalize_neighborhood("vesturbær", &h).as_deref(), Some("Vesturbær"));
        assert_eq!(normalize_neighborhood("Grafarvogur", &h).as_deref(), Some("Grafarvogur (og Bryggjuhverfi)"));
        assert_eq!(normalize_neighborhood("Háaleiti", &h).as_deref(), Some("Háaleiti og Bústaðir"));
        assert_eq!(normalize_neighborhood("Akureyri", &h), None);
        assert_eq!(normalize_neighborhood("null", &h), None);
        assert_eq!(normalize_neighborhood("Laugard", &h).as_deref(), Some("Laugardalur"));
        assert_eq!(normalize_neighborhood("Breiðholt efra", &h).as_deref(), Some("Breiðholt"));
        // shared or too-short prefixes are ambiguous
        assert_eq!(normalize_neighborhood("Grafar", &h), None);
        assert_eq!(normalize_neighborhood("V", &h), None);
        assert_eq!(normalize_neighborhood("Há", &h), None);
    }

    #[test]
    fn concepts_and_group_carry_over() {
        let cfg = RetrievalConfig::default();
        let mut ctx = ConversationContext::default();

        let first = interpret(
            r#"{"question_intent":"asking_about_many_ideas","concepts":["dogs","ideas"],"neighborhood_name":"Laugardalur"}"#,
            &mut ctx, &hoods(), &cfg,
        );
        assert_eq!(first.concepts, vec!["dogs"]);
        assert_eq!(first.group_name.as_deref(), Some("Laugardalur"));
        assert!(!first.fell_back);

        let second = interpret(
            "```json\n{\"question_intent\":\"asking_about_pros_or_cons\",\"concepts\":[\"Pros\"],\"neighborhood_name\":null}\n```",
            &mut ctx, &hoods(), &cfg,
        );
        assert_eq!(second.concepts, vec!["dogs"]);
        assert_eq!(second.group_name.as_deref(), Some("Laugardalur"));
        assert_eq!(second.intent, QuestionIntent::AskingAboutProsOrCons);

        let third = interpret(
            r#"{"question_intent":"asking_about_one_idea","concepts":["playground"],"neighborhood_name":"Breiðholt"}"#,
            &mut ctx, &hoods(), &cfg,
        );
        assert_eq!(third.concepts, vec!["playground"]);
        assert_eq!(ctx.last_group.as_deref(), Some("Breiðholt"));
    }

    #[test]
    fn unreadable_reply_falls_back() {
        let cfg = RetrievalConfig::default();
        let mut ctx = ConversationContext {
            last_concepts: vec!["skate park".into()],
            last_group: Some("Miðborg".into()),
        };
        let a = interpret("Sorry, I cannot help with that.", &mut ctx, &hoods(), &cfg);
        assert!(a.fell_back);
        assert_eq!(a.intent, QuestionIntent::AskingAboutManyIdeas);
        assert_eq!(a.concepts, vec!["skate park"]);
        assert_eq!(a.group_name.as_deref(), Some("Miðborg"));
        assert_eq!(a.plan.top_k, 38);
        assert_eq!(a.query_text("whatever"), "skate park");
    }

    #[test]
    fn query_text_uses_question_without_concepts() {
        let cfg = RetrievalConfig::default();
        let mut ctx = ConversationContext::default();
        let a = interpret(r#"{"question_intent":"asking_about_many_ideas","concepts":[]}"#, &mut ctx, &hoods(), &cfg);
        assert_eq!(a.query_text("What are the main themes?"), "What are the main themes?");
    }

    #[tokio::test]
    async fn analyzer_propagates_transport_errors() {
        let model = Arc::new(ScriptedModel::new().fail_when_prompt_contains("JSON_ANSWER"));
        let prompts = Arc::new(PromptBook::new(&ProjectConfig::default()).unwrap());
        let analyzer = QuestionAnalyzer::new(model, prompts, &LlmConfig::default(), RetrievalConfig::default());
        let mut ctx = ConversationContext::default();
        assert!(analyzer.analyze("hundar?", &mut ctx).await.is_err());
    }
}
