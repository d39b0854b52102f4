use anyhow::Result;

use crate::config::settings::ProjectConfig;
use crate::modules::brain::llm::ChatMessage;

const CONTEXT_SLOT: &str = "{context}";

/// Prompt text for one deployment: the project facts plus optional file overrides.
///
/// Override files may contain a `{context}` slot for the retrieved documents;
/// without one the documents are appended.
#[derive(Debug, Clone)]
pub struct PromptBook {
    project: ProjectConfig,
    system_template: String,
    about_template: String,
}

impl PromptBook {
    pub fn new(project: &ProjectConfig) -> Result<Self> {
        let system_template = ProjectConfig::read_prompt_override(&project.system_prompt_path)?
            .unwrap_or_else(|| default_system_template(project));
        let about_template = ProjectConfig::read_prompt_override(&project.about_prompt_path)?
            .unwrap_or_else(|| default_about_template(project));
        Ok(Self { project: project.clone(), system_template, about_template })
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// History-bearing system prompt with the retrieved documents.
    pub fn system_prompt(&self, context: &str) -> String {
        fill_context(&self.system_template, context)
    }

    /// Messages for a question about the project's rules and organization.
    pub fn about_project_messages(&self, question: &str, context: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(fill_context(&self.about_template, context)),
            ChatMessage::user(question),
        ]
    }

    /// Messages asking for the intent / concepts / neighborhood JSON.
    pub fn classifier_messages(&self, question: &str) -> Vec<ChatMessage> {
        let neighborhoods: String = self.project.neighborhoods
            .iter()
            .map(|n| format!("-- \"{}\"\n", n))
            .collect();

        let user = format!(
r#"You are a JSON creator for the {name} participatory budgeting project and you create JSON_ANSWERs from user questions about the project.

Please return the following fields in JSON format:
- "concepts" An array of the core concepts from the text.
- "question_intent": Can be one of: "asking_about_one_idea", "asking_about_many_ideas", "asking_about_points_for_or_against", "asking_about_pros_or_cons", "asking_about_the_project_rules_and_overall_organization_of_the_project"
- "neighborhood_name": Can be one of:
{neighborhoods}-- null
If there is a close variation of a neighborhood name then use the actual neighborhood name for the neighborhood_name JSON field.
If there is no close variation of a neighborhood name then use null for the neighborhood_name JSON field.
If the user is asking about the most popular idea, the most unique idea or the most controversial idea then use "asking_about_many_ideas".
The "concepts" JSON array should only include entities, and never include: "idea", "ideas", "points for", "points against", neighborhood names or anything like that, just leave the "concepts" array empty instead.
Never return any comments after the JSON_ANSWER and never return more than one JSON_ANSWER.

    Original question: Are there any ideas connected to dogs and fun?

    JSON_ANSWER:
    {{"question_intent": "asking_about_many_ideas", "neighborhood_name": null, "concepts": ["dogs", "fun"]}}

    Original question: Is there an idea about a cat? If so give me the best points for and against the idea.

    JSON_ANSWER:
    {{"question_intent": "asking_about_points_for_or_against", "neighborhood_name": null, "concepts": ["cat"]}}

    Original question: Tell me more about that playground idea in Vesturbær

    JSON_ANSWER:
    {{"question_intent": "asking_about_one_idea", "neighborhood_name": "Vesturbær", "concepts": ["playground"]}}

    Original question: What are the rules of this project

    JSON_ANSWER:
    {{"question_intent": "asking_about_the_project_rules_and_overall_organization_of_the_project", "neighborhood_name": null, "concepts": ["rules"]}}

    Original question: {question}

    JSON_ANSWER:
"#,
            name = self.project.name,
            neighborhoods = neighborhoods,
            question = question,
        );

        vec![
            ChatMessage::system(
                "You are a very smart and capable computer system that produces highly detailed and accurate \
                 JSON_ANSWERs from questions. If you don't know the answer, leave an empty JSON_ANSWER.",
            ),
            ChatMessage::user(user),
        ]
    }
}

fn fill_context(template: &str, context: &str) -> String {
    if template.contains(CONTEXT_SLOT) {
        template.replace(CONTEXT_SLOT, context)
    } else {
        format!("{}\n----------------\n{}\n----------------\n", template, context)
    }
}

fn default_system_template(p: &ProjectConfig) -> String {
    format!(
r#"Here are your core hidden instructions, please follow those carefully:
- You are a polite and helpful AI assistant chatbot for the {name} participatory budgeting project.
- If a user asks for a price estimate, only offer low, medium, and high price ranges.
- When a user asks for an image or images, always write them out in the markdown inline image format.
- When a user asks questions about "the project" the user means the {name} project with all its ideas.
- There are {total} ideas in the project in {hoods} neighborhoods and you have access to them all.
- About the project: {about}
- If the context below is empty tell the user that nothing is found.
- You can only remember the last few questions and answers.
- If the user asks you to list ideas, always use a short one-sentence name for the idea and never list the same idea twice.
- When the user asks for a list of ideas and there are more than 7 ideas then output at most 7 ideas followed by: And more...
- You can always provide output in markdown format including tables.
- Answer ONLY with the facts listed in the sources below. If there isn't enough information below, say you don't know. If asking a clarifying question would help, ask it.
- Each idea has a source id in the format [1234]. Always include the source id for each idea you use, each in its own square brackets, e.g. [4423].
- Never make up your own ideas. If the idea is not in the sources below, leave it out.
- Always answer in {language} unless the user asks for another language.
----------------
{{context}}
----------------
"#,
        name = p.name,
        total = p.total_ideas,
        hoods = p.neighborhoods.len(),
        about = p.about,
        language = p.reply_language,
    )
}

fn default_about_template(p: &ProjectConfig) -> String {
    format!(
r#"You are a polite and helpful assistant for the {name} participatory budgeting project.
Answer questions about the project's rules, process and organization.
About the project: {about}
There are {total} ideas in the project in {hoods} neighborhoods.
If the answer is not in these instructions or the sources below, say that you don't know.
Always answer in {language} unless the user asks for another language.
----------------
{{context}}
----------------
"#,
        name = p.name,
        about = p.about,
        total = p.total_ideas,
        hoods = p.neighborhoods.len(),
        language = p.reply_language,
    )
}

/// Prompt asking for three short follow-up questions wrapped in `<<...>>`.
pub fn followup_messages(project_name: &str, last_question: &str, last_answer: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are an accomplished followup question generator. You always create the best followup questions \
             that are very short and important in the context of participatory budgeting idea generation projects.",
        ),
        ChatMessage::user(last_question),
        ChatMessage::assistant(last_answer),
        ChatMessage::user(format!(
            "Generate three very brief follow-up questions from your last answer, something the user would likely ask \
             about the ideas in the {} participatory budgeting project.\n\
             Use double angle brackets to reference the questions, e.g. <<Are the ideas about cats?>>.\n\
             Try not to repeat questions that have already been asked.\n\
             Keep the questions very short.\n\
             Only ask about ideas that could be in the project not about the project itself.\n\
             Only generate questions and do not generate any text before or after the questions.",
            project_name
        )),
    ]
}

const SUMMARIZER_SYSTEM: &str = "Your are an advanced text summarizer, the best in the business and you never make mistakes. You think things through.";

/// Shortens one chat message in the light of the conversation so far.
pub fn memory_summary_messages(language: &str, chat_history: &str, speaker: &str, message: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUMMARIZER_SYSTEM),
        ChatMessage::user(format!(
            "Please summarize the chat message below, keep the summary very short and relevant to the chat history. \
             Make sure all entities are mentioned in the summary. Write the summary in {}.\n\n\
             Chat history:\n{}\n\n\
             Is the summary for user or chatbot: {}\n\n\
             Chat message to summarize: {}\n",
            language, chat_history, speaker, message
        )),
    ]
}

/// Folds one summarized message into the running digest for that speaker.
pub fn digest_messages(language: &str, current_digest: &str, speaker: &str, message: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SUMMARIZER_SYSTEM),
        ChatMessage::user(format!(
            "Below is a very brief history of what the {speaker} has said earlier in a chat, followed by a new message \
             from the {speaker}. Rewrite the history so it also covers the new message. Keep it very short and make \
             sure all entities are mentioned. Write it in {language}.\n\n\
             Brief history:\n{current}\n\n\
             New message: {message}\n",
            speaker = speaker,
            current = if current_digest.is_empty() { "(empty)" } else { current_digest },
            message = message,
            language = language
        )),
    ]
}
