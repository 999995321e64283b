use serde::Deserialize;

pub const DEFAULT_PERSONA_PROMPT: &str = "You are replying as me in chats. Reply casually, naturally, and personally as a young, confident, funny guy. Always reply in first person as if you are me. Never mention AI, assistant, or anything robotic. Make replies feel real and authentic, with slang, jokes, emojis, and smooth compliments where relevant. Keep it short, natural, and fitting the flow of conversation. Do not sound like a chatbot or motivational speaker. Do not say 'I'm here for you' or 'let me know what's up'. Always read previous messages carefully and reply naturally to the latest one as if you are continuing the conversation seamlessly.";

const DEFAULT_ENDPOINT: &str = "https://api.dreaded.site/api/chatgpt";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_FALLBACK_REPLY: &str = "😂 Sorry, brain jammed for a sec. Try again!";

/// Behaviour of the responder. Every field except `owner` has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponderConfig {
    /// The only identity allowed to issue commands.
    pub owner: String,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default)]
    pub auto_reply_default: bool,
    #[serde(default = "default_persona_prompt")]
    pub persona_prompt: String,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default)]
    pub acknowledgements: Acknowledgements,
    #[serde(default)]
    pub completion: CompletionConfig,
}

impl ResponderConfig {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            command_prefix: default_command_prefix(),
            auto_reply_default: false,
            persona_prompt: default_persona_prompt(),
            context_window: default_context_window(),
            acknowledgements: Acknowledgements::default(),
            completion: CompletionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Acknowledgements {
    pub activated: String,
    pub deactivated: String,
    pub status_on: String,
    pub status_off: String,
}

impl Default for Acknowledgements {
    fn default() -> Self {
        Self {
            activated: "🔮 The Necromancer AI is awake.".to_owned(),
            deactivated: "💀 The Necromancer AI returns to shadows.".to_owned(),
            status_on: "Auto-reply is on.".to_owned(),
            status_off: "Auto-reply is off.".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub endpoint: String,
    /// Name of the query parameter that carries the composed prompt.
    pub query_param: String,
    pub fallback_reply: String,
    /// Request timeout. `null` removes it, leaving a hung request to hold its
    /// reply task forever.
    pub timeout_secs: Option<u64>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            query_param: "text".to_owned(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_owned(),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }
}

fn default_command_prefix() -> String {
    ".".to_owned()
}

fn default_persona_prompt() -> String {
    DEFAULT_PERSONA_PROMPT.to_owned()
}

const fn default_context_window() -> usize {
    5
}
