use super::base::ChatMessage;

/// Persona name used when none is configured.
pub const DEFAULT_PERSONA: &str = "Emily";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Caller,
    Assistant,
}

/// One entry of the call history. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// System instruction plus append-only history for one call.
#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: String,
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    /// Seed a conversation from the persona name and the call description.
    pub fn new(persona: &str, description: &str) -> Self {
        Self {
            system_prompt: system_prompt(persona, description),
            turns: Vec::new(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Messages for the next request: system, history, then `caller_text`.
    pub fn messages_for(&self, caller_text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.turns.iter().map(|turn| match turn.speaker {
            Speaker::Caller => ChatMessage::user(turn.text.clone()),
            Speaker::Assistant => ChatMessage::assistant(turn.text.clone()),
        }));
        messages.push(ChatMessage::user(caller_text));
        messages
    }

    /// Append a completed exchange. An empty reply records only the caller.
    pub fn record_turn(&mut self, caller_text: impl Into<String>, reply: impl Into<String>) {
        self.turns.push(ConversationTurn {
            speaker: Speaker::Caller,
            text: caller_text.into(),
        });

        let reply = reply.into();
        let reply = reply.trim_end();
        if !reply.is_empty() {
            self.turns.push(ConversationTurn {
                speaker: Speaker::Assistant,
                text: reply.to_string(),
            });
        }
    }
}

fn system_prompt(persona: &str, description: &str) -> String {
    let description = description.trim().trim_end_matches('.');
    format!(
        "Your name is {persona}. You are an assistant who calls on behalf of a client. \
         You do not reveal your client's information. All the responses should be small \
         like you are taking on a call. Do not put much information at once, give it one \
         piece at a time. You may use \"Mm-hmm\" or \"hmm\" to respond.\n\n\
         Now {description}.\n\n\
         Do not respond to human expressions like ahh, umm."
    )
}
