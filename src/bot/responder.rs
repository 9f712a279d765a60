//! Turns conversation history into Gemini payloads and replies into text.

use serde_json::{Value, json};
use tracing::error;

use crate::bot::gemini::{ApiError, GeminiClient};
use crate::bot::storage::Turn;

/// Stored turns included in a request, newest kept.
const CONTEXT_TURNS: usize = 9;

/// Reply used when the API answers without any candidate text.
pub const FALLBACK_REPLY: &str =
    "Oops! Gemini ne kuch nahi bola. Fir se try karo ya thodi der baad aana. 😅";

pub struct Responder {
    prompt: String,
    bot_name: String,
    language: String,
}

impl Responder {
    pub fn new(prompt: String, bot_name: String, language: String) -> Self {
        Self { prompt, bot_name, language }
    }

    /// Assemble the generateContent payload: priming prompt, then up to the
    /// last nine stored turns, then the new user message.
    pub fn build_payload(&self, history: &[Turn], user_message: &str) -> Value {
        let mut contents = Vec::with_capacity(history.len() + 2);
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": self.prompt }]
        }));

        let recent = &history[history.len().saturating_sub(CONTEXT_TURNS)..];
        for turn in recent {
            contents.push(json!({
                "role": turn.role,
                "parts": [{ "text": turn.message }]
            }));
        }

        contents.push(json!({
            "role": "user",
            "parts": [{ "text": user_message }]
        }));

        json!({
            "contents": contents,
            "systemInstruction": {
                "parts": [{
                    "text": format!(
                        "You are {}, a friendly AI chatbot speaking in {}. \
                         Remember conversation history and respond accordingly. \
                         Keep responses casual and fun with emojis.",
                        self.bot_name, self.language
                    )
                }]
            }
        })
    }

    /// Generate a reply for the user. Always returns something sendable;
    /// API failures become user-facing error strings.
    pub async fn generate(
        &self,
        client: &GeminiClient,
        history: &[Turn],
        user_message: &str,
    ) -> String {
        let payload = self.build_payload(history, user_message);

        match client.call(&payload).await {
            Ok(body) => extract_reply(&body).unwrap_or_else(|| FALLBACK_REPLY.to_string()),
            Err(ApiError::Http { status, .. }) => {
                error!("http error calling gemini api: status {status}");
                format!("API error hua (status {status})")
            }
            Err(e) => {
                error!("error calling gemini api: {e}");
                format!("Error hua Gemini API call me: {e}")
            }
        }
    }
}

/// First candidate's first text part, if any.
fn extract_reply(body: &Value) -> Option<String> {
    body.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, message: &str) -> Turn {
        Turn {
            role: role.to_string(),
            message: message.to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn responder() -> Responder {
        Responder::new("priming prompt".into(), "Saathi".into(), "Hinglish".into())
    }

    #[test]
    fn test_payload_shape() {
        let history = vec![turn("user", "namaste"), turn("model", "namaste ji!")];
        let payload = responder().build_payload(&history, "kya haal hai?");

        let contents = payload["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 4);

        // priming prompt first
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "priming prompt");

        // stored turns in order
        assert_eq!(contents[1]["parts"][0]["text"], "namaste");
        assert_eq!(contents[2]["role"], "model");

        // new message last
        assert_eq!(contents[3]["parts"][0]["text"], "kya haal hai?");

        let instruction = payload["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap();
        assert!(instruction.contains("Saathi"));
        assert!(instruction.contains("Hinglish"));
    }

    #[test]
    fn test_payload_keeps_only_last_nine_turns() {
        let history: Vec<Turn> = (0..12).map(|i| turn("user", &format!("msg {i}"))).collect();
        let payload = responder().build_payload(&history, "latest");

        let contents = payload["contents"].as_array().unwrap();
        // prompt + 9 turns + new message
        assert_eq!(contents.len(), 11);
        assert_eq!(contents[1]["parts"][0]["text"], "msg 3");
        assert_eq!(contents[9]["parts"][0]["text"], "msg 11");
    }

    #[test]
    fn test_extract_reply() {
        let body = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello ji" }] }
            }]
        });
        assert_eq!(extract_reply(&body).unwrap(), "hello ji");
    }

    #[test]
    fn test_extract_reply_empty_candidates() {
        assert!(extract_reply(&serde_json::json!({ "candidates": [] })).is_none());
        assert!(extract_reply(&serde_json::json!({})).is_none());
    }
}
