use serde_json::Value;

/// Builds a readable message from a failed API response body, preferring
/// the `error.message` field OpenAI-compatible gateways return.
pub fn api_error_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error").and_then(|error| {
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| error.as_str().map(str::to_string))
            })
        })
        .unwrap_or_else(|| truncate_chars(body.trim(), 200));
    format!("API request failed: Status {}, {}", status, detail)
}

/// Cuts `text` to at most `max` characters, appending "..." when shortened.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_is_extracted() {
        let body = r#"{"error":{"message":"No auth credentials found","code":401}}"#;
        assert_eq!(
            api_error_message(401, body),
            "API request failed: Status 401, No auth credentials found"
        );
    }

    #[test]
    fn plain_bodies_are_truncated() {
        let body = "x".repeat(500);
        let message = api_error_message(502, &body);
        assert!(message.ends_with("..."));
        assert!(message.len() < 300);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("Xin chào thế giới", 8), "Xin chào...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
