//! Session title generation.

use cadre_provider::{collect_text, GenerateOptions, Message, ModelResolver};
use cadre_storage::SessionStore;
use std::sync::Arc;
use tracing::debug;

/// Characters of each side of the exchange sent to the title model.
const EXCERPT_CHARS: usize = 500;

const MAX_TITLE_CHARS: usize = 80;

const TITLE_PROMPT: &str = r#"You are a title generator. Generate a short, descriptive title for the conversation.

Guidelines:
- Keep it under 50 characters
- Be specific about the task or topic
- No quotes or special formatting

Output only the title, nothing else."#;

/// Generate a title for a session and store it. Failures are logged.
pub(crate) async fn generate_title(
    resolver: Arc<dyn ModelResolver>,
    store: Arc<dyn SessionStore>,
    model_id: String,
    session_id: String,
    user: String,
    assistant: String,
) {
    if let Err(e) = try_generate(&*resolver, &*store, &model_id, &session_id, &user, &assistant).await {
        debug!(session = %session_id, error = %e, "Title generation failed");
    }
}

async fn try_generate(
    resolver: &dyn ModelResolver,
    store: &dyn SessionStore,
    model_id: &str,
    session_id: &str,
    user: &str,
    assistant: &str,
) -> anyhow::Result<()> {
    let model = resolver.resolve(model_id).await?;
    let prompt = format!(
        "User: {}\n\nAssistant: {}",
        excerpt(user),
        excerpt(assistant)
    );
    let options = GenerateOptions {
        system: Some(TITLE_PROMPT.to_string()),
        max_tokens: Some(64),
        ..Default::default()
    };
    let stream = model.generate(vec![Message::user(prompt)], options).await?;
    let raw = collect_text(stream).await?;

    let Some(title) = clean_title(&raw) else {
        anyhow::bail!("title model returned no text");
    };
    store.update_title(session_id, &title).await?;
    debug!(session = %session_id, title = %title, "Session titled");
    Ok(())
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// First non-empty line, unquoted and capped.
fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let unquoted = line
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    if unquoted.is_empty() {
        return None;
    }
    Some(unquoted.chars().take(MAX_TITLE_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadre_storage::MemorySessionStore;
    use cadre_test_utils::{RecordingProvider, ScriptedResolver};

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("\n  \"Fix login bug\"  \n").as_deref(), Some("Fix login bug"));
        assert_eq!(clean_title("   \n\"\"").as_deref(), None);
        assert_eq!(clean_title(&"x".repeat(200)).unwrap().len(), MAX_TITLE_CHARS);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "é".repeat(600);
        assert_eq!(excerpt(&text).chars().count(), EXCERPT_CHARS);
    }

    #[tokio::test]
    async fn test_generate_title_updates_store() {
        let provider = RecordingProvider::new().with_response("Refactor parser");
        let resolver = Arc::new(ScriptedResolver::new().with_model("test/small", provider.clone()));
        let store = Arc::new(MemorySessionStore::new());
        let session = store.create_session("coder").await.unwrap();

        generate_title(
            resolver,
            store.clone(),
            "test/small".into(),
            session.id.clone(),
            "Please refactor the parser".into(),
            "Done".into(),
        )
        .await;

        let record = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(record.title.as_deref(), Some("Refactor parser"));
        assert!(provider.was_sent("Please refactor the parser"));
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let resolver = Arc::new(ScriptedResolver::new());
        let store = Arc::new(MemorySessionStore::new());
        generate_title(
            resolver,
            store,
            "test/missing".into(),
            "ses_1".into(),
            "u".into(),
            "a".into(),
        )
        .await;
    }
}
