//! Structured-output casting.
//!
//! Free-form replies are converted into schema-valid JSON by a secondary
//! model call, retried with the validation error until an attempt passes
//! or the budget runs out.

use crate::error::CastError;
use cadre_provider::{BoxedLanguageModel, GenerateOptions, Message};
use jsonschema::JSONSchema;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Casts text into JSON matching a schema.
pub struct Caster {
    model: BoxedLanguageModel,
    attempts: usize,
}

impl Caster {
    pub fn new(model: BoxedLanguageModel, attempts: usize) -> Self {
        Self {
            model,
            attempts: attempts.max(1),
        }
    }

    /// Cast `text` into a value valid against `schema`.
    pub async fn cast(
        &self,
        text: &str,
        schema: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, CastError> {
        let compiled =
            JSONSchema::compile(schema).map_err(|e| CastError::InvalidSchema(e.to_string()))?;

        let mut last_error: Option<String> = None;
        for attempt in 1..=self.attempts {
            let prompt = cast_prompt(text, schema, last_error.as_deref());
            let options = GenerateOptions {
                abort: Some(cancel.child_token()),
                ..Default::default()
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(CastError::Cancelled),
                result = self.model.generate_object(vec![Message::user(prompt)], schema.clone(), options) => result,
            };

            let error = match result {
                Ok(value) => match validate(&compiled, &value) {
                    Ok(()) => {
                        debug!(attempt, "Cast succeeded");
                        return Ok(value);
                    }
                    Err(e) => e,
                },
                Err(e) => e.to_string(),
            };

            warn!(attempt, error = %error, "Cast attempt failed");
            last_error = Some(error);
        }

        Err(CastError::Exhausted {
            attempts: self.attempts,
            last_error: last_error.unwrap_or_default(),
        })
    }
}

fn validate(compiled: &JSONSchema, value: &Value) -> Result<(), String> {
    let messages: Vec<String> = match compiled.validate(value) {
        Ok(()) => return Ok(()),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect(),
    };
    Err(messages.join("; "))
}

fn cast_prompt(text: &str, schema: &Value, previous_error: Option<&str>) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    let mut prompt = format!(
        "Convert the following text into a JSON value that conforms to the schema.\n\n\
         Schema:\n{schema}\n\nText:\n{text}"
    );
    if let Some(error) = previous_error {
        prompt.push_str(&format!(
            "\n\nYour previous answer was invalid: {error}\nReturn corrected JSON only."
        ));
    }
    prompt
}
