//! System prompt assembly.

use crate::agent::AgentDefinition;
use cadre_provider::Message;

/// Prompt inputs gathered before the first turn of a session.
#[derive(Debug, Default)]
pub struct PromptParts {
    /// Retrieved memories, rendered.
    pub memory_context: Option<String>,
    pub skill_prompt: Option<String>,
    /// Handles the agent may delegate to, with descriptions.
    pub delegates: Vec<(String, Option<String>)>,
}

/// Build the system messages for a new session.
///
/// Order: system prompt (prefixed with memory context), tool prompt,
/// skills prompt, delegation context. Empty parts are skipped.
pub fn system_messages(agent: &AgentDefinition, parts: PromptParts) -> Vec<Message> {
    let mut messages = Vec::new();

    let system = match parts.memory_context {
        Some(context) if !agent.system_prompt.trim().is_empty() => {
            format!("{context}\n{}", agent.system_prompt)
        }
        Some(context) => context,
        None => agent.system_prompt.clone(),
    };
    push_nonempty(&mut messages, system);

    if let Some(tool_prompt) = &agent.tool_prompt {
        push_nonempty(&mut messages, tool_prompt.clone());
    }

    let skills = parts.skill_prompt.or_else(|| agent.skill_prompt.clone());
    if let Some(skills) = skills {
        push_nonempty(&mut messages, skills);
    }

    if let Some(context) = delegation_context(&parts.delegates) {
        messages.push(Message::system(context));
    }

    messages
}

fn push_nonempty(messages: &mut Vec<Message>, text: String) {
    if !text.trim().is_empty() {
        messages.push(Message::system(text));
    }
}

/// Describe the agents reachable through `agent_call`.
pub fn delegation_context(delegates: &[(String, Option<String>)]) -> Option<String> {
    if delegates.is_empty() {
        return None;
    }
    let mut context = String::from(
        "You can delegate self-contained tasks to these agents with the agent_call tool:\n",
    );
    for (handle, description) in delegates {
        match description {
            Some(description) => context.push_str(&format!("- @{handle}: {description}\n")),
            None => context.push_str(&format!("- @{handle}\n")),
        }
    }
    Some(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_memory_prefix() {
        let agent = AgentDefinition::new("coder", "test/m")
            .with_system_prompt("You write code.")
            .with_tool_prompt("Use shell for builds.");
        let messages = system_messages(
            &agent,
            PromptParts {
                memory_context: Some("Relevant memories:\n- tabs\n".into()),
                skill_prompt: Some("Skill: testing".into()),
                delegates: vec![("reviewer".into(), Some("Reviews diffs".into()))],
            },
        );

        let texts: Vec<String> = messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts.len(), 4);
        assert!(texts[0].starts_with("Relevant memories:"));
        assert!(texts[0].ends_with("You write code."));
        assert_eq!(texts[1], "Use shell for builds.");
        assert_eq!(texts[2], "Skill: testing");
        assert!(texts[3].contains("- @reviewer: Reviews diffs"));
    }

    #[test]
    fn test_empty_parts_are_skipped() {
        let agent = AgentDefinition::new("bare", "test/m");
        assert!(system_messages(&agent, PromptParts::default()).is_empty());
    }
}
