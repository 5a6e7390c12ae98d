use std::str::FromStr;

use anyhow::bail;
use anyhow::Result;
use flowchat_core::ChatState;
use flowchat_core::Conversation;
use strum::EnumIter;
use strum::IntoEnumIterator;
use strum_macros::Display;
use strum_macros::EnumString;

#[cfg(test)]
#[path = "commands_test.rs"]
mod tests;

const EXCERPT_CHARS: usize = 80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
enum CommandName {
    New,
    List,
    Switch,
    Delete,
    Clear,
    Sources,
    Reasoning,
    Help,
    #[strum(serialize = "quit", serialize = "exit")]
    Quit,
}

impl CommandName {
    fn usage(&self) -> &'static str {
        match self {
            CommandName::New => "/new",
            CommandName::List => "/list",
            CommandName::Switch => "/switch <n>",
            CommandName::Delete => "/delete [n]",
            CommandName::Clear => "/clear",
            CommandName::Sources => "/sources",
            CommandName::Reasoning => "/reasoning",
            CommandName::Help => "/help",
            CommandName::Quit => "/quit",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            CommandName::New => "start a new conversation",
            CommandName::List => "list conversations",
            CommandName::Switch => "make conversation n active",
            CommandName::Delete => "delete conversation n, or the active one",
            CommandName::Clear => "empty the active conversation",
            CommandName::Sources => "show documents cited in the active conversation",
            CommandName::Reasoning => "show the agent reasoning trace",
            CommandName::Help => "show this help",
            CommandName::Quit => "leave",
        }
    }
}

/// A chat line starting with `/`. Conversation numbers are 1-based, as shown
/// by `/list`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlashCommand {
    New,
    List,
    Switch(usize),
    Delete(Option<usize>),
    Clear,
    Sources,
    Reasoning,
    Help,
    Quit,
}

impl SlashCommand {
    pub fn parse(line: &str) -> Result<SlashCommand> {
        let Some(body) = line.trim().strip_prefix('/') else {
            bail!("Commands start with '/'");
        };

        let mut parts = body.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let Ok(name) = CommandName::from_str(&name.to_lowercase()) else {
            bail!("Unknown command '/{name}'. Type /help for the list.");
        };
        let argument = parts.next();
        if parts.next().is_some() {
            bail!("Too many arguments. Usage: {}", name.usage());
        }

        let command = match (name, argument) {
            (CommandName::Switch, Some(raw)) => SlashCommand::Switch(parse_index(raw)?),
            (CommandName::Switch, None) => bail!("Usage: {}", name.usage()),
            (CommandName::Delete, raw) => {
                SlashCommand::Delete(raw.map(parse_index).transpose()?)
            }
            (_, Some(_)) => bail!("Usage: {}", name.usage()),
            (CommandName::New, None) => SlashCommand::New,
            (CommandName::List, None) => SlashCommand::List,
            (CommandName::Clear, None) => SlashCommand::Clear,
            (CommandName::Sources, None) => SlashCommand::Sources,
            (CommandName::Reasoning, None) => SlashCommand::Reasoning,
            (CommandName::Help, None) => SlashCommand::Help,
            (CommandName::Quit, None) => SlashCommand::Quit,
        };

        Ok(command)
    }
}

fn parse_index(raw: &str) -> Result<usize> {
    match raw.parse::<usize>() {
        Ok(index) if index > 0 => Ok(index),
        _ => bail!("'{raw}' is not a conversation number"),
    }
}

pub fn help_text() -> String {
    CommandName::iter()
        .map(|name| format!("  {:<14} {}", name.usage(), name.summary()))
        .collect::<Vec<String>>()
        .join("\n")
}

pub fn format_conversation_list(state: &ChatState) -> String {
    state
        .conversations
        .iter()
        .enumerate()
        .map(|(index, conversation)| {
            let marker = if state.active_id.as_deref() == Some(conversation.id.as_str()) {
                "*"
            } else {
                " "
            };
            format!(
                "{marker} {}. {} ({} messages, updated {})",
                index + 1,
                conversation.title,
                conversation.messages.len(),
                conversation.updated_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect::<Vec<String>>()
        .join("\n")
}

pub fn format_sources(conversation: &Conversation) -> String {
    if conversation.source_documents.is_empty() {
        return "No sources for this conversation.".to_string();
    }

    conversation
        .source_documents
        .iter()
        .enumerate()
        .map(|(index, document)| {
            let mut entry = format!(
                "[{}] {} by {}",
                index + 1,
                document.short_title(),
                document.author()
            );
            if let Some(lines) = document.line_range() {
                entry.push_str(&format!(" ({lines})"));
            }

            let excerpt: String = document.page_content.chars().take(EXCERPT_CHARS).collect();
            let excerpt = excerpt.replace('\n', " ");
            if !excerpt.trim().is_empty() {
                let ellipsis = if document.page_content.chars().count() > EXCERPT_CHARS {
                    "..."
                } else {
                    ""
                };
                entry.push_str(&format!("\n    {}{ellipsis}", excerpt.trim()));
            }
            entry
        })
        .collect::<Vec<String>>()
        .join("\n")
}

pub fn format_reasoning(conversation: &Conversation) -> String {
    if conversation.reasoning_steps.is_empty() {
        return "No reasoning steps recorded.".to_string();
    }

    conversation
        .reasoning_steps
        .iter()
        .map(|step| {
            let mut entry = step.agent_name.clone();
            if !step.messages.is_empty() {
                entry.push_str(&format!(": {}", step.messages.join(" ")));
            }
            if let Some(next) = step.next.as_deref().filter(|next| !next.is_empty()) {
                entry.push_str(&format!(" (next: {next})"));
            }
            entry
        })
        .collect::<Vec<String>>()
        .join("\n")
}
