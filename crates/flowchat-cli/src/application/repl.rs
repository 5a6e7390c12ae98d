use std::sync::Arc;

use anyhow::Result;
use flowchat_core::AuthProvider;
use flowchat_core::SessionController;
use flowchat_core::StreamChunk;
use flowchat_core::TurnOutcome;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::commands;
use super::commands::SlashCommand;
use super::render::Palette;
use super::render::Renderer;

#[cfg(test)]
#[path = "repl_test.rs"]
mod tests;

const PROMPT: &str = "you> ";
const ASSISTANT_LABEL: &str = "agent> ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

fn nth_conversation(
    controller: &SessionController,
    number: usize,
) -> Option<flowchat_core::Conversation> {
    let index = number.checked_sub(1)?;
    controller.store().conversations().into_iter().nth(index)
}

/// Line-oriented chat front end over a [`SessionController`].
pub struct ChatApp {
    controller: Arc<SessionController>,
    auth: Arc<dyn AuthProvider>,
    palette: Palette,
}

impl ChatApp {
    pub fn new(
        controller: Arc<SessionController>,
        auth: Arc<dyn AuthProvider>,
        palette: Palette,
    ) -> ChatApp {
        ChatApp {
            controller,
            auth,
            palette,
        }
    }

    pub fn greeting(&self) -> String {
        let identity = match self.auth.identity_label() {
            Some(label) if self.auth.is_logged_in() => format!("Signed in as {label}."),
            _ => "Not signed in.".to_string(),
        };
        let title = self
            .controller
            .store()
            .active_conversation()
            .map(|conversation| conversation.title)
            .unwrap_or_default();

        format!(
            "{}\n{identity} Active conversation: \"{title}\". Type /help for commands.",
            self.palette.accent("flowchat")
        )
    }

    pub async fn run<R, W>(&self, input: R, output: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        output
            .write_all(format!("{}\n", self.greeting()).as_bytes())
            .await?;

        let mut lines = input.lines();
        loop {
            output.write_all(self.palette.accent(PROMPT).as_bytes()).await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                output.write_all(b"\n").await?;
                break;
            };

            if self.handle_line(&line, output).await? == Flow::Quit {
                break;
            }
        }

        output.flush().await?;
        Ok(())
    }

    pub async fn handle_line<W>(&self, line: &str, output: &mut W) -> Result<Flow>
    where
        W: AsyncWrite + Unpin,
    {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue);
        }

        if line.starts_with('/') {
            let (text, flow) = match SlashCommand::parse(line) {
                Ok(command) => match self.execute(command) {
                    Ok(result) => result,
                    Err(err) => (self.palette.error(&format!("! {err}")), Flow::Continue),
                },
                Err(err) => (self.palette.error(&format!("! {err}")), Flow::Continue),
            };
            output.write_all(format!("{text}\n").as_bytes()).await?;
            return Ok(flow);
        }

        output
            .write_all(self.palette.accent(ASSISTANT_LABEL).as_bytes())
            .await?;
        if let Err(err) = self.stream_turn(line, output).await {
            log::warn!("Turn was not sent: {}", err);
            let text = self.palette.error(&format!("! {err}"));
            output.write_all(format!("{text}\n").as_bytes()).await?;
        }
        Ok(Flow::Continue)
    }

    /// Send `text` on the active conversation, writing chunks as they arrive.
    pub async fn stream_turn<W>(&self, text: &str, output: &mut W) -> Result<TurnOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<StreamChunk>();
        let mut renderer = Renderer::new(self.palette);

        let send = self.controller.send_message(text, &chunk_tx);
        tokio::pin!(send);

        let outcome = loop {
            tokio::select! {
                biased;
                Some(chunk) = chunk_rx.recv() => {
                    output.write_all(renderer.render(&chunk).as_bytes()).await?;
                    output.flush().await?;
                }
                outcome = &mut send => break outcome?,
            }
        };

        while let Ok(chunk) = chunk_rx.try_recv() {
            output.write_all(renderer.render(&chunk).as_bytes()).await?;
        }
        output.flush().await?;

        Ok(outcome)
    }

    pub fn execute(&self, command: SlashCommand) -> Result<(String, Flow)> {
        let store = self.controller.store();

        let text = match command {
            SlashCommand::New => {
                store.create_conversation()?;
                "Started a new conversation.".to_string()
            }
            SlashCommand::List => commands::format_conversation_list(&store.get_state()),
            SlashCommand::Switch(number) => {
                let Some(conversation) = nth_conversation(&self.controller, number) else {
                    return Ok((
                        format!("No conversation #{number}. Use /list to see them."),
                        Flow::Continue,
                    ));
                };
                store.set_active(&conversation.id)?;
                format!("Switched to \"{}\".", conversation.title)
            }
            SlashCommand::Delete(number) => {
                let target = match number {
                    Some(number) => nth_conversation(&self.controller, number),
                    None => store.active_conversation(),
                };
                let Some(conversation) = target else {
                    return Ok((
                        "No such conversation. Use /list to see them.".to_string(),
                        Flow::Continue,
                    ));
                };
                if self.controller.is_in_flight(&conversation.id) {
                    return Ok((
                        "That conversation is still answering.".to_string(),
                        Flow::Continue,
                    ));
                }
                store.delete_conversation(&conversation.id)?;
                format!("Deleted \"{}\".", conversation.title)
            }
            SlashCommand::Clear => {
                store.clear_current()?;
                "Cleared the current conversation.".to_string()
            }
            SlashCommand::Sources => store
                .active_conversation()
                .map(|conversation| commands::format_sources(&conversation))
                .unwrap_or_default(),
            SlashCommand::Reasoning => store
                .active_conversation()
                .map(|conversation| commands::format_reasoning(&conversation))
                .unwrap_or_default(),
            SlashCommand::Help => commands::help_text(),
            SlashCommand::Quit => return Ok(("Bye.".to_string(), Flow::Quit)),
        };

        Ok((text, Flow::Continue))
    }
}
