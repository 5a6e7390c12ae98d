use flowchat_core::ChunkKind;
use flowchat_core::StreamChunk;
use flowchat_core::ThemeMode;
use flowchat_types::ReasoningStep;
use flowchat_types::SourceDocument;
use yansi::Color;
use yansi::Paint;

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;

/// Terminal colours for one theme. A disabled palette emits plain text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    mode: ThemeMode,
    enabled: bool,
}

impl Palette {
    pub fn new(mode: ThemeMode, enabled: bool) -> Palette {
        Palette { mode, enabled }
    }

    pub fn plain() -> Palette {
        Palette::new(ThemeMode::System, false)
    }

    fn accent_color(&self) -> Color {
        match self.mode {
            ThemeMode::Light => Color::Blue,
            ThemeMode::Dark => Color::Cyan,
            ThemeMode::System => Color::Green,
        }
    }

    pub fn accent(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        Paint::new(text).fg(self.accent_color()).bold().to_string()
    }

    pub fn muted(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        Paint::new(text).dimmed().to_string()
    }

    pub fn thinking(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        Paint::new(text).dimmed().italic().to_string()
    }

    pub fn error(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }
        Paint::new(text).fg(Color::Red).to_string()
    }
}

/// Turns one turn's chunk stream into terminal output. Content chunks carry
/// the whole message so far, so only the unseen suffix is written.
pub struct Renderer {
    palette: Palette,
    printed: String,
    line_open: bool,
    last_error: Option<String>,
}

impl Renderer {
    pub fn new(palette: Palette) -> Renderer {
        Renderer {
            palette,
            printed: String::new(),
            line_open: false,
            last_error: None,
        }
    }

    pub fn render(&mut self, chunk: &StreamChunk) -> String {
        let content = chunk.content.as_deref().unwrap_or_default();
        match chunk.kind {
            ChunkKind::Start => String::new(),
            ChunkKind::Content => self.content(content),
            ChunkKind::End if chunk.replayed => String::new(),
            ChunkKind::End => self.end(content),
            ChunkKind::Error => {
                self.last_error = Some(content.to_string());
                let line = self.palette.error(&format!("! {content}"));
                self.side_line(&line)
            }
            ChunkKind::SourceDocuments => {
                let count = serde_json::from_str::<Vec<SourceDocument>>(content)
                    .map(|documents| documents.len())
                    .unwrap_or_default();
                let noun = if count == 1 { "source" } else { "sources" };
                let line = self
                    .palette
                    .muted(&format!("[{count} {noun} cited, /sources to list]"));
                self.side_line(&line)
            }
            ChunkKind::AgentReasoning => {
                let Ok(step) = serde_json::from_str::<ReasoningStep>(content) else {
                    log::debug!("Unreadable reasoning step chunk: {}", content);
                    return String::new();
                };
                let mut text = format!("· {}", step.agent_name);
                if !step.messages.is_empty() {
                    text.push_str(&format!(": {}", step.messages.join(" ")));
                }
                let line = self.palette.muted(&text);
                self.side_line(&line)
            }
            ChunkKind::NextAgent => {
                let line = self.palette.accent(&format!("→ {content}"));
                self.side_line(&line)
            }
            ChunkKind::Thinking => {
                let line = self.palette.thinking(content);
                self.side_line(&line)
            }
        }
    }

    fn content(&mut self, content: &str) -> String {
        let out = match content.strip_prefix(self.printed.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => format!("\n{content}"),
        };
        self.printed = content.to_string();
        if !out.is_empty() {
            self.line_open = !out.ends_with('\n');
        }
        out
    }

    fn end(&mut self, content: &str) -> String {
        let mut out = String::new();
        let repeats_error = self.last_error.as_deref() == Some(content);
        if !content.is_empty() && !repeats_error && content != self.printed {
            out.push_str(&self.content(content));
        }
        if self.line_open {
            out.push('\n');
        }
        self.printed.clear();
        self.line_open = false;
        out
    }

    fn side_line(&mut self, line: &str) -> String {
        let prefix = if self.line_open { "\n" } else { "" };
        self.line_open = false;
        format!("{prefix}{line}\n")
    }
}
