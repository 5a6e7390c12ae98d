use flowchat_types::ReasoningStep;

use super::*;

fn chunk(kind: ChunkKind, content: &str) -> StreamChunk {
    StreamChunk::new(kind).with_message_id("m1").with_content(content)
}

fn render_all(chunks: &[StreamChunk]) -> String {
    let mut renderer = Renderer::new(Palette::plain());
    chunks.iter().map(|chunk| renderer.render(chunk)).collect()
}

#[test]
fn test_streams_only_new_suffix() {
    let output = render_all(&[
        StreamChunk::new(ChunkKind::Start),
        chunk(ChunkKind::Content, "He"),
        chunk(ChunkKind::Content, "Hello"),
        chunk(ChunkKind::Content, "Hello world"),
        chunk(ChunkKind::End, "Hello world"),
        chunk(ChunkKind::End, "").replayed(),
    ]);

    assert_eq!(output, "Hello world\n");
}

#[test]
fn test_end_prints_text_that_never_streamed() {
    let output = render_all(&[chunk(ChunkKind::End, "Your last question was: \"hi\"")]);
    assert_eq!(output, "Your last question was: \"hi\"\n");
}

#[test]
fn test_rewritten_content_starts_a_new_line() {
    let output = render_all(&[
        chunk(ChunkKind::Content, "Draft"),
        chunk(ChunkKind::Content, "Final"),
        chunk(ChunkKind::End, "Final"),
    ]);
    assert_eq!(output, "Draft\nFinal\n");
}

#[test]
fn test_error_is_not_repeated_by_end() {
    let message = "The agent service took too long to respond. Please try again.";
    let output = render_all(&[
        chunk(ChunkKind::Content, "Half"),
        chunk(ChunkKind::Error, message),
        chunk(ChunkKind::End, message),
        chunk(ChunkKind::End, message).replayed(),
    ]);

    assert_eq!(output, format!("Half\n! {message}\n"));
}

#[test]
fn test_side_channel_chunks_get_their_own_lines() {
    let step = serde_json::to_string(&ReasoningStep::new(
        "Researcher",
        vec!["Looking up ownership".to_string()],
    ))
    .unwrap();

    let output = render_all(&[
        chunk(ChunkKind::AgentReasoning, &step),
        chunk(ChunkKind::NextAgent, "Writer"),
        chunk(ChunkKind::Thinking, "Writer is thinking..."),
        chunk(ChunkKind::Content, "Answer"),
        StreamChunk::new(ChunkKind::SourceDocuments).with_content(r#"[{"pageContent":"x","metadata":{},"id":"1"}]"#),
        chunk(ChunkKind::End, "Answer"),
    ]);

    assert_eq!(
        output,
        "· Researcher: Looking up ownership\n→ Writer\nWriter is thinking...\nAnswer\n[1 source cited, /sources to list]\n"
    );
}

#[test]
fn test_coloured_palette_wraps_text() {
    let palette = Palette::new(ThemeMode::Dark, true);
    let painted = palette.error("boom");
    assert_ne!(painted, "boom");
    assert!(painted.contains("boom"));
    assert_eq!(Palette::plain().accent("plain"), "plain");
}
