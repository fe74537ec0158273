//! Chat command: one streamed turn.
//!
//! The turn is not persisted; the process exits once the stream ends.

use std::io::{self, Write};
use std::sync::Arc;

use futures::StreamExt;

use mcpflow_core::{ChunkKind, ConversationItem, ServerConfig, StreamChunk};
use mcpflow_engine::{ChatEngine, EngineSettings, TurnRequest};
use mcpflow_mcp::HttpConnector;
use mcpflow_providers::{GenerationOptions, ResponsesBackend};

use crate::{AppContext, ChatArgs};

pub async fn run(args: ChatArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let backend = ResponsesBackend::from_config(&ctx.config.model)
        .map_err(|e| mcpflow_core::Error::Backend(format!("{:#}", e)))?;
    let settings = EngineSettings::from(&ctx.config);
    let connector = HttpConnector::new(
        settings.session.protocol_version.clone(),
        settings.session.request_timeout,
    );
    let engine = ChatEngine::new(Arc::new(backend), Arc::new(connector)).with_settings(settings);

    let request = build_request(&args, ctx);
    let show_thinking = request.options.show_thinking;
    tracing::debug!(session_id = ?request.session_id, "Chat turn started");
    let mut stream = engine.stream_turn(request);

    let mut stdout = io::stdout();
    let mut failure = None;

    while let Some(chunk) = stream.next().await {
        if args.sse {
            write!(stdout, "{}", chunk.to_sse_frame())?;
        } else {
            render(&chunk, show_thinking, &mut stdout)?;
        }
        stdout.flush()?;

        if chunk.kind == ChunkKind::Error {
            failure = Some(chunk.content);
        }
    }

    match failure {
        Some(message) => Err(mcpflow_core::Error::Backend(message).into()),
        None => Ok(()),
    }
}

fn build_request(args: &ChatArgs, ctx: &AppContext) -> TurnRequest {
    let mut servers = ctx.config.servers.clone();
    servers.extend(args.servers.iter().map(ServerConfig::new));

    let mut options = GenerationOptions::from(&ctx.config.model);
    if let Some(effort) = args.effort {
        options.reasoning_effort = effort;
    }
    if let Some(verbosity) = args.verbosity {
        options.verbosity = verbosity;
    }
    if args.no_thinking {
        options.show_thinking = false;
    }

    let mut conversation = Vec::new();
    if let Some(system) = &args.system {
        conversation.push(ConversationItem::system(system.clone()));
    }
    conversation.push(ConversationItem::user(args.prompt.clone()));

    let mut request = TurnRequest::new(conversation)
        .with_servers(servers)
        .with_options(options);
    if let Some(id) = &args.session_id {
        request = request.with_session_id(id.clone());
    }
    request
}

/// Plain-text rendering: answer on stdout, reasoning on stderr. The error
/// message itself is reported by the caller.
fn render(chunk: &StreamChunk, show_thinking: bool, stdout: &mut impl Write) -> io::Result<()> {
    match chunk.kind {
        ChunkKind::Thinking => {
            if show_thinking {
                eprintln!("» {}", chunk.content);
            }
        }
        ChunkKind::Content => write!(stdout, "{}", chunk.content)?,
        ChunkKind::Done | ChunkKind::Error => writeln!(stdout)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpflow_core::{Config, ReasoningEffort};

    fn args(prompt: &str) -> ChatArgs {
        ChatArgs {
            prompt: prompt.to_string(),
            servers: vec![],
            system: None,
            effort: None,
            verbosity: None,
            no_thinking: false,
            sse: false,
            session_id: None,
        }
    }

    #[test]
    fn test_request_merges_servers_and_overrides() {
        let mut config = Config::default();
        config.servers.push(ServerConfig::new("http://configured/mcp"));
        let ctx = AppContext { config };

        let mut chat = args("hello");
        chat.servers = vec!["http://extra/mcp".to_string()];
        chat.effort = Some(ReasoningEffort::Low);
        chat.no_thinking = true;
        chat.system = Some("be brief".to_string());
        chat.session_id = Some("s-1".to_string());

        let request = build_request(&chat, &ctx);
        let urls: Vec<&str> = request.servers.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["http://configured/mcp", "http://extra/mcp"]);
        assert_eq!(request.options.reasoning_effort, ReasoningEffort::Low);
        assert!(!request.options.show_thinking);
        assert_eq!(
            request.conversation,
            vec![
                ConversationItem::system("be brief"),
                ConversationItem::user("hello"),
            ]
        );
        assert_eq!(request.session_id.as_deref(), Some("s-1"));
    }

    #[test]
    fn test_render_content_and_done() {
        let mut out = Vec::new();
        render(&StreamChunk::content("Hi"), true, &mut out).unwrap();
        render(&StreamChunk::done(), true, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hi\n");
    }
}
