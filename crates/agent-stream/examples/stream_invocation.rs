use std::sync::Arc;

use agent_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    agent_stream::init_observability();

    let token = std::env::var("AGENT_RUNTIME_TOKEN")
        .map_err(|_| StreamError::Config("AGENT_RUNTIME_TOKEN is not set".into()))?;
    let config = Arc::new(StreamConfig::from_env()?);
    let client = StreamClient::http(&config)?;
    let session = StreamSession::new(config);

    let mut stream = client
        .start_stream(
            &session,
            InvokeRequest::new("List three uses for a paperclip.").bearer_token(token),
        )
        .await?;

    while let Some(event) = stream.next_event().await {
        match event {
            StreamEvent::Text { text } => print!("{text}"),
            StreamEvent::ToolUseStart { tool_use_id, name } => {
                eprintln!("\n[tool {name} ({tool_use_id})]");
            }
            StreamEvent::ToolUseDelta { input, .. } => eprintln!("  args: {input}"),
            StreamEvent::Lifecycle { marker, detail } => {
                eprintln!("[{marker}] {}", detail.unwrap_or_default());
            }
        }
    }

    let completion = stream.finish().await?;
    println!("\n-- {} characters", completion.len());
    Ok(())
}
