//! Replays a captured response body through the built-in parsers.
//!
//! `cargo run --example replay_frames -- capture.txt`

use agent_stream::prelude::*;
use agent_stream::{FrameBuffer, ParseContext, ParserRegistry};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).ok_or("usage: replay_frames <capture file>")?;
    let body = std::fs::read(&path)?;

    let registry = ParserRegistry::with_builtin_formats();
    let diagnostics = CollectedDiagnostics::new();
    let mut cx = ParseContext::new(Some(Arc::new(diagnostics.clone())));
    let mut frames = FrameBuffer::new();
    let mut completion = String::new();

    for chunk in body.chunks(64) {
        for frame in frames.append(chunk) {
            completion = registry.dispatch(&frame, completion, &mut cx);
        }
    }
    if let Some(tail) = frames.finish() {
        completion = registry.dispatch(&tail, completion, &mut cx);
    }

    for event in cx.take_events() {
        println!("{}", serde_json::to_string(&event)?);
    }
    for diagnostic in diagnostics.records() {
        eprintln!("{}: {} ({})", diagnostic.parser, diagnostic.reason, diagnostic.excerpt);
    }
    println!("completion: {completion:?}");
    Ok(())
}
