use std::collections::HashSet;
use std::fmt;

use tracing::trace;

use super::{LangGraphParser, ParseContext, Parser, SseDataParser, StrandsParser};
use crate::errors::StreamError;

/// Ordered, fixed set of parsers tried against every frame.
///
/// Order is insertion order. It carries no meaning because recognition keys
/// are checked to be pairwise disjoint when the registry is built.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserRegistry {
    pub fn builder() -> ParserRegistryBuilder {
        ParserRegistryBuilder::default()
    }

    /// Registry with the built-in formats: Strands-style envelopes,
    /// LangGraph message chunks and `data:`-prefixed SSE records.
    pub fn with_builtin_formats() -> Self {
        Self::from_checked(vec![
            Box::new(StrandsParser),
            Box::new(LangGraphParser),
            Box::new(SseDataParser::default()),
        ])
    }

    /// The bare JSON object formats, without the SSE wrapper.
    pub fn object_formats() -> Self {
        Self::from_checked(vec![Box::new(StrandsParser), Box::new(LangGraphParser)])
    }

    fn from_checked(parsers: Vec<Box<dyn Parser>>) -> Self {
        debug_assert!(check_disjoint(&parsers).is_ok(), "built-in parsers overlap");
        Self { parsers }
    }

    /// Runs every parser over `frame`, threading the accumulated text through
    /// them in order. Blank frames are skipped.
    pub fn dispatch(&self, frame: &str, accumulated: String, cx: &mut ParseContext) -> String {
        if frame.trim().is_empty() {
            return accumulated;
        }
        trace!(frame_len = frame.len(), "dispatching frame");
        self.parsers
            .iter()
            .fold(accumulated, |acc, parser| parser.try_parse(frame, acc, cx))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|parser| parser.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_builtin_formats()
    }
}

impl fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("parsers", &self.names())
            .finish()
    }
}

/// Collects parsers and validates them as a set.
#[derive(Default)]
pub struct ParserRegistryBuilder {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserRegistryBuilder {
    pub fn register(self, parser: impl Parser + 'static) -> Self {
        self.register_boxed(Box::new(parser))
    }

    pub fn register_boxed(mut self, parser: Box<dyn Parser>) -> Self {
        self.parsers.push(parser);
        self
    }

    /// Adds the built-in formats after anything already registered.
    pub fn with_builtin_formats(self) -> Self {
        self.register(StrandsParser)
            .register(LangGraphParser)
            .register(SseDataParser::default())
    }

    /// Builds the registry, rejecting duplicate names and overlapping
    /// recognition keys.
    pub fn build(self) -> Result<ParserRegistry, StreamError> {
        check_disjoint(&self.parsers)?;
        Ok(ParserRegistry {
            parsers: self.parsers,
        })
    }
}

fn check_disjoint(parsers: &[Box<dyn Parser>]) -> Result<(), StreamError> {
    let mut names = HashSet::new();
    for (i, parser) in parsers.iter().enumerate() {
        if !names.insert(parser.name()) {
            return Err(StreamError::Config(format!(
                "duplicate parser registration: {}",
                parser.name()
            )));
        }
        for other in &parsers[..i] {
            if let Some(overlap) = parser.recognition().overlap(&other.recognition()) {
                return Err(StreamError::Config(format!(
                    "parsers {} and {} overlap on {overlap}",
                    other.name(),
                    parser.name()
                )));
            }
        }
    }
    Ok(())
}
