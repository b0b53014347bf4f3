//! A small declarative model of an ffmpeg `-filter_complex` graph.
//!
//! Streams are labeled pads. Applying a filter consumes its input pads and yields
//! fresh output pads, so every intermediate stream is used exactly once. Source
//! pads (`0:v`, `0:a`) may be referenced any number of times.

use std::collections::HashSet;
use std::fmt::{self, Display};

use crate::error::{ComposeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Handle to a pad in a [`FilterGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stream {
    label: String,
    kind: StreamKind,
}

impl Stream {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Value for ffmpeg's `-map` option.
    pub fn map_arg(&self) -> String {
        if self.label.contains(':') {
            // source pads are mapped as plain stream specifiers
            format!("{}:0", self.label)
        } else {
            format!("[{}]", self.label)
        }
    }
}

/// A single filter with its options.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<(Option<String>, String)>,
}

impl Filter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// `key=value` option.
    pub fn arg(mut self, key: &str, value: impl Display) -> Self {
        self.args.push((Some(key.to_string()), value.to_string()));
        self
    }

    /// Positional option.
    pub fn value(mut self, value: impl Display) -> Self {
        self.args.push((None, value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k.as_deref() == Some(key))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            if let Some(key) = key {
                write!(f, "{key}=")?;
            }
            f.write_str(&escape_graph(&escape_option(value)))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    inputs: Vec<String>,
    filter: Filter,
    outputs: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FilterGraph {
    nodes: Vec<Node>,
    sources: HashSet<String>,
    pending: HashSet<String>,
    next_label: usize,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if `stream` is a source pad or an output not yet consumed.
    pub fn contains(&self, stream: &Stream) -> bool {
        self.sources.contains(&stream.label) || self.pending.contains(&stream.label)
    }

    /// Source pad of input file `index`.
    pub fn source(&mut self, index: usize, kind: StreamKind) -> Stream {
        let suffix = match kind {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        };
        let label = format!("{index}:{suffix}");
        self.sources.insert(label.clone());
        Stream { label, kind }
    }

    /// Apply a one-in, one-out filter.
    pub fn apply(&mut self, input: &Stream, filter: Filter) -> Result<Stream> {
        let kind = input.kind;
        let mut out = self.apply_multi(&[input], filter, &[kind])?;
        Ok(out.remove(0))
    }

    /// Apply a filter with any number of inputs and outputs.
    pub fn apply_multi(&mut self, inputs: &[&Stream], filter: Filter, outputs: &[StreamKind]) -> Result<Vec<Stream>> {
        for input in inputs {
            if !self.contains(input) {
                return Err(ComposeError::InvalidStream(input.label.clone()));
            }
        }
        let mut seen = HashSet::new();
        for input in inputs {
            if !seen.insert(&input.label) && !self.sources.contains(&input.label) {
                return Err(ComposeError::InvalidStream(input.label.clone()));
            }
        }
        for input in inputs {
            self.pending.remove(&input.label);
        }

        let streams: Vec<Stream> = outputs
            .iter()
            .map(|&kind| {
                let prefix = match kind {
                    StreamKind::Video => "v",
                    StreamKind::Audio => "a",
                };
                let label = format!("{prefix}{}", self.next_label);
                self.next_label += 1;
                Stream { label, kind }
            })
            .collect();
        for stream in &streams {
            self.pending.insert(stream.label.clone());
        }

        self.nodes.push(Node {
            inputs: inputs.iter().map(|s| s.label.clone()).collect(),
            filter,
            outputs: streams.iter().map(|s| s.label.clone()).collect(),
        });
        Ok(streams)
    }

    /// Duplicate a stream into `n` identical branches.
    pub fn split(&mut self, input: &Stream, n: usize) -> Result<Vec<Stream>> {
        let name = match input.kind {
            StreamKind::Video => "split",
            StreamKind::Audio => "asplit",
        };
        self.apply_multi(&[input], Filter::new(name).value(n), &vec![input.kind; n])
    }

    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.nodes.iter().map(|n| &n.filter)
    }

    /// Graph text for `-filter_complex`.
    pub fn render(&self) -> String {
        self.nodes
            .iter()
            .map(|node| {
                let mut out = String::new();
                for input in &node.inputs {
                    out.push_str(&format!("[{input}]"));
                }
                out.push_str(&node.filter.to_string());
                for output in &node.outputs {
                    out.push_str(&format!("[{output}]"));
                }
                out
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Escaping for a filter option value (first parsing level).
pub fn escape_option(value: &str) -> String {
    escape_chars(value, &['\\', '\'', ':'])
}

/// Escaping for the filtergraph description (second parsing level).
pub fn escape_graph(value: &str) -> String {
    escape_chars(value, &['\\', '\'', '[', ']', ',', ';'])
}

/// Escaping for text handed to `drawtext`, which expands `%{...}` sequences.
pub fn escape_drawtext(text: &str) -> String {
    escape_chars(text, &['\\', '%']).replace('\'', "\u{2019}")
}

fn escape_chars(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Format a timestamp for filter expressions.
pub fn seconds(t: f64) -> String {
    format!("{t:.3}")
}

/// `enable` expression for a closed time interval.
pub fn between(start: f64, end: f64) -> String {
    format!("between(t,{},{})", seconds(start), seconds(end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_linear_chain() {
        let mut graph = FilterGraph::new();
        let v = graph.source(0, StreamKind::Video);
        let v = graph.apply(&v, Filter::new("scale").arg("w", 1080).arg("h", -2)).unwrap();
        let v = graph.apply(&v, Filter::new("setsar").value(1)).unwrap();
        assert_eq!(graph.render(), "[0:v]scale=w=1080:h=-2[v0];[v0]setsar=1[v1]");
        assert_eq!(v.map_arg(), "[v1]");
    }

    #[test]
    fn test_split_outputs_are_distinct_streams() {
        let mut graph = FilterGraph::new();
        let v = graph.source(0, StreamKind::Video);
        let parts = graph.split(&v, 3).unwrap();
        let unique: HashSet<&Stream> = parts.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(unique.iter().all(|s| s.kind() == StreamKind::Video));
    }

    #[test]
    fn test_split_and_overlay() {
        let mut graph = FilterGraph::new();
        let v = graph.source(0, StreamKind::Video);
        let parts = graph.split(&v, 2).unwrap();
        let out = graph
            .apply_multi(
                &[&parts[0], &parts[1]],
                Filter::new("overlay").arg("x", "(W-w)/2").arg("y", "(H-h)/2"),
                &[StreamKind::Video],
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            graph.render(),
            "[0:v]split=2[v0][v1];[v0][v1]overlay=x=(W-w)/2:y=(H-h)/2[v2]"
        );
    }

    #[test]
    fn test_unknown_stream_is_rejected() {
        let mut graph = FilterGraph::new();
        let mut other = FilterGraph::new();
        let foreign = other.source(1, StreamKind::Video);
        let err = graph.apply(&foreign, Filter::new("null")).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidStream(label) if label == "1:v"));
    }

    #[test]
    fn test_stream_cannot_be_consumed_twice() {
        let mut graph = FilterGraph::new();
        let v = graph.source(0, StreamKind::Video);
        let scaled = graph.apply(&v, Filter::new("null")).unwrap();
        graph.apply(&scaled, Filter::new("null")).unwrap();
        assert!(graph.apply(&scaled, Filter::new("null")).is_err());
        // source pads can be reused
        assert!(graph.apply(&v, Filter::new("null")).is_ok());
    }

    #[test]
    fn test_source_map_arg() {
        let mut graph = FilterGraph::new();
        assert_eq!(graph.source(0, StreamKind::Audio).map_arg(), "0:a:0");
    }

    #[test]
    fn test_enable_expression_is_escaped() {
        let filter = Filter::new("drawbox").arg("enable", between(0.5, 2.5));
        assert_eq!(filter.to_string(), "drawbox=enable=between(t\\,0.500\\,2.500)");
    }

    #[test]
    fn test_drawtext_text_escaping() {
        let text = escape_drawtext("50% it's 3:00 \\o/");
        assert_eq!(text, "50\\% it\u{2019}s 3:00 \\\\o/");
        let filter = Filter::new("drawtext").arg("text", &text);
        // colon gets an option-level escape, backslashes are doubled at each level
        assert_eq!(
            filter.to_string(),
            "drawtext=text=50\\\\\\\\% it\u{2019}s 3\\\\:00 \\\\\\\\\\\\\\\\o/"
        );
    }
}
