//! Template engine wrapper.
//!
//! Thin layer over minijinja: loads templates from the template
//! directory, auto-escapes HTML/XML kinds, and exposes two extensions
//! to templates:
//!
//! - the `markdown` filter, converting a markdown string to safe HTML
//! - the `autorefresh()` function, emitting the live-reload client
//!   script in dev mode and nothing in production
//!
//! The markdown pipeline is injectable through [`RendererOptions`],
//! resolved once at construction; there is no runtime override loading
//! and no process-wide mutable engine state.

use crate::core::BuildMode;
use minijinja::{AutoEscape, Environment, path_loader, value::Value};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Markdown-to-HTML conversion strategy.
pub type MarkdownRender = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Renderer-selection options supplied at engine construction.
#[derive(Clone)]
pub struct RendererOptions {
    pub markdown: MarkdownRender,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            markdown: Arc::new(markdown_to_html),
        }
    }
}

/// One configured template environment.
pub struct Engine {
    env: Environment<'static>,
}

impl Engine {
    pub fn new(
        template_dir: &Path,
        mode: BuildMode,
        ws_port: Option<u16>,
        options: RendererOptions,
    ) -> Self {
        let mut env = Environment::new();
        env.set_loader(path_loader(template_dir));

        // Template names look like `index.html.jinja`; escape by the
        // kind suffix, not the trailing `.jinja`.
        env.set_auto_escape_callback(|name| {
            if name.contains(".html") || name.contains(".htm") || name.contains(".xml") {
                AutoEscape::Html
            } else {
                AutoEscape::None
            }
        });

        let markdown = options.markdown.clone();
        env.add_filter("markdown", move |text: String| {
            Value::from_safe_string(markdown(&text))
        });

        let script = match (mode, ws_port) {
            (BuildMode::Development, Some(port)) => autorefresh_script(port),
            _ => String::new(),
        };
        env.add_function("autorefresh", move || {
            Value::from_safe_string(script.clone())
        });

        Self { env }
    }

    /// Render one template by its path relative to the template root.
    pub fn render<S: Serialize>(
        &self,
        template: &str,
        context: S,
    ) -> Result<String, minijinja::Error> {
        self.env.get_template(template)?.render(context)
    }
}

/// Default markdown pipeline (pulldown-cmark, tables + strikethrough).
pub fn markdown_to_html(input: &str) -> String {
    use pulldown_cmark::{Options, Parser, html};

    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(input, options);
    let mut out = String::with_capacity(input.len() * 2);
    html::push_html(&mut out, parser);
    out
}

/// Client script connecting to the reload channel. Matches the wire
/// contract: the server pushes the literal `RELOAD` token; the
/// registration message content is not interpreted server-side.
fn autorefresh_script(ws_port: u16) -> String {
    format!(
        r#"<script>
  var socket = new WebSocket("ws://localhost:{ws_port}");
  socket.onmessage = function (event) {{
    if (event.data === "RELOAD") {{
      location.reload();
    }}
  }};
  socket.onopen = function () {{
    socket.send("REGISTER");
  }};
</script>"#
    )
}
