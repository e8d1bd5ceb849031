//! Render server process.
//!
//! Runs as its own OS process, spawned and supervised by the dev
//! orchestrator. It reads its route table once at startup from a
//! snapshot file and never mutates it; when routes or content change,
//! the orchestrator replaces the whole process rather than patching a
//! live one. Binding the HTTP port doubles as the readiness signal the
//! supervisor probes for.

mod engine;
mod response;

pub use engine::{Engine, MarkdownRender, RendererOptions, markdown_to_html};

use crate::config::Config;
use crate::core::BuildMode;
use crate::log;
use crate::route::{Route, RouteTable};
use crate::utils::path::{normalize_url, resolve_static};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_http::{Method, Request, Server};

/// URL prefix under which the static directory is exposed.
pub const STATIC_URL_PREFIX: &str = "/static/";

/// Startup arguments passed down from the supervising process.
pub struct ServeOpts {
    pub routes: PathBuf,
    pub addr: SocketAddr,
    pub ws_port: Option<u16>,
}

struct ServerState {
    routes: FxHashMap<String, Route>,
    engine: Engine,
    static_dir: PathBuf,
}

/// Entry point of the render server process. Blocks until the process
/// is killed; a failure to bind the port is fatal so the supervisor
/// sees a nonzero exit instead of a hung probe.
pub fn serve(config: &Config, opts: &ServeOpts) -> Result<()> {
    let table = RouteTable::from_snapshot(&opts.routes)?;
    let engine = Engine::new(
        &config.template_dir(),
        BuildMode::Development,
        opts.ws_port,
        RendererOptions::default(),
    );

    let state = Arc::new(ServerState {
        routes: index_routes(table),
        engine,
        static_dir: config.static_dir(),
    });

    let server = Server::http(opts.addr)
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {e}", opts.addr))?;
    log!("render"; "{} routes on http://{}", state.routes.len(), opts.addr);

    run_request_loop(server, state);
    Ok(())
}

fn index_routes(table: RouteTable) -> FxHashMap<String, Route> {
    table
        .into_routes()
        .into_iter()
        .map(|route| (route.url_path.clone(), route))
        .collect()
}

fn run_request_loop(server: Server, state: Arc<ServerState>) {
    // Thread pool so one slow render does not block other requests
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .expect("failed to create thread pool");

    for request in server.incoming_requests() {
        let state = Arc::clone(&state);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &state) {
                log!("render"; "request error: {e}");
            }
        });
    }
}

/// Handle a single HTTP request.
fn handle_request(request: Request, state: &ServerState) -> Result<()> {
    if request.method() != &Method::Get {
        return response::respond_method_not_allowed(request);
    }

    let url = normalize_url(request.url());

    if let Some(rest) = url.strip_prefix(STATIC_URL_PREFIX) {
        return match resolve_static(rest, &state.static_dir) {
            Some(path) => response::respond_file(request, &path),
            None => response::respond_not_found(request),
        };
    }

    match state.routes.get(&url) {
        Some(route) => respond_route(request, state, route),
        None => response::respond_not_found(request),
    }
}

fn respond_route(request: Request, state: &ServerState, route: &Route) -> Result<()> {
    match state.engine.render(&route.template, &route.context) {
        Ok(body) => response::respond_html(request, body),
        Err(e) => {
            log!("error"; "render {} ({}): {e:#}", route.url_path, route.template);
            response::respond_render_error(request, &e)
        }
    }
}

/// Build a production export: render every route to a file under the
/// output directory and copy static assets alongside.
pub fn export(config: &Config, table: &RouteTable) -> Result<usize> {
    let engine = Engine::new(
        &config.template_dir(),
        BuildMode::Production,
        None,
        RendererOptions::default(),
    );
    let output_dir = config.output_dir();

    let mut rendered = 0;
    for route in table.routes() {
        let target = output_dir.join(output_rel_path(&route.template));
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = engine
            .render(&route.template, &route.context)
            .with_context(|| format!("Failed to render {}", route.template))?;
        std::fs::write(&target, body)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        rendered += 1;
    }
    Ok(rendered)
}

/// Output path for a rendered template: drop the trailing template
/// suffix, e.g. `blog/hello.html.jinja` writes `blog/hello.html`.
pub fn output_rel_path(template: &str) -> PathBuf {
    let stripped = template
        .strip_suffix(crate::route::TEMPLATE_SUFFIX)
        .unwrap_or(template);
    Path::new(stripped).to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentStore;
    use crate::route::RouteDeriver;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_output_rel_path_strips_template_suffix() {
        assert_eq!(
            output_rel_path("blog/hello.html.jinja"),
            PathBuf::from("blog/hello.html")
        );
        assert_eq!(
            output_rel_path("feed.xml.jinja"),
            PathBuf::from("feed.xml")
        );
    }

    #[test]
    fn test_index_routes_keys_by_url() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.html.jinja"), "").unwrap();
        fs::write(temp.path().join("about.html.jinja"), "").unwrap();

        let store = ContentStore::default();
        let table = RouteDeriver::new(temp.path(), &store, BuildMode::Development)
            .derive()
            .unwrap();
        let index = index_routes(table);

        assert!(index.contains_key("/"));
        assert!(index.contains_key("/about"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_export_writes_rendered_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("templates/blog")).unwrap();
        fs::write(root.join("templates/index.html.jinja"), "home").unwrap();
        fs::write(
            root.join("templates/blog/hello.html.jinja"),
            "{{ autorefresh() }}post",
        )
        .unwrap();
        fs::write(root.join("config.toml"), "").unwrap();

        let config = Config::load(root).unwrap();
        let store = ContentStore::default();
        let table = RouteDeriver::new(&config.template_dir(), &store, BuildMode::Production)
            .derive()
            .unwrap();

        let count = export(&config, &table).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            fs::read_to_string(root.join("output/index.html")).unwrap(),
            "home"
        );
        // autorefresh() renders empty in production
        assert_eq!(
            fs::read_to_string(root.join("output/blog/hello.html")).unwrap(),
            "post"
        );
    }
}
