use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::EnvFilter;
use usertag_core::{
    coerce_int, text_color_for, AuthorKey, JsonFileBackend, ScopeMode, ScopeRule, TagEdit,
    TagRecord, TagStore, PALETTE,
};
use usertag_engine::{DeleteConfirmation, SortKey, TableFilter, TagTable};

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListTagsRequest {
    /// "tagged" (default) lists labelled authors only, "all" includes vote-only records
    filter: Option<String>,
    /// One of username, tag, ignore, color, votes (default username)
    sort: Option<String>,
    /// Sort descending instead of ascending
    descending: Option<bool>,
    /// 1-based page number, only meaningful when tagsPerPage is set
    page: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct UsernameRequest {
    /// Author name, case-insensitive
    username: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetTagRequest {
    /// Author name, case-insensitive
    username: String,
    /// Label text. An empty label clears the tag unless ignore is set.
    tag: Option<String>,
    /// Palette color name, e.g. "red" or "none"
    color: Option<String>,
    /// Link shown behind the tag
    link: Option<String>,
    /// Suppress this author's content
    ignore: Option<bool>,
    /// Vote weight. Parsed like a form field: leading integer, else 0.
    votes: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct IgnoreUserRequest {
    /// Author name, case-insensitive
    username: String,
    /// true to ignore (default), false to stop ignoring
    ignore: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteTagRequest {
    /// Author name, case-insensitive
    username: String,
    /// Must be true for the delete to happen
    confirm: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CheckScopeRequest {
    /// everywhere, include or exclude
    mode: String,
    /// Comma-separated subreddit names; "all" matches any subreddit
    places: String,
    /// Current subreddit, omitted on global feeds
    place: Option<String>,
    /// Custom toggle the rule depends on
    toggle: Option<String>,
    /// Names of the toggles that are currently on
    active_toggles: Option<Vec<String>>,
}

// --- Server ---

#[derive(Clone)]
pub struct UserTagServer {
    store: Arc<Mutex<TagStore>>,
    page_size: usize,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl UserTagServer {
    pub fn new(store: TagStore, page_size: usize) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            page_size,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "List stored user tags as a table. Returns {rows: [{username, tag, ignored, color, votes}], sort, descending, page, pages}."
    )]
    fn list_tags(
        &self,
        Parameters(req): Parameters<ListTagsRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.table_json(&req) {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(description = "Get the stored record for one author")]
    fn get_tag(
        &self,
        Parameters(req): Parameters<UsernameRequest>,
    ) -> Result<CallToolResult, McpError> {
        let key = AuthorKey::new(&req.username);
        let store = self.lock();
        match store.get(&key) {
            Some(record) => match describe(&key, record) {
                Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
                Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
            },
            None => Ok(CallToolResult::success(vec![Content::text(format!(
                "No tag stored for {}",
                key
            ))])),
        }
    }

    #[tool(
        description = "Tag an author. Fields left out keep their stored value. An empty tag with ignore unset clears the label, color and link; vote weight is kept."
    )]
    fn set_tag(
        &self,
        Parameters(req): Parameters<SetTagRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.apply_edit(req) {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(
        description = "Ignore or stop ignoring an author. Ignoring an untagged author labels them \"ignored\"."
    )]
    fn ignore_user(
        &self,
        Parameters(req): Parameters<IgnoreUserRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.toggle_ignore(&req.username, req.ignore.unwrap_or(true)) {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }

    #[tool(
        description = "Delete an author's record. Without confirm: true, returns the confirmation prompt and deletes nothing."
    )]
    fn delete_tag(
        &self,
        Parameters(req): Parameters<DeleteTagRequest>,
    ) -> Result<CallToolResult, McpError> {
        let text = self.delete(&req.username, req.confirm.unwrap_or(false));
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(
        description = "Check whether a (mode, places, toggle) scope rule applies on a page. Returns \"applies\" or \"does not apply\"."
    )]
    fn check_scope(
        &self,
        Parameters(req): Parameters<CheckScopeRequest>,
    ) -> Result<CallToolResult, McpError> {
        match scope_verdict(&req) {
            Ok(true) => Ok(CallToolResult::success(vec![Content::text("applies")])),
            Ok(false) => Ok(CallToolResult::success(vec![Content::text("does not apply")])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
        }
    }
}

#[tool_handler]
impl ServerHandler for UserTagServer {
    fn get_info(&self) -> ServerInfo {
        let palette: Vec<&str> = PALETTE.iter().map(|(name, _)| *name).collect();
        let instructions = format!("{}\n\nColors: {}", INSTRUCTIONS, palette.join(", "));
        ServerInfo {
            instructions: Some(instructions.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

impl UserTagServer {
    fn lock(&self) -> MutexGuard<'_, TagStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn table_json(&self, req: &ListTagsRequest) -> Result<String, String> {
        let sort = match req.sort.as_deref() {
            Some(s) => SortKey::from_str(s)?,
            None => SortKey::default(),
        };
        let filter = match req.filter.as_deref() {
            None | Some("tagged") => TableFilter::Tagged,
            Some("all") => TableFilter::All,
            Some(other) => return Err(format!("unknown filter: {}", other)),
        };
        let store = self.lock();
        let mut table = TagTable::new(self.page_size);
        table.set_filter(filter, &store);
        table.set_sort(sort, req.descending.unwrap_or(false), &store);
        if let Some(page) = req.page {
            table.go_to_page(page, &store);
        }
        let (sort, descending) = table.sort();
        serde_json::to_string_pretty(&serde_json::json!({
            "rows": table.rows(),
            "sort": sort.to_string(),
            "descending": descending,
            "page": table.page(),
            "pages": table.page_count(),
        }))
        .map_err(|e| e.to_string())
    }

    fn apply_edit(&self, req: SetTagRequest) -> Result<String, String> {
        let key = author(&req.username)?;
        let mut store = self.lock();
        let current = store.get(&key).cloned().unwrap_or_default();
        let color = req
            .color
            .or(current.color)
            .unwrap_or_else(|| "none".to_string());
        if text_color_for(&color).is_none() {
            return Err(format!("unknown color: {}", color));
        }
        let edit = TagEdit {
            tag: req.tag.or(current.tag).unwrap_or_default(),
            color,
            ignore: req.ignore.unwrap_or(current.ignore),
            link: req.link.or(current.link).unwrap_or_default(),
            votes: req.votes.map_or(current.votes, |v| coerce_int(&v)),
        };
        match store.set_tag(&key, &edit) {
            Some(record) => describe(&key, record),
            None => Ok(format!("Cleared tag for {}", key)),
        }
    }

    fn toggle_ignore(&self, username: &str, ignore: bool) -> Result<String, String> {
        let key = author(username)?;
        let mut store = self.lock();
        match store.ignore_user(key.as_str(), ignore) {
            Some(record) => describe(&key, record),
            None => Ok(format!("Cleared tag for {}", key)),
        }
    }

    fn delete(&self, username: &str, confirm: bool) -> String {
        let confirmation = DeleteConfirmation::new(username);
        if !confirm {
            return format!("{} Call again with confirm: true.", confirmation.message());
        }
        let mut store = self.lock();
        let key = confirmation.author().clone();
        let mut table = TagTable::new(self.page_size);
        match table.confirm_delete(confirmation, &mut store) {
            Some(_) => format!("Deleted tag for {}", key),
            None => format!("No tag stored for {}", key),
        }
    }
}

fn author(username: &str) -> Result<AuthorKey, String> {
    let name = username.trim();
    if name.is_empty() {
        return Err("username must not be empty".to_string());
    }
    Ok(AuthorKey::new(name))
}

fn describe(key: &AuthorKey, record: &TagRecord) -> Result<String, String> {
    serde_json::to_string_pretty(&serde_json::json!({
        "username": key.as_str(),
        "record": record,
    }))
    .map_err(|e| e.to_string())
}

fn scope_verdict(req: &CheckScopeRequest) -> Result<bool, String> {
    let mode = match req.mode.to_ascii_lowercase().as_str() {
        "everywhere" => ScopeMode::Everywhere,
        "include" => ScopeMode::Include,
        "exclude" => ScopeMode::Exclude,
        other => return Err(format!("unknown scope mode: {}", other)),
    };
    let toggles: BTreeSet<String> = req.active_toggles.iter().flatten().cloned().collect();
    let rule = ScopeRule::new(mode, &req.places, req.toggle.as_deref());
    Ok(rule.applies(req.place.as_deref(), &toggles))
}

const INSTRUCTIONS: &str = r#"usertag stores per-author annotations: a label, a color, a link, an ignore flag and a running vote weight.

- Author names are case-insensitive and stored lowercased.
- A record with no label, color, link, ignore flag or vote weight is deleted.
- Ignoring an author without a label gives them the label "ignored".
- delete_tag only deletes when called with confirm: true.
- check_scope evaluates the include/exclude place rules used by stylesheet rows."#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = usertag_core::read_tagger_options();
    let store = TagStore::load(Arc::new(JsonFileBackend::in_data_dir())).await;
    tracing::info!(
        count = store.len(),
        dir = %usertag_core::data_dir().display(),
        "tag store loaded"
    );

    let service = UserTagServer::new(store, options.tags_per_page)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}
