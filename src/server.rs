use std::fmt;
use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{schemars, tool, tool_handler, tool_router, RoleServer, ServerHandler};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::CommentPolicy;
use crate::credentials::{CallContext, CredentialResolver};
use crate::error::GatewayError;
use crate::ops::issues::{self, IssueChanges, NewIssue};
use crate::ops::pulls::{self, NewPullRequest};
use crate::ops::repos::{self, NewRepo, RepoChanges, DEFAULT_README};
use crate::outcome::OperationResult;
use crate::transport::{Gateway, Session};

#[derive(Clone)]
pub struct McpGithubServer {
    gateway: Arc<Gateway>,
    resolver: Arc<CredentialResolver>,
    comment_policy: CommentPolicy,
    tool_router: ToolRouter<Self>,
}

// -- Tool parameter types --

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateRepoParams {
    #[schemars(description = "Repository name")]
    pub name: String,

    #[schemars(description = "Repository description (a placeholder is generated when empty)")]
    #[serde(default)]
    pub description: Option<String>,

    #[schemars(description = "Create the repository as private (default: false)")]
    #[serde(default)]
    pub private: Option<bool>,

    #[schemars(description = "Seed a README.md after creating the repository (default: true)")]
    #[serde(default)]
    pub create_readme: Option<bool>,

    #[schemars(description = "Markdown content of the seeded README")]
    #[serde(default)]
    pub readme_content: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateRepoParams {
    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "New repository name")]
    #[serde(default)]
    pub name: Option<String>,

    #[schemars(description = "New repository description")]
    #[serde(default)]
    pub description: Option<String>,

    #[schemars(description = "Change repository visibility")]
    #[serde(default)]
    pub private: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RepoParams {
    #[schemars(description = "Repository name")]
    pub repo: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListIssuesParams {
    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Filter by state: open, closed, or all (other values mean no filter)")]
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateIssueParams {
    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue title")]
    pub title: String,

    #[schemars(description = "Issue body")]
    #[serde(default)]
    pub body: Option<String>,

    #[schemars(description = "Comma-separated label names")]
    #[serde(default)]
    pub labels: Option<String>,

    #[schemars(description = "Comma-separated GitHub usernames to assign")]
    #[serde(default)]
    pub assignees: Option<String>,
}

/// Issue numbers arrive either as JSON numbers or as strings.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum IssueNumberArg {
    Number(u64),
    Text(String),
}

impl fmt::Display for IssueNumberArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueNumberArg::Number(n) => write!(f, "{}", n),
            IssueNumberArg::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateIssueParams {
    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Issue number")]
    pub issue: IssueNumberArg,

    #[schemars(description = "New title")]
    #[serde(default)]
    pub title: Option<String>,

    #[schemars(description = "New body")]
    #[serde(default)]
    pub body: Option<String>,

    #[schemars(description = "New state: open or closed")]
    #[serde(default)]
    pub state: Option<String>,

    #[schemars(description = "Comma-separated label names (replaces existing labels)")]
    #[serde(default)]
    pub labels: Option<String>,

    #[schemars(description = "Comma-separated GitHub usernames (replaces existing assignees)")]
    #[serde(default)]
    pub assignees: Option<String>,

    #[schemars(description = "Comment to append to the issue")]
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct OpenPullParams {
    #[schemars(description = "Repository name")]
    pub repo: String,

    #[schemars(description = "Pull request title")]
    pub title: String,

    #[schemars(description = "Branch containing the changes")]
    pub head: String,

    #[schemars(description = "Branch to merge into")]
    pub base: String,

    #[schemars(description = "Pull request description")]
    #[serde(default)]
    pub body: Option<String>,
}

/// Empty strings count as "not given".
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Split a comma-separated argument, dropping blank entries. Returns `None`
/// when nothing is left.
fn split_csv(value: Option<&str>) -> Option<Vec<String>> {
    let items: Vec<String> = value?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn respond(tool: &str, result: OperationResult<Value>) -> CallToolResult {
    let text = serde_json::to_string_pretty(&result.to_json()).unwrap_or_else(|_| "{}".to_string());
    match &result {
        OperationResult::Success(_) => {
            tracing::info!(tool, "Tool call succeeded");
            CallToolResult::success(vec![Content::text(text)])
        }
        OperationResult::PartialSuccess { failures, .. } => {
            tracing::warn!(tool, failed_steps = failures.len(), "Tool call partially succeeded");
            CallToolResult::success(vec![Content::text(text)])
        }
        OperationResult::Failure(e) => {
            tracing::warn!(tool, category = %e.category(), "Tool call failed");
            CallToolResult::error(vec![Content::text(text)])
        }
    }
}

/// Run a tool body on its own task so a panic is reported as an error
/// object instead of tearing down the connection.
async fn guarded<F>(tool: &'static str, body: F) -> OperationResult<Value>
where
    F: Future<Output = OperationResult<Value>> + Send + 'static,
{
    match tokio::spawn(body).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(tool, error = %e, "Tool call aborted");
            GatewayError::Unexpected(format!("{} aborted: {}", tool, e)).into()
        }
    }
}

impl McpGithubServer {
    pub fn new(gateway: Gateway, resolver: CredentialResolver, comment_policy: CommentPolicy) -> Self {
        Self {
            gateway: Arc::new(gateway),
            resolver: Arc::new(resolver),
            comment_policy,
            tool_router: Self::tool_router(),
        }
    }

    /// Resolve this call's identity and open its HTTP session.
    fn open_session(&self, ctx: &CallContext) -> Result<Session, GatewayError> {
        let identity = self.resolver.resolve(ctx)?;
        self.gateway.session(&identity)
    }

    async fn run_create_repo(&self, ctx: &CallContext, params: CreateRepoParams) -> OperationResult<Value> {
        let session = match self.open_session(ctx) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };
        let repo = NewRepo {
            name: params.name,
            description: non_empty(params.description),
            private: params.private.unwrap_or(false),
        };
        let readme = if params.create_readme.unwrap_or(true) {
            Some(params.readme_content.unwrap_or_else(|| DEFAULT_README.to_string()))
        } else {
            None
        };
        repos::create_with_readme(&session, &repo, readme.as_deref()).await
    }

    async fn run_update_repo(&self, ctx: &CallContext, params: UpdateRepoParams) -> OperationResult<Value> {
        let changes = RepoChanges {
            name: non_empty(params.name),
            description: non_empty(params.description),
            private: params.private,
        };
        if changes.is_empty() {
            return GatewayError::NoFieldsToUpdate.into();
        }
        let session = match self.open_session(ctx) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };
        repos::update(&session, &params.repo, &changes)
            .await
            .map(|out| json!({ "repo": params.repo, "result": out }))
            .into()
    }

    async fn run_delete_repo(&self, ctx: &CallContext, params: RepoParams) -> OperationResult<Value> {
        let session = match self.open_session(ctx) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };
        repos::delete(&session, &params.repo)
            .await
            .map(|out| json!({ "repo": params.repo, "result": out }))
            .into()
    }

    async fn run_list_issues(&self, ctx: &CallContext, params: ListIssuesParams) -> OperationResult<Value> {
        let session = match self.open_session(ctx) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };
        issues::list(&session, &params.repo, params.state.as_deref())
            .await
            .map(|items| json!({ "count": items.len(), "items": items }))
            .into()
    }

    async fn run_create_issue(&self, ctx: &CallContext, params: CreateIssueParams) -> OperationResult<Value> {
        let session = match self.open_session(ctx) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };
        let issue = NewIssue {
            title: params.title,
            body: params.body.unwrap_or_default(),
            labels: split_csv(params.labels.as_deref()).unwrap_or_default(),
            assignees: split_csv(params.assignees.as_deref()).unwrap_or_default(),
        };
        issues::create(&session, &params.repo, &issue)
            .await
            .map(|item| json!({ "item": item }))
            .into()
    }

    async fn run_update_issue(&self, ctx: &CallContext, params: UpdateIssueParams) -> OperationResult<Value> {
        let issue = params.issue.to_string();
        if let Err(e) = issues::parse_issue_number(&issue) {
            return e.into();
        }
        let session = match self.open_session(ctx) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };
        let changes = IssueChanges {
            title: non_empty(params.title),
            body: non_empty(params.body),
            state: non_empty(params.state),
            labels: split_csv(params.labels.as_deref()),
            assignees: split_csv(params.assignees.as_deref()),
        };
        let comment = non_empty(params.comment);
        issues::update(
            &session,
            &params.repo,
            &issue,
            &changes,
            comment.as_deref(),
            self.comment_policy,
        )
        .await
        .map(|out| json!({ "result": out }))
    }

    async fn run_open_pull(&self, ctx: &CallContext, params: OpenPullParams) -> OperationResult<Value> {
        let session = match self.open_session(ctx) {
            Ok(s) => s,
            Err(e) => return e.into(),
        };
        let pr = NewPullRequest {
            title: params.title,
            head: params.head,
            base: params.base,
            body: params.body.unwrap_or_default(),
        };
        pulls::open(&session, &params.repo, &pr)
            .await
            .map(|pr| json!({ "pr": pr }))
            .into()
    }
}

// -- MCP tool handlers (thin wrappers calling run_* methods) --

#[tool_router]
impl McpGithubServer {
    #[tool(
        name = "create_repo",
        description = "Create a repository for the authenticated user and optionally seed a README"
    )]
    async fn create_repo(
        &self,
        Parameters(params): Parameters<CreateRepoParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let ctx = CallContext::from_meta(&context.meta);
        let server = self.clone();
        let result = guarded("create_repo", async move { server.run_create_repo(&ctx, params).await }).await;
        Ok(respond("create_repo", result))
    }

    #[tool(
        name = "update_repo",
        description = "Update a repository's name, description, or visibility"
    )]
    async fn update_repo(
        &self,
        Parameters(params): Parameters<UpdateRepoParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let ctx = CallContext::from_meta(&context.meta);
        let server = self.clone();
        let result = guarded("update_repo", async move { server.run_update_repo(&ctx, params).await }).await;
        Ok(respond("update_repo", result))
    }

    #[tool(name = "delete_repo", description = "Delete a repository")]
    async fn delete_repo(
        &self,
        Parameters(params): Parameters<RepoParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let ctx = CallContext::from_meta(&context.meta);
        let server = self.clone();
        let result = guarded("delete_repo", async move { server.run_delete_repo(&ctx, params).await }).await;
        Ok(respond("delete_repo", result))
    }

    #[tool(
        name = "issues_list",
        description = "List issues in a repository, optionally filtered by state"
    )]
    async fn issues_list(
        &self,
        Parameters(params): Parameters<ListIssuesParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let ctx = CallContext::from_meta(&context.meta);
        let server = self.clone();
        let result = guarded("issues_list", async move { server.run_list_issues(&ctx, params).await }).await;
        Ok(respond("issues_list", result))
    }

    #[tool(
        name = "issue_create",
        description = "Create an issue with optional labels and assignees"
    )]
    async fn issue_create(
        &self,
        Parameters(params): Parameters<CreateIssueParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let ctx = CallContext::from_meta(&context.meta);
        let server = self.clone();
        let result = guarded("issue_create", async move { server.run_create_issue(&ctx, params).await }).await;
        Ok(respond("issue_create", result))
    }

    #[tool(
        name = "issue_update",
        description = "Update an issue's fields and/or append a comment"
    )]
    async fn issue_update(
        &self,
        Parameters(params): Parameters<UpdateIssueParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let ctx = CallContext::from_meta(&context.meta);
        let server = self.clone();
        let result = guarded("issue_update", async move { server.run_update_issue(&ctx, params).await }).await;
        Ok(respond("issue_update", result))
    }

    #[tool(name = "pr_open", description = "Open a pull request from head into base")]
    async fn pr_open(
        &self,
        Parameters(params): Parameters<OpenPullParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let ctx = CallContext::from_meta(&context.meta);
        let server = self.clone();
        let result = guarded("pr_open", async move { server.run_open_pull(&ctx, params).await }).await;
        Ok(respond("pr_open", result))
    }
}

#[tool_handler]
impl ServerHandler for McpGithubServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "GitHub server for the authenticated user's repositories. Use create_repo, \
                 update_repo and delete_repo to manage repositories, issues_list, issue_create \
                 and issue_update for issues, and pr_open to open pull requests. Credentials \
                 may be passed per call in _meta as github_token and github_username."
                    .to_string(),
            ),
        }
    }
}
