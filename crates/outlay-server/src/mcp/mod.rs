//! MCP (Model Context Protocol) Server for Outlay
//!
//! Exposes categories and expenses to LLM clients as MCP tools. Mutations go
//! through the same ledger as the REST API, so paid and cancelled expenses
//! stay frozen here too. Paying is not exposed.
//!
//! # Architecture
//!
//! The MCP server runs on a separate port from the main REST API,
//! using HTTP/SSE (Streamable HTTP) transport.
//!
//! ```bash
//! outlay serve --port 3000 --mcp-port 3001
//! ```
//!
//! # Available Tools
//!
//! - `list_categories` / `create_category`
//! - `list_expenses` / `get_expense` / `create_expense` / `update_expense` / `delete_expense`
//! - `get_spending_summary`

mod tools;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Serialize;
use tracing::info;

use outlay_core::{Database, Ledger};

pub use tools::*;

/// Actor recorded in the audit log for MCP mutations
pub const MCP_ACTOR: &str = "mcp";

/// Outlay MCP Server state
#[derive(Clone)]
pub struct OutlayMcpServer {
    ledger: Ledger,
    /// Tool router for MCP operations
    tool_router: ToolRouter<Self>,
}

/// Map a core error onto an MCP error
///
/// Caller mistakes become `invalid_params`; everything else is internal.
fn to_mcp_error(err: outlay_core::Error) -> McpError {
    use outlay_core::Error as E;
    match err {
        E::Validation { .. }
        | E::NotFound(_)
        | E::Conflict(_)
        | E::AlreadyPaid(_)
        | E::PaymentNotApplied { .. }
        | E::InvalidTransition { .. } => McpError::invalid_params(err.to_string(), None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

impl OutlayMcpServer {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            tool_router: Self::tool_router(),
        }
    }

    fn db(&self) -> &Database {
        self.ledger.db()
    }

    fn audit(&self, action: &str, id: i64, details: Option<&str>) -> Result<(), McpError> {
        self.db()
            .log_audit(MCP_ACTOR, action, Some("expense"), Some(id), details)
            .map(|_| ())
            .map_err(to_mcp_error)
    }
}

#[tool_handler]
impl ServerHandler for OutlayMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "outlay".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Outlay Expense Manager".to_string()),
                website_url: None,
                icons: None,
            },
            instructions: Some(
                "Outlay tracks invoices as expenses grouped into budget categories. \
                 Use the tools to list and create categories, manage pending expenses, \
                 and review paid spending. Paid and cancelled expenses cannot be edited."
                    .to_string(),
            ),
        }
    }
}

#[tool_router]
impl OutlayMcpServer {
    #[tool(
        description = "List all categories with their budget, total paid spending and expense count."
    )]
    async fn list_categories(&self) -> Result<CallToolResult, McpError> {
        let categories = tools::list_categories(self.db()).map_err(to_mcp_error)?;
        json_result(&categories)
    }

    #[tool(description = "Create a category. Names are unique ignoring case.")]
    async fn create_category(
        &self,
        Parameters(params): Parameters<CreateCategoryParams>,
    ) -> Result<CallToolResult, McpError> {
        let new_category = params.into_new_category().map_err(to_mcp_error)?;
        let id = self
            .db()
            .create_category(&new_category)
            .map_err(to_mcp_error)?;
        self.db()
            .log_audit(
                MCP_ACTOR,
                "create",
                Some("category"),
                Some(id),
                Some(&new_category.name),
            )
            .map_err(to_mcp_error)?;

        let category = self.db().get_category(id).map_err(to_mcp_error)?;
        json_result(&category)
    }

    #[tool(
        description = "List expenses, newest first. Optionally filter by category ID and status (pending, paid, cancelled)."
    )]
    async fn list_expenses(
        &self,
        Parameters(params): Parameters<ListExpensesParams>,
    ) -> Result<CallToolResult, McpError> {
        let expenses = tools::list_expenses(self.db(), &params).map_err(to_mcp_error)?;
        json_result(&expenses)
    }

    #[tool(description = "Get one expense with its category name and payments.")]
    async fn get_expense(
        &self,
        Parameters(params): Parameters<ExpenseIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let detail = tools::get_expense(self.db(), params.id).map_err(to_mcp_error)?;
        json_result(&detail)
    }

    #[tool(
        description = "Create a pending expense. Amount must be greater than 0; due date is YYYY-MM-DD."
    )]
    async fn create_expense(
        &self,
        Parameters(params): Parameters<CreateExpenseParams>,
    ) -> Result<CallToolResult, McpError> {
        let new_expense = params.into_new_expense().map_err(to_mcp_error)?;
        let expense = self
            .ledger
            .create_expense(new_expense)
            .map_err(to_mcp_error)?;
        self.audit("create", expense.id, None)?;

        info!(expense_id = expense.id, "Expense created over MCP");
        json_result(&expense)
    }

    #[tool(
        description = "Edit a pending expense, or cancel it by setting status to 'cancelled'. Paid and cancelled expenses cannot be edited."
    )]
    async fn update_expense(
        &self,
        Parameters(params): Parameters<UpdateExpenseParams>,
    ) -> Result<CallToolResult, McpError> {
        let (id, update) = params.into_update().map_err(to_mcp_error)?;
        let expense = self
            .ledger
            .update_expense(id, update)
            .map_err(to_mcp_error)?;
        self.audit("update", id, None)?;
        json_result(&expense)
    }

    #[tool(description = "Delete an expense and its payment records.")]
    async fn delete_expense(
        &self,
        Parameters(params): Parameters<ExpenseIdParams>,
    ) -> Result<CallToolResult, McpError> {
        self.ledger
            .delete_expense(params.id)
            .map_err(to_mcp_error)?;
        self.audit("delete", params.id, None)?;
        json_result(&serde_json::json!({ "success": true, "id": params.id }))
    }

    #[tool(
        description = "Get total paid spending with a per-category breakdown including budgets."
    )]
    async fn get_spending_summary(&self) -> Result<CallToolResult, McpError> {
        let summary = tools::get_spending_summary(self.db()).map_err(to_mcp_error)?;
        json_result(&summary)
    }
}

/// Start the MCP server on the given port
pub async fn start_mcp_server(ledger: Ledger, host: &str, port: u16) -> anyhow::Result<()> {
    use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
    use rmcp::transport::streamable_http_server::StreamableHttpService;

    info!("Starting MCP server at http://{}:{}/mcp", host, port);

    let service = StreamableHttpService::new(
        move || Ok(OutlayMcpServer::new(ledger.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("MCP server ready at http://{}/mcp", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}
