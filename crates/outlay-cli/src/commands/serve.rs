//! Server command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use outlay_server::AppState;

pub async fn cmd_serve(
    app: AppState,
    db_path: &Path,
    host: &str,
    port: u16,
    mcp_port: Option<u16>,
) -> Result<()> {
    println!("🚀 Starting Outlay web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    println!(
        "   Uploads: {} (max {} MB)",
        app.config.storage.uploads_dir.display(),
        app.config.storage.max_upload_bytes / 1024 / 1024
    );
    if let Some(mcp) = mcp_port {
        println!("   MCP server: http://{}:{}/mcp", host, mcp);
    }
    match app.pipeline.ai() {
        Some(ai) => println!("   🤖 AI backend: {}", ai.backend_name()),
        None => println!("   ⚠️  AI backend: not configured (invoice extraction disabled)"),
    }
    if app.ledger.can_pay() {
        println!("   💸 Payments: enabled");
    } else {
        println!("   ⚠️  Payments: not configured (set PAYMENT_API_URL)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    // Start MCP server if port specified
    if let Some(mcp) = mcp_port {
        let mcp_ledger = app.ledger.clone();
        let mcp_host = host.to_string();
        tokio::spawn(async move {
            if let Err(e) = outlay_server::mcp::start_mcp_server(mcp_ledger, &mcp_host, mcp).await
            {
                tracing::error!("MCP server error: {}", e);
            }
        });
    }

    outlay_server::serve(Arc::new(app), host, port).await
}
