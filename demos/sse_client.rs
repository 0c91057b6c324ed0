//! SSE Client: connect to an MCP server and call its tools interactively.
//!
//! Reads the server from the environment:
//! ```sh
//! export MCP_SERVER_URL=http://localhost:3000
//! export MCP_API_KEY=secret        # optional
//! cargo run --example sse_client
//! ```
//!
//! Then type one call per line, `<tool> <json args>`:
//! ```text
//! > echo {"msg": "hi"}
//! ```
//! `tools` lists the catalog, `quit` exits.

use mcp_sse_client::client::McpClient;
use mcp_sse_client::config::ClientConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcp_sse_client=info".into()),
        )
        .init();

    let config = ClientConfig::from_env()?;
    println!("Connecting to {} ...", config.sse_url()?);

    let client = McpClient::new(config)?;
    client.connect().await?;

    if let Some(session) = client.session().await {
        println!("Session: {}", session.id);
    }
    print_tools(&client).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "tools" => {
                print_tools(&client).await;
                continue;
            }
            _ => {}
        }

        let (tool, raw_args) = line.split_once(' ').unwrap_or((line, "{}"));
        let args = match serde_json::from_str(raw_args) {
            Ok(args) => args,
            Err(e) => {
                println!("Invalid JSON arguments: {e}");
                continue;
            }
        };

        match client.call(tool, args).await {
            Ok(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
            Err(e) => println!("Error ({}): {e}", e.kind()),
        }
    }

    client.close().await?;
    Ok(())
}

async fn print_tools(client: &McpClient) {
    let tools = client.tools().await;
    if tools.is_empty() {
        println!("No tools advertised yet.");
        return;
    }
    println!("Tools:");
    for tool in tools.tools() {
        println!("  - {}: {}", tool.name, tool.description);
    }
}
