//! searchwire CLI: send calls to a search cluster from the terminal.
//!
//! Usage:
//! ```bash
//! # Search with failover across two nodes
//! searchwire call --node http://es1:9200 --node http://es2:9200 \
//!     --method POST --path /logs/_search --body '{"query":{"match_all":{}}}'
//!
//! # Check which nodes answer
//! searchwire ping --node http://es1:9200 --node http://es2:9200
//!
//! # List the nodes a cluster advertises
//! searchwire sniff --node http://es1:9200
//! ```

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};

use searchwire_core::{
    sniff, FailoverController, HttpMethod, LogicalCall, Node, NodePool, NodePoolConfig,
    ResultEnvelope, SingleNodePool, StaticNodePool, TracingSink, TransportSettings,
};
use searchwire_http::{HttpConnection, HttpConnectionConfig};
use searchwire_observability::{init_tracing, LogConfig};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let flags = &args[2..];
    init_tracing(&LogConfig {
        level: parse_flag(flags, "--log-level").unwrap_or_else(|| "warn".into()),
        json: has_flag(flags, "--json-logs"),
        ..LogConfig::default()
    });

    let result = match args[1].as_str() {
        "call" => cmd_call(flags).await,
        "ping" => cmd_ping(flags).await,
        "sniff" => cmd_sniff(flags).await,
        "version" | "--version" | "-V" => {
            println!("searchwire {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("searchwire {}", env!("CARGO_PKG_VERSION"));
    println!("Failover-aware calls against a search cluster\n");
    println!("USAGE:");
    println!("    searchwire <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    call       Send one request, failing over between nodes");
    println!("    ping       HEAD / on every node");
    println!("    sniff      List the HTTP nodes the cluster advertises");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --node <URL>          Cluster node; repeat for more  [required]");
    println!("    --method <METHOD>     GET | POST | PUT | DELETE | HEAD  (call, default GET)");
    println!("    --path <PATH>         Request path  (call, default /)");
    println!("    --body <JSON>         Request body  (call)");
    println!("    --retries <N>         Failover ceiling  (call)");
    println!("    --timeout-ms <MS>     Per-attempt timeout  (call)");
    println!("    --ping                Ping failover candidates first  (call)");
    println!("    --sniff               Discover nodes before the call  (call)");
    println!("    --log-level <LEVEL>   trace | debug | info | warn | error  (default warn)");
    println!("    --json-logs           Emit logs as JSON");
}

async fn cmd_call(args: &[String]) -> Result<()> {
    let nodes = parse_nodes(args)?;
    let method: HttpMethod = parse_flag(args, "--method")
        .unwrap_or_else(|| "GET".into())
        .parse()
        .map_err(|e| anyhow!("{e}"))?;
    let path = parse_flag(args, "--path").unwrap_or_else(|| "/".into());

    let mut settings = TransportSettings::default()
        .with_diagnostics_sink(Arc::new(TracingSink))
        .with_ping(has_flag(args, "--ping"))
        .with_sniff_on_startup(has_flag(args, "--sniff"));
    if let Some(retries) = parse_flag(args, "--retries") {
        settings = settings.with_max_retries(retries.parse().context("--retries")?);
    }
    if let Some(ms) = parse_flag(args, "--timeout-ms") {
        let ms: u64 = ms.parse().context("--timeout-ms")?;
        settings = settings.with_request_timeout(Duration::from_millis(ms));
    }

    let pool: Arc<dyn NodePool> = if has_flag(args, "--sniff") {
        Arc::new(StaticNodePool::sniffing(nodes, NodePoolConfig::default()))
    } else {
        Arc::new(StaticNodePool::new(nodes, NodePoolConfig::default()))
    };

    let mut call = LogicalCall::new(method, path);
    if let Some(body) = parse_flag(args, "--body") {
        let body: Value = serde_json::from_str(&body).context("--body is not valid JSON")?;
        call = call.with_body(body);
    }

    let env = controller(pool, settings)?.call::<Value>(call).await;
    println!("{}", serde_json::to_string_pretty(&report(&env))?);
    match env.error() {
        Some(err) if !env.success() => bail!("{err}"),
        _ => Ok(()),
    }
}

async fn cmd_ping(args: &[String]) -> Result<()> {
    let nodes = parse_nodes(args)?;
    let mut down = 0;
    for node in nodes {
        let pool = Arc::new(SingleNodePool::new(node.clone()));
        let settings = TransportSettings::default()
            .with_request_timeout(Duration::from_secs(2))
            .with_max_retries(0);
        let env = controller(pool, settings)?
            .call::<Value>(LogicalCall::head("/"))
            .await;
        let elapsed = env.diagnostics().elapsed().as_millis();
        match (env.success(), env.error()) {
            (true, _) => {
                let status = env.status().unwrap_or(0);
                println!("  {node}  up    status={status} {elapsed}ms");
            }
            (false, Some(err)) => {
                down += 1;
                println!("  {node}  down  {err}");
            }
            (false, None) => {
                down += 1;
                println!("  {node}  down");
            }
        }
    }
    if down > 0 {
        bail!("{down} node(s) did not answer");
    }
    Ok(())
}

async fn cmd_sniff(args: &[String]) -> Result<()> {
    let nodes = parse_nodes(args)?;
    let scheme = nodes
        .first()
        .map(|n| n.uri().scheme().to_string())
        .unwrap_or_else(|| "http".into());
    let settings = TransportSettings::default()
        .with_raw_response(true)
        .with_sniff_on_connection_failure(false);
    let sniff_path = settings.sniff_path.clone();
    let pool = Arc::new(StaticNodePool::new(nodes, NodePoolConfig::default()));

    let env = controller(pool, settings)?
        .call::<Value>(LogicalCall::get(sniff_path))
        .await;
    if let Some(err) = env.error() {
        bail!("{err}");
    }
    let body = env.raw_response().context("empty sniff response")?;
    let discovered = sniff::parse_nodes(body, &scheme)?;

    println!("Cluster advertises {} HTTP node(s):\n", discovered.len());
    for node in discovered {
        println!("  {node}");
    }
    Ok(())
}

fn controller(pool: Arc<dyn NodePool>, settings: TransportSettings) -> Result<FailoverController> {
    let connection = Arc::new(HttpConnection::new(HttpConnectionConfig::default())?);
    Ok(FailoverController::new(pool, connection, settings))
}

fn report(env: &ResultEnvelope<Value>) -> Value {
    let d = env.diagnostics();
    json!({
        "success": env.success(),
        "status": env.status(),
        "retries": env.retries(),
        "uri": d.uri.as_ref().map(|u| u.to_string()),
        "error": env.error().map(|e| e.to_string()),
        "nodes": d.nodes,
        "metrics": d.metrics,
        "payload": env.payload(),
    })
}

fn parse_nodes(args: &[String]) -> Result<Vec<Node>> {
    let nodes = parse_flags(args, "--node")
        .into_iter()
        .map(|raw| Node::parse(&raw).with_context(|| format!("invalid node URL `{raw}`")))
        .collect::<Result<Vec<_>>>()?;
    if nodes.is_empty() {
        bail!("at least one --node is required");
    }
    Ok(nodes)
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn parse_flags(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|pair| pair[0] == flag)
        .map(|pair| pair[1].clone())
        .collect()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn repeated_node_flags() {
        let a = args(&["--node", "http://a:9200", "--ping", "--node", "http://b:9200"]);
        let nodes = parse_nodes(&a).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].authority(), "b:9200");
        assert!(has_flag(&a, "--ping"));
    }

    #[test]
    fn missing_node_is_an_error() {
        assert!(parse_nodes(&args(&["--path", "/"])).is_err());
        assert!(parse_nodes(&args(&["--node", "not a url"])).is_err());
    }

    #[test]
    fn single_flag_value() {
        let a = args(&["--method", "POST", "--path", "/x/_search"]);
        assert_eq!(parse_flag(&a, "--path").as_deref(), Some("/x/_search"));
        assert_eq!(parse_flag(&a, "--body"), None);
    }
}
