//! Interactive console of a running node.
//!
//! Commands are read line by line from stdin. The bootstrap node additionally
//! exposes the coordinator views (`range`, `nodes`, `requests`); a name server
//! exposes `enter`, `exit` and `neighbor`.

use crate::node::state::Node;

use std::fmt::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const BOOTSTRAP_HELP: &str = "Commands: lookup <key>, insert <key> <value>, delete <key>, \
                              print, range, nodes, requests, status, quit";
const NAME_SERVER_HELP: &str = "Commands: enter, exit, lookup <key>, insert <key> <value>, \
                                delete <key>, print, neighbor, status, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    Print(String),
    Quit,
}

pub struct Console {
    node: Arc<Node>,
}

impl Console {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    pub fn help(&self) -> &'static str {
        if self.node.is_bootstrap() {
            BOOTSTRAP_HELP
        } else {
            NAME_SERVER_HELP
        }
    }

    pub async fn execute(&self, line: &str) -> ConsoleAction {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(command) = tokens.first() else {
            return ConsoleAction::Print(String::new());
        };

        let output = match (command.to_lowercase().as_str(), self.node.is_bootstrap()) {
            ("quit", _) => return ConsoleAction::Quit,
            ("lookup", _) => self.lookup(&tokens).await,
            ("insert", _) => self.insert(&tokens).await,
            ("delete", _) => self.delete(&tokens).await,
            ("print", _) => self.print().await,
            ("status", _) => self.status().await,
            ("range", true) => self.ranges().await,
            ("nodes", true) => self.nodes().await,
            ("requests", true) => self.requests(),
            ("enter", false) => self.enter().await,
            ("exit", false) => self.exit().await,
            ("neighbor", false) => self.neighbor().await,
            (other, _) => format!("Unknown command '{}'. {}", other, self.help()),
        };
        ConsoleAction::Print(output)
    }

    async fn lookup(&self, tokens: &[&str]) -> String {
        match tokens {
            [_, key] => match parse_key(key) {
                Ok(key) => self.node.lookup(key).await.to_string(),
                Err(message) => message,
            },
            _ => "Usage: lookup <key>".to_string(),
        }
    }

    async fn insert(&self, tokens: &[&str]) -> String {
        match tokens {
            [_, key, value] => match parse_key(key) {
                Ok(key) => self.node.insert(key, *value).await.to_string(),
                Err(message) => message,
            },
            _ => "Usage: insert <key> <value>".to_string(),
        }
    }

    async fn delete(&self, tokens: &[&str]) -> String {
        match tokens {
            [_, key] => match parse_key(key) {
                Ok(key) => self.node.delete(key).await.to_string(),
                Err(message) => message,
            },
            _ => "Usage: delete <key>".to_string(),
        }
    }

    async fn print(&self) -> String {
        let entries = self.node.store.entries().await;
        if entries.is_empty() {
            return "No entries stored.".to_string();
        }
        let mut output = String::new();
        for (key, value) in entries {
            let _ = writeln!(output, "{}: {}", key, value);
        }
        output.trim_end().to_string()
    }

    async fn status(&self) -> String {
        let status = self.node.status().await;
        serde_json::to_string_pretty(&status)
            .unwrap_or_else(|e| format!("Cannot render status: {}", e))
    }

    async fn ranges(&self) -> String {
        let Some(coordinator) = self.node.coordinator() else {
            return self.help().to_string();
        };
        let mut output = String::new();
        for (id, range) in coordinator.ranges().await {
            let _ = writeln!(output, "Node {}: {}", id, range);
        }
        output.trim_end().to_string()
    }

    async fn nodes(&self) -> String {
        let Some(coordinator) = self.node.coordinator() else {
            return self.help().to_string();
        };
        let mut output = String::new();
        for descriptor in coordinator.members().await {
            let _ = writeln!(output, "{}", descriptor);
        }
        output.trim_end().to_string()
    }

    fn requests(&self) -> String {
        let Some(coordinator) = self.node.coordinator() else {
            return self.help().to_string();
        };
        let records = coordinator.requests();
        if records.is_empty() {
            return "No requests yet.".to_string();
        }
        let mut output = String::new();
        for record in records {
            let _ = write!(
                output,
                "{} {:?} node {}: {:?}",
                record.id.0, record.kind, record.node_id, record.state
            );
            if let Some(detail) = &record.detail {
                let _ = write!(output, " ({})", detail);
            }
            output.push('\n');
        }
        output.trim_end().to_string()
    }

    async fn enter(&self) -> String {
        match self.node.enter_ring().await {
            Ok(report) => format!(
                "Entered ring. Predecessor: {}, Successor: {}, Range: {}, {} keys received",
                report.predecessor, report.successor, report.range, report.keys_received
            ),
            Err(e) => format!("Enter failed: {}", e),
        }
    }

    async fn exit(&self) -> String {
        match self.node.exit_ring().await {
            Ok(report) => format!(
                "Left ring. {} keys handed to node {}",
                report.keys_sent, report.successor.id
            ),
            Err(e) => format!("Exit failed: {}", e),
        }
    }

    async fn neighbor(&self) -> String {
        if !self.node.is_joined().await {
            return format!("Node {} is not in the ring.", self.node.id());
        }
        let (predecessor, successor) = self.node.neighbors().await;
        let range = self
            .node
            .owned_range()
            .await
            .map(|range| range.to_string())
            .unwrap_or_default();
        format!(
            "Predecessor: {}\nSuccessor: {}\nRange: {}",
            predecessor, successor, range
        )
    }
}

fn parse_key(token: &str) -> Result<u32, String> {
    token
        .parse()
        .map_err(|_| format!("Invalid key '{}'. Key must be an integer.", token))
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run_console(console: Console) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    stdout.write_all(format!("{}\n", console.help()).as_bytes()).await?;
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match console.execute(&line).await {
            ConsoleAction::Quit => break,
            ConsoleAction::Print(output) if output.is_empty() => {}
            ConsoleAction::Print(output) => {
                stdout.write_all(format!("{}\n", output).as_bytes()).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::types::NodeRef;
    use crate::storage::memory::KeyStore;

    fn bootstrap_console() -> Console {
        let store = KeyStore::with_entries([(5, "x".to_string())]);
        Console::new(Arc::new(Node::bootstrap("127.0.0.1", 9000, store)))
    }

    fn print(action: ConsoleAction) -> String {
        match action {
            ConsoleAction::Print(output) => output,
            ConsoleAction::Quit => panic!("unexpected quit"),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_key_commands() {
        let console = bootstrap_console();

        assert_eq!(print(console.execute("lookup 5").await), "FOUND 0 x");
        assert_eq!(print(console.execute("insert 7 y").await), "INSERTED 0");
        assert_eq!(print(console.execute("insert 7 z").await), "EXISTS 0");
        assert_eq!(print(console.execute("delete 7").await), "DELETED 0");
        assert_eq!(print(console.execute("print").await), "5: x");
    }

    #[tokio::test]
    async fn test_usage_messages_keep_console_running() {
        let console = bootstrap_console();

        assert_eq!(print(console.execute("lookup").await), "Usage: lookup <key>");
        assert!(print(console.execute("lookup five").await).starts_with("Invalid key"));
        assert!(print(console.execute("insert 1").await).starts_with("Usage"));
        assert!(print(console.execute("enter").await).starts_with("Unknown command"));
        assert_eq!(console.execute("").await, ConsoleAction::Print(String::new()));
        assert_eq!(console.execute("QUIT").await, ConsoleAction::Quit);
    }

    #[tokio::test]
    async fn test_bootstrap_views() {
        let console = bootstrap_console();
        let coordinator = console.node.coordinator().unwrap();
        let admission = coordinator
            .handle_enter(NodeRef::new(512, "127.0.0.1", 9512))
            .await
            .unwrap();
        coordinator.acknowledge(&admission.request_id);

        let ranges = print(console.execute("range").await);
        assert_eq!(ranges, "Node 0: 513-0\nNode 512: 1-512");

        let nodes = print(console.execute("nodes").await);
        assert!(nodes.starts_with("Node 0 [N/A:9000, Pred: 512"));

        let requests = print(console.execute("requests").await);
        assert!(requests.contains("Enter node 512: Acked"));
    }

    #[tokio::test]
    async fn test_name_server_console_before_join() {
        let node = Node::name_server(NodeRef::new(3, "127.0.0.1", 9003), "127.0.0.1", 9000);
        let console = Console::new(Arc::new(node));

        assert_eq!(print(console.execute("neighbor").await), "Node 3 is not in the ring.");
        assert!(print(console.execute("exit").await).starts_with("Exit failed"));
        assert!(print(console.execute("lookup 3").await).starts_with("ERROR NOT_JOINED"));
        assert!(print(console.execute("range").await).starts_with("Unknown command"));
    }
}
