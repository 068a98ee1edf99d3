//! Line Protocol
//!
//! Every exchange is newline-delimited ASCII over a fresh TCP connection.
//! Requests have the shape `<COMMAND> <originId> <originPort> [args...]`;
//! replies are a closed set of literal lines.
//!
//! Rendering a parsed command gives back its canonical line, which is what a
//! node forwards to its successor, so the requester identity survives every hop.

use crate::error::{RingError, RingResult};
use crate::membership::types::{NodeDescriptor, NodeRef};

use std::fmt;

// --- Handshake acknowledgements ---

pub const EXIT_OK: &str = "EXIT OK";
pub const SEND_OK: &str = "SEND_OK";
pub const RECEIVED_OK: &str = "RECEIVED_OK";
pub const READY_TO_RECEIVE: &str = "READY_TO_RECEIVE";
pub const NEIGHBOR_OK: &str = "NEIGHBOR_OK";

const ENTER_OK: &str = "ENTER OK";
const PREDECESSOR_MARKER: &str = "Predecessor:";
const SUCCESSOR_MARKER: &str = "Successor:";

const USAGE: &str = "Usage: <COMMAND> <id> <port> [args...]. Commands supported ENTER, EXIT, \
                     SEND_KEYS, RECEIVE_KEYS, UPDATE_SUCCESSOR, LOOKUP, INSERT, DELETE";

/// Identity a request was issued under: the requester's id and listening port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub id: u32,
    pub port: u16,
}

impl Origin {
    pub fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enter {
        origin: Origin,
    },
    Exit {
        origin: Origin,
    },
    SendKeys {
        origin: Origin,
    },
    ReceiveKeys {
        origin: Origin,
        predecessor: NodeRef,
    },
    /// `origin` names the new successor; without a host the connection's
    /// remote address is used.
    UpdateSuccessor {
        origin: Origin,
        host: Option<String>,
    },
    Lookup {
        origin: Origin,
        key: u32,
    },
    Insert {
        origin: Origin,
        key: u32,
        value: String,
    },
    Delete {
        origin: Origin,
        key: u32,
    },
}

impl Command {
    pub fn parse(line: &str) -> RingResult<Self> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return Err(RingError::MalformedRequest(USAGE.to_string()));
        }

        let keyword = tokens[0].to_uppercase();
        let origin = Origin::new(parse_number(tokens[1], "id")?, parse_number(tokens[2], "port")?);
        let args = &tokens[3..];

        let command = match keyword.as_str() {
            "ENTER" => Command::Enter { origin },
            "EXIT" => Command::Exit { origin },
            "SEND_KEYS" => Command::SendKeys { origin },
            "RECEIVE_KEYS" => {
                let [pred_id, pred_host, pred_port, ..] = args else {
                    return Err(RingError::MalformedRequest(
                        "Usage: RECEIVE_KEYS <id> <port> <predId> <predHost> <predPort>"
                            .to_string(),
                    ));
                };
                Command::ReceiveKeys {
                    origin,
                    predecessor: NodeRef::new(
                        parse_number(pred_id, "predecessor id")?,
                        *pred_host,
                        parse_number(pred_port, "predecessor port")?,
                    ),
                }
            }
            "UPDATE_SUCCESSOR" => Command::UpdateSuccessor {
                origin,
                host: args.first().map(|h| h.to_string()),
            },
            "LOOKUP" => Command::Lookup {
                origin,
                key: parse_key(args, "LOOKUP")?,
            },
            "INSERT" => {
                let key = parse_key(args, "INSERT")?;
                let [_, value] = args else {
                    return Err(RingError::MalformedRequest(
                        "Usage: INSERT <id> <port> <key> <value>".to_string(),
                    ));
                };
                Command::Insert {
                    origin,
                    key,
                    value: value.to_string(),
                }
            }
            "DELETE" => Command::Delete {
                origin,
                key: parse_key(args, "DELETE")?,
            },
            other => {
                return Err(RingError::MalformedRequest(format!(
                    "INVALID COMMAND {}",
                    other
                )));
            }
        };

        Ok(command)
    }

    pub fn origin(&self) -> Origin {
        match self {
            Command::Enter { origin }
            | Command::Exit { origin }
            | Command::SendKeys { origin }
            | Command::ReceiveKeys { origin, .. }
            | Command::UpdateSuccessor { origin, .. }
            | Command::Lookup { origin, .. }
            | Command::Insert { origin, .. }
            | Command::Delete { origin, .. } => *origin,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Enter { origin } => write!(f, "ENTER {} {}", origin.id, origin.port),
            Command::Exit { origin } => write!(f, "EXIT {} {}", origin.id, origin.port),
            Command::SendKeys { origin } => write!(f, "SEND_KEYS {} {}", origin.id, origin.port),
            Command::ReceiveKeys {
                origin,
                predecessor,
            } => write!(
                f,
                "RECEIVE_KEYS {} {} {} {} {}",
                origin.id, origin.port, predecessor.id, predecessor.host, predecessor.port
            ),
            Command::UpdateSuccessor { origin, host } => match host {
                Some(host) => write!(f, "UPDATE_SUCCESSOR {} {} {}", origin.id, origin.port, host),
                None => write!(f, "UPDATE_SUCCESSOR {} {}", origin.id, origin.port),
            },
            Command::Lookup { origin, key } => {
                write!(f, "LOOKUP {} {} {}", origin.id, origin.port, key)
            }
            Command::Insert { origin, key, value } => {
                write!(f, "INSERT {} {} {} {}", origin.id, origin.port, key, value)
            }
            Command::Delete { origin, key } => {
                write!(f, "DELETE {} {} {}", origin.id, origin.port, key)
            }
        }
    }
}

/// Replies other than the ENTER acknowledgement, which has its own format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    ExitOk,
    SendOk,
    ReceivedOk,
    ReadyToReceive,
    NeighborOk,
    Found { node: u32, value: String },
    NotFound { node: u32 },
    Inserted { node: u32 },
    Exists { node: u32 },
    Deleted { node: u32 },
    Error(RingError),
}

impl Reply {
    pub fn parse(line: &str) -> RingResult<Self> {
        let line = line.trim();
        match line {
            EXIT_OK => return Ok(Reply::ExitOk),
            SEND_OK => return Ok(Reply::SendOk),
            RECEIVED_OK => return Ok(Reply::ReceivedOk),
            READY_TO_RECEIVE => return Ok(Reply::ReadyToReceive),
            NEIGHBOR_OK => return Ok(Reply::NeighborOk),
            _ => {}
        }

        let mut parts = line.splitn(3, ' ');
        let keyword = parts.next().unwrap_or_default();
        let second = parts.next();
        let rest = parts.next();

        if keyword == "ERROR" {
            let code = second.unwrap_or_default();
            let message = rest.unwrap_or_default();
            return RingError::from_code(code, message)
                .map(Reply::Error)
                .ok_or_else(|| {
                    RingError::MalformedRequest(format!("Unknown error reply: {}", line))
                });
        }

        let node = second
            .ok_or_else(|| RingError::MalformedRequest(format!("Unexpected reply: {}", line)))
            .and_then(|token| parse_number(token, "node id"))?;

        let reply = match (keyword, rest) {
            ("FOUND", Some(value)) => Reply::Found {
                node,
                value: value.to_string(),
            },
            ("NOT_FOUND", None) => Reply::NotFound { node },
            ("INSERTED", None) => Reply::Inserted { node },
            ("EXISTS", None) => Reply::Exists { node },
            ("DELETED", None) => Reply::Deleted { node },
            _ => {
                return Err(RingError::MalformedRequest(format!(
                    "Unexpected reply: {}",
                    line
                )));
            }
        };
        Ok(reply)
    }

    /// Parses a reply that must be the given acknowledgement.
    pub fn expect(line: &str, expected: Reply) -> RingResult<()> {
        match Reply::parse(line)? {
            reply if reply == expected => Ok(()),
            Reply::Error(err) => Err(err),
            other => Err(RingError::TransferIncomplete(format!(
                "Expected {} but received {}",
                expected, other
            ))),
        }
    }
}

impl From<RingError> for Reply {
    fn from(err: RingError) -> Self {
        Reply::Error(err)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::ExitOk => f.write_str(EXIT_OK),
            Reply::SendOk => f.write_str(SEND_OK),
            Reply::ReceivedOk => f.write_str(RECEIVED_OK),
            Reply::ReadyToReceive => f.write_str(READY_TO_RECEIVE),
            Reply::NeighborOk => f.write_str(NEIGHBOR_OK),
            Reply::Found { node, value } => write!(f, "FOUND {} {}", node, value),
            Reply::NotFound { node } => write!(f, "NOT_FOUND {}", node),
            Reply::Inserted { node } => write!(f, "INSERTED {}", node),
            Reply::Exists { node } => write!(f, "EXISTS {}", node),
            Reply::Deleted { node } => write!(f, "DELETED {}", node),
            Reply::Error(err) => {
                let message = err.message().replace(['\r', '\n'], " ");
                write!(f, "ERROR {} {}", err.code(), message)
            }
        }
    }
}

/// `ENTER OK Predecessor: Node <id> [<host>:<port>, ...] Successor: Node <id> [<host>:<port>, ...]`
pub fn format_enter_reply(predecessor: &NodeDescriptor, successor: &NodeDescriptor) -> String {
    format!(
        "{} {} {} {} {}",
        ENTER_OK, PREDECESSOR_MARKER, predecessor, SUCCESSOR_MARKER, successor
    )
}

/// Extracts (predecessor, successor) from an ENTER reply. Failure replies are
/// turned back into their error.
pub fn parse_enter_reply(line: &str) -> RingResult<(NodeRef, NodeRef)> {
    let line = line.trim();
    if !line.starts_with(ENTER_OK) {
        return match Reply::parse(line) {
            Ok(Reply::Error(err)) => Err(err),
            _ => Err(RingError::MalformedRequest(format!(
                "Unexpected ENTER reply: {}",
                line
            ))),
        };
    }

    let (Some(pred_idx), Some(succ_idx)) =
        (line.find(PREDECESSOR_MARKER), line.find(SUCCESSOR_MARKER))
    else {
        return Err(RingError::MalformedRequest(
            "Response format invalid".to_string(),
        ));
    };
    if succ_idx < pred_idx {
        return Err(RingError::MalformedRequest(
            "Response format invalid".to_string(),
        ));
    }

    let pred_part = &line[pred_idx + PREDECESSOR_MARKER.len()..succ_idx];
    let succ_part = &line[succ_idx + SUCCESSOR_MARKER.len()..];
    Ok((parse_node_info(pred_part)?, parse_node_info(succ_part)?))
}

/// `Node <id> [<host>:<port>, ...]`, only the first bracketed element matters.
fn parse_node_info(info: &str) -> RingResult<NodeRef> {
    let invalid =
        || RingError::MalformedRequest(format!("Invalid node info format: {}", info.trim()));

    let node_idx = info.find("Node ").ok_or_else(invalid)?;
    let after_node = &info[node_idx + "Node ".len()..];
    let bracket_start = after_node.find('[').ok_or_else(invalid)?;
    let bracket_end = after_node[bracket_start..].find(']').ok_or_else(invalid)? + bracket_start;

    let id = parse_number(after_node[..bracket_start].trim(), "node id")?;
    let content = &after_node[bracket_start + 1..bracket_end];
    let address = content.split(',').next().unwrap_or_default().trim();
    let (host, port) = address.rsplit_once(':').ok_or_else(|| {
        RingError::MalformedRequest(format!("Invalid host:port format: {}", address))
    })?;

    Ok(NodeRef::new(id, host, parse_number(port, "port")?))
}

fn parse_key(args: &[&str], command: &str) -> RingResult<u32> {
    let token = args.first().ok_or_else(|| {
        RingError::MalformedRequest(format!("Usage: {} <id> <port> <key>", command))
    })?;
    parse_number(token, "key")
}

fn parse_number<T: std::str::FromStr>(token: &str, what: &str) -> RingResult<T> {
    token.trim().parse().map_err(|_| {
        RingError::MalformedRequest(format!("Invalid {} '{}': must be an integer", what, token))
    })
}
