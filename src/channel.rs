//! Message delivery for the channel variants.
//!
//! [`Channel`] itself is plain data from the events crate; this module
//! knows how each variant reaches players through the engine. Chat text
//! longer than the engine tolerates is split into multiple server
//! commands, breaking at spaces where possible.

use vadrigar_events::{Channel, ClientId, Engine};

/// Longest chat payload sent in a single server command.
const CHAT_LINE_LIMIT: usize = 1000;

/// Delivery surface for channels.
pub trait ChannelReply {
    /// Send a message to everyone the channel addresses.
    fn reply(&self, engine: &dyn Engine, msg: &str);
}

impl ChannelReply for Channel {
    fn reply(&self, engine: &dyn Engine, msg: &str) {
        match self {
            Channel::Console => {
                engine.console_print(&format!("{}\n", msg));
            }
            Channel::Chat => {
                for line in split_long_lines(msg, CHAT_LINE_LIMIT) {
                    engine.send_server_command(None, &print_cmd(&line));
                }
            }
            Channel::TeamChat(team) => {
                let recipients: Vec<ClientId> = engine
                    .players()
                    .into_iter()
                    .filter(|p| p.team == *team)
                    .map(|p| p.id)
                    .collect();
                for line in split_long_lines(msg, CHAT_LINE_LIMIT) {
                    let cmd = print_cmd(&line);
                    for id in &recipients {
                        engine.send_server_command(Some(*id), &cmd);
                    }
                }
            }
            Channel::Tell(client) | Channel::ClientCommand(client) => {
                for line in split_long_lines(msg, CHAT_LINE_LIMIT) {
                    engine.send_server_command(Some(*client), &print_cmd(&line));
                }
            }
        }
    }
}

fn print_cmd(line: &str) -> String {
    format!("print \"{}\n\"", line)
}

/// Split a message into chunks no longer than `limit`, preferring to
/// break at the last space inside the window.
fn split_long_lines(msg: &str, limit: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = msg;

    while rest.chars().count() > limit {
        let window: String = rest.chars().take(limit).collect();
        let cut = window.rfind(' ').filter(|&i| i > 0).unwrap_or(window.len());
        lines.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start();
    }
    lines.push(rest.to_string());

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_one_line() {
        assert_eq!(split_long_lines("hello", 100), vec!["hello"]);
    }

    #[test]
    fn test_long_message_breaks_at_spaces() {
        let msg = "aaaa bbbb cccc";
        let lines = split_long_lines(msg, 10);
        assert_eq!(lines, vec!["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn test_unbreakable_run_is_cut_hard() {
        let msg = "a".repeat(25);
        let lines = split_long_lines(&msg, 10);
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
    }
}
