//! Engine directives embedded in commit messages.
//!
//! Commits on the queue branch can carry `<Tag>: <command> [args]`
//! lines: the generic `Gbp` family and the queue-specific `Gbp-Pq`
//! family. Recognized directive lines are stripped from the body before
//! it becomes a patch's long description.

use std::collections::BTreeMap;

use log::{debug, warn};
use regex::Regex;

/// Generic directive tag.
pub const TAG: &str = "gbp";
/// Queue-specific directive tag; its commands win over the generic ones.
pub const QUEUE_TAG: &str = "gbp-pq";

pub const CMD_IGNORE: &str = "ignore";
pub const CMD_TOPIC: &str = "topic";

/// Parse `<tag>: <command> [args]` directives out of a commit body.
///
/// `noarg` commands may appear bare; `arg` commands require an argument
/// (a missing one is warned about and the line kept). Unknown commands
/// warn and stay in the body. Returns the commands found and the body
/// with recognized directive lines removed.
pub fn parse_commands(
    body: &str,
    commit: &str,
    tag: &str,
    noarg: &[&str],
    arg: &[&str],
) -> (BTreeMap<String, String>, String) {
    let pattern = format!(
        r"(?i)^{}:\s*(?P<cmd>[a-z-]+)(\s+(?P<args>\S.*))?",
        regex::escape(tag)
    );
    let matcher = Regex::new(&pattern).expect("directive pattern");

    let mut commands = BTreeMap::new();
    let mut kept = Vec::new();
    for line in body.lines() {
        let Some(caps) = matcher.captures(line) else {
            kept.push(line);
            continue;
        };
        let cmd = caps["cmd"].to_lowercase();
        let args = caps.name("args").map(|m| m.as_str().to_string());
        if arg.contains(&cmd.as_str()) {
            match args {
                Some(args) => {
                    commands.insert(cmd, args);
                    continue;
                }
                None => {
                    warn!("ignoring command '{line}' in commit {commit}: missing arguments");
                }
            }
        } else if noarg.contains(&cmd.as_str()) {
            commands.insert(cmd, args.unwrap_or_default());
            continue;
        } else {
            warn!("ignoring unknown command '{line}' in commit {commit}");
        }
        kept.push(line);
    }
    (commands, kept.join("\n"))
}

/// Recognize the deprecated single-line `gbp-pq-topic: <topic>`
/// annotation, returning the topic (if any) and the body with the
/// annotation stripped.
pub fn parse_old_style_topic(body: &str, commit: &str) -> (Option<String>, String) {
    let matcher = Regex::new(r"(?i)^gbp-pq-topic:\s*(?P<topic>\S.*)").expect("topic pattern");
    let mut topic = None;
    let mut kept = Vec::new();
    for line in body.lines() {
        if let Some(caps) = matcher.captures(line) {
            let found = caps["topic"].to_string();
            debug!("topic {found} found for {commit}");
            warn!(
                "deprecated 'gbp-pq-topic: <topic>' in {commit}, please use \
                 'Gbp[-Pq]: Topic <topic>' instead"
            );
            topic = Some(found);
            continue;
        }
        kept.push(line);
    }
    (topic, kept.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_noarg_and_arg_commands() {
        let body = "Some description\nGbp-Pq: Ignore\nGbp-Pq: Topic fixes\ntrailing";
        let (cmds, stripped) =
            parse_commands(body, "abc", QUEUE_TAG, &[CMD_IGNORE], &[CMD_TOPIC]);
        assert_eq!(cmds.get("ignore").map(String::as_str), Some(""));
        assert_eq!(cmds.get("topic").map(String::as_str), Some("fixes"));
        assert_eq!(stripped, "Some description\ntrailing");
    }

    #[test]
    fn missing_argument_keeps_line() {
        let body = "Gbp-Pq: Topic";
        let (cmds, stripped) =
            parse_commands(body, "abc", QUEUE_TAG, &[CMD_IGNORE], &[CMD_TOPIC]);
        assert!(cmds.is_empty());
        assert_eq!(stripped, body);
    }

    #[test]
    fn unknown_command_keeps_line() {
        let body = "Gbp: frobnicate now";
        let (cmds, stripped) = parse_commands(body, "abc", TAG, &[CMD_IGNORE], &[CMD_TOPIC]);
        assert!(cmds.is_empty());
        assert_eq!(stripped, body);
    }

    #[test]
    fn generic_tag_does_not_match_queue_tag() {
        let body = "Gbp-Pq: Ignore";
        let (cmds, stripped) = parse_commands(body, "abc", TAG, &[CMD_IGNORE], &[CMD_TOPIC]);
        assert!(cmds.is_empty());
        assert_eq!(stripped, body);
    }

    #[test]
    fn old_style_topic_is_stripped_with_warning() {
        let body = "Line one\ngbp-pq-topic: net\nLine two";
        let (topic, stripped) = parse_old_style_topic(body, "abc");
        assert_eq!(topic.as_deref(), Some("net"));
        assert_eq!(stripped, "Line one\nLine two");
    }

    #[test]
    fn no_topic_leaves_body_alone() {
        let body = "Just a body";
        let (topic, stripped) = parse_old_style_topic(body, "abc");
        assert!(topic.is_none());
        assert_eq!(stripped, body);
    }
}
