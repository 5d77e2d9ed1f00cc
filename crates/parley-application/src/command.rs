//! Session commands typed at the prompt.

use parley_core::session::ExportFormat;
use parley_core::{ParleyError, Result};
use std::path::PathBuf;

/// A session-lifecycle command recognized on an input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Help,
    Quit,
    New { name: Option<String> },
    Save { name: Option<String> },
    Load { id: String },
    Sessions,
    Delete { id: String },
    Search { query: String },
    Export { format: ExportFormat, path: Option<PathBuf> },
    Branch { name: String, at: Option<usize> },
    Branches,
    Tree,
    Switch { id: String },
    Merge { source_id: String },
    Recover,
    Attach { path: PathBuf },
    Tag { tag: String },
    Rename { name: String },
}

impl SessionCommand {
    /// Parses one input line.
    ///
    /// Commands start with `/`; a bare `quit` or `exit` line also quits.
    /// Returns `Ok(None)` for anything else, meaning the line is a chat
    /// message.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when a command is recognized but its arguments are
    /// missing or malformed; `UnsupportedFormat` for an unknown export format.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            return Ok(Some(Self::Quit));
        }
        let Some(body) = line.strip_prefix('/') else {
            return Ok(None);
        };
        let (cmd, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
        let args = args.trim();

        let command = match cmd.to_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            "new" => Self::New {
                name: optional(args),
            },
            "save" => Self::Save {
                name: optional(args),
            },
            "load" => Self::Load {
                id: single("load", args, "<id>")?,
            },
            "sessions" | "list" => Self::Sessions,
            "delete" => Self::Delete {
                id: single("delete", args, "<id>")?,
            },
            "search" => Self::Search {
                query: required("search", args, "<query>")?,
            },
            "export" => parse_export(args)?,
            "branch" => parse_branch(args)?,
            "branches" => Self::Branches,
            "tree" => Self::Tree,
            "switch" => Self::Switch {
                id: single("switch", args, "<id>")?,
            },
            "merge" => Self::Merge {
                source_id: single("merge", args, "<source_id>")?,
            },
            "recover" => Self::Recover,
            "attach" => Self::Attach {
                path: PathBuf::from(required("attach", args, "<path>")?),
            },
            "tag" => Self::Tag {
                tag: single("tag", args, "<tag>")?,
            },
            "rename" => Self::Rename {
                name: required("rename", args, "<name>")?,
            },
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    /// Usage text for every command.
    pub const fn help_text() -> &'static str {
        r"Session commands:
  /new [name]                 Start a new session
  /save [name]                Save the current session, optionally renaming it
  /load <id>                  Load a stored session
  /sessions                   List stored sessions
  /delete <id>                Delete a stored session
  /search <query>             Search all sessions
  /export <json|markdown> [path]
                              Export the current session
  /branch <name> [at <n>]     Branch the current session after message n
  /branches                   List branches of the current session
  /tree                       Show the branch tree
  /switch <id>                Switch to another session
  /merge <source_id>          Merge another session into this one
  /recover                    Restore the pending recovery checkpoint
  /attach <path>              Attach a file to the next message
  /tag <tag>                  Tag the current session
  /rename <name>              Rename the current session
  /help                       Show this help
  /quit                       Save and exit"
    }
}

fn optional(args: &str) -> Option<String> {
    (!args.is_empty()).then(|| args.to_string())
}

fn required(cmd: &str, args: &str, usage: &str) -> Result<String> {
    optional(args).ok_or_else(|| ParleyError::invalid_argument(format!("Usage: {cmd} {usage}")))
}

fn single(cmd: &str, args: &str, usage: &str) -> Result<String> {
    let value = required(cmd, args, usage)?;
    if value.contains(char::is_whitespace) {
        return Err(ParleyError::invalid_argument(format!(
            "Usage: {cmd} {usage} (takes exactly one argument)"
        )));
    }
    Ok(value)
}

fn parse_export(args: &str) -> Result<SessionCommand> {
    let (format, path) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    if format.is_empty() {
        return Err(ParleyError::invalid_argument(
            "Usage: export <json|markdown> [path]",
        ));
    }
    Ok(SessionCommand::Export {
        format: format.parse()?,
        path: optional(path.trim()).map(PathBuf::from),
    })
}

fn parse_branch(args: &str) -> Result<SessionCommand> {
    let usage = || ParleyError::invalid_argument("Usage: branch <name> [at <n>]");
    let words: Vec<&str> = args.split_whitespace().collect();

    match words.as_slice() {
        [] => Err(usage()),
        [.., "at", n] if words.len() > 2 => {
            let at = n.parse::<usize>().map_err(|_| {
                ParleyError::invalid_argument(format!("Branch point must be a number, got '{n}'"))
            })?;
            Ok(SessionCommand::Branch {
                name: words[..words.len() - 2].join(" "),
                at: Some(at),
            })
        }
        [.., "at"] | ["at", _] => Err(usage()),
        _ => Ok(SessionCommand::Branch {
            name: words.join(" "),
            at: None,
        }),
    }
}
