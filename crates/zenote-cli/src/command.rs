//! Input line parsing.

use std::path::PathBuf;

use zenote_types::Dimension;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text: replaces the typing slot's content.
    Type(String),
    Edit { index: usize, text: String },
    Delete(usize),
    Paste(PathBuf),
    Resize {
        index: usize,
        width: Dimension,
        height: Dimension,
    },
    Show,
    Flush,
    Help,
    Quit,
}

pub const HELP: &str = "\
<text>               type into the trailing empty block
:edit <n> <text>     replace block n's content
:delete <n>          delete block n
:paste <file>        paste an image file
:resize <n> <w> <h>  resize image block n (px or auto)
:show                list blocks
:flush               send pending writes now
:quit                flush and exit";

/// Parse one input line. Lines not starting with `:` are typed text.
pub fn parse(line: &str) -> Result<Command, String> {
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Command::Type(line.to_string()));
    };
    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();

    match name {
        "edit" | "e" => {
            let (index, text) = args.split_once(' ').unwrap_or((args, ""));
            Ok(Command::Edit {
                index: parse_index(index)?,
                text: text.to_string(),
            })
        }
        "delete" | "d" => Ok(Command::Delete(parse_index(args)?)),
        "paste" | "p" => {
            if args.is_empty() {
                return Err("usage: :paste <file>".into());
            }
            Ok(Command::Paste(PathBuf::from(args)))
        }
        "resize" | "r" => {
            let parts: Vec<&str> = args.split_whitespace().collect();
            let [index, width, height] = parts.as_slice() else {
                return Err("usage: :resize <n> <w> <h>".into());
            };
            Ok(Command::Resize {
                index: parse_index(index)?,
                width: Dimension::parse(width),
                height: Dimension::parse(height),
            })
        }
        "show" | "s" => Ok(Command::Show),
        "flush" | "f" => Ok(Command::Flush),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command :{other} (try :help)")),
    }
}

fn parse_index(s: &str) -> Result<usize, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("expected a block number, got {s:?}"))
}
