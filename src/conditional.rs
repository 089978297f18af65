use crate::exec::{self, LaunchError};
use crate::interpreter::Shell;
use crate::parser::ParseError;
use log::debug;

/// A parsed `if <cmd> then <body> [else <body>] fi` block.
///
/// Built once per text block and consumed by a single [`evaluate`] call;
/// nothing is persisted afterwards. Only one level is supported: bodies are
/// plain command lines, never nested blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalBlock {
    /// The command whose exit status selects the branch.
    pub condition: String,
    /// Lines run when the condition exits 0.
    pub then_body: Vec<String>,
    /// Lines run otherwise; empty when the block has no `else`.
    pub else_body: Vec<String>,
}

impl ConditionalBlock {
    /// Parse a multi-line block of the form
    ///
    /// ```text
    /// if <cmd>
    /// then
    ///   <commands...>
    /// [else
    ///   <commands...>]
    /// fi
    /// ```
    ///
    /// `then`, `else` and `fi` must stand alone on their lines (surrounding
    /// whitespace is ignored). Malformed blocks fail here, before any
    /// process is spawned. Blank body lines are dropped.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let Some(first) = lines.first() else {
            return Err(ParseError::MissingCondition);
        };

        let condition = match first.strip_prefix("if") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim(),
            _ => return Err(ParseError::MissingCondition),
        };
        if condition.is_empty() {
            return Err(ParseError::MissingCondition);
        }

        let mut then_idx = None;
        let mut else_idx = None;
        let mut fi_idx = None;
        for (i, line) in lines.iter().enumerate().skip(1) {
            match *line {
                "then" if then_idx.is_none() => then_idx = Some(i),
                "else" if else_idx.is_none() => else_idx = Some(i),
                "fi" => {
                    fi_idx = Some(i);
                    break;
                }
                _ => {}
            }
        }

        // `fi` ends the scan, so a `then` seen only after `fi` reads as missing.
        let then_idx = then_idx.ok_or(ParseError::MissingThen)?;
        let fi_idx = fi_idx.ok_or(ParseError::MissingFi)?;
        if let Some(else_idx) = else_idx {
            if else_idx < then_idx {
                return Err(ParseError::MisplacedElse);
            }
        }

        let then_end = else_idx.unwrap_or(fi_idx);
        let body = |range: std::ops::Range<usize>| {
            lines[range]
                .iter()
                .filter(|l| !l.is_empty())
                .map(|l| l.to_string())
                .collect()
        };

        Ok(Self {
            condition: condition.to_string(),
            then_body: body(then_idx + 1..then_end),
            else_body: match else_idx {
                Some(e) => body(e + 1..fi_idx),
                None => Vec::new(),
            },
        })
    }
}

/// Parse and evaluate one `if ... fi` text block.
///
/// The entry point the front end uses when it has assembled a full block.
pub fn evaluate_block(shell: &mut Shell, text: &str) -> Result<(), LaunchError> {
    let block = ConditionalBlock::parse(text)?;
    evaluate(shell, &block)
}

/// Run the condition in the foreground, pick a branch on its exit status,
/// then run every line of the selected branch in order.
///
/// Exit status 0 selects the then-body; anything else (including 127 for a
/// condition that could not be found) selects the else-body. Once a branch
/// is chosen, its lines run unconditionally: a line's own exit status never
/// skips later lines. Each line is re-parsed as its own pipeline, so bodies
/// may use pipes and redirections freely. A line that fails to launch is
/// reported and the remaining lines still run, matching the per-command
/// recovery policy of the main loop.
pub fn evaluate(shell: &mut Shell, block: &ConditionalBlock) -> Result<(), LaunchError> {
    let code = exec::execute_foreground(shell, &block.condition)?;
    debug!("condition `{}` exited {code}", block.condition);
    let body = if code == 0 {
        &block.then_body
    } else {
        &block.else_body
    };
    for line in body {
        if let Err(e) = exec::execute_foreground(shell, line) {
            eprintln!("jobsh: {e}");
        }
    }
    Ok(())
}
