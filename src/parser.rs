use thiserror::Error;

/// Kind of redirection
///
/// Defines the specific operation mode for an I/O redirection (`<`, `>`, `>>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): reads standard input from a file.
    Input,
    /// Output redirection (`>`): writes standard output to a file, **truncating** it if it exists.
    Output,
    /// Output redirection with append (`>>`): writes standard output to a file without truncating.
    Append,
}

/// A single redirection directive attached to a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    /// Path the descriptor is redirected to. Taken verbatim from the token
    /// following the operator; no globbing or tilde expansion.
    pub target: String,
}

/// One command within a pipeline: its argument vector plus any redirections.
///
/// `argv[0]` is the program (or builtin) name. Redirections are kept in the
/// order they were written; when several redirections of the same kind are
/// present, the *last* one wins at descriptor-assignment time, mirroring
/// sequential descriptor reassignment in a traditional shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub argv: Vec<String>,
    pub redirects: Vec<Redirect>,
}

impl Stage {
    /// The effective input redirection for this stage, if any (last `<` wins).
    pub fn input(&self) -> Option<&Redirect> {
        self.redirects
            .iter()
            .rev()
            .find(|r| r.kind == RedirectKind::Input)
    }

    /// The effective output redirection for this stage, if any
    /// (last `>` or `>>` wins).
    pub fn output(&self) -> Option<&Redirect> {
        self.redirects
            .iter()
            .rev()
            .find(|r| matches!(r.kind, RedirectKind::Output | RedirectKind::Append))
    }
}

/// An ordered sequence of stages connected stdout-to-stdin.
///
/// Invariant: `stages` is never empty; [`parse_pipeline`] rejects inputs that
/// would produce an empty pipeline or an empty stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

/// Errors produced while turning a command string into a [`Pipeline`] or a
/// conditional block into its condition and bodies. Nothing is executed when
/// any of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A `|` segment contained no tokens (e.g. `ls |` or `| wc`).
    #[error("empty command in pipeline")]
    EmptyStage,
    /// A redirection operator appeared with no following path token.
    #[error("expected a path after `{0}`")]
    MissingRedirectTarget(&'static str),
    /// An `if` block whose condition command is empty.
    #[error("`if` with no condition command")]
    MissingCondition,
    /// An `if` block with no `then` line before `fi`.
    #[error("`if` block is missing `then`")]
    MissingThen,
    /// An `if` block that was never closed with `fi`.
    #[error("`if` block is missing `fi`")]
    MissingFi,
    /// An `else` line that appeared before `then`.
    #[error("`else` before `then` in `if` block")]
    MisplacedElse,
}

/// Parse one logical command string into a [`Pipeline`].
///
/// The input is expected to be already variable-expanded, `;`-split and
/// stripped of any trailing `&` — that is the front end's job. Tokenization
/// is whitespace-only: quoting is deliberately unsupported, so a token can
/// never contain a space. Redirection operators are recognized only as
/// standalone tokens (`> out`, not `>out`).
pub fn parse_pipeline(line: &str) -> Result<Pipeline, ParseError> {
    let mut stages = Vec::new();
    for segment in line.split('|') {
        stages.push(parse_stage(segment)?);
    }
    Ok(Pipeline { stages })
}

fn parse_stage(segment: &str) -> Result<Stage, ParseError> {
    let mut argv = Vec::new();
    let mut redirects = Vec::new();
    let mut tokens = segment.split_whitespace();
    while let Some(token) = tokens.next() {
        let kind = match token {
            "<" => Some(RedirectKind::Input),
            ">" => Some(RedirectKind::Output),
            ">>" => Some(RedirectKind::Append),
            _ => None,
        };
        match kind {
            Some(kind) => {
                let target = tokens
                    .next()
                    .ok_or(ParseError::MissingRedirectTarget(operator_text(kind)))?;
                redirects.push(Redirect {
                    kind,
                    target: target.to_string(),
                });
            }
            None => argv.push(token.to_string()),
        }
    }
    if argv.is_empty() {
        return Err(ParseError::EmptyStage);
    }
    Ok(Stage { argv, redirects })
}

fn operator_text(kind: RedirectKind) -> &'static str {
    match kind {
        RedirectKind::Input => "<",
        RedirectKind::Output => ">",
        RedirectKind::Append => ">>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(stage: &Stage) -> Vec<&str> {
        stage.argv.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn single_command_no_redirects() {
        let p = parse_pipeline("ls -l /tmp").unwrap();
        assert_eq!(p.stages.len(), 1);
        assert_eq!(argv(&p.stages[0]), ["ls", "-l", "/tmp"]);
        assert!(p.stages[0].redirects.is_empty());
    }

    #[test]
    fn pipeline_preserves_stage_order() {
        let p = parse_pipeline("cat f | grep x | wc -l").unwrap();
        assert_eq!(p.stages.len(), 3);
        assert_eq!(argv(&p.stages[0]), ["cat", "f"]);
        assert_eq!(argv(&p.stages[1]), ["grep", "x"]);
        assert_eq!(argv(&p.stages[2]), ["wc", "-l"]);
    }

    #[test]
    fn redirections_are_stripped_from_argv() {
        let p = parse_pipeline("sort < in.txt > out.txt").unwrap();
        let stage = &p.stages[0];
        assert_eq!(argv(stage), ["sort"]);
        assert_eq!(stage.input().unwrap().target, "in.txt");
        let out = stage.output().unwrap();
        assert_eq!(out.kind, RedirectKind::Output);
        assert_eq!(out.target, "out.txt");
    }

    #[test]
    fn append_is_distinct_from_truncate() {
        let p = parse_pipeline("echo hi >> log.txt").unwrap();
        assert_eq!(p.stages[0].output().unwrap().kind, RedirectKind::Append);
    }

    #[test]
    fn last_redirection_of_a_kind_wins() {
        let p = parse_pipeline("cmd > first > second").unwrap();
        let stage = &p.stages[0];
        assert_eq!(stage.redirects.len(), 2);
        assert_eq!(stage.output().unwrap().target, "second");
    }

    #[test]
    fn redirect_order_mixed_with_args() {
        let p = parse_pipeline("grep < in foo > out bar").unwrap();
        assert_eq!(argv(&p.stages[0]), ["grep", "foo", "bar"]);
    }

    #[test]
    fn empty_stage_is_an_error() {
        assert_eq!(parse_pipeline("ls |"), Err(ParseError::EmptyStage));
        assert_eq!(parse_pipeline("| wc"), Err(ParseError::EmptyStage));
        assert_eq!(parse_pipeline(""), Err(ParseError::EmptyStage));
        // A stage that is nothing but a redirection has no program to run.
        assert_eq!(parse_pipeline("> out"), Err(ParseError::EmptyStage));
    }

    #[test]
    fn missing_redirect_target_is_an_error() {
        assert_eq!(
            parse_pipeline("ls >"),
            Err(ParseError::MissingRedirectTarget(">"))
        );
        assert_eq!(
            parse_pipeline("wc <"),
            Err(ParseError::MissingRedirectTarget("<"))
        );
    }

    #[test]
    fn no_quoting_whitespace_is_the_only_separator() {
        // Quotes are ordinary characters: this is the documented limitation,
        // not an accident of buffer sizes.
        let p = parse_pipeline("echo \"a b\"").unwrap();
        assert_eq!(argv(&p.stages[0]), ["echo", "\"a", "b\""]);
    }

    #[test]
    fn attached_operator_is_not_a_redirection() {
        let p = parse_pipeline("echo >out").unwrap();
        assert_eq!(argv(&p.stages[0]), ["echo", ">out"]);
        assert!(p.stages[0].redirects.is_empty());
    }
}
