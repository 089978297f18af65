use crate::conditional;
use crate::env::Environment;
use crate::exec::{self, LaunchOutcome};
use crate::jobs::{JobState, JobTable};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// The interpreter's process-lifetime state: the variable store and the job
/// table, with one owner and no ambient globals.
///
/// Created at startup and dropped on exit; nothing is persisted. The job
/// table is the single piece of state shared between the launcher, the
/// reaper and the job-control builtins, and all of them reach it through
/// this one struct, so their accesses are serialized by construction.
#[derive(Debug, Default)]
pub struct Shell {
    pub env: Environment,
    pub jobs: JobTable,
}

impl Shell {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
            jobs: JobTable::new(),
        }
    }
}

/// The interactive front end: prompt display, line reading, multi-line
/// `if` block assembly, and dispatch into the execution core.
///
/// Example
/// ```no_run
/// use jobsh::Interpreter;
/// let mut sh = Interpreter::new();
/// sh.run_input("echo hello | sort");
/// ```
#[derive(Debug, Default)]
pub struct Interpreter {
    shell: Shell,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            shell: Shell::new(),
        }
    }

    /// Direct access to the interpreter state, mainly for embedding and tests.
    pub fn shell_mut(&mut self) -> &mut Shell {
        &mut self.shell
    }

    /// Run one logical input: either a single command line or a whole
    /// `if ... fi` block.
    ///
    /// Variable expansion happens here, once, on the full text; everything
    /// downstream sees expanded strings only. Ordinary lines are split on
    /// `;` and run strictly sequentially; a trailing `&` marks a command as
    /// background and is stripped before parsing. Failures are reported and
    /// never end the interpreter.
    pub fn run_input(&mut self, raw: &str) {
        let text = self.shell.env.expand(raw);
        if first_token_is_if(&text) {
            if let Err(e) = conditional::evaluate_block(&mut self.shell, &text) {
                eprintln!("jobsh: {e}");
            }
            return;
        }
        for piece in text.split(';') {
            let mut command = piece.trim();
            if command.is_empty() {
                continue;
            }
            if let Some((name, value)) = parse_assignment(command) {
                self.shell.env.set_var(name, value);
                continue;
            }
            let background = command.ends_with('&');
            if background {
                command = command[..command.len() - 1].trim_end();
                if command.is_empty() {
                    continue;
                }
            }
            match exec::execute_line(&mut self.shell, command, background) {
                // The launcher registers the job; reporting it is this loop's
                // job, so the message is printed exactly once.
                Ok(LaunchOutcome::Background { job_id, pid }) => println!("[{job_id}] {pid}"),
                Ok(LaunchOutcome::Exited(_)) => {}
                Err(e) => eprintln!("jobsh: {e}"),
            }
            if self.shell.env.should_exit {
                break;
            }
        }
    }

    /// The Read-Eval-Print Loop.
    ///
    /// Before each prompt the reaper runs, so finished background jobs are
    /// reported without ever blocking interactive input. Ctrl-C abandons the
    /// current line; Ctrl-D or the `exit` builtin ends the loop.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        loop {
            self.report_finished_jobs();
            match rl.readline("jobsh> ") {
                Ok(line) => {
                    let input = if first_token_is_if(&line) {
                        match read_block(&mut rl, line) {
                            Ok(block) => block,
                            Err(ReadlineError::Eof) => {
                                eprintln!("jobsh: unexpected end of input inside `if` block");
                                break;
                            }
                            Err(e) => return Err(e),
                        }
                    } else {
                        line
                    };
                    if input.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(input.as_str())?;
                    self.run_input(&input);
                    if self.shell.env.should_exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("Interrupted");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    eprintln!("jobsh: {err:?}");
                    break;
                }
            }
        }
        Ok(())
    }

    fn report_finished_jobs(&mut self) {
        let running: Vec<usize> = self
            .shell
            .jobs
            .list()
            .filter(|j| j.state() == JobState::Running)
            .map(|j| j.id())
            .collect();
        if self.shell.jobs.reap_finished() == 0 {
            return;
        }
        for job in self.shell.jobs.list() {
            if job.state() == JobState::Done && running.contains(&job.id()) {
                println!("[{}] done  {}", job.id(), job.command());
            }
        }
    }
}

/// Keep reading continuation lines until a bare `fi` closes the block.
fn read_block(rl: &mut DefaultEditor, first: String) -> rustyline::Result<String> {
    let mut block = first;
    loop {
        let line = rl.readline("> ")?;
        block.push('\n');
        block.push_str(&line);
        if line.trim() == "fi" {
            return Ok(block);
        }
    }
}

fn first_token_is_if(text: &str) -> bool {
    text.split_whitespace().next() == Some("if")
}

/// Recognize a bare `NAME=value` line (one token, identifier name).
fn parse_assignment(command: &str) -> Option<(&str, &str)> {
    if command.contains(char::is_whitespace) {
        return None;
    }
    let (name, value) = command.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_detection_is_token_based() {
        assert!(first_token_is_if("if true"));
        assert!(first_token_is_if("  if true"));
        assert!(!first_token_is_if("iffy true"));
        assert!(!first_token_is_if("echo if"));
        assert!(!first_token_is_if(""));
    }

    #[test]
    fn assignments_are_single_identifier_tokens() {
        assert_eq!(parse_assignment("FOO=bar"), Some(("FOO", "bar")));
        assert_eq!(parse_assignment("_x1=2"), Some(("_x1", "2")));
        assert_eq!(parse_assignment("FOO="), Some(("FOO", "")));
        assert_eq!(parse_assignment("1FOO=bar"), None);
        assert_eq!(parse_assignment("=bar"), None);
        assert_eq!(parse_assignment("FOO = bar"), None);
        assert_eq!(parse_assignment("ls -l"), None);
    }

    #[cfg(unix)]
    mod execution {
        use super::*;
        use crate::jobs::JobState;
        use std::fs;
        use tempfile::TempDir;

        #[test]
        fn assignment_feeds_later_expansion() {
            let dir = TempDir::new().unwrap();
            let out = dir.path().join("out.txt");
            let mut sh = Interpreter::new();
            sh.run_input("GREETING=hello");
            sh.run_input(&format!("echo $GREETING > {}", out.display()));
            assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
        }

        #[test]
        fn semicolon_commands_run_sequentially() {
            let dir = TempDir::new().unwrap();
            let out = dir.path().join("out.txt");
            let mut sh = Interpreter::new();
            sh.run_input(&format!(
                "echo a > {p}; echo b >> {p}",
                p = out.display()
            ));
            assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\n");
        }

        #[test]
        fn trailing_ampersand_backgrounds_the_command() {
            let mut sh = Interpreter::new();
            sh.run_input("sleep 30 &");
            let shell = sh.shell_mut();
            let job = shell.jobs.list().next().expect("job registered");
            assert_eq!(job.state(), JobState::Running);
            assert_eq!(job.command(), "sleep 30");
            let id = job.id();
            shell.jobs.terminate(id).unwrap();
        }

        #[test]
        fn exit_stops_the_remaining_commands() {
            let dir = TempDir::new().unwrap();
            let out = dir.path().join("out.txt");
            let mut sh = Interpreter::new();
            sh.run_input(&format!("exit; echo x > {}", out.display()));
            assert!(sh.shell_mut().env.should_exit);
            assert!(!out.exists());
        }

        #[test]
        fn whole_if_block_goes_through_the_evaluator() {
            let dir = TempDir::new().unwrap();
            let out = dir.path().join("out.txt");
            let mut sh = Interpreter::new();
            sh.run_input(&format!(
                "if true\nthen\necho yes > {}\nfi",
                out.display()
            ));
            assert_eq!(fs::read_to_string(&out).unwrap(), "yes\n");
        }
    }
}
