use crate::exec::ExitCode;
use crate::interpreter::Shell;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// directly in-process without spawning a child: they observe and mutate the
/// interpreter's own state (working directory, variables, job table), which
/// would be lost in a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "jobs".
    fn name() -> &'static str;

    /// Executes the command against the interpreter state.
    ///
    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode>;
}

/// Object-safe form of a builtin whose arguments have already been parsed.
pub(crate) trait BuiltinInvocation {
    fn invoke(self: Box<Self>, stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> BuiltinInvocation for T {
    fn invoke(self: Box<Self>, stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode> {
        match T::execute(*self, stdout, shell) {
            Ok(x) => Ok(x),
            Err(e) => {
                writeln!(stdout, "{e}")?;
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl BuiltinInvocation for InvalidArgs {
    fn invoke(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _shell: &mut Shell,
    ) -> Result<ExitCode> {
        stdout.write_all(self.output.as_bytes())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

fn create<T: BuiltinCommand + 'static>(
    name: &str,
    args: &[&str],
) -> Option<Box<dyn BuiltinInvocation>> {
    if name != T::name() {
        return None;
    }
    Some(match T::from_args(&[name], args) {
        Ok(cmd) => Box::new(cmd),
        Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
            output,
            is_error: status.is_err(),
        }),
    })
}

/// Match `name` against the recognized builtins and parse `args` for it.
///
/// Returns `None` when `name` is not a builtin, in which case the caller
/// should treat the command as external.
pub(crate) fn lookup(name: &str, args: &[&str]) -> Option<Box<dyn BuiltinInvocation>> {
    create::<Exit>(name, args)
        .or_else(|| create::<Cd>(name, args))
        .or_else(|| create::<Pwd>(name, args))
        .or_else(|| create::<Help>(name, args))
        .or_else(|| create::<Set>(name, args))
        .or_else(|| create::<JobsList>(name, args))
        .or_else(|| create::<Fg>(name, args))
        .or_else(|| create::<Kill>(name, args))
}

#[derive(FromArgs)]
/// Exit the interpreter.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode> {
        shell.env.should_exit = true;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => {
                if let Some(home) = shell.env.get_var("HOME") {
                    PathBuf::from(home)
                } else {
                    return Err(anyhow::anyhow!("cd: no target and HOME not set"));
                }
            }
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            shell.env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't chdir to {}", new_dir.display()))?;

        // Only the interpreter's view changes; children are spawned with an
        // explicit working directory, so no process-wide chdir is needed.
        shell.env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode> {
        writeln!(stdout, "{}", shell.env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the interpreter's builtins.
pub struct Help {}

impl BuiltinCommand for Help {
    fn name() -> &'static str {
        "help"
    }

    fn execute(self, stdout: &mut dyn Write, _shell: &mut Shell) -> Result<ExitCode> {
        writeln!(stdout, "builtins:")?;
        writeln!(stdout, "  cd [dir]     change the working directory")?;
        writeln!(stdout, "  pwd          print the working directory")?;
        writeln!(stdout, "  set          list variables")?;
        writeln!(stdout, "  jobs         list background jobs")?;
        writeln!(stdout, "  fg <id>      wait for a background job")?;
        writeln!(stdout, "  kill <id>    forcibly terminate a background job")?;
        writeln!(stdout, "  help         this text")?;
        writeln!(stdout, "  exit         leave the interpreter")?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List the interpreter's variables as NAME=VALUE, one per line.
pub struct Set {}

impl BuiltinCommand for Set {
    fn name() -> &'static str {
        "set"
    }

    fn execute(self, stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode> {
        let mut names: Vec<&String> = shell.env.vars.keys().collect();
        names.sort();
        for name in names {
            writeln!(stdout, "{}={}", name, shell.env.vars[name])?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List background jobs, running and done, in start order.
pub struct JobsList {}

impl BuiltinCommand for JobsList {
    fn name() -> &'static str {
        "jobs"
    }

    fn execute(self, stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode> {
        for job in shell.jobs.list() {
            writeln!(
                stdout,
                "[{}] pid={} {}  {}",
                job.id(),
                job.pid(),
                job.state(),
                job.command()
            )?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Bring a background job to the foreground: block until it terminates.
pub struct Fg {
    #[argh(positional)]
    /// the job id as shown by `jobs`
    pub id: usize,
}

impl BuiltinCommand for Fg {
    fn name() -> &'static str {
        "fg"
    }

    fn execute(self, stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode> {
        let code = shell.jobs.bring_to_foreground(self.id)?;
        writeln!(stdout, "job [{}] done (status {code})", self.id)?;
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Forcibly terminate a background job. No drain period: the job's processes
/// receive SIGKILL.
pub struct Kill {
    #[argh(positional)]
    /// the job id as shown by `jobs`
    pub id: usize,
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn execute(self, stdout: &mut dyn Write, shell: &mut Shell) -> Result<ExitCode> {
        shell.jobs.terminate(self.id)?;
        writeln!(stdout, "job [{}] killed", self.id)?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(shell: &mut Shell, name: &str, args: &[&str]) -> (ExitCode, String) {
        let cmd = lookup(name, args).expect("builtin not found");
        let mut out = Vec::new();
        let code = cmd.invoke(&mut out, shell).expect("builtin failed");
        (code, String::from_utf8(out).expect("utf8"))
    }

    #[test]
    fn unknown_names_are_not_builtins() {
        assert!(lookup("ls", &[]).is_none());
        assert!(lookup("frobnicate", &[]).is_none());
    }

    #[test]
    fn exit_sets_the_flag() {
        let mut shell = Shell::new();
        let (code, _) = invoke(&mut shell, "exit", &[]);
        assert_eq!(code, 0);
        assert!(shell.env.should_exit);
    }

    #[test]
    #[cfg(unix)]
    fn cd_updates_the_interpreter_view() {
        let mut shell = Shell::new();
        let (code, _) = invoke(&mut shell, "cd", &["/"]);
        assert_eq!(code, 0);
        assert_eq!(shell.env.current_dir, std::path::Path::new("/"));
    }

    #[test]
    fn cd_to_missing_directory_reports_and_fails() {
        let mut shell = Shell::new();
        let (code, out) = invoke(&mut shell, "cd", &["/no/such/dir/jobsh"]);
        assert_eq!(code, 1);
        assert!(out.contains("cd: can't chdir"));
    }

    #[test]
    fn pwd_prints_the_working_directory() {
        let mut shell = Shell::new();
        let expected = format!("{}\n", shell.env.current_dir.to_string_lossy());
        let (code, out) = invoke(&mut shell, "pwd", &[]);
        assert_eq!(code, 0);
        assert_eq!(out, expected);
    }

    #[test]
    fn set_lists_variables() {
        let mut shell = Shell::new();
        shell.env.set_var("JOBSH_TEST_VAR", "42");
        let (code, out) = invoke(&mut shell, "set", &[]);
        assert_eq!(code, 0);
        assert!(out.lines().any(|l| l == "JOBSH_TEST_VAR=42"));
    }

    #[test]
    fn fg_with_invalid_id_reports_without_side_effects() {
        let mut shell = Shell::new();
        let (code, out) = invoke(&mut shell, "fg", &["3"]);
        assert_eq!(code, 1);
        assert!(out.contains("invalid job id"));
    }

    #[test]
    fn kill_with_invalid_id_reports() {
        let mut shell = Shell::new();
        let (code, out) = invoke(&mut shell, "kill", &["0"]);
        assert_eq!(code, 1);
        assert!(out.contains("invalid job id"));
    }

    #[test]
    fn bad_arguments_are_reported_not_fatal() {
        let mut shell = Shell::new();
        // fg requires a numeric id
        let (code, _) = invoke(&mut shell, "fg", &["not-a-number"]);
        assert_eq!(code, 1);
    }

    #[test]
    #[cfg(unix)]
    fn jobs_lists_table_entries() {
        let mut shell = Shell::new();
        let child = std::process::Command::new("true").spawn().unwrap();
        shell.jobs.add(child, Vec::new(), "true".into()).unwrap();
        let (code, out) = invoke(&mut shell, "jobs", &[]);
        assert_eq!(code, 0);
        assert!(out.starts_with("[1] pid="));
        assert!(out.contains("true"));
        let _ = shell.jobs.bring_to_foreground(1);
    }
}
