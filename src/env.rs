use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of variables visible to executed commands and to `$NAME`
///   expansion.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit`: a flag the REPL loop checks to know when to terminate.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that an interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes
    /// `current_dir` from `std::env::current_dir()`.
    pub fn new() -> Self {
        let mut vars = HashMap::new();
        for (k, v) in stdenv::vars() {
            vars.insert(k, v);
        }
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            should_exit: false,
        }
    }

    /// Get the value of a variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override a variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Substitute every `$NAME` occurrence in `input` with the variable's
    /// value, or the empty string when the name is unset.
    ///
    /// A name is an ASCII letter or underscore followed by letters, digits
    /// and underscores. A `$` not followed by a name character is kept
    /// literally. Expansion happens once, on the whole logical input, before
    /// any tokenization — the pipeline parser never sees a `$`-form it has
    /// to interpret.
    pub fn expand(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            let mut name = String::new();
            while let Some(&n) = chars.peek() {
                let valid = if name.is_empty() {
                    n.is_ascii_alphabetic() || n == '_'
                } else {
                    n.is_ascii_alphanumeric() || n == '_'
                };
                if !valid {
                    break;
                }
                name.push(n);
                chars.next();
            }
            if name.is_empty() {
                out.push('$');
            } else if let Some(value) = self.get_var(&name) {
                out.push_str(&value);
            }
        }
        out
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env as stdenv;

    fn empty_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            should_exit: false,
        }
    }

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = empty_env();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn expand_replaces_known_names() {
        let mut env = empty_env();
        env.set_var("GREETING", "hello");
        assert_eq!(env.expand("echo $GREETING world"), "echo hello world");
    }

    #[test]
    fn expand_unset_names_become_empty() {
        let env = empty_env();
        assert_eq!(env.expand("echo [$NOPE_XYZ_123]"), "echo []");
    }

    #[test]
    fn expand_name_ends_at_non_identifier() {
        let mut env = empty_env();
        env.set_var("F", "file");
        assert_eq!(env.expand("cat $F.txt"), "cat file.txt");
    }

    #[test]
    fn lone_dollar_is_literal() {
        let env = empty_env();
        assert_eq!(env.expand("cost is 5$ total"), "cost is 5$ total");
        assert_eq!(env.expand("$"), "$");
    }
}
