use std::io::{self, Write};

use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::cli::Cli;

#[derive(Debug, Clone, Args)]
pub struct CompletionsCommand {
    #[arg(value_enum, help = "Target shell for completion script")]
    pub shell: Shell,
}

impl CompletionsCommand {
    pub fn execute(self) {
        self.write_to(&mut io::stdout());
    }

    /// Write the completion script for the whole `awsmfa` command tree.
    fn write_to(&self, out: &mut dyn Write) {
        let mut cmd = Cli::command();
        let bin = cmd.get_name().to_string();
        clap_complete::generate(self.shell, &mut cmd, bin, out);
    }

    #[cfg(test)]
    fn generate_to_string(&self) -> String {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer);
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        CompletionsCommand { shell }.generate_to_string()
    }

    #[test]
    fn test_bash_completion() {
        let result = script(Shell::Bash);
        assert!(result.contains("_awsmfa()"));
        assert!(result.contains("complete -F _awsmfa"));
    }

    #[test]
    fn test_zsh_completion() {
        assert!(script(Shell::Zsh).contains("#compdef awsmfa"));
    }

    #[test]
    fn test_fish_completion() {
        assert!(script(Shell::Fish).contains("complete -c awsmfa"));
    }

    #[test]
    fn test_completion_contains_subcommands() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let result = script(shell);
            for sub in ["exec", "env", "completions"] {
                assert!(result.contains(sub), "{sub} missing from {shell} completions");
            }
        }
    }

    #[test]
    fn test_completion_contains_session_options() {
        let result = script(Shell::Bash);
        for flag in ["--config", "--local", "--cache-dir", "--timeout", "--digits-only"] {
            assert!(result.contains(flag), "{flag} missing from completions");
        }
    }
}
