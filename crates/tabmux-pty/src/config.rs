use std::path::PathBuf;

use tabmux_core::Shell;

/// How to start the process behind each session.
#[derive(Clone, Debug, Default)]
pub struct PtyConfig {
    /// Program to run. `None` means the user's default shell.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Extra environment on top of the inherited one.
    pub env: Vec<(String, String)>,
}

impl PtyConfig {
    /// Run a specific program.
    pub fn command(program: impl Into<String>) -> Self {
        Self {
            command: Some(program.into()),
            ..Self::default()
        }
    }

    /// Run the shell chosen in settings.
    pub fn for_shell(shell: Shell) -> Self {
        Self::command(shell.program())
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The program that will actually be launched.
    pub fn program(&self) -> String {
        self.command.clone().unwrap_or_else(default_shell)
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    if cfg!(target_os = "windows") {
        return "powershell.exe".to_string();
    }
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}
