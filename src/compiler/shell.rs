// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 drover contributors

//! Platform shells
//!
//! Renders a command list into a script that echoes each command before
//! running it and stops at the first failure.

use crate::pipeline::Platform;

/// Script flavour of the target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Posix,
    PowerShell,
}

impl Shell {
    pub fn for_platform(platform: &Platform) -> Self {
        if platform.is_windows() {
            Self::PowerShell
        } else {
            Self::Posix
        }
    }

    /// Program and leading arguments; the script path is appended
    pub fn command(&self) -> (String, Vec<String>) {
        match self {
            Self::Posix => ("/bin/sh".into(), vec!["-e".into()]),
            Self::PowerShell => (
                "powershell".into(),
                vec![
                    "-noprofile".into(),
                    "-noninteractive".into(),
                    "-command".into(),
                ],
            ),
        }
    }

    /// Script file extension
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Posix => "",
            Self::PowerShell => ".ps1",
        }
    }

    /// Quote one argument so the shell passes it through verbatim.
    /// Plain values are left as they are.
    pub fn quote_arg(&self, value: &str) -> String {
        let plain = !value.is_empty()
            && !value.starts_with('@')
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "-_./:@+=".contains(c));
        if plain {
            return value.to_string();
        }
        match self {
            Self::Posix => format!("'{}'", value.replace('\'', "'\\''")),
            Self::PowerShell => format!("'{}'", value.replace('\'', "''")),
        }
    }

    pub fn script<S: AsRef<str>>(&self, commands: &[S]) -> String {
        match self {
            Self::Posix => posix_script(commands),
            Self::PowerShell => powershell_script(commands),
        }
    }
}

fn posix_script<S: AsRef<str>>(commands: &[S]) -> String {
    let mut out = String::from("\nset -e\n");
    for command in commands {
        let command = command.as_ref();
        out.push_str(&format!(
            "\necho + {}\n{}\n",
            posix_echo_quote(command),
            command
        ));
    }
    out
}

fn powershell_script<S: AsRef<str>>(commands: &[S]) -> String {
    let mut out = String::from("\n$ErrorActionPreference = 'Stop';\n");
    for command in commands {
        let command = command.as_ref();
        out.push_str(&format!(
            "\necho + '{}'\n{}\nif ($LastExitCode -gt 0) {{ exit $LastExitCode }}\n",
            command.replace('\'', "''"),
            command
        ));
    }
    out
}

/// Double-quote a command for `echo` without letting the shell expand it
fn posix_echo_quote(command: &str) -> String {
    let mut out = String::with_capacity(command.len() + 2);
    out.push('"');
    for c in command.chars() {
        match c {
            '"' | '\\' | '$' | '`' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_script() {
        let script = Shell::Posix.script(&["go build", "echo $HOME"]);
        assert_eq!(
            script,
            "\nset -e\n\necho + \"go build\"\ngo build\n\necho + \"echo \\$HOME\"\necho $HOME\n"
        );
    }

    #[test]
    fn test_powershell_script() {
        let script = Shell::PowerShell.script(&["Write-Host 'hi'"]);
        assert!(script.contains("$ErrorActionPreference = 'Stop';"));
        assert!(script.contains("echo + 'Write-Host ''hi'''"));
        assert!(script.contains("if ($LastExitCode -gt 0) { exit $LastExitCode }"));
    }

    #[test]
    fn test_shell_for_platform() {
        let windows = Platform {
            os: "windows".into(),
            ..Platform::default()
        };
        let linux = Platform {
            os: "linux".into(),
            ..Platform::default()
        };

        assert_eq!(Shell::for_platform(&windows), Shell::PowerShell);
        assert_eq!(Shell::for_platform(&windows).suffix(), ".ps1");
        assert_eq!(Shell::for_platform(&linux).command().0, "/bin/sh");
        assert_eq!(Shell::for_platform(&linux).suffix(), "");
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(Shell::Posix.quote_arg("refs/heads/main"), "refs/heads/main");
        assert_eq!(Shell::Posix.quote_arg("git@host:a/b.git"), "git@host:a/b.git");
        assert_eq!(Shell::Posix.quote_arg("a b"), "'a b'");
        assert_eq!(Shell::Posix.quote_arg("it's"), "'it'\\''s'");
        assert_eq!(Shell::Posix.quote_arg(""), "''");
        assert_eq!(Shell::Posix.quote_arg("~root"), "'~root'");
        assert_eq!(Shell::PowerShell.quote_arg("@args"), "'@args'");
        assert_eq!(Shell::PowerShell.quote_arg("$(evil)"), "'$(evil)'");
        assert_eq!(Shell::PowerShell.quote_arg("it's"), "'it''s'");
    }

    #[test]
    fn test_echo_quoting_neutralizes_expansion() {
        assert_eq!(posix_echo_quote("a \"b\" `c`"), "\"a \\\"b\\\" \\`c\\`\"");
    }
}
