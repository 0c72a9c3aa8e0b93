//! Structured remote commands
//!
//! Commands are kept as argv until the last moment; `render` single-quotes
//! every argument for the remote shell.

use std::fmt;

/// UCI configuration file holding port forwards
pub const FIREWALL_CONFIG: &str = "firewall";

const UCI: &str = "uci";
const FIREWALL_INIT: &str = "/etc/init.d/firewall";
const RELEASE_FILE: &str = "/etc/openwrt_release";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RemoteCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Command line for the remote shell, every word single-quoted
    pub fn render(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `uci` subcommand, if this is a uci invocation (`-q` is skipped)
    pub fn uci_subcommand(&self) -> Option<&str> {
        if self.program != UCI {
            return None;
        }
        self.args
            .iter()
            .map(String::as_str)
            .find(|a| !a.starts_with('-'))
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=@".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

// ============================================================================
// UCI command builders
// ============================================================================

pub fn uci_show(config: &str) -> RemoteCommand {
    RemoteCommand::new(UCI, ["show", config])
}

/// `uci -q get` exits non-zero without noise when the option is unset
pub fn uci_get(config: &str, section: &str, option: &str) -> RemoteCommand {
    RemoteCommand::new(UCI, ["-q".to_string(), "get".to_string(), format!("{}.{}.{}", config, section, option)])
}

pub fn uci_get_section(config: &str, section: &str) -> RemoteCommand {
    RemoteCommand::new(UCI, ["-q".to_string(), "get".to_string(), format!("{}.{}", config, section)])
}

pub fn uci_add(config: &str, section_type: &str) -> RemoteCommand {
    RemoteCommand::new(UCI, ["add", config, section_type])
}

pub fn uci_rename(config: &str, section: &str, name: &str) -> RemoteCommand {
    RemoteCommand::new(UCI, ["rename".to_string(), format!("{}.{}={}", config, section, name)])
}

pub fn uci_set(config: &str, section: &str, option: &str, value: &str) -> RemoteCommand {
    RemoteCommand::new(
        UCI,
        ["set".to_string(), format!("{}.{}.{}={}", config, section, option, value)],
    )
}

pub fn uci_delete(config: &str, section: &str) -> RemoteCommand {
    RemoteCommand::new(UCI, ["delete".to_string(), format!("{}.{}", config, section)])
}

pub fn uci_commit(config: &str) -> RemoteCommand {
    RemoteCommand::new(UCI, ["commit", config])
}

pub fn firewall_reload() -> RemoteCommand {
    RemoteCommand::new(FIREWALL_INIT, ["reload"])
}

pub fn read_release() -> RemoteCommand {
    RemoteCommand::new("cat", [RELEASE_FILE])
}

/// `(section, type)` headers from `uci show <config>` output
/// (lines of the form `firewall.cfg0a1b2c=redirect`).
pub fn parse_show_sections(output: &str, config: &str) -> Vec<(String, String)> {
    let prefix = format!("{}.", config);
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix(&prefix)?;
            let (section, kind) = rest.split_once('=')?;
            if section.contains('.') {
                return None;
            }
            Some((section.to_string(), kind.trim().trim_matches('\'').to_string()))
        })
        .collect()
}

/// `KEY='value'` lookup in an os-release style file
pub fn parse_release_field(output: &str, key: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (k, v) = line.trim().split_once('=')?;
        if k != key {
            return None;
        }
        let v = v.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
        if v.is_empty() {
            None
        } else {
            Some(v)
        }
    })
}
