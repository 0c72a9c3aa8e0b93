//! Interactive-session UCI transport
//!
//! Runs one `uci` command per SSH session and parses its line output.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::command::{
    self, parse_release_field, parse_show_sections, RemoteCommand, FIREWALL_CONFIG,
};
use super::driver::{UciBackend, UciDriver};
use super::error::RouterError;
use super::rules::{REDIRECT_OPTIONS, REDIRECT_TYPE};
use super::session::SessionExecutor;
use super::TransportMode;

pub type InteractiveDriver = UciDriver<SshTransport>;

pub struct SshTransport {
    executor: Arc<dyn SessionExecutor>,
}

impl SshTransport {
    pub fn new(executor: Arc<dyn SessionExecutor>) -> Self {
        Self { executor }
    }

    /// Run one command; a non-zero remote exit is a `CommandExecution` error.
    pub async fn exec(&self, command: &RemoteCommand) -> Result<String, RouterError> {
        let output = self.executor.run(command).await?;
        if output.exit_code != 0 {
            return Err(RouterError::CommandExecution {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// `uci -q get` on an unset option exits 1; that means "absent".
    async fn get_option(&self, section: &str, option: &str) -> Result<Option<String>, RouterError> {
        match self
            .exec(&command::uci_get(FIREWALL_CONFIG, section, option))
            .await
        {
            Ok(value) => Ok(Some(value)),
            Err(RouterError::CommandExecution { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn show_firewall(&self) -> Result<Vec<(String, String)>, RouterError> {
        let output = self.exec(&command::uci_show(FIREWALL_CONFIG)).await?;
        Ok(parse_show_sections(&output, FIREWALL_CONFIG))
    }
}

impl InteractiveDriver {
    pub fn interactive(executor: Arc<dyn SessionExecutor>) -> Self {
        UciDriver::new(SshTransport::new(executor))
    }
}

#[async_trait]
impl UciBackend for SshTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Interactive
    }

    async fn probe(&self) -> Result<String, RouterError> {
        let release = self.exec(&command::read_release()).await?;
        let description = parse_release_field(&release, "DISTRIB_DESCRIPTION")
            .unwrap_or_else(|| "OpenWrt".to_string());
        Ok(format!("Connected via SSH ({})", description))
    }

    async fn section_names(&self) -> Result<Vec<String>, RouterError> {
        Ok(self
            .show_firewall()
            .await?
            .into_iter()
            .map(|(section, _)| section)
            .collect())
    }

    async fn section_type(&self, section: &str) -> Result<Option<String>, RouterError> {
        match self
            .exec(&command::uci_get_section(FIREWALL_CONFIG, section))
            .await
        {
            Ok(kind) if !kind.is_empty() => Ok(Some(kind)),
            Ok(_) | Err(RouterError::CommandExecution { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn redirect_sections(
        &self,
    ) -> Result<Vec<(String, HashMap<String, String>)>, RouterError> {
        let sections: Vec<String> = self
            .show_firewall()
            .await?
            .into_iter()
            .filter(|(_, kind)| kind == REDIRECT_TYPE)
            .map(|(section, _)| section)
            .collect();

        let mut result = Vec::with_capacity(sections.len());
        for section in sections {
            let mut options = HashMap::new();
            for option in REDIRECT_OPTIONS {
                if let Some(value) = self.get_option(&section, option).await? {
                    options.insert(option.to_string(), value);
                }
            }
            result.push((section, options));
        }

        tracing::debug!("[SshUci] Read {} redirect sections", result.len());
        Ok(result)
    }

    async fn add_section(&self, section_type: &str) -> Result<String, RouterError> {
        let output = self
            .exec(&command::uci_add(FIREWALL_CONFIG, section_type))
            .await?;
        let section = output.lines().next().unwrap_or_default().trim().to_string();
        if section.is_empty() {
            return Err(RouterError::CommandExecution {
                exit_code: 0,
                stderr: "uci add returned no section id".to_string(),
            });
        }
        Ok(section)
    }

    async fn rename_section(&self, section: &str, name: &str) -> Result<(), RouterError> {
        self.exec(&command::uci_rename(FIREWALL_CONFIG, section, name))
            .await
            .map(|_| ())
    }

    async fn set_option(&self, section: &str, option: &str, value: &str) -> Result<(), RouterError> {
        self.exec(&command::uci_set(FIREWALL_CONFIG, section, option, value))
            .await
            .map(|_| ())
    }

    async fn delete_section(&self, section: &str) -> Result<(), RouterError> {
        self.exec(&command::uci_delete(FIREWALL_CONFIG, section))
            .await
            .map(|_| ())
    }

    async fn commit(&self) -> Result<(), RouterError> {
        self.exec(&command::uci_commit(FIREWALL_CONFIG))
            .await
            .map(|_| ())
    }

    async fn reload_firewall(&self) -> Result<(), RouterError> {
        self.exec(&command::firewall_reload()).await.map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::router::driver::RouterDriver;
    use crate::router::rules::{Protocol, RuleInput, RulePatch};
    use crate::router::session::CommandOutput;
    use std::sync::Mutex;

    /// Scripted router: answers by `uci` subcommand and records every command.
    #[derive(Default)]
    pub(crate) struct FakeRouter {
        pub commands: Mutex<Vec<RemoteCommand>>,
        pub show_output: String,
        pub options: HashMap<String, String>,
        pub reject_auth: bool,
        pub fail_reload: bool,
        pub fail_set_option: Option<String>,
    }

    impl FakeRouter {
        pub fn rendered(&self) -> Vec<String> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .map(RemoteCommand::render)
                .collect()
        }

        /// `uci get firewall.<sid>` answers with the type from `show_output`
        fn section_kind(&self, path: &str) -> Option<String> {
            let section = path.strip_prefix("firewall.")?;
            parse_show_sections(&self.show_output, FIREWALL_CONFIG)
                .into_iter()
                .find(|(name, _)| name == section)
                .map(|(_, kind)| kind)
        }

        pub fn subcommands(&self) -> Vec<String> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .map(|c| {
                    c.uci_subcommand()
                        .map(String::from)
                        .unwrap_or_else(|| c.program.clone())
                })
                .collect()
        }
    }

    fn ok(stdout: &str) -> Result<CommandOutput, RouterError> {
        Ok(CommandOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    fn exit(code: i32, stderr: &str) -> Result<CommandOutput, RouterError> {
        Ok(CommandOutput {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    #[async_trait]
    impl SessionExecutor for FakeRouter {
        async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput, RouterError> {
            self.commands.lock().unwrap().push(command.clone());

            if self.reject_auth {
                return Err(RouterError::TransportUnavailable(
                    "SSH authentication rejected".to_string(),
                ));
            }

            if command.program == "cat" {
                return ok("DISTRIB_ID='OpenWrt'\nDISTRIB_DESCRIPTION='OpenWrt 23.05.3'");
            }
            if command.program == "/etc/init.d/firewall" {
                return if self.fail_reload {
                    exit(1, "fw4: reload failed")
                } else {
                    ok("")
                };
            }

            match command.uci_subcommand() {
                Some("show") => ok(&self.show_output),
                Some("get") => {
                    let path = command.args.last().cloned().unwrap_or_default();
                    match self.options.get(&path).cloned().or_else(|| self.section_kind(&path)) {
                        Some(v) => ok(&v),
                        None => exit(1, ""),
                    }
                }
                Some("add") => ok("cfg0f1a2b"),
                Some("set") => {
                    let arg = command.args.last().cloned().unwrap_or_default();
                    match &self.fail_set_option {
                        Some(opt) if arg.contains(&format!(".{}=", opt)) => {
                            exit(1, "uci: Invalid argument")
                        }
                        _ => ok(""),
                    }
                }
                Some(_) => ok(""),
                None => exit(127, "not found"),
            }
        }
    }

    fn driver(router: Arc<FakeRouter>) -> InteractiveDriver {
        InteractiveDriver::interactive(router)
    }

    fn web_rule() -> RuleInput {
        RuleInput {
            name: "web".to_string(),
            protocol: Protocol::Tcp,
            external_port: 8080,
            internal_ip: "10.0.0.5".to_string(),
            internal_port: 80,
        }
    }

    #[tokio::test]
    async fn test_add_rule_command_sequence() {
        let router = Arc::new(FakeRouter {
            show_output: "firewall.cfg01e63d=defaults".to_string(),
            ..Default::default()
        });
        let outcome = driver(router.clone()).add_rule(&web_rule()).await.unwrap();

        assert_eq!(outcome.native_id, "web");
        assert!(outcome.warning.is_none());

        let mut expected = vec!["show", "add", "rename"];
        expected.extend(std::iter::repeat("set").take(8));
        expected.extend(["commit", "/etc/init.d/firewall"]);
        assert_eq!(router.subcommands(), expected);

        let rendered = router.rendered();
        assert_eq!(rendered[1], "uci add firewall redirect");
        assert_eq!(rendered[2], "uci rename firewall.cfg0f1a2b=web");
        assert_eq!(rendered[3], "uci set firewall.web.target=DNAT");
        assert_eq!(rendered[7], "uci set firewall.web.src_dport=8080");
        assert_eq!(rendered[8], "uci set firewall.web.dest_ip=10.0.0.5");
        assert_eq!(rendered[10], "uci set firewall.web.enabled=1");
    }

    #[tokio::test]
    async fn test_add_rule_avoids_existing_name() {
        let router = Arc::new(FakeRouter {
            show_output: "firewall.web=redirect\nfirewall.web.name='web'".to_string(),
            ..Default::default()
        });
        let outcome = driver(router.clone()).add_rule(&web_rule()).await.unwrap();
        assert_eq!(outcome.native_id, "web_2");
    }

    #[tokio::test]
    async fn test_invalid_rule_issues_no_commands() {
        let router = Arc::new(FakeRouter::default());
        let mut rule = web_rule();
        rule.internal_ip = "999.1.1.1".to_string();

        let err = driver(router.clone()).add_rule(&rule).await.unwrap_err();
        assert!(matches!(err, RouterError::Validation { field: "internalIp", .. }));
        assert!(router.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reload_failure_is_non_fatal() {
        let router = Arc::new(FakeRouter {
            fail_reload: true,
            ..Default::default()
        });
        let outcome = driver(router).add_rule(&web_rule()).await.unwrap();
        assert_eq!(outcome.native_id, "web");
        assert!(outcome.warning.unwrap().contains("reload"));
    }

    #[tokio::test]
    async fn test_failed_set_returns_section_id() {
        let router = Arc::new(FakeRouter {
            fail_set_option: Some("dest_ip".to_string()),
            ..Default::default()
        });
        let err = driver(router.clone()).add_rule(&web_rule()).await.unwrap_err();

        match err {
            RouterError::IncompleteRule { native_id, source } => {
                assert_eq!(native_id, "web");
                assert!(matches!(*source, RouterError::CommandExecution { exit_code: 1, .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!router.subcommands().contains(&"commit".to_string()));
    }

    #[tokio::test]
    async fn test_list_rules_reads_each_field() {
        let mut options = HashMap::new();
        for (k, v) in [
            ("firewall.web.name", "Web"),
            ("firewall.web.target", "DNAT"),
            ("firewall.web.proto", "tcp"),
            ("firewall.web.src_dport", "8080"),
            ("firewall.web.dest_ip", "10.0.0.5"),
            ("firewall.web.dest_port", "80"),
            ("firewall.cfg0b3e1a.target", "DNAT"),
            ("firewall.cfg0b3e1a.proto", "udp"),
            ("firewall.cfg0b3e1a.src_dport", "51820"),
            ("firewall.cfg0b3e1a.dest_ip", "10.0.0.7"),
            ("firewall.cfg0b3e1a.enabled", "0"),
        ] {
            options.insert(k.to_string(), v.to_string());
        }

        let router = Arc::new(FakeRouter {
            show_output: "firewall.cfg01e63d=defaults\nfirewall.web=redirect\nfirewall.cfg0b3e1a=redirect"
                .to_string(),
            options,
            ..Default::default()
        });
        let rules = driver(router.clone()).list_rules().await.unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "Web");
        assert_eq!(rules[0].native_id.as_deref(), Some("web"));
        assert!(rules[0].enabled);
        assert_eq!(rules[1].name, "Rule cfg0b3e1a");
        assert_eq!(rules[1].protocol, Protocol::Udp);
        assert_eq!(rules[1].internal_port, 51820);
        assert!(!rules[1].enabled);

        // one show + one getter per option per section
        assert_eq!(router.commands.lock().unwrap().len(), 1 + 2 * REDIRECT_OPTIONS.len());
    }

    #[tokio::test]
    async fn test_delete_and_set_enabled() {
        let router = Arc::new(FakeRouter {
            show_output: "firewall.web=redirect".to_string(),
            ..Default::default()
        });
        let driver = driver(router.clone());

        driver.delete_rule("web").await.unwrap();
        driver.set_enabled("web", false).await.unwrap();

        assert_eq!(
            router.rendered(),
            vec![
                "uci -q get firewall.web",
                "uci delete firewall.web",
                "uci commit firewall",
                "/etc/init.d/firewall reload",
                "uci -q get firewall.web",
                "uci set firewall.web.enabled=0",
                "uci commit firewall",
                "/etc/init.d/firewall reload",
            ]
        );
    }

    #[tokio::test]
    async fn test_mutations_refuse_non_redirect_sections() {
        let router = Arc::new(FakeRouter {
            show_output: "firewall.lan=zone\nfirewall.lan.name='lan'".to_string(),
            ..Default::default()
        });
        let driver = driver(router.clone());

        for id in ["lan", "missing"] {
            let err = driver.delete_rule(id).await.unwrap_err();
            assert!(matches!(err, RouterError::Validation { field: "nativeId", .. }));
        }
        let err = driver.set_enabled("lan", false).await.unwrap_err();
        assert!(matches!(err, RouterError::Validation { field: "nativeId", .. }));

        assert!(router.subcommands().iter().all(|c| c == "get"));
    }

    #[tokio::test]
    async fn test_update_rejects_bad_section_and_empty_patch_is_noop() {
        let router = Arc::new(FakeRouter::default());
        let driver = driver(router.clone());

        let err = driver
            .update_rule("web;reboot", &RulePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Validation { field: "nativeId", .. }));

        driver.update_rule("web", &RulePatch::default()).await.unwrap();
        assert!(router.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_probe_reports_release() {
        let router = Arc::new(FakeRouter::default());
        let message = driver(router).test_connection().await.unwrap();
        assert_eq!(message, "Connected via SSH (OpenWrt 23.05.3)");
    }

    #[tokio::test]
    async fn test_auth_failure_is_transport_unavailable() {
        let router = Arc::new(FakeRouter {
            reject_auth: true,
            ..Default::default()
        });
        let err = driver(router).test_connection().await.unwrap_err();
        assert!(matches!(err, RouterError::TransportUnavailable(_)));
    }
}
