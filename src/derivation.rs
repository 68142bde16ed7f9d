//! Task derivation rules
//!
//! Each successful tool run may spawn follow-up tasks. Port scans that find a
//! web service fan out into directory brute-forcing and parameter fuzzing;
//! directory findings lead to injection probing; the last two stages are
//! leaves. Every stage only recurses when it found something actionable.

use crate::{
    contract::{Findings, PortFinding, PortState, ToolResult},
    scope::bare_host,
    task::{Task, ToolKind},
};

/// Tasks and informational notes produced by one completed task
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Derivation {
    pub tasks: Vec<Task>,
    pub notes: Vec<String>,
}

/// Apply the rule for `task.tool` to a successful `result`
pub fn derive(task: &Task, result: &ToolResult) -> Derivation {
    if !result.success {
        return Derivation::default();
    }

    match (task.tool, &result.findings) {
        (ToolKind::PortScan, Findings::Ports(ports)) => derive_from_ports(task, ports),
        (ToolKind::DirectoryBruteForce, Findings::Paths(paths)) => {
            if paths.is_empty() {
                Derivation {
                    tasks: Vec::new(),
                    notes: vec![format!("No directories found at {}", task.target)],
                }
            } else {
                Derivation {
                    tasks: vec![Task::derived_from(task, ToolKind::InjectionProbe, task.target.clone())],
                    notes: Vec::new(),
                }
            }
        }
        (ToolKind::ParameterFuzz, _) | (ToolKind::InjectionProbe, _) => Derivation::default(),
        _ => Derivation::default(),
    }
}

fn derive_from_ports(task: &Task, ports: &[PortFinding]) -> Derivation {
    let web: Vec<&PortFinding> = ports.iter().filter(|p| is_http_like(p)).collect();
    if web.is_empty() {
        return Derivation::default();
    }

    let scheme = if web.iter().any(|p| is_https(p)) { "https" } else { "http" };
    let base_url = format!("{}://{}", scheme, url_host(&task.target));

    Derivation {
        tasks: vec![
            Task::derived_from(task, ToolKind::DirectoryBruteForce, base_url.clone()),
            Task::derived_from(task, ToolKind::ParameterFuzz, base_url),
        ],
        notes: Vec::new(),
    }
}

/// Open port on 80/443 or advertising an http/https service
pub fn is_http_like(port: &PortFinding) -> bool {
    if port.state != PortState::Open {
        return false;
    }
    matches!(port.port, 80 | 443)
        || matches!(service_name(port).as_deref(), Some("http") | Some("https"))
}

fn is_https(port: &PortFinding) -> bool {
    port.port == 443 || service_name(port).as_deref() == Some("https")
}

fn service_name(port: &PortFinding) -> Option<String> {
    port.service.as_ref().map(|s| s.trim().to_lowercase())
}

// IPv6 literals need brackets inside a URL authority
fn url_host(target: &str) -> String {
    let host = bare_host(target);
    if host.contains(':') {
        format!("[{}]", host)
    } else {
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(findings: Findings) -> ToolResult {
        ToolResult::success(findings)
    }

    #[test]
    fn test_https_port_without_service() {
        let task = Task::new(ToolKind::PortScan, "example.com");
        let result = ok(Findings::Ports(vec![PortFinding::open(443, None)]));

        let derived = derive(&task, &result);
        assert_eq!(derived.tasks.len(), 2);
        assert_eq!(derived.tasks[0].tool, ToolKind::DirectoryBruteForce);
        assert_eq!(derived.tasks[1].tool, ToolKind::ParameterFuzz);
        for child in &derived.tasks {
            assert_eq!(child.target, "https://example.com");
            assert_eq!(child.parent, Some(task.id));
            assert_eq!(child.retry_count, 0);
        }
    }

    #[test]
    fn test_http_service_name_on_other_port() {
        let task = Task::new(ToolKind::PortScan, "10.0.0.5");
        let result = ok(Findings::Ports(vec![
            PortFinding::open(22, Some("ssh")),
            PortFinding::open(8080, Some("HTTP")),
        ]));

        let derived = derive(&task, &result);
        assert_eq!(derived.tasks.len(), 2);
        assert!(derived.tasks.iter().all(|t| t.target == "http://10.0.0.5"));
    }

    #[test]
    fn test_https_wins_when_both_present() {
        let task = Task::new(ToolKind::PortScan, "http://example.com/");
        let result = ok(Findings::Ports(vec![
            PortFinding::open(80, Some("http")),
            PortFinding::open(443, Some("https")),
        ]));

        let derived = derive(&task, &result);
        assert_eq!(derived.tasks.len(), 2);
        assert_eq!(derived.tasks[0].target, "https://example.com");
    }

    #[test]
    fn test_closed_or_non_web_ports_derive_nothing() {
        let task = Task::new(ToolKind::PortScan, "example.com");
        let result = ok(Findings::Ports(vec![
            PortFinding {
                port: 80,
                state: PortState::Closed,
                service: Some("http".into()),
            },
            PortFinding {
                port: 443,
                state: PortState::Filtered,
                service: None,
            },
            PortFinding::open(22, Some("ssh")),
        ]));

        assert_eq!(derive(&task, &result), Derivation::default());
    }

    #[test]
    fn test_empty_directory_listing() {
        let task = Task::new(ToolKind::DirectoryBruteForce, "http://example.com");
        let derived = derive(&task, &ok(Findings::Paths(vec![])));

        assert!(derived.tasks.is_empty());
        assert_eq!(derived.notes.len(), 1);
        assert!(derived.notes[0].contains("http://example.com"));
    }

    #[test]
    fn test_directories_lead_to_injection_probe() {
        let task = Task::new(ToolKind::DirectoryBruteForce, "http://example.com");
        let derived = derive(&task, &ok(Findings::Paths(vec!["/admin".into()])));

        assert_eq!(derived.tasks.len(), 1);
        assert_eq!(derived.tasks[0].tool, ToolKind::InjectionProbe);
        assert_eq!(derived.tasks[0].target, "http://example.com");
        assert!(derived.notes.is_empty());
    }

    #[test]
    fn test_leaf_tools_derive_nothing() {
        let task = Task::new(ToolKind::ParameterFuzz, "http://example.com");
        assert_eq!(derive(&task, &ok(Findings::Parameters(vec!["id".into()]))), Derivation::default());

        let task = Task::new(ToolKind::InjectionProbe, "http://example.com");
        let result = ok(Findings::Injection {
            vulnerable: true,
            log_ref: None,
        });
        assert_eq!(derive(&task, &result), Derivation::default());
    }

    #[test]
    fn test_failed_results_derive_nothing() {
        let task = Task::new(ToolKind::PortScan, "example.com");
        assert_eq!(derive(&task, &ToolResult::failure("timeout")), Derivation::default());
    }

    #[test]
    fn test_ipv6_target_is_bracketed() {
        let task = Task::new(ToolKind::PortScan, "2001:db8::10");
        let result = ok(Findings::Ports(vec![PortFinding::open(80, None)]));

        let derived = derive(&task, &result);
        assert_eq!(derived.tasks[0].target, "http://[2001:db8::10]");
    }
}
