//! Text rendering of daemon answers.

use colored::Colorize;
use serde_json::Value;

use soundstreamer_core::endpoint::AudioEndpoint;
use soundstreamer_core::graph::LinkState;
use soundstreamer_core::state::{CreatedLinkView, DaemonState, LinkView};
use soundstreamer_ipc::{Diagnostics, Event, EventType, LinkReport, RemoveReport};

fn plural(count: usize, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 { one } else { many }
}

pub fn endpoints(endpoints: &[AudioEndpoint], one: &'static str, many: &'static str) -> String {
    if endpoints.is_empty() {
        return format!("No {many} found");
    }

    let mut out = format!(
        "{} {} found:\n",
        endpoints.len().to_string().green().bold(),
        plural(endpoints.len(), one, many)
    );
    for endpoint in endpoints {
        out.push_str(&format!("\n  {} {}", format!("[{}]", endpoint.id).cyan(), endpoint.display_name));
    }
    out
}

fn state_label(state: LinkState) -> colored::ColoredString {
    match state {
        LinkState::Active => "active".green(),
        LinkState::Paused => "paused".yellow(),
        LinkState::Error => "error".red(),
        LinkState::Unlinked => "unlinked".dimmed(),
        LinkState::Init | LinkState::Negotiating | LinkState::Allocating => {
            "starting".dimmed()
        }
    }
}

pub fn all_links(links: &[LinkView]) -> String {
    if links.is_empty() {
        return "No links".to_string();
    }

    let mut out = String::new();
    for (i, link) in links.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let marker = if link.created_here { "*".magenta() } else { " ".normal() };
        out.push_str(&format!(
            "{marker} {} {}  {}  {}",
            format!("[{}]", link.id).cyan(),
            link.label,
            format!("(port {} -> {})", link.output_port, link.input_port).dimmed(),
            state_label(link.state)
        ));
    }
    out
}

pub fn created_links(links: &[CreatedLinkView]) -> String {
    if links.is_empty() {
        return "No audio links created in this session".to_string();
    }

    let mut out = format!(
        "{} {}:\n",
        links.len().to_string().green().bold(),
        plural(links.len(), "audio link", "audio links")
    );
    for link in links {
        let status = if link.active { "active".green() } else { "pending".yellow() };
        out.push_str(&format!("\n  {}  {}  {}", link.label, link.pair.to_string().dimmed(), status));
    }
    out
}

pub fn link_report(report: &LinkReport) -> String {
    let summary = report.summary();
    let mut out = if !report.created.is_empty() {
        summary.green().to_string()
    } else if report.failed.is_empty() {
        // Everything requested was linked already
        summary.yellow().to_string()
    } else {
        summary.red().to_string()
    };

    if !report.already_linked.is_empty() {
        out.push_str(&format!(
            "\n{}",
            format!("{} already linked", report.already_linked.len()).dimmed()
        ));
    }
    for failure in &report.failed {
        out.push_str(&format!("\n  {} {}: {}", "failed".red(), failure.pair, failure.message));
    }
    out
}

pub fn remove_report(report: &RemoveReport) -> String {
    let mut out = if report.failed.is_empty() {
        report.summary().green().to_string()
    } else {
        report.summary().yellow().to_string()
    };
    for failure in &report.failed {
        out.push_str(&format!("\n  {} {}: {}", "failed".red(), failure.pair, failure.message));
    }
    out
}

fn daemon_state(state: &DaemonState) -> colored::ColoredString {
    match state {
        DaemonState::Running => "running".green().bold(),
        DaemonState::Initializing => "initializing".yellow(),
        DaemonState::Disconnected => "disconnected".red(),
        DaemonState::ShuttingDown => "shutting down".yellow(),
        DaemonState::Error(e) => format!("error: {e}").red().bold(),
    }
}

pub fn status(diag: &Diagnostics) -> String {
    [
        format!("Daemon:   {} (v{})", daemon_state(&diag.state), diag.version),
        format!("Monitor:  {} (generation {})", diag.monitor, diag.generation),
        format!(
            "Graph:    {} nodes, {} ports, {} links",
            diag.node_count, diag.port_count, diag.link_count
        ),
        format!(
            "Session:  {} created {}, {}",
            diag.created_links,
            plural(diag.created_links, "link", "links"),
            if diag.cleanup_on_exit { "removed on exit" } else { "kept on exit" }
        ),
        format!("Clients:  {}", diag.clients),
    ]
    .join("\n")
}

pub fn event(event: &Event) -> String {
    let data = &event.data;
    let count = |key: &str| data[key].as_array().map_or(0, Vec::len);

    match event.event {
        EventType::StateChanged => {
            format!("{} {}", "state".cyan(), data["state"])
        }
        EventType::GraphChanged => format!(
            "{} {} changes: {} sources, {} targets, {} links",
            "graph".cyan(),
            data["changes"],
            data["sources"],
            data["targets"],
            data["links"]
        ),
        EventType::LinksCreated => format!(
            "{} {} created, {} failed",
            "links".green(),
            count("created"),
            count("failed")
        ),
        EventType::LinksRemoved => format!("{} {} removed", "links".yellow(), count("removed")),
        EventType::PipewireConnected => "PipeWire connected".green().to_string(),
        EventType::PipewireDisconnected => format!(
            "{} {}",
            "PipeWire disconnected:".red(),
            data["reason"].as_str().unwrap_or("unknown reason")
        ),
        EventType::Error => format!(
            "{} {}",
            "error:".red().bold(),
            data["message"].as_str().map_or_else(|| data.to_string(), str::to_string)
        ),
    }
}

/// Pretty JSON for `--format json`.
pub fn json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
