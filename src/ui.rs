//! Terminal presentation: transcript, summary dashboard and the chat loop.
//!
//! Rendering functions are pure and return strings; `run` owns all I/O.

use crate::agent::GeminiClient;
use crate::auth::FirebaseAuth;
use crate::config::Config;
use crate::conversation::{Message, Role};
use crate::orchestrator::{Orchestrator, SendOutcome};
use crate::session::{SessionError, SessionManager};
use crate::storage::SessionStorage;
use crate::summary::SummaryRecord;
use colored::Colorize;
use dialoguer::{Input, Password, Select};
use std::sync::Arc;

const ENTRY_MENU: [&str; 3] = ["Log in", "Create an account", "Quit"];

const EMPTY_DASHBOARD: &str = "As the conversation with your coach goes on, your current \
situation and concrete actions will be organised here.";

pub fn render_message(message: &Message) -> String {
    match message.role() {
        Role::User => format!("{} {}", "You:".green().bold(), message.text()),
        Role::Assistant => format!("{} {}", "Coach:".cyan().bold(), message.text()),
    }
}

pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render the coaching summary panel.
///
/// Sections appear in a fixed order and only when populated.
pub fn render_dashboard(summary: Option<&SummaryRecord>, summarizing: bool) -> String {
    let Some(summary) = summary.filter(|s| !s.is_empty()) else {
        return if summarizing {
            format!("{}\n{}", "Coaching summary".bold(), "Updating...".dimmed())
        } else {
            EMPTY_DASHBOARD.dimmed().to_string()
        };
    };

    let mut out = vec!["Coaching summary".bold().to_string()];
    if summarizing {
        out.push("Updating...".dimmed().to_string());
    }

    let sections = [
        ("Current issues", &summary.current_issues),
        ("Ideal state", &summary.ideal_state),
        ("Gap", &summary.gap),
    ];
    for (title, body) in sections {
        if let Some(body) = body.as_deref().filter(|b| !b.is_empty()) {
            out.push(format!("\n{}\n{}", title.yellow().bold(), body));
        }
    }

    if let Some(points) = summary.leverage_points.as_ref().filter(|p| !p.is_empty()) {
        let bullets = points
            .iter()
            .map(|p| format!("  • {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        out.push(format!("\n{}\n{}", "Focus points".yellow().bold(), bullets));
    }

    if let Some(flow) = summary.action_flow.as_deref().filter(|f| !f.is_empty()) {
        out.push(format!("\n{}\n{}", "This week's action".magenta().bold(), flow));
    }

    out.join("\n")
}

/// Launch the interactive coaching session.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    let client = GeminiClient::from_config(config)?;
    let auth = FirebaseAuth::from_config(config)?;
    let mut manager = SessionManager::new(
        Arc::new(auth),
        SessionStorage::open()?,
        Orchestrator::new(Arc::new(client)),
    );

    loop {
        if manager.current().is_none() {
            if !sign_in(&mut manager).await? {
                return Ok(());
            }
            print_transcript(manager.orchestrator());
        }

        let orchestrator = manager.orchestrator().clone();
        let prompt = if orchestrator.is_summarizing() {
            "You (summary updating)"
        } else {
            "You"
        };
        let input: String = Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;

        match input.trim() {
            "/quit" | "/exit" => return Ok(()),
            "/logout" => {
                manager.logout()?;
                println!("{}", "Signed out.".dimmed());
                continue;
            }
            "/summary" => {
                let snapshot = orchestrator.snapshot();
                println!(
                    "\n{}\n",
                    render_dashboard(snapshot.summary.as_ref(), snapshot.summarizing)
                );
                continue;
            }
            _ => {}
        }

        let report = orchestrator.send_user_message(&input).await;
        if report.outcome == SendOutcome::Rejected {
            continue;
        }
        if let Some(reply) = orchestrator.snapshot().messages.last() {
            println!("\n{}\n", render_message(reply));
        }
        if report.summary_task.is_some() {
            println!(
                "{}",
                "Updating your summary in the background. Type /summary to view it.".dimmed()
            );
        }
    }
}

fn print_transcript(orchestrator: &Orchestrator) {
    let snapshot = orchestrator.snapshot();
    println!("\n{}\n", render_transcript(&snapshot.messages));
    println!("{}", "Commands: /summary, /logout, /quit".dimmed());
}

/// Entry menu. Returns false when the user chose to quit.
async fn sign_in(manager: &mut SessionManager) -> anyhow::Result<bool> {
    loop {
        let choice = Select::new()
            .with_prompt("LifeRefine Coach")
            .items(&ENTRY_MENU)
            .default(0)
            .interact()?;
        if choice == 2 {
            return Ok(false);
        }

        let email: String = Input::new().with_prompt("Email").interact_text()?;
        let credential = Password::new()
            .with_prompt("Password (6+ characters)")
            .interact()?;

        let result = if choice == 0 {
            manager.login(&email, &credential).await
        } else {
            manager.register(&email, &credential).await
        };

        match result {
            Ok(_) => return Ok(true),
            Err(SessionError::Auth(failure)) => println!("{}", failure.to_string().red()),
            Err(e) => return Err(e.into()),
        }
    }
}
