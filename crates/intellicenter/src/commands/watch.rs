//! Live change streaming.
//!
//! Without `--reconnect` the stream ends when the connection does. With it,
//! a [`Supervisor`] keeps the session alive and the printer is driven as
//! its lifecycle handler.

use std::collections::HashSet;
use std::io::Write;

use tokio::sync::broadcast::error::RecvError;

use intellicenter_core::{
    ConnectionState, Controller, ControllerEvent, DisconnectReason, LifecycleHandler, ModelChanges,
    Supervisor,
};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(controller: &Controller, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let printer = ChangePrinter::new(&args, global);
    if args.reconnect {
        supervised(controller, printer).await
    } else {
        single_session(controller, &printer).await
    }
}

// ── Single session ───────────────────────────────────────────────────

async fn single_session(controller: &Controller, printer: &ChangePrinter) -> Result<(), CliError> {
    let mut events = controller.events();
    controller.connect().await?;
    printer.connected(controller);

    let result = loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = events.recv() => match event {
                Ok(ControllerEvent::Updated(changes)) => printer.print(&changes),
                Ok(ControllerEvent::Disconnected(reason)) => {
                    printer.disconnected(&reason);
                    break Err(CliError::ConnectionLost);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch output fell behind; some changes were not shown");
                }
                Err(RecvError::Closed) => break Err(CliError::ConnectionLost),
            },
        }
    };

    controller.disconnect().await;
    result
}

// ── Supervised ───────────────────────────────────────────────────────

async fn supervised(controller: &Controller, printer: ChangePrinter) -> Result<(), CliError> {
    let supervisor = Supervisor::with_handler(controller.clone(), printer);
    let mut state = supervisor.state();
    supervisor.start().await?;

    let result = loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = state.changed() => {
                if changed.is_err() {
                    break Err(CliError::ConnectionLost);
                }
                let current = state.borrow_and_update().clone();
                match current {
                    ConnectionState::Failed => break Err(CliError::ConnectionLost),
                    ConnectionState::Reconnecting { attempt } => {
                        tracing::info!(attempt, "reconnecting");
                    }
                    _ => {}
                }
            }
        }
    };

    supervisor.stop().await;
    result
}

// ── Printer ──────────────────────────────────────────────────────────

struct ChangePrinter {
    format: OutputFormat,
    objects: HashSet<String>,
    color: bool,
    quiet: bool,
}

impl ChangePrinter {
    fn new(args: &WatchArgs, global: &GlobalOpts) -> Self {
        Self {
            format: global.output.clone(),
            objects: args.objects.iter().cloned().collect(),
            color: output::should_color(&global.color),
            quiet: global.quiet,
        }
    }

    fn connected(&self, controller: &Controller) {
        if self.quiet {
            return;
        }
        let name = controller
            .system_info()
            .map(|info| info.prop_name)
            .unwrap_or_default();
        eprintln!(
            "watching {name} ({} objects), press Ctrl-C to stop",
            controller.model().len()
        );
    }

    fn disconnected(&self, reason: &DisconnectReason) {
        if !self.quiet {
            eprintln!("connection closed: {reason}");
        }
    }

    /// The subset of `changes` selected by `--object`.
    fn select(&self, changes: &ModelChanges) -> ModelChanges {
        if self.objects.is_empty() {
            return changes.clone();
        }
        changes
            .iter()
            .filter(|(objnam, _)| self.objects.contains(objnam.as_str()))
            .map(|(objnam, attrs)| (objnam.clone(), attrs.clone()))
            .collect()
    }

    fn render(&self, changes: &ModelChanges) -> Option<String> {
        let selected = self.select(changes);
        if selected.is_empty() {
            return None;
        }
        let out = match self.format {
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(&selected, true),
            OutputFormat::Yaml => format!(
                "---\n{}",
                serde_yaml::to_string(&selected).unwrap_or_default()
            )
            .trim_end()
            .to_owned(),
            OutputFormat::Table | OutputFormat::Plain => {
                let time = chrono::Local::now().format("%H:%M:%S");
                selected
                    .iter()
                    .map(|(objnam, attrs)| {
                        let attrs = attrs
                            .iter()
                            .map(|(key, value)| {
                                if key == "STATUS" {
                                    format!("{key}={}", output::status(value, self.color))
                                } else {
                                    format!("{key}={value}")
                                }
                            })
                            .collect::<Vec<_>>()
                            .join(" ");
                        format!("{time} {} {attrs}", output::objnam(objnam, self.color))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };
        Some(out)
    }

    fn print(&self, changes: &ModelChanges) {
        if self.quiet {
            return;
        }
        if let Some(out) = self.render(changes) {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{out}");
            let _ = stdout.flush();
        }
    }
}

impl LifecycleHandler for ChangePrinter {
    fn on_started(&self, controller: &Controller) {
        self.connected(controller);
    }

    fn on_reconnected(&self, controller: &Controller) {
        if !self.quiet {
            eprintln!("reconnected");
        }
        self.connected(controller);
    }

    fn on_disconnected(&self, _controller: &Controller, reason: &DisconnectReason) {
        self.disconnected(reason);
    }

    fn on_model_updated(&self, _controller: &Controller, changes: &ModelChanges) {
        self.print(changes);
    }
}
