use dice_roller::{
    config::Config,
    roll::{RollMode, Termination, Tick, TickObserver},
    AppError, RollController, RollError,
};
use std::env;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Redraws the current dice on one terminal line.
struct TerminalRenderer {
    show_sum: bool,
}

impl TerminalRenderer {
    fn draw(&self, tick: &Tick) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();
        write!(out, "\r\x1b[2K{}", tick.result)?;
        if self.show_sum {
            write!(out, "  Sum: {}", tick.result.sum())?;
        }
        out.flush()
    }
}

impl TickObserver for TerminalRenderer {
    fn on_tick(&self, tick: &Tick) {
        if let Err(e) = self.draw(tick) {
            tracing::warn!(error = %e, "Failed to draw roll");
        }
    }

    fn on_terminated(&self, termination: &Termination) {
        println!();
        tracing::debug!(ticks = termination.ticks, reason = ?termination.reason, "Roll settled");
    }
}

#[tokio::main]
async fn main() {
    let env: String = env::var("RUN_ENV").unwrap_or_else(|_| "default".into());
    let config: Config = Config::load().expect("Failed to load config.");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.logging.level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    tracing::info!(run_env = %env, "Starting dice roller...");

    if let Err(e) = run(&config).await {
        tracing::error!(error = %e, "{}", failure_message(&e));
        std::process::exit(1);
    }
}

fn failure_message(error: &AppError) -> &'static str {
    match error {
        AppError::Roll(RollError::Configuration(_)) => "You must select both parameters before you roll",
        _ => "dice roller error",
    }
}

async fn run(config: &Config) -> Result<(), AppError> {
    let selection = config.roll.selection();
    if !selection.is_standard() {
        tracing::warn!(?selection, "Selection is outside the standard dice options");
    }

    let controller = RollController::new();
    let renderer = TerminalRenderer {
        show_sum: config.roll.show_sum,
    };
    let mode = config.roll.roll_mode();

    let handle = controller.start(selection, mode, renderer)?;

    if mode == RollMode::Continuous {
        eprintln!("Rolling... press Enter or Ctrl-C to stop.");
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        tokio::select! {
            line = stdin.next_line() => { line?; }
            signal = tokio::signal::ctrl_c() => { signal?; }
            _ = handle.wait() => {}
        }
        controller.stop(&handle).await;
    } else {
        handle.wait().await;
    }

    if let Some(result) = handle.buffer().read() {
        tracing::info!(session_id = %handle.get_id(), result = %result, sum = result.sum(), "Final roll");
    }
    Ok(())
}
