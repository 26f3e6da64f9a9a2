use std::fs::File;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod dataset;
mod domain;
mod model;
mod prompt;
mod table;
mod ui;
mod views;

use controller::Controller;
use domain::{AnalystConfig, DashboardConfig, PainelError, QueueConfig, Variant};
use model::{Model, Status, expand_path};
use ui::TableUI;

/// Dashboard for case-record spreadsheets.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Spreadsheet to open (.xlsx, .xls, .xlsb, .ods)
    path: Option<String>,

    /// Output columns of the distribution queue
    #[arg(long, value_enum, default_value_t = Variant::A)]
    variant: Variant,

    /// Year a process must have to be distributed
    #[arg(long, default_value_t = 2024)]
    year: i64,

    /// Value marking a completed process instruction
    #[arg(long, default_value = "SIM")]
    flag: String,

    /// Banner rows above the header row
    #[arg(long, default_value_t = 4)]
    skip_rows: usize,

    /// Keep processes without an analyst when no analyst is selected
    #[arg(long)]
    include_unassigned: bool,

    /// Where log output goes
    #[arg(long, default_value = "painel.log")]
    log_file: String,
}

impl Args {
    fn config(&self) -> DashboardConfig {
        DashboardConfig::default()
            .queue(
                QueueConfig::default()
                    .target_year(self.year)
                    .flag_value(self.flag.as_str())
                    .variant(self.variant),
            )
            .analyst(AnalystConfig::default().include_unassigned(self.include_unassigned))
            .header_skip_rows(self.skip_rows)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_file) {
        eprintln!("Error: could not open log file {}: {e}", args.log_file);
        return ExitCode::FAILURE;
    }

    let mut terminal = ratatui::init();
    let result = run(&args, &mut terminal);
    ratatui::restore();

    match result {
        Err(e) => {
            error!("{e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn init_logging(path: &str) -> Result<(), PainelError> {
    let file = File::create(expand_path(path)?)?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();
    Ok(())
}

fn run(args: &Args, terminal: &mut ratatui::DefaultTerminal) -> Result<(), PainelError> {
    info!("Starting painel!");
    let config = args.config();
    let size = terminal.size()?;

    let mut model = Model::init(&config, size.height as usize);
    if let Some(raw) = &args.path {
        // A failed first load leaves an empty dashboard with the error shown.
        if let Err(e) = model.open_path(raw) {
            info!("Starting without a dataset: {e}");
        }
    }

    let ui = TableUI::new(&config.ui);
    let controller = Controller::new(&config.ui);

    while model.status != Status::QUITTING {
        terminal.draw(|f| ui.draw(&model, f))?;

        if let Some(message) = controller.handle_event(&model)? {
            model.update(Some(message))?;
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_shape_the_config() {
        let args = Args::try_parse_from([
            "painel",
            "planilha.xlsx",
            "--variant",
            "b",
            "--year",
            "2025",
            "--skip-rows",
            "2",
            "--include-unassigned",
        ])
        .unwrap();
        let config = args.config();
        assert_eq!(args.path.as_deref(), Some("planilha.xlsx"));
        assert_eq!(config.queue.variant, Variant::B);
        assert_eq!(config.queue.target_year, 2025);
        assert_eq!(config.queue.flag_value, "SIM");
        assert_eq!(config.header_skip_rows, 2);
        assert!(config.analyst.include_unassigned);
    }

    #[test]
    fn defaults_follow_the_standard_layout() {
        let config = Args::try_parse_from(["painel"]).unwrap().config();
        assert_eq!(config.queue.variant, Variant::A);
        assert_eq!(config.header_skip_rows, 4);
        assert!(!config.analyst.include_unassigned);
    }
}
