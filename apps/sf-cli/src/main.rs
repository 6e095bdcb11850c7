use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sf_engine::run_with_callback;
use sf_output::{ElementType, OutputReader};

#[derive(Parser)]
#[command(name = "sf-cli")]
#[command(about = "Stormflow - urban drainage simulation engine", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project input file (bare invocation: sf-cli INP RPT OUT)
    inp: Option<PathBuf>,
    /// Text report file
    rpt: Option<PathBuf>,
    /// Binary output file
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation to completion
    Run {
        /// Project input file
        inp: PathBuf,
        /// Text report file
        rpt: PathBuf,
        /// Binary output file
        out: PathBuf,
        /// Suppress the console progress line
        #[arg(long)]
        quiet: bool,
    },
    /// Validate a project file without running it
    Validate {
        /// Project input file
        inp: PathBuf,
    },
    /// Summarize a finished binary output file as JSON
    Info {
        /// Binary output file
        out: PathBuf,
    },
    /// Export one element's time series from a binary output file as CSV
    ExportSeries {
        /// Binary output file
        out: PathBuf,
        /// Element class: subcatchment, node, or link
        element: String,
        /// Element index
        index: usize,
        /// Attribute code within the element class
        attribute: usize,
        /// Output CSV path (stdout when omitted)
        #[arg(short = 'o', long)]
        csv: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let code = match cli.command {
        Some(Commands::Run {
            inp,
            rpt,
            out,
            quiet,
        }) => cmd_run(&inp, &rpt, &out, quiet),
        Some(Commands::Validate { inp }) => cmd_validate(&inp),
        Some(Commands::Info { out }) => cmd_info(&out),
        Some(Commands::ExportSeries {
            out,
            element,
            index,
            attribute,
            csv,
        }) => cmd_export_series(&out, &element, index, attribute, csv.as_deref()),
        None => match (cli.inp, cli.rpt, cli.out) {
            (Some(inp), Some(rpt), Some(out)) => cmd_run(&inp, &rpt, &out, false),
            _ => {
                eprintln!("usage: sf-cli <INP> <RPT> <OUT>  (or: sf-cli help)");
                2
            }
        },
    };
    ExitCode::from(code.min(255) as u8)
}

fn cmd_run(inp: &Path, rpt: &Path, out: &Path, quiet: bool) -> u16 {
    if !quiet {
        println!("o  Retrieving project data");
    }
    let mut last_pct = -1_i64;
    let code = run_with_callback(inp, rpt, out, |fraction| {
        if quiet {
            return;
        }
        let pct = (fraction * 100.0) as i64;
        if pct != last_pct {
            print!("\r o  Simulating... {pct:>3}%");
            let _ = io::stdout().flush();
            last_pct = pct;
        }
    });
    if !quiet {
        println!();
        if code == 0 {
            println!("o  Simulation complete");
        } else if code == sf_core::error::codes::WARNINGS_ISSUED {
            println!("o  Simulation complete with warnings");
        } else {
            eprintln!("o  Simulation failed: {}", sf_engine::message_for(code));
        }
    }
    code
}

fn cmd_validate(inp: &Path) -> u16 {
    match sf_project::load(inp) {
        Ok(project) => {
            println!(
                "Project is valid: {} subcatchments, {} nodes, {} links",
                project.subcatchments.len(),
                project.nodes.len(),
                project.links.len()
            );
            0
        }
        Err(err) => {
            eprintln!("Validation failed: {err}");
            err.code()
        }
    }
}

fn cmd_info(out: &Path) -> u16 {
    match OutputReader::open(out) {
        Ok(reader) => {
            let [n_subcatch, n_nodes, n_links, n_pollut] = reader.counts();
            let summary = serde_json::json!({
                "periods": reader.n_periods(),
                "report_step_s": reader.report_step_s(),
                "start_date": reader.start_date(),
                "subcatchments": n_subcatch,
                "nodes": n_nodes,
                "links": n_links,
                "pollutants": n_pollut,
                "warnings_issued": reader.warnings_issued(),
            });
            println!("{summary:#}");
            0
        }
        Err(err) => {
            eprintln!("Cannot read output file: {err}");
            err.code()
        }
    }
}

fn cmd_export_series(
    out: &Path,
    element: &str,
    index: usize,
    attribute: usize,
    csv: Option<&Path>,
) -> u16 {
    let element = match element {
        "subcatchment" => ElementType::Subcatchment,
        "node" => ElementType::Node,
        "link" => ElementType::Link,
        "system" => ElementType::System,
        _ => {
            eprintln!("unknown element class: {element}");
            return sf_core::error::codes::OUT_ELEMENT_TYPE;
        }
    };

    let mut reader = match OutputReader::open(out) {
        Ok(reader) => reader,
        Err(err) => {
            eprintln!("Cannot read output file: {err}");
            return err.code();
        }
    };

    let periods = reader.n_periods() as usize;
    let series = match reader.series(element, index, attribute, 0, periods) {
        Ok(series) => series,
        Err(err) => {
            eprintln!("Query failed: {err}");
            return err.code();
        }
    };

    let mut text = String::from("period,date,value\n");
    for (p, value) in series.iter().enumerate() {
        let date = reader.period_date(p).unwrap_or(0.0);
        text.push_str(&format!("{p},{date},{value}\n"));
    }

    match csv {
        Some(path) => {
            if let Err(err) = std::fs::write(path, text) {
                eprintln!("Cannot write CSV: {err}");
                return sf_core::error::codes::OUT_SHORT_READ;
            }
            println!("Exported {} data points to {}", series.len(), path.display());
        }
        None => print!("{text}"),
    }
    0
}
