//! Text report writer.
//!
//! Owns the report file for the lifetime of a run. Sections are written
//! at the lifecycle points the controller dictates: title and options at
//! start, control actions as they happen, mass balance and statistics
//! after the run ends, wall-clock stamps at close.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use sf_core::datetime::{self, DateTime};
use sf_core::units::Quantity;
use sf_project::Project;
use sf_sim::{MassBalance, Statistics};

#[derive(Debug)]
pub struct ReportWriter {
    file: Option<BufWriter<File>>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ReportWriter {
    pub fn closed() -> Self {
        Self {
            file: None,
            started_at: None,
        }
    }

    pub fn open(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            file: Some(BufWriter::new(File::create(path)?)),
            started_at: Some(chrono::Utc::now()),
        })
    }

    pub fn write_line(&mut self, line: &str) {
        if let Some(file) = &mut self.file {
            let _ = writeln!(file, "{line}");
        }
    }

    pub fn write_logo(&mut self) {
        self.write_line("  STORMFLOW - urban drainage simulation engine");
        self.write_line("  ============================================");
        self.write_line("");
    }

    pub fn write_title(&mut self, project: &Project) {
        if !project.title.is_empty() {
            self.write_line(&format!("  {}", project.title));
            self.write_line("");
        }
    }

    pub fn write_options(&mut self, project: &Project) {
        let opt = &project.options;
        self.write_line("  Analysis Options");
        self.write_line("  ----------------");
        self.write_line(&format!("    Flow units ............ {:?}", opt.flow_units));
        self.write_line(&format!(
            "    Routing model ......... {:?}",
            opt.routing_model
        ));
        self.write_line(&format!(
            "    Start date ............ {}",
            format_date(opt.start_datetime)
        ));
        self.write_line(&format!(
            "    End date .............. {}",
            format_date(opt.end_datetime)
        ));
        self.write_line(&format!(
            "    Report time step ...... {} sec",
            opt.report_step_s
        ));
        self.write_line(&format!(
            "    Routing time step ..... {} sec",
            opt.route_step_s
        ));
        self.write_line("");
    }

    pub fn write_control_actions_heading(&mut self) {
        self.write_line("  Control Actions Taken");
        self.write_line("  ---------------------");
    }

    pub fn write_control_action(&mut self, date: DateTime, link_id: &str, value: f64, reason: &str) {
        self.write_line(&format!(
            "    {}: link {} setting = {:.2} ({reason})",
            format_date(date),
            link_id,
            value
        ));
    }

    pub fn write_mass_balance(&mut self, project: &Project, massbal: &MassBalance) {
        let vol_ucf = project.options.ucf(Quantity::Volume);
        self.write_line("");
        self.write_line("  Flow Routing Continuity");
        self.write_line("  -----------------------");
        self.write_line(&format!(
            "    Total inflow volume ... {:.3}",
            massbal.inflow_volume * vol_ucf
        ));
        self.write_line(&format!(
            "    Total outflow volume .. {:.3}",
            massbal.outflow_volume * vol_ucf
        ));
        self.write_line(&format!(
            "    Flooding volume ....... {:.3}",
            massbal.flooding_volume * vol_ucf
        ));
        self.write_line(&format!(
            "    Continuity error ...... {:.3} %",
            massbal.flow_error_pct()
        ));
        if !project.subcatchments.is_empty() {
            self.write_line(&format!(
                "    Runoff continuity ..... {:.3} %",
                massbal.runoff_error_pct()
            ));
        }
    }

    pub fn write_statistics(&mut self, project: &Project, stats: &Statistics) {
        let len_ucf = project.options.ucf(Quantity::Length);
        let flow_ucf = project.options.ucf(Quantity::Flow);
        self.write_line("");
        self.write_line("  Routing Time Step Summary");
        self.write_line("  -------------------------");
        self.write_line(&format!("    Steps taken ........... {}", stats.step_count));
        if stats.step_count > 0 {
            self.write_line(&format!(
                "    Minimum step .......... {:.3} sec",
                stats.min_step_s
            ));
            self.write_line(&format!(
                "    Average step .......... {:.3} sec",
                stats.mean_step_s()
            ));
            self.write_line(&format!(
                "    Maximum step .......... {:.3} sec",
                stats.max_step_s
            ));
        }
        if !project.nodes.is_empty() {
            self.write_line("");
            self.write_line("  Node Depth Summary");
            self.write_line("  ------------------");
            for (node, max) in project.nodes.iter().zip(&stats.node_max_depth) {
                self.write_line(&format!(
                    "    {:<16} max depth {:.3}",
                    node.id,
                    max * len_ucf
                ));
            }
        }
        if !project.links.is_empty() {
            self.write_line("");
            self.write_line("  Link Flow Summary");
            self.write_line("  -----------------");
            for (link, max) in project.links.iter().zip(&stats.link_max_flow) {
                self.write_line(&format!(
                    "    {:<16} max flow {:.3}",
                    link.id,
                    max * flow_ucf
                ));
            }
        }
    }

    /// Wall-clock bookends, written at close.
    pub fn write_sys_time(&mut self) {
        if let Some(started) = self.started_at {
            let ended = chrono::Utc::now();
            self.write_line("");
            self.write_line(&format!(
                "  Analysis begun on:  {}",
                started.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            self.write_line(&format!(
                "  Analysis ended on:  {}",
                ended.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
    }

    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
    }
}

fn format_date(date: DateTime) -> String {
    let (y, m, d) = datetime::decode_date(date);
    let (hh, mm, ss) = datetime::decode_time(date);
    format!("{y:04}-{m:02}-{d:02} {hh:02}:{mm:02}:{ss:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_sections_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.rpt");
        let mut rpt = ReportWriter::open(&path).unwrap();
        rpt.write_logo();
        rpt.write_line("hello");
        rpt.write_sys_time();
        rpt.close();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("STORMFLOW"));
        assert!(text.contains("hello"));
        assert!(text.contains("Analysis begun on"));
    }

    #[test]
    fn closed_writer_swallows_lines() {
        let mut rpt = ReportWriter::closed();
        rpt.write_line("nowhere");
        rpt.close();
    }
}
