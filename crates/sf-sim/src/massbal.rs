//! Continuity accounting across a run.
//!
//! Tracks volumes entering and leaving the runoff and routing phases and
//! reports the percentage continuity errors the lifecycle surfaces after
//! `end`.

use sf_project::{Project, MIN_SURF_AREA};

use crate::routing::StepTotals;

#[derive(Debug, Clone, Default)]
pub struct MassBalance {
    // runoff phase, ft3
    pub precip_volume: f64,
    pub infil_volume: f64,
    pub evap_volume: f64,
    pub runoff_volume: f64,
    // routing phase, ft3
    pub inflow_volume: f64,
    pub outflow_volume: f64,
    pub flooding_volume: f64,
    pub initial_stored: f64,
    pub final_stored: f64,
    // quality, mass
    pub quality_in: f64,
    pub quality_out: f64,
}

impl MassBalance {
    pub fn open(project: &Project) -> Self {
        Self {
            initial_stored: stored_volume(project),
            ..Self::default()
        }
    }

    /// Fold one runoff step into the totals.
    pub fn update_runoff(&mut self, project: &Project, step_s: f64) {
        for sc in &project.subcatchments {
            self.precip_volume += sc.rainfall * sc.area * step_s;
            self.infil_volume += sc.infil_loss * sc.area * step_s;
            self.evap_volume += sc.evap_loss * sc.area * step_s;
            self.runoff_volume += sc.runoff * step_s;
        }
    }

    /// Fold one routing step into the totals.
    pub fn update_routing(&mut self, totals: &StepTotals) {
        self.inflow_volume += totals.lateral_inflow;
        self.outflow_volume += totals.outfall_outflow;
        self.flooding_volume += totals.flooding;
    }

    /// Capture the end-of-run storage before reporting.
    pub fn close(&mut self, project: &Project) {
        self.final_stored = stored_volume(project);
    }

    /// Runoff continuity error, percent of precipitation.
    pub fn runoff_error_pct(&self) -> f64 {
        let inflow = self.precip_volume;
        if inflow <= 0.0 {
            return 0.0;
        }
        let outflow = self.infil_volume + self.evap_volume + self.runoff_volume;
        100.0 * (inflow - outflow).abs() / inflow
    }

    /// Flow routing continuity error, percent of total inflow.
    pub fn flow_error_pct(&self) -> f64 {
        let inflow = self.inflow_volume + self.initial_stored;
        if inflow <= 0.0 {
            return 0.0;
        }
        let outflow = self.outflow_volume + self.flooding_volume + self.final_stored;
        100.0 * (inflow - outflow).abs() / inflow
    }

    /// Quality routing continuity error, percent of inflow load.
    pub fn quality_error_pct(&self) -> f64 {
        if self.quality_in <= 0.0 {
            return 0.0;
        }
        100.0 * (self.quality_in - self.quality_out).abs() / self.quality_in
    }
}

fn stored_volume(project: &Project) -> f64 {
    project
        .nodes
        .iter()
        .map(|n| n.depth * n.surface_area(MIN_SURF_AREA) + n.ponded_volume)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_project::schema::ProjectFile;

    #[test]
    fn zero_activity_means_zero_error() {
        let file: ProjectFile = serde_yaml::from_str("{}").unwrap();
        let project = Project::from_schema(file).unwrap();
        let mut mb = MassBalance::open(&project);
        mb.close(&project);
        assert_eq!(mb.runoff_error_pct(), 0.0);
        assert_eq!(mb.flow_error_pct(), 0.0);
        assert_eq!(mb.quality_error_pct(), 0.0);
    }

    #[test]
    fn routing_totals_accumulate() {
        let file: ProjectFile = serde_yaml::from_str("{}").unwrap();
        let project = Project::from_schema(file).unwrap();
        let mut mb = MassBalance::open(&project);
        mb.update_routing(&StepTotals {
            lateral_inflow: 100.0,
            outfall_outflow: 60.0,
            flooding: 10.0,
        });
        mb.update_routing(&StepTotals {
            lateral_inflow: 50.0,
            outfall_outflow: 40.0,
            flooding: 0.0,
        });
        mb.close(&project);
        assert_eq!(mb.inflow_volume, 150.0);
        assert_eq!(mb.outflow_volume, 100.0);
        // 150 in vs 110 out: 26.67% apparent error
        assert!(mb.flow_error_pct() > 25.0);
    }
}
