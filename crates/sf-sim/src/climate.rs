//! Climate state shared by the runoff and routing kernels.
//!
//! Tracks the current simulation date and the potential evaporation rate.
//! When a project has no subcatchments the lifecycle still advances this
//! state each step so evaporation from exposed surfaces stays current.

use sf_core::datetime::DateTime;
use sf_project::Options;

#[derive(Debug, Clone)]
pub struct Climate {
    /// Current simulation date.
    pub date: DateTime,
    /// Potential evaporation, ft/s.
    pub evap_rate: f64,
}

impl Climate {
    pub fn open(options: &Options) -> Self {
        Self {
            date: options.start_datetime,
            evap_rate: options.evap_rate,
        }
    }

    /// Advance the climate state to `date`.
    pub fn set_state(&mut self, date: DateTime, options: &Options) {
        self.date = date;
        self.evap_rate = options.evap_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_project::schema::ProjectFile;
    use sf_project::Project;

    #[test]
    fn tracks_date_and_evaporation() {
        let file: ProjectFile = serde_yaml::from_str("options: { evaporation: 0.1 }").unwrap();
        let project = Project::from_schema(file).unwrap();
        let mut climate = Climate::open(&project.options);
        assert!(climate.evap_rate > 0.0);
        let later = project.options.start_datetime + 0.5;
        climate.set_state(later, &project.options);
        assert_eq!(climate.date, later);
    }
}
