//! Per-run summary statistics gathered alongside routing.

use sf_project::Project;

#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub node_max_depth: Vec<f64>,
    pub node_max_inflow: Vec<f64>,
    pub link_max_flow: Vec<f64>,
    pub link_max_velocity: Vec<f64>,
    pub step_count: u64,
    pub min_step_s: f64,
    pub max_step_s: f64,
    sum_step_s: f64,
}

impl Statistics {
    pub fn open(project: &Project) -> Self {
        Self {
            node_max_depth: vec![0.0; project.nodes.len()],
            node_max_inflow: vec![0.0; project.nodes.len()],
            link_max_flow: vec![0.0; project.links.len()],
            link_max_velocity: vec![0.0; project.links.len()],
            min_step_s: f64::INFINITY,
            ..Self::default()
        }
    }

    /// Fold the state after one routing step into the maxima.
    pub fn update(&mut self, project: &Project, step_s: f64) {
        self.step_count += 1;
        self.min_step_s = self.min_step_s.min(step_s);
        self.max_step_s = self.max_step_s.max(step_s);
        self.sum_step_s += step_s;
        for (max, node) in self.node_max_depth.iter_mut().zip(&project.nodes) {
            *max = max.max(node.depth);
        }
        for (max, node) in self.node_max_inflow.iter_mut().zip(&project.nodes) {
            *max = max.max(node.inflow);
        }
        for (max, link) in self.link_max_flow.iter_mut().zip(&project.links) {
            *max = max.max(link.flow.abs());
        }
        for (max, link) in self.link_max_velocity.iter_mut().zip(&project.links) {
            *max = max.max(link.velocity.abs());
        }
    }

    pub fn mean_step_s(&self) -> f64 {
        if self.step_count == 0 {
            0.0
        } else {
            self.sum_step_s / self.step_count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_project::schema::ProjectFile;

    #[test]
    fn maxima_track_the_peak() {
        let file: ProjectFile = serde_yaml::from_str(
            r#"
nodes:
  - { type: junction, id: J1, invert: 0.0, max_depth: 10.0 }
"#,
        )
        .unwrap();
        let mut project = Project::from_schema(file).unwrap();
        project.init_state();
        let mut stats = Statistics::open(&project);

        project.nodes[0].depth = 2.0;
        stats.update(&project, 5.0);
        project.nodes[0].depth = 1.0;
        stats.update(&project, 10.0);

        assert_eq!(stats.node_max_depth[0], 2.0);
        assert_eq!(stats.step_count, 2);
        assert_eq!(stats.min_step_s, 5.0);
        assert_eq!(stats.max_step_s, 10.0);
        assert_eq!(stats.mean_step_s(), 7.5);
    }
}
