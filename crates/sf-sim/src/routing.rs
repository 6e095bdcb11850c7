//! Flow and quality routing through the drainage network.
//!
//! Level-pool routing: link flows are computed explicitly from the current
//! node heads (Manning for conduits, standard equations for pumps,
//! orifices, weirs, and outlets), then node depths are updated by
//! continuity. Within a step the two half-updates are iterated with
//! under-relaxation until heads settle inside the configured tolerance or
//! the trial limit is hit. Per-link flow evaluation fans out over a scoped
//! thread pool when `num_threads` allows it.

use rayon::prelude::*;
use tracing::warn;

use sf_project::{
    InertiaDamping, LinkKind, NodeKind, Options, OutfallStage, Project, RoutingModel,
    MIN_SURF_AREA,
};

use crate::{SimError, SimResult};

const GRAVITY: f64 = 32.174; // ft/s2
const MIN_DEPTH: f64 = 0.001; // ft
const MIN_SLOPE: f64 = 1.0e-4;

/// Consecutive non-converged steps tolerated before the run aborts.
const NON_CONVERGE_LIMIT: u32 = 1000;

/// Volume totals accumulated over one routing step, ft3.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepTotals {
    pub lateral_inflow: f64,
    pub outfall_outflow: f64,
    pub flooding: f64,
}

#[derive(Debug)]
pub struct RoutingProcessor {
    pool: Option<rayon::ThreadPool>,
    /// Effective free-surface area per node (storage + apportioned
    /// conduit plan area), ft2.
    node_area: Vec<f64>,
    pub non_converge_count: u32,
    consecutive_non_converge: u32,
}

impl RoutingProcessor {
    pub fn open(project: &Project) -> SimResult<Self> {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let threads = project.options.num_threads.clamp(1, available);
        let pool = if threads > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .ok()
        } else {
            None
        };

        let mut node_area = vec![0.0; project.nodes.len()];
        for link in &project.links {
            if let LinkKind::Conduit {
                length, full_depth, ..
            } = link.kind
            {
                let half = 0.5 * length * full_depth;
                node_area[link.from_node] += half;
                node_area[link.to_node] += half;
            }
        }
        for (area, node) in node_area.iter_mut().zip(&project.nodes) {
            *area = node.surface_area(MIN_SURF_AREA).max(*area);
        }

        Ok(Self {
            pool,
            node_area,
            non_converge_count: 0,
            consecutive_non_converge: 0,
        })
    }

    /// Adaptive routing step, seconds. Dynamic-wave routing limits the
    /// nominal step by the Courant condition over flowing conduits;
    /// kinematic-wave routing always uses the nominal step.
    pub fn routing_step(&self, project: &Project, route_step_s: f64) -> f64 {
        match project.options.routing_model {
            RoutingModel::KinematicWave => route_step_s,
            RoutingModel::DynamicWave => {
                self.courant_step(project, route_step_s, project.options.courant_factor)
                    .max(project.options.min_route_step_s)
                    .min(route_step_s)
            }
        }
    }

    /// Largest stable step under a Courant factor of 1, ignoring the
    /// configured minimum (used by the max-route-step property).
    pub fn max_route_step(&self, project: &Project, route_step_s: f64) -> f64 {
        self.courant_step(project, route_step_s, 1.0)
    }

    fn courant_step(&self, project: &Project, route_step_s: f64, courant: f64) -> f64 {
        let mut dt = route_step_s;
        for link in &project.links {
            if let LinkKind::Conduit { length, .. } = link.kind {
                if link.depth > MIN_DEPTH {
                    let celerity = (GRAVITY * link.depth).sqrt();
                    let speed = link.velocity.abs() + celerity;
                    if speed > 0.0 {
                        dt = dt.min(courant * length / speed);
                    }
                }
            }
        }
        dt
    }

    /// Route flows and pollutants through the network over `step_s`.
    pub fn execute(&mut self, project: &mut Project, step_s: f64) -> SimResult<StepTotals> {
        if step_s <= 0.0 {
            return Err(SimError::RoutingStepTooSmall);
        }

        apply_pending_settings(project);

        // lateral inflows: subcatchment runoff plus API injections
        let nn = project.nodes.len();
        let mut lateral = vec![0.0; nn];
        for sc in &project.subcatchments {
            if let Some(outlet) = sc.outlet {
                lateral[outlet] += sc.runoff;
            }
        }
        for (n, node) in project.nodes.iter().enumerate() {
            lateral[n] += node.api_ext_inflow;
        }

        let damping = match project.options.inertia_damping {
            InertiaDamping::None => 0.0,
            InertiaDamping::Partial => 0.5,
            InertiaDamping::Full => 0.8,
        };
        let head_tol = project.options.head_tolerance.max(1.0e-6);
        let max_trials = project.options.max_trials.max(2);

        let mut totals = StepTotals::default();
        let mut converged = false;

        let start_depths: Vec<f64> = project.nodes.iter().map(|n| n.depth).collect();
        let start_volumes: Vec<f64> = start_depths
            .iter()
            .zip(&self.node_area)
            .map(|(d, a)| d * a)
            .collect();

        for _trial in 0..max_trials {
            let flows = self.compute_link_flows(project);

            // blend head-driven flows with the previous trial for
            // stability; imposed pump flows are taken as computed
            for (link, q) in project.links.iter_mut().zip(&flows) {
                link.flow = match link.kind {
                    LinkKind::Pump { .. } => *q,
                    _ => damping * link.flow + (1.0 - damping) * q,
                };
            }

            // node continuity from the start-of-step state
            let mut net = lateral.clone();
            let mut inflow_acc = lateral.iter().map(|q| q.max(0.0)).collect::<Vec<_>>();
            for link in &project.links {
                net[link.from_node] -= link.flow;
                net[link.to_node] += link.flow;
                inflow_acc[link.to_node] += link.flow.max(0.0);
                inflow_acc[link.from_node] += (-link.flow).max(0.0);
            }

            totals = StepTotals::default();
            let mut max_change: f64 = 0.0;
            for n in 0..nn {
                let node = &mut project.nodes[n];
                node.inflow = inflow_acc[n];
                node.lateral_inflow = lateral[n];
                match node.kind {
                    NodeKind::Outfall { stage } => {
                        totals.outfall_outflow += net[n].max(0.0) * step_s;
                        node.depth = match stage {
                            OutfallStage::Fixed(depth) => depth,
                            OutfallStage::Free => 0.0,
                        };
                        node.volume = 0.0;
                        node.overflow = 0.0;
                    }
                    _ => {
                        let area = self.node_area[n];
                        let mut volume = start_volumes[n] + net[n] * step_s;
                        let mut overflow = 0.0;
                        if volume < 0.0 {
                            volume = 0.0;
                        }
                        let full_volume = if node.full_depth > 0.0 {
                            node.full_depth * area
                        } else {
                            f64::INFINITY
                        };
                        if volume > full_volume {
                            let excess = volume - full_volume;
                            if project.options.allow_ponding && node.ponded_area > 0.0 {
                                node.ponded_volume = excess;
                            } else {
                                overflow = excess / step_s;
                                totals.flooding += excess;
                            }
                            volume = full_volume;
                        } else {
                            node.ponded_volume = 0.0;
                        }
                        let depth = volume / area;
                        max_change = max_change.max((depth - node.depth).abs());
                        node.depth = depth;
                        node.volume = volume;
                        node.overflow = overflow;
                    }
                }
            }
            totals.lateral_inflow = lateral.iter().sum::<f64>() * step_s;

            if max_change < head_tol {
                converged = true;
                break;
            }
        }

        // refresh per-link depth/velocity/volume from the settled state
        finalize_link_state(project);

        if !project.options.ignore_quality && !project.pollutants.is_empty() {
            route_quality(project, step_s, &start_depths, &self.node_area);
        }

        if converged {
            self.consecutive_non_converge = 0;
        } else {
            self.non_converge_count += 1;
            self.consecutive_non_converge += 1;
            if self.consecutive_non_converge == 1 {
                warn!(step_s, "routing step did not converge");
            }
            if self.consecutive_non_converge >= NON_CONVERGE_LIMIT {
                return Err(SimError::NonConvergenceLimit {
                    limit: NON_CONVERGE_LIMIT,
                });
            }
        }

        Ok(totals)
    }

    fn compute_link_flows(&self, project: &Project) -> Vec<f64> {
        let nodes = &project.nodes;
        let options = &project.options;
        let links = &project.links;
        match &self.pool {
            Some(pool) => pool.install(|| {
                links
                    .par_iter()
                    .map(|link| link_flow(link, nodes, options))
                    .collect()
            }),
            None => links
                .iter()
                .map(|link| link_flow(link, nodes, options))
                .collect(),
        }
    }

    pub fn close(&mut self) {
        self.pool = None;
    }
}

/// Pending API/control setting changes take effect at the top of a step.
fn apply_pending_settings(project: &mut Project) {
    for link in &mut project.links {
        if link.setting != link.target_setting {
            link.setting = link.target_setting;
        }
    }
}

/// Explicit flow through one link from the current endpoint heads, cfs.
/// Positive flow runs from the upstream (from) node to the downstream node.
fn link_flow(link: &sf_project::Link, nodes: &[sf_project::Node], options: &Options) -> f64 {
    let up = &nodes[link.from_node];
    let dn = &nodes[link.to_node];
    let h1 = up.head();
    let h2 = dn.head();

    let mut q = match link.kind {
        LinkKind::Conduit {
            length,
            roughness,
            full_depth,
        } => {
            let crest = up.invert_elev + link.offset1;
            let depth = (h1 - crest).clamp(0.0, full_depth);
            if depth <= MIN_DEPTH {
                0.0
            } else {
                // friction slope: water surface for dynamic wave, bottom
                // slope for kinematic wave
                let slope = match options.routing_model {
                    RoutingModel::DynamicWave => (h1 - h2) / length,
                    RoutingModel::KinematicWave => link.slope(nodes).max(MIN_SLOPE),
                };
                let width = full_depth.max(MIN_DEPTH);
                let area = depth * width;
                let radius = area / (width + 2.0 * depth);
                let conveyance = 1.49 / roughness * area * radius.powf(2.0 / 3.0);
                conveyance * slope.abs().sqrt() * slope.signum()
            }
        }
        LinkKind::Pump { design_flow } => {
            if up.depth > MIN_DEPTH {
                link.setting * design_flow
            } else {
                0.0
            }
        }
        LinkKind::Orifice { cd, area } => {
            let crest = up.invert_elev + link.offset1;
            let head = h1.max(h2) - crest.max(h1.min(h2));
            if head <= 0.0 {
                0.0
            } else {
                let magnitude = link.setting * cd * area * (2.0 * GRAVITY * head).sqrt();
                if h1 >= h2 {
                    magnitude
                } else {
                    -magnitude
                }
            }
        }
        LinkKind::Weir { cw, crest_length } => {
            let crest = up.invert_elev + link.offset1;
            let head = h1 - crest;
            if head <= 0.0 {
                0.0
            } else {
                link.setting * cw * crest_length * head.powf(1.5)
            }
        }
        LinkKind::Outlet { coeff, expon } => {
            let crest = up.invert_elev + link.offset1;
            let head = h1 - crest;
            if head <= 0.0 {
                0.0
            } else {
                link.setting * coeff * head.powf(expon)
            }
        }
    };

    if link.has_flap_gate && q < 0.0 {
        q = 0.0;
    }
    if link.flow_limit > 0.0 {
        q = q.clamp(-link.flow_limit, link.flow_limit);
    }
    q
}

fn finalize_link_state(project: &mut Project) {
    let nodes = &project.nodes;
    for link in &mut project.links {
        match link.kind {
            LinkKind::Conduit {
                length, full_depth, ..
            } => {
                let up = &nodes[link.from_node];
                let crest = up.invert_elev + link.offset1;
                link.depth = (up.head() - crest).clamp(0.0, full_depth);
                let width = full_depth.max(MIN_DEPTH);
                let area = link.depth * width;
                link.volume = area * length;
                link.velocity = if area > 1.0e-6 { link.flow / area } else { 0.0 };
            }
            _ => {
                link.depth = nodes[link.from_node].depth;
                link.velocity = 0.0;
                link.volume = 0.0;
            }
        }
    }
}

/// Completely-mixed transport: node concentrations blend inflowing link
/// loads, links carry their upstream node's concentration.
fn route_quality(project: &mut Project, step_s: f64, start_depths: &[f64], node_area: &[f64]) {
    let npollut = project.pollutants.len();
    let nn = project.nodes.len();
    let mut mass_in = vec![vec![0.0; npollut]; nn];
    let mut flow_in = vec![0.0; nn];

    for sc in &project.subcatchments {
        if let Some(outlet) = sc.outlet {
            if sc.runoff > 0.0 {
                flow_in[outlet] += sc.runoff;
                for k in 0..npollut {
                    mass_in[outlet][k] += sc.runoff * sc.runoff_qual[k];
                }
            }
        }
    }
    for link in &project.links {
        let (src, dst, q) = if link.flow >= 0.0 {
            (link.from_node, link.to_node, link.flow)
        } else {
            (link.to_node, link.from_node, -link.flow)
        };
        if q > 0.0 {
            flow_in[dst] += q;
            for k in 0..npollut {
                mass_in[dst][k] += q * project.nodes[src].qual[k];
            }
        }
    }

    for (n, node) in project.nodes.iter_mut().enumerate() {
        let old_volume = start_depths[n] * node_area[n];
        let in_volume = flow_in[n] * step_s;
        let total = old_volume + in_volume;
        if total > 1.0e-6 {
            for k in 0..npollut {
                let old_mass = node.qual[k] * old_volume;
                let new_mass = mass_in[n][k] * step_s + node.api_ext_qual_mass[k] * step_s;
                node.qual[k] = (old_mass + new_mass) / total;
            }
        }
    }

    let node_qual: Vec<Vec<f64>> = project.nodes.iter().map(|n| n.qual.clone()).collect();
    for link in &mut project.links {
        let src = if link.flow >= 0.0 {
            link.from_node
        } else {
            link.to_node
        };
        for k in 0..npollut {
            link.qual[k] = node_qual[src][k];
            link.total_load[k] += link.flow.abs() * link.qual[k] * step_s;
        }
    }
}
