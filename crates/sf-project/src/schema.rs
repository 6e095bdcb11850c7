//! Project file schema definitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectFile {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub options: OptionsDef,
    #[serde(default)]
    pub raingauges: Vec<GaugeDef>,
    #[serde(default)]
    pub subcatchments: Vec<SubcatchDef>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub links: Vec<LinkDef>,
    #[serde(default)]
    pub pollutants: Vec<PollutantDef>,
    #[serde(default)]
    pub timeseries: Vec<TimeSeriesDef>,
    #[serde(default)]
    pub curves: Vec<CurveDef>,
    #[serde(default)]
    pub patterns: Vec<PatternDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptionsDef {
    pub start_date: String,
    pub end_date: String,
    /// First instant at which results are emitted; defaults to start_date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_start: Option<String>,
    pub flow_units: FlowUnitsDef,
    pub routing_model: RoutingModelDef,
    pub route_step_s: f64,
    pub min_route_step_s: f64,
    pub lengthening_step_s: f64,
    pub rule_step_s: f64,
    pub report_step_s: u32,
    pub wet_step_s: f64,
    pub dry_step_s: f64,
    pub courant_factor: f64,
    pub max_trials: u32,
    pub head_tolerance: f64,
    pub num_threads: usize,
    pub allow_ponding: bool,
    pub inertia_damping: InertiaDampingDef,
    pub surcharge_method: SurchargeMethodDef,
    pub ignore_rainfall: bool,
    pub ignore_routing: bool,
    pub ignore_quality: bool,
    /// Potential evaporation in user units (in/day or mm/day).
    pub evaporation: f64,
    pub report: ReportFlagsDef,
    /// Hot-start file to load as the initial routing state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotstart_use: Option<String>,
    /// Hot-start snapshots to save at given simulation times.
    pub hotstart_saves: Vec<HotstartSaveDef>,
}

impl Default for OptionsDef {
    fn default() -> Self {
        Self {
            start_date: "2024-01-01 00:00:00".to_string(),
            end_date: "2024-01-02 00:00:00".to_string(),
            report_start: None,
            flow_units: FlowUnitsDef::Cfs,
            routing_model: RoutingModelDef::DynamicWave,
            route_step_s: 20.0,
            min_route_step_s: 0.5,
            lengthening_step_s: 0.0,
            rule_step_s: 0.0,
            report_step_s: 900,
            wet_step_s: 300.0,
            dry_step_s: 3600.0,
            courant_factor: 0.75,
            max_trials: 8,
            head_tolerance: 0.005,
            num_threads: 1,
            allow_ponding: false,
            inertia_damping: InertiaDampingDef::Partial,
            surcharge_method: SurchargeMethodDef::Extran,
            ignore_rainfall: false,
            ignore_routing: false,
            ignore_quality: false,
            evaporation: 0.0,
            report: ReportFlagsDef::default(),
            hotstart_use: None,
            hotstart_saves: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowUnitsDef {
    Cfs,
    Gpm,
    Mgd,
    Cms,
    Lps,
    Mld,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoutingModelDef {
    KinematicWave,
    DynamicWave,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InertiaDampingDef {
    None,
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurchargeMethodDef {
    Extran,
    Slot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ReportFlagsDef {
    pub disabled: bool,
    pub input: bool,
    pub controls: bool,
    pub averages: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HotstartSaveDef {
    /// Simulation time at which to save, "YYYY-MM-DD HH:MM:SS".
    pub at: String,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GaugeDef {
    pub id: String,
    /// Rainfall intensity time series (by id); absent gauges report zero
    /// rainfall unless overridden through the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubcatchDef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raingauge: Option<String>,
    /// Receiving node id; runoff with no outlet leaves the system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlet: Option<String>,
    /// Area in user units (ac or ha).
    pub area: f64,
    /// Characteristic width in user units (ft or m).
    pub width: f64,
    #[serde(default = "default_slope")]
    pub slope: f64,
    #[serde(default)]
    pub curb_length: f64,
    /// Overland-flow Manning roughness.
    #[serde(default = "default_subcatch_n")]
    pub roughness: f64,
    /// Depression storage in user units (in or mm).
    #[serde(default)]
    pub depression_storage: f64,
    /// Maximum infiltration rate in user units (in/hr or mm/hr).
    #[serde(default)]
    pub infiltration_rate: f64,
}

fn default_slope() -> f64 {
    0.005
}

fn default_subcatch_n() -> f64 {
    0.05
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDef {
    Junction {
        id: String,
        invert: f64,
        #[serde(default)]
        max_depth: f64,
        #[serde(default)]
        init_depth: f64,
        #[serde(default)]
        surcharge_depth: f64,
        #[serde(default)]
        ponded_area: f64,
    },
    Outfall {
        id: String,
        invert: f64,
        #[serde(default)]
        stage: OutfallStageDef,
    },
    Storage {
        id: String,
        invert: f64,
        max_depth: f64,
        #[serde(default)]
        init_depth: f64,
        /// Constant plan area in user units (ft2 or m2).
        surface_area: f64,
    },
    Divider {
        id: String,
        invert: f64,
        #[serde(default)]
        max_depth: f64,
        #[serde(default)]
        init_depth: f64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutfallStageDef {
    #[default]
    Free,
    Fixed {
        /// Water depth above the outfall invert, user length units.
        depth: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkDef {
    Conduit {
        id: String,
        from: String,
        to: String,
        length: f64,
        roughness: f64,
        /// Full (maximum) flow depth, user length units.
        max_depth: f64,
        #[serde(default)]
        offset1: f64,
        #[serde(default)]
        offset2: f64,
        #[serde(default)]
        init_flow: f64,
        #[serde(default)]
        flow_limit: f64,
        #[serde(default)]
        inlet_loss: f64,
        #[serde(default)]
        outlet_loss: f64,
        #[serde(default)]
        average_loss: f64,
        #[serde(default)]
        seepage_rate: f64,
        #[serde(default)]
        flap_gate: bool,
    },
    Pump {
        id: String,
        from: String,
        to: String,
        /// Design (full-speed) flow in user flow units.
        design_flow: f64,
        #[serde(default = "default_on")]
        initial_on: bool,
    },
    Orifice {
        id: String,
        from: String,
        to: String,
        /// Discharge coefficient.
        #[serde(default = "default_cd")]
        cd: f64,
        /// Full-open area, internal ft2 after conversion from user units.
        area: f64,
        #[serde(default)]
        offset1: f64,
        #[serde(default)]
        flap_gate: bool,
    },
    Weir {
        id: String,
        from: String,
        to: String,
        #[serde(default = "default_cw")]
        cw: f64,
        crest_length: f64,
        /// Crest height above the upstream node invert, user length units.
        #[serde(default)]
        offset1: f64,
        #[serde(default)]
        flap_gate: bool,
    },
    Outlet {
        id: String,
        from: String,
        to: String,
        /// Rating-curve coefficient: q = coeff * head^expon.
        coeff: f64,
        #[serde(default = "default_expon")]
        expon: f64,
        #[serde(default)]
        offset1: f64,
        #[serde(default)]
        flap_gate: bool,
    },
}

fn default_on() -> bool {
    true
}

fn default_cd() -> f64 {
    0.65
}

fn default_cw() -> f64 {
    3.33
}

fn default_expon() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollutantDef {
    pub id: String,
    #[serde(default)]
    pub units: ConcUnitsDef,
    /// Concentration in rainfall.
    #[serde(default)]
    pub rain_concen: f64,
    /// Initial concentration throughout the network.
    #[serde(default)]
    pub init_concen: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConcUnitsDef {
    #[default]
    MgPerLiter,
    UgPerLiter,
    CountPerLiter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSeriesDef {
    pub id: String,
    /// (datetime string, value) pairs in ascending time order.
    pub points: Vec<TimeSeriesPointDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSeriesPointDef {
    pub time: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurveDef {
    pub id: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternDef {
    pub id: String,
    /// Hourly multipliers (24 entries).
    pub factors: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_project_parses() {
        let yaml = r#"
title: Empty
options:
  start_date: "2024-01-01 00:00:00"
  end_date: "2024-01-01 01:00:00"
  report_step_s: 600
"#;
        let file: ProjectFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.title, "Empty");
        assert_eq!(file.options.report_step_s, 600);
        // unspecified options take defaults
        assert_eq!(file.options.flow_units, FlowUnitsDef::Cfs);
        assert!(file.nodes.is_empty());
    }

    #[test]
    fn tagged_node_and_link_kinds() {
        let yaml = r#"
nodes:
  - type: junction
    id: J1
    invert: 10.0
    max_depth: 6.0
  - type: outfall
    id: O1
    invert: 0.0
    stage: { kind: fixed, depth: 2.0 }
links:
  - type: conduit
    id: C1
    from: J1
    to: O1
    length: 400.0
    roughness: 0.013
    max_depth: 2.0
"#;
        let file: ProjectFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.nodes.len(), 2);
        assert!(matches!(file.nodes[1], NodeDef::Outfall { .. }));
        assert!(matches!(file.links[0], LinkDef::Conduit { .. }));
    }

    #[test]
    fn schema_round_trips_through_yaml() {
        let file = ProjectFile {
            title: "RT".into(),
            options: OptionsDef::default(),
            raingauges: vec![GaugeDef {
                id: "G1".into(),
                series: None,
            }],
            subcatchments: vec![],
            nodes: vec![],
            links: vec![],
            pollutants: vec![],
            timeseries: vec![],
            curves: vec![],
            patterns: vec![],
        };
        let text = serde_yaml::to_string(&file).unwrap();
        let back: ProjectFile = serde_yaml::from_str(&text).unwrap();
        assert_eq!(file, back);
    }
}
