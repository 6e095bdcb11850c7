//! Runtime project object graph.
//!
//! Built once from the schema when a project is opened. All stored
//! quantities are in internal units (feet, ft2, cfs, ft/s); conversion to
//! and from the user's unit system happens at the property interface and
//! the results file. Object indices are stable for the project's lifetime
//! and are the canonical references between objects.

use std::collections::HashMap;

use sf_core::datetime::{self, DateTime, SEC_PER_DAY};
use sf_core::units::{ucf, FlowUnits, Quantity, UnitSystem};
use sf_core::ObjectKind;

use crate::schema::{
    ConcUnitsDef, FlowUnitsDef, InertiaDampingDef, LinkDef, NodeDef, OutfallStageDef, ProjectFile,
    RoutingModelDef, SurchargeMethodDef,
};
use crate::{ProjectError, ProjectResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingModel {
    KinematicWave = 1,
    DynamicWave = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InertiaDamping {
    None = 0,
    Partial = 1,
    Full = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurchargeMethod {
    Extran = 0,
    Slot = 1,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportFlags {
    pub disabled: bool,
    pub input: bool,
    pub controls: bool,
    pub averages: bool,
}

#[derive(Debug, Clone)]
pub struct HotstartSave {
    /// Simulation time of the save, milliseconds from the start date.
    pub at_ms: f64,
    pub file: String,
    pub done: bool,
}

/// Analysis options, mutable through the property interface before start
/// (and for a few members, during the run).
#[derive(Debug, Clone)]
pub struct Options {
    pub start_datetime: DateTime,
    pub end_datetime: DateTime,
    pub report_start: DateTime,
    pub flow_units: FlowUnits,
    pub unit_system: UnitSystem,
    pub routing_model: RoutingModel,
    pub route_step_s: f64,
    pub min_route_step_s: f64,
    pub lengthening_step_s: f64,
    pub rule_step_s: f64,
    pub report_step_s: u32,
    pub wet_step_s: f64,
    pub dry_step_s: f64,
    pub courant_factor: f64,
    pub max_trials: u32,
    /// Head convergence tolerance, internal ft.
    pub head_tolerance: f64,
    pub num_threads: usize,
    pub allow_ponding: bool,
    pub inertia_damping: InertiaDamping,
    pub surcharge_method: SurchargeMethod,
    pub ignore_rainfall: bool,
    pub ignore_routing: bool,
    pub ignore_quality: bool,
    /// Potential evaporation, internal ft/s.
    pub evap_rate: f64,
    pub report: ReportFlags,
    pub hotstart_use: Option<String>,
    pub hotstart_saves: Vec<HotstartSave>,
}

impl Options {
    /// Horizon length in whole milliseconds.
    pub fn total_duration_ms(&self) -> f64 {
        ((self.end_datetime - self.start_datetime) * SEC_PER_DAY).floor().max(0.0) * 1000.0
    }

    pub fn ucf(&self, q: Quantity) -> f64 {
        ucf(q, self.unit_system, self.flow_units)
    }
}

#[derive(Debug, Clone)]
pub struct Gauge {
    pub id: String,
    pub series: Option<usize>,
    /// Current rainfall intensity, internal ft/s.
    pub rainfall: f64,
    /// API override, internal ft/s; takes precedence over the series.
    pub api_rainfall: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Subcatchment {
    pub id: String,
    pub gauge: Option<usize>,
    pub outlet: Option<usize>,
    /// ft2
    pub area: f64,
    /// ft
    pub width: f64,
    pub slope: f64,
    /// ft
    pub curb_length: f64,
    pub roughness: f64,
    /// ft
    pub depression_storage: f64,
    /// ft/s
    pub infiltration_rate: f64,
    pub rpt_flag: bool,

    // runtime state
    /// ft/s
    pub rainfall: f64,
    /// ft/s
    pub evap_loss: f64,
    /// ft/s
    pub infil_loss: f64,
    /// cfs
    pub runoff: f64,
    /// ponded depth on the surface, ft
    pub depth: f64,
    /// API forcing, internal ft/s
    pub api_rainfall: Option<f64>,
    pub api_snowfall: Option<f64>,
    /// per-pollutant external buildup (mass)
    pub ext_buildup: Vec<f64>,
    /// per-pollutant runoff concentration
    pub runoff_qual: Vec<f64>,
    /// per-pollutant total washed-off load (mass)
    pub total_load: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutfallStage {
    Free,
    /// Fixed water depth above the outfall invert, ft.
    Fixed(f64),
}

#[derive(Debug, Clone, Copy)]
pub enum NodeKind {
    Junction,
    Outfall { stage: OutfallStage },
    /// Constant plan area, ft2.
    Storage { surface_area: f64 },
    Divider,
}

impl NodeKind {
    pub fn type_code(&self) -> i32 {
        match self {
            NodeKind::Junction => 0,
            NodeKind::Outfall { .. } => 1,
            NodeKind::Storage { .. } => 2,
            NodeKind::Divider => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    /// ft
    pub invert_elev: f64,
    /// maximum depth, ft
    pub full_depth: f64,
    /// ft
    pub init_depth: f64,
    /// ft
    pub surcharge_depth: f64,
    /// ft2
    pub ponded_area: f64,
    pub rpt_flag: bool,

    // runtime state
    /// ft
    pub depth: f64,
    /// ft3
    pub volume: f64,
    /// current lateral inflow, cfs
    pub lateral_inflow: f64,
    /// total inflow this step, cfs
    pub inflow: f64,
    /// overflow (flooding) rate, cfs
    pub overflow: f64,
    /// ft3
    pub ponded_volume: f64,
    /// API external inflow, cfs
    pub api_ext_inflow: f64,
    /// per-pollutant concentration
    pub qual: Vec<f64>,
    /// per-pollutant API lateral mass flux
    pub api_ext_qual_mass: Vec<f64>,
}

impl Node {
    pub fn head(&self) -> f64 {
        self.invert_elev + self.depth
    }

    /// Free surface area used by node continuity, ft2.
    pub fn surface_area(&self, min_area: f64) -> f64 {
        match self.kind {
            NodeKind::Storage { surface_area } => surface_area.max(min_area),
            _ => min_area,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LinkKind {
    Conduit {
        /// ft
        length: f64,
        roughness: f64,
        /// full flow depth, ft
        full_depth: f64,
    },
    Pump {
        /// design flow at full speed, cfs
        design_flow: f64,
    },
    Orifice {
        cd: f64,
        /// full-open area, ft2
        area: f64,
    },
    Weir {
        cw: f64,
        /// ft
        crest_length: f64,
    },
    Outlet {
        coeff: f64,
        expon: f64,
    },
}

impl LinkKind {
    pub fn type_code(&self) -> i32 {
        match self {
            LinkKind::Conduit { .. } => 0,
            LinkKind::Pump { .. } => 1,
            LinkKind::Orifice { .. } => 2,
            LinkKind::Weir { .. } => 3,
            LinkKind::Outlet { .. } => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Link {
    pub id: String,
    pub kind: LinkKind,
    pub from_node: usize,
    pub to_node: usize,
    /// upstream offset above the from-node invert, ft
    pub offset1: f64,
    /// downstream offset above the to-node invert, ft
    pub offset2: f64,
    /// initial flow, cfs
    pub init_flow: f64,
    /// user-imposed flow limit, cfs (0 = none)
    pub flow_limit: f64,
    pub c_loss_inlet: f64,
    pub c_loss_outlet: f64,
    pub c_loss_avg: f64,
    /// seepage loss rate, ft/s
    pub seep_rate: f64,
    pub has_flap_gate: bool,
    pub rpt_flag: bool,

    // runtime state
    /// cfs
    pub flow: f64,
    /// ft
    pub depth: f64,
    /// ft/s
    pub velocity: f64,
    /// ft3
    pub volume: f64,
    /// active control setting in [0,1] (pumps may exceed 1)
    pub setting: f64,
    /// setting requested through controls or the API
    pub target_setting: f64,
    /// date/time of the last zero/nonzero setting transition
    pub time_last_set: DateTime,
    /// per-pollutant concentration
    pub qual: Vec<f64>,
    /// per-pollutant API lateral mass flux
    pub api_ext_qual_mass: Vec<f64>,
    /// per-pollutant transported load (mass)
    pub total_load: Vec<f64>,
}

impl Link {
    /// Conduit bottom slope from endpoint inverts; zero for other kinds.
    pub fn slope(&self, nodes: &[Node]) -> f64 {
        match self.kind {
            LinkKind::Conduit { length, .. } if length > 0.0 => {
                let z1 = nodes[self.from_node].invert_elev + self.offset1;
                let z2 = nodes[self.to_node].invert_elev + self.offset2;
                (z1 - z2) / length
            }
            _ => 0.0,
        }
    }

    pub fn full_depth(&self) -> f64 {
        match self.kind {
            LinkKind::Conduit { full_depth, .. } => full_depth,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcUnits {
    MgPerLiter = 0,
    UgPerLiter = 1,
    CountPerLiter = 2,
}

#[derive(Debug, Clone)]
pub struct Pollutant {
    pub id: String,
    pub units: ConcUnits,
    pub rain_concen: f64,
    pub init_concen: f64,
}

#[derive(Debug, Clone)]
pub struct TimeSeries {
    pub id: String,
    pub points: Vec<(DateTime, f64)>,
}

impl TimeSeries {
    /// Step-function lookup: value of the last point at or before `date`.
    pub fn value_at(&self, date: DateTime) -> f64 {
        let mut value = 0.0;
        for &(t, v) in &self.points {
            if t > date {
                break;
            }
            value = v;
        }
        value
    }
}

#[derive(Debug, Clone)]
pub struct Curve {
    pub id: String,
    pub points: Vec<(f64, f64)>,
}

impl Curve {
    /// Piecewise-linear lookup clamped to the curve's range.
    pub fn lookup(&self, x: f64) -> f64 {
        match self.points.as_slice() {
            [] => 0.0,
            [only] => only.1,
            points => {
                if x <= points[0].0 {
                    return points[0].1;
                }
                for pair in points.windows(2) {
                    let (x0, y0) = pair[0];
                    let (x1, y1) = pair[1];
                    if x <= x1 {
                        let f = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
                        return y0 + f * (y1 - y0);
                    }
                }
                points[points.len() - 1].1
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: String,
    pub factors: Vec<f64>,
}

/// The live project: owner of every object, addressed by index.
#[derive(Debug)]
pub struct Project {
    pub title: String,
    pub options: Options,
    pub gauges: Vec<Gauge>,
    pub subcatchments: Vec<Subcatchment>,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub pollutants: Vec<Pollutant>,
    pub timeseries: Vec<TimeSeries>,
    pub curves: Vec<Curve>,
    pub patterns: Vec<Pattern>,
    index: HashMap<(ObjectKind, String), usize>,
}

fn insert_id(
    index: &mut HashMap<(ObjectKind, String), usize>,
    kind: ObjectKind,
    kind_name: &'static str,
    id: &str,
    i: usize,
) -> ProjectResult<()> {
    if index.insert((kind, id.to_string()), i).is_some() {
        Err(ProjectError::DuplicateId {
            kind: kind_name,
            id: id.to_string(),
        })
    } else {
        Ok(())
    }
}

impl Project {
    pub fn from_schema(file: ProjectFile) -> ProjectResult<Self> {
        let opt = &file.options;
        let flow_units = match opt.flow_units {
            FlowUnitsDef::Cfs => FlowUnits::Cfs,
            FlowUnitsDef::Gpm => FlowUnits::Gpm,
            FlowUnitsDef::Mgd => FlowUnits::Mgd,
            FlowUnitsDef::Cms => FlowUnits::Cms,
            FlowUnitsDef::Lps => FlowUnits::Lps,
            FlowUnitsDef::Mld => FlowUnits::Mld,
        };
        let unit_system = flow_units.unit_system();
        let u = |q: Quantity| ucf(q, unit_system, flow_units);

        let start_datetime = datetime::parse(&opt.start_date)?;
        let end_datetime = datetime::parse(&opt.end_date)?;
        let report_start = match &opt.report_start {
            Some(text) => datetime::parse(text)?,
            None => start_datetime,
        };

        if opt.report_step_s == 0 {
            return Err(ProjectError::OptionValue {
                what: "report_step_s must be positive".into(),
            });
        }
        if opt.route_step_s <= 0.0 || opt.min_route_step_s <= 0.0 {
            return Err(ProjectError::OptionValue {
                what: "routing steps must be positive".into(),
            });
        }

        let hotstart_saves = opt
            .hotstart_saves
            .iter()
            .map(|save| {
                let at = datetime::parse(&save.at)?;
                Ok(HotstartSave {
                    at_ms: (at - start_datetime) * SEC_PER_DAY * 1000.0,
                    file: save.file.clone(),
                    done: false,
                })
            })
            .collect::<ProjectResult<Vec<_>>>()?;

        let options = Options {
            start_datetime,
            end_datetime,
            report_start,
            flow_units,
            unit_system,
            routing_model: match opt.routing_model {
                RoutingModelDef::KinematicWave => RoutingModel::KinematicWave,
                RoutingModelDef::DynamicWave => RoutingModel::DynamicWave,
            },
            route_step_s: opt.route_step_s,
            min_route_step_s: opt.min_route_step_s,
            lengthening_step_s: opt.lengthening_step_s,
            rule_step_s: opt.rule_step_s,
            report_step_s: opt.report_step_s,
            wet_step_s: opt.wet_step_s,
            dry_step_s: opt.dry_step_s,
            courant_factor: opt.courant_factor,
            max_trials: opt.max_trials,
            head_tolerance: opt.head_tolerance / u(Quantity::Length),
            num_threads: opt.num_threads.max(1),
            allow_ponding: opt.allow_ponding,
            inertia_damping: match opt.inertia_damping {
                InertiaDampingDef::None => InertiaDamping::None,
                InertiaDampingDef::Partial => InertiaDamping::Partial,
                InertiaDampingDef::Full => InertiaDamping::Full,
            },
            surcharge_method: match opt.surcharge_method {
                SurchargeMethodDef::Extran => SurchargeMethod::Extran,
                SurchargeMethodDef::Slot => SurchargeMethod::Slot,
            },
            ignore_rainfall: opt.ignore_rainfall,
            ignore_routing: opt.ignore_routing,
            ignore_quality: opt.ignore_quality,
            evap_rate: opt.evaporation / u(Quantity::EvapRate),
            report: ReportFlags {
                disabled: opt.report.disabled,
                input: opt.report.input,
                controls: opt.report.controls,
                averages: opt.report.averages,
            },
            hotstart_use: opt.hotstart_use.clone(),
            hotstart_saves,
        };

        let mut index: HashMap<(ObjectKind, String), usize> = HashMap::new();

        let mut timeseries = Vec::with_capacity(file.timeseries.len());
        for (i, def) in file.timeseries.iter().enumerate() {
            insert_id(&mut index, ObjectKind::TimeSeries, "time series", &def.id, i)?;
            let mut points = Vec::with_capacity(def.points.len());
            for p in &def.points {
                points.push((datetime::parse(&p.time)?, p.value));
            }
            timeseries.push(TimeSeries {
                id: def.id.clone(),
                points,
            });
        }

        let mut curves = Vec::with_capacity(file.curves.len());
        for (i, def) in file.curves.iter().enumerate() {
            insert_id(&mut index, ObjectKind::Curve, "curve", &def.id, i)?;
            curves.push(Curve {
                id: def.id.clone(),
                points: def.points.clone(),
            });
        }

        let mut patterns = Vec::with_capacity(file.patterns.len());
        for (i, def) in file.patterns.iter().enumerate() {
            insert_id(&mut index, ObjectKind::Pattern, "pattern", &def.id, i)?;
            patterns.push(Pattern {
                id: def.id.clone(),
                factors: def.factors.clone(),
            });
        }

        let mut pollutants = Vec::with_capacity(file.pollutants.len());
        for (i, def) in file.pollutants.iter().enumerate() {
            insert_id(&mut index, ObjectKind::Pollutant, "pollutant", &def.id, i)?;
            pollutants.push(Pollutant {
                id: def.id.clone(),
                units: match def.units {
                    ConcUnitsDef::MgPerLiter => ConcUnits::MgPerLiter,
                    ConcUnitsDef::UgPerLiter => ConcUnits::UgPerLiter,
                    ConcUnitsDef::CountPerLiter => ConcUnits::CountPerLiter,
                },
                rain_concen: def.rain_concen,
                init_concen: def.init_concen,
            });
        }
        let npollut = pollutants.len();

        let mut gauges = Vec::with_capacity(file.raingauges.len());
        for (i, def) in file.raingauges.iter().enumerate() {
            insert_id(&mut index, ObjectKind::Gauge, "rain gauge", &def.id, i)?;
            let series = match &def.series {
                Some(sid) => Some(
                    index
                        .get(&(ObjectKind::TimeSeries, sid.clone()))
                        .copied()
                        .ok_or_else(|| ProjectError::UnknownReference {
                            kind: "time series",
                            id: sid.clone(),
                            context: format!("rain gauge {}", def.id),
                        })?,
                ),
                None => None,
            };
            gauges.push(Gauge {
                id: def.id.clone(),
                series,
                rainfall: 0.0,
                api_rainfall: None,
            });
        }

        let mut nodes = Vec::with_capacity(file.nodes.len());
        for (i, def) in file.nodes.iter().enumerate() {
            let (id, kind, invert, full_depth, init_depth, surcharge_depth, ponded_area) = match def
            {
                NodeDef::Junction {
                    id,
                    invert,
                    max_depth,
                    init_depth,
                    surcharge_depth,
                    ponded_area,
                } => (
                    id,
                    NodeKind::Junction,
                    *invert,
                    *max_depth,
                    *init_depth,
                    *surcharge_depth,
                    *ponded_area,
                ),
                NodeDef::Outfall { id, invert, stage } => (
                    id,
                    NodeKind::Outfall {
                        stage: match stage {
                            OutfallStageDef::Free => OutfallStage::Free,
                            OutfallStageDef::Fixed { depth } => {
                                OutfallStage::Fixed(depth / u(Quantity::Length))
                            }
                        },
                    },
                    *invert,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                ),
                NodeDef::Storage {
                    id,
                    invert,
                    max_depth,
                    init_depth,
                    surface_area,
                } => (
                    id,
                    NodeKind::Storage {
                        surface_area: surface_area
                            / (u(Quantity::Length) * u(Quantity::Length)),
                    },
                    *invert,
                    *max_depth,
                    *init_depth,
                    0.0,
                    0.0,
                ),
                NodeDef::Divider {
                    id,
                    invert,
                    max_depth,
                    init_depth,
                } => (
                    id,
                    NodeKind::Divider,
                    *invert,
                    *max_depth,
                    *init_depth,
                    0.0,
                    0.0,
                ),
            };
            insert_id(&mut index, ObjectKind::Node, "node", id, i)?;
            nodes.push(Node {
                id: id.clone(),
                kind,
                invert_elev: invert / u(Quantity::Length),
                full_depth: full_depth / u(Quantity::Length),
                init_depth: init_depth / u(Quantity::Length),
                surcharge_depth: surcharge_depth / u(Quantity::Length),
                ponded_area: ponded_area / u(Quantity::LandArea),
                rpt_flag: true,
                depth: 0.0,
                volume: 0.0,
                lateral_inflow: 0.0,
                inflow: 0.0,
                overflow: 0.0,
                ponded_volume: 0.0,
                api_ext_inflow: 0.0,
                qual: vec![0.0; npollut],
                api_ext_qual_mass: vec![0.0; npollut],
            });
        }

        let find_node = |index: &HashMap<(ObjectKind, String), usize>,
                         id: &str,
                         link: &str|
         -> ProjectResult<usize> {
            index
                .get(&(ObjectKind::Node, id.to_string()))
                .copied()
                .ok_or_else(|| ProjectError::UnknownReference {
                    kind: "node",
                    id: id.to_string(),
                    context: format!("link {link}"),
                })
        };

        let mut links = Vec::with_capacity(file.links.len());
        for (i, def) in file.links.iter().enumerate() {
            let built = match def {
                LinkDef::Conduit {
                    id,
                    from,
                    to,
                    length,
                    roughness,
                    max_depth,
                    offset1,
                    offset2,
                    init_flow,
                    flow_limit,
                    inlet_loss,
                    outlet_loss,
                    average_loss,
                    seepage_rate,
                    flap_gate,
                } => {
                    insert_id(&mut index, ObjectKind::Link, "link", id, i)?;
                    Link {
                        id: id.clone(),
                        kind: LinkKind::Conduit {
                            length: length / u(Quantity::Length),
                            roughness: *roughness,
                            full_depth: max_depth / u(Quantity::Length),
                        },
                        from_node: find_node(&index, from, id)?,
                        to_node: find_node(&index, to, id)?,
                        offset1: offset1 / u(Quantity::Length),
                        offset2: offset2 / u(Quantity::Length),
                        init_flow: init_flow / u(Quantity::Flow),
                        flow_limit: flow_limit / u(Quantity::Flow),
                        c_loss_inlet: *inlet_loss,
                        c_loss_outlet: *outlet_loss,
                        c_loss_avg: *average_loss,
                        seep_rate: seepage_rate / u(Quantity::Rainfall),
                        has_flap_gate: *flap_gate,
                        rpt_flag: true,
                        flow: init_flow / u(Quantity::Flow),
                        depth: 0.0,
                        velocity: 0.0,
                        volume: 0.0,
                        setting: 1.0,
                        target_setting: 1.0,
                        time_last_set: start_datetime,
                        qual: vec![0.0; npollut],
                        api_ext_qual_mass: vec![0.0; npollut],
                        total_load: vec![0.0; npollut],
                    }
                }
                LinkDef::Pump {
                    id,
                    from,
                    to,
                    design_flow,
                    initial_on,
                } => {
                    insert_id(&mut index, ObjectKind::Link, "link", id, i)?;
                    let setting = if *initial_on { 1.0 } else { 0.0 };
                    Link {
                        id: id.clone(),
                        kind: LinkKind::Pump {
                            design_flow: design_flow / u(Quantity::Flow),
                        },
                        from_node: find_node(&index, from, id)?,
                        to_node: find_node(&index, to, id)?,
                        offset1: 0.0,
                        offset2: 0.0,
                        init_flow: 0.0,
                        flow_limit: 0.0,
                        c_loss_inlet: 0.0,
                        c_loss_outlet: 0.0,
                        c_loss_avg: 0.0,
                        seep_rate: 0.0,
                        has_flap_gate: false,
                        rpt_flag: true,
                        flow: 0.0,
                        depth: 0.0,
                        velocity: 0.0,
                        volume: 0.0,
                        setting,
                        target_setting: setting,
                        time_last_set: start_datetime,
                        qual: vec![0.0; npollut],
                        api_ext_qual_mass: vec![0.0; npollut],
                        total_load: vec![0.0; npollut],
                    }
                }
                LinkDef::Orifice {
                    id,
                    from,
                    to,
                    cd,
                    area,
                    offset1,
                    flap_gate,
                } => {
                    insert_id(&mut index, ObjectKind::Link, "link", id, i)?;
                    Link {
                        id: id.clone(),
                        kind: LinkKind::Orifice {
                            cd: *cd,
                            area: area / (u(Quantity::Length) * u(Quantity::Length)),
                        },
                        from_node: find_node(&index, from, id)?,
                        to_node: find_node(&index, to, id)?,
                        offset1: offset1 / u(Quantity::Length),
                        offset2: 0.0,
                        init_flow: 0.0,
                        flow_limit: 0.0,
                        c_loss_inlet: 0.0,
                        c_loss_outlet: 0.0,
                        c_loss_avg: 0.0,
                        seep_rate: 0.0,
                        has_flap_gate: *flap_gate,
                        rpt_flag: true,
                        flow: 0.0,
                        depth: 0.0,
                        velocity: 0.0,
                        volume: 0.0,
                        setting: 1.0,
                        target_setting: 1.0,
                        time_last_set: start_datetime,
                        qual: vec![0.0; npollut],
                        api_ext_qual_mass: vec![0.0; npollut],
                        total_load: vec![0.0; npollut],
                    }
                }
                LinkDef::Weir {
                    id,
                    from,
                    to,
                    cw,
                    crest_length,
                    offset1,
                    flap_gate,
                } => {
                    insert_id(&mut index, ObjectKind::Link, "link", id, i)?;
                    Link {
                        id: id.clone(),
                        kind: LinkKind::Weir {
                            cw: *cw,
                            crest_length: crest_length / u(Quantity::Length),
                        },
                        from_node: find_node(&index, from, id)?,
                        to_node: find_node(&index, to, id)?,
                        offset1: offset1 / u(Quantity::Length),
                        offset2: 0.0,
                        init_flow: 0.0,
                        flow_limit: 0.0,
                        c_loss_inlet: 0.0,
                        c_loss_outlet: 0.0,
                        c_loss_avg: 0.0,
                        seep_rate: 0.0,
                        has_flap_gate: *flap_gate,
                        rpt_flag: true,
                        flow: 0.0,
                        depth: 0.0,
                        velocity: 0.0,
                        volume: 0.0,
                        setting: 1.0,
                        target_setting: 1.0,
                        time_last_set: start_datetime,
                        qual: vec![0.0; npollut],
                        api_ext_qual_mass: vec![0.0; npollut],
                        total_load: vec![0.0; npollut],
                    }
                }
                LinkDef::Outlet {
                    id,
                    from,
                    to,
                    coeff,
                    expon,
                    offset1,
                    flap_gate,
                } => {
                    insert_id(&mut index, ObjectKind::Link, "link", id, i)?;
                    Link {
                        id: id.clone(),
                        kind: LinkKind::Outlet {
                            coeff: *coeff,
                            expon: *expon,
                        },
                        from_node: find_node(&index, from, id)?,
                        to_node: find_node(&index, to, id)?,
                        offset1: offset1 / u(Quantity::Length),
                        offset2: 0.0,
                        init_flow: 0.0,
                        flow_limit: 0.0,
                        c_loss_inlet: 0.0,
                        c_loss_outlet: 0.0,
                        c_loss_avg: 0.0,
                        seep_rate: 0.0,
                        has_flap_gate: *flap_gate,
                        rpt_flag: true,
                        flow: 0.0,
                        depth: 0.0,
                        velocity: 0.0,
                        volume: 0.0,
                        setting: 1.0,
                        target_setting: 1.0,
                        time_last_set: start_datetime,
                        qual: vec![0.0; npollut],
                        api_ext_qual_mass: vec![0.0; npollut],
                        total_load: vec![0.0; npollut],
                    }
                }
            };
            links.push(built);
        }

        let mut subcatchments = Vec::with_capacity(file.subcatchments.len());
        for (i, def) in file.subcatchments.iter().enumerate() {
            insert_id(&mut index, ObjectKind::Subcatchment, "subcatchment", &def.id, i)?;
            let gauge = match &def.raingauge {
                Some(gid) => Some(
                    index
                        .get(&(ObjectKind::Gauge, gid.clone()))
                        .copied()
                        .ok_or_else(|| ProjectError::UnknownReference {
                            kind: "rain gauge",
                            id: gid.clone(),
                            context: format!("subcatchment {}", def.id),
                        })?,
                ),
                None => None,
            };
            let outlet = match &def.outlet {
                Some(nid) => Some(find_node(&index, nid, &def.id)?),
                None => None,
            };
            subcatchments.push(Subcatchment {
                id: def.id.clone(),
                gauge,
                outlet,
                area: def.area / u(Quantity::LandArea),
                width: def.width / u(Quantity::Length),
                slope: def.slope,
                curb_length: def.curb_length / u(Quantity::Length),
                roughness: def.roughness,
                depression_storage: def.depression_storage / u(Quantity::RainDepth),
                infiltration_rate: def.infiltration_rate / u(Quantity::Rainfall),
                rpt_flag: true,
                rainfall: 0.0,
                evap_loss: 0.0,
                infil_loss: 0.0,
                runoff: 0.0,
                depth: 0.0,
                api_rainfall: None,
                api_snowfall: None,
                ext_buildup: vec![0.0; npollut],
                runoff_qual: vec![0.0; npollut],
                total_load: vec![0.0; npollut],
            });
        }

        Ok(Self {
            title: file.title,
            options,
            gauges,
            subcatchments,
            nodes,
            links,
            pollutants,
            timeseries,
            curves,
            patterns,
            index,
        })
    }

    /// Reset all runtime state to the cold-start initial condition.
    pub fn init_state(&mut self) {
        let start = self.options.start_datetime;
        for gauge in &mut self.gauges {
            gauge.rainfall = 0.0;
        }
        for sc in &mut self.subcatchments {
            sc.rainfall = 0.0;
            sc.evap_loss = 0.0;
            sc.infil_loss = 0.0;
            sc.runoff = 0.0;
            sc.depth = 0.0;
            sc.runoff_qual.fill(0.0);
            sc.total_load.fill(0.0);
        }
        for node in &mut self.nodes {
            node.depth = node.init_depth;
            if let NodeKind::Outfall {
                stage: OutfallStage::Fixed(stage),
            } = node.kind
            {
                node.depth = stage;
            }
            node.volume = node.depth * node.surface_area(MIN_SURF_AREA);
            node.lateral_inflow = 0.0;
            node.inflow = 0.0;
            node.overflow = 0.0;
            node.ponded_volume = 0.0;
            for (q, p) in node.qual.iter_mut().zip(&self.pollutants) {
                *q = p.init_concen;
            }
        }
        for link in &mut self.links {
            link.flow = link.init_flow;
            link.depth = 0.0;
            link.velocity = 0.0;
            link.volume = 0.0;
            link.time_last_set = start;
            for (q, p) in link.qual.iter_mut().zip(&self.pollutants) {
                *q = p.init_concen;
            }
            link.total_load.fill(0.0);
        }
    }

    pub fn count(&self, kind: ObjectKind) -> usize {
        match kind {
            ObjectKind::Gauge => self.gauges.len(),
            ObjectKind::Subcatchment => self.subcatchments.len(),
            ObjectKind::Node => self.nodes.len(),
            ObjectKind::Link => self.links.len(),
            ObjectKind::Pollutant => self.pollutants.len(),
            ObjectKind::TimeSeries => self.timeseries.len(),
            ObjectKind::Curve => self.curves.len(),
            ObjectKind::Pattern => self.patterns.len(),
            ObjectKind::System => 1,
        }
    }

    /// Index of a named object, if present.
    pub fn find_object(&self, kind: ObjectKind, id: &str) -> Option<usize> {
        self.index.get(&(kind, id.to_string())).copied()
    }

    pub fn object_name(&self, kind: ObjectKind, index: usize) -> Option<&str> {
        match kind {
            ObjectKind::Gauge => self.gauges.get(index).map(|o| o.id.as_str()),
            ObjectKind::Subcatchment => self.subcatchments.get(index).map(|o| o.id.as_str()),
            ObjectKind::Node => self.nodes.get(index).map(|o| o.id.as_str()),
            ObjectKind::Link => self.links.get(index).map(|o| o.id.as_str()),
            ObjectKind::Pollutant => self.pollutants.get(index).map(|o| o.id.as_str()),
            ObjectKind::TimeSeries => self.timeseries.get(index).map(|o| o.id.as_str()),
            ObjectKind::Curve => self.curves.get(index).map(|o| o.id.as_str()),
            ObjectKind::Pattern => self.patterns.get(index).map(|o| o.id.as_str()),
            ObjectKind::System => None,
        }
    }
}

/// Smallest free surface area assigned to any node, ft2.
pub const MIN_SURF_AREA: f64 = 12.566;

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str) -> Project {
        let file: ProjectFile = serde_yaml::from_str(yaml).unwrap();
        Project::from_schema(file).unwrap()
    }

    #[test]
    fn resolves_references_to_indices() {
        let project = build(
            r#"
raingauges:
  - { id: G1 }
subcatchments:
  - { id: S1, raingauge: G1, outlet: J1, area: 5.0, width: 500.0 }
nodes:
  - { type: junction, id: J1, invert: 10.0, max_depth: 6.0 }
  - { type: outfall, id: O1, invert: 0.0 }
links:
  - { type: conduit, id: C1, from: J1, to: O1, length: 400.0, roughness: 0.013, max_depth: 2.0 }
"#,
        );
        assert_eq!(project.subcatchments[0].gauge, Some(0));
        assert_eq!(project.subcatchments[0].outlet, Some(0));
        assert_eq!(project.links[0].from_node, 0);
        assert_eq!(project.links[0].to_node, 1);
        assert_eq!(project.find_object(ObjectKind::Node, "O1"), Some(1));
        assert_eq!(project.object_name(ObjectKind::Link, 0), Some("C1"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let file: ProjectFile = serde_yaml::from_str(
            r#"
nodes:
  - { type: junction, id: J1, invert: 0.0 }
  - { type: junction, id: J1, invert: 1.0 }
"#,
        )
        .unwrap();
        let err = Project::from_schema(file).unwrap_err();
        assert_eq!(err.code(), sf_core::error::codes::DUPLICATE_ID);
    }

    #[test]
    fn unknown_node_reference_rejected() {
        let file: ProjectFile = serde_yaml::from_str(
            r#"
nodes:
  - { type: junction, id: J1, invert: 0.0 }
links:
  - { type: conduit, id: C1, from: J1, to: MISSING, length: 100.0, roughness: 0.013, max_depth: 1.0 }
"#,
        )
        .unwrap();
        let err = Project::from_schema(file).unwrap_err();
        assert_eq!(err.code(), sf_core::error::codes::UNKNOWN_REFERENCE);
    }

    #[test]
    fn si_inputs_are_stored_internally() {
        let project = build(
            r#"
options:
  flow_units: CMS
nodes:
  - { type: junction, id: J1, invert: 3.048 }
"#,
        );
        // 3.048 m invert stored as 10 ft
        assert!((project.nodes[0].invert_elev - 10.0).abs() < 1e-9);
    }

    #[test]
    fn total_duration_from_dates() {
        let project = build(
            r#"
options:
  start_date: "2024-01-01 00:00:00"
  end_date: "2024-01-01 01:00:00"
"#,
        );
        assert_eq!(project.options.total_duration_ms(), 3_600_000.0);
    }

    #[test]
    fn timeseries_step_lookup() {
        let ts = TimeSeries {
            id: "T".into(),
            points: vec![(0.0, 1.0), (1.0, 2.0)],
        };
        assert_eq!(ts.value_at(-0.5), 0.0);
        assert_eq!(ts.value_at(0.5), 1.0);
        assert_eq!(ts.value_at(1.5), 2.0);
    }

    #[test]
    fn curve_interpolation_clamps() {
        let curve = Curve {
            id: "C".into(),
            points: vec![(0.0, 0.0), (2.0, 4.0)],
        };
        assert_eq!(curve.lookup(-1.0), 0.0);
        assert_eq!(curve.lookup(1.0), 2.0);
        assert_eq!(curve.lookup(5.0), 4.0);
    }

    #[test]
    fn init_state_applies_initial_depths() {
        let mut project = build(
            r#"
nodes:
  - { type: junction, id: J1, invert: 10.0, max_depth: 6.0, init_depth: 1.5 }
  - { type: outfall, id: O1, invert: 0.0, stage: { kind: fixed, depth: 2.0 } }
"#,
        );
        project.init_state();
        assert!((project.nodes[0].depth - 1.5).abs() < 1e-12);
        assert!((project.nodes[1].depth - 2.0).abs() < 1e-12);
    }
}
