//! The typed property interface.
//!
//! Every observable quantity is addressed by `(object type, property
//! code, object index, sub-index)`. Property codes live in disjoint
//! numeric ranges per object class (system < 100, gauge 100-199,
//! subcatchment 200-299, node 300-399, link 400-499) so the legacy
//! single-code form can dispatch on the code alone; the expanded form
//! keys on the object type. Values and errors travel out of band: getters
//! return `Result<f64, _>` instead of a sentinel in the value channel.
//!
//! Writability is a property of the code itself: each enum answers
//! `writable(started)` and setters consult that one predicate, which
//! keeps the lifecycle-phase table checkable in one place.

use sf_core::datetime::MSEC_PER_DAY;
use sf_core::units::Quantity;
use sf_core::ObjectKind;
use sf_output::{ElementType, OutputReader};
use sf_project::{LinkKind, NodeKind, OutfallStage, Project, RoutingModel};

use crate::engine::Engine;
use crate::{EngineError, EngineResult};

/// System-wide properties (codes < 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemProp {
    StartDate = 0,
    CurrentDate = 1,
    ElapsedTime = 2,
    RouteStep = 3,
    MaxRouteStep = 4,
    ReportStep = 5,
    TotalSteps = 6,
    NoReport = 7,
    FlowUnits = 8,
    EndDate = 9,
    ReportStart = 10,
    UnitSystem = 11,
    SurchargeMethod = 12,
    AllowPonding = 13,
    InertiaDamping = 14,
    IgnoreRainfall = 15,
    IgnoreRouting = 16,
    IgnoreQuality = 17,
    ErrorCode = 18,
    RuleStep = 19,
    NumThreads = 20,
    MinRouteStep = 21,
    LengtheningStep = 22,
    CourantFactor = 23,
    MaxTrials = 24,
    HeadTolerance = 25,
    RunoffError = 26,
    FlowError = 27,
    QualError = 28,
    Warnings = 29,
}

impl SystemProp {
    pub fn from_code(code: u16) -> Option<Self> {
        use SystemProp::*;
        Some(match code {
            0 => StartDate,
            1 => CurrentDate,
            2 => ElapsedTime,
            3 => RouteStep,
            4 => MaxRouteStep,
            5 => ReportStep,
            6 => TotalSteps,
            7 => NoReport,
            8 => FlowUnits,
            9 => EndDate,
            10 => ReportStart,
            11 => UnitSystem,
            12 => SurchargeMethod,
            13 => AllowPonding,
            14 => InertiaDamping,
            15 => IgnoreRainfall,
            16 => IgnoreRouting,
            17 => IgnoreQuality,
            18 => ErrorCode,
            19 => RuleStep,
            20 => NumThreads,
            21 => MinRouteStep,
            22 => LengtheningStep,
            23 => CourantFactor,
            24 => MaxTrials,
            25 => HeadTolerance,
            26 => RunoffError,
            27 => FlowError,
            28 => QualError,
            29 => Warnings,
            _ => return None,
        })
    }

    /// Is a write legal in the given lifecycle phase?
    pub fn writable(self, started: bool) -> bool {
        use SystemProp::*;
        match self {
            // the routing step is the one knob live during a run
            RouteStep => true,
            StartDate | EndDate | ReportStart | ReportStep | NoReport | SurchargeMethod
            | AllowPonding | InertiaDamping | IgnoreRainfall | IgnoreRouting | IgnoreQuality
            | RuleStep | NumThreads | MinRouteStep | LengtheningStep | CourantFactor
            | MaxTrials | HeadTolerance => !started,
            _ => false,
        }
    }
}

/// Rain gauge properties (codes 100-199).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeProp {
    Rainfall = 100,
    TotalPrecipitation = 101,
}

impl GaugeProp {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            100 => Some(Self::Rainfall),
            101 => Some(Self::TotalPrecipitation),
            _ => None,
        }
    }

    pub fn writable(self, _started: bool) -> bool {
        matches!(self, Self::Rainfall)
    }
}

/// Subcatchment properties (codes 200-299).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubcatchProp {
    Area = 200,
    RainGauge = 201,
    Width = 202,
    Slope = 203,
    CurbLength = 204,
    Rainfall = 205,
    Evaporation = 206,
    Infiltration = 207,
    Runoff = 208,
    ReportFlag = 209,
    ApiRainfall = 210,
    ApiSnowfall = 211,
    ExternalBuildup = 212,
    RunoffConcentration = 213,
    TotalLoad = 214,
}

impl SubcatchProp {
    pub fn from_code(code: u16) -> Option<Self> {
        use SubcatchProp::*;
        Some(match code {
            200 => Area,
            201 => RainGauge,
            202 => Width,
            203 => Slope,
            204 => CurbLength,
            205 => Rainfall,
            206 => Evaporation,
            207 => Infiltration,
            208 => Runoff,
            209 => ReportFlag,
            210 => ApiRainfall,
            211 => ApiSnowfall,
            212 => ExternalBuildup,
            213 => RunoffConcentration,
            214 => TotalLoad,
            _ => return None,
        })
    }

    pub fn writable(self, started: bool) -> bool {
        use SubcatchProp::*;
        match self {
            // API forcing stays live during the run
            ApiRainfall | ApiSnowfall | ExternalBuildup => true,
            Area | Width | Slope | CurbLength | ReportFlag => !started,
            _ => false,
        }
    }
}

/// Node properties (codes 300-399).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeProp {
    Type = 300,
    InvertElev = 301,
    MaxDepth = 302,
    InitDepth = 303,
    SurchargeDepth = 304,
    PondedArea = 305,
    Depth = 306,
    Head = 307,
    Volume = 308,
    LateralInflow = 309,
    TotalInflow = 310,
    Overflow = 311,
    ReportFlag = 312,
    PollutantConcentration = 313,
    PollutantLatMassFlux = 314,
}

impl NodeProp {
    pub fn from_code(code: u16) -> Option<Self> {
        use NodeProp::*;
        Some(match code {
            300 => Type,
            301 => InvertElev,
            302 => MaxDepth,
            303 => InitDepth,
            304 => SurchargeDepth,
            305 => PondedArea,
            306 => Depth,
            307 => Head,
            308 => Volume,
            309 => LateralInflow,
            310 => TotalInflow,
            311 => Overflow,
            312 => ReportFlag,
            313 => PollutantConcentration,
            314 => PollutantLatMassFlux,
            _ => return None,
        })
    }

    pub fn writable(self, started: bool) -> bool {
        use NodeProp::*;
        match self {
            // lateral inflow, outfall stage, and quality flux stay live
            LateralInflow | Head | PollutantLatMassFlux => true,
            InvertElev | MaxDepth | InitDepth | SurchargeDepth | PondedArea | ReportFlag => {
                !started
            }
            _ => false,
        }
    }
}

/// Link properties (codes 400-499).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProp {
    Type = 400,
    FromNode = 401,
    ToNode = 402,
    Length = 403,
    Slope = 404,
    FullDepth = 405,
    Setting = 406,
    TimeOpen = 407,
    TimeClosed = 408,
    Flow = 409,
    Depth = 410,
    Velocity = 411,
    Volume = 412,
    Offset1 = 413,
    Offset2 = 414,
    InitFlow = 415,
    FlowLimit = 416,
    InletLoss = 417,
    OutletLoss = 418,
    AverageLoss = 419,
    SeepageRate = 420,
    FlapGate = 421,
    ReportFlag = 422,
    PollutantConcentration = 423,
    PollutantLoad = 424,
    PollutantLatMassFlux = 425,
}

impl LinkProp {
    pub fn from_code(code: u16) -> Option<Self> {
        use LinkProp::*;
        Some(match code {
            400 => Type,
            401 => FromNode,
            402 => ToNode,
            403 => Length,
            404 => Slope,
            405 => FullDepth,
            406 => Setting,
            407 => TimeOpen,
            408 => TimeClosed,
            409 => Flow,
            410 => Depth,
            411 => Velocity,
            412 => Volume,
            413 => Offset1,
            414 => Offset2,
            415 => InitFlow,
            416 => FlowLimit,
            417 => InletLoss,
            418 => OutletLoss,
            419 => AverageLoss,
            420 => SeepageRate,
            421 => FlapGate,
            422 => ReportFlag,
            423 => PollutantConcentration,
            424 => PollutantLoad,
            425 => PollutantLatMassFlux,
            _ => return None,
        })
    }

    pub fn writable(self, started: bool) -> bool {
        use LinkProp::*;
        match self {
            Setting | FlowLimit | SeepageRate | PollutantLatMassFlux => true,
            Offset1 | Offset2 | InitFlow | InletLoss | OutletLoss | AverageLoss | FlapGate
            | ReportFlag => !started,
            _ => false,
        }
    }
}

impl Engine {
    /// Legacy read form: the property code alone selects the object
    /// class through its numeric range.
    pub fn get_value(&self, property: u16, index: usize) -> EngineResult<f64> {
        match property {
            0..=99 => self.get_system_value(property),
            100..=199 => self.get_gauge_value(property, index),
            200..=299 => self.get_subcatch_value(property, index, None),
            300..=399 => self.get_node_value(property, index, None),
            400..=499 => self.get_link_value(property, index, None),
            _ => Err(EngineError::PropertyCode),
        }
    }

    /// Expanded read form, keyed on the object type, with a sub-index for
    /// per-pollutant properties.
    pub fn get_value_ex(
        &self,
        kind: ObjectKind,
        property: u16,
        index: usize,
        sub_index: Option<usize>,
    ) -> EngineResult<f64> {
        match kind {
            ObjectKind::System => self.get_system_value(property),
            ObjectKind::Gauge => self.get_gauge_value(property, index),
            ObjectKind::Subcatchment => self.get_subcatch_value(property, index, sub_index),
            ObjectKind::Node => self.get_node_value(property, index, sub_index),
            ObjectKind::Link => self.get_link_value(property, index, sub_index),
            _ => Err(EngineError::ObjectType),
        }
    }

    /// Legacy write form, dispatching on the property code's range.
    pub fn set_value(&mut self, property: u16, index: usize, value: f64) -> EngineResult<()> {
        match property {
            0..=99 => self.set_system_value(property, value),
            100..=199 => self.set_gauge_value(property, index, value),
            200..=299 => self.set_subcatch_value(property, index, None, value),
            300..=399 => self.set_node_value(property, index, None, value),
            400..=499 => self.set_link_value(property, index, None, value),
            _ => Err(EngineError::PropertyCode),
        }
    }

    /// Expanded write form, keyed on the object type.
    pub fn set_value_ex(
        &mut self,
        kind: ObjectKind,
        property: u16,
        index: usize,
        sub_index: Option<usize>,
        value: f64,
    ) -> EngineResult<()> {
        match kind {
            ObjectKind::System => self.set_system_value(property, value),
            ObjectKind::Gauge => self.set_gauge_value(property, index, value),
            ObjectKind::Subcatchment => self.set_subcatch_value(property, index, sub_index, value),
            ObjectKind::Node => self.set_node_value(property, index, sub_index, value),
            ObjectKind::Link => self.set_link_value(property, index, sub_index, value),
            _ => Err(EngineError::ObjectType),
        }
    }

    // ------------------------------------------------------------------
    // system
    // ------------------------------------------------------------------

    fn get_system_value(&self, property: u16) -> EngineResult<f64> {
        let prop = SystemProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let project = self.open_project()?;
        let opt = &project.options;
        use SystemProp::*;
        Ok(match prop {
            StartDate => opt.start_datetime,
            CurrentDate => opt.start_datetime + self.clock.elapsed_time_days,
            ElapsedTime => self.clock.elapsed_time_days,
            RouteStep => opt.route_step_s,
            MaxRouteStep => match &self.routing {
                Some(routing) if self.is_started() => {
                    routing.max_route_step(project, opt.route_step_s)
                }
                _ => opt.route_step_s,
            },
            ReportStep => f64::from(opt.report_step_s),
            TotalSteps => f64::from(self.clock.report_step_count),
            NoReport => f64::from(u8::from(opt.report.disabled)),
            FlowUnits => opt.flow_units as i32 as f64,
            EndDate => opt.end_datetime,
            ReportStart => opt.report_start,
            UnitSystem => opt.unit_system as i32 as f64,
            SurchargeMethod => opt.surcharge_method as i32 as f64,
            AllowPonding => f64::from(u8::from(opt.allow_ponding)),
            InertiaDamping => opt.inertia_damping as i32 as f64,
            IgnoreRainfall => f64::from(u8::from(opt.ignore_rainfall)),
            IgnoreRouting => f64::from(u8::from(opt.ignore_routing)),
            IgnoreQuality => f64::from(u8::from(opt.ignore_quality)),
            ErrorCode => f64::from(self.error.code()),
            RuleStep => opt.rule_step_s,
            NumThreads => opt.num_threads as f64,
            MinRouteStep => opt.min_route_step_s,
            LengtheningStep => opt.lengthening_step_s,
            CourantFactor => opt.courant_factor,
            MaxTrials => f64::from(opt.max_trials),
            HeadTolerance => opt.head_tolerance * opt.ucf(Quantity::Length),
            RunoffError => self.mass_balance_errors().0,
            FlowError => self.mass_balance_errors().1,
            QualError => self.mass_balance_errors().2,
            Warnings => f64::from(self.warnings),
        })
    }

    fn set_system_value(&mut self, property: u16, value: f64) -> EngineResult<()> {
        let prop = SystemProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let started = self.is_started();
        if !prop.writable(started) {
            return Err(if started && prop.writable(false) {
                EngineError::NotEnded
            } else {
                EngineError::PropertyCode
            });
        }
        let project = self.open_project_mut()?;
        let opt = &mut project.options;
        use SystemProp::*;
        match prop {
            StartDate => opt.start_datetime = value,
            EndDate => opt.end_datetime = value,
            ReportStart => opt.report_start = value,
            RouteStep => {
                if value <= 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                opt.route_step_s = value.max(opt.min_route_step_s);
            }
            ReportStep => {
                if value <= 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                opt.report_step_s = value as u32;
            }
            NoReport => opt.report.disabled = value > 0.0,
            SurchargeMethod => {
                opt.surcharge_method = match value as i32 {
                    0 => sf_project::SurchargeMethod::Extran,
                    1 => sf_project::SurchargeMethod::Slot,
                    _ => return Err(EngineError::PropertyValue),
                }
            }
            AllowPonding => opt.allow_ponding = value > 0.0,
            InertiaDamping => {
                opt.inertia_damping = match value as i32 {
                    0 => sf_project::InertiaDamping::None,
                    1 => sf_project::InertiaDamping::Partial,
                    2 => sf_project::InertiaDamping::Full,
                    _ => return Err(EngineError::PropertyValue),
                }
            }
            IgnoreRainfall => opt.ignore_rainfall = value > 0.0,
            IgnoreRouting => opt.ignore_routing = value > 0.0,
            IgnoreQuality => opt.ignore_quality = value > 0.0,
            RuleStep => {
                if value < 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                opt.rule_step_s = value;
            }
            NumThreads => {
                let available = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                opt.num_threads = (value as usize).clamp(1, available);
            }
            MinRouteStep => {
                if value <= 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                opt.min_route_step_s = value;
            }
            LengtheningStep => {
                if value <= 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                opt.lengthening_step_s = value;
            }
            CourantFactor => {
                if value <= 0.0 || value > 2.0 {
                    return Err(EngineError::PropertyValue);
                }
                opt.courant_factor = value;
            }
            MaxTrials => {
                if value < 2.0 {
                    return Err(EngineError::PropertyValue);
                }
                opt.max_trials = value as u32;
            }
            HeadTolerance => {
                if value <= 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                opt.head_tolerance = value / opt.ucf(Quantity::Length);
            }
            _ => return Err(EngineError::PropertyCode),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // gauges
    // ------------------------------------------------------------------

    fn get_gauge_value(&self, property: u16, index: usize) -> EngineResult<f64> {
        let prop = GaugeProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let project = self.open_project()?;
        let gauge = project.gauges.get(index).ok_or(EngineError::ObjectIndex)?;
        let rain_ucf = project.options.ucf(Quantity::Rainfall);
        Ok(match prop {
            GaugeProp::Rainfall => {
                gauge.api_rainfall.unwrap_or(gauge.rainfall) * rain_ucf
            }
            // no snowfall support: total precipitation equals rainfall
            GaugeProp::TotalPrecipitation => {
                gauge.api_rainfall.unwrap_or(gauge.rainfall) * rain_ucf
            }
        })
    }

    fn set_gauge_value(&mut self, property: u16, index: usize, value: f64) -> EngineResult<()> {
        let prop = GaugeProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        if !prop.writable(self.is_started()) {
            return Err(EngineError::PropertyCode);
        }
        if value < 0.0 {
            return Err(EngineError::PropertyValue);
        }
        let project = self.open_project_mut()?;
        let rain_ucf = project.options.ucf(Quantity::Rainfall);
        let gauge = project
            .gauges
            .get_mut(index)
            .ok_or(EngineError::ObjectIndex)?;
        gauge.api_rainfall = Some(value / rain_ucf);
        Ok(())
    }

    // ------------------------------------------------------------------
    // subcatchments
    // ------------------------------------------------------------------

    fn get_subcatch_value(
        &self,
        property: u16,
        index: usize,
        sub_index: Option<usize>,
    ) -> EngineResult<f64> {
        let prop = SubcatchProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let project = self.open_project()?;
        let sc = project
            .subcatchments
            .get(index)
            .ok_or(EngineError::ObjectIndex)?;
        let u = |q: Quantity| project.options.ucf(q);
        use SubcatchProp::*;
        Ok(match prop {
            Area => sc.area * u(Quantity::LandArea),
            RainGauge => sc.gauge.map_or(-1.0, |g| g as f64),
            Width => sc.width * u(Quantity::Length),
            Slope => sc.slope,
            CurbLength => sc.curb_length * u(Quantity::Length),
            Rainfall => sc.rainfall * u(Quantity::Rainfall),
            Evaporation => sc.evap_loss * u(Quantity::EvapRate),
            Infiltration => sc.infil_loss * u(Quantity::Rainfall),
            Runoff => sc.runoff * u(Quantity::Flow),
            ReportFlag => f64::from(u8::from(sc.rpt_flag)),
            ApiRainfall => sc.api_rainfall.unwrap_or(0.0) * u(Quantity::Rainfall),
            ApiSnowfall => sc.api_snowfall.unwrap_or(0.0) * u(Quantity::Rainfall),
            ExternalBuildup => {
                let k = check_pollut(project, sub_index)?;
                sc.ext_buildup[k]
            }
            RunoffConcentration => {
                let k = check_pollut(project, sub_index)?;
                sc.runoff_qual[k]
            }
            TotalLoad => {
                let k = check_pollut(project, sub_index)?;
                sc.total_load[k]
            }
        })
    }

    fn set_subcatch_value(
        &mut self,
        property: u16,
        index: usize,
        sub_index: Option<usize>,
        value: f64,
    ) -> EngineResult<()> {
        let prop = SubcatchProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let started = self.is_started();
        if !prop.writable(started) {
            return Err(if started && prop.writable(false) {
                EngineError::NotEnded
            } else {
                EngineError::PropertyCode
            });
        }
        let project = self.open_project_mut()?;
        if index >= project.subcatchments.len() {
            return Err(EngineError::ObjectIndex);
        }
        let u = |q: Quantity| project.options.ucf(q);
        use SubcatchProp::*;
        match prop {
            Area | Width | Slope | CurbLength | ApiRainfall | ApiSnowfall if value < 0.0 => {
                return Err(EngineError::PropertyValue)
            }
            _ => {}
        }
        let (area_ucf, len_ucf, rain_ucf) = (
            u(Quantity::LandArea),
            u(Quantity::Length),
            u(Quantity::Rainfall),
        );
        let k = match prop {
            ExternalBuildup => Some(check_pollut(project, sub_index)?),
            _ => None,
        };
        let sc = &mut project.subcatchments[index];
        match prop {
            Area => sc.area = value / area_ucf,
            Width => sc.width = value / len_ucf,
            Slope => sc.slope = value,
            CurbLength => sc.curb_length = value / len_ucf,
            ApiRainfall => sc.api_rainfall = Some(value / rain_ucf),
            ApiSnowfall => sc.api_snowfall = Some(value / rain_ucf),
            ExternalBuildup => sc.ext_buildup[k.expect("checked above")] = value,
            ReportFlag => sc.rpt_flag = value > 0.0,
            _ => return Err(EngineError::PropertyCode),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // nodes
    // ------------------------------------------------------------------

    fn get_node_value(
        &self,
        property: u16,
        index: usize,
        sub_index: Option<usize>,
    ) -> EngineResult<f64> {
        let prop = NodeProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let project = self.open_project()?;
        let node = project.nodes.get(index).ok_or(EngineError::ObjectIndex)?;
        let u = |q: Quantity| project.options.ucf(q);
        use NodeProp::*;
        Ok(match prop {
            Type => f64::from(node.kind.type_code()),
            InvertElev => node.invert_elev * u(Quantity::Length),
            MaxDepth => node.full_depth * u(Quantity::Length),
            InitDepth => node.init_depth * u(Quantity::Length),
            SurchargeDepth => node.surcharge_depth * u(Quantity::Length),
            PondedArea => node.ponded_area * u(Quantity::LandArea),
            Depth => node.depth * u(Quantity::Length),
            Head => node.head() * u(Quantity::Length),
            Volume => node.volume * u(Quantity::Volume),
            LateralInflow => node.lateral_inflow * u(Quantity::Flow),
            TotalInflow => node.inflow * u(Quantity::Flow),
            Overflow => node.overflow * u(Quantity::Flow),
            ReportFlag => f64::from(u8::from(node.rpt_flag)),
            PollutantConcentration => {
                let k = check_pollut(project, sub_index)?;
                node.qual[k]
            }
            PollutantLatMassFlux => {
                let k = check_pollut(project, sub_index)?;
                node.api_ext_qual_mass[k]
            }
        })
    }

    fn set_node_value(
        &mut self,
        property: u16,
        index: usize,
        sub_index: Option<usize>,
        value: f64,
    ) -> EngineResult<()> {
        let prop = NodeProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let started = self.is_started();
        if !prop.writable(started) {
            return Err(if started && prop.writable(false) {
                EngineError::NotEnded
            } else {
                EngineError::PropertyCode
            });
        }
        let project = self.open_project_mut()?;
        if index >= project.nodes.len() {
            return Err(EngineError::ObjectIndex);
        }
        let u = |q: Quantity| project.options.ucf(q);
        let (len_ucf, area_ucf, flow_ucf) = (
            u(Quantity::Length),
            u(Quantity::LandArea),
            u(Quantity::Flow),
        );
        let k = match prop {
            NodeProp::PollutantLatMassFlux => Some(check_pollut(project, sub_index)?),
            _ => None,
        };
        let node = &mut project.nodes[index];
        use NodeProp::*;
        match prop {
            InvertElev => node.invert_elev = value / len_ucf,
            MaxDepth => {
                if value < 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                node.full_depth = value / len_ucf;
            }
            InitDepth => {
                if value < 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                node.init_depth = value / len_ucf;
            }
            SurchargeDepth => {
                if value < 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                node.surcharge_depth = value / len_ucf;
            }
            PondedArea => {
                if value < 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                node.ponded_area = value / area_ucf;
            }
            LateralInflow => node.api_ext_inflow = value / flow_ucf,
            Head => {
                // only outfalls accept a stage override; the write also
                // converts the outfall to a fixed-stage one
                let NodeKind::Outfall { stage } = &mut node.kind else {
                    return Err(EngineError::ObjectType);
                };
                *stage = OutfallStage::Fixed(value / len_ucf);
                if !started {
                    node.depth = value / len_ucf;
                }
            }
            ReportFlag => node.rpt_flag = value > 0.0,
            PollutantLatMassFlux => {
                node.api_ext_qual_mass[k.expect("checked above")] = value;
            }
            _ => return Err(EngineError::PropertyCode),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // links
    // ------------------------------------------------------------------

    fn get_link_value(
        &self,
        property: u16,
        index: usize,
        sub_index: Option<usize>,
    ) -> EngineResult<f64> {
        let prop = LinkProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let project = self.open_project()?;
        let link = project.links.get(index).ok_or(EngineError::ObjectIndex)?;
        let u = |q: Quantity| project.options.ucf(q);
        let current_date =
            project.options.start_datetime + self.clock.new_routing_time_ms / MSEC_PER_DAY;
        use LinkProp::*;
        Ok(match prop {
            Type => f64::from(link.kind.type_code()),
            FromNode => link.from_node as f64,
            ToNode => link.to_node as f64,
            Length => match link.kind {
                LinkKind::Conduit { length, .. } => length * u(Quantity::Length),
                _ => return Err(EngineError::ObjectType),
            },
            Slope => match link.kind {
                LinkKind::Conduit { .. } => link.slope(&project.nodes),
                _ => return Err(EngineError::ObjectType),
            },
            FullDepth => link.full_depth() * u(Quantity::Length),
            Setting => link.setting,
            TimeOpen => {
                if link.setting > 0.0 {
                    (current_date - link.time_last_set) * 24.0
                } else {
                    0.0
                }
            }
            TimeClosed => {
                if link.setting <= 0.0 {
                    (current_date - link.time_last_set) * 24.0
                } else {
                    0.0
                }
            }
            Flow => link.flow * u(Quantity::Flow),
            Depth => link.depth * u(Quantity::Length),
            Velocity => link.velocity * u(Quantity::Length),
            Volume => link.volume * u(Quantity::Volume),
            Offset1 => link.offset1 * u(Quantity::Length),
            Offset2 => link.offset2 * u(Quantity::Length),
            InitFlow => link.init_flow * u(Quantity::Flow),
            FlowLimit => link.flow_limit * u(Quantity::Flow),
            InletLoss => link.c_loss_inlet,
            OutletLoss => link.c_loss_outlet,
            AverageLoss => link.c_loss_avg,
            SeepageRate => link.seep_rate * u(Quantity::Rainfall),
            FlapGate => f64::from(u8::from(link.has_flap_gate)),
            ReportFlag => f64::from(u8::from(link.rpt_flag)),
            PollutantConcentration => {
                let k = check_pollut(project, sub_index)?;
                link.qual[k]
            }
            PollutantLoad => {
                let k = check_pollut(project, sub_index)?;
                link.total_load[k]
            }
            PollutantLatMassFlux => {
                let k = check_pollut(project, sub_index)?;
                link.api_ext_qual_mass[k]
            }
        })
    }

    fn set_link_value(
        &mut self,
        property: u16,
        index: usize,
        sub_index: Option<usize>,
        value: f64,
    ) -> EngineResult<()> {
        let prop = LinkProp::from_code(property).ok_or(EngineError::PropertyCode)?;
        let started = self.is_started();
        if !prop.writable(started) {
            return Err(if started && prop.writable(false) {
                EngineError::NotEnded
            } else {
                EngineError::PropertyCode
            });
        }
        if prop == LinkProp::Setting {
            return self.set_link_setting(index, value);
        }
        let project = self.open_project_mut()?;
        if index >= project.links.len() {
            return Err(EngineError::ObjectIndex);
        }
        let u = |q: Quantity| project.options.ucf(q);
        let (len_ucf, flow_ucf, rain_ucf) = (
            u(Quantity::Length),
            u(Quantity::Flow),
            u(Quantity::Rainfall),
        );
        let k = match prop {
            LinkProp::PollutantLatMassFlux => Some(check_pollut(project, sub_index)?),
            _ => None,
        };
        let link = &mut project.links[index];
        use LinkProp::*;
        match prop {
            Offset1 => link.offset1 = value / len_ucf,
            Offset2 => link.offset2 = value / len_ucf,
            InitFlow => link.init_flow = value / flow_ucf,
            FlowLimit => link.flow_limit = value / flow_ucf,
            InletLoss => link.c_loss_inlet = value,
            OutletLoss => link.c_loss_outlet = value,
            AverageLoss => link.c_loss_avg = value,
            SeepageRate => {
                if value < 0.0 {
                    return Err(EngineError::PropertyValue);
                }
                link.seep_rate = value / rain_ucf;
            }
            FlapGate => link.has_flap_gate = value > 0.0,
            ReportFlag => link.rpt_flag = value > 0.0,
            PollutantLatMassFlux => {
                link.api_ext_qual_mass[k.expect("checked above")] = value;
            }
            _ => return Err(EngineError::PropertyCode),
        }
        Ok(())
    }

    /// Store a link's target setting. The kernel applies the change on
    /// the next step; zero/nonzero transitions stamp `time_last_set`, and
    /// an action record lands in the report when controls reporting is on.
    fn set_link_setting(&mut self, index: usize, value: f64) -> EngineResult<()> {
        let elapsed_days = self.clock.elapsed_time_days;
        let routing_ms = self.clock.new_routing_time_ms;
        let project = self.open_project_mut()?;
        let controls_reporting =
            !project.options.report.disabled && project.options.report.controls;
        let start = project.options.start_datetime;
        let link = project
            .links
            .get_mut(index)
            .ok_or(EngineError::ObjectIndex)?;

        if value < 0.0 {
            return Err(EngineError::PropertyValue);
        }
        if matches!(link.kind, LinkKind::Conduit { .. }) {
            return Err(EngineError::ObjectType);
        }
        let mut value = value;
        if !matches!(link.kind, LinkKind::Pump { .. }) && value > 1.0 {
            value = 1.0;
        }
        if link.target_setting == value {
            return Ok(());
        }
        link.target_setting = value;
        if link.target_setting * link.setting == 0.0 {
            link.time_last_set = start + elapsed_days;
        }
        let link_id = link.id.clone();
        if controls_reporting {
            let current = start + routing_ms / MSEC_PER_DAY;
            self.report
                .write_control_action(current, &link_id, value, "external override");
        }
        Ok(())
    }
}

fn check_pollut(project: &Project, sub_index: Option<usize>) -> EngineResult<usize> {
    let k = sub_index.ok_or(EngineError::SubIndex)?;
    if k >= project.pollutants.len() {
        return Err(EngineError::SubIndex);
    }
    Ok(k)
}

/// Map a legacy property code onto a results-file attribute slot and
/// read it back at one reporting period (0-based).
pub(crate) fn read_saved(
    reader: &mut OutputReader,
    property: u16,
    index: usize,
    period: usize,
) -> EngineResult<f64> {
    if property == SystemProp::CurrentDate as u16 {
        return Ok(reader.period_date(period)?);
    }
    let (element, attr) = match property {
        p if p == SubcatchProp::Rainfall as u16 => (ElementType::Subcatchment, 0),
        p if p == SubcatchProp::Evaporation as u16 => (ElementType::Subcatchment, 1),
        p if p == SubcatchProp::Infiltration as u16 => (ElementType::Subcatchment, 2),
        p if p == SubcatchProp::Runoff as u16 => (ElementType::Subcatchment, 3),
        p if p == NodeProp::Depth as u16 => (ElementType::Node, 0),
        p if p == NodeProp::Head as u16 => (ElementType::Node, 1),
        p if p == NodeProp::Volume as u16 => (ElementType::Node, 2),
        p if p == NodeProp::LateralInflow as u16 => (ElementType::Node, 3),
        p if p == NodeProp::TotalInflow as u16 => (ElementType::Node, 4),
        p if p == NodeProp::Overflow as u16 => (ElementType::Node, 5),
        p if p == LinkProp::Flow as u16 => (ElementType::Link, 0),
        p if p == LinkProp::Depth as u16 => (ElementType::Link, 1),
        p if p == LinkProp::Velocity as u16 => (ElementType::Link, 2),
        p if p == LinkProp::Volume as u16 => (ElementType::Link, 3),
        p if p == LinkProp::Setting as u16 => (ElementType::Link, 4),
        _ => return Err(EngineError::PropertyCode),
    };
    let values = reader.series(element, index, attr, period, period + 1)?;
    Ok(f64::from(values[0]))
}
