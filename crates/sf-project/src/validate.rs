//! Project-level consistency checks run after the graph is built.

use tracing::warn;

use crate::model::{LinkKind, Project};
use crate::{ProjectError, ProjectResult};

pub fn validate(project: &Project) -> ProjectResult<()> {
    let opt = &project.options;

    if opt.end_datetime < opt.start_datetime {
        return Err(ProjectError::OptionValue {
            what: "end date precedes start date".into(),
        });
    }
    if opt.report_start > opt.end_datetime {
        return Err(ProjectError::OptionValue {
            what: "report start falls after the end date".into(),
        });
    }
    if opt.courant_factor <= 0.0 || opt.courant_factor > 2.0 {
        return Err(ProjectError::OptionValue {
            what: "courant_factor must be in (0, 2]".into(),
        });
    }
    if opt.max_trials < 2 {
        return Err(ProjectError::OptionValue {
            what: "max_trials must be at least 2".into(),
        });
    }

    for link in &project.links {
        if link.from_node == link.to_node {
            return Err(ProjectError::LinkEndpoint {
                link: link.id.clone(),
            });
        }
        if let LinkKind::Conduit {
            length,
            roughness,
            full_depth,
        } = link.kind
        {
            if length <= 0.0 || roughness <= 0.0 || full_depth <= 0.0 {
                return Err(ProjectError::OptionValue {
                    what: format!("conduit {} geometry must be positive", link.id),
                });
            }
        }
    }

    for sc in &project.subcatchments {
        if sc.area < 0.0 || sc.width < 0.0 || sc.slope < 0.0 {
            return Err(ProjectError::OptionValue {
                what: format!("subcatchment {} geometry must be non-negative", sc.id),
            });
        }
        if sc.gauge.is_none() && sc.area > 0.0 {
            warn!(subcatchment = %sc.id, "no rain gauge assigned; rainfall is zero");
        }
    }

    Ok(())
}
