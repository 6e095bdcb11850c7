//! Append-only results writer driven by the simulation lifecycle.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sf_core::datetime::DateTime;
use sf_core::units::Quantity;
use sf_project::{LinkKind, Project};

use crate::{
    OutputError, OutputResult, DATE_SIZE, ENGINE_VERSION, LINK_PROPS, LINK_VAR_BASE, MAGIC,
    NODE_PROPS, NODE_VAR_BASE, RECORD_SIZE, SUBCATCH_PROPS, SUBCATCH_VAR_BASE, SYS_VARS,
};

/// One reporting period's values, already converted to user units.
/// Layouts are element-major: all variables for element 0, then element 1.
#[derive(Debug, Clone, Default)]
pub struct ResultsFrame {
    pub subcatch: Vec<f32>,
    pub node: Vec<f32>,
    pub link: Vec<f32>,
    pub sys: Vec<f32>,
}

impl ResultsFrame {
    pub fn zeroed(n_subcatch: usize, n_nodes: usize, n_links: usize, n_pollut: usize) -> Self {
        Self {
            subcatch: vec![0.0; n_subcatch * (SUBCATCH_VAR_BASE + n_pollut)],
            node: vec![0.0; n_nodes * (NODE_VAR_BASE + n_pollut)],
            link: vec![0.0; n_links * (LINK_VAR_BASE + n_pollut)],
            sys: vec![0.0; SYS_VARS],
        }
    }
}

/// Running sums for averaged reporting periods.
#[derive(Debug, Default)]
struct Averages {
    frame: ResultsFrame,
    samples: u32,
}

#[derive(Debug)]
pub struct OutputWriter {
    file: BufWriter<File>,
    path: PathBuf,
    n_subcatch: usize,
    n_nodes: usize,
    n_links: usize,
    n_pollut: usize,
    id_pos: u64,
    obj_prop_pos: u64,
    results_pos: u64,
    n_periods: i32,
    averages: Option<Averages>,
}

impl OutputWriter {
    /// Create the file and write everything ahead of the results stream.
    pub fn open(path: &Path, project: &Project) -> OutputResult<Self> {
        let file = File::create(path).map_err(OutputError::CannotOpen)?;
        let mut writer = Self {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
            n_subcatch: project.subcatchments.len(),
            n_nodes: project.nodes.len(),
            n_links: project.links.len(),
            n_pollut: project.pollutants.len(),
            id_pos: 0,
            obj_prop_pos: 0,
            results_pos: 0,
            n_periods: 0,
            averages: project.options.report.averages.then(|| Averages {
                frame: ResultsFrame::zeroed(
                    project.subcatchments.len(),
                    project.nodes.len(),
                    project.links.len(),
                    project.pollutants.len(),
                ),
                samples: 0,
            }),
        };
        writer.write_header(project)?;
        Ok(writer)
    }

    fn write_header(&mut self, project: &Project) -> OutputResult<()> {
        self.write_i32(MAGIC)?;
        self.write_i32(ENGINE_VERSION)?;
        self.write_i32(project.options.flow_units as i32)?;
        self.write_i32(self.n_subcatch as i32)?;
        self.write_i32(self.n_nodes as i32)?;
        self.write_i32(self.n_links as i32)?;
        self.write_i32(self.n_pollut as i32)?;
        for pollut in &project.pollutants {
            self.write_i32(pollut.units as i32)?;
        }

        // element name table
        self.id_pos = self.file.stream_position()?;
        for sc in &project.subcatchments {
            self.write_name(&sc.id)?;
        }
        for node in &project.nodes {
            self.write_name(&node.id)?;
        }
        for link in &project.links {
            self.write_name(&link.id)?;
        }
        for pollut in &project.pollutants {
            self.write_name(&pollut.id)?;
        }

        // per-object input properties
        self.obj_prop_pos = self.file.stream_position()?;
        let len_ucf = project.options.ucf(Quantity::Length);
        let area_ucf = project.options.ucf(Quantity::LandArea);

        self.write_i32(SUBCATCH_PROPS as i32)?;
        self.write_i32(0)?; // property: area
        for sc in &project.subcatchments {
            self.write_f32((sc.area * area_ucf) as f32)?;
        }

        self.write_i32(NODE_PROPS as i32)?;
        for code in 0..NODE_PROPS {
            self.write_i32(code as i32)?; // type, invert, max depth
        }
        for node in &project.nodes {
            self.write_f32(node.kind.type_code() as f32)?;
            self.write_f32((node.invert_elev * len_ucf) as f32)?;
            self.write_f32((node.full_depth * len_ucf) as f32)?;
        }

        self.write_i32(LINK_PROPS as i32)?;
        for code in 0..LINK_PROPS {
            self.write_i32(code as i32)?; // type, offsets, max depth, length
        }
        for link in &project.links {
            self.write_f32(link.kind.type_code() as f32)?;
            self.write_f32((link.offset1 * len_ucf) as f32)?;
            self.write_f32((link.offset2 * len_ucf) as f32)?;
            self.write_f32((link.full_depth() * len_ucf) as f32)?;
            let length = match link.kind {
                LinkKind::Conduit { length, .. } => length * len_ucf,
                _ => 0.0,
            };
            self.write_f32(length as f32)?;
        }

        // computed-variable counts and attribute codes
        let subcatch_vars = SUBCATCH_VAR_BASE + self.n_pollut;
        let node_vars = NODE_VAR_BASE + self.n_pollut;
        let link_vars = LINK_VAR_BASE + self.n_pollut;
        for vars in [subcatch_vars, node_vars, link_vars, SYS_VARS] {
            self.write_i32(vars as i32)?;
            for code in 0..vars {
                self.write_i32(code as i32)?;
            }
        }

        // reporting time axis
        self.write_f64(project.options.report_start)?;
        self.write_i32(project.options.report_step_s as i32)?;

        self.results_pos = self.file.stream_position()?;
        Ok(())
    }

    /// Fold a frame into the running averages.
    pub fn update_averages(&mut self, frame: &ResultsFrame) {
        if let Some(avg) = &mut self.averages {
            let add = |sum: &mut Vec<f32>, values: &[f32]| {
                for (s, v) in sum.iter_mut().zip(values) {
                    *s += v;
                }
            };
            add(&mut avg.frame.subcatch, &frame.subcatch);
            add(&mut avg.frame.node, &frame.node);
            add(&mut avg.frame.link, &frame.link);
            add(&mut avg.frame.sys, &frame.sys);
            avg.samples += 1;
        }
    }

    /// Emit one reporting period. In averaging mode the accumulated mean
    /// is written (and the accumulators reset); otherwise `frame` itself.
    pub fn write_period(&mut self, date: DateTime, frame: &ResultsFrame) -> OutputResult<()> {
        self.write_f64(date)?;
        match self.averages.take() {
            Some(mut avg) if avg.samples > 0 => {
                let n = avg.samples as f32;
                for values in [
                    &mut avg.frame.subcatch,
                    &mut avg.frame.node,
                    &mut avg.frame.link,
                    &mut avg.frame.sys,
                ] {
                    for v in values.iter_mut() {
                        *v /= n;
                    }
                }
                self.write_frame(&avg.frame)?;
                for values in [
                    &mut avg.frame.subcatch,
                    &mut avg.frame.node,
                    &mut avg.frame.link,
                    &mut avg.frame.sys,
                ] {
                    values.fill(0.0);
                }
                avg.samples = 0;
                self.averages = Some(avg);
            }
            other => {
                self.averages = other;
                self.write_frame(frame)?;
            }
        }
        self.n_periods += 1;
        Ok(())
    }

    fn write_frame(&mut self, frame: &ResultsFrame) -> OutputResult<()> {
        for &v in frame
            .subcatch
            .iter()
            .chain(&frame.node)
            .chain(&frame.link)
            .chain(&frame.sys)
        {
            self.write_f32(v)?;
        }
        Ok(())
    }

    /// Write the epilogue and flush. The file stays open (and readable by
    /// an independent handle) until the writer is dropped.
    pub fn end(&mut self, error_code: u16) -> OutputResult<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.write_i32(self.id_pos as i32)?;
        self.write_i32(self.obj_prop_pos as i32)?;
        self.write_i32(self.results_pos as i32)?;
        self.write_i32(self.n_periods)?;
        self.write_i32(i32::from(error_code))?;
        self.write_i32(MAGIC)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn n_periods(&self) -> i32 {
        self.n_periods
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_per_period(&self) -> u64 {
        let records = self.n_subcatch * (SUBCATCH_VAR_BASE + self.n_pollut)
            + self.n_nodes * (NODE_VAR_BASE + self.n_pollut)
            + self.n_links * (LINK_VAR_BASE + self.n_pollut)
            + SYS_VARS;
        DATE_SIZE + records as u64 * RECORD_SIZE
    }

    fn write_i32(&mut self, value: i32) -> OutputResult<()> {
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_f32(&mut self, value: f32) -> OutputResult<()> {
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_f64(&mut self, value: f64) -> OutputResult<()> {
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn write_name(&mut self, name: &str) -> OutputResult<()> {
        let bytes = name.as_bytes();
        self.write_i32(bytes.len() as i32)?;
        self.file.write_all(bytes)?;
        Ok(())
    }
}
