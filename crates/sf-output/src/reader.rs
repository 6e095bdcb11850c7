//! Random-access reader over a finalized results file.
//!
//! A handle owns its file pointer, the cached header fields, and its own
//! sticky error context, so independent handles can serve queries from
//! different threads. All result offsets are computed from the cached
//! header; no query scans the file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sf_core::error::{codes, ErrorContext};

use crate::{message_for, OutputError, OutputResult, DATE_SIZE, RECORD_SIZE};

/// Element classes addressable in the results stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Subcatchment = 0,
    Node = 1,
    Link = 2,
    System = 3,
    Pollutant = 4,
}

#[derive(Debug)]
pub struct OutputReader {
    file: File,
    n_periods: i32,
    n_subcatch: i32,
    n_nodes: i32,
    n_links: i32,
    n_pollut: i32,
    subcatch_vars: i32,
    node_vars: i32,
    link_vars: i32,
    sys_vars: i32,
    start_date: f64,
    report_step_s: i32,
    id_pos: u64,
    results_pos: u64,
    bytes_per_period: u64,
    obj_prop_pos: u64,
    /// Element-name table, built lazily on first name query.
    names: Option<Vec<String>>,
    /// The run that produced this file finished with a nonzero code.
    warnings_issued: bool,
    error: ErrorContext,
}

impl OutputReader {
    /// Open a finalized results file, validating the epilogue against the
    /// header and caching everything queries need.
    pub fn open(path: &Path) -> OutputResult<Self> {
        let mut file = File::open(path).map_err(OutputError::CannotOpen)?;

        // epilogue: last 6 records hold the back-pointers and magic2
        file.seek(SeekFrom::End(-(6 * RECORD_SIZE as i64)))?;
        let id_pos = read_i32(&mut file)?;
        let obj_prop_pos = read_i32(&mut file)?;
        let results_pos = read_i32(&mut file)?;
        let n_periods = read_i32(&mut file)?;
        let error_code_at_write = read_i32(&mut file)?;
        let magic2 = read_i32(&mut file)?;

        file.seek(SeekFrom::Start(0))?;
        let magic1 = read_i32(&mut file)?;
        if magic1 != magic2 {
            return Err(OutputError::InvalidFile);
        }
        if n_periods <= 0 {
            return Err(OutputError::NoResults);
        }

        // object counts follow the magic, version, and flow-units records
        file.seek(SeekFrom::Start(3 * RECORD_SIZE))?;
        let n_subcatch = read_i32(&mut file)?;
        let n_nodes = read_i32(&mut file)?;
        let n_links = read_i32(&mut file)?;
        let n_pollut = read_i32(&mut file)?;

        // skip the fixed-size object property block to reach the
        // variable-count headers
        let prop_records = (n_subcatch as u64 + 2)
            + (3 * n_nodes as u64 + 4)
            + (5 * n_links as u64 + 6);
        file.seek(SeekFrom::Start(
            obj_prop_pos as u64 + prop_records * RECORD_SIZE,
        ))?;
        let subcatch_vars = read_i32(&mut file)?;
        file.seek(SeekFrom::Current(subcatch_vars as i64 * RECORD_SIZE as i64))?;
        let node_vars = read_i32(&mut file)?;
        file.seek(SeekFrom::Current(node_vars as i64 * RECORD_SIZE as i64))?;
        let link_vars = read_i32(&mut file)?;
        file.seek(SeekFrom::Current(link_vars as i64 * RECORD_SIZE as i64))?;
        let sys_vars = read_i32(&mut file)?;

        // reporting time axis sits just ahead of the results stream
        file.seek(SeekFrom::Start(results_pos as u64 - 3 * RECORD_SIZE))?;
        let start_date = read_f64(&mut file)?;
        let report_step_s = read_i32(&mut file)?;

        let bytes_per_period = DATE_SIZE
            + RECORD_SIZE
                * (n_subcatch as u64 * subcatch_vars as u64
                    + n_nodes as u64 * node_vars as u64
                    + n_links as u64 * link_vars as u64
                    + sys_vars as u64);

        let mut error = ErrorContext::new(message_for);
        let warnings_issued = error_code_at_write != 0;
        if warnings_issued {
            error.set(codes::WARNINGS_ISSUED);
        }

        Ok(Self {
            file,
            n_periods,
            n_subcatch,
            n_nodes,
            n_links,
            n_pollut,
            subcatch_vars,
            node_vars,
            link_vars,
            sys_vars,
            start_date,
            report_step_s,
            id_pos: id_pos as u64,
            results_pos: results_pos as u64,
            bytes_per_period,
            obj_prop_pos: obj_prop_pos as u64,
            names: None,
            warnings_issued,
            error,
        })
    }

    pub fn n_periods(&self) -> i32 {
        self.n_periods
    }

    pub fn start_date(&self) -> f64 {
        self.start_date
    }

    pub fn report_step_s(&self) -> i32 {
        self.report_step_s
    }

    pub fn warnings_issued(&self) -> bool {
        self.warnings_issued
    }

    /// Byte offset of the object-property block.
    pub fn object_property_pos(&self) -> u64 {
        self.obj_prop_pos
    }

    pub fn counts(&self) -> [i32; 4] {
        [self.n_subcatch, self.n_nodes, self.n_links, self.n_pollut]
    }

    pub fn variable_counts(&self) -> [i32; 4] {
        [
            self.subcatch_vars,
            self.node_vars,
            self.link_vars,
            self.sys_vars,
        ]
    }

    /// Engine version stamped in the header.
    pub fn version(&mut self) -> OutputResult<i32> {
        self.file.seek(SeekFrom::Start(RECORD_SIZE))?;
        read_i32(&mut self.file)
    }

    /// Flow-units code from the header.
    pub fn flow_units(&mut self) -> OutputResult<i32> {
        self.file.seek(SeekFrom::Start(2 * RECORD_SIZE))?;
        read_i32(&mut self.file)
    }

    /// Concentration-units code for each pollutant.
    pub fn pollutant_units(&mut self) -> OutputResult<Vec<i32>> {
        self.file.seek(SeekFrom::Start(7 * RECORD_SIZE))?;
        (0..self.n_pollut).map(|_| read_i32(&mut self.file)).collect()
    }

    /// ID name of one element. The name table is read once, on demand.
    pub fn element_name(&mut self, element: ElementType, index: usize) -> OutputResult<String> {
        let (offset, count) = match element {
            ElementType::Subcatchment => (0, self.n_subcatch),
            ElementType::Node => (self.n_subcatch, self.n_nodes),
            ElementType::Link => (self.n_subcatch + self.n_nodes, self.n_links),
            ElementType::Pollutant => (
                self.n_subcatch + self.n_nodes + self.n_links,
                self.n_pollut,
            ),
            ElementType::System => return Err(self.fail(OutputError::ElementType)),
        };
        if index >= count as usize {
            return Err(self.fail(OutputError::ObjectIndex));
        }
        if self.names.is_none() {
            self.init_element_names()?;
        }
        Ok(self.names.as_ref().expect("names initialized")[offset as usize + index].clone())
    }

    fn init_element_names(&mut self) -> OutputResult<()> {
        let total = (self.n_subcatch + self.n_nodes + self.n_links + self.n_pollut) as usize;
        let mut names = Vec::with_capacity(total);
        self.file.seek(SeekFrom::Start(self.id_pos))?;
        for _ in 0..total {
            let len = read_i32(&mut self.file)?.max(0) as usize;
            let mut buf = vec![0_u8; len];
            self.file.read_exact(&mut buf)?;
            names.push(String::from_utf8_lossy(&buf).into_owned());
        }
        self.names = Some(names);
        Ok(())
    }

    /// Date of one reporting period, decimal days.
    pub fn period_date(&mut self, period: usize) -> OutputResult<f64> {
        if period >= self.n_periods as usize {
            return Err(self.fail(OutputError::PeriodRange));
        }
        let offset = self.results_pos + period as u64 * self.bytes_per_period;
        self.file.seek(SeekFrom::Start(offset))?;
        read_f64(&mut self.file)
    }

    /// Time series of one attribute for one element over
    /// `[start_period, end_period)`.
    pub fn series(
        &mut self,
        element: ElementType,
        index: usize,
        attribute: usize,
        start_period: usize,
        end_period: usize,
    ) -> OutputResult<Vec<f32>> {
        self.check_element(element, index, attribute)?;
        if start_period >= self.n_periods as usize || end_period <= start_period {
            return Err(self.fail(OutputError::PeriodRange));
        }
        let end_period = end_period.min(self.n_periods as usize);
        let mut values = Vec::with_capacity(end_period - start_period);
        for period in start_period..end_period {
            values.push(self.read_value(element, period, index, attribute)?);
        }
        Ok(values)
    }

    /// One attribute across every element of a class at one period.
    pub fn attribute(
        &mut self,
        element: ElementType,
        attribute: usize,
        period: usize,
    ) -> OutputResult<Vec<f32>> {
        self.check_element(element, 0, attribute)?;
        if period >= self.n_periods as usize {
            return Err(self.fail(OutputError::PeriodRange));
        }
        let count = match element {
            ElementType::Subcatchment => self.n_subcatch,
            ElementType::Node => self.n_nodes,
            ElementType::Link => self.n_links,
            ElementType::System => 1,
            ElementType::Pollutant => return Err(self.fail(OutputError::ElementType)),
        } as usize;
        (0..count)
            .map(|index| self.read_value(element, period, index, attribute))
            .collect()
    }

    /// Every attribute of one element at one period.
    pub fn result(
        &mut self,
        element: ElementType,
        index: usize,
        period: usize,
    ) -> OutputResult<Vec<f32>> {
        let (count, vars) = match element {
            ElementType::Subcatchment => (self.n_subcatch, self.subcatch_vars),
            ElementType::Node => (self.n_nodes, self.node_vars),
            ElementType::Link => (self.n_links, self.link_vars),
            ElementType::System => (1, self.sys_vars),
            ElementType::Pollutant => return Err(self.fail(OutputError::ElementType)),
        };
        if element != ElementType::System && index >= count as usize {
            return Err(self.fail(OutputError::ObjectIndex));
        }
        if period >= self.n_periods as usize {
            return Err(self.fail(OutputError::PeriodRange));
        }
        (0..vars as usize)
            .map(|attr| self.read_value(element, period, index, attr))
            .collect()
    }

    /// Latched error code for this handle (0 = none).
    pub fn error_code(&self) -> u16 {
        self.error.code()
    }

    /// Message for the latched error, if any.
    pub fn check_error(&self) -> Option<String> {
        self.error.check()
    }

    pub fn clear_error(&mut self) {
        self.error.clear();
    }

    fn fail(&mut self, err: OutputError) -> OutputError {
        self.error.set(err.code());
        err
    }

    fn check_element(
        &mut self,
        element: ElementType,
        index: usize,
        attribute: usize,
    ) -> OutputResult<()> {
        let (count, vars) = match element {
            ElementType::Subcatchment => (self.n_subcatch, self.subcatch_vars),
            ElementType::Node => (self.n_nodes, self.node_vars),
            ElementType::Link => (self.n_links, self.link_vars),
            ElementType::System => (1, self.sys_vars),
            ElementType::Pollutant => return Err(self.fail(OutputError::ElementType)),
        };
        if index >= count as usize {
            return Err(self.fail(OutputError::ObjectIndex));
        }
        if attribute >= vars as usize {
            return Err(self.fail(OutputError::AttributeCode));
        }
        Ok(())
    }

    /// Deterministic offset into the period block for one value.
    fn read_value(
        &mut self,
        element: ElementType,
        period: usize,
        index: usize,
        attribute: usize,
    ) -> OutputResult<f32> {
        let region = match element {
            ElementType::Subcatchment => index as u64 * self.subcatch_vars as u64,
            ElementType::Node => {
                self.n_subcatch as u64 * self.subcatch_vars as u64
                    + index as u64 * self.node_vars as u64
            }
            ElementType::Link => {
                self.n_subcatch as u64 * self.subcatch_vars as u64
                    + self.n_nodes as u64 * self.node_vars as u64
                    + index as u64 * self.link_vars as u64
            }
            ElementType::System => {
                self.n_subcatch as u64 * self.subcatch_vars as u64
                    + self.n_nodes as u64 * self.node_vars as u64
                    + self.n_links as u64 * self.link_vars as u64
            }
            ElementType::Pollutant => return Err(self.fail(OutputError::ElementType)),
        };
        let offset = self.results_pos
            + period as u64 * self.bytes_per_period
            + DATE_SIZE
            + (region + attribute as u64) * RECORD_SIZE;
        self.file.seek(SeekFrom::Start(offset))?;
        read_f32(&mut self.file)
    }
}

fn read_i32(file: &mut File) -> OutputResult<i32> {
    let mut buf = [0_u8; 4];
    file.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32(file: &mut File) -> OutputResult<f32> {
    let mut buf = [0_u8; 4];
    file.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_f64(file: &mut File) -> OutputResult<f64> {
    let mut buf = [0_u8; 8];
    file.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}
