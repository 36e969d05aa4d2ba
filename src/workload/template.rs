//! Workload template table.
//!
//! Loaded once from the process-generation file and immutable afterwards.
//! Format: line 1 is the declared number of process types; every following
//! non-blank, non-`#` line is `name demand_mean cpu_burst_mean
//! interarrival_mean io_burst_mean`.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::core::state::Ticks;
use crate::error::SimError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessTemplate {
    pub name: String,
    pub mean_demand: Ticks,
    pub mean_cpu_burst: Ticks,
    pub mean_interarrival: Ticks,
    pub mean_io_burst: Option<Ticks>,
}

/// The parsed template table. Declaration order is preserved: seed
/// processes are created one per type in this order.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    templates: Vec<ProcessTemplate>,
    by_name: FxHashMap<String, usize>,
}

impl WorkloadSpec {
    pub fn from_templates(templates: Vec<ProcessTemplate>) -> Self {
        let by_name = templates
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self { templates, by_name }
    }

    pub fn load(path: &Path) -> Result<Self, SimError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(input: &str) -> Result<Self, SimError> {
        let mut lines = input
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let declared: usize = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or(SimError::InvalidHeader)?;

        let mut templates = Vec::new();
        for (row, line) in lines.enumerate() {
            let row = row + 1; // 1-based data row index for reporting
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let [name, rest @ ..] = tokens.as_slice() else {
                return Err(SimError::MalformedRow { row });
            };
            let fields: Vec<Ticks> = rest
                .iter()
                .map(|t| t.parse::<Ticks>())
                .collect::<Result<_, _>>()
                .map_err(|_| SimError::MalformedRow { row })?;
            let [demand, cpu_burst, interarrival, io_burst] = fields.as_slice() else {
                return Err(SimError::MalformedRow { row });
            };
            templates.push(ProcessTemplate {
                name: name.to_string(),
                mean_demand: *demand,
                mean_cpu_burst: *cpu_burst,
                mean_interarrival: *interarrival,
                mean_io_burst: Some(*io_burst),
            });
        }

        if declared != templates.len() {
            return Err(SimError::TypeCountMismatch {
                declared,
                found: templates.len(),
            });
        }

        Ok(Self::from_templates(templates))
    }

    pub fn get(&self, name: &str) -> Option<&ProcessTemplate> {
        self.by_name.get(name).map(|&i| &self.templates[i])
    }

    /// Type names in declaration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(|t| t.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
