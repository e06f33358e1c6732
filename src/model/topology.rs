//! CPUs and cores.

use super::task::Affinity;
use crate::error::{ParseError, SchedError};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Globally unique core identifier.
///
/// Core ids are only unique inside their CPU, so a core is addressed by
/// the `(cpu, core)` pair. Displayed as `cpu/core`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoreId {
    pub cpu: String,
    pub core: String,
}

impl CoreId {
    pub fn new(cpu: impl Into<String>, core: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            core: core.into(),
        }
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cpu, self.core)
    }
}

/// A processing core owned by a CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Core {
    id: CoreId,
}

impl Core {
    pub fn id(&self) -> &CoreId {
        &self.id
    }

    /// Owning CPU identifier.
    pub fn cpu(&self) -> &str {
        &self.id.cpu
    }
}

/// A CPU and its ordered cores.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cpu {
    id: String,
    cores: Vec<String>,
}

impl Cpu {
    pub fn new<I, S>(id: impl Into<String>, cores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            cores: cores.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Local core ids in declaration order.
    pub fn cores(&self) -> &[String] {
        &self.cores
    }
}

/// Immutable hardware topology.
#[derive(Debug, Clone)]
pub struct Topology {
    cpus: Vec<Cpu>,
    cpu_index: HashMap<String, usize>,
    /// Flattened cores, CPU by CPU in declaration order.
    cores: Vec<Core>,
    core_index: HashMap<CoreId, usize>,
}

impl Topology {
    /// Builds a topology.
    ///
    /// # Errors
    /// Duplicate CPU ids, or a core id repeated within one CPU.
    pub fn new(cpus: Vec<Cpu>) -> Result<Self, ParseError> {
        let mut cpu_index = HashMap::with_capacity(cpus.len());
        let mut cores = Vec::new();
        let mut core_index = HashMap::new();

        for (i, cpu) in cpus.iter().enumerate() {
            if cpu_index.insert(cpu.id.clone(), i).is_some() {
                return Err(ParseError::DuplicateId {
                    kind: "cpu",
                    id: cpu.id.clone(),
                });
            }
            let mut seen = HashSet::new();
            for local in &cpu.cores {
                let id = CoreId::new(cpu.id.clone(), local.clone());
                if !seen.insert(local.as_str()) {
                    return Err(ParseError::DuplicateId {
                        kind: "core",
                        id: id.to_string(),
                    });
                }
                core_index.insert(id.clone(), cores.len());
                cores.push(Core { id });
            }
        }

        Ok(Self {
            cpus,
            cpu_index,
            cores,
            core_index,
        })
    }

    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    pub fn cpu(&self, id: &str) -> Result<&Cpu, SchedError> {
        self.cpu_index
            .get(id)
            .map(|&i| &self.cpus[i])
            .ok_or_else(|| SchedError::NotFound {
                kind: "cpu",
                id: id.to_string(),
            })
    }

    pub fn core(&self, id: &CoreId) -> Result<&Core, SchedError> {
        self.index_of(id)
            .map(|i| &self.cores[i])
            .ok_or_else(|| SchedError::NotFound {
                kind: "core",
                id: id.to_string(),
            })
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    /// All core ids, CPU by CPU in declaration order.
    pub fn core_ids(&self) -> impl Iterator<Item = &CoreId> {
        self.cores.iter().map(|c| &c.id)
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    pub(crate) fn index_of(&self, id: &CoreId) -> Option<usize> {
        self.core_index.get(id).copied()
    }

    pub(crate) fn core_at(&self, i: usize) -> &CoreId {
        &self.cores[i].id
    }

    /// Indices of the cores `affinity` admits, ascending. May be empty.
    ///
    /// # Errors
    /// The pinned CPU or core is not part of the topology.
    pub(crate) fn eligible(&self, affinity: &Affinity) -> Result<Vec<usize>, SchedError> {
        match affinity {
            Affinity::Any => Ok((0..self.cores.len()).collect()),
            Affinity::Cpu(cpu) => {
                self.cpu(cpu)?;
                Ok((0..self.cores.len())
                    .filter(|&i| self.cores[i].cpu() == cpu.as_str())
                    .collect())
            }
            Affinity::Core(id) => self
                .index_of(id)
                .map(|i| vec![i])
                .ok_or_else(|| SchedError::UnknownCore(id.to_string())),
        }
    }
}
