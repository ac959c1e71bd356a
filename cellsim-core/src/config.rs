//! TOML-backed configuration for a scenario run, mirroring spec §6's
//! recognized configuration parameters.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::cellstate::{CellState, CellStateError, ConflictMode, TransactionMode};
use crate::mesos::{MesosAllocator, MesosError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error(transparent)]
    CellState(#[from] CellStateError),
    #[error(transparent)]
    Mesos(#[from] MesosError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub logging: bool,
    pub max_virtual_time: Option<f64>,
    pub wall_clock_timeout_secs: Option<f64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { logging: false, max_virtual_time: None, wall_clock_timeout_secs: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CellStateConfig {
    pub num_machines: u32,
    pub cpus_per_machine: f64,
    pub mem_per_machine: f64,
    pub conflict_mode: String,
    pub transaction_mode: String,
}

impl CellStateConfig {
    pub fn build(&self) -> Result<CellState, CellStateError> {
        let conflict_mode = match self.conflict_mode.as_str() {
            "resource-fit" => ConflictMode::ResourceFit,
            "sequence-numbers" => ConflictMode::SequenceNumbers,
            other => return Err(CellStateError::InvalidConfig(format!("unknown conflict_mode {other:?}"))),
        };
        let transaction_mode = match self.transaction_mode.as_str() {
            "all-or-nothing" => TransactionMode::AllOrNothing,
            "incremental" => TransactionMode::Incremental,
            other => return Err(CellStateError::InvalidConfig(format!("unknown transaction_mode {other:?}"))),
        };
        CellState::new(self.num_machines, self.cpus_per_machine, self.mem_per_machine, conflict_mode, transaction_mode)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OmegaSchedulerConfig {
    pub name: String,
    pub constant_think_times: std::collections::HashMap<String, f64>,
    pub per_task_think_times: std::collections::HashMap<String, f64>,
    pub num_machines_to_blacklist: u32,
}

impl Default for OmegaSchedulerConfig {
    fn default() -> Self {
        Self {
            name: "omega".to_string(),
            constant_think_times: std::collections::HashMap::new(),
            per_task_think_times: std::collections::HashMap::new(),
            num_machines_to_blacklist: 0,
        }
    }
}

impl OmegaSchedulerConfig {
    pub fn build(&self) -> crate::scheduler::OmegaScheduler {
        let mut sched = crate::scheduler::OmegaScheduler::new(self.name.clone(), self.num_machines_to_blacklist);
        sched.base.constant_think_time = self.constant_think_times.clone();
        sched.base.per_task_think_time = self.per_task_think_times.clone();
        sched
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MesosAllocatorConfig {
    pub constant_think_time: f64,
    #[serde(default = "default_min_offer")]
    pub min_cpu_offer: f64,
    #[serde(default = "default_min_offer")]
    pub min_mem_offer: f64,
    #[serde(default = "default_batch_interval")]
    pub offer_batch_interval: f64,
}

fn default_min_offer() -> f64 {
    100.0
}

fn default_batch_interval() -> f64 {
    1.0
}

impl Default for MesosAllocatorConfig {
    fn default() -> Self {
        Self {
            constant_think_time: 0.0,
            min_cpu_offer: default_min_offer(),
            min_mem_offer: default_min_offer(),
            offer_batch_interval: default_batch_interval(),
        }
    }
}

impl MesosAllocatorConfig {
    pub fn build(&self) -> Result<MesosAllocator, MesosError> {
        MesosAllocator::new(self.constant_think_time, self.min_cpu_offer, self.min_mem_offer, self.offer_batch_interval)
    }
}

/// Top-level scenario configuration, deserialized from one TOML document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub simulator: SimulatorConfig,
    pub cell_state: CellStateConfig,
    pub omega_schedulers: Vec<OmegaSchedulerConfig>,
    pub mesos_allocator: Option<MesosAllocatorConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            cell_state: CellStateConfig {
                num_machines: 1,
                cpus_per_machine: 100.0,
                mem_per_machine: 100.0,
                conflict_mode: "sequence-numbers".to_string(),
                transaction_mode: "all-or-nothing".to_string(),
            },
            omega_schedulers: Vec::new(),
            mesos_allocator: None,
        }
    }
}

impl ScenarioConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
    }
}
