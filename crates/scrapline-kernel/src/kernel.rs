use crate::chronology::ChronologyGuard;
use crate::config::KernelConfig;
use crate::evidence::EvidenceLedger;
use crate::gate_pass::GatePassAuthority;
use crate::locks::TransactionLocks;
use crate::machine::TransactionStateMachine;
use crate::memory::InMemoryPorts;
use crate::ports::Ports;
use crate::weighbridge::WeightReconciliationEngine;

/// Composition root: all components over one set of ports and one lock
/// registry, so writes from any component serialize per transaction.
#[derive(Clone)]
pub struct IntakeKernel {
    config: KernelConfig,
    ports: Ports,
    locks: TransactionLocks,
    machine: TransactionStateMachine,
    evidence: EvidenceLedger,
    gate_pass: GatePassAuthority,
    chronology: ChronologyGuard,
    weights: WeightReconciliationEngine,
}

impl IntakeKernel {
    pub fn new(config: KernelConfig, ports: Ports) -> Self {
        let locks = TransactionLocks::new();
        let chronology = ChronologyGuard::new(ports.clone(), &config.chronology);
        let gate_pass =
            GatePassAuthority::new(ports.clone(), locks.clone(), config.gate_pass.clone());
        let evidence = EvidenceLedger::new(
            ports.clone(),
            locks.clone(),
            chronology.clone(),
            config.system.clone(),
        );
        let machine = TransactionStateMachine::new(
            ports.clone(),
            locks.clone(),
            chronology.clone(),
            gate_pass.clone(),
            &config.weighbridge,
        );

        Self {
            weights: WeightReconciliationEngine::from_config(&config.weighbridge),
            config,
            ports,
            locks,
            machine,
            evidence,
            gate_pass,
            chronology,
        }
    }

    /// Kernel over fresh in-memory adapters. Returns the concrete handles
    /// alongside it for inspection.
    pub fn in_memory(config: KernelConfig) -> (Self, InMemoryPorts) {
        let mem = InMemoryPorts::new();
        (Self::new(config, mem.ports()), mem)
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn locks(&self) -> &TransactionLocks {
        &self.locks
    }

    pub fn transactions(&self) -> &TransactionStateMachine {
        &self.machine
    }

    pub fn evidence(&self) -> &EvidenceLedger {
        &self.evidence
    }

    pub fn gate_pass(&self) -> &GatePassAuthority {
        &self.gate_pass
    }

    pub fn chronology(&self) -> &ChronologyGuard {
        &self.chronology
    }

    pub fn weights(&self) -> &WeightReconciliationEngine {
        &self.weights
    }
}
