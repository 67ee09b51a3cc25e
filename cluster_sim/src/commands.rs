//! Line protocol of the simulator: every command is echoed as `#<command> <args>` and any
//! violated precondition is reported as `error: <reason>` without touching the state.
use lib::{
    cluster::Cluster,
    job::Job,
    reader::{ReadError, TokenReader},
    waiting_area::WaitingArea,
};
use log::{info, warn};
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("processor does not exist")]
    ProcessorNotFound,
    #[error("processor already exists")]
    ProcessorAlreadyExists,
    #[error("processor has jobs")]
    ProcessorHasJobs,
    #[error("processor has auxiliaries")]
    ProcessorHasAuxiliaries,
    #[error("job already exists")]
    JobAlreadyExists,
    #[error("job does not exist")]
    JobNotFound,
    #[error("job does not fit")]
    JobDoesNotFit,
    #[error("priority already exists")]
    PriorityAlreadyExists,
    #[error("priority does not exist")]
    PriorityNotFound,
    #[error("priority has jobs")]
    PriorityHasJobs,
    #[error("time must be positive")]
    NonPositiveTime,
}

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("failed to write output: {0}")]
    Write(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ConfigureCluster,
    ModifyCluster,
    AddPriority,
    RemovePriority,
    AddWaitingJob,
    AddProcessorJob,
    RemoveProcessorJob,
    SendJobsToCluster,
    AdvanceTime,
    PrintPriority,
    PrintWaitingArea,
    PrintProcessor,
    PrintProcessors,
    PrintStructure,
    CompactProcessor,
    CompactCluster,
    End,
}

impl Command {
    pub fn from_token(token: &str) -> Option<Self> {
        let command = match token {
            "configurar_cluster" | "cc" => Self::ConfigureCluster,
            "modificar_cluster" | "mc" => Self::ModifyCluster,
            "alta_prioridad" | "ap" => Self::AddPriority,
            "baja_prioridad" | "bp" => Self::RemovePriority,
            "alta_proceso_espera" | "ape" => Self::AddWaitingJob,
            "alta_proceso_procesador" | "app" => Self::AddProcessorJob,
            "baja_proceso_procesador" | "bpp" => Self::RemoveProcessorJob,
            "enviar_procesos_cluster" | "epc" => Self::SendJobsToCluster,
            "avanzar_tiempo" | "at" => Self::AdvanceTime,
            "imprimir_prioridad" | "ipri" => Self::PrintPriority,
            "imprimir_area_espera" | "iae" => Self::PrintWaitingArea,
            "imprimir_procesador" | "ipro" => Self::PrintProcessor,
            "imprimir_procesadores_cluster" | "ipc" => Self::PrintProcessors,
            "imprimir_estructura_cluster" | "iec" => Self::PrintStructure,
            "compactar_memoria_procesador" | "cmp" => Self::CompactProcessor,
            "compactar_memoria_cluster" | "cmc" => Self::CompactCluster,
            "fin" => Self::End,
            _ => return None,
        };
        Some(command)
    }
}

pub struct Simulator {
    cluster: Cluster,
    waiting_area: WaitingArea,
}

impl Simulator {
    /// Reads the initial cluster followed by the initial waiting area.
    pub fn read<R: BufRead>(reader: &mut TokenReader<R>) -> Result<Self, ReadError> {
        let mut cluster = Cluster::new();
        cluster.read(reader)?;
        let waiting_area = WaitingArea::read(reader)?;
        Ok(Self {
            cluster,
            waiting_area,
        })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    #[cfg(test)]
    pub fn waiting_area(&self) -> &WaitingArea {
        &self.waiting_area
    }

    /// Executes commands until `fin` (or the end of the input).
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        reader: &mut TokenReader<R>,
        out: &mut W,
    ) -> Result<(), SimulatorError> {
        while let Some(token) = reader.next_token()? {
            match Command::from_token(&token) {
                Some(Command::End) => {
                    info!("Simulation finished");
                    return Ok(());
                }
                Some(command) => self.execute(command, &token, reader, out)?,
                None => warn!("Unknown command: {}", token),
            }
        }
        warn!("Input ended before fin");
        Ok(())
    }

    fn execute<R: BufRead, W: Write>(
        &mut self,
        command: Command,
        token: &str,
        reader: &mut TokenReader<R>,
        out: &mut W,
    ) -> Result<(), SimulatorError> {
        let outcome = match command {
            Command::ConfigureCluster => {
                writeln!(out, "#{}", token)?;
                self.cluster.read(reader)?;
                Ok(())
            }
            Command::ModifyCluster => {
                let id = reader.expect_token("processor id")?;
                let mut other = Cluster::new();
                other.read(reader)?;
                writeln!(out, "#{} {}", token, id)?;
                self.modify_cluster(other, &id)
            }
            Command::AddPriority => {
                let priority_id = reader.expect_token("priority id")?;
                writeln!(out, "#{} {}", token, priority_id)?;
                self.add_priority(&priority_id)
            }
            Command::RemovePriority => {
                let priority_id = reader.expect_token("priority id")?;
                writeln!(out, "#{} {}", token, priority_id)?;
                self.remove_priority(&priority_id)
            }
            Command::AddWaitingJob => {
                let priority_id = reader.expect_token("priority id")?;
                let job = reader.read_job()?;
                writeln!(out, "#{} {} {}", token, priority_id, job.id())?;
                self.add_waiting_job(&priority_id, job)
            }
            Command::AddProcessorJob => {
                let id = reader.expect_token("processor id")?;
                let job = reader.read_job()?;
                writeln!(out, "#{} {} {}", token, id, job.id())?;
                self.add_processor_job(&id, job)
            }
            Command::RemoveProcessorJob => {
                let id = reader.expect_token("processor id")?;
                let job_id: i32 = reader.read("job id")?;
                writeln!(out, "#{} {} {}", token, id, job_id)?;
                self.remove_processor_job(&id, job_id)
            }
            Command::SendJobsToCluster => {
                let n: usize = reader.read("number of jobs")?;
                writeln!(out, "#{} {}", token, n)?;
                self.waiting_area.send_to_cluster(n, &mut self.cluster);
                Ok(())
            }
            Command::AdvanceTime => {
                let time: i32 = reader.read("time")?;
                writeln!(out, "#{} {}", token, time)?;
                self.advance_time(time)
            }
            Command::PrintPriority => {
                let priority_id = reader.expect_token("priority id")?;
                writeln!(out, "#{} {}", token, priority_id)?;
                if self.waiting_area.exists_priority(&priority_id) {
                    self.waiting_area.write_priority(&priority_id, out)?;
                    Ok(())
                } else {
                    Err(CommandError::PriorityNotFound)
                }
            }
            Command::PrintWaitingArea => {
                writeln!(out, "#{}", token)?;
                self.waiting_area.write(out)?;
                Ok(())
            }
            Command::PrintProcessor => {
                let id = reader.expect_token("processor id")?;
                writeln!(out, "#{} {}", token, id)?;
                if self.cluster.exists(&id) {
                    self.cluster.write_processor(&id, out)?;
                    Ok(())
                } else {
                    Err(CommandError::ProcessorNotFound)
                }
            }
            Command::PrintProcessors => {
                writeln!(out, "#{}", token)?;
                self.cluster.write_processors(out)?;
                Ok(())
            }
            Command::PrintStructure => {
                writeln!(out, "#{}", token)?;
                self.cluster.write_structure(out)?;
                Ok(())
            }
            Command::CompactProcessor => {
                let id = reader.expect_token("processor id")?;
                writeln!(out, "#{} {}", token, id)?;
                self.compact_processor(&id)
            }
            Command::CompactCluster => {
                writeln!(out, "#{}", token)?;
                self.cluster.compact_all();
                Ok(())
            }
            Command::End => Ok(()),
        };

        if let Err(err) = outcome {
            writeln!(out, "error: {}", err)?;
        }
        Ok(())
    }

    fn modify_cluster(&mut self, other: Cluster, id: &str) -> Result<(), CommandError> {
        let processor = self
            .cluster
            .processor(id)
            .ok_or(CommandError::ProcessorNotFound)?;
        if processor.is_active() {
            return Err(CommandError::ProcessorHasJobs);
        }
        if self.cluster.has_auxiliary(id) {
            return Err(CommandError::ProcessorHasAuxiliaries);
        }
        if !self.cluster.graft_conflicts(&other, id).is_empty() {
            return Err(CommandError::ProcessorAlreadyExists);
        }
        self.cluster.graft(other, id);
        Ok(())
    }

    fn add_priority(&mut self, priority_id: &str) -> Result<(), CommandError> {
        if self.waiting_area.exists_priority(priority_id) {
            return Err(CommandError::PriorityAlreadyExists);
        }
        self.waiting_area.add_priority(priority_id);
        Ok(())
    }

    fn remove_priority(&mut self, priority_id: &str) -> Result<(), CommandError> {
        let priority = self
            .waiting_area
            .priority(priority_id)
            .ok_or(CommandError::PriorityNotFound)?;
        if !priority.is_empty() {
            return Err(CommandError::PriorityHasJobs);
        }
        self.waiting_area.remove_priority(priority_id);
        Ok(())
    }

    fn add_waiting_job(&mut self, priority_id: &str, job: Job) -> Result<(), CommandError> {
        let priority = self
            .waiting_area
            .priority(priority_id)
            .ok_or(CommandError::PriorityNotFound)?;
        if priority.exists(job.id()) {
            return Err(CommandError::JobAlreadyExists);
        }
        self.waiting_area.add_job(priority_id, job);
        Ok(())
    }

    fn add_processor_job(&mut self, id: &str, job: Job) -> Result<(), CommandError> {
        let processor = self
            .cluster
            .processor(id)
            .ok_or(CommandError::ProcessorNotFound)?;
        if processor.exists(job.id()) {
            return Err(CommandError::JobAlreadyExists);
        }
        self.cluster
            .place_job(id, job)
            .map(|_| ())
            .map_err(|_| CommandError::JobDoesNotFit)
    }

    fn remove_processor_job(&mut self, id: &str, job_id: i32) -> Result<(), CommandError> {
        let processor = self
            .cluster
            .processor(id)
            .ok_or(CommandError::ProcessorNotFound)?;
        if !processor.exists(job_id) {
            return Err(CommandError::JobNotFound);
        }
        self.cluster.remove_job(id, job_id);
        Ok(())
    }

    fn advance_time(&mut self, time: i32) -> Result<(), CommandError> {
        if time <= 0 {
            return Err(CommandError::NonPositiveTime);
        }
        self.cluster.advance_time(time);
        Ok(())
    }

    fn compact_processor(&mut self, id: &str) -> Result<(), CommandError> {
        if !self.cluster.exists(id) {
            return Err(CommandError::ProcessorNotFound);
        }
        self.cluster.compact_processor(id);
        Ok(())
    }
}
